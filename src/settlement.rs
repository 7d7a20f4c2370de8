//! Prop settlement.
//!
//! A settlement starts Pending and moves exactly once to Hit, Miss, Push or
//! Void. Feeds report stats with float noise (0.49999 goals, 27.000001
//! saves), so both the observed value and the line are rounded under an
//! explicit policy before comparison.
use crate::errors::{EngineError, EngineResult};
use crate::state::{AmericanOdds, Direction, StatType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the stats source knows about one (entity, stat, date).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservedOutcome {
    /// Not final yet.
    NotAvailable,
    /// Postponed or cancelled.
    Postponed,
    /// Scratched, injured, or absent from the box score.
    DidNotPlay,
    Recorded {
        value: f64,
        #[serde(default)]
        time_on_ice_secs: Option<u32>,
    },
}

/// Outcome lookup contract. Implemented by the stats layer; the core only reads.
pub trait OutcomeSource {
    fn lookup(&self, entity_id: &str, stat_type: StatType, date: NaiveDate) -> ObservedOutcome;
}

impl OutcomeSource for HashMap<(String, StatType, NaiveDate), ObservedOutcome> {
    fn lookup(&self, entity_id: &str, stat_type: StatType, date: NaiveDate) -> ObservedOutcome {
        self.get(&(entity_id.to_string(), stat_type, date))
            .copied()
            .unwrap_or(ObservedOutcome::NotAvailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoidReason {
    Postponed,
    DidNotPlay,
    NoTimeOnIce,
    InvalidValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Hit,
    Miss,
    Push,
    Void(VoidReason),
}

impl SettlementStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SettlementStatus::Pending)
    }

    /// Hit or miss; the only statuses that count toward hit rate.
    #[inline]
    pub fn is_graded(&self) -> bool {
        matches!(self, SettlementStatus::Hit | SettlementStatus::Miss)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Push => "push",
            Self::Void(_) => "void",
        }
    }
}

/// Decimal places kept before comparing actual value and line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct RoundingPolicy {
    pub decimals: u32,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self { decimals: 2 }
    }
}

impl RoundingPolicy {
    /// Round half away from zero.
    #[inline]
    pub fn apply(&self, v: f64) -> f64 {
        let scale = 10f64.powi(self.decimals as i32);
        (v * scale).round() / scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub status: SettlementStatus,
    /// Observed value after rounding.
    pub actual: Option<f64>,
    /// Rounding changed the observed value.
    pub rounding_adjusted: bool,
}

/// Grade one outcome against a line. Pure function.
pub fn grade(
    direction: Direction,
    line: f64,
    outcome: &ObservedOutcome,
    policy: &RoundingPolicy,
) -> Grade {
    let void = |reason| Grade {
        status: SettlementStatus::Void(reason),
        actual: None,
        rounding_adjusted: false,
    };
    let (value, toi) = match *outcome {
        ObservedOutcome::NotAvailable => {
            return Grade { status: SettlementStatus::Pending, actual: None, rounding_adjusted: false }
        }
        ObservedOutcome::Postponed => return void(VoidReason::Postponed),
        ObservedOutcome::DidNotPlay => return void(VoidReason::DidNotPlay),
        ObservedOutcome::Recorded { value, time_on_ice_secs } => (value, time_on_ice_secs),
    };
    if toi == Some(0) {
        return void(VoidReason::NoTimeOnIce);
    }
    if !value.is_finite() || value < 0.0 {
        tracing::warn!(value, "unusable recorded value, voiding");
        return void(VoidReason::InvalidValue);
    }

    // Only the observed value is rounded; the posted line is compared as-is.
    let actual = policy.apply(value);
    let rounding_adjusted = actual != value;
    if rounding_adjusted {
        tracing::debug!(raw = value, rounded = actual, decimals = policy.decimals, "data quality: settlement value rounded");
    }

    let status = if actual == line {
        SettlementStatus::Push
    } else {
        let over = actual > line;
        match (direction, over) {
            (Direction::Over, true) | (Direction::Under, false) => SettlementStatus::Hit,
            _ => SettlementStatus::Miss,
        }
    };
    Grade { status, actual: Some(actual), rounding_adjusted }
}

/// One prop's settlement. Terminal once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub direction: Direction,
    pub line: f64,
    status: SettlementStatus,
    actual: Option<f64>,
    rounding_adjusted: bool,
}

impl Settlement {
    pub fn new(direction: Direction, line: f64) -> Self {
        Self {
            direction,
            line,
            status: SettlementStatus::Pending,
            actual: None,
            rounding_adjusted: false,
        }
    }

    #[inline]
    pub fn status(&self) -> SettlementStatus {
        self.status
    }

    #[inline]
    pub fn actual(&self) -> Option<f64> {
        self.actual
    }

    #[inline]
    pub fn rounding_adjusted(&self) -> bool {
        self.rounding_adjusted
    }

    /// Apply an observed outcome. NotAvailable leaves the settlement as it is.
    /// Resolving an already terminal settlement to the same status is a no-op;
    /// to a different one is an error.
    pub fn resolve(
        &mut self,
        outcome: &ObservedOutcome,
        policy: &RoundingPolicy,
    ) -> EngineResult<SettlementStatus> {
        let g = grade(self.direction, self.line, outcome, policy);
        if !g.status.is_terminal() {
            return Ok(self.status);
        }
        if self.status.is_terminal() {
            if self.status == g.status {
                return Ok(self.status);
            }
            return Err(EngineError::Settlement(format!(
                "already settled as {:?}, refusing {:?}",
                self.status, g.status
            )));
        }
        self.status = g.status;
        self.actual = g.actual;
        self.rounding_adjusted = g.rounding_adjusted;
        Ok(self.status)
    }
}

/// Net win on a winning flat stake at American odds.
#[inline]
pub fn profit(odds: AmericanOdds, stake: f64) -> f64 {
    let o = odds.value() as f64;
    if o > 0.0 {
        stake * o / 100.0
    } else {
        stake * 100.0 / o.abs()
    }
}

/// Flat-stake P/L for a settled status.
#[inline]
pub fn settled_pnl(status: SettlementStatus, odds: AmericanOdds, stake: f64) -> f64 {
    match status {
        SettlementStatus::Hit => profit(odds, stake),
        SettlementStatus::Miss => -stake,
        _ => 0.0,
    }
}
