//! Signal aggregation and edge computation.
//!
//!   weighted_signal = Σ(s_i * w_i * c_i) / Σ(w_i * c_i)
//!   p_model         = logistic(logit(base) + weighted_signal * scale)
//!   edge_over       = (p_model - p_market_over) * 100
//!   edge_under      = ((1 - p_model) - p_market_under) * 100
//!
//! where s_i is the (possibly inverted) signal strength, w_i the configured
//! weight and c_i the signal's own confidence. Evaluation is a pure function
//! of the context and the config.
use super::odds::{market_probabilities, PROBABILITY_CEIL, PROBABILITY_FLOOR};
use crate::config::LeagueConfig;
use crate::errors::{EngineError, EngineResult};
use crate::signals::{signal_set, Signal, SignalKind};
use crate::state::{Direction, League, PropContext, SignalResult, StatType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum |strength| for a signal to count as agreeing or disagreeing.
const REASON_THRESHOLD: f64 = 0.1;
const MAX_SUPPORTING: usize = 3;
const MAX_RISKS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    /// Raw heuristic output, before any polarity flip.
    pub strength: f64,
    pub confidence: f64,
    pub evidence: String,
    pub weight: f64,
    pub inverted: bool,
}

impl SignalContribution {
    /// Strength as it entered aggregation.
    #[inline]
    pub fn effective_strength(&self) -> f64 {
        if self.inverted {
            -self.strength
        } else {
            self.strength
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideEdges {
    pub over: f64,
    pub under: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub primary: String,
    pub supporting: Vec<String>,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeResult {
    pub entity_id: String,
    pub entity_name: String,
    pub stat_type: StatType,
    pub line: f64,
    /// Model probability of `direction` hitting.
    pub model_probability: f64,
    /// Market-implied probability of `direction` hitting.
    pub market_probability: f64,
    /// (model_probability - market_probability) * 100.
    pub edge_pct: f64,
    pub direction: Direction,
    pub confidence: f64,
    pub weighted_signal: f64,
    /// Edges before any contrarian flip.
    pub side_edges: SideEdges,
    pub contrarian_applied: bool,
    /// Direction the model picked before a contrarian flip.
    pub original_direction: Option<Direction>,
    pub signals: BTreeMap<SignalKind, SignalContribution>,
    pub rationale: Rationale,
}

impl EdgeResult {
    #[inline]
    pub fn has_edge(&self, min_edge_pct: f64) -> bool {
        self.edge_pct.abs() >= min_edge_pct
    }

    /// Edge recomputed from the stored probabilities.
    #[inline]
    pub fn implied_edge_pct(&self) -> f64 {
        (self.model_probability - self.market_probability) * 100.0
    }
}

/// Output of the aggregation step.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Aggregate {
    pub weighted_signal: f64,
    pub confidence: f64,
}

/// Confidence-weighted mean of signal strengths.
/// Input is (strength, weight, confidence) with strength already sign-adjusted.
/// Zero-confidence inputs (not applicable to the stat, or nothing observed)
/// are left out of both the signal and the confidence.
/// Summation order does not matter beyond float rounding.
pub fn aggregate(inputs: &[(f64, f64, f64)]) -> Aggregate {
    let mut num: f64 = 0.0;
    let mut eff_total: f64 = 0.0;
    let mut weight_total: f64 = 0.0;
    for &(s, w, c) in inputs {
        if c <= 0.0 {
            continue;
        }
        let ew = w * c;
        num += s * ew;
        eff_total += ew;
        weight_total += w;
    }
    if eff_total <= 0.0 || weight_total <= 0.0 {
        return Aggregate { weighted_signal: 0.0, confidence: 0.0 };
    }
    Aggregate {
        weighted_signal: (num / eff_total).clamp(-1.0, 1.0),
        confidence: (eff_total / weight_total).clamp(0.0, 1.0),
    }
}

/// Logistic map from weighted signal to probability, centred on `base`.
/// Monotone non-decreasing in `weighted_signal` for `scale > 0`.
#[inline]
pub fn signal_to_probability(weighted_signal: f64, scale: f64, base: f64) -> f64 {
    let base = base.clamp(0.01, 0.99);
    let logit = (base / (1.0 - base)).ln() + weighted_signal * scale;
    let p = 1.0 / (1.0 + (-logit).exp());
    p.clamp(PROBABILITY_FLOOR, PROBABILITY_CEIL)
}

pub struct EdgeCalculator<'s> {
    signals: Vec<&'s dyn Signal>,
    config: LeagueConfig,
}

impl EdgeCalculator<'static> {
    /// Calculator over the league's registered signal set.
    pub fn new(league: League, config: LeagueConfig) -> Self {
        Self {
            signals: signal_set(league).to_vec(),
            config,
        }
    }
}

impl<'s> EdgeCalculator<'s> {
    pub fn with_signals(signals: Vec<&'s dyn Signal>, config: LeagueConfig) -> Self {
        Self { signals, config }
    }

    pub fn config(&self) -> &LeagueConfig {
        &self.config
    }

    /// Evaluate one prop. Errors only on invalid required input; every
    /// other gap in the context shows up as lower confidence.
    pub fn evaluate(&self, ctx: &PropContext) -> EngineResult<EdgeResult> {
        if !ctx.line.is_finite() || ctx.line <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "{} {}: line must be positive, got {}",
                ctx.entity_id, ctx.stat_type, ctx.line
            )));
        }
        let market = market_probabilities(&ctx.odds)?;

        let mut signals: BTreeMap<SignalKind, SignalContribution> = BTreeMap::new();
        let mut inputs: Vec<(f64, f64, f64)> = Vec::with_capacity(self.signals.len());
        for signal in &self.signals {
            let kind = signal.kind();
            let SignalResult { strength, confidence, evidence } = signal.calculate(ctx);
            let contribution = SignalContribution {
                strength,
                confidence,
                evidence,
                weight: self.config.weight(kind),
                inverted: self.config.is_inverted(kind),
            };
            inputs.push((contribution.effective_strength(), contribution.weight, confidence));
            signals.insert(kind, contribution);
        }

        let agg = aggregate(&inputs);
        let p_over =
            signal_to_probability(agg.weighted_signal, self.config.scale, self.config.base_probability);
        let p_under = 1.0 - p_over;

        let side_edges = SideEdges {
            over: (p_over - market.over) * 100.0,
            under: (p_under - market.under) * 100.0,
        };

        // Ties go to the over.
        let (mut direction, mut edge_pct, mut model_probability, mut market_probability) =
            if side_edges.over >= side_edges.under {
                (Direction::Over, side_edges.over, p_over, market.over)
            } else {
                (Direction::Under, side_edges.under, p_under, market.under)
            };

        let mut original_direction = None;
        if let Some(threshold) = self.config.contrarian.threshold_for(ctx.stat_type) {
            if edge_pct.abs() >= threshold {
                original_direction = Some(direction);
                direction = direction.flip();
                edge_pct = -edge_pct;
                model_probability = 1.0 - model_probability;
                market_probability = 1.0 - market_probability;
                tracing::debug!(
                    entity = %ctx.entity_id,
                    stat = %ctx.stat_type,
                    threshold,
                    edge_pct,
                    "contrarian flip"
                );
            }
        }

        let rationale = build_rationale(&signals, direction);

        tracing::debug!(
            entity = %ctx.entity_id,
            stat = %ctx.stat_type,
            line = ctx.line,
            weighted_signal = agg.weighted_signal,
            model_probability,
            market_probability,
            edge_pct,
            direction = %direction,
            "prop evaluated"
        );

        Ok(EdgeResult {
            entity_id: ctx.entity_id.clone(),
            entity_name: ctx.entity_name.clone(),
            stat_type: ctx.stat_type,
            line: ctx.line,
            model_probability,
            market_probability,
            edge_pct,
            direction,
            confidence: agg.confidence,
            weighted_signal: agg.weighted_signal,
            side_edges,
            contrarian_applied: original_direction.is_some(),
            original_direction,
            signals,
            rationale,
        })
    }
}

/// Rank signals by |strength| * confidence; agreeing ones explain the pick,
/// opposing ones are listed as risks.
fn build_rationale(
    signals: &BTreeMap<SignalKind, SignalContribution>,
    direction: Direction,
) -> Rationale {
    let mut ranked: Vec<(&SignalKind, &SignalContribution)> = signals.iter().collect();
    ranked.sort_by(|a, b| {
        let ka = a.1.effective_strength().abs() * a.1.confidence;
        let kb = b.1.effective_strength().abs() * b.1.confidence;
        kb.total_cmp(&ka)
    });

    let mut rationale = Rationale::default();
    for (kind, c) in ranked {
        let aligned = c.effective_strength() * direction.sign();
        if aligned > REASON_THRESHOLD {
            if rationale.primary.is_empty() {
                rationale.primary = c.evidence.clone();
            } else if rationale.supporting.len() < MAX_SUPPORTING {
                rationale.supporting.push(c.evidence.clone());
            }
        } else if aligned < -REASON_THRESHOLD && rationale.risks.len() < MAX_RISKS {
            rationale.risks.push(format!("{kind}: {}", c.evidence));
        }
    }
    if rationale.primary.is_empty() {
        rationale.primary = "no strong signals".into();
    }
    rationale
}
