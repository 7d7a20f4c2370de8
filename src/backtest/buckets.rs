//! Per-partition bucket accumulators.
//!
//! Each worker fills its own `Accumulator`; partitions are merged in order
//! at the end. Nothing here is shared while records are being replayed.
use super::BacktestRecord;
use crate::settlement::SettlementStatus;
use crate::signals::SignalKind;
use crate::state::{Direction, StatType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NUM_DECILES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeBucket {
    #[serde(rename = "negative")]
    Negative,
    #[serde(rename = "0-5")]
    UpTo5,
    #[serde(rename = "5-10")]
    UpTo10,
    #[serde(rename = "10-15")]
    UpTo15,
    #[serde(rename = "15+")]
    Above15,
}

impl EdgeBucket {
    pub const ALL: [EdgeBucket; 5] = [
        Self::Negative,
        Self::UpTo5,
        Self::UpTo10,
        Self::UpTo15,
        Self::Above15,
    ];

    #[inline]
    pub fn from_edge(edge_pct: f64) -> Self {
        if edge_pct < 0.0 {
            Self::Negative
        } else if edge_pct < 5.0 {
            Self::UpTo5
        } else if edge_pct < 10.0 {
            Self::UpTo10
        } else if edge_pct < 15.0 {
            Self::UpTo15
        } else {
            Self::Above15
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::UpTo5 => "0-5",
            Self::UpTo10 => "5-10",
            Self::UpTo15 => "10-15",
            Self::Above15 => "15+",
        }
    }
}

/// Which side of the neutral band a signal fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSign {
    Positive,
    Neutral,
    Negative,
}

impl SignalSign {
    #[inline]
    pub fn classify(strength: f64, neutral_band: f64) -> Self {
        if strength > neutral_band {
            Self::Positive
        } else if strength < -neutral_band {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

#[inline]
pub fn prob_to_decile(prob: f64) -> usize {
    if !prob.is_finite() || prob <= 0.0 {
        return 0;
    }
    let idx = (prob * NUM_DECILES as f64) as usize;
    idx.min(NUM_DECILES - 1)
}

/// Raw counts for one bucket. Probability and profit sums cover graded
/// (hit/miss) records only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BucketCounts {
    pub hits: u64,
    pub misses: u64,
    pub pushes: u64,
    pub probability_sum: f64,
    pub profit_sum: f64,
    pub staked: f64,
}

impl BucketCounts {
    #[inline]
    pub fn graded(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn record(&mut self, status: SettlementStatus, model_probability: f64, pnl: f64, stake: f64) {
        if status == SettlementStatus::Push {
            self.pushes += 1;
            return;
        }
        if !status.is_graded() {
            return;
        }
        if status == SettlementStatus::Hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        self.probability_sum += model_probability;
        self.profit_sum += pnl;
        self.staked += stake;
    }

    pub fn merge(&mut self, other: &BucketCounts) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.pushes += other.pushes;
        self.probability_sum += other.probability_sum;
        self.profit_sum += other.profit_sum;
        self.staked += other.staked;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSplit {
    pub positive: BucketCounts,
    pub neutral: BucketCounts,
    pub negative: BucketCounts,
}

impl SignalSplit {
    #[inline]
    pub fn side_mut(&mut self, sign: SignalSign) -> &mut BucketCounts {
        match sign {
            SignalSign::Positive => &mut self.positive,
            SignalSign::Neutral => &mut self.neutral,
            SignalSign::Negative => &mut self.negative,
        }
    }

    pub fn merge(&mut self, other: &SignalSplit) {
        self.positive.merge(&other.positive);
        self.neutral.merge(&other.neutral);
        self.negative.merge(&other.negative);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    pub total_records: u64,
    pub rejected: u64,
    pub pending: u64,
    pub voids: u64,
    pub rounding_adjusted: u64,
    pub overall: BucketCounts,
    pub by_edge: BTreeMap<EdgeBucket, BucketCounts>,
    pub by_stat: BTreeMap<StatType, BucketCounts>,
    pub by_direction: BTreeMap<Direction, BucketCounts>,
    pub by_contrarian: BTreeMap<bool, BucketCounts>,
    pub deciles: [BucketCounts; NUM_DECILES],
    pub by_signal: BTreeMap<SignalKind, SignalSplit>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn reject(&mut self) {
        self.total_records += 1;
        self.rejected += 1;
    }

    /// Fold one replayed record into every bucket family it belongs to.
    pub fn add(&mut self, record: &BacktestRecord, neutral_band: f64) {
        self.total_records += 1;
        let status = record.status;
        match status {
            SettlementStatus::Pending => {
                self.pending += 1;
                return;
            }
            SettlementStatus::Void(_) => {
                self.voids += 1;
                return;
            }
            _ => {}
        }
        if record.rounding_adjusted {
            self.rounding_adjusted += 1;
        }

        let r = &record.result;
        let p = r.model_probability;
        let pnl = record.profit;
        let stake = record.stake;

        self.overall.record(status, p, pnl, stake);
        self.by_edge
            .entry(EdgeBucket::from_edge(r.edge_pct))
            .or_default()
            .record(status, p, pnl, stake);
        self.by_stat.entry(r.stat_type).or_default().record(status, p, pnl, stake);
        self.by_direction.entry(r.direction).or_default().record(status, p, pnl, stake);
        self.by_contrarian
            .entry(r.contrarian_applied)
            .or_default()
            .record(status, p, pnl, stake);
        self.deciles[prob_to_decile(p)].record(status, p, pnl, stake);

        for (kind, c) in &r.signals {
            // Zero-confidence signals did not take part in the prediction.
            if c.confidence <= 0.0 {
                continue;
            }
            let sign = SignalSign::classify(c.strength, neutral_band);
            self.by_signal
                .entry(*kind)
                .or_default()
                .side_mut(sign)
                .record(status, p, pnl, stake);
        }
    }

    pub fn merge(&mut self, other: &Accumulator) {
        self.total_records += other.total_records;
        self.rejected += other.rejected;
        self.pending += other.pending;
        self.voids += other.voids;
        self.rounding_adjusted += other.rounding_adjusted;
        self.overall.merge(&other.overall);
        for (k, v) in &other.by_edge {
            self.by_edge.entry(*k).or_default().merge(v);
        }
        for (k, v) in &other.by_stat {
            self.by_stat.entry(*k).or_default().merge(v);
        }
        for (k, v) in &other.by_direction {
            self.by_direction.entry(*k).or_default().merge(v);
        }
        for (k, v) in &other.by_contrarian {
            self.by_contrarian.entry(*k).or_default().merge(v);
        }
        for (mine, theirs) in self.deciles.iter_mut().zip(other.deciles.iter()) {
            mine.merge(theirs);
        }
        for (k, v) in &other.by_signal {
            self.by_signal.entry(*k).or_default().merge(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_bucket_edges() {
        assert_eq!(EdgeBucket::from_edge(-0.01), EdgeBucket::Negative);
        assert_eq!(EdgeBucket::from_edge(0.0), EdgeBucket::UpTo5);
        assert_eq!(EdgeBucket::from_edge(4.99), EdgeBucket::UpTo5);
        assert_eq!(EdgeBucket::from_edge(5.0), EdgeBucket::UpTo10);
        assert_eq!(EdgeBucket::from_edge(14.99), EdgeBucket::UpTo15);
        assert_eq!(EdgeBucket::from_edge(15.0), EdgeBucket::Above15);
        assert_eq!(serde_json::to_string(&EdgeBucket::Above15).unwrap(), "\"15+\"");
    }

    #[test]
    fn test_decile_mapping() {
        assert_eq!(prob_to_decile(0.0), 0);
        assert_eq!(prob_to_decile(0.05), 0);
        assert_eq!(prob_to_decile(0.15), 1);
        assert_eq!(prob_to_decile(0.95), 9);
        assert_eq!(prob_to_decile(1.0), 9);
    }

    #[test]
    fn test_signal_sign_band() {
        assert_eq!(SignalSign::classify(0.05, 0.05), SignalSign::Neutral);
        assert_eq!(SignalSign::classify(0.051, 0.05), SignalSign::Positive);
        assert_eq!(SignalSign::classify(-0.2, 0.05), SignalSign::Negative);
    }

    #[test]
    fn test_counts_exclude_push_and_void_from_rates() {
        let mut b = BucketCounts::default();
        b.record(SettlementStatus::Hit, 0.6, 0.9, 1.0);
        b.record(SettlementStatus::Miss, 0.6, -1.0, 1.0);
        b.record(SettlementStatus::Push, 0.6, 0.0, 1.0);
        b.record(SettlementStatus::Void(crate::settlement::VoidReason::DidNotPlay), 0.6, 0.0, 1.0);
        assert_eq!(b.graded(), 2);
        assert_eq!(b.pushes, 1);
        assert!((b.probability_sum - 1.2).abs() < 1e-12);
        assert!((b.staked - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_adds() {
        let mut a = BucketCounts::default();
        a.record(SettlementStatus::Hit, 0.7, 1.0, 1.0);
        let mut b = BucketCounts::default();
        b.record(SettlementStatus::Miss, 0.4, -1.0, 1.0);
        a.merge(&b);
        assert_eq!((a.hits, a.misses), (1, 1));
        assert!((a.profit_sum).abs() < 1e-12);
    }
}
