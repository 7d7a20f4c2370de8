use super::buckets::{Accumulator, BucketCounts, EdgeBucket, SignalSplit};
use super::calibration::{decile_table, expected_calibration_error, DecileRow, IsotonicMap};
use super::stats::{binomial_p_value, wilson_interval, z_for_confidence};
use super::BacktestOptions;
use crate::signals::SignalKind;
use crate::state::League;
use serde::{Deserialize, Serialize};

/// Reported statistics for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub label: String,
    /// Hits + misses. Pushes and voids never enter a denominator.
    pub samples: u64,
    pub hits: u64,
    pub misses: u64,
    pub pushes: u64,
    pub hit_rate: Option<f64>,
    pub wilson_low: f64,
    pub wilson_high: f64,
    /// Two-sided binomial test against a coin flip.
    pub p_value: f64,
    pub mean_model_probability: Option<f64>,
    pub calibration_error: Option<f64>,
    pub profit: f64,
    pub roi: Option<f64>,
    pub significant: bool,
}

impl BucketStats {
    pub fn from_counts(label: impl Into<String>, c: &BucketCounts, options: &BacktestOptions) -> Self {
        let n = c.graded();
        let z = z_for_confidence(1.0 - options.significance_alpha);
        let (wilson_low, wilson_high) = wilson_interval(c.hits, n, z);
        let p_value = binomial_p_value(c.hits, n, 0.5);
        let (hit_rate, mean_p) = if n > 0 {
            (Some(c.hits as f64 / n as f64), Some(c.probability_sum / n as f64))
        } else {
            (None, None)
        };
        let roi = (c.staked > 0.0).then(|| c.profit_sum / c.staked);
        Self {
            label: label.into(),
            samples: n,
            hits: c.hits,
            misses: c.misses,
            pushes: c.pushes,
            hit_rate,
            wilson_low,
            wilson_high,
            p_value,
            mean_model_probability: mean_p,
            calibration_error: mean_p.zip(hit_rate).map(|(m, r)| m - r),
            profit: c.profit_sum,
            roi,
            significant: n >= options.min_bucket_samples && p_value < options.significance_alpha,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDiagnostic {
    pub signal: SignalKind,
    pub positive: BucketStats,
    pub neutral: BucketStats,
    pub negative: BucketStats,
    /// |hit_rate(positive) - hit_rate(negative)|. None when either side is empty.
    pub predictive_value: Option<f64>,
}

impl SignalDiagnostic {
    fn from_split(signal: SignalKind, split: &SignalSplit, options: &BacktestOptions) -> Self {
        let positive = BucketStats::from_counts("positive", &split.positive, options);
        let neutral = BucketStats::from_counts("neutral", &split.neutral, options);
        let negative = BucketStats::from_counts("negative", &split.negative, options);
        let predictive_value = positive
            .hit_rate
            .zip(negative.hit_rate)
            .map(|(p, n)| (p - n).abs());
        Self { signal, positive, neutral, negative, predictive_value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub league: League,
    pub total_records: u64,
    pub evaluated: u64,
    pub rejected: u64,
    pub pending: u64,
    pub voids: u64,
    pub rounding_adjusted: u64,
    pub overall: BucketStats,
    pub by_edge: Vec<BucketStats>,
    pub by_stat: Vec<BucketStats>,
    pub by_direction: Vec<BucketStats>,
    pub by_contrarian: Vec<BucketStats>,
    pub deciles: Vec<DecileRow>,
    pub expected_calibration_error: f64,
    pub isotonic: IsotonicMap,
    /// Sorted by predictive value, strongest first.
    pub signals: Vec<SignalDiagnostic>,
}

impl BacktestSummary {
    pub fn from_accumulator(league: League, acc: &Accumulator, options: &BacktestOptions) -> Self {
        let empty = BucketCounts::default();
        let by_edge = EdgeBucket::ALL
            .iter()
            .map(|b| BucketStats::from_counts(b.label(), acc.by_edge.get(b).unwrap_or(&empty), options))
            .collect();
        let by_stat = acc
            .by_stat
            .iter()
            .map(|(k, c)| BucketStats::from_counts(k.as_str(), c, options))
            .collect();
        let by_direction = acc
            .by_direction
            .iter()
            .map(|(k, c)| BucketStats::from_counts(k.to_string(), c, options))
            .collect();
        let by_contrarian = acc
            .by_contrarian
            .iter()
            .map(|(flipped, c)| {
                let label = if *flipped { "contrarian" } else { "model" };
                BucketStats::from_counts(label, c, options)
            })
            .collect();

        let mut signals: Vec<SignalDiagnostic> = acc
            .by_signal
            .iter()
            .map(|(k, split)| SignalDiagnostic::from_split(*k, split, options))
            .collect();
        // None sorts last; ties keep signal order.
        signals.sort_by(|a, b| {
            let a = a.predictive_value.unwrap_or(f64::NEG_INFINITY);
            let b = b.predictive_value.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });

        Self {
            league,
            total_records: acc.total_records,
            evaluated: acc.total_records - acc.rejected,
            rejected: acc.rejected,
            pending: acc.pending,
            voids: acc.voids,
            rounding_adjusted: acc.rounding_adjusted,
            overall: BucketStats::from_counts("overall", &acc.overall, options),
            by_edge,
            by_stat,
            by_direction,
            by_contrarian,
            deciles: decile_table(&acc.deciles),
            expected_calibration_error: expected_calibration_error(&acc.deciles),
            isotonic: IsotonicMap::fit(&acc.deciles),
            signals,
        }
    }

    /// Buckets that cleared both the sample floor and the significance test.
    pub fn significant_buckets(&self) -> impl Iterator<Item = &BucketStats> {
        self.by_edge
            .iter()
            .chain(self.by_stat.iter())
            .chain(self.by_direction.iter())
            .chain(self.by_contrarian.iter())
            .filter(|b| b.significant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::SettlementStatus;

    fn counts(hits: u64, misses: u64, p: f64) -> BucketCounts {
        let mut c = BucketCounts::default();
        for _ in 0..hits {
            c.record(SettlementStatus::Hit, p, 0.9, 1.0);
        }
        for _ in 0..misses {
            c.record(SettlementStatus::Miss, p, -1.0, 1.0);
        }
        c
    }

    #[test]
    fn test_bucket_stats_values() {
        let opts = BacktestOptions::default();
        let s = BucketStats::from_counts("x", &counts(70, 30, 0.6), &opts);
        assert_eq!(s.samples, 100);
        assert!((s.hit_rate.unwrap() - 0.7).abs() < 1e-12);
        assert!((s.calibration_error.unwrap() - (0.6 - 0.7)).abs() < 1e-9);
        // 70 * 0.9 - 30 = 33 over 100 staked
        assert!((s.roi.unwrap() - 0.33).abs() < 1e-9);
        assert!(s.wilson_low < 0.7 && s.wilson_high > 0.7);
        assert!(s.p_value < 0.05);
        assert!(s.significant);
    }

    #[test]
    fn test_small_bucket_not_significant() {
        let opts = BacktestOptions::default();
        // 10/10 is p < 0.01 but below the sample floor
        let s = BucketStats::from_counts("x", &counts(10, 0, 0.6), &opts);
        assert!(s.p_value < 0.01);
        assert!(!s.significant);
    }

    #[test]
    fn test_empty_bucket() {
        let opts = BacktestOptions::default();
        let s = BucketStats::from_counts("x", &BucketCounts::default(), &opts);
        assert_eq!(s.samples, 0);
        assert_eq!(s.hit_rate, None);
        assert_eq!(s.roi, None);
        assert_eq!((s.wilson_low, s.wilson_high), (0.0, 1.0));
        assert!(!s.significant);
    }

    #[test]
    fn test_signal_diagnostics_sorted() {
        let opts = BacktestOptions::default();
        let mut acc = Accumulator::new();
        let strong = SignalSplit {
            positive: counts(40, 10, 0.6),
            neutral: BucketCounts::default(),
            negative: counts(10, 40, 0.6),
        };
        let weak = SignalSplit {
            positive: counts(26, 24, 0.6),
            neutral: BucketCounts::default(),
            negative: counts(24, 26, 0.6),
        };
        let one_sided = SignalSplit {
            positive: counts(30, 20, 0.6),
            ..Default::default()
        };
        acc.by_signal.insert(SignalKind::LineValue, weak);
        acc.by_signal.insert(SignalKind::Usage, strong);
        acc.by_signal.insert(SignalKind::Trend, one_sided);

        let summary = BacktestSummary::from_accumulator(League::Nhl, &acc, &opts);
        let order: Vec<SignalKind> = summary.signals.iter().map(|d| d.signal).collect();
        assert_eq!(order, vec![SignalKind::Usage, SignalKind::LineValue, SignalKind::Trend]);
        assert!((summary.signals[0].predictive_value.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(summary.signals[2].predictive_value, None);
        assert_eq!(summary.by_edge.len(), EdgeBucket::ALL.len());
    }
}
