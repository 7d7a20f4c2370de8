//! Probability calibration over the replay.
//!
//! Graded records are bucketed into deciles of model probability. From those
//! we report the reliability table, the expected calibration error and an
//! isotonic (pool-adjacent-violators) recalibration map.
//!
//! PAV works in place on fixed-size arrays; no heap allocation.
use super::buckets::{BucketCounts, NUM_DECILES};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecileRow {
    pub lower: f64,
    pub upper: f64,
    pub samples: u64,
    pub mean_model_probability: Option<f64>,
    pub hit_rate: Option<f64>,
    /// mean_model_probability - hit_rate
    pub calibration_error: Option<f64>,
}

pub fn decile_table(deciles: &[BucketCounts; NUM_DECILES]) -> Vec<DecileRow> {
    deciles
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let n = b.graded();
            let (mean, rate) = if n > 0 {
                (Some(b.probability_sum / n as f64), Some(b.hits as f64 / n as f64))
            } else {
                (None, None)
            };
            DecileRow {
                lower: i as f64 / NUM_DECILES as f64,
                upper: (i + 1) as f64 / NUM_DECILES as f64,
                samples: n,
                mean_model_probability: mean,
                hit_rate: rate,
                calibration_error: mean.zip(rate).map(|(m, r)| m - r),
            }
        })
        .collect()
}

/// Sample-weighted mean |calibration error| across deciles with data.
pub fn expected_calibration_error(deciles: &[BucketCounts; NUM_DECILES]) -> f64 {
    let total: u64 = deciles.iter().map(|b| b.graded()).sum();
    if total == 0 {
        return 0.0;
    }
    deciles
        .iter()
        .filter(|b| b.graded() > 0)
        .map(|b| {
            let n = b.graded() as f64;
            let mean = b.probability_sum / n;
            let rate = b.hits as f64 / n;
            (mean - rate).abs() * n
        })
        .sum::<f64>()
        / total as f64
}

/// Isotonic recalibration map: one calibrated probability per decile,
/// non-decreasing in decile index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsotonicMap {
    pub calibrated: [f64; NUM_DECILES],
}

impl IsotonicMap {
    /// Fit with pool-adjacent-violators. Empty deciles sit at their midpoint
    /// with a small pseudo-weight so they bend to their neighbours.
    pub fn fit(deciles: &[BucketCounts; NUM_DECILES]) -> Self {
        let mut values = [0.0; NUM_DECILES];
        let mut weights = [0.0; NUM_DECILES];
        for (i, b) in deciles.iter().enumerate() {
            let n = b.graded();
            if n > 0 {
                values[i] = b.hits as f64 / n as f64;
                weights[i] = n as f64;
            } else {
                values[i] = (i as f64 + 0.5) / NUM_DECILES as f64;
                weights[i] = 0.1;
            }
        }

        // Pools as (value, weight, first decile, last decile), stack-allocated.
        let mut pool_val = values;
        let mut pool_wt = weights;
        let mut pool_start = [0usize; NUM_DECILES];
        let mut pool_end = [0usize; NUM_DECILES];
        for i in 0..NUM_DECILES {
            pool_start[i] = i;
            pool_end[i] = i;
        }
        let mut len = NUM_DECILES;

        let mut i = 0;
        while i + 1 < len {
            if pool_val[i] > pool_val[i + 1] {
                let wt = pool_wt[i] + pool_wt[i + 1];
                pool_val[i] = (pool_val[i] * pool_wt[i] + pool_val[i + 1] * pool_wt[i + 1]) / wt;
                pool_wt[i] = wt;
                pool_end[i] = pool_end[i + 1];
                for j in (i + 1)..(len - 1) {
                    pool_val[j] = pool_val[j + 1];
                    pool_wt[j] = pool_wt[j + 1];
                    pool_start[j] = pool_start[j + 1];
                    pool_end[j] = pool_end[j + 1];
                }
                len -= 1;
                // merged pool may now violate against its left neighbour
                i = i.saturating_sub(1);
            } else {
                i += 1;
            }
        }

        let mut calibrated = [0.0; NUM_DECILES];
        for p in 0..len {
            let val = pool_val[p].clamp(0.001, 0.999);
            for slot in calibrated.iter_mut().take(pool_end[p] + 1).skip(pool_start[p]) {
                *slot = val;
            }
        }
        Self { calibrated }
    }

    #[inline]
    pub fn apply(&self, prob: f64) -> f64 {
        self.calibrated[super::buckets::prob_to_decile(prob)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::SettlementStatus;

    fn fill(deciles: &mut [BucketCounts; NUM_DECILES], idx: usize, p: f64, hits: u64, misses: u64) {
        for _ in 0..hits {
            deciles[idx].record(SettlementStatus::Hit, p, 1.0, 1.0);
        }
        for _ in 0..misses {
            deciles[idx].record(SettlementStatus::Miss, p, -1.0, 1.0);
        }
    }

    #[test]
    fn test_perfectly_calibrated_has_zero_ece() {
        let mut d = [BucketCounts::default(); NUM_DECILES];
        fill(&mut d, 6, 0.65, 65, 35);
        fill(&mut d, 3, 0.35, 35, 65);
        assert!(expected_calibration_error(&d) < 1e-9);
        let table = decile_table(&d);
        assert_eq!(table[6].samples, 100);
        assert!(table[6].calibration_error.unwrap().abs() < 1e-9);
        assert_eq!(table[0].hit_rate, None);
    }

    #[test]
    fn test_overconfident_model() {
        let mut d = [BucketCounts::default(); NUM_DECILES];
        fill(&mut d, 8, 0.85, 50, 50);
        let ece = expected_calibration_error(&d);
        assert!((ece - 0.35).abs() < 1e-9);
        assert!(decile_table(&d)[8].calibration_error.unwrap() > 0.0);
    }

    #[test]
    fn test_pav_monotonicity() {
        let mut d = [BucketCounts::default(); NUM_DECILES];
        // inverted: high predictions hit less often
        fill(&mut d, 2, 0.25, 60, 40);
        fill(&mut d, 5, 0.55, 50, 50);
        fill(&mut d, 8, 0.85, 40, 60);
        let map = IsotonicMap::fit(&d);
        for i in 0..NUM_DECILES - 1 {
            assert!(
                map.calibrated[i] <= map.calibrated[i + 1] + 1e-12,
                "decile {i}={} > decile {}={}",
                map.calibrated[i],
                i + 1,
                map.calibrated[i + 1]
            );
        }
        // fully pooled around the overall 50%
        assert!((map.apply(0.85) - 0.5).abs() < 0.01, "{}", map.apply(0.85));
    }

    #[test]
    fn test_pav_keeps_monotone_input() {
        let mut d = [BucketCounts::default(); NUM_DECILES];
        fill(&mut d, 3, 0.35, 30, 70);
        fill(&mut d, 7, 0.75, 70, 30);
        let map = IsotonicMap::fit(&d);
        assert!((map.apply(0.35) - 0.30).abs() < 1e-9);
        assert!((map.apply(0.75) - 0.70).abs() < 1e-9);
    }
}
