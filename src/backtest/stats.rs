use statrs::distribution::{Binomial, ContinuousCDF, DiscreteCDF, Normal};

/// Two-sided z for a confidence level, e.g. 0.95 -> 1.96.
pub fn z_for_confidence(level: f64) -> f64 {
    let level = level.clamp(0.5, 0.9999);
    let normal = Normal::new(0.0, 1.0).unwrap_or(Normal::standard());
    normal.inverse_cdf(0.5 + level / 2.0)
}

/// Wilson score interval for `hits` successes in `n` trials.
/// Returns (0, 1) when there is no data.
pub fn wilson_interval(hits: u64, n: u64, z: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 1.0);
    }
    let n_f = n as f64;
    let p = hits as f64 / n_f;
    let z2 = z * z;
    let denom = 1.0 + z2 / n_f;
    let centre = (p + z2 / (2.0 * n_f)) / denom;
    let half = z * ((p * (1.0 - p) / n_f) + z2 / (4.0 * n_f * n_f)).sqrt() / denom;
    ((centre - half).max(0.0), (centre + half).min(1.0))
}

/// Two-sided exact binomial test of `hits` in `n` against rate `p0`.
/// p = min(1, 2 * min(P(X <= k), P(X >= k))).
pub fn binomial_p_value(hits: u64, n: u64, p0: f64) -> f64 {
    if n == 0 {
        return 1.0;
    }
    let Ok(dist) = Binomial::new(p0, n) else {
        return 1.0;
    };
    let lower = dist.cdf(hits);
    let upper = if hits == 0 { 1.0 } else { dist.sf(hits - 1) };
    (2.0 * lower.min(upper)).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_z_95() {
        assert!((z_for_confidence(0.95) - 1.959964).abs() < 1e-5);
    }

    #[test]
    fn test_wilson_known_value() {
        // 60/100 at 95%: (0.5020, 0.6906)
        let (lo, hi) = wilson_interval(60, 100, 1.959964);
        assert!((lo - 0.5020).abs() < 1e-3, "{lo}");
        assert!((hi - 0.6906).abs() < 1e-3, "{hi}");
    }

    #[test]
    fn test_wilson_bounds() {
        assert_eq!(wilson_interval(0, 0, 1.96), (0.0, 1.0));
        let (lo, hi) = wilson_interval(0, 10, 1.96);
        assert_eq!(lo, 0.0);
        assert!(hi > 0.0 && hi < 0.4);
        let (lo, hi) = wilson_interval(10, 10, 1.96);
        assert!(lo > 0.6);
        assert!(hi <= 1.0);
    }

    #[test]
    fn test_binomial_p_value() {
        assert!((binomial_p_value(5, 10, 0.5) - 1.0).abs() < 1e-9);
        // 10/10 heads: 2 * 0.5^10
        assert!((binomial_p_value(10, 10, 0.5) - 2.0 / 1024.0).abs() < 1e-9);
        assert!((binomial_p_value(0, 10, 0.5) - 2.0 / 1024.0).abs() < 1e-9);
        assert!(binomial_p_value(60, 100, 0.5) > 0.05);
        assert!(binomial_p_value(65, 100, 0.5) < 0.05);
        assert_eq!(binomial_p_value(0, 0, 0.5), 1.0);
    }
}
