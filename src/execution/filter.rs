use super::edge::EdgeResult;
use crate::config::Cutoffs;
use serde::Serialize;

/// Production filter result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterCheck {
    /// Prop clears every cutoff
    Allowed,
    /// Blocked with reason
    Blocked(&'static str),
}

impl FilterCheck {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, FilterCheck::Allowed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeTier {
    Standard,
    High,
    Elite,
}

#[inline]
pub fn edge_tier(result: &EdgeResult, cutoffs: &Cutoffs) -> EdgeTier {
    if result.edge_pct >= cutoffs.elite_edge_pct {
        EdgeTier::Elite
    } else if result.edge_pct >= cutoffs.high_edge_pct {
        EdgeTier::High
    } else {
        EdgeTier::Standard
    }
}

/// Check downstream cutoffs before a prop is surfaced.
/// Pure function, no side effects.
#[inline]
pub fn check(result: &EdgeResult, cutoffs: &Cutoffs) -> FilterCheck {
    // 1. Non-finite numbers never leave the engine
    if !result.edge_pct.is_finite() || !result.confidence.is_finite() {
        return FilterCheck::Blocked("non-finite edge");
    }

    // 2. Only positive edges are playable
    if result.edge_pct <= 0.0 {
        return FilterCheck::Blocked("no positive edge");
    }

    // 3. Minimum edge
    if !result.has_edge(cutoffs.min_edge_pct) {
        return FilterCheck::Blocked("edge below minimum");
    }

    // 4. Minimum confidence
    if result.confidence < cutoffs.min_confidence {
        return FilterCheck::Blocked("confidence below minimum");
    }

    FilterCheck::Allowed
}

/// Allowed results, best edge first. Ties keep input order.
pub fn rank(results: Vec<EdgeResult>, cutoffs: &Cutoffs) -> Vec<EdgeResult> {
    let mut allowed: Vec<EdgeResult> = results
        .into_iter()
        .filter(|r| check(r, cutoffs).is_allowed())
        .collect();
    allowed.sort_by(|a, b| b.edge_pct.total_cmp(&a.edge_pct));
    allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeagueConfig;
    use crate::execution::edge::EdgeCalculator;
    use crate::state::fixtures::points_prop;
    use crate::state::League;

    fn result_with(edge_pct: f64, confidence: f64) -> EdgeResult {
        let mut r = EdgeCalculator::new(League::Nhl, LeagueConfig::default())
            .evaluate(&points_prop())
            .unwrap();
        r.edge_pct = edge_pct;
        r.confidence = confidence;
        r
    }

    #[test]
    fn test_cutoffs() {
        let c = Cutoffs::default();
        assert!(check(&result_with(6.0, 0.7), &c).is_allowed());
        assert_eq!(check(&result_with(4.0, 0.7), &c), FilterCheck::Blocked("edge below minimum"));
        assert_eq!(check(&result_with(9.0, 0.5), &c), FilterCheck::Blocked("confidence below minimum"));
        assert_eq!(check(&result_with(-9.0, 0.9), &c), FilterCheck::Blocked("no positive edge"));
        assert!(!check(&result_with(f64::NAN, 0.9), &c).is_allowed());
    }

    #[test]
    fn test_edge_at_minimum_passes() {
        let c = Cutoffs::default();
        let at_floor = result_with(c.min_edge_pct, 0.7);
        assert!(at_floor.has_edge(c.min_edge_pct));
        assert!(check(&at_floor, &c).is_allowed());
        let just_under = result_with(c.min_edge_pct - 1e-9, 0.7);
        assert_eq!(check(&just_under, &c), FilterCheck::Blocked("edge below minimum"));
        // A large negative edge clears has_edge on magnitude but is still not playable
        let negative = result_with(-(c.min_edge_pct + 3.0), 0.9);
        assert!(negative.has_edge(c.min_edge_pct));
        assert_eq!(check(&negative, &c), FilterCheck::Blocked("no positive edge"));
    }

    #[test]
    fn test_tiers() {
        let c = Cutoffs::default();
        assert_eq!(edge_tier(&result_with(5.5, 0.7), &c), EdgeTier::Standard);
        assert_eq!(edge_tier(&result_with(8.0, 0.7), &c), EdgeTier::High);
        assert_eq!(edge_tier(&result_with(12.5, 0.7), &c), EdgeTier::Elite);
    }

    #[test]
    fn test_rank_orders_by_edge() {
        let c = Cutoffs::default();
        let ranked = rank(
            vec![result_with(6.0, 0.7), result_with(2.0, 0.9), result_with(11.0, 0.8)],
            &c,
        );
        let edges: Vec<f64> = ranked.iter().map(|r| r.edge_pct).collect();
        assert_eq!(edges, vec![11.0, 6.0]);
    }
}
