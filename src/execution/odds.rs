//! American odds <-> implied probability.
//!
//! Posted odds carry the book's margin, so the two sides of a market sum to
//! slightly more than 1. Nothing here removes the vig; edges are measured
//! against the price actually on offer.
use crate::errors::{EngineError, EngineResult};
use crate::state::{AmericanOdds, MarketOdds};

/// Added to the complement when a side's price is not posted.
const ESTIMATED_VIG: f64 = 0.05;

pub const PROBABILITY_FLOOR: f64 = 0.001;
pub const PROBABILITY_CEIL: f64 = 0.999;

/// Implied probability of a posted price.
/// +150 -> 0.40, -150 -> 0.60.
#[inline]
pub fn american_to_probability(odds: AmericanOdds) -> f64 {
    let o = odds.value() as f64;
    if o > 0.0 {
        100.0 / (o + 100.0)
    } else {
        o.abs() / (o.abs() + 100.0)
    }
}

/// Fair American price for a probability strictly inside (0, 1).
/// Rounded to the nearest whole price.
pub fn probability_to_american(p: f64) -> EngineResult<AmericanOdds> {
    if !(p > 0.0 && p < 1.0) {
        return Err(EngineError::InvalidInput(format!(
            "probability must be in (0, 1), got {p}"
        )));
    }
    let odds = if p >= 0.5 {
        -100.0 * p / (1.0 - p)
    } else {
        100.0 * (1.0 - p) / p
    };
    // i32 saturates on absurd tails; still a valid price.
    AmericanOdds::try_from(odds.round() as i32)
}

/// Market-implied probabilities for both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct MarketProbabilities {
    pub over: f64,
    pub under: f64,
    /// True when one side was derived from the other.
    pub estimated: bool,
}

pub fn market_probabilities(odds: &MarketOdds) -> EngineResult<MarketProbabilities> {
    let estimate = |p: f64| (1.0 - p + ESTIMATED_VIG).clamp(PROBABILITY_FLOOR, PROBABILITY_CEIL);
    match (odds.over, odds.under) {
        (Some(o), Some(u)) => Ok(MarketProbabilities {
            over: american_to_probability(o),
            under: american_to_probability(u),
            estimated: false,
        }),
        (Some(o), None) => {
            let over = american_to_probability(o);
            Ok(MarketProbabilities { over, under: estimate(over), estimated: true })
        }
        (None, Some(u)) => {
            let under = american_to_probability(u);
            Ok(MarketProbabilities { over: estimate(under), under, estimated: true })
        }
        (None, None) => Err(EngineError::InvalidInput("no odds posted for either side".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odds(v: i32) -> AmericanOdds {
        AmericanOdds::try_from(v).unwrap()
    }

    #[test]
    fn test_known_conversions() {
        assert!((american_to_probability(odds(150)) - 0.40).abs() < 1e-9);
        assert!((american_to_probability(odds(-150)) - 0.60).abs() < 1e-9);
        assert!((american_to_probability(odds(-110)) - 0.5238095238).abs() < 1e-9);
        assert!((american_to_probability(odds(-135)) - 0.574468).abs() < 1e-6);
        assert!((american_to_probability(odds(100)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_probability_to_american() {
        assert_eq!(probability_to_american(0.6).unwrap().value(), -150);
        assert_eq!(probability_to_american(0.4).unwrap().value(), 150);
        assert_eq!(probability_to_american(0.5).unwrap().value(), -100);
        assert!(probability_to_american(0.0).is_err());
        assert!(probability_to_american(1.0).is_err());
        assert!(probability_to_american(f64::NAN).is_err());
    }

    #[test]
    fn test_one_sided_market_estimates_other() {
        let m = market_probabilities(&MarketOdds { over: Some(odds(150)), under: None }).unwrap();
        assert!(m.estimated);
        assert!((m.under - 0.65).abs() < 1e-9);

        let m = market_probabilities(&MarketOdds { over: None, under: Some(odds(-150)) }).unwrap();
        assert!((m.over - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_empty_market_rejected() {
        let err = market_probabilities(&MarketOdds::default()).unwrap_err();
        assert!(err.is_rejection());
    }
}
