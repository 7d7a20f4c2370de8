//! Environment: rest, back-to-backs and venue.
use super::{Signal, SignalKind};
use crate::state::{PropContext, SignalResult};

const B2B_PENALTY: f64 = -0.9;
const RESTED_BONUS: f64 = 0.3;
const HOME_BONUS: f64 = 0.2;
const AWAY_PENALTY: f64 = -0.1;

pub struct Environment;

impl Signal for Environment {
    fn kind(&self) -> SignalKind {
        SignalKind::Environment
    }

    fn calculate(&self, ctx: &PropContext) -> SignalResult {
        let s = &ctx.situation;
        let mut strength = 0.0;
        let mut notes: Vec<String> = Vec::new();

        if s.is_b2b == Some(true) {
            strength += B2B_PENALTY;
            notes.push("back-to-back".into());
        }
        if let Some(days) = s.days_rest.filter(|d| *d >= 3) {
            strength += RESTED_BONUS;
            notes.push(format!("rested ({days} days)"));
        }
        match s.is_home {
            Some(true) => {
                strength += HOME_BONUS;
                notes.push("home".into());
            }
            Some(false) => {
                strength += AWAY_PENALTY;
                notes.push("away".into());
            }
            None => {}
        }

        let confidence = if s.is_b2b.is_none() && s.days_rest.is_none() {
            0.50
        } else {
            0.80
        };
        let evidence = if notes.is_empty() {
            "no situational factors".to_string()
        } else {
            notes.join(", ")
        };
        SignalResult::new(strength, confidence, evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::points_prop;
    use crate::state::Situation;

    #[test]
    fn test_rested_home() {
        let r = Environment.calculate(&points_prop());
        assert!((r.strength - 0.5).abs() < 1e-9);
        assert_eq!(r.confidence, 0.80);
    }

    #[test]
    fn test_b2b_away_floors() {
        let mut ctx = points_prop();
        ctx.situation = Situation { is_home: Some(false), is_b2b: Some(true), days_rest: Some(0) };
        let r = Environment.calculate(&ctx);
        assert!((r.strength - (-1.0)).abs() < 1e-9);
        assert!(r.evidence.contains("back-to-back"));
    }

    #[test]
    fn test_unknown_rest_lowers_confidence() {
        let mut ctx = points_prop();
        ctx.situation = Situation { is_home: Some(true), is_b2b: None, days_rest: None };
        let r = Environment.calculate(&ctx);
        assert_eq!(r.confidence, 0.50);
        assert!((r.strength - 0.2).abs() < 1e-9);
    }
}
