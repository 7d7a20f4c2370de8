//! Usage: deployment and opportunity.
//! First-line, first-unit power play and heavy minutes lean over.
use super::{Signal, SignalKind};
use crate::state::{PropContext, SignalResult};

const ELITE_TOI: f64 = 22.0;
const AVG_TOI: f64 = 15.0;
const LIMITED_TOI: f64 = 12.0;
/// Second line without power play.
const NEUTRAL_OPPORTUNITY: f64 = 0.7;

#[inline]
fn line_score(line_number: u8) -> f64 {
    match line_number {
        1 => 1.0,
        2 => 0.70,
        3 => 0.40,
        _ => 0.15,
    }
}

#[inline]
fn pp_bonus(pp_unit: u8) -> f64 {
    match pp_unit {
        1 => 0.30,
        2 => 0.15,
        _ => 0.0,
    }
}

pub struct Usage;

impl Signal for Usage {
    fn kind(&self) -> SignalKind {
        SignalKind::Usage
    }

    fn calculate(&self, ctx: &PropContext) -> SignalResult {
        let d = &ctx.deployment;
        let Some(line_number) = d.line_number else {
            return SignalResult::missing(0.40, "no deployment data");
        };
        let pp_unit = d.pp_unit.unwrap_or(0);
        let toi = d.avg_toi_minutes.filter(|t| t.is_finite() && *t > 0.0);

        let toi_factor = match toi {
            Some(t) if t >= ELITE_TOI => 0.2,
            Some(t) if t >= AVG_TOI => 0.1,
            Some(t) if t < LIMITED_TOI => -0.2,
            _ => 0.0,
        };

        let opportunity = line_score(line_number) + pp_bonus(pp_unit) + toi_factor;
        let strength = (opportunity - NEUTRAL_OPPORTUNITY) / 0.6;
        let confidence = if toi.is_some() { 0.85 } else { 0.70 };

        let label = if strength > 0.3 {
            "elevated"
        } else if strength < -0.3 {
            "limited"
        } else {
            "stable"
        };
        let pp = match pp_unit {
            1 | 2 => format!(" + PP{pp_unit}"),
            _ => String::new(),
        };
        let mut evidence = format!("line {line_number}{pp} deployment ({label})");
        if let Some(t) = toi {
            evidence.push_str(&format!(", {t:.1} min TOI"));
        }
        SignalResult::new(strength, confidence, evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::points_prop;
    use crate::state::Deployment;

    #[test]
    fn test_top_deployment_saturates() {
        let r = Usage.calculate(&points_prop());
        // 1.0 + 0.3 + 0.2 = 1.5 -> (1.5 - 0.7) / 0.6 > 1
        assert_eq!(r.strength, 1.0);
        assert_eq!(r.confidence, 0.85);
    }

    #[test]
    fn test_fourth_line_without_toi() {
        let mut ctx = points_prop();
        ctx.deployment = Deployment { line_number: Some(4), pp_unit: None, avg_toi_minutes: None };
        let r = Usage.calculate(&ctx);
        assert!((r.strength - (0.15 - 0.7) / 0.6).abs() < 1e-9);
        assert_eq!(r.confidence, 0.70);
    }

    #[test]
    fn test_second_line_is_neutral() {
        let mut ctx = points_prop();
        ctx.deployment = Deployment { line_number: Some(2), pp_unit: Some(0), avg_toi_minutes: Some(13.0) };
        assert!(Usage.calculate(&ctx).strength.abs() < 1e-9);
    }

    #[test]
    fn test_missing_line_number() {
        let mut ctx = points_prop();
        ctx.deployment = Deployment::default();
        let r = Usage.calculate(&ctx);
        assert_eq!((r.strength, r.confidence), (0.0, 0.40));
    }
}
