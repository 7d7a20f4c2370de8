//! Matchup: quality of the opposing goaltender.
//! A weaker goalie leans over.
use super::{capped, weighted_mean, Signal, SignalKind};
use crate::state::{FormAssessment, PropContext, SignalResult};

const LEAGUE_AVG_SV_PCT: f64 = 0.905;
const LEAGUE_AVG_GAA: f64 = 2.90;
const ELITE_SV_PCT: f64 = 0.915;
const WEAK_SV_PCT: f64 = 0.890;
const ELITE_GAA: f64 = 2.20;
const WEAK_GAA: f64 = 3.50;
const ELITE_HD_SV_PCT: f64 = 0.850;
const WEAK_HD_SV_PCT: f64 = 0.800;
const MID_HD_SV_PCT: f64 = 0.825;

pub struct Matchup;

impl Signal for Matchup {
    fn kind(&self) -> SignalKind {
        SignalKind::Matchup
    }

    fn calculate(&self, ctx: &PropContext) -> SignalResult {
        let g = &ctx.goalie_matchup;
        let sv_pct = g.save_pct.filter(|v| v.is_finite());
        let gaa = g.gaa.filter(|v| v.is_finite());
        let hd_sv_pct = g.high_danger_save_pct.filter(|v| v.is_finite() && *v > 0.0);

        if sv_pct.is_none() && gaa.is_none() && g.form.is_none() && hd_sv_pct.is_none() {
            return SignalResult::missing(0.40, "no goalie matchup data");
        }

        let mut notes: Vec<String> = Vec::new();
        // (component, weight)
        let mut components: Vec<(f64, f64)> = Vec::with_capacity(4);

        if let Some(sv) = sv_pct {
            let c = if sv < WEAK_SV_PCT {
                notes.push(format!("weak SV% ({sv:.3})"));
                0.5
            } else if sv > ELITE_SV_PCT {
                notes.push(format!("elite SV% ({sv:.3})"));
                -0.5
            } else {
                capped((LEAGUE_AVG_SV_PCT - sv) / 0.025, 0.5)
            };
            components.push((c, 0.40));
        }

        if let Some(gaa) = gaa {
            let c = if gaa > WEAK_GAA {
                notes.push(format!("high GAA ({gaa:.2})"));
                0.3
            } else if gaa < ELITE_GAA {
                notes.push(format!("elite GAA ({gaa:.2})"));
                -0.3
            } else {
                capped((gaa - LEAGUE_AVG_GAA) / 0.6, 0.3)
            };
            components.push((c, 0.20));
        }

        if let Some(form) = g.form {
            let c = match form {
                FormAssessment::Cold => {
                    notes.push("goalie cold".into());
                    0.4
                }
                FormAssessment::Hot => {
                    notes.push("goalie hot".into());
                    -0.4
                }
                FormAssessment::Neutral => 0.0,
            };
            components.push((c, 0.20));
        }

        if let Some(hd) = hd_sv_pct {
            let c = if hd < WEAK_HD_SV_PCT {
                notes.push(format!("weak HD SV% ({hd:.3})"));
                0.4
            } else if hd > ELITE_HD_SV_PCT {
                notes.push(format!("elite HD SV% ({hd:.3})"));
                -0.4
            } else {
                capped((MID_HD_SV_PCT - hd) / 0.05, 0.4)
            };
            components.push((c, 0.20));
        }

        let strength = weighted_mean(&components) * 1.5;

        let mut confidence: f64 = if sv_pct.is_some() && gaa.is_some() { 0.85 } else { 0.65 };
        if g.form.is_some() || hd_sv_pct.is_some() {
            confidence = (confidence + 0.10).min(0.95);
        }
        match g.confirmed {
            Some(true) => confidence += 0.05,
            Some(false) => confidence -= 0.10,
            None => {}
        }

        let who = match &g.goalie_name {
            Some(name) => format!("vs {name}"),
            None => format!("vs {} goalie", ctx.opponent),
        };
        let label = if strength > 0.2 {
            "vulnerable"
        } else if strength < -0.2 {
            "strong"
        } else {
            "average"
        };
        let mut evidence = format!("{who} ({label})");
        if !notes.is_empty() {
            evidence.push_str(" - ");
            evidence.push_str(&notes.join(", "));
        }
        SignalResult::new(strength, confidence, evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::points_prop;
    use crate::state::GoalieMatchup;

    #[test]
    fn test_weak_goalie_leans_over() {
        let r = Matchup.calculate(&points_prop());
        // sv 0.897 -> 0.32, gaa 3.10 -> 0.333 capped 0.3
        let expected = (0.32 * 0.4 + 0.3 * 0.2) / 0.6 * 1.5;
        assert!((r.strength - expected).abs() < 1e-9, "{}", r.strength);
        assert!((r.confidence - 0.90).abs() < 1e-9);
        assert!(r.evidence.contains("Backup Goalie"));
    }

    #[test]
    fn test_elite_hot_goalie_leans_under() {
        let mut ctx = points_prop();
        ctx.goalie_matchup = GoalieMatchup {
            save_pct: Some(0.925),
            gaa: Some(2.0),
            form: Some(FormAssessment::Hot),
            high_danger_save_pct: Some(0.87),
            ..Default::default()
        };
        let r = Matchup.calculate(&ctx);
        // (-0.5*0.4 - 0.3*0.2 - 0.4*0.2 - 0.4*0.2) / 1.0 * 1.5
        assert!((r.strength - (-0.63)).abs() < 1e-9, "{}", r.strength);
        assert!((r.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_unconfirmed_starter_lowers_confidence() {
        let mut ctx = points_prop();
        ctx.goalie_matchup.confirmed = Some(false);
        let r = Matchup.calculate(&ctx);
        assert!((r.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_nothing_known() {
        let mut ctx = points_prop();
        ctx.goalie_matchup = GoalieMatchup::default();
        let r = Matchup.calculate(&ctx);
        assert_eq!((r.strength, r.confidence), (0.0, 0.40));
    }
}
