//! Goalie saves: expected workload against the saves line.
//! Applies to saves props on goaltenders only.
use super::{capped, weighted_mean, Signal, SignalKind};
use crate::state::{FormAssessment, PropContext, SignalResult, StatType};

const AVG_SOG_PER_GAME: f64 = 30.0;
const AVG_SAVE_PCT: f64 = 0.905;
const ELITE_SAVE_PCT: f64 = 0.920;
const WEAK_SAVE_PCT: f64 = 0.890;
const HIGH_WORKLOAD_SOG: f64 = 34.0;
const LOW_WORKLOAD_SOG: f64 = 26.0;

pub struct GoalieSaves;

impl Signal for GoalieSaves {
    fn kind(&self) -> SignalKind {
        SignalKind::GoalieSaves
    }

    fn calculate(&self, ctx: &PropContext) -> SignalResult {
        if ctx.stat_type != StatType::Saves {
            return SignalResult::not_applicable(format!("goalie saves n/a for {}", ctx.stat_type));
        }
        if ctx.position.is_some() && !ctx.is_goalie() {
            return SignalResult::not_applicable("saves prop on a non-goalie");
        }

        let w = &ctx.workload;
        let observed_sog = w.opponent_shots_per_game.filter(|v| v.is_finite() && *v > 0.0);
        let opponent_sog = observed_sog.unwrap_or(AVG_SOG_PER_GAME);
        let save_pct = w
            .save_pct
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(AVG_SAVE_PCT);
        let form = w.form.unwrap_or(FormAssessment::Neutral);

        let expected_saves = opponent_sog * save_pct;
        let saves_diff = expected_saves - ctx.line;
        let line_component = capped(saves_diff / ctx.line * 5.0, 1.0);

        let workload_component = if opponent_sog >= HIGH_WORKLOAD_SOG {
            0.5
        } else if opponent_sog <= LOW_WORKLOAD_SOG {
            -0.5
        } else {
            capped(
                (opponent_sog - AVG_SOG_PER_GAME) / (HIGH_WORKLOAD_SOG - AVG_SOG_PER_GAME),
                0.5,
            )
        };

        let form_component = match form {
            FormAssessment::Hot => 0.4,
            FormAssessment::Cold => -0.4,
            FormAssessment::Neutral if save_pct >= ELITE_SAVE_PCT => 0.3,
            FormAssessment::Neutral if save_pct <= WEAK_SAVE_PCT => -0.3,
            FormAssessment::Neutral => 0.0,
        };

        let strength = weighted_mean(&[
            (line_component, 0.50),
            (workload_component, 0.25),
            (form_component, 0.25),
        ]);

        let mut confidence = 0.75;
        if observed_sog.is_none() {
            confidence -= 0.15;
        }
        if form == FormAssessment::Neutral {
            confidence -= 0.10;
        }

        let lean = if strength > 0.1 {
            "over"
        } else if strength < -0.1 {
            "under"
        } else {
            "neutral"
        };
        let evidence = format!(
            "expected {expected_saves:.1} saves vs line {} ({lean}); opponent {opponent_sog:.1} SOG/gm, SV% {save_pct:.3}",
            ctx.line
        );
        SignalResult::new(strength, confidence, evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::{points_prop, saves_prop};
    use crate::state::GoalieWorkload;

    #[test]
    fn test_heavy_workload_hot_goalie() {
        let ctx = saves_prop(
            26.5,
            GoalieWorkload {
                opponent_shots_per_game: Some(35.0),
                save_pct: Some(0.915),
                form: Some(FormAssessment::Hot),
            },
        );
        let r = GoalieSaves.calculate(&ctx);
        assert!(r.strength > 0.5, "{}", r.strength);
        assert!((r.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_defaults_when_unknown() {
        let ctx = saves_prop(30.5, GoalieWorkload::default());
        let r = GoalieSaves.calculate(&ctx);
        // 30 * 0.905 = 27.15 vs 30.5
        assert!(r.strength < -0.1, "{}", r.strength);
        assert!((r.confidence - 0.50).abs() < 1e-9);
    }

    #[test]
    fn test_skater_is_not_applicable() {
        let mut ctx = saves_prop(25.5, GoalieWorkload::default());
        ctx.position = Some("C".into());
        assert_eq!(GoalieSaves.calculate(&ctx).confidence, 0.0);

        let points = points_prop();
        assert_eq!(GoalieSaves.calculate(&points).confidence, 0.0);
    }
}
