//! Game totals: expected combined score against the totals line.
use super::{capped, weighted_mean, Signal, SignalKind};
use crate::state::{PropContext, SignalResult, StatType, TeamScoring};

const AVG_GOALS_PER_TEAM: f64 = 3.0;
const AVG_GAA: f64 = 2.90;
const HIGH_SCORING_GPG: f64 = 3.5;
const LOW_SCORING_GPG: f64 = 2.5;
const ELITE_GAA: f64 = 2.50;
const POOR_GAA: f64 = 3.30;

const LEAGUE_AVERAGE_TEAM: TeamScoring = TeamScoring {
    goals_per_game: AVG_GOALS_PER_TEAM,
    goals_against_per_game: AVG_GOALS_PER_TEAM,
    goalie_gaa: None,
};

pub struct GameTotals;

impl Signal for GameTotals {
    fn kind(&self) -> SignalKind {
        SignalKind::GameTotals
    }

    fn calculate(&self, ctx: &PropContext) -> SignalResult {
        if ctx.stat_type != StatType::Totals {
            return SignalResult::not_applicable(format!("game totals n/a for {}", ctx.stat_type));
        }

        let profile = &ctx.team_profile;
        let home = profile.home.unwrap_or(LEAGUE_AVERAGE_TEAM);
        let away = profile.away.unwrap_or(LEAGUE_AVERAGE_TEAM);

        let home_expected = (home.goals_per_game + away.goals_against_per_game) / 2.0;
        let away_expected = (away.goals_per_game + home.goals_against_per_game) / 2.0;
        let expected_total = home_expected + away_expected;
        let total_diff = expected_total - ctx.line;
        let line_component = capped(total_diff / ctx.line * 5.0, 1.0);

        let combined_offense = (home.goals_per_game + away.goals_per_game) / 2.0;
        let offense_component = if combined_offense >= HIGH_SCORING_GPG {
            0.5
        } else if combined_offense <= LOW_SCORING_GPG {
            -0.5
        } else {
            capped(
                (combined_offense - AVG_GOALS_PER_TEAM) / (HIGH_SCORING_GPG - AVG_GOALS_PER_TEAM),
                0.5,
            )
        };

        let combined_gaa =
            (home.goalie_gaa.unwrap_or(AVG_GAA) + away.goalie_gaa.unwrap_or(AVG_GAA)) / 2.0;
        let goalie_component = if combined_gaa >= POOR_GAA {
            0.4
        } else if combined_gaa <= ELITE_GAA {
            -0.4
        } else {
            capped((combined_gaa - AVG_GAA) / (POOR_GAA - AVG_GAA), 0.4)
        };

        let strength = weighted_mean(&[
            (line_component, 0.50),
            (offense_component, 0.25),
            (goalie_component, 0.25),
        ]);

        let mut confidence = 0.75;
        if profile.home.is_none() {
            confidence -= 0.15;
        }
        if profile.away.is_none() {
            confidence -= 0.15;
        }

        let evidence = format!(
            "expected total {expected_total:.2} vs line {} ({:+.2}); offense {combined_offense:.2} GPG, goalies {combined_gaa:.2} GAA",
            ctx.line, total_diff
        );
        SignalResult::new(strength, confidence, evidence)
    }
}
