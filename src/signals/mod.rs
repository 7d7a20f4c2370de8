pub mod line_value;
pub mod trend;
pub mod usage;
pub mod matchup;
pub mod environment;
pub mod correlation;
pub mod shot_quality;
pub mod goalie_saves;
pub mod game_totals;

use crate::errors::EngineError;
use crate::state::{League, PropContext, SignalResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// All signals implement this trait.
/// calculate() must be a pure function of the context: no I/O, no hidden state.
/// Missing inputs lower the returned confidence; it never fails.
/// Send + Sync required for use across backtest workers.
pub trait Signal: Send + Sync {
    fn kind(&self) -> SignalKind;

    fn calculate(&self, ctx: &PropContext) -> SignalResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    LineValue,
    Trend,
    Usage,
    Matchup,
    Environment,
    Correlation,
    ShotQuality,
    GoalieSaves,
    GameTotals,
}

impl SignalKind {
    pub const ALL: [SignalKind; 9] = [
        Self::LineValue,
        Self::Trend,
        Self::Usage,
        Self::Matchup,
        Self::Environment,
        Self::Correlation,
        Self::ShotQuality,
        Self::GoalieSaves,
        Self::GameTotals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LineValue => "line_value",
            Self::Trend => "trend",
            Self::Usage => "usage",
            Self::Matchup => "matchup",
            Self::Environment => "environment",
            Self::Correlation => "correlation",
            Self::ShotQuality => "shot_quality",
            Self::GoalieSaves => "goalie_saves",
            Self::GameTotals => "game_totals",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| EngineError::Parse(format!("unknown signal: {s}")))
    }
}

// ── Registry ──

static NHL_SIGNALS: [&dyn Signal; 9] = [
    &line_value::LineValue,
    &trend::Trend,
    &usage::Usage,
    &matchup::Matchup,
    &environment::Environment,
    &correlation::Correlation,
    &shot_quality::ShotQuality,
    &goalie_saves::GoalieSaves,
    &game_totals::GameTotals,
];

static CORE_SIGNALS: [&dyn Signal; 6] = [
    &line_value::LineValue,
    &trend::Trend,
    &usage::Usage,
    &matchup::Matchup,
    &environment::Environment,
    &correlation::Correlation,
];

/// Fixed signal list for a league, in evaluation order.
pub fn signal_set(league: League) -> &'static [&'static dyn Signal] {
    match league {
        League::Nhl => &NHL_SIGNALS,
        League::Nba | League::Nfl => &CORE_SIGNALS,
    }
}

// ── Shared mapping helpers ──

/// Maps a relative deviation to a strength.
/// |deviation| below `deadband` is noise and maps to 0; `full_scale` maps to ±1.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DeviationScale {
    pub deadband: f64,
    pub full_scale: f64,
}

impl DeviationScale {
    #[inline]
    pub fn strength(&self, deviation: f64) -> f64 {
        if !deviation.is_finite() || deviation.abs() < self.deadband {
            return 0.0;
        }
        (deviation / self.full_scale).clamp(-1.0, 1.0)
    }
}

/// Confidence from season sample size.
#[inline]
pub fn sample_confidence(games: Option<u32>) -> f64 {
    match games.unwrap_or(0) {
        g if g >= 20 => 0.90,
        g if g >= 10 => 0.80,
        g if g >= 5 => 0.65,
        _ => 0.40,
    }
}

/// Mean of (component, weight) pairs. Zero when nothing was observed.
#[inline]
pub(crate) fn weighted_mean(components: &[(f64, f64)]) -> f64 {
    let total: f64 = components.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return 0.0;
    }
    components.iter().map(|(c, w)| c * w).sum::<f64>() / total
}

/// Symmetric clamp to ±`cap`.
#[inline]
pub(crate) fn capped(v: f64, cap: f64) -> f64 {
    v.clamp(-cap, cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::{points_prop, saves_prop};
    use crate::state::{GoalieWorkload, StatType, TeamProfile, TeamScoring};
    use proptest::prelude::*;

    /// Observed stat values, including the degenerate ones a feed can send.
    fn stat_value() -> impl Strategy<Value = f64> {
        prop_oneof![Just(0.0), Just(f64::NAN), Just(f64::INFINITY), -10.0f64..0.0, 0.0f64..80.0]
    }

    fn team_scoring() -> impl Strategy<Value = TeamScoring> {
        (stat_value(), stat_value(), proptest::option::of(stat_value())).prop_map(|(gf, ga, gaa)| TeamScoring {
            goals_per_game: gf,
            goals_against_per_game: ga,
            goalie_gaa: gaa,
        })
    }

    #[test]
    fn test_deviation_scale_deadband() {
        let s = DeviationScale { deadband: 0.05, full_scale: 0.30 };
        assert_eq!(s.strength(0.04), 0.0);
        assert_eq!(s.strength(-0.049), 0.0);
        assert!((s.strength(0.15) - 0.5).abs() < 1e-12);
        assert_eq!(s.strength(0.9), 1.0);
        assert_eq!(s.strength(-0.9), -1.0);
        assert_eq!(s.strength(f64::NAN), 0.0);
    }

    #[test]
    fn test_sample_confidence_tiers() {
        assert_eq!(sample_confidence(Some(25)), 0.90);
        assert_eq!(sample_confidence(Some(12)), 0.80);
        assert_eq!(sample_confidence(Some(5)), 0.65);
        assert_eq!(sample_confidence(Some(2)), 0.40);
        assert_eq!(sample_confidence(None), 0.40);
    }

    #[test]
    fn test_registry_per_league() {
        let nhl: Vec<_> = signal_set(League::Nhl).iter().map(|s| s.kind()).collect();
        assert_eq!(nhl, SignalKind::ALL.to_vec());
        let nba: Vec<_> = signal_set(League::Nba).iter().map(|s| s.kind()).collect();
        assert_eq!(nba.len(), 6);
        assert!(!nba.contains(&SignalKind::GoalieSaves));
        assert_eq!(signal_set(League::Nfl).len(), 6);
    }

    #[test]
    fn test_every_signal_stays_in_range() {
        let ctx = points_prop();
        for signal in signal_set(League::Nhl) {
            let r = signal.calculate(&ctx);
            assert!((-1.0..=1.0).contains(&r.strength), "{}: {}", signal.kind(), r.strength);
            assert!((0.0..=1.0).contains(&r.confidence), "{}: {}", signal.kind(), r.confidence);
        }
    }

    proptest! {
        #[test]
        fn prop_signals_stay_in_range_for_any_context(
            goalie in any::<bool>(),
            stat in proptest::sample::select(StatType::ALL.to_vec()),
            line in prop_oneof![Just(0.0), -5.0f64..0.0, 0.01f64..60.0],
            season in (proptest::option::of(0u32..90), proptest::option::of(stat_value())),
            recent in (
                proptest::option::of(0u32..20),
                proptest::option::of(stat_value()),
                proptest::option::of(0u32..15),
            ),
            deployment in (
                proptest::option::of(0u8..6),
                proptest::option::of(0u8..4),
                proptest::option::of(stat_value()),
            ),
            goalie_form in (proptest::option::of(-0.5f64..1.5), proptest::option::of(stat_value())),
            game_lines in (proptest::option::of(stat_value()), proptest::option::of(-5.0f64..5.0)),
            workload in (proptest::option::of(stat_value()), proptest::option::of(-0.5f64..1.5)),
            teams in (proptest::option::of(team_scoring()), proptest::option::of(team_scoring()))
        ) {
            let mut ctx = if goalie {
                saves_prop(27.5, GoalieWorkload::default())
            } else {
                points_prop()
            };
            ctx.stat_type = stat;
            ctx.line = line;
            (ctx.season.games, ctx.season.average) = season;
            (ctx.recent.games, ctx.recent.average, ctx.recent.streak) = recent;
            (ctx.deployment.line_number, ctx.deployment.pp_unit, ctx.deployment.avg_toi_minutes) = deployment;
            (ctx.goalie_matchup.save_pct, ctx.goalie_matchup.gaa) = goalie_form;
            (ctx.game_lines.total, ctx.game_lines.spread) = game_lines;
            (ctx.workload.opponent_shots_per_game, ctx.workload.save_pct) = workload;
            ctx.team_profile = TeamProfile { home: teams.0, away: teams.1 };

            for signal in signal_set(League::Nhl) {
                let r = signal.calculate(&ctx);
                prop_assert!(r.strength.is_finite() && r.confidence.is_finite(), "{}: {:?}", signal.kind(), r);
                prop_assert!((-1.0..=1.0).contains(&r.strength), "{}: {}", signal.kind(), r.strength);
                prop_assert!((0.0..=1.0).contains(&r.confidence), "{}: {}", signal.kind(), r.confidence);
            }
        }
    }

    #[test]
    fn test_signal_kind_names() {
        assert_eq!(serde_json::to_string(&SignalKind::GoalieSaves).unwrap(), "\"goalie_saves\"");
        assert_eq!("shot_quality".parse::<SignalKind>().unwrap(), SignalKind::ShotQuality);
    }
}
