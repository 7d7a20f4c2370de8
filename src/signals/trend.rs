//! Trend: recent form against the season baseline.
//! Hot streaks lean over, cold stretches lean under.
use super::{DeviationScale, Signal, SignalKind};
use crate::state::{PropContext, SignalResult};

const SCALE: DeviationScale = DeviationScale {
    deadband: 0.05,
    full_scale: 0.30,
};

pub struct Trend;

impl Signal for Trend {
    fn kind(&self) -> SignalKind {
        SignalKind::Trend
    }

    fn calculate(&self, ctx: &PropContext) -> SignalResult {
        let recent = ctx.recent.average.filter(|v| v.is_finite());
        let season = ctx.season.average.filter(|v| v.is_finite() && *v != 0.0);
        let (Some(recent_avg), Some(season_avg)) = (recent, season) else {
            return SignalResult::missing(0.30, "insufficient trend data");
        };

        let pct_change = (recent_avg - season_avg) / season_avg;
        let strength = SCALE.strength(pct_change);

        let streak = ctx.recent.streak.unwrap_or(0);
        let recent_games = ctx.recent.games.unwrap_or(0);

        let mut confidence: f64 = 0.70;
        let streak_note = if streak >= 5 {
            confidence += 0.15;
            format!(" ({streak}-game streak)")
        } else if streak >= 3 {
            confidence += 0.08;
            format!(" ({streak}-game streak)")
        } else {
            String::new()
        };
        if recent_games < 5 {
            confidence -= 0.20;
        }
        let confidence = confidence.clamp(0.30, 0.95);

        let dir = if pct_change > 0.0 { "up" } else { "down" };
        let evidence = format!(
            "L{recent_games} avg {recent_avg:.2} vs season {season_avg:.2} ({dir} {:.1}%){streak_note}",
            pct_change.abs() * 100.0
        );
        SignalResult::new(strength, confidence, evidence)
    }
}
