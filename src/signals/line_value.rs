//! Line value: season average against the posted line.
//!
//! The primary signal. A player averaging 1.2 per game against a 0.5 line
//! is a strong over; the deviation is relative to the line so that small
//! lines and large lines map onto the same strength scale.
use super::{sample_confidence, DeviationScale, Signal, SignalKind};
use crate::state::{PropContext, SignalResult};

const SCALE: DeviationScale = DeviationScale {
    deadband: 0.02,
    full_scale: 0.5,
};

pub struct LineValue;

impl Signal for LineValue {
    fn kind(&self) -> SignalKind {
        SignalKind::LineValue
    }

    fn calculate(&self, ctx: &PropContext) -> SignalResult {
        let Some(season_avg) = ctx.season.average.filter(|a| a.is_finite()) else {
            return SignalResult::missing(0.30, format!("no season data for {}", ctx.stat_type));
        };

        let pct_diff = (season_avg - ctx.line) / ctx.line;
        let strength = SCALE.strength(pct_diff);
        let confidence = sample_confidence(ctx.season.games);

        let side = if season_avg > ctx.line { "above" } else { "below" };
        let mut evidence = format!(
            "season avg {season_avg:.2} is {:.0}% {side} line {}",
            pct_diff.abs() * 100.0,
            ctx.line
        );
        if pct_diff.abs() >= 0.5 {
            evidence.push_str(" (strong)");
        } else if pct_diff.abs() >= 0.25 {
            evidence.push_str(" (moderate)");
        }

        SignalResult::new(strength, confidence, evidence)
    }
}
