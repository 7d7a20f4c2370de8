//! Correlation: game script from the betting lines.
//! High totals lift scoring props; top-six forwards feel it more.
use super::{Signal, SignalKind};
use crate::state::{PropContext, SignalResult};

const AVG_TOTAL: f64 = 6.0;
const HIGH_TOTAL: f64 = 6.5;
const LOW_TOTAL: f64 = 5.5;
const IMPACT_PER_GOAL: f64 = 0.15;
const TOP_SIX_MULTIPLIER: f64 = 1.3;

pub struct Correlation;

impl Signal for Correlation {
    fn kind(&self) -> SignalKind {
        SignalKind::Correlation
    }

    fn calculate(&self, ctx: &PropContext) -> SignalResult {
        let Some(total) = ctx.game_lines.total.filter(|t| t.is_finite()) else {
            return SignalResult::missing(0.40, "no game total");
        };

        let mut strength = 0.0;
        let mut notes: Vec<String> = Vec::new();

        if ctx.stat_type.is_scoring() {
            let mut impact = (total - AVG_TOTAL) * IMPACT_PER_GOAL;
            if matches!(ctx.deployment.line_number, Some(l) if l <= 2) {
                impact *= TOP_SIX_MULTIPLIER;
            }
            strength += impact;
            if total >= HIGH_TOTAL {
                notes.push(format!("high total ({total})"));
            } else if total <= LOW_TOTAL {
                notes.push(format!("low total ({total})"));
            }
        }

        if let Some(spread) = ctx.game_lines.spread.filter(|s| s.is_finite()) {
            if spread < -1.5 {
                strength += 0.10;
                notes.push(format!("favoured ({spread:+})"));
            } else if spread > 1.5 {
                strength -= 0.05;
                notes.push(format!("underdog ({spread:+})"));
            }
        }

        let evidence = if notes.is_empty() {
            format!("total {total}, minimal correlation")
        } else {
            notes.join(", ")
        };
        SignalResult::new(strength, 0.70, evidence)
    }
}
