//! Shot quality: where and how well a skater shoots.
//! Only meaningful for goals, shots on goal and points.
use super::{capped, weighted_mean, Signal, SignalKind};
use crate::state::{PropContext, QualityTier, SignalResult, StatType, ZoneDeployment};

const ELITE_HD_PCT: f64 = 0.40;
const WEAK_HD_PCT: f64 = 0.20;
const MID_HD_PCT: f64 = 0.30;

pub struct ShotQuality;

impl Signal for ShotQuality {
    fn kind(&self) -> SignalKind {
        SignalKind::ShotQuality
    }

    fn calculate(&self, ctx: &PropContext) -> SignalResult {
        if !matches!(ctx.stat_type, StatType::Goals | StatType::ShotsOnGoal | StatType::Points) {
            return SignalResult::not_applicable(format!("shot quality n/a for {}", ctx.stat_type));
        }

        let sh = &ctx.shooting;
        let hd_pct = sh.high_danger_shot_pct.filter(|v| v.is_finite());
        if sh.quality.is_none() && hd_pct.is_none() && sh.zone.is_none() {
            return SignalResult::missing(0.40, "no shot quality data");
        }

        let mut notes: Vec<String> = Vec::new();
        let mut components: Vec<(f64, f64)> = Vec::with_capacity(3);

        if let Some(tier) = sh.quality {
            let c = match tier {
                QualityTier::High => {
                    notes.push("high shot quality".into());
                    0.4
                }
                QualityTier::Low => {
                    notes.push("low shot quality".into());
                    -0.4
                }
                QualityTier::Average => 0.0,
            };
            components.push((c, 0.40));
        }

        if let Some(hd) = hd_pct {
            let c = if hd >= ELITE_HD_PCT {
                notes.push(format!("{:.0}% high-danger shots", hd * 100.0));
                0.4
            } else if hd <= WEAK_HD_PCT {
                notes.push(format!("only {:.0}% high-danger shots", hd * 100.0));
                -0.4
            } else {
                capped((hd - MID_HD_PCT) / 0.10, 0.4)
            };
            components.push((c, 0.30));
        }

        if let Some(zone) = sh.zone {
            let c = match zone {
                ZoneDeployment::Offensive => {
                    notes.push("offensive zone starts".into());
                    0.3
                }
                ZoneDeployment::Defensive => {
                    notes.push("defensive zone starts".into());
                    -0.3
                }
                ZoneDeployment::Balanced => 0.0,
            };
            components.push((c, 0.30));
        }

        let strength = weighted_mean(&components) * 1.5;
        let label = if strength > 0.2 {
            "favourable"
        } else if strength < -0.2 {
            "unfavourable"
        } else {
            "average"
        };
        let mut evidence = format!("shot profile {label}");
        if !notes.is_empty() {
            evidence.push_str(" - ");
            evidence.push_str(&notes.join(", "));
        }
        SignalResult::new(strength, 0.70, evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::{goals_prop, points_prop};
    use crate::state::ShootingProfile;

    #[test]
    fn test_not_applicable_to_saves() {
        let mut ctx = points_prop();
        ctx.stat_type = StatType::Saves;
        let r = ShotQuality.calculate(&ctx);
        assert_eq!((r.strength, r.confidence), (0.0, 0.0));
    }

    #[test]
    fn test_elite_shooter() {
        let ctx = goals_prop(ShootingProfile {
            quality: Some(QualityTier::High),
            high_danger_shot_pct: Some(0.45),
            zone: Some(ZoneDeployment::Offensive),
        });
        let r = ShotQuality.calculate(&ctx);
        // (0.4*0.4 + 0.4*0.3 + 0.3*0.3) * 1.5 = 0.555
        assert!((r.strength - 0.555).abs() < 1e-9, "{}", r.strength);
        assert_eq!(r.confidence, 0.70);
    }

    #[test]
    fn test_partial_profile_uses_what_is_known() {
        let mut ctx = points_prop();
        ctx.shooting = ShootingProfile {
            zone: Some(ZoneDeployment::Defensive),
            ..Default::default()
        };
        let r = ShotQuality.calculate(&ctx);
        assert!((r.strength - (-0.45)).abs() < 1e-9);
    }

    #[test]
    fn test_no_data() {
        let r = ShotQuality.calculate(&points_prop());
        assert_eq!((r.strength, r.confidence), (0.0, 0.40));
    }
}
