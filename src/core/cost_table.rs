//! Upgrade/bonus cost and effect tables indexed by level, plus the treasury
//! time-held band table.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::core::resources::ResourceVec;

pub const L_MAX: u8 = 11;

/// The 17-field bonus enumeration a territory's `TerritoryOptions.bonuses` indexes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BonusKind {
    StrongerMinions,
    TowerMultiAttack,
    TowerAoe,
    XpSeeking,
    LargerResourceStorage,
    LargerEmeraldStorage,
    EfficientResource,
    EfficientEmerald,
    ResourceRate,
    EmeraldRate,
    TowerAttackSpeed,
    TowerVolley,
    GatheringExperience,
    MobExperience,
    MobDamage,
    PvpDamage,
    TrapsBonus,
}

impl BonusKind {
    pub const ALL: [BonusKind; 17] = [
        BonusKind::StrongerMinions,
        BonusKind::TowerMultiAttack,
        BonusKind::TowerAoe,
        BonusKind::XpSeeking,
        BonusKind::LargerResourceStorage,
        BonusKind::LargerEmeraldStorage,
        BonusKind::EfficientResource,
        BonusKind::EfficientEmerald,
        BonusKind::ResourceRate,
        BonusKind::EmeraldRate,
        BonusKind::TowerAttackSpeed,
        BonusKind::TowerVolley,
        BonusKind::GatheringExperience,
        BonusKind::MobExperience,
        BonusKind::MobDamage,
        BonusKind::PvpDamage,
        BonusKind::TrapsBonus,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeKind {
    Damage,
    Attack,
    Health,
    Defence,
}

impl UpgradeKind {
    pub const ALL: [UpgradeKind; 4] = [
        UpgradeKind::Damage,
        UpgradeKind::Attack,
        UpgradeKind::Health,
        UpgradeKind::Defence,
    ];
}

/// One row per treasury band. The exact thresholds aren't derivable from
/// first principles, so this table defines them explicitly (see DESIGN.md)
/// as a monotone, six-row ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreasuryBand {
    pub ticks_held: u64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct CostTable {
    /// Monotone-nondecreasing multiplier per upgrade level, indexed `[0..=L_MAX]`.
    upgrade_multipliers: [Vec<f64>; 4],
    /// Per-tick storage cost vector per upgrade level.
    upgrade_costs: [Vec<ResourceVec>; 4],
    /// Flat per-level effect strength for each of the 17 bonus kinds.
    bonus_effect_per_level: [Vec<f64>; 17],
    bonus_costs: [Vec<ResourceVec>; 17],
    pub treasury_bands: [TreasuryBand; 6],
}

fn linear_multiplier_table(step: f64) -> Vec<f64> {
    (0..=L_MAX as usize).map(|level| 1.0 + step * level as f64).collect()
}

fn linear_cost_table(per_level: ResourceVec) -> Vec<ResourceVec> {
    (0..=L_MAX as usize)
        .map(|level| per_level.map(|v| v * level as f64))
        .collect()
}

impl Default for CostTable {
    fn default() -> Self {
        let upgrade_multipliers = [
            linear_multiplier_table(0.20), // damage
            linear_multiplier_table(0.12), // attack
            linear_multiplier_table(0.25), // health
            linear_multiplier_table(0.06), // defence (pre-cap at 0.99)
        ];
        let upgrade_costs = [
            linear_cost_table(ResourceVec {
                ores: 8.0,
                ..ResourceVec::ZERO
            }),
            linear_cost_table(ResourceVec {
                wood: 6.0,
                ..ResourceVec::ZERO
            }),
            linear_cost_table(ResourceVec {
                crops: 10.0,
                ..ResourceVec::ZERO
            }),
            linear_cost_table(ResourceVec {
                fish: 6.0,
                ..ResourceVec::ZERO
            }),
        ];

        let bonus_effect_per_level = std::array::from_fn(|_| linear_multiplier_table(0.10));
        let bonus_costs = std::array::from_fn(|_| {
            linear_cost_table(ResourceVec {
                emeralds: 4.0,
                ..ResourceVec::ZERO
            })
        });

        let treasury_bands = [
            TreasuryBand {
                ticks_held: 0,
                multiplier: 1.00,
            },
            TreasuryBand {
                ticks_held: 3_600 * 6,
                multiplier: 1.20,
            },
            TreasuryBand {
                ticks_held: 3_600 * 24,
                multiplier: 1.40,
            },
            TreasuryBand {
                ticks_held: 3_600 * 24 * 3,
                multiplier: 1.60,
            },
            TreasuryBand {
                ticks_held: 3_600 * 24 * 7,
                multiplier: 1.80,
            },
            TreasuryBand {
                ticks_held: 3_600 * 24 * 14,
                multiplier: 2.00,
            },
        ];

        Self {
            upgrade_multipliers,
            upgrade_costs,
            bonus_effect_per_level,
            bonus_costs,
            treasury_bands,
        }
    }
}

impl CostTable {
    pub fn upgrade_multiplier(&self, kind: UpgradeKind, level: u8) -> f64 {
        let idx = (kind as usize, level.min(L_MAX) as usize);
        self.upgrade_multipliers[idx.0][idx.1]
    }

    pub fn upgrade_cost(&self, kind: UpgradeKind, level: u8) -> ResourceVec {
        self.upgrade_costs[kind as usize][level.min(L_MAX) as usize]
    }

    pub fn bonus_effect(&self, kind: BonusKind, level: u8) -> f64 {
        self.bonus_effect_per_level[kind as usize][level.min(L_MAX) as usize]
    }

    pub fn bonus_cost(&self, kind: BonusKind, level: u8) -> ResourceVec {
        self.bonus_costs[kind as usize][level.min(L_MAX) as usize]
    }

    /// Buckets the time-held counter into the six-level band and returns
    /// its multiplier. Monotone non-decreasing by construction.
    pub fn treasury_multiplier_for(&self, ticks_held: u64) -> f64 {
        self.treasury_bands
            .iter()
            .rev()
            .find(|band| ticks_held >= band.ticks_held)
            .map(|band| band.multiplier)
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_multiplier_is_monotone() {
        let table = CostTable::default();
        for kind in UpgradeKind::ALL {
            let mut prev = 0.0;
            for level in 0..=L_MAX {
                let m = table.upgrade_multiplier(kind, level);
                assert!(m >= prev);
                prev = m;
            }
        }
    }

    #[test]
    fn treasury_bands_span_very_low_to_very_high() {
        let table = CostTable::default();
        assert_eq!(table.treasury_multiplier_for(0), 1.00);
        assert_eq!(table.treasury_multiplier_for(u64::MAX), 2.00);
    }

    #[test]
    fn level_clamps_above_l_max() {
        let table = CostTable::default();
        assert_eq!(
            table.upgrade_multiplier(UpgradeKind::Damage, L_MAX),
            table.upgrade_multiplier(UpgradeKind::Damage, 255)
        );
    }
}
