//! Per-tick generation, storage accounting, and upgrade/bonus cost decay.
//!
//! Unlike the link resolver and pathfinder, this is a per-entity transform:
//! each territory's storage update depends only on its own components plus
//! shared-by-reference resources (catalog, cost table, runtime options), so
//! it is an ordinary query-based system rather than an exclusive one.

use bevy_ecs::prelude::{Query, Res};
use tracing::trace;

use crate::core::catalog::Catalog;
use crate::core::cost_table::{BonusKind, CostTable, UpgradeKind};
use crate::core::options::{RuntimeOptions, TreasuryOverride};
use crate::core::resources::{ResourceKind, ResourceVec};
use crate::core::territory::{ConfigAt, Storage, TerritoryIdentity, Treasury, UnderfundedStreak};

/// Ticks of continuous underfunding before an upgrade stat decays one level.
/// The decay curve's shape is fixed; one level per simulated hour is the
/// pragmatic choice for the constant, recorded in DESIGN.md.
pub const DECAY_INTERVAL_TICKS: u32 = 3_600;

pub(crate) fn treasury_multiplier(treasury: &Treasury, cost_table: &CostTable, runtime: &RuntimeOptions) -> f64 {
    if !runtime.treasury_enabled {
        return 1.0;
    }
    match treasury.override_level {
        TreasuryOverride::None => cost_table.treasury_multiplier_for(treasury.ticks_held),
        other => other.multiplier().unwrap_or(1.0),
    }
}

fn derive_capacity(base_capacity: ResourceVec, at: &ConfigAt, cost_table: &CostTable) -> ResourceVec {
    let resource_bonus = cost_table.bonus_effect(
        BonusKind::LargerResourceStorage,
        at.bonus_level(BonusKind::LargerResourceStorage),
    );
    let emerald_bonus = cost_table.bonus_effect(
        BonusKind::LargerEmeraldStorage,
        at.bonus_level(BonusKind::LargerEmeraldStorage),
    );
    base_capacity.zip_map(
        ResourceVec {
            emeralds: emerald_bonus,
            ores: resource_bonus,
            wood: resource_bonus,
            fish: resource_bonus,
            crops: resource_bonus,
        },
        |base, bonus| base * bonus,
    )
}

pub(crate) fn generation_amount(
    base_per_hour: ResourceVec,
    at: &ConfigAt,
    cost_table: &CostTable,
    treasury_mult: f64,
) -> ResourceVec {
    let resource_bonus =
        cost_table.bonus_effect(BonusKind::ResourceRate, at.bonus_level(BonusKind::ResourceRate)) - 1.0;
    let emerald_bonus =
        cost_table.bonus_effect(BonusKind::EmeraldRate, at.bonus_level(BonusKind::EmeraldRate)) - 1.0;

    ResourceKind::ALL.iter().fold(ResourceVec::ZERO, |mut acc, &kind| {
        let bonus = if kind == ResourceKind::Emeralds {
            emerald_bonus
        } else {
            resource_bonus
        };
        acc[kind] = (base_per_hour[kind] / 3_600.0) * (1.0 + bonus) * treasury_mult;
        acc
    })
}

/// True and paying iff every nonzero component of `cost` is covered by `storage`.
fn try_pay(storage: &mut ResourceVec, cost: ResourceVec) -> bool {
    let affordable = ResourceKind::ALL.iter().all(|&k| storage[k] >= cost[k]);
    if affordable {
        *storage = storage.zip_map(cost, |have, due| have - due);
    }
    affordable
}

fn hard_zero(storage: ResourceVec, cost: ResourceVec) -> bool {
    ResourceKind::ALL.iter().any(|&k| cost[k] > 0.0 && storage[k] == 0.0)
}

/// Advances one stat's cost/decay cycle given its (already-discounted) per-tick
/// `cost`. Returns the (possibly decayed) level.
fn settle_upgrade_cost(kind: UpgradeKind, level: u8, cost: ResourceVec, storage: &mut ResourceVec, streak: &mut UnderfundedStreak) -> u8 {
    if level == 0 {
        streak.set(kind, 0);
        return 0;
    }
    if try_pay(storage, cost) {
        streak.set(kind, 0);
        return level;
    }
    let next_streak = streak.get(kind) + 1;
    if hard_zero(*storage, cost) || next_streak >= DECAY_INTERVAL_TICKS {
        streak.set(kind, 0);
        level.saturating_sub(1)
    } else {
        streak.set(kind, next_streak);
        level
    }
}

/// Bonus levels decay instantly (no multi-tick streak is tracked for them;
/// see DESIGN.md) when their per-tick cost can't be paid.
fn settle_bonus_cost(level: u8, cost: ResourceVec, storage: &mut ResourceVec) -> u8 {
    if level == 0 {
        return 0;
    }
    if try_pay(storage, cost) {
        level
    } else {
        level.saturating_sub(1)
    }
}

/// Fractional cost reduction granted by `EfficientResource`/`EfficientEmerald`
/// at the given territory's current bonus levels.
fn efficiency_discount(at: &ConfigAt, cost_table: &CostTable, emerald: bool) -> f64 {
    let kind = if emerald {
        BonusKind::EfficientEmerald
    } else {
        BonusKind::EfficientResource
    };
    (cost_table.bonus_effect(kind, at.bonus_level(kind)) - 1.0).clamp(0.0, 0.95)
}

pub fn resource_generation_system(
    mut query: Query<(
        &TerritoryIdentity,
        &mut Storage,
        &mut ConfigAt,
        &mut UnderfundedStreak,
        &mut Treasury,
    )>,
    catalog: Res<Catalog>,
    cost_table: Res<CostTable>,
    runtime: Res<RuntimeOptions>,
    mut event_log: bevy_ecs::prelude::ResMut<crate::core::events::WorldEventLog>,
) {
    for (identity, mut storage, mut at, mut streak, mut treasury) in &mut query {
        let Some(entry) = catalog.get(&identity.name) else {
            continue;
        };

        // Step 4: capacity derives from base + storage bonuses, recomputed
        // every tick since bonus levels can change under decay.
        storage.capacity = derive_capacity(entry.base_capacity, &at, &cost_table);

        // Step 5 feeds step 1: treasury multiplier.
        let treasury_mult = treasury_multiplier(&treasury, &cost_table, &runtime);

        // Step 1 + 2: generate, add, clip to capacity (silent overflow discard).
        let generated = generation_amount(entry.base_generation_per_hour, &at, &cost_table, treasury_mult);
        let (clamped, overflow) = storage.at.zip_map(generated, |have, gen| have + gen).clip_to_capacity(storage.capacity);
        storage.at = clamped;
        if !overflow.is_zero() {
            trace!(territory = %identity.name, "storage overflow discarded");
        }

        // Step 3: per-tick upgrade costs, with per-stat efficiency discount
        // applied to the resource side, not the emerald side of the cost.
        let resource_discount = efficiency_discount(&at, &cost_table, false);
        let emerald_discount = efficiency_discount(&at, &cost_table, true);
        let discount = |cost: ResourceVec| ResourceVec {
            emeralds: cost.emeralds * (1.0 - emerald_discount),
            ores: cost.ores * (1.0 - resource_discount),
            wood: cost.wood * (1.0 - resource_discount),
            fish: cost.fish * (1.0 - resource_discount),
            crops: cost.crops * (1.0 - resource_discount),
        };

        for kind in UpgradeKind::ALL {
            let level = at.level(kind);
            let cost = discount(cost_table.upgrade_cost(kind, level));
            let new_level = settle_upgrade_cost(kind, level, cost, &mut storage.at, &mut streak);
            at.set_level(kind, new_level);
        }

        for kind in BonusKind::ALL {
            let level = at.bonus_level(kind);
            if level == 0 {
                continue;
            }
            let cost = discount(cost_table.bonus_cost(kind, level));
            let new_level = settle_bonus_cost(level, cost, &mut storage.at);
            at.bonuses.insert(kind, new_level);
        }

        treasury.ticks_held = treasury.ticks_held.saturating_add(1);
        if treasury.override_level == crate::core::options::TreasuryOverride::None {
            let new_mult = cost_table.treasury_multiplier_for(treasury.ticks_held);
            if (new_mult - treasury_mult).abs() > f64::EPSILON {
                event_log.push(crate::core::events::TransitEvent::TreasuryBandChanged {
                    territory: identity.name.clone(),
                    previous_multiplier: treasury_mult,
                    new_multiplier: new_mult,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cost_table::CostTable;

    #[test]
    fn generation_scales_per_hour_rate_to_per_tick() {
        let table = CostTable::default();
        let at = ConfigAt {
            damage: 0,
            attack: 0,
            health: 0,
            defence: 0,
            bonuses: Default::default(),
        };
        let base = ResourceVec {
            wood: 3_600.0,
            ..ResourceVec::ZERO
        };
        let generated = generation_amount(base, &at, &table, 1.0);
        assert!((generated.wood - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unaffordable_cost_increments_streak_without_paying() {
        let table = CostTable::default();
        let cost = table.upgrade_cost(UpgradeKind::Damage, 3);
        let mut storage = ResourceVec::ZERO;
        let mut streak = UnderfundedStreak::default();
        let new_level = settle_upgrade_cost(UpgradeKind::Damage, 3, cost, &mut storage, &mut streak);
        assert_eq!(new_level, 3);
        assert_eq!(streak.get(UpgradeKind::Damage), 1);
    }

    #[test]
    fn hard_zero_decays_immediately() {
        let table = CostTable::default();
        let cost = table.upgrade_cost(UpgradeKind::Damage, 3);
        let mut storage = ResourceVec::ZERO; // no ores at all
        let mut streak = UnderfundedStreak::default();
        let new_level = settle_upgrade_cost(UpgradeKind::Damage, 3, cost, &mut storage, &mut streak);
        // cost_table.upgrade_cost(Damage, 3) costs ores; storage has zero ores => hard zero.
        assert_eq!(new_level, 2);
    }

    #[test]
    fn affordable_cost_pays_and_resets_streak() {
        let table = CostTable::default();
        let cost = table.upgrade_cost(UpgradeKind::Damage, 3);
        let mut storage = ResourceVec {
            ores: 1_000.0,
            ..ResourceVec::ZERO
        };
        let mut streak = UnderfundedStreak::default();
        streak.set(UpgradeKind::Damage, 5);
        let new_level = settle_upgrade_cost(UpgradeKind::Damage, 3, cost, &mut storage, &mut streak);
        assert_eq!(new_level, 3);
        assert_eq!(streak.get(UpgradeKind::Damage), 0);
        assert!(storage.ores < 1_000.0);
    }

    #[test]
    fn bonus_cost_decays_instantly_when_unaffordable() {
        let table = CostTable::default();
        let cost = table.bonus_cost(BonusKind::ResourceRate, 4);
        let mut storage = ResourceVec::ZERO;
        let new_level = settle_bonus_cost(4, cost, &mut storage);
        assert_eq!(new_level, 3);
    }
}
