//! Tower stat derivation. Derived, never stored.

use serde::Serialize;

use crate::core::cost_table::{CostTable, UpgradeKind};
use crate::core::territory::ConfigAt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TowerStats {
    pub damage_low: f64,
    pub damage_high: f64,
    pub attack_rate: f64,
    pub health: f64,
    pub defence: f64,
    pub ehp: f64,
    pub average_dps: f64,
}

/// `β_L = 1 + 0.30 · |Direct|`, uncapped.
pub fn link_bonus(direct_count: usize) -> f64 {
    1.0 + 0.30 * direct_count as f64
}

/// `β_X = 1` unless HQ, in which case `1.5 + 0.25 · |Externals|`.
pub fn external_bonus(hq: bool, externals_count: usize) -> f64 {
    if hq {
        1.5 + 0.25 * externals_count as f64
    } else {
        1.0
    }
}

pub fn derive_stats(
    at: &ConfigAt,
    cost_table: &CostTable,
    direct_count: usize,
    hq: bool,
    externals_count: usize,
) -> TowerStats {
    use crate::core::catalog::{BASE_ATTACK_RATE, BASE_DAMAGE_HIGH, BASE_DAMAGE_LOW, BASE_DEFENCE, BASE_HEALTH};

    let m_d = cost_table.upgrade_multiplier(UpgradeKind::Damage, at.damage);
    let m_a = cost_table.upgrade_multiplier(UpgradeKind::Attack, at.attack);
    let m_h = cost_table.upgrade_multiplier(UpgradeKind::Health, at.health);
    let m_f = cost_table.upgrade_multiplier(UpgradeKind::Defence, at.defence);

    let beta_l = link_bonus(direct_count);
    let beta_x = external_bonus(hq, externals_count);

    let damage_low = BASE_DAMAGE_LOW * m_d * beta_l * beta_x;
    let damage_high = BASE_DAMAGE_HIGH * m_d * beta_l * beta_x;
    let health = BASE_HEALTH * m_h * beta_l * beta_x;
    let attack_rate = BASE_ATTACK_RATE * m_a;
    let defence = (BASE_DEFENCE * m_f).min(0.99);

    let ehp = health / (1.0 - defence);
    let average_dps = attack_rate * (damage_low + damage_high) / 2.0;

    TowerStats {
        damage_low,
        damage_high,
        attack_rate,
        health,
        defence,
        ehp,
        average_dps,
    }
}
