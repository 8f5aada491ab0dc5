//! Territory components: identity, ownership, config, storage, treasury,
//! links, routes, and the in-transit packet shape.

use std::collections::{HashMap, HashSet};

use bevy_ecs::prelude::{Component, Entity, Resource};
use serde::{Deserialize, Serialize};

use crate::core::cost_table::{BonusKind, UpgradeKind};
use crate::core::options::{Border, RoutingMode, TerritoryOptions, TreasuryOverride};
use crate::core::resources::ResourceVec;

#[derive(Debug, Clone, Component, Serialize, Deserialize)]
pub struct TerritoryIdentity {
    pub name: String,
}

#[derive(Debug, Clone, Component, Serialize, Deserialize)]
pub struct Ownership {
    pub guild: String,
    pub hq: bool,
}

/// The user-requested (`Set`) configuration. Validated atomically on `set`.
#[derive(Debug, Clone, Component, Serialize, Deserialize)]
pub struct ConfigSet(pub TerritoryOptions);

/// The affordability-clamped effective (`At`) configuration actually in
/// force. `At <= Set` componentwise, always.
#[derive(Debug, Clone, Component, Serialize, Deserialize)]
pub struct ConfigAt {
    pub damage: u8,
    pub attack: u8,
    pub health: u8,
    pub defence: u8,
    pub bonuses: HashMap<BonusKind, u8>,
}

impl ConfigAt {
    pub fn level(&self, kind: UpgradeKind) -> u8 {
        match kind {
            UpgradeKind::Damage => self.damage,
            UpgradeKind::Attack => self.attack,
            UpgradeKind::Health => self.health,
            UpgradeKind::Defence => self.defence,
        }
    }

    pub fn set_level(&mut self, kind: UpgradeKind, value: u8) {
        match kind {
            UpgradeKind::Damage => self.damage = value,
            UpgradeKind::Attack => self.attack = value,
            UpgradeKind::Health => self.health = value,
            UpgradeKind::Defence => self.defence = value,
        }
    }

    pub fn bonus_level(&self, kind: BonusKind) -> u8 {
        self.bonuses.get(&kind).copied().unwrap_or(0)
    }

    pub fn from_set(set: &TerritoryOptions) -> Self {
        Self {
            damage: set.upgrades.damage,
            attack: set.upgrades.attack,
            health: set.upgrades.health,
            defence: set.upgrades.defence,
            bonuses: set.bonuses.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Component, Serialize, Deserialize, Default)]
pub struct Storage {
    pub at: ResourceVec,
    pub capacity: ResourceVec,
}

/// Counts of consecutive underfunded ticks per upgrade stat, driving the
/// decay-toward-affordable curve.
#[derive(Debug, Clone, Copy, Component, Serialize, Deserialize, Default)]
pub struct UnderfundedStreak {
    pub damage: u32,
    pub attack: u32,
    pub health: u32,
    pub defence: u32,
}

impl UnderfundedStreak {
    pub fn get(&self, kind: UpgradeKind) -> u32 {
        match kind {
            UpgradeKind::Damage => self.damage,
            UpgradeKind::Attack => self.attack,
            UpgradeKind::Health => self.health,
            UpgradeKind::Defence => self.defence,
        }
    }

    pub fn set(&mut self, kind: UpgradeKind, value: u32) {
        match kind {
            UpgradeKind::Damage => self.damage = value,
            UpgradeKind::Attack => self.attack = value,
            UpgradeKind::Health => self.health = value,
            UpgradeKind::Defence => self.defence = value,
        }
    }
}

#[derive(Debug, Clone, Component, Serialize, Deserialize, Default)]
pub struct Treasury {
    pub ticks_held: u64,
    pub override_level: TreasuryOverride,
}

/// Direct neighbors and HQ-reachable externals.
#[derive(Debug, Clone, Component, Serialize, Deserialize, Default)]
pub struct Links {
    pub direct: HashSet<String>,
    pub externals: HashSet<String>,
}

/// Marker component: link/route caches for this entity need recomputation.
#[derive(Debug, Clone, Copy, Component, Default)]
pub struct LinksDirty;

#[derive(Debug, Clone, Copy, Component, Default)]
pub struct RoutesDirty;

/// Ordered trading routes from this territory to destination producers/HQ.
#[derive(Debug, Clone, Component, Serialize, Deserialize, Default)]
pub struct Routes {
    pub to_destinations: Vec<Vec<String>>,
}

/// A resource packet in transit between territories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub origin: String,
    pub destination: String,
    pub guild: String,
    pub next_hop: Option<String>,
    pub remaining_route: Vec<String>,
    pub amounts: ResourceVec,
    pub next_hop_tax: f64,
    pub created_tick: u64,
}

#[derive(Debug, Clone, Component, Serialize, Deserialize, Default)]
pub struct TransitBuffer {
    pub packets: Vec<Packet>,
}

/// Maps territory name to its `bevy_ecs` entity.
#[derive(Debug, Clone, Resource, Default)]
pub struct TerritoryIndex {
    by_name: HashMap<String, Entity>,
}

impl TerritoryIndex {
    pub fn insert(&mut self, name: impl Into<String>, entity: Entity) {
        self.by_name.insert(name.into(), entity);
    }

    pub fn get(&self, name: &str) -> Option<Entity> {
        self.by_name.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn as_map(&self) -> &HashMap<String, Entity> {
        &self.by_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_at_mirrors_set_defaults() {
        let set = TerritoryOptions::default();
        let at = ConfigAt::from_set(&set);
        assert_eq!(at.damage, set.upgrades.damage);
        assert_eq!(at.bonus_level(BonusKind::ResourceRate), 0);
    }
}
