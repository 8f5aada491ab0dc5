//! Static territory metadata: names, coordinates, adjacency, base tower stats,
//! and default per-hour generation rates.

use std::collections::{HashMap, HashSet};

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::core::resources::ResourceVec;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

/// Immutable, catalog-declared facts about one territory. These never change
/// at runtime; they are the defaults `reset()` restores `Set` levels to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub bounds: BoundingBox,
    pub adjacency: HashSet<String>,
    /// Per-hour base generation, before bonuses/treasury scaling.
    pub base_generation_per_hour: ResourceVec,
    /// Storage capacity before `LargerResourceStorage`/`LargerEmeraldStorage`.
    pub base_capacity: ResourceVec,
}

#[derive(Debug, Clone, Resource, Serialize, Deserialize, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn insert(&mut self, entry: CatalogEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adjacency is declared once per edge in catalog data but must present as
    /// symmetric to the rest of the core. Backfill the reverse edge so a
    /// malformed one-sided catalog entry never breaks the live-adjacency
    /// invariant downstream.
    pub fn symmetrize(&mut self) {
        let edges: Vec<(String, String)> = self
            .entries
            .values()
            .flat_map(|e| e.adjacency.iter().map(move |n| (e.name.clone(), n.clone())))
            .collect();
        for (a, b) in edges {
            if let Some(entry) = self.entries.get_mut(&b) {
                entry.adjacency.insert(a);
            }
        }
    }
}

/// Base tower-stat constants.
pub const BASE_DAMAGE_LOW: f64 = 1000.0;
pub const BASE_DAMAGE_HIGH: f64 = 1500.0;
pub const BASE_ATTACK_RATE: f64 = 0.5;
pub const BASE_HEALTH: f64 = 300_000.0;
pub const BASE_DEFENCE: f64 = 0.10;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, adj: &[&str]) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            bounds: BoundingBox {
                x_min: 0,
                y_min: 0,
                x_max: 10,
                y_max: 10,
            },
            adjacency: adj.iter().map(|s| s.to_string()).collect(),
            base_generation_per_hour: ResourceVec::ZERO,
            base_capacity: ResourceVec::splat(1000.0),
        }
    }

    #[test]
    fn symmetrize_backfills_one_sided_edges() {
        let mut catalog = Catalog::default();
        catalog.insert(entry("A", &["B"]));
        catalog.insert(entry("B", &[]));
        catalog.symmetrize();
        assert!(catalog.get("B").unwrap().adjacency.contains("A"));
    }
}
