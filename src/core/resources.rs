//! The closed resource-kind enumeration shared by storage, generation, and transit.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A closed enumeration of five tradeable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Emeralds,
    Ores,
    Wood,
    Fish,
    Crops,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Emeralds,
        ResourceKind::Ores,
        ResourceKind::Wood,
        ResourceKind::Fish,
        ResourceKind::Crops,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Emeralds => "emeralds",
            ResourceKind::Ores => "ores",
            ResourceKind::Wood => "wood",
            ResourceKind::Fish => "fish",
            ResourceKind::Crops => "crops",
        }
    }
}

/// A per-resource amount vector. Kept as a plain struct (not a `HashMap`) so
/// storage math stays branch-free and serializes compactly.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceVec {
    pub emeralds: f64,
    pub ores: f64,
    pub wood: f64,
    pub fish: f64,
    pub crops: f64,
}

impl ResourceVec {
    pub const ZERO: ResourceVec = ResourceVec {
        emeralds: 0.0,
        ores: 0.0,
        wood: 0.0,
        fish: 0.0,
        crops: 0.0,
    };

    pub fn splat(v: f64) -> Self {
        Self {
            emeralds: v,
            ores: v,
            wood: v,
            fish: v,
            crops: v,
        }
    }

    pub fn map(self, mut f: impl FnMut(f64) -> f64) -> Self {
        Self {
            emeralds: f(self.emeralds),
            ores: f(self.ores),
            wood: f(self.wood),
            fish: f(self.fish),
            crops: f(self.crops),
        }
    }

    pub fn zip_map(self, other: Self, mut f: impl FnMut(f64, f64) -> f64) -> Self {
        Self {
            emeralds: f(self.emeralds, other.emeralds),
            ores: f(self.ores, other.ores),
            wood: f(self.wood, other.wood),
            fish: f(self.fish, other.fish),
            crops: f(self.crops, other.crops),
        }
    }

    /// Clamp this vector componentwise to `[0, cap]`, returning the clamped
    /// result and the amount discarded per resource (the overflow).
    pub fn clip_to_capacity(self, capacity: Self) -> (Self, Self) {
        let clamped = self.zip_map(capacity, |v, cap| v.min(cap).max(0.0));
        let overflow = self.zip_map(clamped, |v, c| (v - c).max(0.0));
        (clamped, overflow)
    }

    pub fn is_zero(&self) -> bool {
        ResourceKind::ALL.iter().all(|k| self[*k] == 0.0)
    }
}

impl Index<ResourceKind> for ResourceVec {
    type Output = f64;

    fn index(&self, kind: ResourceKind) -> &f64 {
        match kind {
            ResourceKind::Emeralds => &self.emeralds,
            ResourceKind::Ores => &self.ores,
            ResourceKind::Wood => &self.wood,
            ResourceKind::Fish => &self.fish,
            ResourceKind::Crops => &self.crops,
        }
    }
}

impl IndexMut<ResourceKind> for ResourceVec {
    fn index_mut(&mut self, kind: ResourceKind) -> &mut f64 {
        match kind {
            ResourceKind::Emeralds => &mut self.emeralds,
            ResourceKind::Ores => &mut self.ores,
            ResourceKind::Wood => &mut self.wood,
            ResourceKind::Fish => &mut self.fish,
            ResourceKind::Crops => &mut self.crops,
        }
    }
}
