//! Closed-record configuration types. Unknown fields on load are ignored
//! for forward-compat; missing fields take declared defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::cost_table::{BonusKind, L_MAX};
use crate::core::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Border {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingMode {
    Cheapest,
    Fastest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreasuryOverride {
    None,
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Default for TreasuryOverride {
    fn default() -> Self {
        TreasuryOverride::None
    }
}

impl TreasuryOverride {
    pub fn multiplier(&self) -> Option<f64> {
        match self {
            TreasuryOverride::None => None,
            TreasuryOverride::VeryLow => Some(1.00),
            TreasuryOverride::Low => Some(1.20),
            TreasuryOverride::Medium => Some(1.40),
            TreasuryOverride::High => Some(1.70),
            TreasuryOverride::VeryHigh => Some(2.00),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathfindingAlgorithm {
    Dijkstra,
    AStar,
    FloodFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpgradeLevels {
    pub damage: u8,
    pub attack: u8,
    pub health: u8,
    pub defence: u8,
}

impl Default for UpgradeLevels {
    fn default() -> Self {
        Self {
            damage: 0,
            attack: 0,
            health: 0,
            defence: 0,
        }
    }
}

impl UpgradeLevels {
    fn validate(&self) -> CoreResult<()> {
        for (field, value) in [
            ("damage", self.damage),
            ("attack", self.attack),
            ("health", self.health),
            ("defence", self.defence),
        ] {
            if value > L_MAX {
                return Err(CoreError::OutOfRange {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRates {
    pub zelf: f64,
    pub ally: f64,
}

impl TaxRates {
    pub const MIN: f64 = 0.05;
    pub const MAX: f64 = 0.70;

    fn validate(&self) -> CoreResult<()> {
        for (field, value) in [("tax.self", self.zelf), ("tax.ally", self.ally)] {
            if !(Self::MIN..=Self::MAX).contains(&value) {
                return Err(CoreError::OutOfRange {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn as_percent(value: f64) -> u32 {
        (value * 100.0).round() as u32
    }
}

impl Default for TaxRates {
    fn default() -> Self {
        Self {
            zelf: 0.10,
            ally: 0.10,
        }
    }
}

/// The per-territory `Set`-level configuration a caller requests via `set(...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryOptions {
    pub upgrades: UpgradeLevels,
    pub bonuses: HashMap<BonusKind, u8>,
    pub tax: TaxRates,
    pub routing_mode: RoutingMode,
    pub border: Border,
    pub hq: bool,
}

impl Default for TerritoryOptions {
    fn default() -> Self {
        Self {
            upgrades: UpgradeLevels::default(),
            bonuses: HashMap::new(),
            tax: TaxRates::default(),
            routing_mode: RoutingMode::Cheapest,
            border: Border::Open,
            hq: false,
        }
    }
}

impl TerritoryOptions {
    pub fn validate(&self) -> CoreResult<()> {
        self.upgrades.validate()?;
        self.tax.validate()?;
        for (kind, level) in &self.bonuses {
            if *level > L_MAX {
                return Err(CoreError::OutOfRange {
                    field: format!("bonuses.{kind:?}"),
                    value: level.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn bonus_level(&self, kind: BonusKind) -> u8 {
        self.bonuses.get(&kind).copied().unwrap_or(0)
    }
}

/// Global, world-wide options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    pub treasury_enabled: bool,
    pub encode_in_transit_resources: bool,
    pub pathfinding_algorithm: PathfindingAlgorithm,
    pub pathfinder_provider: Option<String>,
    pub cost_provider: Option<String>,
    pub map_opacity_percent: f64,
    pub resource_colors: HashMap<String, String>,
    pub show_emerald_generators: bool,
    pub throughput_curve: f64,
    pub chokepoint_curve: f64,
    pub chokepoint_emerald_weight: f64,
    pub chokepoint_mode: ChokepointMode,
    pub chokepoint_include_downstream: bool,
    pub keybinds: HashMap<String, String>,
    pub plugin_keybinds: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChokepointMode {
    Cardinal,
    Ordinal,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            treasury_enabled: true,
            encode_in_transit_resources: false,
            pathfinding_algorithm: PathfindingAlgorithm::Dijkstra,
            pathfinder_provider: None,
            cost_provider: None,
            map_opacity_percent: 100.0,
            resource_colors: HashMap::new(),
            show_emerald_generators: true,
            throughput_curve: 1.0,
            chokepoint_curve: 1.0,
            chokepoint_emerald_weight: 1.0,
            chokepoint_mode: ChokepointMode::Cardinal,
            chokepoint_include_downstream: false,
            keybinds: HashMap::new(),
            plugin_keybinds: HashMap::new(),
        }
    }
}

impl RuntimeOptions {
    pub fn validate(&self) -> CoreResult<()> {
        if !(0.1..=10.0).contains(&self.chokepoint_emerald_weight) {
            return Err(CoreError::OutOfRange {
                field: "chokepoint_emerald_weight".to_string(),
                value: self.chokepoint_emerald_weight.to_string(),
            });
        }
        Ok(())
    }
}
