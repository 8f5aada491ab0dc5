//! Headless demo binary: seeds a small two-guild map, runs the scheduler for
//! a short burst of ticks, and prints a colorized pulse line per territory.
//! There is no TUI here: rendering is left to an external collaborator
//! driving this crate's public API.

use std::collections::HashSet;

use colored::{Color, Colorize};
use territoria_core::core::api::{GuildSeed, TerritoriaApi, TerritorySeed};
use territoria_core::core::catalog::{BoundingBox, Catalog, CatalogEntry};
use territoria_core::core::cost_table::CostTable;
use territoria_core::core::options::{RuntimeOptions, TerritoryOptions};
use territoria_core::core::resources::ResourceVec;
use tracing::info;

fn badge(label: &str, color: Color) -> String {
    format!("[{}]", label).color(color).to_string()
}

fn build_catalog() -> Catalog {
    let mut catalog = Catalog::default();
    catalog.insert(CatalogEntry {
        name: "Alderfen".to_string(),
        bounds: BoundingBox {
            x_min: 0,
            y_min: 0,
            x_max: 64,
            y_max: 64,
        },
        adjacency: HashSet::from(["Vassalgate".to_string()]),
        base_generation_per_hour: ResourceVec {
            wood: 3_600.0,
            ..ResourceVec::ZERO
        },
        base_capacity: ResourceVec::splat(10_000.0),
    });
    catalog.insert(CatalogEntry {
        name: "Vassalgate".to_string(),
        bounds: BoundingBox {
            x_min: 64,
            y_min: 0,
            x_max: 128,
            y_max: 64,
        },
        adjacency: HashSet::from(["Alderfen".to_string(), "Bastionhold".to_string()]),
        base_generation_per_hour: ResourceVec::ZERO,
        base_capacity: ResourceVec::splat(10_000.0),
    });
    catalog.insert(CatalogEntry {
        name: "Bastionhold".to_string(),
        bounds: BoundingBox {
            x_min: 128,
            y_min: 0,
            x_max: 192,
            y_max: 64,
        },
        adjacency: HashSet::from(["Vassalgate".to_string()]),
        base_generation_per_hour: ResourceVec::ZERO,
        base_capacity: ResourceVec::splat(10_000.0),
    });
    catalog.symmetrize();
    catalog
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let guilds = vec![
        GuildSeed {
            name: "Ironbound".to_string(),
            tag: "IRON".to_string(),
            allies: vec![],
        },
        GuildSeed {
            name: "Marchwarden".to_string(),
            tag: "MRCH".to_string(),
            allies: vec![],
        },
    ];
    let territories = vec![
        TerritorySeed {
            name: "Alderfen".to_string(),
            guild: "Ironbound".to_string(),
            hq: false,
            options: TerritoryOptions::default(),
        },
        TerritorySeed {
            name: "Vassalgate".to_string(),
            guild: "Marchwarden".to_string(),
            hq: false,
            options: TerritoryOptions::default(),
        },
        TerritorySeed {
            name: "Bastionhold".to_string(),
            guild: "Ironbound".to_string(),
            hq: true,
            options: TerritoryOptions::default(),
        },
    ];

    let api = TerritoriaApi::new(
        build_catalog(),
        CostTable::default(),
        RuntimeOptions::default(),
        guilds,
        territories,
    )?;

    info!("demo world seeded, advancing 3600 ticks (one simulated hour)");
    api.step(3_600).await;

    for snapshot in api.get_territories() {
        let guild_badge = badge(&snapshot.guild, Color::BrightCyan);
        let hq_badge = if snapshot.hq {
            badge("HQ", Color::BrightYellow)
        } else {
            String::new()
        };
        println!(
            "{} {} {} wood={:.1} ores={:.1} crops={:.1} fish={:.1} emeralds={:.1}",
            badge(&snapshot.name, Color::BrightGreen),
            guild_badge,
            hq_badge,
            snapshot.storage_at.wood,
            snapshot.storage_at.ores,
            snapshot.storage_at.crops,
            snapshot.storage_at.fish,
            snapshot.storage_at.emeralds,
        );
    }

    Ok(())
}
