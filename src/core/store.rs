//! Territory Store: name-keyed territory access with atomic validation,
//! dirty-marking cascades, and change notification.

use serde::Serialize;

use crate::core::catalog::Catalog;
use crate::core::cost_table::{BonusKind, CostTable};
use crate::core::error::{CoreError, CoreResult};
use crate::core::guild::{Guild, GuildIndex};
use crate::core::observer::ObserverHub;
use crate::core::options::TerritoryOptions;
use crate::core::resource_engine::{generation_amount, treasury_multiplier};
use crate::core::resources::ResourceVec;
use crate::core::stats::{derive_stats, TowerStats};
use crate::core::territory::{
    ConfigAt, ConfigSet, Links, LinksDirty, Ownership, Storage, TerritoryIdentity, TerritoryIndex, Treasury,
};

#[derive(Debug, Clone, Serialize)]
pub struct TerritorySnapshot {
    pub name: String,
    pub guild: String,
    pub hq: bool,
    pub set: TerritoryOptions,
    pub at_damage: u8,
    pub at_attack: u8,
    pub at_health: u8,
    pub at_defence: u8,
    pub at_bonuses: Vec<(BonusKind, u8)>,
    pub storage_at: ResourceVec,
    pub storage_capacity: ResourceVec,
    pub treasury_ticks_held: u64,
    pub direct_links: Vec<String>,
    pub externals: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TerritoryStatsView {
    pub generation_per_tick: ResourceVec,
    pub storage_at: ResourceVec,
    pub storage_capacity: ResourceVec,
    pub at_levels: (u8, u8, u8, u8),
    pub treasury_bonus_percent: u32,
    pub tower_stats: TowerStats,
}

pub fn get_territory(world: &bevy_ecs::prelude::World, name: &str) -> CoreResult<TerritorySnapshot> {
    let entity = world
        .resource::<TerritoryIndex>()
        .get(name)
        .ok_or_else(|| CoreError::NotFound(name.to_string()))?;

    let own = world.get::<Ownership>(entity).unwrap();
    let set = world.get::<ConfigSet>(entity).unwrap();
    let at = world.get::<ConfigAt>(entity).unwrap();
    let storage = world.get::<Storage>(entity).unwrap();
    let treasury = world.get::<Treasury>(entity).unwrap();
    let links = world.get::<Links>(entity).unwrap();

    let mut direct_links: Vec<String> = links.direct.iter().cloned().collect();
    direct_links.sort();
    let mut externals: Vec<String> = links.externals.iter().cloned().collect();
    externals.sort();
    let mut at_bonuses: Vec<(BonusKind, u8)> = at.bonuses.iter().map(|(k, v)| (*k, *v)).collect();
    at_bonuses.sort_by_key(|(k, _)| format!("{k:?}"));

    Ok(TerritorySnapshot {
        name: name.to_string(),
        guild: own.guild.clone(),
        hq: own.hq,
        set: set.0.clone(),
        at_damage: at.damage,
        at_attack: at.attack,
        at_health: at.health,
        at_defence: at.defence,
        at_bonuses,
        storage_at: storage.at,
        storage_capacity: storage.capacity,
        treasury_ticks_held: treasury.ticks_held,
        direct_links,
        externals,
    })
}

pub fn get_territories(world: &bevy_ecs::prelude::World) -> Vec<TerritorySnapshot> {
    let mut names: Vec<String> = world.resource::<TerritoryIndex>().names().map(String::from).collect();
    names.sort();
    names
        .into_iter()
        .filter_map(|name| get_territory(world, &name).ok())
        .collect()
}

pub fn get_territory_stats(world: &bevy_ecs::prelude::World, name: &str) -> CoreResult<TerritoryStatsView> {
    let entity = world
        .resource::<TerritoryIndex>()
        .get(name)
        .ok_or_else(|| CoreError::NotFound(name.to_string()))?;

    let at = world.get::<ConfigAt>(entity).unwrap();
    let storage = world.get::<Storage>(entity).unwrap();
    let treasury = world.get::<Treasury>(entity).unwrap();
    let own = world.get::<Ownership>(entity).unwrap();
    let links = world.get::<Links>(entity).unwrap();
    let identity = world.get::<TerritoryIdentity>(entity).unwrap();
    let cost_table = world.resource::<CostTable>();
    let runtime = world.resource::<crate::core::options::RuntimeOptions>();
    let catalog = world.resource::<Catalog>();

    let treasury_mult = treasury_multiplier(treasury, cost_table, runtime);

    let generation_per_tick = catalog
        .get(&identity.name)
        .map(|entry| generation_amount(entry.base_generation_per_hour, at, cost_table, treasury_mult))
        .unwrap_or(ResourceVec::ZERO);

    let tower_stats = derive_stats(at, cost_table, links.direct.len(), own.hq, links.externals.len());

    Ok(TerritoryStatsView {
        generation_per_tick,
        storage_at: storage.at,
        storage_capacity: storage.capacity,
        at_levels: (at.damage, at.attack, at.health, at.defence),
        treasury_bonus_percent: (treasury_mult * 100.0).round() as u32,
        tower_stats,
    })
}

/// Validates and applies `options` to `name`, marking link/route caches
/// dirty for the territory and its transitive same-guild HQ-peers, then
/// notifying the territory-changed observer.
pub fn set_territory(
    world: &mut bevy_ecs::prelude::World,
    name: &str,
    options: TerritoryOptions,
) -> CoreResult<()> {
    options.validate()?;

    let entity = world
        .resource::<TerritoryIndex>()
        .get(name)
        .ok_or_else(|| CoreError::NotFound(name.to_string()))?;

    if options.hq {
        let own = world.get::<Ownership>(entity).unwrap();
        let guild_name = own.guild.clone();
        if let Some(existing) = find_other_hq(world, &guild_name, name) {
            return Err(CoreError::HqConflict {
                guild: guild_name,
                existing,
            });
        }
    }

    let mut own = world.get_mut::<Ownership>(entity).unwrap();
    own.hq = options.hq;
    let guild_name = own.guild.clone();

    let mut set = world.get_mut::<ConfigSet>(entity).unwrap();
    set.0 = options.clone();
    let mut at = world.get_mut::<ConfigAt>(entity).unwrap();
    *at = ConfigAt::from_set(&options);

    mark_link_dirty_cascade(world, name, &guild_name);

    world.resource_mut::<ObserverHub>().notify_territory_changed(name);
    Ok(())
}

pub fn set_treasury_override(
    world: &mut bevy_ecs::prelude::World,
    name: &str,
    level: crate::core::options::TreasuryOverride,
) -> CoreResult<()> {
    let entity = world
        .resource::<TerritoryIndex>()
        .get(name)
        .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
    world.get_mut::<Treasury>(entity).unwrap().override_level = level;
    world.resource_mut::<ObserverHub>().notify_territory_changed(name);
    Ok(())
}

fn find_other_hq(world: &bevy_ecs::prelude::World, guild_name: &str, excluding: &str) -> Option<String> {
    let index = world.resource::<TerritoryIndex>().as_map().clone();
    let mut names: Vec<_> = index.keys().cloned().collect();
    names.sort();
    for name in names {
        if name == excluding {
            continue;
        }
        let entity = index[&name];
        let own = world.get::<Ownership>(entity).unwrap();
        if own.guild == guild_name && own.hq {
            return Some(name);
        }
    }
    None
}

/// Marks `name` and all same-guild neighbors link-dirty: any mutation
/// affecting Border, Guild, or HQ invalidates cached adjacency for the
/// territory and all its same-guild neighbors.
fn mark_link_dirty_cascade(world: &mut bevy_ecs::prelude::World, name: &str, guild_name: &str) {
    let index = world.resource::<TerritoryIndex>().as_map().clone();
    if let Some(&entity) = index.get(name) {
        world.entity_mut(entity).insert(LinksDirty);
    }

    let allies: std::collections::HashSet<String> = world
        .resource::<GuildIndex>()
        .get(guild_name)
        .and_then(|e| world.get::<Guild>(e))
        .map(|g| g.allies.clone())
        .unwrap_or_default();

    let mut names: Vec<_> = index.keys().cloned().collect();
    names.sort();
    for peer_name in names {
        let peer_entity = index[&peer_name];
        let own = world.get::<Ownership>(peer_entity).unwrap();
        if own.guild == guild_name || allies.contains(&own.guild) {
            world.entity_mut(peer_entity).insert(LinksDirty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::territory::TerritoryIdentity;
    use bevy_ecs::prelude::World;

    fn spawn_territory(world: &mut World, name: &str, guild: &str, hq: bool) {
        let entity = world
            .spawn((
                TerritoryIdentity { name: name.to_string() },
                Ownership {
                    guild: guild.to_string(),
                    hq,
                },
                ConfigSet(TerritoryOptions::default()),
                ConfigAt::from_set(&TerritoryOptions::default()),
                Storage::default(),
                crate::core::territory::UnderfundedStreak::default(),
                Treasury::default(),
                Links::default(),
                crate::core::territory::Routes::default(),
                crate::core::territory::TransitBuffer::default(),
            ))
            .id();
        world.resource_mut::<TerritoryIndex>().insert(name, entity);
    }

    fn test_world() -> World {
        let mut world = World::new();
        world.insert_resource(TerritoryIndex::default());
        world.insert_resource(GuildIndex::default());
        world.insert_resource(CostTable::default());
        world.insert_resource(ObserverHub::default());
        world.insert_resource(Catalog::default());
        world.insert_resource(crate::core::options::RuntimeOptions::default());
        spawn_territory(&mut world, "A", "X", false);
        world
    }

    #[test]
    fn set_on_unknown_territory_is_not_found() {
        let mut world = test_world();
        assert!(matches!(
            set_territory(&mut world, "nope", TerritoryOptions::default()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn set_marks_territory_link_dirty() {
        let mut world = test_world();
        set_territory(&mut world, "A", TerritoryOptions::default()).unwrap();
        let entity = world.resource::<TerritoryIndex>().get("A").unwrap();
        assert!(world.get::<LinksDirty>(entity).is_some());
    }

    #[test]
    fn hq_conflict_is_rejected() {
        let mut world = test_world();
        spawn_territory(&mut world, "B", "X", true);
        let options = TerritoryOptions {
            hq: true,
            ..TerritoryOptions::default()
        };
        assert!(matches!(
            set_territory(&mut world, "A", options),
            Err(CoreError::HqConflict { .. })
        ));
    }

    #[test]
    fn stats_view_reports_per_tick_generation_not_raw_storage() {
        let mut world = test_world();
        world.resource_mut::<Catalog>().insert(crate::core::catalog::CatalogEntry {
            name: "A".to_string(),
            bounds: crate::core::catalog::BoundingBox {
                x_min: 0,
                y_min: 0,
                x_max: 1,
                y_max: 1,
            },
            adjacency: Default::default(),
            base_generation_per_hour: ResourceVec {
                wood: 3_600.0,
                ..ResourceVec::ZERO
            },
            base_capacity: ResourceVec::splat(1_000.0),
        });
        let entity = world.resource::<TerritoryIndex>().get("A").unwrap();
        world.get_mut::<Storage>(entity).unwrap().at = ResourceVec {
            wood: 500.0,
            ..ResourceVec::ZERO
        };

        let stats = get_territory_stats(&world, "A").unwrap();
        assert!((stats.generation_per_tick.wood - 1.0).abs() < 1e-9);
        assert_eq!(stats.storage_at.wood, 500.0);
    }
}
