//! Public facade over the simulation world.
//!
//! One `RwLock`-guarded `World` plus a `TickScheduler` whose driver task takes
//! its own write lock per tick and releases it before sleeping, so the
//! driver never holds a lock across its inter-tick sleep. Uses
//! `parking_lot` (non-poisoning, uncontested-fast) rather than `std::sync`.

use std::sync::Arc;

use bevy_ecs::prelude::World;
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use tracing::error;

use crate::core::catalog::Catalog;
use crate::core::cost_table::CostTable;
use crate::core::error::{CoreError, CoreResult};
use crate::core::guild::{add_ally_pair, Guild, GuildIndex};
use crate::core::observer::{ErrorNotification, ObserverHub, SubscriptionId};
use crate::core::options::{RuntimeOptions, TerritoryOptions, TreasuryOverride};
use crate::core::persistence::{self, PersistedGuild, PersistedTerritory, WorldSnapshot};
use crate::core::scheduler::{TickScheduler, R_MAX_NATIVE, R_MAX_WEB};
use crate::core::store::{self, TerritorySnapshot, TerritoryStatsView};
use crate::core::territory::{
    ConfigAt, ConfigSet, Links, LinksDirty, Ownership, Packet, Routes, Storage, TerritoryIdentity, TerritoryIndex,
    Treasury, TransitBuffer, UnderfundedStreak,
};
use crate::core::undo::UndoTree;
use crate::core::{new_world, run_tick};

fn native_r_max() -> u32 {
    if cfg!(target_arch = "wasm32") {
        R_MAX_WEB
    } else {
        R_MAX_NATIVE
    }
}

/// One territory's starting ownership, handed to `TerritoriaApi::new` /
/// `reset` alongside the catalog: the minimal shape the facade needs to
/// seed the `World` before the first tick (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct TerritorySeed {
    pub name: String,
    pub guild: String,
    pub hq: bool,
    pub options: TerritoryOptions,
}

#[derive(Debug, Clone)]
pub struct GuildSeed {
    pub name: String,
    pub tag: String,
    pub allies: Vec<String>,
}

struct WorldInit {
    catalog: Catalog,
    cost_table: CostTable,
    runtime: RuntimeOptions,
    guilds: Vec<GuildSeed>,
    territories: Vec<TerritorySeed>,
}

/// Drives the headless simulation. Cheap to clone (an `Arc` handle over the
/// shared `World`); every method takes `&self`.
pub struct TerritoriaApi {
    world: Arc<RwLock<World>>,
    scheduler: RwLock<TickScheduler>,
    init: RwLock<WorldInit>,
}

impl TerritoriaApi {
    pub fn new(
        catalog: Catalog,
        cost_table: CostTable,
        runtime: RuntimeOptions,
        guilds: Vec<GuildSeed>,
        territories: Vec<TerritorySeed>,
    ) -> CoreResult<Self> {
        runtime.validate()?;
        let world = Arc::new(RwLock::new(seed_world(
            catalog.clone(),
            cost_table.clone(),
            runtime.clone(),
            &guilds,
            &territories,
        )?));

        let mut scheduler = TickScheduler::new(native_r_max());
        let driver_world = world.clone();
        scheduler.spawn_driver(move |tick| {
            let mut w = driver_world.write();
            run_tick(&mut w, tick);
        });

        Ok(Self {
            world,
            scheduler: RwLock::new(scheduler),
            init: RwLock::new(WorldInit {
                catalog,
                cost_table,
                runtime,
                guilds,
                territories,
            }),
        })
    }

    // ---- Territory reads ----

    pub fn get_territory(&self, name: &str) -> CoreResult<TerritorySnapshot> {
        store::get_territory(&self.world.read(), name)
    }

    pub fn get_territory_stats(&self, name: &str) -> CoreResult<TerritoryStatsView> {
        store::get_territory_stats(&self.world.read(), name)
    }

    pub fn get_territories(&self) -> Vec<TerritorySnapshot> {
        store::get_territories(&self.world.read())
    }

    pub fn get_transit_resources_for(&self, name: &str) -> Vec<Packet> {
        crate::core::transit_engine::transit_resources_for(&self.world.read(), name)
    }

    // ---- Territory writes (undo-tracked) ----

    /// Validates and applies `options` to `name`, recording the edit in the
    /// undo tree under `description`.
    pub fn set(&self, name: &str, options: TerritoryOptions, description: impl Into<String>, now_unix_secs: u64) -> CoreResult<()> {
        let mut world = self.world.write();
        let before = store::get_territory(&world, name)?.set;

        world.resource_mut::<UndoTree>().start_edit(name, before)?;
        match store::set_territory(&mut world, name, options.clone()) {
            Ok(()) => {
                let result = world
                    .resource_mut::<UndoTree>()
                    .end_edit(name, options, description, now_unix_secs);
                if let Err(err) = result {
                    error!(%err, "undo tree end_edit failed after a successful set");
                }
                Ok(())
            }
            Err(err) => {
                // Roll back the pending edit so a later start_edit isn't rejected as busy.
                let _ = world.resource_mut::<UndoTree>().end_edit(
                    name,
                    store::get_territory(&world, name).map(|s| s.set).unwrap_or(options),
                    "rejected",
                    now_unix_secs,
                );
                world.resource_mut::<ObserverHub>().notify_error(&err);
                Err(err)
            }
        }
    }

    pub fn set_treasury_override(&self, name: &str, level: TreasuryOverride) -> CoreResult<()> {
        store::set_treasury_override(&mut self.world.write(), name, level)
    }

    pub fn undo(&self) -> CoreResult<()> {
        let mut world = self.world.write();
        let outcome = world.resource_mut::<UndoTree>().undo()?;
        if let Some((name, options)) = outcome {
            store::set_territory(&mut world, &name, options)?;
        }
        Ok(())
    }

    pub fn redo(&self) -> CoreResult<()> {
        let mut world = self.world.write();
        let outcome = world.resource_mut::<UndoTree>().redo()?;
        if let Some((name, options)) = outcome {
            store::set_territory(&mut world, &name, options)?;
        }
        Ok(())
    }

    pub fn jump(&self, target: crate::core::undo::NodeId) -> CoreResult<()> {
        let mut world = self.world.write();
        let applies = world.resource_mut::<UndoTree>().jump(target)?;
        for (name, options) in applies {
            store::set_territory(&mut world, &name, options)?;
        }
        Ok(())
    }

    pub fn undo_current_node(&self) -> crate::core::undo::NodeId {
        self.world.read().resource::<UndoTree>().current()
    }

    // ---- Tick control ----

    pub fn elapsed(&self) -> u64 {
        self.scheduler.read().elapsed()
    }

    pub fn is_halted(&self) -> bool {
        self.scheduler.read().is_halted()
    }

    pub fn halt(&self) {
        self.scheduler.read().halt();
    }

    pub fn resume(&self) {
        self.scheduler.read().resume();
    }

    pub fn set_tick_rate(&self, r: u32) {
        self.scheduler.read().set_rate(r);
    }

    /// Advances exactly one tick, bypassing halt.
    pub async fn next_tick(&self) {
        let world = self.world.clone();
        self.scheduler
            .read()
            .step(1, move |tick| {
                let mut w = world.write();
                run_tick(&mut w, tick);
            })
            .await;
    }

    pub async fn step(&self, n: u64) {
        let world = self.world.clone();
        self.scheduler
            .read()
            .step(n, move |tick| {
                let mut w = world.write();
                run_tick(&mut w, tick);
            })
            .await;
    }

    // ---- Cost table ----

    pub fn get_costs(&self) -> CostTable {
        self.world.read().resource::<CostTable>().clone()
    }

    pub fn reload_default_costs(&self) -> CoreResult<()> {
        let mut world = self.world.write();
        *world.resource_mut::<CostTable>() = CostTable::default();
        mark_every_route_dirty(&mut world);
        Ok(())
    }

    /// Replaces the cost table wholesale. The provider payload shape isn't
    /// specified elsewhere, so this accepts an already-assembled `CostTable`
    /// (see DESIGN.md).
    pub fn set_costs_from(&self, table: CostTable) -> CoreResult<()> {
        let mut world = self.world.write();
        *world.resource_mut::<CostTable>() = table;
        mark_every_route_dirty(&mut world);
        Ok(())
    }

    // ---- Runtime options ----

    pub fn get_runtime_options(&self) -> RuntimeOptions {
        self.world.read().resource::<RuntimeOptions>().clone()
    }

    pub fn set_runtime_options(&self, opts: RuntimeOptions) -> CoreResult<()> {
        opts.validate()?;
        let mut world = self.world.write();
        *world.resource_mut::<RuntimeOptions>() = opts;
        mark_every_route_dirty(&mut world);
        world.resource_mut::<ObserverHub>().notify_state_changed();
        Ok(())
    }

    // ---- Reset ----

    /// Rebuilds the world from the original catalog/cost-table/runtime/seed
    /// data this `TerritoriaApi` was constructed with.
    pub fn reset(&self) -> CoreResult<()> {
        let init = self.init.read();
        let fresh = seed_world(
            init.catalog.clone(),
            init.cost_table.clone(),
            init.runtime.clone(),
            &init.guilds,
            &init.territories,
        )?;
        *self.world.write() = fresh;
        self.scheduler.read().reset();
        Ok(())
    }

    // ---- Persistence ----

    pub fn save_state_to_bytes(&self) -> CoreResult<Vec<u8>> {
        let world = self.world.read();
        let snapshot = build_snapshot(&world, self.scheduler.read().elapsed(), self.scheduler.read().is_halted());
        persistence::save_state_to_bytes(snapshot)
    }

    pub fn load_state_from_bytes(&self, bytes: &[u8]) -> CoreResult<()> {
        let snapshot = persistence::load_state_from_bytes(bytes)?;
        let current_tick = snapshot.current_tick;
        let halted = snapshot.halted;
        let mut world = self.world.write();
        restore_snapshot(&mut world, snapshot)?;
        drop(world);

        let scheduler = self.scheduler.read();
        scheduler.reset();
        scheduler.clock().set_elapsed(current_tick);
        if halted {
            scheduler.halt();
        } else {
            scheduler.resume();
        }
        Ok(())
    }

    // ---- Observers ----

    pub fn on_tick(&self) -> (SubscriptionId, Receiver<u64>) {
        self.world.write().resource_mut::<ObserverHub>().subscribe_tick()
    }

    pub fn on_territory_changed(&self) -> (SubscriptionId, Receiver<String>) {
        self.world
            .write()
            .resource_mut::<ObserverHub>()
            .subscribe_territory_changed()
    }

    pub fn on_state_changed(&self) -> (SubscriptionId, Receiver<()>) {
        self.world.write().resource_mut::<ObserverHub>().subscribe_state_changed()
    }

    pub fn on_error(&self) -> (SubscriptionId, Receiver<ErrorNotification>) {
        self.world.write().resource_mut::<ObserverHub>().subscribe_error()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.world.write().resource_mut::<ObserverHub>().unsubscribe(id);
    }
}

fn mark_every_route_dirty(world: &mut World) {
    let index = world.resource::<TerritoryIndex>().as_map().clone();
    for &entity in index.values() {
        world.entity_mut(entity).insert(LinksDirty);
    }
}

fn seed_world(
    catalog: Catalog,
    cost_table: CostTable,
    runtime: RuntimeOptions,
    guilds: &[GuildSeed],
    territories: &[TerritorySeed],
) -> CoreResult<World> {
    let mut world = new_world(catalog, cost_table, runtime);

    // Stage guilds in a name-keyed map first so `add_ally_pair` can make every
    // declared alliance symmetric by construction, regardless of whether only
    // one side's seed lists it.
    let mut staged: std::collections::HashMap<String, Guild> =
        guilds.iter().map(|seed| (seed.name.clone(), Guild::new(&seed.name, &seed.tag))).collect();
    for seed in guilds {
        for ally in &seed.allies {
            add_ally_pair(&mut staged, &seed.name, ally);
        }
    }
    for seed in guilds {
        let guild = staged.remove(&seed.name).unwrap_or_else(|| Guild::new(&seed.name, &seed.tag));
        let entity = world.spawn(guild).id();
        world.resource_mut::<GuildIndex>().insert(&seed.name, entity);
    }

    let mut hq_seen: std::collections::HashSet<&str> = Default::default();
    for seed in territories {
        seed.options.validate()?;
        if seed.hq && !hq_seen.insert(seed.guild.as_str()) {
            return Err(CoreError::HqConflict {
                guild: seed.guild.clone(),
                existing: "another territory seeded earlier".to_string(),
            });
        }
        let at = ConfigAt::from_set(&seed.options);
        let entity = world
            .spawn((
                TerritoryIdentity { name: seed.name.clone() },
                Ownership {
                    guild: seed.guild.clone(),
                    hq: seed.hq,
                },
                ConfigSet(seed.options.clone()),
                at,
                Storage::default(),
                UnderfundedStreak::default(),
                Treasury::default(),
                Links::default(),
                Routes::default(),
                TransitBuffer::default(),
                LinksDirty,
            ))
            .id();
        world.resource_mut::<TerritoryIndex>().insert(&seed.name, entity);

        if let Some(guild_entity) = world.resource::<GuildIndex>().get(&seed.guild) {
            let mut guild = world.get_mut::<Guild>(guild_entity).unwrap();
            guild.claims.insert(seed.name.clone());
            if seed.hq {
                guild.hq = Some(seed.name.clone());
            }
        }
    }

    Ok(world)
}

fn build_snapshot(world: &World, current_tick: u64, halted: bool) -> WorldSnapshot {
    let index = world.resource::<TerritoryIndex>().as_map().clone();
    let runtime = world.resource::<RuntimeOptions>();

    let mut names: Vec<&String> = index.keys().collect();
    names.sort();

    let territories = names
        .iter()
        .map(|name| {
            let entity = index[*name];
            let set = world.get::<ConfigSet>(entity).unwrap();
            let at = world.get::<ConfigAt>(entity).unwrap();
            let storage = world.get::<Storage>(entity).unwrap();
            let treasury = world.get::<Treasury>(entity).unwrap();
            let own = world.get::<Ownership>(entity).unwrap();
            let mut at_bonuses: Vec<_> = at.bonuses.iter().map(|(k, v)| (*k, *v)).collect();
            at_bonuses.sort_by_key(|(k, _)| format!("{k:?}"));
            PersistedTerritory {
                name: (*name).clone(),
                set: set.0.clone(),
                at_damage: at.damage,
                at_attack: at.attack,
                at_health: at.health,
                at_defence: at.defence,
                at_bonuses,
                storage_at: storage.at,
                storage_capacity: storage.capacity,
                treasury_ticks_held: treasury.ticks_held,
                treasury_override: treasury.override_level,
                guild: own.guild.clone(),
                hq: own.hq,
            }
        })
        .collect();

    let mut guild_names: Vec<&str> = world.resource::<GuildIndex>().names().collect();
    guild_names.sort();
    let guilds = guild_names
        .iter()
        .filter_map(|name| {
            world
                .resource::<GuildIndex>()
                .get(name)
                .and_then(|e| world.get::<Guild>(e))
                .map(PersistedGuild::from)
        })
        .collect();

    let in_transit = if runtime.encode_in_transit_resources {
        Some(
            names
                .iter()
                .map(|name| {
                    let entity = index[*name];
                    let buffer = world.get::<TransitBuffer>(entity).unwrap();
                    ((*name).clone(), buffer.packets.clone())
                })
                .collect(),
        )
    } else {
        None
    };

    WorldSnapshot {
        runtime_options: runtime.clone(),
        cost_table: world.resource::<CostTable>().clone(),
        guilds,
        territories,
        in_transit,
        current_tick,
        halted,
        undo_tree: clone_undo_tree(world),
    }
}

fn clone_undo_tree(world: &World) -> UndoTree {
    // `UndoTree` carries no `Clone` derive (its busy/pending guard fields are
    // transient, see undo.rs), so persistence round-trips it through its own
    // serde impl instead of an in-memory clone.
    let tree = world.resource::<UndoTree>();
    let bytes = bincode::serialize(tree).expect("UndoTree always serializes");
    bincode::deserialize(&bytes).expect("round-trip of a just-serialized UndoTree always succeeds")
}

fn restore_snapshot(world: &mut World, snapshot: WorldSnapshot) -> CoreResult<()> {
    *world.resource_mut::<RuntimeOptions>() = snapshot.runtime_options;
    *world.resource_mut::<CostTable>() = snapshot.cost_table;
    *world.resource_mut::<UndoTree>() = snapshot.undo_tree;

    let old_index = std::mem::take(&mut *world.resource_mut::<TerritoryIndex>());
    for &entity in old_index.as_map().values() {
        world.despawn(entity);
    }
    let old_guild_index = std::mem::take(&mut *world.resource_mut::<GuildIndex>());
    for &entity in old_guild_index.as_map().values() {
        world.despawn(entity);
    }

    for guild in &snapshot.guilds {
        let entity = world
            .spawn(Guild {
                name: guild.name.clone(),
                tag: guild.tag.clone(),
                hq: guild.hq.clone(),
                allies: guild.allies.iter().cloned().collect(),
                claims: guild
                    .claims
                    .iter()
                    .cloned()
                    .chain(snapshot.territories.iter().filter(|t| t.guild == guild.name).map(|t| t.name.clone()))
                    .collect(),
            })
            .id();
        world.resource_mut::<GuildIndex>().insert(&guild.name, entity);
    }

    let transit_by_name: std::collections::HashMap<String, Vec<Packet>> =
        snapshot.in_transit.unwrap_or_default().into_iter().collect();

    for territory in &snapshot.territories {
        let entity = world
            .spawn((
                TerritoryIdentity {
                    name: territory.name.clone(),
                },
                Ownership {
                    guild: territory.guild.clone(),
                    hq: territory.hq,
                },
                ConfigSet(territory.set.clone()),
                ConfigAt {
                    damage: territory.at_damage,
                    attack: territory.at_attack,
                    health: territory.at_health,
                    defence: territory.at_defence,
                    bonuses: territory.at_bonuses.iter().cloned().collect(),
                },
                Storage {
                    at: territory.storage_at,
                    capacity: territory.storage_capacity,
                },
                UnderfundedStreak::default(),
                Treasury {
                    ticks_held: territory.treasury_ticks_held,
                    override_level: territory.treasury_override,
                },
                Links::default(),
                Routes::default(),
                TransitBuffer {
                    packets: transit_by_name.get(&territory.name).cloned().unwrap_or_default(),
                },
                LinksDirty,
            ))
            .id();
        world.resource_mut::<TerritoryIndex>().insert(&territory.name, entity);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::UpgradeLevels;

    fn sample_seed() -> (Vec<GuildSeed>, Vec<TerritorySeed>) {
        let guilds = vec![GuildSeed {
            name: "X".to_string(),
            tag: "XXX".to_string(),
            allies: vec![],
        }];
        let territories = vec![TerritorySeed {
            name: "HQ".to_string(),
            guild: "X".to_string(),
            hq: true,
            options: TerritoryOptions::default(),
        }];
        (guilds, territories)
    }

    #[tokio::test]
    async fn new_rejects_duplicate_hq_in_same_guild() {
        let (guilds, mut territories) = sample_seed();
        territories.push(TerritorySeed {
            name: "HQ2".to_string(),
            guild: "X".to_string(),
            hq: true,
            options: TerritoryOptions::default(),
        });
        let api = TerritoriaApi::new(Catalog::default(), CostTable::default(), RuntimeOptions::default(), guilds, territories);
        assert!(api.is_err());
    }

    #[tokio::test]
    async fn get_territory_reflects_seed() {
        let (guilds, territories) = sample_seed();
        let api = TerritoriaApi::new(Catalog::default(), CostTable::default(), RuntimeOptions::default(), guilds, territories).unwrap();
        let snap = api.get_territory("HQ").unwrap();
        assert_eq!(snap.guild, "X");
        assert!(snap.hq);
    }

    #[tokio::test]
    async fn set_records_an_undo_node() {
        let (guilds, territories) = sample_seed();
        let api = TerritoriaApi::new(Catalog::default(), CostTable::default(), RuntimeOptions::default(), guilds, territories).unwrap();
        let before = api.undo_current_node();
        let options = TerritoryOptions {
            upgrades: UpgradeLevels {
                damage: 3,
                ..Default::default()
            },
            ..TerritoryOptions::default()
        };
        api.set("HQ", options, "raise damage", 0).unwrap();
        assert_ne!(api.undo_current_node(), before);
        assert_eq!(api.get_territory("HQ").unwrap().at_damage, 3);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_territory_state() {
        let (guilds, territories) = sample_seed();
        let api = TerritoriaApi::new(Catalog::default(), CostTable::default(), RuntimeOptions::default(), guilds, territories).unwrap();
        let options = TerritoryOptions {
            upgrades: UpgradeLevels {
                damage: 4,
                ..Default::default()
            },
            ..TerritoryOptions::default()
        };
        api.set("HQ", options, "raise damage", 0).unwrap();

        let bytes = api.save_state_to_bytes().unwrap();
        api.load_state_from_bytes(&bytes).unwrap();

        assert_eq!(api.get_territory("HQ").unwrap().at_damage, 4);
    }
}
