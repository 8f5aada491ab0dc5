//! Direct neighbors and HQ externals.
//!
//! This is an exclusive system (`fn(&mut World)`) rather than a query-based
//! one: live adjacency is a whole-graph computation keyed by territory name,
//! not a per-entity transform, so it reads across the whole `TerritoryIndex`
//! resource instead of iterating territories independently.

use std::collections::{HashMap, HashSet, VecDeque};

use bevy_ecs::prelude::{Entity, World};
use tracing::debug;

use crate::core::catalog::Catalog;
use crate::core::guild::{Guild, GuildIndex};
use crate::core::options::Border;
use crate::core::territory::{ConfigSet, Links, LinksDirty, Ownership, RoutesDirty, TerritoryIndex};

/// True iff the catalog edge between `a` and `b` currently carries live flow:
/// neither side is closed, or both sides share a guild.
fn edge_is_live(border_a: Border, guild_a: &str, border_b: Border, guild_b: &str) -> bool {
    let same_guild = guild_a == guild_b;
    same_guild || (border_a == Border::Open && border_b == Border::Open)
}

struct Snapshot {
    border: HashMap<String, Border>,
    guild: HashMap<String, String>,
}

pub fn link_resolver_system(world: &mut World) {
    let any_dirty = {
        let mut query =
            world.query_filtered::<Entity, bevy_ecs::prelude::With<LinksDirty>>();
        query.iter(world).next().is_some()
    };
    if !any_dirty {
        return;
    }

    let index = world.resource::<TerritoryIndex>().as_map().clone();
    let catalog = world.resource::<Catalog>().clone();

    let mut snapshot = Snapshot {
        border: HashMap::new(),
        guild: HashMap::new(),
    };
    for (name, &entity) in &index {
        let set = world.get::<ConfigSet>(entity).unwrap();
        let own = world.get::<Ownership>(entity).unwrap();
        snapshot.border.insert(name.clone(), set.0.border);
        snapshot.guild.insert(name.clone(), own.guild.clone());
    }

    // Deterministic iteration order regardless of entity allocation order.
    let mut names: Vec<_> = index.keys().cloned().collect();
    names.sort();

    for name in &names {
        let entity = index[name];
        let Some(entry) = catalog.get(name) else {
            continue;
        };
        let my_border = snapshot.border[name];
        let my_guild = snapshot.guild[name].clone();

        let mut direct = HashSet::new();
        for neighbor in &entry.adjacency {
            let Some(&their_border) = snapshot.border.get(neighbor) else {
                continue;
            };
            let their_guild = &snapshot.guild[neighbor];
            if edge_is_live(my_border, &my_guild, their_border, their_guild) {
                direct.insert(neighbor.clone());
            }
        }

        let own = world.get::<Ownership>(entity).unwrap();
        let is_hq = own.hq;

        let externals = if is_hq {
            compute_externals(&my_guild, name, &index, world, &snapshot, &catalog)
        } else {
            HashSet::new()
        };

        let mut links = world.get_mut::<Links>(entity).unwrap();
        links.direct = direct;
        links.externals = externals;

        world.entity_mut(entity).remove::<LinksDirty>();
        world.entity_mut(entity).insert(RoutesDirty);
        debug!(territory = %name, "recomputed live adjacency");
    }
}

/// BFS from `hq_name` over live adjacency, restricted to nodes whose guild is
/// `hq_guild` or an ally of it. Every reached same-guild, non-HQ node counts.
fn compute_externals(
    hq_guild: &str,
    hq_name: &str,
    index: &HashMap<String, Entity>,
    world: &World,
    snapshot: &Snapshot,
    catalog: &Catalog,
) -> HashSet<String> {
    let allies: HashSet<String> = world
        .resource::<GuildIndex>()
        .get(hq_guild)
        .and_then(|e| world.get::<Guild>(e))
        .map(|g| g.allies.clone())
        .unwrap_or_default();

    let is_passable_owner = |guild: &str| guild == hq_guild || allies.contains(guild);

    let mut visited = HashSet::new();
    let mut externals = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(hq_name.to_string());
    queue.push_back(hq_name.to_string());

    while let Some(current) = queue.pop_front() {
        let Some(entry) = catalog.get(&current) else {
            continue;
        };
        let current_border = snapshot.border[&current];
        let current_guild = &snapshot.guild[&current];

        let mut neighbors: Vec<_> = entry.adjacency.iter().cloned().collect();
        neighbors.sort();
        for neighbor in neighbors {
            if visited.contains(&neighbor) || !index.contains_key(&neighbor) {
                continue;
            }
            let Some(&their_border) = snapshot.border.get(&neighbor) else {
                continue;
            };
            let their_guild = &snapshot.guild[&neighbor];
            if !edge_is_live(current_border, current_guild, their_border, their_guild) {
                continue;
            }
            if !is_passable_owner(their_guild) {
                continue;
            }
            visited.insert(neighbor.clone());
            if their_guild == hq_guild && neighbor != hq_name {
                externals.insert(neighbor.clone());
            }
            queue.push_back(neighbor);
        }
    }

    externals
}
