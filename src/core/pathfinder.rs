//! Route production: a `plan(source, policy) -> route_list` capability
//! with `{Dijkstra, AStar, FloodFill, Plugin(id)}` variants, the last
//! dispatching to a registered `PathPlanner` trait object.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use bevy_ecs::prelude::{Resource, World};
use tracing::warn;

use crate::core::guild::{Guild, GuildIndex};
use crate::core::options::PathfindingAlgorithm;
use crate::core::territory::{ConfigSet, Links, Ownership, Routes, RoutesDirty, TerritoryIndex};

/// A read-only view of the live-adjacency graph and per-node tax/ownership
/// facts, built once per pathfinder pass and handed to every planner.
pub struct GraphView {
    pub direct: HashMap<String, HashSet<String>>,
    pub guild_of: HashMap<String, String>,
    pub tax_self: HashMap<String, f64>,
    pub tax_ally: HashMap<String, f64>,
}

pub struct GuildPolicy {
    pub requester_guild: String,
    pub allies: HashSet<String>,
}

impl GraphView {
    /// Edge weight for "cheapest" mode entering `v`, as seen by a packet
    /// owned by `policy.requester_guild`.
    fn cheapest_weight(&self, v: &str, policy: &GuildPolicy) -> f64 {
        let owner = match self.guild_of.get(v) {
            Some(o) => o,
            None => return f64::INFINITY,
        };
        if *owner == policy.requester_guild {
            0.0
        } else if policy.allies.contains(owner) {
            self.tax_ally.get(v).copied().unwrap_or(0.70)
        } else {
            self.tax_self.get(v).copied().unwrap_or(0.70)
        }
    }
}

/// Capability trait a plugin path provider implements.
pub trait PathPlanner: Send + Sync {
    fn plan(&self, graph: &GraphView, source: &str, policy: &GuildPolicy) -> Vec<Vec<String>>;
}

#[derive(Resource, Default)]
pub struct PluginProviders {
    providers: HashMap<String, Box<dyn PathPlanner>>,
}

impl PluginProviders {
    pub fn register(&mut self, id: impl Into<String>, planner: Box<dyn PathPlanner>) {
        self.providers.insert(id.into(), planner);
    }

    pub fn get(&self, id: &str) -> Option<&dyn PathPlanner> {
        self.providers.get(id).map(|b| b.as_ref())
    }
}

#[derive(Eq, PartialEq)]
struct HeapEntry {
    cost_milli: i64, // cost scaled and negated for min-heap via BinaryHeap (max-heap)
    hops: u32,
    name: String,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap: smaller cost, then fewer hops, then name.
        other
            .cost_milli
            .cmp(&self.cost_milli)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.name.cmp(&self.name))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra over `cheapest_weight`, tie-broken by hop count then name.
pub fn plan_dijkstra(graph: &GraphView, source: &str, target: &str, policy: &GuildPolicy) -> Option<Vec<String>> {
    if source == target {
        return Some(Vec::new());
    }
    let mut best_cost: HashMap<String, (i64, u32)> = HashMap::new();
    let mut prev: HashMap<String, String> = HashMap::new();
    let mut heap = BinaryHeap::new();

    best_cost.insert(source.to_string(), (0, 0));
    heap.push(HeapEntry {
        cost_milli: 0,
        hops: 0,
        name: source.to_string(),
    });

    while let Some(HeapEntry { cost_milli, hops, name }) = heap.pop() {
        if let Some(&(known_cost, known_hops)) = best_cost.get(&name) {
            if (known_cost, known_hops) != (cost_milli, hops) {
                continue; // stale heap entry
            }
        }
        if name == target {
            break;
        }
        let Some(neighbors) = graph.direct.get(&name) else {
            continue;
        };
        let mut ordered: Vec<_> = neighbors.iter().cloned().collect();
        ordered.sort();
        for neighbor in ordered {
            let edge_weight = (graph.cheapest_weight(&neighbor, policy) * 1_000_000.0).round() as i64;
            let candidate_cost = cost_milli + edge_weight;
            let candidate_hops = hops + 1;
            let better = match best_cost.get(&neighbor) {
                None => true,
                Some(&(c, h)) => (candidate_cost, candidate_hops, &neighbor) < (c, h, &neighbor),
            };
            if better {
                best_cost.insert(neighbor.clone(), (candidate_cost, candidate_hops));
                prev.insert(neighbor.clone(), name.clone());
                heap.push(HeapEntry {
                    cost_milli: candidate_cost,
                    hops: candidate_hops,
                    name: neighbor,
                });
            }
        }
    }

    if !best_cost.contains_key(target) {
        return None;
    }
    Some(reconstruct(&prev, source, target))
}

/// Unit-weight BFS ("fastest"), same border rules, same tie-break.
pub fn plan_fastest(graph: &GraphView, source: &str, target: &str) -> Option<Vec<String>> {
    if source == target {
        return Some(Vec::new());
    }
    let mut visited = HashSet::new();
    let mut prev = HashMap::new();
    let mut queue = VecDeque::new();
    visited.insert(source.to_string());
    queue.push_back(source.to_string());

    while let Some(current) = queue.pop_front() {
        let Some(neighbors) = graph.direct.get(&current) else {
            continue;
        };
        let mut ordered: Vec<_> = neighbors.iter().cloned().collect();
        ordered.sort();
        for neighbor in ordered {
            if visited.insert(neighbor.clone()) {
                prev.insert(neighbor.clone(), current.clone());
                if neighbor == target {
                    return Some(reconstruct(&prev, source, target));
                }
                queue.push_back(neighbor);
            }
        }
    }
    None
}

/// Reach set from `source`, excluding `source` itself. Flood fill is a
/// diagnostic reach-class computation, not per-destination routes (see
/// DESIGN.md).
pub fn plan_flood_fill(graph: &GraphView, source: &str) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(source.to_string());
    queue.push_back(source.to_string());
    let mut reach = Vec::new();

    while let Some(current) = queue.pop_front() {
        let Some(neighbors) = graph.direct.get(&current) else {
            continue;
        };
        let mut ordered: Vec<_> = neighbors.iter().cloned().collect();
        ordered.sort();
        for neighbor in ordered {
            if visited.insert(neighbor.clone()) {
                reach.push(neighbor.clone());
                queue.push_back(neighbor);
            }
        }
    }
    reach
}

fn reconstruct(prev: &HashMap<String, String>, source: &str, target: &str) -> Vec<String> {
    let mut route = vec![target.to_string()];
    let mut current = target.to_string();
    while let Some(p) = prev.get(&current) {
        if p == source {
            break;
        }
        route.push(p.clone());
        current = p.clone();
    }
    route.reverse();
    route
}

/// A route is well-formed iff every hop keeps flowing through live,
/// border-permitted edges. Used to validate plugin-returned routes.
fn route_respects_policy(graph: &GraphView, source: &str, route: &[String]) -> bool {
    let mut current = source.to_string();
    for hop in route {
        match graph.direct.get(&current) {
            Some(neighbors) if neighbors.contains(hop) => current = hop.clone(),
            _ => return false,
        }
    }
    true
}

fn build_graph_view(world: &World, index: &HashMap<String, bevy_ecs::prelude::Entity>) -> GraphView {
    let mut direct = HashMap::new();
    let mut guild_of = HashMap::new();
    let mut tax_self = HashMap::new();
    let mut tax_ally = HashMap::new();

    for (name, &entity) in index {
        let links = world.get::<Links>(entity).unwrap();
        direct.insert(name.clone(), links.direct.clone());
        let own = world.get::<Ownership>(entity).unwrap();
        guild_of.insert(name.clone(), own.guild.clone());
        let set = world.get::<ConfigSet>(entity).unwrap();
        tax_self.insert(name.clone(), set.0.tax.zelf);
        tax_ally.insert(name.clone(), set.0.tax.ally);
    }

    GraphView {
        direct,
        guild_of,
        tax_self,
        tax_ally,
    }
}

fn guild_policy(world: &World, guild_name: &str) -> GuildPolicy {
    let allies = world
        .resource::<GuildIndex>()
        .get(guild_name)
        .and_then(|e| world.get::<Guild>(e))
        .map(|g| g.allies.clone())
        .unwrap_or_default();
    GuildPolicy {
        requester_guild: guild_name.to_string(),
        allies,
    }
}

/// Recomputes `Routes` for every territory whose routes are marked dirty.
/// Each territory's single destination route is the path to its own guild's
/// HQ, under the world's configured `pathfinding_algorithm` (or the
/// territory's own `routing_mode` when the world algorithm is `Dijkstra`,
/// letting each territory choose cheapest vs. fastest locally).
pub fn pathfinder_system(world: &mut World) {
    use bevy_ecs::prelude::{Entity, With};

    let any_dirty = {
        let mut query = world.query_filtered::<Entity, With<RoutesDirty>>();
        query.iter(world).next().is_some()
    };
    if !any_dirty {
        return;
    }

    let index = world.resource::<TerritoryIndex>().as_map().clone();
    let graph = build_graph_view(world, &index);
    let algorithm = world
        .resource::<crate::core::options::RuntimeOptions>()
        .pathfinding_algorithm;

    let mut names: Vec<_> = index.keys().cloned().collect();
    names.sort();

    for name in &names {
        let entity = index[name];
        let own = world.get::<Ownership>(entity).unwrap();
        let guild_name = own.guild.clone();
        let is_hq = own.hq;
        let hq_name = find_hq(world, &index, &guild_name);

        let routes = if is_hq || hq_name.as_deref() == Some(name.as_str()) {
            Vec::new()
        } else if let Some(hq) = hq_name.as_deref() {
            let policy = guild_policy(world, &guild_name);
            let set_mode = world.get::<ConfigSet>(entity).unwrap().0.routing_mode;
            let route = match algorithm {
                PathfindingAlgorithm::FloodFill => {
                    let reach = plan_flood_fill(&graph, name);
                    vec![reach]
                }
                PathfindingAlgorithm::Dijkstra | PathfindingAlgorithm::AStar => {
                    use crate::core::options::RoutingMode;
                    let planned = match set_mode {
                        RoutingMode::Cheapest => plan_dijkstra(&graph, name, hq, &policy),
                        RoutingMode::Fastest => plan_fastest(&graph, name, hq),
                    };
                    planned.map(|r| vec![r]).unwrap_or_default()
                }
            };
            route
        } else {
            Vec::new()
        };

        if let Some(plugin_id) = plugin_override(world) {
            if let Some(planner) = world.resource::<PluginProviders>().get(&plugin_id) {
                let policy = guild_policy(world, &guild_name);
                let plugin_routes = planner.plan(&graph, name, &policy);
                let valid = plugin_routes
                    .iter()
                    .all(|r| route_respects_policy(&graph, name, r));
                if valid && !plugin_routes.is_empty() {
                    let mut r = world.get_mut::<Routes>(entity).unwrap();
                    r.to_destinations = plugin_routes;
                    world.entity_mut(entity).remove::<RoutesDirty>();
                    continue;
                }
                warn!(provider = %plugin_id, territory = %name, "plugin route invalid, falling back to dijkstra");
                world
                    .resource_mut::<crate::core::events::WorldEventLog>()
                    .push(crate::core::events::TransitEvent::RouteReplannedAfterInvalidPlugin {
                        territory: name.clone(),
                        provider: plugin_id.clone(),
                    });

                // Spec §4.4: a malformed plugin route always falls back to
                // the built-in dijkstra planner specifically, never to
                // whatever algorithm the world happens to have configured
                // (flood-fill would otherwise leak through here unnoticed).
                let dijkstra_routes = if is_hq {
                    Vec::new()
                } else if let Some(hq) = hq_name.as_deref() {
                    plan_dijkstra(&graph, name, hq, &policy).map(|r| vec![r]).unwrap_or_default()
                } else {
                    Vec::new()
                };
                let mut r = world.get_mut::<Routes>(entity).unwrap();
                r.to_destinations = dijkstra_routes;
                world.entity_mut(entity).remove::<RoutesDirty>();
                continue;
            }
        }

        let mut r = world.get_mut::<Routes>(entity).unwrap();
        r.to_destinations = routes;
        world.entity_mut(entity).remove::<RoutesDirty>();
    }
}

fn plugin_override(world: &World) -> Option<String> {
    world
        .resource::<crate::core::options::RuntimeOptions>()
        .pathfinder_provider
        .clone()
}

fn find_hq(world: &World, index: &HashMap<String, bevy_ecs::prelude::Entity>, guild_name: &str) -> Option<String> {
    let mut names: Vec<_> = index.keys().cloned().collect();
    names.sort();
    for name in names {
        let entity = index[&name];
        let own = world.get::<Ownership>(entity).unwrap();
        if own.guild == guild_name && own.hq {
            return Some(name);
        }
    }
    None
}
