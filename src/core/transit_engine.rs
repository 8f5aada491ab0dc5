//! Moves resources along routes, applies pass-through taxation, honors
//! closed borders.
//!
//! Whole-graph like the link resolver (a packet's next hop depends on the
//! destination territory's owner/border, looked up by name), so this is an
//! exclusive system rather than a per-entity query.

use std::collections::HashMap;

use bevy_ecs::prelude::{Entity, World};
use tracing::{debug, warn};

use crate::core::events::{TransitEvent, WorldEventLog};
use crate::core::guild::{Guild, GuildIndex};
use crate::core::options::Border;
use crate::core::territory::{ConfigSet, Ownership, Packet, Routes, Storage, TerritoryIndex, TransitBuffer};

/// Emits one packet per territory with a non-empty route and available
/// production surplus, carrying its whole current `Storage.At` to the first
/// hop: each producer pushes packets toward HQ along its computed route,
/// once per tick, whenever storage is nonzero and a route exists.
pub fn transit_emission_system(world: &mut World, current_tick: u64) {
    let index = world.resource::<TerritoryIndex>().as_map().clone();
    let mut names: Vec<_> = index.keys().cloned().collect();
    names.sort();

    for name in &names {
        let entity = index[name];
        let routes = world.get::<Routes>(entity).unwrap().to_destinations.clone();
        let Some(route) = routes.first() else {
            continue;
        };
        if route.is_empty() {
            continue;
        }
        let mut storage = world.get_mut::<Storage>(entity).unwrap();
        if storage.at.is_zero() {
            continue;
        }
        let amounts = storage.at;
        storage.at = crate::core::resources::ResourceVec::ZERO;

        let own = world.get::<Ownership>(entity).unwrap();
        let guild = own.guild.clone();
        let destination = route.last().cloned().unwrap();
        let first_hop = route[0].clone();

        let next_hop_tax = effective_tax(world, &index, &first_hop, &guild);
        let packet = Packet {
            origin: name.clone(),
            destination,
            guild,
            next_hop: Some(first_hop),
            remaining_route: route.clone(),
            amounts,
            next_hop_tax,
            created_tick: current_tick,
        };
        world.get_mut::<TransitBuffer>(entity).unwrap().packets.push(packet);
    }
}

fn effective_tax(world: &World, index: &HashMap<String, Entity>, hop: &str, packet_guild: &str) -> f64 {
    let Some(&entity) = index.get(hop) else {
        return 0.0;
    };
    let own = world.get::<Ownership>(entity).unwrap();
    if own.guild == packet_guild {
        return 0.0;
    }
    let is_ally = world
        .resource::<GuildIndex>()
        .get(packet_guild)
        .and_then(|e| world.get::<Guild>(e))
        .map(|g| g.is_ally_of(&own.guild))
        .unwrap_or(false);
    let set = world.get::<ConfigSet>(entity).unwrap();
    if is_ally {
        set.0.tax.ally
    } else {
        set.0.tax.zelf
    }
}

/// Advances every in-transit packet one hop: destroys it at a closed border
/// owned by a foreign guild, taxes it multiplicatively at each live hop, and
/// delivers it into destination storage on arrival.
pub fn transit_advance_system(world: &mut World) {
    let index = world.resource::<TerritoryIndex>().as_map().clone();
    let mut names: Vec<_> = index.keys().cloned().collect();
    names.sort();

    // Drain every territory's buffer first so a packet delivered this tick
    // into another territory's buffer isn't immediately re-processed.
    let mut drained: Vec<(String, Vec<Packet>)> = Vec::new();
    for name in &names {
        let entity = index[name];
        let mut buffer = world.get_mut::<TransitBuffer>(entity).unwrap();
        if buffer.packets.is_empty() {
            continue;
        }
        let packets = std::mem::take(&mut buffer.packets);
        drained.push((name.clone(), packets));
    }

    let mut deliveries: HashMap<String, Vec<Packet>> = HashMap::new();
    let mut in_place: HashMap<String, Vec<Packet>> = HashMap::new();

    for (origin_node, packets) in drained {
        for mut packet in packets {
            let Some(hop) = packet.next_hop.clone() else {
                continue;
            };
            let Some(&hop_entity) = index.get(&hop) else {
                continue;
            };
            let own = world.get::<Ownership>(hop_entity).unwrap();
            let set = world.get::<ConfigSet>(hop_entity).unwrap();
            let same_guild = own.guild == packet.guild;

            if set.0.border == Border::Closed && !same_guild {
                world.resource_mut::<WorldEventLog>().push(TransitEvent::PacketDestroyed {
                    at: hop.clone(),
                    origin: packet.origin.clone(),
                    guild: packet.guild.clone(),
                });
                debug!(node = %hop, origin = %origin_node, "packet destroyed at closed border");
                continue;
            }

            let tax = packet.next_hop_tax;
            packet.amounts = packet.amounts.map(|v| v * (1.0 - tax));

            packet.remaining_route.remove(0);
            if packet.remaining_route.is_empty() {
                deliveries.entry(hop.clone()).or_default().push(packet);
            } else {
                let next_hop = packet.remaining_route[0].clone();
                packet.next_hop_tax = effective_tax(world, &index, &next_hop, &packet.guild);
                packet.next_hop = Some(next_hop);
                in_place.entry(hop.clone()).or_default().push(packet);
            }
        }
    }

    for (name, mut packets) in deliveries {
        let Some(&entity) = index.get(&name) else {
            continue;
        };
        let mut storage = world.get_mut::<Storage>(entity).unwrap();
        for packet in packets.drain(..) {
            let (clamped, overflow) = storage.at.zip_map(packet.amounts, |have, amt| have + amt).clip_to_capacity(storage.capacity);
            storage.at = clamped;
            if !overflow.is_zero() {
                warn!(territory = %name, "delivered packet overflowed storage capacity");
            }
        }
    }

    for (name, packets) in in_place {
        let Some(&entity) = index.get(&name) else {
            continue;
        };
        world.get_mut::<TransitBuffer>(entity).unwrap().packets.extend(packets);
    }
}

/// Packets currently passing through `territory_name`. At-most-one-tick
/// staleness is satisfied by calling this only between ticks, never
/// mid-advance.
pub fn transit_resources_for(world: &World, territory_name: &str) -> Vec<Packet> {
    let Some(entity) = world.resource::<TerritoryIndex>().get(territory_name) else {
        return Vec::new();
    };
    world
        .get::<TransitBuffer>(entity)
        .map(|b| b.packets.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resources::ResourceVec;

    fn packet(guild: &str, tax: f64, remaining: Vec<&str>) -> Packet {
        Packet {
            origin: "A".to_string(),
            destination: remaining.last().unwrap().to_string(),
            guild: guild.to_string(),
            next_hop: remaining.first().map(|s| s.to_string()),
            remaining_route: remaining.into_iter().map(str::to_string).collect(),
            amounts: ResourceVec {
                wood: 100.0,
                ..ResourceVec::ZERO
            },
            next_hop_tax: tax,
            created_tick: 0,
        }
    }

    #[test]
    fn tax_is_multiplicative_loss() {
        let mut p = packet("X", 0.20, vec!["V", "B"]);
        p.amounts = p.amounts.map(|v| v * (1.0 - p.next_hop_tax));
        assert!((p.amounts.wood - 80.0).abs() < 1e-9);
    }

    #[test]
    fn zero_tax_same_guild_preserves_amount() {
        let p = packet("X", 0.0, vec!["B"]);
        let amounts = p.amounts.map(|v| v * (1.0 - p.next_hop_tax));
        assert_eq!(amounts.wood, 100.0);
    }
}
