//! Guild records and the registry that owns them.

use std::collections::{HashMap, HashSet};

use bevy_ecs::prelude::{Component, Entity, Resource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Component, Serialize, Deserialize)]
pub struct Guild {
    pub name: String,
    pub tag: String,
    pub hq: Option<String>,
    pub allies: HashSet<String>,
    pub claims: HashSet<String>,
}

impl Guild {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        debug_assert!(tag.chars().count() <= 5, "guild tag must be <= 5 chars");
        Self {
            name: name.into(),
            tag,
            hq: None,
            allies: HashSet::new(),
            claims: HashSet::new(),
        }
    }

    pub fn is_ally_of(&self, other: &str) -> bool {
        self.allies.contains(other)
    }
}

/// Maps guild name to its `bevy_ecs` entity, the same name-to-entity
/// index shape `TerritoryIndex` uses for territories.
#[derive(Debug, Clone, Resource, Default)]
pub struct GuildIndex {
    by_name: HashMap<String, Entity>,
}

impl GuildIndex {
    pub fn insert(&mut self, name: impl Into<String>, entity: Entity) {
        self.by_name.insert(name.into(), entity);
    }

    pub fn get(&self, name: &str) -> Option<Entity> {
        self.by_name.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) {
        self.by_name.remove(name);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &HashMap<String, Entity> {
        &self.by_name
    }
}

/// Makes `guild_a` and `guild_b` allies of one another. Symmetric by construction.
pub fn add_ally_pair(guilds: &mut HashMap<String, Guild>, a: &str, b: &str) {
    if let Some(g) = guilds.get_mut(a) {
        g.allies.insert(b.to_string());
    }
    if let Some(g) = guilds.get_mut(b) {
        g.allies.insert(a.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ally_pair_is_symmetric() {
        let mut guilds = HashMap::new();
        guilds.insert("X".to_string(), Guild::new("X", "XXX"));
        guilds.insert("Y".to_string(), Guild::new("Y", "YYY"));
        add_ally_pair(&mut guilds, "X", "Y");
        assert!(guilds["X"].is_ally_of("Y"));
        assert!(guilds["Y"].is_ally_of("X"));
    }
}
