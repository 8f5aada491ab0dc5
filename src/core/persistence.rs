//! Versioned, LZ4-compressed save/load byte frame.
//!
//! Structural encoding is `bincode`; the outer frame adds an explicit
//! magic/version/flags header so `load_state_from_bytes` can reject
//! unparseable future versions instead of guessing.

use lz4_flex::block::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};

use crate::core::cost_table::{BonusKind, CostTable};
use crate::core::error::{CoreError, CoreResult};
use crate::core::guild::Guild;
use crate::core::options::{RuntimeOptions, TerritoryOptions, TreasuryOverride};
use crate::core::territory::Packet;
use crate::core::undo::UndoTree;

pub const MAGIC: [u8; 4] = *b"TERR";
pub const CURRENT_VERSION: u16 = 1;
pub const MAX_SUPPORTED_VERSION: u16 = 1;

/// Set when in-transit packets were encoded into the payload.
pub const FLAG_ENCODE_IN_TRANSIT: u16 = 0b0000_0001;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedGuild {
    pub name: String,
    pub tag: String,
    pub hq: Option<String>,
    pub allies: Vec<String>,
    pub claims: Vec<String>,
}

impl From<&Guild> for PersistedGuild {
    fn from(g: &Guild) -> Self {
        let mut allies: Vec<String> = g.allies.iter().cloned().collect();
        allies.sort();
        let mut claims: Vec<String> = g.claims.iter().cloned().collect();
        claims.sort();
        Self {
            name: g.name.clone(),
            tag: g.tag.clone(),
            hq: g.hq.clone(),
            allies,
            claims,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTerritory {
    pub name: String,
    pub set: TerritoryOptions,
    pub at_damage: u8,
    pub at_attack: u8,
    pub at_health: u8,
    pub at_defence: u8,
    pub at_bonuses: Vec<(BonusKind, u8)>,
    pub storage_at: crate::core::resources::ResourceVec,
    pub storage_capacity: crate::core::resources::ResourceVec,
    pub treasury_ticks_held: u64,
    pub treasury_override: TreasuryOverride,
    pub guild: String,
    pub hq: bool,
}

#[derive(Serialize, Deserialize)]
struct PersistedPayload {
    runtime_options: RuntimeOptions,
    cost_table: CostTable,
    guilds: Vec<PersistedGuild>,
    territories: Vec<PersistedTerritory>,
    /// Present only when `RuntimeOptions.encode_in_transit_resources` was set
    /// at save time.
    in_transit: Option<Vec<(String, Vec<Packet>)>>,
    current_tick: u64,
    halted: bool,
    undo_tree: UndoTree,
}

/// Everything the facade needs to assemble/disassemble a `World` snapshot,
/// decoupled from `bevy_ecs` storage so this module has no `World` dependency.
pub struct WorldSnapshot {
    pub runtime_options: RuntimeOptions,
    pub cost_table: CostTable,
    pub guilds: Vec<PersistedGuild>,
    pub territories: Vec<PersistedTerritory>,
    pub in_transit: Option<Vec<(String, Vec<Packet>)>>,
    pub current_tick: u64,
    pub halted: bool,
    pub undo_tree: UndoTree,
}

pub fn save_state_to_bytes(snapshot: WorldSnapshot) -> CoreResult<Vec<u8>> {
    let payload = PersistedPayload {
        runtime_options: snapshot.runtime_options,
        cost_table: snapshot.cost_table,
        guilds: snapshot.guilds,
        territories: snapshot.territories,
        in_transit: snapshot.in_transit,
        current_tick: snapshot.current_tick,
        halted: snapshot.halted,
        undo_tree: snapshot.undo_tree,
    };
    let encoded = bincode::serialize(&payload).map_err(|e| CoreError::CorruptPayload(e.to_string()))?;
    let compressed = compress_prepend_size(&encoded);

    let mut flags = 0u16;
    if payload.in_transit.is_some() {
        flags |= FLAG_ENCODE_IN_TRANSIT;
    }

    let mut frame = Vec::with_capacity(4 + 2 + 2 + compressed.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
    frame.extend_from_slice(&flags.to_le_bytes());
    frame.extend_from_slice(&compressed);
    Ok(frame)
}

pub fn load_state_from_bytes(bytes: &[u8]) -> CoreResult<WorldSnapshot> {
    if bytes.len() < 8 {
        return Err(CoreError::CorruptPayload("frame shorter than header".to_string()));
    }
    let (magic, rest) = bytes.split_at(4);
    if magic != MAGIC {
        return Err(CoreError::CorruptPayload("bad magic".to_string()));
    }
    let (version_bytes, rest) = rest.split_at(2);
    let version = u16::from_le_bytes(version_bytes.try_into().unwrap());
    if version > MAX_SUPPORTED_VERSION {
        return Err(CoreError::VersionUnsupported {
            found: version,
            max_supported: MAX_SUPPORTED_VERSION,
        });
    }
    let (_flags_bytes, payload_bytes) = rest.split_at(2);

    let decompressed =
        decompress_size_prepended(payload_bytes).map_err(|e| CoreError::CorruptPayload(e.to_string()))?;
    let payload: PersistedPayload =
        bincode::deserialize(&decompressed).map_err(|e| CoreError::CorruptPayload(e.to_string()))?;

    Ok(WorldSnapshot {
        runtime_options: payload.runtime_options,
        cost_table: payload.cost_table,
        guilds: payload.guilds,
        territories: payload.territories,
        in_transit: payload.in_transit,
        current_tick: payload.current_tick,
        halted: payload.halted,
        undo_tree: payload.undo_tree,
    })
}
