//! The server-side record of one connected, in-world client.

use rustc_hash::FxHashSet;

use nexus_game::PlayerFaction;
use nexus_network::ConnectionHandle;

/// Names one running zone simulation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ZoneKey {
    pub world_id: u32,
    pub instance_id: u32,
}

impl ZoneKey {
    pub fn new(world_id: u32, instance_id: u32) -> Self {
        Self { world_id, instance_id }
    }
}

impl std::fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.world_id, self.instance_id)
    }
}

/// Registry entry owned by the world manager. The connection handle is a
/// delivery address, never a lifetime anchor: the connection actor outlives
/// or dies independently of this record.
#[derive(Clone)]
pub struct Session {
    pub account_id: u64,
    pub character_id: u64,
    pub character_name: String,
    pub entity_guid: u64,
    pub faction: PlayerFaction,
    pub in_world: bool,
    pub zone: ZoneKey,
    pub handle: ConnectionHandle,
    pub sequence: u32,
    /// Character names this player refuses whispers from (lowercase).
    pub ignore_list: FxHashSet<String>,
}
