//! Faction dispositions, used by creature aggro, whisper rejection, and PvP
//! checks.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerFaction {
    Exile,
    Dominion,
}

impl PlayerFaction {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PlayerFaction::Exile),
            1 => Some(PlayerFaction::Dominion),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            PlayerFaction::Exile => 0,
            PlayerFaction::Dominion => 1,
        }
    }
}

/// How an NPC faction relates to the world at large.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Friendly,
    Neutral,
    Hostile,
    /// Aligned with one player faction, hostile to the other.
    Aligned(PlayerFaction),
}

/// Faction id → disposition, loaded from content. Unknown ids default to
/// neutral, never hostile.
#[derive(Default, Clone, Debug)]
pub struct FactionTable {
    dispositions: FxHashMap<u32, Disposition>,
}

impl FactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, faction_id: u32, disposition: Disposition) {
        self.dispositions.insert(faction_id, disposition);
    }

    pub fn disposition(&self, faction_id: u32) -> Disposition {
        self.dispositions
            .get(&faction_id)
            .copied()
            .unwrap_or(Disposition::Neutral)
    }

    /// Is a creature of `creature_faction_id` hostile toward `player`?
    pub fn creature_hostile_to_player(&self, creature_faction_id: u32, player: PlayerFaction) -> bool {
        match self.disposition(creature_faction_id) {
            Disposition::Hostile => true,
            Disposition::Friendly | Disposition::Neutral => false,
            Disposition::Aligned(side) => side != player,
        }
    }
}

/// Mutual hostility between two player factions.
pub fn players_hostile(a: PlayerFaction, b: PlayerFaction) -> bool {
    a != b
}
