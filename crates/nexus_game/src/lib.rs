//! The authoritative game model: entities, buffs, cooldowns, creature AI,
//! spell math, progression, inventory, and loot.
//!
//! Everything here is pure state plus synchronous methods; time enters as an
//! explicit `now_ms` argument and randomness as an explicit roll, so the
//! owning zone actor supplies both and tests drive the model
//! deterministically.

pub mod ai;
pub mod cooldowns;
pub mod effects;
pub mod entity;
pub mod faction;
pub mod guid;
pub mod inventory;
pub mod loot;
pub mod spell;
pub mod stats;
pub mod xp;

use thiserror::Error;

pub use crate::ai::{AiAction, AiConfig, AiState, AiStateKind};
pub use crate::cooldowns::Cooldowns;
pub use crate::effects::{ActiveEffects, BuffDebuff, BuffKind};
pub use crate::entity::{DamageOutcome, Entity};
pub use crate::faction::{Disposition, FactionTable, PlayerFaction};
pub use crate::guid::{EntityKind, Guid};
pub use crate::spell::{Spell, SpellEffect, SpellEffectKind, SpellSchool, TargetType};
pub use crate::stats::Stat;

/// Gameplay failures surfaced to handlers and translated into client-visible
/// deny packets (or logged, when internal).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum GameError {
    #[error("session has not entered the world")]
    NotInWorld,
    #[error("entity is dead")]
    NotAlive,
    #[error("target is out of range")]
    OutOfRange,
    #[error("spell is on cooldown")]
    OnCooldown,
    #[error("target is immune")]
    Immune,
    #[error("cast was interrupted")]
    CastInterrupted,
    #[error("inventory slot is occupied")]
    SlotOccupied,
    #[error("inventory slot index is invalid")]
    InvalidSlot,
    #[error("entity is not owned by this session")]
    NotOwned,
    #[error("recipient is offline")]
    RecipientOffline,
    #[error("recipient belongs to the enemy faction")]
    RecipientWrongFaction,
    #[error("recipient has you ignored")]
    RecipientIgnoredYou,
    #[error("unknown spell")]
    UnknownSpell,
    #[error("unknown target")]
    UnknownTarget,
    #[error("message is too long")]
    MessageTooLong,
    #[error("action is not allowed while in combat")]
    InCombat,
}
