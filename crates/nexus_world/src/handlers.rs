//! The opcode handler set.
//!
//! Handlers are plain functions bound into a runtime registry, populated by
//! [`register_handlers`] before any acceptor starts. Dispatch runs a short
//! pipeline per frame: log, phase gate, parse, handler body. Handlers never
//! block; anything stateful is a message to the owning zone or the world
//! manager, and the few steps that must await (zone lookup, registration)
//! are returned as a [`HandlerOutcome`] for the session actor to finish.

use rustc_hash::FxHashMap;
use thiserror::Error;

use nexus_game::GameError;
use nexus_network::ConnectionHandle;
use nexus_protocol::packets::{
    ChatChannel, ClientChat, ClientCharacterListRequest, ClientCharacterSelect,
    ClientEnteredWorld, ClientEntityCommand, ClientKeepalive, ClientLootRequest,
    ClientNpcInteract, ClientSpellCast, CharacterSummary, ServerCharacterList, ServerChat,
    ServerKeepalive,
};
use nexus_protocol::{Message, Opcode, PacketFrame, ProtocolError};
use nexus_storage::CharacterSnapshot;

use crate::manager::WorldHandle;
use crate::zone::ZoneHandle;

/// Where in its lifecycle a session must be for a handler to run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    /// After the world handshake, before a character is chosen.
    CharacterSelect,
    /// Between character select and the entered-world confirmation.
    EnteringWorld,
    /// Fully in the world.
    InWorld,
    /// Anywhere.
    Any,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Follow-up work the session actor performs after a handler returns; the
/// handlers themselves are synchronous.
pub enum HandlerOutcome {
    Continue,
    SelectCharacter(u64),
    ConfirmEnteredWorld,
    Disconnect,
}

/// The per-session state handlers operate on.
pub enum SessionState {
    CharacterSelect {
        characters: Vec<CharacterSnapshot>,
    },
    EnteringWorld,
    InWorld(InWorldState),
}

pub struct InWorldState {
    pub character: CharacterSnapshot,
    pub entity_guid: u64,
    pub zone: ZoneHandle,
    pub sequence: u32,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        match self {
            SessionState::CharacterSelect { .. } => Phase::CharacterSelect,
            SessionState::EnteringWorld => Phase::EnteringWorld,
            SessionState::InWorld(_) => Phase::InWorld,
        }
    }
}

/// Everything a handler may touch.
pub struct SessionCtx<'a> {
    pub account_id: u64,
    pub state: &'a mut SessionState,
    pub handle: &'a ConnectionHandle,
    pub world: &'a WorldHandle,
}

pub type HandlerFn = fn(&mut SessionCtx<'_>, &PacketFrame) -> Result<HandlerOutcome, SessionError>;

pub struct HandlerSpec {
    pub name: &'static str,
    pub phase: Phase,
    pub run: HandlerFn,
}

/// Runtime opcode → handler map. Built once at startup; lookups afterwards
/// are read-only.
#[derive(Default)]
pub struct HandlerRegistry {
    map: FxHashMap<u16, HandlerSpec>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, opcode: Opcode, spec: HandlerSpec) {
        let prev = self.map.insert(opcode.to_u16(), spec);
        debug_assert!(prev.is_none(), "duplicate handler for {opcode}");
    }

    pub fn lookup(&self, raw_opcode: u16) -> Option<&HandlerSpec> {
        self.map.get(&raw_opcode)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Binds every client-originated opcode. Called once, before the world
/// acceptor starts taking connections.
pub fn register_handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register(
        Opcode::ClientCharacterListRequest,
        HandlerSpec {
            name: "character_list",
            phase: Phase::CharacterSelect,
            run: handle_character_list,
        },
    );
    registry.register(
        Opcode::ClientCharacterSelect,
        HandlerSpec {
            name: "character_select",
            phase: Phase::CharacterSelect,
            run: handle_character_select,
        },
    );
    registry.register(
        Opcode::ClientEnteredWorld,
        HandlerSpec {
            name: "entered_world",
            phase: Phase::EnteringWorld,
            run: handle_entered_world,
        },
    );
    registry.register(
        Opcode::ClientEntityCommand,
        HandlerSpec {
            name: "entity_command",
            phase: Phase::InWorld,
            run: handle_entity_command,
        },
    );
    registry.register(
        Opcode::ClientChat,
        HandlerSpec {
            name: "chat",
            phase: Phase::InWorld,
            run: handle_chat,
        },
    );
    registry.register(
        Opcode::ClientSpellCast,
        HandlerSpec {
            name: "spell_cast",
            phase: Phase::InWorld,
            run: handle_spell_cast,
        },
    );
    registry.register(
        Opcode::ClientNpcInteract,
        HandlerSpec {
            name: "npc_interact",
            phase: Phase::InWorld,
            run: handle_npc_interact,
        },
    );
    registry.register(
        Opcode::ClientLootRequest,
        HandlerSpec {
            name: "loot_request",
            phase: Phase::InWorld,
            run: handle_loot_request,
        },
    );
    registry.register(
        Opcode::ClientKeepalive,
        HandlerSpec {
            name: "keepalive",
            phase: Phase::Any,
            run: handle_keepalive,
        },
    );

    registry
}

fn in_world<'a>(ctx: &'a mut SessionCtx<'_>) -> Result<&'a mut InWorldState, SessionError> {
    match ctx.state {
        SessionState::InWorld(state) => Ok(state),
        _ => Err(GameError::NotInWorld.into()),
    }
}

fn handle_character_list(
    ctx: &mut SessionCtx<'_>,
    frame: &PacketFrame,
) -> Result<HandlerOutcome, SessionError> {
    frame.decode::<ClientCharacterListRequest>()?;
    let SessionState::CharacterSelect { characters } = &*ctx.state else {
        return Err(GameError::NotInWorld.into());
    };
    ctx.handle.send(&ServerCharacterList {
        characters: characters
            .iter()
            .map(|c| CharacterSummary {
                character_id: c.character_id,
                name: c.name.clone(),
                level: c.level,
                faction: c.faction.tag(),
                zone_id: c.zone_id,
            })
            .collect(),
    });
    Ok(HandlerOutcome::Continue)
}

fn handle_character_select(
    ctx: &mut SessionCtx<'_>,
    frame: &PacketFrame,
) -> Result<HandlerOutcome, SessionError> {
    let select: ClientCharacterSelect = frame.decode()?;
    let SessionState::CharacterSelect { characters } = &*ctx.state else {
        return Err(GameError::NotInWorld.into());
    };
    if !characters.iter().any(|c| c.character_id == select.character_id) {
        return Err(GameError::NotOwned.into());
    }
    Ok(HandlerOutcome::SelectCharacter(select.character_id))
}

fn handle_entered_world(
    _ctx: &mut SessionCtx<'_>,
    frame: &PacketFrame,
) -> Result<HandlerOutcome, SessionError> {
    frame.decode::<ClientEnteredWorld>()?;
    Ok(HandlerOutcome::ConfirmEnteredWorld)
}

fn handle_entity_command(
    ctx: &mut SessionCtx<'_>,
    frame: &PacketFrame,
) -> Result<HandlerOutcome, SessionError> {
    let msg: ClientEntityCommand = frame.decode()?;
    let state = in_world(ctx)?;
    state.sequence = state.sequence.wrapping_add(1);
    state.zone.movement(state.entity_guid, msg.commands);
    Ok(HandlerOutcome::Continue)
}

fn handle_chat(
    ctx: &mut SessionCtx<'_>,
    frame: &PacketFrame,
) -> Result<HandlerOutcome, SessionError> {
    let msg: ClientChat = frame.decode()?;
    if msg.text.chars().count() > 500 {
        return Err(GameError::MessageTooLong.into());
    }

    let account_id = ctx.account_id;
    let world = ctx.world;
    let state = match ctx.state {
        SessionState::InWorld(state) => state,
        _ => return Err(GameError::NotInWorld.into()),
    };

    match ChatChannel::from_u16(msg.channel) {
        ChatChannel::Whisper => {
            world.route_whisper(account_id, msg.target_name, msg.text);
        }
        // Zone chat crosses the whole instance, so the manager's zone index
        // does the fan-out rather than the zone's spatial grid.
        ChatChannel::Zone => {
            let packet = ServerChat {
                channel: msg.channel,
                from_guid: state.entity_guid,
                from_name: state.character.name.clone(),
                text: msg.text,
            };
            world.broadcast_to_zone(state.zone.key, Opcode::ServerChat, packet.to_payload());
        }
        // System is server-originated; a client asking for it gets say.
        ChatChannel::System => state.zone.chat(state.entity_guid, ChatChannel::Say, msg.text),
        channel => state.zone.chat(state.entity_guid, channel, msg.text),
    }
    Ok(HandlerOutcome::Continue)
}

fn handle_spell_cast(
    ctx: &mut SessionCtx<'_>,
    frame: &PacketFrame,
) -> Result<HandlerOutcome, SessionError> {
    let msg: ClientSpellCast = frame.decode()?;
    let state = in_world(ctx)?;
    state
        .zone
        .cast_spell(state.entity_guid, msg.spell_id, msg.target_guid);
    Ok(HandlerOutcome::Continue)
}

fn handle_npc_interact(
    ctx: &mut SessionCtx<'_>,
    frame: &PacketFrame,
) -> Result<HandlerOutcome, SessionError> {
    let msg: ClientNpcInteract = frame.decode()?;
    let state = in_world(ctx)?;
    state.zone.interact(state.entity_guid, msg.guid);
    Ok(HandlerOutcome::Continue)
}

fn handle_loot_request(
    ctx: &mut SessionCtx<'_>,
    frame: &PacketFrame,
) -> Result<HandlerOutcome, SessionError> {
    let msg: ClientLootRequest = frame.decode()?;
    let state = in_world(ctx)?;
    state.zone.loot(state.entity_guid, msg.corpse_guid);
    Ok(HandlerOutcome::Continue)
}

fn handle_keepalive(
    ctx: &mut SessionCtx<'_>,
    frame: &PacketFrame,
) -> Result<HandlerOutcome, SessionError> {
    let msg: ClientKeepalive = frame.decode()?;
    ctx.handle.send(&ServerKeepalive { seq: msg.seq });
    Ok(HandlerOutcome::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_client_opcode() {
        let registry = register_handlers();
        for op in [
            Opcode::ClientCharacterListRequest,
            Opcode::ClientCharacterSelect,
            Opcode::ClientEnteredWorld,
            Opcode::ClientEntityCommand,
            Opcode::ClientChat,
            Opcode::ClientSpellCast,
            Opcode::ClientNpcInteract,
            Opcode::ClientLootRequest,
            Opcode::ClientKeepalive,
        ] {
            assert!(registry.lookup(op.to_u16()).is_some(), "missing {op}");
        }
        assert_eq!(registry.len(), 9);
    }

    #[test]
    fn server_opcodes_have_no_handlers() {
        let registry = register_handlers();
        assert!(registry.lookup(Opcode::ServerChat.to_u16()).is_none());
        assert!(registry.lookup(Opcode::ServerHelloWorld.to_u16()).is_none());
        assert!(registry.lookup(0x0269).is_none());
    }
}
