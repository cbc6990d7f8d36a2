//! The session actor for one world connection.
//!
//! Consumes the frame mailbox produced by the connection's reader task,
//! dispatches through the handler registry, and performs the few async
//! follow-ups (character load, zone lookup, registration) that handlers
//! return as outcomes. On disconnect it unwinds everything the session
//! touched: zone membership, the registry entry, and a final snapshot into
//! the save queue.

use std::collections::VecDeque;
use std::sync::Arc;

use glam::Vec3;
use rustc_hash::FxHashSet;
use tracing::{debug, info, trace, warn};

use nexus_game::{Entity, EntityKind, Stat};
use nexus_network::clock::monotonic_ms;
use nexus_network::NewWorldClient;
use nexus_protocol::packets::{ServerDisconnectNotice, ServerWorldEnter};
use nexus_protocol::{Opcode, PacketFrame};
use nexus_storage::{CharacterSnapshot, Persistence, SaveQueue};

use crate::handlers::{
    HandlerOutcome, HandlerRegistry, InWorldState, Phase, SessionCtx, SessionError, SessionState,
};
use crate::manager::WorldHandle;
use crate::session::{Session, ZoneKey};
use crate::zone::{PlayerDeparture, PlayerEntry};

/// Unknown or malformed frames tolerated per rolling minute before the
/// session is cut.
const MAX_STRIKES: usize = 30;
const STRIKE_WINDOW_MS: u64 = 60_000;

/// Shared dependencies for spawning sessions.
pub struct SessionDeps {
    pub world: WorldHandle,
    pub persistence: Arc<dyn Persistence>,
    pub save_queue: Arc<SaveQueue>,
    pub registry: Arc<HandlerRegistry>,
}

/// Accepts handshaken world connections and runs one session actor each.
pub async fn run_session_acceptor(rx: flume::Receiver<NewWorldClient>, deps: Arc<SessionDeps>) {
    while let Ok(client) = rx.recv_async().await {
        let deps = deps.clone();
        tokio::spawn(async move {
            WorldSession::new(client, deps).run().await;
        });
    }
}

pub struct WorldSession {
    client: NewWorldClient,
    deps: Arc<SessionDeps>,
    state: SessionState,
    /// Set between character select and the client's entered-world
    /// confirmation.
    pending_entry: Option<InWorldState>,
    strikes: VecDeque<u64>,
}

impl WorldSession {
    pub fn new(client: NewWorldClient, deps: Arc<SessionDeps>) -> Self {
        Self {
            client,
            deps,
            state: SessionState::CharacterSelect { characters: vec![] },
            pending_entry: None,
            strikes: VecDeque::new(),
        }
    }

    pub async fn run(mut self) {
        let account_id = self.client.account_id;

        match self.deps.persistence.list_characters(account_id).await {
            Ok(characters) => {
                self.state = SessionState::CharacterSelect { characters };
            }
            Err(e) => {
                // Storage down at login: nothing useful to offer.
                warn!(account_id, "character list unavailable: {e}");
                self.client.handle.send(&ServerDisconnectNotice { reason: 2 });
                self.client.handle.close();
                return;
            }
        }

        info!(account_id, peer = %self.client.peer, "world session started");

        loop {
            let frame = match self.client.frames.recv_async().await {
                Ok(frame) => frame,
                // Reader gone: the socket closed.
                Err(_) => break,
            };
            if !self.dispatch(frame).await {
                break;
            }
        }

        self.cleanup().await;
        info!(account_id, "world session ended");
    }

    /// Runs the handler pipeline for one frame. Returns `false` to end the
    /// session.
    async fn dispatch(&mut self, frame: PacketFrame) -> bool {
        let Some(opcode) = Opcode::from_u16(frame.opcode) else {
            return self.strike(frame.opcode, "unknown opcode");
        };

        let Some(spec) = self.deps.registry.lookup(frame.opcode) else {
            // Known opcode, but not one a client may send.
            return self.strike(frame.opcode, "unhandled opcode");
        };

        let handler_name = spec.name;

        trace!(handler = handler_name, %opcode, len = frame.body.len(), "dispatch");

        if spec.phase != Phase::Any && spec.phase != self.state.phase() {
            // Out-of-state game packets are a protocol violation.
            warn!(%opcode, phase = ?self.state.phase(), "opcode out of state, disconnecting");
            self.client.handle.send(&ServerDisconnectNotice { reason: 3 });
            self.client.handle.close();
            return false;
        }

        let mut ctx = SessionCtx {
            account_id: self.client.account_id,
            state: &mut self.state,
            handle: &self.client.handle,
            world: &self.deps.world,
        };

        match (spec.run)(&mut ctx, &frame) {
            Ok(HandlerOutcome::Continue) => true,
            Ok(HandlerOutcome::SelectCharacter(character_id)) => {
                self.enter_world(character_id).await
            }
            Ok(HandlerOutcome::ConfirmEnteredWorld) => self.confirm_entered().await,
            Ok(HandlerOutcome::Disconnect) => {
                self.client.handle.close();
                false
            }
            Err(SessionError::Game(e)) => {
                debug!(handler = handler_name, error = %e, "handler refused");
                true
            }
            Err(SessionError::Protocol(e)) => {
                self.strike(frame.opcode, "malformed payload");
                debug!(handler = handler_name, error = %e, "payload failed to parse");
                true
            }
        }
    }

    /// Permissive bad-frame policy: log, count, and only disconnect past the
    /// per-minute threshold.
    fn strike(&mut self, raw_opcode: u16, what: &str) -> bool {
        let now = monotonic_ms();
        debug!(opcode = raw_opcode, what, "tolerated frame");
        self.strikes.push_back(now);
        while self
            .strikes
            .front()
            .is_some_and(|&at| at + STRIKE_WINDOW_MS <= now)
        {
            self.strikes.pop_front();
        }
        if self.strikes.len() > MAX_STRIKES {
            warn!(
                account_id = self.client.account_id,
                "too many bad frames, disconnecting"
            );
            self.client.handle.send(&ServerDisconnectNotice { reason: 3 });
            self.client.handle.close();
            return false;
        }
        true
    }

    async fn enter_world(&mut self, character_id: u64) -> bool {
        let SessionState::CharacterSelect { characters } = &self.state else {
            return true;
        };
        let Some(snapshot) = characters
            .iter()
            .find(|c| c.character_id == character_id)
            .cloned()
        else {
            return true;
        };

        let zone_key = ZoneKey::new(snapshot.zone_id, 1);
        let Some(zone) = self.deps.world.zone(zone_key).await else {
            warn!(zone = %zone_key, "zone unavailable");
            self.client.handle.send(&ServerDisconnectNotice { reason: 2 });
            self.client.handle.close();
            return false;
        };

        let entity_guid = self.deps.world.allocate_guid(EntityKind::Player);
        let session = Session {
            account_id: self.client.account_id,
            character_id,
            character_name: snapshot.name.clone(),
            entity_guid,
            faction: snapshot.faction,
            in_world: false,
            zone: zone_key,
            handle: self.client.handle.clone(),
            sequence: 0,
            ignore_list: FxHashSet::default(),
        };

        if let Err(e) = self.deps.world.register(session).await {
            warn!(account_id = self.client.account_id, error = %e, "registration refused");
            self.client.handle.send(&ServerDisconnectNotice { reason: 4 });
            self.client.handle.close();
            return false;
        }

        self.client.handle.send(&ServerWorldEnter {
            guid: entity_guid,
            zone_id: snapshot.zone_id,
            instance_id: zone_key.instance_id,
            x: snapshot.position[0],
            y: snapshot.position[1],
            z: snapshot.position[2],
            rotation: snapshot.rotation,
        });

        // Entry into the zone itself waits for the client's confirmation.
        self.pending_entry = Some(InWorldState {
            character: snapshot,
            entity_guid,
            zone,
            sequence: 0,
        });
        self.state = SessionState::EnteringWorld;
        true
    }

    async fn confirm_entered(&mut self) -> bool {
        let Some(state) = self.pending_entry.take() else {
            return true;
        };

        let entity = player_entity(&state.character, state.entity_guid);
        let entry = PlayerEntry {
            entity,
            account_id: self.client.account_id,
            faction: state.character.faction,
            xp: state.character.xp,
            handle: self.client.handle.clone(),
        };
        if !state.zone.add_player(entry).await {
            warn!(zone = %state.zone.key, "zone rejected player");
            self.client.handle.close();
            return false;
        }

        self.deps.world.mark_in_world(self.client.account_id);
        self.state = SessionState::InWorld(state);
        true
    }

    async fn cleanup(&mut self) {
        if let SessionState::InWorld(state) = &self.state {
            if let Some(departure) = state.zone.remove_player(state.entity_guid).await {
                self.deps
                    .save_queue
                    .enqueue(snapshot_from(&state.character, &departure));
            }
        }
        self.deps.world.deregister(self.client.account_id);
        self.client.handle.close();
    }
}

/// Builds the in-world entity for a character snapshot.
fn player_entity(snapshot: &CharacterSnapshot, guid: u64) -> Entity {
    let position = Vec3::from_array(snapshot.position);
    let mut entity = Entity::new(guid, EntityKind::Player, snapshot.name.clone(), position)
        .with_health(snapshot.health.min(snapshot.max_health), snapshot.max_health);
    entity.rotation = snapshot.rotation;
    entity.level = snapshot.level;
    entity.base_stats.insert(
        Stat::AssaultPower,
        10.0 + 2.0 * f32::from(snapshot.level),
    );
    entity.base_stats.insert(
        Stat::SupportPower,
        8.0 + 2.0 * f32::from(snapshot.level),
    );
    entity.base_stats.insert(Stat::Armor, 50.0 * f32::from(snapshot.level));
    entity.base_stats.insert(Stat::CritChance, 0.05);
    entity
}

/// Final persistence snapshot when a player leaves a zone.
fn snapshot_from(character: &CharacterSnapshot, departure: &PlayerDeparture) -> CharacterSnapshot {
    CharacterSnapshot {
        character_id: character.character_id,
        account_id: character.account_id,
        name: character.name.clone(),
        level: departure.entity.level,
        xp: departure.xp,
        faction: character.faction,
        zone_id: character.zone_id,
        position: departure.entity.position.to_array(),
        rotation: departure.entity.rotation,
        health: departure.entity.health,
        max_health: departure.entity.max_health,
        inventory: character.inventory.clone(),
    }
}
