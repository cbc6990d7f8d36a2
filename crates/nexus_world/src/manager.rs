//! The world manager actor: the process-wide session registry, the zone
//! directory, guid allocation, and cross-zone routing.
//!
//! The four indices (account id, lowercase name, entity guid, zone key) move
//! in lockstep because the actor mutates them in one message turn; there is
//! no partially-registered state visible anywhere.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use nexus_content::ContentStore;
use nexus_game::faction::players_hostile;
use nexus_game::{EntityKind, Guid};
use nexus_protocol::packets::{ChatChannel, ServerChat, ServerDisconnectNotice, ServerWhisperResult};
use nexus_protocol::Opcode;

use crate::scheduler::SchedulerHandle;
use crate::session::{Session, ZoneKey};
use crate::zone::{ZoneHandle, ZoneInstance};
use crate::{REQUEST_TIMEOUT, ZONE_TICK_MS};

/// Monotonic guid source. The high byte tags the kind; the low 56 bits never
/// repeat within one process.
#[derive(Default)]
pub struct GuidAllocator {
    next: AtomicU64,
}

impl GuidAllocator {
    pub fn allocate(&self, kind: EntityKind) -> u64 {
        let serial = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Guid::new_for(kind, serial).into_bits()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum RegisterError {
    #[error("character name is already online")]
    NameInUse,
    #[error("account already has a session")]
    AccountAlreadyOnline,
}

enum WorldMessage {
    Register {
        session: Session,
        reply: oneshot::Sender<Result<(), RegisterError>>,
    },
    Deregister {
        account_id: u64,
    },
    MarkInWorld {
        account_id: u64,
    },
    LookupByAccount {
        account_id: u64,
        reply: oneshot::Sender<Option<Session>>,
    },
    LookupByName {
        name: String,
        reply: oneshot::Sender<Option<Session>>,
    },
    LookupByGuid {
        guid: u64,
        reply: oneshot::Sender<Option<Session>>,
    },
    BroadcastToZone {
        zone: ZoneKey,
        opcode: Opcode,
        payload: Vec<u8>,
    },
    RouteWhisper {
        from_account: u64,
        target_name: String,
        text: String,
    },
    ZoneFor {
        key: ZoneKey,
        reply: oneshot::Sender<ZoneHandle>,
    },
    ZoneCrashed {
        key: ZoneKey,
    },
}

/// Cloneable handle to the manager actor.
#[derive(Clone)]
pub struct WorldHandle {
    tx: flume::Sender<WorldMessage>,
    guids: Arc<GuidAllocator>,
}

impl WorldHandle {
    pub fn allocate_guid(&self, kind: EntityKind) -> u64 {
        self.guids.allocate(kind)
    }

    pub async fn register(&self, session: Session) -> Result<(), RegisterError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(WorldMessage::Register { session, reply });
        match timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            // A dead or wedged manager reads as "try again later".
            _ => Err(RegisterError::AccountAlreadyOnline),
        }
    }

    pub fn deregister(&self, account_id: u64) {
        let _ = self.tx.send(WorldMessage::Deregister { account_id });
    }

    /// Flips the session to in-world once the client confirms entry.
    pub fn mark_in_world(&self, account_id: u64) {
        let _ = self.tx.send(WorldMessage::MarkInWorld { account_id });
    }

    pub async fn lookup_by_account(&self, account_id: u64) -> Option<Session> {
        self.request(|reply| WorldMessage::LookupByAccount { account_id, reply })
            .await?
    }

    pub async fn lookup_by_name(&self, name: &str) -> Option<Session> {
        let name = name.to_owned();
        self.request(|reply| WorldMessage::LookupByName { name, reply })
            .await?
    }

    pub async fn lookup_by_guid(&self, guid: u64) -> Option<Session> {
        self.request(|reply| WorldMessage::LookupByGuid { guid, reply })
            .await?
    }

    pub fn broadcast_to_zone(&self, zone: ZoneKey, opcode: Opcode, payload: Vec<u8>) {
        let _ = self
            .tx
            .send(WorldMessage::BroadcastToZone { zone, opcode, payload });
    }

    /// Resolves and delivers a whisper; the result packet goes back to the
    /// sender's connection from inside the manager.
    pub fn route_whisper(&self, from_account: u64, target_name: String, text: String) {
        let _ = self.tx.send(WorldMessage::RouteWhisper {
            from_account,
            target_name,
            text,
        });
    }

    /// The zone actor for `key`, started on first use.
    pub async fn zone(&self, key: ZoneKey) -> Option<ZoneHandle> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(WorldMessage::ZoneFor { key, reply });
        timeout(REQUEST_TIMEOUT, rx).await.ok()?.ok()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> WorldMessage) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(make(reply));
        timeout(REQUEST_TIMEOUT, rx).await.ok()?.ok()
    }
}

struct ZoneEntry {
    handle: ZoneHandle,
}

pub struct WorldManager {
    rx: flume::Receiver<WorldMessage>,
    self_tx: flume::Sender<WorldMessage>,
    content: Arc<dyn ContentStore>,
    scheduler: SchedulerHandle,
    guids: Arc<GuidAllocator>,
    online: Arc<AtomicUsize>,

    by_account: FxHashMap<u64, Session>,
    by_name: FxHashMap<String, u64>,
    by_guid: FxHashMap<u64, u64>,
    by_zone: FxHashMap<ZoneKey, FxHashSet<u64>>,
    zones: FxHashMap<ZoneKey, ZoneEntry>,
}

impl WorldManager {
    pub fn spawn(
        content: Arc<dyn ContentStore>,
        scheduler: SchedulerHandle,
        online: Arc<AtomicUsize>,
    ) -> (WorldHandle, JoinHandle<()>) {
        let (tx, rx) = flume::unbounded();
        let guids = Arc::new(GuidAllocator::default());
        let manager = Self {
            rx,
            self_tx: tx.clone(),
            content,
            scheduler,
            guids: guids.clone(),
            online,
            by_account: FxHashMap::default(),
            by_name: FxHashMap::default(),
            by_guid: FxHashMap::default(),
            by_zone: FxHashMap::default(),
            zones: FxHashMap::default(),
        };
        let task = tokio::spawn(manager.run());
        (WorldHandle { tx, guids }, task)
    }

    async fn run(mut self) {
        while let Ok(msg) = self.rx.recv_async().await {
            self.handle(msg);
        }
    }

    fn handle(&mut self, msg: WorldMessage) {
        match msg {
            WorldMessage::Register { session, reply } => {
                let _ = reply.send(self.register(session));
            }
            WorldMessage::Deregister { account_id } => self.deregister(account_id),
            WorldMessage::MarkInWorld { account_id } => {
                if let Some(session) = self.by_account.get_mut(&account_id) {
                    session.in_world = true;
                }
            }
            WorldMessage::LookupByAccount { account_id, reply } => {
                let _ = reply.send(self.by_account.get(&account_id).cloned());
            }
            WorldMessage::LookupByName { name, reply } => {
                let session = self
                    .by_name
                    .get(&name.to_lowercase())
                    .and_then(|id| self.by_account.get(id))
                    .cloned();
                let _ = reply.send(session);
            }
            WorldMessage::LookupByGuid { guid, reply } => {
                let session = self
                    .by_guid
                    .get(&guid)
                    .and_then(|id| self.by_account.get(id))
                    .cloned();
                let _ = reply.send(session);
            }
            WorldMessage::BroadcastToZone { zone, opcode, payload } => {
                let Some(members) = self.by_zone.get(&zone) else {
                    return;
                };
                for account_id in members {
                    if let Some(session) = self.by_account.get(account_id) {
                        session.handle.send_raw(opcode, payload.clone());
                    }
                }
            }
            WorldMessage::RouteWhisper {
                from_account,
                target_name,
                text,
            } => self.route_whisper(from_account, &target_name, text),
            WorldMessage::ZoneFor { key, reply } => {
                let _ = reply.send(self.zone_for(key));
            }
            WorldMessage::ZoneCrashed { key } => self.on_zone_crashed(key),
        }
    }

    fn register(&mut self, session: Session) -> Result<(), RegisterError> {
        let name_key = session.character_name.to_lowercase();
        if self.by_account.contains_key(&session.account_id) {
            return Err(RegisterError::AccountAlreadyOnline);
        }
        if self.by_name.contains_key(&name_key) {
            return Err(RegisterError::NameInUse);
        }

        self.by_name.insert(name_key, session.account_id);
        self.by_guid.insert(session.entity_guid, session.account_id);
        self.by_zone
            .entry(session.zone)
            .or_default()
            .insert(session.account_id);
        self.by_account.insert(session.account_id, session);
        self.online.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn deregister(&mut self, account_id: u64) {
        let Some(session) = self.by_account.remove(&account_id) else {
            return;
        };
        self.by_name.remove(&session.character_name.to_lowercase());
        self.by_guid.remove(&session.entity_guid);
        if let Some(members) = self.by_zone.get_mut(&session.zone) {
            members.remove(&account_id);
            if members.is_empty() {
                self.by_zone.remove(&session.zone);
            }
        }
        self.online.fetch_sub(1, Ordering::Relaxed);
        info!(account_id, name = %session.character_name, "session deregistered");
    }

    fn route_whisper(&mut self, from_account: u64, target_name: &str, text: String) {
        let Some(sender) = self.by_account.get(&from_account) else {
            return;
        };

        let code = match self.by_name.get(&target_name.to_lowercase()) {
            None => ServerWhisperResult::OFFLINE,
            Some(target_account) => {
                let target = &self.by_account[target_account];
                if !target.in_world {
                    ServerWhisperResult::OFFLINE
                } else if players_hostile(sender.faction, target.faction) {
                    ServerWhisperResult::WRONG_FACTION
                } else if target
                    .ignore_list
                    .contains(&sender.character_name.to_lowercase())
                {
                    ServerWhisperResult::IGNORED
                } else {
                    target.handle.send(&ServerChat {
                        channel: ChatChannel::Whisper.to_u16(),
                        from_guid: sender.entity_guid,
                        from_name: sender.character_name.clone(),
                        text,
                    });
                    ServerWhisperResult::DELIVERED
                }
            }
        };

        sender.handle.send(&ServerWhisperResult { code });
    }

    fn zone_for(&mut self, key: ZoneKey) -> ZoneHandle {
        if let Some(entry) = self.zones.get(&key) {
            return entry.handle.clone();
        }

        let (handle, task) = ZoneInstance::spawn(key, self.content.clone(), self.guids.clone());
        self.scheduler
            .add_job(zone_job_id(key), ZONE_TICK_MS, handle.tick_sender());

        // Watch for a crash so the zone can be rebuilt empty.
        let watch_tx = self.self_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(zone = %key, "zone task panicked");
                    let _ = watch_tx.send(WorldMessage::ZoneCrashed { key });
                }
            }
        });

        info!(zone = %key, "zone started");
        self.zones.insert(key, ZoneEntry { handle: handle.clone() });
        handle
    }

    /// A crashed zone loses its entity set; resident players are kicked so
    /// they re-enter through a fresh instance. Other zones are untouched.
    fn on_zone_crashed(&mut self, key: ZoneKey) {
        self.zones.remove(&key);
        self.scheduler.remove_job(zone_job_id(key));

        let members: Vec<u64> = self
            .by_zone
            .get(&key)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        warn!(zone = %key, players = members.len(), "zone crashed, kicking residents");
        for account_id in members {
            if let Some(session) = self.by_account.get(&account_id) {
                session.handle.send(&ServerDisconnectNotice { reason: 1 });
                session.handle.close();
            }
            self.deregister(account_id);
        }
    }
}

fn zone_job_id(key: ZoneKey) -> u64 {
    (u64::from(key.world_id) << 32) | u64::from(key.instance_id)
}

#[cfg(test)]
mod tests {
    use nexus_content::JsonStore;
    use nexus_game::PlayerFaction;
    use nexus_network::{ConnectionHandle, OutboundFrame};
    use nexus_protocol::packets::{ServerChat, ServerWhisperResult};
    use nexus_protocol::Message as _;

    use crate::scheduler::TickScheduler;

    use super::*;

    fn spawn_manager() -> (WorldHandle, Arc<AtomicUsize>) {
        let (scheduler, _task) = TickScheduler::spawn();
        let online = Arc::new(AtomicUsize::new(0));
        let (world, _task) = WorldManager::spawn(
            Arc::new(JsonStore::empty()),
            scheduler,
            online.clone(),
        );
        (world, online)
    }

    fn session(
        world: &WorldHandle,
        account_id: u64,
        name: &str,
        faction: PlayerFaction,
        zone: ZoneKey,
    ) -> (Session, flume::Receiver<OutboundFrame>) {
        let (handle, rx) = ConnectionHandle::detached();
        let session = Session {
            account_id,
            character_id: account_id * 10,
            character_name: name.to_owned(),
            entity_guid: world.allocate_guid(EntityKind::Player),
            faction,
            in_world: true,
            zone,
            handle,
            sequence: 0,
            ignore_list: Default::default(),
        };
        (session, rx)
    }

    fn whisper_results(rx: &flume::Receiver<OutboundFrame>) -> Vec<u8> {
        let mut codes = vec![];
        while let Ok(frame) = rx.try_recv() {
            if let Some((op, payload)) = frame.into_frame() {
                if op == Opcode::ServerWhisperResult {
                    codes.push(ServerWhisperResult::from_payload(&payload).unwrap().code);
                }
            }
        }
        codes
    }

    #[tokio::test]
    async fn registration_keeps_every_index_in_lockstep() {
        let (world, online) = spawn_manager();
        let zone = ZoneKey::new(426, 1);
        let (session, _rx) = session(&world, 1, "Deadeye Brightland", PlayerFaction::Exile, zone);
        let guid = session.entity_guid;

        world.register(session).await.unwrap();
        assert_eq!(online.load(Ordering::Relaxed), 1);

        // All lookups resolve to the same record, names case-insensitively.
        assert!(world.lookup_by_account(1).await.is_some());
        assert!(world.lookup_by_name("DEADEYE BRIGHTLAND").await.is_some());
        assert_eq!(
            world.lookup_by_guid(guid).await.map(|s| s.account_id),
            Some(1)
        );

        world.deregister(1);
        assert!(world.lookup_by_account(1).await.is_none());
        assert!(world.lookup_by_name("deadeye brightland").await.is_none());
        assert!(world.lookup_by_guid(guid).await.is_none());
        assert_eq!(online.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn duplicate_names_and_accounts_are_refused() {
        let (world, _) = spawn_manager();
        let zone = ZoneKey::new(426, 1);

        let (first, _rx1) = session(&world, 1, "Mondo Zax", PlayerFaction::Dominion, zone);
        world.register(first).await.unwrap();

        let (same_name, _rx2) = session(&world, 2, "MONDO ZAX", PlayerFaction::Dominion, zone);
        assert_eq!(
            world.register(same_name).await,
            Err(RegisterError::NameInUse)
        );

        let (same_account, _rx3) = session(&world, 1, "Kit Brinny", PlayerFaction::Exile, zone);
        assert_eq!(
            world.register(same_account).await,
            Err(RegisterError::AccountAlreadyOnline)
        );
    }

    #[tokio::test]
    async fn whisper_routing_policies() {
        let (world, _) = spawn_manager();
        let zone = ZoneKey::new(426, 1);

        let (exile, exile_rx) = session(&world, 1, "Kit Brinny", PlayerFaction::Exile, zone);
        let (friend, friend_rx) = session(&world, 2, "Deadeye", PlayerFaction::Exile, zone);
        let (enemy, _enemy_rx) = session(&world, 3, "Axis Pheydra", PlayerFaction::Dominion, zone);
        world.register(exile).await.unwrap();
        world.register(friend).await.unwrap();
        world.register(enemy).await.unwrap();

        // Same faction: delivered, and the sender hears success.
        world.route_whisper(1, "deadeye".into(), "psst".into());
        // Order barrier: the manager works its mailbox sequentially.
        world.lookup_by_account(1).await;
        let mut heard = vec![];
        while let Ok(frame) = friend_rx.try_recv() {
            if let Some((op, payload)) = frame.into_frame() {
                if op == Opcode::ServerChat {
                    heard.push(ServerChat::from_payload(&payload).unwrap());
                }
            }
        }
        assert_eq!(heard.len(), 1);
        assert_eq!(heard[0].text, "psst");
        assert_eq!(whisper_results(&exile_rx), vec![ServerWhisperResult::DELIVERED]);

        // Cross-faction is refused.
        world.route_whisper(1, "Axis Pheydra".into(), "traitor?".into());
        world.lookup_by_account(1).await;
        assert_eq!(
            whisper_results(&exile_rx),
            vec![ServerWhisperResult::WRONG_FACTION]
        );

        // Unknown target is offline.
        world.route_whisper(1, "Nobody".into(), "hello?".into());
        world.lookup_by_account(1).await;
        assert_eq!(whisper_results(&exile_rx), vec![ServerWhisperResult::OFFLINE]);
    }

    #[tokio::test]
    async fn zone_broadcast_reaches_only_that_zone() {
        let (world, _) = spawn_manager();
        let algoroc = ZoneKey::new(426, 1);
        let deradune = ZoneKey::new(22, 1);

        let (a, a_rx) = session(&world, 1, "A", PlayerFaction::Exile, algoroc);
        let (b, b_rx) = session(&world, 2, "B", PlayerFaction::Exile, algoroc);
        let (c, c_rx) = session(&world, 3, "C", PlayerFaction::Exile, deradune);
        world.register(a).await.unwrap();
        world.register(b).await.unwrap();
        world.register(c).await.unwrap();

        let packet = ServerChat {
            channel: ChatChannel::Zone.to_u16(),
            from_guid: 0,
            from_name: "A".into(),
            text: "zone hello".into(),
        };
        world.broadcast_to_zone(algoroc, Opcode::ServerChat, packet.to_payload());
        world.lookup_by_account(1).await;

        for rx in [&a_rx, &b_rx] {
            let got: Vec<_> = rx.try_iter().filter_map(OutboundFrame::into_frame).collect();
            assert_eq!(got.len(), 1, "zone member should hear exactly once");
        }
        assert!(c_rx.try_iter().filter_map(OutboundFrame::into_frame).next().is_none());
    }

    #[test]
    fn guid_allocation_is_monotonic_and_tagged() {
        let guids = GuidAllocator::default();
        let a = guids.allocate(EntityKind::Player);
        let b = guids.allocate(EntityKind::Creature);
        assert_ne!(a, b);
        assert_eq!(Guid::from_bits(a).kind(), Some(EntityKind::Player));
        assert_eq!(Guid::from_bits(b).kind(), Some(EntityKind::Creature));
        assert!(Guid::from_bits(b).serial() > Guid::from_bits(a).serial());
    }
}
