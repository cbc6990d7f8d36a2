//! The per-zone simulation actor.
//!
//! One task owns everything in the zone: the entity set, the spatial grid,
//! creature AI, casts in progress, periodic effect ticks, corpse timers, and
//! respawns. Nothing else touches that state; sessions and the manager talk
//! to it through [`ZoneHandle`]. Ticks arrive on a separate bounded(1)
//! mailbox fed by the scheduler, so a slow tick is skipped, never queued.

use std::sync::Arc;

use glam::Vec3;
use rand::Rng;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use nexus_content::{ContentStore, CreatureTemplate};
use nexus_game::ai::{AggroCandidate, AiAction, AiConfig, AiState, AiStateKind};
use nexus_game::effects::{pending_periodic_ticks, BuffDebuff, BuffKind};
use nexus_game::loot::CorpseLoot;
use nexus_game::spell::{self, CastInProgress, Spell, SpellEffect, SpellEffectKind, TargetType};
use nexus_game::{stats, xp, Entity, EntityKind, GameError, PlayerFaction, Stat};
use nexus_network::clock::monotonic_ms;
use nexus_network::ConnectionHandle;
use nexus_protocol::packets::{
    ChatChannel, EntityCommand, ServerBuffUpdate, ServerChat, ServerEntityCommand,
    ServerEntityDespawn, ServerEntitySpawn, ServerHealthUpdate, ServerLootResponse,
    ServerSpellResult,
};
use nexus_protocol::Message;
use nexus_spatial::SpatialGrid;

use crate::manager::GuidAllocator;
use crate::session::ZoneKey;
use crate::{REQUEST_TIMEOUT, VIEW_RANGE};

/// How long a corpse stays lootable.
const CORPSE_TTL_MS: u64 = 60_000;

/// Creature respawn delay after death.
const RESPAWN_MS: u64 = 30_000;

/// Creature ground speed, units per second.
const CREATURE_MOVE_SPEED: f32 = 8.0;

/// A movement step larger than this per packet is implausible and dropped.
const MAX_MOVE_STEP: f32 = 100.0;

/// A creature counts as "arrived" within this distance of a path goal.
const ARRIVE_EPSILON: f32 = 0.5;

/// A player joining the zone.
pub struct PlayerEntry {
    pub entity: Entity,
    pub account_id: u64,
    pub faction: PlayerFaction,
    pub xp: u32,
    pub handle: ConnectionHandle,
}

/// Final state handed back when a player leaves, for persistence.
#[derive(Clone, Debug)]
pub struct PlayerDeparture {
    pub entity: Entity,
    pub xp: u32,
}

pub enum ZoneMessage {
    AddPlayer {
        entry: Box<PlayerEntry>,
        reply: oneshot::Sender<()>,
    },
    RemovePlayer {
        guid: u64,
        reply: Option<oneshot::Sender<Option<PlayerDeparture>>>,
    },
    Movement {
        guid: u64,
        commands: Vec<EntityCommand>,
    },
    Chat {
        guid: u64,
        channel: ChatChannel,
        text: String,
    },
    CastSpell {
        guid: u64,
        spell_id: u32,
        target_guid: u64,
    },
    Interact {
        guid: u64,
        target_guid: u64,
    },
    Loot {
        guid: u64,
        corpse_guid: u64,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct ZoneHandle {
    pub key: ZoneKey,
    tx: flume::Sender<ZoneMessage>,
    tick_tx: flume::Sender<()>,
}

impl ZoneHandle {
    /// The bounded(1) tick mailbox, for scheduler registration.
    pub fn tick_sender(&self) -> flume::Sender<()> {
        self.tick_tx.clone()
    }

    pub async fn add_player(&self, entry: PlayerEntry) -> bool {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(ZoneMessage::AddPlayer {
            entry: Box::new(entry),
            reply,
        });
        timeout(REQUEST_TIMEOUT, rx).await.is_ok_and(|r| r.is_ok())
    }

    pub async fn remove_player(&self, guid: u64) -> Option<PlayerDeparture> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(ZoneMessage::RemovePlayer {
            guid,
            reply: Some(reply),
        });
        timeout(REQUEST_TIMEOUT, rx).await.ok()?.ok()?
    }

    pub fn movement(&self, guid: u64, commands: Vec<EntityCommand>) {
        let _ = self.tx.send(ZoneMessage::Movement { guid, commands });
    }

    pub fn chat(&self, guid: u64, channel: ChatChannel, text: String) {
        let _ = self.tx.send(ZoneMessage::Chat { guid, channel, text });
    }

    pub fn cast_spell(&self, guid: u64, spell_id: u32, target_guid: u64) {
        let _ = self.tx.send(ZoneMessage::CastSpell {
            guid,
            spell_id,
            target_guid,
        });
    }

    pub fn interact(&self, guid: u64, target_guid: u64) {
        let _ = self.tx.send(ZoneMessage::Interact { guid, target_guid });
    }

    pub fn loot(&self, guid: u64, corpse_guid: u64) {
        let _ = self.tx.send(ZoneMessage::Loot { guid, corpse_guid });
    }

    /// Drains the zone and stops the actor.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(ZoneMessage::Shutdown { reply });
        let _ = timeout(REQUEST_TIMEOUT, rx).await;
    }
}

struct CreatureState {
    ai: AiState,
    config: AiConfig,
    template_id: u32,
}

struct PlayerState {
    account_id: u64,
    faction: PlayerFaction,
    xp: u32,
    handle: ConnectionHandle,
}

pub struct ZoneInstance {
    key: ZoneKey,
    content: Arc<dyn ContentStore>,
    guids: Arc<GuidAllocator>,
    rx: flume::Receiver<ZoneMessage>,
    tick_rx: flume::Receiver<()>,

    entities: FxHashMap<u64, Entity>,
    grid: SpatialGrid,
    creatures: FxHashMap<u64, CreatureState>,
    players: FxHashMap<u64, PlayerState>,
    casts: FxHashMap<u64, CastInProgress>,
    /// Periodic effect ticks: value is (entity, buff id, expiry generation).
    periodic: crate::scheduled::Scheduled<(u64, u32, u64)>,
    corpses: FxHashMap<u64, CorpseLoot>,
    corpse_despawns: crate::scheduled::Scheduled<u64>,
    /// Respawns: (template id, spawn position, rotation).
    respawns: crate::scheduled::Scheduled<(u32, Vec3, f32)>,
    next_buff_id: u32,
}

impl ZoneInstance {
    /// Builds the zone state and its handle without starting the actor task.
    /// Tests drive the returned instance directly with an explicit clock.
    pub fn new(
        key: ZoneKey,
        content: Arc<dyn ContentStore>,
        guids: Arc<GuidAllocator>,
    ) -> (Self, ZoneHandle) {
        let (tx, rx) = flume::unbounded();
        let (tick_tx, tick_rx) = flume::bounded(1);

        let cell_size = content
            .zone(key.world_id)
            .map_or(nexus_spatial::DEFAULT_CELL_SIZE, |z| z.cell_size);

        let mut zone = Self {
            key,
            content,
            guids,
            rx,
            tick_rx,
            entities: FxHashMap::default(),
            grid: SpatialGrid::new(cell_size),
            creatures: FxHashMap::default(),
            players: FxHashMap::default(),
            casts: FxHashMap::default(),
            periodic: crate::scheduled::Scheduled::new(),
            corpses: FxHashMap::default(),
            corpse_despawns: crate::scheduled::Scheduled::new(),
            respawns: crate::scheduled::Scheduled::new(),
            next_buff_id: 0,
        };
        zone.seed_spawns();

        let handle = ZoneHandle { key, tx, tick_tx };
        (zone, handle)
    }

    /// Starts the zone actor.
    pub fn spawn(
        key: ZoneKey,
        content: Arc<dyn ContentStore>,
        guids: Arc<GuidAllocator>,
    ) -> (ZoneHandle, JoinHandle<()>) {
        let (zone, handle) = Self::new(key, content, guids);
        let task = tokio::spawn(zone.run());
        (handle, task)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.rx.recv_async() => match msg {
                    Ok(ZoneMessage::Shutdown { reply }) => {
                        self.drain();
                        let _ = reply.send(());
                        info!(zone = %self.key, "zone stopped");
                        return;
                    }
                    Ok(msg) => self.handle_message(msg, monotonic_ms()),
                    // Every handle dropped: nothing can reach us again.
                    Err(_) => return,
                },
                tick = self.tick_rx.recv_async() => {
                    if tick.is_ok() {
                        self.tick(monotonic_ms());
                    }
                }
            }
        }
    }

    pub fn handle_message(&mut self, msg: ZoneMessage, now: u64) {
        match msg {
            ZoneMessage::AddPlayer { entry, reply } => {
                self.add_player(*entry);
                let _ = reply.send(());
            }
            ZoneMessage::RemovePlayer { guid, reply } => {
                let departure = self.remove_player(guid);
                if let Some(reply) = reply {
                    let _ = reply.send(departure);
                }
            }
            ZoneMessage::Movement { guid, commands } => self.apply_movement(guid, commands),
            ZoneMessage::Chat { guid, channel, text } => self.handle_chat(guid, channel, &text),
            ZoneMessage::CastSpell {
                guid,
                spell_id,
                target_guid,
            } => self.handle_cast(guid, spell_id, target_guid, now),
            ZoneMessage::Interact { guid, target_guid } => self.handle_interact(guid, target_guid),
            ZoneMessage::Loot { guid, corpse_guid } => self.handle_loot(guid, corpse_guid),
            ZoneMessage::Shutdown { reply } => {
                self.drain();
                let _ = reply.send(());
            }
        }
    }

    // ---- membership ------------------------------------------------------

    fn seed_spawns(&mut self) {
        let Some(template) = self.content.zone(self.key.world_id) else {
            return;
        };
        for spawn in template.spawns.clone() {
            let pos = Vec3::new(spawn.x, spawn.y, spawn.z);
            self.spawn_creature(spawn.creature_id, pos, spawn.rotation);
        }
    }

    fn add_player(&mut self, entry: PlayerEntry) {
        let guid = entry.entity.guid;
        let pos = entry.entity.position;

        self.grid.insert(guid, pos);
        self.entities.insert(guid, entry.entity);
        self.players.insert(
            guid,
            PlayerState {
                account_id: entry.account_id,
                faction: entry.faction,
                xp: entry.xp,
                handle: entry.handle.clone(),
            },
        );

        // The newcomer sees everything nearby, itself included.
        for other in self.grid.query_range(pos, VIEW_RANGE) {
            if let Some(entity) = self.entities.get(&other) {
                entry.handle.send(&spawn_packet(entity));
            }
        }

        // Everyone else sees the newcomer.
        let packet = spawn_packet(&self.entities[&guid]);
        self.broadcast_near(pos, VIEW_RANGE, &packet, Some(guid));

        debug!(zone = %self.key, guid, "player joined");
    }

    fn remove_player(&mut self, guid: u64) -> Option<PlayerDeparture> {
        let player = self.players.remove(&guid)?;
        let entity = self.entities.remove(&guid)?;
        self.grid.remove(guid);
        self.casts.remove(&guid);

        for creature in self.creatures.values_mut() {
            creature.ai.remove_threat(guid);
        }

        self.broadcast_near(
            entity.position,
            VIEW_RANGE,
            &ServerEntityDespawn { guid },
            None,
        );

        debug!(zone = %self.key, guid, "player left");
        Some(PlayerDeparture {
            entity,
            xp: player.xp,
        })
    }

    // ---- movement --------------------------------------------------------

    fn apply_movement(&mut self, guid: u64, commands: Vec<EntityCommand>) {
        let Some(entity) = self.entities.get_mut(&guid) else {
            return;
        };
        if entity.is_dead() {
            return;
        }

        for cmd in &commands {
            match *cmd {
                EntityCommand::SetPosition { x, y, z } => {
                    let next = Vec3::new(x, y, z);
                    if entity.position.distance(next) > MAX_MOVE_STEP {
                        warn!(zone = %self.key, guid, "implausible move rejected");
                        return;
                    }
                    entity.position = next;
                    self.grid.update(guid, next);
                }
                EntityCommand::SetRotation { rotation } => entity.rotation = rotation,
                // Velocity and state ride through to watchers untouched.
                EntityCommand::SetVelocity { .. } | EntityCommand::SetState { .. } => {}
            }
        }

        let pos = self.entities[&guid].position;
        self.broadcast_near(
            pos,
            VIEW_RANGE,
            &ServerEntityCommand { guid, commands },
            Some(guid),
        );
    }

    // ---- chat ------------------------------------------------------------

    fn handle_chat(&mut self, guid: u64, channel: ChatChannel, text: &str) {
        let Some(entity) = self.entities.get(&guid) else {
            return;
        };
        if text.chars().count() > 500 {
            self.notify_error(guid, GameError::MessageTooLong);
            return;
        }

        let packet = ServerChat {
            channel: channel.to_u16(),
            from_guid: guid,
            from_name: entity.name.clone(),
            text: text.to_owned(),
        };

        match channel.broadcast_range() {
            // Ranged chat echoes to the speaker too.
            Some(range) => self.broadcast_near(entity.position, range, &packet, None),
            None => match channel {
                ChatChannel::Zone => self.broadcast_zone(&packet),
                // Whispers are routed by the manager, never here.
                _ => debug!(zone = %self.key, guid, ?channel, "unroutable chat channel"),
            },
        }
    }

    // ---- spells ----------------------------------------------------------

    fn handle_cast(&mut self, guid: u64, spell_id: u32, target_guid: u64, now: u64) {
        let Some(caster) = self.entities.get(&guid) else {
            return;
        };
        if caster.is_dead() {
            self.notify_error(guid, GameError::NotAlive);
            return;
        }
        let Some(spell) = self.content.spell(spell_id).cloned() else {
            self.notify_error(guid, GameError::UnknownSpell);
            return;
        };

        let resolved_target = match spell.target_type {
            TargetType::Caster => guid,
            TargetType::Enemy | TargetType::Ally => target_guid,
        };
        let target = self.entities.get(&resolved_target);

        if let Err(e) = spell::can_cast(caster, &spell, target, now) {
            self.notify_error(guid, e);
            return;
        }

        if spell.is_instant() {
            self.commit_cast(guid, &spell, resolved_target, now);
        } else {
            self.casts.insert(
                guid,
                CastInProgress {
                    spell_id,
                    target_guid: resolved_target,
                    started_at: now,
                    deadline: now + u64::from(spell.cast_time_ms),
                },
            );
        }
    }

    /// Applies a completed cast: cooldowns commit, then effects land in
    /// declared order.
    fn commit_cast(&mut self, caster_guid: u64, spell: &Spell, target_guid: u64, now: u64) {
        if let Some(caster) = self.entities.get_mut(&caster_guid) {
            caster.cooldowns.trigger(
                spell.id,
                u64::from(spell.cooldown_ms),
                spell.triggers_gcd,
                spell::GCD_MS,
                now,
            );
        }

        for effect in &spell.effects {
            self.apply_effect(caster_guid, spell.id, effect, target_guid, now);
        }
    }

    fn apply_effect(
        &mut self,
        caster_guid: u64,
        spell_id: u32,
        effect: &SpellEffect,
        target_guid: u64,
        now: u64,
    ) {
        // Snapshot the caster for the math; mutation happens on the target.
        let Some(caster) = self.entities.get(&caster_guid).cloned() else {
            return;
        };
        if !self.entities.contains_key(&target_guid) {
            return;
        }

        match effect.kind {
            SpellEffectKind::Damage => {
                let target = &self.entities[&target_guid];
                let roll = rand::thread_rng().gen::<f32>();
                let (amount, critical) = spell::compute_damage(&caster, target, effect, roll, false, now);
                self.deal_damage(caster_guid, target_guid, amount, critical, spell_id, now);
            }
            SpellEffectKind::Heal => {
                let target = &self.entities[&target_guid];
                let roll = rand::thread_rng().gen::<f32>();
                let (amount, critical) = spell::compute_heal(&caster, target, effect, roll, false, now);
                let target = self.entities.get_mut(&target_guid).expect("target checked above");
                let healed = target.apply_heal(amount);
                let (health, max_health) = (target.health, target.max_health);
                let pos = target.position;
                self.broadcast_near(
                    pos,
                    VIEW_RANGE,
                    &ServerSpellResult {
                        caster_guid,
                        spell_id,
                        target_guid,
                        effect_kind: ServerSpellResult::KIND_HEAL,
                        amount: healed,
                        critical,
                    },
                    Some(caster_guid),
                );
                self.broadcast_near(
                    pos,
                    VIEW_RANGE,
                    &ServerHealthUpdate { guid: target_guid, health, max_health },
                    None,
                );
            }
            SpellEffectKind::Absorb | SpellEffectKind::StatModifier => {
                let kind = match effect.kind {
                    SpellEffectKind::Absorb => BuffKind::Absorb,
                    _ => BuffKind::StatModifier,
                };
                self.apply_buff(caster_guid, spell_id, effect, target_guid, kind, effect.amount, now);
            }
            SpellEffectKind::PeriodicDamage | SpellEffectKind::PeriodicHeal => {
                let kind = match effect.kind {
                    SpellEffectKind::PeriodicDamage => BuffKind::PeriodicDamage,
                    _ => BuffKind::PeriodicHeal,
                };
                // Per-tick value is computed once, at application time.
                let target = &self.entities[&target_guid];
                let roll = rand::thread_rng().gen::<f32>();
                let per_tick = match kind {
                    BuffKind::PeriodicDamage => {
                        spell::compute_damage(&caster, target, effect, roll, false, now).0
                    }
                    _ => spell::compute_heal(&caster, target, effect, roll, false, now).0,
                };
                self.apply_buff(caster_guid, spell_id, effect, target_guid, kind, per_tick as i32, now);
            }
        }
    }

    fn apply_buff(
        &mut self,
        caster_guid: u64,
        spell_id: u32,
        effect: &SpellEffect,
        target_guid: u64,
        kind: BuffKind,
        amount: i32,
        now: u64,
    ) {
        self.next_buff_id += 1;
        let buff_id = self.next_buff_id;
        let expires_at = now + u64::from(effect.duration_ms);

        let buff = BuffDebuff {
            id: buff_id,
            spell_id,
            kind,
            amount,
            stat: effect.stat,
            duration_ms: effect.duration_ms,
            is_debuff: amount < 0,
            caster_guid,
            expires_at,
            tick_interval_ms: effect.tick_interval_ms,
        };

        let Some(target) = self.entities.get_mut(&target_guid) else {
            return;
        };
        let pos = target.position;
        target.effects.apply(buff);

        if matches!(kind, BuffKind::PeriodicDamage | BuffKind::PeriodicHeal)
            && effect.tick_interval_ms > 0
        {
            self.periodic.schedule(
                now + u64::from(effect.tick_interval_ms),
                (target_guid, buff_id, expires_at),
            );
        }

        self.broadcast_near(
            pos,
            VIEW_RANGE,
            &ServerBuffUpdate {
                guid: target_guid,
                buff_id,
                spell_id,
                applied: true,
                duration_ms: effect.duration_ms,
            },
            None,
        );
    }

    /// The one funnel for hit damage: absorbs, health, interrupt checks,
    /// threat, broadcasts, and death.
    fn deal_damage(
        &mut self,
        attacker_guid: u64,
        target_guid: u64,
        amount: u32,
        critical: bool,
        spell_id: u32,
        now: u64,
    ) {
        let Some(target) = self.entities.get_mut(&target_guid) else {
            return;
        };
        let outcome = target.apply_damage(amount, now);
        let (health, max_health) = (target.health, target.max_health);
        let pos = target.position;

        for buff_id in &outcome.depleted_buffs {
            self.broadcast_near(
                pos,
                VIEW_RANGE,
                &ServerBuffUpdate {
                    guid: target_guid,
                    buff_id: *buff_id,
                    spell_id: 0,
                    applied: false,
                    duration_ms: 0,
                },
                None,
            );
        }

        // Damage dealt is not self-visible; the attacker's client keeps its
        // own log.
        self.broadcast_near(
            pos,
            VIEW_RANGE,
            &ServerSpellResult {
                caster_guid: attacker_guid,
                spell_id,
                target_guid,
                effect_kind: ServerSpellResult::KIND_DAMAGE,
                amount: outcome.absorbed + outcome.health_lost,
                critical,
            },
            Some(attacker_guid),
        );
        self.broadcast_near(
            pos,
            VIEW_RANGE,
            &ServerHealthUpdate { guid: target_guid, health, max_health },
            None,
        );

        // A solid hit breaks a cast in progress.
        if self.casts.contains_key(&target_guid)
            && spell::interrupts_cast(outcome.health_lost, max_health)
        {
            self.casts.remove(&target_guid);
            self.broadcast_near(
                pos,
                VIEW_RANGE,
                &ServerSpellResult {
                    caster_guid: target_guid,
                    spell_id: 0,
                    target_guid,
                    effect_kind: ServerSpellResult::KIND_INTERRUPTED,
                    amount: 0,
                    critical: false,
                },
                None,
            );
        }

        // Hitting a creature feeds its threat table.
        if let Some(creature) = self.creatures.get_mut(&target_guid) {
            creature.ai.add_threat(attacker_guid, amount.max(1));
            if creature.ai.state == AiStateKind::Idle {
                creature.ai.enter_combat(attacker_guid, now);
            }
        }

        if outcome.died {
            self.handle_death(target_guid, attacker_guid, now);
        }
    }

    fn handle_death(&mut self, guid: u64, killer_guid: u64, now: u64) {
        // Dying wipes remaining effects and any cast underway.
        self.casts.remove(&guid);
        if let Some(entity) = self.entities.get_mut(&guid) {
            let pos = entity.position;
            let removed = entity.effects.clear();
            for buff in removed {
                self.broadcast_near(
                    pos,
                    VIEW_RANGE,
                    &ServerBuffUpdate {
                        guid,
                        buff_id: buff.id,
                        spell_id: buff.spell_id,
                        applied: false,
                        duration_ms: 0,
                    },
                    None,
                );
            }
        }

        for creature in self.creatures.values_mut() {
            creature.ai.remove_threat(guid);
        }

        let Some(creature) = self.creatures.remove(&guid) else {
            // A dead player stays as a corpse-like entity until release;
            // nothing further happens here.
            return;
        };

        let Some(entity) = self.entities.remove(&guid) else {
            return;
        };
        self.grid.remove(guid);

        let template = self.content.creature_template(creature.template_id).cloned();

        // Experience for the killing player.
        if let Some(template) = &template {
            self.award_kill_xp(killer_guid, template);
        }

        // Leave a lootable corpse behind.
        let corpse_guid = self.guids.allocate(EntityKind::Corpse);
        let corpse = entity.make_corpse(corpse_guid);
        let loot = template
            .as_ref()
            .and_then(|t| t.loot_table)
            .map(|table| self.content.loot_roll(table))
            .unwrap_or_default();

        self.grid.insert(corpse_guid, corpse.position);
        let corpse_packet = spawn_packet(&corpse);
        self.entities.insert(corpse_guid, corpse);
        self.corpses
            .insert(corpse_guid, CorpseLoot::new(loot, guid, now + CORPSE_TTL_MS));
        self.corpse_despawns.schedule(now + CORPSE_TTL_MS, corpse_guid);

        self.broadcast_near(entity.position, VIEW_RANGE, &ServerEntityDespawn { guid }, None);
        self.broadcast_near(entity.position, VIEW_RANGE, &corpse_packet, None);

        self.respawns.schedule(
            now + RESPAWN_MS,
            (creature.template_id, entity.spawn_position, entity.rotation),
        );
    }

    fn award_kill_xp(&mut self, killer_guid: u64, template: &CreatureTemplate) {
        let Some(player) = self.players.get_mut(&killer_guid) else {
            return;
        };
        let Some(entity) = self.entities.get_mut(&killer_guid) else {
            return;
        };

        let gained = xp::xp_from_kill(entity.level, template.level, template.xp_reward);
        let progress = xp::check_level_up(entity.level, player.xp + gained);
        player.xp = progress.xp;

        if progress.leveled_up {
            entity.level = progress.level;
            info!(zone = %self.key, guid = killer_guid, level = progress.level, "level up");
            player.handle.send(&ServerChat {
                channel: ChatChannel::System.to_u16(),
                from_guid: 0,
                from_name: String::new(),
                text: format!("You have reached level {}!", progress.level),
            });
        }
    }

    // ---- interaction & loot ---------------------------------------------

    fn handle_interact(&mut self, guid: u64, target_guid: u64) {
        let Some(target) = self.entities.get(&target_guid) else {
            self.notify_error(guid, GameError::UnknownTarget);
            return;
        };
        match target.kind {
            // Interacting with a corpse is a loot request.
            EntityKind::Corpse => self.handle_loot(guid, target_guid),
            _ => debug!(zone = %self.key, guid, target_guid, "interaction ignored"),
        }
    }

    /// A player counts as in combat while any fighting creature still holds
    /// threat against them.
    fn in_combat(&self, guid: u64) -> bool {
        self.creatures
            .values()
            .any(|c| c.ai.state == AiStateKind::Combat && c.ai.threat_of(guid) > 0)
    }

    fn handle_loot(&mut self, guid: u64, corpse_guid: u64) {
        if !self.players.contains_key(&guid) {
            return;
        }
        if self.entities.get(&guid).map_or(true, |e| e.is_dead()) {
            self.notify_error(guid, GameError::NotAlive);
            return;
        }
        if self.in_combat(guid) {
            self.notify_error(guid, GameError::InCombat);
            return;
        }
        let Some(corpse) = self.corpses.get_mut(&corpse_guid) else {
            self.notify_error(guid, GameError::UnknownTarget);
            return;
        };

        let items = corpse.take_loot(guid);
        if let Some(player) = self.players.get(&guid) {
            player.handle.send(&ServerLootResponse {
                corpse_guid,
                items,
            });
        }
    }

    // ---- tick ------------------------------------------------------------

    /// One simulation step. Called by the actor loop at the zone cadence and
    /// by tests with a synthetic clock.
    pub fn tick(&mut self, now: u64) {
        self.tick_creatures(now);
        self.expire_buffs(now);
        self.finish_casts(now);
        self.run_periodic(now);
        self.despawn_corpses(now);
        self.run_respawns(now);
    }

    fn tick_creatures(&mut self, now: u64) {
        let guids: Vec<u64> = self.creatures.keys().copied().collect();
        for guid in guids {
            let Some(pos) = self.entities.get(&guid).map(|e| e.position) else {
                continue;
            };

            // Leash first: a dragged creature disengages wherever it is.
            {
                let creature = self.creatures.get_mut(&guid).expect("creature listed");
                if creature.ai.check_leash(pos, creature.config.leash_range) {
                    debug!(zone = %self.key, guid, "creature leashed, evading");
                    creature.ai.begin_evade();
                }
            }

            // Aggro scan while idle.
            let (aggro_range, faction_id) = {
                let creature = &self.creatures[&guid];
                (
                    creature.config.aggro_range,
                    self.entities[&guid].faction_id,
                )
            };
            let candidates: Vec<AggroCandidate> = self
                .grid
                .query_range(pos, aggro_range)
                .into_iter()
                .filter_map(|g| {
                    let player = self.players.get(&g)?;
                    let entity = self.entities.get(&g)?;
                    entity.targetable.then_some(AggroCandidate {
                        guid: g,
                        position: entity.position,
                        faction: player.faction,
                    })
                })
                .collect();

            let factions = self.content.factions();
            let aggro = {
                let creature = &self.creatures[&guid];
                creature.ai.check_aggro(pos, &candidates, aggro_range, |f| {
                    factions.creature_hostile_to_player(faction_id, f)
                })
            };
            if let Some(target) = aggro {
                let creature = self.creatures.get_mut(&guid).expect("creature listed");
                creature.ai.enter_combat(target, now);
                creature.ai.add_threat(target, 1);
                debug!(zone = %self.key, guid, target, "creature aggro");
            }

            let (action, config) = {
                let creature = self.creatures.get_mut(&guid).expect("creature listed");
                (creature.ai.tick(&creature.config, now), creature.config)
            };

            match action {
                AiAction::Attack { target_guid } => {
                    self.creature_attack(guid, target_guid, &config, now);
                }
                AiAction::MoveTo { to } => self.creature_step(guid, to, true),
                AiAction::Chase { to } => self.creature_step(guid, to, false),
                AiAction::None => {}
            }
        }
    }

    fn creature_attack(&mut self, guid: u64, target_guid: u64, config: &AiConfig, now: u64) {
        let Some(target) = self.entities.get(&target_guid) else {
            if let Some(creature) = self.creatures.get_mut(&guid) {
                creature.ai.remove_threat(target_guid);
            }
            return;
        };
        if target.is_dead() || !target.targetable {
            if let Some(creature) = self.creatures.get_mut(&guid) {
                creature.ai.remove_threat(target_guid);
            }
            return;
        }

        let target_pos = target.position;
        let self_pos = self.entities[&guid].position;

        let action = {
            let creature = &self.creatures[&guid];
            creature.ai.combat_action(self_pos, target_pos, config.attack_range)
        };
        match action {
            AiAction::Attack { .. } => {
                let armor = self.entities[&target_guid].effective_stat(Stat::Armor, now);
                let damage = stats::mitigate_physical(config.attack_damage as f32, armor).round() as u32;
                self.deal_damage(guid, target_guid, damage, false, 0, now);
            }
            AiAction::Chase { to } => self.creature_step(guid, to, false),
            _ => {}
        }
    }

    /// Moves a creature one tick toward `to`. `evading` completes the evade
    /// (full heal) on arrival.
    fn creature_step(&mut self, guid: u64, to: Vec3, evading: bool) {
        let step = CREATURE_MOVE_SPEED * crate::ZONE_TICK_MS as f32 / 1000.0;
        let Some(entity) = self.entities.get_mut(&guid) else {
            return;
        };

        let delta = to - entity.position;
        let distance = delta.length();
        let next = if distance <= step {
            to
        } else {
            entity.position + delta / distance * step
        };
        entity.position = next;
        self.grid.update(guid, next);

        let arrived = next.distance(to) <= ARRIVE_EPSILON;
        if evading && arrived {
            entity.health = entity.max_health;
            let (health, max_health) = (entity.health, entity.max_health);
            if let Some(creature) = self.creatures.get_mut(&guid) {
                creature.ai.finish_evade();
            }
            self.broadcast_near(
                next,
                VIEW_RANGE,
                &ServerHealthUpdate { guid, health, max_health },
                None,
            );
        }

        self.broadcast_near(
            next,
            VIEW_RANGE,
            &ServerEntityCommand {
                guid,
                commands: vec![EntityCommand::SetPosition {
                    x: next.x,
                    y: next.y,
                    z: next.z,
                }],
            },
            None,
        );
    }

    fn expire_buffs(&mut self, now: u64) {
        let guids: Vec<u64> = self.entities.keys().copied().collect();
        for guid in guids {
            let entity = self.entities.get_mut(&guid).expect("listed");
            let expired = entity.effects.expire(now);
            if expired.is_empty() {
                continue;
            }
            let pos = entity.position;
            for buff in expired {
                self.broadcast_near(
                    pos,
                    VIEW_RANGE,
                    &ServerBuffUpdate {
                        guid,
                        buff_id: buff.id,
                        spell_id: buff.spell_id,
                        applied: false,
                        duration_ms: 0,
                    },
                    None,
                );
            }
        }
    }

    fn finish_casts(&mut self, now: u64) {
        let finished: Vec<(u64, CastInProgress)> = self
            .casts
            .iter()
            .filter(|(_, cast)| cast.deadline <= now)
            .map(|(&guid, &cast)| (guid, cast))
            .collect();

        for (caster_guid, cast) in finished {
            self.casts.remove(&caster_guid);
            let Some(spell) = self.content.spell(cast.spell_id).cloned() else {
                continue;
            };
            if !self.entities.get(&caster_guid).is_some_and(|e| !e.is_dead()) {
                continue;
            }
            self.commit_cast(caster_guid, &spell, cast.target_guid, now);
        }
    }

    fn run_periodic(&mut self, now: u64) {
        let due: Vec<(u64, (u64, u32, u64))> = self.periodic.pop_until(now).collect();
        for (due_at, (guid, buff_id, generation)) in due {
            let Some(buff) = self
                .entities
                .get(&guid)
                .and_then(|e| e.effects.get(buff_id))
                .cloned()
            else {
                continue;
            };
            // A replaced buff re-seeds its own schedule entry; stale
            // generations lapse here.
            if buff.expires_at != generation || buff.expires_at <= due_at {
                continue;
            }

            let interval = u64::from(buff.tick_interval_ms);
            let (ticks, next) = pending_periodic_ticks(due_at, interval, now);
            let per_tick = buff.amount.max(0) as u32;

            for _ in 0..ticks {
                match buff.kind {
                    BuffKind::PeriodicDamage => {
                        self.deal_damage(buff.caster_guid, guid, per_tick, false, buff.spell_id, now);
                    }
                    BuffKind::PeriodicHeal => {
                        let Some(entity) = self.entities.get_mut(&guid) else {
                            break;
                        };
                        let healed = entity.apply_heal(per_tick);
                        let (health, max_health) = (entity.health, entity.max_health);
                        let pos = entity.position;
                        self.broadcast_near(
                            pos,
                            VIEW_RANGE,
                            &ServerSpellResult {
                                caster_guid: buff.caster_guid,
                                spell_id: buff.spell_id,
                                target_guid: guid,
                                effect_kind: ServerSpellResult::KIND_PERIODIC_HEAL,
                                amount: healed,
                                critical: false,
                            },
                            Some(buff.caster_guid),
                        );
                        self.broadcast_near(
                            pos,
                            VIEW_RANGE,
                            &ServerHealthUpdate { guid, health, max_health },
                            None,
                        );
                    }
                    _ => {}
                }
                // The target may have died mid-train.
                if !self.entities.contains_key(&guid) {
                    break;
                }
            }

            if next < buff.expires_at && self.entities.contains_key(&guid) {
                self.periodic.schedule(next, (guid, buff_id, generation));
            }
        }
    }

    fn despawn_corpses(&mut self, now: u64) {
        let due: Vec<u64> = self.corpse_despawns.pop_until(now).map(|(_, g)| g).collect();
        for corpse_guid in due {
            if self.corpses.remove(&corpse_guid).is_none() {
                continue;
            }
            let Some(entity) = self.entities.remove(&corpse_guid) else {
                continue;
            };
            self.grid.remove(corpse_guid);
            self.broadcast_near(
                entity.position,
                VIEW_RANGE,
                &ServerEntityDespawn { guid: corpse_guid },
                None,
            );
        }
    }

    fn run_respawns(&mut self, now: u64) {
        let due: Vec<(u32, Vec3, f32)> = self.respawns.pop_until(now).map(|(_, v)| v).collect();
        for (template_id, pos, rotation) in due {
            self.spawn_creature(template_id, pos, rotation);
        }
    }

    fn spawn_creature(&mut self, template_id: u32, pos: Vec3, rotation: f32) {
        let Some(template) = self.content.creature_template(template_id).cloned() else {
            warn!(zone = %self.key, template_id, "unknown creature template");
            return;
        };

        let guid = self.guids.allocate(EntityKind::Creature);
        let mut entity = Entity::new(guid, EntityKind::Creature, template.name.clone(), pos)
            .with_health(template.max_health, template.max_health);
        entity.rotation = rotation;
        entity.level = template.level;
        entity.display_info = template.display_info;
        entity.faction_id = template.faction_id;
        entity.base_stats = template.stats.iter().map(|(&k, &v)| (k, v)).collect();

        let packet = spawn_packet(&entity);
        self.grid.insert(guid, pos);
        self.entities.insert(guid, entity);
        self.creatures.insert(
            guid,
            CreatureState {
                ai: AiState::new(pos),
                config: AiConfig {
                    aggro_range: template.aggro_range,
                    leash_range: template.leash_range,
                    attack_range: template.attack_range,
                    attack_speed_ms: template.attack_speed_ms,
                    attack_damage: template.attack_damage,
                },
                template_id,
            },
        );
        self.broadcast_near(pos, VIEW_RANGE, &packet, None);
    }

    // ---- plumbing --------------------------------------------------------

    /// Sends `msg` once to every player within `radius` of `pos`. The grid
    /// yields each guid at most once, so no recipient sees duplicates.
    fn broadcast_near<M: Message>(&self, pos: Vec3, radius: f32, msg: &M, exclude: Option<u64>) {
        let payload = msg.to_payload();
        for guid in self.grid.query_range(pos, radius) {
            if Some(guid) == exclude {
                continue;
            }
            if let Some(player) = self.players.get(&guid) {
                player.handle.send_raw(M::OPCODE, payload.clone());
            }
        }
    }

    fn broadcast_zone<M: Message>(&self, msg: &M) {
        let payload = msg.to_payload();
        for player in self.players.values() {
            player.handle.send_raw(M::OPCODE, payload.clone());
        }
    }

    fn notify_error(&self, guid: u64, err: GameError) {
        if let Some(player) = self.players.get(&guid) {
            player.handle.send(&ServerChat {
                channel: ChatChannel::System.to_u16(),
                from_guid: 0,
                from_name: String::new(),
                text: err.to_string(),
            });
        }
    }

    /// Zone teardown: despawn everything and notify residents.
    fn drain(&mut self) {
        for (&guid, _) in &self.entities {
            self.broadcast_zone(&ServerEntityDespawn { guid });
        }
        self.entities.clear();
        self.grid = SpatialGrid::new(nexus_spatial::DEFAULT_CELL_SIZE);
        self.creatures.clear();
        self.players.clear();
        self.casts.clear();
        self.corpses.clear();
        self.periodic.clear();
        self.corpse_despawns.clear();
        self.respawns.clear();
    }

    // ---- test support ----------------------------------------------------

    pub fn entity(&self, guid: u64) -> Option<&Entity> {
        self.entities.get(&guid)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn has_entity(&self, guid: u64) -> bool {
        self.entities.contains_key(&guid) && self.grid.contains(guid)
    }

    pub fn creature_guids(&self) -> Vec<u64> {
        self.creatures.keys().copied().collect()
    }

    pub fn creature_state(&self, guid: u64) -> Option<AiStateKind> {
        self.creatures.get(&guid).map(|c| c.ai.state)
    }

    pub fn grid_position(&self, guid: u64) -> Option<Vec3> {
        self.grid.position(guid)
    }
}

fn spawn_packet(entity: &Entity) -> ServerEntitySpawn {
    ServerEntitySpawn {
        guid: entity.guid,
        kind: entity.kind.tag(),
        display_info: entity.display_info,
        x: entity.position.x,
        y: entity.position.y,
        z: entity.position.z,
        rotation: entity.rotation,
        health: entity.health,
        max_health: entity.max_health,
        level: entity.level,
        name: entity.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use nexus_content::{JsonStore, LootEntry, LootTable, SpawnPoint, ZoneTemplate};
    use nexus_game::faction::Disposition;
    use nexus_game::spell::{Spell, SpellSchool, TargetType};
    use nexus_network::OutboundFrame;
    use nexus_protocol::packets::ServerChat;
    use nexus_protocol::{Message as _, Opcode};
    use tokio::sync::oneshot;

    use super::*;

    const ZONE_ID: u32 = 426;

    fn store() -> JsonStore {
        let mut store = JsonStore::empty();
        store.factions_mut().insert(3, Disposition::Hostile);
        store.insert_creature(CreatureTemplate {
            id: 9,
            name: "Razortail Skug".into(),
            display_info: 20885,
            level: 1,
            max_health: 450,
            stats: Default::default(),
            faction_id: 3,
            aggro_range: 10.0,
            leash_range: 40.0,
            attack_range: 3.0,
            attack_speed_ms: 1_000,
            attack_damage: 10,
            xp_reward: 100,
            loot_table: Some(5),
        });
        store.insert_loot_table(LootTable {
            id: 5,
            entries: vec![LootEntry {
                item_id: 7001,
                min_quantity: 1,
                max_quantity: 1,
                chance: 1.0,
            }],
        });
        store.insert_spell(Spell {
            id: 70,
            name: "Bolt".into(),
            cast_time_ms: 0,
            cooldown_ms: 1_000,
            range: 25.0,
            target_type: TargetType::Enemy,
            triggers_gcd: true,
            effects: vec![SpellEffect {
                kind: SpellEffectKind::Damage,
                amount: 30,
                scaling_factor: 0.0,
                scaling_stat: None,
                school: SpellSchool::Magic,
                duration_ms: 0,
                tick_interval_ms: 0,
                stat: None,
            }],
        });
        store.insert_spell(Spell {
            id: 71,
            name: "Rot".into(),
            cast_time_ms: 0,
            cooldown_ms: 0,
            range: 25.0,
            target_type: TargetType::Enemy,
            triggers_gcd: false,
            effects: vec![SpellEffect {
                kind: SpellEffectKind::PeriodicDamage,
                amount: 5,
                scaling_factor: 0.0,
                scaling_stat: None,
                school: SpellSchool::Magic,
                duration_ms: 10_000,
                tick_interval_ms: 3_000,
                stat: None,
            }],
        });
        store
    }

    fn empty_zone() -> ZoneInstance {
        let (zone, _handle) = ZoneInstance::new(
            ZoneKey::new(ZONE_ID, 1),
            Arc::new(store()),
            Arc::new(GuidAllocator::default()),
        );
        zone
    }

    fn zone_with_creature() -> ZoneInstance {
        let mut content = store();
        content.insert_zone(ZoneTemplate {
            id: ZONE_ID,
            name: "Algoroc".into(),
            cell_size: 50.0,
            spawns: vec![SpawnPoint {
                creature_id: 9,
                x: 0.0,
                y: 0.0,
                z: 0.0,
                rotation: 0.0,
            }],
        });
        let (zone, _handle) = ZoneInstance::new(
            ZoneKey::new(ZONE_ID, 1),
            Arc::new(content),
            Arc::new(GuidAllocator::default()),
        );
        zone
    }

    fn join(
        zone: &mut ZoneInstance,
        guid: u64,
        pos: Vec3,
        faction: PlayerFaction,
    ) -> flume::Receiver<OutboundFrame> {
        let (handle, rx) = ConnectionHandle::detached();
        let mut entity = Entity::new(guid, EntityKind::Player, format!("player-{guid}"), pos)
            .with_health(100, 100);
        entity.spawn_position = pos;
        let (reply, mut done) = oneshot::channel();
        zone.handle_message(
            ZoneMessage::AddPlayer {
                entry: Box::new(PlayerEntry {
                    entity,
                    account_id: guid,
                    faction,
                    xp: 0,
                    handle,
                }),
                reply,
            },
            0,
        );
        done.try_recv().expect("join acknowledged");
        rx
    }

    fn received(rx: &flume::Receiver<OutboundFrame>, opcode: Opcode) -> Vec<Vec<u8>> {
        let mut out = vec![];
        while let Ok(frame) = rx.try_recv() {
            if let Some((op, payload)) = frame.into_frame() {
                if op == opcode {
                    out.push(payload);
                }
            }
        }
        out
    }

    fn drain(rx: &flume::Receiver<OutboundFrame>) {
        while rx.try_recv().is_ok() {}
    }

    #[test]
    fn membership_mirrors_the_grid() {
        let mut zone = empty_zone();
        let rx = join(&mut zone, 1, Vec3::new(1.0, 2.0, 3.0), PlayerFaction::Exile);
        drain(&rx);

        assert!(zone.has_entity(1));
        assert_eq!(zone.grid_position(1), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(
            zone.entity(1).unwrap().position,
            zone.grid_position(1).unwrap()
        );

        zone.handle_message(ZoneMessage::RemovePlayer { guid: 1, reply: None }, 0);
        assert!(!zone.has_entity(1));
        assert_eq!(zone.grid_position(1), None);
    }

    #[test]
    fn movement_updates_entity_and_grid_together() {
        let mut zone = empty_zone();
        let rx = join(&mut zone, 1, Vec3::ZERO, PlayerFaction::Exile);
        drain(&rx);

        zone.handle_message(
            ZoneMessage::Movement {
                guid: 1,
                commands: vec![EntityCommand::SetPosition { x: 60.0, y: 0.0, z: 0.0 }],
            },
            0,
        );
        assert_eq!(zone.entity(1).unwrap().position, Vec3::new(60.0, 0.0, 0.0));
        assert_eq!(zone.grid_position(1), Some(Vec3::new(60.0, 0.0, 0.0)));

        // A teleport-sized jump is refused outright.
        zone.handle_message(
            ZoneMessage::Movement {
                guid: 1,
                commands: vec![EntityCommand::SetPosition { x: 900.0, y: 0.0, z: 0.0 }],
            },
            0,
        );
        assert_eq!(zone.entity(1).unwrap().position, Vec3::new(60.0, 0.0, 0.0));
    }

    #[test]
    fn say_reaches_thirty_units_and_yell_a_hundred() {
        let mut zone = empty_zone();
        let a = join(&mut zone, 1, Vec3::ZERO, PlayerFaction::Exile);
        let b = join(&mut zone, 2, Vec3::new(25.0, 0.0, 0.0), PlayerFaction::Exile);
        let c = join(&mut zone, 3, Vec3::new(60.0, 0.0, 0.0), PlayerFaction::Exile);
        for rx in [&a, &b, &c] {
            drain(rx);
        }

        zone.handle_message(
            ZoneMessage::Chat {
                guid: 1,
                channel: ChatChannel::Say,
                text: "hi".into(),
            },
            0,
        );

        // Say echoes to the speaker and reaches B, never C.
        assert_eq!(received(&a, Opcode::ServerChat).len(), 1);
        let heard = received(&b, Opcode::ServerChat);
        assert_eq!(heard.len(), 1);
        let msg = ServerChat::from_payload(&heard[0]).unwrap();
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.channel, ChatChannel::Say.to_u16());
        assert!(received(&c, Opcode::ServerChat).is_empty());

        zone.handle_message(
            ZoneMessage::Chat {
                guid: 1,
                channel: ChatChannel::Yell,
                text: "hi".into(),
            },
            0,
        );
        assert_eq!(received(&b, Opcode::ServerChat).len(), 1);
        assert_eq!(received(&c, Opcode::ServerChat).len(), 1);
    }

    #[test]
    fn idle_creature_aggros_and_melees_the_closest_player() {
        let mut zone = zone_with_creature();
        let creature = zone.creature_guids()[0];
        let rx = join(&mut zone, 100, Vec3::new(5.0, 0.0, 0.0), PlayerFaction::Exile);
        drain(&rx);

        zone.tick(1_000);
        assert_eq!(zone.creature_state(creature), Some(AiStateKind::Combat));

        // The skug closes the gap on its swing cadence, then connects.
        for t in [2_000, 3_000, 4_000] {
            zone.tick(t);
        }
        assert_eq!(zone.entity(100).unwrap().health, 90);
        assert!(!received(&rx, Opcode::ServerHealthUpdate).is_empty());
    }

    #[test]
    fn player_spell_damages_creature_and_pulls_it_into_combat() {
        let mut zone = zone_with_creature();
        let creature = zone.creature_guids()[0];
        let rx = join(&mut zone, 100, Vec3::new(20.0, 0.0, 0.0), PlayerFaction::Exile);
        drain(&rx);

        zone.handle_message(
            ZoneMessage::CastSpell {
                guid: 100,
                spell_id: 70,
                target_guid: creature,
            },
            0,
        );

        assert_eq!(zone.entity(creature).unwrap().health, 420);
        assert_eq!(zone.creature_state(creature), Some(AiStateKind::Combat));

        // Same spell again inside the cooldown fizzles.
        zone.handle_message(
            ZoneMessage::CastSpell {
                guid: 100,
                spell_id: 70,
                target_guid: creature,
            },
            500,
        );
        assert_eq!(zone.entity(creature).unwrap().health, 420);
    }

    #[test]
    fn periodic_damage_ticks_and_coalesces_missed_windows() {
        let mut zone = zone_with_creature();
        let creature = zone.creature_guids()[0];
        let rx = join(&mut zone, 100, Vec3::new(20.0, 0.0, 0.0), PlayerFaction::Exile);
        drain(&rx);

        zone.handle_message(
            ZoneMessage::CastSpell {
                guid: 100,
                spell_id: 71,
                target_guid: creature,
            },
            0,
        );
        assert_eq!(zone.entity(creature).unwrap().health, 450);

        zone.tick(3_000);
        assert_eq!(zone.entity(creature).unwrap().health, 445);

        // The zone stalls; waking at 9.5s owes the 6s and 9s ticks at once.
        zone.tick(9_500);
        assert_eq!(zone.entity(creature).unwrap().health, 435);

        // Past the duration nothing further lands.
        zone.tick(13_000);
        assert_eq!(zone.entity(creature).unwrap().health, 435);
    }

    #[test]
    fn dead_creature_leaves_a_lootable_corpse_once_per_looter() {
        let mut zone = zone_with_creature();
        let creature = zone.creature_guids()[0];
        let rx = join(&mut zone, 100, Vec3::new(5.0, 0.0, 0.0), PlayerFaction::Exile);
        drain(&rx);

        // Big enough to one-shot through 450 health.
        zone.deal_damage(100, creature, 10_000, false, 70, 0);
        assert!(zone.entity(creature).is_none());
        assert_eq!(zone.creature_state(creature), None);

        // The corpse is a distinct entity at the same spot.
        let corpse = zone
            .entities
            .values()
            .find(|e| e.kind == EntityKind::Corpse)
            .map(|e| e.guid)
            .expect("corpse spawned");
        assert_eq!(zone.grid_position(corpse), Some(Vec3::ZERO));

        drain(&rx);
        zone.handle_message(ZoneMessage::Loot { guid: 100, corpse_guid: corpse }, 0);
        let first = received(&rx, Opcode::ServerLootResponse);
        assert_eq!(first.len(), 1);
        let loot = nexus_protocol::packets::ServerLootResponse::from_payload(&first[0]).unwrap();
        assert_eq!(loot.items, vec![(7001, 1)]);

        zone.handle_message(ZoneMessage::Loot { guid: 100, corpse_guid: corpse }, 0);
        let second = received(&rx, Opcode::ServerLootResponse);
        let loot = nexus_protocol::packets::ServerLootResponse::from_payload(&second[0]).unwrap();
        assert!(loot.items.is_empty());

        // The corpse despawns on schedule.
        zone.tick(CORPSE_TTL_MS + 1);
        assert!(zone.entity(corpse).is_none());
        assert_eq!(zone.grid_position(corpse), None);
    }

    #[test]
    fn loot_is_refused_while_in_combat() {
        let mut zone = zone_with_creature();
        let creature = zone.creature_guids()[0];
        let rx = join(&mut zone, 100, Vec3::new(5.0, 0.0, 0.0), PlayerFaction::Exile);
        drain(&rx);

        zone.deal_damage(100, creature, 10_000, false, 70, 0);
        let corpse = zone
            .entities
            .values()
            .find(|e| e.kind == EntityKind::Corpse)
            .map(|e| e.guid)
            .expect("corpse spawned");

        // The replacement spawn picks the fight back up.
        zone.tick(30_000);
        let respawned = zone.creature_guids()[0];
        zone.deal_damage(100, respawned, 10, false, 70, 30_000);
        assert_eq!(zone.creature_state(respawned), Some(AiStateKind::Combat));
        drain(&rx);

        zone.handle_message(ZoneMessage::Loot { guid: 100, corpse_guid: corpse }, 30_000);
        assert!(received(&rx, Opcode::ServerLootResponse).is_empty());

        // Dropping the attacker ends combat; the corpse opens.
        zone.deal_damage(100, respawned, 10_000, false, 70, 30_000);
        drain(&rx);
        zone.handle_message(ZoneMessage::Loot { guid: 100, corpse_guid: corpse }, 30_000);
        assert_eq!(received(&rx, Opcode::ServerLootResponse).len(), 1);
    }

    #[test]
    fn shutdown_drains_the_zone_and_notifies() {
        let mut zone = zone_with_creature();
        let rx = join(&mut zone, 1, Vec3::ZERO, PlayerFaction::Exile);
        drain(&rx);

        let (reply, mut done) = oneshot::channel();
        zone.handle_message(ZoneMessage::Shutdown { reply }, 0);
        done.try_recv().expect("shutdown acknowledged");

        assert_eq!(zone.entity_count(), 0);
        assert!(!received(&rx, Opcode::ServerEntityDespawn).is_empty());
    }

    #[test]
    fn kill_grants_experience() {
        let mut zone = zone_with_creature();
        let creature = zone.creature_guids()[0];
        let rx = join(&mut zone, 100, Vec3::new(5.0, 0.0, 0.0), PlayerFaction::Exile);
        drain(&rx);

        zone.deal_damage(100, creature, 10_000, false, 70, 0);
        assert_eq!(zone.players[&100].xp, 100);
        assert_eq!(zone.entity(100).unwrap().level, 1);
    }
}
