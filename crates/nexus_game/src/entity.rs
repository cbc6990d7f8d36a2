//! The in-world entity record and its health math.

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::cooldowns::Cooldowns;
use crate::effects::ActiveEffects;
use crate::guid::EntityKind;
use crate::stats::{self, Stat};

#[derive(Clone, Debug)]
pub struct Entity {
    pub guid: u64,
    pub kind: EntityKind,
    pub name: String,
    pub position: Vec3,
    pub rotation: f32,
    pub health: u32,
    pub max_health: u32,
    pub level: u16,
    pub base_stats: FxHashMap<Stat, f32>,
    pub effects: ActiveEffects,
    pub cooldowns: Cooldowns,
    pub owner_guid: Option<u64>,
    pub spawn_position: Vec3,
    pub display_info: u32,
    pub faction_id: u32,
    /// Cleared on death so AI stops considering the entity.
    pub targetable: bool,
}

/// What a hit actually did once shields and clamping were applied.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DamageOutcome {
    pub absorbed: u32,
    pub health_lost: u32,
    pub died: bool,
    /// Absorb shields fully consumed by this hit.
    pub depleted_buffs: Vec<u32>,
}

impl Entity {
    pub fn new(guid: u64, kind: EntityKind, name: impl Into<String>, position: Vec3) -> Self {
        Self {
            guid,
            kind,
            name: name.into(),
            position,
            rotation: 0.0,
            health: 1,
            max_health: 1,
            level: 1,
            base_stats: FxHashMap::default(),
            effects: ActiveEffects::new(),
            cooldowns: Cooldowns::new(),
            owner_guid: None,
            spawn_position: position,
            display_info: 0,
            faction_id: 0,
            targetable: true,
        }
    }

    pub fn with_health(mut self, health: u32, max_health: u32) -> Self {
        debug_assert!(health <= max_health);
        self.health = health;
        self.max_health = max_health;
        self
    }

    pub fn is_dead(&self) -> bool {
        self.health == 0
    }

    pub fn health_percent(&self) -> f32 {
        if self.max_health == 0 {
            return 0.0;
        }
        self.health as f32 / self.max_health as f32
    }

    /// Applies damage: absorbs drain first, the rest hits health, clamped at
    /// zero. Death flips `targetable` off.
    pub fn apply_damage(&mut self, damage: u32, now: u64) -> DamageOutcome {
        if damage == 0 {
            return DamageOutcome {
                absorbed: 0,
                health_lost: 0,
                died: false,
                depleted_buffs: vec![],
            };
        }

        let absorb = self.effects.consume_absorb(damage, now);
        let health_lost = absorb.remaining.min(self.health);
        self.health -= health_lost;

        let died = self.health == 0 && health_lost > 0;
        if died {
            self.targetable = false;
        }

        DamageOutcome {
            absorbed: absorb.absorbed,
            health_lost,
            died,
            depleted_buffs: absorb.depleted,
        }
    }

    /// Heals up to `max_health`, returning the amount actually restored.
    pub fn apply_heal(&mut self, amount: u32) -> u32 {
        let healed = amount.min(self.max_health - self.health);
        self.health += healed;
        healed
    }

    /// Base stat plus active modifiers at `now`.
    pub fn effective_stat(&self, stat: Stat, now: u64) -> f32 {
        let base = self.base_stats.get(&stat).copied().unwrap_or(0.0);
        base + self.effects.stat_total(stat, now)
    }

    pub fn armor_fraction(&self, now: u64) -> f32 {
        stats::armor_fraction(self.effective_stat(Stat::Armor, now))
    }

    pub fn distance_to(&self, pos: Vec3) -> f32 {
        self.position.distance(pos)
    }

    /// Builds the corpse entity left behind by this one. The caller supplies
    /// the fresh guid and owns the loot and despawn bookkeeping.
    pub fn make_corpse(&self, corpse_guid: u64) -> Entity {
        let mut corpse = Entity::new(corpse_guid, EntityKind::Corpse, self.name.clone(), self.position);
        corpse.rotation = self.rotation;
        corpse.display_info = self.display_info;
        corpse.level = self.level;
        corpse.health = 0;
        corpse.max_health = self.max_health;
        corpse.owner_guid = Some(self.guid);
        corpse.faction_id = self.faction_id;
        corpse.targetable = false;
        corpse
    }
}
