//! Buff/debuff container.
//!
//! Effects are keyed by an instance id unique per entity; reapplying an id
//! replaces the entry wholesale, including its expiry and, for periodic
//! effects, the tick clock (the owning zone re-seeds its schedule).
//! Expiration is lazy: queries at time `t` simply ignore entries with
//! `expires_at <= t`, and [`ActiveEffects::expire`] is what physically drops
//! them.

use indexmap::IndexMap;

use crate::stats::Stat;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BuffKind {
    Absorb,
    StatModifier,
    DamageBoost,
    HealBoost,
    PeriodicDamage,
    PeriodicHeal,
}

#[derive(Clone, PartialEq, Debug)]
pub struct BuffDebuff {
    pub id: u32,
    pub spell_id: u32,
    pub kind: BuffKind,
    /// Signed: debuff stat modifiers carry their negative sign here.
    pub amount: i32,
    pub stat: Option<Stat>,
    pub duration_ms: u32,
    pub is_debuff: bool,
    pub caster_guid: u64,
    pub expires_at: u64,
    /// Zero for non-periodic kinds.
    pub tick_interval_ms: u32,
}

impl BuffDebuff {
    pub fn is_active(&self, now: u64) -> bool {
        self.expires_at > now
    }

    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

/// Result of pushing damage through the absorb shields.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AbsorbOutcome {
    pub absorbed: u32,
    pub remaining: u32,
    /// Ids of shields fully consumed and removed.
    pub depleted: Vec<u32>,
}

#[derive(Default, Clone, Debug)]
pub struct ActiveEffects {
    effects: IndexMap<u32, BuffDebuff>,
}

impl ActiveEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a buff. An existing entry with the same id is replaced,
    /// keeping its original position in the consumption order.
    pub fn apply(&mut self, buff: BuffDebuff) {
        self.effects.insert(buff.id, buff);
    }

    pub fn remove(&mut self, id: u32) -> Option<BuffDebuff> {
        self.effects.shift_remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&BuffDebuff> {
        self.effects.get(&id)
    }

    pub fn is_active(&self, id: u32, now: u64) -> bool {
        self.effects.get(&id).is_some_and(|b| b.is_active(now))
    }

    pub fn remaining_ms(&self, id: u32, now: u64) -> u64 {
        self.effects.get(&id).map_or(0, |b| b.remaining_ms(now))
    }

    pub fn iter_active(&self, now: u64) -> impl Iterator<Item = &BuffDebuff> {
        self.effects.values().filter(move |b| b.is_active(now))
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Sum of active stat modifiers matching `stat`. Debuffs contribute with
    /// their negative sign; callers supply signed amounts.
    pub fn stat_total(&self, stat: Stat, now: u64) -> f32 {
        self.iter_active(now)
            .filter(|b| b.kind == BuffKind::StatModifier && b.stat == Some(stat))
            .map(|b| b.amount as f32)
            .sum()
    }

    pub fn absorb_total(&self, now: u64) -> u32 {
        self.iter_active(now)
            .filter(|b| b.kind == BuffKind::Absorb)
            .map(|b| b.amount.max(0) as u32)
            .sum()
    }

    /// Feeds `damage` through absorb shields in insertion order. A shield
    /// reduced to zero is removed; partial consumption leaves the amount
    /// reduced and the expiry unchanged.
    pub fn consume_absorb(&mut self, damage: u32, now: u64) -> AbsorbOutcome {
        let mut remaining = damage;
        let mut absorbed = 0;
        let mut depleted = vec![];

        for buff in self.effects.values_mut() {
            if remaining == 0 {
                break;
            }
            if buff.kind != BuffKind::Absorb || !buff.is_active(now) {
                continue;
            }
            let available = buff.amount.max(0) as u32;
            let eaten = available.min(remaining);
            absorbed += eaten;
            remaining -= eaten;
            buff.amount -= eaten as i32;
            if buff.amount <= 0 {
                depleted.push(buff.id);
            }
        }

        for id in &depleted {
            self.effects.shift_remove(id);
        }

        AbsorbOutcome {
            absorbed,
            remaining,
            depleted,
        }
    }

    /// Drops every effect with `expires_at <= now`, returning them for
    /// removal broadcasts.
    pub fn expire(&mut self, now: u64) -> Vec<BuffDebuff> {
        let mut expired = vec![];
        self.effects.retain(|_, b| {
            if b.is_active(now) {
                true
            } else {
                expired.push(b.clone());
                false
            }
        });
        expired
    }

    /// Removes everything, returning the former entries (owner death).
    pub fn clear(&mut self) -> Vec<BuffDebuff> {
        self.effects.drain(..).map(|(_, b)| b).collect()
    }
}

/// Number of periodic ticks due at `now`, coalescing any the scheduler
/// missed, plus the advanced `next_tick_at` (a whole multiple of the
/// interval past `now`).
pub fn pending_periodic_ticks(next_tick_at: u64, interval_ms: u64, now: u64) -> (u32, u64) {
    debug_assert!(interval_ms > 0);
    if now < next_tick_at {
        return (0, next_tick_at);
    }
    let ticks = (now - next_tick_at) / interval_ms + 1;
    (ticks as u32, next_tick_at + ticks * interval_ms)
}
