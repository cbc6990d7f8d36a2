//! Spell definitions and combat math.
//!
//! Templates are plain data (deserialized by the content store); the
//! computations here are pure, with the crit roll and clock passed in by the
//! caller.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::stats::{self, Stat};
use crate::GameError;

/// Global cooldown applied by gcd-bound spells.
pub const GCD_MS: u64 = 1_000;

/// Critical hits and heals land at 1.5x.
pub const CRIT_MULTIPLIER: f32 = 1.5;

/// Damage to the caster at or above this fraction of max health interrupts a
/// cast in progress.
pub const CAST_INTERRUPT_FRACTION: f32 = 0.05;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Caster,
    Enemy,
    Ally,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellSchool {
    Physical,
    Magic,
    Tech,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellEffectKind {
    Damage,
    Heal,
    Absorb,
    StatModifier,
    PeriodicDamage,
    PeriodicHeal,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SpellEffect {
    pub kind: SpellEffectKind,
    pub amount: i32,
    #[serde(default)]
    pub scaling_factor: f32,
    #[serde(default)]
    pub scaling_stat: Option<Stat>,
    pub school: SpellSchool,
    #[serde(default)]
    pub duration_ms: u32,
    #[serde(default)]
    pub tick_interval_ms: u32,
    /// For stat-modifier effects.
    #[serde(default)]
    pub stat: Option<Stat>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Spell {
    pub id: u32,
    pub name: String,
    pub cast_time_ms: u32,
    pub cooldown_ms: u32,
    pub range: f32,
    pub target_type: TargetType,
    pub triggers_gcd: bool,
    /// Applied in declared order on completion.
    pub effects: Vec<SpellEffect>,
}

impl Spell {
    pub fn is_instant(&self) -> bool {
        self.cast_time_ms == 0
    }
}

/// A non-instant cast underway. Any sufficient hit on the caster cancels it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CastInProgress {
    pub spell_id: u32,
    pub target_guid: u64,
    pub started_at: u64,
    pub deadline: u64,
}

/// Checks admissibility: cooldowns, GCD, target liveness, and range.
pub fn can_cast(
    caster: &Entity,
    spell: &Spell,
    target: Option<&Entity>,
    now: u64,
) -> Result<(), GameError> {
    if !caster.cooldowns.can_cast(spell.id, spell.triggers_gcd, now) {
        return Err(GameError::OnCooldown);
    }
    match spell.target_type {
        TargetType::Caster => Ok(()),
        TargetType::Enemy | TargetType::Ally => {
            let target = target.ok_or(GameError::UnknownTarget)?;
            if spell.target_type == TargetType::Enemy && target.is_dead() {
                return Err(GameError::NotAlive);
            }
            if caster.distance_to(target.position) > spell.range {
                return Err(GameError::OutOfRange);
            }
            Ok(())
        }
    }
}

/// Scales an effect by the caster's stats:
/// `base = amount + effective_stat(scaling_stat) * scaling_factor`.
fn scaled_base(caster: &Entity, effect: &SpellEffect, now: u64) -> f32 {
    let scaling = match effect.scaling_stat {
        Some(stat) => caster.effective_stat(stat, now) * effect.scaling_factor,
        None => 0.0,
    };
    effect.amount as f32 + scaling
}

/// Computes a damage effect against a target: stat scaling, armor mitigation
/// for physical schools, then the crit multiplier. `roll` is uniform in
/// `[0, 1)`. Absorbs are applied later by the entity's damage path.
pub fn compute_damage(
    caster: &Entity,
    target: &Entity,
    effect: &SpellEffect,
    roll: f32,
    force_crit: bool,
    now: u64,
) -> (u32, bool) {
    let base = scaled_base(caster, effect, now);
    let mitigated = match effect.school {
        SpellSchool::Physical => {
            stats::mitigate_physical(base, target.effective_stat(Stat::Armor, now))
        }
        SpellSchool::Magic | SpellSchool::Tech => base,
    };
    let critical = force_crit || roll < caster.effective_stat(Stat::CritChance, now);
    let multiplier = if critical { CRIT_MULTIPLIER } else { 1.0 };
    ((mitigated * multiplier).max(0.0).round() as u32, critical)
}

/// Computes a heal: same scaling and crit rules, capped by the target's
/// missing health.
pub fn compute_heal(
    caster: &Entity,
    target: &Entity,
    effect: &SpellEffect,
    roll: f32,
    force_crit: bool,
    now: u64,
) -> (u32, bool) {
    let base = scaled_base(caster, effect, now);
    let critical = force_crit || roll < caster.effective_stat(Stat::CritChance, now);
    let multiplier = if critical { CRIT_MULTIPLIER } else { 1.0 };
    let amount = (base * multiplier).max(0.0).round() as u32;
    (amount.min(target.max_health - target.health), critical)
}

/// Number of ticks a periodic effect delivers over its lifetime.
pub fn tick_count(duration_ms: u32, tick_interval_ms: u32) -> u32 {
    if tick_interval_ms == 0 {
        return 0;
    }
    duration_ms / tick_interval_ms
}

/// Whether a hit on the caster is hard enough to break the cast.
pub fn interrupts_cast(health_lost: u32, max_health: u32) -> bool {
    health_lost as f32 >= max_health as f32 * CAST_INTERRUPT_FRACTION
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use crate::guid::EntityKind;

    use super::*;

    fn caster() -> Entity {
        let mut e = Entity::new(1, EntityKind::Player, "Caster", Vec3::ZERO).with_health(100, 100);
        e.base_stats.insert(Stat::AssaultPower, 40.0);
        e.base_stats.insert(Stat::CritChance, 0.0);
        e
    }

    fn dummy(armor: f32) -> Entity {
        let mut e = Entity::new(2, EntityKind::Creature, "Dummy", Vec3::new(5.0, 0.0, 0.0))
            .with_health(1_000, 1_000);
        e.base_stats.insert(Stat::Armor, armor);
        e
    }

    fn strike(school: SpellSchool) -> SpellEffect {
        SpellEffect {
            kind: SpellEffectKind::Damage,
            amount: 100,
            scaling_factor: 0.5,
            scaling_stat: Some(Stat::AssaultPower),
            school,
            duration_ms: 0,
            tick_interval_ms: 0,
            stat: None,
        }
    }

    fn spell(id: u32, target_type: TargetType) -> Spell {
        Spell {
            id,
            name: "Test Spell".into(),
            cast_time_ms: 0,
            cooldown_ms: 5_000,
            range: 25.0,
            target_type,
            triggers_gcd: true,
            effects: vec![strike(SpellSchool::Magic)],
        }
    }

    #[test]
    fn damage_scales_with_stats() {
        // 100 + 40 * 0.5 = 120, no armor on the magic school.
        let (dmg, crit) = compute_damage(&caster(), &dummy(0.0), &strike(SpellSchool::Magic), 0.99, false, 0);
        assert_eq!(dmg, 120);
        assert!(!crit);
    }

    #[test]
    fn physical_damage_is_mitigated_and_clamped() {
        // Armor pivot point halves it.
        let (dmg, _) = compute_damage(&caster(), &dummy(750.0), &strike(SpellSchool::Physical), 0.99, false, 0);
        assert_eq!(dmg, 60);

        // Absurd armor still leaves 25%.
        let (dmg, _) = compute_damage(&caster(), &dummy(1.0e9), &strike(SpellSchool::Physical), 0.99, false, 0);
        assert_eq!(dmg, 30);
    }

    #[test]
    fn crits_multiply_by_one_and_a_half() {
        let (dmg, crit) = compute_damage(&caster(), &dummy(0.0), &strike(SpellSchool::Magic), 0.0, true, 0);
        assert_eq!(dmg, 180);
        assert!(crit);

        let mut lucky = caster();
        lucky.base_stats.insert(Stat::CritChance, 0.5);
        let (_, crit) = compute_damage(&lucky, &dummy(0.0), &strike(SpellSchool::Magic), 0.49, false, 0);
        assert!(crit);
        let (_, crit) = compute_damage(&lucky, &dummy(0.0), &strike(SpellSchool::Magic), 0.51, false, 0);
        assert!(!crit);
    }

    #[test]
    fn heal_is_capped_by_missing_health() {
        let mut target = dummy(0.0);
        target.apply_damage(50, 0);

        let effect = SpellEffect {
            kind: SpellEffectKind::Heal,
            amount: 400,
            scaling_factor: 0.0,
            scaling_stat: None,
            school: SpellSchool::Magic,
            duration_ms: 0,
            tick_interval_ms: 0,
            stat: None,
        };
        let (healed, _) = compute_heal(&caster(), &target, &effect, 0.99, false, 0);
        assert_eq!(healed, 50);
    }

    #[test]
    fn can_cast_enforces_cooldown_target_and_range() {
        let mut c = caster();
        let s = spell(10, TargetType::Enemy);
        let target = dummy(0.0);

        assert_eq!(can_cast(&c, &s, Some(&target), 0), Ok(()));

        c.cooldowns.trigger(s.id, u64::from(s.cooldown_ms), true, GCD_MS, 0);
        assert_eq!(can_cast(&c, &s, Some(&target), 100), Err(GameError::OnCooldown));
        assert_eq!(can_cast(&c, &s, Some(&target), 5_000), Ok(()));

        let mut dead = dummy(0.0);
        dead.apply_damage(5_000, 0);
        assert_eq!(can_cast(&c, &s, Some(&dead), 5_000), Err(GameError::NotAlive));

        let mut far = dummy(0.0);
        far.position = Vec3::new(100.0, 0.0, 0.0);
        assert_eq!(can_cast(&c, &s, Some(&far), 5_000), Err(GameError::OutOfRange));

        assert_eq!(can_cast(&c, &s, None, 5_000), Err(GameError::UnknownTarget));
    }

    #[test]
    fn self_cast_needs_no_target() {
        let c = caster();
        let s = spell(11, TargetType::Caster);
        assert_eq!(can_cast(&c, &s, None, 0), Ok(()));
    }

    #[test]
    fn periodic_tick_count() {
        assert_eq!(tick_count(9_000, 3_000), 3);
        assert_eq!(tick_count(10_000, 3_000), 3);
        assert_eq!(tick_count(0, 3_000), 0);
        assert_eq!(tick_count(5_000, 0), 0);
    }

    #[test]
    fn interrupt_threshold() {
        assert!(!interrupts_cast(4, 100));
        assert!(interrupts_cast(5, 100));
        assert!(interrupts_cast(90, 100));
    }
}
