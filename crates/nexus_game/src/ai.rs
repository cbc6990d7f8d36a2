//! Creature AI: threat bookkeeping and the idle / combat / evade / dead
//! state machine.
//!
//! ```text
//!       aggro detected               leash exceeded
//! idle ─────────────────▶ combat ─────────────────▶ evade
//!  ▲                       │                          │
//!  │  respawn              │ health → 0               │ reached spawn
//!  │                       ▼                          │
//!  └────────────────────  dead                        ▼ idle
//! ```

use glam::Vec3;
use indexmap::IndexMap;

use crate::faction::PlayerFaction;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AiStateKind {
    Idle,
    Combat,
    Evade,
    Dead,
}

/// Per-creature tuning, sourced from the creature template.
#[derive(Clone, Copy, Debug)]
pub struct AiConfig {
    pub aggro_range: f32,
    pub leash_range: f32,
    pub attack_range: f32,
    pub attack_speed_ms: u64,
    pub attack_damage: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            aggro_range: 10.0,
            leash_range: 40.0,
            attack_range: 3.0,
            attack_speed_ms: 2_000,
            attack_damage: 10,
        }
    }
}

/// What the creature wants to do this tick.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AiAction {
    None,
    Attack { target_guid: u64 },
    Chase { to: Vec3 },
    MoveTo { to: Vec3 },
}

/// A player visible to the aggro check.
#[derive(Clone, Copy, Debug)]
pub struct AggroCandidate {
    pub guid: u64,
    pub position: Vec3,
    pub faction: PlayerFaction,
}

#[derive(Clone, Debug)]
pub struct AiState {
    pub state: AiStateKind,
    pub target_guid: Option<u64>,
    pub spawn_position: Vec3,
    /// Accumulated threat; the most recent addition sits last, which is how
    /// ties resolve toward the most recent attacker.
    threat: IndexMap<u64, u32>,
    pub last_attack_at: u64,
    pub combat_entered_at: u64,
}

impl AiState {
    pub fn new(spawn_position: Vec3) -> Self {
        Self {
            state: AiStateKind::Idle,
            target_guid: None,
            spawn_position,
            threat: IndexMap::new(),
            last_attack_at: 0,
            combat_entered_at: 0,
        }
    }

    /// Picks an aggro target: hostile candidates within range, closest first,
    /// ties broken by the lower guid. Only an idle creature scans.
    pub fn check_aggro(
        &self,
        self_pos: Vec3,
        candidates: &[AggroCandidate],
        aggro_range: f32,
        hostile_to: impl Fn(PlayerFaction) -> bool,
    ) -> Option<u64> {
        if self.state != AiStateKind::Idle {
            return None;
        }
        let range_sq = aggro_range * aggro_range;
        candidates
            .iter()
            .filter(|c| hostile_to(c.faction))
            .filter(|c| c.position.distance_squared(self_pos) <= range_sq)
            .min_by(|a, b| {
                let da = a.position.distance_squared(self_pos);
                let db = b.position.distance_squared(self_pos);
                da.total_cmp(&db).then(a.guid.cmp(&b.guid))
            })
            .map(|c| c.guid)
    }

    pub fn enter_combat(&mut self, target_guid: u64, now: u64) {
        self.state = AiStateKind::Combat;
        self.target_guid = Some(target_guid);
        self.combat_entered_at = now;
    }

    /// Strictly beyond the leash while fighting means disengage.
    pub fn check_leash(&self, current_pos: Vec3, leash_range: f32) -> bool {
        self.state == AiStateKind::Combat
            && current_pos.distance(self.spawn_position) > leash_range
    }

    /// Drops combat entirely and walks home.
    pub fn begin_evade(&mut self) {
        self.state = AiStateKind::Evade;
        self.target_guid = None;
        self.threat.clear();
    }

    /// Called when the evade path reaches the spawn point.
    pub fn finish_evade(&mut self) {
        if self.state == AiStateKind::Evade {
            self.state = AiStateKind::Idle;
        }
    }

    /// Dead is terminal until `respawn`.
    pub fn on_death(&mut self) {
        self.state = AiStateKind::Dead;
        self.target_guid = None;
        self.threat.clear();
    }

    pub fn respawn(&mut self) {
        self.state = AiStateKind::Idle;
        self.target_guid = None;
        self.threat.clear();
        self.last_attack_at = 0;
    }

    pub fn add_threat(&mut self, guid: u64, amount: u32) {
        let total = self.threat.shift_remove(&guid).unwrap_or(0) + amount;
        self.threat.insert(guid, total);
    }

    /// Highest accumulated threat; among equals the most recent addition
    /// wins.
    pub fn highest_threat_target(&self) -> Option<u64> {
        let mut best: Option<(u64, u32)> = None;
        for (&guid, &value) in &self.threat {
            if best.map_or(true, |(_, b)| value >= b) {
                best = Some((guid, value));
            }
        }
        best.map(|(guid, _)| guid)
    }

    /// Removes an attacker (death, despawn, left the zone). Losing the
    /// current target switches to the next-highest; an empty table drops the
    /// creature back to idle.
    pub fn remove_threat(&mut self, guid: u64) {
        self.threat.shift_remove(&guid);
        if self.target_guid == Some(guid) {
            match self.highest_threat_target() {
                Some(next) => self.target_guid = Some(next),
                None => {
                    self.state = AiStateKind::Idle;
                    self.target_guid = None;
                }
            }
        }
    }

    pub fn threat_of(&self, guid: u64) -> u32 {
        self.threat.get(&guid).copied().unwrap_or(0)
    }

    /// One decision step. In combat the attack cadence gates; evade walks
    /// home; idle and dead do nothing.
    pub fn tick(&mut self, config: &AiConfig, now: u64) -> AiAction {
        match self.state {
            AiStateKind::Combat => match self.target_guid {
                Some(target_guid)
                    if now.saturating_sub(self.last_attack_at) >= config.attack_speed_ms =>
                {
                    self.last_attack_at = now;
                    AiAction::Attack { target_guid }
                }
                _ => AiAction::None,
            },
            AiStateKind::Evade => AiAction::MoveTo { to: self.spawn_position },
            AiStateKind::Idle | AiStateKind::Dead => AiAction::None,
        }
    }

    /// Resolves an attack decision against range: swing if the target is
    /// close enough, otherwise close the gap.
    pub fn combat_action(&self, self_pos: Vec3, target_pos: Vec3, attack_range: f32) -> AiAction {
        match self.target_guid {
            Some(target_guid) if self_pos.distance(target_pos) <= attack_range => {
                AiAction::Attack { target_guid }
            }
            Some(_) => AiAction::Chase { to: target_pos },
            None => AiAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exile(guid: u64, x: f32) -> AggroCandidate {
        AggroCandidate {
            guid,
            position: Vec3::new(x, 0.0, 0.0),
            faction: PlayerFaction::Exile,
        }
    }

    fn dominion(guid: u64, x: f32) -> AggroCandidate {
        AggroCandidate {
            guid,
            position: Vec3::new(x, 0.0, 0.0),
            faction: PlayerFaction::Dominion,
        }
    }

    #[test]
    fn aggro_picks_closest_hostile() {
        let ai = AiState::new(Vec3::ZERO);
        let candidates = [exile(1, 5.0), dominion(2, 6.0)];

        // Hostile-to-everyone creature: the exile at 5.0 is closest.
        let target = ai.check_aggro(Vec3::ZERO, &candidates, 10.0, |_| true);
        assert_eq!(target, Some(1));

        // Exile-aligned creature: only the dominion player registers.
        let target = ai.check_aggro(Vec3::ZERO, &candidates, 10.0, |f| {
            f == PlayerFaction::Dominion
        });
        assert_eq!(target, Some(2));
    }

    #[test]
    fn aggro_tie_resolves_to_lower_guid() {
        let ai = AiState::new(Vec3::ZERO);
        let candidates = [exile(9, 4.0), exile(3, 4.0)];
        assert_eq!(ai.check_aggro(Vec3::ZERO, &candidates, 10.0, |_| true), Some(3));
    }

    #[test]
    fn aggro_respects_range_and_state() {
        let mut ai = AiState::new(Vec3::ZERO);
        let candidates = [exile(1, 11.0)];
        assert_eq!(ai.check_aggro(Vec3::ZERO, &candidates, 10.0, |_| true), None);

        ai.enter_combat(5, 0);
        let candidates = [exile(1, 5.0)];
        assert_eq!(ai.check_aggro(Vec3::ZERO, &candidates, 10.0, |_| true), None);
    }

    #[test]
    fn leash_boundary_is_strict() {
        let mut ai = AiState::new(Vec3::ZERO);
        ai.enter_combat(1, 0);
        assert!(!ai.check_leash(Vec3::new(40.0, 0.0, 0.0), 40.0));
        assert!(ai.check_leash(Vec3::new(40.1, 0.0, 0.0), 40.0));
    }

    #[test]
    fn attack_cadence() {
        let config = AiConfig {
            attack_speed_ms: 2_000,
            ..AiConfig::default()
        };
        let mut ai = AiState::new(Vec3::ZERO);
        ai.enter_combat(7, 1_000);

        assert_eq!(ai.tick(&config, 2_000), AiAction::Attack { target_guid: 7 });
        assert_eq!(ai.tick(&config, 2_100), AiAction::None);
        assert_eq!(ai.tick(&config, 4_000), AiAction::Attack { target_guid: 7 });
    }

    #[test]
    fn evade_walks_home_then_idles() {
        let mut ai = AiState::new(Vec3::new(1.0, 2.0, 3.0));
        ai.enter_combat(7, 0);
        ai.add_threat(7, 50);
        ai.begin_evade();

        assert_eq!(ai.target_guid, None);
        assert_eq!(ai.threat_of(7), 0);
        assert_eq!(
            ai.tick(&AiConfig::default(), 100),
            AiAction::MoveTo { to: Vec3::new(1.0, 2.0, 3.0) }
        );

        ai.finish_evade();
        assert_eq!(ai.state, AiStateKind::Idle);
        assert_eq!(ai.tick(&AiConfig::default(), 200), AiAction::None);
    }

    #[test]
    fn dead_is_terminal_until_respawn() {
        let mut ai = AiState::new(Vec3::ZERO);
        ai.enter_combat(1, 0);
        ai.on_death();
        assert_eq!(ai.state, AiStateKind::Dead);
        assert_eq!(ai.tick(&AiConfig::default(), 10_000), AiAction::None);

        ai.respawn();
        assert_eq!(ai.state, AiStateKind::Idle);
    }

    #[test]
    fn threat_accumulates_and_recent_wins_ties() {
        let mut ai = AiState::new(Vec3::ZERO);
        ai.add_threat(1, 50);
        ai.add_threat(2, 30);
        ai.add_threat(2, 20);
        // Both at 50 now; 2 was updated most recently.
        assert_eq!(ai.highest_threat_target(), Some(2));

        ai.add_threat(1, 1);
        assert_eq!(ai.highest_threat_target(), Some(1));
    }

    #[test]
    fn removing_the_target_switches_or_idles() {
        let mut ai = AiState::new(Vec3::ZERO);
        ai.enter_combat(1, 0);
        ai.add_threat(1, 100);
        ai.add_threat(2, 60);

        ai.remove_threat(1);
        assert_eq!(ai.target_guid, Some(2));
        assert_eq!(ai.state, AiStateKind::Combat);

        ai.remove_threat(2);
        assert_eq!(ai.target_guid, None);
        assert_eq!(ai.state, AiStateKind::Idle);
    }

    #[test]
    fn combat_action_swings_in_range_and_chases_otherwise() {
        let mut ai = AiState::new(Vec3::ZERO);
        ai.enter_combat(4, 0);

        let near = Vec3::new(2.0, 0.0, 0.0);
        let far = Vec3::new(30.0, 0.0, 0.0);
        assert_eq!(
            ai.combat_action(Vec3::ZERO, near, 3.0),
            AiAction::Attack { target_guid: 4 }
        );
        assert_eq!(ai.combat_action(Vec3::ZERO, far, 3.0), AiAction::Chase { to: far });
    }
}
