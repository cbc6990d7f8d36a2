//! Kill experience and level progression.

/// Experience needed to leave `level`.
pub fn xp_to_level(level: u16) -> u32 {
    300 + 100 * u32::from(level)
}

/// Experience granted for a kill, scaled by level difference: full value
/// within one level, tapering 10% per level beyond that, floored at 10%.
pub fn xp_from_kill(player_level: u16, creature_level: u16, xp_reward: u32) -> u32 {
    let diff = i32::from(player_level) - i32::from(creature_level);
    let scale = match diff.abs() {
        0 | 1 => 1.0,
        d => (1.0 - 0.1 * (d - 1) as f32).max(0.1),
    };
    (xp_reward as f32 * scale).round() as u32
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LevelProgress {
    pub leveled_up: bool,
    pub level: u16,
    pub xp: u32,
}

/// Consumes accumulated experience into levels, carrying the remainder.
pub fn check_level_up(level: u16, xp: u32) -> LevelProgress {
    let mut level = level;
    let mut xp = xp;
    let mut leveled_up = false;
    while xp >= xp_to_level(level) {
        xp -= xp_to_level(level);
        level += 1;
        leveled_up = true;
    }
    LevelProgress { leveled_up, level, xp }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_kill_grants_full_reward() {
        assert_eq!(xp_from_kill(1, 1, 100), 100);
        assert_eq!(xp_from_kill(5, 6, 100), 100);
    }

    #[test]
    fn distant_levels_taper() {
        assert_eq!(xp_from_kill(10, 5, 100), 60);
        assert_eq!(xp_from_kill(50, 1, 100), 10);
    }

    #[test]
    fn level_up_progression() {
        // 100 xp at level 1: not enough (needs 400).
        assert_eq!(
            check_level_up(1, 100),
            LevelProgress { leveled_up: false, level: 1, xp: 100 }
        );

        // Exactly 400: level 2 with nothing spare.
        assert_eq!(
            check_level_up(1, 400),
            LevelProgress { leveled_up: true, level: 2, xp: 0 }
        );

        // 1000: 400 to reach 2, 500 to reach 3, 100 left over.
        assert_eq!(
            check_level_up(1, 1_000),
            LevelProgress { leveled_up: true, level: 3, xp: 100 }
        );
    }
}
