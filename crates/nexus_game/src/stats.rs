//! Stat identifiers and armor mitigation.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    AssaultPower,
    SupportPower,
    Armor,
    CritChance,
    MoveSpeed,
}

/// Physical mitigation never exceeds this fraction, whatever the armor pile.
pub const MAX_ARMOR_FRACTION: f32 = 0.75;

/// Armor points past the pivot give diminishing returns.
const ARMOR_PIVOT: f32 = 750.0;

/// Converts armor points into the damage fraction removed, clamped to
/// `[0, MAX_ARMOR_FRACTION]`.
pub fn armor_fraction(armor: f32) -> f32 {
    if armor <= 0.0 {
        return 0.0;
    }
    (armor / (armor + ARMOR_PIVOT)).clamp(0.0, MAX_ARMOR_FRACTION)
}

/// Applies armor to a physical hit.
pub fn mitigate_physical(damage: f32, armor: f32) -> f32 {
    damage * (1.0 - armor_fraction(armor))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn zero_and_negative_armor_do_nothing() {
        assert_eq!(armor_fraction(0.0), 0.0);
        assert_eq!(armor_fraction(-50.0), 0.0);
        assert_relative_eq!(mitigate_physical(200.0, 0.0), 200.0);
    }

    #[test]
    fn mitigation_is_clamped() {
        assert_eq!(armor_fraction(1.0e9), MAX_ARMOR_FRACTION);
        assert_relative_eq!(mitigate_physical(100.0, 1.0e9), 25.0);
    }

    #[test]
    fn pivot_armor_halves_damage() {
        assert_relative_eq!(armor_fraction(ARMOR_PIVOT), 0.5);
        assert_relative_eq!(mitigate_physical(100.0, ARMOR_PIVOT), 50.0);
    }
}
