//! Corpse loot: every eligible looter receives the rolled loot exactly once.

use rustc_hash::FxHashSet;

/// Loot state attached to a corpse entity.
#[derive(Clone, Debug)]
pub struct CorpseLoot {
    /// The rolled loot, identical for every looter.
    items: Vec<(u32, u32)>,
    pub source_guid: u64,
    looted_by: FxHashSet<u64>,
    pub despawn_at: u64,
}

impl CorpseLoot {
    pub fn new(items: Vec<(u32, u32)>, source_guid: u64, despawn_at: u64) -> Self {
        Self {
            items,
            source_guid,
            looted_by: FxHashSet::default(),
            despawn_at,
        }
    }

    /// First call per looter yields the loot; repeat calls yield nothing.
    pub fn take_loot(&mut self, looter_guid: u64) -> Vec<(u32, u32)> {
        if self.looted_by.insert(looter_guid) {
            self.items.clone()
        } else {
            vec![]
        }
    }

    pub fn has_looted(&self, looter_guid: u64) -> bool {
        self.looted_by.contains(&looter_guid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_looter_loots_once() {
        let mut loot = CorpseLoot::new(vec![(100, 2), (200, 1)], 7, 60_000);

        assert_eq!(loot.take_loot(1), vec![(100, 2), (200, 1)]);
        assert_eq!(loot.take_loot(1), vec![]);
        assert!(loot.has_looted(1));

        // A different looter still gets the full roll.
        assert_eq!(loot.take_loot(2), vec![(100, 2), (200, 1)]);
        assert_eq!(loot.take_loot(2), vec![]);
    }

    #[test]
    fn empty_loot_is_still_tracked() {
        let mut loot = CorpseLoot::new(vec![], 7, 60_000);
        assert_eq!(loot.take_loot(1), vec![]);
        assert!(loot.has_looted(1));
    }
}
