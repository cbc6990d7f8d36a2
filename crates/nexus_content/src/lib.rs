//! Static game data: creature, spell, item, zone, faction, and loot tables.
//!
//! Tables load from JSON once at startup and are shared immutably behind an
//! `Arc` afterwards; lookups are O(1) and safe for concurrent readers. There
//! is no hot reload.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::{info, warn};

use nexus_game::faction::Disposition;
use nexus_game::{FactionTable, Spell, Stat};

fn default_aggro_range() -> f32 {
    10.0
}

fn default_leash_range() -> f32 {
    40.0
}

fn default_attack_range() -> f32 {
    3.0
}

fn default_attack_speed_ms() -> u64 {
    2_000
}

fn default_cell_size() -> f32 {
    50.0
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreatureTemplate {
    pub id: u32,
    pub name: String,
    pub display_info: u32,
    pub level: u16,
    pub max_health: u32,
    #[serde(default)]
    pub stats: HashMap<Stat, f32>,
    pub faction_id: u32,
    #[serde(default = "default_aggro_range")]
    pub aggro_range: f32,
    #[serde(default = "default_leash_range")]
    pub leash_range: f32,
    #[serde(default = "default_attack_range")]
    pub attack_range: f32,
    #[serde(default = "default_attack_speed_ms")]
    pub attack_speed_ms: u64,
    #[serde(default)]
    pub attack_damage: u32,
    #[serde(default)]
    pub xp_reward: u32,
    #[serde(default)]
    pub loot_table: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ItemTemplate {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub max_stack: u32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct SpawnPoint {
    pub creature_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub rotation: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ZoneTemplate {
    pub id: u32,
    pub name: String,
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,
    #[serde(default)]
    pub spawns: Vec<SpawnPoint>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LootEntry {
    pub item_id: u32,
    #[serde(default)]
    pub min_quantity: u32,
    pub max_quantity: u32,
    /// Drop probability in `[0, 1]`.
    pub chance: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LootTable {
    pub id: u32,
    pub entries: Vec<LootEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct FactionDef {
    id: u32,
    disposition: Disposition,
}

/// Read-only lookup surface the world runtime programs against.
pub trait ContentStore: Send + Sync + 'static {
    fn creature_template(&self, id: u32) -> Option<&CreatureTemplate>;
    fn spell(&self, id: u32) -> Option<&Spell>;
    fn item(&self, id: u32) -> Option<&ItemTemplate>;
    fn zone(&self, id: u32) -> Option<&ZoneTemplate>;
    fn factions(&self) -> &FactionTable;
    fn loot_roll(&self, table_id: u32) -> Vec<(u32, u32)>;
}

/// JSON-backed [`ContentStore`].
#[derive(Default, Debug)]
pub struct JsonStore {
    creatures: FxHashMap<u32, CreatureTemplate>,
    spells: FxHashMap<u32, Spell>,
    items: FxHashMap<u32, ItemTemplate>,
    zones: FxHashMap<u32, ZoneTemplate>,
    loot_tables: FxHashMap<u32, LootTable>,
    factions: FactionTable,
}

impl JsonStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every table from `dir`. A missing file logs a warning and
    /// leaves that table empty; a file that fails to parse is fatal.
    pub fn load(dir: &Path) -> anyhow::Result<Arc<Self>> {
        let mut store = Self::empty();

        for c in load_table::<CreatureTemplate>(dir, "creatures.json")? {
            store.creatures.insert(c.id, c);
        }
        for s in load_table::<Spell>(dir, "spells.json")? {
            store.spells.insert(s.id, s);
        }
        for i in load_table::<ItemTemplate>(dir, "items.json")? {
            store.items.insert(i.id, i);
        }
        for z in load_table::<ZoneTemplate>(dir, "zones.json")? {
            store.zones.insert(z.id, z);
        }
        for t in load_table::<LootTable>(dir, "loot_tables.json")? {
            store.loot_tables.insert(t.id, t);
        }
        for f in load_table::<FactionDef>(dir, "factions.json")? {
            store.factions.insert(f.id, f.disposition);
        }

        info!(
            creatures = store.creatures.len(),
            spells = store.spells.len(),
            items = store.items.len(),
            zones = store.zones.len(),
            loot_tables = store.loot_tables.len(),
            "content loaded"
        );

        Ok(Arc::new(store))
    }

    pub fn insert_creature(&mut self, template: CreatureTemplate) {
        self.creatures.insert(template.id, template);
    }

    pub fn insert_spell(&mut self, spell: Spell) {
        self.spells.insert(spell.id, spell);
    }

    pub fn insert_item(&mut self, item: ItemTemplate) {
        self.items.insert(item.id, item);
    }

    pub fn insert_zone(&mut self, zone: ZoneTemplate) {
        self.zones.insert(zone.id, zone);
    }

    pub fn insert_loot_table(&mut self, table: LootTable) {
        self.loot_tables.insert(table.id, table);
    }

    pub fn factions_mut(&mut self) -> &mut FactionTable {
        &mut self.factions
    }

    fn roll_with(&self, table_id: u32, rng: &mut impl Rng) -> Vec<(u32, u32)> {
        let Some(table) = self.loot_tables.get(&table_id) else {
            return vec![];
        };
        table
            .entries
            .iter()
            .filter_map(|e| {
                if rng.gen::<f32>() < e.chance {
                    let min = e.min_quantity.max(1).min(e.max_quantity);
                    Some((e.item_id, rng.gen_range(min..=e.max_quantity)))
                } else {
                    None
                }
            })
            .collect()
    }
}

impl ContentStore for JsonStore {
    fn creature_template(&self, id: u32) -> Option<&CreatureTemplate> {
        self.creatures.get(&id)
    }

    fn spell(&self, id: u32) -> Option<&Spell> {
        self.spells.get(&id)
    }

    fn item(&self, id: u32) -> Option<&ItemTemplate> {
        self.items.get(&id)
    }

    fn zone(&self, id: u32) -> Option<&ZoneTemplate> {
        self.zones.get(&id)
    }

    fn factions(&self) -> &FactionTable {
        &self.factions
    }

    fn loot_roll(&self, table_id: u32) -> Vec<(u32, u32)> {
        self.roll_with(table_id, &mut rand::thread_rng())
    }
}

fn load_table<T: serde::de::DeserializeOwned>(dir: &Path, file: &str) -> anyhow::Result<Vec<T>> {
    let path = dir.join(file);
    if !path.exists() {
        warn!(path = %path.display(), "content file missing, table left empty");
        return Ok(vec![]);
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn loads_tables_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "creatures.json",
            r#"[{
                "id": 1001,
                "name": "Razortail Skug",
                "display_info": 20885,
                "level": 3,
                "max_health": 450,
                "faction_id": 3,
                "xp_reward": 90,
                "stats": {"armor": 120.0}
            }]"#,
        );
        write_file(
            dir.path(),
            "factions.json",
            r#"[{"id": 3, "disposition": "hostile"}]"#,
        );

        let store = JsonStore::load(dir.path()).unwrap();

        let skug = store.creature_template(1001).unwrap();
        assert_eq!(skug.level, 3);
        assert_eq!(skug.aggro_range, 10.0);
        assert_eq!(skug.stats.get(&Stat::Armor), Some(&120.0));
        assert!(store.spell(1).is_none());
        assert_eq!(store.factions().disposition(3), Disposition::Hostile);
        assert_eq!(store.factions().disposition(4), Disposition::Neutral);
    }

    #[test]
    fn malformed_content_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "items.json", "{not json");
        assert!(JsonStore::load(dir.path()).is_err());
    }

    #[test]
    fn loot_roll_respects_chance_and_quantity() {
        let mut store = JsonStore::empty();
        store.insert_loot_table(LootTable {
            id: 5,
            entries: vec![
                LootEntry { item_id: 100, min_quantity: 1, max_quantity: 1, chance: 1.0 },
                LootEntry { item_id: 200, min_quantity: 2, max_quantity: 4, chance: 0.0 },
            ],
        });

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let drops = store.roll_with(5, &mut rng);
            assert_eq!(drops.len(), 1);
            assert_eq!(drops[0], (100, 1));
        }
        assert!(store.roll_with(999, &mut rng).is_empty());
    }
}
