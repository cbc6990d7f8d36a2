//! Uniform-cell spatial index.
//!
//! Entities live in cubic cells keyed by floor division of their coordinates,
//! so negative coordinates land in negative cells rather than folding onto
//! cell zero. Range queries visit only the cells whose bounding box
//! intersects the query sphere, then filter by exact distance; they never
//! scan the whole grid.

use glam::Vec3;
use rustc_hash::FxHashMap;

pub const DEFAULT_CELL_SIZE: f32 = 50.0;

type CellKey = (i32, i32, i32);

pub struct SpatialGrid {
    cell_size: f32,
    cells: FxHashMap<CellKey, Vec<u64>>,
    positions: FxHashMap<u64, Vec3>,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

impl SpatialGrid {
    /// # Panics
    ///
    /// Panics if `cell_size` is not strictly positive.
    pub fn new(cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell size must be positive");
        Self {
            cell_size,
            cells: FxHashMap::default(),
            positions: FxHashMap::default(),
        }
    }

    fn cell_key(&self, pos: Vec3) -> CellKey {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    /// Inserts or re-inserts an entity at `pos`.
    pub fn insert(&mut self, guid: u64, pos: Vec3) {
        if self.positions.contains_key(&guid) {
            self.remove(guid);
        }
        self.positions.insert(guid, pos);
        self.cells.entry(self.cell_key(pos)).or_default().push(guid);
    }

    /// Removes an entity. Unknown guids are a no-op.
    pub fn remove(&mut self, guid: u64) {
        let Some(pos) = self.positions.remove(&guid) else {
            return;
        };
        let key = self.cell_key(pos);
        if let Some(bucket) = self.cells.get_mut(&key) {
            bucket.retain(|&g| g != guid);
            if bucket.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    /// Moves an entity, taking the fast path when the cell does not change.
    pub fn update(&mut self, guid: u64, new_pos: Vec3) {
        let Some(pos) = self.positions.get_mut(&guid) else {
            self.insert(guid, new_pos);
            return;
        };
        let old_key = (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        );
        *pos = new_pos;
        let new_key = self.cell_key(new_pos);
        if old_key == new_key {
            return;
        }
        if let Some(bucket) = self.cells.get_mut(&old_key) {
            bucket.retain(|&g| g != guid);
            if bucket.is_empty() {
                self.cells.remove(&old_key);
            }
        }
        self.cells.entry(new_key).or_default().push(guid);
    }

    pub fn position(&self, guid: u64) -> Option<Vec3> {
        self.positions.get(&guid).copied()
    }

    pub fn contains(&self, guid: u64) -> bool {
        self.positions.contains_key(&guid)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// All entities within Euclidean `radius` of `center`, boundary
    /// inclusive. Order is unspecified; guids are unique.
    pub fn query_range(&self, center: Vec3, radius: f32) -> Vec<u64> {
        debug_assert!(radius >= 0.0);
        let min = self.cell_key(center - Vec3::splat(radius));
        let max = self.cell_key(center + Vec3::splat(radius));
        let radius_sq = radius * radius;

        let mut out = vec![];
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                for cz in min.2..=max.2 {
                    let Some(bucket) = self.cells.get(&(cx, cy, cz)) else {
                        continue;
                    };
                    for &guid in bucket {
                        let pos = self.positions[&guid];
                        if pos.distance_squared(center) <= radius_sq {
                            out.push(guid);
                        }
                    }
                }
            }
        }
        out
    }
}
