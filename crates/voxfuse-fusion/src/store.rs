//! Spatially hashed chunk store.
//!
//! Chunks live in a dense arena addressed by [`ChunkHandle`]; a hash map
//! resolves [`ChunkId`]s to handles. Chunks are only ever appended, so a
//! handle stays valid until [`ChunkStore::clear`]. Structural changes need
//! `&mut ChunkStore`; parallel passes borrow disjoint chunks through
//! [`ChunkStore::chunks_mut`] and add new chunks afterwards with
//! [`ChunkStore::insert`].
//!
//! ```rust
//! use voxfuse_fusion::chunk::{ChunkGeometry, ChunkId};
//! use voxfuse_fusion::store::ChunkStore;
//!
//! let mut store = ChunkStore::new(ChunkGeometry::new([8, 8, 8], 0.1));
//! assert!(store.get(ChunkId::new(1, 0, 0)).is_none());
//! store.get_or_create(ChunkId::new(1, 0, 0));
//! assert_eq!(store.len(), 1);
//! ```

use std::collections::{BTreeSet, HashMap};

use voxfuse_types::{Aabb, Vec3};

use crate::chunk::{Chunk, ChunkGeometry, ChunkId};
use crate::voxel::Voxel;

/// Stable arena index of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkHandle(usize);

impl ChunkHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Offsets of the seven neighbours whose boundary cells read a chunk's
/// voxels: every non-zero combination of `-1`/`0` per axis.
const LOWER_NEIGHBOURS: [(i32, i32, i32); 7] = [
    (-1, 0, 0),
    (0, -1, 0),
    (0, 0, -1),
    (-1, -1, 0),
    (-1, 0, -1),
    (0, -1, -1),
    (-1, -1, -1),
];

#[derive(Debug)]
pub struct ChunkStore {
    geometry: ChunkGeometry,
    chunks: Vec<Chunk>,
    index: HashMap<ChunkId, ChunkHandle>,
    latest: BTreeSet<ChunkId>,
}

impl ChunkStore {
    pub fn new(geometry: ChunkGeometry) -> Self {
        Self {
            geometry,
            chunks: Vec::new(),
            index: HashMap::new(),
            latest: BTreeSet::new(),
        }
    }

    pub fn geometry(&self) -> &ChunkGeometry {
        &self.geometry
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    // ── Lookup ──────────────────────────────────────────────────────────────

    pub fn handle(&self, id: ChunkId) -> Option<ChunkHandle> {
        self.index.get(&id).copied()
    }

    /// # Panics
    ///
    /// Panics when `handle` did not come from this store (or predates a
    /// [`clear`][Self::clear]).
    pub fn chunk(&self, handle: ChunkHandle) -> &Chunk {
        &self.chunks[handle.0]
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.handle(id).map(|h| &self.chunks[h.0])
    }

    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.handle(id).map(|h| &mut self.chunks[h.0])
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.index.contains_key(&id)
    }

    /// Chunk `id`, created unobserved on a miss.
    pub fn get_or_create(&mut self, id: ChunkId) -> &mut Chunk {
        let handle = match self.handle(id) {
            Some(h) => h,
            None => self.push(Chunk::new(id, self.geometry)),
        };
        &mut self.chunks[handle.0]
    }

    /// Add a chunk built outside the store. An existing chunk with the same
    /// id is replaced in place.
    pub fn insert(&mut self, chunk: Chunk) -> ChunkHandle {
        match self.handle(chunk.id()) {
            Some(h) => {
                self.chunks[h.0] = chunk;
                h
            }
            None => self.push(chunk),
        }
    }

    fn push(&mut self, chunk: Chunk) -> ChunkHandle {
        let handle = ChunkHandle(self.chunks.len());
        self.index.insert(chunk.id(), handle);
        self.chunks.push(chunk);
        handle
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Arena slice for handle-indexed parallel passes.
    pub fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    /// Sorted snapshot of every allocated id.
    pub fn ids(&self) -> BTreeSet<ChunkId> {
        self.index.keys().copied().collect()
    }

    pub fn dirty_ids(&self) -> BTreeSet<ChunkId> {
        self.chunks
            .iter()
            .filter(|c| c.is_dirty())
            .map(Chunk::id)
            .collect()
    }

    // ── Latest set & dirty propagation ──────────────────────────────────────

    /// Ids touched by the most recent integration pass.
    pub fn latest_ids(&self) -> &BTreeSet<ChunkId> {
        &self.latest
    }

    pub fn set_latest(&mut self, ids: impl IntoIterator<Item = ChunkId>) {
        self.latest = ids.into_iter().collect();
    }

    /// Flag `id` dirty. Returns `false` when the chunk does not exist.
    pub fn mark_dirty(&mut self, id: ChunkId) -> bool {
        match self.get_mut(id) {
            Some(c) => {
                c.mark_dirty();
                true
            }
            None => false,
        }
    }

    /// Flag `id` and its existing lower neighbours dirty, since their
    /// boundary cells sample this chunk's first voxel layer.
    pub fn mark_dirty_with_neighbours(&mut self, id: ChunkId) {
        self.mark_dirty(id);
        for (dx, dy, dz) in LOWER_NEIGHBOURS {
            self.mark_dirty(id.offset(dx, dy, dz));
        }
    }

    // ── Spatial queries ─────────────────────────────────────────────────────

    pub fn bounds(&self, id: ChunkId) -> Aabb {
        self.geometry.bounds(id)
    }

    pub fn chunk_id_at(&self, p: Vec3) -> Option<ChunkId> {
        self.geometry.chunk_id_at(p)
    }

    /// Voxel containing `p`, if its chunk is allocated.
    pub fn voxel_at(&self, p: Vec3) -> Option<&Voxel> {
        let (id, [i, j, k]) = self.geometry.locate(p)?;
        self.get(id).map(|c| c.voxel(i, j, k))
    }

    /// Number of voxels with `weight > 0` across all chunks.
    pub fn observed_voxels(&self) -> usize {
        self.chunks.iter().map(Chunk::observed_count).sum()
    }

    /// Drop every chunk and the latest set.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.index.clear();
        self.latest.clear();
    }
}
