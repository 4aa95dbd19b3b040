//! Per-pass integration counters.

use serde::{Deserialize, Serialize};

/// What one integration call did to the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntegrationReport {
    /// Chunks considered (inside the frustum, or holding a point).
    pub candidate_chunks: usize,
    /// Chunks with at least one voxel write; the new latest set.
    pub chunks_touched: usize,
    /// Touched chunks that did not exist before the pass.
    pub chunks_created: usize,
    pub voxels_updated: usize,
    pub voxels_carved: usize,
    /// Meshes refreshed at the end of the pass, when enabled.
    pub meshes_updated: usize,
}

/// Writes applied to one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ChunkStats {
    pub updated: usize,
    pub carved: usize,
}

impl ChunkStats {
    pub fn writes(&self) -> usize {
        self.updated + self.carved
    }
}

impl IntegrationReport {
    pub(crate) fn record(&mut self, stats: ChunkStats) {
        self.chunks_touched += 1;
        self.voxels_updated += stats.updated;
        self.voxels_carved += stats.carved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates() {
        let mut r = IntegrationReport::default();
        r.record(ChunkStats {
            updated: 3,
            carved: 1,
        });
        r.record(ChunkStats {
            updated: 2,
            carved: 0,
        });
        assert_eq!(r.chunks_touched, 2);
        assert_eq!(r.voxels_updated, 5);
        assert_eq!(r.voxels_carved, 1);
    }

    #[test]
    fn serialises_with_field_names() {
        let r = IntegrationReport {
            chunks_touched: 4,
            voxels_updated: 120,
            ..IntegrationReport::default()
        };
        let v = serde_json::to_value(r).unwrap();
        assert_eq!(v["chunks_touched"], 4);
        assert_eq!(v["voxels_updated"], 120);
        assert_eq!(v["meshes_updated"], 0);
    }
}
