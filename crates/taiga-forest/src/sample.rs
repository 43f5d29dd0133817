//! Shared bootstrap-sample index generation.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::ids::TreeId;

/// One bootstrap draw: tree-local slot `local` holds original record `original`.
///
/// Both sides are one-based positions into a task's record list, ordered by
/// record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SampleIndex {
    /// Tree the draw belongs to.
    pub tree: TreeId,
    /// One-based tree-local sample slot.
    pub local: u64,
    /// One-based original record position drawn with replacement.
    pub original: u64,
}

/// Uniform-with-replacement bootstrap draws shared across training tasks.
///
/// The draw is generated once at the largest sample count across tasks;
/// each task truncates it to its own range (`original <= task_samples`)
/// instead of drawing independently, so the index is computed once without
/// biasing any task. The full draw is persisted in the model's sample slot.
#[derive(Debug, Clone)]
pub struct BootstrapSampler {
    rows: Vec<SampleIndex>,
    max_samples: u64,
}

impl BootstrapSampler {
    /// Generate one independent draw of `max_samples` slots per tree.
    ///
    /// Trees are numbered from 1. Each tree draws from its own ChaCha8
    /// stream seeded off the master seed, so the draw is reproducible and
    /// independent of tree evaluation order.
    #[instrument]
    #[must_use]
    pub fn draw(num_trees: usize, max_samples: usize, seed: u64) -> Self {
        let mut master = ChaCha8Rng::seed_from_u64(seed);
        let tree_seeds: Vec<u64> = (0..num_trees).map(|_| master.r#gen()).collect();

        let mut rows = Vec::with_capacity(num_trees * max_samples);
        for (tree_index, tree_seed) in tree_seeds.into_iter().enumerate() {
            let tree = TreeId::new(tree_index as u32 + 1);
            let mut rng = ChaCha8Rng::seed_from_u64(tree_seed);
            for local in 1..=max_samples as u64 {
                let original = rng.gen_range(1..=max_samples as u64);
                rows.push(SampleIndex {
                    tree,
                    local,
                    original,
                });
            }
        }

        debug!(rows = rows.len(), "bootstrap draw generated");
        Self {
            rows,
            max_samples: max_samples as u64,
        }
    }

    /// Rebuild a sampler from persisted rows (a decoded model sample slot).
    #[must_use]
    pub fn from_rows(rows: Vec<SampleIndex>) -> Self {
        let max_samples = rows.iter().map(|r| r.original).max().unwrap_or(0);
        Self { rows, max_samples }
    }

    /// Return every draw across all trees.
    #[must_use]
    pub fn rows(&self) -> &[SampleIndex] {
        &self.rows
    }

    /// Return the shared sample count the draw was generated at.
    #[must_use]
    pub fn max_samples(&self) -> u64 {
        self.max_samples
    }

    /// Return one tree's draw truncated to a task's sample count.
    ///
    /// Keeps the draws with `original <= task_samples`, returned as zero-based
    /// record positions. The task with the largest sample count keeps the
    /// entire draw.
    #[must_use]
    pub fn truncated_rows(&self, tree: TreeId, task_samples: usize) -> Vec<usize> {
        self.rows
            .iter()
            .filter(|r| r.tree == tree && r.original <= task_samples as u64)
            .map(|r| (r.original - 1) as usize)
            .collect()
    }
}
