//! Collection aliases and reusable scratch buffers for the meshing hot paths.
//!
//! Keys are internal integer handles, never attacker controlled, so the fast
//! non-cryptographic `FxHasher` is used throughout.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::handles::{TetId, VertexId};

/// `HashMap` with `rustc_hash::FxHasher`.
///
/// Not DoS-resistant: only use with trusted, internal keys.
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// `HashSet` with `rustc_hash::FxHasher`.
pub type FastHashSet<T> = FxHashSet<T>;

/// Re-export of the map entry API so callers don't need a separate `std` import.
pub use std::collections::hash_map::Entry;

/// Small-optimized `Vec`: inline for up to `N` elements, heap beyond.
///
/// # Size Guidelines
///
/// - **N=4**: faces of a tetrahedron, corners of a quad
/// - **N=8**: typical one-ring sizes on a surface
/// - **N=16**: cavity-sized working sets
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Inline capacity for per-insertion buffers. Most cavities touch fewer than 16 tets.
pub const CAVITY_BUFFER_SIZE: usize = 16;

/// Vertex list sized for a surface one-ring.
pub type RingBuffer = SmallBuffer<VertexId, 8>;

/// Tetrahedra touched by one operation.
pub type TetBuffer = SmallBuffer<TetId, CAVITY_BUFFER_SIZE>;

/// Create a [`FastHashMap`] with the given capacity.
#[must_use]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    FastHashMap::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

/// Create a [`FastHashSet`] with the given capacity.
#[must_use]
pub fn fast_hash_set_with_capacity<T>(capacity: usize) -> FastHashSet<T> {
    FastHashSet::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

/// Epoch-stamped visited marks over a dense index space.
///
/// [`VisitStamps::next_epoch`] clears every mark in O(1); the backing vector grows on
/// demand and is reused across operations.
#[derive(Debug, Clone, Default)]
pub struct VisitStamps {
    stamps: Vec<u32>,
    epoch: u32,
}

impl VisitStamps {
    /// Empty stamp set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new traversal; all indices become unvisited.
    pub fn next_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.stamps.fill(0);
            self.epoch = 1;
        }
    }

    /// Mark `index`; returns `true` if it was not yet marked in this epoch.
    pub fn mark(&mut self, index: usize) -> bool {
        if index >= self.stamps.len() {
            self.stamps.resize(index + 1, 0);
        }
        if self.stamps[index] == self.epoch {
            false
        } else {
            self.stamps[index] = self.epoch;
            true
        }
    }

    /// `true` if `index` is marked in the current epoch.
    #[must_use]
    pub fn is_marked(&self, index: usize) -> bool {
        self.stamps.get(index).is_some_and(|&s| s == self.epoch)
    }
}
