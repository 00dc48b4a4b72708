//! User learning overlay.
//!
//! Records which word the user picked for a key and turns the pick count
//! into a score boost during lattice search. The overlay never touches the
//! dictionary index; it is an immutable snapshot replaced on every `learn`,
//! so decodes read it without holding a lock.
//!
//! Counts are keyed by syllable ids, so a saved file is only meaningful to
//! a decoder using the same syllable table.
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::token::SyllableId;

// Process-wide, so versions never repeat even across `UserDict` instances.
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Immutable view of learned picks: key -> word -> count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSnapshot {
    counts: HashMap<Vec<SyllableId>, HashMap<String, u32>>,
    /// Identifies this snapshot; 0 only for the initial empty one.
    #[serde(skip)]
    version: u64,
}

impl UserSnapshot {
    fn publish(mut self) -> Arc<Self> {
        self.version = NEXT_VERSION.fetch_add(1, Ordering::Relaxed);
        Arc::new(self)
    }

    /// Changes whenever a `UserDict` swaps in a new snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, ids: &[SyllableId], word: &str) -> u32 {
        self.counts
            .get(ids)
            .and_then(|words| words.get(word))
            .copied()
            .unwrap_or(0)
    }

    /// Score boost for an edge: `count * per_pick`.
    pub fn boost(&self, ids: &[SyllableId], word: &str, per_pick: i64) -> i64 {
        i64::from(self.count(ids, word)).saturating_mul(per_pick)
    }

    /// Number of learned `(key, word)` pairs.
    pub fn len(&self) -> usize {
        self.counts.values().map(HashMap::len).sum()
    }
}

/// Thread-safe user dictionary with copy-on-write snapshots.
#[derive(Debug, Default)]
pub struct UserDict {
    inner: RwLock<Arc<UserSnapshot>>,
}

impl UserDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn one pick of `word` for `ids`.
    pub fn learn(&self, ids: &[SyllableId], word: &str) {
        self.learn_with_count(ids, word, 1);
    }

    /// Learn a pick with a custom increment (imports, batch updates).
    pub fn learn_with_count(&self, ids: &[SyllableId], word: &str, delta: u32) {
        if ids.is_empty() || word.is_empty() || delta == 0 {
            return;
        }
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut next = UserSnapshot::clone(&slot);
        let count = next
            .counts
            .entry(ids.to_vec())
            .or_default()
            .entry(word.to_string())
            .or_insert(0);
        *count = count.saturating_add(delta);
        debug!(word, count = *count, "learned user pick");
        *slot = next.publish();
    }

    pub fn count(&self, ids: &[SyllableId], word: &str) -> u32 {
        self.snapshot().count(ids, word)
    }

    /// Current snapshot; cheap to clone and safe to hold across a decode.
    pub fn snapshot(&self) -> Arc<UserSnapshot> {
        let slot = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&slot)
    }

    /// Merge another dictionary into this one (summing counts).
    pub fn merge_from(&self, other: &UserDict) {
        let src = other.snapshot();
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut next = UserSnapshot::clone(&slot);
        for (ids, words) in &src.counts {
            let dst = next.counts.entry(ids.clone()).or_default();
            for (word, n) in words {
                let count = dst.entry(word.clone()).or_insert(0);
                *count = count.saturating_add(*n);
            }
        }
        *slot = next.publish();
    }

    pub fn clear(&self) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = UserSnapshot::default().publish();
    }

    /// Persist the current snapshot with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = bincode::serialize(&*self.snapshot()).context("serialize user dictionary")?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write user dictionary {}", path.display()))?;
        Ok(())
    }

    /// Load a dictionary written by [`UserDict::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read user dictionary {}", path.display()))?;
        let snapshot: UserSnapshot = bincode::deserialize(&bytes)
            .with_context(|| format!("corrupt user dictionary {}", path.display()))?;
        Ok(Self {
            inner: RwLock::new(snapshot.publish()),
        })
    }
}
