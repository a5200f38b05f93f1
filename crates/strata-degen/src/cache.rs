//! Process-wide cache of degeneration graphs, one entry per (genus, n).
//!
//! [`DegenerationCache`] is the handle every query goes through. Each entry
//! publishes its latest snapshot behind a read-write lock that is only
//! written for the instant of a swap; a separate per-key build mutex
//! serializes extensions. Builds are copy-on-write: the snapshot is cloned,
//! extended, optionally verified, and only then published, so readers
//! holding an `Arc` never observe a half-built layer and never wait for a
//! build in progress.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use dashmap::DashMap;
use tracing::{debug, info};

use strata_core::FrozenGraph;

use crate::config::{CacheConfig, EvictionPolicy};
use crate::degeneration_graph::DegenerationGraph;
use crate::error::DegenError;

#[derive(Debug, Default)]
struct CacheSlot {
    current: RwLock<Option<Arc<DegenerationGraph>>>,
    /// Smaller snapshots kept under [`EvictionPolicy::Retain`].
    retained: Mutex<Vec<Arc<DegenerationGraph>>>,
    /// Held for the whole extension of this key.
    building: Mutex<()>,
}

impl CacheSlot {
    fn current(&self) -> Option<Arc<DegenerationGraph>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn built_to_at_least(&self, r_max: usize) -> Option<Arc<DegenerationGraph>> {
        self.current().filter(|dg| dg.built_to() >= r_max)
    }
}

/// Registry of degeneration graphs keyed by (genus, n).
#[derive(Debug, Default)]
pub struct DegenerationCache {
    config: CacheConfig,
    entries: DashMap<(u32, u32), Arc<CacheSlot>>,
}

impl DegenerationCache {
    pub fn new(config: CacheConfig) -> Self {
        DegenerationCache {
            config,
            entries: DashMap::new(),
        }
    }

    /// A cache configured from `STRATA_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(CacheConfig::from_env())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the degeneration graph of (genus, n) built to at least
    /// `r_max` edges, building the missing layers if needed.
    pub fn build(&self, genus: u32, n: u32, r_max: usize) -> Result<Arc<DegenerationGraph>, DegenError> {
        let slot = self.slot(genus, n);
        if let Some(ready) = slot.built_to_at_least(r_max) {
            return Ok(ready);
        }

        let _building = slot.building.lock().unwrap_or_else(PoisonError::into_inner);
        // Another builder may have published while we waited.
        let previous = slot.current();
        if let Some(ready) = previous.as_ref().filter(|dg| dg.built_to() >= r_max) {
            return Ok(Arc::clone(ready));
        }

        let mut next = match &previous {
            Some(current) => DegenerationGraph::clone(current),
            None => DegenerationGraph::new(genus, n)?,
        };
        let from = next.built_to();
        next.extend_to(r_max)?;
        if self.config.verify_layers {
            next.check_consistency()?;
        }
        info!(genus, n, from, to = r_max, sizes = ?next.layer_sizes(), "extended degeneration graph");

        let next = Arc::new(next);
        let old = slot
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&next));
        if let Some(old) = old {
            match self.config.eviction {
                EvictionPolicy::Superseded => {
                    debug!(genus, n, built_to = old.built_to(), "evicted superseded degeneration graph");
                }
                EvictionPolicy::Retain => {
                    slot.retained.lock().unwrap_or_else(PoisonError::into_inner).push(old);
                }
            }
        }
        Ok(next)
    }

    /// The latest snapshot of (genus, n), if anything was built.
    pub fn get(&self, genus: u32, n: u32) -> Option<Arc<DegenerationGraph>> {
        let slot = self.entries.get(&(genus, n)).map(|entry| Arc::clone(entry.value()))?;
        slot.current()
    }

    /// The representatives with `r` edges of (genus, n).
    pub fn list_strata(&self, genus: u32, n: u32, r: usize) -> Result<Vec<FrozenGraph>, DegenError> {
        let dg = self.build(genus, n, r)?;
        Ok(dg
            .strata(r)
            .map(|graphs| graphs.into_iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Drops the retained smaller snapshots of (genus, n) and returns how
    /// many there were.
    pub fn evict_superseded(&self, genus: u32, n: u32) -> usize {
        let Some(slot) = self.entries.get(&(genus, n)).map(|entry| Arc::clone(entry.value())) else {
            return 0;
        };
        let mut retained = slot.retained.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = retained.len();
        retained.clear();
        if dropped > 0 {
            info!(genus, n, dropped, "evicted retained degeneration graphs");
        }
        dropped
    }

    /// Number of smaller snapshots still held for (genus, n).
    pub fn retained_snapshots(&self, genus: u32, n: u32) -> usize {
        let Some(slot) = self.entries.get(&(genus, n)).map(|entry| Arc::clone(entry.value())) else {
            return 0;
        };
        let retained = slot.retained.lock().unwrap_or_else(PoisonError::into_inner);
        retained.len()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    // The map guard is released before the slot is locked, so a long build
    // of one key never blocks other keys sharing the shard.
    fn slot(&self, genus: u32, n: u32) -> Arc<CacheSlot> {
        Arc::clone(self.entries.entry((genus, n)).or_default().value())
    }
}
