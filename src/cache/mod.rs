//! Caches that persist across frames.
//!
//! The [`ResourceCache`] owns every object the graph allocates on behalf of its passes: render target textures, framebuffer
//! objects, and the last known usage of imported textures. Entries remember the graph generation that last touched them.
//! Every [`GraphConfig::cleanup_every`](crate::GraphConfig::cleanup_every) generations, entries untouched for that many
//! generations are evicted.
//!
//! Each map sits behind its own mutex, so the cache can be shared between graphs through an `Arc`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;

use crate::backend::Backend;
use crate::Error;

pub mod framebuffer;
pub mod imported;
pub mod render_target;

pub use framebuffer::FramebufferCache;
pub use imported::ImportedResourceTracker;
pub use render_target::RenderTargetCache;

/// A cache entry that records the last generation it was used in.
pub trait Touched {
    fn last_touched(&self) -> u64;
}

/// Drop all entries of `store` that were not touched during the last `every` generations. Returns the number of
/// evicted entries.
pub(crate) fn evict_stale<K: Hash + Eq, V: Touched>(store: &mut HashMap<K, V>, generation: u64, every: u64) -> usize {
    let before = store.len();
    store.retain(|_, entry| generation.saturating_sub(entry.last_touched()) < every);
    before - store.len()
}

/// All objects the render graph keeps alive between frames.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ResourceCache<B: Backend> {
    render_targets: Mutex<RenderTargetCache<B>>,
    framebuffers: Mutex<FramebufferCache<B>>,
    imported: Mutex<ImportedResourceTracker>,
}

impl<B: Backend> Default for ResourceCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ResourceCache<B> {
    pub fn new() -> Self {
        Self {
            render_targets: Mutex::new(RenderTargetCache::default()),
            framebuffers: Mutex::new(FramebufferCache::default()),
            imported: Mutex::new(ImportedResourceTracker::default()),
        }
    }

    /// Lock the render target cache.
    /// # Errors
    /// - Fails if the mutex was poisoned.
    pub fn render_targets(&self) -> Result<MutexGuard<'_, RenderTargetCache<B>>> {
        self.render_targets
            .lock()
            .map_err(|_| anyhow::Error::from(Error::PoisonError))
    }

    /// Lock the framebuffer cache.
    /// # Errors
    /// - Fails if the mutex was poisoned.
    pub fn framebuffers(&self) -> Result<MutexGuard<'_, FramebufferCache<B>>> {
        self.framebuffers
            .lock()
            .map_err(|_| anyhow::Error::from(Error::PoisonError))
    }

    /// Lock the imported texture tracker.
    /// # Errors
    /// - Fails if the mutex was poisoned.
    pub fn imported(&self) -> Result<MutexGuard<'_, ImportedResourceTracker>> {
        self.imported.lock().map_err(|_| anyhow::Error::from(Error::PoisonError))
    }

    /// Evict everything not touched during the last `every` generations and shrink render target pools to their recent
    /// peak usage.
    pub fn periodic_cleanup(&self, generation: u64, every: u64) -> Result<()> {
        let textures = self.render_targets()?.periodic_cleanup(generation, every);
        let framebuffers = self.framebuffers()?.periodic_cleanup(generation, every);
        let imported = self.imported()?.periodic_cleanup(generation, every);
        debug!(
            "Periodic cleanup at generation {generation}: released {textures} textures, {framebuffers} framebuffers, \
             {imported} imported texture records"
        );
        Ok(())
    }
}
