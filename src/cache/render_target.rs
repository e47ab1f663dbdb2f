//! Pools of render target textures, keyed by description and derived usage.

use std::collections::HashMap;

use anyhow::Result;

use crate::backend::{Backend, BackendTexture};
use crate::cache::{evict_stale, Touched};

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
struct RenderTargetPool<B: Backend> {
    /// Textures no live graph holds.
    available: Vec<B::Texture>,
    /// Textures checked out by graphs and not released yet.
    in_use: usize,
    /// Highest `in_use` since the last cleanup.
    peak_in_use: usize,
    last_touched: u64,
}

impl<B: Backend> RenderTargetPool<B> {
    fn size(&self) -> usize {
        self.available.len() + self.in_use
    }
}

impl<B: Backend> Touched for RenderTargetPool<B> {
    fn last_touched(&self) -> u64 {
        self.last_touched
    }
}

/// Reuses render target textures between frames. A texture stays checked out until the graph that got it releases it,
/// so two requests with the same key get two different textures until one of them is released. Graphs sharing the cache
/// never alias each other's textures.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Default(bound = ""))]
pub struct RenderTargetCache<B: Backend> {
    pools: HashMap<u64, RenderTargetPool<B>>,
}

impl<B: Backend> RenderTargetCache<B> {
    /// Get an unused texture for `key`, calling `create` if the pool is exhausted.
    pub fn get_or_create<F>(&mut self, key: u64, generation: u64, create: F) -> Result<B::Texture>
    where
        F: FnOnce() -> Result<B::Texture>, {
        let pool = self.pools.entry(key).or_insert_with(|| RenderTargetPool {
            available: vec![],
            in_use: 0,
            peak_in_use: 0,
            last_touched: generation,
        });
        pool.last_touched = generation;

        let texture = match pool.available.pop() {
            Some(texture) => {
                trace!("Render target cache hit for `{}`", texture.info().name);
                texture
            }
            None => {
                let texture = create()?;
                debug!("Render target cache miss, created `{}`", texture.info().name);
                texture
            }
        };
        pool.in_use += 1;
        pool.peak_in_use = pool.peak_in_use.max(pool.in_use);
        Ok(texture)
    }

    /// Return a texture obtained from [`get_or_create()`](Self::get_or_create) with the same `key`. Dropped if its
    /// pool was evicted in the meantime.
    pub fn release(&mut self, key: u64, texture: B::Texture) {
        match self.pools.get_mut(&key) {
            Some(pool) => {
                pool.in_use = pool.in_use.saturating_sub(1);
                pool.available.push(texture);
            }
            None => trace!("Dropping render target `{}` of an evicted pool", texture.info().name),
        }
    }

    /// Evict pools untouched during the last `every` generations and trim the others to their peak usage since the
    /// previous cleanup. Returns the number of released textures.
    pub(crate) fn periodic_cleanup(&mut self, generation: u64, every: u64) -> usize {
        let total_before = self.texture_count();
        evict_stale(&mut self.pools, generation, every);
        for pool in self.pools.values_mut() {
            let spare = pool.peak_in_use.max(pool.in_use) - pool.in_use;
            pool.available.truncate(spare);
            pool.peak_in_use = pool.in_use;
        }
        total_before - self.texture_count()
    }

    /// Number of distinct keys in the cache.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Total number of pooled textures.
    pub fn texture_count(&self) -> usize {
        self.pools.values().map(RenderTargetPool::size).sum()
    }

    /// Textures pooled under `key`.
    pub fn pool_size(&self, key: u64) -> usize {
        self.pools.get(&key).map(RenderTargetPool::size).unwrap_or_default()
    }
}
