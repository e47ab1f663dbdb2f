use std::collections::HashMap;

use anyhow::Result;

use crate::backend::Backend;
use crate::cache::{evict_stale, Touched};

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
struct FramebufferEntry<B: Backend> {
    framebuffer: B::Framebuffer,
    last_touched: u64,
}

impl<B: Backend> Touched for FramebufferEntry<B> {
    fn last_touched(&self) -> u64 {
        self.last_touched
    }
}

/// Framebuffer objects keyed by attachment configuration and attached texture identities.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Default(bound = ""))]
pub struct FramebufferCache<B: Backend> {
    store: HashMap<u64, FramebufferEntry<B>>,
}

impl<B: Backend> FramebufferCache<B> {
    pub fn get_or_create<F>(&mut self, key: u64, generation: u64, create: F) -> Result<B::Framebuffer>
    where
        F: FnOnce() -> Result<B::Framebuffer>, {
        if let Some(entry) = self.store.get_mut(&key) {
            entry.last_touched = generation;
            return Ok(entry.framebuffer.clone());
        }
        let framebuffer = create()?;
        self.store.insert(
            key,
            FramebufferEntry {
                framebuffer: framebuffer.clone(),
                last_touched: generation,
            },
        );
        Ok(framebuffer)
    }

    pub(crate) fn periodic_cleanup(&mut self, generation: u64, every: u64) -> usize {
        evict_stale(&mut self.store, generation, every)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
