//! Tracks the usage of imported textures between frames, so they can be imported without restating their usage.

use std::collections::HashMap;

use crate::cache::{evict_stale, Touched};
use crate::graph::usage::TextureUsage;

#[derive(Debug, Clone)]
struct ImportedTextureRecord {
    /// Usage of every surface at the end of the last frame that used the texture.
    surface_usages: Vec<TextureUsage>,
    last_touched: u64,
}

impl Touched for ImportedTextureRecord {
    fn last_touched(&self) -> u64 {
        self.last_touched
    }
}

/// Final per-surface usage of imported textures, keyed by texture uuid.
#[derive(Debug, Default)]
pub struct ImportedResourceTracker {
    records: HashMap<u64, ImportedTextureRecord>,
}

impl ImportedResourceTracker {
    /// Last recorded usage of every surface of the texture, if it was used by a graph before.
    pub fn surface_usages(&self, uuid: u64) -> Option<&[TextureUsage]> {
        self.records.get(&uuid).map(|record| record.surface_usages.as_slice())
    }

    /// Mark a record as used in `generation`, so it survives cleanup.
    pub fn touch(&mut self, uuid: u64, generation: u64) {
        if let Some(record) = self.records.get_mut(&uuid) {
            record.last_touched = generation;
        }
    }

    /// Store the final usage of every surface of an imported texture.
    pub fn record(&mut self, uuid: u64, surface_usages: Vec<TextureUsage>, generation: u64) {
        self.records.insert(
            uuid,
            ImportedTextureRecord {
                surface_usages,
                last_touched: generation,
            },
        );
    }

    pub(crate) fn periodic_cleanup(&mut self, generation: u64, every: u64) -> usize {
        evict_stale(&mut self.records, generation, every)
    }

    pub fn contains(&self, uuid: u64) -> bool {
        self.records.contains_key(&uuid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
