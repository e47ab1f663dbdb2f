//! The per-frame lifecycle of a render graph.
//!
//! Every frame follows the same three steps, plus an optional fourth:
//! 1. [`RenderGraph::compile_new_graph()`] compiles a [`RenderGraphDescription`] obtained from
//!    [`RenderGraph::new_description()`].
//! 2. [`RenderGraph::record_and_submit()`] records the compiled graph and submits it.
//! 3. [`RenderGraph::reset()`] retires the frame. Handles of this generation become invalid, imported textures have their
//!    final usage recorded, and the resource cache is periodically cleaned up.
//! 4. [`RenderGraph::get_statistics()`] reports timings of an earlier frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::backend::{Backend, BackendObject};
use crate::cache::ResourceCache;
use crate::config::GraphConfig;
use crate::Error;
use crate::graph::compile::{compile, BakeContext, BakedGraph};
use crate::graph::description::RenderGraphDescription;
use crate::graph::dot::write_dot_file;
use crate::graph::handle::Handle;
use crate::graph::record::record;
use crate::graph::statistics::{Statistics, StatisticsCollector};

/// Compiles, records and retires one graph per frame, reusing backend objects through a shared [`ResourceCache`].
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct RenderGraph<'cb, B: Backend> {
    #[derivative(Debug = "ignore")]
    backend: Arc<B>,
    cache: Arc<ResourceCache<B>>,
    config: GraphConfig,
    generation: u64,
    #[derivative(Debug = "ignore")]
    bake: Option<BakeContext<'cb, B>>,
    submitted: bool,
    statistics: Option<StatisticsCollector<B>>,
}

impl<'cb, B: Backend> RenderGraph<'cb, B> {
    /// Create a render graph. The cache may be shared with other graphs using the same backend.
    pub fn new(backend: Arc<B>, cache: Arc<ResourceCache<B>>, config: GraphConfig) -> Self {
        let statistics = config.statistics.then(StatisticsCollector::new);
        Self {
            backend,
            cache,
            config,
            generation: 0,
            bake: None,
            submitted: false,
            statistics,
        }
    }

    /// Start declaring the graph of the current generation.
    pub fn new_description(&self) -> RenderGraphDescription<'cb, B> {
        RenderGraphDescription::new(self.generation, self.cache.clone())
    }

    /// Compile a description. Backend objects for new render targets and framebuffers are created or fetched from the
    /// cache here.
    /// # Errors
    /// - Fails if the backend fails to create a texture or framebuffer.
    /// # Panics
    /// - If a graph was already compiled this generation.
    /// - If the description belongs to another generation.
    pub fn compile_new_graph(&mut self, description: RenderGraphDescription<'cb, B>) -> Result<()> {
        assert!(self.bake.is_none(), "compile_new_graph() called twice without reset()");
        assert_eq!(
            description.generation(),
            self.generation,
            "description of generation {} compiled in generation {}",
            description.generation(),
            self.generation
        );

        let bake = compile(self.backend.as_ref(), &self.cache, description)?;
        self.bake = Some(bake);

        if let Some(dir) = self.config.dump_dependency_dot.clone() {
            // Dump failures are logged and do not affect the frame.
            let _ = self.dump_dependency_dot(&dir);
        }
        Ok(())
    }

    /// Record the compiled graph and submit it, signaling `fence` when the GPU is done. Nothing is submitted if any
    /// pass callback fails.
    /// # Errors
    /// - [`Error::NoGraph`] if no graph was compiled this generation.
    /// - Any error returned by a pass callback or the backend.
    /// # Panics
    /// - If the graph was already recorded this generation, whether or not that recording succeeded.
    pub fn record_and_submit(&mut self, fence: Option<&B::Fence>) -> Result<()> {
        let Some(bake) = &self.bake else {
            return Err(anyhow::Error::from(Error::NoGraph));
        };
        assert!(!self.submitted, "record_and_submit() called twice in generation {}", self.generation);
        self.submitted = true;
        let timestamps = match self.statistics.as_mut() {
            Some(statistics) => Some(statistics.begin_frame(self.backend.as_ref())?),
            None => None,
        };
        let streams = record(self.backend.as_ref(), bake, timestamps, self.config.parallel_recording)?;
        self.backend.submit(streams, fence)
    }

    /// Retire the current generation. All handles obtained so far become invalid.
    /// # Errors
    /// - Fails if a cache lock was poisoned.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(mut bake) = self.bake.take() {
            let mut tracker = self.cache.imported()?;
            for state in bake.graph.render_targets.iter().filter(|state| state.imported) {
                if let Some(texture) = &state.texture {
                    tracker.record(texture.uuid(), state.surface_usages.clone(), self.generation);
                }
            }
            drop(tracker);
            bake.graph.release_render_targets(&mut *self.cache.render_targets()?);
        }

        self.submitted = false;
        if self.generation % self.config.cleanup_every == 0 {
            self.cache.periodic_cleanup(self.generation, self.config.cleanup_every)?;
        }
        self.generation += 1;
        Ok(())
    }

    /// Timing of the oldest frame still tracked. Fields are `None` if statistics are disabled or not yet available.
    pub fn get_statistics(&self) -> Statistics {
        self.statistics
            .as_ref()
            .map(|statistics| statistics.statistics(self.backend.as_ref()))
            .unwrap_or_default()
    }

    /// Write the dependency graph of the compiled frame to `dir/rgraph_{generation}.dot`.
    /// # Errors
    /// - [`Error::NoGraph`] if no graph was compiled this generation.
    /// - [`Error::DotDumpFailed`] if the file could not be written.
    pub fn dump_dependency_dot(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let graph = self.baked().ok_or_else(|| anyhow::Error::from(Error::NoGraph))?;
        write_dot_file(graph, dir.as_ref())
    }

    /// Whether `handle` belongs to the current generation.
    pub fn is_valid<K>(&self, handle: Handle<K>) -> bool {
        handle.is_valid() && handle.generation() == self.generation
    }

    /// Current generation. Incremented by every [`reset()`](Self::reset).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The compiled graph of this generation, if any.
    pub fn baked(&self) -> Option<&BakedGraph<B>> {
        self.bake.as_ref().map(|bake| &bake.graph)
    }

    pub fn cache(&self) -> &Arc<ResourceCache<B>> {
        &self.cache
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}
