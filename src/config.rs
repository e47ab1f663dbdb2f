//! Capacity constants and runtime options of the render graph.
//!
//! The capacity constants bound the number of passes and resources a single frame's graph can address. They size the
//! bitsets used for overlap testing between passes, so raising them makes every pass larger. Exceeding one of them while
//! declaring a graph panics with a message naming the constant.
//!
//! # Example
//! ```
//! use framegraph::prelude::*;
//!
//! let config = GraphConfigBuilder::new()
//!     .statistics(true)
//!     .dump_dependency_dot("./rgraph")
//!     .build();
//! ```

use std::path::PathBuf;

use static_assertions::const_assert;

/// Maximum number of passes in a single graph.
pub const MAX_PASSES: usize = 512;
/// Maximum number of render targets (new and imported) in a single graph.
pub const MAX_RENDER_TARGETS: usize = 64;
/// Maximum number of imported buffers in a single graph.
pub const MAX_BUFFERS: usize = 64;
/// Maximum number of imported acceleration structures in a single graph.
pub const MAX_ACCELERATION_STRUCTURES: usize = 32;
/// Maximum number of color attachments of a graphics pass.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;
/// Number of frames between two cache cleanups. Cache entries that were not touched in this window are evicted.
pub const PERIODIC_CLEANUP_EVERY: u64 = 60;
/// Number of frames the GPU may lag behind the CPU. Statistics are read back this many frames late.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

pub(crate) const fn words_for(bits: usize) -> usize {
    (bits + 63) / 64
}

pub(crate) const RENDER_TARGET_WORDS: usize = words_for(MAX_RENDER_TARGETS);
pub(crate) const BUFFER_WORDS: usize = words_for(MAX_BUFFERS);
pub(crate) const ACCELERATION_STRUCTURE_WORDS: usize = words_for(MAX_ACCELERATION_STRUCTURES);

const_assert!(MAX_PASSES > 0);
const_assert!(MAX_COLOR_ATTACHMENTS <= MAX_RENDER_TARGETS);
const_assert!(PERIODIC_CLEANUP_EVERY > 0);
const_assert!(MAX_PASSES <= (u32::MAX as usize));

/// Runtime options of a [`RenderGraph`](crate::RenderGraph).
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Bracket every frame with GPU timestamps.
    pub statistics: bool,
    /// If set, every compiled graph is dumped as a `.dot` file in this directory.
    pub dump_dependency_dot: Option<PathBuf>,
    /// Number of frames between cache cleanups.
    pub cleanup_every: u64,
    /// Record secondary command streams in parallel. Only has an effect with the `rayon` feature.
    pub parallel_recording: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            statistics: false,
            dump_dependency_dot: None,
            cleanup_every: PERIODIC_CLEANUP_EVERY,
            parallel_recording: true,
        }
    }
}

/// Builder for [`GraphConfig`].
#[derive(Debug, Default)]
pub struct GraphConfigBuilder {
    config: GraphConfig,
}

impl GraphConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable GPU timestamps.
    pub fn statistics(mut self, enabled: bool) -> Self {
        self.config.statistics = enabled;
        self
    }

    /// Dump every compiled graph into this directory.
    pub fn dump_dependency_dot(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.dump_dependency_dot = Some(dir.into());
        self
    }

    /// Set the cleanup interval in frames. Must not be zero.
    pub fn cleanup_every(mut self, frames: u64) -> Self {
        assert!(frames > 0, "cleanup interval must be at least one frame");
        self.config.cleanup_every = frames;
        self
    }

    /// Enable or disable parallel recording of secondary command streams.
    pub fn parallel_recording(mut self, enabled: bool) -> Self {
        self.config.parallel_recording = enabled;
        self
    }

    /// Obtain the built configuration.
    pub fn build(self) -> GraphConfig {
        self.config
    }
}
