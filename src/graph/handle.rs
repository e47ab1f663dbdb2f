//! Generation-scoped handles to graph resources.
//!
//! A handle is an index into one frame's resource table plus the generation of the graph that produced it. After
//! [`RenderGraph::reset()`](crate::RenderGraph::reset) the generation advances and every older handle fails
//! [`RenderGraph::is_valid()`](crate::RenderGraph::is_valid).

use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker for render target handles.
#[derive(Debug)]
pub enum RenderTargetKind {}

/// Marker for buffer handles.
#[derive(Debug)]
pub enum BufferKind {}

/// Marker for acceleration structure handles.
#[derive(Debug)]
pub enum AccelerationStructureKind {}

/// Typed handle to a resource declared in a [`RenderGraphDescription`](crate::RenderGraphDescription).
pub struct Handle<K> {
    index: u32,
    generation: u64,
    _kind: PhantomData<fn() -> K>,
}

/// Handle to a render target.
pub type RenderTargetHandle = Handle<RenderTargetKind>;
/// Handle to an imported buffer range.
pub type BufferHandle = Handle<BufferKind>;
/// Handle to an imported acceleration structure.
pub type AccelerationStructureHandle = Handle<AccelerationStructureKind>;

impl<K> Handle<K> {
    const INVALID_INDEX: u32 = u32::MAX;

    /// A handle that refers to nothing.
    pub const INVALID: Self = Self {
        index: Self::INVALID_INDEX,
        generation: 0,
        _kind: PhantomData,
    };

    pub(crate) fn new(index: usize, generation: u64) -> Self {
        Self {
            index: index as u32,
            generation,
            _kind: PhantomData,
        }
    }

    /// Whether this handle was produced by a description at all. Use
    /// [`RenderGraph::is_valid()`](crate::RenderGraph::is_valid) to also check the generation.
    pub fn is_valid(&self) -> bool {
        self.index != Self::INVALID_INDEX
    }

    /// Index into the resource table of the frame that produced this handle.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation of the graph that produced this handle.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<K> Default for Handle<K> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K> Eq for Handle<K> {}

impl<K> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<K> Debug for Handle<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = std::any::type_name::<K>().rsplit("::").next().unwrap_or("Resource");
        if self.is_valid() {
            write!(f, "{}({}@{})", kind.trim_end_matches("Kind"), self.index, self.generation)
        } else {
            write!(f, "{}(invalid)", kind.trim_end_matches("Kind"))
        }
    }
}
