//! Declaration of one frame's graph: the resource table and the pass list.
//!
//! A [`RenderGraphDescription`] is obtained from [`RenderGraph::new_description()`](crate::RenderGraph::new_description)
//! and is stamped with the graph's current generation. Every handle it hands out carries that generation. The description
//! is consumed by [`RenderGraph::compile_new_graph()`](crate::RenderGraph::compile_new_graph).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::backend::{Backend, BackendBuffer, BackendObject, BackendTexture};
use crate::cache::ResourceCache;
use crate::config::{MAX_ACCELERATION_STRUCTURES, MAX_BUFFERS, MAX_PASSES, MAX_RENDER_TARGETS};
use crate::Error;
use crate::graph::handle::{AccelerationStructureHandle, BufferHandle, Handle, RenderTargetHandle};
use crate::graph::pass::{GraphicsPassBuilder, Pass, PassBuilder, PassKind};
use crate::graph::resource::{buffer_ranges_overlap, RenderTargetDescription, TextureInfo};
use crate::graph::usage::{AccelerationStructureUsage, BufferUsage, TextureUsage};

/// Where a render target comes from.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) enum RenderTargetSource<B: Backend> {
    /// Allocated from the render target cache at compile time.
    New {
        description: RenderTargetDescription,
        hash: u64,
    },
    /// Owned outside the graph. `initial_usages` holds the usage of every surface when the frame starts.
    Imported {
        texture: B::Texture,
        initial_usages: Vec<TextureUsage>,
    },
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct RenderTargetEntry<B: Backend> {
    pub info: TextureInfo,
    pub source: RenderTargetSource<B>,
    /// Union of all usages passes declared on this render target.
    pub usage_derived_by_deps: TextureUsage,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct BufferEntry<B: Backend> {
    pub name: String,
    pub buffer: B::Buffer,
    pub offset: u64,
    pub range: u64,
    pub usage: BufferUsage,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct AccelerationStructureEntry<B: Backend> {
    pub name: String,
    pub acceleration_structure: B::AccelerationStructure,
    pub usage: AccelerationStructureUsage,
}

/// Every resource one frame's passes can touch, addressed by generation-scoped handles.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ResourceTable<B: Backend> {
    pub(crate) generation: u64,
    pub(crate) render_targets: Vec<RenderTargetEntry<B>>,
    pub(crate) buffers: Vec<BufferEntry<B>>,
    pub(crate) acceleration_structures: Vec<AccelerationStructureEntry<B>>,
    #[derivative(Debug = "ignore")]
    deduplicated: HashMap<u64, usize>,
}

fn check_handle<K>(handle: Handle<K>, generation: u64, count: usize, what: &str) {
    assert!(
        handle.is_valid() && handle.generation() == generation && handle.index() < count,
        "stale or invalid {what} handle {handle:?}, current graph generation is {generation}"
    );
}

impl<B: Backend> ResourceTable<B> {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            render_targets: vec![],
            buffers: vec![],
            acceleration_structures: vec![],
            deduplicated: HashMap::new(),
        }
    }

    pub(crate) fn render_target(&self, handle: RenderTargetHandle) -> &RenderTargetEntry<B> {
        check_handle(handle, self.generation, self.render_targets.len(), "render target");
        &self.render_targets[handle.index()]
    }

    pub(crate) fn render_target_mut(&mut self, handle: RenderTargetHandle) -> &mut RenderTargetEntry<B> {
        check_handle(handle, self.generation, self.render_targets.len(), "render target");
        &mut self.render_targets[handle.index()]
    }

    pub(crate) fn buffer(&self, handle: BufferHandle) -> &BufferEntry<B> {
        check_handle(handle, self.generation, self.buffers.len(), "buffer");
        &self.buffers[handle.index()]
    }

    pub(crate) fn acceleration_structure(&self, handle: AccelerationStructureHandle) -> &AccelerationStructureEntry<B> {
        check_handle(handle, self.generation, self.acceleration_structures.len(), "acceleration structure");
        &self.acceleration_structures[handle.index()]
    }

    fn push_render_target(&mut self, entry: RenderTargetEntry<B>) -> RenderTargetHandle {
        assert!(
            self.render_targets.len() < MAX_RENDER_TARGETS,
            "cannot declare render target `{}`: MAX_RENDER_TARGETS ({MAX_RENDER_TARGETS}) exceeded",
            entry.info.name
        );
        self.render_targets.push(entry);
        Handle::new(self.render_targets.len() - 1, self.generation)
    }

    fn imported_texture_index(&self, uuid: u64) -> Option<usize> {
        self.render_targets.iter().position(|rt| match &rt.source {
            RenderTargetSource::Imported {
                texture, ..
            } => texture.uuid() == uuid,
            RenderTargetSource::New { .. } => false,
        })
    }
}

/// One frame's declared graph.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct RenderGraphDescription<'cb, B: Backend> {
    pub(crate) resources: ResourceTable<B>,
    pub(crate) passes: Vec<Pass<'cb, B>>,
    #[derivative(Debug = "ignore")]
    cache: Arc<ResourceCache<B>>,
}

impl<'cb, B: Backend> RenderGraphDescription<'cb, B> {
    pub(crate) fn new(generation: u64, cache: Arc<ResourceCache<B>>) -> Self {
        Self {
            resources: ResourceTable::new(generation),
            passes: vec![],
            cache,
        }
    }

    pub(crate) fn into_parts(self) -> (ResourceTable<B>, Vec<Pass<'cb, B>>) {
        (self.resources, self.passes)
    }

    /// Generation of the graph this description belongs to.
    pub fn generation(&self) -> u64 {
        self.resources.generation
    }

    /// Number of declared passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Number of declared render targets.
    pub fn render_target_count(&self) -> usize {
        self.resources.render_targets.len()
    }

    /// Declare a new render target. Requesting an identical description twice in one frame returns the same handle.
    pub fn new_render_target(&mut self, description: RenderTargetDescription) -> RenderTargetHandle {
        assert!(
            description.width > 0 && description.height > 0 && description.mip_count > 0 && description.layer_count > 0,
            "render target `{}` has an empty extent, mip or layer count",
            description.name
        );
        let hash = description.content_hash();
        if let Some(&index) = self.resources.deduplicated.get(&hash) {
            if let RenderTargetSource::New {
                description: existing, ..
            } = &self.resources.render_targets[index].source
            {
                if *existing == description {
                    return Handle::new(index, self.resources.generation);
                }
            }
        }

        let info = description.to_texture_info(TextureUsage::empty());
        let handle = self.resources.push_render_target(RenderTargetEntry {
            info,
            source: RenderTargetSource::New {
                description,
                hash,
            },
            usage_derived_by_deps: TextureUsage::empty(),
        });
        self.resources.deduplicated.insert(hash, handle.index());
        handle
    }

    /// Import a texture owned outside the graph, currently in `usage` on every surface. An empty usage means the
    /// contents are undefined.
    pub fn import_render_target(&mut self, texture: B::Texture, usage: TextureUsage) -> RenderTargetHandle {
        let surfaces = texture.info().surface_count();
        self.push_imported(texture, vec![usage; surfaces])
    }

    /// Import a texture owned outside the graph whose usage is supplied by the tracker, as left by the last frame that
    /// used it. Fails if the texture was never used by a graph before.
    pub fn import_render_target_tracked(&mut self, texture: B::Texture) -> Result<RenderTargetHandle> {
        let usages = {
            let mut tracker = self.cache.imported()?;
            tracker.touch(texture.uuid(), self.resources.generation);
            tracker.surface_usages(texture.uuid()).map(|usages| usages.to_vec())
        };
        match usages {
            Some(usages) if usages.len() == texture.info().surface_count() => Ok(self.push_imported(texture, usages)),
            Some(_) => {
                warn!(
                    "Tracked state of `{}` does not match its shape, importing with undefined contents",
                    texture.info().name
                );
                let surfaces = texture.info().surface_count();
                Ok(self.push_imported(texture, vec![TextureUsage::empty(); surfaces]))
            }
            None => Err(anyhow::Error::from(Error::UntrackedImport(texture.info().name.clone()))),
        }
    }

    fn push_imported(&mut self, texture: B::Texture, initial_usages: Vec<TextureUsage>) -> RenderTargetHandle {
        assert!(
            self.resources.imported_texture_index(texture.uuid()).is_none(),
            "texture `{}` imported twice in the same frame",
            texture.info().name
        );
        let info = texture.info().clone();
        self.resources.push_render_target(RenderTargetEntry {
            info,
            source: RenderTargetSource::Imported {
                texture,
                initial_usages,
            },
            usage_derived_by_deps: TextureUsage::empty(),
        })
    }

    /// Import a range of a buffer currently in `usage`. A range of `vk::WHOLE_SIZE` extends to the end of the buffer.
    /// Ranges of the same buffer imported in one frame must not overlap.
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        buffer: B::Buffer,
        offset: u64,
        range: u64,
        usage: BufferUsage,
    ) -> BufferHandle {
        let name = name.into();
        let range = if range == vk::WHOLE_SIZE {
            buffer.size().saturating_sub(offset)
        } else {
            range
        };
        assert!(
            offset.saturating_add(range) <= buffer.size(),
            "buffer import `{name}` range {offset}+{range} exceeds buffer size {}",
            buffer.size()
        );
        for existing in self.resources.buffers.iter().filter(|b| b.buffer.uuid() == buffer.uuid()) {
            assert!(
                !buffer_ranges_overlap(existing.offset, existing.range, offset, range),
                "buffer import `{name}` overlaps the range already imported as `{}`",
                existing.name
            );
        }
        assert!(
            self.resources.buffers.len() < MAX_BUFFERS,
            "cannot import buffer `{name}`: MAX_BUFFERS ({MAX_BUFFERS}) exceeded"
        );
        self.resources.buffers.push(BufferEntry {
            name,
            buffer,
            offset,
            range,
            usage,
        });
        Handle::new(self.resources.buffers.len() - 1, self.resources.generation)
    }

    /// Import an acceleration structure currently in `usage`.
    pub fn import_acceleration_structure(
        &mut self,
        name: impl Into<String>,
        acceleration_structure: B::AccelerationStructure,
        usage: AccelerationStructureUsage,
    ) -> AccelerationStructureHandle {
        let name = name.into();
        assert!(
            !self
                .resources
                .acceleration_structures
                .iter()
                .any(|existing| existing.acceleration_structure.uuid() == acceleration_structure.uuid()),
            "acceleration structure `{name}` imported twice in the same frame"
        );
        assert!(
            self.resources.acceleration_structures.len() < MAX_ACCELERATION_STRUCTURES,
            "cannot import acceleration structure `{name}`: MAX_ACCELERATION_STRUCTURES ({MAX_ACCELERATION_STRUCTURES}) exceeded"
        );
        self.resources.acceleration_structures.push(AccelerationStructureEntry {
            name,
            acceleration_structure,
            usage,
        });
        Handle::new(self.resources.acceleration_structures.len() - 1, self.resources.generation)
    }

    fn push_pass(&mut self, name: String, kind: PassKind) -> PassBuilder<'_, 'cb, B> {
        assert!(
            self.passes.len() < MAX_PASSES,
            "cannot register pass `{name}`: MAX_PASSES ({MAX_PASSES}) exceeded"
        );
        self.passes.push(Pass::new(name, kind));
        let index = self.passes.len() - 1;
        PassBuilder {
            pass: &mut self.passes[index],
            resources: &mut self.resources,
        }
    }

    /// Append a graphics pass.
    pub fn new_graphics_pass(&mut self, name: impl Into<String>) -> GraphicsPassBuilder<'_, 'cb, B> {
        GraphicsPassBuilder {
            builder: self.push_pass(name.into(), PassKind::Graphics),
        }
    }

    /// Append a compute, transfer or ray tracing pass.
    pub fn new_non_graphics_pass(&mut self, name: impl Into<String>) -> PassBuilder<'_, 'cb, B> {
        self.push_pass(name.into(), PassKind::NonGraphics)
    }
}
