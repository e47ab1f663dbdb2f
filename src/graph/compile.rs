//! The graph compiler.
//!
//! Compilation turns one frame's [`RenderGraphDescription`] into a [`BakedGraph`]:
//! 1. New render targets are realized through the render target cache, keyed by their description and derived usage.
//! 2. Every pair of passes is tested for a shared resource. Later passes depend on earlier ones, so declaration order is
//!    always a topological order of the resulting graph.
//! 3. Passes are layered into batches. A pass lands in the first batch after all of its dependencies.
//! 4. Inside a batch, passes are grouped by kind, starting with the kind the previous batch ended with.
//! 5. Framebuffers are fetched from the framebuffer cache and primary command streams are assigned.
//! 6. The usages of each batch are merged per surface and compared with the running usage to synthesize the barriers
//!    that run before the batch.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

use anyhow::Result;
use ash::vk;
use fixedbitset::FixedBitSet;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::Direction;

use crate::backend::{Backend, BackendObject, FramebufferAttachment, FramebufferCreateInfo, RenderPassBeginInfo};
use crate::cache::{FramebufferCache, RenderTargetCache, ResourceCache};
use crate::graph::barrier::{AccelerationStructureTransition, BufferTransition, TextureTransition};
use crate::graph::description::{RenderGraphDescription, RenderTargetSource, ResourceTable};
use crate::graph::handle::{AccelerationStructureHandle, BufferHandle, RenderTargetHandle};
use crate::graph::pass::{
    AccelerationStructureDependency, BoxedPassFn, BufferDependency, FramebufferInfo, Pass, PassKind, SharedResource,
    TextureDependency,
};
use crate::graph::resource::{ClearValue, TextureInfo, TextureSubresource, TextureSurface};
use crate::graph::usage::{texture_layout, AccelerationStructureUsage, BufferUsage, ResourceUsage, TextureUsage};
use crate::util::hash::{append_hash, hash_of};

/// Directed graph of pass dependencies. Node weights are pass indices, edge weights the resources that order the passes.
pub type DependencyGraph = Graph<usize, Vec<SharedResource>>;

/// Everything of a compiled graph that is still needed to record it, except the pass callbacks.
pub(crate) struct BakeContext<'cb, B: Backend> {
    pub graph: BakedGraph<B>,
    pub work: Vec<PassWork<'cb, B>>,
}

/// The callback of a compiled pass.
pub(crate) struct PassWork<'cb, B: Backend> {
    pub work: Option<BoxedPassFn<'cb, B>>,
    pub secondary_stream_count: u32,
}

/// Framebuffer and per-frame begin state of a graphics pass with attachments.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct RenderPassState<B: Backend> {
    pub framebuffer: B::Framebuffer,
    pub begin_info: RenderPassBeginInfo,
    pub draws_to_presentable: bool,
}

/// A pass after compilation.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct BakedPass<B: Backend> {
    pub(crate) name: String,
    pub(crate) kind: PassKind,
    pub(crate) batch: usize,
    pub(crate) texture_deps: Vec<TextureDependency>,
    pub(crate) buffer_deps: Vec<BufferDependency>,
    pub(crate) acceleration_structure_deps: Vec<AccelerationStructureDependency>,
    pub(crate) framebuffer_info: Option<FramebufferInfo>,
    pub(crate) render_pass: Option<RenderPassState<B>>,
    pub(crate) secondary_stream_count: u32,
}

impl<B: Backend> BakedPass<B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    /// Index of the batch this pass runs in.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Whether this pass runs inside a render pass.
    pub fn has_render_pass(&self) -> bool {
        self.render_pass.is_some()
    }
}

/// A set of passes without hazards between them, plus the barriers that run before them.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub(crate) passes: Vec<usize>,
    pub(crate) texture_transitions: Vec<TextureTransition>,
    pub(crate) buffer_transitions: Vec<BufferTransition>,
    pub(crate) acceleration_structure_transitions: Vec<AccelerationStructureTransition>,
    pub(crate) stream_index: usize,
}

impl Batch {
    /// Indices of the passes in this batch, in recording order.
    pub fn passes(&self) -> &[usize] {
        &self.passes
    }

    pub fn texture_transitions(&self) -> &[TextureTransition] {
        &self.texture_transitions
    }

    pub fn buffer_transitions(&self) -> &[BufferTransition] {
        &self.buffer_transitions
    }

    pub fn acceleration_structure_transitions(&self) -> &[AccelerationStructureTransition] {
        &self.acceleration_structure_transitions
    }

    /// Index of the primary command stream this batch is recorded into.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Whether no barrier runs before this batch.
    pub fn has_no_barriers(&self) -> bool {
        self.texture_transitions.is_empty()
            && self.buffer_transitions.is_empty()
            && self.acceleration_structure_transitions.is_empty()
    }
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct RenderTargetState<B: Backend> {
    /// `None` for new render targets no pass uses.
    pub texture: Option<B::Texture>,
    pub info: TextureInfo,
    pub imported: bool,
    /// Usage of every surface. After compilation this is the usage at the end of the frame.
    pub surface_usages: Vec<TextureUsage>,
    /// Render target cache key the texture was checked out under. `None` for imported and unused render targets.
    pub pool_key: Option<u64>,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct BufferState<B: Backend> {
    pub name: String,
    pub buffer: B::Buffer,
    pub offset: u64,
    pub range: u64,
    pub usage: BufferUsage,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct AccelerationStructureState<B: Backend> {
    pub name: String,
    pub acceleration_structure: B::AccelerationStructure,
    pub usage: AccelerationStructureUsage,
}

/// A compiled frame: pass to batch assignment, per-batch barriers, realized resources and the dependency graph.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct BakedGraph<B: Backend> {
    pub(crate) generation: u64,
    pub(crate) passes: Vec<BakedPass<B>>,
    pub(crate) batches: Vec<Batch>,
    pub(crate) render_targets: Vec<RenderTargetState<B>>,
    pub(crate) buffers: Vec<BufferState<B>>,
    pub(crate) acceleration_structures: Vec<AccelerationStructureState<B>>,
    pub(crate) dependencies: DependencyGraph,
}

/// Compile a description into a bake context. Only fails if the backend fails to create a texture or framebuffer.
pub(crate) fn compile<'cb, B: Backend>(
    backend: &B,
    cache: &ResourceCache<B>,
    description: RenderGraphDescription<'cb, B>,
) -> Result<BakeContext<'cb, B>> {
    let (resources, passes) = description.into_parts();
    let generation = resources.generation;

    let render_targets = realize_render_targets(backend, cache, &resources)?;
    let dependencies = build_dependency_graph(&passes);
    let levels = assign_levels(&dependencies);
    let batches = form_batches(&passes, &levels);

    let mut baked_passes = Vec::with_capacity(passes.len());
    let mut work = Vec::with_capacity(passes.len());
    for (pass, batch) in passes.into_iter().zip(levels) {
        let Pass {
            name,
            kind,
            framebuffer,
            texture_deps,
            buffer_deps,
            acceleration_structure_deps,
            work: callback,
            secondary_stream_count,
            ..
        } = pass;
        work.push(PassWork {
            work: callback,
            secondary_stream_count,
        });
        baked_passes.push(BakedPass {
            name,
            kind,
            batch,
            texture_deps,
            buffer_deps,
            acceleration_structure_deps,
            framebuffer_info: framebuffer,
            render_pass: None,
            secondary_stream_count,
        });
    }

    let ResourceTable {
        buffers,
        acceleration_structures,
        ..
    } = resources;

    let mut graph = BakedGraph {
        generation,
        passes: baked_passes,
        batches,
        render_targets,
        buffers: buffers
            .into_iter()
            .map(|entry| BufferState {
                name: entry.name,
                buffer: entry.buffer,
                offset: entry.offset,
                range: entry.range,
                usage: entry.usage,
            })
            .collect(),
        acceleration_structures: acceleration_structures
            .into_iter()
            .map(|entry| AccelerationStructureState {
                name: entry.name,
                acceleration_structure: entry.acceleration_structure,
                usage: entry.usage,
            })
            .collect(),
        dependencies,
    };

    let render_passes = cache
        .framebuffers()
        .and_then(|mut framebuffers| graph.create_render_passes(backend, &mut framebuffers));
    if let Err(err) = render_passes {
        graph.release_render_targets(&mut *cache.render_targets()?);
        return Err(err);
    }
    graph.assign_streams();
    graph.synthesize_barriers();
    debug_assert!(!petgraph::algo::is_cyclic_directed(&graph.dependencies));

    for (index, batch) in graph.batches.iter().enumerate() {
        trace!(
            "Batch {index}: passes {:?}, {} texture, {} buffer and {} acceleration structure barriers",
            graph.batch_pass_names(index),
            batch.texture_transitions.len(),
            batch.buffer_transitions.len(),
            batch.acceleration_structure_transitions.len()
        );
    }

    Ok(BakeContext {
        graph,
        work,
    })
}

fn realize_render_targets<B: Backend>(
    backend: &B,
    cache: &ResourceCache<B>,
    resources: &ResourceTable<B>,
) -> Result<Vec<RenderTargetState<B>>> {
    let mut pool = cache.render_targets()?;
    let mut states: Vec<RenderTargetState<B>> = Vec::with_capacity(resources.render_targets.len());
    for entry in &resources.render_targets {
        let surfaces = entry.info.surface_count();
        let mut state = RenderTargetState {
            texture: None,
            info: entry.info.clone(),
            imported: false,
            surface_usages: vec![TextureUsage::empty(); surfaces],
            pool_key: None,
        };
        match &entry.source {
            RenderTargetSource::Imported {
                texture,
                initial_usages,
            } => {
                state.texture = Some(texture.clone());
                state.imported = true;
                state.surface_usages = initial_usages.clone();
            }
            RenderTargetSource::New {
                description,
                ..
            } if entry.usage_derived_by_deps.is_empty() => {
                warn!("Render target `{}` is declared but no pass depends on it", description.name);
            }
            RenderTargetSource::New {
                description,
                hash,
            } => {
                let info = description.to_texture_info(entry.usage_derived_by_deps);
                let key = append_hash(*hash, &entry.usage_derived_by_deps.bits());
                match pool.get_or_create(key, resources.generation, || backend.create_texture(&info)) {
                    Ok(texture) => {
                        state.texture = Some(texture);
                        state.info = info;
                        state.pool_key = Some(key);
                    }
                    Err(err) => {
                        // No graph will own the textures checked out so far.
                        for state in states.into_iter().rev() {
                            if let (Some(key), Some(texture)) = (state.pool_key, state.texture) {
                                pool.release(key, texture);
                            }
                        }
                        return Err(err);
                    }
                }
            }
        }
        states.push(state);
    }
    Ok(states)
}

fn build_dependency_graph<B: Backend>(passes: &[Pass<'_, B>]) -> DependencyGraph {
    let mut graph = DependencyGraph::with_capacity(passes.len(), passes.len());
    let nodes = (0..passes.len()).map(|index| graph.add_node(index)).collect::<Vec<NodeIndex>>();
    for (index, pass) in passes.iter().enumerate() {
        for (earlier_index, earlier) in passes[..index].iter().enumerate() {
            let shared = pass.shared_resources(earlier);
            if !shared.is_empty() {
                graph.add_edge(nodes[earlier_index], nodes[index], shared);
            }
        }
    }
    graph
}

/// Assign every pass to the first batch after all passes it depends on.
fn assign_levels(graph: &DependencyGraph) -> Vec<usize> {
    let mut levels = vec![0; graph.node_count()];
    let mut batched = FixedBitSet::with_capacity(graph.node_count());
    let mut remaining = graph.node_count();
    let mut level = 0;
    while remaining > 0 {
        let ready = graph
            .node_indices()
            .filter(|&node| {
                !batched.contains(node.index())
                    && graph
                        .neighbors_directed(node, Direction::Incoming)
                        .all(|dependency| batched.contains(dependency.index()))
            })
            .collect::<Vec<_>>();
        assert!(!ready.is_empty(), "dependency cycle between passes");
        for node in &ready {
            levels[node.index()] = level;
            batched.insert(node.index());
        }
        remaining -= ready.len();
        level += 1;
    }
    levels
}

/// Group passes into batches. Within a batch, passes of the kind the previous batch ended with go first, so the
/// hardware switches between graphics and compute as rarely as possible.
fn form_batches<B: Backend>(passes: &[Pass<'_, B>], levels: &[usize]) -> Vec<Batch> {
    let count = levels.iter().max().map_or(0, |max| max + 1);
    let mut batches = vec![Batch::default(); count];
    for (index, &level) in levels.iter().enumerate() {
        batches[level].passes.push(index);
    }

    let mut previous_kind = passes.first().map(|pass| pass.kind);
    for batch in &mut batches {
        if let Some(kind) = previous_kind {
            let (mut grouped, rest): (Vec<usize>, Vec<usize>) =
                batch.passes.iter().partition(|&&index| passes[index].kind == kind);
            grouped.extend(rest);
            batch.passes = grouped;
        }
        previous_kind = batch.passes.last().map(|&index| passes[index].kind);
    }
    batches
}

fn needs_barrier<U: ResourceUsage>(current: U, next: U) -> bool {
    current != next || next.writes()
}

/// Usages a batch declares, merged per key in order of first declaration.
struct BatchUsages<K, U> {
    order: Vec<(K, U)>,
    lookup: HashMap<K, usize>,
}

impl<K, U> Default for BatchUsages<K, U> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Copy, U: ResourceUsage> BatchUsages<K, U> {
    fn add(&mut self, key: K, usage: U) {
        match self.lookup.entry(key) {
            Entry::Occupied(entry) => {
                self.order[*entry.get()].1.insert(usage);
            }
            Entry::Vacant(entry) => {
                entry.insert(self.order.len());
                self.order.push((key, usage));
            }
        }
    }
}

impl<B: Backend> BakedGraph<B> {
    pub(crate) fn texture_of(&self, handle: RenderTargetHandle) -> &B::Texture {
        let state = &self.render_targets[handle.index()];
        match &state.texture {
            Some(texture) => texture,
            None => panic!("render target `{}` is accessed, but no pass declared a dependency on it", state.info.name),
        }
    }

    /// Union of the usages the passes of `batch` declared on `subresource`.
    pub(crate) fn current_usage(
        &self,
        batch: usize,
        handle: RenderTargetHandle,
        subresource: &TextureSubresource,
    ) -> TextureUsage {
        self.batches[batch]
            .passes
            .iter()
            .flat_map(|&pass| self.passes[pass].texture_deps.iter())
            .filter(|dep| dep.handle == handle && dep.subresource.overlaps(subresource))
            .fold(TextureUsage::empty(), |usage, dep| usage | dep.usage)
    }

    fn attachment(
        &self,
        pass: &BakedPass<B>,
        handle: RenderTargetHandle,
        subresource: TextureSubresource,
        depth_stencil: bool,
    ) -> (&B::Texture, TextureSubresource, vk::ImageLayout) {
        let info = &self.render_targets[handle.index()].info;
        let subresource = subresource.fixup(info);
        let usage = self.current_usage(pass.batch, handle, &subresource);
        assert!(
            !usage.is_empty(),
            "pass `{}` attaches `{}` without declaring a dependency on it",
            pass.name,
            info.name
        );
        let layout = texture_layout(usage, subresource.first_mip, info.mip_count, depth_stencil);
        (self.texture_of(handle), subresource, layout)
    }

    fn render_pass_state(
        &self,
        pass: &BakedPass<B>,
        backend: &B,
        framebuffers: &mut FramebufferCache<B>,
    ) -> Result<Option<RenderPassState<B>>> {
        let Some(info) = &pass.framebuffer_info else {
            return Ok(None);
        };

        let mut key = hash_of(info);
        let mut draws_to_presentable = false;
        let mut color_attachments = Vec::with_capacity(info.color_attachments.len());
        let mut color_layouts = Vec::with_capacity(info.color_attachments.len());
        for attachment in &info.color_attachments {
            let (texture, subresource, layout) =
                self.attachment(pass, attachment.handle, TextureSubresource::surface(attachment.surface), false);
            key = append_hash(key, &texture.uuid());
            draws_to_presentable |= self.render_targets[attachment.handle.index()]
                .info
                .usage
                .contains(TextureUsage::PRESENT);
            color_layouts.push(layout);
            color_attachments.push(FramebufferAttachment {
                texture,
                subresource,
                load_op: attachment.load_op,
                store_op: attachment.store_op,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                clear_value: ClearValue::Color(attachment.clear_color),
            });
        }

        let mut depth_stencil_layout = None;
        let depth_stencil_attachment = info.depth_stencil_attachment.as_ref().map(|ds| {
            let (texture, subresource, layout) = self.attachment(
                pass,
                ds.handle,
                TextureSubresource::surface(ds.surface).with_aspect(ds.aspect),
                true,
            );
            key = append_hash(key, &texture.uuid());
            depth_stencil_layout = Some(layout);
            FramebufferAttachment {
                texture,
                subresource,
                load_op: ds.load_op,
                store_op: ds.store_op,
                stencil_load_op: ds.stencil_load_op,
                stencil_store_op: ds.stencil_store_op,
                clear_value: ds.clear_value(),
            }
        });
        key = append_hash(key, &pass.name);

        let render_area = info.render_area.unwrap_or_else(|| {
            let (handle, mip) = match info.color_attachments.first() {
                Some(color) => (color.handle, color.surface.mip),
                None => info
                    .depth_stencil_attachment
                    .as_ref()
                    .map(|ds| (ds.handle, ds.surface.mip))
                    .unwrap_or_default(),
            };
            vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.render_targets[handle.index()].info.mip_extent(mip),
            }
        });

        let framebuffer = framebuffers.get_or_create(key, self.generation, || {
            backend.create_framebuffer(&FramebufferCreateInfo {
                name: &pass.name,
                color_attachments,
                depth_stencil_attachment,
                render_area,
            })
        })?;

        Ok(Some(RenderPassState {
            framebuffer,
            begin_info: RenderPassBeginInfo {
                color_layouts,
                depth_stencil_layout,
                render_area,
                secondary_streams: pass.secondary_stream_count > 0,
            },
            draws_to_presentable,
        }))
    }

    fn create_render_passes(&mut self, backend: &B, framebuffers: &mut FramebufferCache<B>) -> Result<()> {
        for index in 0..self.passes.len() {
            let state = self.render_pass_state(&self.passes[index], backend, framebuffers)?;
            self.passes[index].render_pass = state;
        }
        Ok(())
    }

    /// The first batch and every batch that draws to a presentable texture start a new primary stream.
    fn assign_streams(&mut self) {
        let mut stream = 0;
        for index in 0..self.batches.len() {
            let presentable = self.batches[index].passes.iter().any(|&pass| {
                self.passes[pass]
                    .render_pass
                    .as_ref()
                    .map_or(false, |render_pass| render_pass.draws_to_presentable)
            });
            if index > 0 && presentable {
                stream += 1;
            }
            self.batches[index].stream_index = stream;
        }
    }

    // Usages of all passes of a batch are merged per surface first. A surface then gets a barrier into the merged usage
    // if that differs from its current usage or writes it again.
    fn synthesize_barriers(&mut self) {
        for batch_index in 0..self.batches.len() {
            let mut textures = BatchUsages::default();
            let mut buffers = BatchUsages::default();
            let mut acceleration_structures = BatchUsages::default();
            for &pass_index in &self.batches[batch_index].passes {
                let pass = &self.passes[pass_index];
                for dep in &pass.texture_deps {
                    for surface in dep.subresource.surfaces() {
                        textures.add((dep.handle, surface), dep.usage);
                    }
                }
                for dep in &pass.buffer_deps {
                    buffers.add(dep.handle, dep.usage);
                }
                for dep in &pass.acceleration_structure_deps {
                    acceleration_structures.add(dep.handle, dep.usage);
                }
            }

            let batch = &mut self.batches[batch_index];
            for ((handle, surface), usage) in textures.order {
                let state = &mut self.render_targets[handle.index()];
                let index = surface.index(state.info.layer_count, state.info.ty.face_count());
                let current = state.surface_usages[index];
                if !needs_barrier(current, usage) {
                    continue;
                }
                trace!("Batch {batch_index}: `{}` surface {surface:?} {current:?} -> {usage:?}", state.info.name);
                batch.texture_transitions.push(TextureTransition {
                    handle,
                    surface,
                    aspect: state.info.aspect(),
                    before: current,
                    after: usage,
                });
                state.surface_usages[index] = usage;
            }
            for (handle, usage) in buffers.order {
                let state = &mut self.buffers[handle.index()];
                if needs_barrier(state.usage, usage) {
                    batch.buffer_transitions.push(BufferTransition {
                        handle,
                        before: state.usage,
                        after: usage,
                    });
                    state.usage = usage;
                }
            }
            for (handle, usage) in acceleration_structures.order {
                let state = &mut self.acceleration_structures[handle.index()];
                if needs_barrier(state.usage, usage) {
                    batch.acceleration_structure_transitions.push(AccelerationStructureTransition {
                        handle,
                        before: state.usage,
                        after: usage,
                    });
                    state.usage = usage;
                }
            }
        }
    }

    /// Hand the textures this graph checked out back to the render target cache. Releasing twice is a no-op.
    pub(crate) fn release_render_targets(&mut self, pool: &mut RenderTargetCache<B>) {
        for state in self.render_targets.iter_mut().rev() {
            if let (Some(key), Some(texture)) = (state.pool_key.take(), &state.texture) {
                pool.release(key, texture.clone());
            }
        }
    }

    /// Generation this graph was compiled in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn passes(&self) -> &[BakedPass<B>] {
        &self.passes
    }

    /// Index of the first pass called `name`.
    pub fn find_pass(&self, name: &str) -> Option<usize> {
        self.passes.iter().position(|pass| pass.name == name)
    }

    /// Names of the passes in `batch`, in recording order.
    pub fn batch_pass_names(&self, batch: usize) -> Vec<&str> {
        self.batches[batch]
            .passes
            .iter()
            .map(|&pass| self.passes[pass].name.as_str())
            .collect()
    }

    /// Number of primary command streams this graph records.
    pub fn stream_count(&self) -> usize {
        self.batches.last().map_or(0, |batch| batch.stream_index + 1)
    }

    /// The texture a render target was realized to. `None` if no pass uses it.
    pub fn render_target_texture(&self, handle: RenderTargetHandle) -> Option<&B::Texture> {
        self.check_generation(handle.generation());
        self.render_targets[handle.index()].texture.as_ref()
    }

    /// Usage of a surface after the last batch that touches it.
    pub fn final_surface_usage(&self, handle: RenderTargetHandle, surface: TextureSurface) -> TextureUsage {
        self.check_generation(handle.generation());
        let state = &self.render_targets[handle.index()];
        state.surface_usages[surface.index(state.info.layer_count, state.info.ty.face_count())]
    }

    /// Usage of an imported buffer after the last batch that touches it.
    pub fn final_buffer_usage(&self, handle: BufferHandle) -> BufferUsage {
        self.check_generation(handle.generation());
        self.buffers[handle.index()].usage
    }

    /// Usage of an acceleration structure after the last batch that touches it.
    pub fn final_acceleration_structure_usage(&self, handle: AccelerationStructureHandle) -> AccelerationStructureUsage {
        self.check_generation(handle.generation());
        self.acceleration_structures[handle.index()].usage
    }

    /// Pass dependency graph. An edge `a -> b` means `b` must run after `a`.
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependencies
    }

    pub(crate) fn check_generation(&self, generation: u64) {
        assert_eq!(
            generation, self.generation,
            "stale handle from generation {generation} used in graph generation {}",
            self.generation
        );
    }
}
