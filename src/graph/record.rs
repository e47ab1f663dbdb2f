//! Recording a compiled graph into command streams.
//!
//! Batches are recorded in order. Before each batch its barriers are resolved against the realized resources and
//! issued as a single pipeline barrier. Each pass then runs inside its render pass, if it has one. Passes that split their
//! work over secondary streams are recorded up front, in parallel when the `rayon` feature is enabled, and executed
//! from the primary stream in declaration order.

use anyhow::Result;
use ash::vk;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::backend::{Backend, CommandStream, CommandStreamInfo, CommandStreamLevel};
use crate::graph::barrier::{AccelerationStructureBarrier, BufferBarrier, TextureBarrier};
use crate::graph::compile::{BakeContext, BakedGraph, Batch};
use crate::graph::handle::{AccelerationStructureHandle, BufferHandle, RenderTargetHandle};
use crate::graph::resource::TextureSubresource;
use crate::graph::usage::{
    acceleration_structure_stage_access, buffer_stage_access, texture_layout, texture_stage_access, TextureUsage,
};

/// Handed to pass callbacks. Resolves the pass' declared dependencies to concrete backend objects and gives access to
/// the command stream the pass records into.
pub struct PassContext<'a, B: Backend> {
    graph: &'a BakedGraph<B>,
    stream: &'a mut B::CommandStream,
    pass_index: usize,
    secondary_index: u32,
    secondary_count: u32,
}

/// A resolved buffer dependency.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct BufferView<'a, B: Backend> {
    pub buffer: &'a B::Buffer,
    pub offset: u64,
    pub range: u64,
}

impl<'a, B: Backend> Clone for BufferView<'a, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, B: Backend> Copy for BufferView<'a, B> {}

impl<'a, B: Backend> PassContext<'a, B> {
    /// The command stream this pass records into.
    pub fn command_stream(&mut self) -> &mut B::CommandStream {
        self.stream
    }

    pub fn pass_name(&self) -> &str {
        &self.graph.passes[self.pass_index].name
    }

    /// Index of the batch this pass runs in.
    pub fn batch_index(&self) -> usize {
        self.graph.passes[self.pass_index].batch
    }

    /// Index of the secondary stream being recorded. Always zero for passes recorded into a primary stream.
    pub fn secondary_index(&self) -> u32 {
        self.secondary_index
    }

    /// Number of secondary streams the pass requested, zero if it records into a primary stream.
    pub fn secondary_count(&self) -> u32 {
        self.secondary_count
    }

    fn check_texture_dependency(&self, handle: RenderTargetHandle) {
        self.graph.check_generation(handle.generation());
        let pass = &self.graph.passes[self.pass_index];
        assert!(
            pass.texture_deps.iter().any(|dep| dep.handle == handle),
            "pass `{}` accesses render target `{}` without declaring a dependency on it",
            pass.name,
            self.graph.render_targets[handle.index()].info.name
        );
    }

    /// The texture behind a render target handle.
    pub fn texture(&self, handle: RenderTargetHandle) -> &B::Texture {
        self.check_texture_dependency(handle);
        self.graph.texture_of(handle)
    }

    /// The texture behind a render target handle, together with the usage `subresource` is in while this pass runs.
    /// Zero counts in `subresource` mean "all".
    pub fn render_target_state(
        &self,
        handle: RenderTargetHandle,
        subresource: TextureSubresource,
    ) -> (&B::Texture, TextureUsage) {
        self.check_texture_dependency(handle);
        let subresource = subresource.fixup(&self.graph.render_targets[handle.index()].info);
        let usage = self.graph.current_usage(self.batch_index(), handle, &subresource);
        (self.graph.texture_of(handle), usage)
    }

    /// Image layout of `subresource` while this pass runs.
    pub fn texture_layout(&self, handle: RenderTargetHandle, subresource: TextureSubresource) -> vk::ImageLayout {
        let (_, usage) = self.render_target_state(handle, subresource);
        let info = &self.graph.render_targets[handle.index()].info;
        let first_mip = subresource.fixup(info).first_mip;
        texture_layout(usage, first_mip, info.mip_count, !info.aspect().is_empty())
    }

    /// The buffer range behind a buffer handle.
    pub fn buffer(&self, handle: BufferHandle) -> BufferView<'_, B> {
        self.graph.check_generation(handle.generation());
        let pass = &self.graph.passes[self.pass_index];
        let state = &self.graph.buffers[handle.index()];
        assert!(
            pass.buffer_deps.iter().any(|dep| dep.handle == handle),
            "pass `{}` accesses buffer `{}` without declaring a dependency on it",
            pass.name,
            state.name
        );
        BufferView {
            buffer: &state.buffer,
            offset: state.offset,
            range: state.range,
        }
    }

    /// The acceleration structure behind a handle.
    pub fn acceleration_structure(&self, handle: AccelerationStructureHandle) -> &B::AccelerationStructure {
        self.graph.check_generation(handle.generation());
        let pass = &self.graph.passes[self.pass_index];
        let state = &self.graph.acceleration_structures[handle.index()];
        assert!(
            pass.acceleration_structure_deps.iter().any(|dep| dep.handle == handle),
            "pass `{}` accesses acceleration structure `{}` without declaring a dependency on it",
            pass.name,
            state.name
        );
        &state.acceleration_structure
    }
}

#[cfg(feature = "debug-markers")]
fn annotate_pass<B: Backend>(stream: &mut B::CommandStream, name: &str) {
    stream.begin_label(name);
}

#[cfg(not(feature = "debug-markers"))]
fn annotate_pass<B: Backend>(_: &mut B::CommandStream, _: &str) {}

#[cfg(feature = "debug-markers")]
fn end_annotation<B: Backend>(stream: &mut B::CommandStream) {
    stream.end_label();
}

#[cfg(not(feature = "debug-markers"))]
fn end_annotation<B: Backend>(_: &mut B::CommandStream) {}

fn source_stage(stage: vk::PipelineStageFlags2) -> vk::PipelineStageFlags2 {
    if stage.is_empty() {
        vk::PipelineStageFlags2::TOP_OF_PIPE
    } else {
        stage
    }
}

// Grow the last barrier by `barrier` if possible, then keep folding the tail into its predecessor. Surfaces arrive mip
// by mip, layer by layer, face by face, so this rebuilds whole ranges.
fn push_coalesced<'a, B: Backend>(barriers: &mut Vec<TextureBarrier<'a, B>>, barrier: TextureBarrier<'a, B>) {
    let merged = match barriers.last_mut() {
        Some(last) => last.try_merge(&barrier),
        None => false,
    };
    if !merged {
        barriers.push(barrier);
        return;
    }
    while barriers.len() >= 2 {
        let len = barriers.len();
        let (head, tail) = barriers.split_at_mut(len - 1);
        if head[head.len() - 1].try_merge(&tail[0]) {
            barriers.pop();
        } else {
            break;
        }
    }
}

fn texture_barriers<'a, B: Backend>(graph: &'a BakedGraph<B>, batch: &Batch) -> Vec<TextureBarrier<'a, B>> {
    let mut barriers = Vec::with_capacity(batch.texture_transitions.len());
    for transition in &batch.texture_transitions {
        let info = &graph.render_targets[transition.handle.index()].info;
        let depth_stencil = !info.aspect().is_empty();
        let mip = transition.surface.mip;
        let (src_stage, src_access) = texture_stage_access(transition.before, true, mip, info.mip_count, depth_stencil);
        let (dst_stage, dst_access) = texture_stage_access(transition.after, false, mip, info.mip_count, depth_stencil);
        let barrier = TextureBarrier {
            texture: graph.texture_of(transition.handle),
            subresource: TextureSubresource::surface(transition.surface).with_aspect(transition.aspect),
            faces_per_layer: info.ty.face_count(),
            before: transition.before,
            after: transition.after,
            old_layout: texture_layout(transition.before, mip, info.mip_count, depth_stencil),
            new_layout: texture_layout(transition.after, mip, info.mip_count, depth_stencil),
            src_stage,
            src_access,
            dst_stage,
            dst_access,
        };
        push_coalesced(&mut barriers, barrier);
    }
    barriers
}

fn buffer_barriers<'a, B: Backend>(graph: &'a BakedGraph<B>, batch: &Batch) -> Vec<BufferBarrier<'a, B>> {
    batch
        .buffer_transitions
        .iter()
        .map(|transition| {
            let state = &graph.buffers[transition.handle.index()];
            let (src_stage, src_access) = buffer_stage_access(transition.before);
            let (dst_stage, dst_access) = buffer_stage_access(transition.after);
            BufferBarrier {
                buffer: &state.buffer,
                offset: state.offset,
                range: state.range,
                before: transition.before,
                after: transition.after,
                src_stage: source_stage(src_stage),
                src_access,
                dst_stage,
                dst_access,
            }
        })
        .collect()
}

fn acceleration_structure_barriers<'a, B: Backend>(
    graph: &'a BakedGraph<B>,
    batch: &Batch,
) -> Vec<AccelerationStructureBarrier<'a, B>> {
    batch
        .acceleration_structure_transitions
        .iter()
        .map(|transition| {
            let state = &graph.acceleration_structures[transition.handle.index()];
            let (src_stage, src_access) = acceleration_structure_stage_access(transition.before);
            let (dst_stage, dst_access) = acceleration_structure_stage_access(transition.after);
            AccelerationStructureBarrier {
                acceleration_structure: &state.acceleration_structure,
                before: transition.before,
                after: transition.after,
                src_stage: source_stage(src_stage),
                src_access,
                dst_stage,
                dst_access,
            }
        })
        .collect()
}

fn record_barriers<B: Backend>(graph: &BakedGraph<B>, batch: &Batch, stream: &mut B::CommandStream) {
    if batch.has_no_barriers() {
        return;
    }
    let textures = texture_barriers(graph, batch);
    let buffers = buffer_barriers(graph, batch);
    let acceleration_structures = acceleration_structure_barriers(graph, batch);
    stream.pipeline_barrier(&textures, &buffers, &acceleration_structures);
}

struct SecondaryWork<B: Backend> {
    pass_index: usize,
    secondary_index: u32,
    stream: B::CommandStream,
}

/// Record every secondary stream of the frame. Returns the finished streams grouped per pass, in secondary index order.
fn record_secondaries<B: Backend>(
    backend: &B,
    bake: &BakeContext<'_, B>,
    parallel: bool,
) -> Result<Vec<Vec<B::CommandStream>>> {
    let graph = &bake.graph;
    let mut items = Vec::new();
    for (pass_index, pass) in graph.passes.iter().enumerate() {
        for secondary_index in 0..pass.secondary_stream_count {
            let stream = backend.new_command_stream(&CommandStreamInfo {
                name: &pass.name,
                level: CommandStreamLevel::Secondary,
                framebuffer: pass.render_pass.as_ref().map(|render_pass| &render_pass.framebuffer),
            })?;
            items.push(SecondaryWork::<B> {
                pass_index,
                secondary_index,
                stream,
            });
        }
    }

    let record = |item: &mut SecondaryWork<B>| -> Result<()> {
        if let Some(work) = &bake.work[item.pass_index].work {
            let mut ctx = PassContext {
                graph,
                stream: &mut item.stream,
                pass_index: item.pass_index,
                secondary_index: item.secondary_index,
                secondary_count: graph.passes[item.pass_index].secondary_stream_count,
            };
            work.execute(&mut ctx)?;
        }
        item.stream.finish()
    };

    #[cfg(feature = "rayon")]
    {
        if parallel {
            items.par_iter_mut().try_for_each(|item| record(item))?;
        } else {
            items.iter_mut().try_for_each(|item| record(item))?;
        }
    }
    #[cfg(not(feature = "rayon"))]
    {
        let _ = parallel;
        items.iter_mut().try_for_each(|item| record(item))?;
    }

    let mut per_pass = (0..graph.passes.len()).map(|_| Vec::new()).collect::<Vec<_>>();
    for item in items {
        per_pass[item.pass_index].push(item.stream);
    }
    Ok(per_pass)
}

/// Record a compiled graph. Returns the finished primary streams in submission order. If `timestamps` is set, the first
/// stream writes the start query and the last stream the end query.
pub(crate) fn record<B: Backend>(
    backend: &B,
    bake: &BakeContext<'_, B>,
    timestamps: Option<(&B::TimestampQuery, &B::TimestampQuery)>,
    parallel: bool,
) -> Result<Vec<B::CommandStream>> {
    let graph = &bake.graph;
    let mut secondaries = record_secondaries(backend, bake, parallel)?;
    let mut streams: Vec<B::CommandStream> = Vec::with_capacity(graph.stream_count());

    for (batch_index, batch) in graph.batches.iter().enumerate() {
        if streams.len() <= batch.stream_index {
            let mut stream = backend.new_command_stream(&CommandStreamInfo {
                name: &format!("batch {batch_index}"),
                level: CommandStreamLevel::Primary,
                framebuffer: None,
            })?;
            if let (true, Some((start, _))) = (streams.is_empty(), timestamps) {
                stream.write_timestamp(start);
            }
            streams.push(stream);
        }
        let stream = &mut streams[batch.stream_index];

        record_barriers(graph, batch, stream);

        for &pass_index in &batch.passes {
            let pass = &graph.passes[pass_index];
            annotate_pass::<B>(stream, &pass.name);
            if let Some(render_pass) = &pass.render_pass {
                stream.begin_render_pass(&render_pass.framebuffer, &render_pass.begin_info);
            }

            if pass.secondary_stream_count > 0 {
                stream.execute_secondary(std::mem::take(&mut secondaries[pass_index]));
            } else if let Some(work) = &bake.work[pass_index].work {
                let mut ctx = PassContext {
                    graph,
                    stream: &mut *stream,
                    pass_index,
                    secondary_index: 0,
                    secondary_count: 0,
                };
                work.execute(&mut ctx)?;
            }

            if pass.render_pass.is_some() {
                stream.end_render_pass();
            }
            end_annotation::<B>(stream);
        }
    }

    if let (Some((_, end)), Some(last)) = (timestamps, streams.last_mut()) {
        last.write_timestamp(end);
    }
    for stream in &mut streams {
        stream.finish()?;
    }
    Ok(streams)
}
