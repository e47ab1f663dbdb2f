use anyhow::Result;

use framegraph::prelude::*;

mod framework;

#[test]
pub fn first_use_transitions_from_undefined() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    description
        .new_graphics_pass("P1")
        .new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    graph.compile_new_graph(description)?;

    let baked = graph.baked().expect("graph was compiled");
    let transitions = baked.batches()[0].texture_transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].before, TextureUsage::empty());
    assert_eq!(transitions[0].after, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    Ok(())
}

#[test]
pub fn usages_within_a_batch_are_merged() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    description
        .new_graphics_pass("P1")
        .new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    description
        .new_graphics_pass("P2")
        .new_texture_dependency(color, TextureUsage::SAMPLED_FRAGMENT);
    description
        .new_non_graphics_pass("P3")
        .new_texture_dependency(color, TextureUsage::SAMPLED_COMPUTE);
    graph.compile_new_graph(description)?;

    let baked = graph.baked().expect("graph was compiled");
    assert_eq!(baked.batch_count(), 2);
    let transitions = baked.batches()[1].texture_transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].before, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    assert_eq!(transitions[0].after, TextureUsage::SAMPLED_FRAGMENT | TextureUsage::SAMPLED_COMPUTE);

    graph.record_and_submit(None)?;
    let barriers = context.backend.last_submission().texture_barriers();
    assert_eq!(barriers[1].new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    Ok(())
}

#[test]
pub fn reads_sharing_a_batch_are_merged_into_one_transition() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());
    let image = context.backend.external_texture(framework::texture_info(
        "history",
        vk::Format::R8G8B8A8_UNORM,
        TextureUsage::SAMPLED_FRAGMENT | TextureUsage::IMAGE_COMPUTE_READ,
    ));

    let mut description = graph.new_description();
    let history = description.import_render_target(image, TextureUsage::SAMPLED_FRAGMENT);
    // The first reader needs no transition on its own, the second one does.
    description
        .new_graphics_pass("resolve")
        .new_texture_dependency(history, TextureUsage::SAMPLED_FRAGMENT);
    description
        .new_non_graphics_pass("reproject")
        .new_texture_dependency(history, TextureUsage::IMAGE_COMPUTE_READ);
    graph.compile_new_graph(description)?;

    let merged = TextureUsage::SAMPLED_FRAGMENT | TextureUsage::IMAGE_COMPUTE_READ;
    let baked = graph.baked().expect("graph was compiled");
    assert_eq!(baked.batch_count(), 1);
    let transitions = baked.batches()[0].texture_transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].before, TextureUsage::SAMPLED_FRAGMENT);
    assert_eq!(transitions[0].after, merged);
    assert_eq!(baked.final_surface_usage(history, TextureSurface::default()), merged);

    graph.record_and_submit(None)?;
    let barriers = context.backend.last_submission().texture_barriers();
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(barriers[0].new_layout, vk::ImageLayout::GENERAL);
    Ok(())
}

#[test]
pub fn buffer_reads_sharing_a_batch_are_merged_into_one_transition() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());
    let buffer = context.backend.external_buffer(256);

    let mut description = graph.new_description();
    let camera = description.import_buffer("camera", buffer, 0, vk::WHOLE_SIZE, BufferUsage::UNIFORM_FRAGMENT);
    description
        .new_graphics_pass("shade")
        .new_buffer_dependency(camera, BufferUsage::UNIFORM_FRAGMENT);
    description
        .new_non_graphics_pass("cull")
        .new_buffer_dependency(camera, BufferUsage::UNIFORM_COMPUTE);
    graph.compile_new_graph(description)?;

    let merged = BufferUsage::UNIFORM_FRAGMENT | BufferUsage::UNIFORM_COMPUTE;
    let baked = graph.baked().expect("graph was compiled");
    assert_eq!(baked.batch_count(), 1);
    let transitions = baked.batches()[0].buffer_transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].before, BufferUsage::UNIFORM_FRAGMENT);
    assert_eq!(transitions[0].after, merged);
    assert_eq!(baked.final_buffer_usage(camera), merged);
    Ok(())
}

#[test]
pub fn repeated_write_gets_a_barrier() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let target = description.new_render_target(framework::color_target("accumulation"));
    description
        .new_non_graphics_pass("first")
        .new_texture_dependency(target, TextureUsage::IMAGE_COMPUTE_WRITE);
    description
        .new_non_graphics_pass("second")
        .new_texture_dependency(target, TextureUsage::IMAGE_COMPUTE_WRITE);
    graph.compile_new_graph(description)?;

    let baked = graph.baked().expect("graph was compiled");
    let transitions = baked.batches()[1].texture_transitions();
    assert_eq!(transitions.len(), 1, "the second write waits for the first");
    assert_eq!(transitions[0].before, TextureUsage::IMAGE_COMPUTE_WRITE);
    assert_eq!(transitions[0].after, TextureUsage::IMAGE_COMPUTE_WRITE);

    graph.record_and_submit(None)?;
    let barriers = context.backend.last_submission().texture_barriers();
    assert_eq!(barriers[1].old_layout, vk::ImageLayout::GENERAL);
    assert_eq!(barriers[1].new_layout, vk::ImageLayout::GENERAL);
    Ok(())
}

#[test]
pub fn buffer_barriers_follow_usage_changes() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());
    let buffer = context.backend.external_buffer(4096);
    let uuid = buffer.uuid;

    let mut description = graph.new_description();
    let particles =
        description.import_buffer("particles", buffer, 0, vk::WHOLE_SIZE, BufferUsage::TRANSFER_DESTINATION);
    description
        .new_non_graphics_pass("simulate")
        .new_buffer_dependency(particles, BufferUsage::STORAGE_COMPUTE_WRITE);
    description
        .new_graphics_pass("draw")
        .new_buffer_dependency(particles, BufferUsage::VERTEX);
    graph.compile_new_graph(description)?;

    let baked = graph.baked().expect("graph was compiled");
    assert_eq!(baked.batch_count(), 2);
    let first = baked.batches()[0].buffer_transitions();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].before, BufferUsage::TRANSFER_DESTINATION);
    assert_eq!(first[0].after, BufferUsage::STORAGE_COMPUTE_WRITE);
    let second = baked.batches()[1].buffer_transitions();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].after, BufferUsage::VERTEX);
    assert_eq!(baked.final_buffer_usage(particles), BufferUsage::VERTEX);

    graph.record_and_submit(None)?;
    let barriers = context.backend.last_submission().barriers();
    assert_eq!(barriers.len(), 2);
    let recorded = &barriers[0].buffers[0];
    assert_eq!(recorded.uuid, uuid);
    assert_eq!((recorded.offset, recorded.range), (0, 4096));
    Ok(())
}

#[test]
pub fn acceleration_structure_barriers_follow_usage_changes() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());
    let tlas = context.backend.external_acceleration_structure();

    let mut description = graph.new_description();
    let tlas = description.import_acceleration_structure("tlas", tlas, AccelerationStructureUsage::BUILD);
    description
        .new_non_graphics_pass("trace")
        .new_acceleration_structure_dependency(tlas, AccelerationStructureUsage::TRACE_RAYS_READ);
    description
        .new_non_graphics_pass("cull")
        .new_acceleration_structure_dependency(tlas, AccelerationStructureUsage::COMPUTE_READ);
    graph.compile_new_graph(description)?;

    let baked = graph.baked().expect("graph was compiled");
    assert_eq!(baked.batch_count(), 1, "readers of an acceleration structure run together");
    let transitions = baked.batches()[0].acceleration_structure_transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].before, AccelerationStructureUsage::BUILD);
    assert_eq!(
        transitions[0].after,
        AccelerationStructureUsage::TRACE_RAYS_READ | AccelerationStructureUsage::COMPUTE_READ
    );
    Ok(())
}

#[test]
pub fn mip_generation_barriers_are_coalesced() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let pyramid = description.new_render_target(framework::color_target("pyramid").mip_count(4));
    description
        .new_non_graphics_pass("upload")
        .new_texture_dependency(pyramid, TextureUsage::TRANSFER_DESTINATION);
    description
        .new_non_graphics_pass("downsample")
        .new_texture_dependency(pyramid, TextureUsage::GENERATE_MIPMAPS);
    graph.compile_new_graph(description)?;
    assert_eq!(graph.baked().expect("graph was compiled").batches()[1].texture_transitions().len(), 4);

    graph.record_and_submit(None)?;
    let barriers = context.backend.last_submission().barriers();
    assert_eq!(barriers.len(), 2);

    // All four mips go from undefined to transfer destination in one range.
    let upload = &barriers[0].textures;
    assert_eq!(upload.len(), 1);
    assert_eq!(upload[0].subresource.mip_range(), 0..4);
    assert_eq!(upload[0].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

    // Every level but the last becomes a transfer source.
    let downsample = &barriers[1].textures;
    assert_eq!(downsample.len(), 2);
    assert_eq!(downsample[0].subresource.mip_range(), 0..3);
    assert_eq!(downsample[0].new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(downsample[1].subresource.mip_range(), 3..4);
    assert_eq!(downsample[1].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    Ok(())
}

#[test]
pub fn cube_faces_are_tracked_separately() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let cube = description.new_render_target(framework::color_target("environment").ty(TextureType::Cube));
    description
        .new_non_graphics_pass("filter")
        .new_texture_dependency(cube, TextureUsage::IMAGE_COMPUTE_WRITE);
    description.new_graphics_pass("face 2").new_texture_dependency_subresource(
        cube,
        TextureUsage::SAMPLED_FRAGMENT,
        TextureSubresource::surface(TextureSurface::new(0, 0, 2)),
    );
    graph.compile_new_graph(description)?;

    let baked = graph.baked().expect("graph was compiled");
    assert_eq!(baked.batches()[0].texture_transitions().len(), 6);
    assert_eq!(baked.batches()[1].texture_transitions().len(), 1);
    assert_eq!(
        baked.final_surface_usage(cube, TextureSurface::new(0, 0, 2)),
        TextureUsage::SAMPLED_FRAGMENT
    );
    assert_eq!(
        baked.final_surface_usage(cube, TextureSurface::new(0, 0, 3)),
        TextureUsage::IMAGE_COMPUTE_WRITE
    );

    graph.record_and_submit(None)?;
    let barriers = context.backend.last_submission().barriers();
    assert_eq!(barriers[0].textures.len(), 1, "all six faces share one barrier");
    assert_eq!(barriers[0].textures[0].subresource.face_range(), 0..6);
    assert_eq!(barriers[1].textures[0].subresource.face_range(), 2..3);
    Ok(())
}

#[test]
pub fn depth_attachments_use_depth_layouts() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let depth = description.new_render_target(RenderTargetDescription::new("depth", 256, 256, vk::Format::D32_SFLOAT));
    {
        let mut prepass = description.new_graphics_pass("prepass");
        prepass.set_framebuffer_info(FramebufferInfo::new().depth_stencil(DepthStencilAttachmentInfo::new(depth).clear(1.0, 0)));
        prepass.new_texture_dependency(depth, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    }
    description
        .new_graphics_pass("shade")
        .new_texture_dependency(depth, TextureUsage::SAMPLED_FRAGMENT);
    graph.compile_new_graph(description)?;
    graph.record_and_submit(None)?;

    let barriers = context.backend.last_submission().texture_barriers();
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[0].subresource.aspect, vk::ImageAspectFlags::DEPTH);
    assert_eq!(barriers[0].new_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    assert_eq!(barriers[1].new_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
    Ok(())
}
