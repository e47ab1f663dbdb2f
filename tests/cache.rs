use anyhow::Result;

use framegraph::prelude::*;

use framework::MockBackend;

mod framework;

/// Compile and submit a frame in which `P1` renders into `ColorA`.
fn draw_frame(graph: &mut RenderGraph<'_, MockBackend>) -> Result<RenderTargetHandle> {
    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    {
        let mut pass = description.new_graphics_pass("P1");
        pass.set_framebuffer_info(FramebufferInfo::new().color(ColorAttachmentInfo::new(color).clear([0.0; 4])));
        pass.new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    }
    graph.compile_new_graph(description)?;
    graph.record_and_submit(None)?;
    Ok(color)
}

fn reset_until(graph: &mut RenderGraph<'_, MockBackend>, generation: u64) -> Result<()> {
    while graph.generation() < generation {
        graph.reset()?;
    }
    Ok(())
}

#[test]
pub fn identical_descriptions_share_a_handle() -> Result<()> {
    let context = framework::make_context()?;
    let graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let first = description.new_render_target(framework::color_target("ColorA"));
    let second = description.new_render_target(framework::color_target("ColorA"));
    let other = description.new_render_target(framework::color_target("ColorB"));
    assert_eq!(first, second);
    assert_ne!(first, other);
    assert_eq!(description.render_target_count(), 2);
    Ok(())
}

#[test]
pub fn render_targets_are_reused_across_frames() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let handle = draw_frame(&mut graph)?;
    let uuid = graph
        .baked()
        .and_then(|baked| baked.render_target_texture(handle))
        .map(|texture| texture.uuid)
        .expect("ColorA is realized");
    graph.reset()?;

    for _ in 0..3 {
        let handle = draw_frame(&mut graph)?;
        let texture = graph.baked().and_then(|baked| baked.render_target_texture(handle));
        assert_eq!(texture.map(|texture| texture.uuid), Some(uuid));
        graph.reset()?;
    }
    assert_eq!(context.backend.textures_created(), 1);
    assert_eq!(context.cache.render_targets()?.texture_count(), 1);
    Ok(())
}

#[test]
pub fn realized_texture_supports_all_declared_usages() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    description
        .new_graphics_pass("P1")
        .new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    description
        .new_non_graphics_pass("P2")
        .new_texture_dependency(color, TextureUsage::SAMPLED_COMPUTE);
    graph.compile_new_graph(description)?;

    let texture = graph
        .baked()
        .and_then(|baked| baked.render_target_texture(color))
        .expect("ColorA is realized");
    assert_eq!(texture.info.usage, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE | TextureUsage::SAMPLED_COMPUTE);
    Ok(())
}

#[test]
pub fn unused_render_targets_are_not_allocated() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let unused = description.new_render_target(framework::color_target("unused"));
    graph.compile_new_graph(description)?;

    assert!(graph.baked().and_then(|baked| baked.render_target_texture(unused)).is_none());
    assert_eq!(context.backend.textures_created(), 0);
    Ok(())
}

#[test]
pub fn handles_are_invalid_after_reset() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let old = draw_frame(&mut graph)?;
    assert!(graph.is_valid(old));
    graph.reset()?;
    assert!(!graph.is_valid(old));

    let new = draw_frame(&mut graph)?;
    assert_ne!(old, new);
    assert!(graph.is_valid(new));
    assert!(!graph.is_valid(RenderTargetHandle::INVALID));
    Ok(())
}

#[test]
pub fn graphs_sharing_a_cache_get_distinct_textures() -> Result<()> {
    let context = framework::make_context()?;
    let mut left = context.graph(GraphConfig::default());
    let mut right = context.graph(GraphConfig::default());

    let left_handle = draw_frame(&mut left)?;
    let right_handle = draw_frame(&mut right)?;
    let left_uuid = left.baked().and_then(|baked| baked.render_target_texture(left_handle)).map(|t| t.uuid);
    let right_uuid = right.baked().and_then(|baked| baked.render_target_texture(right_handle)).map(|t| t.uuid);
    assert!(left_uuid.is_some() && right_uuid.is_some());
    assert_ne!(left_uuid, right_uuid);
    assert_eq!(context.backend.textures_created(), 2);
    assert_eq!(context.cache.render_targets()?.len(), 1, "both textures live in one pool");
    Ok(())
}

#[test]
pub fn graphs_sharing_a_cache_keep_their_textures_across_resets() -> Result<()> {
    let context = framework::make_context()?;
    let mut left = context.graph(GraphConfig::default());
    let mut right = context.graph(GraphConfig::default());

    let left_handle = draw_frame(&mut left)?;
    draw_frame(&mut right)?;
    right.reset()?;
    // `left` still holds its texture, so `right` may only get its own one back.
    let right_handle = draw_frame(&mut right)?;

    let left_uuid = left.baked().and_then(|baked| baked.render_target_texture(left_handle)).map(|t| t.uuid);
    let right_uuid = right.baked().and_then(|baked| baked.render_target_texture(right_handle)).map(|t| t.uuid);
    assert!(left_uuid.is_some() && right_uuid.is_some());
    assert_ne!(left_uuid, right_uuid);
    assert_eq!(context.backend.textures_created(), 2);

    left.reset()?;
    right.reset()?;
    assert_eq!(context.cache.render_targets()?.texture_count(), 2);
    Ok(())
}

#[test]
pub fn failed_compilation_returns_acquired_textures() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());
    context
        .backend
        .fail_framebuffer_creation
        .store(true, std::sync::atomic::Ordering::SeqCst);
    assert!(draw_frame(&mut graph).is_err());
    graph.reset()?;

    context
        .backend
        .fail_framebuffer_creation
        .store(false, std::sync::atomic::Ordering::SeqCst);
    draw_frame(&mut graph)?;
    assert_eq!(context.backend.textures_created(), 1);
    assert_eq!(context.cache.render_targets()?.texture_count(), 1);
    Ok(())
}

#[test]
pub fn framebuffers_are_reused_across_frames() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    for _ in 0..3 {
        draw_frame(&mut graph)?;
        graph.reset()?;
    }
    assert_eq!(context.backend.framebuffers_created(), 1);
    assert_eq!(context.cache.framebuffers()?.len(), 1);

    let ids = context
        .backend
        .submissions()
        .iter()
        .flat_map(|submission| submission.commands())
        .filter_map(|command| match command {
            framework::Command::BeginRenderPass {
                framebuffer, ..
            } => Some(framebuffer),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|&id| id == ids[0]));
    Ok(())
}

#[test]
pub fn untouched_entries_are_evicted_after_cleanup_interval() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    draw_frame(&mut graph)?;
    reset_until(&mut graph, PERIODIC_CLEANUP_EVERY)?;
    assert_eq!(context.cache.render_targets()?.len(), 1);
    assert_eq!(context.cache.framebuffers()?.len(), 1);

    // Generation 60 is the first cleanup that sees ColorA untouched for 60 frames.
    graph.reset()?;
    assert!(context.cache.render_targets()?.is_empty());
    assert!(context.cache.framebuffers()?.is_empty());

    draw_frame(&mut graph)?;
    assert_eq!(context.backend.textures_created(), 2);
    assert_eq!(context.backend.framebuffers_created(), 2);
    Ok(())
}

#[test]
pub fn entries_touched_within_interval_survive_cleanup() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    draw_frame(&mut graph)?;
    reset_until(&mut graph, PERIODIC_CLEANUP_EVERY - 1)?;
    draw_frame(&mut graph)?;
    reset_until(&mut graph, PERIODIC_CLEANUP_EVERY + 1)?;

    assert_eq!(context.cache.render_targets()?.len(), 1);
    assert_eq!(context.cache.framebuffers()?.len(), 1);
    assert_eq!(context.backend.textures_created(), 1);
    Ok(())
}

#[test]
pub fn cleanup_interval_is_configurable() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfigBuilder::new().cleanup_every(4).build());

    draw_frame(&mut graph)?;
    reset_until(&mut graph, 4)?;
    assert_eq!(context.cache.render_targets()?.len(), 1);
    graph.reset()?;
    assert!(context.cache.render_targets()?.is_empty());
    Ok(())
}

#[test]
pub fn texture_creation_failure_fails_compilation() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());
    context
        .backend
        .fail_texture_creation
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    description
        .new_graphics_pass("P1")
        .new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    let err = graph.compile_new_graph(description).expect_err("texture creation fails");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::VkError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
    ));
    assert!(graph.baked().is_none());
    Ok(())
}
