use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use framegraph::prelude::*;

use framework::{Command, MockBackend, MockFence};

mod framework;

/// Leave the pass name, and the secondary index if any, in the command trace.
fn mark(ctx: &mut PassContext<'_, MockBackend>) -> Result<()> {
    let text = if ctx.secondary_count() > 0 {
        format!("{}/{}", ctx.pass_name(), ctx.secondary_index())
    } else {
        ctx.pass_name().to_owned()
    };
    ctx.command_stream().marker(text);
    Ok(())
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("framegraph-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// ColorA is rendered by `P1` and sampled by `P2`.
fn describe_color_a<'cb>(graph: &RenderGraph<'cb, MockBackend>) -> RenderGraphDescription<'cb, MockBackend> {
    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    {
        let mut p1 = description.new_graphics_pass("P1");
        p1.set_framebuffer_info(FramebufferInfo::new().color(ColorAttachmentInfo::new(color).clear([0.0, 0.0, 0.0, 1.0])));
        p1.new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
        p1.set_work(mark);
    }
    description
        .new_graphics_pass("P2")
        .new_texture_dependency(color, TextureUsage::SAMPLED_FRAGMENT)
        .set_work(mark);
    description
}

fn without_labels(commands: Vec<Command>) -> Vec<Command> {
    commands
        .into_iter()
        .filter(|command| !matches!(command, Command::BeginLabel(_) | Command::EndLabel))
        .collect()
}

#[test]
pub fn passes_are_recorded_in_batch_order() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    graph.compile_new_graph(describe_color_a(&graph))?;
    graph.record_and_submit(None)?;

    let submission = context.backend.last_submission();
    assert_eq!(submission.streams.len(), 1);
    assert!(submission.streams.iter().all(|stream| stream.level == CommandStreamLevel::Primary));
    assert_eq!(submission.markers(), ["P1", "P2"]);
    Ok(())
}

#[test]
pub fn graphics_passes_run_inside_their_render_pass() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    graph.compile_new_graph(describe_color_a(&graph))?;
    graph.record_and_submit(None)?;

    let commands = without_labels(context.backend.last_submission().commands());
    assert!(matches!(commands[0], Command::Barrier(_)));
    match &commands[1] {
        Command::BeginRenderPass {
            pass,
            info,
            ..
        } => {
            assert_eq!(pass, "P1");
            assert_eq!(info.color_layouts, [vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL]);
            assert_eq!(info.depth_stencil_layout, None);
            assert_eq!(info.render_area.extent, vk::Extent2D { width: 256, height: 256 });
            assert!(!info.secondary_streams);
        }
        other => panic!("expected the render pass of P1, got {other:?}"),
    }
    assert!(matches!(&commands[2], Command::Marker(text) if text == "P1"));
    assert!(matches!(commands[3], Command::EndRenderPass));
    // P2 has no framebuffer, so it records straight into the stream after its barrier.
    assert!(matches!(commands[4], Command::Barrier(_)));
    assert!(matches!(&commands[5], Command::Marker(text) if text == "P2"));
    assert_eq!(commands.len(), 6);
    Ok(())
}

#[cfg(feature = "debug-markers")]
#[test]
pub fn passes_are_labelled() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    graph.compile_new_graph(describe_color_a(&graph))?;
    graph.record_and_submit(None)?;

    let labels = context
        .backend
        .last_submission()
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            Command::BeginLabel(name) => Some(name),
            Command::EndLabel => Some(String::from("end")),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(labels, ["P1", "end", "P2", "end"]);
    Ok(())
}

fn parallel_draw(parallel: bool) -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfigBuilder::new().parallel_recording(parallel).build());

    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    {
        let mut draw = description.new_graphics_pass("draw");
        draw.set_framebuffer_info(FramebufferInfo::new().color(ColorAttachmentInfo::new(color)));
        draw.new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
        draw.set_work_parallel(8, mark);
    }
    graph.compile_new_graph(description)?;
    graph.record_and_submit(None)?;

    let submission = context.backend.last_submission();
    let expected = (0..8).map(|index| format!("draw/{index}")).collect::<Vec<_>>();
    assert_eq!(submission.markers(), expected, "secondary streams are executed in declaration order");

    let primary = &submission.streams[0];
    let framebuffer = primary
        .commands
        .iter()
        .find_map(|command| match command {
            Command::BeginRenderPass {
                framebuffer,
                info,
                ..
            } => {
                assert!(info.secondary_streams);
                Some(*framebuffer)
            }
            _ => None,
        })
        .expect("draw runs inside a render pass");
    let secondaries = primary
        .commands
        .iter()
        .find_map(|command| match command {
            Command::ExecuteSecondary(streams) => Some(streams.clone()),
            _ => None,
        })
        .expect("secondary streams are executed");
    assert_eq!(secondaries.len(), 8);
    for stream in &secondaries {
        assert_eq!(stream.level, CommandStreamLevel::Secondary);
        assert_eq!(stream.framebuffer, Some(framebuffer));
        assert!(stream.finished);
    }
    Ok(())
}

#[test]
pub fn secondary_streams_keep_their_order() -> Result<()> {
    parallel_draw(true)
}

#[test]
pub fn secondary_streams_can_be_recorded_serially() -> Result<()> {
    parallel_draw(false)
}

#[test]
pub fn callback_error_aborts_submission() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    description
        .new_graphics_pass("broken")
        .new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE)
        .set_work(|_| Err(anyhow::anyhow!("pipeline not ready")));
    graph.compile_new_graph(description)?;

    let err = graph.record_and_submit(None).expect_err("the callback fails");
    assert_eq!(err.to_string(), "pipeline not ready");
    assert_eq!(context.backend.submission_count(), 0);
    Ok(())
}

#[test]
pub fn secondary_callback_error_aborts_submission() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    description
        .new_graphics_pass("draw")
        .new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE)
        .set_work_parallel(4, |ctx| {
            if ctx.secondary_index() == 2 {
                anyhow::bail!("out of descriptors");
            }
            Ok(())
        });
    graph.compile_new_graph(description)?;

    assert!(graph.record_and_submit(None).is_err());
    assert_eq!(context.backend.submission_count(), 0);
    Ok(())
}

#[test]
#[should_panic(expected = "called twice")]
pub fn second_submission_panics() {
    let context = framework::make_context().unwrap();
    let mut graph = context.graph(GraphConfig::default());
    graph.compile_new_graph(describe_color_a(&graph)).unwrap();
    graph.record_and_submit(None).unwrap();
    let _ = graph.record_and_submit(None);
}

#[test]
pub fn each_generation_is_submitted_once() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());
    for _ in 0..2 {
        graph.compile_new_graph(describe_color_a(&graph))?;
        graph.record_and_submit(None)?;
        graph.reset()?;
    }
    assert_eq!(context.backend.submission_count(), 2);
    Ok(())
}

#[test]
pub fn recording_without_graph_fails() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    let err = graph.record_and_submit(None).expect_err("nothing was compiled");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoGraph)));
    let err = graph.dump_dependency_dot(std::env::temp_dir()).expect_err("nothing was compiled");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoGraph)));

    // Reset does not need a compiled graph either.
    graph.reset()?;
    assert_eq!(graph.generation(), 1);
    Ok(())
}

#[test]
pub fn fence_is_forwarded_to_the_backend() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    graph.compile_new_graph(describe_color_a(&graph))?;
    graph.record_and_submit(Some(&MockFence(7)))?;
    assert_eq!(context.backend.last_submission().fence, Some(MockFence(7)));
    Ok(())
}

#[test]
pub fn pass_context_resolves_dependencies() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());
    let buffer = context.backend.external_buffer(1024);
    let tlas = context.backend.external_acceleration_structure();
    let tlas_uuid = tlas.uuid;

    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    let lights = description.import_buffer("lights", buffer, 256, 512, BufferUsage::UNIFORM_FRAGMENT);
    let tlas = description.import_acceleration_structure("tlas", tlas, AccelerationStructureUsage::FRAGMENT_READ);
    description
        .new_graphics_pass("P1")
        .new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    description
        .new_graphics_pass("P2")
        .new_texture_dependency(color, TextureUsage::SAMPLED_FRAGMENT)
        .new_buffer_dependency(lights, BufferUsage::UNIFORM_FRAGMENT)
        .new_acceleration_structure_dependency(tlas, AccelerationStructureUsage::FRAGMENT_READ)
        .set_work(move |ctx| {
            let texture = ctx.texture(color).info.name.clone();
            let layout = ctx.texture_layout(color, TextureSubresource::default());
            let (_, usage) = ctx.render_target_state(color, TextureSubresource::default());
            let view = ctx.buffer(lights);
            let range = (view.offset, view.range);
            let acceleration_structure = ctx.acceleration_structure(tlas).uuid;
            let batch = ctx.batch_index();

            let stream = ctx.command_stream();
            stream.marker(texture);
            stream.marker(format!("{layout:?}"));
            stream.marker(format!("{usage:?}"));
            stream.marker(format!("{range:?}"));
            stream.marker(acceleration_structure.to_string());
            stream.marker(batch.to_string());
            Ok(())
        });
    graph.compile_new_graph(description)?;
    graph.record_and_submit(None)?;

    assert_eq!(
        context.backend.last_submission().markers(),
        [
            String::from("ColorA"),
            format!("{:?}", vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            format!("{:?}", TextureUsage::SAMPLED_FRAGMENT),
            format!("{:?}", (256u64, 512u64)),
            tlas_uuid.to_string(),
            String::from("1"),
        ]
    );
    Ok(())
}

#[test]
#[should_panic(expected = "without declaring a dependency")]
pub fn undeclared_access_panics() {
    let context = framework::make_context().unwrap();
    let mut graph = context.graph(GraphConfig::default());

    let mut description = graph.new_description();
    let color = description.new_render_target(framework::color_target("ColorA"));
    let other = description.new_render_target(framework::color_target("ColorB"));
    description
        .new_graphics_pass("P1")
        .new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
    description
        .new_graphics_pass("P2")
        .new_texture_dependency(other, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE)
        .set_work(move |ctx| {
            ctx.texture(color);
            Ok(())
        });
    graph.compile_new_graph(description).unwrap();
    let _ = graph.record_and_submit(None);
}

#[test]
pub fn statistics_report_the_oldest_frame() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfigBuilder::new().statistics(true).build());
    assert_eq!(graph.get_statistics(), Statistics::default());

    for frame in 0..=MAX_FRAMES_IN_FLIGHT {
        assert!(graph.get_statistics().gpu_time.is_none(), "frame {frame} has no results yet");
        graph.compile_new_graph(describe_color_a(&graph))?;
        graph.record_and_submit(None)?;
        graph.reset()?;
    }

    let statistics = graph.get_statistics();
    assert_eq!(statistics.gpu_time, Some(Duration::from_nanos(1000)));
    assert!(statistics.cpu_start_time.is_some());

    let timestamps = context.backend.submissions()[0]
        .commands()
        .into_iter()
        .filter(|command| matches!(command, Command::Timestamp(_)))
        .count();
    assert_eq!(timestamps, 2, "one timestamp at the start and one at the end of the frame");
    Ok(())
}

#[test]
pub fn statistics_are_empty_when_disabled() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());

    for _ in 0..=MAX_FRAMES_IN_FLIGHT {
        graph.compile_new_graph(describe_color_a(&graph))?;
        graph.record_and_submit(None)?;
        graph.reset()?;
    }
    assert_eq!(graph.get_statistics(), Statistics::default());
    assert!(context
        .backend
        .submissions()
        .iter()
        .flat_map(|submission| submission.commands())
        .all(|command| !matches!(command, Command::Timestamp(_))));
    Ok(())
}

#[test]
pub fn dependency_dump_describes_batches_and_barriers() -> Result<()> {
    let context = framework::make_context()?;
    let mut graph = context.graph(GraphConfig::default());
    let dir = scratch_dir("dump");

    graph.compile_new_graph(describe_color_a(&graph))?;
    let path = graph.dump_dependency_dot(&dir)?;
    assert_eq!(path.file_name().and_then(|name| name.to_str()), Some("rgraph_00000.dot"));

    let dot = std::fs::read_to_string(&path)?;
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("label = \"P1\""));
    assert!(dot.contains("label = \"P2\""));
    assert!(dot.contains("label = \"ColorA\""), "the edge is labelled with the shared resource");
    assert!(dot.contains("subgraph batch_0 { rank = same; 0 }"));
    assert!(dot.contains("subgraph batch_1 { rank = same; 1 }"));
    assert!(dot.contains("FRAMEBUFFER_ATTACHMENT_WRITE -> SAMPLED_FRAGMENT"));
    assert_eq!(graph.baked().expect("graph was compiled").dot()?, dot);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
pub fn configured_dump_is_written_every_frame() -> Result<()> {
    let context = framework::make_context()?;
    let dir = scratch_dir("auto-dump");
    let mut graph = context.graph(GraphConfigBuilder::new().dump_dependency_dot(&dir).build());

    for _ in 0..2 {
        graph.compile_new_graph(describe_color_a(&graph))?;
        graph.reset()?;
    }
    assert!(dir.join("rgraph_00000.dot").is_file());
    assert!(dir.join("rgraph_00001.dot").is_file());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
pub fn failed_dump_does_not_abort_the_frame() -> Result<()> {
    let context = framework::make_context()?;
    let scratch = scratch_dir("blocked-dump");
    std::fs::create_dir_all(&scratch)?;
    let blocker = scratch.join("not-a-directory");
    std::fs::write(&blocker, "")?;
    let dir = blocker.join("dumps");

    let mut graph = context.graph(GraphConfigBuilder::new().dump_dependency_dot(&dir).build());
    graph.compile_new_graph(describe_color_a(&graph))?;
    graph.record_and_submit(None)?;
    assert_eq!(context.backend.submission_count(), 1);

    let err = graph.dump_dependency_dot(&dir).expect_err("the parent is a file");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DotDumpFailed(_))));

    std::fs::remove_dir_all(&scratch)?;
    Ok(())
}
