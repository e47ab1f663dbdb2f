#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use framegraph::prelude::*;

/// A texture barrier as seen by the backend.
#[derive(Debug, Clone)]
pub struct RecordedTextureBarrier {
    pub texture: String,
    pub uuid: u64,
    pub subresource: TextureSubresource,
    pub before: TextureUsage,
    pub after: TextureUsage,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

#[derive(Debug, Clone)]
pub struct RecordedBufferBarrier {
    pub uuid: u64,
    pub offset: u64,
    pub range: u64,
    pub before: BufferUsage,
    pub after: BufferUsage,
}

#[derive(Debug, Clone)]
pub struct RecordedAccelerationStructureBarrier {
    pub uuid: u64,
    pub before: AccelerationStructureUsage,
    pub after: AccelerationStructureUsage,
}

/// One `pipeline_barrier` call.
#[derive(Debug, Clone, Default)]
pub struct RecordedBarrier {
    pub textures: Vec<RecordedTextureBarrier>,
    pub buffers: Vec<RecordedBufferBarrier>,
    pub acceleration_structures: Vec<RecordedAccelerationStructureBarrier>,
}

#[derive(Debug, Clone)]
pub enum Command {
    Barrier(RecordedBarrier),
    BeginRenderPass {
        pass: String,
        framebuffer: u64,
        info: RenderPassBeginInfo,
    },
    EndRenderPass,
    ExecuteSecondary(Vec<MockCommandStream>),
    Timestamp(u64),
    BeginLabel(String),
    EndLabel,
    /// Written by pass callbacks so tests can follow the recording order.
    Marker(String),
}

#[derive(Debug, Clone)]
pub struct MockTexture {
    pub info: TextureInfo,
    pub uuid: u64,
}

impl BackendObject for MockTexture {
    fn uuid(&self) -> u64 {
        self.uuid
    }
}

impl BackendTexture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

#[derive(Debug, Clone)]
pub struct MockBuffer {
    pub size: u64,
    pub uuid: u64,
}

impl BackendObject for MockBuffer {
    fn uuid(&self) -> u64 {
        self.uuid
    }
}

impl BackendBuffer for MockBuffer {
    fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug, Clone)]
pub struct MockAccelerationStructure {
    pub uuid: u64,
}

impl BackendObject for MockAccelerationStructure {
    fn uuid(&self) -> u64 {
        self.uuid
    }
}

#[derive(Debug, Clone)]
pub struct MockFramebuffer {
    pub id: u64,
    pub pass: String,
    /// Uuids of the attached textures, color attachments first.
    pub attachments: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockFence(pub u64);

#[derive(Debug)]
pub struct MockQuery {
    pub id: u64,
}

#[derive(Debug, Clone)]
pub struct MockCommandStream {
    pub name: String,
    pub level: CommandStreamLevel,
    pub framebuffer: Option<u64>,
    pub commands: Vec<Command>,
    pub finished: bool,
}

impl MockCommandStream {
    /// Leave a marker in the command trace.
    pub fn marker(&mut self, text: impl Into<String>) {
        self.push(Command::Marker(text.into()));
    }

    fn push(&mut self, command: Command) {
        assert!(!self.finished, "command recorded into finished stream `{}`", self.name);
        self.commands.push(command);
    }

    /// All commands of this stream, with executed secondary streams inlined.
    pub fn flatten(&self) -> Vec<Command> {
        let mut out = Vec::new();
        for command in &self.commands {
            match command {
                Command::ExecuteSecondary(streams) => {
                    out.push(Command::ExecuteSecondary(vec![]));
                    for stream in streams {
                        out.extend(stream.flatten());
                    }
                }
                other => out.push(other.clone()),
            }
        }
        out
    }
}

impl CommandStream<MockBackend> for MockCommandStream {
    fn pipeline_barrier(
        &mut self,
        textures: &[TextureBarrier<'_, MockBackend>],
        buffers: &[BufferBarrier<'_, MockBackend>],
        acceleration_structures: &[AccelerationStructureBarrier<'_, MockBackend>],
    ) {
        assert!(
            !(textures.is_empty() && buffers.is_empty() && acceleration_structures.is_empty()),
            "empty pipeline barrier"
        );
        self.push(Command::Barrier(RecordedBarrier {
            textures: textures
                .iter()
                .map(|barrier| RecordedTextureBarrier {
                    texture: barrier.texture.info.name.clone(),
                    uuid: barrier.texture.uuid,
                    subresource: barrier.subresource,
                    before: barrier.before,
                    after: barrier.after,
                    old_layout: barrier.old_layout,
                    new_layout: barrier.new_layout,
                })
                .collect(),
            buffers: buffers
                .iter()
                .map(|barrier| RecordedBufferBarrier {
                    uuid: barrier.buffer.uuid,
                    offset: barrier.offset,
                    range: barrier.range,
                    before: barrier.before,
                    after: barrier.after,
                })
                .collect(),
            acceleration_structures: acceleration_structures
                .iter()
                .map(|barrier| RecordedAccelerationStructureBarrier {
                    uuid: barrier.acceleration_structure.uuid,
                    before: barrier.before,
                    after: barrier.after,
                })
                .collect(),
        }));
    }

    fn begin_render_pass(&mut self, framebuffer: &MockFramebuffer, info: &RenderPassBeginInfo) {
        self.push(Command::BeginRenderPass {
            pass: framebuffer.pass.clone(),
            framebuffer: framebuffer.id,
            info: info.clone(),
        });
    }

    fn end_render_pass(&mut self) {
        self.push(Command::EndRenderPass);
    }

    fn execute_secondary(&mut self, streams: Vec<MockCommandStream>) {
        assert!(streams.iter().all(|stream| stream.finished), "executing unfinished secondary stream");
        self.push(Command::ExecuteSecondary(streams));
    }

    fn write_timestamp(&mut self, query: &MockQuery) {
        self.push(Command::Timestamp(query.id));
    }

    fn begin_label(&mut self, name: &str) {
        self.push(Command::BeginLabel(name.to_owned()));
    }

    fn end_label(&mut self) {
        self.push(Command::EndLabel);
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub streams: Vec<MockCommandStream>,
    pub fence: Option<MockFence>,
}

impl Submission {
    /// Every command of the submission in execution order.
    pub fn commands(&self) -> Vec<Command> {
        self.streams.iter().flat_map(|stream| stream.flatten()).collect()
    }

    pub fn markers(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::Marker(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn barriers(&self) -> Vec<RecordedBarrier> {
        self.commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::Barrier(barrier) => Some(barrier),
                _ => None,
            })
            .collect()
    }

    pub fn texture_barriers(&self) -> Vec<RecordedTextureBarrier> {
        self.barriers().into_iter().flat_map(|barrier| barrier.textures).collect()
    }
}

/// Headless backend that records everything the graph asks of it.
#[derive(Debug, Default)]
pub struct MockBackend {
    next_uuid: AtomicU64,
    textures_created: AtomicUsize,
    framebuffers_created: AtomicUsize,
    streams_created: AtomicUsize,
    pub fail_texture_creation: AtomicBool,
    pub fail_framebuffer_creation: AtomicBool,
    clock: AtomicU64,
    timestamps: Mutex<HashMap<u64, u64>>,
    submissions: Mutex<Vec<Submission>>,
}

impl MockBackend {
    fn next_uuid(&self) -> u64 {
        self.next_uuid.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// A texture owned by the application, for importing.
    pub fn external_texture(&self, info: TextureInfo) -> MockTexture {
        MockTexture {
            info,
            uuid: self.next_uuid(),
        }
    }

    pub fn external_buffer(&self, size: u64) -> MockBuffer {
        MockBuffer {
            size,
            uuid: self.next_uuid(),
        }
    }

    pub fn external_acceleration_structure(&self) -> MockAccelerationStructure {
        MockAccelerationStructure {
            uuid: self.next_uuid(),
        }
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created.load(Ordering::SeqCst)
    }

    pub fn framebuffers_created(&self) -> usize {
        self.framebuffers_created.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn last_submission(&self) -> Submission {
        self.submissions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("nothing was submitted")
    }
}

impl Backend for MockBackend {
    type Texture = MockTexture;
    type Buffer = MockBuffer;
    type AccelerationStructure = MockAccelerationStructure;
    type Framebuffer = MockFramebuffer;
    type CommandStream = MockCommandStream;
    type Fence = MockFence;
    type TimestampQuery = MockQuery;

    fn create_texture(&self, info: &TextureInfo) -> Result<MockTexture> {
        if self.fail_texture_creation.load(Ordering::SeqCst) {
            return Err(anyhow::Error::from(Error::VkError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)));
        }
        self.textures_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockTexture {
            info: info.clone(),
            uuid: self.next_uuid(),
        })
    }

    fn create_framebuffer(&self, info: &FramebufferCreateInfo<'_, Self>) -> Result<MockFramebuffer> {
        if self.fail_framebuffer_creation.load(Ordering::SeqCst) {
            return Err(anyhow::Error::from(Error::VkError(vk::Result::ERROR_OUT_OF_HOST_MEMORY)));
        }
        self.framebuffers_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockFramebuffer {
            id: self.next_uuid(),
            pass: info.name.to_owned(),
            attachments: info
                .color_attachments
                .iter()
                .chain(info.depth_stencil_attachment.iter())
                .map(|attachment| attachment.texture.uuid)
                .collect(),
        })
    }

    fn new_command_stream(&self, info: &CommandStreamInfo<'_, Self>) -> Result<MockCommandStream> {
        self.streams_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockCommandStream {
            name: info.name.to_owned(),
            level: info.level,
            framebuffer: info.framebuffer.map(|framebuffer| framebuffer.id),
            commands: vec![],
            finished: false,
        })
    }

    fn submit(&self, streams: Vec<MockCommandStream>, fence: Option<&MockFence>) -> Result<()> {
        assert!(streams.iter().all(|stream| stream.finished), "submitting unfinished stream");
        let submission = Submission {
            streams,
            fence: fence.copied(),
        };
        // The "GPU" runs the frame immediately, each timestamp 1 µs after the previous one.
        let mut timestamps = self.timestamps.lock().unwrap();
        for command in submission.commands() {
            if let Command::Timestamp(id) = command {
                let now = self.clock.fetch_add(1000, Ordering::SeqCst);
                timestamps.insert(id, now);
            }
        }
        self.submissions.lock().unwrap().push(submission);
        Ok(())
    }

    fn new_timestamp_query(&self) -> Result<MockQuery> {
        Ok(MockQuery {
            id: self.next_uuid(),
        })
    }

    fn read_timestamp(&self, query: &MockQuery) -> Result<Option<u64>> {
        Ok(self.timestamps.lock().unwrap().get(&query.id).copied())
    }
}

pub struct Context {
    pub backend: Arc<MockBackend>,
    pub cache: Arc<ResourceCache<MockBackend>>,
}

impl Context {
    pub fn graph<'cb>(&self, config: GraphConfig) -> RenderGraph<'cb, MockBackend> {
        RenderGraph::new(self.backend.clone(), self.cache.clone(), config)
    }
}

/// Creates a headless mock context ready for automated tests
pub fn make_context() -> Result<Context> {
    let _ = pretty_env_logger::try_init();
    Ok(Context {
        backend: Arc::new(MockBackend::default()),
        cache: Arc::new(ResourceCache::new()),
    })
}

pub fn color_target(name: &str) -> RenderTargetDescription {
    RenderTargetDescription::new(name, 256, 256, vk::Format::R8G8B8A8_UNORM)
}

/// Info of an application-owned 2D texture.
pub fn texture_info(name: &str, format: vk::Format, usage: TextureUsage) -> TextureInfo {
    RenderTargetDescription::new(name, 256, 256, format).to_texture_info(usage)
}
