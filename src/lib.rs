//! Effect-graph renderer for live-edited fragment shaders.
//!
//! The crate drives a small directed graph of render passes: one main-image
//! pass shown on screen plus auxiliary buffer passes whose outputs feed any
//! pass's four input channels, including their own (feedback). The shell
//! around it — editor widget, tab bar, file dialogs — talks to the renderer
//! only through plain shader strings and the discrete mutation calls below:
//!
//! ```text
//!   shell (tabs / editor)                 display timer (~60 Hz)
//!          │ create_pass / delete_pass            │
//!          │ recompile / set_channel_*            ▼
//!          └──────────▶ EffectRenderer ◀── render_tick()
//!                            │
//!              GpuState ── EffectGraph ── wgpu device/surface
//! ```
//!
//! All calls are synchronous and must come from the one thread owning the
//! renderer. Shader compilation happens on the CPU via naga before any GPU
//! object is touched, so a failed edit reports a diagnostic log and rolls
//! back to the last working source without ever leaving a pass unrenderable.

use std::time::Instant;

use anyhow::{anyhow, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;
use tracing::{debug, warn};

mod compile;
mod gpu;
mod graph;
mod input;

pub use compile::DEFAULT_FRAGMENT_SOURCE;
pub use graph::{ChannelSettings, FilterMode, PassId, WrapMode, CHANNEL_COUNT};

use gpu::context::RenderContext;
use gpu::state::GpuState;
use graph::EffectGraph;
use input::PointerState;

/// Relative GPU selection priority, forwarded to adapter selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Start-up configuration for the renderer.
#[derive(Clone, Copy, Debug)]
pub struct RendererConfig {
    /// Initial screen (main pass) size in physical pixels.
    pub surface_size: (u32, u32),
    /// Fixed resolution of every off-screen pass target.
    pub working_resolution: (u32, u32),
    pub gpu_power: GpuPowerPreference,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1920, 1080),
            working_resolution: (1024, 768),
            gpu_power: GpuPowerPreference::default(),
        }
    }
}

/// Typed errors for graph mutation calls.
///
/// The original treats the first three as assertion failures; here the
/// caller gets them back as values. `Internal` covers the unrecoverable
/// class (a fallback source failing to recompile, device loss) that is a
/// bug rather than user error.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("pass {0} already exists")]
    PassAlreadyExists(PassId),
    #[error("no live pass with id {0}")]
    UnknownPass(PassId),
    #[error("channel index {0} out of range (expected 0..{CHANNEL_COUNT})")]
    ChannelOutOfRange(usize),
    #[error("internal renderer error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// The long-lived rendering context: owns every GPU resource, the pass
/// graph, and the pointer/time state feeding uniforms.
///
/// Field order matters for teardown: the graph (pass pipelines and targets)
/// drops before the shared layouts, vertex stage, and device inside `state`.
pub struct EffectRenderer {
    graph: EffectGraph,
    pointer: PointerState,
    started: Instant,
    last_log: String,
    state: GpuState,
}

impl EffectRenderer {
    /// Builds a renderer presenting to the window behind `target`.
    pub fn new<T>(target: &T, config: RendererConfig) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = RenderContext::new(target, config.surface_size, config.gpu_power)?;
        Self::with_context(context, config)
    }

    /// Builds a renderer whose screen is an internal texture. Used by the
    /// integration tests; also handy for thumbnail/preview generation.
    pub fn headless(config: RendererConfig) -> Result<Self> {
        let context = RenderContext::headless(config.surface_size, config.gpu_power)?;
        Self::with_context(context, config)
    }

    fn with_context(context: RenderContext, config: RendererConfig) -> Result<Self> {
        let state = GpuState::new(context, config.working_resolution)?;
        Ok(Self {
            graph: EffectGraph::new(),
            pointer: PointerState::new(),
            started: Instant::now(),
            last_log: String::new(),
            state,
        })
    }

    /// Seed fragment source for new passes and fresh editor buffers. The
    /// uniform declarations in it are the contract user shaders build on.
    pub fn default_fragment_source() -> &'static str {
        DEFAULT_FRAGMENT_SOURCE
    }

    /// Creates a pass under a caller-assigned id, compiled from the default
    /// fragment source. The first pass ever created becomes the main image.
    pub fn create_pass(&mut self, id: PassId) -> Result<(), EffectError> {
        if self.graph.contains(id) {
            return Err(EffectError::PassAlreadyExists(id));
        }
        let module = compile::compile_fragment(self.state.device(), DEFAULT_FRAGMENT_SOURCE)
            .map_err(|failure| {
                EffectError::Internal(anyhow!(
                    "built-in fragment source failed to compile: {}",
                    failure.log
                ))
            })?;
        let to_screen = self.graph.main_pass().is_none();
        let pass = self.state.build_pass(&module, DEFAULT_FRAGMENT_SOURCE, to_screen);
        self.graph.insert(id, pass);
        debug!(pass = id, main = to_screen, "created pass");
        Ok(())
    }

    /// Deletes a pass, scrubbing every other pass's channels of references
    /// to it before its GPU resources are released.
    pub fn delete_pass(&mut self, id: PassId) -> Result<(), EffectError> {
        match self.graph.remove(id) {
            Some(_pass) => {
                debug!(pass = id, "deleted pass");
                Ok(())
            }
            None => Err(EffectError::UnknownPass(id)),
        }
    }

    /// Recompiles a pass from `source`, returning the compiler log (empty on
    /// success).
    ///
    /// On failure the pass is re-linked from its previous known-good source,
    /// so its on-screen behavior is unchanged; on success `source` becomes
    /// the new fallback. Either way the pass's frame counter restarts — a
    /// recompile is a fresh run of that pass.
    pub fn recompile(&mut self, id: PassId, source: &str) -> Result<String, EffectError> {
        let device = self.state.device().clone();
        let pass = self
            .graph
            .pass_mut(id)
            .ok_or(EffectError::UnknownPass(id))?;

        let log = match compile::compile_fragment(&device, source) {
            Ok(module) => {
                pass.pipeline = self.state.link_pipeline(&module, pass.renders_to_screen);
                pass.fallback_source = source.to_owned();
                debug!(pass = id, "recompiled pass");
                String::new()
            }
            Err(failure) => {
                // The stored fallback compiled before, so a failure here is
                // an internal bug, not a user error.
                let module = compile::compile_fragment(&device, &pass.fallback_source)
                    .map_err(|fallback_failure| {
                        EffectError::Internal(anyhow!(
                            "fallback source failed to recompile: {}",
                            fallback_failure.log
                        ))
                    })?;
                pass.pipeline = self.state.link_pipeline(&module, pass.renders_to_screen);
                warn!(pass = id, "shader failed to compile; keeping previous source");
                failure.log
            }
        };

        pass.frame = 0;
        self.last_log = log.clone();
        Ok(log)
    }

    /// Points a channel at another pass's output, or clears it. A source id
    /// that is not currently live is allowed and binds as "no texture" until
    /// the pass exists.
    pub fn set_channel_source(
        &mut self,
        id: PassId,
        channel: usize,
        source: Option<PassId>,
    ) -> Result<(), EffectError> {
        self.channel_mut(id, channel)?.source = source;
        Ok(())
    }

    pub fn set_channel_filter(
        &mut self,
        id: PassId,
        channel: usize,
        filter: FilterMode,
    ) -> Result<(), EffectError> {
        self.channel_mut(id, channel)?.filter = filter;
        Ok(())
    }

    pub fn set_channel_wrap(
        &mut self,
        id: PassId,
        channel: usize,
        wrap: WrapMode,
    ) -> Result<(), EffectError> {
        self.channel_mut(id, channel)?.wrap = wrap;
        Ok(())
    }

    /// Primary button press at top-left-origin window coordinates.
    pub fn pointer_pressed(&mut self, x: f32, y: f32) {
        let height = self.state.screen_size().1 as f32;
        self.pointer.pressed(x, y, height);
    }

    /// Pointer motion; updates the position components whether or not the
    /// button is held.
    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        let height = self.state.screen_size().1 as f32;
        self.pointer.moved(x, y, height);
    }

    /// Primary button release.
    pub fn pointer_released(&mut self, x: f32, y: f32) {
        let height = self.state.screen_size().1 as f32;
        self.pointer.released(x, y, height);
    }

    /// Resizes the screen target. Off-screen pass targets keep the working
    /// resolution.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.state.resize((width, height));
    }

    /// Runs one display tick. A no-op while no live main pass exists.
    pub fn render_tick(&mut self) -> Result<(), wgpu::SurfaceError> {
        let time = self.started.elapsed().as_secs_f32();
        self.state
            .render_tick(&mut self.graph, self.pointer.vector(), time)
    }

    /// The main-image designation. Stays set (and stale) if that pass is
    /// deleted; the shell is expected to prevent that.
    pub fn main_pass(&self) -> Option<PassId> {
        self.graph.main_pass()
    }

    /// Live pass ids in render order.
    pub fn pass_ids(&self) -> Vec<PassId> {
        self.graph.ids()
    }

    pub fn is_alive(&self, id: PassId) -> bool {
        self.graph.contains(id)
    }

    /// The pass's render counter: the value its next draw will see as the
    /// `frame` uniform.
    pub fn frame_counter(&self, id: PassId) -> Result<i32, EffectError> {
        Ok(self.pass(id)?.frame)
    }

    /// The pass's current (last successfully compiled) fragment source.
    pub fn fragment_source(&self, id: PassId) -> Result<&str, EffectError> {
        Ok(&self.pass(id)?.fallback_source)
    }

    pub fn channel_source(&self, id: PassId, channel: usize) -> Result<Option<PassId>, EffectError> {
        Ok(self.channel(id, channel)?.source)
    }

    pub fn channel_filter(&self, id: PassId, channel: usize) -> Result<FilterMode, EffectError> {
        Ok(self.channel(id, channel)?.filter)
    }

    pub fn channel_wrap(&self, id: PassId, channel: usize) -> Result<WrapMode, EffectError> {
        Ok(self.channel(id, channel)?.wrap)
    }

    /// The pass's last completed off-screen render, e.g. for a thumbnail
    /// preview. For the main pass this is its (never-drawn) buffer texture,
    /// not the screen.
    pub fn pass_texture(&self, id: PassId) -> Result<&wgpu::Texture, EffectError> {
        Ok(&self.pass(id)?.target.front().texture)
    }

    /// Diagnostic log from the most recent `recompile` call.
    pub fn last_log(&self) -> &str {
        &self.last_log
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.state.screen_size()
    }

    pub fn working_resolution(&self) -> (u32, u32) {
        self.state.working_resolution()
    }

    fn pass(&self, id: PassId) -> Result<&graph::Pass, EffectError> {
        self.graph.pass(id).ok_or(EffectError::UnknownPass(id))
    }

    fn channel(&self, id: PassId, channel: usize) -> Result<&ChannelSettings, EffectError> {
        if channel >= CHANNEL_COUNT {
            return Err(EffectError::ChannelOutOfRange(channel));
        }
        Ok(&self.pass(id)?.channels[channel])
    }

    fn channel_mut(
        &mut self,
        id: PassId,
        channel: usize,
    ) -> Result<&mut ChannelSettings, EffectError> {
        if channel >= CHANNEL_COUNT {
            return Err(EffectError::ChannelOutOfRange(channel));
        }
        let pass = self
            .graph
            .pass_mut(id)
            .ok_or(EffectError::UnknownPass(id))?;
        Ok(&mut pass.channels[channel])
    }
}
