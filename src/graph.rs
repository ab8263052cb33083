//! The effect graph: live passes keyed by id, channel wiring, and the main
//! pass designation.
//!
//! Passes are stored in a `BTreeMap` so iteration order is deterministic
//! (ascending id), which doubles as the frame renderer's pass order. Channels
//! hold plain optional ids instead of references; deleting a pass sweeps
//! every remaining channel so a dangling reference is never observable.

use std::collections::BTreeMap;

use crate::gpu::target::PassTarget;

/// Every pass exposes four optional input channels (`channel0-3`).
pub const CHANNEL_COUNT: usize = 4;

/// Stable integer handle for a pass, assigned by the caller.
pub type PassId = u32;

/// Texture minification/magnification behavior for a channel.
///
/// Mirrors the original tool's `GL_LINEAR_MIPMAP_LINEAR` / `GL_LINEAR` /
/// `GL_NEAREST` choices. Trilinear regenerates the source's mip chain on
/// every bind; the other two sample mip level 0 only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    MipmapTrilinear,
    Bilinear,
    Nearest,
}

/// Texture addressing outside the unit square.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapMode {
    #[default]
    Repeat,
    ClampToEdge,
}

/// One input slot of a pass.
///
/// `source` may name a pass that does not exist yet (or no longer exists by
/// the time it is consumed externally); such a reference resolves to "no
/// texture" at bind time. After a delete sweep it is guaranteed never to
/// name a removed pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelSettings {
    pub source: Option<PassId>,
    pub filter: FilterMode,
    pub wrap: WrapMode,
}

/// One render stage: its compiled pipeline, ping-pong output target, input
/// channels, and recompile bookkeeping.
pub(crate) struct Pass {
    pub channels: [ChannelSettings; CHANNEL_COUNT],
    /// Fragment source last known to compile; the rollback target when a
    /// recompile attempt fails.
    pub fallback_source: String,
    /// Render counter fed to the `frame` uniform; reset by every recompile.
    pub frame: i32,
    pub target: PassTarget,
    pub pipeline: wgpu::RenderPipeline,
    pub uniform_buffer: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    /// True for the main pass, whose pipeline targets the screen format.
    pub renders_to_screen: bool,
}

/// Clears every channel reference to `removed`. Factored out of the delete
/// path so the sweep itself is unit-testable without GPU resources.
pub(crate) fn scrub_references(channels: &mut [ChannelSettings; CHANNEL_COUNT], removed: PassId) {
    for channel in channels.iter_mut() {
        if channel.source == Some(removed) {
            channel.source = None;
        }
    }
}

/// Id-indexed arena of live passes plus the main-image designation.
pub(crate) struct EffectGraph {
    passes: BTreeMap<PassId, Pass>,
    /// Set when the first pass is ever created and never reassigned, even if
    /// that pass is later deleted. A dead main disables screen rendering
    /// entirely; the shell is expected to forbid deleting the main page.
    main: Option<PassId>,
}

impl EffectGraph {
    pub fn new() -> Self {
        Self {
            passes: BTreeMap::new(),
            main: None,
        }
    }

    pub fn contains(&self, id: PassId) -> bool {
        self.passes.contains_key(&id)
    }

    /// Inserts a freshly built pass. The first insertion ever claims the
    /// main designation.
    pub fn insert(&mut self, id: PassId, pass: Pass) {
        debug_assert!(!self.passes.contains_key(&id));
        if self.main.is_none() {
            self.main = Some(id);
        }
        self.passes.insert(id, pass);
    }

    /// Removes a pass and sweeps all remaining channels clean of references
    /// to it. Returns the removed pass so the caller controls when its GPU
    /// resources drop.
    pub fn remove(&mut self, id: PassId) -> Option<Pass> {
        let removed = self.passes.remove(&id)?;
        for pass in self.passes.values_mut() {
            scrub_references(&mut pass.channels, id);
        }
        Some(removed)
    }

    pub fn pass(&self, id: PassId) -> Option<&Pass> {
        self.passes.get(&id)
    }

    pub fn pass_mut(&mut self, id: PassId) -> Option<&mut Pass> {
        self.passes.get_mut(&id)
    }

    /// The main-image designation. May name a deleted pass (the preserved
    /// design gap); check liveness with [`EffectGraph::pass`].
    pub fn main_pass(&self) -> Option<PassId> {
        self.main
    }

    /// Live pass ids in render order (ascending).
    pub fn ids(&self) -> Vec<PassId> {
        self.passes.keys().copied().collect()
    }

    /// Resolves a channel to the live pass it samples, if any.
    pub fn live_source(&self, settings: &ChannelSettings) -> Option<&Pass> {
        settings.source.and_then(|id| self.passes.get(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_clears_only_matching_references() {
        let mut channels = [ChannelSettings::default(); CHANNEL_COUNT];
        channels[0].source = Some(3);
        channels[1].source = Some(7);
        channels[3].source = Some(3);
        scrub_references(&mut channels, 3);
        assert_eq!(channels[0].source, None);
        assert_eq!(channels[1].source, Some(7));
        assert_eq!(channels[2].source, None);
        assert_eq!(channels[3].source, None);
    }

    #[test]
    fn channel_defaults_match_contract() {
        let settings = ChannelSettings::default();
        assert_eq!(settings.source, None);
        assert_eq!(settings.filter, FilterMode::MipmapTrilinear);
        assert_eq!(settings.wrap, WrapMode::Repeat);
    }
}
