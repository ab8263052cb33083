//! GPU orchestration for the effect graph.
//!
//! - `context` owns the wgpu instance/device/queue and the screen target
//!   (a real surface built from raw window handles, or an off-screen texture
//!   in headless mode) and knows how to reconfigure it on resize.
//! - `target` materialises the ping-pong render-target pair each pass draws
//!   into and samples from.
//! - `mipmap` rebuilds a target's mip chain for trilinear channels.
//! - `pipeline` holds the shared bind group layouts and vertex stage and
//!   builds one render pipeline per compiled fragment shader.
//! - `uniforms` mirrors the injected uniform block byte for byte.
//! - `state` glues everything together and drives the per-tick render order.

pub(crate) mod context;
pub(crate) mod mipmap;
pub(crate) mod pipeline;
pub(crate) mod state;
pub(crate) mod target;
pub(crate) mod uniforms;
