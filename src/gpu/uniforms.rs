//! The per-pass uniform block.

use bytemuck::{Pod, Zeroable};

/// Byte-for-byte mirror of the `PassParams` std140 block injected by
/// `compile.rs`: vec2 at offset 0, float at 8, int at 12, vec4 at 16.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct PassUniforms {
    resolution: [f32; 2],
    time: f32,
    frame: i32,
    pointer_state: [f32; 4],
}

impl PassUniforms {
    pub fn new(resolution: (u32, u32), time: f32, frame: i32, pointer_state: [f32; 4]) -> Self {
        Self {
            resolution: [resolution.0 as f32, resolution.1 as f32],
            time,
            frame,
            pointer_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_std140_layout() {
        assert_eq!(std::mem::size_of::<PassUniforms>(), 32);
    }
}
