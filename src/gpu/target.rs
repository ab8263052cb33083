//! Ping-pong render targets for effect passes.
//!
//! wgpu refuses to sample a texture that is simultaneously bound as a color
//! attachment, so each pass owns a front/back texture pair: the back texture
//! receives this tick's draw while channels sample the front (the last
//! completed render). Swapping after each draw reproduces the original
//! feedback semantics — a self-referencing channel always sees the previous
//! tick, and cross-pass reads see whatever the source last finished.

use crate::gpu::context::TARGET_FORMAT;

/// One half of a ping-pong pair, with the views the renderer needs: the full
/// mip chain for sampling, plus one view per level for mip regeneration
/// (level 0 doubles as the draw attachment).
pub(crate) struct TargetTexture {
    pub texture: wgpu::Texture,
    pub sampled_view: wgpu::TextureView,
    pub level_views: Vec<wgpu::TextureView>,
}

impl TargetTexture {
    fn new(device: &wgpu::Device, size: (u32, u32), mip_level_count: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("pass render target"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let sampled_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let level_views = (0..mip_level_count)
            .map(|level| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("pass target mip level"),
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        Self {
            texture,
            sampled_view,
            level_views,
        }
    }

    pub fn attach_view(&self) -> &wgpu::TextureView {
        &self.level_views[0]
    }
}

/// A pass's off-screen color target at the working resolution.
pub(crate) struct PassTarget {
    textures: [TargetTexture; 2],
    front: usize,
    size: (u32, u32),
}

impl PassTarget {
    pub fn new(device: &wgpu::Device, size: (u32, u32)) -> Self {
        let size = (size.0.max(1), size.1.max(1));
        let mips = mip_level_count(size.0, size.1);
        Self {
            textures: [
                TargetTexture::new(device, size, mips),
                TargetTexture::new(device, size, mips),
            ],
            front: 0,
            size,
        }
    }

    /// The last completed render, the side channels sample.
    pub fn front(&self) -> &TargetTexture {
        &self.textures[self.front]
    }

    /// This tick's draw attachment.
    pub fn back(&self) -> &TargetTexture {
        &self.textures[1 - self.front]
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

/// Full mip chain length for a `width` x `height` texture.
pub(crate) fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_lengths() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(1024, 768), 11);
        assert_eq!(mip_level_count(1920, 1080), 11);
        assert_eq!(mip_level_count(1000, 1), 10);
    }
}
