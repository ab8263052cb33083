//! Per-tick rendering and pass resource construction.
//!
//! `GpuState` owns everything pass-independent: the device context, shared
//! pipeline layouts, the mip generator, and the placeholder resources bound
//! for unresolved channels. Pass-owned resources live in the graph and are
//! built/rebuilt through here.

use anyhow::Result;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::graph::{ChannelSettings, EffectGraph, FilterMode, Pass, PassId, WrapMode, CHANNEL_COUNT};

use super::context::{RenderContext, TARGET_FORMAT};
use super::mipmap::MipmapGenerator;
use super::pipeline::{build_pass_pipeline, PipelineShared};
use super::target::PassTarget;
use super::uniforms::PassUniforms;

pub(crate) struct GpuState {
    context: RenderContext,
    shared: PipelineShared,
    mipmaps: MipmapGenerator,
    placeholder_view: wgpu::TextureView,
    placeholder_sampler: wgpu::Sampler,
    working_resolution: (u32, u32),
}

impl GpuState {
    pub fn new(context: RenderContext, working_resolution: (u32, u32)) -> Result<Self> {
        let shared = PipelineShared::new(&context.device)?;
        let mipmaps = MipmapGenerator::new(&context.device, TARGET_FORMAT);

        // Opaque black, matching what an unbound GL sampler reads.
        let placeholder = context.device.create_texture_with_data(
            &context.queue,
            &wgpu::TextureDescriptor {
                label: Some("empty channel placeholder"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &[0, 0, 0, 255],
        );
        let placeholder_view = placeholder.create_view(&wgpu::TextureViewDescriptor::default());
        let placeholder_sampler = context
            .device
            .create_sampler(&wgpu::SamplerDescriptor::default());

        Ok(Self {
            context,
            shared,
            mipmaps,
            placeholder_view,
            placeholder_sampler,
            working_resolution: (working_resolution.0.max(1), working_resolution.1.max(1)),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.context.device
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.context.size()
    }

    pub fn working_resolution(&self) -> (u32, u32) {
        self.working_resolution
    }

    pub fn resize(&mut self, new_size: (u32, u32)) {
        self.context.resize(new_size);
    }

    /// Builds a complete pass around an already-compiled fragment module.
    pub fn build_pass(
        &self,
        fragment_module: &wgpu::ShaderModule,
        fallback_source: &str,
        to_screen: bool,
    ) -> Pass {
        let device = &self.context.device;
        let pipeline = self.link_pipeline(fragment_module, to_screen);
        let target = PassTarget::new(device, self.working_resolution);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pass uniform buffer"),
            size: std::mem::size_of::<PassUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass uniform bind group"),
            layout: &self.shared.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Pass {
            channels: [ChannelSettings::default(); CHANNEL_COUNT],
            fallback_source: fallback_source.to_owned(),
            frame: 0,
            target,
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            renders_to_screen: to_screen,
        }
    }

    /// Re-links a pass pipeline after a recompile.
    pub fn link_pipeline(
        &self,
        fragment_module: &wgpu::ShaderModule,
        to_screen: bool,
    ) -> wgpu::RenderPipeline {
        let format = if to_screen {
            self.context.screen_format()
        } else {
            TARGET_FORMAT
        };
        build_pass_pipeline(&self.context.device, &self.shared, fragment_module, format)
    }

    /// Runs one display tick: every live non-main pass into its off-screen
    /// target in ascending-id order, then the main pass to the screen.
    ///
    /// Each pass's target pair is swapped right after its draw is encoded,
    /// so a pass encoded later samples this tick's output of an earlier one
    /// while self-references always see the previous tick.
    pub fn render_tick(
        &self,
        graph: &mut EffectGraph,
        pointer: [f32; 4],
        time: f32,
    ) -> Result<(), wgpu::SurfaceError> {
        let Some(main_id) = graph.main_pass() else {
            return Ok(());
        };
        if graph.pass(main_id).is_none() {
            // The main pass was deleted; nothing reaches the screen.
            return Ok(());
        }

        let frame = self.context.acquire()?;
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render tick encoder"),
                });

        for id in graph.ids() {
            if id == main_id {
                continue;
            }
            self.encode_pass(&mut encoder, graph, id, None, pointer, time);
            if let Some(pass) = graph.pass_mut(id) {
                pass.frame += 1;
                pass.target.swap();
            }
        }

        self.encode_pass(&mut encoder, graph, main_id, Some(frame.view()), pointer, time);
        if let Some(pass) = graph.pass_mut(main_id) {
            pass.frame += 1;
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        graph: &EffectGraph,
        id: PassId,
        screen_view: Option<&wgpu::TextureView>,
        pointer: [f32; 4],
        time: f32,
    ) {
        let Some(pass) = graph.pass(id) else {
            return;
        };
        let device = &self.context.device;

        // Channel bindings are resolved fresh every frame: graph mutations
        // between ticks must never leave a stale texture bound.
        let mut views = Vec::with_capacity(CHANNEL_COUNT);
        let mut samplers = Vec::with_capacity(CHANNEL_COUNT);
        for channel in &pass.channels {
            match graph.live_source(channel) {
                Some(source) => {
                    if channel.filter == FilterMode::MipmapTrilinear {
                        self.mipmaps.generate(device, encoder, source.target.front());
                    }
                    views.push(source.target.front().sampled_view.clone());
                    samplers.push(self.channel_sampler(channel));
                }
                None => {
                    views.push(self.placeholder_view.clone());
                    samplers.push(self.placeholder_sampler.clone());
                }
            }
        }

        let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
        for (index, (view, sampler)) in views.iter().zip(samplers.iter()).enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (index as u32) * 2,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: (index as u32) * 2 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let channel_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("channel bind group"),
            layout: &self.shared.channel_layout,
            entries: &entries,
        });

        let resolution = if screen_view.is_some() {
            self.context.size()
        } else {
            pass.target.size()
        };
        let uniforms = PassUniforms::new(resolution, time, pass.frame, pointer);
        self.context
            .queue
            .write_buffer(&pass.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let attach_view = match screen_view {
            Some(view) => view.clone(),
            None => pass.target.back().attach_view().clone(),
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("effect pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &attach_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&pass.pipeline);
        render_pass.set_bind_group(0, &pass.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &channel_bind_group, &[]);
        render_pass.draw(0..6, 0..1);
    }

    fn channel_sampler(&self, settings: &ChannelSettings) -> wgpu::Sampler {
        let address_mode = match settings.wrap {
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        };
        // Bilinear and nearest clamp LOD to level 0 so stale mips from an
        // earlier trilinear binding are never sampled.
        let (mag_filter, min_filter, mipmap_filter, lod_max_clamp) = match settings.filter {
            FilterMode::MipmapTrilinear => (
                wgpu::FilterMode::Linear,
                wgpu::FilterMode::Linear,
                wgpu::FilterMode::Linear,
                32.0,
            ),
            FilterMode::Bilinear => (
                wgpu::FilterMode::Linear,
                wgpu::FilterMode::Linear,
                wgpu::FilterMode::Nearest,
                0.0,
            ),
            FilterMode::Nearest => (
                wgpu::FilterMode::Nearest,
                wgpu::FilterMode::Nearest,
                wgpu::FilterMode::Nearest,
                0.0,
            ),
        };
        self.context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("channel sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter,
            min_filter,
            mipmap_filter,
            lod_min_clamp: 0.0,
            lod_max_clamp,
            ..Default::default()
        })
    }
}
