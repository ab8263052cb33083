//! wgpu instance/device wiring and the screen target.

use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};

use crate::GpuPowerPreference;

/// Format used for every off-screen target, including the headless screen.
pub(crate) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Where the main pass draws: a window surface or, headless, an internal
/// resizable color texture. Headless mode keeps the full render path
/// exercisable without a window system.
pub(crate) enum ScreenTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        size: (u32, u32),
    },
}

/// One frame's screen attachment, presented on drop-through.
pub(crate) enum ScreenFrame {
    Surface {
        frame: wgpu::SurfaceTexture,
        view: wgpu::TextureView,
    },
    Offscreen {
        view: wgpu::TextureView,
    },
}

impl ScreenFrame {
    pub fn view(&self) -> &wgpu::TextureView {
        match self {
            ScreenFrame::Surface { view, .. } => view,
            ScreenFrame::Offscreen { view } => view,
        }
    }

    pub fn present(self) {
        if let ScreenFrame::Surface { frame, .. } = self {
            frame.present();
        }
    }
}

/// Owns the GPU handles for the process's single rendering surface.
pub(crate) struct RenderContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    screen: ScreenTarget,
    screen_format: wgpu::TextureFormat,
}

impl RenderContext {
    /// Builds a context presenting to the window behind `target`.
    pub fn new<T>(
        target: &T,
        initial_size: (u32, u32),
        gpu_power: GpuPowerPreference,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let (adapter, device, queue) = request_device(&instance, Some(&surface), gpu_power)?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Prefer a non-sRGB swapchain; shader output stays gamma-encoded,
        // matching the original tool's default framebuffer.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or_else(|| {
                let fallback = surface_caps.formats[0];
                warn!(?fallback, "no non-sRGB surface format available");
                fallback
            });

        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .unwrap_or(surface_caps.present_modes[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: initial_size.0.max(1),
            height: initial_size.1.max(1),
            present_mode,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            device,
            queue,
            screen: ScreenTarget::Surface { surface, config },
            screen_format: surface_format,
        })
    }

    /// Builds a context whose screen is an internal texture.
    pub fn headless(initial_size: (u32, u32), gpu_power: GpuPowerPreference) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });
        let (_adapter, device, queue) = request_device(&instance, None, gpu_power)?;

        let size = (initial_size.0.max(1), initial_size.1.max(1));
        let texture = create_screen_texture(&device, size);

        Ok(Self {
            _instance: instance,
            device,
            queue,
            screen: ScreenTarget::Offscreen { texture, size },
            screen_format: TARGET_FORMAT,
        })
    }

    pub fn screen_format(&self) -> wgpu::TextureFormat {
        self.screen_format
    }

    pub fn size(&self) -> (u32, u32) {
        match &self.screen {
            ScreenTarget::Surface { config, .. } => (config.width, config.height),
            ScreenTarget::Offscreen { size, .. } => *size,
        }
    }

    pub fn resize(&mut self, new_size: (u32, u32)) {
        if new_size.0 == 0 || new_size.1 == 0 {
            warn!(?new_size, "ignoring zero-sized resize");
            return;
        }
        match &mut self.screen {
            ScreenTarget::Surface { surface, config } => {
                config.width = new_size.0;
                config.height = new_size.1;
                surface.configure(&self.device, config);
            }
            ScreenTarget::Offscreen { texture, size } => {
                *size = new_size;
                *texture = create_screen_texture(&self.device, new_size);
            }
        }
    }

    /// Acquires this tick's screen attachment.
    pub fn acquire(&self) -> Result<ScreenFrame, wgpu::SurfaceError> {
        match &self.screen {
            ScreenTarget::Surface { surface, .. } => {
                let frame = surface.get_current_texture()?;
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(ScreenFrame::Surface { frame, view })
            }
            ScreenTarget::Offscreen { texture, .. } => Ok(ScreenFrame::Offscreen {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            }),
        }
    }
}

fn request_device(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
    gpu_power: GpuPowerPreference,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let power_preference = match gpu_power {
        GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
        GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
    };
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference,
        compatible_surface,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")?;

    let info = adapter.get_info();
    debug!(name = %info.name, backend = ?info.backend, device_type = ?info.device_type, "selected GPU adapter");

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("effectlab device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .context("failed to create GPU device")?;

    Ok((adapter, device, queue))
}

fn create_screen_texture(device: &wgpu::Device, size: (u32, u32)) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("headless screen target"),
        size: wgpu::Extent3d {
            width: size.0,
            height: size.1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}
