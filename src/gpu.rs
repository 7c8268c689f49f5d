//! Core GPU context and device management.
//!
//! [`GpuContext`] holds the wgpu objects one window needs: the presentation
//! surface, device, queue and surface configuration. It is owned by a
//! [`GpuSurface`](crate::GpuSurface), which implements the drawing contract on
//! top of it.
//!
//! Every step of initialization can fail on real hardware (no window handle,
//! no adapter, device limits), and each failure maps to a [`SetupError`] so
//! the host can refuse to show the effect instead of crashing.
//!
//! ```no_run
//! use std::sync::Arc;
//! use flowline::GpuContext;
//! # fn demo(window: Arc<winit::window::Window>) -> Result<(), flowline::SetupError> {
//! let gpu = GpuContext::new(window)?;
//! println!("{}x{} ({:?})", gpu.width(), gpu.height(), gpu.config.format);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use winit::window::Window;

use crate::error::SetupError;

/// Core GPU context holding wgpu resources.
///
/// All fields are public so hosts can reach the raw wgpu API when needed.
pub struct GpuContext {
    /// The surface for presenting rendered frames to the window.
    pub surface: wgpu::Surface<'static>,
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Current surface configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Create a GPU context for `window`, sized `width` x `height` device pixels.
    ///
    /// Prefers a linear (non-sRGB) surface format: the effect programs
    /// produce display-ready values and must not be gamma encoded twice.
    pub fn with_size(window: Arc<Window>, width: u32, height: u32) -> Result<Self, SetupError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| SetupError::SurfaceUnavailable(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| SetupError::AdapterUnavailable(e.to_string()))?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("flowline device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .map_err(|e| SetupError::DeviceRequest(e.to_string()))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&fallback_format) = surface_caps.formats.first() else {
            return Err(SetupError::SurfaceUnavailable(
                "surface reports no supported formats".into(),
            ));
        };
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .copied()
            .unwrap_or(fallback_format);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
        })
    }

    /// Create a GPU context sized to the window's current inner size.
    pub fn new(window: Arc<Window>) -> Result<Self, SetupError> {
        let size = window.inner_size();
        Self::with_size(window, size.width, size.height)
    }

    /// Resize the surface. Zero-sized requests (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Reapply the current configuration after the surface went stale.
    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }
}
