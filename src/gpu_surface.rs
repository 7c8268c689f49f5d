//! wgpu implementation of [`Surface`].
//!
//! Every program is a WGSL fragment shader prepended with
//! `shaders/common.wgsl`, which provides the fullscreen-triangle vertex stage
//! `vs`, the shared sampler and the noise and easing helpers. Programs follow
//! one binding layout in group 0:
//!
//! | binding | contents                                             |
//! |---------|------------------------------------------------------|
//! | 0       | uniform struct, non-texture uniforms in declared order |
//! | 1       | linear, edge-clamped sampler                         |
//! | 2..     | one `texture_2d<f32>` per declared texture uniform   |
//!
//! A texture uniform that resolved to nothing this frame is bound to a 1x1
//! black texture, matching what an unbound sampler reads elsewhere.

use std::collections::HashMap;

use image::RgbaImage;

use crate::effects::{BuiltinEffects, EffectKind};
use crate::error::{FrameError, SetupError};
use crate::gpu::GpuContext;
use crate::surface::{CompiledProgram, Destination, Precision, ProgramId, Surface, TargetId};
use crate::uniforms::{BoundUniform, BoundValue, UniformDecl, UniformKind, UniformTable};

const COMMON: &str = include_str!("shaders/common.wgsl");

fn builtin_source(kind: EffectKind) -> &'static str {
    match kind {
        EffectKind::Flow => include_str!("shaders/flow.wgsl"),
        EffectKind::Cascade => include_str!("shaders/cascade.wgsl"),
        EffectKind::Lines => include_str!("shaders/lines.wgsl"),
        EffectKind::Output => include_str!("shaders/output.wgsl"),
        EffectKind::BloomLuminance => include_str!("shaders/bloom_luminance.wgsl"),
        EffectKind::BloomBlur => include_str!("shaders/bloom_blur.wgsl"),
        EffectKind::BloomComposite => include_str!("shaders/bloom_composite.wgsl"),
    }
}

/// A WGSL effect program for [`GpuSurface`].
#[derive(Debug, Clone)]
pub struct GpuEffect {
    label: String,
    source: String,
    uniforms: Vec<UniformDecl>,
}

impl GpuEffect {
    /// `fragment` is the program body; the shared prelude is prepended.
    pub fn new(label: impl Into<String>, fragment: &str, uniforms: Vec<UniformDecl>) -> Self {
        Self {
            label: label.into(),
            source: format!("{COMMON}\n{fragment}"),
            uniforms,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Full WGSL source, prelude included.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Byte offsets of the non-texture uniforms inside the WGSL uniform struct.
#[derive(Debug, Clone)]
struct UniformLayout {
    offsets: Vec<Option<u64>>,
    size: u64,
}

impl UniformLayout {
    fn new(table: &UniformTable) -> Self {
        let mut offset = 0u64;
        let offsets = table
            .iter()
            .map(|decl| {
                let (align, size) = match decl.kind {
                    UniformKind::Scalar => (4, 4),
                    UniformKind::Vec2 => (8, 8),
                    UniformKind::Vec3 => (16, 12),
                    UniformKind::Vec4 => (16, 16),
                    UniformKind::Texture => return None,
                };
                offset = offset.next_multiple_of(align);
                let at = offset;
                offset += size;
                Some(at)
            })
            .collect();
        Self {
            offsets,
            size: offset.next_multiple_of(16).max(16),
        }
    }

    /// Uniform buffer contents. Declared uniforms without a value stay zero.
    fn pack(&self, uniforms: &[BoundUniform]) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size as usize];
        for uniform in uniforms {
            let Some(Some(offset)) = self.offsets.get(uniform.slot) else {
                continue;
            };
            let values: &[f32] = match &uniform.value {
                BoundValue::Scalar(v) => std::slice::from_ref(v),
                BoundValue::Vec2(v) => v,
                BoundValue::Vec3(v) => v,
                BoundValue::Vec4(v) => v,
                BoundValue::Texture { .. } => continue,
            };
            let src: &[u8] = bytemuck::cast_slice(values);
            let start = *offset as usize;
            bytes[start..start + src.len()].copy_from_slice(src);
        }
        bytes
    }
}

struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    precision: Precision,
}

impl GpuTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32, precision: Precision) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("flowline target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: target_format(precision),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
            precision,
        }
    }

    fn format(&self) -> wgpu::TextureFormat {
        target_format(self.precision)
    }
}

fn target_format(precision: Precision) -> wgpu::TextureFormat {
    match precision {
        Precision::HalfFloat => wgpu::TextureFormat::Rgba16Float,
        Precision::Unorm8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

struct GpuProgram {
    label: String,
    uniforms: UniformTable,
    layout: UniformLayout,
    /// Slots of the texture declarations, in binding order (binding 2..).
    texture_slots: Vec<usize>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
}

/// wgpu-backed drawing surface for one window.
pub struct GpuSurface {
    gpu: GpuContext,
    sampler: wgpu::Sampler,
    fallback: wgpu::TextureView,
    blit: GpuProgram,
    targets: HashMap<u32, GpuTarget>,
    programs: HashMap<u32, GpuProgram>,
    next_target: u32,
    next_program: u32,
    frame: Option<wgpu::SurfaceTexture>,
    lost: bool,
}

impl GpuSurface {
    /// Wrap a configured context. Fails only if the internal copy program
    /// does not compile on this device.
    pub fn new(gpu: GpuContext) -> Result<Self, SetupError> {
        use wgpu::util::DeviceExt;

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("flowline sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let fallback = gpu
            .device
            .create_texture_with_data(
                &gpu.queue,
                &wgpu::TextureDescriptor {
                    label: Some("flowline unbound texture"),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                },
                wgpu::util::TextureDataOrder::LayerMajor,
                &[0, 0, 0, 255],
            )
            .create_view(&wgpu::TextureViewDescriptor::default());

        let blit_effect = GpuEffect::new(
            "blit",
            include_str!("shaders/blit.wgsl"),
            vec![UniformDecl::texture("source")],
        );
        let blit = build_program(&gpu, &blit_effect)?;

        Ok(Self {
            gpu,
            sampler,
            fallback,
            blit,
            targets: HashMap::new(),
            programs: HashMap::new(),
            next_target: 0,
            next_program: 0,
            frame: None,
            lost: false,
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.gpu
    }

    /// Number of live off-screen targets.
    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Acquire the swapchain image for this frame if not done yet.
    fn acquire_frame(&mut self) -> Result<(), FrameError> {
        if self.frame.is_some() {
            return Ok(());
        }
        match self.gpu.surface.get_current_texture() {
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(())
            }
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                self.gpu.reconfigure();
                Err(FrameError::Outdated)
            }
            Err(wgpu::SurfaceError::Timeout) => Err(FrameError::Outdated),
            Err(e) => {
                log::error!("surface texture unavailable: {e}");
                self.lost = true;
                Err(FrameError::ContextLost)
            }
        }
    }

    /// Record and submit one fullscreen draw.
    fn encode_draw(
        &self,
        program: &GpuProgram,
        view: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        textures: &[&wgpu::TextureView],
        uniform_bytes: &[u8],
    ) {
        let Some(pipeline) = program.pipelines.get(&format) else {
            log::warn!("program '{}' has no pipeline for {format:?}", program.label);
            return;
        };
        let device = &self.gpu.device;
        self.gpu.queue.write_buffer(&program.uniform_buffer, 0, uniform_bytes);

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: program.uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for (i, texture) in textures.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + i as u32,
                resource: wgpu::BindingResource::TextureView(texture),
            });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.label),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&program.label),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&program.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Compile `effect` and build one pipeline per color format it may target.
fn build_program(gpu: &GpuContext, effect: &GpuEffect) -> Result<GpuProgram, SetupError> {
    let device = &gpu.device;
    let uniforms = UniformTable::new(effect.uniforms.clone());
    let texture_slots: Vec<usize> = uniforms
        .iter()
        .enumerate()
        .filter(|(_, d)| d.kind == UniformKind::Texture)
        .map(|(slot, _)| slot)
        .collect();
    let layout = UniformLayout::new(&uniforms);

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&effect.label),
        source: wgpu::ShaderSource::Wgsl(effect.source.as_str().into()),
    });

    let mut layout_entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ];
    for i in 0..texture_slots.len() {
        layout_entries.push(wgpu::BindGroupLayoutEntry {
            binding: 2 + i as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&effect.label),
        entries: &layout_entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&effect.label),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let mut formats = vec![wgpu::TextureFormat::Rgba16Float, wgpu::TextureFormat::Rgba8Unorm];
    if !formats.contains(&gpu.config.format) {
        formats.push(gpu.config.format);
    }

    let pipelines = formats
        .into_iter()
        .map(|format| {
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&effect.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            (format, pipeline)
        })
        .collect();

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&effect.label),
        size: layout.size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(SetupError::ProgramCompile {
            label: effect.label.clone(),
            message: error.to_string(),
        });
    }

    Ok(GpuProgram {
        label: effect.label.clone(),
        uniforms,
        layout,
        texture_slots,
        bind_group_layout,
        pipelines,
        uniform_buffer,
    })
}

impl Surface for GpuSurface {
    type Effect = GpuEffect;

    fn size(&self) -> (u32, u32) {
        (self.gpu.width(), self.gpu.height())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.frame = None;
        self.gpu.resize(width, height);
    }

    fn create_target(&mut self, width: u32, height: u32, precision: Precision) -> TargetId {
        let id = self.next_target;
        self.next_target += 1;
        self.targets
            .insert(id, GpuTarget::new(&self.gpu.device, width, height, precision));
        TargetId(id)
    }

    fn resize_target(&mut self, target: TargetId, width: u32, height: u32) {
        let Some(old) = self.targets.remove(&target.0) else {
            log::warn!("resize of unknown target {target:?}");
            return;
        };
        let resized = GpuTarget::new(&self.gpu.device, width, height, old.precision);
        self.encode_draw(
            &self.blit,
            &resized.view,
            resized.format(),
            &[&old.view],
            &self.blit.layout.pack(&[]),
        );
        old.texture.destroy();
        self.targets.insert(target.0, resized);
    }

    fn clear_target(&mut self, target: TargetId, color: [f32; 4]) {
        let Some(t) = self.targets.get(&target.0) else {
            log::warn!("clear of unknown target {target:?}");
            return;
        };
        let [r, g, b, a] = color.map(f64::from);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("flowline clear"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("flowline clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &t.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn upload_target(&mut self, target: TargetId, pixels: &RgbaImage) {
        let Some(t) = self.targets.get(&target.0) else {
            log::warn!("upload to unknown target {target:?}");
            return;
        };
        if pixels.dimensions() != (t.width, t.height) || t.precision != Precision::Unorm8 {
            log::warn!(
                "upload of {}x{} image to {}x{} {:?} target ignored",
                pixels.width(),
                pixels.height(),
                t.width,
                t.height,
                t.precision
            );
            return;
        }
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &t.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * t.width),
                rows_per_image: Some(t.height),
            },
            wgpu::Extent3d {
                width: t.width,
                height: t.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn destroy_target(&mut self, target: TargetId) {
        match self.targets.remove(&target.0) {
            Some(t) => t.texture.destroy(),
            None => log::warn!("release of unknown target {target:?}"),
        }
    }

    fn compile_program(&mut self, effect: &GpuEffect) -> Result<CompiledProgram, SetupError> {
        if self.lost {
            return Err(SetupError::SurfaceUnavailable("graphics context lost".into()));
        }
        let table = UniformTable::new(effect.uniforms.clone());
        if let Some(name) = table.duplicate() {
            return Err(SetupError::ProgramCompile {
                label: effect.label.clone(),
                message: format!("uniform '{name}' declared twice"),
            });
        }

        let program = build_program(&self.gpu, effect)?;
        let id = self.next_program;
        self.next_program += 1;
        let compiled = CompiledProgram {
            id: ProgramId(id),
            label: program.label.clone(),
            uniforms: program.uniforms.clone(),
        };
        self.programs.insert(id, program);
        log::debug!("compiled program '{}'", effect.label);
        Ok(compiled)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program.0).is_none() {
            log::warn!("release of unknown program {program:?}");
        }
    }

    fn draw(
        &mut self,
        program: ProgramId,
        destination: Destination,
        uniforms: &[BoundUniform],
    ) -> Result<(), FrameError> {
        if self.lost {
            return Err(FrameError::ContextLost);
        }

        let (view, format) = match destination {
            Destination::Screen => {
                self.acquire_frame()?;
                let Some(frame) = &self.frame else {
                    return Err(FrameError::Outdated);
                };
                (
                    frame.texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    self.gpu.config.format,
                )
            }
            Destination::Target(id) => match self.targets.get(&id.0) {
                Some(t) => (t.view.clone(), t.format()),
                None => {
                    log::warn!("draw into unknown target {id:?} skipped");
                    return Ok(());
                }
            },
        };

        let Some(compiled) = self.programs.get(&program.0) else {
            log::warn!("draw with unknown program {program:?} skipped");
            return Ok(());
        };

        let textures: Vec<&wgpu::TextureView> = compiled
            .texture_slots
            .iter()
            .map(|&slot| {
                uniforms
                    .iter()
                    .find_map(|u| match u.value {
                        BoundValue::Texture { target, .. } if u.slot == slot => {
                            self.targets.get(&target.0).map(|t| &t.view)
                        }
                        _ => None,
                    })
                    .unwrap_or(&self.fallback)
            })
            .collect();

        self.encode_draw(
            compiled,
            &view,
            format,
            &textures,
            &compiled.layout.pack(uniforms),
        );
        Ok(())
    }

    fn present(&mut self) -> Result<(), FrameError> {
        if self.lost {
            return Err(FrameError::ContextLost);
        }
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
        Ok(())
    }
}

impl BuiltinEffects for GpuSurface {
    fn builtin(&self, kind: EffectKind) -> GpuEffect {
        GpuEffect::new(kind.label(), builtin_source(kind), kind.uniforms())
    }
}
