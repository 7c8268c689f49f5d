//! Deterministic CPU backend.
//!
//! [`SoftwareSurface`] rasterizes every full-screen pass one pixel at a time
//! with a Rust closure standing in for the fragment shader. It is slow but
//! exact and needs no GPU, which makes it the backend for tests and for
//! headless rendering of a few frames.
//!
//! Images are stored row-major with row 0 at the bottom, so `uv` and
//! `frag_coord` follow the same Y-up convention as the GPU programs.
//! Sampling is bilinear and clamped to the edge, and 8-bit targets are
//! quantized on every write.
//!
//! Besides pixels the surface keeps a draw log and resource counters, so
//! tests can check pass order, texture unit assignment and that every
//! resource is released exactly once.

mod shading;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use glam::{Vec2, Vec4};
use image::RgbaImage;

use crate::effects::{BuiltinEffects, EffectKind};
use crate::error::{FrameError, SetupError};
use crate::surface::{CompiledProgram, Destination, Precision, ProgramId, Surface, TargetId};
use crate::uniforms::{BoundUniform, BoundValue, UniformDecl, UniformTable};

pub use shading::{aces, cubic, ease, hash13, snoise, tint};

/// What an unbound sampler returns.
const UNBOUND_TEXEL: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

type FragmentFn = dyn Fn(&Fragment) -> Vec4;

/// A CPU effect program: declared uniforms plus a per-pixel function.
#[derive(Clone)]
pub struct SoftwareEffect {
    label: String,
    uniforms: Vec<UniformDecl>,
    fragment: Rc<FragmentFn>,
}

impl SoftwareEffect {
    pub fn new<F>(label: impl Into<String>, uniforms: Vec<UniformDecl>, fragment: F) -> Self
    where
        F: Fn(&Fragment) -> Vec4 + 'static,
    {
        Self {
            label: label.into(),
            uniforms,
            fragment: Rc::new(fragment),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for SoftwareEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareEffect")
            .field("label", &self.label)
            .field("uniforms", &self.uniforms)
            .finish_non_exhaustive()
    }
}

/// A CPU color image, rows bottom-up.
#[derive(Debug, Clone)]
struct Image {
    width: u32,
    height: u32,
    precision: Precision,
    pixels: Vec<Vec4>,
}

impl Image {
    fn new(width: u32, height: u32, precision: Precision) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            precision,
            pixels: vec![Vec4::ZERO; (width * height) as usize],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    fn texel(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.pixels[self.index(x, y)]
    }

    fn store(&mut self, x: u32, y: u32, color: Vec4) {
        let i = self.index(x, y);
        self.pixels[i] = quantize(self.precision, color);
    }

    fn fill(&mut self, color: Vec4) {
        let color = quantize(self.precision, color);
        self.pixels.fill(color);
    }

    /// Bilinear, clamp-to-edge lookup at normalized `uv`.
    fn sample(&self, uv: Vec2) -> Vec4 {
        let tx = uv.x * self.width as f32 - 0.5;
        let ty = uv.y * self.height as f32 - 0.5;
        let (x0, y0) = (tx.floor(), ty.floor());
        let (fx, fy) = (tx - x0, ty - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let bottom = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), fx);
        let top = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), fx);
        bottom.lerp(top, fy)
    }

    /// Nearest-neighbour copy of `self` at a new size.
    fn resampled(&self, width: u32, height: u32) -> Self {
        let mut out = Image::new(width, height, self.precision);
        for y in 0..out.height {
            let sy = ((y as u64 * self.height as u64) / out.height as u64) as u32;
            for x in 0..out.width {
                let sx = ((x as u64 * self.width as u64) / out.width as u64) as u32;
                let i = out.index(x, y);
                out.pixels[i] = self.pixels[self.index(sx, sy)];
            }
        }
        out
    }

    fn to_rows(&self) -> Vec<[f32; 4]> {
        self.pixels.iter().map(|p| p.to_array()).collect()
    }
}

fn quantize(precision: Precision, color: Vec4) -> Vec4 {
    match precision {
        Precision::HalfFloat => color,
        Precision::Unorm8 => (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round() / 255.0,
    }
}

/// Inputs visible to one invocation of a fragment function.
pub struct Fragment<'a> {
    /// Normalized position inside the destination, Y-up, at the pixel center.
    pub uv: Vec2,
    /// Pixel-center coordinates inside the destination.
    pub frag_coord: Vec2,
    /// Destination size in pixels.
    pub resolution: Vec2,
    uniforms: &'a [BoundUniform],
    targets: &'a BTreeMap<u32, Image>,
}

impl Fragment<'_> {
    fn value(&self, name: &str) -> Option<BoundValue> {
        self.uniforms.iter().find(|u| u.name == name).map(|u| u.value)
    }

    /// A scalar uniform. Unset uniforms read as zero.
    pub fn float(&self, name: &str) -> f32 {
        match self.value(name) {
            Some(BoundValue::Scalar(v)) => v,
            _ => 0.0,
        }
    }

    pub fn vec2(&self, name: &str) -> Vec2 {
        match self.value(name) {
            Some(BoundValue::Vec2(v)) => Vec2::from_array(v),
            _ => Vec2::ZERO,
        }
    }

    pub fn vec3(&self, name: &str) -> glam::Vec3 {
        match self.value(name) {
            Some(BoundValue::Vec3(v)) => glam::Vec3::from_array(v),
            _ => glam::Vec3::ZERO,
        }
    }

    pub fn vec4(&self, name: &str) -> Vec4 {
        match self.value(name) {
            Some(BoundValue::Vec4(v)) => Vec4::from_array(v),
            _ => Vec4::ZERO,
        }
    }

    /// Sample the texture bound to `name`. Unbound samplers read opaque black.
    pub fn sample(&self, name: &str, uv: Vec2) -> Vec4 {
        match self.value(name) {
            Some(BoundValue::Texture { target, .. }) => self
                .targets
                .get(&target.0)
                .map_or(UNBOUND_TEXEL, |image| image.sample(uv)),
            _ => UNBOUND_TEXEL,
        }
    }
}

/// One entry of the draw log.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: String,
    pub destination: Destination,
    /// `(uniform name, sampled target, texture unit)` in binding order.
    pub textures: Vec<(&'static str, TargetId, u32)>,
}

/// CPU implementation of [`Surface`].
pub struct SoftwareSurface {
    width: u32,
    height: u32,
    screen: Image,
    targets: BTreeMap<u32, Image>,
    programs: BTreeMap<u32, SoftwareEffect>,
    next_target: u32,
    next_program: u32,
    invalid_releases: usize,
    draws: Vec<DrawRecord>,
    presented: u64,
    lost: bool,
    outdated: u32,
}

impl SoftwareSurface {
    /// A surface of `width` x `height` device pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            screen: Image::new(width, height, Precision::Unorm8),
            targets: BTreeMap::new(),
            programs: BTreeMap::new(),
            next_target: 0,
            next_program: 0,
            invalid_releases: 0,
            draws: Vec::new(),
            presented: 0,
            lost: false,
            outdated: 0,
        }
    }

    pub fn target_size(&self, target: TargetId) -> Option<(u32, u32)> {
        self.targets.get(&target.0).map(|i| (i.width, i.height))
    }

    pub fn target_precision(&self, target: TargetId) -> Option<Precision> {
        self.targets.get(&target.0).map(|i| i.precision)
    }

    /// Every pixel of `target`, bottom row first.
    pub fn read_target(&self, target: TargetId) -> Option<Vec<[f32; 4]>> {
        self.targets.get(&target.0).map(Image::to_rows)
    }

    /// One pixel of `target`, `y` counted from the bottom.
    pub fn pixel(&self, target: TargetId, x: u32, y: u32) -> Option<Vec4> {
        let image = self.targets.get(&target.0)?;
        (x < image.width && y < image.height).then(|| image.pixels[image.index(x, y)])
    }

    /// Overwrite `target` pixel by pixel. `y` counts from the bottom.
    pub fn fill_target_with<F>(&mut self, target: TargetId, mut color: F)
    where
        F: FnMut(u32, u32) -> Vec4,
    {
        let Some(image) = self.targets.get_mut(&target.0) else {
            log::warn!("fill of unknown target {target:?} ignored");
            return;
        };
        for y in 0..image.height {
            for x in 0..image.width {
                image.store(x, y, color(x, y));
            }
        }
    }

    /// What the last screen draw left on the visible surface, bottom row first.
    pub fn screen(&self) -> Vec<[f32; 4]> {
        self.screen.to_rows()
    }

    pub fn screen_pixel(&self, x: u32, y: u32) -> Option<Vec4> {
        (x < self.screen.width && y < self.screen.height)
            .then(|| self.screen.pixels[self.screen.index(x, y)])
    }

    /// The visible surface as an 8-bit image, top row first.
    pub fn screen_image(&self) -> RgbaImage {
        let (width, height) = (self.screen.width, self.screen.height);
        RgbaImage::from_fn(width, height, |x, y| {
            let c = self.screen.pixels[self.screen.index(x, height - 1 - y)];
            let c = (c.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
            image::Rgba([c.x as u8, c.y as u8, c.z as u8, c.w as u8])
        })
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Releases of handles that were unknown or already released.
    pub fn invalid_releases(&self) -> usize {
        self.invalid_releases
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn clear_draw_log(&mut self) {
        self.draws.clear();
    }

    /// Frames presented so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Simulate losing the graphics context. Every later draw fails.
    pub fn lose_context(&mut self) {
        self.lost = true;
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Make the next `frames` screen draws report [`FrameError::Outdated`],
    /// as a swapchain does after the window changed under it.
    pub fn mark_outdated(&mut self, frames: u32) {
        self.outdated = frames;
    }
}

impl fmt::Debug for SoftwareSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareSurface")
            .field("size", &(self.width, self.height))
            .field("targets", &self.targets.len())
            .field("programs", &self.programs.len())
            .field("lost", &self.lost)
            .finish_non_exhaustive()
    }
}

impl Surface for SoftwareSurface {
    type Effect = SoftwareEffect;

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.screen = Image::new(width, height, Precision::Unorm8);
    }

    fn create_target(&mut self, width: u32, height: u32, precision: Precision) -> TargetId {
        let id = self.next_target;
        self.next_target += 1;
        self.targets.insert(id, Image::new(width, height, precision));
        TargetId(id)
    }

    fn resize_target(&mut self, target: TargetId, width: u32, height: u32) {
        match self.targets.get_mut(&target.0) {
            Some(image) => *image = image.resampled(width, height),
            None => log::warn!("resize of unknown target {target:?} ignored"),
        }
    }

    fn clear_target(&mut self, target: TargetId, color: [f32; 4]) {
        match self.targets.get_mut(&target.0) {
            Some(image) => image.fill(Vec4::from_array(color)),
            None => log::warn!("clear of unknown target {target:?} ignored"),
        }
    }

    fn upload_target(&mut self, target: TargetId, pixels: &RgbaImage) {
        let Some(image) = self.targets.get_mut(&target.0) else {
            log::warn!("upload to unknown target {target:?} ignored");
            return;
        };
        if pixels.dimensions() != (image.width, image.height) {
            log::warn!(
                "upload of {:?} into {}x{} target ignored",
                pixels.dimensions(),
                image.width,
                image.height
            );
            return;
        }
        for (x, row, p) in pixels.enumerate_pixels() {
            let color = Vec4::from_array(p.0.map(|c| c as f32 / 255.0));
            image.store(x, image.height - 1 - row, color);
        }
    }

    fn destroy_target(&mut self, target: TargetId) {
        if self.targets.remove(&target.0).is_none() {
            log::warn!("target {target:?} released twice");
            self.invalid_releases += 1;
        }
    }

    fn compile_program(&mut self, effect: &SoftwareEffect) -> Result<CompiledProgram, SetupError> {
        if self.lost {
            return Err(SetupError::SurfaceUnavailable("context lost".into()));
        }
        let uniforms = UniformTable::new(effect.uniforms.clone());
        if let Some(name) = uniforms.duplicate() {
            return Err(SetupError::ProgramCompile {
                label: effect.label.clone(),
                message: format!("uniform '{name}' declared more than once"),
            });
        }

        let id = self.next_program;
        self.next_program += 1;
        self.programs.insert(id, effect.clone());
        Ok(CompiledProgram {
            id: ProgramId(id),
            label: effect.label.clone(),
            uniforms,
        })
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program.0).is_none() {
            log::warn!("program {program:?} released twice");
            self.invalid_releases += 1;
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
        if destination == Destination::Screen && self.outdated > 0 {
            self.outdated -= 1;
            return Err(FrameError::Outdated);
        }
        let Some(effect) = self.programs.get(&program.0) else {
            log::warn!("draw with unknown program {program:?} skipped");
            return Ok(());
        };

        // Detach the destination so the remaining targets can be sampled.
        let mut output = match destination {
            Destination::Screen => std::mem::replace(&mut self.screen, Image::new(1, 1, Precision::Unorm8)),
            Destination::Target(id) => match self.targets.remove(&id.0) {
                Some(image) => image,
                None => {
                    log::warn!("draw into unknown target {id:?} skipped");
                    return Ok(());
                }
            },
        };

        let resolution = Vec2::new(output.width as f32, output.height as f32);
        for y in 0..output.height {
            for x in 0..output.width {
                let frag_coord = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let fragment = Fragment {
                    uv: frag_coord / resolution,
                    frag_coord,
                    resolution,
                    uniforms,
                    targets: &self.targets,
                };
                output.store(x, y, (effect.fragment)(&fragment));
            }
        }

        self.draws.push(DrawRecord {
            program: effect.label.clone(),
            destination,
            textures: uniforms
                .iter()
                .filter_map(|u| match u.value {
                    BoundValue::Texture { target, unit } => Some((u.name, target, unit)),
                    _ => None,
                })
                .collect(),
        });

        match destination {
            Destination::Screen => self.screen = output,
            Destination::Target(id) => {
                self.targets.insert(id.0, output);
            }
        }
        Ok(())
    }

    fn present(&mut self) -> Result<(), FrameError> {
        if self.lost {
            return Err(FrameError::ContextLost);
        }
        self.presented += 1;
        Ok(())
    }
}

impl BuiltinEffects for SoftwareSurface {
    fn builtin(&self, kind: EffectKind) -> SoftwareEffect {
        let fragment: fn(&Fragment) -> Vec4 = match kind {
            EffectKind::Flow => shading::flow,
            EffectKind::Cascade => shading::cascade,
            EffectKind::Lines => shading::lines,
            EffectKind::Output => shading::output,
            EffectKind::BloomLuminance => shading::bloom_luminance,
            EffectKind::BloomBlur => shading::bloom_blur,
            EffectKind::BloomComposite => shading::bloom_composite,
        };
        SoftwareEffect::new(kind.label(), kind.uniforms(), fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::{Uniforms, resolve};

    fn copy_effect() -> SoftwareEffect {
        SoftwareEffect::new("copy", vec![UniformDecl::texture("src")], |frag| {
            frag.sample("src", frag.uv)
        })
    }

    #[test]
    fn new_targets_are_transparent_black() {
        let mut surface = SoftwareSurface::new(4, 4);
        let id = surface.create_target(3, 2, Precision::HalfFloat);
        assert!(surface.read_target(id).unwrap().iter().all(|p| *p == [0.0; 4]));
        assert_eq!(surface.target_size(id), Some((3, 2)));
    }

    #[test]
    fn unorm_targets_quantize_on_write() {
        let mut surface = SoftwareSurface::new(2, 2);
        let id = surface.create_target(1, 1, Precision::Unorm8);
        surface.clear_target(id, [0.3, 1.5, -1.0, 1.0]);
        let p = surface.pixel(id, 0, 0).unwrap();
        assert_eq!(p, Vec4::new((0.3f32 * 255.0).round() / 255.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn sampling_at_texel_centers_is_exact() {
        let mut surface = SoftwareSurface::new(4, 1);
        let src = surface.create_target(4, 1, Precision::HalfFloat);
        let dst = surface.create_target(4, 1, Precision::HalfFloat);
        surface.fill_target_with(src, |x, _| Vec4::splat(x as f32));
        let compiled = surface.compile_program(&copy_effect()).unwrap();

        let values = Uniforms::new().texture("src", crate::ResourceId(0));
        let bound = resolve(&compiled.uniforms, &values, |_| Some(src));
        surface.draw(compiled.id, Destination::Target(dst), &bound).unwrap();

        let row: Vec<f32> = surface.read_target(dst).unwrap().iter().map(|p| p[0]).collect();
        assert_eq!(row, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn upload_puts_the_top_image_row_at_the_top() {
        let mut surface = SoftwareSurface::new(1, 2);
        let id = surface.create_target(1, 2, Precision::Unorm8);
        let mut img = RgbaImage::new(1, 2);
        img.put_pixel(0, 0, image::Rgba([255, 255, 255, 255]));
        img.put_pixel(0, 1, image::Rgba([0, 0, 0, 255]));

        surface.upload_target(id, &img);

        assert_eq!(surface.pixel(id, 0, 1), Some(Vec4::ONE));
        assert_eq!(surface.pixel(id, 0, 0), Some(Vec4::new(0.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn resize_target_keeps_content_nearest() {
        let mut surface = SoftwareSurface::new(2, 2);
        let id = surface.create_target(2, 2, Precision::HalfFloat);
        surface.fill_target_with(id, |x, y| Vec4::splat((y * 2 + x) as f32));

        surface.resize_target(id, 4, 4);

        assert_eq!(surface.target_size(id), Some((4, 4)));
        assert_eq!(surface.pixel(id, 3, 3), Some(Vec4::splat(3.0)));
        assert_eq!(surface.pixel(id, 0, 0), Some(Vec4::ZERO));
    }

    #[test]
    fn double_release_is_counted() {
        let mut surface = SoftwareSurface::new(2, 2);
        let id = surface.create_target(1, 1, Precision::Unorm8);
        surface.destroy_target(id);
        surface.destroy_target(id);
        assert_eq!(surface.invalid_releases(), 1);
    }

    #[test]
    fn lost_context_fails_draws_and_presents() {
        let mut surface = SoftwareSurface::new(2, 2);
        let compiled = surface.compile_program(&copy_effect()).unwrap();
        surface.lose_context();

        assert_eq!(
            surface.draw(compiled.id, Destination::Screen, &[]),
            Err(FrameError::ContextLost)
        );
        assert_eq!(surface.present(), Err(FrameError::ContextLost));
    }

    #[test]
    fn unbound_sampler_reads_opaque_black() {
        let mut surface = SoftwareSurface::new(2, 2);
        let compiled = surface.compile_program(&copy_effect()).unwrap();
        surface.draw(compiled.id, Destination::Screen, &[]).unwrap();
        assert_eq!(surface.screen_pixel(1, 1), Some(Vec4::new(0.0, 0.0, 0.0, 1.0)));
    }
}
