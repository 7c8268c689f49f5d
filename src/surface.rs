//! The drawing surface contract the pass graph is written against.
//!
//! A [`Surface`] owns the drawable area and the low-level graphics context. It
//! hands out opaque [`TargetId`] and [`ProgramId`] handles and performs exactly
//! one kind of draw: a full-screen quad with one program and a resolved uniform
//! set, into either an off-screen target or the visible surface.
//!
//! Two backends implement it:
//!
//! - [`GpuSurface`](crate::GpuSurface): wgpu, WGSL programs, presents to a window.
//! - [`SoftwareSurface`](crate::SoftwareSurface): deterministic CPU rasterizer
//!   used for tests and headless rendering.
//!
//! # Device pixels
//!
//! Hosts report their size in CSS pixels plus a device pixel ratio. The surface
//! always works in device pixels, with the ratio capped at 2x:
//!
//! ```
//! use flowline::Viewport;
//!
//! let vp = Viewport::new(400.0, 300.0, 3.0);
//! assert_eq!(vp.device_size(), (800, 600));
//! ```

use image::RgbaImage;

use crate::error::{FrameError, SetupError};
use crate::uniforms::{BoundUniform, UniformTable};

/// Maximum device pixel ratio honoured by the surface.
pub const MAX_DEVICE_PIXEL_RATIO: f32 = 2.0;

/// Clear color for cold start and reset: opaque black.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Handle to an off-screen color target owned by a [`Surface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u32);

/// Handle to a compiled program owned by a [`Surface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

/// Pixel precision of a target. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 16-bit float per channel, for feedback accumulation.
    HalfFloat,
    /// 8-bit normalized per channel.
    Unorm8,
}

/// Where a draw lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Target(TargetId),
    Screen,
}

/// A program compiled by a surface, with its declared uniform slots.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub id: ProgramId,
    pub label: String,
    pub uniforms: UniformTable,
}

/// Host-reported drawable area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Width in CSS (logical) pixels.
    pub css_width: f32,
    /// Height in CSS (logical) pixels.
    pub css_height: f32,
    /// Raw device pixel ratio reported by the host.
    pub device_pixel_ratio: f32,
}

impl Viewport {
    pub fn new(css_width: f32, css_height: f32, device_pixel_ratio: f32) -> Self {
        Self {
            css_width,
            css_height,
            device_pixel_ratio,
        }
    }

    /// A viewport whose CSS size equals its device size.
    pub fn from_device(width: u32, height: u32) -> Self {
        Self::new(width as f32, height as f32, 1.0)
    }

    /// Device pixel ratio after applying the 2x cap. Non-positive ratios count as 1.
    pub fn dpr(&self) -> f32 {
        if self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio.min(MAX_DEVICE_PIXEL_RATIO)
        } else {
            1.0
        }
    }

    /// Size in device pixels, floored.
    pub fn device_size(&self) -> (u32, u32) {
        let dpr = self.dpr();
        (
            (self.css_width.max(0.0) * dpr).floor() as u32,
            (self.css_height.max(0.0) * dpr).floor() as u32,
        )
    }
}

/// The drawing surface contract.
///
/// All methods are called from the single thread driving the instance.
/// Target and program handles are released exactly once by their owner.
pub trait Surface {
    /// Backend-specific description of an effect program.
    type Effect;

    /// Current drawable size in device pixels.
    fn size(&self) -> (u32, u32);

    /// Resize the visible drawable. Zero-sized requests are ignored.
    fn resize(&mut self, width: u32, height: u32);

    /// Allocate an off-screen color target, edge-clamped and linearly filtered.
    fn create_target(&mut self, width: u32, height: u32, precision: Precision) -> TargetId;

    /// Reallocate the backing image of `target`. The handle stays valid.
    fn resize_target(&mut self, target: TargetId, width: u32, height: u32);

    /// Fill `target` with a solid color.
    fn clear_target(&mut self, target: TargetId, color: [f32; 4]);

    /// Replace the contents of `target` with `pixels` (row 0 is the top row).
    /// The image must match the target's current size.
    fn upload_target(&mut self, target: TargetId, pixels: &RgbaImage);

    /// Release `target`.
    fn destroy_target(&mut self, target: TargetId);

    /// Compile an effect program and report its uniform slots.
    fn compile_program(&mut self, effect: &Self::Effect) -> Result<CompiledProgram, SetupError>;

    /// Release `program`.
    fn destroy_program(&mut self, program: ProgramId);

    /// Draw a full-screen quad into `destination`, sized to the destination.
    fn draw(
        &mut self,
        program: ProgramId,
        destination: Destination,
        uniforms: &[BoundUniform],
    ) -> Result<(), FrameError>;

    /// Present whatever was drawn to [`Destination::Screen`] this frame.
    fn present(&mut self) -> Result<(), FrameError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_size_caps_ratio_at_two() {
        assert_eq!(Viewport::new(100.0, 50.0, 3.5).device_size(), (200, 100));
        assert_eq!(Viewport::new(100.0, 50.0, 1.5).device_size(), (150, 75));
    }

    #[test]
    fn device_size_floors_fractional_pixels() {
        assert_eq!(Viewport::new(100.4, 33.3, 1.5).device_size(), (150, 49));
    }

    #[test]
    fn bogus_ratio_falls_back_to_one() {
        assert_eq!(Viewport::new(64.0, 32.0, 0.0).dpr(), 1.0);
        assert_eq!(Viewport::new(64.0, 32.0, -2.0).device_size(), (64, 32));
    }
}
