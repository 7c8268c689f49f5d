//! Off-screen render targets and ping-pong feedback buffers.

use crate::surface::{CLEAR_COLOR, Precision, Surface, TargetId};

/// Handle to a resource registered with a [`PassGraph`](super::PassGraph).
///
/// Stays valid across resizes; the graph never renumbers resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) usize);

/// Size and precision of a graph resource relative to the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSpec {
    /// Fraction of the surface size, e.g. `0.5` for half resolution.
    pub scale: f32,
    pub precision: Precision,
}

impl ResourceSpec {
    pub const fn new(scale: f32, precision: Precision) -> Self {
        Self { scale, precision }
    }

    /// Full resolution, half-float.
    pub const fn full_float() -> Self {
        Self::new(1.0, Precision::HalfFloat)
    }

    /// Full resolution, 8-bit.
    pub const fn full_unorm() -> Self {
        Self::new(1.0, Precision::Unorm8)
    }
}

/// Size of a target at `scale` of `surface`, floored and never below 1x1.
pub fn scaled_size(surface: (u32, u32), scale: f32) -> (u32, u32) {
    let w = (surface.0 as f32 * scale).floor() as u32;
    let h = (surface.1 as f32 * scale).floor() as u32;
    (w.max(1), h.max(1))
}

/// A single off-screen color buffer that one pass draws into and later
/// passes sample.
///
/// The [`TargetId`] is allocated once and survives [`resize`](Self::resize),
/// so uniform bindings that refer to it never need to be rebuilt.
/// [`destroy`](Self::destroy) consumes the target, so it can only run once.
#[derive(Debug)]
pub struct RenderTarget {
    id: TargetId,
    width: u32,
    height: u32,
    scale: f32,
    precision: Precision,
}

impl RenderTarget {
    /// Allocate a target at `spec.scale` of `surface_size`.
    pub fn create<S: Surface>(surface: &mut S, surface_size: (u32, u32), spec: ResourceSpec) -> Self {
        let (width, height) = scaled_size(surface_size, spec.scale);
        let id = surface.create_target(width, height, spec.precision);
        Self {
            id,
            width,
            height,
            scale: spec.scale,
            precision: spec.precision,
        }
    }

    /// Reallocate at `spec.scale` of the new surface size.
    ///
    /// The backend resamples the old contents into the new allocation, so a
    /// feedback history survives a window resize. The [`TargetId`] is kept.
    pub fn resize<S: Surface>(&mut self, surface: &mut S, surface_size: (u32, u32)) {
        let (width, height) = scaled_size(surface_size, self.scale);
        if (width, height) == (self.width, self.height) {
            return;
        }
        surface.resize_target(self.id, width, height);
        self.width = width;
        self.height = height;
    }

    /// Fill with the cold-start background.
    pub fn clear<S: Surface>(&self, surface: &mut S) {
        surface.clear_target(self.id, CLEAR_COLOR);
    }

    /// Release the backing image.
    pub fn destroy<S: Surface>(self, surface: &mut S) {
        surface.destroy_target(self.id);
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }
}

/// Two same-sized targets with a read side and a write side.
///
/// A feedback pass samples `read` and draws into `write`; the graph then
/// calls [`swap`](Self::swap), so the image just produced becomes `read`.
/// Both targets stay owned by the buffer for its whole life.
#[derive(Debug)]
pub struct FeedbackBuffer {
    read: RenderTarget,
    write: RenderTarget,
}

impl FeedbackBuffer {
    /// Allocate both sides and clear them to the cold-start background.
    pub fn create<S: Surface>(surface: &mut S, surface_size: (u32, u32), spec: ResourceSpec) -> Self {
        let read = RenderTarget::create(surface, surface_size, spec);
        let write = RenderTarget::create(surface, surface_size, spec);
        let buffer = Self { read, write };
        buffer.clear(surface);
        buffer
    }

    /// Exchange the read and write sides.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    pub fn read(&self) -> &RenderTarget {
        &self.read
    }

    pub fn write(&self) -> &RenderTarget {
        &self.write
    }

    pub fn size(&self) -> (u32, u32) {
        self.read.size()
    }

    pub fn resize<S: Surface>(&mut self, surface: &mut S, surface_size: (u32, u32)) {
        self.read.resize(surface, surface_size);
        self.write.resize(surface, surface_size);
    }

    pub fn clear<S: Surface>(&self, surface: &mut S) {
        self.read.clear(surface);
        self.write.clear(surface);
    }

    pub fn destroy<S: Surface>(self, surface: &mut S) {
        self.read.destroy(surface);
        self.write.destroy(surface);
    }
}
