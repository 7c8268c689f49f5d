//! Passes and the per-frame state their binding functions read.

use glam::Vec2;

use crate::config::EffectConfig;
use crate::pass_graph::ResourceId;
use crate::uniforms::Uniforms;

/// Everything a binding function may read for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameState<'a> {
    /// Seconds since the clock was last (re)started.
    pub time: f32,
    /// Surface size in device pixels.
    pub resolution: Vec2,
    /// Capped device pixel ratio.
    pub device_pixel_ratio: f32,
    /// Pointer position, normalized, Y-up.
    pub pointer: Vec2,
    /// Smoothed pointer direction.
    pub velocity: Vec2,
    /// Effect parameters, re-read every frame.
    pub config: &'a EffectConfig,
}

impl<'a> FrameState<'a> {
    /// A frame at time zero with the pointer centred and at rest.
    pub fn at_rest(resolution: (u32, u32), config: &'a EffectConfig) -> Self {
        Self {
            time: 0.0,
            resolution: Vec2::new(resolution.0 as f32, resolution.1 as f32),
            device_pixel_ratio: 1.0,
            pointer: Vec2::splat(0.5),
            velocity: Vec2::ZERO,
            config,
        }
    }
}

/// Handle to a program compiled through a [`PassGraph`](super::PassGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) usize);

/// What a pass draws into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    /// A render target or feedback buffer registered with the graph.
    Resource(ResourceId),
    /// The visible surface.
    Screen,
}

/// Maps the current frame state to this pass's uniform values.
pub type BindFn = Box<dyn Fn(&FrameState) -> Uniforms>;

/// One full-screen draw with one program into one target.
///
/// Registered once; only the values produced by `bind` change per frame.
pub struct Pass {
    pub(crate) program: ProgramHandle,
    pub(crate) target: PassTarget,
    pub(crate) bind: BindFn,
}

impl Pass {
    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn target(&self) -> PassTarget {
        self.target
    }
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass")
            .field("program", &self.program)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
