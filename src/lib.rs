//! # flowline
//!
//! **A cursor-reactive, multi-pass feedback effect for hero banners.**
//!
//! The effect is a small render-pass graph: a flow field that follows the
//! pointer, a cascade that stamps a logo and feeds on its own previous frame,
//! a stripe overlay and a tone-mapped output, optionally followed by a
//! half-resolution bloom chain. The graph runs on any [`Surface`]; the crate
//! ships a wgpu backend for windows and a deterministic CPU backend for tests
//! and offline rendering.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flowline::{EffectConfig, RunOptions, run};
//!
//! fn main() -> Result<(), flowline::AppError> {
//!     let mut config = EffectConfig::default();
//!     config.logo.url = Some("logo.png".into());
//!     config.bloom.enabled = true;
//!     run(RunOptions::new().title("hero").config(config))
//! }
//! ```
//!
//! ## Embedding
//!
//! Hosts that bring their own window or event loop build an [`Effect`]
//! directly and forward resize, pointer and visibility signals to it. Frames
//! arrive through the host's [`FrameScheduler`]:
//!
//! ```
//! use std::time::Instant;
//! use flowline::{Effect, EffectConfig, FileImageSource, ManualScheduler, SoftwareSurface, Viewport};
//!
//! let scheduler = ManualScheduler::new();
//! let mut effect = Effect::new(
//!     SoftwareSurface::new(64, 32),
//!     Viewport::from_device(64, 32),
//!     EffectConfig::default(),
//!     Box::new(scheduler.clone()),
//!     &FileImageSource,
//! )?;
//! effect.start(Instant::now());
//! if scheduler.fire() {
//!     effect.frame(Instant::now());
//! }
//! # Ok::<(), flowline::SetupError>(())
//! ```

mod app;
mod clock;
mod config;
mod effect;
mod effects;
mod error;
mod gpu;
mod gpu_surface;
mod headless;
mod input;
mod lifecycle;
mod logo;
mod pass_graph;
mod preset;
mod software;
mod surface;
mod uniforms;

pub use app::{RunOptions, WindowScheduler, run};
pub use clock::Clock;
pub use config::{
    BloomConfig, CascadeConfig, ConfigError, EffectConfig, FlowConfig, LinesConfig, LogoConfig,
    LogoPlacement,
};
pub use effect::Effect;
pub use effects::{BuiltinEffects, EffectKind};
pub use error::{AppError, FrameError, LogoError, SetupError};
pub use gpu::GpuContext;
pub use gpu_surface::{GpuEffect, GpuSurface};
pub use headless::{SnapshotOptions, render_snapshot};
pub use input::InputState;
pub use lifecycle::{FrameScheduler, Lifecycle, ManualScheduler, RunState, Transition};
pub use logo::{FileImageSource, ImageSource, LogoLayout, compose_logo};
pub use pass_graph::{
    BindFn, FeedbackBuffer, FrameState, Pass, PassGraph, PassTarget, ProgramHandle,
    RenderTarget, ResourceId, ResourceSpec, scaled_size,
};
pub use preset::{BLOOM_SCALE, BloomResources, HeroPreset};
pub use software::{DrawRecord, Fragment, SoftwareEffect, SoftwareSurface};
pub use surface::{
    CLEAR_COLOR, CompiledProgram, Destination, MAX_DEVICE_PIXEL_RATIO, Precision, ProgramId,
    Surface, TargetId, Viewport,
};
pub use uniforms::{
    BoundUniform, BoundValue, UniformDecl, UniformKind, UniformTable, UniformValue, Uniforms,
    resolve,
};

/// CPU versions of the shading helpers shared by the built-in programs.
pub mod shading {
    pub use crate::software::{aces, cubic, ease, hash13, snoise, tint};
}

/// Building the hero preset into a caller-owned graph.
pub use preset::build as build_hero_preset;

// Re-export glam math types for convenience
pub use glam::{Vec2, Vec3, Vec4};
