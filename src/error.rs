//! Error types for setup, per-frame execution, logo loading and the host.
//!
//! Setup errors are fatal for the instance being constructed. Frame errors are
//! only ever produced by the backend (a lost or outdated surface); the graph
//! itself has no fallible per-frame work. Logo errors degrade the preset to a
//! blank logo input and never abort construction.

use thiserror::Error;

/// Failure while constructing an effect instance.
///
/// Any of these means no instance exists and no animation was started.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The drawing surface could not be created for the host window.
    #[error("drawing surface unavailable: {0}")]
    SurfaceUnavailable(String),
    /// No GPU adapter supports the surface.
    #[error("no suitable GPU adapter: {0}")]
    AdapterUnavailable(String),
    /// The logical device could not be created.
    #[error("failed to create GPU device: {0}")]
    DeviceRequest(String),
    /// The viewport reported a zero-sized drawable area at construction time.
    #[error("surface has zero size ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },
    /// An effect program failed to compile or link.
    #[error("effect program '{label}' failed to compile: {message}")]
    ProgramCompile { label: String, message: String },
    /// A pass was registered against a resource that cannot be drawn into.
    #[error("invalid pass target: {0}")]
    InvalidTarget(String),
}

/// Failure reported by the backend while drawing or presenting a frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The graphics context is gone. The instance stops and does not retry.
    #[error("graphics context lost")]
    ContextLost,
    /// The presentation surface must be reconfigured; the frame is skipped.
    #[error("surface outdated, frame skipped")]
    Outdated,
}

/// Failure while loading the external logo image.
#[derive(Debug, Error)]
pub enum LogoError {
    #[error("failed to load image '{url}': {source}")]
    Load {
        url: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image '{0}' has no pixels")]
    Empty(String),
}

/// Failure of the windowed host.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("event loop failed: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}
