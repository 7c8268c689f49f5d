//! Windowed host for one effect instance.
//!
//! The window plays the part of the embedding page: its inner size is the
//! viewport, cursor and touch events are the pointer, occlusion is visibility and
//! `request_redraw` is the display-refresh scheduler.
//!
//! Keys: `Space` toggles start/stop, `R` resets the animation.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, KeyEvent, Touch, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::EffectConfig;
use crate::effect::Effect;
use crate::error::{AppError, SetupError};
use crate::gpu::GpuContext;
use crate::gpu_surface::GpuSurface;
use crate::lifecycle::FrameScheduler;
use crate::logo::FileImageSource;
use crate::surface::Viewport;

/// Window and effect settings for [`run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub title: String,
    /// Initial inner size in logical pixels.
    pub width: u32,
    pub height: u32,
    pub config: EffectConfig,
    /// Open the window without starting the animation.
    pub paused: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            title: "flowline".to_string(),
            width: 1280,
            height: 720,
            config: EffectConfig::default(),
            paused: false,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn config(mut self, config: EffectConfig) -> Self {
        self.config = config;
        self
    }
}

/// Frame scheduler backed by winit redraw requests.
///
/// winit cannot withdraw a redraw request, so cancelling only forgets it;
/// the effect's lifecycle drops the redraw when it arrives.
pub struct WindowScheduler {
    window: Arc<Window>,
    pending: bool,
}

impl WindowScheduler {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            pending: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

impl FrameScheduler for WindowScheduler {
    fn schedule_next_frame(&mut self) {
        self.pending = true;
        self.window.request_redraw();
    }

    fn cancel_scheduled(&mut self) {
        self.pending = false;
    }
}

/// Open a window and animate the effect until it is closed.
pub fn run(options: RunOptions) -> Result<(), AppError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = FlowlineApp::Pending {
        options: Some(options),
    };
    event_loop.run_app(&mut app)?;

    match app {
        FlowlineApp::Failed(e) => Err(e.into()),
        _ => Ok(()),
    }
}

enum FlowlineApp {
    Pending {
        options: Option<RunOptions>,
    },
    Running {
        window: Arc<Window>,
        effect: Effect<GpuSurface>,
    },
    Failed(SetupError),
}

/// The viewport of `window` at physical size `size`.
fn viewport_of(window: &Window, size: PhysicalSize<u32>) -> Viewport {
    let scale = window.scale_factor() as f32;
    Viewport::new(size.width as f32 / scale, size.height as f32 / scale, scale)
}

/// Physical window pixels to the effect's device pixels, whose ratio is capped.
fn effect_point(
    position: PhysicalPosition<f64>,
    window_scale: f64,
    viewport: &Viewport,
) -> (f32, f32) {
    let k = viewport.dpr() / window_scale as f32;
    (position.x as f32 * k, position.y as f32 * k)
}

/// Touches drive the same single pointer as the mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TouchAction {
    Move,
    Leave,
}

fn touch_action(phase: TouchPhase) -> TouchAction {
    match phase {
        TouchPhase::Started | TouchPhase::Moved => TouchAction::Move,
        TouchPhase::Ended | TouchPhase::Cancelled => TouchAction::Leave,
    }
}

fn create_effect(
    event_loop: &ActiveEventLoop,
    options: RunOptions,
) -> Result<(Arc<Window>, Effect<GpuSurface>), SetupError> {
    let attrs = WindowAttributes::default()
        .with_title(&options.title)
        .with_inner_size(LogicalSize::new(options.width, options.height));
    let window = Arc::new(
        event_loop
            .create_window(attrs)
            .map_err(|e| SetupError::SurfaceUnavailable(e.to_string()))?,
    );

    let viewport = viewport_of(&window, window.inner_size());
    let (width, height) = viewport.device_size();
    let gpu = GpuContext::with_size(window.clone(), width, height)?;
    let surface = GpuSurface::new(gpu)?;
    let scheduler = WindowScheduler::new(window.clone());

    let mut effect = Effect::new(
        surface,
        viewport,
        options.config,
        Box::new(scheduler),
        &FileImageSource,
    )?;
    if !options.paused {
        effect.start(Instant::now());
    }
    Ok((window, effect))
}

impl ApplicationHandler for FlowlineApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let FlowlineApp::Pending { options } = self else {
            return;
        };
        let Some(options) = options.take() else {
            return;
        };

        *self = match create_effect(event_loop, options) {
            Ok((window, effect)) => FlowlineApp::Running { window, effect },
            Err(e) => {
                log::error!("{e}");
                event_loop.exit();
                FlowlineApp::Failed(e)
            }
        };
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let FlowlineApp::Running { window, effect } = self else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                effect.destroy();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                effect.resize(viewport_of(window, size));
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                effect.resize(viewport_of(window, window.inner_size()));
            }
            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = effect_point(position, window.scale_factor(), &effect.viewport());
                effect.pointer_move(x, y);
            }
            WindowEvent::CursorLeft { .. } => {
                effect.pointer_leave();
            }
            WindowEvent::Touch(Touch { phase, location, .. }) => match touch_action(phase) {
                TouchAction::Move => {
                    let (x, y) = effect_point(location, window.scale_factor(), &effect.viewport());
                    effect.pointer_move(x, y);
                }
                TouchAction::Leave => effect.pointer_leave(),
            },
            WindowEvent::Occluded(occluded) => {
                effect.set_visible(!occluded, Instant::now());
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match logical_key.as_ref() {
                Key::Named(NamedKey::Space) => {
                    if effect.is_running() {
                        effect.stop();
                    } else {
                        effect.start(Instant::now());
                    }
                }
                Key::Character("r") | Key::Character("R") => {
                    effect.reset(Instant::now());
                }
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                effect.frame(Instant::now());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touches_move_and_release_the_pointer() {
        assert_eq!(touch_action(TouchPhase::Started), TouchAction::Move);
        assert_eq!(touch_action(TouchPhase::Moved), TouchAction::Move);
        assert_eq!(touch_action(TouchPhase::Ended), TouchAction::Leave);
        assert_eq!(touch_action(TouchPhase::Cancelled), TouchAction::Leave);
    }

    #[test]
    fn window_pixels_follow_the_capped_ratio() {
        let position = PhysicalPosition::new(300.0, 150.0);

        let retina = Viewport::new(400.0, 300.0, 2.0);
        assert_eq!(effect_point(position, 2.0, &retina), (300.0, 150.0));

        // A 3x display renders at 2x, so window pixels shrink by 2/3.
        let dense = Viewport::new(400.0, 300.0, 3.0);
        let (x, y) = effect_point(position, 3.0, &dense);
        assert!((x - 200.0).abs() < 1e-3 && (y - 100.0).abs() < 1e-3, "{x},{y}");
    }
}
