//! The embeddable effect instance.
//!
//! An [`Effect`] owns everything one animated surface needs: the backend
//! surface, the hero preset's pass graph, the clock, pointer state, the
//! lifecycle state machine and the host's frame scheduler. Instances share
//! nothing, so any number of them can live side by side.
//!
//! The host feeds it three kinds of signals (resize, pointer, visibility)
//! plus the frames its scheduler delivers:
//!
//! ```
//! use std::time::{Duration, Instant};
//! use flowline::{Effect, EffectConfig, FileImageSource, ManualScheduler, SoftwareSurface, Viewport};
//!
//! let scheduler = ManualScheduler::new();
//! let mut effect = Effect::new(
//!     SoftwareSurface::new(32, 16),
//!     Viewport::from_device(32, 16),
//!     EffectConfig::default(),
//!     Box::new(scheduler.clone()),
//!     &FileImageSource,
//! )
//! .unwrap();
//!
//! let t0 = Instant::now();
//! effect.start(t0);
//! effect.pointer_move(8.0, 8.0);
//! while scheduler.fire() && effect.frames_drawn() < 3 {
//!     effect.frame(t0 + Duration::from_millis(16 * effect.frames_drawn()));
//! }
//! assert_eq!(effect.frames_drawn(), 3);
//! effect.destroy();
//! ```

use std::time::Instant;

use glam::Vec2;
use image::RgbaImage;

use crate::clock::Clock;
use crate::config::EffectConfig;
use crate::effects::BuiltinEffects;
use crate::error::{FrameError, SetupError};
use crate::input::InputState;
use crate::lifecycle::{FrameScheduler, Lifecycle, Transition};
use crate::logo::{ImageSource, LogoLayout, compose_logo};
use crate::pass_graph::{FrameState, PassGraph};
use crate::preset::{self, HeroPreset};
use crate::surface::{Surface, Viewport};

/// One running (or paused) instance of the hero effect.
pub struct Effect<S: Surface> {
    surface: S,
    graph: PassGraph,
    preset: HeroPreset,
    viewport: Viewport,
    config: EffectConfig,
    scheduler: Box<dyn FrameScheduler>,
    lifecycle: Lifecycle,
    clock: Clock,
    input: InputState,
    logo: Option<RgbaImage>,
    last_frame: Option<Instant>,
    frames: u64,
    destroyed: bool,
}

impl<S: BuiltinEffects> Effect<S> {
    /// Build the hero preset on `surface` and load the logo.
    ///
    /// The instance starts stopped with every buffer at its cold-start
    /// image; call [`start`](Self::start) to begin animating. A logo that
    /// fails to load is logged and replaced by a blank input.
    ///
    /// # Arguments
    ///
    /// * `surface` - Backend to draw on; resized to the viewport's device size
    /// * `viewport` - Initial drawable area in CSS pixels plus pixel ratio
    /// * `config` - Effect parameters; `bloom.enabled` is fixed from here on
    /// * `scheduler` - Host hook that delivers frames
    /// * `images` - Resolves `config.logo.url` to pixels
    ///
    /// # Errors
    ///
    /// [`SetupError::ZeroSize`] for an empty viewport, or whatever the
    /// backend reports while compiling the preset's programs. No resources
    /// are left allocated on failure.
    pub fn new(
        mut surface: S,
        viewport: Viewport,
        config: EffectConfig,
        scheduler: Box<dyn FrameScheduler>,
        images: &dyn ImageSource,
    ) -> Result<Self, SetupError> {
        let (width, height) = viewport.device_size();
        if width == 0 || height == 0 {
            return Err(SetupError::ZeroSize { width, height });
        }
        surface.resize(width, height);

        let mut graph = PassGraph::new((width, height));
        let preset = match preset::build(&mut graph, &mut surface, config.bloom.enabled) {
            Ok(preset) => preset,
            Err(e) => {
                graph.destroy(&mut surface);
                return Err(e);
            }
        };

        let logo = config.logo.url.as_deref().and_then(|url| match images.load(url) {
            Ok(image) => {
                log::debug!("loaded logo '{url}' ({}x{})", image.width(), image.height());
                Some(image)
            }
            Err(e) => {
                log::warn!("{e}; continuing without logo");
                None
            }
        });

        let mut effect = Self {
            surface,
            graph,
            preset,
            viewport,
            config,
            scheduler,
            lifecycle: Lifecycle::new(),
            clock: Clock::new(),
            input: InputState::new(),
            logo,
            last_frame: None,
            frames: 0,
            destroyed: false,
        };
        effect.upload_logo();
        effect.graph.clear(&mut effect.surface);
        log::info!("effect ready at {width}x{height}");
        Ok(effect)
    }
}

impl<S: Surface> Effect<S> {
    /// Begin animating from time zero. Feedback contents are kept.
    pub fn start(&mut self, now: Instant) {
        if self.destroyed {
            return;
        }
        if self.lifecycle.start(self.scheduler.as_mut()) == Transition::Started {
            self.clock.start(now);
            log::debug!("started");
        }
    }

    /// Pause. The pending frame is withdrawn before this returns.
    pub fn stop(&mut self) {
        if self.lifecycle.stop(self.scheduler.as_mut()) == Transition::Stopped {
            self.clock.stop(self.last_frame.unwrap_or_else(Instant::now));
            log::debug!("stopped");
        }
    }

    /// Clear all feedback history and restart the clock. Resources are kept.
    pub fn reset(&mut self, now: Instant) {
        if self.destroyed {
            return;
        }
        self.graph.clear(&mut self.surface);
        self.clock.reset(now);
        log::debug!("reset");
    }

    /// Stop and release every surface resource. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop();
        self.graph.destroy(&mut self.surface);
        self.destroyed = true;
        log::debug!("destroyed after {} frames", self.frames);
    }

    /// The host's drawable area changed.
    pub fn resize(&mut self, viewport: Viewport) {
        if self.destroyed {
            return;
        }
        let (width, height) = viewport.device_size();
        if width == 0 || height == 0 {
            log::debug!("ignoring zero-sized resize");
            return;
        }
        let previous = std::mem::replace(&mut self.viewport, viewport);
        if (width, height) != self.graph.size() {
            self.surface.resize(width, height);
            self.graph.resize(&mut self.surface, width, height);
            log::debug!("resized to {width}x{height}");
        } else if previous == viewport {
            return;
        }
        // The logo layout depends on the CSS width and pixel ratio, not just
        // the device size.
        self.upload_logo();
    }

    /// Pointer sample in device pixels relative to the surface's top-left corner.
    pub fn pointer_move(&mut self, x: f32, y: f32) {
        self.input.on_pointer_sample(Vec2::new(x, y), self.graph.resolution());
    }

    /// The pointer left the surface. Velocity starts decaying faster; the last
    /// position is kept.
    pub fn pointer_leave(&mut self) {
        self.input.on_pointer_leave();
    }

    /// The surface entered or left the viewport.
    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        if self.destroyed {
            return;
        }
        match self.lifecycle.set_visible(visible, self.scheduler.as_mut()) {
            Transition::Started => self.clock.start(now),
            Transition::Stopped => self.clock.stop(now),
            Transition::Unchanged => {}
        }
    }

    /// Draw one frame if one was scheduled, then schedule the next.
    ///
    /// A lost context stops the instance for good; an outdated surface
    /// skips this frame only and leaves the feedback history untouched.
    ///
    /// # Arguments
    ///
    /// * `now` - Timestamp of the frame as handed out by the scheduler
    ///
    /// # Returns
    ///
    /// `true` if a frame was drawn and presented.
    pub fn frame(&mut self, now: Instant) -> bool {
        if self.destroyed || !self.lifecycle.take_frame() {
            return false;
        }
        self.last_frame = Some(now);

        let time = self.clock.elapsed(now);
        self.input.tick();
        let state = FrameState {
            time,
            resolution: self.graph.resolution(),
            device_pixel_ratio: self.viewport.dpr(),
            pointer: self.input.position(),
            velocity: self.input.velocity(),
            config: &self.config,
        };

        let drawn = match self.graph.run_frame(&mut self.surface, &state) {
            Ok(()) => true,
            Err(FrameError::Outdated) => {
                log::debug!("surface outdated, frame skipped");
                false
            }
            Err(e @ FrameError::ContextLost) => {
                log::error!("{e}; stopping");
                self.stop();
                return false;
            }
        };
        if drawn {
            self.frames += 1;
        }

        if self.config.loops() && time >= self.config.loop_duration {
            self.graph.clear(&mut self.surface);
            self.clock.reset(now);
            self.input.reset_velocity();
            log::debug!("loop restarted after {time:.2}s");
        }

        self.lifecycle.request_next(self.scheduler.as_mut());
        drawn
    }

    fn upload_logo(&mut self) {
        let size = self.graph.size();
        match &self.logo {
            Some(image) => {
                let layout = LogoLayout::compute(image.dimensions(), &self.viewport, &self.config.logo);
                let composed = compose_logo(image, &layout, size);
                self.graph.upload(&mut self.surface, self.preset.logo, &composed);
            }
            None => self.graph.clear_external(&mut self.surface, self.preset.logo),
        }
    }

    /// Seconds on the clock at `now`.
    pub fn elapsed(&self, now: Instant) -> f32 {
        self.clock.elapsed(now)
    }

    /// Parameters read by the next frame.
    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    /// Parameters are re-read every frame, so changes apply from the next one.
    pub fn config_mut(&mut self) -> &mut EffectConfig {
        &mut self.config
    }

    /// Whether frames are being scheduled.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Whether [`destroy`](Self::destroy) has released the surface resources.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// The running/stopped state machine, for hosts that mirror it in their UI.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Pointer position and smoothed velocity as of the last frame.
    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// The pass graph behind the preset.
    ///
    /// Together with [`preset`](Self::preset) this lets a host read any
    /// intermediate buffer, e.g. for debugging overlays.
    pub fn graph(&self) -> &PassGraph {
        &self.graph
    }

    /// Resource handles of the hero preset.
    pub fn preset(&self) -> &HeroPreset {
        &self.preset
    }

    /// The backend surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable access to the backend surface.
    ///
    /// Drawing through it directly bypasses the graph; use it for backend
    /// controls such as reconfiguration.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// The viewport of the last accepted resize.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Whether a logo image was loaded. `false` means the logo input is blank.
    pub fn has_logo(&self) -> bool {
        self.logo.is_some()
    }

    /// Frames drawn since construction. Skipped and dropped frames do not count.
    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }
}

impl<S: Surface> Drop for Effect<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<S: Surface> std::fmt::Debug for Effect<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("size", &self.graph.size())
            .field("lifecycle", &self.lifecycle)
            .field("frames", &self.frames)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}
