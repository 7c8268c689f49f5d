//! Offline rendering on the CPU backend.
//!
//! Drives an [`Effect`] on a [`SoftwareSurface`] with a scripted pointer and
//! a fixed frame rate, then returns what ended up on screen. Used by the
//! binary's `--snapshot` mode and handy for eyeballing parameter changes
//! without a window.

use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::config::EffectConfig;
use crate::effect::Effect;
use crate::error::SetupError;
use crate::lifecycle::ManualScheduler;
use crate::logo::ImageSource;
use crate::software::SoftwareSurface;
use crate::surface::Viewport;

/// Size and length of an offline render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotOptions {
    /// Device pixels.
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub fps: f32,
    /// Sweep the pointer left to right across the middle while rendering.
    pub sweep_pointer: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            width: 320,
            height: 180,
            frames: 60,
            fps: 30.0,
            sweep_pointer: true,
        }
    }
}

/// Render `options.frames` frames and return the final screen image.
pub fn render_snapshot(
    config: EffectConfig,
    options: &SnapshotOptions,
    images: &dyn ImageSource,
) -> Result<RgbaImage, SetupError> {
    let scheduler = ManualScheduler::new();
    let mut effect = Effect::new(
        SoftwareSurface::new(options.width, options.height),
        Viewport::from_device(options.width, options.height),
        config,
        Box::new(scheduler.clone()),
        images,
    )?;

    let frame_time = Duration::from_secs_f32(1.0 / options.fps.max(1.0));
    let t0 = Instant::now();
    effect.start(t0);

    for i in 0..options.frames {
        if options.sweep_pointer {
            let progress = (i + 1) as f32 / options.frames as f32;
            effect.pointer_move(progress * options.width as f32, options.height as f32 * 0.5);
        }
        if !scheduler.fire() {
            break;
        }
        effect.frame(t0 + frame_time * i);
    }
    log::info!(
        "rendered {} frames at {}x{}",
        effect.frames_drawn(),
        options.width,
        options.height
    );

    let image = effect.surface().screen_image();
    effect.destroy();
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logo::FileImageSource;

    #[test]
    fn snapshot_has_the_requested_size() {
        let options = SnapshotOptions {
            width: 24,
            height: 12,
            frames: 4,
            ..Default::default()
        };
        let image = render_snapshot(EffectConfig::default(), &options, &FileImageSource).unwrap();
        assert_eq!(image.dimensions(), (24, 12));
        assert!(image.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn zero_sized_snapshot_is_rejected() {
        let options = SnapshotOptions {
            width: 0,
            ..Default::default()
        };
        assert!(matches!(
            render_snapshot(EffectConfig::default(), &options, &FileImageSource),
            Err(SetupError::ZeroSize { .. })
        ));
    }
}
