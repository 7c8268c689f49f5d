//! Loading the logo image and composing it into a surface-sized texture.
//!
//! The cascade pass samples the logo as a full-surface texture, so the logo is
//! drawn once on the CPU into an opaque black canvas at device resolution and
//! uploaded. This happens at setup and again after every resize.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::config::{LogoConfig, LogoPlacement};
use crate::error::LogoError;
use crate::surface::Viewport;

/// Fraction of the container width the logo may occupy at most.
const MAX_WIDTH_FRACTION: f32 = 0.9;
/// Top margin of the hero placement, as a fraction of the surface height.
const HERO_TOP_MARGIN: f32 = 0.025;

/// Resolves a logo location to decoded pixels.
pub trait ImageSource {
    fn load(&self, url: &str) -> Result<RgbaImage, LogoError>;
}

/// Loads images from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageSource;

impl ImageSource for FileImageSource {
    fn load(&self, url: &str) -> Result<RgbaImage, LogoError> {
        let image = image::open(url)
            .map_err(|source| LogoError::Load {
                url: url.to_owned(),
                source,
            })?
            .to_rgba8();
        if image.width() == 0 || image.height() == 0 {
            return Err(LogoError::Empty(url.to_owned()));
        }
        Ok(image)
    }
}

/// Where the logo lands in the composed texture, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoLayout {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    /// Source rows skipped from the top of the image.
    pub source_top: u32,
}

impl LogoLayout {
    /// Place an image of `image_size` source pixels on a surface described by `viewport`.
    pub fn compute(image_size: (u32, u32), viewport: &Viewport, config: &LogoConfig) -> Self {
        let (img_w, img_h) = (image_size.0.max(1) as f32, image_size.1 as f32);
        let (dev_w, dev_h) = viewport.device_size();
        let dpr = viewport.dpr();

        let max_width = config.max_width.min(viewport.css_width * MAX_WIDTH_FRACTION).max(0.0);
        let scale = max_width / img_w;
        let width = (img_w * scale * dpr).floor() as u32;
        let height = (img_h * scale * dpr).floor() as u32;
        let x = ((dev_w as f32 - width as f32) / 2.0).floor() as i64;

        match config.placement {
            LogoPlacement::Hero => Self {
                x,
                y: (dev_h as f32 * HERO_TOP_MARGIN).floor() as i64,
                width,
                height,
                source_top: 0,
            },
            LogoPlacement::Footer => {
                let source_top = config.clip_top.min(image_size.1);
                let clipped = (source_top as f32 * scale * dpr).floor() as u32;
                let height = height.saturating_sub(clipped);
                Self {
                    x,
                    y: dev_h as i64 - height as i64,
                    width,
                    height,
                    source_top,
                }
            }
        }
    }
}

/// Draw `logo` at `layout` onto an opaque black canvas of `size` device pixels.
///
/// Only the rows of the layout that land on the canvas are resampled, so a
/// logo scaled far taller than the surface costs no more than one that fits.
pub fn compose_logo(logo: &RgbaImage, layout: &LogoLayout, size: (u32, u32)) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(size.0.max(1), size.1.max(1), Rgba([0, 0, 0, 255]));
    if layout.width == 0 || layout.height == 0 || layout.source_top >= logo.height() {
        return canvas;
    }

    // Visible rows, in layout-local coordinates.
    let height = i64::from(layout.height);
    let first = (-layout.y).clamp(0, height) as u64;
    let last = (i64::from(canvas.height()) - layout.y).clamp(0, height) as u64;
    if first >= last {
        return canvas;
    }

    let source_rows = u64::from(logo.height() - layout.source_top);
    let src_first = first * source_rows / layout.height as u64;
    let src_last = (last * source_rows)
        .div_ceil(layout.height as u64)
        .clamp(src_first + 1, source_rows);

    let source = imageops::crop_imm(
        logo,
        0,
        layout.source_top + src_first as u32,
        logo.width(),
        (src_last - src_first) as u32,
    )
    .to_image();
    let scaled = imageops::resize(&source, layout.width, (last - first) as u32, FilterType::Triangle);
    imageops::overlay(&mut canvas, &scaled, layout.x, layout.y + first as i64);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(placement: LogoPlacement) -> LogoConfig {
        LogoConfig {
            url: None,
            max_width: 800.0,
            placement,
            clip_top: 30,
        }
    }

    #[test]
    fn hero_layout_is_centered_near_the_top() {
        let viewport = Viewport::new(1000.0, 500.0, 2.0);
        let layout = LogoLayout::compute((400, 100), &viewport, &config(LogoPlacement::Hero));

        // max width 800 css -> scale 2 -> 1600 device px at 2x
        assert_eq!((layout.width, layout.height), (1600, 400));
        assert_eq!(layout.x, 200);
        assert_eq!(layout.y, 25);
        assert_eq!(layout.source_top, 0);
    }

    #[test]
    fn narrow_containers_shrink_the_logo() {
        let viewport = Viewport::new(500.0, 300.0, 1.0);
        let layout = LogoLayout::compute((900, 300), &viewport, &config(LogoPlacement::Hero));

        assert_eq!(layout.width, 450);
        assert_eq!(layout.height, 150);
        assert_eq!(layout.x, 25);
    }

    #[test]
    fn footer_layout_clips_and_bottom_aligns() {
        let viewport = Viewport::new(1000.0, 600.0, 1.0);
        let layout = LogoLayout::compute((400, 100), &viewport, &config(LogoPlacement::Footer));

        // scale 2: 100 rows -> 200, minus 30 * 2 clipped
        assert_eq!(layout.height, 140);
        assert_eq!(layout.y, 460);
        assert_eq!(layout.source_top, 30);
    }

    #[test]
    fn compose_places_logo_on_black() {
        let logo = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let layout = LogoLayout {
            x: 5,
            y: 2,
            width: 10,
            height: 10,
            source_top: 0,
        };

        let canvas = compose_logo(&logo, &layout, (20, 20));

        assert_eq!(canvas.dimensions(), (20, 20));
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(10, 6), &Rgba([255, 255, 255, 255]));
    }

    /// 2x100 image: red top half, green bottom half.
    fn two_tone() -> RgbaImage {
        RgbaImage::from_fn(2, 100, |_, y| {
            if y < 50 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 255, 0, 255])
            }
        })
    }

    fn is_red(p: &Rgba<u8>) -> bool {
        p[0] > 250 && p[1] < 5
    }

    fn is_green(p: &Rgba<u8>) -> bool {
        p[1] > 250 && p[0] < 5
    }

    #[test]
    fn oversized_logo_is_cropped_to_the_canvas() {
        let layout = LogoLayout {
            x: 0,
            y: 2,
            width: 4,
            height: 1000,
            source_top: 0,
        };

        let canvas = compose_logo(&two_tone(), &layout, (8, 20));

        assert_eq!(canvas.dimensions(), (8, 20));
        assert_eq!(canvas.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
        for y in 2..20 {
            assert!(is_red(canvas.get_pixel(1, y)), "row {y}");
        }
        assert_eq!(canvas.get_pixel(6, 10), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn oversized_bottom_aligned_logo_shows_its_last_rows() {
        let layout = LogoLayout {
            x: 0,
            y: 20 - 1000,
            width: 4,
            height: 1000,
            source_top: 0,
        };

        let canvas = compose_logo(&two_tone(), &layout, (8, 20));

        for y in 0..20 {
            assert!(is_green(canvas.get_pixel(2, y)), "row {y}");
        }
    }

    #[test]
    fn logo_entirely_off_canvas_leaves_it_black() {
        let layout = LogoLayout {
            x: 0,
            y: 40,
            width: 4,
            height: 10,
            source_top: 0,
        };

        let canvas = compose_logo(&two_tone(), &layout, (8, 20));

        assert!(canvas.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = FileImageSource.load("definitely/not/here.png").unwrap_err();
        assert!(matches!(err, LogoError::Load { .. }));
    }
}
