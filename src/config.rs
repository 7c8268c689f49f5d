//! Effect parameters.
//!
//! The configuration is owned by the instance and read once per frame, so a
//! host (or a tweaking panel) can mutate it between frames through
//! [`Effect::config_mut`](crate::Effect::config_mut). Every section falls back
//! to its defaults, so a JSON file only needs the values it changes:
//!
//! ```
//! use flowline::EffectConfig;
//!
//! let config = EffectConfig::from_json_str(r#"{ "flow": { "dissipation": 0.95 } }"#).unwrap();
//! assert_eq!(config.flow.dissipation, 0.95);
//! assert_eq!(config.flow.falloff, 0.3);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Cursor-driven flow field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Radius of the cursor stamp, in normalized units.
    pub falloff: f32,
    /// Opacity of the stamp.
    pub alpha: f32,
    /// Multiplier applied to last frame's field every frame.
    pub dissipation: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            falloff: 0.3,
            alpha: 0.5,
            dissipation: 0.975,
        }
    }
}

/// Logo stamp with trailing copies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub copies_offset: f32,
    pub grain: f32,
    /// Seconds before the stamp settles on the logo.
    pub blend_delay: f32,
    pub blend_factor: f32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            copies_offset: 0.95,
            grain: 0.5,
            blend_delay: 5.0,
            blend_factor: 0.25,
        }
    }
}

/// Stripe overlay. Both values are in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinesConfig {
    pub spacing: f32,
    pub thick: f32,
}

impl Default for LinesConfig {
    fn default() -> Self {
        Self {
            spacing: 8.0,
            thick: 2.5,
        }
    }
}

/// Optional half-resolution bloom chain before the screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    pub enabled: bool,
    pub threshold: f32,
    pub soft_knee: f32,
    /// Blur radius in CSS pixels.
    pub radius: f32,
    pub intensity: f32,
    pub noise_scale: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.3,
            soft_knee: 0.5,
            radius: 4.0,
            intensity: 0.8,
            noise_scale: 0.25,
        }
    }
}

/// Where the logo sits in the composed texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoPlacement {
    /// Centered horizontally near the top.
    #[default]
    Hero,
    /// Bottom-aligned with the top rows clipped.
    Footer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoConfig {
    /// Image to composite into the cascade. `None` renders without a logo.
    pub url: Option<String>,
    /// Maximum logo width in CSS pixels.
    pub max_width: f32,
    pub placement: LogoPlacement,
    /// Source rows cut from the top in footer placement.
    pub clip_top: u32,
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_width: 800.0,
            placement: LogoPlacement::Hero,
            clip_top: 30,
        }
    }
}

/// All parameters of one effect instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub flow: FlowConfig,
    pub cascade: CascadeConfig,
    pub lines: LinesConfig,
    pub bloom: BloomConfig,
    pub logo: LogoConfig,
    /// Seconds after which the animation restarts from a cleared state.
    /// Zero disables looping.
    pub loop_duration: f32,
}

impl EffectConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_json_str(&text)?)
    }

    pub fn loops(&self) -> bool {
        self.loop_duration > 0.0
    }
}

/// Failure reading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
