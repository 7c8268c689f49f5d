//! The built-in effect programs and their uniform interfaces.
//!
//! Each backend ships its own rendition of these programs (WGSL for the GPU,
//! fragment closures for the software rasterizer), but both declare exactly
//! the slots listed here, in this order. On the GPU the order is also the
//! uniform buffer layout and the texture binding order.

use crate::surface::Surface;
use crate::uniforms::UniformDecl;

/// The built-in programs of the hero preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Cursor-driven flow field, fed back on itself.
    Flow,
    /// Logo stamp with decaying copies, fed back on itself.
    Cascade,
    /// Horizontal stripe overlay perturbed by flow.
    Lines,
    /// Composite and tone map.
    Output,
    /// Bright-pass extraction for bloom.
    BloomLuminance,
    /// Separable gaussian blur, direction passed as a uniform.
    BloomBlur,
    /// Scene plus tinted, blurred highlights.
    BloomComposite,
}

impl EffectKind {
    pub const ALL: [EffectKind; 7] = [
        EffectKind::Flow,
        EffectKind::Cascade,
        EffectKind::Lines,
        EffectKind::Output,
        EffectKind::BloomLuminance,
        EffectKind::BloomBlur,
        EffectKind::BloomComposite,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EffectKind::Flow => "flow",
            EffectKind::Cascade => "cascade",
            EffectKind::Lines => "lines",
            EffectKind::Output => "output",
            EffectKind::BloomLuminance => "bloom_luminance",
            EffectKind::BloomBlur => "bloom_blur",
            EffectKind::BloomComposite => "bloom_composite",
        }
    }

    /// Declared uniform slots, in binding order.
    pub fn uniforms(self) -> Vec<UniformDecl> {
        match self {
            EffectKind::Flow => vec![
                UniformDecl::texture("uTexture"),
                UniformDecl::scalar("time"),
                UniformDecl::vec2("resolution"),
                UniformDecl::scalar("falloff"),
                UniformDecl::scalar("alpha"),
                UniformDecl::scalar("dissipation"),
                UniformDecl::vec2("mouse"),
                UniformDecl::vec2("velocity"),
            ],
            EffectKind::Cascade => vec![
                UniformDecl::texture("uTexture"),
                UniformDecl::texture("img"),
                UniformDecl::scalar("time"),
                UniformDecl::vec2("resolution"),
                UniformDecl::scalar("copies_offset"),
                UniformDecl::scalar("grain"),
                UniformDecl::scalar("blend_delay"),
                UniformDecl::scalar("blend_factor"),
            ],
            EffectKind::Lines => vec![
                UniformDecl::texture("uTexture"),
                UniformDecl::texture("uFlow"),
                UniformDecl::scalar("time"),
                UniformDecl::vec2("resolution"),
                UniformDecl::scalar("spacing"),
                UniformDecl::scalar("thick"),
            ],
            EffectKind::Output => vec![
                UniformDecl::texture("uTexture"),
                UniformDecl::texture("uFlow"),
                UniformDecl::texture("uLines"),
                UniformDecl::scalar("time"),
            ],
            EffectKind::BloomLuminance => vec![
                UniformDecl::texture("uTexture"),
                UniformDecl::scalar("threshold"),
                UniformDecl::scalar("soft_knee"),
            ],
            EffectKind::BloomBlur => vec![
                UniformDecl::texture("uTexture"),
                UniformDecl::vec2("resolution"),
                UniformDecl::scalar("radius"),
                UniformDecl::vec2("direction"),
            ],
            EffectKind::BloomComposite => vec![
                UniformDecl::texture("uScene"),
                UniformDecl::texture("uBloom"),
                UniformDecl::scalar("time"),
                UniformDecl::scalar("intensity"),
                UniformDecl::scalar("noise_scale"),
            ],
        }
    }
}

/// Backends that ship the preset's programs.
pub trait BuiltinEffects: Surface {
    fn builtin(&self, kind: EffectKind) -> Self::Effect;
}
