//! The hero preset: the one statically wired pass graph this crate ships.
//!
//! ```text
//!  pointer ──► flow (fb) ─────────────┬──────────────┐
//!                                     ▼              ▼
//!  logo ─────► cascade (fb) ──────► lines ───────► output ──► screen
//!                   │                                ▲
//!                   └────────────────────────────────┘
//! ```
//!
//! Flow and cascade are feedback passes (`fb`): each samples its own buffer,
//! which still holds the previous frame. Lines and output run later in the
//! same frame and so see this frame's flow and cascade.
//!
//! With bloom enabled, output renders into `pre_bloom` and four more passes
//! follow at half resolution: luminance, horizontal blur, vertical blur and
//! the composite to screen.

use glam::Vec2;

use crate::effects::{BuiltinEffects, EffectKind};
use crate::error::SetupError;
use crate::pass_graph::{
    FrameState, PassGraph, PassTarget, ProgramHandle, ResourceId, ResourceSpec, scaled_size,
};
use crate::surface::Precision;
use crate::uniforms::Uniforms;

/// Resolution scale of the bloom chain.
pub const BLOOM_SCALE: f32 = 0.5;

/// Resources of the bloom chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomResources {
    pub pre_bloom: ResourceId,
    pub luminance: ResourceId,
    pub blur_h: ResourceId,
    pub blur_v: ResourceId,
}

/// Resource ids of a built hero preset, for hosts and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeroPreset {
    pub flow: ResourceId,
    pub cascade: ResourceId,
    pub lines: ResourceId,
    /// Composed logo, filled by the host.
    pub logo: ResourceId,
    pub bloom: Option<BloomResources>,
}

/// Wire the hero preset into an empty `graph`.
///
/// On error the graph may hold some of the preset's resources; the caller
/// owns it and must [`destroy`](PassGraph::destroy) it.
pub fn build<S: BuiltinEffects>(
    graph: &mut PassGraph,
    surface: &mut S,
    with_bloom: bool,
) -> Result<HeroPreset, SetupError> {
    let flow_program = compile(graph, surface, EffectKind::Flow)?;
    let cascade_program = compile(graph, surface, EffectKind::Cascade)?;
    let lines_program = compile(graph, surface, EffectKind::Lines)?;
    let output_program = compile(graph, surface, EffectKind::Output)?;

    let flow = graph.add_feedback(surface, ResourceSpec::full_float());
    let cascade = graph.add_feedback(surface, ResourceSpec::full_float());
    let lines = graph.add_target(surface, ResourceSpec::full_unorm());
    let logo = graph.add_external(surface);

    graph.register_pass(flow_program, PassTarget::Resource(flow), move |s| {
        let flow_config = &s.config.flow;
        Uniforms::new()
            .texture("uTexture", flow)
            .float("time", s.time)
            .vec2("resolution", s.resolution)
            .float("falloff", flow_config.falloff)
            .float("alpha", flow_config.alpha)
            .float("dissipation", flow_config.dissipation)
            .vec2("mouse", s.pointer)
            .vec2("velocity", s.velocity)
    })?;

    graph.register_pass(cascade_program, PassTarget::Resource(cascade), move |s| {
        let c = &s.config.cascade;
        Uniforms::new()
            .texture("uTexture", cascade)
            .texture("img", logo)
            .float("time", s.time)
            .vec2("resolution", s.resolution)
            .float("copies_offset", c.copies_offset)
            .float("grain", c.grain)
            .float("blend_delay", c.blend_delay)
            .float("blend_factor", c.blend_factor)
    })?;

    graph.register_pass(lines_program, PassTarget::Resource(lines), move |s| {
        Uniforms::new()
            .texture("uTexture", cascade)
            .texture("uFlow", flow)
            .float("time", s.time)
            .vec2("resolution", s.resolution)
            .float("spacing", s.config.lines.spacing * s.device_pixel_ratio)
            .float("thick", s.config.lines.thick * s.device_pixel_ratio)
    })?;

    let output_uniforms = move |s: &FrameState| {
        Uniforms::new()
            .texture("uTexture", cascade)
            .texture("uLines", lines)
            .texture("uFlow", flow)
            .float("time", s.time)
    };

    let bloom = if with_bloom {
        let luminance_program = compile(graph, surface, EffectKind::BloomLuminance)?;
        let blur_program = compile(graph, surface, EffectKind::BloomBlur)?;
        let composite_program = compile(graph, surface, EffectKind::BloomComposite)?;

        let pre_bloom = graph.add_target(surface, ResourceSpec::full_unorm());
        let half = ResourceSpec::new(BLOOM_SCALE, Precision::Unorm8);
        let luminance = graph.add_target(surface, half);
        let blur_h = graph.add_target(surface, half);
        let blur_v = graph.add_target(surface, half);

        graph.register_pass(output_program, PassTarget::Resource(pre_bloom), output_uniforms)?;

        // `uLines` is not declared by the luminance program and is dropped.
        graph.register_pass(luminance_program, PassTarget::Resource(luminance), move |s| {
            Uniforms::new()
                .texture("uTexture", pre_bloom)
                .texture("uLines", lines)
                .float("threshold", s.config.bloom.threshold)
                .float("soft_knee", s.config.bloom.soft_knee)
        })?;

        register_blur(graph, blur_program, luminance, blur_h, Vec2::X)?;
        register_blur(graph, blur_program, blur_h, blur_v, Vec2::Y)?;

        graph.register_pass(composite_program, PassTarget::Screen, move |s| {
            Uniforms::new()
                .texture("uScene", pre_bloom)
                .texture("uBloom", blur_v)
                .float("time", s.time)
                .float("intensity", s.config.bloom.intensity)
                .float("noise_scale", s.config.bloom.noise_scale)
        })?;

        Some(BloomResources {
            pre_bloom,
            luminance,
            blur_h,
            blur_v,
        })
    } else {
        graph.register_pass(output_program, PassTarget::Screen, output_uniforms)?;
        None
    };

    log::debug!(
        "hero preset wired: {} passes, bloom {}",
        graph.passes().len(),
        if bloom.is_some() { "on" } else { "off" }
    );

    Ok(HeroPreset {
        flow,
        cascade,
        lines,
        logo,
        bloom,
    })
}

fn compile<S: BuiltinEffects>(
    graph: &mut PassGraph,
    surface: &mut S,
    kind: EffectKind,
) -> Result<ProgramHandle, SetupError> {
    let effect = surface.builtin(kind);
    graph.add_program(surface, &effect)
}

fn register_blur(
    graph: &mut PassGraph,
    program: ProgramHandle,
    source: ResourceId,
    target: ResourceId,
    direction: Vec2,
) -> Result<(), SetupError> {
    graph.register_pass(program, PassTarget::Resource(target), move |s| {
        let (w, h) = scaled_size((s.resolution.x as u32, s.resolution.y as u32), BLOOM_SCALE);
        Uniforms::new()
            .texture("uTexture", source)
            .vec2("resolution", [w as f32, h as f32])
            .float("radius", s.config.bloom.radius * s.device_pixel_ratio)
            .vec2("direction", direction)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectConfig;
    use crate::software::SoftwareSurface;
    use crate::surface::{Destination, Surface};

    fn built(with_bloom: bool) -> (SoftwareSurface, PassGraph, HeroPreset) {
        let mut surface = SoftwareSurface::new(16, 8);
        let mut graph = PassGraph::new(surface.size());
        let preset = build(&mut graph, &mut surface, with_bloom).unwrap();
        (surface, graph, preset)
    }

    #[test]
    fn plain_preset_draws_four_passes_in_order() {
        let (mut surface, mut graph, _) = built(false);
        let config = EffectConfig::default();

        graph.run_frame(&mut surface, &FrameState::at_rest((16, 8), &config)).unwrap();

        let labels: Vec<_> = surface.draws().iter().map(|d| d.program.as_str()).collect();
        assert_eq!(labels, ["flow", "cascade", "lines", "output"]);
        assert_eq!(surface.draws()[3].destination, Destination::Screen);
    }

    #[test]
    fn texture_units_restart_at_zero_for_every_pass() {
        let (mut surface, mut graph, preset) = built(false);
        let config = EffectConfig::default();
        let (flow_read, flow_write) = graph.feedback_sides(preset.flow).unwrap();

        graph.run_frame(&mut surface, &FrameState::at_rest((16, 8), &config)).unwrap();

        let draws = surface.draws();
        assert_eq!(draws[0].textures, vec![("uTexture", flow_read, 0)]);
        let units: Vec<u32> = draws[3].textures.iter().map(|t| t.2).collect();
        assert_eq!(units, [0, 1, 2]);
        // Output reads the flow image drawn earlier in the same frame.
        assert_eq!(draws[3].textures[2], ("uFlow", flow_write, 2));
    }

    #[test]
    fn bloom_chain_runs_at_half_resolution_and_skips_undeclared_inputs() {
        let (mut surface, mut graph, preset) = built(true);
        let config = EffectConfig::default();
        let bloom = preset.bloom.unwrap();

        graph.run_frame(&mut surface, &FrameState::at_rest((16, 8), &config)).unwrap();

        let labels: Vec<_> = surface.draws().iter().map(|d| d.program.as_str()).collect();
        assert_eq!(
            labels,
            [
                "flow",
                "cascade",
                "lines",
                "output",
                "bloom_luminance",
                "bloom_blur",
                "bloom_blur",
                "bloom_composite"
            ]
        );
        assert_eq!(graph.resource_size(bloom.blur_v), Some((8, 4)));
        assert_eq!(graph.resource_size(bloom.pre_bloom), Some((16, 8)));
        let luminance = &surface.draws()[4];
        assert_eq!(luminance.textures.len(), 1);
        assert_eq!(luminance.textures[0].0, "uTexture");
    }
}
