//! Pass graph behaviour on the CPU backend: sizes, ping-pong, ordering, decay.

use flowline::{
    BuiltinEffects, CLEAR_COLOR, EffectConfig, EffectKind, FrameError, FrameState, InputState,
    PassGraph, PassTarget, Precision, ResourceSpec, SoftwareEffect, SoftwareSurface, Surface,
    UniformDecl, Uniforms, Vec4, build_hero_preset, scaled_size,
};

fn luminance(p: [f32; 4]) -> f32 {
    0.2126 * p[0] + 0.7152 * p[1] + 0.0722 * p[2]
}

/// Adds 1/8 to whatever its own feedback buffer held last frame.
fn accumulate() -> SoftwareEffect {
    SoftwareEffect::new("accumulate", vec![UniformDecl::texture("uTexture")], |frag| {
        frag.sample("uTexture", frag.uv) + Vec4::new(0.125, 0.0, 0.0, 0.0)
    })
}

#[test]
fn sizes_follow_the_latest_resize() {
    let mut surface = SoftwareSurface::new(64, 48);
    let mut graph = PassGraph::new(surface.size());
    let specs = [
        ResourceSpec::full_float(),
        ResourceSpec::new(0.5, Precision::Unorm8),
        ResourceSpec::new(0.33, Precision::HalfFloat),
    ];
    let targets: Vec<_> = specs.iter().map(|s| graph.add_target(&mut surface, *s)).collect();
    let feedback = graph.add_feedback(&mut surface, ResourceSpec::new(0.25, Precision::HalfFloat));

    for size in [(100, 100), (37, 91), (1, 1), (640, 360), (641, 359)] {
        surface.resize(size.0, size.1);
        graph.resize(&mut surface, size.0, size.1);

        for (id, spec) in targets.iter().zip(specs) {
            let expected = scaled_size(size, spec.scale);
            assert_eq!(graph.resource_size(*id), Some(expected), "{size:?} at {}", spec.scale);
            let target = graph.read_target(*id).unwrap();
            assert_eq!(surface.target_size(target), Some(expected));
        }
        let (read, write) = graph.feedback_sides(feedback).unwrap();
        let expected = scaled_size(size, 0.25);
        assert_eq!(surface.target_size(read), Some(expected));
        assert_eq!(surface.target_size(write), Some(expected));
    }
}

#[test]
fn feedback_cold_start_is_the_clear_color() {
    let mut surface = SoftwareSurface::new(16, 8);
    let mut graph = PassGraph::new(surface.size());
    let buffer = graph.add_feedback(&mut surface, ResourceSpec::full_float());

    let (read, write) = graph.feedback_sides(buffer).unwrap();
    for side in [read, write] {
        let pixels = surface.read_target(side).unwrap();
        assert_eq!(pixels.len(), 16 * 8);
        assert!(pixels.iter().all(|p| *p == CLEAR_COLOR));
    }
}

#[test]
fn ping_pong_parity_over_two_frames() {
    let mut surface = SoftwareSurface::new(8, 8);
    let mut graph = PassGraph::new(surface.size());
    let program = graph.add_program(&mut surface, &accumulate()).unwrap();
    let buffer = graph.add_feedback(&mut surface, ResourceSpec::full_float());
    graph
        .register_pass(program, PassTarget::Resource(buffer), move |_| {
            Uniforms::new().texture("uTexture", buffer)
        })
        .unwrap();
    let config = EffectConfig::default();
    let state = FrameState::at_rest((8, 8), &config);
    let (a, b) = graph.feedback_sides(buffer).unwrap();

    graph.run_frame(&mut surface, &state).unwrap();
    // The image just drawn is now `read`; the old `read` is the next `write`.
    assert_eq!(graph.feedback_sides(buffer), Some((b, a)));
    assert_eq!(surface.pixel(b, 3, 3).unwrap().x, 0.125);
    assert_eq!(surface.pixel(a, 3, 3).unwrap().x, 0.0);

    graph.run_frame(&mut surface, &state).unwrap();
    assert_eq!(graph.feedback_sides(buffer), Some((a, b)));
    assert_eq!(surface.pixel(a, 3, 3).unwrap().x, 0.25);
}

#[test]
fn non_feedback_reads_are_same_frame_fresh() {
    let mut surface = SoftwareSurface::new(4, 4);
    let mut graph = PassGraph::new(surface.size());

    let stamp_time = SoftwareEffect::new("a", vec![UniformDecl::scalar("time")], |frag| {
        Vec4::splat(frag.float("time"))
    });
    let copy = SoftwareEffect::new("b", vec![UniformDecl::texture("src")], |frag| {
        frag.sample("src", frag.uv)
    });
    let a_program = graph.add_program(&mut surface, &stamp_time).unwrap();
    let b_program = graph.add_program(&mut surface, &copy).unwrap();
    let a = graph.add_target(&mut surface, ResourceSpec::full_float());
    let b = graph.add_target(&mut surface, ResourceSpec::full_float());

    graph
        .register_pass(a_program, PassTarget::Resource(a), |s| Uniforms::new().float("time", s.time))
        .unwrap();
    graph
        .register_pass(b_program, PassTarget::Resource(b), move |_| Uniforms::new().texture("src", a))
        .unwrap();

    let config = EffectConfig::default();
    for (frame, time) in [0.25f32, 0.5].into_iter().enumerate() {
        let state = FrameState {
            time,
            ..FrameState::at_rest((4, 4), &config)
        };
        graph.run_frame(&mut surface, &state).unwrap();

        let b_target = graph.read_target(b).unwrap();
        assert_eq!(surface.pixel(b_target, 1, 1).unwrap().x, time, "frame {frame}");
    }
}

#[test]
fn feedback_self_reads_are_one_frame_stale() {
    let mut surface = SoftwareSurface::new(4, 4);
    let mut graph = PassGraph::new(surface.size());
    let stamp_time = SoftwareEffect::new("stamp", vec![UniformDecl::scalar("time")], |frag| {
        Vec4::splat(frag.float("time"))
    });
    let remember = SoftwareEffect::new(
        "remember",
        vec![UniformDecl::texture("self"), UniformDecl::texture("fresh")],
        |frag| {
            // Previous frame's value in red, this frame's in green.
            let previous = frag.sample("self", frag.uv).y;
            let fresh = frag.sample("fresh", frag.uv).x;
            Vec4::new(previous, fresh, 0.0, 1.0)
        },
    );
    let stamp_program = graph.add_program(&mut surface, &stamp_time).unwrap();
    let remember_program = graph.add_program(&mut surface, &remember).unwrap();
    let stamp = graph.add_target(&mut surface, ResourceSpec::full_float());
    let history = graph.add_feedback(&mut surface, ResourceSpec::full_float());
    graph
        .register_pass(stamp_program, PassTarget::Resource(stamp), |s| {
            Uniforms::new().float("time", s.time)
        })
        .unwrap();
    graph
        .register_pass(remember_program, PassTarget::Resource(history), move |_| {
            Uniforms::new().texture("self", history).texture("fresh", stamp)
        })
        .unwrap();

    let config = EffectConfig::default();
    for time in [1.0f32, 2.0, 3.0] {
        let state = FrameState {
            time,
            ..FrameState::at_rest((4, 4), &config)
        };
        graph.run_frame(&mut surface, &state).unwrap();
    }

    let read = graph.read_target(history).unwrap();
    let p = surface.pixel(read, 2, 2).unwrap();
    assert_eq!((p.x, p.y), (2.0, 3.0));
}

#[test]
fn dissipating_feedback_decays_toward_the_clear_color() {
    const SIZE: u32 = 256;
    const FRAMES: i32 = 10;

    let mut surface = SoftwareSurface::new(SIZE, SIZE);
    let mut graph = PassGraph::new(surface.size());
    let effect = surface.builtin(EffectKind::Flow);
    let program = graph.add_program(&mut surface, &effect).unwrap();
    let flow = graph.add_feedback(&mut surface, ResourceSpec::full_float());
    graph
        .register_pass(program, PassTarget::Resource(flow), move |s| {
            Uniforms::new()
                .texture("uTexture", flow)
                .float("time", s.time)
                .vec2("resolution", s.resolution)
                .float("falloff", s.config.flow.falloff)
                .float("alpha", s.config.flow.alpha)
                .float("dissipation", s.config.flow.dissipation)
                .vec2("mouse", s.pointer)
                .vec2("velocity", s.velocity)
        })
        .unwrap();

    let (seeded, _) = graph.feedback_sides(flow).unwrap();
    surface.fill_target_with(seeded, |x, y| {
        Vec4::new(x as f32 / 255.0, y as f32 / 255.0, 0.5, 1.0)
    });
    let initial = surface.read_target(seeded).unwrap();

    let mut config = EffectConfig::default();
    config.flow.dissipation = 0.95;
    // No pointer samples ever arrive: the pointer stays out of bounds.
    let mut input = InputState::new();
    for frame in 0..FRAMES {
        input.tick();
        let state = FrameState {
            time: frame as f32 / 60.0,
            pointer: input.position(),
            velocity: input.velocity(),
            ..FrameState::at_rest((SIZE, SIZE), &config)
        };
        graph.run_frame(&mut surface, &state).unwrap();
    }

    let final_read = graph.read_target(flow).unwrap();
    assert_eq!(final_read, seeded, "even frame count returns to the seeded side");
    let decayed = surface.read_target(final_read).unwrap();
    let bound = 0.95f32.powi(FRAMES);
    for (before, after) in initial.iter().zip(&decayed) {
        assert!(
            luminance(*after) <= luminance(*before) * bound + 1e-3,
            "{before:?} -> {after:?}"
        );
    }
}

#[test]
fn hero_preset_survives_a_mid_session_shrink() {
    let mut surface = SoftwareSurface::new(100, 100);
    let mut graph = PassGraph::new(surface.size());
    let preset = build_hero_preset(&mut graph, &mut surface, true).unwrap();
    let bloom = preset.bloom.unwrap();
    let config = EffectConfig::default();

    graph.run_frame(&mut surface, &FrameState::at_rest((100, 100), &config)).unwrap();

    surface.resize(50, 50);
    graph.resize(&mut surface, 50, 50);

    for id in [preset.flow, preset.cascade, preset.lines, preset.logo, bloom.pre_bloom] {
        assert_eq!(graph.resource_size(id), Some((50, 50)));
    }
    for id in [bloom.luminance, bloom.blur_h, bloom.blur_v] {
        assert_eq!(graph.resource_size(id), Some((25, 25)));
    }
    assert!(graph.run_frame(&mut surface, &FrameState::at_rest((50, 50), &config)).is_ok());
    assert_eq!(surface.presented(), 2);
}

#[test]
fn resize_keeps_feedback_contents() {
    let mut surface = SoftwareSurface::new(8, 8);
    let mut graph = PassGraph::new(surface.size());
    let buffer = graph.add_feedback(&mut surface, ResourceSpec::full_float());
    let (read, _) = graph.feedback_sides(buffer).unwrap();
    surface.fill_target_with(read, |_, _| Vec4::new(0.5, 0.25, 0.0, 1.0));

    graph.resize(&mut surface, 16, 4);

    assert_eq!(graph.feedback_sides(buffer).unwrap().0, read);
    let pixels = surface.read_target(read).unwrap();
    assert_eq!(pixels.len(), 16 * 4);
    assert!(pixels.iter().all(|p| *p == [0.5, 0.25, 0.0, 1.0]));
}

#[test]
fn outdated_screen_leaves_feedback_where_it_was() {
    let mut surface = SoftwareSurface::new(4, 4);
    let mut graph = PassGraph::new(surface.size());
    let add = graph.add_program(&mut surface, &accumulate()).unwrap();
    let show = SoftwareEffect::new("show", vec![UniformDecl::texture("src")], |frag| {
        frag.sample("src", frag.uv)
    });
    let show = graph.add_program(&mut surface, &show).unwrap();
    let buffer = graph.add_feedback(&mut surface, ResourceSpec::full_float());
    graph
        .register_pass(add, PassTarget::Resource(buffer), move |_| {
            Uniforms::new().texture("uTexture", buffer)
        })
        .unwrap();
    graph
        .register_pass(show, PassTarget::Screen, move |_| Uniforms::new().texture("src", buffer))
        .unwrap();
    let config = EffectConfig::default();
    let state = FrameState::at_rest((4, 4), &config);

    graph.run_frame(&mut surface, &state).unwrap();
    let sides = graph.feedback_sides(buffer).unwrap();

    surface.mark_outdated(1);
    assert_eq!(graph.run_frame(&mut surface, &state), Err(FrameError::Outdated));
    assert_eq!(graph.feedback_sides(buffer), Some(sides));
    assert_eq!(surface.pixel(sides.0, 1, 1).unwrap().x, 0.125);

    // The retried frame continues from the history the skipped one saw.
    graph.run_frame(&mut surface, &state).unwrap();
    let read = graph.read_target(buffer).unwrap();
    assert_eq!(surface.pixel(read, 1, 1).unwrap().x, 0.25);
    assert_eq!(surface.presented(), 2);
}
