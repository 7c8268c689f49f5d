//! CPU renditions of the built-in programs.
//!
//! These mirror `src/shaders/*.wgsl` line for line so headless frames look
//! like GPU frames, minus precision differences.

use glam::{Vec2, Vec3, Vec4};

use super::Fragment;

/// GLSL-style `fract`: always in `[0, 1)`.
fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn fract3(v: Vec3) -> Vec3 {
    v - v.floor()
}

/// GLSL-style `mod`, following the sign of `y`.
fn modulo(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn permute(x: Vec3) -> Vec3 {
    let v = (x * 34.0 + 1.0) * x;
    v - 289.0 * (v / 289.0).floor()
}

/// 2D simplex noise in roughly `[-1, 1]`.
pub fn snoise(v: Vec2) -> f32 {
    const C: Vec4 = Vec4::new(
        0.211_324_87,
        0.366_025_42,
        -0.577_350_26,
        0.024_390_243,
    );

    let i = (v + v.dot(Vec2::splat(C.y))).floor();
    let x0 = v - i + i.dot(Vec2::splat(C.x));
    let i1 = if x0.x > x0.y { Vec2::X } else { Vec2::Y };
    let x12_xy = x0 + C.x - i1;
    let x12_zw = x0 + C.z;
    let i = i - 289.0 * (i / 289.0).floor();

    let p = permute(
        permute(i.y + Vec3::new(0.0, i1.y, 1.0)) + i.x + Vec3::new(0.0, i1.x, 1.0),
    );
    let mut m = (Vec3::splat(0.5)
        - Vec3::new(x0.dot(x0), x12_xy.dot(x12_xy), x12_zw.dot(x12_zw)))
    .max(Vec3::ZERO);
    m = m * m;
    m = m * m;

    let x = 2.0 * fract3(p * C.w) - 1.0;
    let h = x.abs() - 0.5;
    let ox = (x + 0.5).floor();
    let a0 = x - ox;
    m *= 1.792_842_9 - 0.853_734_7 * (a0 * a0 + h * h);

    let g = Vec3::new(
        a0.x * x0.x + h.x * x0.y,
        a0.y * x12_xy.x + h.y * x12_xy.y,
        a0.z * x12_zw.x + h.z * x12_zw.y,
    );
    130.0 * m.dot(g)
}

/// Cheap 3D to 1D hash in `[0, 1)`.
pub fn hash13(p: Vec3) -> f32 {
    let mut p3 = fract3(p * 0.1031);
    p3 += p3.dot(Vec3::new(p3.z, p3.y, p3.x) + 31.32);
    fract((p3.x + p3.y) * p3.z)
}

/// Quadratic ease-in-out.
pub fn ease(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Cubic ease-in-out.
pub fn cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

fn palette(t: f32, a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> Vec3 {
    let phase = std::f32::consts::TAU * (c * t + d);
    a + b * Vec3::new(phase.x.cos(), phase.y.cos(), phase.z.cos())
}

/// Iridescent cosine palette.
pub fn tint(t: f32) -> Vec3 {
    palette(
        t,
        Vec3::splat(0.5),
        Vec3::splat(0.5),
        Vec3::new(1.0, 1.0, 0.5),
        Vec3::new(0.8, 0.9, 0.3),
    )
}

/// tanh-shaped tone curve clamped to `[0, 1]`.
pub fn aces(x: Vec3) -> Vec3 {
    let x = x.clamp(Vec3::splat(-40.0), Vec3::splat(40.0));
    let e = Vec3::new((-2.0 * x.x).exp(), (-2.0 * x.y).exp(), (-2.0 * x.z).exp());
    (-1.0 + 2.0 / (1.0 + e)).clamp(Vec3::ZERO, Vec3::ONE)
}

pub(super) fn flow(f: &Fragment) -> Vec4 {
    let uv = f.uv;
    let time = f.float("time");
    let resolution = f.vec2("resolution");
    let velocity = f.vec2("velocity");

    let color = f.sample("uTexture", uv) * f.float("dissipation");

    let mut cursor = uv - f.vec2("mouse");
    if resolution.y > 0.0 {
        cursor.x *= resolution.x / resolution.y;
    }
    let angle = cursor.y.atan2(cursor.x);
    let dist = cursor.length();
    let loop_coord = Vec2::new(
        (angle + time + velocity.y).cos(),
        (angle + time + velocity.x).sin(),
    );
    let noise = snoise(loop_coord + dist + time * 0.1 + velocity.length()) * 0.125;
    let blob = dist * (1.0 + noise);

    let stamp = Vec3::new(
        velocity.x,
        -velocity.y,
        (velocity * (1.0 - blob)).length().min(1.0),
    );
    let fall = smoothstep(f.float("falloff"), 0.0, blob) * f.float("alpha");
    color.truncate().lerp(stamp, fall).extend(1.0)
}

pub(super) fn cascade(f: &Fragment) -> Vec4 {
    let time = f.float("time");
    let copies_offset = f.float("copies_offset");
    let grain = f.float("grain");
    let blend_delay = f.float("blend_delay");
    let blend_factor = f.float("blend_factor");

    let fade_window = blend_delay * 0.25;
    let fade_in = if fade_window > 0.0 { (time / fade_window).min(1.0) } else { 1.0 };
    let stamp = f.sample("img", f.uv) * fade_in;

    let progress = if blend_delay > 0.0 { (time / blend_delay).min(1.0) } else { 1.0 };
    let off_progress = mix(0.1, 0.01, cubic(progress));
    let off = -copies_offset * off_progress * cubic(progress);

    let fc = f.frag_coord;
    let salt = hash13(Vec3::new(fc.x, fc.y, 3.0) + time * 500.0 + 50.0) * 2.0 - 1.0;
    let salt2 =
        hash13(Vec3::new(fc.x * 256.0, fc.y * 256.0, 7.0) + time * 1100.0 + 31.0) * 2.0 - 1.0;

    let spread = Vec2::new(
        mix(0.0, 0.125, cubic(cubic(progress))),
        mix(0.0, 0.025, ease(progress)),
    );
    let mut uv = f.uv - 0.5;
    uv *= Vec2::new(0.9, 0.975) + spread;
    uv.y -= off;
    uv -= Vec2::new(-salt2, salt) * (grain / 10.0) * 0.25;
    uv += 0.5;

    let previous = f.sample("uTexture", uv);

    let mix_factor = if time < blend_delay {
        blend_factor
    } else {
        mix(blend_factor, 1.0, ((time - blend_delay) / (blend_delay + 1.0)).min(1.0))
    };
    let color = previous.lerp(stamp, ease(mix_factor));
    color.lerp(stamp, cubic((time - blend_delay * 0.5).clamp(0.0, 1.0)))
}

fn to_stripe(y: f32, bright: f32, spacing: f32) -> f32 {
    let saw = modulo(y, spacing) - 0.5 * spacing;
    (saw.abs() - 0.5 * (1.0 - bright)).clamp(0.0, 1.0)
}

pub(super) fn lines(f: &Fragment) -> Vec4 {
    let time = f.float("time");
    let spacing = f.float("spacing");
    let resolution = f.vec2("resolution");
    if spacing <= 0.0 || resolution.min_element() <= 0.0 {
        return Vec4::new(1.0, 1.0, 1.0, 1.0);
    }

    let flow = f.sample("uFlow", f.uv).z;
    let frag = f.uv * resolution;
    let row = frag.y - modulo(frag.y, spacing);
    let noise = snoise(Vec2::new(frag.x, row) / resolution * 0.0125 + flow + time);

    let bright = (flow * 0.25).clamp(0.0, 1.0);
    let perturbed = frag.y - spacing * bright;
    let stripe = to_stripe(perturbed, bright + noise, spacing);
    Vec3::splat(1.0 - stripe).extend(1.0)
}

pub(super) fn output(f: &Fragment) -> Vec4 {
    let uv = f.uv;
    let time = f.float("time");
    let sampled = f.sample("uTexture", uv).x;
    let lined = f.sample("uLines", uv).x;
    let flow = f.sample("uFlow", uv).z;

    let render = lined * sampled + sampled + flow * lined;
    let tinted = tint(render + 1.0 + uv.y * 0.5 + (time + uv.y).sin() * 0.35);
    let colored = Vec3::splat(render).lerp(tinted, 1.0 - render) * 4.0;
    let to_screen = colored * render;
    let fade_in = ease((time / 2.0).min(1.0));
    aces(to_screen * fade_in * 2.0).extend(1.0)
}

pub(super) fn bloom_luminance(f: &Fragment) -> Vec4 {
    let threshold = f.float("threshold");
    let knee = f.float("soft_knee");
    let color = f.sample("uTexture", f.uv).truncate();

    let luma = color.dot(Vec3::new(0.2126, 0.7152, 0.0722));
    let soft = ((luma - threshold + knee) / (2.0 * knee + 0.0001)).clamp(0.0, 1.0);
    let hard = if luma >= threshold { 1.0 } else { 0.0 };
    (color * (soft * soft).max(hard)).extend(1.0)
}

const BLUR_WEIGHTS: [f32; 5] = [0.227_027, 0.194_594_6, 0.121_621_6, 0.054_054, 0.016_216];

pub(super) fn bloom_blur(f: &Fragment) -> Vec4 {
    let resolution = f.vec2("resolution").max(Vec2::ONE);
    let step = f.vec2("direction") * f.float("radius") / resolution;

    let mut sum = f.sample("uTexture", f.uv).truncate() * BLUR_WEIGHTS[0];
    for (i, weight) in BLUR_WEIGHTS.iter().enumerate().skip(1) {
        let offset = step * i as f32;
        sum += f.sample("uTexture", f.uv + offset).truncate() * *weight;
        sum += f.sample("uTexture", f.uv - offset).truncate() * *weight;
    }
    sum.extend(1.0)
}

pub(super) fn bloom_composite(f: &Fragment) -> Vec4 {
    let uv = f.uv;
    let time = f.float("time");
    let scene = f.sample("uScene", uv).truncate();
    let bloom = f.sample("uBloom", uv).truncate();

    let n = snoise(uv * f.float("noise_scale") + time * 0.05) * 0.5 + 0.5;
    let tinted = bloom * tint(n + uv.y * 0.3 + time * 0.1);
    (scene + tinted * f.float("intensity")).extend(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glsl_mod_follows_divisor_sign() {
        assert_eq!(modulo(-1.0, 8.0), 7.0);
        assert_eq!(modulo(9.0, 8.0), 1.0);
    }

    #[test]
    fn easing_curves_hit_their_endpoints() {
        for curve in [ease, cubic] {
            assert_eq!(curve(0.0), 0.0);
            assert_eq!(curve(1.0), 1.0);
            assert!((curve(0.5) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn noise_stays_in_range_and_is_deterministic() {
        for i in 0..200 {
            let p = Vec2::new(i as f32 * 0.37 - 30.0, i as f32 * 0.11 + 4.0);
            let n = snoise(p);
            assert!((-1.05..=1.05).contains(&n), "{p} -> {n}");
            assert_eq!(n, snoise(p));
        }
    }

    #[test]
    fn hash_is_in_unit_interval() {
        for i in 0..100 {
            let h = hash13(Vec3::new(i as f32, i as f32 * 3.0, 7.0));
            assert!((0.0..1.0).contains(&h));
        }
    }

    #[test]
    fn tone_curve_maps_zero_to_black_and_saturates() {
        assert_eq!(aces(Vec3::ZERO), Vec3::ZERO);
        assert!(aces(Vec3::splat(100.0)).min_element() > 0.999);
        assert_eq!(aces(Vec3::splat(-3.0)), Vec3::ZERO);
    }

    #[test]
    fn blur_weights_sum_to_one() {
        let total = BLUR_WEIGHTS[0] + 2.0 * BLUR_WEIGHTS[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-3);
    }
}
