//! Particle Operations - Pure DOP Functions
//!
//! Host-side sampling of freshly spawned particles and the reference
//! simulation step. The CPU backend runs `step_particle` directly; the WGSL
//! kernel in `shaders/particle_simulation.wgsl` mirrors it line for line.

use super::particle_data::{EmitterParams, GpuColorMark, GpuParticle, SpawnOrigin, SpawnRequest};
use crate::constants::gpu_limits::SHAPE_MASK_ALPHA_CUTOFF;
use glam::{Vec2, Vec4};
use rand::Rng;

/// Uniform draw from a `[min, max]` range. Degenerate ranges collapse to the
/// fixed value, inverted ranges are sampled between the swapped bounds.
pub fn sample_range<R: Rng + ?Sized>(rng: &mut R, range: Vec2) -> f32 {
    let (lo, hi) = if range.x <= range.y {
        (range.x, range.y)
    } else {
        (range.y, range.x)
    };

    if lo == hi || !(hi - lo).is_finite() {
        return lo;
    }

    rng.gen_range(lo..=hi)
}

/// Sample one particle from the spawn ranges
pub fn spawn_particle<R: Rng + ?Sized>(
    rng: &mut R,
    request: &SpawnRequest,
    origin: &SpawnOrigin,
) -> GpuParticle {
    let lifetime = sample_range(rng, request.lifetime).max(0.0);
    let scale = sample_range(rng, request.scale);
    let direction = sample_range(rng, request.direction);
    let speed = sample_range(rng, request.speed);
    let friction = sample_range(rng, request.friction);

    let rotation = if request.use_direction_for_rotation {
        direction
    } else {
        sample_range(rng, request.image_rotation)
    };

    let heading = direction.to_radians();
    let velocity = Vec2::new(heading.cos(), heading.sin()) * speed;

    let offset = Vec2::new(
        footprint_offset(rng, origin.footprint.x),
        footprint_offset(rng, origin.footprint.y),
    );
    let position = origin.position + Vec4::new(offset.x, offset.y, 0.0, 0.0);

    GpuParticle {
        position: position.to_array(),
        color: origin.base_color.to_array(),
        velocity: velocity.to_array(),
        acceleration: request.acceleration.to_array(),
        scale,
        rotation,
        friction,
        lifetime,
        max_lifetime: lifetime,
        age: 0.0,
        seed: rng.gen(),
        _padding: 0,
    }
}

fn footprint_offset<R: Rng + ?Sized>(rng: &mut R, extent: f32) -> f32 {
    if extent == 0.0 {
        return 0.0;
    }
    sample_range(rng, Vec2::new(-0.5, 0.5)) * extent
}

/// Linear interpolation across gradient marks, clamped at both ends
pub fn sample_gradient(marks: &[GpuColorMark], t: f32) -> [f32; 4] {
    let Some(first) = marks.first() else {
        return [1.0; 4];
    };

    let t = t.clamp(0.0, 1.0);
    if t <= first.position {
        return first.color;
    }

    for pair in marks.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if t <= b.position {
            let span = b.position - a.position;
            let f = if span > 0.0 {
                ((t - a.position) / span).clamp(0.0, 1.0)
            } else {
                1.0
            };
            let blended = Vec4::from(a.color).lerp(Vec4::from(b.color), f);
            return blended.to_array();
        }
    }

    marks[marks.len() - 1].color
}

/// Footprint UV of a particle relative to its emitter, or `None` when the
/// footprint is degenerate.
pub fn footprint_uv(particle: &GpuParticle, emitter: &EmitterParams) -> Option<[f32; 2]> {
    let [sx, sy] = emitter.scale;
    if sx == 0.0 || sy == 0.0 {
        return None;
    }
    Some([
        (particle.position[0] - emitter.position[0]) / sx + 0.5,
        (particle.position[1] - emitter.position[1]) / sy + 0.5,
    ])
}

/// Advance one particle by `dt` seconds.
///
/// `mask_alpha` returns the shape-mask alpha at a footprint UV; it is only
/// consulted on a particle's first step.
pub fn step_particle<F>(
    particle: &GpuParticle,
    dt: f32,
    emitter: &EmitterParams,
    gradient: &[GpuColorMark],
    mask_alpha: F,
) -> GpuParticle
where
    F: Fn([f32; 2]) -> f32,
{
    let mut out = *particle;

    if out.lifetime <= 0.0 {
        out.lifetime = 0.0;
        return out;
    }

    if out.age == 0.0 {
        if let Some(uv) = footprint_uv(&out, emitter) {
            if mask_alpha(uv) < SHAPE_MASK_ALPHA_CUTOFF {
                out.lifetime = 0.0;
                return out;
            }
        }
    }

    let mut velocity = Vec2::from(out.velocity) + Vec2::from(out.acceleration) * dt;
    velocity *= (1.0 - out.friction * dt).max(0.0);

    out.velocity = velocity.to_array();
    out.position[0] += velocity.x * dt;
    out.position[1] += velocity.y * dt;
    out.age += dt;
    out.lifetime = (out.lifetime - dt).max(0.0);

    let marks = &gradient[..gradient.len().min(emitter.gradient_mark_count() as usize)];
    let life = if out.max_lifetime > 0.0 {
        out.age / out.max_lifetime
    } else {
        1.0
    };
    out.color = sample_gradient(marks, life);

    out
}

pub fn is_expired(particle: &GpuParticle) -> bool {
    particle.lifetime <= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn origin() -> SpawnOrigin {
        SpawnOrigin {
            position: Vec4::new(1.0, 2.0, 0.0, 1.0),
            footprint: Vec2::ZERO,
            base_color: Vec4::ONE,
        }
    }

    fn mark(position: f32, color: [f32; 4]) -> GpuColorMark {
        GpuColorMark {
            color,
            position,
            _padding: [0.0; 3],
        }
    }

    #[test]
    fn test_degenerate_range_is_constant() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            assert_eq!(sample_range(&mut rng, Vec2::new(1.0, 1.0)), 1.0);
        }
    }

    #[test]
    fn test_inverted_range_stays_inside_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let v = sample_range(&mut rng, Vec2::new(5.0, 2.0));
            assert!((2.0..=5.0).contains(&v));
        }
    }

    #[test]
    fn test_spawn_uses_direction_for_rotation() {
        let mut rng = StdRng::seed_from_u64(1);
        let request = SpawnRequest {
            direction: Vec2::new(90.0, 90.0),
            image_rotation: Vec2::new(10.0, 20.0),
            use_direction_for_rotation: true,
            ..Default::default()
        };
        let p = spawn_particle(&mut rng, &request, &origin());
        assert_eq!(p.rotation, 90.0);
        assert!(p.velocity[0].abs() < 1e-5);
        assert!((p.velocity[1] - 1.0).abs() < 1e-5);
        assert_eq!(p.position, [1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_spawn_inside_footprint() {
        let mut rng = StdRng::seed_from_u64(3);
        let origin = SpawnOrigin {
            footprint: Vec2::new(2.0, 4.0),
            ..origin()
        };
        for _ in 0..64 {
            let p = spawn_particle(&mut rng, &SpawnRequest::default(), &origin);
            assert!((p.position[0] - 1.0).abs() <= 1.0);
            assert!((p.position[1] - 2.0).abs() <= 2.0);
        }
    }

    #[test]
    fn test_gradient_sampling() {
        let marks = [mark(0.0, [0.0; 4]), mark(1.0, [1.0; 4])];
        assert_eq!(sample_gradient(&marks, -1.0), [0.0; 4]);
        assert_eq!(sample_gradient(&marks, 0.5), [0.5; 4]);
        assert_eq!(sample_gradient(&marks, 2.0), [1.0; 4]);
        assert_eq!(sample_gradient(&marks[..1], 0.7), [0.0; 4]);
    }

    #[test]
    fn test_step_integrates_and_expires() {
        let emitter = EmitterParams {
            color_data: [1.0, 0.0],
            ..Default::default()
        };
        let gradient = [mark(0.0, [0.25; 4])];
        let p = GpuParticle {
            velocity: [1.0, 0.0],
            acceleration: [0.0, 2.0],
            lifetime: 1.0,
            max_lifetime: 1.0,
            ..Default::default()
        };

        let stepped = step_particle(&p, 0.5, &emitter, &gradient, |_| 1.0);
        assert_eq!(stepped.velocity, [1.0, 1.0]);
        assert_eq!(stepped.position[0], 0.5);
        assert_eq!(stepped.lifetime, 0.5);
        assert_eq!(stepped.color, [0.25; 4]);

        let expired = step_particle(&stepped, 0.75, &emitter, &gradient, |_| 1.0);
        assert!(is_expired(&expired));
    }

    #[test]
    fn test_transparent_mask_rejects_fresh_particle() {
        let emitter = EmitterParams {
            scale: [1.0, 1.0],
            ..Default::default()
        };
        let p = GpuParticle {
            lifetime: 3.0,
            max_lifetime: 3.0,
            ..Default::default()
        };
        assert!(is_expired(&step_particle(&p, 0.1, &emitter, &[], |_| 0.0)));

        let aged = GpuParticle { age: 0.5, ..p };
        assert!(!is_expired(&step_particle(&aged, 0.1, &emitter, &[], |_| 0.0)));
    }
}
