//! GGX importance sampling over a mip chain of cube faces.

use std::f32::consts::{PI, TAU};
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{Vec2, Vec3};

use crate::cube::{sample_bilinear, texel_direction, CubeFace, NUM_FACES};
use crate::progress::ThreadProgress;
use crate::surface::ImageSurface;

/// Point `i` of an `n`-point Hammersley set on the unit square.
pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

/// Base-2 Van der Corput radical inverse: the bits of `bits` mirrored behind the binary point.
pub fn radical_inverse_vdc(bits: u32) -> f32 {
    bits.reverse_bits() as f32 / 4_294_967_296.0
}

/// Half vector around `normal` distributed by the GGX lobe with squared roughness
/// `alpha_sqr` (alpha already squared).
pub fn importance_sample_ggx(xi: Vec2, alpha_sqr: f32, normal: Vec3) -> Vec3 {
    let phi = TAU * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (alpha_sqr - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let h = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);
    tangent_to_world(normal, h)
}

fn tangent_to_world(normal: Vec3, vec: Vec3) -> Vec3 {
    let up = if normal.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(normal).normalize();
    let bitangent = normal.cross(tangent);
    tangent * vec.x + bitangent * vec.y + normal * vec.z
}

/// GGX roughness terms for one output mip, matching the runtime shader's mapping from mip
/// index to perceptual roughness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GgxLobe {
    pub alpha: f32,
    pub alpha_sqr: f32,
}

impl GgxLobe {
    pub fn for_mip(mip: usize, max_mip: usize) -> Self {
        let smoothness = (1.0 - mip as f32 / max_mip.max(1) as f32).max(0.0);
        let perceptual = 1.0 - smoothness;
        let alpha = perceptual * perceptual;
        Self { alpha, alpha_sqr: alpha * alpha }
    }

    /// GGX normal distribution at `n_dot_h`.
    pub fn distribution(&self, n_dot_h: f32) -> f32 {
        let denom = n_dot_h * n_dot_h * (self.alpha_sqr - 1.0) + 1.0;
        self.alpha_sqr / (PI * denom * denom)
    }
}

/// Filters one face of output mip `mip` by importance sampling the GGX lobe around each texel.
///
/// `source` is the input mip chain; each sample reads the level whose texel footprint best
/// matches the sample's solid angle, blending the two nearest levels. Returns `false` when
/// the shutdown flag interrupted the face.
#[allow(clippy::too_many_arguments)]
pub fn filter_face_ggx(
    source: &[[ImageSurface; NUM_FACES]],
    dst: &mut ImageSurface,
    face: CubeFace,
    mip: usize,
    max_mip: usize,
    sample_count: u32,
    progress: &ThreadProgress,
    shutdown: &AtomicBool,
) -> bool {
    let Some(base) = source.first() else {
        return true;
    };
    let lobe = GgxLobe::for_mip(mip, max_mip);
    let samples = sample_count.max(1);
    let base_size = base[0].width().max(1) as f32;
    let texel_solid_angle = 4.0 * PI / (6.0 * base_size * base_size);
    let last_level = source.len() - 1;
    let dst_size = dst.width();
    let channels = dst.num_channels().min(4);
    let stride = dst.num_channels();

    progress.set_face(face.index());
    for v in 0..dst_size {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        progress.set_row(v);
        let row = dst.row_mut(v);
        for (u, texel) in row.chunks_exact_mut(stride).enumerate() {
            let normal = texel_direction(face, u, v, dst_size);
            let mut color = [0.0f32; 4];
            let mut total_weight = 0.0f32;
            let mut fetch_a = [0.0f32; 4];
            let mut fetch_b = [0.0f32; 4];
            for i in 0..samples {
                let h = importance_sample_ggx(hammersley(i, samples), lobe.alpha_sqr, normal);
                let v_dot_h = normal.dot(h);
                let l = 2.0 * v_dot_h * h - normal;
                let n_dot_l = normal.dot(l);
                if n_dot_l <= 0.0 {
                    continue;
                }
                let pdf = lobe.distribution(v_dot_h) * 0.25;
                let sample_solid_angle = 1.0 / (samples as f32 * pdf);
                let level = (0.5 * (sample_solid_angle / texel_solid_angle).log2() + 1.0).max(0.0);
                let (level_a, level_b, blend) = if level >= last_level as f32 {
                    (last_level, last_level, 0.0)
                } else {
                    let floor = level.floor();
                    (floor as usize, floor as usize + 1, (level - floor).clamp(0.0, 1.0))
                };
                sample_bilinear(&source[level_a], l, &mut fetch_a[..channels]);
                sample_bilinear(&source[level_b], l, &mut fetch_b[..channels]);
                for k in 0..channels {
                    color[k] += ((1.0 - blend) * fetch_a[k] + blend * fetch_b[k]) * n_dot_l;
                }
                total_weight += n_dot_l;
            }
            for k in 0..channels {
                texel[k] = if total_weight > 0.0 { color[k] / total_weight } else { 0.0 };
            }
        }
    }
    !shutdown.load(Ordering::Relaxed)
}
