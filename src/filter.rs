//! Exhaustive cone filtering: per-texel kernel extents, tap weighting and the face loop.
//!
//! Each destination texel gathers every source texel whose direction falls inside a cone
//! around the texel's own direction. To avoid touching the whole cube per texel, a
//! conservative bounding box is computed on each face first; only texels inside those boxes
//! are tested against the cone.

use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec3;
use serde::Deserialize;

use crate::bbox::BBoxInt;
use crate::cube::{self, neighbor, seam_is_flipped, texel_direction, CubeEdge, CubeFace, NUM_FACES};
use crate::normalizer::NormalizerCube;
use crate::progress::ThreadProgress;
use crate::surface::ImageSurface;

/// Number of entries in the angular weight tables built for each pass.
pub const FILTER_LUT_ENTRIES: usize = 4096;

/// Narrowest cone half-angle, in texel widths at the face center.
const MIN_HALF_ANGLE_TEXELS: f32 = 1.5;

/// Lobe weight below which cosine-power taps are ignored; sets that filter's cone angle.
const COSINE_POWER_EPSILON: f32 = 1.0e-6;

/// Kernel shape used to weight taps inside the filter cone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Every tap inside the cone weighs the same.
    Disc,
    /// Weight falls linearly from 1 at the center to 0 at the cone edge.
    Cone,
    #[default]
    Cosine,
    /// Gaussian in angle with three standard deviations across the cone.
    AngularGaussian,
    /// Phong lobe whose power is derived per level from gloss scale and bias.
    CosinePower,
    /// Importance-sampled GGX lobe per level.
    Ggx,
}

impl FilterType {
    pub fn label(self) -> &'static str {
        match self {
            FilterType::Disc => "disc",
            FilterType::Cone => "cone",
            FilterType::Cosine => "cosine",
            FilterType::AngularGaussian => "angular_gaussian",
            FilterType::CosinePower => "cosine_power",
            FilterType::Ggx => "ggx",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "disc" => Some(FilterType::Disc),
            "cone" => Some(FilterType::Cone),
            "cosine" => Some(FilterType::Cosine),
            "angular_gaussian" | "gaussian" => Some(FilterType::AngularGaussian),
            "cosine_power" => Some(FilterType::CosinePower),
            "ggx" => Some(FilterType::Ggx),
            _ => None,
        }
    }

    /// Filters whose top level is copied through unblurred.
    pub fn skips_base_level(self) -> bool {
        matches!(self, FilterType::CosinePower | FilterType::Ggx)
    }

    fn uses_lut(self) -> bool {
        matches!(self, FilterType::Cone | FilterType::AngularGaussian)
    }
}

/// Full cone angle (degrees) at which `cos(angle / 2)^power` drops to a negligible weight.
pub fn cosine_power_cone_angle(power: f32) -> f32 {
    2.0 * COSINE_POWER_EPSILON.powf(1.0 / power).acos().to_degrees()
}

/// Angular weight table indexed by the dot product between the center and a tap.
///
/// Entry `i` holds the weight at `d = cos(theta) + (1 - cos(theta)) * i / (n - 1)`, so the
/// table spans exactly the dot products that pass the cone test.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleWeightLut {
    cos_angle: f32,
    weights: Vec<f32>,
}

impl AngleWeightLut {
    /// Builds the table for `filter_type` over a cone of half-angle `half_angle` radians.
    /// Filters that weight taps directly get an all-ones table.
    pub fn build(entries: usize, filter_type: FilterType, half_angle: f32) -> Self {
        let entries = entries.max(2);
        let cos_angle = half_angle.cos();
        let span = 1.0 - cos_angle;
        let std_dev = half_angle / 3.0;
        let inv_two_variance = 1.0 / (2.0 * std_dev * std_dev);
        let weights = (0..entries)
            .map(|i| {
                let dot = (cos_angle + span * i as f32 / (entries - 1) as f32).min(1.0);
                let angle = dot.acos();
                match filter_type {
                    FilterType::Cone => ((half_angle - angle) / half_angle).max(0.0),
                    FilterType::AngularGaussian => (-(angle * angle) * inv_two_variance).exp(),
                    _ => 1.0,
                }
            })
            .collect();
        Self { cos_angle, weights }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn entries(&self) -> &[f32] {
        &self.weights
    }

    pub fn index(&self, dot: f32) -> usize {
        let last = self.weights.len() - 1;
        let span = 1.0 - self.cos_angle;
        if span <= 0.0 {
            return last;
        }
        let scaled = ((dot - self.cos_angle) / span * last as f32).round();
        scaled.clamp(0.0, last as f32) as usize
    }

    pub fn weight(&self, dot: f32) -> f32 {
        self.weights[self.index(dot)]
    }
}

/// Everything a face pass needs to weight taps for one mip level.
#[derive(Debug, Clone)]
pub struct FilterKernel {
    pub filter_type: FilterType,
    /// Cone half-angle in degrees after clamping.
    pub half_angle: f32,
    /// Taps with `dot < dot_threshold` lie outside the cone.
    pub dot_threshold: f32,
    /// Half-width in source texels of the per-face search box.
    pub extent_texels: i32,
    pub use_solid_angle: bool,
    pub specular_power: f32,
    lut: AngleWeightLut,
}

impl FilterKernel {
    /// Prepares a kernel for a full cone of `cone_angle` degrees over a `src_size` source.
    ///
    /// A cone of zero or less makes a point-sampling kernel that copies the nearest source
    /// texel. Positive half-angles are clamped below by a little more than the angle of a
    /// texel's half-diagonal, so the nearest source texel is always inside the cone, and above
    /// by a hemisphere.
    pub fn new(
        filter_type: FilterType,
        cone_angle: f32,
        src_size: usize,
        use_solid_angle: bool,
        specular_power: f32,
    ) -> Self {
        let size = src_size.max(1) as f32;
        if cone_angle <= 0.0 {
            return Self {
                filter_type,
                half_angle: 0.0,
                dot_threshold: 1.0,
                extent_texels: 0,
                use_solid_angle,
                specular_power,
                lut: AngleWeightLut::build(2, FilterType::Disc, 0.0),
            };
        }
        let min_angle = (MIN_HALF_ANGLE_TEXELS / size).atan().to_degrees();
        let half_angle = (cone_angle * 0.5).max(min_angle).min(90.0);

        // Smallest angle spanned by one texel step measured in box (max-norm) distance,
        // reached at the cube corners.
        let texel_angle = (1.0 / size).atan().to_degrees();
        let min_step = texel_angle * 2.0 * std::f32::consts::SQRT_2 / 3.0;
        let extent_texels = ((half_angle / min_step).ceil() as i32 + 1).max(1);

        let lut = if filter_type.uses_lut() {
            AngleWeightLut::build(FILTER_LUT_ENTRIES, filter_type, half_angle.to_radians())
        } else {
            AngleWeightLut::build(2, FilterType::Disc, half_angle.to_radians())
        };
        Self {
            filter_type,
            half_angle,
            dot_threshold: half_angle.to_radians().cos(),
            extent_texels,
            use_solid_angle,
            specular_power,
            lut,
        }
    }

    pub fn lut(&self) -> &AngleWeightLut {
        &self.lut
    }

    /// True for an unblurred level, where each texel takes the nearest source texel.
    pub fn is_point_sample(&self) -> bool {
        self.half_angle <= 0.0
    }

    /// Weight of a tap at `dot` inside the cone, before any solid angle factor.
    #[inline]
    pub fn tap_weight(&self, dot: f32) -> f32 {
        match self.filter_type {
            FilterType::CosinePower => {
                if dot > 0.0 {
                    dot.powf(self.specular_power) * dot
                } else {
                    0.0
                }
            }
            FilterType::Cone | FilterType::AngularGaussian => self.lut.weight(dot),
            FilterType::Cosine => dot.max(0.0),
            FilterType::Disc | FilterType::Ggx => 1.0,
        }
    }
}

/// Per-face search boxes for a kernel centered on `center`.
///
/// The box on the center face spans `extent` texels around the center tap. Whatever spills
/// past an edge is carried onto the neighbor face through the adjacency table, and a spill
/// wider than a whole face covers the opposite face entirely.
pub fn determine_filter_extents(center: Vec3, src_size: usize, extent: i32) -> [BBoxInt; NUM_FACES] {
    let mut extents = [BBoxInt::EMPTY; NUM_FACES];
    let size = src_size as i32;
    let last = size - 1;
    let (face, u, v) = cube::direction_to_texel(center, src_size);
    let (u, v) = (u as i32, v as i32);

    let center_box = &mut extents[face.index()];
    center_box.augment(u - extent, v - extent);
    center_box.augment(u + extent, v + extent);
    center_box.clamp_min(0, 0);
    center_box.clamp_max(last, last);
    let [min_u, min_v] = center_box.min;
    let [max_u, max_v] = center_box.max;

    // Spill depth past each edge and the box range running along that edge.
    let spill = [
        (CubeEdge::Left, extent - u, min_v, max_v),
        (CubeEdge::Right, u + extent - last, min_v, max_v),
        (CubeEdge::Top, extent - v, min_u, max_u),
        (CubeEdge::Bottom, v + extent - last, min_u, max_u),
    ];

    for (edge, depth, along_min, along_max) in spill {
        if depth > 0 {
            let link = neighbor(face, edge);
            // The kernel keeps widening as it crosses the seam.
            let (mut lo, mut hi) = (along_min - depth, along_max + depth);
            if seam_is_flipped(edge, link.edge) {
                lo = last - lo;
                hi = last - hi;
            }
            let target = &mut extents[link.face.index()];
            match link.edge {
                CubeEdge::Left => {
                    target.augment(0, lo);
                    target.augment(depth, hi);
                }
                CubeEdge::Right => {
                    target.augment(last, lo);
                    target.augment(last - depth, hi);
                }
                CubeEdge::Top => {
                    target.augment(lo, 0);
                    target.augment(hi, depth);
                }
                CubeEdge::Bottom => {
                    target.augment(lo, last);
                    target.augment(hi, last - depth);
                }
            }
            target.clamp_min(0, 0);
            target.clamp_max(last, last);
        }
        if depth > size {
            let opposite = &mut extents[opposite_face(face).index()];
            opposite.augment(0, 0);
            opposite.augment(last, last);
        }
    }
    extents
}

fn opposite_face(face: CubeFace) -> CubeFace {
    match face {
        CubeFace::PosX => CubeFace::NegX,
        CubeFace::NegX => CubeFace::PosX,
        CubeFace::PosY => CubeFace::NegY,
        CubeFace::NegY => CubeFace::PosY,
        CubeFace::PosZ => CubeFace::NegZ,
        CubeFace::NegZ => CubeFace::PosZ,
    }
}

/// Weighted average of every source texel inside the cone around `center`.
///
/// Writes `out.len()` channels and returns the total weight that divided the sum. A zero
/// total writes zeros.
pub fn process_filter_extents(
    center: Vec3,
    kernel: &FilterKernel,
    extents: &[BBoxInt; NUM_FACES],
    normalizer: &NormalizerCube,
    src: &[ImageSurface; NUM_FACES],
    out: &mut [f32],
) -> f64 {
    let mut accum = [0.0f64; 4];
    let mut total_weight = 0.0f64;
    let channels = out.len().min(src[0].num_channels()).min(4);
    let use_solid_angle = kernel.use_solid_angle && normalizer.has_solid_angle();

    for (face_index, bbox) in extents.iter().enumerate() {
        let Some((us, vs)) = bbox.ranges() else {
            continue;
        };
        let norm_face = &normalizer.faces()[face_index];
        let src_face = &src[face_index];
        for v in vs {
            for u in us.clone() {
                let texel_dir = norm_face.texel(u, v);
                let dot = texel_dir[0] * center.x + texel_dir[1] * center.y + texel_dir[2] * center.z;
                if dot < kernel.dot_threshold {
                    continue;
                }
                let base = if use_solid_angle { texel_dir[3] } else { 1.0 };
                let weight = (base * kernel.tap_weight(dot)) as f64;
                for (sum, value) in accum.iter_mut().zip(src_face.texel(u, v)).take(channels) {
                    *sum += weight * *value as f64;
                }
                total_weight += weight;
            }
        }
    }

    if total_weight > 0.0 {
        for (value, sum) in out.iter_mut().zip(accum).take(channels) {
            *value = (sum / total_weight) as f32;
        }
    } else {
        out[..channels].fill(0.0);
    }
    total_weight
}

/// Filters one destination face from `src`.
///
/// A point-sampling kernel copies the nearest source texel instead of gathering. The shutdown flag is polled for every row; returns `false` when the pass was interrupted
/// and the face is only partially written.
pub fn filter_face(
    src: &[ImageSurface; NUM_FACES],
    dst: &mut ImageSurface,
    face: CubeFace,
    kernel: &FilterKernel,
    normalizer: &NormalizerCube,
    progress: &ThreadProgress,
    shutdown: &AtomicBool,
) -> bool {
    let src_size = src[0].width();
    let dst_size = dst.width();
    let channels = dst.num_channels();
    progress.set_face(face.index());
    for v in 0..dst_size {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        progress.set_row(v);
        let row = dst.row_mut(v);
        for (u, texel) in row.chunks_exact_mut(channels).enumerate() {
            let center = texel_direction(face, u, v, dst_size);
            if kernel.is_point_sample() {
                let (src_face, su, sv) = cube::direction_to_texel(center, src_size);
                for (value, sample) in texel.iter_mut().zip(src[src_face.index()].texel(su, sv)) {
                    *value = *sample;
                }
                continue;
            }
            let extents = determine_filter_extents(center, src_size, kernel.extent_texels);
            process_filter_extents(center, kernel, &extents, normalizer, src, texel);
        }
    }
    !shutdown.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_cube(size: usize, value: [f32; 4]) -> [ImageSurface; NUM_FACES] {
        std::array::from_fn(|_| {
            let mut surface = ImageSurface::new(size, size, 4).expect("surface");
            for (k, channel) in value.iter().enumerate() {
                surface.clear_channel_const(k, *channel);
            }
            surface
        })
    }

    fn sample_directions() -> Vec<Vec3> {
        let mut dirs = vec![
            Vec3::X,
            -Vec3::Z,
            Vec3::new(1.0, 1.0, 1.0).normalize(),
            Vec3::new(-1.0, 0.98, -0.95).normalize(),
            Vec3::new(0.2, -1.0, 0.97).normalize(),
        ];
        // Deterministic spread over the sphere.
        for i in 0..40 {
            let t = i as f32 + 0.5;
            let z = 1.0 - 2.0 * t / 40.0;
            let r = (1.0 - z * z).sqrt();
            let phi = t * 2.399_963;
            dirs.push(Vec3::new(r * phi.cos(), r * phi.sin(), z));
        }
        dirs
    }

    #[test]
    fn extents_cover_every_tap_inside_the_cone() {
        for size in [4usize, 8, 16] {
            let mut normalizer = NormalizerCube::new();
            normalizer.build(size).expect("normalizer");
            for cone in [0.01f32, 2.0, 10.0, 30.0, 60.0, 100.0, 140.0, 180.0] {
                let kernel = FilterKernel::new(FilterType::Disc, cone, size, false, 1.0);
                for center in sample_directions() {
                    let extents = determine_filter_extents(center, size, kernel.extent_texels);
                    let mut inside = 0;
                    for face in CubeFace::ALL {
                        for v in 0..size {
                            for u in 0..size {
                                let dir = texel_direction(face, u, v, size);
                                if dir.dot(center) >= kernel.dot_threshold {
                                    inside += 1;
                                    assert!(
                                        extents[face.index()].contains(u as i32, v as i32),
                                        "size {size} cone {cone} center {center:?} missed {face:?} ({u}, {v})"
                                    );
                                }
                            }
                        }
                    }
                    assert!(inside > 0, "cone {cone} around {center:?} holds no taps");
                }
            }
        }
    }

    #[test]
    fn narrow_cone_stays_on_center_face() {
        let extents = determine_filter_extents(Vec3::Z, 32, 2);
        assert!(!extents[CubeFace::PosZ.index()].is_empty());
        for face in CubeFace::ALL.into_iter().filter(|face| *face != CubeFace::PosZ) {
            assert!(extents[face.index()].is_empty(), "{face:?}");
        }
    }

    #[test]
    fn cone_lut_falls_to_zero_at_the_edge() {
        let half_angle = 0.4f32;
        let lut = AngleWeightLut::build(FILTER_LUT_ENTRIES, FilterType::Cone, half_angle);
        assert_eq!(lut.len(), FILTER_LUT_ENTRIES);
        assert!(lut.entries()[0].abs() < 1e-3);
        assert!((lut.entries()[FILTER_LUT_ENTRIES - 1] - 1.0).abs() < 1e-3);
        assert!(lut.entries().windows(2).all(|pair| pair[0] <= pair[1] + 1e-6));
        assert_eq!(lut.index(half_angle.cos()), 0);
        assert_eq!(lut.index(1.0), FILTER_LUT_ENTRIES - 1);
        assert_eq!(lut.index(-1.0), 0);
    }

    #[test]
    fn gaussian_lut_reaches_three_sigma_at_the_edge() {
        let lut = AngleWeightLut::build(256, FilterType::AngularGaussian, 0.6);
        let edge = lut.entries()[0];
        assert!((edge - (-4.5f32).exp()).abs() < 1e-3, "edge weight {edge}");
        assert!((lut.entries()[255] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn weights_are_normalized() {
        let size = 8;
        let mut normalizer = NormalizerCube::new();
        normalizer.build_with_solid_angle(size).expect("normalizer");
        let src = constant_cube(size, [0.25, 0.5, 0.75, 1.0]);
        for filter_type in [FilterType::Disc, FilterType::Cone, FilterType::Cosine, FilterType::AngularGaussian] {
            let kernel = FilterKernel::new(filter_type, 40.0, size, true, 1.0);
            let center = Vec3::new(0.3, 0.9, -0.2).normalize();
            let extents = determine_filter_extents(center, size, kernel.extent_texels);
            let mut out = [0.0f32; 4];
            let total = process_filter_extents(center, &kernel, &extents, &normalizer, &src, &mut out);
            assert!(total > 0.0);
            for (value, expected) in out.iter().zip([0.25, 0.5, 0.75, 1.0]) {
                assert!((value - expected).abs() < 1e-5, "{filter_type:?}: {out:?}");
            }
        }
    }

    #[test]
    fn zero_weight_writes_zero() {
        let size = 4;
        let mut normalizer = NormalizerCube::new();
        normalizer.build(size).expect("normalizer");
        let src = constant_cube(size, [1.0; 4]);
        let kernel = FilterKernel::new(FilterType::Disc, 10.0, size, false, 1.0);
        let mut out = [7.0f32; 4];
        let total = process_filter_extents(Vec3::Y, &kernel, &[BBoxInt::EMPTY; NUM_FACES], &normalizer, &src, &mut out);
        assert_eq!(total, 0.0);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn cosine_power_weight_matches_lobe() {
        let kernel = FilterKernel::new(FilterType::CosinePower, 90.0, 16, false, 8.0);
        assert!((kernel.tap_weight(0.5) - 0.5f32.powf(9.0)).abs() < 1e-7);
        assert_eq!(kernel.tap_weight(-0.2), 0.0);
        let angle = cosine_power_cone_angle(8.0);
        let half = (angle * 0.5).to_radians();
        assert!((half.cos().powf(8.0) - COSINE_POWER_EPSILON).abs() < 1e-7);
    }

    #[test]
    fn half_angle_is_clamped() {
        let narrow = FilterKernel::new(FilterType::Cosine, 0.01, 64, false, 1.0);
        assert!(narrow.half_angle > 0.005);
        assert!(!narrow.is_point_sample());
        let zero = FilterKernel::new(FilterType::Cosine, 0.0, 64, false, 1.0);
        assert!(zero.is_point_sample());
        assert_eq!(zero.extent_texels, 0);
        let wide = FilterKernel::new(FilterType::Cosine, 300.0, 64, false, 1.0);
        assert_eq!(wide.half_angle, 90.0);
    }

    #[test]
    fn zero_cone_copies_nearest_texel() {
        let size = 8;
        let mut normalizer = NormalizerCube::new();
        normalizer.build(size).expect("normalizer");
        let src: [ImageSurface; NUM_FACES] = std::array::from_fn(|face| {
            let mut surface = ImageSurface::new(size, size, 4).expect("surface");
            for v in 0..size {
                for u in 0..size {
                    surface.texel_mut(u, v).copy_from_slice(&[face as f32, u as f32, v as f32, 1.0]);
                }
            }
            surface
        });
        let kernel = FilterKernel::new(FilterType::Cone, 0.0, size, true, 1.0);
        let progress = ThreadProgress::default();
        let shutdown = AtomicBool::new(false);
        for face in CubeFace::ALL {
            let mut dst = ImageSurface::new(size, size, 4).expect("dst");
            assert!(filter_face(&src, &mut dst, face, &kernel, &normalizer, &progress, &shutdown));
            assert_eq!(dst.data(), src[face.index()].data(), "{face:?}");
        }

        // Half-size output picks one texel of each 2x2 block.
        let mut half = ImageSurface::new(size / 2, size / 2, 4).expect("half");
        assert!(filter_face(&src, &mut half, CubeFace::NegY, &kernel, &normalizer, &progress, &shutdown));
        for v in 0..size / 2 {
            for u in 0..size / 2 {
                let texel = half.texel(u, v);
                assert_eq!(texel[0], CubeFace::NegY.index() as f32);
                assert!((texel[1] - (2 * u) as f32).abs() <= 1.0 && (texel[2] - (2 * v) as f32).abs() <= 1.0);
            }
        }
    }

    #[test]
    fn interrupted_face_reports_false() {
        let size = 4;
        let mut normalizer = NormalizerCube::new();
        normalizer.build(size).expect("normalizer");
        let src = constant_cube(size, [1.0; 4]);
        let mut dst = ImageSurface::new(size, size, 4).expect("dst");
        let kernel = FilterKernel::new(FilterType::Cosine, 20.0, size, false, 1.0);
        let progress = ThreadProgress::default();
        let shutdown = AtomicBool::new(true);
        assert!(!filter_face(&src, &mut dst, CubeFace::PosX, &kernel, &normalizer, &progress, &shutdown));
        shutdown.store(false, Ordering::Relaxed);
        assert!(filter_face(&src, &mut dst, CubeFace::PosX, &kernel, &normalizer, &progress, &shutdown));
        assert!(dst.data().iter().all(|value| (value - 1.0).abs() < 1e-5));
    }
}
