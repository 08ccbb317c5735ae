//! Seam blending applied to each filtered mip level.

use serde::Deserialize;

use crate::cube::{cube_corner_texels, face_corner_texel, neighbor, seam_is_flipped, CUBE_EDGES, NUM_FACES};
use crate::surface::ImageSurface;

/// How texels near a cube seam are reconciled after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixupType {
    None,
    /// Shift interior texels by the seam correction, fading linearly.
    PullLinear,
    /// Shift interior texels by the seam correction, fading with a smoothstep.
    #[default]
    PullHermite,
    /// Blend interior texels toward the seam average, fading linearly.
    AverageLinear,
    /// Blend interior texels toward the seam average, fading with a smoothstep.
    AverageHermite,
}

impl FixupType {
    pub fn label(self) -> &'static str {
        match self {
            FixupType::None => "none",
            FixupType::PullLinear => "pull_linear",
            FixupType::PullHermite => "pull_hermite",
            FixupType::AverageLinear => "average_linear",
            FixupType::AverageHermite => "average_hermite",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "none" => Some(FixupType::None),
            "pull_linear" => Some(FixupType::PullLinear),
            "pull_hermite" => Some(FixupType::PullHermite),
            "average_linear" => Some(FixupType::AverageLinear),
            "average_hermite" => Some(FixupType::AverageHermite),
            _ => None,
        }
    }

    fn weight(self, frac: f32) -> f32 {
        match self {
            FixupType::PullHermite | FixupType::AverageHermite => (-2.0 * frac + 3.0) * frac * frac,
            _ => frac,
        }
    }

    fn averages(self) -> bool {
        matches!(self, FixupType::AverageLinear | FixupType::AverageHermite)
    }
}

/// Makes the texels on both sides of every seam identical and feathers the change up to
/// `width` texels into each face.
///
/// Corner texels are set to the mean of the three faces meeting there; 1x1 cubes collapse to
/// the mean of all six faces.
pub fn fixup_cube_edges(faces: &mut [ImageSurface; NUM_FACES], fixup: FixupType, width: usize) {
    if fixup == FixupType::None || width == 0 {
        return;
    }
    let size = faces[0].width();
    let channels = faces[0].num_channels();
    if size == 0 || channels == 0 {
        return;
    }

    if size == 1 {
        for k in 0..channels {
            let mean = faces.iter().map(|face| face.texel(0, 0)[k]).sum::<f32>() / NUM_FACES as f32;
            for face in faces.iter_mut() {
                face.texel_mut(0, 0)[k] = mean;
            }
        }
        return;
    }

    for group in cube_corner_texels() {
        for k in 0..channels {
            let mut sum = 0.0f32;
            for &(face, corner) in &group {
                let (u, v) = face_corner_texel(corner, size);
                sum += faces[face.index()].texel(u, v)[k];
            }
            let mean = sum * (1.0 / 3.0);
            for &(face, corner) in &group {
                let (u, v) = face_corner_texel(corner, size);
                faces[face.index()].texel_mut(u, v)[k] = mean;
            }
        }
    }

    let fixup_dist = width.min(size / 2);
    for (face, edge) in CUBE_EDGES {
        let link = neighbor(face, edge);
        let flipped = seam_is_flipped(edge, link.edge);
        // Corners were reconciled above.
        for j in 1..size - 1 {
            let jn = if flipped { size - 1 - j } else { j };
            for k in 0..channels {
                let (eu, ev) = edge.texel(j, 0, size);
                let (nu, nv) = link.edge.texel(jn, 0, size);
                let edge_tap = faces[face.index()].texel(eu, ev)[k];
                let neighbor_tap = faces[link.face.index()].texel(nu, nv)[k];
                let avg = 0.5 * (edge_tap + neighbor_tap);
                faces[face.index()].texel_mut(eu, ev)[k] = avg;
                faces[link.face.index()].texel_mut(nu, nv)[k] = avg;

                let mut edge_dev = edge_tap - avg;
                let mut neighbor_dev = neighbor_tap - avg;
                for depth in 1..fixup_dist {
                    let frac = (fixup_dist - depth) as f32 / fixup_dist as f32;
                    let weight = fixup.weight(frac);
                    let (iu, iv) = edge.texel(j, depth, size);
                    let (mu, mv) = link.edge.texel(jn, depth, size);
                    if fixup.averages() {
                        edge_dev = faces[face.index()].texel(iu, iv)[k] - avg;
                        neighbor_dev = faces[link.face.index()].texel(mu, mv)[k] - avg;
                    }
                    faces[face.index()].texel_mut(iu, iv)[k] -= weight * edge_dev;
                    faces[link.face.index()].texel_mut(mu, mv)[k] -= weight * neighbor_dev;
                }
            }
        }
    }
}
