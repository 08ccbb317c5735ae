//! Cube face topology: face and edge numbering, the face/edge adjacency table, face UV to
//! direction mapping and per-texel solid angles.

use glam::{DVec3, Vec3};

use crate::error::{CubeMapError, Result};
use crate::surface::ImageSurface;

pub const NUM_FACES: usize = 6;

/// Cube face, numbered +X, -X, +Y, -Y, +Z, -Z. The numbering is shared with every consumer
/// of the face arrays and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CubeFace {
    PosX = 0,
    NegX = 1,
    PosY = 2,
    NegY = 3,
    PosZ = 4,
    NegZ = 5,
}

impl CubeFace {
    pub const ALL: [CubeFace; NUM_FACES] =
        [CubeFace::PosX, CubeFace::NegX, CubeFace::PosY, CubeFace::NegY, CubeFace::PosZ, CubeFace::NegZ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or(CubeMapError::FaceIndex(index))
    }

    pub fn label(self) -> &'static str {
        match self {
            CubeFace::PosX => "px",
            CubeFace::NegX => "nx",
            CubeFace::PosY => "py",
            CubeFace::NegY => "ny",
            CubeFace::PosZ => "pz",
            CubeFace::NegZ => "nz",
        }
    }

    /// Face-local frame: the direction of increasing u, of increasing v, and the face normal.
    pub fn basis(self) -> FaceBasis {
        FACE_BASIS[self.index()]
    }
}

/// Edge of a face. Left/right (0/1) run along v at u = 0 and u = size - 1; top/bottom (2/3)
/// run along u at v = 0 and v = size - 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CubeEdge {
    Left = 0,
    Right = 1,
    Top = 2,
    Bottom = 3,
}

impl CubeEdge {
    pub const ALL: [CubeEdge; 4] = [CubeEdge::Left, CubeEdge::Right, CubeEdge::Top, CubeEdge::Bottom];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Texel of this edge at position `along` (measured in the edge's running direction)
    /// and `depth` texels in from the seam.
    pub fn texel(self, along: usize, depth: usize, size: usize) -> (usize, usize) {
        match self {
            CubeEdge::Left => (depth, along),
            CubeEdge::Right => (size - 1 - depth, along),
            CubeEdge::Top => (along, depth),
            CubeEdge::Bottom => (along, size - 1 - depth),
        }
    }
}

/// The face and edge on the other side of a seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeLink {
    pub face: CubeFace,
    pub edge: CubeEdge,
}

impl EdgeLink {
    const fn new(face: CubeFace, edge: CubeEdge) -> Self {
        Self { face, edge }
    }
}

use CubeEdge::{Bottom, Left, Right, Top};
use CubeFace::{NegX, NegY, NegZ, PosX, PosY, PosZ};

const NEIGHBORS: [[EdgeLink; 4]; NUM_FACES] = [
    // +X
    [EdgeLink::new(PosZ, Right), EdgeLink::new(NegZ, Left), EdgeLink::new(PosY, Right), EdgeLink::new(NegY, Right)],
    // -X
    [EdgeLink::new(NegZ, Right), EdgeLink::new(PosZ, Left), EdgeLink::new(PosY, Left), EdgeLink::new(NegY, Left)],
    // +Y
    [EdgeLink::new(NegX, Top), EdgeLink::new(PosX, Top), EdgeLink::new(NegZ, Top), EdgeLink::new(PosZ, Top)],
    // -Y
    [
        EdgeLink::new(NegX, Bottom),
        EdgeLink::new(PosX, Bottom),
        EdgeLink::new(PosZ, Bottom),
        EdgeLink::new(NegZ, Bottom),
    ],
    // +Z
    [EdgeLink::new(NegX, Right), EdgeLink::new(PosX, Left), EdgeLink::new(PosY, Bottom), EdgeLink::new(NegY, Top)],
    // -Z
    [EdgeLink::new(PosX, Right), EdgeLink::new(NegX, Left), EdgeLink::new(PosY, Top), EdgeLink::new(NegY, Bottom)],
];

/// Returns the face and edge sharing the seam `edge` of `face`.
pub fn neighbor(face: CubeFace, edge: CubeEdge) -> EdgeLink {
    NEIGHBORS[face.index()][edge.index()]
}

/// True when texel order along the seam runs in opposite directions on the two faces.
pub fn seam_is_flipped(edge: CubeEdge, neighbor_edge: CubeEdge) -> bool {
    let (a, b) = (edge.index(), neighbor_edge.index());
    a == b || a + b == 3
}

/// The 12 unique seams of the cube, each named once from one of its two faces.
pub const CUBE_EDGES: [(CubeFace, CubeEdge); 12] = [
    (PosX, Left),
    (PosX, Right),
    (PosX, Top),
    (PosX, Bottom),
    (NegX, Left),
    (NegX, Right),
    (NegX, Top),
    (NegX, Bottom),
    (PosZ, Top),
    (PosZ, Bottom),
    (NegZ, Top),
    (NegZ, Bottom),
];

/// Face texel corners in the order upper-left, upper-right, lower-left, lower-right.
pub const FACE_CORNER_TEXELS: usize = 4;

/// Cube corner a face corner touches, encoded as a sign bitmask (bit 2 = +x, bit 1 = +y,
/// bit 0 = +z).
const FACE_CORNERS: [[u8; FACE_CORNER_TEXELS]; NUM_FACES] = [
    [0b111, 0b110, 0b101, 0b100],
    [0b010, 0b011, 0b000, 0b001],
    [0b010, 0b110, 0b011, 0b111],
    [0b001, 0b101, 0b000, 0b100],
    [0b011, 0b111, 0b001, 0b101],
    [0b110, 0b010, 0b100, 0b000],
];

/// Texel coordinates of corner `corner` (0..4, upper-left first) on a face of `size`.
pub fn face_corner_texel(corner: usize, size: usize) -> (usize, usize) {
    let last = size - 1;
    match corner {
        0 => (0, 0),
        1 => (last, 0),
        2 => (0, last),
        _ => (last, last),
    }
}

/// For each of the 8 cube corners, the three (face, face corner) pairs that meet there.
pub fn cube_corner_texels() -> [[(CubeFace, usize); 3]; 8] {
    let mut table = [[(PosX, 0usize); 3]; 8];
    let mut fill = [0usize; 8];
    for face in CubeFace::ALL {
        for (corner, &code) in FACE_CORNERS[face.index()].iter().enumerate() {
            let code = code as usize;
            table[code][fill[code]] = (face, corner);
            fill[code] += 1;
        }
    }
    table
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBasis {
    pub u: Vec3,
    pub v: Vec3,
    pub axis: Vec3,
}

const FACE_BASIS: [FaceBasis; NUM_FACES] = [
    FaceBasis { u: Vec3::new(0.0, 0.0, -1.0), v: Vec3::new(0.0, -1.0, 0.0), axis: Vec3::new(1.0, 0.0, 0.0) },
    FaceBasis { u: Vec3::new(0.0, 0.0, 1.0), v: Vec3::new(0.0, -1.0, 0.0), axis: Vec3::new(-1.0, 0.0, 0.0) },
    FaceBasis { u: Vec3::new(1.0, 0.0, 0.0), v: Vec3::new(0.0, 0.0, 1.0), axis: Vec3::new(0.0, 1.0, 0.0) },
    FaceBasis { u: Vec3::new(1.0, 0.0, 0.0), v: Vec3::new(0.0, 0.0, -1.0), axis: Vec3::new(0.0, -1.0, 0.0) },
    FaceBasis { u: Vec3::new(1.0, 0.0, 0.0), v: Vec3::new(0.0, -1.0, 0.0), axis: Vec3::new(0.0, 0.0, 1.0) },
    FaceBasis { u: Vec3::new(-1.0, 0.0, 0.0), v: Vec3::new(0.0, -1.0, 0.0), axis: Vec3::new(0.0, 0.0, -1.0) },
];

/// Maps a continuous texel coordinate to the [-1, 1] face range, texel centers at `+0.5`.
#[inline]
pub fn texel_to_nvc(coord: f32, size: usize) -> f32 {
    2.0 * (coord + 0.5) / size as f32 - 1.0
}

/// Unit direction through the center of texel (u, v).
pub fn texel_direction(face: CubeFace, u: usize, v: usize, size: usize) -> Vec3 {
    let nvc_u = texel_to_nvc(u as f32, size);
    let nvc_v = texel_to_nvc(v as f32, size);
    nvc_to_direction(face, nvc_u, nvc_v).normalize()
}

/// Point on the cube face at normalized coordinates (not normalized to the unit sphere).
#[inline]
pub fn nvc_to_direction(face: CubeFace, nvc_u: f32, nvc_v: f32) -> Vec3 {
    let basis = face.basis();
    basis.u * nvc_u + basis.v * nvc_v + basis.axis
}

/// Face hit by `dir` and the continuous texel coordinate of the hit, with texel centers at
/// integer coordinates. Ties between axes resolve toward x, then y.
pub fn direction_to_face_uv(dir: Vec3, size: usize) -> (CubeFace, f32, f32) {
    let abs = dir.abs();
    let (face, major) = if abs.x >= abs.y && abs.x >= abs.z {
        (if dir.x >= 0.0 { PosX } else { NegX }, abs.x)
    } else if abs.y >= abs.z {
        (if dir.y >= 0.0 { PosY } else { NegY }, abs.y)
    } else {
        (if dir.z >= 0.0 { PosZ } else { NegZ }, abs.z)
    };
    let on_face = dir / major;
    let basis = face.basis();
    let to_texel = |nvc: f32| (nvc + 1.0) * 0.5 * size as f32 - 0.5;
    (face, to_texel(on_face.dot(basis.u)), to_texel(on_face.dot(basis.v)))
}

/// Nearest texel to `dir`, clamped to the face.
pub fn direction_to_texel(dir: Vec3, size: usize) -> (CubeFace, usize, usize) {
    let (face, u, v) = direction_to_face_uv(dir, size);
    let last = size.saturating_sub(1) as f32;
    (face, u.round().clamp(0.0, last) as usize, v.round().clamp(0.0, last) as usize)
}

/// Solid angle subtended by texel (u, v) on a face of `size` texels.
///
/// The texel footprint is projected onto the unit sphere through its four corners and
/// measured as two triangles, which converges on the exact value as `size` grows.
pub fn texel_solid_angle(face: CubeFace, u: usize, v: usize, size: usize) -> f32 {
    let basis = face.basis();
    let (bu, bv, axis) = (basis.u.as_dvec3(), basis.v.as_dvec3(), basis.axis.as_dvec3());
    let corner = |du: f64, dv: f64| -> DVec3 {
        let nvc_u = 2.0 * (u as f64 + du) / size as f64 - 1.0;
        let nvc_v = 2.0 * (v as f64 + dv) / size as f64 - 1.0;
        (bu * nvc_u + bv * nvc_v + axis).normalize()
    };
    let c0 = corner(0.0, 0.0);
    let c1 = corner(0.0, 1.0);
    let c2 = corner(1.0, 0.0);
    let c3 = corner(1.0, 1.0);
    let area = 0.5 * (c1 - c0).cross(c2 - c0).length() + 0.5 * (c2 - c1).cross(c3 - c1).length();
    area as f32
}

/// Bilinear fetch from one mip level of a cube, clamped within the face hit by `dir`.
/// Writes the first `out.len()` channels.
pub fn sample_bilinear(faces: &[ImageSurface; NUM_FACES], dir: Vec3, out: &mut [f32]) {
    let size = faces[0].width();
    let (face, u, v) = direction_to_face_uv(dir, size);
    let surface = &faces[face.index()];
    let last = size.saturating_sub(1) as f32;
    let u = u.clamp(0.0, last);
    let v = v.clamp(0.0, last);
    let (u0, v0) = (u.floor(), v.floor());
    let (tu, tv) = (u - u0, v - v0);
    let (u0, v0) = (u0 as usize, v0 as usize);
    let u1 = (u0 + 1).min(size - 1);
    let v1 = (v0 + 1).min(size - 1);

    let channels = out.len().min(surface.num_channels());
    let (t00, t10) = (surface.texel(u0, v0), surface.texel(u1, v0));
    let (t01, t11) = (surface.texel(u0, v1), surface.texel(u1, v1));
    for k in 0..channels {
        let top = t00[k] * (1.0 - tu) + t10[k] * tu;
        let bottom = t01[k] * (1.0 - tu) + t11[k] * tu;
        out[k] = top * (1.0 - tv) + bottom * tv;
    }
}
