//! Cached per-texel direction and solid-angle cube used by the exhaustive filters.

use crate::cube::{texel_direction, texel_solid_angle, CubeFace, NUM_FACES};
use crate::error::Result;
use crate::surface::ImageSurface;

/// Six surfaces holding the unit direction of every texel center in channels 0..3 and, when
/// built with solid angles, the texel's solid angle in channel 3.
#[derive(Debug, Default)]
pub struct NormalizerCube {
    size: usize,
    solid_angle: bool,
    faces: [ImageSurface; NUM_FACES],
}

impl NormalizerCube {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn has_solid_angle(&self) -> bool {
        self.solid_angle
    }

    pub fn faces(&self) -> &[ImageSurface; NUM_FACES] {
        &self.faces
    }

    pub fn face(&self, face: CubeFace) -> &ImageSurface {
        &self.faces[face.index()]
    }

    /// Rebuilds the cube unless it already matches `size` and `solid_angle`.
    /// Returns `true` when a rebuild happened.
    pub fn ensure(&mut self, size: usize, solid_angle: bool) -> Result<bool> {
        if self.size == size && self.solid_angle == solid_angle && !self.faces[0].is_empty() {
            return Ok(false);
        }
        if solid_angle {
            self.build_with_solid_angle(size)?;
        } else {
            self.build(size)?;
        }
        Ok(true)
    }

    /// Fills a 3-channel direction cube at `size`.
    pub fn build(&mut self, size: usize) -> Result<()> {
        self.fill(size, false)
    }

    /// Fills a 4-channel cube with directions plus per-texel solid angle.
    pub fn build_with_solid_angle(&mut self, size: usize) -> Result<()> {
        self.fill(size, true)
    }

    fn fill(&mut self, size: usize, solid_angle: bool) -> Result<()> {
        self.size = 0;
        let channels = if solid_angle { 4 } else { 3 };
        for face in CubeFace::ALL {
            let surface = &mut self.faces[face.index()];
            surface.init(size, size, channels)?;
            for v in 0..size {
                for u in 0..size {
                    let dir = texel_direction(face, u, v, size);
                    let texel = surface.texel_mut(u, v);
                    texel[..3].copy_from_slice(&dir.to_array());
                    if solid_angle {
                        texel[3] = texel_solid_angle(face, u, v, size);
                    }
                }
            }
        }
        self.size = size;
        self.solid_angle = solid_angle;
        log::debug!("built {size}x{size} normalizer cube (solid angle: {solid_angle})");
        Ok(())
    }
}
