//! Floating point texel storage with format-converting transfers.

use crate::error::{CubeMapError, Result};
use crate::format::TexelLayout;

/// A 2D image of `width * height` texels with 1-4 interleaved `f32` channels.
///
/// Storage is row-major and tightly packed; `data().len()` always equals
/// `width * height * num_channels`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSurface {
    width: usize,
    height: usize,
    num_channels: usize,
    data: Vec<f32>,
}

/// Adjustments applied while copying texels into a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputTransform {
    /// Upper clamp applied to every incoming channel value.
    pub max_clamp: f32,
    /// Exponent applied to color channels to undo the source gamma.
    pub degamma: f32,
    /// Linear scale applied to color channels after degamma.
    pub scale: f32,
}

impl Default for InputTransform {
    fn default() -> Self {
        Self { max_clamp: f32::MAX, degamma: 1.0, scale: 1.0 }
    }
}

/// Number of leading channels treated as color by the gamma and scale transforms.
const COLOR_CHANNELS: usize = 3;

impl ImageSurface {
    pub fn new(width: usize, height: usize, num_channels: usize) -> Result<Self> {
        let mut surface = Self::default();
        surface.init(width, height, num_channels)?;
        Ok(surface)
    }

    /// (Re)allocates storage, discarding previous contents. New texels are zero.
    ///
    /// On failure the surface is left empty (0x0) and the failure is logged.
    pub fn init(&mut self, width: usize, height: usize, num_channels: usize) -> Result<()> {
        self.clear();
        if num_channels == 0 || num_channels > 4 {
            return Err(CubeMapError::InvalidChannelCount(num_channels));
        }
        let texels = width
            .checked_mul(height)
            .and_then(|count| count.checked_mul(num_channels))
            .ok_or(CubeMapError::InvalidSize { width, height })?;
        let mut data = Vec::new();
        if let Err(source) = data.try_reserve_exact(texels) {
            log::error!("unable to allocate {width}x{height}x{num_channels} image surface: {source}");
            return Err(CubeMapError::Allocation { texels, source });
        }
        data.resize(texels, 0.0);
        self.width = width;
        self.height = height;
        self.num_channels = num_channels;
        self.data = data;
        Ok(())
    }

    /// Releases storage.
    pub fn clear(&mut self) {
        self.width = 0;
        self.height = 0;
        self.num_channels = 0;
        self.data = Vec::new();
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Offset of the first channel of texel (u, v) in `data()`.
    #[inline]
    pub fn texel_offset(&self, u: usize, v: usize) -> usize {
        debug_assert!(u < self.width && v < self.height, "texel ({u}, {v}) out of bounds");
        (v * self.width + u) * self.num_channels
    }

    /// Channels of texel (u, v). Callers keep the coordinates in bounds.
    #[inline]
    pub fn texel(&self, u: usize, v: usize) -> &[f32] {
        let offset = self.texel_offset(u, v);
        &self.data[offset..offset + self.num_channels]
    }

    #[inline]
    pub fn texel_mut(&mut self, u: usize, v: usize) -> &mut [f32] {
        let offset = self.texel_offset(u, v);
        let channels = self.num_channels;
        &mut self.data[offset..offset + channels]
    }

    pub fn row(&self, v: usize) -> &[f32] {
        let stride = self.width * self.num_channels;
        &self.data[v * stride..(v + 1) * stride]
    }

    pub fn row_mut(&mut self, v: usize) -> &mut [f32] {
        let stride = self.width * self.num_channels;
        &mut self.data[v * stride..(v + 1) * stride]
    }

    /// Copies texels from an external buffer without any value transform.
    pub fn set_image_data(&mut self, layout: TexelLayout, src: &[u8]) -> Result<()> {
        self.set_image_data_clamp_degamma_scale(layout, src, InputTransform::default())
    }

    /// Copies texels from an external buffer, clamping every channel to `max_clamp` and
    /// applying `value.powf(degamma) * scale` to the color channels.
    ///
    /// Channels beyond `min(layout.channels, num_channels)` keep their previous values.
    pub fn set_image_data_clamp_degamma_scale(
        &mut self,
        layout: TexelLayout,
        src: &[u8],
        transform: InputTransform,
    ) -> Result<()> {
        layout.validate(self.width, self.height, src.len())?;
        let channels = layout.channels.min(self.num_channels);
        let channel_bytes = layout.format.bytes_per_channel();
        let stride = layout.texel_stride();
        let identity = transform == InputTransform::default();

        for v in 0..self.height {
            let src_row = &src[v * layout.row_pitch..];
            for u in 0..self.width {
                let texel_bytes = &src_row[u * stride..];
                let offset = self.texel_offset(u, v);
                for k in 0..channels {
                    let external = layout.format.external_channel(k, layout.channels);
                    let mut value = layout.format.decode(&texel_bytes[external * channel_bytes..]);
                    if !identity {
                        value = value.min(transform.max_clamp);
                        if k < COLOR_CHANNELS {
                            value = value.powf(transform.degamma) * transform.scale;
                        }
                    }
                    self.data[offset + k] = value;
                }
            }
        }
        Ok(())
    }

    /// Copies texels out to an external buffer without any value transform.
    pub fn get_image_data(&self, layout: TexelLayout, dst: &mut [u8]) -> Result<()> {
        self.get_image_data_scale_gamma(layout, dst, 1.0, 1.0)
    }

    /// Copies texels out, applying `(value * scale).powf(1 / gamma)` to the color channels.
    ///
    /// Destination channels beyond `min(layout.channels, num_channels)` are left untouched.
    pub fn get_image_data_scale_gamma(
        &self,
        layout: TexelLayout,
        dst: &mut [u8],
        scale: f32,
        gamma: f32,
    ) -> Result<()> {
        layout.validate(self.width, self.height, dst.len())?;
        let channels = layout.channels.min(self.num_channels);
        let channel_bytes = layout.format.bytes_per_channel();
        let stride = layout.texel_stride();
        let identity = scale == 1.0 && gamma == 1.0;
        let inv_gamma = 1.0 / gamma;

        for v in 0..self.height {
            let dst_row = &mut dst[v * layout.row_pitch..];
            for u in 0..self.width {
                let texel_bytes = &mut dst_row[u * stride..];
                let texel = self.texel(u, v);
                for (k, &stored) in texel.iter().enumerate().take(channels) {
                    let mut value = stored;
                    if !identity && k < COLOR_CHANNELS {
                        value = (value * scale).powf(inv_gamma);
                    }
                    let external = layout.format.external_channel(k, layout.channels);
                    layout.format.encode(value, &mut texel_bytes[external * channel_bytes..]);
                }
            }
        }
        Ok(())
    }

    /// Sets one channel of every texel to `value`. No-op when the channel does not exist.
    pub fn clear_channel_const(&mut self, channel: usize, value: f32) {
        if channel >= self.num_channels {
            return;
        }
        for texel in self.data.chunks_exact_mut(self.num_channels) {
            texel[channel] = value;
        }
    }

    /// Mirrors the surface around its vertical axis (u -> width - 1 - u).
    pub fn in_place_horizontal_flip(&mut self) {
        let channels = self.num_channels;
        let width = self.width;
        for v in 0..self.height {
            let row = self.row_mut(v);
            for u in 0..width / 2 {
                let mirror = width - 1 - u;
                for k in 0..channels {
                    row.swap(u * channels + k, mirror * channels + k);
                }
            }
        }
    }

    /// Mirrors the surface around its horizontal axis (v -> height - 1 - v).
    pub fn in_place_vertical_flip(&mut self) {
        let stride = self.width * self.num_channels;
        let height = self.height;
        for v in 0..height / 2 {
            let mirror = height - 1 - v;
            let (upper, lower) = self.data.split_at_mut(mirror * stride);
            upper[v * stride..(v + 1) * stride].swap_with_slice(&mut lower[..stride]);
        }
    }

    /// Transposes u and v in place. Only square surfaces can be transposed; anything else
    /// is rejected and left unchanged.
    pub fn in_place_diagonal_uv_flip(&mut self) -> Result<()> {
        if self.width != self.height {
            return Err(CubeMapError::NotSquare { width: self.width, height: self.height });
        }
        let channels = self.num_channels;
        for v in 0..self.height {
            for u in (v + 1)..self.width {
                let a = self.texel_offset(u, v);
                let b = self.texel_offset(v, u);
                for k in 0..channels {
                    self.data.swap(a + k, b + k);
                }
            }
        }
        Ok(())
    }

    /// Reorders the channels of every texel: channel `k` takes the old value of `sources[k]`.
    pub fn swap_channels(&mut self, sources: [usize; 4]) {
        let channels = self.num_channels;
        let mut scratch = [0.0f32; 4];
        for texel in self.data.chunks_exact_mut(channels) {
            scratch[..channels].copy_from_slice(texel);
            for (k, value) in texel.iter_mut().enumerate() {
                let source = sources[k];
                debug_assert!(source < channels, "channel source {source} out of range");
                *value = scratch[source.min(channels - 1)];
            }
        }
    }

    /// Box-filters `source` into this surface at half resolution (minimum 1x1).
    pub fn downsample_from(&mut self, source: &ImageSurface) -> Result<()> {
        let width = (source.width / 2).max(1);
        let height = (source.height / 2).max(1);
        self.init(width, height, source.num_channels)?;
        let channels = source.num_channels;
        for v in 0..height {
            for u in 0..width {
                let mut accum = [0.0f32; 4];
                let mut taps = 0.0f32;
                for sv in (v * 2)..(v * 2 + 2).min(source.height) {
                    for su in (u * 2)..(u * 2 + 2).min(source.width) {
                        for (k, value) in source.texel(su, sv).iter().enumerate() {
                            accum[k] += value;
                        }
                        taps += 1.0;
                    }
                }
                let texel = self.texel_mut(u, v);
                for k in 0..channels {
                    texel[k] = accum[k] / taps;
                }
            }
        }
        Ok(())
    }
}
