//! External texel encodings accepted by surface transfers.

use half::f16;
use serde::Deserialize;

use crate::error::{CubeMapError, Result};

/// Per-channel encoding of an external image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TexelFormat {
    Unorm8,
    /// 8-bit unsigned normalized with channels 0 and 2 swapped in memory.
    Unorm8Bgra,
    Unorm16,
    Float16,
    Float32,
}

impl TexelFormat {
    pub fn bytes_per_channel(self) -> usize {
        match self {
            TexelFormat::Unorm8 | TexelFormat::Unorm8Bgra => 1,
            TexelFormat::Unorm16 | TexelFormat::Float16 => 2,
            TexelFormat::Float32 => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TexelFormat::Unorm8 => "UNORM8",
            TexelFormat::Unorm8Bgra => "UNORM8_BGRA",
            TexelFormat::Unorm16 => "UNORM16",
            TexelFormat::Float16 => "FLOAT16",
            TexelFormat::Float32 => "FLOAT32",
        }
    }

    /// Maps a surface channel to the channel slot used in external memory.
    ///
    /// Only the BGRA encoding swizzles, and only when the external buffer holds at least three
    /// channels. The surface's own channel count does not matter.
    pub fn external_channel(self, channel: usize, external_channels: usize) -> usize {
        if self == TexelFormat::Unorm8Bgra && external_channels >= 3 {
            match channel {
                0 => 2,
                2 => 0,
                other => other,
            }
        } else {
            channel
        }
    }

    /// Decodes one channel value. `bytes` must hold at least `bytes_per_channel` bytes.
    pub fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            TexelFormat::Unorm8 | TexelFormat::Unorm8Bgra => bytes[0] as f32 / 255.0,
            TexelFormat::Unorm16 => bytemuck::pod_read_unaligned::<u16>(&bytes[..2]) as f32 / 65535.0,
            TexelFormat::Float16 => f16_bits_to_f32(bytemuck::pod_read_unaligned::<u16>(&bytes[..2])),
            TexelFormat::Float32 => bytemuck::pod_read_unaligned::<f32>(&bytes[..4]),
        }
    }

    /// Encodes one channel value. Normalized formats clamp to [0, 1] and round to nearest.
    pub fn encode(self, value: f32, bytes: &mut [u8]) {
        match self {
            TexelFormat::Unorm8 | TexelFormat::Unorm8Bgra => {
                bytes[0] = quantize_unorm(value, 255.0) as u8;
            }
            TexelFormat::Unorm16 => {
                let quantized = quantize_unorm(value, 65535.0) as u16;
                bytes[..2].copy_from_slice(&quantized.to_ne_bytes());
            }
            TexelFormat::Float16 => {
                bytes[..2].copy_from_slice(&f32_to_f16_bits(value).to_ne_bytes());
            }
            TexelFormat::Float32 => {
                bytes[..4].copy_from_slice(&value.to_ne_bytes());
            }
        }
    }
}

fn quantize_unorm(value: f32, max: f32) -> f32 {
    // NaN clamps to zero.
    let clamped = if value > 0.0 { value.min(1.0) } else { 0.0 };
    (clamped * max + 0.5).floor()
}

/// Converts IEEE half-precision bits (1 sign, 5 exponent, 10 mantissa) to `f32`.
///
/// Denormals are normalised into the wider exponent range, infinities stay infinite and NaN
/// payloads are carried across.
pub fn f16_bits_to_f32(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Converts an `f32` to half-precision bits, rounding to nearest even.
///
/// Values beyond the half range saturate to signed infinity, values below the smallest
/// denormal flush to signed zero.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    f16::from_f32(value).to_bits()
}

/// Shape of an external image buffer: encoding, interleaved channel count and row pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelLayout {
    pub format: TexelFormat,
    pub channels: usize,
    pub row_pitch: usize,
}

impl TexelLayout {
    pub fn new(format: TexelFormat, channels: usize, row_pitch: usize) -> Self {
        Self { format, channels, row_pitch }
    }

    /// Tightly packed layout for `width` texels per row.
    pub fn packed(format: TexelFormat, channels: usize, width: usize) -> Self {
        Self { format, channels, row_pitch: width * channels * format.bytes_per_channel() }
    }

    pub fn texel_stride(&self) -> usize {
        self.channels * self.format.bytes_per_channel()
    }

    /// Bytes a buffer must hold to cover `width` x `height` texels in this layout.
    pub fn required_len(&self, width: usize, height: usize) -> usize {
        if width == 0 || height == 0 {
            return 0;
        }
        (height - 1) * self.row_pitch + width * self.texel_stride()
    }

    pub(crate) fn validate(&self, width: usize, height: usize, actual: usize) -> Result<()> {
        if self.channels == 0 || self.channels > 4 {
            return Err(CubeMapError::InvalidChannelCount(self.channels));
        }
        let required = self.required_len(width, height);
        if actual < required || (height > 1 && self.row_pitch < width * self.texel_stride()) {
            return Err(CubeMapError::buffer_too_small(required, actual));
        }
        Ok(())
    }
}
