//! Error type shared by the cube map processor and its surfaces.

use crate::processor::FilterStatus;

/// Failures reported by surface allocation, texel transfers and filtering control.
#[derive(thiserror::Error, Debug)]
pub enum CubeMapError {
    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: usize, height: usize },

    #[error("channel count {0} outside 1..=4")]
    InvalidChannelCount(usize),

    #[error("mip level count {0} outside 1..={max}", max = crate::processor::MAX_MIP_LEVELS)]
    InvalidMipCount(usize),

    #[error("failed to allocate {texels} texel values: {source}")]
    Allocation {
        texels: usize,
        #[source]
        source: std::collections::TryReserveError,
    },

    #[error("buffer holds {actual} bytes but {required} are required")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("face index {0} outside 0..6")]
    FaceIndex(usize),

    #[error("mip level {level} outside the {count} allocated levels")]
    MipIndex { level: usize, count: usize },

    #[error("operation requires a square surface, got {width}x{height}")]
    NotSquare { width: usize, height: usize },

    #[error("cube map processor has not been initialised")]
    NotInitialized,

    #[error("surfaces are owned by a running filter pass")]
    Busy,

    #[error("processor status is {0:?}; call refresh_status before filtering again")]
    NotReady(FilterStatus),

    #[error("failed to spawn filter thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("filter thread panicked; processor surfaces were lost")]
    WorkerPanicked,

    #[error("channel index {index} outside the {channels} channels of the cube map")]
    ChannelIndex { index: usize, channels: usize },
}

impl CubeMapError {
    pub fn buffer_too_small(required: usize, actual: usize) -> Self {
        CubeMapError::BufferTooSmall { required, actual }
    }
}

/// Result type alias for cube map operations
pub type Result<T> = std::result::Result<T, CubeMapError>;
