//! Prefiltering of environment cube maps into blurred mip chains for image based lighting.

pub mod bbox;
pub mod cli;
pub mod config;
pub mod cube;
pub mod error;
pub mod filter;
pub mod fixup;
pub mod format;
pub mod normalizer;
pub mod processor;
pub mod progress;
pub mod sampling;
pub mod surface;

pub use error::{CubeMapError, Result};
pub use filter::FilterType;
pub use fixup::FixupType;
pub use format::{TexelFormat, TexelLayout};
pub use processor::{CancelToken, CubeMapProcessor, FilterParams, FilterStatus};
pub use surface::{ImageSurface, InputTransform};
