use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::filter::FilterType;
use crate::fixup::FixupType;
use crate::processor::{FilterParams, MAX_FILTER_THREADS, MAX_MIP_LEVELS};
use crate::surface::InputTransform;

/// Transform applied while loading source faces.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputConfig {
    #[serde(default = "InputConfig::default_max_clamp")]
    pub max_clamp: f32,
    #[serde(default = "InputConfig::default_degamma")]
    pub degamma: f32,
    #[serde(default = "InputConfig::default_scale")]
    pub scale: f32,
}

/// Transform applied while writing filtered faces.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_scale")]
    pub scale: f32,
    #[serde(default = "OutputConfig::default_gamma")]
    pub gamma: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CubemapConfig {
    /// Output face size; the input face size when unset.
    #[serde(default)]
    pub output_size: Option<usize>,
    /// Output mip count; the full chain down to 1x1 when unset.
    #[serde(default)]
    pub mip_levels: Option<usize>,
    #[serde(default = "CubemapConfig::default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterParams,
    #[serde(default)]
    pub write_mip_level_into_alpha: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CubemapConfigOverrides {
    pub output_size: Option<usize>,
    pub mip_levels: Option<usize>,
    pub threads: Option<usize>,
    pub filter_type: Option<FilterType>,
    pub fixup_type: Option<FixupType>,
}

impl InputConfig {
    const fn default_max_clamp() -> f32 {
        f32::MAX
    }

    const fn default_degamma() -> f32 {
        1.0
    }

    const fn default_scale() -> f32 {
        1.0
    }

    pub fn transform(&self) -> InputTransform {
        InputTransform { max_clamp: self.max_clamp, degamma: self.degamma, scale: self.scale }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_clamp: Self::default_max_clamp(),
            degamma: Self::default_degamma(),
            scale: Self::default_scale(),
        }
    }
}

impl OutputConfig {
    const fn default_scale() -> f32 {
        1.0
    }

    const fn default_gamma() -> f32 {
        1.0
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { scale: Self::default_scale(), gamma: Self::default_gamma() }
    }
}

impl Default for CubemapConfig {
    fn default() -> Self {
        Self {
            output_size: None,
            mip_levels: None,
            threads: Self::default_threads(),
            input: InputConfig::default(),
            output: OutputConfig::default(),
            filter: FilterParams::default(),
            write_mip_level_into_alpha: false,
        }
    }
}

impl CubemapConfig {
    const fn default_threads() -> usize {
        MAX_FILTER_THREADS
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &CubemapConfigOverrides) {
        if let Some(size) = overrides.output_size {
            self.output_size = Some(size);
        }
        if let Some(levels) = overrides.mip_levels {
            self.mip_levels = Some(levels);
        }
        if let Some(threads) = overrides.threads {
            self.threads = threads;
        }
        if let Some(filter_type) = overrides.filter_type {
            self.filter.filter_type = filter_type;
        }
        if let Some(fixup_type) = overrides.fixup_type {
            self.filter.fixup_type = fixup_type;
        }
    }

    /// Output face size for sources `input_size` texels wide.
    pub fn resolved_output_size(&self, input_size: usize) -> usize {
        self.output_size.unwrap_or(input_size)
    }

    /// Mip count for an `output_size` chain, never above [`MAX_MIP_LEVELS`].
    pub fn resolved_mip_levels(&self, output_size: usize) -> usize {
        let full_chain = (usize::BITS - output_size.max(1).leading_zeros()) as usize;
        self.mip_levels.unwrap_or(full_chain).min(MAX_MIP_LEVELS)
    }
}

impl CubemapConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.output_size.is_none()
            && self.mip_levels.is_none()
            && self.threads.is_none()
            && self.filter_type.is_none()
            && self.fixup_type.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.output_size.is_some() {
            fields.push("output_size");
        }
        if self.mip_levels.is_some() {
            fields.push("mip_levels");
        }
        if self.threads.is_some() {
            fields.push("threads");
        }
        if self.filter_type.is_some() {
            fields.push("filter_type");
        }
        if self.fixup_type.is_some() {
            fields.push("fixup_type");
        }
        fields
    }
}
