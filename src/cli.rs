use crate::config::CubemapConfigOverrides;
use crate::cube::NUM_FACES;
use crate::filter::FilterType;
use crate::fixup::FixupType;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

const USAGE: &str = "Usage: cubemap_filter --faces px,nx,py,ny,pz,nz --out <dir> [--config <json>] \
[--size N] [--mips N] [--threads N] [--filter <type>] [--fixup <type>]";

/// Arguments of the `cubemap_filter` tool.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliOptions {
    /// Source images in face order +X, -X, +Y, -Y, +Z, -Z.
    pub faces: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub config: Option<PathBuf>,
    pub overrides: CubemapConfigOverrides,
}

impl CliOptions {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn usage() -> &'static str {
        USAGE
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = CliOptions::default();
        let mut out_dir = None;
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. {USAGE}");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "faces" => {
                    let faces: Vec<PathBuf> =
                        value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(PathBuf::from).collect();
                    if faces.len() != NUM_FACES {
                        bail!("Expected {NUM_FACES} comma separated face images, got {}", faces.len());
                    }
                    options.faces = faces;
                }
                "out" => out_dir = Some(PathBuf::from(value)),
                "config" => options.config = Some(PathBuf::from(value)),
                "size" => {
                    options.overrides.output_size =
                        Some(value.parse::<usize>().with_context(|| format!("Invalid size '{value}'"))?);
                }
                "mips" => {
                    options.overrides.mip_levels =
                        Some(value.parse::<usize>().with_context(|| format!("Invalid mip count '{value}'"))?);
                }
                "threads" => {
                    options.overrides.threads =
                        Some(value.parse::<usize>().with_context(|| format!("Invalid thread count '{value}'"))?);
                }
                "filter" => {
                    options.overrides.filter_type = Some(
                        FilterType::from_label(&value)
                            .ok_or_else(|| anyhow!("Unknown filter type '{value}'"))?,
                    );
                }
                "fixup" => {
                    options.overrides.fixup_type =
                        Some(FixupType::from_label(&value).ok_or_else(|| anyhow!("Unknown fixup type '{value}'"))?);
                }
                _ => bail!("Unknown flag '{flag}'. {USAGE}"),
            }
        }
        if options.faces.is_empty() {
            bail!("Missing --faces. {USAGE}");
        }
        options.out_dir = out_dir.ok_or_else(|| anyhow!("Missing --out. {USAGE}"))?;
        Ok(options)
    }
}
