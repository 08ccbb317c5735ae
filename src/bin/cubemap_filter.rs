use anyhow::{anyhow, bail, Context, Result};
use cubemap_prefilter::cli::CliOptions;
use cubemap_prefilter::config::CubemapConfig;
use cubemap_prefilter::cube::CubeFace;
use cubemap_prefilter::format::{TexelFormat, TexelLayout};
use cubemap_prefilter::processor::{CubeMapProcessor, FilterStatus};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CHANNELS: usize = 4;

fn main() {
    if let Err(err) = run() {
        eprintln!("[cubemap_filter] error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if std::env::args().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CliOptions::usage());
        return Ok(());
    }
    let options = CliOptions::parse_from_env()?;
    let mut config = match &options.config {
        Some(path) => CubemapConfig::load(path)?,
        None => CubemapConfig::default(),
    };
    if !options.overrides.is_empty() {
        log::info!("command line overrides: {}", options.overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&options.overrides);

    let mut faces = Vec::with_capacity(options.faces.len());
    for path in &options.faces {
        faces.push(load_face(path)?);
    }
    let input_size = faces[0].0;
    if let Some((index, (size, _))) = faces.iter().enumerate().find(|(_, (size, _))| *size != input_size) {
        bail!("face {} is {size}x{size} but face 0 is {input_size}x{input_size}", CubeFace::ALL[index].label());
    }

    let output_size = config.resolved_output_size(input_size);
    let mip_levels = config.resolved_mip_levels(output_size);
    let mut processor = CubeMapProcessor::new(config.threads);
    processor.init(input_size, output_size, mip_levels, CHANNELS).context("failed to allocate cube map")?;
    let input_layout = TexelLayout::packed(TexelFormat::Float32, CHANNELS, input_size);
    for (index, (_, texels)) in faces.iter().enumerate() {
        processor
            .set_input_face_data(index, input_layout, bytemuck::cast_slice(texels.as_slice()), config.input.transform())
            .with_context(|| format!("failed to load face {}", CubeFace::ALL[index].label()))?;
    }
    drop(faces);

    processor.initiate_filtering(&config.filter).context("failed to start filtering")?;
    while processor.status() == FilterStatus::Processing {
        log::info!("{}", processor.filter_progress_string());
        thread::sleep(POLL_INTERVAL);
    }
    let status = processor.wait()?;
    if status != FilterStatus::Completed {
        bail!("filtering ended with status {}", status.label());
    }
    if config.write_mip_level_into_alpha {
        processor.write_mip_level_into_alpha()?;
    }

    fs::create_dir_all(&options.out_dir)
        .with_context(|| format!("failed to create output directory {}", options.out_dir.display()))?;
    let mut written = 0usize;
    for level in 0..processor.mip_levels() {
        let size = output_size >> level;
        let layout = TexelLayout::packed(TexelFormat::Unorm8, CHANNELS, size);
        let mut bytes = vec![0u8; layout.required_len(size, size)];
        for face in CubeFace::ALL {
            processor.get_output_face_data(
                face.index(),
                level,
                layout,
                &mut bytes,
                config.output.scale,
                config.output.gamma,
            )?;
            let path = options.out_dir.join(format!("mip{level}_{}.png", face.label()));
            let image = image::RgbaImage::from_raw(size as u32, size as u32, bytes.clone())
                .ok_or_else(|| anyhow!("output buffer does not match a {size}x{size} image"))?;
            image.save(&path).with_context(|| format!("failed to write {}", path.display()))?;
            written += 1;
        }
    }
    println!("Wrote {written} face images ({} mip levels) to {}", processor.mip_levels(), options.out_dir.display());
    Ok(())
}

/// Decodes one face as square RGBA `f32` texels.
fn load_face(path: &Path) -> Result<(usize, Vec<f32>)> {
    let image = image::open(path).with_context(|| format!("failed to open face image {}", path.display()))?;
    let rgba = image.into_rgba32f();
    let (width, height) = rgba.dimensions();
    if width != height || width == 0 {
        bail!("face image {} is {width}x{height}; cube faces must be square", path.display());
    }
    Ok((width as usize, rgba.into_raw()))
}
