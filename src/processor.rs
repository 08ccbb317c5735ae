//! Cube map processor: owns the input and output cube maps and drives filter passes over the
//! mip chain, either on the calling thread or on up to two filter threads.
//!
//! A background pass takes the surfaces with it. The driver thread hands them back when it is
//! joined, which happens lazily the next time the surfaces are touched after the pass leaves
//! [`FilterStatus::Processing`].

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use serde::Deserialize;

use crate::cube::{CubeFace, NUM_FACES};
use crate::error::{CubeMapError, Result};
use crate::filter::{cosine_power_cone_angle, filter_face, FilterKernel, FilterType};
use crate::fixup::{fixup_cube_edges, FixupType};
use crate::format::TexelLayout;
use crate::normalizer::NormalizerCube;
use crate::progress::{ProgressModel, ThreadProgress};
use crate::sampling::filter_face_ggx;
use crate::surface::{ImageSurface, InputTransform};

pub const MAX_MIP_LEVELS: usize = 16;
pub const MAX_FILTER_THREADS: usize = 2;

/// Filter threads used by [`CubeMapProcessor::default`].
pub const DEFAULT_FILTER_THREADS: usize = 1;

/// Faces owned by the first thread when a level is split across two threads.
const FACE_SPLIT: usize = 3;

type CubeFaces = [ImageSurface; NUM_FACES];

/// Lifecycle of a filter pass.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterStatus {
    #[default]
    Ready = 0,
    Processing = 1,
    Completed = 2,
    Terminated = 3,
}

impl FilterStatus {
    pub fn label(self) -> &'static str {
        match self {
            FilterStatus::Ready => "ready",
            FilterStatus::Processing => "processing",
            FilterStatus::Completed => "completed",
            FilterStatus::Terminated => "terminated",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => FilterStatus::Processing,
            2 => FilterStatus::Completed,
            3 => FilterStatus::Terminated,
            _ => FilterStatus::Ready,
        }
    }
}

/// Arguments of a filter pass. Angles are full cone angles in degrees.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterParams {
    #[serde(default = "FilterParams::default_base_filter_angle")]
    pub base_filter_angle: f32,
    #[serde(default = "FilterParams::default_initial_mip_angle")]
    pub initial_mip_angle: f32,
    #[serde(default = "FilterParams::default_mip_angle_per_level_scale")]
    pub mip_angle_per_level_scale: f32,
    #[serde(default)]
    pub filter_type: FilterType,
    #[serde(default)]
    pub fixup_type: FixupType,
    #[serde(default = "FilterParams::default_fixup_width")]
    pub fixup_width: usize,
    #[serde(default = "FilterParams::default_use_solid_angle")]
    pub use_solid_angle: bool,
    #[serde(default = "FilterParams::default_gloss_scale")]
    pub gloss_scale: f32,
    #[serde(default = "FilterParams::default_gloss_bias")]
    pub gloss_bias: f32,
    #[serde(default = "FilterParams::default_ggx_sample_count")]
    pub ggx_sample_count: u32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            base_filter_angle: Self::default_base_filter_angle(),
            initial_mip_angle: Self::default_initial_mip_angle(),
            mip_angle_per_level_scale: Self::default_mip_angle_per_level_scale(),
            filter_type: FilterType::default(),
            fixup_type: FixupType::default(),
            fixup_width: Self::default_fixup_width(),
            use_solid_angle: Self::default_use_solid_angle(),
            gloss_scale: Self::default_gloss_scale(),
            gloss_bias: Self::default_gloss_bias(),
            ggx_sample_count: Self::default_ggx_sample_count(),
        }
    }
}

impl FilterParams {
    const fn default_base_filter_angle() -> f32 {
        0.0
    }

    const fn default_initial_mip_angle() -> f32 {
        1.0
    }

    const fn default_mip_angle_per_level_scale() -> f32 {
        2.0
    }

    const fn default_fixup_width() -> usize {
        1
    }

    const fn default_use_solid_angle() -> bool {
        true
    }

    const fn default_gloss_scale() -> f32 {
        10.0
    }

    const fn default_gloss_bias() -> f32 {
        1.0
    }

    const fn default_ggx_sample_count() -> u32 {
        64
    }

    /// Cone angle of mip `level`: the base angle for level 0, then
    /// `initial_mip_angle * mip_angle_per_level_scale^(level - 1)`.
    pub fn cone_angle_for_level(&self, level: usize) -> f32 {
        if level == 0 {
            self.base_filter_angle
        } else {
            self.initial_mip_angle * self.mip_angle_per_level_scale.powi(level as i32 - 1)
        }
    }

    /// Phong exponent of cosine-power mip `level` in a chain of `mip_levels`. Gloss falls
    /// linearly from 1 at the top level to 0 three levels above the bottom.
    pub fn specular_power_for_level(&self, level: usize, mip_levels: usize) -> f32 {
        let span = mip_levels.saturating_sub(3).max(1) as f32;
        let gloss = (1.0 - level as f32 / span).max(0.0);
        (self.gloss_scale * gloss + self.gloss_bias).exp2() * 0.25
    }
}

#[derive(Debug, Default)]
struct FilterShared {
    status: AtomicU8,
    shutdown: AtomicBool,
    progress: [ThreadProgress; MAX_FILTER_THREADS],
}

impl FilterShared {
    fn status(&self) -> FilterStatus {
        FilterStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: FilterStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Raises the shutdown signal of a processor from any thread. Works for background passes
/// and for synchronous passes running on another thread.
#[derive(Debug, Clone)]
pub struct CancelToken {
    shared: Arc<FilterShared>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.shutdown_requested()
    }
}

#[derive(Debug, Default)]
struct CubeMapSurfaces {
    input: Vec<CubeFaces>,
    output: Vec<CubeFaces>,
    normalizer: NormalizerCube,
}

/// Filters an environment cube map into a chain of progressively blurred mip levels.
#[derive(Debug)]
pub struct CubeMapProcessor {
    input_size: usize,
    output_size: usize,
    num_channels: usize,
    mip_levels: usize,
    num_filter_threads: usize,
    surfaces: CubeMapSurfaces,
    worker: Option<JoinHandle<CubeMapSurfaces>>,
    shared: Arc<FilterShared>,
    progress_model: ProgressModel,
}

impl Default for CubeMapProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_THREADS)
    }
}

impl CubeMapProcessor {
    /// Creates an empty processor. `num_filter_threads` is clamped to [`MAX_FILTER_THREADS`];
    /// zero filters on the calling thread.
    pub fn new(num_filter_threads: usize) -> Self {
        Self {
            input_size: 0,
            output_size: 0,
            num_channels: 0,
            mip_levels: 0,
            num_filter_threads: num_filter_threads.min(MAX_FILTER_THREADS),
            surfaces: CubeMapSurfaces::default(),
            worker: None,
            shared: Arc::new(FilterShared::default()),
            progress_model: ProgressModel::default(),
        }
    }

    pub fn num_filter_threads(&self) -> usize {
        self.num_filter_threads
    }

    /// Takes effect on the next pass.
    pub fn set_num_filter_threads(&mut self, num_filter_threads: usize) {
        self.num_filter_threads = num_filter_threads.min(MAX_FILTER_THREADS);
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Output mip levels allocated by [`init`](Self::init). Levels stop once a face would
    /// shrink below one texel, so this can be less than requested.
    pub fn mip_levels(&self) -> usize {
        self.mip_levels
    }

    /// Allocates zeroed input and output cube maps, discarding any previous contents.
    ///
    /// Output level `k` is `output_size >> k` texels wide. Input level 0 is `input_size`
    /// wide; deeper input levels are only built for GGX passes.
    pub fn init(&mut self, input_size: usize, output_size: usize, mip_levels: usize, num_channels: usize) -> Result<()> {
        if let Err(err) = self.terminate_active_threads() {
            log::warn!("discarding previous filter pass: {err}");
        }
        if mip_levels == 0 || mip_levels > MAX_MIP_LEVELS {
            return Err(CubeMapError::InvalidMipCount(mip_levels));
        }
        if input_size == 0 {
            return Err(CubeMapError::InvalidSize { width: input_size, height: input_size });
        }
        if output_size == 0 {
            return Err(CubeMapError::InvalidSize { width: output_size, height: output_size });
        }
        if num_channels == 0 || num_channels > 4 {
            return Err(CubeMapError::InvalidChannelCount(num_channels));
        }

        self.release_surfaces();
        let mut surfaces = CubeMapSurfaces::default();
        surfaces.input.push(allocate_cube(input_size, num_channels)?);
        let mut size = output_size;
        while surfaces.output.len() < mip_levels && size > 0 {
            surfaces.output.push(allocate_cube(size, num_channels)?);
            size /= 2;
        }

        self.surfaces = surfaces;
        self.input_size = input_size;
        self.output_size = output_size;
        self.num_channels = num_channels;
        self.mip_levels = self.surfaces.output.len();
        self.progress_model = ProgressModel {
            input_size,
            output_size,
            mip_levels: self.mip_levels,
            ..ProgressModel::default()
        };
        self.shared.set_status(FilterStatus::Ready);
        log::debug!(
            "initialised cube map processor: input {input_size}, output {output_size}, {} mip levels, {num_channels} channels",
            self.surfaces.output.len()
        );
        Ok(())
    }

    /// Stops any running pass and releases every surface.
    pub fn clear(&mut self) {
        if let Err(err) = self.terminate_active_threads() {
            log::warn!("clearing after failed filter pass: {err}");
        }
        self.release_surfaces();
        self.shared.set_status(FilterStatus::Ready);
    }

    fn release_surfaces(&mut self) {
        self.surfaces = CubeMapSurfaces::default();
        self.input_size = 0;
        self.output_size = 0;
        self.num_channels = 0;
        self.mip_levels = 0;
        self.progress_model = ProgressModel::default();
    }

    pub fn status(&self) -> FilterStatus {
        self.shared.status()
    }

    /// Acknowledges a finished or terminated pass so a new one can start.
    pub fn refresh_status(&mut self) {
        if self.shared.status() != FilterStatus::Processing {
            self.shared.set_status(FilterStatus::Ready);
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken { shared: Arc::clone(&self.shared) }
    }

    /// One status line per filter thread with its completion estimate and position.
    pub fn filter_progress_string(&self) -> String {
        self.progress_model.status_string(&self.shared.progress, self.num_filter_threads)
    }

    /// Copies one input face in from an external buffer, stopping any running pass first.
    pub fn set_input_face_data(
        &mut self,
        face: usize,
        layout: TexelLayout,
        src: &[u8],
        transform: InputTransform,
    ) -> Result<()> {
        self.terminate_active_threads()?;
        let face = CubeFace::from_index(face)?;
        let surfaces = self.surfaces()?;
        surfaces.input[0][face.index()].set_image_data_clamp_degamma_scale(layout, src, transform)
    }

    /// Copies one face of input mip `level` out, applying `scale` then `1 / gamma` to color.
    pub fn get_input_face_data(
        &mut self,
        face: usize,
        level: usize,
        layout: TexelLayout,
        dst: &mut [u8],
        scale: f32,
        gamma: f32,
    ) -> Result<()> {
        let face = CubeFace::from_index(face)?;
        let surfaces = self.surfaces()?;
        level_faces(&surfaces.input, level)?[face.index()].get_image_data_scale_gamma(layout, dst, scale, gamma)
    }

    /// Copies one face of output mip `level` out, applying `scale` then `1 / gamma` to color.
    pub fn get_output_face_data(
        &mut self,
        face: usize,
        level: usize,
        layout: TexelLayout,
        dst: &mut [u8],
        scale: f32,
        gamma: f32,
    ) -> Result<()> {
        let face = CubeFace::from_index(face)?;
        let surfaces = self.surfaces()?;
        level_faces(&surfaces.output, level)?[face.index()].get_image_data_scale_gamma(layout, dst, scale, gamma)
    }

    /// Borrows one output face. Fails while a pass owns the surfaces.
    pub fn output_face(&mut self, face: usize, level: usize) -> Result<&ImageSurface> {
        let face = CubeFace::from_index(face)?;
        let surfaces = self.surfaces()?;
        Ok(&level_faces(&surfaces.output, level)?[face.index()])
    }

    /// Borrows one input face. Fails while a pass owns the surfaces.
    pub fn input_face(&mut self, face: usize, level: usize) -> Result<&ImageSurface> {
        let face = CubeFace::from_index(face)?;
        let surfaces = self.surfaces()?;
        Ok(&level_faces(&surfaces.input, level)?[face.index()])
    }

    /// Mirrors every input face horizontally.
    pub fn flip_input_cubemap_faces(&mut self) -> Result<()> {
        self.terminate_active_threads()?;
        let surfaces = self.surfaces()?;
        surfaces.input.iter_mut().flatten().for_each(ImageSurface::in_place_horizontal_flip);
        Ok(())
    }

    /// Mirrors every output face horizontally.
    pub fn flip_output_cubemap_faces(&mut self) -> Result<()> {
        self.terminate_active_threads()?;
        let surfaces = self.surfaces()?;
        surfaces.output.iter_mut().flatten().for_each(ImageSurface::in_place_horizontal_flip);
        Ok(())
    }

    /// Reorders the channels of every input texel: channel `k` takes old channel `sources[k]`.
    pub fn channel_swap_input_face_data(&mut self, sources: [usize; 4]) -> Result<()> {
        self.terminate_active_threads()?;
        self.check_channel_sources(&sources)?;
        let surfaces = self.surfaces()?;
        surfaces.input.iter_mut().flatten().for_each(|face| face.swap_channels(sources));
        Ok(())
    }

    /// Reorders the channels of every output texel: channel `k` takes old channel `sources[k]`.
    pub fn channel_swap_output_face_data(&mut self, sources: [usize; 4]) -> Result<()> {
        self.terminate_active_threads()?;
        self.check_channel_sources(&sources)?;
        let surfaces = self.surfaces()?;
        surfaces.output.iter_mut().flatten().for_each(|face| face.swap_channels(sources));
        Ok(())
    }

    fn check_channel_sources(&self, sources: &[usize; 4]) -> Result<()> {
        let channels = self.num_channels;
        match sources.iter().take(channels).find(|&&source| source >= channels) {
            Some(&index) => Err(CubeMapError::ChannelIndex { index, channels }),
            None => Ok(()),
        }
    }

    /// Stores `16 * level / 255` in the alpha channel of every texel of output mip `level`,
    /// so the level survives a round trip through 8 or 16 bit unorm alpha.
    /// Cube maps without an alpha channel are left unchanged.
    pub fn write_mip_level_into_alpha(&mut self) -> Result<()> {
        self.terminate_active_threads()?;
        let surfaces = self.surfaces()?;
        for (level, faces) in surfaces.output.iter_mut().enumerate() {
            let alpha = 16.0 * (level as f32 / 255.0);
            for face in faces.iter_mut() {
                face.clear_channel_const(3, alpha);
            }
        }
        Ok(())
    }

    /// Starts a filter pass over the whole output mip chain.
    ///
    /// With zero filter threads the pass runs to completion (or cancellation) before this
    /// returns. Otherwise it returns once the driver thread is running; poll
    /// [`status`](Self::status) or call [`wait`](Self::wait).
    pub fn initiate_filtering(&mut self, params: &FilterParams) -> Result<()> {
        let status = self.shared.status();
        if status != FilterStatus::Ready {
            return Err(CubeMapError::NotReady(status));
        }
        self.surfaces()?;
        self.shared.shutdown.store(false, Ordering::Release);

        let mut params = params.clone();
        if params.filter_type.skips_base_level() {
            params.base_filter_angle = 0.0;
        }
        if params.filter_type == FilterType::Ggx {
            self.build_input_chain()?;
        }

        self.progress_model = ProgressModel {
            input_size: self.input_size,
            output_size: self.output_size,
            mip_levels: self.surfaces.output.len(),
            base_angle: params.base_filter_angle,
            initial_mip_angle: params.initial_mip_angle,
            angle_scale: params.mip_angle_per_level_scale,
        };
        for record in &self.shared.progress {
            record.finish();
        }
        self.shared.set_status(FilterStatus::Processing);
        log::info!(
            "filtering {} mip levels ({} filter, {} fixup) on {} thread(s)",
            self.surfaces.output.len(),
            params.filter_type.label(),
            params.fixup_type.label(),
            self.num_filter_threads
        );

        let threads = self.num_filter_threads;
        if threads == 0 {
            run_filter_pass(&mut self.surfaces, &params, threads, &self.shared);
            return Ok(());
        }

        // Surfaces are sent over only once the thread exists so a failed spawn loses nothing.
        let (tx, rx) = mpsc::channel::<CubeMapSurfaces>();
        let shared = Arc::clone(&self.shared);
        let builder = thread::Builder::new().name("cubemap-filter-0".to_string());
        let handle = match builder.spawn(move || {
            let Ok(mut surfaces) = rx.recv() else {
                return CubeMapSurfaces::default();
            };
            run_filter_pass(&mut surfaces, &params, threads, &shared);
            surfaces
        }) {
            Ok(handle) => handle,
            Err(err) => {
                self.shared.set_status(FilterStatus::Ready);
                return Err(CubeMapError::ThreadSpawn(err));
            }
        };
        if let Err(mpsc::SendError(surfaces)) = tx.send(std::mem::take(&mut self.surfaces)) {
            self.surfaces = surfaces;
            let _ = handle.join();
            self.shared.set_status(FilterStatus::Terminated);
            return Err(CubeMapError::WorkerPanicked);
        }
        self.worker = Some(handle);
        Ok(())
    }

    /// Blocks until a background pass finishes and returns its final status.
    pub fn wait(&mut self) -> Result<FilterStatus> {
        if self.worker.is_some() {
            self.join_worker()?;
        }
        Ok(self.shared.status())
    }

    /// Signals a background pass to stop and waits for it. The pass ends
    /// [`FilterStatus::Terminated`] unless it had already completed.
    pub fn terminate_active_threads(&mut self) -> Result<()> {
        if self.worker.is_none() {
            return Ok(());
        }
        self.shared.shutdown.store(true, Ordering::Release);
        let joined = self.join_worker();
        self.shared.shutdown.store(false, Ordering::Release);
        joined
    }

    fn join_worker(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(surfaces) => {
                self.surfaces = surfaces;
                Ok(())
            }
            Err(_) => {
                log::error!("cube map filter thread panicked; releasing surfaces");
                self.release_surfaces();
                self.shared.set_status(FilterStatus::Terminated);
                Err(CubeMapError::WorkerPanicked)
            }
        }
    }

    /// Surfaces for a caller, reclaiming them from a finished background pass first.
    fn surfaces(&mut self) -> Result<&mut CubeMapSurfaces> {
        if self.worker.is_some() {
            if self.shared.status() == FilterStatus::Processing {
                return Err(CubeMapError::Busy);
            }
            self.join_worker()?;
        }
        if self.surfaces.input.is_empty() {
            return Err(CubeMapError::NotInitialized);
        }
        Ok(&mut self.surfaces)
    }

    /// Box-downsamples input level 0 into a chain reaching 1x1, used by GGX sample fetches.
    fn build_input_chain(&mut self) -> Result<()> {
        let input = &mut self.surfaces.input;
        input.truncate(1);
        while input.len() < MAX_MIP_LEVELS && input[input.len() - 1][0].width() > 1 {
            let previous = &input[input.len() - 1];
            let mut next: CubeFaces = Default::default();
            for (dst, src) in next.iter_mut().zip(previous) {
                dst.downsample_from(src)?;
            }
            input.push(next);
        }
        log::debug!("built {} level input chain for importance sampling", input.len());
        Ok(())
    }
}

impl Drop for CubeMapProcessor {
    fn drop(&mut self) {
        let _ = self.terminate_active_threads();
    }
}

fn allocate_cube(size: usize, num_channels: usize) -> Result<CubeFaces> {
    let mut faces: CubeFaces = Default::default();
    for face in &mut faces {
        face.init(size, size, num_channels)?;
    }
    Ok(faces)
}

fn level_faces(levels: &[CubeFaces], level: usize) -> Result<&CubeFaces> {
    levels.get(level).ok_or(CubeMapError::MipIndex { level, count: levels.len() })
}

/// Work shared by every thread filtering one mip level.
enum LevelTask<'a> {
    Cone {
        src: &'a CubeFaces,
        kernel: &'a FilterKernel,
        normalizer: &'a NormalizerCube,
    },
    Ggx {
        chain: &'a [CubeFaces],
        mip: usize,
        max_mip: usize,
        sample_count: u32,
    },
}

impl LevelTask<'_> {
    /// Filters `faces`, the destination faces starting at `first_face`. Returns `false` when
    /// the shutdown signal interrupted the work.
    fn run(
        &self,
        level: usize,
        faces: &mut [ImageSurface],
        first_face: usize,
        progress: &ThreadProgress,
        shutdown: &AtomicBool,
    ) -> bool {
        progress.begin_level(level, first_face, first_face + faces.len());
        for (offset, dst) in faces.iter_mut().enumerate() {
            let face = CubeFace::ALL[first_face + offset];
            let finished = match self {
                LevelTask::Cone { src, kernel, normalizer } => {
                    filter_face(src, dst, face, kernel, normalizer, progress, shutdown)
                }
                LevelTask::Ggx { chain, mip, max_mip, sample_count } => {
                    filter_face_ggx(chain, dst, face, *mip, *max_mip, *sample_count, progress, shutdown)
                }
            };
            if !finished {
                return false;
            }
        }
        true
    }
}

/// Filters all six faces of one level, splitting them across two threads when asked to.
fn run_level(task: &LevelTask<'_>, dst: &mut CubeFaces, level: usize, threads: usize, shared: &FilterShared) -> bool {
    let shutdown = &shared.shutdown;
    if threads < MAX_FILTER_THREADS {
        return task.run(level, dst, 0, &shared.progress[0], shutdown);
    }

    let (head, tail) = dst.split_at_mut(FACE_SPLIT);
    let (finished, helper_spawned) = thread::scope(|scope| {
        let builder = thread::Builder::new().name("cubemap-filter-1".to_string());
        match builder.spawn_scoped(scope, || task.run(level, tail, FACE_SPLIT, &shared.progress[1], shutdown)) {
            Ok(helper) => {
                let head_finished = task.run(level, head, 0, &shared.progress[0], shutdown);
                let tail_finished = helper.join().unwrap_or_else(|_| {
                    log::error!("filter thread 1 panicked on level {level}");
                    false
                });
                (head_finished && tail_finished, true)
            }
            Err(err) => {
                log::warn!("failed to spawn second filter thread, level {level} runs on one thread: {err}");
                (task.run(level, head, 0, &shared.progress[0], shutdown), false)
            }
        }
    });
    if helper_spawned || !finished {
        finished
    } else {
        task.run(level, tail, FACE_SPLIT, &shared.progress[0], shutdown)
    }
}

/// Runs a whole pass and publishes its final status.
fn run_filter_pass(surfaces: &mut CubeMapSurfaces, params: &FilterParams, threads: usize, shared: &FilterShared) {
    let completed = match filter_mip_chain(surfaces, params, threads, shared) {
        Ok(completed) => completed,
        Err(err) => {
            log::error!("filter pass aborted: {err}");
            false
        }
    };
    for record in &shared.progress {
        record.finish();
    }
    if completed {
        shared.set_status(FilterStatus::Completed);
        log::info!("filter pass completed ({} levels)", surfaces.output.len());
    } else {
        shared.set_status(FilterStatus::Terminated);
        log::info!("filter pass terminated");
    }
}

/// Filters every output level in order. Level 0 reads input level 0; later levels read the
/// previous output level, except cosine-power levels (input level 0) and GGX levels (the
/// whole input chain). Each level is fixed up before the next one reads it.
fn filter_mip_chain(
    surfaces: &mut CubeMapSurfaces,
    params: &FilterParams,
    threads: usize,
    shared: &FilterShared,
) -> Result<bool> {
    let CubeMapSurfaces { input, output, normalizer } = surfaces;
    let mip_levels = output.len();

    for level in 0..mip_levels {
        if shared.shutdown_requested() {
            return Ok(false);
        }
        let (filtered, pending) = output.split_at_mut(level);
        let dst = &mut pending[0];
        let dst_size = dst[0].width();

        let finished = if params.filter_type == FilterType::Ggx && level > 0 {
            log::debug!(
                "level {level}: {dst_size}x{dst_size} GGX, {} samples from {} input levels",
                params.ggx_sample_count,
                input.len()
            );
            let task = LevelTask::Ggx {
                chain: input.as_slice(),
                mip: level,
                max_mip: mip_levels - 1,
                sample_count: params.ggx_sample_count,
            };
            run_level(&task, dst, level, threads, shared)
        } else {
            let power = params.specular_power_for_level(level, mip_levels);
            let (src, cone_angle) = if level == 0 {
                (&input[0], params.base_filter_angle)
            } else if params.filter_type == FilterType::CosinePower {
                (&input[0], cosine_power_cone_angle(power))
            } else {
                (&filtered[level - 1], params.cone_angle_for_level(level))
            };
            let src_size = src[0].width();
            normalizer.ensure(src_size, params.use_solid_angle)?;
            let kernel = FilterKernel::new(params.filter_type, cone_angle, src_size, params.use_solid_angle, power);
            log::debug!(
                "level {level}: {src_size} -> {dst_size}, {} cone {cone_angle:.3} deg, {} texel extent",
                params.filter_type.label(),
                kernel.extent_texels
            );
            let task = LevelTask::Cone { src, kernel: &kernel, normalizer: &*normalizer };
            run_level(&task, dst, level, threads, shared)
        };
        if !finished {
            return Ok(false);
        }
        fixup_cube_edges(dst, params.fixup_type, params.fixup_width);
    }
    Ok(true)
}
