use cubemap_prefilter::cube::{neighbor, seam_is_flipped, CubeEdge, CubeFace, NUM_FACES};
use cubemap_prefilter::{
    CubeMapError, CubeMapProcessor, FilterParams, FilterStatus, FilterType, FixupType, InputTransform,
    TexelFormat, TexelLayout,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn upload_faces(processor: &mut CubeMapProcessor, size: usize, texel: impl Fn(usize, usize, usize) -> [f32; 4]) {
    let layout = TexelLayout::packed(TexelFormat::Float32, 4, size);
    for face in 0..NUM_FACES {
        let mut texels = Vec::with_capacity(size * size * 4);
        for v in 0..size {
            for u in 0..size {
                texels.extend_from_slice(&texel(face, u, v));
            }
        }
        processor
            .set_input_face_data(face, layout, bytemuck::cast_slice(&texels), InputTransform::default())
            .expect("upload face");
    }
}

fn gradient(face: usize, u: usize, v: usize) -> [f32; 4] {
    [face as f32 * 0.15 + u as f32 * 0.01, v as f32 * 0.02, (u * v % 5) as f32 * 0.1, 1.0]
}

fn wait_for_terminal_status(processor: &CubeMapProcessor) -> FilterStatus {
    let deadline = Instant::now() + Duration::from_secs(60);
    while processor.status() == FilterStatus::Processing {
        assert!(Instant::now() < deadline, "filter pass did not stop");
        thread::sleep(Duration::from_millis(5));
    }
    processor.status()
}

fn slow_params() -> FilterParams {
    FilterParams { base_filter_angle: 120.0, filter_type: FilterType::Cone, ..FilterParams::default() }
}

fn output_levels(processor: &mut CubeMapProcessor) -> Vec<Vec<Vec<f32>>> {
    (0..processor.mip_levels())
        .map(|level| {
            (0..NUM_FACES)
                .map(|face| processor.output_face(face, level).expect("output face").data().to_vec())
                .collect()
        })
        .collect()
}

#[test]
fn cancel_token_terminates_background_pass() {
    let mut processor = CubeMapProcessor::new(2);
    processor.init(128, 128, 6, 4).expect("init");
    upload_faces(&mut processor, 128, |_, _, _| [0.5, 0.5, 0.5, 1.0]);
    let token = processor.cancel_token();
    processor.initiate_filtering(&slow_params()).expect("start pass");
    assert!(matches!(processor.output_face(0, 0), Err(CubeMapError::Busy)));

    token.cancel();
    assert_eq!(wait_for_terminal_status(&processor), FilterStatus::Terminated);
    assert!(matches!(
        processor.initiate_filtering(&slow_params()),
        Err(CubeMapError::NotReady(FilterStatus::Terminated))
    ));
    processor.refresh_status();
    assert_eq!(processor.status(), FilterStatus::Ready);
    assert_eq!(processor.output_face(0, 0).expect("surfaces returned").width(), 128);
}

#[test]
fn terminate_active_threads_stops_the_pass() {
    let mut processor = CubeMapProcessor::new(1);
    processor.init(128, 64, 4, 4).expect("init");
    upload_faces(&mut processor, 128, gradient);
    processor.initiate_filtering(&slow_params()).expect("start pass");
    thread::sleep(Duration::from_millis(20));
    processor.terminate_active_threads().expect("terminate");
    assert_eq!(processor.status(), FilterStatus::Terminated);
    // Input survives the interrupted pass.
    assert_eq!(processor.input_face(2, 0).expect("input").texel(3, 4), &gradient(2, 3, 4)[..]);
}

#[test]
fn synchronous_pass_can_be_cancelled_from_another_thread() {
    let mut processor = CubeMapProcessor::new(0);
    processor.init(128, 128, 2, 4).expect("init");
    upload_faces(&mut processor, 128, gradient);
    let token = processor.cancel_token();
    let returned = Arc::new(AtomicBool::new(false));
    let canceller = {
        let returned = Arc::clone(&returned);
        // Keeps cancelling in case the first signal lands before the pass resets it.
        thread::spawn(move || {
            while !returned.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(20));
                token.cancel();
            }
        })
    };
    processor.initiate_filtering(&slow_params()).expect("pass");
    returned.store(true, Ordering::Release);
    canceller.join().expect("canceller thread");
    assert_eq!(processor.status(), FilterStatus::Terminated);
}

#[test]
fn thread_count_does_not_change_results() {
    let params = FilterParams {
        base_filter_angle: 6.0,
        initial_mip_angle: 8.0,
        filter_type: FilterType::AngularGaussian,
        fixup_type: FixupType::AverageHermite,
        fixup_width: 2,
        ..FilterParams::default()
    };
    let mut results = Vec::new();
    for threads in [0, 1, 2] {
        let mut processor = CubeMapProcessor::new(threads);
        processor.init(16, 16, 5, 4).expect("init");
        upload_faces(&mut processor, 16, gradient);
        processor.initiate_filtering(&params).expect("start pass");
        assert_eq!(processor.wait().expect("wait"), FilterStatus::Completed);
        results.push(output_levels(&mut processor));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
}

#[test]
fn every_level_is_seamless_after_fixup() {
    let mut processor = CubeMapProcessor::new(2);
    processor.init(32, 32, 4, 4).expect("init");
    upload_faces(&mut processor, 32, gradient);
    let params = FilterParams {
        base_filter_angle: 4.0,
        initial_mip_angle: 6.0,
        filter_type: FilterType::Cone,
        fixup_type: FixupType::PullLinear,
        fixup_width: 3,
        ..FilterParams::default()
    };
    processor.initiate_filtering(&params).expect("start pass");
    assert_eq!(processor.wait().expect("wait"), FilterStatus::Completed);

    for level in 0..processor.mip_levels() {
        let faces: Vec<_> = (0..NUM_FACES).map(|face| processor.output_face(face, level).expect("face").clone()).collect();
        let size = faces[0].width();
        for face in CubeFace::ALL {
            for edge in CubeEdge::ALL {
                let link = neighbor(face, edge);
                for j in 0..size {
                    let jn = if seam_is_flipped(edge, link.edge) { size - 1 - j } else { j };
                    let (u, v) = edge.texel(j, 0, size);
                    let (nu, nv) = link.edge.texel(jn, 0, size);
                    assert_eq!(
                        faces[face.index()].texel(u, v),
                        faces[link.face.index()].texel(nu, nv),
                        "level {level} {face:?} {edge:?} texel {j}"
                    );
                }
            }
        }
    }
}

#[test]
fn glossy_filters_preserve_a_uniform_environment() {
    for filter_type in [FilterType::Ggx, FilterType::CosinePower, FilterType::Disc] {
        let mut processor = CubeMapProcessor::new(2);
        processor.init(32, 16, 5, 4).expect("init");
        upload_faces(&mut processor, 32, |_, _, _| [0.25, 0.5, 0.75, 1.0]);
        let params = FilterParams {
            base_filter_angle: 30.0,
            filter_type,
            ggx_sample_count: 16,
            ..FilterParams::default()
        };
        processor.initiate_filtering(&params).expect("start pass");
        assert_eq!(processor.wait().expect("wait"), FilterStatus::Completed, "{filter_type:?}");
        for level in 0..processor.mip_levels() {
            for face in 0..NUM_FACES {
                let surface = processor.output_face(face, level).expect("face");
                for texel in surface.data().chunks(4) {
                    for (value, expected) in texel.iter().zip([0.25, 0.5, 0.75, 1.0]) {
                        assert!(
                            (value - expected).abs() < 1e-4,
                            "{filter_type:?} level {level} face {face}: {texel:?}"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn unblurred_base_level_reproduces_the_input() {
    for filter_type in [
        FilterType::Disc,
        FilterType::Cone,
        FilterType::Cosine,
        FilterType::AngularGaussian,
        FilterType::CosinePower,
        FilterType::Ggx,
    ] {
        let mut processor = CubeMapProcessor::new(2);
        processor.init(16, 16, 3, 4).expect("init");
        upload_faces(&mut processor, 16, gradient);
        let params = FilterParams {
            base_filter_angle: 0.0,
            filter_type,
            fixup_type: FixupType::None,
            ggx_sample_count: 8,
            ..FilterParams::default()
        };
        processor.initiate_filtering(&params).expect("start pass");
        assert_eq!(processor.wait().expect("wait"), FilterStatus::Completed, "{filter_type:?}");
        for face in 0..NUM_FACES {
            let input = processor.input_face(face, 0).expect("input").data().to_vec();
            let output = processor.output_face(face, 0).expect("output").data().to_vec();
            assert_eq!(output, input, "{filter_type:?} face {face}");
        }
    }

    // Cosine-power and GGX ignore a nonzero base angle.
    for filter_type in [FilterType::CosinePower, FilterType::Ggx] {
        let mut processor = CubeMapProcessor::new(0);
        processor.init(16, 16, 2, 4).expect("init");
        upload_faces(&mut processor, 16, gradient);
        let params = FilterParams {
            base_filter_angle: 20.0,
            filter_type,
            fixup_type: FixupType::None,
            ggx_sample_count: 8,
            ..FilterParams::default()
        };
        processor.initiate_filtering(&params).expect("pass");
        for face in 0..NUM_FACES {
            let input = processor.input_face(face, 0).expect("input").data().to_vec();
            let output = processor.output_face(face, 0).expect("output").data().to_vec();
            assert_eq!(output, input, "{filter_type:?} face {face}");
        }
    }
}

#[test]
fn progress_string_lists_each_thread() {
    let mut processor = CubeMapProcessor::new(2);
    processor.init(128, 128, 6, 4).expect("init");
    upload_faces(&mut processor, 128, gradient);
    assert_eq!(processor.filter_progress_string(), "Thread0: Ready \nThread1: Ready ");
    processor.initiate_filtering(&slow_params()).expect("start pass");
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut text = processor.filter_progress_string();
    while !text.contains("Thread1: ") || !text.ends_with(")") || text.contains("Ready") {
        assert!(Instant::now() < deadline, "threads never reported progress: {text}");
        thread::sleep(Duration::from_millis(5));
        text = processor.filter_progress_string();
    }
    assert!(text.starts_with("Thread0: "), "{text}");
    assert!(text.contains("% Complete (Level   0, Face"), "{text}");
    processor.terminate_active_threads().expect("terminate");

    processor.set_num_filter_threads(0);
    assert_eq!(processor.filter_progress_string(), "Thread 0: Ready ");
}
