use cubemap_prefilter::format::{f16_bits_to_f32, f32_to_f16_bits};
use cubemap_prefilter::{CubeMapError, CubeMapProcessor, InputTransform, TexelFormat, TexelLayout};

fn processor(size: usize, channels: usize) -> CubeMapProcessor {
    let mut processor = CubeMapProcessor::new(0);
    processor.init(size, size, 1, channels).expect("init");
    processor
}

#[test]
fn bgra_unorm8_face_reads_back_as_rgba_float() {
    let mut processor = processor(2, 4);
    let bgra: [u8; 16] = [
        0, 0, 255, 255, // red
        0, 255, 0, 128, // green
        255, 0, 0, 0, // blue
        51, 102, 153, 204,
    ];
    let layout = TexelLayout::packed(TexelFormat::Unorm8Bgra, 4, 2);
    processor.set_input_face_data(1, layout, &bgra, InputTransform::default()).expect("upload");

    let out_layout = TexelLayout::packed(TexelFormat::Float32, 4, 2);
    let mut bytes = vec![0u8; out_layout.required_len(2, 2)];
    processor.get_input_face_data(1, 0, out_layout, &mut bytes, 1.0, 1.0).expect("read back");
    let texels: &[f32] = bytemuck::cast_slice(&bytes);
    assert_eq!(&texels[..4], &[1.0, 0.0, 0.0, 1.0]);
    assert_eq!(&texels[4..8], &[0.0, 1.0, 0.0, 128.0 / 255.0]);
    assert_eq!(&texels[8..12], &[0.0, 0.0, 1.0, 0.0]);
    assert_eq!(&texels[12..], &[153.0 / 255.0, 102.0 / 255.0, 51.0 / 255.0, 204.0 / 255.0]);

    let mut round_trip = [0u8; 16];
    processor.get_input_face_data(1, 0, layout, &mut round_trip, 1.0, 1.0).expect("bgra out");
    assert_eq!(round_trip, bgra);
}

#[test]
fn bgra_buffer_swizzles_into_narrow_surfaces() {
    let mut processor = processor(1, 2);
    let layout = TexelLayout::packed(TexelFormat::Unorm8Bgra, 4, 1);
    let bgra: [u8; 4] = [51, 102, 255, 204];
    processor.set_input_face_data(0, layout, &bgra, InputTransform::default()).expect("upload");
    assert_eq!(processor.input_face(0, 0).expect("face").texel(0, 0), &[1.0, 0.4]);

    let mut out = [0u8; 4];
    processor.get_input_face_data(0, 0, layout, &mut out, 1.0, 1.0).expect("read back");
    assert_eq!(out, [0, 102, 255, 0]);
}

#[test]
fn half_float_face_round_trips_bit_for_bit() {
    let mut processor = processor(4, 3);
    let values: Vec<u16> =
        (0..48).map(|i| f32_to_f16_bits(i as f32 * 0.37 - 5.0) ^ if i % 7 == 0 { 0x8000 } else { 0 }).collect();
    let layout = TexelLayout::packed(TexelFormat::Float16, 3, 4);
    processor.set_input_face_data(5, layout, bytemuck::cast_slice(&values), InputTransform::default()).expect("upload");
    let mut out = vec![0u16; values.len()];
    processor.get_input_face_data(5, 0, layout, bytemuck::cast_slice_mut(&mut out), 1.0, 1.0).expect("read back");
    assert_eq!(out, values);

    let face = processor.input_face(5, 0).expect("face");
    assert_eq!(face.texel(1, 0)[0], f16_bits_to_f32(values[3]));
}

#[test]
fn unorm16_transfer_with_padded_rows() {
    let mut processor = processor(2, 1);
    // Row pitch of 6 bytes leaves one padding channel per row.
    let rows: [u16; 6] = [0, 65535, 0xBEEF, 32768, 16384, 0xBEEF];
    let layout = TexelLayout::new(TexelFormat::Unorm16, 1, 6);
    processor.set_input_face_data(0, layout, bytemuck::cast_slice(&rows), InputTransform::default()).expect("upload");
    let face = processor.input_face(0, 0).expect("face");
    assert_eq!(face.data(), &[0.0, 1.0, 32768.0 / 65535.0, 16384.0 / 65535.0]);

    let mut out = [0u16; 6];
    processor.get_input_face_data(0, 0, layout, bytemuck::cast_slice_mut(&mut out), 1.0, 1.0).expect("read back");
    assert_eq!(out, [0, 65535, 0, 32768, 16384, 0]);
}

#[test]
fn input_transform_and_output_gamma_apply_to_color_only() {
    let mut processor = processor(1, 4);
    let texel: [f32; 4] = [0.5, 4.0, 0.25, 0.5];
    let transform = InputTransform { max_clamp: 2.0, degamma: 2.0, scale: 3.0 };
    let layout = TexelLayout::packed(TexelFormat::Float32, 4, 1);
    processor.set_input_face_data(3, layout, bytemuck::cast_slice(&texel), transform).expect("upload");
    let stored = processor.input_face(3, 0).expect("face").texel(0, 0).to_vec();
    for (value, expected) in stored.iter().zip([0.75f32, 12.0, 0.1875, 0.5]) {
        assert!((value - expected).abs() < 1e-5 * expected.max(1.0), "{stored:?}");
    }

    let mut out = [0.0f32; 4];
    processor
        .get_input_face_data(3, 0, layout, bytemuck::cast_slice_mut(&mut out), 1.0 / 3.0, 0.5)
        .expect("read back");
    let expected = [0.0625, 16.0, 0.003_906_25, 0.5];
    for (value, expected) in out.iter().zip(expected) {
        assert!((value - expected).abs() < 1e-5 * expected.max(1.0), "{out:?}");
    }
}

#[test]
fn transfers_report_bad_arguments() {
    let mut processor = processor(4, 4);
    let layout = TexelLayout::packed(TexelFormat::Float32, 4, 4);
    let short = vec![0u8; layout.required_len(4, 4) - 1];
    assert!(matches!(
        processor.set_input_face_data(0, layout, &short, InputTransform::default()),
        Err(CubeMapError::BufferTooSmall { .. })
    ));
    let full = vec![0u8; layout.required_len(4, 4)];
    assert!(matches!(
        processor.set_input_face_data(6, layout, &full, InputTransform::default()),
        Err(CubeMapError::FaceIndex(6))
    ));
    let mut out = vec![0u8; layout.required_len(4, 4)];
    assert!(matches!(
        processor.get_output_face_data(0, 1, layout, &mut out, 1.0, 1.0),
        Err(CubeMapError::MipIndex { level: 1, count: 1 })
    ));
    assert!(matches!(
        processor.get_input_face_data(0, 2, layout, &mut out, 1.0, 1.0),
        Err(CubeMapError::MipIndex { level: 2, count: 1 })
    ));

    processor.clear();
    assert!(matches!(
        processor.set_input_face_data(0, layout, &full, InputTransform::default()),
        Err(CubeMapError::NotInitialized)
    ));
}
