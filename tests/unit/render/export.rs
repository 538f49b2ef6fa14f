use super::*;

fn decode_uri(uri: &str, prefix: &str) -> image::DynamicImage {
    let b64 = uri.strip_prefix(prefix).unwrap();
    let bytes = BASE64.decode(b64).unwrap();
    image::load_from_memory(&bytes).unwrap()
}

#[test]
fn png_export_keeps_straight_alpha() {
    // Premultiplied half-transparent red.
    let premul = [128u8, 0, 0, 128, 0, 0, 0, 0];
    let uri = encode_data_uri(&premul, 2, 1, ExportFormat::Png, 1.0, Rgba8::BLACK).unwrap();
    let img = decode_uri(&uri, "data:image/png;base64,").to_rgba8();
    assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 128]);
    assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0, 0]);
}

#[test]
fn jpeg_export_flattens_over_the_background() {
    let premul = vec![0u8; 8 * 8 * 4];
    let white = Rgba8::new(255, 255, 255, 255);
    let uri = encode_data_uri(&premul, 8, 8, ExportFormat::Jpeg, 0.9, white).unwrap();
    let img = decode_uri(&uri, "data:image/jpeg;base64,").to_rgb8();
    assert_eq!(img.dimensions(), (8, 8));
    assert!(img.pixels().all(|p| p.0.iter().all(|&c| c > 245)));
}

#[test]
fn size_mismatch_and_quality_bounds() {
    assert!(matches!(
        encode(&[0u8; 3], 1, 1, ExportFormat::Png, 1.0, Rgba8::BLACK),
        Err(PlayerError::Render(_))
    ));
    assert_eq!(jpeg_quality(0.0), 1);
    assert_eq!(jpeg_quality(2.0), 100);
    assert_eq!(jpeg_quality(0.5), 50);
    assert_eq!(jpeg_quality(f32::NAN), 92);
}

#[test]
fn unpremultiply_round_trips_opaque_and_clears_transparent() {
    let mut px = [10u8, 20, 30, 255, 9, 9, 9, 0, 64, 32, 0, 128];
    unpremultiply_in_place(&mut px);
    assert_eq!(px, [10, 20, 30, 255, 0, 0, 0, 0, 128, 64, 0, 128]);
}

#[test]
fn serde_names() {
    assert_eq!(serde_json::to_string(&ExportFormat::Jpeg).unwrap(), "\"jpeg\"");
}
