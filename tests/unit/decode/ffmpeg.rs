use super::*;

#[test]
fn args_scale_to_coded_size_and_emit_i420() {
    let args = ffmpeg_args(64, 36);
    let joined = args.join(" ");
    assert!(joined.contains("-f h264 -i pipe:0"));
    assert!(joined.contains("-vf scale=64:36"));
    assert!(joined.contains("-pix_fmt yuv420p"));
    assert!(joined.ends_with("pipe:1"));
}

#[test]
fn length_prefixed_samples_become_annexb() {
    let sample = [0, 0, 0, 2, 0x65, 0x88, 0, 0, 0, 1, 0x06];
    assert_eq!(
        length_prefixed_to_annexb(&sample).unwrap(),
        vec![0, 0, 0, 1, 0x65, 0x88, 0, 0, 0, 1, 0x06]
    );
    assert!(length_prefixed_to_annexb(&[0, 0, 0, 9, 0x65]).is_err());
    assert!(length_prefixed_to_annexb(&[0, 0]).is_err());
}

#[test]
fn rejects_non_h264_and_unconfigured_use() {
    let mut dec = FfmpegVideoDecoder::new();
    let err = dec
        .configure(&VideoDecoderConfig {
            codec: "hvc1".to_owned(),
            coded_width: 64,
            coded_height: 36,
            description: None,
        })
        .unwrap_err();
    assert!(matches!(err, PlayerError::Decoder(_)));
    assert!(!dec.is_configured());

    let chunk = EncodedVideoChunk {
        chunk_type: ChunkType::Key,
        timestamp_us: 0,
        duration_us: 33_333,
        data: vec![0u8; 8].into(),
    };
    assert!(dec.decode(chunk).is_err());
    assert_eq!(dec.poll_output().unwrap(), None);
    assert!(dec.flush().unwrap().is_empty());
}

#[test]
fn output_frames_take_the_smallest_pending_timestamp() {
    let mut dec = FfmpegVideoDecoder::new();
    dec.width = 4;
    dec.height = 2;
    // Decode order I P B: presentation order is 0, 33_333, 66_666.
    for ts in [0i64, 66_666, 33_333] {
        dec.pending.push(Reverse((ts, 33_333)));
    }
    let len = dec.frame_len();
    let order: Vec<i64> = (0..3)
        .map(|_| dec.to_frame(vec![0u8; len]).unwrap().timestamp_us)
        .collect();
    assert_eq!(order, vec![0, 33_333, 66_666]);
    assert!(dec.to_frame(vec![0u8; len]).is_err());
}
