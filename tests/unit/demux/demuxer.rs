use super::*;

#[path = "../../support/mp4.rs"]
mod mp4_fixture;

use mp4_fixture::{AudioFixture, Mp4Fixture};

fn video_samples(events: &[DemuxEvent]) -> Vec<DemuxedSample> {
    events
        .iter()
        .filter_map(|e| match e {
            DemuxEvent::VideoSamples { samples, .. } => Some(samples.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

#[test]
fn whole_file_emits_config_ready_then_samples() {
    let fixture = Mp4Fixture::default();
    let file = fixture.build();
    let mut demuxer = Mp4Demuxer::new();
    demuxer.append_data(&file, 0);
    demuxer.flush();
    let events = demuxer.drain_events();

    match &events[0] {
        DemuxEvent::VideoConfig(cfg) => {
            assert_eq!(cfg.codec, "avc1.64001f");
            assert_eq!((cfg.coded_width, cfg.coded_height), (64, 36));
            assert_eq!(
                cfg.description.as_deref(),
                Some(mp4_fixture::avcc_record().as_slice())
            );
        }
        other => panic!("expected VideoConfig first, got {other:?}"),
    }
    let DemuxEvent::Ready(info) = &events[1] else {
        panic!("expected Ready second, got {:?}", events[1]);
    };
    assert!((info.duration_ms - 10_000.0).abs() < 1.0);
    let video = info.video.as_ref().unwrap();
    assert!((video.frame_rate - 30.0).abs() < 1e-6);
    assert!(video.bitrate > 0.0);
    assert!(info.audio.is_none());

    let samples = video_samples(&events);
    assert_eq!(samples.len(), 300);
    assert_eq!(samples[0].timestamp_us, 0);
    assert_eq!(samples[1].timestamp_us, 33_333);
    assert_eq!(samples[0].duration_us, 33_333);
    assert!(samples[0].is_keyframe);
    assert!(!samples[1].is_keyframe);
    assert!(samples[30].is_keyframe);
    assert_eq!(mp4_fixture::frame_index(&samples[42].data), Some(42));
}

#[test]
fn audio_track_is_reported_and_sampled() {
    let file = Mp4Fixture {
        frames: 30,
        audio: Some(AudioFixture {
            sample_rate: 44_100,
            channels: 2,
            frames: 20,
        }),
        ..Mp4Fixture::default()
    }
    .build();
    let mut demuxer = Mp4Demuxer::new();
    demuxer.append_data(&file, 0);
    demuxer.flush();
    let events = demuxer.drain_events();

    let audio_cfg = events
        .iter()
        .find_map(|e| match e {
            DemuxEvent::AudioConfig(c) => Some(c.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(audio_cfg.codec, "mp4a.40.2");
    assert_eq!(audio_cfg.sample_rate, 44_100);
    assert_eq!(audio_cfg.channel_count, 2);

    let audio_count: usize = events
        .iter()
        .map(|e| match e {
            DemuxEvent::AudioSamples { samples, .. } => samples.len(),
            _ => 0,
        })
        .sum();
    assert_eq!(audio_count, 20);
}

#[test]
fn progressive_appends_with_moov_at_end() {
    let file = Mp4Fixture {
        frames: 60,
        moov_at_end: true,
        ..Mp4Fixture::default()
    }
    .build();
    let moov_start: usize = crate::demux::boxes::BoxIter::new(&file)
        .take(2)
        .map(|b| b.unwrap().1.len() + 8)
        .sum();
    let mut demuxer = Mp4Demuxer::new();

    // Deliver moov first, then the head in two pieces.
    demuxer.append_data(&file[moov_start..], moov_start as u64);
    demuxer.flush();
    assert!(!demuxer.is_ready());

    demuxer.append_data(&file[..100], 0);
    demuxer.flush();
    assert!(demuxer.is_ready());
    let early = video_samples(&demuxer.drain_events());
    assert!(!early.is_empty() && early.len() < 60);

    demuxer.append_data(&file[100..moov_start], 100);
    demuxer.flush();
    let rest = video_samples(&demuxer.drain_events());

    assert_eq!(early.len() + rest.len(), 60);
    let indices: Vec<u32> = early
        .iter()
        .chain(rest.iter())
        .filter_map(|s| mp4_fixture::frame_index(&s.data))
        .collect();
    assert_eq!(indices, (0..60).collect::<Vec<_>>());
}

#[test]
fn missing_avcc_is_fatal() {
    let file = Mp4Fixture {
        with_avcc: false,
        frames: 10,
        ..Mp4Fixture::default()
    }
    .build();
    let mut demuxer = Mp4Demuxer::new();
    demuxer.append_data(&file, 0);
    demuxer.flush();
    let events = demuxer.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], DemuxEvent::Error(PlayerError::Container(msg)) if msg.contains("avcC")));
    assert!(!demuxer.is_ready());
}

#[test]
fn avc3_may_omit_avcc() {
    let file = Mp4Fixture {
        with_avcc: false,
        sample_entry: *b"avc3",
        frames: 10,
        ..Mp4Fixture::default()
    }
    .build();
    let mut demuxer = Mp4Demuxer::new();
    demuxer.append_data(&file, 0);
    demuxer.flush();
    let events = demuxer.drain_events();
    assert!(matches!(&events[0], DemuxEvent::VideoConfig(c) if c.codec == "avc3" && c.description.is_none()));
    assert!(demuxer.is_ready());
}

#[test]
fn seek_rewinds_to_keyframe_and_reports_offset() {
    let file = Mp4Fixture::default().build();
    let mut demuxer = Mp4Demuxer::new();
    assert_eq!(demuxer.seek(5000.0), 0);

    demuxer.append_data(&file, 0);
    demuxer.flush();
    demuxer.drain_events();

    // 5000 ms is frame 150, itself a keyframe (gop 30); 5100 ms is frame 153.
    let offset = demuxer.seek(5100.0);
    assert!(offset > 0);
    demuxer.append_data(&file[offset as usize..], offset);
    demuxer.flush();
    let samples = video_samples(&demuxer.drain_events());
    assert!(samples[0].is_keyframe);
    assert_eq!(mp4_fixture::frame_index(&samples[0].data), Some(150));
    assert_eq!(samples.len(), 150);
}

#[test]
fn fragmented_input_is_rejected() {
    let mut data = vec![0, 0, 0, 8, b'm', b'o', b'o', b'f'];
    data.extend_from_slice(&[0, 0, 0, 8, b'm', b'd', b'a', b't']);
    let mut demuxer = Mp4Demuxer::new();
    demuxer.append_data(&data, 0);
    assert!(matches!(demuxer.poll_event(), Some(DemuxEvent::Error(_))));
}

#[test]
fn dispose_is_idempotent() {
    let file = Mp4Fixture {
        frames: 5,
        ..Mp4Fixture::default()
    }
    .build();
    let mut demuxer = Mp4Demuxer::new();
    demuxer.append_data(&file, 0);
    demuxer.dispose();
    demuxer.dispose();
    assert!(demuxer.is_disposed());
    assert!(demuxer.media_info().is_none());
    demuxer.append_data(&file, 0);
    demuxer.flush();
    assert!(demuxer.poll_event().is_none());
}

#[test]
fn largesize_past_the_offset_space_is_a_container_error() {
    let mut data = vec![0, 0, 0, 16, b'f', b't', b'y', b'p'];
    data.extend_from_slice(b"isom\0\0\0\0");
    data.extend_from_slice(&[0, 0, 0, 1, b'f', b'r', b'e', b'e']);
    data.extend_from_slice(&u64::MAX.to_be_bytes());
    let mut demuxer = Mp4Demuxer::new();
    demuxer.append_data(&data, 0);
    match demuxer.poll_event() {
        Some(DemuxEvent::Error(PlayerError::Container(msg))) => assert!(msg.contains("free")),
        other => panic!("expected a container error, got {other:?}"),
    }
}

#[test]
fn constant_size_stsz_with_huge_count_is_rejected() {
    let mut file = Mp4Fixture {
        frames: 5,
        ..Mp4Fixture::default()
    }
    .build();
    let at = file
        .windows(4)
        .position(|w| w == b"stsz")
        .expect("fixture carries an stsz box");
    // fourcc, version+flags, then default_size and sample_count.
    file[at + 8..at + 12].copy_from_slice(&1u32.to_be_bytes());
    file[at + 12..at + 16].copy_from_slice(&u32::MAX.to_be_bytes());

    let mut demuxer = Mp4Demuxer::new();
    demuxer.append_data(&file, 0);
    demuxer.flush();
    let events = demuxer.drain_events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, DemuxEvent::Error(PlayerError::Container(_)))),
        "expected a container error, got {events:?}"
    );
    assert!(!demuxer.is_ready());
    assert!(video_samples(&events).is_empty());
}
