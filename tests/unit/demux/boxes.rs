use super::*;

#[path = "../../support/mp4.rs"]
mod mp4_fixture;

use mp4_fixture::{AudioFixture, Mp4Fixture};

fn top_level(data: &[u8]) -> Vec<(u32, &[u8])> {
    BoxIter::new(data).collect::<PlayerResult<Vec<_>>>().unwrap()
}

#[test]
fn header_sizes() {
    let small = [0, 0, 0, 16, b'f', b'r', b'e', b'e'];
    let h = read_box_header(&small).unwrap().unwrap();
    assert_eq!(h.box_type, fourcc(b"free"));
    assert_eq!(h.size, Some(16));
    assert_eq!(h.header_size, 8);

    let mut large = vec![0, 0, 0, 1, b'm', b'd', b'a', b't'];
    large.extend_from_slice(&(1u64 << 33).to_be_bytes());
    let h = read_box_header(&large).unwrap().unwrap();
    assert_eq!(h.size, Some(1 << 33));
    assert_eq!(h.header_size, 16);

    let to_end = [0, 0, 0, 0, b'm', b'd', b'a', b't'];
    assert_eq!(read_box_header(&to_end).unwrap().unwrap().size, None);

    assert!(read_box_header(&large[..12]).unwrap().is_none());
    assert!(read_box_header(&[0, 0, 0, 4, b'b', b'a', b'd', b'!']).is_err());
}

#[test]
fn overrunning_child_is_reported() {
    let data = [0, 0, 0, 64, b'f', b'r', b'e', b'e', 1, 2, 3];
    let first = BoxIter::new(&data).next().unwrap();
    assert!(matches!(first, Err(PlayerError::Container(_))));
}

#[test]
fn parses_fixture_moov() {
    let file = Mp4Fixture {
        audio: Some(AudioFixture {
            sample_rate: 48_000,
            channels: 2,
            frames: 10,
        }),
        ..Mp4Fixture::default()
    }
    .build();

    let boxes = top_level(&file);
    let kinds: Vec<String> = boxes.iter().map(|(t, _)| fourcc_to_string(*t)).collect();
    assert_eq!(kinds, ["ftyp", "moov", "mdat"]);

    let moov = parse_moov(boxes[1].1).unwrap();
    assert_eq!(moov.timescale, 1000);
    assert_eq!(moov.duration, 10_000);
    assert!(!moov.fragmented);
    assert_eq!(moov.tracks.len(), 2);

    let video = &moov.tracks[0];
    assert_eq!(video.handler, VIDE);
    assert_eq!(video.timescale, 90_000);
    assert_eq!((video.display_width, video.display_height), (64, 36));
    assert_eq!(video.tables.sample_count, 300);
    assert_eq!(video.tables.sync_samples.as_ref().map(Vec::len), Some(10));
    match &video.entry {
        SampleEntry::Video(v) => {
            assert_eq!(v.format, AVC1);
            assert_eq!((v.width, v.height), (64, 36));
            assert_eq!(v.config.as_deref(), Some(mp4_fixture::avcc_record().as_slice()));
        }
        other => panic!("unexpected entry {other:?}"),
    }

    let audio = &moov.tracks[1];
    assert_eq!(audio.handler, SOUN);
    match &audio.entry {
        SampleEntry::Audio(a) => {
            assert_eq!(a.channel_count, 2);
            assert_eq!(a.sample_rate, 48_000);
            let esds = a.esds.as_ref().unwrap();
            assert_eq!(esds.object_type_indication, 0x40);
            assert_eq!(esds.audio_object_type, Some(2));
            assert_eq!(esds.decoder_specific_info.len(), 2);
        }
        other => panic!("unexpected entry {other:?}"),
    }
}

#[test]
fn missing_avcc_leaves_config_empty() {
    let file = Mp4Fixture {
        with_avcc: false,
        frames: 3,
        ..Mp4Fixture::default()
    }
    .build();
    let boxes = top_level(&file);
    let moov = parse_moov(boxes[1].1).unwrap();
    match &moov.tracks[0].entry {
        SampleEntry::Video(v) => assert!(v.config.is_none()),
        other => panic!("unexpected entry {other:?}"),
    }
}

#[test]
fn table_counts_are_bounds_checked() {
    // stsz claiming a million per-sample sizes in a 12-byte body.
    let mut body = vec![0, 0, 0, 0];
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&1_000_000u32.to_be_bytes());
    assert!(parse_stsz(&body).is_err());

    let mut stco = vec![0, 0, 0, 0];
    stco.extend_from_slice(&2u32.to_be_bytes());
    stco.extend_from_slice(&40u32.to_be_bytes());
    stco.extend_from_slice(&80u32.to_be_bytes());
    assert_eq!(parse_stco(&stco).unwrap(), vec![40, 80]);
}

#[test]
fn elst_skips_empty_edits() {
    let mut body = vec![0, 0, 0, 0];
    body.extend_from_slice(&2u32.to_be_bytes());
    for (dur, media_time) in [(100u32, -1i32), (9000, 1024)] {
        body.extend_from_slice(&dur.to_be_bytes());
        body.extend_from_slice(&media_time.to_be_bytes());
        body.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    }
    assert_eq!(parse_elst(&body).unwrap(), 1024);
}
