use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::*;
use crate::decode::fetch::MemoryFetcher;
use crate::decode::frame::{FrameImage, PixelFormat};

#[path = "../../support/mp4.rs"]
mod mp4_fixture;

use mp4_fixture::Mp4Fixture;

const URL: &str = "mem://clip.mp4";

/// Holds `lag` chunks back before releasing frames, like a pipelined hardware decoder.
struct StubDecoder {
    configured: bool,
    lag: usize,
    pending: VecDeque<EncodedVideoChunk>,
    fail_at_us: Option<i64>,
    configure_calls: Arc<AtomicUsize>,
}

impl StubDecoder {
    fn frame(chunk: EncodedVideoChunk) -> DecodedFrame {
        DecodedFrame {
            image: FrameImage::new(PixelFormat::Rgba8, 2, 2, vec![0u8; 16]).unwrap(),
            timestamp_us: chunk.timestamp_us,
            duration_us: chunk.duration_us,
        }
    }
}

impl VideoDecoder for StubDecoder {
    fn configure(&mut self, _config: &VideoDecoderConfig) -> PlayerResult<()> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        self.configured = true;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn decode(&mut self, chunk: EncodedVideoChunk) -> PlayerResult<()> {
        if Some(chunk.timestamp_us) == self.fail_at_us {
            return Err(PlayerError::decoder("corrupt slice"));
        }
        self.pending.push_back(chunk);
        Ok(())
    }

    fn decode_queue_size(&self) -> usize {
        self.pending.len()
    }

    fn poll_output(&mut self) -> PlayerResult<Option<DecodedFrame>> {
        if self.pending.len() > self.lag {
            Ok(self.pending.pop_front().map(Self::frame))
        } else {
            Ok(None)
        }
    }

    fn flush(&mut self) -> PlayerResult<Vec<DecodedFrame>> {
        Ok(self.pending.drain(..).map(Self::frame).collect())
    }

    fn close(&mut self) {
        self.configured = false;
        self.pending.clear();
    }
}

struct Harness {
    manager: DecoderManager,
    events: Arc<Mutex<Vec<DecoderEvent>>>,
    configure_calls: Arc<AtomicUsize>,
}

fn harness(fixture: &Mp4Fixture, max: usize, lag: usize, fail_at_us: Option<i64>) -> Harness {
    let fetcher = MemoryFetcher::new();
    fetcher.insert(URL, fixture.build());
    let configure_calls = Arc::new(AtomicUsize::new(0));
    let calls = configure_calls.clone();
    let factory = move || -> PlayerResult<Box<dyn VideoDecoder>> {
        Ok(Box::new(StubDecoder {
            configured: false,
            lag,
            pending: VecDeque::new(),
            fail_at_us,
            configure_calls: calls.clone(),
        }))
    };
    let mut manager = DecoderManager::new(
        DecoderManagerOptions {
            max_buffered_frames: max,
            ..DecoderManagerOptions::default()
        },
        Box::new(fetcher),
        Box::new(factory),
    );
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    Harness {
        manager,
        events,
        configure_calls,
    }
}

fn timestamps(m: &DecoderManager) -> Vec<i64> {
    m.frames().map(|f| f.timestamp_us).collect()
}

#[test]
fn load_reports_info_before_frames_and_fills_the_buffer() {
    let mut h = harness(&Mp4Fixture::default(), 30, 0, None);
    let info = h.manager.load(URL).unwrap();
    assert!((info.duration_ms - 10_000.0).abs() < 1.0);
    assert_eq!(h.manager.state(), DecoderState::Ready);
    assert_eq!(h.manager.buffered_frames(), 30);
    assert_eq!(h.manager.queued_samples(), 270);

    let events = h.events.lock().unwrap();
    assert_eq!(events[0], DecoderEvent::StateChanged(DecoderState::Loading));
    let info_at = events
        .iter()
        .position(|e| matches!(e, DecoderEvent::InfoReady(_)))
        .unwrap();
    let first_frame = events
        .iter()
        .position(|e| matches!(e, DecoderEvent::FrameDecoded { .. }))
        .unwrap();
    assert!(info_at < first_frame);
}

#[test]
fn buffer_bound_holds_with_a_lagging_decoder() {
    let mut h = harness(&Mp4Fixture::default(), 8, 3, None);
    h.manager.load(URL).unwrap();

    let mut seen = 0usize;
    let mut t = 0i64;
    while t <= 10_100_000 {
        assert!(h.manager.buffered_frames() + h.manager.in_flight() <= 8);
        assert!(h.manager.buffered_frames() <= 8);
        seen += h.manager.consume_frames_up_to(t).len();
        h.manager.pump();
        t += 16_667;
    }
    assert_eq!(seen, 300);
    assert_eq!(h.manager.buffered_frames(), 0);
}

#[test]
fn nearest_frame_lookup() {
    let mut h = harness(&Mp4Fixture::default(), 30, 0, None);
    assert!(h.manager.get_frame_at_time(0).is_none());
    h.manager.load(URL).unwrap();
    assert_eq!(h.manager.get_frame_at_time(40_000).unwrap().timestamp_us, 33_333);
    assert_eq!(h.manager.get_frame_at_time(-5).unwrap().timestamp_us, 0);

    let evicted = h.manager.consume_frames_up_to(100_000);
    assert_eq!(
        evicted.iter().map(|f| f.timestamp_us).collect::<Vec<_>>(),
        vec![0, 33_333, 66_666]
    );
    evicted.into_iter().for_each(|f| h.manager.release_frame(f));
    assert_eq!(h.manager.buffered_frames(), 30);
    assert_eq!(timestamps(&h.manager)[0], 100_000);
}

#[test]
fn seek_lands_within_one_frame_of_the_target() {
    let mut h = harness(&Mp4Fixture::default(), 30, 0, None);
    h.manager.load(URL).unwrap();

    h.manager.seek(5000.0).unwrap();
    assert_eq!(h.manager.state(), DecoderState::Ready);
    let frame = h.manager.get_frame_at_time(5_000_000).unwrap();
    assert!((frame.timestamp_us - 5_000_000).abs() <= 33_334);

    // Mid-GOP target: frames before it are pre-rolled through, keeping only the newest.
    h.manager.seek(5100.0).unwrap();
    let ts = timestamps(&h.manager);
    assert_eq!(ts[0], 5_066_666);
    assert_eq!(ts[1], 5_100_000);
    assert_eq!(h.manager.get_frame_at_time(5_100_000).unwrap().timestamp_us, 5_100_000);
}

#[test]
fn seek_reaches_target_when_gop_exceeds_buffer() {
    let fixture = Mp4Fixture {
        gop: 300,
        ..Mp4Fixture::default()
    };
    let mut h = harness(&fixture, 8, 2, None);
    h.manager.load(URL).unwrap();
    h.manager.seek(9000.0).unwrap();
    let frame = h.manager.get_frame_at_time(9_000_000).unwrap();
    assert!((frame.timestamp_us - 9_000_000).abs() <= 33_334);
    assert!(h.manager.buffered_frames() + h.manager.in_flight() <= 8);
}

#[test]
fn seek_to_zero_after_playing_keeps_decoding() {
    let mut h = harness(&Mp4Fixture::default(), 30, 0, None);
    h.manager.load(URL).unwrap();
    for step in 1..=90 {
        h.manager.consume_frames_up_to(step * 33_333);
    }

    h.manager.seek(0.0).unwrap();
    assert_eq!(timestamps(&h.manager)[0], 0);
    assert_eq!(h.manager.buffered_frames(), 30);

    h.manager.consume_frames_up_to(1_000_000);
    assert_eq!(h.manager.buffered_frames(), 30);
    assert!(timestamps(&h.manager).last().copied().unwrap() > 1_000_000);

    // The rebuilt demuxer re-announces the track; the decoder is configured once.
    assert_eq!(h.configure_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_avcc_rejects_load() {
    let fixture = Mp4Fixture {
        with_avcc: false,
        frames: 30,
        ..Mp4Fixture::default()
    };
    let mut h = harness(&fixture, 30, 0, None);
    let err = h.manager.load(URL).unwrap_err();
    assert!(matches!(err, PlayerError::Container(_)));
    assert_eq!(h.manager.state(), DecoderState::Error);
    assert!(
        h.events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, DecoderEvent::Error(PlayerError::Container(_))))
    );
}

#[test]
fn fetch_and_factory_failures_reject_load() {
    let mut h = harness(&Mp4Fixture::default(), 30, 0, None);
    let err = h.manager.load("mem://nope.mp4").unwrap_err();
    assert!(err.is_fetch_failure());
    assert_eq!(h.manager.state(), DecoderState::Error);
    assert_eq!(h.manager.last_error(), Some(&err));

    let fetcher = MemoryFetcher::new();
    fetcher.insert(URL, Mp4Fixture::default().build());
    let factory =
        || -> PlayerResult<Box<dyn VideoDecoder>> { Err(PlayerError::decoder("no codec")) };
    let mut m = DecoderManager::new(
        DecoderManagerOptions::default(),
        Box::new(fetcher),
        Box::new(factory),
    );
    assert_eq!(m.load(URL), Err(PlayerError::decoder("no codec")));
    assert_eq!(m.state(), DecoderState::Error);
}

#[test]
fn mid_stream_decode_error_moves_to_error() {
    // Frame 40 (1_333_333 us) is rejected by the decoder.
    let mut h = harness(&Mp4Fixture::default(), 30, 0, Some(1_333_333));
    h.manager.load(URL).unwrap();
    h.manager.consume_frames_up_to(2_000_000);
    assert_eq!(h.manager.state(), DecoderState::Error);
    assert!(matches!(h.manager.last_error(), Some(PlayerError::Decoder(_))));
    assert_eq!(h.manager.process_queue(), 0);
    assert!(matches!(h.manager.seek(0.0), Err(PlayerError::State(_))));

    // A new load starts over.
    let mut ok = harness(&Mp4Fixture::default(), 30, 0, None);
    ok.manager.load(URL).unwrap();
    assert_eq!(ok.manager.state(), DecoderState::Ready);
}

#[test]
fn reload_keeps_subscriptions_and_dispose_drops_them() {
    let mut h = harness(&Mp4Fixture::default(), 10, 0, None);
    h.manager.load(URL).unwrap();
    h.manager.load(URL).unwrap();
    let info_events = h
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, DecoderEvent::InfoReady(_)))
        .count();
    assert_eq!(info_events, 2);
    assert_eq!(h.manager.buffered_frames(), 10);

    h.manager.dispose();
    h.manager.dispose();
    assert!(h.manager.events_mut().is_empty());
    assert_eq!(h.manager.buffered_frames(), 0);
    assert!(matches!(h.manager.load(URL), Err(PlayerError::State(_))));
}
