use std::sync::{Arc, Mutex};

use super::*;
use crate::decode::MemoryFetcher;
use crate::media::VideoTrackInfo;

fn engine() -> PlaybackEngine {
    PlaybackEngine::new(
        EngineConfig::default(),
        EngineDeps {
            fetcher: Box::new(MemoryFetcher::new()),
            decoder_factory: Box::new(DefaultDecoderFactory),
        },
    )
    .unwrap()
}

#[test]
fn invalid_config_is_rejected() {
    let config = EngineConfig {
        buffer_size: 0,
        ..EngineConfig::default()
    };
    assert!(matches!(
        PlaybackEngine::new(config, EngineDeps::default()),
        Err(PlayerError::Config(_))
    ));
}

#[test]
fn commands_before_load_are_inert() {
    let mut e = engine();
    e.play();
    e.pause();
    e.toggle_playback();
    e.on_animation_frame(16.0);
    assert_eq!(e.state(), PlaybackState::Idle);
    assert!(matches!(e.seek(1_000.0), Err(PlayerError::State(_))));
    assert!(matches!(e.resize_canvas(10.0, 10.0), Err(PlayerError::State(_))));
    assert!(e.export_frame(ExportFormat::Png, 1.0).is_err());
    assert_eq!(e.duration_ms(), 0.0);
}

#[test]
fn failed_load_enters_error_and_reports_once() {
    let mut e = engine();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    e.subscribe(move |ev| sink.lock().unwrap().push(ev.clone()));

    let err = e.load("mem://missing.mp4").unwrap_err();
    assert!(err.is_fetch_failure());
    assert_eq!(e.state(), PlaybackState::Error);
    assert!(matches!(e.seek(0.0), Err(PlayerError::State(_))));

    let log = log.lock().unwrap();
    assert_eq!(
        log[0],
        EngineEvent::StateChanged {
            from: PlaybackState::Idle,
            to: PlaybackState::Loading
        }
    );
    assert_eq!(
        log.iter()
            .filter(|ev| matches!(ev, EngineEvent::Error(_)))
            .count(),
        1
    );
}

#[test]
fn attach_canvas_replaces_the_previous_one() {
    let mut e = engine();
    e.attach_canvas(32.0, 18.0).unwrap();
    e.add_layer(Layer::new("a", 0, |_: &mut crate::render::LayerContext<'_>| Ok(())))
        .unwrap();
    assert_eq!(e.compositor().unwrap().layer_ids().count(), 1);

    e.attach_canvas(64.0, 36.0).unwrap();
    let c = e.compositor().unwrap();
    assert_eq!(c.layer_ids().count(), 0);
    assert_eq!((c.surface().pixel_width(), c.surface().pixel_height()), (64, 36));
}

#[test]
fn display_size_is_preferred_for_fitting() {
    let mut info = MediaInfo {
        duration_ms: 1_000.0,
        video: Some(VideoTrackInfo {
            track_id: 1,
            codec: "avc1.64001f".into(),
            coded_width: 64,
            coded_height: 48,
            display_width: 64,
            display_height: 36,
            duration_ms: 1_000.0,
            frame_rate: 30.0,
            bitrate: 0.0,
        }),
        audio: None,
    };
    assert_eq!(video_dimensions(&info), Some((64, 36)));
    if let Some(v) = info.video.as_mut() {
        v.display_width = 0;
    }
    assert_eq!(video_dimensions(&info), Some((64, 48)));
    info.video = None;
    assert_eq!(video_dimensions(&info), None);
}

#[test]
fn dispose_is_final() {
    let mut e = engine();
    e.attach_canvas(8.0, 8.0).unwrap();
    e.dispose();
    e.dispose();
    assert!(e.is_disposed());
    assert!(e.compositor().is_none());
    assert!(matches!(e.load("mem://x"), Err(PlayerError::State(_))));
    assert!(e.attach_canvas(8.0, 8.0).is_err());
}
