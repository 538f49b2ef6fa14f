use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::demux::avc::AvcConfig;
use crate::demux::boxes::{
    self, AVC1, AVC3, MOOF, MOOV, ParsedMoov, ParsedTrack, SOUN, SampleEntry, VIDE,
};
use crate::demux::buffer::SourceBuffer;
use crate::demux::sample_table::SampleTable;
use crate::foundation::core::{US_PER_MS, ms_to_us, ticks_to_us, us_to_ticks};
use crate::foundation::error::{PlayerError, PlayerResult};
use crate::media::{
    AudioTrackConfig, AudioTrackInfo, DemuxedSample, MediaInfo, VideoTrackConfig, VideoTrackInfo,
};

/// Samples handed out per `VideoSamples`/`AudioSamples` event.
const SAMPLE_BATCH: usize = 256;

/// Everything the demuxer reports, in the order it was produced.
#[derive(Clone, Debug, PartialEq)]
pub enum DemuxEvent {
    VideoConfig(VideoTrackConfig),
    AudioConfig(AudioTrackConfig),
    Ready(MediaInfo),
    VideoSamples {
        track_id: u32,
        samples: Vec<DemuxedSample>,
    },
    AudioSamples {
        track_id: u32,
        samples: Vec<DemuxedSample>,
    },
    Error(PlayerError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug)]
struct TrackCursor {
    track_id: u32,
    kind: TrackKind,
    table: SampleTable,
    next: usize,
}

#[derive(Debug)]
struct Header {
    info: MediaInfo,
    tracks: Vec<TrackCursor>,
}

/// Incremental MP4 demuxer.
///
/// Bytes arrive through [`append_data`](Self::append_data) at arbitrary file offsets. Headers
/// are parsed as soon as the whole `moov` box is present; samples are extracted on
/// [`flush`](Self::flush) in decode order for every byte range that is available. Results are
/// queued as [`DemuxEvent`]s and drained by the owner.
#[derive(Debug, Default)]
pub struct Mp4Demuxer {
    source: SourceBuffer,
    /// File offset of the next top-level box to inspect while looking for `moov`.
    scan_offset: u64,
    header: Option<Header>,
    events: VecDeque<DemuxEvent>,
    failed: bool,
    disposed: bool,
}

impl Mp4Demuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `bytes` located at `file_start` in the source file.
    pub fn append_data(&mut self, bytes: &[u8], file_start: u64) {
        if self.disposed || self.failed {
            return;
        }
        let grew = match self.source.insert(file_start, bytes) {
            Ok(grew) => grew,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        debug!(file_start, len = bytes.len(), grew, "demuxer append");
        if self.header.is_none()
            && let Err(e) = self.scan_for_moov()
        {
            self.fail(e);
        }
    }

    /// Emit every sample whose bytes are available from the current track cursors.
    pub fn flush(&mut self) {
        if self.disposed || self.failed {
            return;
        }
        if self.header.is_none()
            && let Err(e) = self.scan_for_moov()
        {
            self.fail(e);
            return;
        }
        let Some(header) = self.header.as_mut() else {
            return;
        };

        for track in &mut header.tracks {
            let mut batch = Vec::new();
            while let Some(info) = track.table.samples.get(track.next) {
                let Some(bytes) = self.source.get(info.offset, u64::from(info.size)) else {
                    break;
                };
                let timescale = track.table.timescale;
                batch.push(DemuxedSample {
                    track_id: track.track_id,
                    data: Arc::from(bytes),
                    timestamp_us: ticks_to_us(info.cts, timescale),
                    duration_us: ticks_to_us(i64::from(info.duration), timescale),
                    is_keyframe: info.is_sync,
                });
                track.next += 1;

                if batch.len() == SAMPLE_BATCH {
                    self.events
                        .push_back(samples_event(track.kind, track.track_id, std::mem::take(&mut batch)));
                }
            }
            if !batch.is_empty() {
                self.events
                    .push_back(samples_event(track.kind, track.track_id, batch));
            }
        }
    }

    pub fn poll_event(&mut self) -> Option<DemuxEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<DemuxEvent> {
        self.events.drain(..).collect()
    }

    /// `true` once `moov` has been parsed and `Ready` queued.
    pub fn is_ready(&self) -> bool {
        self.header.is_some()
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.header.as_ref().map(|h| &h.info)
    }

    /// Reposition every track to the sample covering `time_ms`.
    ///
    /// Video restarts at the nearest sync sample at or before the target so the decoder sees a
    /// keyframe first. Returns the smallest file offset that must be re-supplied; `0` when
    /// headers are not parsed yet.
    pub fn seek(&mut self, time_ms: f64) -> u64 {
        let Some(header) = self.header.as_mut() else {
            return 0;
        };
        let target_us = ms_to_us(time_ms.max(0.0));

        let mut offset: Option<u64> = None;
        for track in &mut header.tracks {
            let ticks = us_to_ticks(target_us, track.table.timescale);
            let Some(idx) = track.table.presented_at_or_before(ticks) else {
                continue;
            };
            track.next = match track.kind {
                TrackKind::Video => track.table.sync_at_or_before(idx),
                TrackKind::Audio => idx,
            };
            let at = track.table.samples[track.next].offset;
            offset = Some(offset.map_or(at, |o| o.min(at)));
        }
        let offset = offset.unwrap_or(0);
        debug!(time_ms, offset, "demuxer seek");
        offset
    }

    /// Release buffered data and parser state. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.source.clear();
        self.header = None;
        self.events.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn fail(&mut self, err: PlayerError) {
        warn!(error = %err, "demuxer failed");
        self.failed = true;
        self.events.push_back(DemuxEvent::Error(err));
    }

    fn scan_for_moov(&mut self) -> PlayerResult<()> {
        loop {
            let available = self.source.contiguous_len(self.scan_offset);
            let Some(head) = self.source.get(self.scan_offset, available.min(16)) else {
                return Ok(());
            };
            let Some(bh) = boxes::read_box_header(head)? else {
                return Ok(());
            };

            match bh.box_type {
                MOOV => {
                    let size = bh.size.unwrap_or(available);
                    let Some(raw) = self.source.get(self.scan_offset, size) else {
                        return Ok(());
                    };
                    let payload = &raw[usize::from(bh.header_size)..];
                    let moov = boxes::parse_moov(payload)?;
                    let header = self.build_header(&moov)?;
                    self.header = Some(header);
                    return Ok(());
                }
                MOOF => {
                    return Err(PlayerError::container(
                        "fragmented MP4 (moof) is not supported",
                    ));
                }
                _ => match bh.size {
                    Some(size) => {
                        self.scan_offset = self.scan_offset.checked_add(size).ok_or_else(|| {
                            PlayerError::container(format!(
                                "box '{}' at offset {} runs past the end of the addressable file",
                                boxes::fourcc_to_string(bh.box_type),
                                self.scan_offset
                            ))
                        })?;
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    fn build_header(&mut self, moov: &ParsedMoov) -> PlayerResult<Header> {
        if moov.fragmented {
            return Err(PlayerError::container("fragmented MP4 (mvex) is not supported"));
        }

        let mut tracks = Vec::new();
        let mut video_info = None;
        let mut audio_info = None;
        let mut longest_ms = 0.0f64;

        for track in &moov.tracks {
            let table = SampleTable::build(&track.tables, track.timescale, track.media_time_offset)?;
            let duration_ms = track_duration_ms(track, &table);
            longest_ms = longest_ms.max(duration_ms);

            match (&track.entry, track.handler) {
                (SampleEntry::Video(entry), VIDE) if video_info.is_none() => {
                    let codec = video_codec_string(track.track_id, entry.format, entry.config.as_deref())?;
                    let secs = duration_ms / 1000.0;
                    let info = VideoTrackInfo {
                        track_id: track.track_id,
                        codec: codec.clone(),
                        coded_width: u32::from(entry.width),
                        coded_height: u32::from(entry.height),
                        display_width: nonzero_or(track.display_width, u32::from(entry.width)),
                        display_height: nonzero_or(track.display_height, u32::from(entry.height)),
                        duration_ms,
                        frame_rate: per_second(table.len() as f64, secs),
                        bitrate: per_second(table.total_bytes() as f64 * 8.0, secs),
                    };
                    self.events.push_back(DemuxEvent::VideoConfig(VideoTrackConfig {
                        track_id: track.track_id,
                        codec,
                        coded_width: info.coded_width,
                        coded_height: info.coded_height,
                        description: entry.config.as_deref().map(Arc::from),
                    }));
                    video_info = Some(info);
                    tracks.push(TrackCursor {
                        track_id: track.track_id,
                        kind: TrackKind::Video,
                        table,
                        next: 0,
                    });
                }
                (SampleEntry::Audio(entry), SOUN) if audio_info.is_none() => {
                    let codec = match &entry.esds {
                        Some(esds) if esds.object_type_indication == 0x40 => match esds.audio_object_type {
                            Some(aot) => format!("mp4a.40.{aot}"),
                            None => "mp4a.40".to_string(),
                        },
                        Some(esds) => format!("mp4a.{:02x}", esds.object_type_indication),
                        None => "mp4a".to_string(),
                    };
                    let info = AudioTrackInfo {
                        track_id: track.track_id,
                        codec: codec.clone(),
                        sample_rate: entry.sample_rate,
                        channel_count: entry.channel_count,
                        duration_ms,
                        bitrate: per_second(table.total_bytes() as f64 * 8.0, duration_ms / 1000.0),
                    };
                    self.events.push_back(DemuxEvent::AudioConfig(AudioTrackConfig {
                        track_id: track.track_id,
                        codec,
                        sample_rate: entry.sample_rate,
                        channel_count: entry.channel_count,
                        description: entry
                            .esds
                            .as_ref()
                            .filter(|e| !e.decoder_specific_info.is_empty())
                            .map(|e| Arc::from(e.decoder_specific_info.as_slice())),
                    }));
                    audio_info = Some(info);
                    tracks.push(TrackCursor {
                        track_id: track.track_id,
                        kind: TrackKind::Audio,
                        table,
                        next: 0,
                    });
                }
                (entry, handler) => {
                    debug!(
                        track_id = track.track_id,
                        handler = %boxes::fourcc_to_string(handler),
                        entry = ?entry_kind(entry),
                        "skipping track"
                    );
                }
            }
        }

        let movie_ms = if moov.timescale == 0 {
            0.0
        } else {
            moov.duration as f64 * 1000.0 / f64::from(moov.timescale)
        };
        let info = MediaInfo {
            duration_ms: if movie_ms > 0.0 { movie_ms } else { longest_ms },
            video: video_info,
            audio: audio_info,
        };
        debug!(
            duration_ms = info.duration_ms,
            video = info.video.is_some(),
            audio = info.audio.is_some(),
            "parsed moov"
        );
        self.events.push_back(DemuxEvent::Ready(info.clone()));

        Ok(Header { info, tracks })
    }
}

fn samples_event(kind: TrackKind, track_id: u32, samples: Vec<DemuxedSample>) -> DemuxEvent {
    match kind {
        TrackKind::Video => DemuxEvent::VideoSamples { track_id, samples },
        TrackKind::Audio => DemuxEvent::AudioSamples { track_id, samples },
    }
}

fn video_codec_string(track_id: u32, format: u32, config: Option<&[u8]>) -> PlayerResult<String> {
    let name = boxes::fourcc_to_string(format);
    match (format, config) {
        (AVC1 | AVC3, Some(raw)) => Ok(AvcConfig::parse(raw)?.codec_string(&name)),
        (AVC1, None) => Err(PlayerError::container(format!(
            "avc1 track {track_id} has no avcC decoder configuration record"
        ))),
        _ => Ok(name),
    }
}

fn track_duration_ms(track: &ParsedTrack, table: &SampleTable) -> f64 {
    if track.timescale == 0 {
        return 0.0;
    }
    let ticks = if track.duration > 0 {
        track.duration as i64
    } else {
        table.presentation_end()
    };
    ticks_to_us(ticks, track.timescale) as f64 / US_PER_MS as f64
}

fn per_second(amount: f64, secs: f64) -> f64 {
    if secs > 0.0 { amount / secs } else { 0.0 }
}

fn nonzero_or(v: u32, fallback: u32) -> u32 {
    if v == 0 { fallback } else { v }
}

fn entry_kind(entry: &SampleEntry) -> String {
    match entry {
        SampleEntry::Video(v) => boxes::fourcc_to_string(v.format),
        SampleEntry::Audio(a) => boxes::fourcc_to_string(a.format),
        SampleEntry::Other(cc) => boxes::fourcc_to_string(*cc),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/demux/demuxer.rs"]
mod tests;
