//! H.264 decoding through a system `ffmpeg` child process.
//!
//! Samples are rewritten to Annex-B and streamed into `ffmpeg`'s stdin; raw I420 frames are read
//! back from stdout on a reader thread. `ffmpeg` emits frames in presentation order, so each
//! output frame takes the smallest timestamp still pending.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::decode::decoder::{ChunkType, EncodedVideoChunk, VideoDecoder, VideoDecoderConfig};
use crate::decode::frame::{DecodedFrame, FrameImage, PixelFormat};
use crate::demux::AvcConfig;
use crate::foundation::error::{PlayerError, PlayerResult};

struct Process {
    child: Child,
    stdin: Option<ChildStdin>,
    frames: Receiver<std::io::Result<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

#[derive(Default)]
pub struct FfmpegVideoDecoder {
    avc: Option<AvcConfig>,
    width: u32,
    height: u32,
    configured: bool,
    process: Option<Process>,
    /// `(timestamp_us, duration_us)` of submitted chunks without an output frame yet.
    pending: BinaryHeap<Reverse<(i64, i64)>>,
}

impl FfmpegVideoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame_len(&self) -> usize {
        PixelFormat::I420.byte_len(self.width, self.height)
    }

    fn ensure_process(&mut self) -> PlayerResult<&mut Process> {
        if self.process.is_none() {
            self.process = Some(self.spawn()?);
        }
        self.process
            .as_mut()
            .ok_or_else(|| PlayerError::decoder("ffmpeg process missing after spawn"))
    }

    fn spawn(&self) -> PlayerResult<Process> {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .args(ffmpeg_args(self.width, self.height));

        let mut child = cmd.spawn().map_err(|e| {
            PlayerError::decoder(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PlayerError::decoder("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlayerError::decoder("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| PlayerError::decoder("failed to open ffmpeg stderr (unexpected)"))?;

        let frame_len = self.frame_len();
        let (tx, rx) = mpsc::channel();
        let reader = std::thread::spawn(move || {
            loop {
                let mut buf = vec![0u8; frame_len];
                match stdout.read_exact(&mut buf) {
                    Ok(()) => {
                        if tx.send(Ok(buf)).is_err() {
                            return;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                }
            }
        });
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        debug!(width = self.width, height = self.height, "spawned ffmpeg decoder");
        Ok(Process {
            child,
            stdin: Some(stdin),
            frames: rx,
            reader: Some(reader),
            stderr_drain: Some(stderr_drain),
        })
    }

    fn to_frame(&mut self, bytes: Vec<u8>) -> PlayerResult<DecodedFrame> {
        let Some(Reverse((timestamp_us, duration_us))) = self.pending.pop() else {
            return Err(PlayerError::decoder(
                "ffmpeg produced more frames than were submitted",
            ));
        };
        Ok(DecodedFrame {
            image: FrameImage::new(PixelFormat::I420, self.width, self.height, bytes)?,
            timestamp_us,
            duration_us,
        })
    }

    /// Close stdin, wait for `ffmpeg` to exit and return every frame it still had.
    fn finish_process(&mut self) -> PlayerResult<Vec<Vec<u8>>> {
        let Some(mut process) = self.process.take() else {
            return Ok(Vec::new());
        };
        drop(process.stdin.take());

        let mut out = Vec::new();
        // The reader thread ends at EOF, which disconnects the channel.
        while let Ok(frame) = process.frames.recv() {
            out.push(frame.map_err(|e| PlayerError::decoder(format!("ffmpeg stdout read failed: {e}")))?);
        }
        if let Some(reader) = process.reader.take() {
            reader
                .join()
                .map_err(|_| PlayerError::decoder("ffmpeg reader thread panicked"))?;
        }

        let status = process
            .child
            .wait()
            .map_err(|e| PlayerError::decoder(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr_bytes = match process.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| PlayerError::decoder("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| PlayerError::decoder(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(PlayerError::decoder(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }
        Ok(out)
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn configure(&mut self, config: &VideoDecoderConfig) -> PlayerResult<()> {
        if !(config.codec.starts_with("avc1") || config.codec.starts_with("avc3")) {
            return Err(PlayerError::decoder(format!(
                "ffmpeg decoder only handles H.264, got codec '{}'",
                config.codec
            )));
        }
        if config.coded_width == 0 || config.coded_height == 0 {
            return Err(PlayerError::decoder("coded width/height must be non-zero"));
        }
        if !is_ffmpeg_on_path() {
            return Err(PlayerError::decoder(
                "ffmpeg is required for decoding, but was not found on PATH",
            ));
        }

        self.avc = match config.description.as_deref() {
            Some(raw) => Some(AvcConfig::parse(raw)?),
            None => None,
        };
        self.width = config.coded_width;
        self.height = config.coded_height;
        self.configured = true;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn decode(&mut self, chunk: EncodedVideoChunk) -> PlayerResult<()> {
        if !self.configured {
            return Err(PlayerError::decoder("decode called before configure"));
        }
        let keyframe = chunk.chunk_type == ChunkType::Key;
        let annexb = match &self.avc {
            Some(avc) => avc.sample_to_annexb(&chunk.data, keyframe)?,
            None => length_prefixed_to_annexb(&chunk.data)?,
        };

        let process = self.ensure_process()?;
        let Some(stdin) = process.stdin.as_mut() else {
            return Err(PlayerError::decoder("ffmpeg stdin already closed"));
        };
        stdin
            .write_all(&annexb)
            .and_then(|()| stdin.flush())
            .map_err(|e| PlayerError::decoder(format!("failed to write chunk to ffmpeg: {e}")))?;

        self.pending
            .push(Reverse((chunk.timestamp_us, chunk.duration_us)));
        Ok(())
    }

    fn decode_queue_size(&self) -> usize {
        self.pending.len()
    }

    fn poll_output(&mut self) -> PlayerResult<Option<DecodedFrame>> {
        let Some(process) = self.process.as_mut() else {
            return Ok(None);
        };
        match process.frames.try_recv() {
            Ok(Ok(bytes)) => self.to_frame(bytes).map(Some),
            Ok(Err(e)) => Err(PlayerError::decoder(format!("ffmpeg stdout read failed: {e}"))),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                if self.pending.is_empty() {
                    Ok(None)
                } else {
                    // Output ended while chunks were outstanding: surface ffmpeg's own error.
                    self.finish_process()?;
                    Err(PlayerError::decoder("ffmpeg stopped producing frames"))
                }
            }
        }
    }

    fn flush(&mut self) -> PlayerResult<Vec<DecodedFrame>> {
        let raw = self.finish_process()?;
        let mut frames = Vec::with_capacity(raw.len());
        for bytes in raw {
            if self.pending.is_empty() {
                warn!("ffmpeg emitted a frame with no pending timestamp");
                break;
            }
            frames.push(self.to_frame(bytes)?);
        }
        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "chunks without output after flush");
            self.pending.clear();
        }
        Ok(frames)
    }

    fn close(&mut self) {
        if let Some(mut process) = self.process.take() {
            drop(process.stdin.take());
            let _ = process.child.kill();
            let _ = process.child.wait();
        }
        self.pending.clear();
        self.configured = false;
    }
}

impl Drop for FfmpegVideoDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

fn ffmpeg_args(width: u32, height: u32) -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-probesize",
        "32",
        "-analyzeduration",
        "0",
        "-fflags",
        "nobuffer",
        "-flags",
        "low_delay",
        "-threads",
        "1",
        "-f",
        "h264",
        "-i",
        "pipe:0",
        "-vf",
    ]
    .into_iter()
    .map(String::from)
    .chain([format!("scale={width}:{height}")])
    .chain(
        [
            "-f",
            "rawvideo",
            "-pix_fmt",
            "yuv420p",
            "-fps_mode",
            "passthrough",
            "pipe:1",
        ]
        .into_iter()
        .map(String::from),
    )
    .collect()
}

/// In-band parameter sets (`avc3` without `avcC`): assume 4-byte NAL lengths.
fn length_prefixed_to_annexb(sample: &[u8]) -> PlayerResult<Vec<u8>> {
    let mut out = Vec::with_capacity(sample.len() + 16);
    let mut pos = 0usize;
    while pos < sample.len() {
        let len_bytes = sample
            .get(pos..pos + 4)
            .ok_or_else(|| PlayerError::decoder("truncated NAL length prefix"))?;
        let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        pos += 4;
        let nal = sample
            .get(pos..pos + len)
            .ok_or_else(|| PlayerError::decoder("NAL unit overruns sample"))?;
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
        pos += len;
    }
    Ok(out)
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/decode/ffmpeg.rs"]
mod tests;
