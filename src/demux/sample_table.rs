use tracing::debug;

use crate::demux::boxes::SampleTables;
use crate::foundation::error::{PlayerError, PlayerResult};

/// Upper bound on samples per track: a day of 120 fps video, or of 48 kHz AAC.
pub const MAX_SAMPLES: u32 = 1 << 24;

/// One sample of a track, flattened out of `stsc`/`stsz`/`stco`/`stts`/`ctts`/`stss`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleInfo {
    pub offset: u64,
    pub size: u32,
    /// Decode timestamp, track timescale.
    pub dts: i64,
    /// Presentation timestamp, track timescale, edit-list shift applied.
    pub cts: i64,
    pub duration: u32,
    pub is_sync: bool,
}

impl SampleInfo {
    pub fn end_offset(&self) -> u64 {
        self.offset.saturating_add(u64::from(self.size))
    }
}

/// All samples of a track in decode order.
#[derive(Clone, Debug, Default)]
pub struct SampleTable {
    pub samples: Vec<SampleInfo>,
    pub timescale: u32,
}

impl SampleTable {
    pub fn build(tables: &SampleTables, timescale: u32, media_time_offset: i64) -> PlayerResult<Self> {
        if tables.sample_count == 0 {
            return Ok(Self {
                samples: Vec::new(),
                timescale,
            });
        }
        check_sample_count(tables)?;
        let count = tables.sample_count as usize;

        let placement = sample_placement(tables, count)?;
        let (dts, durations) = decode_times(tables, count)?;
        let cts_offsets = composition_offsets(tables, count);
        let sync = sync_flags(tables, count);

        let samples: Vec<SampleInfo> = placement
            .into_iter()
            .enumerate()
            .map(|(i, (offset, size))| SampleInfo {
                offset,
                size,
                dts: dts[i],
                cts: (dts[i] + i64::from(cts_offsets[i])).saturating_sub(media_time_offset),
                duration: durations[i],
                is_sync: sync[i],
            })
            .collect();

        debug!(
            samples = samples.len(),
            timescale,
            "built sample table"
        );

        Ok(Self { samples, timescale })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.samples.iter().map(|s| u64::from(s.size)).sum()
    }

    /// Track duration derived from the samples themselves (last presentation end).
    pub fn presentation_end(&self) -> i64 {
        self.samples
            .iter()
            .map(|s| s.cts + i64::from(s.duration))
            .max()
            .unwrap_or(0)
    }

    /// Decode-order index of the sample with the latest presentation time at or before `ticks`.
    ///
    /// Falls back to the first sample when `ticks` precedes everything.
    pub fn presented_at_or_before(&self, ticks: i64) -> Option<usize> {
        if self.samples.is_empty() {
            return None;
        }
        let best = self
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.cts <= ticks)
            .max_by_key(|(_, s)| s.cts)
            .map(|(i, _)| i);
        Some(best.unwrap_or(0))
    }

    /// Nearest sync sample at or before `index` in decode order.
    pub fn sync_at_or_before(&self, index: usize) -> usize {
        let upper = index.min(self.samples.len().saturating_sub(1));
        (0..=upper)
            .rev()
            .find(|&i| self.samples[i].is_sync)
            .unwrap_or(0)
    }
}

/// The declared sample count must be placeable by every other table before anything is sized
/// from it.
fn check_sample_count(tables: &SampleTables) -> PlayerResult<()> {
    let count = u64::from(tables.sample_count);
    if tables.sample_count > MAX_SAMPLES {
        return Err(PlayerError::container(format!(
            "stsz declares {count} samples, more than the supported {MAX_SAMPLES}"
        )));
    }

    let timed: u64 = tables.stts.iter().map(|e| u64::from(e.sample_count)).sum();
    if timed < count {
        return Err(PlayerError::container(format!(
            "stts covers {timed} of {count} samples"
        )));
    }

    let mut placeable = 0u64;
    for (i, entry) in tables.stsc.iter().enumerate() {
        let first = u64::from(entry.first_chunk.max(1));
        let end = tables
            .stsc
            .get(i + 1)
            .map_or(tables.chunk_offsets.len() as u64 + 1, |next| {
                u64::from(next.first_chunk.max(1))
            })
            .min(tables.chunk_offsets.len() as u64 + 1);
        let chunks = end.saturating_sub(first);
        placeable = placeable.saturating_add(chunks.saturating_mul(u64::from(entry.samples_per_chunk)));
    }
    if placeable < count {
        return Err(PlayerError::container(format!(
            "chunk tables place only {placeable} of {count} samples"
        )));
    }
    Ok(())
}

fn sample_placement(tables: &SampleTables, count: usize) -> PlayerResult<Vec<(u64, u32)>> {
    if tables.default_sample_size == 0 && tables.sample_sizes.len() < count {
        return Err(PlayerError::container(format!(
            "stsz lists {} sizes for {count} samples",
            tables.sample_sizes.len()
        )));
    }
    if tables.stsc.is_empty() {
        return Err(PlayerError::container("stsc is empty for a track with samples"));
    }
    let size_of = |i: usize| {
        if tables.default_sample_size != 0 {
            tables.default_sample_size
        } else {
            tables.sample_sizes[i]
        }
    };

    let mut out = Vec::new();
    let mut entry = 0usize;
    for (chunk_idx, &chunk_offset) in tables.chunk_offsets.iter().enumerate() {
        let chunk_no = chunk_idx as u32 + 1;
        while entry + 1 < tables.stsc.len() && tables.stsc[entry + 1].first_chunk <= chunk_no {
            entry += 1;
        }
        let per_chunk = tables.stsc[entry].samples_per_chunk;

        let mut offset = chunk_offset;
        for _ in 0..per_chunk {
            if out.len() == count {
                break;
            }
            let size = size_of(out.len());
            let end = offset.checked_add(u64::from(size)).ok_or_else(|| {
                PlayerError::container(format!(
                    "sample {} at offset {offset} (+{size}) overflows the file offset range",
                    out.len() + 1
                ))
            })?;
            out.push((offset, size));
            offset = end;
        }
        if out.len() == count {
            break;
        }
    }

    if out.len() < count {
        return Err(PlayerError::container(format!(
            "chunk tables place only {} of {count} samples",
            out.len()
        )));
    }
    Ok(out)
}

fn decode_times(tables: &SampleTables, count: usize) -> PlayerResult<(Vec<i64>, Vec<u32>)> {
    let mut dts = Vec::new();
    let mut durations = Vec::new();
    let mut t = 0i64;
    'outer: for e in &tables.stts {
        for _ in 0..e.sample_count {
            if dts.len() == count {
                break 'outer;
            }
            dts.push(t);
            durations.push(e.sample_delta);
            t += i64::from(e.sample_delta);
        }
    }
    if dts.len() < count {
        return Err(PlayerError::container(format!(
            "stts covers {} of {count} samples",
            dts.len()
        )));
    }
    Ok((dts, durations))
}

fn composition_offsets(tables: &SampleTables, count: usize) -> Vec<i32> {
    let mut out: Vec<i32> = tables
        .ctts
        .iter()
        .flat_map(|e| std::iter::repeat_n(e.sample_offset, e.sample_count as usize))
        .take(count)
        .collect();
    out.resize(count, 0);
    out
}

fn sync_flags(tables: &SampleTables, count: usize) -> Vec<bool> {
    match &tables.sync_samples {
        None => vec![true; count],
        Some(list) => {
            let mut flags = vec![false; count];
            for &n in list {
                if let Some(flag) = (n as usize).checked_sub(1).and_then(|i| flags.get_mut(i)) {
                    *flag = true;
                }
            }
            flags
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/demux/sample_table.rs"]
mod tests;
