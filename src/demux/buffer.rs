use crate::foundation::error::{PlayerError, PlayerResult};

/// File bytes received so far, keyed by absolute file offset.
///
/// Ranges are kept sorted and maximal: overlapping or touching appends are merged, so any
/// contiguous span of available bytes lives inside exactly one range.
#[derive(Debug, Default)]
pub struct SourceBuffer {
    ranges: Vec<Range>,
}

#[derive(Debug)]
struct Range {
    start: u64,
    data: Vec<u8>,
}

impl Range {
    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }
}

impl SourceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `bytes` located at `file_start`.
    ///
    /// Returns `true` when the buffer gained bytes it did not already hold. A range reaching past
    /// `u64::MAX` is a `Container` error.
    pub fn insert(&mut self, file_start: u64, bytes: &[u8]) -> PlayerResult<bool> {
        if bytes.is_empty() {
            return Ok(false);
        }
        let new_end = file_start.checked_add(bytes.len() as u64).ok_or_else(|| {
            PlayerError::container(format!(
                "{} bytes at offset {file_start} overflow the file offset range",
                bytes.len()
            ))
        })?;

        if self
            .ranges
            .iter()
            .any(|r| r.start <= file_start && new_end <= r.end())
        {
            return Ok(false);
        }

        // Every range that overlaps or touches [file_start, new_end) is folded into one.
        let first = self.ranges.partition_point(|r| r.end() < file_start);
        let last = self.ranges.partition_point(|r| r.start <= new_end);

        if first == last {
            self.ranges.insert(
                first,
                Range {
                    start: file_start,
                    data: bytes.to_vec(),
                },
            );
            return Ok(true);
        }

        let merged_start = self.ranges[first].start.min(file_start);
        let merged_end = self.ranges[last - 1].end().max(new_end);
        let mut merged = vec![0u8; (merged_end - merged_start) as usize];
        for r in &self.ranges[first..last] {
            let off = (r.start - merged_start) as usize;
            merged[off..off + r.data.len()].copy_from_slice(&r.data);
        }
        let off = (file_start - merged_start) as usize;
        merged[off..off + bytes.len()].copy_from_slice(bytes);

        self.ranges.splice(
            first..last,
            std::iter::once(Range {
                start: merged_start,
                data: merged,
            }),
        );
        Ok(true)
    }

    /// Borrow `len` bytes at `offset`, or `None` if any of them is missing.
    pub fn get(&self, offset: u64, len: u64) -> Option<&[u8]> {
        let idx = self.ranges.partition_point(|r| r.end() <= offset);
        let r = self.ranges.get(idx)?;
        if r.start > offset || offset.checked_add(len)? > r.end() {
            return None;
        }
        let off = (offset - r.start) as usize;
        Some(&r.data[off..off + len as usize])
    }

    /// Length of the contiguous run of bytes available from `offset`.
    pub fn contiguous_len(&self, offset: u64) -> u64 {
        let idx = self.ranges.partition_point(|r| r.end() <= offset);
        match self.ranges.get(idx) {
            Some(r) if r.start <= offset => r.end() - offset,
            _ => 0,
        }
    }

    pub fn total_len(&self) -> u64 {
        self.ranges.iter().map(|r| r.data.len() as u64).sum()
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/demux/buffer.rs"]
mod tests;
