//! H.264 helpers: `avcC` (AVCDecoderConfigurationRecord) parsing and AVCC → Annex-B rewriting.

use smallvec::SmallVec;

use crate::foundation::error::{PlayerError, PlayerResult};

const ANNEXB_START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Parsed AVCDecoderConfigurationRecord (ISO 14496-15 §5.3.3.1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvcConfig {
    pub profile_idc: u8,
    pub profile_compatibility: u8,
    pub level_idc: u8,
    /// Byte width of the NAL length prefix in samples (1, 2 or 4).
    pub nal_length_size: u8,
    pub sps: SmallVec<[Vec<u8>; 1]>,
    pub pps: SmallVec<[Vec<u8>; 1]>,
}

impl AvcConfig {
    /// Parse and validate an `avcC` payload (box header excluded).
    pub fn parse(data: &[u8]) -> PlayerResult<Self> {
        let err = |msg: &str| PlayerError::container(format!("invalid avcC: {msg}"));

        if data.len() < 7 {
            return Err(err("record shorter than 7 bytes"));
        }
        if data[0] != 1 {
            return Err(err(&format!("unsupported configurationVersion {}", data[0])));
        }
        let profile_idc = data[1];
        let profile_compatibility = data[2];
        let level_idc = data[3];
        let nal_length_size = (data[4] & 0x03) + 1;
        if nal_length_size == 3 {
            return Err(err("NAL length size of 3 bytes is not allowed"));
        }

        let mut pos = 5usize;
        let num_sps = (data[pos] & 0x1f) as usize;
        pos += 1;
        if num_sps == 0 {
            return Err(err("no sequence parameter set"));
        }
        let mut sps = SmallVec::new();
        for _ in 0..num_sps {
            sps.push(read_param_set(data, &mut pos).ok_or_else(|| err("truncated SPS"))?);
        }

        let num_pps = *data.get(pos).ok_or_else(|| err("missing PPS count"))? as usize;
        pos += 1;
        let mut pps = SmallVec::new();
        for _ in 0..num_pps {
            pps.push(read_param_set(data, &mut pos).ok_or_else(|| err("truncated PPS"))?);
        }

        Ok(Self {
            profile_idc,
            profile_compatibility,
            level_idc,
            nal_length_size,
            sps,
            pps,
        })
    }

    /// RFC 6381 codec string, e.g. `avc1.64001f`.
    pub fn codec_string(&self, sample_entry: &str) -> String {
        format!(
            "{sample_entry}.{:02x}{:02x}{:02x}",
            self.profile_idc, self.profile_compatibility, self.level_idc
        )
    }

    /// SPS and PPS NAL units, each preceded by an Annex-B start code.
    pub fn parameter_sets_annexb(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in self.sps.iter().chain(self.pps.iter()) {
            out.extend_from_slice(&ANNEXB_START_CODE);
            out.extend_from_slice(nal);
        }
        out
    }

    /// Rewrite one length-prefixed sample into Annex-B, prepending parameter sets on keyframes.
    pub fn sample_to_annexb(&self, sample: &[u8], keyframe: bool) -> PlayerResult<Vec<u8>> {
        let mut out = Vec::with_capacity(sample.len() + 64);
        if keyframe {
            out.extend_from_slice(&self.parameter_sets_annexb());
        }

        let len_size = usize::from(self.nal_length_size);
        let mut pos = 0usize;
        while pos < sample.len() {
            if pos + len_size > sample.len() {
                return Err(PlayerError::decoder("truncated NAL length prefix"));
            }
            let nal_len = sample[pos..pos + len_size]
                .iter()
                .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
            pos += len_size;
            if pos + nal_len > sample.len() {
                return Err(PlayerError::decoder(format!(
                    "NAL unit of {nal_len} bytes overruns sample of {} bytes",
                    sample.len()
                )));
            }
            out.extend_from_slice(&ANNEXB_START_CODE);
            out.extend_from_slice(&sample[pos..pos + nal_len]);
            pos += nal_len;
        }
        Ok(out)
    }
}

fn read_param_set(data: &[u8], pos: &mut usize) -> Option<Vec<u8>> {
    let len_bytes = data.get(*pos..*pos + 2)?;
    let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
    *pos += 2;
    let nal = data.get(*pos..*pos + len)?.to_vec();
    *pos += len;
    Some(nal)
}

#[cfg(test)]
#[path = "../../tests/unit/demux/avc.rs"]
mod tests;
