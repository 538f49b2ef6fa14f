//! ISO BMFF box parsing for the parts of `moov` the player needs.
//!
//! All parsers work on complete in-memory payloads (box header excluded) and bounds-check every
//! table count against the payload length before allocating.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

use crate::foundation::error::{PlayerError, PlayerResult};

pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

pub const FTYP: u32 = fourcc(b"ftyp");
pub const MOOV: u32 = fourcc(b"moov");
pub const MVHD: u32 = fourcc(b"mvhd");
pub const TRAK: u32 = fourcc(b"trak");
pub const TKHD: u32 = fourcc(b"tkhd");
pub const EDTS: u32 = fourcc(b"edts");
pub const ELST: u32 = fourcc(b"elst");
pub const MDIA: u32 = fourcc(b"mdia");
pub const MDHD: u32 = fourcc(b"mdhd");
pub const HDLR: u32 = fourcc(b"hdlr");
pub const MINF: u32 = fourcc(b"minf");
pub const STBL: u32 = fourcc(b"stbl");
pub const STSD: u32 = fourcc(b"stsd");
pub const STTS: u32 = fourcc(b"stts");
pub const CTTS: u32 = fourcc(b"ctts");
pub const STSC: u32 = fourcc(b"stsc");
pub const STSZ: u32 = fourcc(b"stsz");
pub const STCO: u32 = fourcc(b"stco");
pub const CO64: u32 = fourcc(b"co64");
pub const STSS: u32 = fourcc(b"stss");
pub const MDAT: u32 = fourcc(b"mdat");
pub const MOOF: u32 = fourcc(b"moof");
pub const AVC1: u32 = fourcc(b"avc1");
pub const AVC3: u32 = fourcc(b"avc3");
pub const AVCC: u32 = fourcc(b"avcC");
pub const HVC1: u32 = fourcc(b"hvc1");
pub const HEV1: u32 = fourcc(b"hev1");
pub const HVCC: u32 = fourcc(b"hvcC");
pub const MP4A: u32 = fourcc(b"mp4a");
pub const ESDS: u32 = fourcc(b"esds");
pub const VIDE: u32 = fourcc(b"vide");
pub const SOUN: u32 = fourcc(b"soun");

/// Printable form of a FourCC for logs and error messages.
pub fn fourcc_to_string(cc: u32) -> String {
    cc.to_be_bytes()
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: u32,
    /// Total size including the header. `None` means "extends to end of file".
    pub size: Option<u64>,
    pub header_size: u8,
}

/// Read a box header from the start of `data`.
///
/// Returns `Ok(None)` when `data` is too short to hold the full header yet.
pub fn read_box_header(data: &[u8]) -> PlayerResult<Option<BoxHeader>> {
    if data.len() < 8 {
        return Ok(None);
    }
    let size32 = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let box_type = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);

    let (size, header_size) = match size32 {
        0 => (None, 8u8),
        1 => {
            if data.len() < 16 {
                return Ok(None);
            }
            let mut large = [0u8; 8];
            large.copy_from_slice(&data[8..16]);
            (Some(u64::from_be_bytes(large)), 16u8)
        }
        n => (Some(u64::from(n)), 8u8),
    };

    if let Some(size) = size
        && size < u64::from(header_size)
    {
        return Err(PlayerError::container(format!(
            "box '{}' declares size {size} smaller than its header",
            fourcc_to_string(box_type)
        )));
    }

    Ok(Some(BoxHeader {
        box_type,
        size,
        header_size,
    }))
}

/// Iterator over the child boxes of a fully buffered payload: yields `(type, payload)`.
pub struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BoxIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = PlayerResult<(u32, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        // Trailing padding shorter than a header is tolerated (some muxers emit it).
        if self.data.len() - self.pos < 8 {
            return None;
        }
        let rest = &self.data[self.pos..];
        let header = match read_box_header(rest) {
            Ok(Some(h)) => h,
            Ok(None) => return None,
            Err(e) => {
                self.pos = self.data.len();
                return Some(Err(e));
            }
        };
        let total = match header.size {
            Some(size) => size,
            None => rest.len() as u64,
        };
        if total > rest.len() as u64 {
            self.pos = self.data.len();
            return Some(Err(PlayerError::container(format!(
                "box '{}' of {total} bytes overruns its parent ({} bytes left)",
                fourcc_to_string(header.box_type),
                rest.len()
            ))));
        }
        let total = total as usize;
        let payload = &rest[usize::from(header.header_size)..total];
        self.pos += total;
        Some(Ok((header.box_type, payload)))
    }
}

fn find_child(data: &[u8], box_type: u32) -> PlayerResult<Option<&[u8]>> {
    for child in BoxIter::new(data) {
        let (ty, payload) = child?;
        if ty == box_type {
            return Ok(Some(payload));
        }
    }
    Ok(None)
}

fn truncated(what: &str) -> PlayerError {
    PlayerError::container(format!("truncated {what} box"))
}

/// Read `version` + `flags` of a full box.
fn read_full_box_header(cur: &mut Cursor<&[u8]>, what: &str) -> PlayerResult<(u8, u32)> {
    let vf = cur.read_u32::<BigEndian>().map_err(|_| truncated(what))?;
    Ok(((vf >> 24) as u8, vf & 0x00ff_ffff))
}

fn ensure_entries(payload_len: usize, header: usize, count: u32, entry: usize, what: &str) -> PlayerResult<()> {
    let needed = (count as usize).checked_mul(entry).and_then(|n| n.checked_add(header));
    match needed {
        Some(n) if n <= payload_len => Ok(()),
        _ => Err(PlayerError::container(format!(
            "{what} declares {count} entries but the box is only {payload_len} bytes"
        ))),
    }
}

// ─── Parsed structures ──────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct ParsedMoov {
    pub timescale: u32,
    pub duration: u64,
    pub tracks: Vec<ParsedTrack>,
    /// `mvex` present: samples live in `moof` fragments.
    pub fragmented: bool,
}

#[derive(Clone, Debug)]
pub struct ParsedTrack {
    pub track_id: u32,
    pub handler: u32,
    pub timescale: u32,
    pub duration: u64,
    pub display_width: u32,
    pub display_height: u32,
    /// Media time (in track timescale) at which presentation starts, from `elst`.
    pub media_time_offset: i64,
    pub entry: SampleEntry,
    pub tables: SampleTables,
}

#[derive(Clone, Debug)]
pub enum SampleEntry {
    Video(VideoEntry),
    Audio(AudioEntry),
    Other(u32),
}

#[derive(Clone, Debug)]
pub struct VideoEntry {
    pub format: u32,
    pub width: u16,
    pub height: u16,
    /// Raw `avcC`/`hvcC` payload.
    pub config: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct AudioEntry {
    pub format: u32,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub esds: Option<EsdsInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EsdsInfo {
    pub object_type_indication: u8,
    pub audio_object_type: Option<u8>,
    pub decoder_specific_info: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CttsEntry {
    pub sample_count: u32,
    pub sample_offset: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SampleTables {
    pub stts: Vec<SttsEntry>,
    pub ctts: Vec<CttsEntry>,
    pub stsc: Vec<StscEntry>,
    pub sample_count: u32,
    /// Non-zero when every sample has the same size.
    pub default_sample_size: u32,
    pub sample_sizes: Vec<u32>,
    pub chunk_offsets: Vec<u64>,
    /// 1-based sync sample numbers; `None` means every sample is a sync sample.
    pub sync_samples: Option<Vec<u32>>,
}

// ─── moov ───────────────────────────────────────────────────────────

pub fn parse_moov(payload: &[u8]) -> PlayerResult<ParsedMoov> {
    let mut moov = ParsedMoov::default();
    let mut saw_mvhd = false;

    for child in BoxIter::new(payload) {
        let (ty, body) = child?;
        match ty {
            MVHD => {
                let (timescale, duration) = parse_mvhd(body)?;
                moov.timescale = timescale;
                moov.duration = duration;
                saw_mvhd = true;
            }
            TRAK => {
                if let Some(track) = parse_trak(body)? {
                    moov.tracks.push(track);
                }
            }
            t if t == fourcc(b"mvex") => moov.fragmented = true,
            _ => {}
        }
    }

    if !saw_mvhd {
        return Err(PlayerError::container("moov has no mvhd box"));
    }
    Ok(moov)
}

pub fn parse_mvhd(body: &[u8]) -> PlayerResult<(u32, u64)> {
    let mut cur = Cursor::new(body);
    let (version, _) = read_full_box_header(&mut cur, "mvhd")?;
    let r = || truncated("mvhd");
    if version == 1 {
        cur.read_u64::<BigEndian>().map_err(|_| r())?;
        cur.read_u64::<BigEndian>().map_err(|_| r())?;
        let timescale = cur.read_u32::<BigEndian>().map_err(|_| r())?;
        let duration = cur.read_u64::<BigEndian>().map_err(|_| r())?;
        Ok((timescale, duration))
    } else {
        cur.read_u32::<BigEndian>().map_err(|_| r())?;
        cur.read_u32::<BigEndian>().map_err(|_| r())?;
        let timescale = cur.read_u32::<BigEndian>().map_err(|_| r())?;
        let duration = cur.read_u32::<BigEndian>().map_err(|_| r())?;
        Ok((timescale, normalize_duration32(duration)))
    }
}

/// 0xffffffff in a 32-bit duration means "unknown".
fn normalize_duration32(d: u32) -> u64 {
    if d == u32::MAX { 0 } else { u64::from(d) }
}

fn parse_trak(body: &[u8]) -> PlayerResult<Option<ParsedTrack>> {
    let tkhd = find_child(body, TKHD)?.ok_or_else(|| PlayerError::container("trak has no tkhd"))?;
    let (track_id, display_width, display_height) = parse_tkhd(tkhd)?;

    let media_time_offset = match find_child(body, EDTS)? {
        Some(edts) => match find_child(edts, ELST)? {
            Some(elst) => parse_elst(elst)?,
            None => 0,
        },
        None => 0,
    };

    let Some(mdia) = find_child(body, MDIA)? else {
        return Ok(None);
    };
    let mdhd = find_child(mdia, MDHD)?.ok_or_else(|| PlayerError::container("mdia has no mdhd"))?;
    let (timescale, duration) = parse_mdhd(mdhd)?;
    let handler = match find_child(mdia, HDLR)? {
        Some(hdlr) => parse_hdlr(hdlr)?,
        None => 0,
    };

    let Some(minf) = find_child(mdia, MINF)? else {
        return Ok(None);
    };
    let Some(stbl) = find_child(minf, STBL)? else {
        return Ok(None);
    };

    let (entry, tables) = parse_stbl(stbl)?;

    Ok(Some(ParsedTrack {
        track_id,
        handler,
        timescale,
        duration,
        display_width,
        display_height,
        media_time_offset,
        entry,
        tables,
    }))
}

/// Returns `(track_id, width, height)`; width/height are the integer part of the 16.16 values.
pub fn parse_tkhd(body: &[u8]) -> PlayerResult<(u32, u32, u32)> {
    let mut cur = Cursor::new(body);
    let (version, _) = read_full_box_header(&mut cur, "tkhd")?;
    let r = || truncated("tkhd");
    let track_id = if version == 1 {
        cur.read_u64::<BigEndian>().map_err(|_| r())?;
        cur.read_u64::<BigEndian>().map_err(|_| r())?;
        let id = cur.read_u32::<BigEndian>().map_err(|_| r())?;
        cur.read_u32::<BigEndian>().map_err(|_| r())?;
        cur.read_u64::<BigEndian>().map_err(|_| r())?;
        id
    } else {
        cur.read_u32::<BigEndian>().map_err(|_| r())?;
        cur.read_u32::<BigEndian>().map_err(|_| r())?;
        let id = cur.read_u32::<BigEndian>().map_err(|_| r())?;
        cur.read_u32::<BigEndian>().map_err(|_| r())?;
        cur.read_u32::<BigEndian>().map_err(|_| r())?;
        id
    };
    // reserved(8) layer(2) alternate_group(2) volume(2) reserved(2) matrix(36)
    let skip = cur.position() + 52;
    if skip + 8 > body.len() as u64 {
        return Err(r());
    }
    cur.set_position(skip);
    let width = cur.read_u32::<BigEndian>().map_err(|_| r())? >> 16;
    let height = cur.read_u32::<BigEndian>().map_err(|_| r())? >> 16;
    Ok((track_id, width, height))
}

pub fn parse_mdhd(body: &[u8]) -> PlayerResult<(u32, u64)> {
    // Same leading layout as mvhd.
    parse_mvhd(body).map_err(|_| truncated("mdhd"))
}

pub fn parse_hdlr(body: &[u8]) -> PlayerResult<u32> {
    let mut cur = Cursor::new(body);
    read_full_box_header(&mut cur, "hdlr")?;
    cur.read_u32::<BigEndian>().map_err(|_| truncated("hdlr"))?;
    cur.read_u32::<BigEndian>().map_err(|_| truncated("hdlr"))
}

/// First edit with a real media time; empty edits (`-1`) are skipped.
pub fn parse_elst(body: &[u8]) -> PlayerResult<i64> {
    let mut cur = Cursor::new(body);
    let (version, _) = read_full_box_header(&mut cur, "elst")?;
    let r = || truncated("elst");
    let count = cur.read_u32::<BigEndian>().map_err(|_| r())?;
    let entry = if version == 1 { 20 } else { 12 };
    ensure_entries(body.len(), 8, count, entry, "elst")?;
    for _ in 0..count {
        let media_time = if version == 1 {
            cur.read_u64::<BigEndian>().map_err(|_| r())?;
            cur.read_i64::<BigEndian>().map_err(|_| r())?
        } else {
            cur.read_u32::<BigEndian>().map_err(|_| r())?;
            i64::from(cur.read_i32::<BigEndian>().map_err(|_| r())?)
        };
        cur.read_u32::<BigEndian>().map_err(|_| r())?;
        if media_time >= 0 {
            return Ok(media_time);
        }
    }
    Ok(0)
}

// ─── stbl ───────────────────────────────────────────────────────────

fn parse_stbl(body: &[u8]) -> PlayerResult<(SampleEntry, SampleTables)> {
    let mut entry = None;
    let mut tables = SampleTables::default();

    for child in BoxIter::new(body) {
        let (ty, payload) = child?;
        match ty {
            STSD => entry = Some(parse_stsd(payload)?),
            STTS => tables.stts = parse_stts(payload)?,
            CTTS => tables.ctts = parse_ctts(payload)?,
            STSC => tables.stsc = parse_stsc(payload)?,
            STSZ => {
                let (default_size, count, sizes) = parse_stsz(payload)?;
                tables.default_sample_size = default_size;
                tables.sample_count = count;
                tables.sample_sizes = sizes;
            }
            STCO => tables.chunk_offsets = parse_stco(payload)?,
            CO64 => tables.chunk_offsets = parse_co64(payload)?,
            STSS => tables.sync_samples = Some(parse_stss(payload)?),
            _ => {}
        }
    }

    let entry = entry.ok_or_else(|| PlayerError::container("stbl has no stsd"))?;
    Ok((entry, tables))
}

pub fn parse_stsd(body: &[u8]) -> PlayerResult<SampleEntry> {
    if body.len() < 8 {
        return Err(truncated("stsd"));
    }
    let entries = &body[8..];
    let Some(first) = BoxIter::new(entries).next() else {
        return Err(PlayerError::container("stsd has no sample entry"));
    };
    let (format, payload) = first?;
    match format {
        AVC1 | AVC3 | HVC1 | HEV1 => parse_visual_entry(format, payload).map(SampleEntry::Video),
        MP4A => parse_audio_entry(format, payload).map(SampleEntry::Audio),
        other => Ok(SampleEntry::Other(other)),
    }
}

const VISUAL_SAMPLE_ENTRY_LEN: usize = 78;
const AUDIO_SAMPLE_ENTRY_LEN: usize = 28;

fn parse_visual_entry(format: u32, payload: &[u8]) -> PlayerResult<VideoEntry> {
    if payload.len() < VISUAL_SAMPLE_ENTRY_LEN {
        return Err(truncated("visual sample entry"));
    }
    let width = u16::from_be_bytes([payload[24], payload[25]]);
    let height = u16::from_be_bytes([payload[26], payload[27]]);

    let wanted = match format {
        AVC1 | AVC3 => AVCC,
        _ => HVCC,
    };
    let config = find_child(&payload[VISUAL_SAMPLE_ENTRY_LEN..], wanted)?.map(<[u8]>::to_vec);

    Ok(VideoEntry {
        format,
        width,
        height,
        config,
    })
}

fn parse_audio_entry(format: u32, payload: &[u8]) -> PlayerResult<AudioEntry> {
    if payload.len() < AUDIO_SAMPLE_ENTRY_LEN {
        return Err(truncated("audio sample entry"));
    }
    let version = u16::from_be_bytes([payload[8], payload[9]]);
    let mut channel_count = u16::from_be_bytes([payload[16], payload[17]]);
    let mut sample_rate = u32::from_be_bytes([payload[24], payload[25], payload[26], payload[27]]) >> 16;

    // QuickTime sound sample description versions append extra fields before the children.
    let children_at = match version {
        0 => AUDIO_SAMPLE_ENTRY_LEN,
        1 => AUDIO_SAMPLE_ENTRY_LEN + 16,
        2 => {
            let ext = payload
                .get(AUDIO_SAMPLE_ENTRY_LEN..AUDIO_SAMPLE_ENTRY_LEN + 36)
                .ok_or_else(|| truncated("audio sample entry v2"))?;
            let mut cur = Cursor::new(ext);
            cur.read_u32::<BigEndian>().map_err(|_| truncated("audio sample entry v2"))?;
            let rate = cur.read_f64::<BigEndian>().map_err(|_| truncated("audio sample entry v2"))?;
            let channels = cur.read_u32::<BigEndian>().map_err(|_| truncated("audio sample entry v2"))?;
            sample_rate = rate.round().max(0.0) as u32;
            channel_count = u16::try_from(channels).unwrap_or(u16::MAX);
            AUDIO_SAMPLE_ENTRY_LEN + 36
        }
        v => {
            return Err(PlayerError::container(format!(
                "unsupported audio sample entry version {v}"
            )));
        }
    };

    let esds = match payload.get(children_at..) {
        Some(children) => match find_child(children, ESDS)? {
            Some(esds) => Some(parse_esds(esds)?),
            None => None,
        },
        None => None,
    };

    Ok(AudioEntry {
        format,
        channel_count,
        sample_rate,
        esds,
    })
}

pub fn parse_esds(body: &[u8]) -> PlayerResult<EsdsInfo> {
    if body.len() < 4 {
        return Err(truncated("esds"));
    }
    let data = &body[4..];
    let mut pos = 0usize;

    let (tag, _) = read_descriptor(data, &mut pos)?;
    if tag != 0x03 {
        return Err(PlayerError::container(format!(
            "esds: expected ES_Descriptor (0x03), found 0x{tag:02x}"
        )));
    }
    // ES_ID(2) + flags(1)
    let flags = *data.get(pos + 2).ok_or_else(|| truncated("esds"))?;
    pos += 3;
    if flags & 0x80 != 0 {
        pos += 2;
    }
    if flags & 0x40 != 0 {
        let url_len = *data.get(pos).ok_or_else(|| truncated("esds"))? as usize;
        pos += 1 + url_len;
    }
    if flags & 0x20 != 0 {
        pos += 2;
    }

    let (tag, _) = read_descriptor(data, &mut pos)?;
    if tag != 0x04 {
        return Err(PlayerError::container(format!(
            "esds: expected DecoderConfigDescriptor (0x04), found 0x{tag:02x}"
        )));
    }
    let object_type_indication = *data.get(pos).ok_or_else(|| truncated("esds"))?;
    // objectTypeIndication(1) streamType(1) bufferSizeDB(3) maxBitrate(4) avgBitrate(4)
    pos += 13;

    let mut decoder_specific_info = Vec::new();
    if pos < data.len() {
        let (tag, len) = read_descriptor(data, &mut pos)?;
        if tag == 0x05 {
            decoder_specific_info = data
                .get(pos..pos + len)
                .ok_or_else(|| truncated("esds DecoderSpecificInfo"))?
                .to_vec();
        }
    }

    let audio_object_type = decoder_specific_info.first().map(|b| {
        let aot = b >> 3;
        if aot == 31 {
            // Escape value: the real type follows in the next 6 bits.
            let next = decoder_specific_info.get(1).copied().unwrap_or(0);
            32 + (((b & 0x07) << 3) | (next >> 5))
        } else {
            aot
        }
    });

    Ok(EsdsInfo {
        object_type_indication,
        audio_object_type,
        decoder_specific_info,
    })
}

/// Read a descriptor tag and its variable-length size; leaves `pos` at the descriptor body.
fn read_descriptor(data: &[u8], pos: &mut usize) -> PlayerResult<(u8, usize)> {
    let tag = *data.get(*pos).ok_or_else(|| truncated("esds descriptor"))?;
    *pos += 1;
    let mut len = 0usize;
    for _ in 0..4 {
        let b = *data.get(*pos).ok_or_else(|| truncated("esds descriptor"))?;
        *pos += 1;
        len = (len << 7) | usize::from(b & 0x7f);
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}

pub fn parse_stts(body: &[u8]) -> PlayerResult<Vec<SttsEntry>> {
    let mut cur = Cursor::new(body);
    read_full_box_header(&mut cur, "stts")?;
    let count = cur.read_u32::<BigEndian>().map_err(|_| truncated("stts"))?;
    ensure_entries(body.len(), 8, count, 8, "stts")?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(SttsEntry {
            sample_count: cur.read_u32::<BigEndian>().map_err(|_| truncated("stts"))?,
            sample_delta: cur.read_u32::<BigEndian>().map_err(|_| truncated("stts"))?,
        });
    }
    Ok(out)
}

pub fn parse_ctts(body: &[u8]) -> PlayerResult<Vec<CttsEntry>> {
    let mut cur = Cursor::new(body);
    read_full_box_header(&mut cur, "ctts")?;
    let count = cur.read_u32::<BigEndian>().map_err(|_| truncated("ctts"))?;
    ensure_entries(body.len(), 8, count, 8, "ctts")?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let sample_count = cur.read_u32::<BigEndian>().map_err(|_| truncated("ctts"))?;
        // Version 0 offsets are unsigned on paper, but writers put negative values there too.
        let sample_offset = cur.read_i32::<BigEndian>().map_err(|_| truncated("ctts"))?;
        out.push(CttsEntry {
            sample_count,
            sample_offset,
        });
    }
    Ok(out)
}

pub fn parse_stsc(body: &[u8]) -> PlayerResult<Vec<StscEntry>> {
    let mut cur = Cursor::new(body);
    read_full_box_header(&mut cur, "stsc")?;
    let count = cur.read_u32::<BigEndian>().map_err(|_| truncated("stsc"))?;
    ensure_entries(body.len(), 8, count, 12, "stsc")?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let first_chunk = cur.read_u32::<BigEndian>().map_err(|_| truncated("stsc"))?;
        let samples_per_chunk = cur.read_u32::<BigEndian>().map_err(|_| truncated("stsc"))?;
        cur.read_u32::<BigEndian>().map_err(|_| truncated("stsc"))?;
        out.push(StscEntry {
            first_chunk,
            samples_per_chunk,
        });
    }
    Ok(out)
}

/// Returns `(default_size, sample_count, per_sample_sizes)`.
pub fn parse_stsz(body: &[u8]) -> PlayerResult<(u32, u32, Vec<u32>)> {
    let mut cur = Cursor::new(body);
    read_full_box_header(&mut cur, "stsz")?;
    let default_size = cur.read_u32::<BigEndian>().map_err(|_| truncated("stsz"))?;
    let count = cur.read_u32::<BigEndian>().map_err(|_| truncated("stsz"))?;
    if default_size != 0 {
        return Ok((default_size, count, Vec::new()));
    }
    ensure_entries(body.len(), 12, count, 4, "stsz")?;
    let mut sizes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        sizes.push(cur.read_u32::<BigEndian>().map_err(|_| truncated("stsz"))?);
    }
    Ok((0, count, sizes))
}

pub fn parse_stco(body: &[u8]) -> PlayerResult<Vec<u64>> {
    let mut cur = Cursor::new(body);
    read_full_box_header(&mut cur, "stco")?;
    let count = cur.read_u32::<BigEndian>().map_err(|_| truncated("stco"))?;
    ensure_entries(body.len(), 8, count, 4, "stco")?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(u64::from(
            cur.read_u32::<BigEndian>().map_err(|_| truncated("stco"))?,
        ));
    }
    Ok(out)
}

pub fn parse_co64(body: &[u8]) -> PlayerResult<Vec<u64>> {
    let mut cur = Cursor::new(body);
    read_full_box_header(&mut cur, "co64")?;
    let count = cur.read_u32::<BigEndian>().map_err(|_| truncated("co64"))?;
    ensure_entries(body.len(), 8, count, 8, "co64")?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(cur.read_u64::<BigEndian>().map_err(|_| truncated("co64"))?);
    }
    Ok(out)
}

pub fn parse_stss(body: &[u8]) -> PlayerResult<Vec<u32>> {
    let mut cur = Cursor::new(body);
    read_full_box_header(&mut cur, "stss")?;
    let count = cur.read_u32::<BigEndian>().map_err(|_| truncated("stss"))?;
    ensure_entries(body.len(), 8, count, 4, "stss")?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(cur.read_u32::<BigEndian>().map_err(|_| truncated("stss"))?);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/demux/boxes.rs"]
mod tests;
