//! Decoders for the image headers of a WebP file: `VP8 `, `VP8L` and `VP8X` chunks.
//!
//! Each decoder looks only at the first few bytes of its chunk payload. Offsets below are
//! relative to the payload, i.e. they do not include the 8-byte chunk header.

use bitflags::bitflags;
use log::warn;

use crate::common::riff::{ChunkId, RiffChunk};
use crate::types::{Anomaly, Dimensions, Result};
use crate::utils::{ByteOrder, Cursor};

pub const WEBP_CHUNK_TYPE: ChunkId = ChunkId(*b"WEBP");
pub const VP8_CHUNK_ID: ChunkId    = ChunkId(*b"VP8 ");
pub const VP8L_CHUNK_ID: ChunkId   = ChunkId(*b"VP8L");
pub const VP8X_CHUNK_ID: ChunkId   = ChunkId(*b"VP8X");

const VP8_SYNC_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];
const VP8L_SIGNATURE: u8 = 0x2f;

bitflags! {
    /// Feature bits of the `VP8X` header.
    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
    pub struct Features: u8 {
        const ANIMATION = 0x02;
        const XMP = 0x04;
        const EXIF = 0x08;
        const ALPHA = 0x10;
        const ICC = 0x20;
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Compression {
    Lossy,
    Lossless,
    /// Only an extended header was found, e.g. in an animation made of `ANMF` frames.
    Extended
}

impl Compression {
    pub fn name(self) -> &'static str {
        match self {
            Compression::Lossy => "lossy",
            Compression::Lossless => "lossless",
            Compression::Extended => "extended"
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VP8Metadata {
    pub key_frame: bool,
    pub version_number: u8,
    pub show_frame: bool,
    pub first_partition_len: u32,
    pub dimensions: Dimensions,
    pub x_scale: u8,
    pub y_scale: u8,
    pub notes: Vec<Anomaly>
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VP8LMetadata {
    pub dimensions: Dimensions,
    pub alpha_is_used: bool,
    pub version_number: u8,
    pub notes: Vec<Anomaly>
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VP8XMetadata {
    pub features: Features,
    pub canvas: Dimensions,
    pub notes: Vec<Anomaly>
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Header {
    VP8(VP8Metadata),
    VP8L(VP8LMetadata),
    VP8X(VP8XMetadata)
}

/// Image information collected from all header chunks of one WebP file.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Metadata {
    pub vp8: Option<VP8Metadata>,
    pub vp8l: Option<VP8LMetadata>,
    pub vp8x: Option<VP8XMetadata>
}

impl Metadata {
    pub fn insert(&mut self, header: Header) {
        match header {
            Header::VP8(md) => self.vp8 = Some(md),
            Header::VP8L(md) => self.vp8l = Some(md),
            Header::VP8X(md) => self.vp8x = Some(md)
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vp8.is_none() && self.vp8l.is_none() && self.vp8x.is_none()
    }

    pub fn compression(&self) -> Option<Compression> {
        if self.vp8.is_some() {
            Some(Compression::Lossy)
        } else if self.vp8l.is_some() {
            Some(Compression::Lossless)
        } else if self.vp8x.is_some() {
            Some(Compression::Extended)
        } else {
            None
        }
    }

    /// Canvas size from `VP8X` if present, otherwise the bitstream frame size.
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.vp8x.as_ref().map(|md| md.canvas)
            .or_else(|| self.vp8.as_ref().map(|md| md.dimensions))
            .or_else(|| self.vp8l.as_ref().map(|md| md.dimensions))
    }

    pub fn features(&self) -> Features {
        self.vp8x.as_ref().map(|md| md.features).unwrap_or_default()
    }

    /// Format notes of all decoded headers.
    pub fn notes(&self) -> Vec<&Anomaly> {
        let vp8 = self.vp8.iter().flat_map(|md| md.notes.iter());
        let vp8l = self.vp8l.iter().flat_map(|md| md.notes.iter());
        let vp8x = self.vp8x.iter().flat_map(|md| md.notes.iter());
        vp8x.chain(vp8).chain(vp8l).collect()
    }
}

/// Decodes the chunk if it is one of the image header chunks; returns `None` for other chunks.
pub fn read_header(chunk: &RiffChunk) -> Option<Result<Header>> {
    match chunk.chunk_id() {
        VP8_CHUNK_ID => Some(read_vp8(chunk.contents(), chunk.start()).map(Header::VP8)),
        VP8L_CHUNK_ID => Some(read_vp8l(chunk.contents(), chunk.start()).map(Header::VP8L)),
        VP8X_CHUNK_ID => Some(read_vp8x(chunk.contents(), chunk.start()).map(Header::VP8X)),
        _ => None
    }
}

fn note(notes: &mut Vec<Anomaly>, offset: usize, context: String) {
    warn!("{} at offset {}", context, offset);
    notes.push(Anomaly::FormatInvariant { offset: offset, context: context.into() });
}

/// Reads a `VP8 ` (lossy) frame header; `start` is the absolute offset of `data`.
pub fn read_vp8(data: &[u8], start: usize) -> Result<VP8Metadata> {
    let mut r = Cursor::new(data);
    let hdr = try_if_eof!(r.read_array::<3>(), "when reading VP8 frame header");

    // bits of first three bytes:
    //    xxxsvvvf xxxxxxxx xxxxxxxx
    // where
    //    f  --  frame type, 0 is key frame, 1 is interframe
    //    v  --  version number
    //    s  --  show frame flag, 1 is display, 0 is don't display
    //    x  --  size of first data partition in bytes

    let key_frame = hdr[0] & 1 == 0;
    let version_number = (hdr[0] >> 1) & 7;
    let show_frame = (hdr[0] >> 4) & 1 == 1;
    let first_partition_len = ((hdr[0] >> 5) as u32) |
                              ((hdr[1] as u32) << 3) |
                              ((hdr[2] as u32) << 11);

    let mut notes = Vec::new();
    if !key_frame {
        note(&mut notes, start, "VP8 frame is not a key frame".into());
    }

    let hdr = try_if_eof!(r.read_array::<7>(), "when reading VP8 key frame header");
    if hdr[..3] != VP8_SYNC_CODE {
        note(&mut notes, start + 3, format!("VP8 key frame sync code is invalid: {:02x?}", &hdr[..3]));
    }

    // bits of next four bytes:
    //    wwwwwwww xxwwwwww hhhhhhhh yyhhhhhh
    // where
    //    x  --  horizontal scale
    //    w  --  width
    //    y  --  vertical scale
    //    h  --  height

    let width  = ((hdr[4] & 0x3f) as u32) << 8 | hdr[3] as u32;
    let height = ((hdr[6] & 0x3f) as u32) << 8 | hdr[5] as u32;

    Ok(VP8Metadata {
        key_frame: key_frame,
        version_number: version_number,
        show_frame: show_frame,
        first_partition_len: first_partition_len,
        dimensions: (width, height).into(),
        x_scale: hdr[4] >> 6,
        y_scale: hdr[6] >> 6,
        notes: notes
    })
}

/// Reads a `VP8L` (lossless) bitstream header.
pub fn read_vp8l(data: &[u8], start: usize) -> Result<VP8LMetadata> {
    let mut r = Cursor::new(data);
    let signature = try_if_eof!(r.read_u8(), "when reading VP8L signature");

    let mut notes = Vec::new();
    if signature != VP8L_SIGNATURE {
        note(&mut notes, start, format!("VP8L signature is invalid: {:#04x}", signature));
    }

    // 14 bits of width - 1, 14 bits of height - 1, 1 bit of alpha hint, 3 bits of version,
    // packed starting from the least significant bit of a little-endian 32-bit word
    let bits = try_if_eof!(r.read_u32(ByteOrder::Little), "when reading VP8L image size");
    let width = (bits & 0x3fff) + 1;
    let height = ((bits >> 14) & 0x3fff) + 1;
    let alpha_is_used = (bits >> 28) & 1 == 1;
    let version_number = (bits >> 29) as u8;

    if version_number != 0 {
        note(&mut notes, start + 4, format!("VP8L version is not zero: {}", version_number));
    }

    Ok(VP8LMetadata {
        dimensions: (width, height).into(),
        alpha_is_used: alpha_is_used,
        version_number: version_number,
        notes: notes
    })
}

/// Reads a `VP8X` (extended) header.
pub fn read_vp8x(data: &[u8], start: usize) -> Result<VP8XMetadata> {
    let mut r = Cursor::new(data);
    let flags = try_if_eof!(r.read_u8(), "when reading VP8X flags");
    let reserved = try_if_eof!(r.read_array::<3>(), "when reading VP8X reserved bytes");

    let mut notes = Vec::new();
    if flags & !Features::all().bits() != 0 {
        note(&mut notes, start, format!("VP8X reserved flag bits are set: {:#04x}", flags & !Features::all().bits()));
    }
    if reserved != [0; 3] {
        note(&mut notes, start + 1, format!("VP8X reserved bytes are not zero: {:02x?}", reserved));
    }

    let width = try_if_eof!(r.read_u24_le(), "when reading VP8X canvas width") + 1;
    let height = try_if_eof!(r.read_u24_le(), "when reading VP8X canvas height") + 1;

    Ok(VP8XMetadata {
        features: Features::from_bits_truncate(flags),
        canvas: (width, height).into(),
        notes: notes
    })
}
