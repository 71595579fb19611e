//! JPEG marker segments up to the start of the entropy-coded scan.

use std::collections::BTreeMap;

use log::{debug, trace, warn};

use crate::common::{exif, icc, xmp};
use crate::options::Options;
use crate::traits::{LoadableMetadata, Metadata as BaseMetadata};
use crate::types::{Anomaly, Dimensions, Result};
use crate::utils::{ByteOrder, Cursor};

pub const SOI: u8 = 0xd8;
pub const EOI: u8 = 0xd9;
pub const SOS: u8 = 0xda;
pub const TEM: u8 = 0x01;
pub const APP1: u8 = 0xe1;
pub const APP2: u8 = 0xe2;

pub const ICC_IDENTIFIER: &[u8] = b"ICC_PROFILE\0";

/// Short name and description of a marker, `None` for markers outside of the known set.
pub fn marker_info(marker: u8) -> Option<(&'static str, &'static str)> {
    let info = match marker {
        0xc0 => ("SOF0", "Start Of Frame Huffman - Baseline DCT"),
        0xc1 => ("SOF1", "Start Of Frame Huffman - Extended sequential DCT"),
        0xc2 => ("SOF2", "Start Of Frame Huffman - Progressive DCT"),
        0xc3 => ("SOF3", "Start Of Frame Huffman - Spatial (sequential) lossless"),
        0xc4 => ("DHT", "Define Huffman Table(s)"),
        0xc5 => ("SOF5", "Start Of Frame Huffman - Differential sequential DCT"),
        0xc6 => ("SOF6", "Start Of Frame Huffman - Differential progressive DCT"),
        0xc7 => ("SOF7", "Start Of Frame Huffman - Differential spatial"),
        0xc8 => ("JPG", "Start Of Frame Arithmetic - Reserved for JPEG extensions"),
        0xc9 => ("SOF9", "Start Of Frame Arithmetic - Extended sequential DCT"),
        0xca => ("SOF10", "Start Of Frame Arithmetic - Progressive DCT"),
        0xcb => ("SOF11", "Start Of Frame Arithmetic - Spatial (sequential) lossless"),
        0xcc => ("DAC", "Define Arithmetic coding conditioning(s)"),
        0xcd => ("SOF13", "Start Of Frame Arithmetic - Differential sequential DCT"),
        0xce => ("SOF14", "Start Of Frame Arithmetic - Differential progressive DCT"),
        0xcf => ("SOF15", "Start Of Frame Arithmetic - Differential spatial"),

        0xd0 => ("RST0", "Restart with modulo 8 count 0"),
        0xd1 => ("RST1", "Restart with modulo 8 count 1"),
        0xd2 => ("RST2", "Restart with modulo 8 count 2"),
        0xd3 => ("RST3", "Restart with modulo 8 count 3"),
        0xd4 => ("RST4", "Restart with modulo 8 count 4"),
        0xd5 => ("RST5", "Restart with modulo 8 count 5"),
        0xd6 => ("RST6", "Restart with modulo 8 count 6"),
        0xd7 => ("RST7", "Restart with modulo 8 count 7"),

        0xd8 => ("SOI", "Start of Image"),
        0xd9 => ("EOI", "End of Image"),
        0xda => ("SOS", "Start of Scan"),
        0xdb => ("DQT", "Define quantization Table(s)"),
        0xdc => ("DNL", "Define Number of Lines"),
        0xdd => ("DRI", "Define Restart Interval"),
        0xde => ("DHP", "Define Hierarchical progression"),
        0xdf => ("EXP", "Expand Reference Component(s)"),

        0xe0 => ("APP0", "Application Field 0 - usually JFIF or JFXX"),
        0xe1 => ("APP1", "Application Field 1 - usually EXIF or XMP/RDF"),
        0xe2 => ("APP2", "Application Field 2 - usually ICC profile or Flashpix"),
        0xe3 => ("APP3", "Application Field 3"),
        0xe4 => ("APP4", "Application Field 4"),
        0xe5 => ("APP5", "Application Field 5"),
        0xe6 => ("APP6", "Application Field 6"),
        0xe7 => ("APP7", "Application Field 7"),
        0xe8 => ("APP8", "Application Field 8"),
        0xe9 => ("APP9", "Application Field 9"),
        0xea => ("APP10", "Application Field 10"),
        0xeb => ("APP11", "Application Field 11"),
        0xec => ("APP12", "Application Field 12 - usually picture info"),
        0xed => ("APP13", "Application Field 13 - usually Photoshop IRB / IPTC"),
        0xee => ("APP14", "Application Field 14"),
        0xef => ("APP15", "Application Field 15"),

        0xf0 => ("JPG0", "Reserved for JPEG extensions 0"),
        0xf1 => ("JPG1", "Reserved for JPEG extensions 1"),
        0xf2 => ("JPG2", "Reserved for JPEG extensions 2"),
        0xf3 => ("JPG3", "Reserved for JPEG extensions 3"),
        0xf4 => ("JPG4", "Reserved for JPEG extensions 4"),
        0xf5 => ("JPG5", "Reserved for JPEG extensions 5"),
        0xf6 => ("JPG6", "Reserved for JPEG extensions 6"),
        0xf7 => ("JPG7", "Reserved for JPEG extensions 7"),
        0xf8 => ("JPG8", "Reserved for JPEG extensions 8"),
        0xf9 => ("JPG9", "Reserved for JPEG extensions 9"),
        0xfa => ("JPG10", "Reserved for JPEG extensions 10"),
        0xfb => ("JPG11", "Reserved for JPEG extensions 11"),
        0xfc => ("JPG12", "Reserved for JPEG extensions 12"),
        0xfd => ("JPG13", "Reserved for JPEG extensions 13"),

        0xfe => ("COM", "Comment"),
        0x01 => ("TEM", "For temp private use arith code"),
        0x02 => ("RES", "Reserved"),
        _ => return None
    };
    Some(info)
}

/// Markers which are not followed by a length and payload.
#[inline]
fn is_standalone(marker: u8) -> bool {
    matches!(marker, 0xd0..=0xd7 | SOI | TEM)
}

/// Start-of-frame markers; DHT, JPG and DAC share the range but are not frames.
#[inline]
fn is_frame(marker: u8) -> bool {
    matches!(marker, 0xc0..=0xcf) && !matches!(marker, 0xc4 | 0xc8 | 0xcc)
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CodingProcess {
    DctSequential,
    DctProgressive,
    Lossless
}

impl CodingProcess {
    fn from_marker(marker: u8) -> CodingProcess {
        match marker & 0x03 {
            0 | 1 => CodingProcess::DctSequential,
            2 => CodingProcess::DctProgressive,
            _ => CodingProcess::Lossless
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EntropyCoding {
    Huffman,
    Arithmetic
}

/// Contents of the first start-of-frame segment.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Frame {
    pub marker: u8,
    pub sample_precision: u8,
    pub dimensions: Dimensions,
    pub components: u8,
    pub baseline: bool,
    pub differential: bool,
    pub coding_process: CodingProcess,
    pub entropy_coding: EntropyCoding
}

fn read_frame(marker: u8, data: &[u8]) -> Result<Frame> {
    let mut r = Cursor::new(data);
    let sample_precision = try_if_eof!(r.read_u8(), "when reading sample precision of frame");
    let h = try_if_eof!(r.read_u16(ByteOrder::Big), "when reading frame height");
    let w = try_if_eof!(r.read_u16(ByteOrder::Big), "when reading frame width");
    let components = try_if_eof!(r.read_u8(), "when reading number of components of frame");

    Ok(Frame {
        marker: marker,
        sample_precision: sample_precision,
        dimensions: (w, h).into(),
        components: components,
        baseline: marker == 0xc0,
        differential: matches!(marker, 0xc5..=0xc7 | 0xcd..=0xcf),
        coding_process: CodingProcess::from_marker(marker),
        entropy_coding: if marker < 0xc8 { EntropyCoding::Huffman } else { EntropyCoding::Arithmetic }
    })
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Segment {
    pub marker: u8,
    pub name: Option<&'static str>,
    pub description: Option<&'static str>,
    /// Absolute offset of the payload, right after the two length bytes.
    pub data_start: usize,
    /// Payload without the length bytes.
    pub data: Vec<u8>
}

impl Segment {
    #[inline]
    pub fn len(&self) -> usize { self.data.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }
}

/// Why the marker walk ended.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum End {
    StartOfScan,
    EndOfImage,
    /// Data ended between segments without an EOI marker.
    EndOfData,
    Truncated,
    MalformedMarker,
    SegmentLimit
}

#[derive(Clone, PartialEq, Debug)]
pub struct Metadata {
    /// Segments keyed by the absolute offset of their payload.
    pub segments: BTreeMap<usize, Segment>,
    pub frame: Option<Frame>,
    pub exif: Option<exif::Metadata>,
    pub icc: Option<icc::Metadata>,
    pub xmp: Option<xmp::Metadata>,
    pub end: End,
    pub notes: Vec<Anomaly>
}

impl Metadata {
    /// Segments with the given marker, in file order.
    pub fn segments_with(&self, marker: u8) -> impl Iterator<Item=&Segment> {
        self.segments.values().filter(move |s| s.marker == marker)
    }

    pub fn comments(&self) -> Vec<String> {
        self.segments_with(0xfe)
            .map(|s| String::from_utf8_lossy(&s.data).into_owned())
            .collect()
    }
}

/// One part of an ICC profile split over several APP2 segments.
struct IccPart {
    sequence: u8,
    start: usize,
    data: Vec<u8>
}

struct Walker<'a, 'o> {
    r: Cursor<'a>,
    options: &'o Options,
    md: Metadata,
    icc_parts: Vec<IccPart>
}

impl<'a, 'o> Walker<'a, 'o> {
    fn note(&mut self, note: Anomaly) {
        warn!("{}", note);
        self.md.notes.push(note);
    }

    fn truncated(&mut self, offset: usize, context: &str) -> End {
        self.note(Anomaly::TruncatedContainer { offset: offset, context: context.to_owned().into() });
        End::Truncated
    }

    fn walk(&mut self) -> End {
        loop {
            if let Some(max) = self.options.max_segments {
                if self.md.segments.len() >= max {
                    debug!("segment walk stopped after {} segments", max);
                    return End::SegmentLimit;
                }
            }

            let offset = self.r.position();
            let prefix = match self.r.read_u8() {
                Ok(b) => b,
                Err(_) => {
                    self.note(Anomaly::TruncatedContainer {
                        offset: offset,
                        context: "end of data before EOI marker".into()
                    });
                    return End::EndOfData;
                }
            };
            if prefix != 0xff {
                self.note(Anomaly::MalformedMarkerStream { offset: offset, found: prefix });
                return End::MalformedMarker;
            }

            // any number of 0xff fill bytes may precede the marker
            let marker = loop {
                match self.r.read_u8() {
                    Ok(0xff) => continue,
                    Ok(marker) => break marker,
                    Err(_) => return self.truncated(offset, "end of data inside a marker")
                }
            };

            if marker == EOI {
                trace!("EOI at {}", offset);
                return End::EndOfImage;
            }
            if is_standalone(marker) {
                trace!("standalone marker {:#04x} at {}", marker, offset);
                continue;
            }

            let len = match self.r.read_u16(ByteOrder::Big) {
                Ok(len) => len as usize,
                Err(_) => return self.truncated(offset, "end of data inside a segment length")
            };
            if len < 2 {
                self.note(Anomaly::FormatInvariant {
                    offset: offset + 2,
                    context: format!("segment length {} of marker {:#04x} is less than 2", len, marker).into()
                });
                return End::MalformedMarker;
            }

            let data_start = self.r.position();
            let data = match self.r.read_exact(len - 2) {
                Ok(data) => data,
                Err(_) => {
                    let context = format!(
                        "segment {:#04x} declares {} bytes, {} available", marker, len - 2, self.r.remaining()
                    );
                    return self.truncated(offset, &context);
                }
            };

            let (name, description) = match marker_info(marker) {
                Some((name, description)) => (Some(name), Some(description)),
                None => (None, None)
            };
            debug!("segment {} at {}, {} bytes", name.unwrap_or("?"), data_start, data.len());

            if self.options.decode_payloads {
                self.decode(marker, data, data_start);
            }
            self.md.segments.insert(data_start, Segment {
                marker: marker,
                name: name,
                description: description,
                data_start: data_start,
                data: data.to_vec()
            });

            if marker == SOS {
                return End::StartOfScan;
            }
        }
    }

    fn decode(&mut self, marker: u8, data: &[u8], start: usize) {
        match marker {
            m if is_frame(m) && self.md.frame.is_none() => match read_frame(m, data) {
                Ok(frame) => self.md.frame = Some(frame),
                Err(e) => self.note(Anomaly::from_error(start, e))
            },
            APP1 if data.starts_with(exif::EXIF_IDENTIFIER) =>
                self.md.exif = Some(exif::read_exif(data, start, self.options)),
            APP1 if data.starts_with(xmp::XMP_IDENTIFIER) =>
                self.md.xmp = Some(xmp::read_xmp(data, start)),
            APP2 if data.starts_with(ICC_IDENTIFIER) => {
                // identifier, then sequence number and total count of parts
                let header = ICC_IDENTIFIER.len() + 2;
                if data.len() < header {
                    self.note(Anomaly::TruncatedContainer {
                        offset: start,
                        context: "ICC profile segment is too short".into()
                    });
                    return;
                }
                self.icc_parts.push(IccPart {
                    sequence: data[ICC_IDENTIFIER.len()],
                    start: start + header,
                    data: data[header..].to_vec()
                });
            }
            _ => {}
        }
    }

    fn finish(mut self, end: End) -> Metadata {
        if !self.icc_parts.is_empty() {
            let mut parts = std::mem::take(&mut self.icc_parts);
            parts.sort_by_key(|p| p.sequence);

            // (offset in the profile, absolute offset) of every part
            let mut starts = Vec::with_capacity(parts.len());
            let mut profile = Vec::new();
            for part in parts {
                starts.push((profile.len(), part.start));
                profile.extend_from_slice(&part.data);
            }

            let mut md = icc::read_icc(&profile, 0, self.options);
            for note in &mut md.notes {
                let position = note.offset();
                let (offset, start) = starts.iter().rev()
                    .find(|&&(offset, _)| offset <= position)
                    .map_or((0, 0), |&part| part);
                note.set_offset(start + (position - offset));
            }
            self.md.icc = Some(md);
        }
        self.md.end = end;
        self.md
    }
}

impl LoadableMetadata for Metadata {
    fn load_with_options(buf: &[u8], options: &Options) -> Result<Metadata> {
        let mut r = Cursor::new(buf);
        let soi = try_if_eof!(r.read_array::<2>(), "when reading SOI marker");
        if soi != [0xff, SOI] {
            return Err(invalid_format!("JPEG SOI marker is invalid: {:02x?}", soi));
        }

        let mut walker = Walker {
            r: r,
            options: options,
            md: Metadata {
                segments: BTreeMap::new(),
                frame: None,
                exif: None,
                icc: None,
                xmp: None,
                end: End::EndOfData,
                notes: Vec::new()
            },
            icc_parts: Vec::new()
        };
        let end = walker.walk();
        Ok(walker.finish(end))
    }
}

impl BaseMetadata for Metadata {
    #[inline]
    fn mime_type(&self) -> &'static str { "image/jpeg" }

    #[inline]
    fn dimensions(&self) -> Option<Dimensions> {
        self.frame.as_ref().map(|f| f.dimensions)
    }
}
