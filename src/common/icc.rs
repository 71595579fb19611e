//! ICC color profiles: the fixed 128-byte header and the tag table following it.
//!
//! All multi-byte numbers in a profile are big-endian, and tag offsets are relative to the
//! start of the profile.

use std::fmt;

use log::{debug, trace, warn};

use crate::options::Options;
use crate::types::{Anomaly, Result};
use crate::utils::{fourcc_to_string, slice_at, ByteOrder, Cursor};

pub const PROFILE_HEADER_LEN: usize = 128;
pub const TAG_ENTRY_LEN: usize = 12;

const PROFILE_SIGNATURE: Signature = Signature(*b"acsp");
const RGB_COLOR_SPACE: Signature = Signature(*b"RGB ");
const XYZ_CONNECTION_SPACE: Signature = Signature(*b"XYZ ");
const DESCRIPTION_TAG: Signature = Signature(*b"desc");

/// A four-character code used for color spaces, device classes and tag names.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Signature(pub [u8; 4]);

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&fourcc_to_string(&self.0))
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProfileHeader {
    /// Profile size declared in the header.
    pub size: u32,
    pub cmm: Signature,
    /// Major, minor and bug-fix version.
    pub version: (u8, u8, u8),
    pub device_class: Signature,
    /// Color space of the data the profile converts from.
    pub color_space: Signature,
    /// Profile connection space the profile converts to.
    pub connection_space: Signature,
    pub rendering_intent: u32
}

/// A tag table entry. Offsets are relative to the start of the profile; the tag data itself
/// stays in the profile and is looked up through [`Tag::data`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tag {
    pub signature: Signature,
    pub offset: u32,
    pub length: u32
}

impl Tag {
    /// The tag data inside `profile`, `None` when it lies outside of it.
    #[inline]
    pub fn data<'a>(&self, profile: &'a [u8]) -> Option<&'a [u8]> {
        slice_at(profile, self.offset as usize, self.length as usize)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Metadata {
    pub header: Option<ProfileHeader>,
    /// Whether the `acsp` profile signature is present.
    pub valid: bool,
    /// Set for profiles which do not convert from RGB to XYZ.
    pub ignored: bool,
    /// Number of tags declared in the tag table.
    pub declared_tags: u32,
    pub tags: Vec<Tag>,
    /// The profile bytes all tags point into.
    pub profile: Vec<u8>,
    pub notes: Vec<Anomaly>
}

impl Metadata {
    pub fn tag(&self, signature: &[u8; 4]) -> Option<&Tag> {
        self.tags.iter().find(|t| &t.signature.0 == signature)
    }

    /// Data of the first tag with the given signature.
    pub fn tag_data(&self, signature: &[u8; 4]) -> Option<&[u8]> {
        self.tag(signature)?.data(&self.profile)
    }

    /// Profile description from the `desc` tag, for both v2 (`desc`) and v4 (`mluc`) encodings.
    pub fn description(&self) -> Option<String> {
        let data = self.tag_data(&DESCRIPTION_TAG.0)?;
        match data.get(0..4)? {
            b"desc" => {
                let count = ByteOrder::Big.read_u32(data.get(8..12)?) as usize;
                let text = slice_at(data, 12, count).or_else(|| data.get(12..))?;
                let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
                Some(String::from_utf8_lossy(&text[..end]).into_owned())
            }
            b"mluc" => {
                // first record: language, country, length, offset from the tag start
                let records = ByteOrder::Big.read_u32(data.get(8..12)?);
                if records == 0 {
                    return None;
                }
                let len = ByteOrder::Big.read_u32(data.get(20..24)?) as usize;
                let offset = ByteOrder::Big.read_u32(data.get(24..28)?) as usize;
                let text = slice_at(data, offset, len)?;
                let units: Vec<u16> = text.chunks_exact(2).map(|b| ByteOrder::Big.read_u16(b)).collect();
                Some(String::from_utf16_lossy(&units).trim_end_matches('\0').to_owned())
            }
            _ => None
        }
    }
}

fn read_signature(r: &mut Cursor) -> Result<Signature> {
    r.read_array::<4>().map(Signature)
}

fn read_header(r: &mut Cursor) -> Result<(ProfileHeader, Signature)> {
    let size = try_if_eof!(r.read_u32(ByteOrder::Big), "when reading ICC profile size");
    let cmm = try_if_eof!(read_signature(r), "when reading ICC CMM type");
    let version = try_if_eof!(r.read_array::<4>(), "when reading ICC profile version");
    let device_class = try_if_eof!(read_signature(r), "when reading ICC device class");
    let color_space = try_if_eof!(read_signature(r), "when reading ICC color space");
    let connection_space = try_if_eof!(read_signature(r), "when reading ICC connection space");
    try_if_eof!(r.skip(12), "when skipping ICC creation date");
    let magic = try_if_eof!(read_signature(r), "when reading ICC profile signature");
    try_if_eof!(r.skip(24), "when skipping ICC platform, flags, device and attributes");
    let rendering_intent = try_if_eof!(r.read_u32(ByteOrder::Big), "when reading ICC rendering intent");
    try_if_eof!(r.seek(PROFILE_HEADER_LEN), "when skipping the rest of the ICC header");

    let header = ProfileHeader {
        size: size,
        cmm: cmm,
        version: (version[0], version[1] >> 4, version[1] & 0x0f),
        device_class: device_class,
        color_space: color_space,
        connection_space: connection_space,
        rendering_intent: rendering_intent
    };
    Ok((header, magic))
}

/// Decodes an ICC profile located at absolute offset `base`. Never fails: problems are noted.
///
/// A missing `acsp` signature is noted and the rest of the profile is still read as far as
/// possible.
pub fn read_icc(data: &[u8], base: usize, options: &Options) -> Metadata {
    let mut md = Metadata {
        header: None,
        valid: false,
        ignored: false,
        declared_tags: 0,
        tags: Vec::new(),
        profile: data.to_vec(),
        notes: Vec::new()
    };

    let mut r = Cursor::new(data);
    let (header, magic) = match read_header(&mut r) {
        Ok(t) => t,
        Err(e) => {
            warn!("cannot read ICC profile header at {}: {}", base, e);
            md.notes.push(Anomaly::from_error(base, e));
            return md;
        }
    };

    md.valid = magic == PROFILE_SIGNATURE;
    if !md.valid {
        let context = format!("ICC profile signature is invalid: {}", magic);
        warn!("{}", context);
        md.notes.push(Anomaly::FormatInvariant { offset: base + 36, context: context.into() });
    }
    md.ignored = header.color_space != RGB_COLOR_SPACE || header.connection_space != XYZ_CONNECTION_SPACE;
    if header.size as usize > data.len() {
        md.notes.push(Anomaly::TruncatedContainer {
            offset: base,
            context: format!("ICC profile declares {} bytes, {} available", header.size, data.len()).into()
        });
    }
    debug!("ICC profile at {}: {} -> {}, class {}", base, header.color_space,
           header.connection_space, header.device_class);
    md.header = Some(header);

    md.declared_tags = match r.read_u32(ByteOrder::Big) {
        Ok(n) => n,
        Err(e) => {
            md.notes.push(Anomaly::from_error(base + PROFILE_HEADER_LEN, e));
            return md;
        }
    };

    let available = r.remaining() / TAG_ENTRY_LEN;
    let mut count = md.declared_tags as usize;
    if count > available {
        md.notes.push(Anomaly::TruncatedContainer {
            offset: base + r.position(),
            context: format!("ICC tag table declares {} tags, room for {}", count, available).into()
        });
        count = available;
    }
    if let Some(max) = options.max_icc_tags {
        count = count.min(max);
    }

    md.tags.reserve(count);
    for _ in 0..count {
        let position = r.position();
        let (signature, offset, length) = match read_tag_entry(&mut r) {
            Ok(t) => t,
            Err(e) => {
                md.notes.push(Anomaly::from_error(base + position, e));
                break;
            }
        };

        let tag = Tag {
            signature: signature,
            offset: offset,
            length: length
        };
        if tag.data(data).is_none() {
            let context = format!("ICC tag {} ({} bytes at {}) lies outside of the profile", signature, length, offset);
            warn!("{}", context);
            md.notes.push(Anomaly::InvalidOffset { offset: base + position, context: context.into() });
        }
        trace!("ICC tag {} at {}, {} bytes", signature, offset, length);
        md.tags.push(tag);
    }

    md
}

fn read_tag_entry(r: &mut Cursor) -> Result<(Signature, u32, u32)> {
    let signature = read_signature(r)?;
    let offset = r.read_u32(ByteOrder::Big)?;
    let length = r.read_u32(ByteOrder::Big)?;
    Ok((signature, offset, length))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use byteorder::{BigEndian, WriteBytesExt};

    use crate::options::Options;
    use crate::types::Anomaly;

    use super::{read_icc, Signature, PROFILE_HEADER_LEN};

    fn header(color_space: &[u8; 4], pcs: &[u8; 4], magic: &[u8; 4]) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_u32::<BigEndian>(0).unwrap();
        data.write_all(b"lcms").unwrap();
        data.write_all(&[2, 0x10, 0, 0]).unwrap();
        data.write_all(b"mntr").unwrap();
        data.write_all(color_space).unwrap();
        data.write_all(pcs).unwrap();
        data.write_all(&[0; 12]).unwrap();
        data.write_all(magic).unwrap();
        data.write_all(&[0; 24]).unwrap();
        data.write_u32::<BigEndian>(1).unwrap();
        data.resize(PROFILE_HEADER_LEN, 0);
        data
    }

    fn profile_with_description() -> Vec<u8> {
        let mut data = header(b"RGB ", b"XYZ ", b"acsp");
        // two tags: desc at 156, wtpt at 180
        data.write_u32::<BigEndian>(2).unwrap();
        data.write_all(b"desc").unwrap();
        data.write_u32::<BigEndian>(156).unwrap();
        data.write_u32::<BigEndian>(24).unwrap();
        data.write_all(b"wtpt").unwrap();
        data.write_u32::<BigEndian>(180).unwrap();
        data.write_u32::<BigEndian>(20).unwrap();
        assert_eq!(data.len(), 156);

        data.write_all(b"desc\0\0\0\0").unwrap();
        data.write_u32::<BigEndian>(5).unwrap();
        data.write_all(b"sRGB\0\0\0\0\0\0\0\0").unwrap();
        data.write_all(b"XYZ \0\0\0\0").unwrap();
        data.write_all(&[0; 12]).unwrap();

        let len = data.len() as u32;
        (&mut data[0..4]).write_u32::<BigEndian>(len).unwrap();
        data
    }

    #[test]
    fn test_header_and_tags() {
        let md = read_icc(&profile_with_description(), 0, &Options::default());
        assert!(md.notes.is_empty(), "{:?}", md.notes);
        assert!(md.valid);
        assert!(!md.ignored);

        let header = md.header.as_ref().unwrap();
        assert_eq!(header.size, 200);
        assert_eq!(header.version, (2, 1, 0));
        assert_eq!(header.device_class, Signature(*b"mntr"));
        assert_eq!(header.rendering_intent, 1);

        assert_eq!(md.declared_tags, 2);
        assert_eq!(md.tags.len(), 2);
        assert_eq!(md.tag_data(b"wtpt").unwrap().len(), 20);
        assert_eq!(md.description().as_deref(), Some("sRGB"));
    }

    #[test]
    fn test_mluc_description() {
        let mut data = header(b"RGB ", b"XYZ ", b"acsp");
        data.write_u32::<BigEndian>(1).unwrap();
        data.write_all(b"desc").unwrap();
        data.write_u32::<BigEndian>(144).unwrap();
        data.write_u32::<BigEndian>(36).unwrap();

        data.write_all(b"mluc\0\0\0\0").unwrap();
        data.write_u32::<BigEndian>(1).unwrap();
        data.write_u32::<BigEndian>(12).unwrap();
        data.write_all(b"enUS").unwrap();
        data.write_u32::<BigEndian>(8).unwrap();
        data.write_u32::<BigEndian>(28).unwrap();
        for c in "P3 ".encode_utf16().chain(Some(0)) {
            data.write_u16::<BigEndian>(c).unwrap();
        }

        let md = read_icc(&data, 0, &Options::default());
        assert_eq!(md.description().as_deref(), Some("P3 "));
    }

    #[test]
    fn test_missing_profile_signature() {
        let mut data = header(b"RGB ", b"XYZ ", b"xxxx");
        data.write_u32::<BigEndian>(0).unwrap();

        let md = read_icc(&data, 10, &Options::default());
        assert!(!md.valid);
        assert!(md.header.is_some());
        assert!(md.notes.iter().any(|n| *n == Anomaly::FormatInvariant {
            offset: 46,
            context: "ICC profile signature is invalid: xxxx".into()
        }));
    }

    #[test]
    fn test_non_rgb_profile_is_ignored() {
        let mut data = header(b"CMYK", b"Lab ", b"acsp");
        data.write_u32::<BigEndian>(0).unwrap();

        let md = read_icc(&data, 0, &Options::default());
        assert!(md.valid);
        assert!(md.ignored);
    }

    #[test]
    fn test_tag_count_bounded_by_data() {
        let mut data = header(b"RGB ", b"XYZ ", b"acsp");
        data.write_u32::<BigEndian>(1000).unwrap();
        data.write_all(b"wtpt").unwrap();
        data.write_u32::<BigEndian>(0).unwrap();
        data.write_u32::<BigEndian>(4).unwrap();
        data.write_all(b"bkpt").unwrap();
        data.write_u32::<BigEndian>(4096).unwrap();
        data.write_u32::<BigEndian>(20).unwrap();

        let md = read_icc(&data, 0, &Options::default());
        assert_eq!(md.declared_tags, 1000);
        assert_eq!(md.tags.len(), 2);
        assert!(md.tags[0].data(&md.profile).is_some());
        assert!(md.tags[1].data(&md.profile).is_none());
        assert_eq!(md.notes.len(), 2);

        let md = read_icc(&data, 0, &Options::default().max_icc_tags(1));
        assert_eq!(md.tags.len(), 1);
    }

    #[test]
    fn test_truncated_header() {
        let data = header(b"RGB ", b"XYZ ", b"acsp");
        let md = read_icc(&data[..60], 0, &Options::default());
        assert!(md.header.is_none());
        assert_eq!(md.notes.len(), 1);
    }

    #[test]
    fn test_overlapping_tags_share_the_profile() {
        let mut data = header(b"RGB ", b"XYZ ", b"acsp");
        let count = 200u32;
        data.write_u32::<BigEndian>(count).unwrap();
        let len = (data.len() + count as usize * 12) as u32;
        for _ in 0..count {
            // every tag covers the whole profile
            data.write_all(b"blob").unwrap();
            data.write_u32::<BigEndian>(0).unwrap();
            data.write_u32::<BigEndian>(len).unwrap();
        }
        (&mut data[0..4]).write_u32::<BigEndian>(len).unwrap();

        let md = read_icc(&data, 0, &Options::default());
        assert!(md.notes.is_empty(), "{:?}", md.notes);
        assert_eq!(md.tags.len(), 200);
        assert_eq!(md.profile.len(), data.len());
        assert!(md.tags.iter().all(|t| t.data(&md.profile).map(|d| d.len()) == Some(data.len())));
        assert_eq!(md.tag_data(b"blob").map(|d| d.as_ptr()), Some(md.profile.as_ptr()));
    }
}
