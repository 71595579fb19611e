//! EXIF blocks: a TIFF structure, optionally preceded by the `Exif\0\0` identifier.
//!
//! JPEG APP1 segments always carry the identifier, WebP `EXIF` chunks usually start directly
//! with the TIFF header but some writers add the identifier there as well.

use log::{debug, warn};

use crate::common::tiff::{Ifd, IfdEntry, IfdKind, TiffReader, Value, TAG_ORIENTATION};
use crate::options::Options;
use crate::types::Anomaly;
use crate::utils::ByteOrder;

pub const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";

#[derive(Clone, PartialEq, Debug)]
pub struct Metadata {
    /// Offset of the TIFF header inside the EXIF block.
    pub tiff_offset: usize,
    /// `None` when no valid TIFF header was found.
    pub byte_order: Option<ByteOrder>,
    pub ifds: Vec<Ifd>,
    /// Value of the orientation tag (0x0112) of the primary image.
    pub orientation: Option<u16>,
    pub notes: Vec<Anomaly>
}

impl Metadata {
    /// First entry with the given tag, searching the primary image directory first.
    pub fn get(&self, tag: u16) -> Option<&IfdEntry> {
        self.ifds.iter().filter_map(|ifd| ifd.get(tag)).next()
    }

    pub fn ascii(&self, tag: u16) -> Option<&str> {
        match self.get(tag).and_then(|e| e.value.as_ref()) {
            Some(&Value::Ascii(ref s)) => Some(s.as_str()),
            _ => None
        }
    }

    pub fn find(&self, kind: IfdKind) -> Option<&Ifd> {
        self.ifds.iter().find(|ifd| ifd.kind == kind)
    }

    pub fn entries(&self) -> impl Iterator<Item=&IfdEntry> {
        self.ifds.iter().flat_map(|ifd| ifd.entries.iter())
    }
}

/// Finds where the TIFF header starts inside an EXIF block.
fn tiff_offset(data: &[u8]) -> Option<usize> {
    if data.starts_with(EXIF_IDENTIFIER) {
        Some(EXIF_IDENTIFIER.len())
    } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        Some(0)
    } else {
        None
    }
}

/// Decodes an EXIF block located at absolute offset `base`. Never fails: problems are noted.
pub fn read_exif(data: &[u8], base: usize, options: &Options) -> Metadata {
    let mut md = Metadata {
        tiff_offset: 0,
        byte_order: None,
        ifds: Vec::new(),
        orientation: None,
        notes: Vec::new()
    };

    md.tiff_offset = match tiff_offset(data) {
        Some(offset) => offset,
        None => {
            warn!("EXIF block at {} has neither an Exif identifier nor a TIFF header", base);
            md.notes.push(Anomaly::FormatInvariant {
                offset: base,
                context: "EXIF block does not start with an Exif identifier or a TIFF header".into()
            });
            return md;
        }
    };

    let tiff_base = base + md.tiff_offset;
    let reader = match TiffReader::new(&data[md.tiff_offset..], tiff_base) {
        Ok(reader) => reader,
        Err(e) => {
            warn!("invalid TIFF header at {}: {}", tiff_base, e);
            md.notes.push(Anomaly::from_error(tiff_base, e));
            return md;
        }
    };

    let dirs = reader.read_all(options.max_ifd_depth, options.max_ifd_chain);
    md.byte_order = Some(dirs.byte_order);
    md.orientation = dirs.find(IfdKind::Image(0))
        .and_then(|ifd| ifd.get(TAG_ORIENTATION))
        .and_then(|e| e.value.as_ref())
        .and_then(|v| v.first_u32())
        .map(|n| n as u16);
    md.ifds = dirs.ifds;
    md.notes = dirs.notes;

    debug!("EXIF at {}: {} directories, orientation {:?}", base, md.ifds.len(), md.orientation);
    md
}

#[cfg(test)]
mod tests {
    use byteorder::{BigEndian, WriteBytesExt};

    use crate::common::tiff::{IfdKind, TAG_GPS_IFD, TAG_ORIENTATION};
    use crate::options::Options;
    use crate::types::Anomaly;
    use crate::utils::ByteOrder;

    use super::read_exif;

    fn entry(data: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: u32) {
        data.write_u16::<BigEndian>(tag).unwrap();
        data.write_u16::<BigEndian>(field_type).unwrap();
        data.write_u32::<BigEndian>(count).unwrap();
        data.write_u32::<BigEndian>(value).unwrap();
    }

    fn exif_with_gps() -> Vec<u8> {
        let mut data = b"Exif\0\0MM\0*".to_vec();
        data.write_u32::<BigEndian>(8).unwrap();
        // IFD0 at 8, two entries, ends at 38
        data.write_u16::<BigEndian>(2).unwrap();
        // a SHORT is left-justified in the value field
        entry(&mut data, TAG_ORIENTATION, 3, 1, 3 << 16);
        entry(&mut data, TAG_GPS_IFD, 4, 1, 38);
        data.write_u32::<BigEndian>(0).unwrap();
        // GPS IFD at 38 with a version byte array
        data.write_u16::<BigEndian>(1).unwrap();
        entry(&mut data, 0x0000, 1, 4, 0x02020000);
        data.write_u32::<BigEndian>(0).unwrap();
        data
    }

    #[test]
    fn test_exif_identifier() {
        let md = read_exif(&exif_with_gps(), 100, &Options::default());
        assert!(md.notes.is_empty(), "{:?}", md.notes);
        assert_eq!(md.tiff_offset, 6);
        assert_eq!(md.byte_order, Some(ByteOrder::Big));
        assert_eq!(md.orientation, Some(3));
        assert_eq!(md.ifds.len(), 2);
        assert!(md.find(IfdKind::Gps).is_some());
        assert_eq!(md.entries().count(), 3);
    }

    #[test]
    fn test_bare_tiff_header() {
        let data = exif_with_gps();
        let md = read_exif(&data[6..], 0, &Options::default());
        assert_eq!(md.tiff_offset, 0);
        assert_eq!(md.orientation, Some(3));
    }

    #[test]
    fn test_not_exif() {
        let md = read_exif(b"JFIF\0\0\0\0", 7, &Options::default());
        assert!(md.ifds.is_empty());
        assert_eq!(md.byte_order, None);
        match md.notes[..] {
            [Anomaly::FormatInvariant { offset: 7, .. }] => {}
            ref other => panic!("unexpected notes: {:?}", other)
        }
    }

    #[test]
    fn test_truncated_tiff_header() {
        let md = read_exif(b"Exif\0\0II*\0", 0, &Options::default());
        assert!(md.ifds.is_empty());
        match md.notes[..] {
            [Anomaly::TruncatedContainer { offset: 6, .. }] => {}
            ref other => panic!("unexpected notes: {:?}", other)
        }
    }

    #[test]
    fn test_nested_ifds_can_be_disabled() {
        let md = read_exif(&exif_with_gps(), 0, &Options::default().max_ifd_depth(0));
        assert_eq!(md.ifds.len(), 1);
        assert_eq!(md.notes.len(), 1);
    }
}
