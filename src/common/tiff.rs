//! TIFF structure: header, image file directories (IFDs) and typed entry values.
//!
//! All offsets inside a TIFF structure are relative to the first byte of its header, so the
//! reader works on a slice starting there. `base` is only used to report absolute offsets.

use std::cell::Cell;
use std::collections::HashSet;

use log::{debug, trace, warn};

use crate::types::{Anomaly, Result};
use crate::utils::{slice_at, ByteOrder, Cursor};

pub const TIFF_MAGIC: u16 = 42;
pub const TIFF_HEADER_LEN: usize = 8;
pub const IFD_ENTRY_LEN: usize = 12;

pub const TAG_ORIENTATION: u16 = 0x0112;
pub const TAG_SUB_IFDS: u16 = 0x014a;
pub const TAG_EXIF_IFD: u16 = 0x8769;
pub const TAG_GPS_IFD: u16 = 0x8825;
pub const TAG_INTEROPERABILITY_IFD: u16 = 0xa005;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    SByte,
    Undefined,
    SShort,
    SLong,
    SRational,
    Float,
    Double,
    Ifd,
    Unknown(u16)
}

impl FieldType {
    pub fn from_u16(n: u16) -> FieldType {
        match n {
            1 => FieldType::Byte,
            2 => FieldType::Ascii,
            3 => FieldType::Short,
            4 => FieldType::Long,
            5 => FieldType::Rational,
            6 => FieldType::SByte,
            7 => FieldType::Undefined,
            8 => FieldType::SShort,
            9 => FieldType::SLong,
            10 => FieldType::SRational,
            11 => FieldType::Float,
            12 => FieldType::Double,
            13 => FieldType::Ifd,
            n => FieldType::Unknown(n)
        }
    }

    pub fn code(self) -> u16 {
        match self {
            FieldType::Byte => 1,
            FieldType::Ascii => 2,
            FieldType::Short => 3,
            FieldType::Long => 4,
            FieldType::Rational => 5,
            FieldType::SByte => 6,
            FieldType::Undefined => 7,
            FieldType::SShort => 8,
            FieldType::SLong => 9,
            FieldType::SRational => 10,
            FieldType::Float => 11,
            FieldType::Double => 12,
            FieldType::Ifd => 13,
            FieldType::Unknown(n) => n
        }
    }

    /// Size in bytes of one value of this type, `None` for unknown types.
    pub fn unit_size(self) -> Option<usize> {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => Some(1),
            FieldType::Short | FieldType::SShort => Some(2),
            FieldType::Long | FieldType::SLong | FieldType::Float | FieldType::Ifd => Some(4),
            FieldType::Rational | FieldType::SRational | FieldType::Double => Some(8),
            FieldType::Unknown(_) => None
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Byte(Vec<u8>),
    /// Text up to the first NUL byte.
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<(i32, i32)>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Ifd(Vec<u32>)
}

impl Value {
    fn decode(field_type: FieldType, bytes: &[u8], order: ByteOrder) -> Option<Value> {
        let value = match field_type {
            FieldType::Byte => Value::Byte(bytes.to_vec()),
            FieldType::Ascii => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Value::Ascii(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            FieldType::Short => Value::Short(bytes.chunks_exact(2).map(|b| order.read_u16(b)).collect()),
            FieldType::Long => Value::Long(bytes.chunks_exact(4).map(|b| order.read_u32(b)).collect()),
            FieldType::Rational => Value::Rational(
                bytes.chunks_exact(8).map(|b| (order.read_u32(&b[..4]), order.read_u32(&b[4..]))).collect()
            ),
            FieldType::SByte => Value::SByte(bytes.iter().map(|&b| b as i8).collect()),
            FieldType::Undefined => Value::Undefined(bytes.to_vec()),
            FieldType::SShort => Value::SShort(bytes.chunks_exact(2).map(|b| order.read_i16(b)).collect()),
            FieldType::SLong => Value::SLong(bytes.chunks_exact(4).map(|b| order.read_i32(b)).collect()),
            FieldType::SRational => Value::SRational(
                bytes.chunks_exact(8).map(|b| (order.read_i32(&b[..4]), order.read_i32(&b[4..]))).collect()
            ),
            FieldType::Float => Value::Float(bytes.chunks_exact(4).map(|b| order.read_f32(b)).collect()),
            FieldType::Double => Value::Double(bytes.chunks_exact(8).map(|b| order.read_f64(b)).collect()),
            FieldType::Ifd => Value::Ifd(bytes.chunks_exact(4).map(|b| order.read_u32(b)).collect()),
            FieldType::Unknown(_) => return None
        };
        Some(value)
    }

    /// The first value as an unsigned integer, for integral types.
    pub fn first_u32(&self) -> Option<u32> {
        match *self {
            Value::Byte(ref v) | Value::Undefined(ref v) => v.first().map(|&n| n as u32),
            Value::Short(ref v) => v.first().map(|&n| n as u32),
            Value::Long(ref v) | Value::Ifd(ref v) => v.first().cloned(),
            _ => None
        }
    }

    /// All values as offsets, for types which can hold an IFD pointer.
    pub fn offsets(&self) -> Vec<u32> {
        match *self {
            Value::Long(ref v) | Value::Ifd(ref v) => v.clone(),
            _ => Vec::new()
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: FieldType,
    pub count: u32,
    /// The last four bytes of the entry, decoded in the file's byte order.
    pub value_offset: u32,
    /// Whether the value is stored in `value_offset` itself instead of being pointed to by it.
    pub inline: bool,
    /// Decoded value; `None` for unknown types or out-of-range value offsets.
    pub value: Option<Value>,
    /// Offset of this 12-byte entry relative to the TIFF header.
    pub position: usize
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum IfdKind {
    /// Member of the main chain: 0 is the primary image, 1 usually the thumbnail.
    Image(usize),
    Exif,
    Gps,
    Interoperability,
    /// Any other directory reached from an entry of the given tag.
    SubIfd(u16)
}

impl IfdKind {
    pub fn from_pointer_tag(tag: u16) -> IfdKind {
        match tag {
            TAG_EXIF_IFD => IfdKind::Exif,
            TAG_GPS_IFD => IfdKind::Gps,
            TAG_INTEROPERABILITY_IFD => IfdKind::Interoperability,
            tag => IfdKind::SubIfd(tag)
        }
    }

    pub fn name(self) -> String {
        match self {
            IfdKind::Image(n) => format!("IFD{}", n),
            IfdKind::Exif => "ExifIFD".into(),
            IfdKind::Gps => "GPSIFD".into(),
            IfdKind::Interoperability => "InteropIFD".into(),
            IfdKind::SubIfd(tag) => format!("SubIFD({:#06x})", tag)
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Ifd {
    pub kind: IfdKind,
    pub offset: u32,
    pub entries: Vec<IfdEntry>,
    pub next_ifd_offset: u32
}

impl Ifd {
    /// Offset of the first byte after the entry table and the next-IFD link.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset as usize + 2 + self.entries.len() * IFD_ENTRY_LEN + 4
    }

    #[inline]
    pub fn get(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }
}

/// Whether an entry points to a nested directory which should be walked.
fn is_ifd_pointer(entry: &IfdEntry) -> bool {
    entry.field_type == FieldType::Ifd || match entry.tag {
        TAG_EXIF_IFD | TAG_GPS_IFD | TAG_INTEROPERABILITY_IFD | TAG_SUB_IFDS =>
            entry.field_type == FieldType::Long,
        _ => false
    }
}

/// All directories of a TIFF structure, in the order they were visited.
#[derive(Clone, PartialEq, Debug)]
pub struct Directories {
    pub byte_order: ByteOrder,
    pub ifds: Vec<Ifd>,
    pub notes: Vec<Anomaly>
}

impl Directories {
    pub fn entries(&self) -> impl Iterator<Item=&IfdEntry> {
        self.ifds.iter().flat_map(|ifd| ifd.entries.iter())
    }

    pub fn find(&self, kind: IfdKind) -> Option<&Ifd> {
        self.ifds.iter().find(|ifd| ifd.kind == kind)
    }
}

pub struct TiffReader<'a> {
    source: &'a [u8],
    base: usize,
    byte_order: ByteOrder,
    ifd0_offset: u32,
    /// Bytes of out-of-line values which may still be decoded; starts at the source length.
    budget: Cell<usize>
}

impl<'a> TiffReader<'a> {
    /// Parses the 8-byte TIFF header at the start of `source`.
    pub fn new(source: &'a [u8], base: usize) -> Result<TiffReader<'a>> {
        let mut r = Cursor::new(source);
        let bom = try_if_eof!(r.read_array::<2>(), "while reading byte order mark");

        let byte_order = match &bom {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return Err(invalid_format!("invalid TIFF BOM: {:?}", bom))
        };

        let magic = try_if_eof!(r.read_u16(byte_order), "when reading magic number");
        if magic != TIFF_MAGIC {
            return Err(invalid_format!("invalid TIFF magic number: {}", magic));
        }

        let ifd0_offset = try_if_eof!(r.read_u32(byte_order), "when reading offset of the first IFD");

        Ok(TiffReader {
            source: source,
            base: base,
            byte_order: byte_order,
            ifd0_offset: ifd0_offset,
            budget: Cell::new(source.len())
        })
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder { self.byte_order }

    #[inline]
    pub fn ifd0_offset(&self) -> u32 { self.ifd0_offset }

    /// Iterates over the main IFD chain starting at IFD0.
    pub fn ifds(&self) -> Ifds<'_, 'a> {
        self.chain(self.ifd0_offset, TIFF_HEADER_LEN, None)
    }

    fn chain(&self, offset: u32, min_offset: usize, kind: Option<IfdKind>) -> Ifds<'_, 'a> {
        Ifds {
            reader: self,
            next_ifd_offset: offset,
            min_offset: min_offset,
            kind: kind,
            index: 0,
            notes: Vec::new()
        }
    }

    /// Reads one directory at `offset`. Values which cannot be resolved are recorded in `notes`.
    pub fn read_ifd(&self, offset: u32, kind: IfdKind, notes: &mut Vec<Anomaly>) -> Result<Ifd> {
        let mut r = Cursor::new(self.source);
        try_if_eof!(r.seek(offset as usize), "IFD offset {} is past the end of data", offset);

        let count = try_if_eof!(
            r.read_u16(self.byte_order), "when reading number of entries in IFD at {}", offset
        ) as usize;
        debug!("{} at {} has {} entries", kind.name(), offset, count);

        let mut entries = Vec::with_capacity(count.min(r.remaining() / IFD_ENTRY_LEN));
        for _ in 0..count {
            let position = r.position();
            let raw = try_if_eof!(
                r.read_exact(IFD_ENTRY_LEN), "when reading IFD entry at {}", position
            );
            entries.push(self.read_entry(raw, position, notes));
        }

        let next_ifd_offset = try_if_eof!(
            r.read_u32(self.byte_order), "when reading the next IFD offset"
        );

        Ok(Ifd {
            kind: kind,
            offset: offset,
            entries: entries,
            next_ifd_offset: next_ifd_offset
        })
    }

    fn read_entry(&self, raw: &[u8], position: usize, notes: &mut Vec<Anomaly>) -> IfdEntry {
        let tag = self.byte_order.read_u16(&raw[0..2]);
        let field_type = FieldType::from_u16(self.byte_order.read_u16(&raw[2..4]));
        let count = self.byte_order.read_u32(&raw[4..8]);
        let value_offset = self.byte_order.read_u32(&raw[8..12]);

        let size = field_type.unit_size().and_then(|unit| (count as usize).checked_mul(unit));
        let inline = size.map(|size| size <= 4).unwrap_or(true);

        let value = match size {
            None => None,
            Some(size) if size <= 4 => Value::decode(field_type, &raw[8..8 + size], self.byte_order),
            Some(size) => match slice_at(self.source, value_offset as usize, size) {
                // values sharing the same bytes must not multiply the decoded size
                Some(_) if size > self.budget.get() => {
                    let context = format!(
                        "value of tag {:#06x} ({} bytes) exceeds the {} bytes left for decoding",
                        tag, size, self.budget.get()
                    );
                    warn!("{}", context);
                    notes.push(Anomaly::InvalidOffset {
                        offset: self.base + position,
                        context: context.into()
                    });
                    None
                }
                Some(bytes) => {
                    self.budget.set(self.budget.get() - size);
                    Value::decode(field_type, bytes, self.byte_order)
                }
                None => {
                    let context = format!(
                        "value of tag {:#06x} ({} bytes) at {} lies outside of the TIFF data",
                        tag, size, value_offset
                    );
                    warn!("{}", context);
                    notes.push(Anomaly::InvalidOffset {
                        offset: self.base + position,
                        context: context.into()
                    });
                    None
                }
            }
        };
        trace!("tag {:#06x}, type {}, count {}: {:?}", tag, field_type.code(), count, value);

        IfdEntry {
            tag: tag,
            field_type: field_type,
            count: count,
            value_offset: value_offset,
            inline: inline,
            value: value,
            position: position
        }
    }

    /// Reads the main chain and every nested directory it points to.
    ///
    /// Nested directories are followed up to `max_depth` levels deep, chains up to `max_chain`
    /// links long. A link or pointer must lead past the end of the directory containing it,
    /// and no offset is visited twice; anything else is recorded as an `InvalidOffset` note.
    pub fn read_all(&self, max_depth: usize, max_chain: usize) -> Directories {
        let mut walk = Walk {
            reader: self,
            max_depth: max_depth,
            max_chain: max_chain,
            visited: HashSet::new(),
            ifds: Vec::new(),
            notes: Vec::new()
        };
        walk.chain(self.ifd0_offset, TIFF_HEADER_LEN, None, 0);

        Directories {
            byte_order: self.byte_order,
            ifds: walk.ifds,
            notes: walk.notes
        }
    }

    fn invalid_offset(&self, position: usize, context: String) -> Anomaly {
        warn!("{}", context);
        Anomaly::InvalidOffset { offset: self.base + position, context: context.into() }
    }
}

/// Iterator over a chain of IFDs linked by their next-IFD offsets.
pub struct Ifds<'r, 'a> {
    reader: &'r TiffReader<'a>,
    next_ifd_offset: u32,
    min_offset: usize,
    kind: Option<IfdKind>,
    index: usize,
    notes: Vec<Anomaly>
}

impl<'r, 'a> Ifds<'r, 'a> {
    /// Notes gathered while reading the chain so far.
    pub fn notes(&self) -> &[Anomaly] { &self.notes }

    pub fn into_notes(self) -> Vec<Anomaly> { self.notes }

    fn read_ifd(&mut self) -> Result<Option<Ifd>> {
        if self.next_ifd_offset == 0 {
            return Ok(None);
        }

        let offset = self.next_ifd_offset;
        if (offset as usize) < self.min_offset {
            let note = self.reader.invalid_offset(offset as usize, format!(
                "IFD offset {} points back before {}", offset, self.min_offset
            ));
            self.notes.push(note);
            self.next_ifd_offset = 0;
            return Ok(None);
        }

        // only the first directory of a nested chain has the nested kind
        let kind = match self.kind.take() {
            Some(kind) => kind,
            None => IfdKind::Image(self.index)
        };
        self.next_ifd_offset = 0;
        let ifd = self.reader.read_ifd(offset, kind, &mut self.notes)?;

        self.index += 1;
        self.min_offset = ifd.end();
        self.next_ifd_offset = ifd.next_ifd_offset;
        Ok(Some(ifd))
    }
}

impl<'r, 'a> Iterator for Ifds<'r, 'a> {
    type Item = Result<Ifd>;

    fn next(&mut self) -> Option<Result<Ifd>> {
        match self.read_ifd() {
            Err(e) => Some(Err(e)),
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => None,
        }
    }
}

struct Walk<'r, 'a> {
    reader: &'r TiffReader<'a>,
    max_depth: usize,
    max_chain: usize,
    visited: HashSet<u32>,
    ifds: Vec<Ifd>,
    notes: Vec<Anomaly>
}

impl<'r, 'a> Walk<'r, 'a> {
    fn chain(&mut self, offset: u32, min_offset: usize, kind: Option<IfdKind>, depth: usize) {
        let reader = self.reader;
        let mut ifds = reader.chain(offset, min_offset, kind);
        let mut walked = 0;
        // nested directories are single; only the main chain links to further images
        let limit = if depth == 0 { self.max_chain } else { 1 };

        loop {
            if walked == limit {
                debug!("IFD chain at {} cut after {} directories", offset, walked);
                break;
            }
            if self.visited.contains(&ifds.next_ifd_offset) {
                let position = ifds.next_ifd_offset as usize;
                self.notes.push(self.reader.invalid_offset(
                    position, format!("IFD at {} was already visited", position)
                ));
                break;
            }
            let pending = ifds.next_ifd_offset as usize;
            let ifd = match ifds.next() {
                Some(Ok(ifd)) => ifd,
                Some(Err(e)) => {
                    self.notes.push(Anomaly::from_error(self.reader.base + pending, e));
                    break;
                }
                None => break
            };
            walked += 1;
            self.visited.insert(ifd.offset);

            let pointers: Vec<(IfdEntry, u32)> = ifd.entries.iter()
                .filter(|e| is_ifd_pointer(e))
                .flat_map(|e| {
                    let offsets = e.value.as_ref().map(|v| v.offsets()).unwrap_or_default();
                    offsets.into_iter().map(move |o| (e.clone(), o))
                })
                .collect();
            let end = ifd.end();
            self.ifds.push(ifd);

            for (entry, target) in pointers {
                self.nested(&entry, target, end, depth);
            }
        }

        self.notes.extend(ifds.into_notes());
    }

    fn nested(&mut self, entry: &IfdEntry, target: u32, parent_end: usize, depth: usize) {
        if depth + 1 > self.max_depth {
            self.notes.push(self.reader.invalid_offset(entry.position, format!(
                "tag {:#06x} points to an IFD nested deeper than {} levels", entry.tag, self.max_depth
            )));
            return;
        }
        if (target as usize) < parent_end {
            self.notes.push(self.reader.invalid_offset(entry.position, format!(
                "tag {:#06x} points to {}, inside or before its own directory ending at {}",
                entry.tag, target, parent_end
            )));
            return;
        }
        self.chain(target, parent_end, Some(IfdKind::from_pointer_tag(entry.tag)), depth + 1);
    }
}
