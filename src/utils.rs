use byteorder::{BigEndian, LittleEndian};
use byteorder::ByteOrder as ByteOrderExt;

use crate::types::Result;

/// Byte order of multi-byte integers inside a payload, chosen at runtime (e.g. by a TIFF header).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ByteOrder {
    Little,
    Big
}

impl ByteOrder {
    #[inline]
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            ByteOrder::Little => LittleEndian::read_u16(buf),
            ByteOrder::Big => BigEndian::read_u16(buf)
        }
    }

    #[inline]
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => LittleEndian::read_u32(buf),
            ByteOrder::Big => BigEndian::read_u32(buf)
        }
    }

    #[inline]
    pub fn read_i16(self, buf: &[u8]) -> i16 {
        self.read_u16(buf) as i16
    }

    #[inline]
    pub fn read_i32(self, buf: &[u8]) -> i32 {
        self.read_u32(buf) as i32
    }

    #[inline]
    pub fn read_f32(self, buf: &[u8]) -> f32 {
        match self {
            ByteOrder::Little => LittleEndian::read_f32(buf),
            ByteOrder::Big => BigEndian::read_f32(buf)
        }
    }

    #[inline]
    pub fn read_f64(self, buf: &[u8]) -> f64 {
        match self {
            ByteOrder::Little => LittleEndian::read_f64(buf),
            ByteOrder::Big => BigEndian::read_f64(buf)
        }
    }
}

/// A bounds-checked reader over an immutable byte buffer.
///
/// The position never exceeds the buffer length. Reads either return exactly the
/// requested number of bytes or fail with `UnexpectedEndOfFile` without moving.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize
}

impl<'a> Cursor<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Cursor<'a> {
        Cursor { data: data, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize { self.pos }

    #[inline]
    pub fn len(&self) -> usize { self.data.len() }

    #[inline]
    pub fn remaining(&self) -> usize { self.data.len() - self.pos }

    #[inline]
    pub fn is_eof(&self) -> bool { self.pos == self.data.len() }

    #[inline]
    pub fn data(&self) -> &'a [u8] { self.data }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(unexpected_eof!("seek to {} past end of data ({} bytes)", pos, self.data.len()));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(unexpected_eof!("cannot skip {} bytes, only {} left", n, self.remaining()));
        }
        self.pos += n;
        Ok(())
    }

    /// Returns the next `n` bytes without advancing.
    pub fn peek_exact(&self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(unexpected_eof!());
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self.peek_exact(n)?;
        self.pos += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_exact(N)?);
        Ok(buf)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    #[inline]
    pub fn read_u16(&mut self, order: ByteOrder) -> Result<u16> {
        self.read_exact(2).map(|b| order.read_u16(b))
    }

    #[inline]
    pub fn read_u32(&mut self, order: ByteOrder) -> Result<u32> {
        self.read_exact(4).map(|b| order.read_u32(b))
    }

    /// Reads a 24-bit little-endian unsigned integer.
    #[inline]
    pub fn read_u24_le(&mut self) -> Result<u32> {
        self.read_exact(3).map(|b| LittleEndian::read_u24(b))
    }
}

/// Returns `data[offset..offset + len]` if the whole range lies inside `data`.
#[inline]
pub fn slice_at(data: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    let end = offset.checked_add(len)?;
    data.get(offset..end)
}

/// Renders a 4-byte code like `VP8 ` or `acsp`, escaping non-printable bytes.
pub fn fourcc_to_string(code: &[u8]) -> String {
    let mut s = String::with_capacity(code.len());
    for &b in code {
        if b.is_ascii_graphic() || b == b' ' {
            s.push(b as char);
        } else {
            s.push_str(&format!("\\x{:02x}", b));
        }
    }
    s
}
