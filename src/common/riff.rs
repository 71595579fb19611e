use std::fmt;
use std::str;

use log::{debug, trace};

use crate::types::Result;
use crate::utils::{fourcc_to_string, ByteOrder, Cursor};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ChunkId(pub [u8; 4]);

impl ChunkId {
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        str::from_utf8(&self.0).ok()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&fourcc_to_string(&self.0))
    }
}

pub const RIFF_CHUNK_ID: ChunkId = ChunkId(*b"RIFF");

/// Size of a chunk header: four bytes of id and four bytes of little-endian length.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Where a chunk's payload lives inside the walked buffer.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ChunkDescriptor {
    pub id: ChunkId,
    /// Absolute offset of the payload, right after the 8-byte header.
    pub start: usize,
    /// Declared payload length, not including the padding byte.
    pub size: u32
}

impl ChunkDescriptor {
    /// Odd-sized chunks are followed by one padding byte.
    #[inline]
    pub fn padding(&self) -> usize { (self.size % 2) as usize }

    /// Absolute offset of the next chunk header.
    #[inline]
    pub fn end(&self) -> usize { self.start + self.size as usize + self.padding() }
}

#[derive(Copy, Clone, Debug)]
pub struct RiffChunk<'a> {
    descriptor: ChunkDescriptor,
    data: &'a [u8]
}

impl<'a> RiffChunk<'a> {
    #[inline]
    pub fn chunk_id(&self) -> ChunkId { self.descriptor.id }

    #[inline]
    pub fn len(&self) -> u32 { self.descriptor.size }

    #[inline]
    pub fn start(&self) -> usize { self.descriptor.start }

    #[inline]
    pub fn descriptor(&self) -> ChunkDescriptor { self.descriptor }

    /// Chunk payload without the padding byte.
    #[inline]
    pub fn contents(&self) -> &'a [u8] { self.data }
}

pub struct RiffReader<'a> {
    source: Cursor<'a>
}

impl<'a> RiffReader<'a> {
    pub fn new(source: &'a [u8]) -> RiffReader<'a> {
        RiffReader {
            source: Cursor::new(source)
        }
    }

    /// Reads the `RIFF` header (id, total length, form type) and positions the walker on the
    /// first top-level chunk.
    pub fn root(mut self) -> Result<RiffListChunk<'a>> {
        let id = ChunkId(try_if_eof!(self.source.read_array::<4>(), "when reading RIFF header"));
        if id != RIFF_CHUNK_ID {
            return Err(invalid_format!("RIFF file header is invalid: {}", id));
        }

        let len = try_if_eof!(self.source.read_u32(ByteOrder::Little), "when reading RIFF length");
        let chunk_type = ChunkId(try_if_eof!(self.source.read_array::<4>(), "when reading RIFF form type"));
        debug!("RIFF container of type {}, declared length {}", chunk_type, len);

        Ok(RiffListChunk {
            len: len,
            chunk_type: chunk_type,
            chunks: Chunks::new(self.source)
        })
    }
}

pub struct RiffListChunk<'a> {
    len: u32,
    chunk_type: ChunkId,
    chunks: Chunks<'a>
}

impl<'a> RiffListChunk<'a> {
    #[inline]
    pub fn chunk_id(&self) -> ChunkId { RIFF_CHUNK_ID }

    /// Length declared in the header; it covers the form type and all chunks.
    #[inline]
    pub fn len(&self) -> u32 { self.len }

    #[inline]
    pub fn chunk_type(&self) -> ChunkId { self.chunk_type }

    #[inline]
    pub fn into_chunks(self) -> Chunks<'a> { self.chunks }
}

/// Iterator over consecutive chunks starting at the cursor position.
///
/// Stops at the end of data, after `max_chunks` chunks, or after the first error. A chunk is
/// only yielded when its payload and padding lie entirely inside the buffer.
pub struct Chunks<'a> {
    source: Cursor<'a>,
    max_chunks: Option<usize>,
    walked: usize,
    done: bool
}

impl<'a> Chunks<'a> {
    pub fn new(source: Cursor<'a>) -> Chunks<'a> {
        Chunks {
            source: source,
            max_chunks: None,
            walked: 0,
            done: false
        }
    }

    pub fn with_max_chunks(mut self, max_chunks: Option<usize>) -> Chunks<'a> {
        self.max_chunks = max_chunks;
        self
    }

    /// Offset of the next chunk header.
    #[inline]
    pub fn position(&self) -> usize { self.source.position() }

    fn read_chunk(&mut self) -> Result<RiffChunk<'a>> {
        let offset = self.source.position();
        let id = ChunkId(try_if_eof!(
            self.source.read_array::<4>(), "when reading chunk id at offset {}", offset
        ));
        let size = try_if_eof!(
            self.source.read_u32(ByteOrder::Little), "when reading size of chunk {} at offset {}", id, offset
        );

        let descriptor = ChunkDescriptor {
            id: id,
            start: self.source.position(),
            size: size
        };
        let padded = (size as usize).checked_add(descriptor.padding())
            .ok_or_else(|| unexpected_eof!("chunk {} at offset {} is too large", id, offset))?;
        let data = try_if_eof!(
            self.source.read_exact(padded),
            "chunk {} at offset {} declares {} bytes, {} available",
            id, offset, size, self.source.remaining()
        );

        trace!("chunk {} at {}, {} bytes", id, descriptor.start, size);
        Ok(RiffChunk {
            descriptor: descriptor,
            data: &data[..size as usize]
        })
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<RiffChunk<'a>>;

    fn next(&mut self) -> Option<Result<RiffChunk<'a>>> {
        if self.done || self.source.is_eof() {
            return None;
        }
        if let Some(max) = self.max_chunks {
            if self.walked >= max {
                return None;
            }
        }

        let start = self.source.position();
        match self.read_chunk() {
            Ok(chunk) => {
                self.walked += 1;
                Some(Ok(chunk))
            }
            Err(e) => {
                // leave the cursor where the broken chunk started
                self.done = true;
                let _ = self.source.seek(start);
                Some(Err(e))
            }
        }
    }
}
