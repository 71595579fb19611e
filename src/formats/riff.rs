//! Metadata of RIFF containers: WebP images, and AVI/WAV files at the chunk level.

use log::{debug, warn};

use crate::common::riff::{ChunkDescriptor, ChunkId, RiffChunk, RiffListChunk, RiffReader};
use crate::common::{exif, icc, xmp};
use crate::formats::webp;
use crate::options::Options;
use crate::traits::{LoadableMetadata, Metadata as BaseMetadata};
use crate::types::{Anomaly, Dimensions, Result};

pub const EXIF_CHUNK_ID: ChunkId = ChunkId(*b"EXIF");
pub const ICCP_CHUNK_ID: ChunkId = ChunkId(*b"ICCP");
pub const XMP_CHUNK_ID: ChunkId  = ChunkId(*b"XMP ");

pub const AVI_CHUNK_TYPE: ChunkId  = ChunkId(*b"AVI ");
pub const WAVE_CHUNK_TYPE: ChunkId = ChunkId(*b"WAVE");

#[derive(Clone, PartialEq, Debug)]
pub struct Metadata {
    /// Length declared in the RIFF header: the file size minus eight.
    pub filesize: u32,
    /// Container sub-type, e.g. `WEBP` or `AVI `.
    pub form_type: ChunkId,
    /// Every walked top-level chunk, in file order; repeated ids are all kept.
    pub chunks: Vec<ChunkDescriptor>,
    pub webp: webp::Metadata,
    pub exif: Option<exif::Metadata>,
    pub icc: Option<icc::Metadata>,
    pub xmp: Option<xmp::Metadata>,
    /// Problems found while walking chunks or decoding image headers.
    pub notes: Vec<Anomaly>
}

impl Metadata {
    /// The last chunk with the given id.
    pub fn chunk(&self, id: ChunkId) -> Option<&ChunkDescriptor> {
        self.chunks.iter().rev().find(|c| c.id == id)
    }

    #[inline]
    pub fn is_webp(&self) -> bool {
        self.form_type == webp::WEBP_CHUNK_TYPE
    }

    #[inline]
    pub fn compression(&self) -> Option<webp::Compression> {
        self.webp.compression()
    }

    #[inline]
    pub fn features(&self) -> webp::Features {
        self.webp.features()
    }

    fn read(root: RiffListChunk, options: &Options) -> Metadata {
        let mut md = Metadata {
            filesize: root.len(),
            form_type: root.chunk_type(),
            chunks: Vec::new(),
            webp: webp::Metadata::default(),
            exif: None,
            icc: None,
            xmp: None,
            notes: Vec::new()
        };

        let mut chunks = root.into_chunks().with_max_chunks(options.max_chunks);
        while let Some(chunk) = chunks.next() {
            match chunk {
                Ok(chunk) => {
                    debug!("{} chunk {} at {}, {} bytes", md.form_type, chunk.chunk_id(),
                           chunk.start(), chunk.len());
                    md.chunks.push(chunk.descriptor());
                    if options.decode_payloads {
                        md.decode(&chunk, options);
                    }
                }
                Err(e) => {
                    warn!("RIFF walk stopped at {}: {}", chunks.position(), e);
                    md.notes.push(Anomaly::from_error(chunks.position(), e));
                }
            }
        }

        md
    }

    fn decode(&mut self, chunk: &RiffChunk, options: &Options) {
        let (data, start) = (chunk.contents(), chunk.start());
        match chunk.chunk_id() {
            EXIF_CHUNK_ID => self.exif = Some(exif::read_exif(data, start, options)),
            ICCP_CHUNK_ID => self.icc = Some(icc::read_icc(data, start, options)),
            XMP_CHUNK_ID => self.xmp = Some(xmp::read_xmp(data, start)),
            _ => match webp::read_header(chunk) {
                Some(Ok(header)) => self.webp.insert(header),
                Some(Err(e)) => {
                    warn!("cannot decode {} chunk at {}: {}", chunk.chunk_id(), start, e);
                    self.notes.push(Anomaly::from_error(start, e));
                }
                None => {}
            }
        }
    }
}

impl LoadableMetadata for Metadata {
    fn load_with_options(buf: &[u8], options: &Options) -> Result<Metadata> {
        let root = RiffReader::new(buf).root()?;
        Ok(Metadata::read(root, options))
    }
}

impl BaseMetadata for Metadata {
    fn mime_type(&self) -> &'static str {
        match self.form_type {
            webp::WEBP_CHUNK_TYPE => "image/webp",
            AVI_CHUNK_TYPE => "video/x-msvideo",
            WAVE_CHUNK_TYPE => "audio/wav",
            _ => "application/octet-stream"
        }
    }

    #[inline]
    fn dimensions(&self) -> Option<Dimensions> {
        self.webp.dimensions()
    }
}
