use std::io::Read;
use std::path::Path;

use log::{debug, warn};

use crate::common::{exif, icc, xmp};
use crate::formats::{jpeg, riff};
use crate::magic::{self, Format, Signature};
use crate::options::Options;
use crate::traits::{read_file, LoadableMetadata, Metadata};
use crate::types::{Anomaly, Dimensions, Result};

/// Container-specific part of a [`FileMetadata`].
#[derive(Clone, PartialEq, Debug)]
pub enum GenericMetadata {
    Riff(riff::Metadata),
    Jpeg(jpeg::Metadata),
    /// The format is only identified by its signature, or its container header was unreadable.
    None
}

/// Everything extracted from one input.
#[derive(Clone, PartialEq, Debug)]
pub struct FileMetadata {
    /// Final path component when extracted from a file.
    pub filename: Option<String>,
    /// Path extension when extracted from a file.
    pub extension: Option<String>,
    /// Size of the input in bytes.
    pub size: usize,
    pub format: Format,
    /// The leading bytes the format was detected from.
    pub signature: Signature,
    pub details: GenericMetadata,
    /// Problems which prevented walking the container at all.
    pub notes: Vec<Anomaly>
}

impl FileMetadata {
    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.format == Format::Unknown
    }

    pub fn as_riff(&self) -> Option<&riff::Metadata> {
        match self.details {
            GenericMetadata::Riff(ref md) => Some(md),
            _ => None
        }
    }

    pub fn as_jpeg(&self) -> Option<&jpeg::Metadata> {
        match self.details {
            GenericMetadata::Jpeg(ref md) => Some(md),
            _ => None
        }
    }

    pub fn exif(&self) -> Option<&exif::Metadata> {
        match self.details {
            GenericMetadata::Riff(ref md) => md.exif.as_ref(),
            GenericMetadata::Jpeg(ref md) => md.exif.as_ref(),
            GenericMetadata::None => None
        }
    }

    pub fn icc(&self) -> Option<&icc::Metadata> {
        match self.details {
            GenericMetadata::Riff(ref md) => md.icc.as_ref(),
            GenericMetadata::Jpeg(ref md) => md.icc.as_ref(),
            GenericMetadata::None => None
        }
    }

    pub fn xmp(&self) -> Option<&xmp::Metadata> {
        match self.details {
            GenericMetadata::Riff(ref md) => md.xmp.as_ref(),
            GenericMetadata::Jpeg(ref md) => md.xmp.as_ref(),
            GenericMetadata::None => None
        }
    }

    #[inline]
    pub fn orientation(&self) -> Option<u16> {
        self.exif().and_then(|md| md.orientation)
    }
}

impl Metadata for FileMetadata {
    fn mime_type(&self) -> &'static str {
        match self.details {
            GenericMetadata::Riff(ref md) => md.mime_type(),
            GenericMetadata::Jpeg(ref md) => md.mime_type(),
            GenericMetadata::None => match self.format {
                Format::Riff => "application/octet-stream",
                Format::Jpeg => "image/jpeg",
                Format::Png => "image/png",
                Format::Gif => "image/gif",
                Format::Webm => "video/webm",
                Format::Avi => "video/x-msvideo",
                Format::Mp3 => "audio/mpeg",
                Format::Pdf => "application/pdf",
                Format::Docx => "application/msword",
                Format::Xlsx => "application/zip",
                Format::Unknown => "application/octet-stream"
            }
        }
    }

    fn dimensions(&self) -> Option<Dimensions> {
        match self.details {
            GenericMetadata::Riff(ref md) => md.dimensions(),
            GenericMetadata::Jpeg(ref md) => md.dimensions(),
            GenericMetadata::None => None
        }
    }
}

fn load_details<M: LoadableMetadata>(buf: &[u8], options: &Options,
                                     f: fn(M) -> GenericMetadata,
                                     notes: &mut Vec<Anomaly>) -> GenericMetadata {
    match M::load_with_options(buf, options) {
        Ok(md) => f(md),
        Err(e) => {
            warn!("cannot walk container: {}", e);
            notes.push(Anomaly::from_error(0, e));
            GenericMetadata::None
        }
    }
}

/// Extracts metadata from an in-memory buffer with default options.
///
/// Fails only for an empty buffer; unknown formats and damaged containers still produce a
/// record.
#[inline]
pub fn extract_metadata(buf: &[u8]) -> Result<FileMetadata> {
    extract_metadata_with_options(buf, &Options::default())
}

pub fn extract_metadata_with_options(buf: &[u8], options: &Options) -> Result<FileMetadata> {
    if buf.is_empty() {
        return Err(not_found!("input is empty"));
    }

    let (format, signature) = magic::detect(buf);
    debug!("detected {} from signature {}", format, signature);

    let mut notes = Vec::new();
    let details = match format {
        Format::Riff => load_details::<riff::Metadata>(buf, options, GenericMetadata::Riff, &mut notes),
        Format::Jpeg => load_details::<jpeg::Metadata>(buf, options, GenericMetadata::Jpeg, &mut notes),
        _ => GenericMetadata::None
    };

    Ok(FileMetadata {
        filename: None,
        extension: None,
        size: buf.len(),
        format: format,
        signature: signature,
        details: details,
        notes: notes
    })
}

/// Reads the whole file and extracts its metadata, recording its file name and extension.
#[inline]
pub fn extract_metadata_from_file<P: AsRef<Path>>(path: P) -> Result<FileMetadata> {
    extract_metadata_from_file_with_options(path, &Options::default())
}

pub fn extract_metadata_from_file_with_options<P: AsRef<Path>>(path: P, options: &Options) -> Result<FileMetadata> {
    let path = path.as_ref();
    let buf = read_file(path)?;

    let mut md = extract_metadata_with_options(&buf, options)?;
    md.filename = path.file_name().map(|s| s.to_string_lossy().into_owned());
    md.extension = path.extension().map(|s| s.to_string_lossy().into_owned());
    Ok(md)
}

/// Reads the source to its end and extracts metadata from the collected bytes.
pub fn extract_metadata_from_reader<R: ?Sized + Read>(r: &mut R) -> Result<FileMetadata> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    extract_metadata(&buf)
}

#[cfg(test)]
mod tests {
    use crate::magic::Format;
    use crate::traits::Metadata;
    use crate::types::{Anomaly, Error};

    use super::{extract_metadata, GenericMetadata};

    #[test]
    fn test_empty_input() {
        match extract_metadata(&[]) {
            Err(Error::NotFound(_)) => {}
            other => panic!("unexpected result: {:?}", other)
        }
    }

    #[test]
    fn test_identified_only() {
        let md = extract_metadata(b"%PDF-1.7\n").unwrap();
        assert_eq!(md.format, Format::Pdf);
        assert_eq!(md.details, GenericMetadata::None);
        assert_eq!(md.mime_type(), "application/pdf");
        assert_eq!(md.signature.to_hex(), "25504446");
        assert!(md.notes.is_empty());
    }

    #[test]
    fn test_unreadable_riff_header() {
        let md = extract_metadata(b"RIFF\x10\0").unwrap();
        assert_eq!(md.format, Format::Riff);
        assert_eq!(md.details, GenericMetadata::None);
        assert!(matches!(md.notes[..], [Anomaly::TruncatedContainer { offset: 0, .. }]));
    }
}
