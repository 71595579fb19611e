//! Signature-based format detection.

use std::fmt;

use arrayvec::ArrayVec;

/// Formats recognizable from the leading bytes of a file.
///
/// Only `Riff` and `Jpeg` are walked further; the others are identified and reported as is.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Format {
    Riff,
    Jpeg,
    Png,
    Gif,
    Webm,
    Avi,
    Mp3,
    Pdf,
    Docx,
    Xlsx,
    Unknown
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Riff => "RIFF",
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::Webm => "webm",
            Format::Avi => "avi",
            Format::Mp3 => "mp3",
            Format::Pdf => "pdf",
            Format::Docx => "docx",
            Format::Xlsx => "xlsx",
            Format::Unknown => "unknown"
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// RIFF comes first: its container sub-type lives 4 bytes further and is read by the RIFF walker.
const MAGIC_NUMBERS: &[(Format, &[u8])] = &[
    (Format::Riff, b"RIFF"),
    (Format::Jpeg, &[0xff, 0xd8, 0xff]),
    (Format::Png,  &[0x89, 0x50, 0x4e, 0x47]),
    (Format::Gif,  b"GIF8"),
    (Format::Webm, &[0x1a, 0x45, 0xdf, 0xa3]),
    (Format::Avi,  &[0x00, 0x00, 0x00]),
    (Format::Mp3,  &[0x49, 0x44, 0x33, 0x03]),
    (Format::Pdf,  b"%PDF"),
    (Format::Docx, &[0xd0, 0xcf, 0x11, 0xe0]),
    (Format::Xlsx, &[0x50, 0x4b, 0x03, 0x04]),
];

pub const SIGNATURE_LEN: usize = 4;

/// The leading bytes of a file (up to four), as observed during detection.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Signature(ArrayVec<u8, SIGNATURE_LEN>);

impl Signature {
    pub fn from_data(data: &[u8]) -> Signature {
        Signature(data.iter().cloned().take(SIGNATURE_LEN).collect())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    /// Uppercase hexadecimal rendering, e.g. `52494646` for RIFF.
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.as_bytes())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Detects the format of `data` from its first four bytes.
///
/// Returns the longest table entry which is a prefix of the observed signature. The three-byte
/// `00 00 00` entry only matches when the fourth byte is present and non-zero, so runs of zero
/// bytes are reported as `Unknown`. Detection never fails.
pub fn detect(data: &[u8]) -> (Format, Signature) {
    let signature = Signature::from_data(data);
    let observed = signature.as_bytes();

    let format = MAGIC_NUMBERS.iter()
        .filter(|&&(format, magic)| {
            observed.starts_with(magic) && match format {
                Format::Avi => observed.len() == SIGNATURE_LEN && observed[3] != 0,
                _ => true
            }
        })
        .max_by_key(|&&(_, magic)| magic.len())
        .map(|&(format, _)| format)
        .unwrap_or(Format::Unknown);

    (format, signature)
}
