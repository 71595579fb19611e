/// Knobs controlling how far extraction walks and decodes.
///
/// The defaults walk every chunk/segment of the input and decode every recognized payload.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Options {
    /// Maximum number of RIFF chunks to walk; `None` walks to the end of the data.
    pub max_chunks: Option<usize>,
    /// Maximum number of JPEG marker segments to record; `None` walks to SOS/EOI.
    pub max_segments: Option<usize>,
    /// Maximum nesting depth of EXIF sub-IFDs (EXIF, GPS, Interoperability, ...).
    pub max_ifd_depth: usize,
    /// Maximum number of IFDs followed through next-IFD links at one level.
    pub max_ifd_chain: usize,
    /// Maximum number of ICC tag table entries to read; `None` reads the declared count.
    pub max_icc_tags: Option<usize>,
    /// Whether payload decoders (WebP, EXIF, ICC, XMP, JPEG frame header) run at all.
    pub decode_payloads: bool
}

impl Default for Options {
    fn default() -> Options {
        Options {
            max_chunks: None,
            max_segments: None,
            max_ifd_depth: 4,
            max_ifd_chain: 8,
            max_icc_tags: None,
            decode_payloads: true
        }
    }
}

impl Options {
    #[inline]
    pub fn new() -> Options { Options::default() }

    pub fn max_chunks(mut self, n: usize) -> Options {
        self.max_chunks = Some(n);
        self
    }

    pub fn max_segments(mut self, n: usize) -> Options {
        self.max_segments = Some(n);
        self
    }

    pub fn max_ifd_depth(mut self, n: usize) -> Options {
        self.max_ifd_depth = n;
        self
    }

    pub fn max_ifd_chain(mut self, n: usize) -> Options {
        self.max_ifd_chain = n;
        self
    }

    pub fn max_icc_tags(mut self, n: usize) -> Options {
        self.max_icc_tags = Some(n);
        self
    }

    pub fn decode_payloads(mut self, yes: bool) -> Options {
        self.decode_payloads = yes;
        self
    }
}
