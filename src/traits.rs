use std::fs;
use std::io::Read;
use std::path::Path;

use crate::options::Options;
use crate::types::{Dimensions, Result};

/// Common accessors implemented by every decoded container record.
pub trait Metadata {
    fn mime_type(&self) -> &'static str;

    fn dimensions(&self) -> Option<Dimensions>;
}

pub trait LoadableMetadata: Sized {
    fn load_with_options(buf: &[u8], options: &Options) -> Result<Self>;

    #[inline]
    fn load(buf: &[u8]) -> Result<Self> {
        LoadableMetadata::load_with_options(buf, &Options::default())
    }

    #[inline]
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let buf = read_file(path.as_ref())?;
        LoadableMetadata::load(&buf)
    }

    #[inline]
    fn load_from_reader<R: ?Sized + Read>(r: &mut R) -> Result<Self> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        LoadableMetadata::load(&buf)
    }
}

/// Reads the whole file, reporting unreadable and empty files as `NotFound`.
pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>> {
    let buf = fs::read(path).map_err(|e| not_found!("{}: {}", path.display(), e))?;
    if buf.is_empty() {
        return Err(not_found!("{}: file is empty", path.display()));
    }
    Ok(buf)
}
