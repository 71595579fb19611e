//! Metadata extraction from RIFF (WebP, AVI, WAV) and JPEG files.
//!
//! The format of an input is detected from its leading bytes. RIFF and JPEG containers are then
//! walked chunk by chunk or segment by segment, and the payloads the crate knows about (WebP
//! image headers, EXIF, ICC profiles, XMP packets, JPEG frame headers) are decoded. Damaged input
//! never aborts extraction: whatever was read is returned together with `Anomaly` notes.

pub use crate::generic::*;
pub use crate::magic::{Format, Signature};
pub use crate::options::Options;
pub use crate::traits::*;
pub use crate::types::{Anomaly, Dimensions, Error, Result};
pub use crate::utils::{ByteOrder, Cursor};

#[macro_use] mod macros;
mod generic;
mod traits;
mod types;
mod utils;

pub mod common;
pub mod formats;
pub mod magic;
pub mod options;
