pub mod riff;
pub mod tiff;
pub mod exif;
pub mod icc;
pub mod xmp;
