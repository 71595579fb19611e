pub mod webp;
pub mod riff;
pub mod jpeg;
