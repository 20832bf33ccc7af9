//! Raw grating animations: encoding to disk and loading for playback.
//!
//! # File Format
//!
//! Raw animation files are a fixed header followed by uncompressed frames:
//!
//! ```text
//! Header (16 bytes, little-endian):
//!   Width: u32
//!   Height: u32
//!   Frame count: u32
//!   Pixel shift per frame: i32
//!
//! Frame data (frame_count * width * height bytes):
//!   One 8-bit intensity per pixel, row-major, no padding
//! ```

mod encoder;
mod format;
mod store;

pub use encoder::{EncodedAnimation, GratingEncoder, GratingRenderer, encode_grating};
pub use format::{AnimationHeader, Frame};
pub use store::{AnimationStore, FrameIterator, LoadedGrating};
