//! Rpi Gratings - drifting grating stimuli for Linux framebuffers.
//!
//! Gratings are rendered ahead of time into raw animation files (one byte of
//! intensity per pixel, one frame per display refresh) and later streamed
//! frame by frame into a memory-mapped framebuffer, with per-frame timing
//! reported back to the caller.
//!
//! # Architecture
//!
//! - `schema`: Parameter types, colors and their validation
//! - `compute`: Waveform sampling and drift math
//! - `animation`: Raw animation file format, encoder and loader
//! - `display`: Framebuffer devices, driver, playback and the display session
//!
//! # Example
//!
//! ```rust,no_run
//! use rpi_gratings::{Display, GRAY, encode_grating};
//!
//! fn main() -> rpi_gratings::Result<()> {
//!     // 0.1 cycles/degree drifting at 2 Hz, bars tilted 45 degrees
//!     encode_grating("grating.raw", 0.1, 2.0, std::f64::consts::FRAC_PI_4, (1280, 720))?;
//!
//!     let mut display = Display::open((1280, 720))?;
//!     display.load("grating.raw")?;
//!     let record = display.play(true)?;
//!     println!("{}", record);
//!
//!     display.fill(GRAY)?;
//!     display.close()
//! }
//! ```

pub mod animation;
pub mod compute;
pub mod display;
mod error;
pub mod schema;

// Re-export commonly used types
pub use animation::{AnimationStore, GratingEncoder, encode_grating};
pub use display::{Display, PerformanceRecord};
pub use error::{Error, Result};
pub use schema::{BLACK, Color, GRAY, GratingSpec, Profile, Resolution, WHITE};
