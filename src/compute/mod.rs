//! Compute module - Pure grating math: waveform sampling and drift quantization.

mod drift;
mod waveform;

pub use drift::*;
pub use waveform::*;
