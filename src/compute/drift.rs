//! Drift quantization.
//!
//! Frames are rendered so the pattern advances by a whole number of pixels
//! per frame. The continuous speed is truncated toward zero, which means the
//! realized temporal frequency is approximate: low resolutions combined with a
//! low temporal:spatial frequency ratio can truncate to zero and produce a
//! static grating. That is accepted behavior, not an error.

use crate::schema::{ConfigError, EncoderSettings, GratingSpec};

/// Per-frame motion of a grating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drift {
    /// Scale used to convert degrees to pixels.
    pub pixels_per_degree: f64,
    /// Continuous speed before truncation.
    pub pixels_per_frame: f64,
    /// Integer shift actually rendered each frame.
    pub shift: i32,
    /// Intended playback rate.
    pub frame_rate: f64,
}

impl Drift {
    /// Derive the drift for `spec` under `settings`.
    pub fn new(spec: &GratingSpec, settings: &EncoderSettings) -> Result<Self, ConfigError> {
        spec.validate()?;
        settings.validate()?;

        let pixels_per_degree = 1.0 / settings.degrees_per_pixel(spec.resolution.width);
        let degrees_per_second = spec.temporal_frequency / spec.spatial_frequency;
        let pixels_per_frame = degrees_per_second * pixels_per_degree / settings.frame_rate;

        let truncated = pixels_per_frame.trunc();
        if !truncated.is_finite() || truncated > i32::MAX as f64 {
            return Err(ConfigError::ShiftOutOfRange(pixels_per_frame));
        }

        Ok(Self {
            pixels_per_degree,
            pixels_per_frame,
            shift: truncated as i32,
            frame_rate: settings.frame_rate,
        })
    }

    /// True when the shift truncated to zero and every frame is identical.
    pub fn is_static(&self) -> bool {
        self.shift == 0
    }

    /// Time at which `frame` is sampled.
    ///
    /// This is the moment the continuous drift would have covered
    /// `frame * shift` pixels, so consecutive frames differ by exactly
    /// `shift` pixels along the propagation axis.
    pub fn elapsed(&self, frame: u32) -> f64 {
        let pixels_per_second = self.pixels_per_frame * self.frame_rate;
        if self.shift == 0 || pixels_per_second <= 0.0 {
            return 0.0;
        }
        (frame as f64 * self.shift as f64) / pixels_per_second
    }
}

/// Number of frames to render.
///
/// One full temporal period at the playback rate, or `duration` seconds when
/// given. Never fewer than one.
pub fn frame_count(spec: &GratingSpec, settings: &EncoderSettings) -> Result<u32, ConfigError> {
    spec.validate()?;
    settings.validate()?;

    let frames = match settings.duration {
        Some(duration) => (duration * settings.frame_rate).round(),
        None => (settings.frame_rate / spec.temporal_frequency).round(),
    };
    if !frames.is_finite() || frames > u32::MAX as f64 {
        return Err(ConfigError::FrameCountOutOfRange(frames));
    }
    Ok((frames as u32).max(1))
}
