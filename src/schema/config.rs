//! Configuration types for grating generation and display sessions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Framebuffer device opened when no path is configured.
pub const DEFAULT_DEVICE: &str = "/dev/fb0";

fn default_frame_rate() -> f64 {
    60.0
}

fn default_screen_degrees() -> f64 {
    80.0
}

fn default_device() -> PathBuf {
    PathBuf::from(DEFAULT_DEVICE)
}

fn default_double_buffer() -> bool {
    true
}

/// Display or animation geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels in one frame.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True if a `self`-sized image fits inside `other` without clipping.
    #[inline]
    pub fn fits_within(&self, other: Resolution) -> bool {
        self.width <= other.width && self.height <= other.height
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions(*self));
        }
        Ok(())
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Luminance profile across one grating cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Smooth gradient, sine mapped onto 0-255.
    Sine,
    /// Hard-edged bars, 0 or 255.
    #[default]
    Square,
}

/// Parameters of one drifting grating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GratingSpec {
    /// Direction of propagation in radians, counter-clockwise from the x-axis.
    #[serde(default)]
    pub angle: f64,
    /// Cycles per degree of visual angle.
    pub spatial_frequency: f64,
    /// Cycles per second.
    pub temporal_frequency: f64,
    #[serde(default)]
    pub resolution: Resolution,
}

impl GratingSpec {
    /// Horizontal grating (angle 0) at the default resolution.
    pub fn new(spatial_frequency: f64, temporal_frequency: f64) -> Self {
        Self {
            angle: 0.0,
            spatial_frequency,
            temporal_frequency,
            resolution: Resolution::default(),
        }
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<Resolution>) -> Self {
        self.resolution = resolution.into();
        self
    }

    /// Validate grating parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolution.validate()?;
        if !(self.spatial_frequency.is_finite() && self.spatial_frequency > 0.0) {
            return Err(ConfigError::InvalidSpatialFrequency(self.spatial_frequency));
        }
        if !(self.temporal_frequency.is_finite() && self.temporal_frequency > 0.0) {
            return Err(ConfigError::InvalidTemporalFrequency(
                self.temporal_frequency,
            ));
        }
        if !self.angle.is_finite() {
            return Err(ConfigError::InvalidAngle(self.angle));
        }
        Ok(())
    }
}

/// How a grating is baked into frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Intended playback rate in frames per second.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    /// Horizontal visual angle subtended by the screen, in degrees.
    #[serde(default = "default_screen_degrees")]
    pub screen_degrees: f64,
    /// Explicit scale. Overrides `screen_degrees` when set.
    #[serde(default)]
    pub degrees_per_pixel: Option<f64>,
    /// Animation length in seconds. `None` renders one temporal period.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            screen_degrees: default_screen_degrees(),
            degrees_per_pixel: None,
            duration: None,
        }
    }
}

impl EncoderSettings {
    /// Degrees of visual angle covered by one pixel for a screen `width` pixels wide.
    pub fn degrees_per_pixel(&self, width: u32) -> f64 {
        self.degrees_per_pixel
            .unwrap_or(self.screen_degrees / width as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(ConfigError::InvalidFrameRate(self.frame_rate));
        }
        let scale = self.degrees_per_pixel.unwrap_or(self.screen_degrees);
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ConfigError::InvalidScale(scale));
        }
        if let Some(duration) = self.duration
            && !(duration.is_finite() && duration > 0.0)
        {
            return Err(ConfigError::InvalidDuration(duration));
        }
        Ok(())
    }
}

/// Settings for opening a display session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Framebuffer device node.
    #[serde(default = "default_device")]
    pub device: PathBuf,
    /// Mode to switch the framebuffer to for the session.
    #[serde(default)]
    pub resolution: Resolution,
    /// Flip between two pages of a double-height virtual framebuffer.
    #[serde(default = "default_double_buffer")]
    pub double_buffer: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            resolution: Resolution::default(),
            double_buffer: default_double_buffer(),
        }
    }
}

impl DisplayConfig {
    pub fn with_resolution(resolution: impl Into<Resolution>) -> Self {
        Self {
            resolution: resolution.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolution.validate()
    }
}

/// Parameter validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Resolution {0} must have non-zero width and height")]
    InvalidDimensions(Resolution),
    #[error("Spatial frequency must be positive, got {0}")]
    InvalidSpatialFrequency(f64),
    #[error("Temporal frequency must be positive, got {0}")]
    InvalidTemporalFrequency(f64),
    #[error("Angle must be finite, got {0}")]
    InvalidAngle(f64),
    #[error("Frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),
    #[error("Degrees-per-pixel scale must be positive, got {0}")]
    InvalidScale(f64),
    #[error("Duration must be positive, got {0}")]
    InvalidDuration(f64),
    #[error("Drift of {0} pixels per frame does not fit a 32-bit shift")]
    ShiftOutOfRange(f64),
    #[error("{0} frames do not fit a 32-bit frame count")]
    FrameCountOutOfRange(f64),
    #[error("Color channel {channel} must be within 0-255, got {value}")]
    ColorOutOfRange { channel: &'static str, value: i32 },
}
