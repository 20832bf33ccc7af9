//! Waveform sampling for drifting gratings.
//!
//! A grating's luminance at pixel (x, y) and time t depends only on its phase:
//! phase = 2π * (spatial_frequency * position - temporal_frequency * t),
//! where `position` is the pixel's signed distance along the propagation axis
//! in degrees of visual angle.

use std::f64::consts::TAU;

use crate::schema::{GratingSpec, Profile};

/// Map a phase (radians) to an 8-bit intensity.
///
/// - `Sine`: round(127.5 * (1 + sin(phase))), clamped to 0-255
/// - `Square`: 255 where sin(phase) >= 0, else 0
#[inline]
pub fn intensity(profile: Profile, phase: f64) -> u8 {
    let s = phase.sin();
    match profile {
        Profile::Sine => (127.5 * (1.0 + s)).round().clamp(0.0, 255.0) as u8,
        Profile::Square => {
            if s >= 0.0 {
                255
            } else {
                0
            }
        }
    }
}

/// Pure luminance sampler for one grating.
#[derive(Debug, Clone, Copy)]
pub struct WaveformSampler {
    profile: Profile,
    cos_angle: f64,
    sin_angle: f64,
    spatial_frequency: f64,
    temporal_frequency: f64,
    degrees_per_pixel: f64,
}

impl WaveformSampler {
    /// Create a sampler.
    ///
    /// # Arguments
    /// * `spec` - Grating parameters (angle and frequencies are used)
    /// * `profile` - Luminance profile
    /// * `degrees_per_pixel` - Visual angle covered by one pixel
    pub fn new(spec: &GratingSpec, profile: Profile, degrees_per_pixel: f64) -> Self {
        let (sin_angle, cos_angle) = spec.angle.sin_cos();
        Self {
            profile,
            cos_angle,
            sin_angle,
            spatial_frequency: spec.spatial_frequency,
            temporal_frequency: spec.temporal_frequency,
            degrees_per_pixel,
        }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Signed distance of (x, y) along the propagation axis, in degrees.
    ///
    /// Rows grow downward on screen, so the y term is negated to keep
    /// angles counter-clockwise as seen by the viewer.
    #[inline]
    pub fn position(&self, x: f64, y: f64) -> f64 {
        (x * self.cos_angle - y * self.sin_angle) * self.degrees_per_pixel
    }

    /// Phase in radians at pixel (x, y) after `elapsed` seconds.
    #[inline]
    pub fn phase(&self, x: f64, y: f64, elapsed: f64) -> f64 {
        TAU * (self.spatial_frequency * self.position(x, y) - self.temporal_frequency * elapsed)
    }

    /// Intensity at pixel (x, y) after `elapsed` seconds.
    #[inline]
    pub fn sample(&self, x: f64, y: f64, elapsed: f64) -> u8 {
        intensity(self.profile, self.phase(x, y, elapsed))
    }

    /// Fill one row of intensities, `out[x]` for x in `0..out.len()`.
    pub fn fill_row(&self, y: u32, elapsed: f64, out: &mut [u8]) {
        let y = y as f64;
        for (x, v) in out.iter_mut().enumerate() {
            *v = self.sample(x as f64, y, elapsed);
        }
    }
}
