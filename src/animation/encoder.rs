//! Grating encoder: bakes a drifting grating into a raw animation file.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tempfile::NamedTempFile;

use super::format::AnimationHeader;
use crate::compute::{Drift, WaveformSampler, frame_count};
use crate::error::Result;
use crate::schema::{EncoderSettings, GratingSpec, Profile, Resolution};

/// Frames rendered before a completion estimate is logged.
const ESTIMATE_AFTER_FRAMES: u32 = 5;

/// Renders individual frames of one grating.
#[derive(Debug, Clone, Copy)]
pub struct GratingRenderer {
    sampler: WaveformSampler,
    drift: Drift,
    resolution: Resolution,
    frame_count: u32,
}

impl GratingRenderer {
    /// Validate parameters and derive drift and frame count.
    pub fn new(spec: &GratingSpec, profile: Profile, settings: &EncoderSettings) -> Result<Self> {
        let drift = Drift::new(spec, settings)?;
        let frame_count = frame_count(spec, settings)?;
        let sampler = WaveformSampler::new(spec, profile, 1.0 / drift.pixels_per_degree);

        Ok(Self {
            sampler,
            drift,
            resolution: spec.resolution,
            frame_count,
        })
    }

    pub fn drift(&self) -> &Drift {
        &self.drift
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn header(&self) -> AnimationHeader {
        AnimationHeader {
            width: self.resolution.width,
            height: self.resolution.height,
            frame_count: self.frame_count,
            pixel_shift: self.drift.shift,
        }
    }

    /// Render frame `index` into `buf` (`width * height` bytes, row-major).
    pub fn render_into(&self, index: u32, buf: &mut [u8]) {
        let elapsed = self.drift.elapsed(index);
        let width = self.resolution.width as usize;
        for (y, row) in buf.chunks_exact_mut(width).enumerate() {
            self.sampler.fill_row(y as u32, elapsed, row);
        }
    }
}

/// Result of a successful encode.
#[derive(Debug, Clone)]
pub struct EncodedAnimation {
    /// Final location of the animation file.
    pub path: PathBuf,
    /// Header written at the start of the file.
    pub header: AnimationHeader,
    /// Continuous speed before truncation to `header.pixel_shift`.
    pub pixels_per_frame: f64,
    /// Total file size in bytes.
    pub total_bytes: u64,
}

impl std::fmt::Display for EncodedAnimation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} frames at {}x{}, shift {} px/frame ({:.3} requested), {} bytes",
            self.path.display(),
            self.header.frame_count,
            self.header.width,
            self.header.height,
            self.header.pixel_shift,
            self.pixels_per_frame,
            self.total_bytes
        )
    }
}

/// Bakes gratings into raw animation files.
///
/// Usage:
/// ```ignore
/// let encoder = GratingEncoder::new(EncoderSettings::default());
/// let spec = GratingSpec::new(0.5, 3.0).with_angle(1.0);
/// let encoded = encoder.encode(&spec, Profile::Square, "grating.raw")?;
/// println!("{}", encoded);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GratingEncoder {
    settings: EncoderSettings,
}

impl GratingEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Encode a grating to `out`.
    ///
    /// Frames are written to a temporary file next to `out` which is renamed
    /// into place only once complete; on any failure no file is left behind.
    pub fn encode<P: AsRef<Path>>(
        &self,
        spec: &GratingSpec,
        profile: Profile,
        out: P,
    ) -> Result<EncodedAnimation> {
        let out = out.as_ref();
        let renderer = GratingRenderer::new(spec, profile, &self.settings)?;

        let dir = match out.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut writer = BufWriter::new(NamedTempFile::new_in(dir)?);

        log::info!("Drawing grating {}", out.display());
        let header = write_frames(&renderer, &mut writer)?;

        let temp = writer.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        temp.persist(out).map_err(|e| e.error)?;

        let total_bytes = fs::metadata(out)?.len();
        let encoded = EncodedAnimation {
            path: out.to_path_buf(),
            header,
            pixels_per_frame: renderer.drift().pixels_per_frame,
            total_bytes,
        };
        if renderer.drift().is_static() {
            log::warn!(
                "{}: drift of {:.3} px/frame truncates to zero, grating is static",
                out.display(),
                encoded.pixels_per_frame
            );
        }
        log::info!("{}", encoded);
        Ok(encoded)
    }

    /// Encode a grating into any writer.
    pub fn encode_to<W: Write>(
        &self,
        spec: &GratingSpec,
        profile: Profile,
        w: &mut W,
    ) -> Result<AnimationHeader> {
        let renderer = GratingRenderer::new(spec, profile, &self.settings)?;
        Ok(write_frames(&renderer, w)?)
    }
}

fn write_frames<W: Write>(renderer: &GratingRenderer, w: &mut W) -> std::io::Result<AnimationHeader> {
    let header = renderer.header();
    header.write_to(w)?;

    let mut frame = vec![0u8; header.frame_size()];
    let start = Instant::now();
    for index in 0..header.frame_count {
        renderer.render_into(index, &mut frame);
        w.write_all(&frame)?;

        if index + 1 == ESTIMATE_AFTER_FRAMES && header.frame_count > ESTIMATE_AFTER_FRAMES {
            let per_frame = start.elapsed().as_secs_f64() / ESTIMATE_AFTER_FRAMES as f64;
            let remaining = per_frame * (header.frame_count - ESTIMATE_AFTER_FRAMES) as f64;
            log::info!("Expected time to completion: {:.1}s", remaining);
        }
    }
    w.flush()?;
    Ok(header)
}

/// Encode a square-wave grating with default settings.
///
/// `angle` is in radians counter-clockwise from the x-axis. The resolution
/// must not exceed that of any display used to play the file.
pub fn encode_grating<P: AsRef<Path>>(
    filename: P,
    spatial_frequency: f64,
    temporal_frequency: f64,
    angle: f64,
    resolution: impl Into<Resolution>,
) -> Result<EncodedAnimation> {
    let spec = GratingSpec {
        angle,
        spatial_frequency,
        temporal_frequency,
        resolution: resolution.into(),
    };
    GratingEncoder::default().encode(&spec, Profile::default(), filename)
}
