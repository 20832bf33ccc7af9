//! Playback scheduler: streams a loaded grating to the framebuffer and times it.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::device::FramebufferDevice;
use super::driver::FramebufferDriver;
use crate::animation::LoadedGrating;
use crate::error::Result;

/// Interval used in place of a zero-length measurement.
const MIN_INTERVAL: f64 = 1e-9;

/// Timing statistics of one playback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Frames shown divided by total playback time.
    pub mean_fps: f64,
    /// Reciprocal of the longest single frame; never above `mean_fps`.
    pub slowest_frame_fps: f64,
    /// Wall-clock start in seconds since the Unix epoch.
    pub start_time: f64,
    pub frame_count: u32,
}

impl std::fmt::Display for PerformanceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, mean {:.2} fps, slowest frame {:.2} fps",
            self.frame_count, self.mean_fps, self.slowest_frame_fps
        )
    }
}

/// Accumulates frame boundaries.
///
/// Each recorded instant closes the current frame and opens the next, so
/// frame durations always sum to the total elapsed time.
#[derive(Debug, Clone, Copy)]
pub struct FrameTimer {
    start: Instant,
    last: Instant,
    slowest: Duration,
    frames: u32,
}

impl FrameTimer {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            last: start,
            slowest: Duration::ZERO,
            frames: 0,
        }
    }

    /// Close a frame at `now`.
    pub fn record(&mut self, now: Instant) {
        let duration = now.saturating_duration_since(self.last);
        self.slowest = self.slowest.max(duration);
        self.last = now;
        self.frames += 1;
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn total(&self) -> Duration {
        self.last.saturating_duration_since(self.start)
    }

    pub fn slowest(&self) -> Duration {
        self.slowest
    }

    pub fn finish(&self, start_time: f64) -> PerformanceRecord {
        if self.frames == 0 {
            return PerformanceRecord {
                mean_fps: 0.0,
                slowest_frame_fps: 0.0,
                start_time,
                frame_count: 0,
            };
        }
        let total = self.total().as_secs_f64().max(MIN_INTERVAL);
        let slowest = self.slowest.as_secs_f64().max(MIN_INTERVAL);
        let mean_fps = self.frames as f64 / total;
        PerformanceRecord {
            mean_fps,
            slowest_frame_fps: (1.0 / slowest).min(mean_fps),
            start_time,
            frame_count: self.frames,
        }
    }
}

/// Writes every frame of a grating in order, as fast as the device allows.
pub struct PlaybackScheduler;

impl PlaybackScheduler {
    /// Play `grating` once through `driver`.
    ///
    /// A failed write stops playback and is returned; the driver remains
    /// usable and releasable.
    pub fn play<D: FramebufferDevice>(
        grating: &LoadedGrating,
        driver: &mut FramebufferDriver<D>,
    ) -> Result<PerformanceRecord> {
        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        let mut timer = FrameTimer::new(Instant::now());

        for frame in grating.frames() {
            driver.write_frame(&frame)?;
            timer.record(Instant::now());
        }

        let record = timer.finish(start_time);
        log::info!("Played {}", record);
        Ok(record)
    }
}
