//! Framebuffer playback.
//!
//! A [`Display`] takes exclusive ownership of one framebuffer device for the
//! life of the session. Frames of a loaded grating are expanded from 8-bit
//! intensities to the device pixel format through a lookup table and written
//! straight into mapped device memory, flipping between two pages when the
//! device supports a double-height virtual buffer.

mod device;
mod driver;
#[cfg(target_os = "linux")]
mod linux;
mod memory;
mod playback;
mod session;

pub use device::{DeviceError, FramebufferDevice, PixelFormat, VideoMode};
pub use driver::FramebufferDriver;
#[cfg(target_os = "linux")]
pub use linux::LinuxFramebuffer;
pub use memory::{DeviceMonitor, MemoryFramebuffer, MemoryStatus};
pub use playback::{FrameTimer, PerformanceRecord, PlaybackScheduler};
pub use session::{Display, DisplayToken};
