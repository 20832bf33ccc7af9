//! Display session: the public handle for loading and playing gratings.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::device::FramebufferDevice;
use super::driver::FramebufferDriver;
#[cfg(target_os = "linux")]
use super::linux::LinuxFramebuffer;
use super::playback::{PerformanceRecord, PlaybackScheduler};
use crate::animation::{AnimationStore, LoadedGrating};
use crate::error::{Error, Result};
use crate::schema::{Color, DisplayConfig, Resolution};

static DISPLAY_IN_USE: AtomicBool = AtomicBool::new(false);

/// Proof that the caller is the only open display in this process.
///
/// Released when dropped.
#[derive(Debug)]
pub struct DisplayToken {
    _private: (),
}

impl DisplayToken {
    /// Claim the display, failing with [`Error::DisplayInUse`] if another
    /// token is alive.
    pub fn acquire() -> Result<Self> {
        DISPLAY_IN_USE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self { _private: () })
            .map_err(|_| Error::DisplayInUse)
    }
}

impl Drop for DisplayToken {
    fn drop(&mut self) {
        DISPLAY_IN_USE.store(false, Ordering::Release);
    }
}

/// Serializes tests that take the process-wide display token.
#[cfg(test)]
pub(crate) fn exclusive() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _ = env_logger::builder().is_test(true).try_init();
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// An open display holding at most one loaded grating.
///
/// Usage:
/// ```ignore
/// let mut display = Display::open((1280, 720))?;
/// encode_grating("grating.raw", 0.1, 2.0, 0.0, (1280, 720))?;
/// display.load("grating.raw")?;
/// let record = display.play(true)?;
/// display.fill(GRAY)?;
/// display.close()?;
/// ```
#[derive(Debug)]
pub struct Display<D: FramebufferDevice> {
    driver: FramebufferDriver<D>,
    loaded: Option<LoadedGrating>,
}

#[cfg(target_os = "linux")]
impl Display<LinuxFramebuffer> {
    /// Open the default framebuffer device at `resolution`.
    pub fn open(resolution: impl Into<Resolution>) -> Result<Self> {
        Self::open_with_config(&DisplayConfig::with_resolution(resolution))
    }

    pub fn open_with_config(config: &DisplayConfig) -> Result<Self> {
        config.validate()?;
        let token = DisplayToken::acquire()?;
        let device = LinuxFramebuffer::open(&config.device)?;
        Self::start(token, device, config)
    }
}

impl<D: FramebufferDevice> Display<D> {
    /// Open a session on an already constructed device.
    pub fn with_device(device: D, config: &DisplayConfig) -> Result<Self> {
        config.validate()?;
        let token = DisplayToken::acquire()?;
        Self::start(token, device, config)
    }

    fn start(token: DisplayToken, device: D, config: &DisplayConfig) -> Result<Self> {
        let driver =
            FramebufferDriver::open(token, device, config.resolution, config.double_buffer)?;
        log::info!("Display open at {}", driver.resolution());
        Ok(Self {
            driver,
            loaded: None,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.driver.resolution()
    }

    /// The loaded grating, if any.
    pub fn loaded(&self) -> Option<&LoadedGrating> {
        self.loaded.as_ref()
    }

    pub fn device(&self) -> &D {
        self.driver.device()
    }

    pub fn driver(&self) -> &FramebufferDriver<D> {
        &self.driver
    }

    /// Load an animation file for playback.
    ///
    /// On failure the session is left as it was.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<&LoadedGrating> {
        if self.loaded.is_some() {
            return Err(Error::AlreadyLoaded);
        }
        let grating = AnimationStore::load(path, self.resolution())?;
        Ok(self.loaded.insert(grating))
    }

    /// Drop the loaded grating.
    pub fn unload(&mut self) -> Result<()> {
        self.loaded.take().map(drop).ok_or(Error::NotLoaded)
    }

    /// Play the loaded grating once; with `cleanup` it is unloaded afterwards.
    pub fn play(&mut self, cleanup: bool) -> Result<PerformanceRecord> {
        let grating = self.loaded.as_ref().ok_or(Error::NotLoaded)?;
        let record = PlaybackScheduler::play(grating, &mut self.driver)?;
        if cleanup {
            self.loaded = None;
        }
        Ok(record)
    }

    /// Fill the screen with a solid color.
    pub fn fill(&mut self, color: impl Into<Color>) -> Result<()> {
        let rgb = color.into().to_rgb8()?;
        self.driver.write_solid(rgb)?;
        Ok(())
    }

    /// Restore the device and end the session.
    pub fn close(self) -> Result<()> {
        let Self { driver, loaded } = self;
        drop(loaded);
        let resolution = driver.resolution();
        driver.release()?;
        log::info!("Display at {} closed", resolution);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::encode_grating;
    use crate::display::{DeviceError, MemoryFramebuffer, PixelFormat};
    use crate::schema::{ConfigError, GRAY, WHITE};
    use std::time::{SystemTime, UNIX_EPOCH};
    use tempfile::tempdir;

    fn memory_display(resolution: Resolution) -> Display<MemoryFramebuffer> {
        Display::with_device(
            MemoryFramebuffer::new(resolution, 16).unwrap(),
            &DisplayConfig::with_resolution(resolution),
        )
        .unwrap()
    }

    #[test]
    fn test_full_session() {
        let _guard = exclusive();
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.raw");

        let mut display = memory_display(Resolution::new(1280, 720));
        encode_grating(&path, 1.0, 2.0, 0.0, (1280, 720)).unwrap();
        display.load(&path).unwrap();

        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        let record = display.play(true).unwrap();
        let after = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();

        assert!(record.mean_fps > 0.0);
        assert!(record.slowest_frame_fps <= record.mean_fps);
        assert!(record.start_time >= before && record.start_time <= after);
        assert_eq!(record.frame_count, 30);
        assert!(display.loaded().is_none());
        assert!(matches!(display.play(true), Err(Error::NotLoaded)));

        display.fill(GRAY).unwrap();
        display.close().unwrap();
    }

    #[test]
    fn test_play_without_cleanup_keeps_grating() {
        let _guard = exclusive();
        let dir = tempdir().unwrap();
        let path = dir.path().join("keep.raw");
        encode_grating(&path, 1.0, 6.0, 0.0, (32, 16)).unwrap();

        let mut display = memory_display(Resolution::new(32, 16));
        display.load(&path).unwrap();
        display.play(false).unwrap();
        assert!(display.loaded().is_some());
        display.play(false).unwrap();

        assert!(matches!(display.load(&path), Err(Error::AlreadyLoaded)));
        display.unload().unwrap();
        assert!(matches!(display.unload(), Err(Error::NotLoaded)));
        display.load(&path).unwrap();
    }

    #[test]
    fn test_fill_rejects_out_of_range_without_writing() {
        let _guard = exclusive();
        let mut display = memory_display(Resolution::new(8, 4));

        for color in [Color::new(256, 0, 0), Color::new(0, -1, 0), Color::new(0, 0, 300)] {
            let err = display.fill(color).unwrap_err();
            assert!(matches!(
                err,
                Error::InvalidParameter(ConfigError::ColorOutOfRange { .. })
            ));
        }
        assert!(display.device().bytes().iter().all(|&b| b == 0));

        display.fill(WHITE).unwrap();
        let white = PixelFormat::Rgb565.encode([255, 255, 255]);
        assert_eq!(display.device().pixel(7, 3), &white[..2]);
    }

    #[test]
    fn test_oversized_load_leaves_session_unchanged() {
        let _guard = exclusive();
        let dir = tempdir().unwrap();
        let big = dir.path().join("big.raw");
        let fits = dir.path().join("fits.raw");
        encode_grating(&big, 1.0, 6.0, 0.0, (64, 32)).unwrap();
        encode_grating(&fits, 1.0, 6.0, 0.0, (16, 16)).unwrap();

        let mut display = memory_display(Resolution::new(32, 16));
        let err = display.load(&big).unwrap_err();
        assert!(matches!(err, Error::GeometryMismatch { .. }));
        assert!(display.loaded().is_none());

        let grating = display.load(&fits).unwrap();
        assert_eq!(grating.resolution(), Resolution::new(16, 16));
        assert_eq!(display.play(true).unwrap().frame_count, 10);
    }

    #[test]
    fn test_play_without_load() {
        let _guard = exclusive();
        let mut display = memory_display(Resolution::new(8, 4));
        assert!(matches!(display.play(false), Err(Error::NotLoaded)));
    }

    #[test]
    fn test_single_session() {
        let _guard = exclusive();
        let resolution = Resolution::new(8, 4);
        let first = memory_display(resolution);

        let second = Display::with_device(
            MemoryFramebuffer::new(resolution, 16).unwrap(),
            &DisplayConfig::with_resolution(resolution),
        );
        assert!(matches!(second, Err(Error::DisplayInUse)));

        first.close().unwrap();
        let third = memory_display(resolution);
        drop(third);
        memory_display(resolution).close().unwrap();
    }

    #[test]
    fn test_close_restores_device() {
        let _guard = exclusive();
        let fb = MemoryFramebuffer::new(Resolution::new(64, 32), 32).unwrap();
        let monitor = fb.monitor();
        let boot = monitor.status().mode;

        let display =
            Display::with_device(fb, &DisplayConfig::with_resolution((16, 8))).unwrap();
        assert_eq!(monitor.status().mode.resolution(), Resolution::new(16, 8));
        assert!(!monitor.status().cursor_visible);
        display.close().unwrap();

        let status = monitor.status();
        assert_eq!(status.mode, boot);
        assert!(!status.mapped);
        assert!(status.cursor_visible);
    }

    #[test]
    fn test_unaddressable_resolution_is_an_error() {
        let _guard = exclusive();
        let fb = MemoryFramebuffer::new(Resolution::new(8, 4), 16).unwrap();
        let monitor = fb.monitor();
        let boot = monitor.status().mode;

        let err =
            Display::with_device(fb, &DisplayConfig::with_resolution((1 << 31, 1))).unwrap_err();
        assert!(matches!(
            err,
            Error::Device(DeviceError::ModeTooLarge { .. })
        ));
        assert_eq!(monitor.status().mode, boot);
        assert!(monitor.status().cursor_visible);
        assert!(DisplayToken::acquire().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected_before_device_work() {
        let _guard = exclusive();
        let fb = MemoryFramebuffer::new(Resolution::new(8, 4), 16).unwrap();
        let monitor = fb.monitor();
        let err = Display::with_device(fb, &DisplayConfig::with_resolution((0, 4))).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidParameter(ConfigError::InvalidDimensions(_))
        ));
        assert_eq!(monitor.status().mode_changes, 0);
        assert!(DisplayToken::acquire().is_ok());
    }
}
