//! Framebuffer driver: owns a mapped device and writes grayscale frames to it.

use super::device::{DeviceError, FramebufferDevice, PixelFormat, VideoMode};
use super::session::DisplayToken;
use crate::animation::Frame;
use crate::schema::Resolution;

/// Drives one mapped framebuffer for the lifetime of a display session.
///
/// Opening saves the device's mode, switches it to the requested resolution
/// and hides the console cursor; releasing (explicitly or on drop) unmaps the
/// memory, shows the cursor again and puts the saved mode back. With double
/// buffering each frame is drawn into the hidden page and then panned into
/// view.
pub struct FramebufferDriver<D: FramebufferDevice> {
    device: D,
    saved: VideoMode,
    mode: VideoMode,
    format: PixelFormat,
    /// Device bytes for each grayscale intensity.
    lut: [[u8; 4]; 256],
    double_buffered: bool,
    /// Page currently on screen.
    shown: u32,
    cursor_hidden: bool,
    released: bool,
    // Dropped last, after the device has been restored.
    _token: DisplayToken,
}

impl<D: FramebufferDevice> FramebufferDriver<D> {
    /// Take over `device` at `resolution`.
    ///
    /// Any failure after the mode change restores the saved mode before
    /// the error is returned.
    pub fn open(
        token: DisplayToken,
        mut device: D,
        resolution: Resolution,
        double_buffer: bool,
    ) -> Result<Self, DeviceError> {
        let saved = device.mode()?;
        log::debug!("Saved framebuffer mode {}", saved);

        // Keep the console depth when we can draw it, otherwise use 16 bpp
        let bits_per_pixel = match PixelFormat::from_bits_per_pixel(saved.bits_per_pixel) {
            Ok(_) => saved.bits_per_pixel,
            Err(_) => 16,
        };

        let (mode, format, double_buffered) =
            match configure(&mut device, resolution, bits_per_pixel, double_buffer) {
                Ok(configured) => configured,
                Err(e) => {
                    device.unmap();
                    if let Err(restore) = device.set_mode(&saved) {
                        log::warn!("Failed to restore framebuffer mode {}: {}", saved, restore);
                    }
                    return Err(e);
                }
            };

        // Not fatal: the cursor only stays drawn over the frames
        let cursor_hidden = match device.set_cursor_visible(false) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Console cursor stays visible: {}", e);
                false
            }
        };

        log::info!(
            "Framebuffer at {} ({:?}, {})",
            mode,
            format,
            if double_buffered {
                "double buffered"
            } else {
                "single buffered"
            }
        );

        Ok(Self {
            device,
            saved,
            mode,
            format,
            lut: std::array::from_fn(|v| format.encode([v as u8; 3])),
            double_buffered,
            shown: 0,
            cursor_hidden,
            released: false,
            _token: token,
        })
    }

    /// Active mode.
    pub fn mode(&self) -> &VideoMode {
        &self.mode
    }

    /// Mode that will be restored on release.
    pub fn saved_mode(&self) -> &VideoMode {
        &self.saved
    }

    pub fn resolution(&self) -> Resolution {
        self.mode.resolution()
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    pub fn is_double_buffered(&self) -> bool {
        self.double_buffered
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    fn back_page(&self) -> u32 {
        if self.double_buffered {
            1 - self.shown
        } else {
            0
        }
    }

    /// Draw `frame` top-left aligned and bring it on screen.
    pub fn write_frame(&mut self, frame: &Frame<'_>) -> Result<(), DeviceError> {
        if !frame.resolution().fits_within(self.resolution()) {
            return Err(DeviceError::FrameTooLarge {
                frame: frame.resolution(),
                mode: self.resolution(),
            });
        }

        let page = self.back_page();
        let bpp = self.format.bytes_per_pixel();
        let line = self.mode.line_length as usize;
        let base = page as usize * self.mode.page_size();
        let lut = &self.lut;
        let memory = self.device.memory().ok_or(DeviceError::NotMapped)?;

        for (y, row) in frame.rows().enumerate() {
            let start = base + y * line;
            let dst = &mut memory[start..start + row.len() * bpp];
            for (px, &v) in dst.chunks_exact_mut(bpp).zip(row) {
                px.copy_from_slice(&lut[v as usize][..bpp]);
            }
        }

        if self.double_buffered {
            self.device.pan(page * self.mode.height)?;
            self.shown = page;
        }
        Ok(())
    }

    /// Fill every page with one color.
    pub fn write_solid(&mut self, rgb: [u8; 3]) -> Result<(), DeviceError> {
        let pixel = self.format.encode(rgb);
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = self.mode.width as usize * bpp;
        let line = self.mode.line_length as usize;
        let rows = self.mode.height as usize * if self.double_buffered { 2 } else { 1 };
        let memory = self.device.memory().ok_or(DeviceError::NotMapped)?;

        for row in memory.chunks_mut(line).take(rows) {
            for px in row[..row_bytes].chunks_exact_mut(bpp) {
                px.copy_from_slice(&pixel[..bpp]);
            }
        }
        Ok(())
    }

    /// Unmap, show the cursor and restore the saved mode, reporting the
    /// first failure. Every step is attempted.
    pub fn release(mut self) -> Result<(), DeviceError> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), DeviceError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.device.unmap();
        let cursor = if self.cursor_hidden {
            self.device.set_cursor_visible(true)
        } else {
            Ok(())
        };
        self.device.set_mode(&self.saved)?;
        cursor?;
        log::debug!("Restored framebuffer mode {}", self.saved);
        Ok(())
    }
}

impl<D: FramebufferDevice> Drop for FramebufferDriver<D> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            log::warn!("Failed to restore framebuffer mode {}: {}", self.saved, e);
        }
    }
}

impl<D: FramebufferDevice> std::fmt::Debug for FramebufferDriver<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramebufferDriver")
            .field("mode", &self.mode)
            .field("saved", &self.saved)
            .field("format", &self.format)
            .field("double_buffered", &self.double_buffered)
            .field("shown", &self.shown)
            .field("cursor_hidden", &self.cursor_hidden)
            .finish()
    }
}

/// Switch the device to `resolution` and map it.
fn configure<D: FramebufferDevice>(
    device: &mut D,
    resolution: Resolution,
    bits_per_pixel: u32,
    double_buffer: bool,
) -> Result<(VideoMode, PixelFormat, bool), DeviceError> {
    let mut double = None;
    if double_buffer {
        let request = VideoMode::packed(
            resolution,
            resolution.height.saturating_mul(2),
            bits_per_pixel,
        );
        match request.and_then(|request| device.set_mode(&request)) {
            Ok(mode) if mode.pages() >= 2 => double = Some(mode),
            Ok(mode) => log::warn!(
                "Device offers {} page(s) at {}, falling back to single buffering",
                mode.pages(),
                resolution
            ),
            Err(e) => log::warn!(
                "No double buffering at {} ({}), falling back to single buffering",
                resolution,
                e
            ),
        }
    }

    let double_buffered = double.is_some();
    let mode = match double {
        Some(mode) => mode,
        None => device.set_mode(&VideoMode::packed(
            resolution,
            resolution.height,
            bits_per_pixel,
        )?)?,
    };

    if mode.resolution() != resolution {
        return Err(DeviceError::ModeRejected {
            requested: resolution,
            actual: mode.resolution(),
        });
    }
    let format = PixelFormat::from_bits_per_pixel(mode.bits_per_pixel)?;
    let row_bytes = mode.width as usize * format.bytes_per_pixel();
    if (mode.line_length as usize) < row_bytes {
        return Err(DeviceError::BufferTooSmall {
            required: row_bytes,
            actual: mode.line_length as usize,
        });
    }

    device.map()?;
    let pages = if double_buffered { 2 } else { 1 };
    let required = mode.page_size() * pages;
    let actual = device.memory().map_or(0, |m| m.len());
    if actual < required {
        return Err(DeviceError::BufferTooSmall { required, actual });
    }

    Ok((mode, format, double_buffered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::session::exclusive;
    use crate::display::{DeviceMonitor, MemoryFramebuffer};
    use std::io;

    fn open_memory(
        device: MemoryFramebuffer,
        resolution: Resolution,
        double_buffer: bool,
    ) -> Result<FramebufferDriver<MemoryFramebuffer>, DeviceError> {
        let token = DisplayToken::acquire().unwrap();
        FramebufferDriver::open(token, device, resolution, double_buffer)
    }

    /// Wraps a memory device to inject failures.
    struct Faulty {
        inner: MemoryFramebuffer,
        fail_map: bool,
        shrink_width: bool,
        pans_left: Option<u32>,
        fail_cursor: bool,
    }

    impl Faulty {
        fn new(inner: MemoryFramebuffer) -> Self {
            Self {
                inner,
                fail_map: false,
                shrink_width: false,
                pans_left: None,
                fail_cursor: false,
            }
        }
    }

    impl FramebufferDevice for Faulty {
        fn mode(&self) -> Result<VideoMode, DeviceError> {
            self.inner.mode()
        }

        fn set_mode(&mut self, mode: &VideoMode) -> Result<VideoMode, DeviceError> {
            let mut mode = *mode;
            if self.shrink_width && self.inner.status().mode_changes == 0 {
                mode.width -= 1;
            }
            self.inner.set_mode(&mode)
        }

        fn map(&mut self) -> Result<(), DeviceError> {
            if self.fail_map {
                return Err(DeviceError::Map(io::Error::other("out of memory")));
            }
            self.inner.map()
        }

        fn memory(&mut self) -> Option<&mut [u8]> {
            self.inner.memory()
        }

        fn pan(&mut self, y_offset: u32) -> Result<(), DeviceError> {
            match self.pans_left {
                Some(0) => Err(io::Error::other("vsync lost").into()),
                Some(ref mut n) => {
                    *n -= 1;
                    self.inner.pan(y_offset)
                }
                None => self.inner.pan(y_offset),
            }
        }

        fn unmap(&mut self) {
            self.inner.unmap();
        }

        fn set_cursor_visible(&mut self, visible: bool) -> Result<(), DeviceError> {
            if self.fail_cursor {
                return Err(io::Error::other("no console").into());
            }
            self.inner.set_cursor_visible(visible)
        }
    }

    fn boot_device() -> (MemoryFramebuffer, DeviceMonitor, VideoMode) {
        let fb = MemoryFramebuffer::new(Resolution::new(32, 16), 16).unwrap();
        let monitor = fb.monitor();
        let boot = monitor.status().mode;
        (fb, monitor, boot)
    }

    #[test]
    fn test_open_and_drop_restores_mode() {
        let _guard = exclusive();
        let (fb, monitor, boot) = boot_device();

        let driver = open_memory(fb, Resolution::new(8, 4), true).unwrap();
        assert!(driver.is_double_buffered());
        assert_eq!(driver.resolution(), Resolution::new(8, 4));
        assert_eq!(driver.pixel_format(), PixelFormat::Rgb565);
        assert!(monitor.status().mapped);
        assert!(!monitor.status().cursor_visible);

        drop(driver);
        let status = monitor.status();
        assert!(!status.mapped);
        assert!(status.cursor_visible);
        assert_eq!(status.mode, boot);
        assert!(DisplayToken::acquire().is_ok());
    }

    #[test]
    fn test_release_shows_cursor() {
        let _guard = exclusive();
        let (fb, monitor, boot) = boot_device();

        let driver = open_memory(fb, Resolution::new(8, 4), false).unwrap();
        assert!(!monitor.status().cursor_visible);
        driver.release().unwrap();
        assert!(monitor.status().cursor_visible);
        assert_eq!(monitor.status().mode, boot);
    }

    #[test]
    fn test_cursor_failure_is_not_fatal() {
        let _guard = exclusive();
        let (fb, monitor, boot) = boot_device();
        let mut faulty = Faulty::new(fb);
        faulty.fail_cursor = true;

        let token = DisplayToken::acquire().unwrap();
        let mut driver =
            FramebufferDriver::open(token, faulty, Resolution::new(4, 2), true).unwrap();
        assert!(monitor.status().cursor_visible);
        driver.write_solid([0, 0, 0]).unwrap();

        // Never hidden, so release does not touch the cursor again
        driver.release().unwrap();
        assert_eq!(monitor.status().mode, boot);
    }

    #[test]
    fn test_oversized_resolution_restores_mode() {
        let _guard = exclusive();
        let (fb, monitor, boot) = boot_device();

        let err = open_memory(fb, Resolution::new(1 << 31, 1), true).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::ModeTooLarge { resolution, .. } if resolution.width == 1 << 31
        ));
        let status = monitor.status();
        assert_eq!(status.mode, boot);
        assert!(status.cursor_visible);
        assert!(!status.mapped);
        assert!(DisplayToken::acquire().is_ok());
    }

    #[test]
    fn test_write_frame_flips_pages() {
        let _guard = exclusive();
        let (fb, monitor, _) = boot_device();
        let mut driver = open_memory(fb, Resolution::new(8, 4), true).unwrap();

        let pixels: Vec<u8> = (0..8).map(|v| v * 30).collect();
        let frame = Frame::new(4, 2, &pixels).unwrap();

        driver.write_frame(&frame).unwrap();
        assert_eq!(monitor.status().y_offset, 4);
        let fb = driver.device();
        let format = PixelFormat::Rgb565;
        assert_eq!(fb.pixel(0, 0), &format.encode([0; 3])[..2]);
        assert_eq!(fb.pixel(3, 1), &format.encode([210; 3])[..2]);
        // Outside the frame stays untouched
        assert_eq!(fb.pixel(4, 0), &[0, 0]);
        assert_eq!(fb.pixel(0, 2), &[0, 0]);

        driver.write_frame(&frame).unwrap();
        assert_eq!(monitor.status().y_offset, 0);
        assert_eq!(monitor.status().pans, 2);
    }

    #[test]
    fn test_single_buffer_fallback() {
        let _guard = exclusive();
        let fb = MemoryFramebuffer::new(Resolution::new(8, 4), 32)
            .unwrap()
            .with_page_limit(1);
        let monitor = fb.monitor();
        let mut driver = open_memory(fb, Resolution::new(8, 4), true).unwrap();
        assert!(!driver.is_double_buffered());
        assert_eq!(driver.pixel_format(), PixelFormat::Xrgb8888);

        let pixels = [255u8; 32];
        driver
            .write_frame(&Frame::new(8, 4, &pixels).unwrap())
            .unwrap();
        assert_eq!(monitor.status().pans, 0);
        assert_eq!(driver.device().pixel(7, 3), &[255, 255, 255, 255]);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let _guard = exclusive();
        let (fb, _, _) = boot_device();
        let mut driver = open_memory(fb, Resolution::new(8, 4), false).unwrap();

        let pixels = [0u8; 45];
        let err = driver
            .write_frame(&Frame::new(9, 5, &pixels).unwrap())
            .unwrap_err();
        assert!(matches!(err, DeviceError::FrameTooLarge { .. }));
    }

    #[test]
    fn test_write_solid_fills_all_pages() {
        let _guard = exclusive();
        let (fb, _, _) = boot_device();
        let mut driver = open_memory(fb, Resolution::new(8, 4), true).unwrap();

        driver.write_solid([255, 0, 0]).unwrap();
        let red = PixelFormat::Rgb565.encode([255, 0, 0]);
        for px in driver.device().bytes().chunks_exact(2) {
            assert_eq!(px, &red[..2]);
        }
    }

    #[test]
    fn test_map_failure_restores_mode() {
        let _guard = exclusive();
        let (fb, monitor, boot) = boot_device();
        let mut faulty = Faulty::new(fb);
        faulty.fail_map = true;

        let token = DisplayToken::acquire().unwrap();
        let err = FramebufferDriver::open(token, faulty, Resolution::new(8, 4), true).unwrap_err();
        assert!(matches!(err, DeviceError::Map(_)));
        assert_eq!(monitor.status().mode, boot);
        assert!(!monitor.status().mapped);
        assert!(monitor.status().cursor_visible);
        assert!(DisplayToken::acquire().is_ok());
    }

    #[test]
    fn test_mode_rejected() {
        let _guard = exclusive();
        let (fb, monitor, boot) = boot_device();
        let mut faulty = Faulty::new(fb);
        faulty.shrink_width = true;

        let token = DisplayToken::acquire().unwrap();
        let err =
            FramebufferDriver::open(token, faulty, Resolution::new(8, 4), false).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::ModeRejected { requested, actual }
                if requested == Resolution::new(8, 4) && actual == Resolution::new(7, 4)
        ));
        assert_eq!(monitor.status().mode, boot);
    }

    #[test]
    fn test_release_after_failed_pan() {
        let _guard = exclusive();
        let (fb, monitor, boot) = boot_device();
        let mut faulty = Faulty::new(fb);
        faulty.pans_left = Some(1);

        let token = DisplayToken::acquire().unwrap();
        let mut driver =
            FramebufferDriver::open(token, faulty, Resolution::new(4, 2), true).unwrap();
        let pixels = [128u8; 8];
        let frame = Frame::new(4, 2, &pixels).unwrap();
        driver.write_frame(&frame).unwrap();
        assert!(matches!(driver.write_frame(&frame), Err(DeviceError::Io(_))));

        driver.release().unwrap();
        assert_eq!(monitor.status().mode, boot);
    }
}
