//! Heap-backed framebuffer for headless playback and tests.

use std::cell::Cell;
use std::io;
use std::rc::Rc;

use super::device::{DeviceError, FramebufferDevice, PixelFormat, VideoMode};
use crate::schema::Resolution;

/// Snapshot of a [`MemoryFramebuffer`]'s observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStatus {
    /// Active mode.
    pub mode: VideoMode,
    pub mapped: bool,
    /// First visible row of the virtual buffer.
    pub y_offset: u32,
    /// Number of successful pans.
    pub pans: u64,
    /// Number of successful mode changes.
    pub mode_changes: u32,
    /// Whether the console cursor would be drawn.
    pub cursor_visible: bool,
}

/// Observes a [`MemoryFramebuffer`] after it has been handed to a driver.
#[derive(Debug, Clone)]
pub struct DeviceMonitor(Rc<Cell<MemoryStatus>>);

impl DeviceMonitor {
    pub fn status(&self) -> MemoryStatus {
        self.0.get()
    }
}

/// A framebuffer living in process memory.
///
/// Behaves like a simple fbdev device: packed scanlines, 16 or 32 bpp, and a
/// virtual buffer that may be taller than the visible area for page flips.
#[derive(Debug)]
pub struct MemoryFramebuffer {
    /// Backing store; `u32` words keep 32 bpp pixels aligned.
    words: Vec<u32>,
    status: Rc<Cell<MemoryStatus>>,
    /// Largest virtual buffer the device accepts, in pages.
    max_pages: u32,
}

impl MemoryFramebuffer {
    /// Device that boots in `resolution` at `bits_per_pixel` with the
    /// cursor shown.
    pub fn new(resolution: Resolution, bits_per_pixel: u32) -> Result<Self, DeviceError> {
        let mode = VideoMode::packed(resolution, resolution.height, bits_per_pixel)?;
        Ok(Self {
            words: Vec::new(),
            status: Rc::new(Cell::new(MemoryStatus {
                mode,
                mapped: false,
                y_offset: 0,
                pans: 0,
                mode_changes: 0,
                cursor_visible: true,
            })),
            max_pages: 2,
        })
    }

    /// Limit the virtual buffer to `pages` visible pages (at least one).
    pub fn with_page_limit(mut self, pages: u32) -> Self {
        self.max_pages = pages.max(1);
        self
    }

    pub fn monitor(&self) -> DeviceMonitor {
        DeviceMonitor(Rc::clone(&self.status))
    }

    pub fn status(&self) -> MemoryStatus {
        self.status.get()
    }

    /// The whole virtual buffer.
    pub fn bytes(&self) -> &[u8] {
        let len = self.status().mode.buffer_size();
        let bytes: &[u8] = bytemuck::cast_slice(&self.words);
        &bytes[..len.min(bytes.len())]
    }

    /// The page currently shown.
    pub fn visible_page(&self) -> &[u8] {
        let status = self.status();
        let start = status.y_offset as usize * status.mode.line_length as usize;
        let bytes = self.bytes();
        let end = (start + status.mode.page_size()).min(bytes.len());
        &bytes[start.min(end)..end]
    }

    /// Encoded bytes of the visible pixel at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let mode = self.status().mode;
        let bpp = mode.bits_per_pixel.div_ceil(8) as usize;
        let start = y as usize * mode.line_length as usize + x as usize * bpp;
        &self.visible_page()[start..start + bpp]
    }

    fn update(&self, f: impl FnOnce(&mut MemoryStatus)) {
        let mut status = self.status.get();
        f(&mut status);
        self.status.set(status);
    }
}

impl FramebufferDevice for MemoryFramebuffer {
    fn mode(&self) -> Result<VideoMode, DeviceError> {
        Ok(self.status().mode)
    }

    fn set_mode(&mut self, mode: &VideoMode) -> Result<VideoMode, DeviceError> {
        if self.status().mapped {
            return Err(io::Error::new(
                io::ErrorKind::ResourceBusy,
                "Mode change while framebuffer is mapped",
            )
            .into());
        }
        PixelFormat::from_bits_per_pixel(mode.bits_per_pixel)?;
        if mode.width == 0 || mode.height == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "Empty mode").into());
        }

        let virtual_height = mode
            .virtual_height
            .clamp(mode.height, mode.height.saturating_mul(self.max_pages));
        let active = VideoMode::packed(mode.resolution(), virtual_height, mode.bits_per_pixel)?;
        self.update(|s| {
            s.mode = active;
            s.y_offset = 0;
            s.mode_changes += 1;
        });
        Ok(active)
    }

    fn map(&mut self) -> Result<(), DeviceError> {
        let size = self.status().mode.buffer_size();
        let words = size.div_ceil(4);
        if self.words.len() != words {
            self.words = vec![0u32; words];
        }
        self.update(|s| s.mapped = true);
        Ok(())
    }

    fn memory(&mut self) -> Option<&mut [u8]> {
        let status = self.status();
        if !status.mapped {
            return None;
        }
        let len = status.mode.buffer_size();
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.words);
        Some(&mut bytes[..len])
    }

    fn pan(&mut self, y_offset: u32) -> Result<(), DeviceError> {
        let mode = self.status().mode;
        if y_offset.saturating_add(mode.height) > mode.virtual_height {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Pan offset {} outside virtual buffer", y_offset),
            )
            .into());
        }
        self.update(|s| {
            s.y_offset = y_offset;
            s.pans += 1;
        });
        Ok(())
    }

    fn unmap(&mut self) {
        self.update(|s| s.mapped = false);
    }

    fn set_cursor_visible(&mut self, visible: bool) -> Result<(), DeviceError> {
        self.update(|s| s.cursor_visible = visible);
        Ok(())
    }
}
