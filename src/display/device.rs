//! Framebuffer device abstraction.

use std::fmt;
use std::io;

use crate::schema::Resolution;

/// Geometry and memory layout of a framebuffer mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMode {
    /// Visible width in pixels.
    pub width: u32,
    /// Visible height in pixels.
    pub height: u32,
    /// Height of the addressable (virtual) buffer in pixels.
    pub virtual_height: u32,
    /// Bits per pixel.
    pub bits_per_pixel: u32,
    /// Bytes per scanline (may exceed width * bytes per pixel).
    pub line_length: u32,
}

impl VideoMode {
    /// Packed mode with no scanline padding.
    ///
    /// Fails when a scanline or the whole virtual buffer is not addressable.
    pub fn packed(
        resolution: Resolution,
        virtual_height: u32,
        bits_per_pixel: u32,
    ) -> Result<Self, DeviceError> {
        let too_large = || DeviceError::ModeTooLarge {
            resolution,
            virtual_height,
            bits_per_pixel,
        };
        let line_length = resolution
            .width
            .checked_mul(bits_per_pixel.div_ceil(8))
            .ok_or_else(too_large)?;
        (line_length as usize)
            .checked_mul(virtual_height.max(resolution.height) as usize)
            .ok_or_else(too_large)?;

        Ok(Self {
            width: resolution.width,
            height: resolution.height,
            virtual_height,
            bits_per_pixel,
            line_length,
        })
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Number of full visible pages the virtual buffer holds.
    pub fn pages(&self) -> u32 {
        if self.height == 0 {
            0
        } else {
            self.virtual_height / self.height
        }
    }

    /// Bytes in one visible page.
    pub fn page_size(&self) -> usize {
        self.line_length as usize * self.height as usize
    }

    /// Bytes in the whole virtual buffer.
    pub fn buffer_size(&self) -> usize {
        self.line_length as usize * self.virtual_height as usize
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} (virtual {}x{}, {} bpp, {} bytes/line)",
            self.width,
            self.height,
            self.width,
            self.virtual_height,
            self.bits_per_pixel,
            self.line_length
        )
    }
}

/// Supported device pixel encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 16-bit 5:6:5.
    Rgb565,
    /// 32-bit, blue in the lowest byte, padding byte set.
    Xrgb8888,
}

impl PixelFormat {
    pub fn from_bits_per_pixel(bits: u32) -> Result<Self, DeviceError> {
        match bits {
            16 => Ok(Self::Rgb565),
            32 => Ok(Self::Xrgb8888),
            other => Err(DeviceError::UnsupportedDepth(other)),
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb565 => 2,
            Self::Xrgb8888 => 4,
        }
    }

    /// Encode an RGB color as device bytes (native endian).
    ///
    /// The first `bytes_per_pixel()` bytes of the result are meaningful.
    pub fn encode(self, [r, g, b]: [u8; 3]) -> [u8; 4] {
        match self {
            Self::Rgb565 => {
                let (r, g, b) = (r as u32, g as u32, b as u32);
                let packed = (((31 * (r + 4)) / 255) << 11)
                    | (((63 * (g + 2)) / 255) << 5)
                    | ((31 * (b + 4)) / 255);
                let [lo, hi] = (packed as u16).to_ne_bytes();
                [lo, hi, 0, 0]
            }
            Self::Xrgb8888 => {
                let packed = 0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32;
                packed.to_ne_bytes()
            }
        }
    }
}

/// Framebuffer device errors.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Framebuffer I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Framebuffer memory mapping failed: {0}")]
    Map(io::Error),

    #[error("Mode {resolution} (virtual height {virtual_height}, {bits_per_pixel} bpp) is too large to address")]
    ModeTooLarge {
        resolution: Resolution,
        virtual_height: u32,
        bits_per_pixel: u32,
    },

    #[error("Device did not accept mode {requested}, reports {actual}")]
    ModeRejected {
        requested: Resolution,
        actual: Resolution,
    },

    #[error("Unsupported framebuffer depth: {0} bits per pixel")]
    UnsupportedDepth(u32),

    #[error("Framebuffer memory is not mapped")]
    NotMapped,

    #[error("Mapped framebuffer holds {actual} bytes, mode needs {required}")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("Frame {frame} does not fit display mode {mode}")]
    FrameTooLarge { frame: Resolution, mode: Resolution },
}

/// A framebuffer that can be switched to a mode, mapped and panned.
///
/// Implemented by [`LinuxFramebuffer`](super::LinuxFramebuffer) for real
/// hardware and [`MemoryFramebuffer`](super::MemoryFramebuffer) for headless
/// use.
pub trait FramebufferDevice {
    /// Currently active mode.
    fn mode(&self) -> Result<VideoMode, DeviceError>;

    /// Request a mode; returns the mode the device actually settled on.
    ///
    /// Only `width`, `height`, `virtual_height` and `bits_per_pixel` of the
    /// request are meaningful. Must not be called while mapped.
    fn set_mode(&mut self, mode: &VideoMode) -> Result<VideoMode, DeviceError>;

    /// Map device memory for the active mode.
    fn map(&mut self) -> Result<(), DeviceError>;

    /// The mapped memory, or `None` when unmapped.
    fn memory(&mut self) -> Option<&mut [u8]>;

    /// Show the virtual buffer starting at row `y_offset`.
    fn pan(&mut self, y_offset: u32) -> Result<(), DeviceError>;

    /// Release the mapping. Idempotent.
    fn unmap(&mut self);

    /// Show or hide the console text cursor drawn over the framebuffer.
    /// Idempotent.
    fn set_cursor_visible(&mut self, visible: bool) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb565_packing() {
        let format = PixelFormat::Rgb565;
        let white = u16::from_ne_bytes(format.encode([255, 255, 255])[..2].try_into().unwrap());
        assert_eq!(white, 0xFFFF);
        let black = u16::from_ne_bytes(format.encode([0, 0, 0])[..2].try_into().unwrap());
        assert_eq!(black, 0x0000);
        let red = u16::from_ne_bytes(format.encode([255, 0, 0])[..2].try_into().unwrap());
        assert_eq!(red, 0xF800);
        let gray = u16::from_ne_bytes(format.encode([127, 127, 127])[..2].try_into().unwrap());
        assert_eq!(gray, (15 << 11) | (31 << 5) | 15);
    }

    #[test]
    fn test_xrgb_packing() {
        let bytes = PixelFormat::Xrgb8888.encode([0x12, 0x34, 0x56]);
        assert_eq!(u32::from_ne_bytes(bytes), 0xFF12_3456);
    }

    #[test]
    fn test_mode_geometry() {
        let mode = VideoMode::packed(Resolution::new(640, 480), 960, 16).unwrap();
        assert_eq!(mode.line_length, 1280);
        assert_eq!(mode.pages(), 2);
        assert_eq!(mode.page_size(), 1280 * 480);
        assert_eq!(mode.buffer_size(), 1280 * 960);
        assert!(PixelFormat::from_bits_per_pixel(24).is_err());
    }

    #[test]
    fn test_oversized_mode_is_an_error() {
        let wide = Resolution::new(1 << 31, 1);
        assert!(matches!(
            VideoMode::packed(wide, 1, 16),
            Err(DeviceError::ModeTooLarge { resolution, .. }) if resolution == wide
        ));
        assert!(VideoMode::packed(Resolution::new(u32::MAX / 4, 1), 1, 32).is_ok());
        if cfg!(target_pointer_width = "32") {
            assert!(VideoMode::packed(Resolution::new(65536, 65536), 65536, 32).is_err());
        }
    }
}
