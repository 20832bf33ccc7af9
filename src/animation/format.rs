//! Binary format definitions for raw grating animation files.

use std::io::{self, Read, Write};

use crate::schema::Resolution;

/// File header for raw grating animations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationHeader {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Total number of frames.
    pub frame_count: u32,
    /// Pixels the pattern advances per frame.
    pub pixel_shift: i32,
}

impl AnimationHeader {
    /// Size of header in bytes.
    /// Width(4) + Height(4) + FrameCount(4) + PixelShift(4) = 16
    pub const SIZE: usize = 16;

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Size of one frame in bytes (one byte per pixel).
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Expected length of the whole file in bytes.
    pub fn file_size(&self) -> u64 {
        Self::SIZE as u64 + self.frame_count as u64 * self.frame_size() as u64
    }

    /// Reject headers no encoder could have produced.
    pub fn validate(&self) -> io::Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Animation has empty frames ({}x{})", self.width, self.height),
            ));
        }
        if self.frame_count == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Animation has no frames",
            ));
        }
        Ok(())
    }

    /// Write header to output.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.width.to_le_bytes())?;
        w.write_all(&self.height.to_le_bytes())?;
        w.write_all(&self.frame_count.to_le_bytes())?;
        w.write_all(&self.pixel_shift.to_le_bytes())?;
        Ok(())
    }

    /// Read header from input.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        r.read_exact(&mut buf)?;

        let word = |i: usize| [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]];

        Ok(Self {
            width: u32::from_le_bytes(word(0)),
            height: u32::from_le_bytes(word(4)),
            frame_count: u32::from_le_bytes(word(8)),
            pixel_shift: i32::from_le_bytes(word(12)),
        })
    }
}

/// One frame of 8-bit intensities, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    width: u32,
    height: u32,
    pixels: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Wrap a pixel slice; fails on an empty geometry or if its length is
    /// not `width * height`.
    pub fn new(width: u32, height: u32, pixels: &'a [u8]) -> io::Result<Self> {
        if width == 0 || height == 0 || pixels.len() != width as usize * height as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame size mismatch: {} bytes for {}x{}",
                    pixels.len(),
                    width,
                    height
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    /// Intensity at (x, y).
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Iterate rows top to bottom.
    pub fn rows(&self) -> std::slice::ChunksExact<'a, u8> {
        self.pixels.chunks_exact(self.width as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = AnimationHeader {
            width: 1280,
            height: 720,
            frame_count: 30,
            pixel_shift: -3,
        };

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), AnimationHeader::SIZE);
        assert_eq!(&buf[0..4], &1280u32.to_le_bytes());
        assert_eq!(&buf[4..8], &720u32.to_le_bytes());
        assert_eq!(&buf[8..12], &30u32.to_le_bytes());
        assert_eq!(&buf[12..16], &(-3i32).to_le_bytes());

        let decoded = AnimationHeader::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.file_size(), 16 + 30 * 1280 * 720);
    }

    #[test]
    fn test_header_truncated() {
        let buf = [0u8; 10];
        let err = AnimationHeader::read_from(&mut Cursor::new(&buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_header_validation() {
        let mut header = AnimationHeader {
            width: 4,
            height: 4,
            frame_count: 1,
            pixel_shift: 0,
        };
        assert!(header.validate().is_ok());

        header.frame_count = 0;
        assert_eq!(
            header.validate().unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );

        header.frame_count = 1;
        header.height = 0;
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_frame_view() {
        let pixels: Vec<u8> = (0..12).collect();
        let frame = Frame::new(4, 3, &pixels).unwrap();
        assert_eq!(frame.get(1, 2), 9);
        let rows: Vec<_> = frame.rows().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], &[4, 5, 6, 7]);

        assert!(Frame::new(5, 3, &pixels).is_err());
        assert!(Frame::new(0, 0, &[]).is_err());
    }
}
