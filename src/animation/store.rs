//! Animation store: loads raw grating files into memory for playback.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::format::{AnimationHeader, Frame};
use crate::error::{Error, Result};
use crate::schema::Resolution;

/// A grating animation held in memory, validated against a display.
///
/// Owned by the display session that loaded it; dropping it unloads it.
pub struct LoadedGrating {
    header: AnimationHeader,
    display: Resolution,
    data: Vec<u8>,
}

impl LoadedGrating {
    pub fn header(&self) -> &AnimationHeader {
        &self.header
    }

    /// Animation geometry.
    pub fn resolution(&self) -> Resolution {
        self.header.resolution()
    }

    /// Display geometry this grating was validated against.
    pub fn display_resolution(&self) -> Resolution {
        self.display
    }

    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    pub fn pixel_shift(&self) -> i32 {
        self.header.pixel_shift
    }

    /// Bytes held in memory for frame data.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Frame by index, or `None` past the end.
    pub fn frame(&self, index: u32) -> Option<Frame<'_>> {
        if index >= self.header.frame_count {
            return None;
        }
        let size = self.header.frame_size();
        let start = index as usize * size;
        let pixels = &self.data[start..start + size];
        Frame::new(self.header.width, self.header.height, pixels).ok()
    }

    /// Iterate frames in playback order.
    pub fn frames(&self) -> FrameIterator<'_> {
        FrameIterator {
            grating: self,
            current: 0,
        }
    }
}

impl std::fmt::Debug for LoadedGrating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedGrating")
            .field("header", &self.header)
            .field("display", &self.display)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Iterator over the frames of a loaded grating.
pub struct FrameIterator<'a> {
    grating: &'a LoadedGrating,
    current: u32,
}

impl<'a> Iterator for FrameIterator<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.grating.frame(self.current)?;
        self.current += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.grating.frame_count() - self.current) as usize;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for FrameIterator<'a> {}

/// Loads animation files.
pub struct AnimationStore;

impl AnimationStore {
    /// Read only the header of an animation file.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<AnimationHeader> {
        let mut reader = BufReader::new(File::open(path)?);
        let header = AnimationHeader::read_from(&mut reader)?;
        header.validate()?;
        Ok(header)
    }

    /// Load an animation for playback on a display of `display` resolution.
    ///
    /// Animations larger than the display in either dimension are rejected
    /// before any frame data is read. Smaller animations are accepted and
    /// drawn top-left aligned.
    pub fn load<P: AsRef<Path>>(path: P, display: Resolution) -> Result<LoadedGrating> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = AnimationHeader::read_from(&mut reader)?;
        header.validate()?;

        if !header.resolution().fits_within(display) {
            return Err(Error::GeometryMismatch {
                animation: header.resolution(),
                display,
            });
        }

        if file_len != header.file_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{}: expected {} bytes for {} frames of {}, found {}",
                    path.display(),
                    header.file_size(),
                    header.frame_count,
                    header.resolution(),
                    file_len
                ),
            )
            .into());
        }

        let data_len = usize::try_from(file_len - AnimationHeader::SIZE as u64).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "Animation too large for memory")
        })?;
        let mut data = vec![0u8; data_len];
        reader.read_exact(&mut data)?;

        if header.resolution() != display {
            log::warn!(
                "{}: animation {} is smaller than display {}, drawing top-left aligned",
                path.display(),
                header.resolution(),
                display
            );
        }
        log::info!(
            "Loaded {} ({} frames at {}, {} bytes)",
            path.display(),
            header.frame_count,
            header.resolution(),
            data_len
        );

        Ok(LoadedGrating {
            header,
            display,
            data,
        })
    }
}
