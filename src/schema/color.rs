//! Solid colors for filling the display between stimuli.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// An RGB color as handed in by a caller.
///
/// Channels are plain integers so out-of-range requests can be rejected
/// with a proper error instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub red: i32,
    pub green: i32,
    pub blue: i32,
}

/// Mid-gray, the usual inter-stimulus background.
pub const GRAY: Color = Color::new(127, 127, 127);
pub const BLACK: Color = Color::new(0, 0, 0);
pub const WHITE: Color = Color::new(255, 255, 255);

impl Color {
    pub const fn new(red: i32, green: i32, blue: i32) -> Self {
        Self { red, green, blue }
    }

    /// Check every channel is within 0-255 and narrow to bytes.
    pub fn to_rgb8(&self) -> Result<[u8; 3], ConfigError> {
        Ok([
            channel("red", self.red)?,
            channel("green", self.green)?,
            channel("blue", self.blue)?,
        ])
    }
}

impl From<(i32, i32, i32)> for Color {
    fn from((red, green, blue): (i32, i32, i32)) -> Self {
        Self::new(red, green, blue)
    }
}

impl From<[u8; 3]> for Color {
    fn from([red, green, blue]: [u8; 3]) -> Self {
        Self::new(red.into(), green.into(), blue.into())
    }
}

fn channel(name: &'static str, value: i32) -> Result<u8, ConfigError> {
    u8::try_from(value).map_err(|_| ConfigError::ColorOutOfRange {
        channel: name,
        value,
    })
}
