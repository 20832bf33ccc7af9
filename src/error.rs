//! Crate-wide error type.

use std::io;

use crate::display::DeviceError;
use crate::schema::{ConfigError, Resolution};

/// Errors surfaced by encoding, loading and display operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] ConfigError),

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("Animation resolution {animation} exceeds display resolution {display}")]
    GeometryMismatch {
        animation: Resolution,
        display: Resolution,
    },

    #[error("A grating is already loaded; unload it first")]
    AlreadyLoaded,

    #[error("No grating is loaded")]
    NotLoaded,

    #[error("Another display session is already open")]
    DisplayInUse,

    #[error("Framebuffer device failure: {0}")]
    Device(#[from] DeviceError),
}

pub type Result<T> = std::result::Result<T, Error>;
