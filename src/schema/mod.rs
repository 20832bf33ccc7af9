//! Schema module - Parameter and configuration types for gratings and displays.

mod color;
mod config;

pub use color::*;
pub use config::*;
