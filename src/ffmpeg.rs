//! FFmpeg setup shared by everything that touches the decoding engine.
//!
//! FFmpeg has its own console logger, separate from the Rust
//! [`log`](https://crates.io/crates/log) facade. Decoding a short reel at the
//! default level prints a banner of codec warnings to stderr, so callers that
//! want a clean terminal lower it here.
//!
//! # Example
//!
//! ```no_run
//! use scenecard::FfmpegLogLevel;
//!
//! scenecard::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::{path::Path, str::FromStr};

use ffmpeg_next::util::log::Level;

use crate::error::SceneCardError;

/// FFmpeg internal log verbosity, most quiet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's own default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "fatal" | "panic" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "verbose" => Ok(FfmpegLogLevel::Verbose),
            "debug" | "trace" => Ok(FfmpegLogLevel::Debug),
            other => Err(format!("unknown FFmpeg log level: {other}")),
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This only affects what FFmpeg itself prints to stderr.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Initialise FFmpeg before opening `video_path`. Safe to call repeatedly.
pub(crate) fn initialize(video_path: &Path) -> Result<(), SceneCardError> {
    ffmpeg_next::init().map_err(|error| {
        SceneCardError::decode(video_path, format!("FFmpeg initialisation failed: {error}"))
    })
}
