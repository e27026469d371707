//! Error types for the `scenecard` crate.
//!
//! This module defines [`SceneCardError`], the unified error type returned by
//! all fallible operations in the crate. Errors carry the offending path and
//! the upstream reason so a failed run can be diagnosed from the message
//! alone.

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `scenecard` operations.
///
/// `MissingInput` and `Decode` are fatal to a pipeline run. `ImageRead` is
/// local to a single frame; the pipeline skips that frame and keeps going
/// (see [`is_frame_local`](SceneCardError::is_frame_local)).
///
/// A scene segmentation that yields no frames is **not** an error. It
/// surfaces as an empty [`PipelineReport`](crate::PipelineReport).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SceneCardError {
    /// The input video or image does not exist.
    #[error("Input file does not exist: {path}")]
    MissingInput {
        /// Path that was passed in.
        path: PathBuf,
    },

    /// The decoding engine could not open or process the video.
    #[error("Failed to decode video at {path}: {reason}")]
    Decode {
        /// Path of the video being decoded.
        path: PathBuf,
        /// Underlying reason reported by the engine.
        reason: String,
    },

    /// A frame image is corrupt or unreadable.
    #[error("Failed to read image at {path}: {reason}")]
    ImageRead {
        /// Path of the frame image.
        path: PathBuf,
        /// Underlying reason the image could not be loaded.
        reason: String,
    },

    /// An option was outside its accepted range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The run was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding an output image.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl SceneCardError {
    /// Returns `true` for errors that concern a single frame only.
    ///
    /// The pipeline skips frames that fail with these errors instead of
    /// aborting the whole run.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, SceneCardError::ImageRead { .. })
    }

    pub(crate) fn image_read(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        SceneCardError::ImageRead {
            path: path.into(),
            reason: error.to_string(),
        }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SceneCardError::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
