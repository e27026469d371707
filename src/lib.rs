//! # scenecard
//!
//! Pull a handful of visually distinct frames out of a short video and find
//! the embedded "card" (a player widget or similar overlay) inside each.
//!
//! `scenecard` decodes videos with FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate, fingerprints
//! frames with a DCT perceptual hash, and localises cards with maximally
//! stable extremal regions.
//!
//! ## Quick Start
//!
//! ### Run the Whole Pipeline
//!
//! ```no_run
//! use scenecard::{Pipeline, PipelineOptions};
//!
//! let options = PipelineOptions::new()
//!     .with_scene_threshold(0.05)
//!     .with_hash_threshold(10)
//!     .with_card_detection(true);
//! let report = Pipeline::new(options).run("reel.mp4", "frames").unwrap();
//! println!("kept {} of {} scene frames", report.frames.len(), report.scene_frame_count);
//! ```
//!
//! ### Deduplicate Existing Frames
//!
//! ```no_run
//! let frames = ["frame_0001.jpg", "frame_0002.jpg", "frame_0003.jpg"];
//! let kept = scenecard::deduplicate(&frames, 10);
//! ```
//!
//! ### Find a Card in One Frame
//!
//! ```no_run
//! use std::path::Path;
//!
//! use scenecard::CardOptions;
//!
//! let detection = scenecard::detect_card_at(Path::new("frame_0001.jpg"), &CardOptions::default()).unwrap();
//! if let Some(crop) = detection.crop() {
//!     crop.image.save("card.jpg").unwrap();
//! }
//! ```
//!
//! ## Stages
//!
//! - **Scene segmentation** ([`scene`]): FFmpeg's `select='gt(scene,T)'`
//!   filter emits `frame_0001.jpg`, `frame_0002.jpg`, … at each cut
//! - **Fingerprinting** ([`fingerprint`]): 64-bit DCT perceptual hash
//! - **Deduplication** ([`dedup`]): greedy, order-preserving Hamming filter
//! - **Region proposal** ([`mser`]): maximally stable extremal regions
//! - **Card detection** ([`card`]): union box plus area and aspect filters
//! - **Coordination** ([`pipeline`]): scratch directory, progress,
//!   cancellation, output layout
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Card detection fans out across rayon threads |
//! | `full` | Enables every optional feature (currently `rayon`) |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod card;
pub mod config;
mod conversion;
pub mod dedup;
pub mod error;
pub mod ffmpeg;
pub mod fingerprint;
pub mod mser;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "rayon")]
mod rayon;
pub mod scene;

pub use card::{
    CardCandidate, CardCrop, CardDetection, CardOptions, CardOutcome, Rejection, detect_card,
    detect_card_at, union_box,
};
pub use config::PipelineOptions;
pub use conversion::{frame_file_name, sequence_index};
pub use dedup::{
    DEFAULT_HASH_THRESHOLD, DedupOutcome, Deduplicator, SkippedFrame, deduplicate,
    deduplicate_frames,
};
pub use error::SceneCardError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use fingerprint::PerceptualHash;
pub use mser::{MserDetector, MserOptions, Polarity, Region, RegionBox};
pub use pipeline::{CARDS_DIR, CardReport, KeptFrame, Pipeline, PipelineReport};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use scene::{
    DEFAULT_SCENE_THRESHOLD, FfmpegSceneSource, SceneHandler, SceneOptions, SceneSource, segment,
};
