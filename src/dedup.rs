//! Greedy perceptual deduplication of scene frames.
//!
//! Frames are considered in order. A frame is kept only if its
//! [`PerceptualHash`] is farther than the threshold from **every** frame kept
//! so far, so the output is always a subsequence of the input and the first
//! frame always survives.
//!
//! # Example
//!
//! ```
//! use scenecard::{Deduplicator, PerceptualHash};
//!
//! let mut dedup = Deduplicator::new(10);
//! assert!(dedup.consider(PerceptualHash::from_bits(0)));
//! assert!(!dedup.consider(PerceptualHash::from_bits(0b11111)));
//! assert!(dedup.consider(PerceptualHash::from_bits(u64::MAX)));
//! assert_eq!(dedup.len(), 2);
//! ```

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::{error::SceneCardError, fingerprint::PerceptualHash};

/// Default maximum Hamming distance at which two frames are duplicates.
pub const DEFAULT_HASH_THRESHOLD: u32 = 10;

/// Online filter that remembers the hashes of kept frames.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    threshold: u32,
    kept: Vec<PerceptualHash>,
}

impl Deduplicator {
    /// Create an empty deduplicator. Frames within `threshold` bits of a kept
    /// frame are discarded.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            kept: Vec::new(),
        }
    }

    /// The configured threshold.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Offer a hash. Returns `true` and remembers it if it is new.
    pub fn consider(&mut self, hash: PerceptualHash) -> bool {
        let duplicate = self
            .kept
            .iter()
            .any(|kept| kept.distance(hash) <= self.threshold);
        if !duplicate {
            self.kept.push(hash);
        }
        !duplicate
    }

    /// Fingerprint the image at `path` and offer it.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCardError::MissingInput`] if `path` does not exist and
    /// [`SceneCardError::ImageRead`] if it cannot be decoded. The
    /// deduplicator's state is unchanged in either case.
    pub fn consider_path(&mut self, path: &Path) -> Result<bool, SceneCardError> {
        let hash = PerceptualHash::from_path(path)?;
        Ok(self.consider(hash))
    }

    /// Offer the frame at `path`, recording the verdict in `outcome`.
    ///
    /// Missing or unreadable frames are logged, recorded as skipped and
    /// treated as not kept. Returns whether the frame was kept.
    pub fn push_frame(&mut self, path: &Path, outcome: &mut DedupOutcome) -> bool {
        match self.consider_path(path) {
            Ok(true) => {
                debug!("Keeping {}", path.display());
                outcome.kept.push(path.to_path_buf());
                true
            }
            Ok(false) => {
                debug!("Discarding near-duplicate {}", path.display());
                outcome.discarded.push(path.to_path_buf());
                false
            }
            Err(error) => {
                warn!("Skipping unreadable frame: {error}");
                outcome.skipped.push(SkippedFrame {
                    path: path.to_path_buf(),
                    reason: error.to_string(),
                });
                false
            }
        }
    }

    /// Hashes of the frames kept so far, in keep order.
    pub fn kept_hashes(&self) -> &[PerceptualHash] {
        &self.kept
    }

    /// Number of frames kept so far.
    pub fn len(&self) -> usize {
        self.kept.len()
    }

    /// Whether nothing has been kept yet.
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_THRESHOLD)
    }
}

/// A frame the pipeline could not process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFrame {
    /// The frame image.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Verdicts for a batch of frames.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Frames kept, in input order.
    pub kept: Vec<PathBuf>,
    /// Frames dropped as near-duplicates, in input order.
    pub discarded: Vec<PathBuf>,
    /// Frames that could not be read.
    pub skipped: Vec<SkippedFrame>,
}

/// Keep the frames of `paths` that are not near-duplicates of an earlier kept
/// frame. Unreadable frames are skipped with a warning.
pub fn deduplicate<P: AsRef<Path>>(paths: &[P], hash_threshold: u32) -> Vec<PathBuf> {
    deduplicate_frames(paths, hash_threshold).kept
}

/// Like [`deduplicate`] but reports discarded and skipped frames too.
pub fn deduplicate_frames<P: AsRef<Path>>(paths: &[P], hash_threshold: u32) -> DedupOutcome {
    let mut dedup = Deduplicator::new(hash_threshold);
    let mut outcome = DedupOutcome::default();
    for path in paths {
        dedup.push_frame(path.as_ref(), &mut outcome);
    }
    debug!(
        "Deduplication kept {} of {} frames",
        outcome.kept.len(),
        paths.len()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(bits: u64) -> PerceptualHash {
        PerceptualHash::from_bits(bits)
    }

    #[test]
    fn first_frame_is_always_kept() {
        let mut dedup = Deduplicator::new(64);
        assert!(dedup.consider(hash(0xdead_beef)));
        assert!(!dedup.consider(hash(0)));
    }

    #[test]
    fn distance_five_is_duplicate_at_ten_but_not_at_three() {
        let a = hash(0);
        let b = hash(0b11111);

        let mut loose = Deduplicator::new(10);
        assert!(loose.consider(a));
        assert!(!loose.consider(b));

        let mut strict = Deduplicator::new(3);
        assert!(strict.consider(a));
        assert!(strict.consider(b));
    }

    #[test]
    fn distance_equal_to_threshold_is_duplicate() {
        let mut dedup = Deduplicator::new(4);
        dedup.consider(hash(0));
        assert!(!dedup.consider(hash(0b1111)));
        assert!(dedup.consider(hash(0b11111)));
    }

    #[test]
    fn compares_against_every_kept_frame() {
        let mut dedup = Deduplicator::new(2);
        assert!(dedup.consider(hash(0)));
        assert!(dedup.consider(hash(0xff)));
        // Far from the first kept hash, close to the second.
        assert!(!dedup.consider(hash(0xfe)));
        assert_eq!(dedup.kept_hashes(), &[hash(0), hash(0xff)]);
    }

    #[test]
    fn threshold_zero_keeps_everything_distinct() {
        let mut dedup = Deduplicator::new(0);
        assert!(dedup.consider(hash(1)));
        assert!(dedup.consider(hash(3)));
        assert!(!dedup.consider(hash(3)));
    }

    #[test]
    fn unreadable_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("frame_0001.jpg");
        std::fs::write(&broken, b"not a jpeg").unwrap();

        let outcome = deduplicate_frames(&[&broken], 10);
        assert!(outcome.kept.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, broken);
    }

    #[test]
    fn missing_frames_are_skipped_too() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("frame_0003.jpg");

        let outcome = deduplicate_frames(&[&absent], 10);
        assert!(outcome.kept.is_empty());
        assert_eq!(outcome.skipped[0].path, absent);
        assert!(outcome.skipped[0].reason.contains("does not exist"));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let paths: [PathBuf; 0] = [];
        assert!(deduplicate(&paths, 10).is_empty());
    }
}
