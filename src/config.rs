//! Pipeline configuration.
//!
//! [`PipelineOptions`] is a builder that threads thresholds, progress
//! callbacks, cancellation tokens and other operational settings through a
//! [`Pipeline`](crate::Pipeline) run without polluting every function
//! signature.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use scenecard::{CardOptions, CancellationToken, PipelineOptions};
//!
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_scene_threshold(0.1)
//!     .with_hash_threshold(8)
//!     .with_card_detection(true)
//!     .with_card_options(CardOptions::default().with_debug(true))
//!     .with_timeout(Duration::from_secs(120))
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    card::CardOptions,
    dedup::DEFAULT_HASH_THRESHOLD,
    error::SceneCardError,
    progress::{CancellationToken, NoOpProgress, ProgressCallback},
    scene::SceneOptions,
};

/// Configuration for a pipeline run.
///
/// All fields have sensible defaults: scene threshold 0.05, hash threshold
/// 10, card detection off, sequential execution.
#[derive(Clone)]
pub struct PipelineOptions {
    pub(crate) scene: SceneOptions,
    pub(crate) hash_threshold: u32,
    pub(crate) card: CardOptions,
    pub(crate) detect_cards: bool,
    pub(crate) parallel: bool,
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("scene", &self.scene)
            .field("hash_threshold", &self.hash_threshold)
            .field("card", &self.card)
            .field("detect_cards", &self.detect_cards)
            .field("parallel", &self.parallel)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOptions {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self {
            scene: SceneOptions::default(),
            hash_threshold: DEFAULT_HASH_THRESHOLD,
            card: CardOptions::default(),
            detect_cards: false,
            parallel: false,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// Set the scene-change threshold in `[0, 1]`. Lower emits more frames.
    #[must_use]
    pub fn with_scene_threshold(mut self, threshold: f64) -> Self {
        self.scene.threshold = threshold;
        self
    }

    /// Replace all scene segmentation settings.
    #[must_use]
    pub fn with_scene_options(mut self, scene: SceneOptions) -> Self {
        self.scene = scene;
        self
    }

    /// Set the Hamming distance at or below which frames are duplicates.
    #[must_use]
    pub fn with_hash_threshold(mut self, threshold: u32) -> Self {
        self.hash_threshold = threshold;
        self
    }

    /// Replace the card detection thresholds.
    #[must_use]
    pub fn with_card_options(mut self, card: CardOptions) -> Self {
        self.card = card;
        self
    }

    /// Run card detection on every kept frame.
    #[must_use]
    pub fn with_card_detection(mut self, enabled: bool) -> Self {
        self.detect_cards = enabled;
        self
    }

    /// Fan card detection out across rayon workers.
    ///
    /// Has no effect unless the `rayon` feature is enabled.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled, the run stops at the next frame and
    /// returns [`SceneCardError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Give up decoding after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.scene.timeout = Some(timeout);
        self
    }

    pub fn scene_options(&self) -> &SceneOptions {
        &self.scene
    }

    pub fn hash_threshold(&self) -> u32 {
        self.hash_threshold
    }

    pub fn card_options(&self) -> &CardOptions {
        &self.card
    }

    pub fn detects_cards(&self) -> bool {
        self.detect_cards
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Check every threshold is in range.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCardError::InvalidConfiguration`] naming the first bad
    /// setting.
    pub fn validate(&self) -> Result<(), SceneCardError> {
        self.scene.validate()?;
        if self.hash_threshold > 64 {
            return Err(SceneCardError::InvalidConfiguration(format!(
                "hash threshold must be within 0..=64, got {}",
                self.hash_threshold
            )));
        }
        self.card.validate()
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), SceneCardError> {
        if self.is_cancelled() {
            Err(SceneCardError::Cancelled)
        } else {
            Ok(())
        }
    }
}
