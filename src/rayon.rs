//! Parallel card detection.
//!
//! Card detection is a pure function of one frame, so kept frames can be
//! fanned out across [`rayon`] workers with no shared state beyond the
//! progress tracker.
//!
//! The public switch is
//! [`PipelineOptions::with_parallel`](crate::PipelineOptions::with_parallel);
//! this module contains only the internal implementation.

use std::{path::PathBuf, sync::Mutex};

use ::rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    card::{self, CardDetection},
    config::PipelineOptions,
    error::SceneCardError,
    progress::{OperationType, ProgressTracker},
};

/// Detection result for one kept frame, keyed by sequence index.
pub(crate) type IndexedDetection = (u64, Result<CardDetection, SceneCardError>);

/// Run card detection on every `(index, path)` job across rayon threads.
///
/// Per-frame errors stay inside their slot. Results are returned in
/// sequence-index order regardless of completion order.
pub(crate) fn parallel_detect_cards(
    jobs: &[(u64, PathBuf)],
    options: &PipelineOptions,
) -> Result<Vec<IndexedDetection>, SceneCardError> {
    let tracker = Mutex::new(ProgressTracker::new(
        options.progress.clone(),
        OperationType::CardDetection,
        Some(jobs.len() as u64),
    ));

    let results: Result<Vec<IndexedDetection>, SceneCardError> = jobs
        .par_iter()
        .map(|(index, path)| {
            options.check_cancelled()?;
            let detection = card::detect_card_at(path, &options.card);
            if let Ok(mut tracker) = tracker.lock() {
                tracker.advance(Some(*index));
            }
            Ok((*index, detection))
        })
        .collect();

    let mut results = results?;
    results.sort_by_key(|(index, _)| *index);
    Ok(results)
}
