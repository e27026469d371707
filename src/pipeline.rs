//! The end-to-end pipeline: segment, deduplicate, detect cards.
//!
//! [`Pipeline::run`] decodes a video into scene frames inside a scratch
//! directory, keeps the visually distinct ones, copies them into the output
//! directory and optionally looks for an embedded card in each. The scratch
//! directory is removed when the run ends, whether it succeeded or not.
//!
//! # Example
//!
//! ```no_run
//! use scenecard::{Pipeline, PipelineOptions, SceneCardError};
//!
//! let options = PipelineOptions::new().with_card_detection(true);
//! let report = Pipeline::new(options).run("reel.mp4", "frames")?;
//!
//! for frame in &report.frames {
//!     match &frame.card {
//!         Some(card) if card.is_found() => {
//!             println!("{}: card (area_ratio={:.3})", frame.path.display(), card.score)
//!         }
//!         _ => println!("{}: no card", frame.path.display()),
//!     }
//! }
//! # Ok::<(), SceneCardError>(())
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::{
    card::{self, CardDetection, Rejection},
    config::PipelineOptions,
    conversion::{self, frame_file_name},
    dedup::{DedupOutcome, Deduplicator, SkippedFrame},
    error::SceneCardError,
    mser::RegionBox,
    progress::{OperationType, ProgressTracker},
    scene::{self, FfmpegSceneSource, SceneSource},
};

/// Name of the card output directory inside the output directory.
pub const CARDS_DIR: &str = "cards";

/// Card detection result for one kept frame, as written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CardReport {
    /// `area_ratio` of the union box, 0.0 without regions.
    pub score: f64,
    /// Union box, if any regions were found.
    pub bounds: Option<RegionBox>,
    /// Why no card was accepted. `None` when one was.
    pub rejection: Option<Rejection>,
    /// Where the crop was written, for accepted cards.
    pub crop_path: Option<PathBuf>,
    /// Where the annotated frame was written, when debugging.
    pub debug_path: Option<PathBuf>,
}

impl CardReport {
    pub fn is_found(&self) -> bool {
        self.rejection.is_none()
    }
}

/// A frame that survived deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct KeptFrame {
    /// 1-based scene sequence index.
    pub index: u64,
    /// Location in the output directory.
    pub path: PathBuf,
    /// Card detection result, when enabled.
    pub card: Option<CardReport>,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    /// Number of frames the scene segmenter produced.
    pub scene_frame_count: usize,
    /// Kept frames in temporal order.
    pub frames: Vec<KeptFrame>,
    /// Frames that could not be read during deduplication or detection.
    pub skipped: Vec<SkippedFrame>,
}

impl PipelineReport {
    /// `true` when no frame was kept.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame_paths(&self) -> Vec<&Path> {
        self.frames.iter().map(|frame| frame.path.as_path()).collect()
    }

    /// Kept frames with an accepted card.
    pub fn cards(&self) -> impl Iterator<Item = (&KeptFrame, &CardReport)> {
        self.frames
            .iter()
            .filter_map(|frame| frame.card.as_ref().map(|card| (frame, card)))
            .filter(|(_, card)| card.is_found())
    }
}

/// Coordinates one video through every stage.
pub struct Pipeline<S = FfmpegSceneSource> {
    source: S,
    options: PipelineOptions,
}

impl Pipeline<FfmpegSceneSource> {
    /// A pipeline decoding with FFmpeg.
    pub fn new(options: PipelineOptions) -> Self {
        Self::with_source(FfmpegSceneSource, options)
    }
}

impl<S: SceneSource> Pipeline<S> {
    /// A pipeline decoding with a custom [`SceneSource`].
    pub fn with_source(source: S, options: PipelineOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run every stage on `video_path`, writing results into `output_dir`.
    ///
    /// A video without scene changes yields an empty report; the later
    /// stages are not run.
    ///
    /// # Errors
    ///
    /// - [`SceneCardError::InvalidConfiguration`] for out-of-range options.
    /// - [`SceneCardError::MissingInput`] if `video_path` does not exist.
    /// - [`SceneCardError::Decode`] if the video cannot be decoded.
    /// - [`SceneCardError::Cancelled`] if the cancellation token fires.
    /// - [`SceneCardError::IoError`] if output cannot be written.
    ///
    /// Unreadable frames are not errors; they are listed in
    /// [`PipelineReport::skipped`].
    pub fn run(
        &mut self,
        video_path: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<PipelineReport, SceneCardError> {
        let video_path = video_path.as_ref();
        let output_dir = output_dir.as_ref();

        self.options.validate()?;
        if !video_path.exists() {
            return Err(SceneCardError::MissingInput {
                path: video_path.to_path_buf(),
            });
        }
        self.options.check_cancelled()?;

        let scratch = tempfile::Builder::new().prefix("scenecard_").tempdir()?;
        debug!("Scratch directory {}", scratch.path().display());

        let options = &self.options;
        let mut tracker = ProgressTracker::new(
            options.progress.clone(),
            OperationType::SceneSegmentation,
            None,
        );
        let scene_frames = scene::segment_with(
            &mut self.source,
            video_path,
            scratch.path(),
            &options.scene,
            &mut |index| {
                options.check_cancelled()?;
                tracker.advance(Some(index));
                Ok(())
            },
        )?;

        if scene_frames.is_empty() {
            info!("No scene changes in {}", video_path.display());
            return Ok(PipelineReport::default());
        }

        fs::create_dir_all(output_dir)?;
        let mut report = self.keep_distinct(&scene_frames, output_dir)?;

        if self.options.detect_cards && !report.frames.is_empty() {
            self.options.check_cancelled()?;
            self.detect_cards(&mut report, output_dir)?;
        }

        info!(
            "Kept {} of {} scene frames from {}",
            report.frames.len(),
            report.scene_frame_count,
            video_path.display()
        );
        Ok(report)
    }

    /// Deduplicate scratch frames and copy the survivors to `output_dir`.
    fn keep_distinct(
        &self,
        scene_frames: &[PathBuf],
        output_dir: &Path,
    ) -> Result<PipelineReport, SceneCardError> {
        self.options.check_cancelled()?;

        let mut dedup = Deduplicator::new(self.options.hash_threshold);
        let mut outcome = DedupOutcome::default();
        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::Deduplication,
            Some(scene_frames.len() as u64),
        );
        let mut report = PipelineReport {
            scene_frame_count: scene_frames.len(),
            ..PipelineReport::default()
        };

        for (position, path) in scene_frames.iter().enumerate() {
            self.options.check_cancelled()?;
            let index = conversion::sequence_index(path).unwrap_or(position as u64 + 1);

            if dedup.push_frame(path, &mut outcome) {
                let destination = output_dir.join(frame_file_name(index));
                fs::copy(path, &destination)?;
                report.frames.push(KeptFrame {
                    index,
                    path: destination,
                    card: None,
                });
            }
            tracker.advance(Some(index));
        }

        // Scratch paths vanish with the run; report the bare names.
        report.skipped = outcome
            .skipped
            .into_iter()
            .map(|skipped| SkippedFrame {
                path: skipped
                    .path
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or(skipped.path),
                reason: skipped.reason,
            })
            .collect();

        info!(
            "Deduplication kept {} frames, discarded {}, skipped {}",
            report.frames.len(),
            outcome.discarded.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn detect_cards(
        &self,
        report: &mut PipelineReport,
        output_dir: &Path,
    ) -> Result<(), SceneCardError> {
        let cards_dir = output_dir.join(CARDS_DIR);
        fs::create_dir_all(&cards_dir)?;

        let jobs: Vec<(u64, PathBuf)> = report
            .frames
            .iter()
            .map(|frame| (frame.index, frame.path.clone()))
            .collect();
        let detections = self.run_detection(&jobs)?;

        let mut found = 0;
        for (index, detection) in detections {
            let detection = match detection {
                Ok(detection) => detection,
                Err(error) if error.is_frame_local() => {
                    warn!("Skipping card detection for frame {index}: {error}");
                    report.skipped.push(SkippedFrame {
                        path: PathBuf::from(frame_file_name(index)),
                        reason: error.to_string(),
                    });
                    continue;
                }
                Err(error) => return Err(error),
            };

            let card = self.write_card(&cards_dir, index, &detection)?;
            if card.is_found() {
                found += 1;
            }
            if let Some(frame) = report.frames.iter_mut().find(|frame| frame.index == index) {
                frame.card = Some(card);
            }
        }

        info!("Found cards in {found} of {} frames", jobs.len());
        Ok(())
    }

    fn run_detection(
        &self,
        jobs: &[(u64, PathBuf)],
    ) -> Result<Vec<(u64, Result<CardDetection, SceneCardError>)>, SceneCardError> {
        #[cfg(feature = "rayon")]
        {
            if self.options.parallel {
                debug!("Detecting cards in parallel over {} frames", jobs.len());
                return crate::rayon::parallel_detect_cards(jobs, &self.options);
            }
        }

        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::CardDetection,
            Some(jobs.len() as u64),
        );
        let mut detections = Vec::with_capacity(jobs.len());
        for (index, path) in jobs {
            self.options.check_cancelled()?;
            detections.push((*index, card::detect_card_at(path, &self.options.card)));
            tracker.advance(Some(*index));
        }
        Ok(detections)
    }

    fn write_card(
        &self,
        cards_dir: &Path,
        index: u64,
        detection: &CardDetection,
    ) -> Result<CardReport, SceneCardError> {
        let quality = self.options.scene.jpeg_quality;

        let crop_path = match detection.crop() {
            Some(crop) => {
                let path = cards_dir.join(format!("frame_{index:04}_card.jpg"));
                conversion::save_jpeg(&crop.image, &path, quality)?;
                debug!("Card for frame {index} written to {}", path.display());
                Some(path)
            }
            None => None,
        };

        let debug_path = match &detection.debug_image {
            Some(annotated) => {
                let path = cards_dir.join(format!("frame_{index:04}_debug.jpg"));
                conversion::save_jpeg(annotated, &path, quality)?;
                Some(path)
            }
            None => None,
        };

        Ok(CardReport {
            score: detection.score(),
            bounds: detection.candidate.map(|candidate| candidate.bounds),
            rejection: detection.rejection(),
            crop_path,
            debug_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::{CancellationToken, SceneHandler, SceneOptions};

    /// Emits canned frames without touching FFmpeg.
    struct CannedFrames(Vec<RgbImage>);

    impl SceneSource for CannedFrames {
        fn scenes(
            &mut self,
            _video_path: &Path,
            _options: &SceneOptions,
            handler: &mut SceneHandler<'_>,
        ) -> Result<(), SceneCardError> {
            for frame in &self.0 {
                if handler(frame.clone())? == ControlFlow::Break(()) {
                    break;
                }
            }
            Ok(())
        }
    }

    fn stub_video(dir: &Path) -> PathBuf {
        let video = dir.join("clip.mp4");
        fs::write(&video, b"stub").unwrap();
        video
    }

    #[test]
    fn identical_frames_collapse_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let video = stub_video(dir.path());
        let frame = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 90]));

        let mut pipeline = Pipeline::with_source(
            CannedFrames(vec![frame.clone(), frame.clone(), frame]),
            PipelineOptions::new(),
        );
        let report = pipeline.run(&video, dir.path().join("out")).unwrap();

        assert_eq!(report.scene_frame_count, 3);
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.frames[0].index, 1);
        assert!(report.frames[0].path.ends_with("frame_0001.jpg"));
    }

    #[test]
    fn no_scene_frames_yields_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let video = stub_video(dir.path());

        let mut pipeline = Pipeline::with_source(
            CannedFrames(Vec::new()),
            PipelineOptions::new().with_card_detection(true),
        );
        let report = pipeline.run(&video, dir.path().join("out")).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.scene_frame_count, 0);
        assert!(!dir.path().join("out").join(CARDS_DIR).exists());
    }

    #[test]
    fn unreadable_scene_frames_are_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        let out = dir.path().join("out");
        fs::create_dir_all(&scratch).unwrap();
        fs::create_dir_all(&out).unwrap();

        let good = scratch.join("frame_0001.jpg");
        RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 90]))
            .save(&good)
            .unwrap();
        let broken = scratch.join("frame_0002.jpg");
        fs::write(&broken, b"truncated").unwrap();

        let pipeline = Pipeline::with_source(CannedFrames(Vec::new()), PipelineOptions::new());
        let report = pipeline.keep_distinct(&[good, broken], &out).unwrap();

        assert_eq!(report.scene_frame_count, 2);
        assert_eq!(report.frames.len(), 1);
        assert!(out.join("frame_0001.jpg").exists());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, PathBuf::from("frame_0002.jpg"));
        assert!(!report.skipped[0].reason.is_empty());
    }

    #[test]
    fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let video = stub_video(dir.path());
        let token = CancellationToken::new();
        token.cancel();

        let mut pipeline = Pipeline::with_source(
            CannedFrames(vec![RgbImage::new(8, 8)]),
            PipelineOptions::new().with_cancellation(token),
        );
        let error = pipeline.run(&video, dir.path().join("out")).unwrap_err();
        assert!(matches!(error, SceneCardError::Cancelled));
    }
}
