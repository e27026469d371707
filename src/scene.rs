//! Scene segmentation.
//!
//! Decodes a video and writes one still image per scene transition, using
//! FFmpeg's `select` filter with the `scene` score: a frame is emitted when
//! its difference from the previous frame is strictly greater than the
//! threshold.
//!
//! The decoding engine sits behind [`SceneSource`], so anything that can
//! produce an ordered stream of RGB frames can drive [`segment`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use scenecard::{FfmpegSceneSource, SceneCardError, SceneOptions};
//!
//! let options = SceneOptions::new(0.3);
//! let frames = scenecard::segment(
//!     &mut FfmpegSceneSource,
//!     Path::new("reel.mp4"),
//!     Path::new("frames"),
//!     &options,
//! )?;
//! println!("{} scene frames", frames.len());
//! # Ok::<(), SceneCardError>(())
//! ```

use std::{
    fs,
    ops::ControlFlow,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use ffmpeg_next::{
    Rational, codec::context::Context as CodecContext, decoder::Video as VideoDecoder,
    filter::Graph as FilterGraph, frame::Video as VideoFrame, media::Type,
};
use ffmpeg_sys_next::AVPixelFormat;
use image::RgbImage;
use log::{debug, info};

use crate::{
    conversion::{self, frame_file_name},
    error::SceneCardError,
    ffmpeg,
};

/// Default scene-change score threshold.
pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.05;

/// Default JPEG quality for written frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Scene segmentation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneOptions {
    /// Scene score a frame must exceed to be emitted, in `[0, 1]`.
    ///
    /// Lower values emit more frames. Default: 0.05.
    pub threshold: f64,
    /// Wall-clock budget for decoding. Exceeding it fails with
    /// [`SceneCardError::Decode`].
    pub timeout: Option<Duration>,
    /// Stop after this many frames have been emitted.
    pub max_frames: Option<usize>,
    /// JPEG quality (1–100) of written frames.
    pub jpeg_quality: u8,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SCENE_THRESHOLD,
            timeout: None,
            max_frames: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl SceneOptions {
    /// Options with the given threshold and defaults otherwise.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Set the scene-change score a frame must exceed to be emitted.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Give up decoding after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stop after `max_frames` emitted frames.
    #[must_use]
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Set the JPEG quality (1–100) of written frames.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Check every field is in range.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCardError::InvalidConfiguration`] naming the first bad
    /// field.
    pub fn validate(&self) -> Result<(), SceneCardError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(SceneCardError::InvalidConfiguration(format!(
                "scene threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(SceneCardError::InvalidConfiguration(format!(
                "JPEG quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.max_frames == Some(0) {
            return Err(SceneCardError::InvalidConfiguration(
                "max_frames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Callback receiving each scene frame in temporal order.
///
/// Returning [`ControlFlow::Break`] stops decoding early without error.
pub type SceneHandler<'a> = dyn FnMut(RgbImage) -> Result<ControlFlow<()>, SceneCardError> + 'a;

/// A decoding engine that emits scene-change frames.
pub trait SceneSource {
    /// Decode `video_path` and hand every frame whose scene score exceeds
    /// `options.threshold` to `handler`, in temporal order.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCardError::Decode`] if the video cannot be opened or
    /// decoded, and propagates any error returned by `handler`.
    fn scenes(
        &mut self,
        video_path: &Path,
        options: &SceneOptions,
        handler: &mut SceneHandler<'_>,
    ) -> Result<(), SceneCardError>;
}

/// Scene source backed by FFmpeg's `select` filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegSceneSource;

impl SceneSource for FfmpegSceneSource {
    fn scenes(
        &mut self,
        video_path: &Path,
        options: &SceneOptions,
        handler: &mut SceneHandler<'_>,
    ) -> Result<(), SceneCardError> {
        ffmpeg::initialize(video_path)?;

        let mut input = ffmpeg_next::format::input(video_path)
            .map_err(|error| SceneCardError::decode(video_path, error.to_string()))?;

        let (stream_index, time_base, mut decoder) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or_else(|| SceneCardError::decode(video_path, "no video stream"))?;
            let decoder = CodecContext::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().video())
                .map_err(|error| SceneCardError::decode(video_path, error.to_string()))?;
            (stream.index(), stream.time_base(), decoder)
        };

        debug!(
            "Segmenting {} (stream={}, threshold={})",
            video_path.display(),
            stream_index,
            options.threshold
        );

        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        let mut session = DecodeSession {
            video_path,
            threshold: options.threshold,
            time_base,
            graph: None,
            decoded: VideoFrame::empty(),
            filtered: VideoFrame::empty(),
        };

        for (stream, packet) in input.packets() {
            if let (Some(deadline), Some(timeout)) = (deadline, options.timeout)
                && Instant::now() > deadline
            {
                return Err(SceneCardError::decode(
                    video_path,
                    format!("timed out after {timeout:?}"),
                ));
            }

            if stream.index() != stream_index {
                continue;
            }

            decoder
                .send_packet(&packet)
                .map_err(|error| SceneCardError::decode(video_path, error.to_string()))?;

            if session.receive(&mut decoder, handler)?.is_break() {
                return Ok(());
            }
        }

        decoder
            .send_eof()
            .map_err(|error| SceneCardError::decode(video_path, error.to_string()))?;
        if session.receive(&mut decoder, handler)?.is_break() {
            return Ok(());
        }

        session.finish(handler)?;
        Ok(())
    }
}

/// Decoder output state for one [`FfmpegSceneSource::scenes`] call.
struct DecodeSession<'a> {
    video_path: &'a Path,
    threshold: f64,
    time_base: Rational,
    graph: Option<FilterGraph>,
    decoded: VideoFrame,
    filtered: VideoFrame,
}

impl DecodeSession<'_> {
    /// Pull every frame the decoder has ready through the select graph.
    fn receive(
        &mut self,
        decoder: &mut VideoDecoder,
        handler: &mut SceneHandler<'_>,
    ) -> Result<ControlFlow<()>, SceneCardError> {
        while decoder.receive_frame(&mut self.decoded).is_ok() {
            if self.graph.is_none() {
                self.graph = Some(self.build_graph()?);
            }
            let Some(graph) = self.graph.as_mut() else {
                continue;
            };

            graph
                .get("in")
                .ok_or_else(|| SceneCardError::decode(self.video_path, "filter 'in' not found"))?
                .source()
                .add(&self.decoded)
                .map_err(|error| {
                    SceneCardError::decode(self.video_path, format!("failed to feed filter: {error}"))
                })?;

            if self.drain(handler)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Flush the filter graph and emit whatever it still holds.
    fn finish(&mut self, handler: &mut SceneHandler<'_>) -> Result<(), SceneCardError> {
        let Some(graph) = self.graph.as_mut() else {
            debug!("No frames decoded from {}", self.video_path.display());
            return Ok(());
        };
        if let Some(mut source) = graph.get("in") {
            // The graph may already be at EOF; nothing further to emit then.
            let _ = source.source().flush();
        }
        self.drain(handler)?;
        Ok(())
    }

    fn drain(&mut self, handler: &mut SceneHandler<'_>) -> Result<ControlFlow<()>, SceneCardError> {
        loop {
            let received = match self.graph.as_mut().and_then(|graph| graph.get("out")) {
                Some(mut sink) => sink.sink().frame(&mut self.filtered).is_ok(),
                None => false,
            };
            if !received {
                return Ok(ControlFlow::Continue(()));
            }

            let width = self.filtered.width();
            let height = self.filtered.height();
            let buffer = conversion::frame_to_buffer(&self.filtered, width, height, 3);
            let image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
                SceneCardError::decode(self.video_path, "filtered frame has an unexpected size")
            })?;

            if let Some(pts) = self.filtered.pts() {
                debug!(
                    "Scene change at {:.3}s",
                    conversion::pts_to_seconds(pts, self.time_base)
                );
            }

            if handler(image)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
    }

    /// Build `buffer -> select -> format=rgb24 -> buffersink` to match the
    /// first decoded frame.
    fn build_graph(&self) -> Result<FilterGraph, SceneCardError> {
        let graph_error = |what: &str, error: ffmpeg_next::Error| {
            SceneCardError::decode(self.video_path, format!("{what}: {error}"))
        };

        let pixel_format = AVPixelFormat::from(self.decoded.format()) as i32;
        // The safe accessors mis-map some discriminants, so read the raw fields.
        let (color_space, color_range) = unsafe {
            let ptr = self.decoded.as_ptr();
            ((*ptr).colorspace as i32, (*ptr).color_range as i32)
        };

        let buffer_args = format!(
            "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect=1/1:colorspace={}:range={}",
            self.decoded.width(),
            self.decoded.height(),
            pixel_format,
            self.time_base.numerator(),
            self.time_base.denominator(),
            color_space,
            color_range,
        );

        let mut graph = FilterGraph::new();
        let buffer = ffmpeg_next::filter::find("buffer").ok_or_else(|| {
            SceneCardError::decode(self.video_path, "FFmpeg 'buffer' filter not found")
        })?;
        let buffersink = ffmpeg_next::filter::find("buffersink").ok_or_else(|| {
            SceneCardError::decode(self.video_path, "FFmpeg 'buffersink' filter not found")
        })?;

        graph
            .add(&buffer, "in", &buffer_args)
            .map_err(|error| graph_error("failed to add buffer filter", error))?;
        graph
            .add(&buffersink, "out", "")
            .map_err(|error| graph_error("failed to add buffersink filter", error))?;

        let select_spec = format!(
            "select='gt(scene,{})',format=pix_fmts=rgb24",
            self.threshold
        );
        graph
            .output("in", 0)
            .map_err(|error| graph_error("filter graph output error", error))?
            .input("out", 0)
            .map_err(|error| graph_error("filter graph input error", error))?
            .parse(&select_spec)
            .map_err(|error| graph_error("filter graph parse error", error))?;
        graph
            .validate()
            .map_err(|error| graph_error("filter graph validation", error))?;

        Ok(graph)
    }
}

/// Segment `video_path` into scene frames written to `output_dir`.
///
/// Frames are named `frame_0001.jpg`, `frame_0002.jpg`, … in temporal order.
/// Zero frames is a valid result. `output_dir` is created if needed.
///
/// # Errors
///
/// - [`SceneCardError::InvalidConfiguration`] if `options` are out of range.
/// - [`SceneCardError::MissingInput`] if `video_path` does not exist.
/// - [`SceneCardError::Decode`] if the engine cannot open or decode it. Any
///   frames already written are removed.
pub fn segment<S: SceneSource + ?Sized>(
    source: &mut S,
    video_path: &Path,
    output_dir: &Path,
    options: &SceneOptions,
) -> Result<Vec<PathBuf>, SceneCardError> {
    segment_with(source, video_path, output_dir, options, &mut |_| Ok(()))
}

/// [`segment`] with a hook called after each frame is written.
pub(crate) fn segment_with<S: SceneSource + ?Sized>(
    source: &mut S,
    video_path: &Path,
    output_dir: &Path,
    options: &SceneOptions,
    on_frame: &mut dyn FnMut(u64) -> Result<(), SceneCardError>,
) -> Result<Vec<PathBuf>, SceneCardError> {
    options.validate()?;
    if !video_path.exists() {
        return Err(SceneCardError::MissingInput {
            path: video_path.to_path_buf(),
        });
    }
    fs::create_dir_all(output_dir)?;

    let mut written: Vec<PathBuf> = Vec::new();
    let result = source.scenes(video_path, options, &mut |image| {
        let index = written.len() as u64 + 1;
        let path = output_dir.join(frame_file_name(index));
        written.push(path.clone());
        conversion::save_jpeg(&image, &path, options.jpeg_quality)?;
        on_frame(index)?;

        if options
            .max_frames
            .is_some_and(|max_frames| written.len() >= max_frames)
        {
            debug!("Reached max_frames={}", written.len());
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    });

    if let Err(error) = result {
        for path in &written {
            let _ = fs::remove_file(path);
        }
        return Err(error);
    }

    info!(
        "Segmented {} into {} scene frames",
        video_path.display(),
        written.len()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    struct SolidFrames(Vec<u8>);

    impl SceneSource for SolidFrames {
        fn scenes(
            &mut self,
            _video_path: &Path,
            _options: &SceneOptions,
            handler: &mut SceneHandler<'_>,
        ) -> Result<(), SceneCardError> {
            for &value in &self.0 {
                if handler(RgbImage::from_pixel(32, 24, Rgb([value, value, value])))?.is_break() {
                    break;
                }
            }
            Ok(())
        }
    }

    struct FailingSource;

    impl SceneSource for FailingSource {
        fn scenes(
            &mut self,
            video_path: &Path,
            _options: &SceneOptions,
            handler: &mut SceneHandler<'_>,
        ) -> Result<(), SceneCardError> {
            let _ = handler(RgbImage::new(8, 8))?;
            Err(SceneCardError::decode(video_path, "corrupt packet"))
        }
    }

    fn video_in(dir: &Path) -> PathBuf {
        let video = dir.join("clip.mp4");
        fs::write(&video, b"stub").unwrap();
        video
    }

    #[test]
    fn frames_are_numbered_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(dir.path());
        let out = dir.path().join("frames");

        let frames = segment(
            &mut SolidFrames(vec![0, 128, 255]),
            &video,
            &out,
            &SceneOptions::default(),
        )
        .unwrap();

        let names: Vec<String> = frames
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["frame_0001.jpg", "frame_0002.jpg", "frame_0003.jpg"]);
        assert!(frames.iter().all(|path| path.exists()));
    }

    #[test]
    fn max_frames_stops_early() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(dir.path());
        let options = SceneOptions::default().with_max_frames(2);

        let frames = segment(&mut SolidFrames(vec![1, 2, 3, 4]), &video, dir.path(), &options).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn missing_video_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let error = segment(
            &mut SolidFrames(vec![]),
            &dir.path().join("absent.mp4"),
            dir.path(),
            &SceneOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(error, SceneCardError::MissingInput { .. }));
    }

    #[test]
    fn decode_failure_leaves_no_partial_frames() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(dir.path());
        let out = dir.path().join("frames");

        let error = segment(&mut FailingSource, &video, &out, &SceneOptions::default()).unwrap_err();
        assert!(matches!(error, SceneCardError::Decode { .. }));
        assert!(!out.join("frame_0001.jpg").exists());
    }

    #[test]
    fn options_validation() {
        assert!(SceneOptions::default().validate().is_ok());
        assert!(SceneOptions::new(1.5).validate().is_err());
        assert!(SceneOptions::new(f64::NAN).validate().is_err());
        assert!(SceneOptions::default().with_jpeg_quality(0).validate().is_err());
        assert!(SceneOptions::default().with_max_frames(0).validate().is_err());
    }
}
