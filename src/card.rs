//! Embedded card localisation.
//!
//! A "card" is a rectangular UI overlay (a music or video player widget, for
//! instance) drawn over a frame. Detection is a three-step heuristic:
//!
//! 1. propose stable regions with [`MserDetector`] on the frame's luma,
//! 2. merge every region box into a single union box,
//! 3. accept the union box only if it covers enough of the frame and is not
//!    too elongated.
//!
//! The union step is deliberately naive: two disjoint clusters of regions
//! become one box spanning both.
//!
//! # Example
//!
//! ```no_run
//! use scenecard::{CardOptions, CardOutcome};
//!
//! let frame = image::open("frame_0001.jpg")?;
//! let detection = scenecard::detect_card(&frame, &CardOptions::default());
//! match detection.outcome {
//!     CardOutcome::Found(crop) => crop.image.save("card.jpg")?,
//!     CardOutcome::NotFound { score, reason } => {
//!         println!("no card ({reason}, area_ratio={score:.3})");
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{fmt, path::Path};

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use log::debug;

use crate::{
    conversion,
    error::SceneCardError,
    mser::{MserDetector, MserOptions, RegionBox},
};

/// Colour of the debug rectangle.
const DEBUG_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);

/// Card detection thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct CardOptions {
    /// Smallest MSER region considered, in pixels. Default: 500.
    pub min_region_area: usize,
    /// Largest MSER region considered, as a fraction of the frame. Default: 0.5.
    pub max_region_fraction: f64,
    /// Smallest accepted `union area / frame area`. Default: 0.03.
    pub min_area_ratio: f64,
    /// Smallest accepted `width / height`. Default: 0.6.
    pub aspect_min: f64,
    /// Largest accepted `width / height`. Default: 1.6.
    pub aspect_max: f64,
    /// Produce an annotated copy of the frame. Default: false.
    pub debug: bool,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            min_region_area: 500,
            max_region_fraction: 0.5,
            min_area_ratio: 0.03,
            aspect_min: 0.6,
            aspect_max: 1.6,
            debug: false,
        }
    }
}

impl CardOptions {
    /// Options with every threshold at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the smallest accepted `union area / frame area`.
    #[must_use]
    pub fn with_min_area_ratio(mut self, ratio: f64) -> Self {
        self.min_area_ratio = ratio;
        self
    }

    /// Accepted aspect ratio band, inclusive.
    #[must_use]
    pub fn with_aspect_range(mut self, min: f64, max: f64) -> Self {
        self.aspect_min = min;
        self.aspect_max = max;
        self
    }

    /// Set the smallest MSER region considered, in pixels.
    #[must_use]
    pub fn with_min_region_area(mut self, area: usize) -> Self {
        self.min_region_area = area;
        self
    }

    /// Set the largest MSER region considered, as a fraction of the frame.
    #[must_use]
    pub fn with_max_region_fraction(mut self, fraction: f64) -> Self {
        self.max_region_fraction = fraction;
        self
    }

    /// Produce an annotated debug image alongside the outcome.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// # Errors
    ///
    /// Returns [`SceneCardError::InvalidConfiguration`] if a ratio is outside
    /// `[0, 1]`, the aspect band is empty or not positive, or
    /// `min_region_area` is zero.
    pub fn validate(&self) -> Result<(), SceneCardError> {
        let invalid = |message: String| Err(SceneCardError::InvalidConfiguration(message));

        if !(0.0..=1.0).contains(&self.min_area_ratio) {
            return invalid(format!(
                "min_area_ratio must be within [0, 1], got {}",
                self.min_area_ratio
            ));
        }
        if !(self.max_region_fraction > 0.0 && self.max_region_fraction <= 1.0) {
            return invalid(format!(
                "max_region_fraction must be within (0, 1], got {}",
                self.max_region_fraction
            ));
        }
        if !(self.aspect_min > 0.0 && self.aspect_min <= self.aspect_max)
            || !self.aspect_max.is_finite()
        {
            return invalid(format!(
                "aspect range must satisfy 0 < min <= max, got {}..{}",
                self.aspect_min, self.aspect_max
            ));
        }
        if self.min_region_area == 0 {
            return invalid("min_region_area must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Why a frame has no card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Region proposal found nothing.
    NoRegions,
    /// The union box covers less than `min_area_ratio` of the frame.
    TooSmall,
    /// The union box's aspect ratio is outside the accepted band.
    AspectOutOfRange,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::NoRegions => "no regions",
            Rejection::TooSmall => "too small",
            Rejection::AspectOutOfRange => "aspect out of range",
        };
        f.write_str(text)
    }
}

/// The union box of one frame's regions, with its geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardCandidate {
    pub bounds: RegionBox,
    /// `bounds.area() / frame area`.
    pub area_ratio: f64,
    /// `bounds.width() / bounds.height()`.
    pub aspect: f64,
}

impl CardCandidate {
    /// Measure `bounds` against a `frame_width`×`frame_height` frame.
    pub fn new(bounds: RegionBox, frame_width: u32, frame_height: u32) -> Self {
        let frame_area = frame_width as f64 * frame_height as f64;
        let area_ratio = if frame_area > 0.0 {
            bounds.area() as f64 / frame_area
        } else {
            0.0
        };
        let aspect = if bounds.height() > 0 {
            bounds.width() as f64 / bounds.height() as f64
        } else {
            f64::INFINITY
        };
        Self {
            bounds,
            area_ratio,
            aspect,
        }
    }

    /// Apply the geometric filter. Area is checked before aspect.
    pub fn check(&self, options: &CardOptions) -> Result<(), Rejection> {
        if self.area_ratio < options.min_area_ratio {
            return Err(Rejection::TooSmall);
        }
        if !(options.aspect_min..=options.aspect_max).contains(&self.aspect) {
            return Err(Rejection::AspectOutOfRange);
        }
        Ok(())
    }
}

/// An accepted card cut out of the colour frame.
#[derive(Debug, Clone)]
pub struct CardCrop {
    pub image: RgbImage,
    pub bounds: RegionBox,
    pub area_ratio: f64,
}

/// Detection verdict.
#[derive(Debug, Clone)]
pub enum CardOutcome {
    Found(CardCrop),
    NotFound {
        /// `area_ratio` of the rejected union box, 0.0 without regions.
        score: f64,
        reason: Rejection,
    },
}

/// Everything [`detect_card`] learned about one frame.
#[derive(Debug, Clone)]
pub struct CardDetection {
    pub outcome: CardOutcome,
    /// The union box, if any regions were found.
    pub candidate: Option<CardCandidate>,
    /// The frame with the union box drawn on it, when debugging is enabled
    /// and a candidate exists.
    pub debug_image: Option<RgbImage>,
}

impl CardDetection {
    /// `area_ratio` of the candidate, or 0.0.
    pub fn score(&self) -> f64 {
        match &self.outcome {
            CardOutcome::Found(crop) => crop.area_ratio,
            CardOutcome::NotFound { score, .. } => *score,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self.outcome, CardOutcome::Found(_))
    }

    pub fn crop(&self) -> Option<&CardCrop> {
        match &self.outcome {
            CardOutcome::Found(crop) => Some(crop),
            CardOutcome::NotFound { .. } => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match &self.outcome {
            CardOutcome::Found(_) => None,
            CardOutcome::NotFound { reason, .. } => Some(*reason),
        }
    }
}

/// Smallest box enclosing every box, or `None` for no boxes.
pub fn union_box<I>(boxes: I) -> Option<RegionBox>
where
    I: IntoIterator<Item = RegionBox>,
{
    boxes.into_iter().reduce(|merged, next| merged.union(&next))
}

/// Look for a card in `frame`.
///
/// Never fails: a frame without a card is a [`CardOutcome::NotFound`].
pub fn detect_card(frame: &DynamicImage, options: &CardOptions) -> CardDetection {
    let rgb = frame.to_rgb8();
    let (width, height) = rgb.dimensions();
    let frame_area = width as f64 * height as f64;

    let mser_options = MserOptions::default()
        .with_min_area(options.min_region_area)
        .with_max_area((options.max_region_fraction * frame_area) as usize);
    let regions = MserDetector::new(mser_options).detect(&conversion::luma_601(&rgb));
    debug!("{} stable regions in {width}x{height} frame", regions.len());

    let Some(bounds) = union_box(regions.iter().map(|region| region.bounds)) else {
        return CardDetection {
            outcome: CardOutcome::NotFound {
                score: 0.0,
                reason: Rejection::NoRegions,
            },
            candidate: None,
            debug_image: None,
        };
    };

    let candidate = CardCandidate::new(bounds, width, height);
    debug!(
        "Union box {bounds:?}: area_ratio={:.4} aspect={:.3}",
        candidate.area_ratio, candidate.aspect
    );

    let debug_image = options.debug.then(|| annotate(&rgb, bounds));

    let outcome = match candidate.check(options) {
        Ok(()) => CardOutcome::Found(CardCrop {
            image: image::imageops::crop_imm(
                &rgb,
                bounds.x1,
                bounds.y1,
                bounds.width(),
                bounds.height(),
            )
            .to_image(),
            bounds,
            area_ratio: candidate.area_ratio,
        }),
        Err(reason) => CardOutcome::NotFound {
            score: candidate.area_ratio,
            reason,
        },
    };

    CardDetection {
        outcome,
        candidate: Some(candidate),
        debug_image,
    }
}

/// Load the frame at `path` and look for a card in it.
///
/// # Errors
///
/// - [`SceneCardError::MissingInput`] if `path` does not exist.
/// - [`SceneCardError::ImageRead`] if it cannot be decoded.
pub fn detect_card_at(path: &Path, options: &CardOptions) -> Result<CardDetection, SceneCardError> {
    let frame = conversion::open_frame(path)?;
    Ok(detect_card(&frame, options))
}

/// Copy of `frame` with a 2 px green outline around `bounds`.
///
/// The outer stroke passes through both corners `(x1, y1)` and `(x2, y2)`,
/// so the right and bottom edges sit on the exclusive bound. Strokes past
/// the frame edge are clipped.
fn annotate(frame: &RgbImage, bounds: RegionBox) -> RgbImage {
    let mut annotated = frame.clone();
    let (x, y) = (bounds.x1 as i32, bounds.y1 as i32);
    let (width, height) = (bounds.width(), bounds.height());

    draw_hollow_rect_mut(
        &mut annotated,
        Rect::at(x, y).of_size(width + 1, height + 1),
        DEBUG_COLOUR,
    );
    if width > 1 && height > 1 {
        draw_hollow_rect_mut(
            &mut annotated,
            Rect::at(x + 1, y + 1).of_size(width - 1, height - 1),
            DEBUG_COLOUR,
        );
    }
    annotated
}
