//! Card detection tests against frames on disk.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use scenecard::{CardOptions, Rejection, RegionBox, SceneCardError, detect_card_at};

fn frame(width: u32, height: u32, rects: &[RegionBox]) -> RgbImage {
    let mut rgb = RgbImage::new(width, height);
    for rect in rects {
        for y in rect.y1..rect.y2 {
            for x in rect.x1..rect.x2 {
                rgb.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
    }
    rgb
}

fn save(dir: &Path, name: &str, image: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).expect("Failed to write frame");
    path
}

#[test]
fn player_overlay_is_cropped() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let rect = RegionBox::from_xywh(200, 75, 165, 150);
    let path = save(temporary_directory.path(), "frame_0001.png", &frame(550, 300, &[rect]));

    let detection = detect_card_at(&path, &CardOptions::default()).expect("Detection failed");
    let crop = detection.crop().expect("card should be found");

    assert_eq!(crop.bounds, rect);
    assert_eq!(crop.image.dimensions(), (165, 150));
    assert!(crop.image.pixels().all(|pixel| pixel[0] == 250));
    assert!((crop.area_ratio - 0.15).abs() < 1e-9);
}

#[test]
fn disjoint_overlays_merge_into_one_box() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let rects = [
        RegionBox::from_xywh(50, 50, 60, 60),
        RegionBox::from_xywh(200, 150, 60, 60),
    ];
    let path = save(temporary_directory.path(), "frame_0001.png", &frame(400, 300, &rects));

    let detection = detect_card_at(&path, &CardOptions::default()).expect("Detection failed");
    let crop = detection.crop().expect("union box should be accepted");
    assert_eq!(crop.bounds, RegionBox::from_xywh(50, 50, 210, 160));
    assert!((crop.area_ratio - 0.28).abs() < 1e-9);
}

#[test]
fn rejected_candidates_still_get_a_debug_image() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let rect = RegionBox::from_xywh(50, 130, 300, 40);
    let path = save(temporary_directory.path(), "frame_0001.png", &frame(400, 300, &[rect]));

    let options = CardOptions::default().with_debug(true);
    let detection = detect_card_at(&path, &options).expect("Detection failed");

    assert_eq!(detection.rejection(), Some(Rejection::AspectOutOfRange));
    assert!(detection.crop().is_none());
    let annotated = detection.debug_image.expect("debug image should exist");
    assert_eq!(*annotated.get_pixel(50, 130), Rgb([0, 255, 0]));
}

#[test]
fn relaxed_thresholds_accept_small_regions() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let rect = RegionBox::from_xywh(100, 100, 50, 50);
    let path = save(temporary_directory.path(), "frame_0001.png", &frame(500, 500, &[rect]));

    let strict = detect_card_at(&path, &CardOptions::default()).expect("Detection failed");
    assert_eq!(strict.rejection(), Some(Rejection::TooSmall));

    let relaxed = CardOptions::default().with_min_area_ratio(0.005);
    let detection = detect_card_at(&path, &relaxed).expect("Detection failed");
    assert!(detection.is_found());
}

#[test]
fn blank_frame_reports_no_regions() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = save(temporary_directory.path(), "frame_0001.png", &frame(320, 240, &[]));

    let detection = detect_card_at(&path, &CardOptions::default().with_debug(true))
        .expect("Detection failed");
    assert_eq!(detection.rejection(), Some(Rejection::NoRegions));
    assert_eq!(detection.score(), 0.0);
    assert!(detection.debug_image.is_none());
    assert_eq!(Rejection::NoRegions.to_string(), "no regions");
}

#[test]
fn corrupt_frame_is_an_image_read_error() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("frame_0001.jpg");
    std::fs::write(&path, b"\xff\xd8 not really").expect("Failed to write file");

    let error = detect_card_at(&path, &CardOptions::default()).unwrap_err();
    assert!(matches!(error, SceneCardError::ImageRead { .. }));
    assert!(error.is_frame_local());
}
