//! Error handling integration tests.
//!
//! These tests verify that meaningful errors are returned for various
//! failure conditions.

use std::path::{Path, PathBuf};

use scenecard::{CardOptions, PerceptualHash, SceneCardError, detect_card_at};

#[test]
fn missing_input_names_the_path() {
    let error = detect_card_at(Path::new("no_such_frame.jpg"), &CardOptions::default()).unwrap_err();
    let error_message = error.to_string();
    assert!(
        error_message.contains("Input file does not exist") && error_message.contains("no_such_frame.jpg"),
        "Error message should name the missing file: {error_message}",
    );
    assert!(!error.is_frame_local());
}

#[test]
fn missing_frame_maps_the_same_for_hashing_and_detection() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let absent = temporary_directory.path().join("frame_0004.jpg");

    let hash_error = PerceptualHash::from_path(&absent).unwrap_err();
    let card_error = detect_card_at(&absent, &CardOptions::default()).unwrap_err();
    for error in [hash_error, card_error] {
        match error {
            SceneCardError::MissingInput { path } => assert_eq!(path, absent),
            other => panic!("expected MissingInput, got {other:?}"),
        }
    }
}

#[test]
fn unreadable_image_is_frame_local() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("frame_0007.jpg");
    std::fs::write(&invalid_file_path, b"this is not an image").expect("Failed to write file");

    let error = PerceptualHash::from_path(&invalid_file_path).unwrap_err();
    match &error {
        SceneCardError::ImageRead { path, reason } => {
            assert_eq!(path, &invalid_file_path);
            assert!(!reason.is_empty());
        }
        other => panic!("expected ImageRead, got {other:?}"),
    }
    assert!(error.is_frame_local());
}

#[test]
fn decode_error_message_carries_reason() {
    let error = SceneCardError::Decode {
        path: PathBuf::from("reel.mp4"),
        reason: "moov atom not found".to_string(),
    };
    assert_eq!(
        error.to_string(),
        "Failed to decode video at reel.mp4: moov atom not found"
    );
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
    let error: SceneCardError = io.into();
    assert!(matches!(error, SceneCardError::IoError(_)));
    assert!(error.to_string().contains("read-only"));
}

#[test]
fn cancelled_is_not_frame_local() {
    assert!(!SceneCardError::Cancelled.is_frame_local());
    assert_eq!(SceneCardError::Cancelled.to_string(), "Operation cancelled");
}
