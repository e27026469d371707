//! Configuration builder tests.

use std::time::Duration;

use scenecard::{
    CardOptions, DEFAULT_HASH_THRESHOLD, DEFAULT_SCENE_THRESHOLD, MserOptions, PipelineOptions,
    SceneCardError, SceneOptions,
};

#[test]
fn documented_defaults() {
    let options = PipelineOptions::default();
    assert_eq!(options.scene_options().threshold, DEFAULT_SCENE_THRESHOLD);
    assert_eq!(options.hash_threshold(), DEFAULT_HASH_THRESHOLD);
    assert!(!options.detects_cards());
    assert!(!options.is_parallel());

    let card = options.card_options();
    assert_eq!(card.min_region_area, 500);
    assert_eq!(card.max_region_fraction, 0.5);
    assert_eq!(card.min_area_ratio, 0.03);
    assert_eq!((card.aspect_min, card.aspect_max), (0.6, 1.6));
    assert!(!card.debug);

    let mser = MserOptions::default();
    assert_eq!(mser.delta, 5);
    assert_eq!(mser.max_variation, 0.25);
    assert_eq!(mser.min_diversity, 0.2);
}

#[test]
fn builders_chain() {
    let options = PipelineOptions::new()
        .with_scene_threshold(0.3)
        .with_hash_threshold(6)
        .with_card_detection(true)
        .with_parallel(true)
        .with_timeout(Duration::from_secs(30))
        .with_card_options(CardOptions::new().with_min_area_ratio(0.1).with_debug(true));

    assert_eq!(options.scene_options().threshold, 0.3);
    assert_eq!(options.scene_options().timeout, Some(Duration::from_secs(30)));
    assert_eq!(options.hash_threshold(), 6);
    assert!(options.detects_cards());
    assert!(options.is_parallel());
    assert_eq!(options.card_options().min_area_ratio, 0.1);
    assert!(options.card_options().debug);
    assert!(options.validate().is_ok());
}

#[test]
fn scene_options_replace_threshold_and_timeout() {
    let scene = SceneOptions::new(0.2)
        .with_max_frames(12)
        .with_jpeg_quality(75);
    let options = PipelineOptions::new().with_scene_options(scene.clone());
    assert_eq!(options.scene_options(), &scene);
}

#[test]
fn validation_names_the_offending_setting() {
    let cases = [
        (PipelineOptions::new().with_scene_threshold(1.5), "scene threshold"),
        (PipelineOptions::new().with_hash_threshold(100), "hash threshold"),
        (
            PipelineOptions::new().with_card_options(CardOptions::new().with_min_area_ratio(-0.5)),
            "min_area_ratio",
        ),
        (
            PipelineOptions::new()
                .with_card_options(CardOptions::new().with_max_region_fraction(1.5)),
            "max_region_fraction",
        ),
        (
            PipelineOptions::new()
                .with_scene_options(SceneOptions::default().with_jpeg_quality(0)),
            "JPEG quality",
        ),
    ];

    for (options, needle) in cases {
        match options.validate() {
            Err(SceneCardError::InvalidConfiguration(message)) => {
                assert!(message.contains(needle), "{message} should mention {needle}")
            }
            other => panic!("expected InvalidConfiguration for {needle}, got {other:?}"),
        }
    }
}

#[test]
fn debug_output_hides_callbacks() {
    let rendered = format!("{:?}", PipelineOptions::new());
    assert!(rendered.contains("hash_threshold: 10"));
    assert!(rendered.contains("has_cancellation: false"));
}
