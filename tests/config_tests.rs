// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use gpucap::Config;
use gpucap::constants::{
    DEFAULT_HEIGHT, DEFAULT_RENDER_NODE, DEFAULT_WIDTH, H264Profile, MAX_BITRATE_KBPS,
};
use gpucap::convert::BackendKind;
use gpucap::errors::AppError;
use std::io::Write;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!((config.width, config.height), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
    assert_eq!(config.render_node, DEFAULT_RENDER_NODE);
    assert_eq!(config.profile, H264Profile::Baseline);
    assert_eq!(config.backend, BackendKind::Gpu);
    assert!(config.zero_copy);
    assert!(config.output.is_none(), "stdout should be the default sink");
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "width": 640, "height": 480, "profile": "high", "backend": "software" }}"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!((config.width, config.height), (640, 480));
    assert_eq!(config.profile, H264Profile::High);
    assert_eq!(config.backend, BackendKind::Software);
    assert_eq!(config.fps, Config::default().fps);
    assert_eq!(config.capture_device, Config::default().capture_device);
}

#[test]
fn test_round_trip_through_json() {
    let config = Config {
        width: 1920,
        height: 1080,
        encoder: Some("x264enc".into()),
        ..Config::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_malformed_file_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ \"width\": \"wide\" }}").unwrap();
    assert!(matches!(Config::load(file.path()), Err(AppError::Config(_))));
}

#[test]
fn test_explicit_missing_path_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(
        Config::load_or_default(Some(&missing)),
        Err(AppError::Config(_))
    ));
}

#[test]
fn test_validate_rejects_unusable_rates() {
    assert!(Config::default().validate().is_ok());

    let still = Config {
        fps: 0,
        ..Config::default()
    };
    assert!(matches!(still.validate(), Err(AppError::Config(_))));

    for bitrate_kbps in [0, MAX_BITRATE_KBPS + 1, u32::MAX] {
        let config = Config {
            bitrate_kbps,
            ..Config::default()
        };
        assert!(
            matches!(config.validate(), Err(AppError::Config(_))),
            "{} kbps accepted",
            bitrate_kbps
        );
    }

    let fastest = Config {
        bitrate_kbps: MAX_BITRATE_KBPS,
        ..Config::default()
    };
    assert!(fastest.validate().is_ok());
    assert!(MAX_BITRATE_KBPS.checked_mul(1000).is_some());
}

#[test]
fn test_frame_budget() {
    let config = Config {
        timeout_secs: 10,
        fps: 30,
        ..Config::default()
    };
    assert_eq!(config.frame_budget(), Some(300));

    let unbounded = Config {
        timeout_secs: 0,
        ..Config::default()
    };
    assert_eq!(unbounded.frame_budget(), None);
}
