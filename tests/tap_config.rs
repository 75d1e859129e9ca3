use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use rtsp_frame_tap::{PixelFormat, TapConfig, TapOverrides};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "RTSP_TAP_CONFIG",
        "RTSP_TAP_URL",
        "RTSP_TAP_LATENCY_MS",
        "RTSP_TAP_DRAIN_TIMEOUT_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "url": "rtsp://camera-1/stream",
        "latency_ms": 200,
        "format": "BGR",
        "poll_interval_ms": 50,
        "drain_timeout_secs": 10,
        "queue": false
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("RTSP_TAP_CONFIG", file.path());
    std::env::set_var("RTSP_TAP_LATENCY_MS", "0");

    let cfg = TapConfig::load(TapOverrides::default()).expect("load config");

    assert_eq!(cfg.url, "rtsp://camera-1/stream");
    assert_eq!(cfg.latency_ms, Some(0));
    assert_eq!(cfg.expected_format, PixelFormat::Bgr);
    assert_eq!(cfg.poll_interval, Duration::from_millis(50));
    assert_eq!(cfg.drain_timeout, Duration::from_secs(10));
    assert!(!cfg.queue);
    assert!(!cfg.debug);

    clear_env();
}

#[test]
fn command_line_wins_over_env_and_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "url": "rtsp://from-file/a" }"#)
        .expect("write config");
    std::env::set_var("RTSP_TAP_URL", "rtsp://from-env/b");
    std::env::set_var("RTSP_TAP_DRAIN_TIMEOUT_SECS", "3");

    let cfg = TapConfig::load(TapOverrides {
        url: Some("rtsp://from-cli/c".to_string()),
        config_path: Some(file.path().to_path_buf()),
        debug: true,
        drain_timeout_secs: Some(1),
        ..TapOverrides::default()
    })
    .expect("load config");

    assert_eq!(cfg.url, "rtsp://from-cli/c");
    assert_eq!(cfg.drain_timeout, Duration::from_secs(1));
    assert!(cfg.debug);

    clear_env();
}

#[test]
fn missing_url_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = TapConfig::load(TapOverrides::default()).unwrap_err();
    assert!(err.to_string().contains("no RTSP URL"));
}

#[test]
fn invalid_env_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("RTSP_TAP_LATENCY_MS", "soon");
    let result = TapConfig::load(TapOverrides {
        url: Some("rtsp://camera/stream".to_string()),
        ..TapOverrides::default()
    });
    assert!(result.is_err());

    clear_env();
}

#[test]
fn unreadable_config_file_is_reported() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.json");
    let err = TapConfig::load(TapOverrides {
        url: Some("rtsp://camera/stream".to_string()),
        config_path: Some(missing),
        ..TapOverrides::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}
