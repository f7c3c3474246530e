//! `marquee init` writes the effective configuration once.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use marquee::MarqueeConfig;
use marquee::config::TransportKind;
use std::process::Command;

const MARQUEE: &str = env!("CARGO_BIN_EXE_marquee");

fn init(path: &std::path::Path, extra: &[&str]) -> std::process::Output {
    Command::new(MARQUEE)
        .arg("--config")
        .arg(path)
        .arg("init")
        .args(extra)
        .env("TRANSPORT", "network")
        .env("ESP32_URL", "http://panel.local/post")
        .env("INTERVAL_S", "75")
        .output()
        .unwrap()
}

#[test]
fn init_writes_environment_overrides_and_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("marquee").join("config.toml");

    let first = init(&path, &[]);
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));

    let written = MarqueeConfig::from_file(&path).unwrap();
    assert_eq!(written.transport.kind, TransportKind::Network);
    assert_eq!(
        written.transport.network.url.as_deref(),
        Some("http://panel.local/post")
    );
    assert_eq!(written.interval_secs, 75);

    let second = init(&path, &[]);
    assert!(!second.status.success());
    assert!(String::from_utf8_lossy(&second.stderr).contains("--force"));

    let forced = init(&path, &["--force"]);
    assert!(forced.status.success());
}
