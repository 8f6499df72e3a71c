//! Configuration file loading

mod common;

use flowcollectd::{CollectorConfig, CollectorError, NetflowListener};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config("[decoder]\npacket_timeout_secs = 30\n");
    let config = CollectorConfig::load_or_default(file.path()).unwrap();

    assert_eq!(config.packet_timeout(), Duration::from_secs(30));
    assert_eq!(config.listener.host, "0.0.0.0");
    assert_eq!(config.listener.port, 2055);
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let file = write_config("[listener\nport = \"not a port\"");
    assert!(matches!(
        CollectorConfig::load_or_default(file.path()),
        Err(CollectorError::Config(_))
    ));
}

#[tokio::test]
async fn test_listener_from_file() {
    let file = write_config(
        r#"
[listener]
host = "127.0.0.1"
port = 0
receive_buffer_bytes = 1048576
"#,
    );
    let config = CollectorConfig::load_or_default(file.path()).unwrap();
    let mut listener = common::started_listener(config);
    assert!(listener.local_addr().ip().is_loopback());

    let exporter = common::Exporter::new(listener.local_addr());
    exporter.send(&common::v5_packet(1, &[]));
    assert_eq!(
        common::next_packet(&listener).await.export.header.sequence,
        Some(1)
    );

    listener.stop();
    listener.join(Some(common::WAIT)).await.unwrap();
}

#[tokio::test]
async fn test_invalid_ipv6_host_fails_bind() {
    let config = CollectorConfig::new("fe80::zz", 2055);
    assert!(matches!(
        NetflowListener::bind(config),
        Err(CollectorError::InvalidAddress { .. })
    ));
}
