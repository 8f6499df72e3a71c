//! NetFlow/IPFIX Collector Daemon
//!
//! Main entry point for flowcollectd. Listens for export datagrams and
//! writes every decoded export as one JSON line on stdout until SIGINT or
//! SIGTERM. With CIDR blocks configured only matching flows are written;
//! with a batch directory, lines carrying flows are also appended to rolling
//! gzip files.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-3: Content of Audit Records - Structured logging
//! - AU-12: Audit Record Generation - Log daemon lifecycle
//! - SI-4: System Monitoring - Continuous flow collection

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use flowcollectd::config::DEFAULT_CONFIG_PATH;
use flowcollectd::{BatchWriter, CidrFilter, CollectorConfig, ExportStream, ParsedPacket, shutdown_signal};
use ipnet::IpNet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// NetFlow v1/v5/v9 and IPFIX collector
#[derive(Parser, Debug)]
#[command(name = "flowcollectd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Collector listening address [default: 0.0.0.0]
    #[arg(long)]
    host: Option<String>,

    /// Collector listening port [default: 2055]
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Enable debug output
    #[arg(short = 'D', long)]
    debug: bool,

    /// Configuration file (TOML); defaults apply when it does not exist
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only emit flows to or from these blocks (repeatable or comma separated)
    #[arg(long, value_delimiter = ',')]
    cidr: Vec<IpNet>,

    /// Also write matching lines to rolling gzip files in this directory
    #[arg(long)]
    batch_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug)?;

    let config = load_config(&args)?;
    info!(
        host = %config.listener.host,
        port = config.listener.port,
        "flowcollectd: Starting NetFlow/IPFIX collector"
    );

    let filter = CidrFilter::new(config.filter.cidr_blocks.clone());
    if filter.is_empty() {
        info!("flowcollectd: No CIDR blocks configured, emitting all flows");
    } else {
        info!(blocks = ?config.filter.cidr_blocks, "flowcollectd: Filtering flows");
    }
    let mut batches = match &config.output.batch_dir {
        Some(dir) => Some(
            BatchWriter::new(dir, config.batch_interval())
                .with_context(|| format!("failed to prepare batch directory {}", dir.display()))?,
        ),
        None => None,
    };

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let mut stream = ExportStream::open(config, cancel).context("failed to start collector")?;
    info!(address = %stream.local_addr(), "flowcollectd: Listening");

    while let Some(packet) = stream.next().await {
        if let Some(line) = emit(packet, &filter, batches.as_mut()) {
            println!("{line}");
        }
    }

    if let Some(writer) = batches.as_mut() {
        if let Err(e) = writer.finish() {
            error!(error = %e, "Failed to complete batch file");
        }
    }

    if let Ok(text) = stream.listener().metrics().gather_text() {
        debug!(metrics = %text, "flowcollectd: Final pipeline metrics");
    }

    stream.close().await.context("collector stopped with an error")?;
    info!("flowcollectd: Shutdown complete");
    Ok(())
}

/// Filter one packet and produce its stdout line
///
/// Packets left without flows by a non-empty filter produce nothing. Only
/// lines that still carry flows go to the batch file.
fn emit(
    mut packet: ParsedPacket,
    filter: &CidrFilter,
    batches: Option<&mut BatchWriter>,
) -> Option<String> {
    let kept = filter.retain(&mut packet.export);
    if kept == 0 && !filter.is_empty() {
        return None;
    }

    let line = match packet.to_json_line() {
        Ok(line) => line,
        Err(e) => {
            error!(error = %e, client = %packet.client, "Failed to encode export");
            return None;
        }
    };

    if kept > 0 {
        if let Some(writer) = batches {
            if let Err(e) = writer.write_line(&line, Utc::now()) {
                error!(error = %e, "Failed to write batch file");
            }
        }
    }
    Some(line)
}

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence; otherwise INFO, or DEBUG with `--debug`.
fn init_logging(debug: bool) -> anyhow::Result<()> {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("failed to set logger")
}

/// File settings (if any) with command line overrides applied
fn load_config(args: &Args) -> anyhow::Result<CollectorConfig> {
    let mut config = CollectorConfig::load_or_default(&args.config)?;

    if let Some(host) = &args.host {
        config.listener.host = host.clone();
    }
    if let Some(port) = args.port {
        config.listener.port = port;
    }
    if !args.cidr.is_empty() {
        config.filter.cidr_blocks = args.cidr.clone();
    }
    if let Some(dir) = &args.batch_dir {
        config.output.batch_dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcollectd::{ExportHeader, ExportPacket, FieldValue, FlowRecord, RawPacket};
    use std::io::Write;
    use std::net::Ipv4Addr;

    fn packet_with_flows(pairs: &[([u8; 4], [u8; 4])]) -> ParsedPacket {
        let mut export = ExportPacket::new(ExportHeader {
            version: 5,
            count: pairs.len() as u16,
            ..Default::default()
        });
        for (src, dst) in pairs {
            let mut flow = FlowRecord::new();
            flow.insert("IPV4_SRC_ADDR", FieldValue::Ipv4(Ipv4Addr::from(*src)));
            flow.insert("IPV4_DST_ADDR", FieldValue::Ipv4(Ipv4Addr::from(*dst)));
            export.flows.push(flow);
        }
        RawPacket::new("192.0.2.1:2055".parse().unwrap(), Vec::new()).into_parsed(export)
    }

    #[test]
    fn test_defaults_without_flags() {
        let args = Args::parse_from(["flowcollectd", "--config", "/nonexistent/flowcollectd.toml"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.listener.host, "0.0.0.0");
        assert_eq!(config.listener.port, 2055);
        assert!(config.filter.cidr_blocks.is_empty());
        assert!(!args.debug);

        let args = Args::parse_from(["flowcollectd"]);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[listener]\nhost = \"10.1.1.1\"\nport = 9995\n\n[filter]\ncidr_blocks = [\"10.0.0.0/8\"]"
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let args = Args::parse_from([
            "flowcollectd",
            "--config",
            path,
            "-p",
            "4739",
            "-D",
            "--cidr",
            "192.0.2.0/24,198.51.100.0/24",
            "--batch-dir",
            "/tmp/flows",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.listener.host, "10.1.1.1");
        assert_eq!(config.listener.port, 4739);
        assert_eq!(config.filter.cidr_blocks.len(), 2);
        assert_eq!(config.output.batch_dir, Some(PathBuf::from("/tmp/flows")));
        assert!(args.debug);
    }

    #[test]
    fn test_emit_filters_and_batches_matching_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BatchWriter::new(dir.path(), std::time::Duration::from_secs(300)).unwrap();
        let filter = CidrFilter::new(vec!["10.0.0.0/8".parse().unwrap()]);

        let line = emit(
            packet_with_flows(&[([10, 0, 0, 1], [192, 0, 2, 1]), ([192, 0, 2, 2], [192, 0, 2, 3])]),
            &filter,
            Some(&mut writer),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["flows"].as_array().unwrap().len(), 1);
        assert_eq!(value["flows"][0]["IPV4_SRC_ADDR"], "10.0.0.1");
        assert!(writer.current_path().is_some());

        // Nothing matches: no stdout line
        assert!(
            emit(
                packet_with_flows(&[([192, 0, 2, 2], [192, 0, 2, 3])]),
                &filter,
                Some(&mut writer),
            )
            .is_none()
        );
    }

    #[test]
    fn test_emit_without_filter_skips_batch_for_flowless_packets() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = BatchWriter::new(dir.path(), std::time::Duration::from_secs(300)).unwrap();

        let line = emit(packet_with_flows(&[]), &CidrFilter::default(), Some(&mut writer));
        assert!(line.is_some());
        assert!(writer.current_path().is_none());
    }
}
