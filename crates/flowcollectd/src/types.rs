//! Packet values carried between pipeline stages
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-8: Time Stamps - Every datagram is stamped on arrival
//! - AU-3: Content of Audit Records - Exporter address retained per packet

use crate::export::ExportPacket;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;

/// A datagram as received, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Wall-clock arrival time
    pub received_at: DateTime<Utc>,
    /// Exporter address and source port
    pub client: SocketAddr,
    pub payload: Vec<u8>,
}

impl RawPacket {
    /// Stamp a datagram with the current time
    pub fn new(client: SocketAddr, payload: Vec<u8>) -> Self {
        Self::with_timestamp(Utc::now(), client, payload)
    }

    pub fn with_timestamp(received_at: DateTime<Utc>, client: SocketAddr, payload: Vec<u8>) -> Self {
        Self {
            received_at,
            client,
            payload,
        }
    }

    /// Whether the packet has waited longer than `timeout` as of `now`
    pub fn is_older_than(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(timeout) {
            Ok(timeout) => now.signed_duration_since(self.received_at) > timeout,
            // Out-of-range timeouts never expire
            Err(_) => false,
        }
    }

    /// Attach the decoded export, keeping arrival metadata
    pub fn into_parsed(self, export: ExportPacket) -> ParsedPacket {
        ParsedPacket {
            received_at: self.received_at,
            client: self.client,
            export,
        }
    }
}

/// A fully decoded packet ready for consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedPacket {
    #[serde(rename = "ts")]
    pub received_at: DateTime<Utc>,
    pub client: SocketAddr,
    pub export: ExportPacket,
}

impl ParsedPacket {
    /// JSON line shape emitted by the collector binary:
    /// `{"ts", "client", "header", "flows"}`
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(&serde_json::json!({
            "ts": self.received_at.timestamp_micros() as f64 / 1_000_000.0,
            "client": self.client,
            "header": self.export.header,
            "flows": self.export.flows,
        }))
    }
}
