//! NetFlow/IPFIX Collector
//!
//! This crate receives NetFlow v1/v5/v9 and IPFIX export datagrams over UDP,
//! decodes them against exporter-announced templates and hands decoded
//! packets to consumers in arrival order. Data that arrives before the
//! template describing it is held and retried once a new template is seen.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//!
//! | Control | Description | Implementation |
//! |---------|-------------|----------------|
//! | AC-4 | Information Flow Enforcement | CIDR filtering of emitted flows |
//! | AU-3 | Content of Audit Records | Flow records with exporter address and arrival time |
//! | AU-4 | Audit Log Storage Capacity | Rolling gzip batch files |
//! | AU-8 | Time Stamps | Arrival timestamp on every datagram |
//! | AU-12 | Audit Record Generation | Drops and lifecycle transitions logged |
//! | CM-6 | Configuration Settings | Validated TOML configuration |
//! | SC-5 | DoS Protection | Unbounded intake queue, tunable SO_RCVBUF |
//! | SC-7 | Boundary Protection | Single UDP listener, closed on shutdown |
//! | SI-4 | System Monitoring | Prometheus pipeline metrics |
//! | SI-10 | Input Validation | Bounds-checked decoding of untrusted datagrams |
//! | SI-11 | Error Handling | Per-packet faults contained in the decode loop |
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │   Exporter   │     │   Ingestor   │     │ DecodeRetryLoop  │     │OutputChannel │
//! │  (router,    │────▶│  UDP socket  │────▶│                  │────▶│              │
//! │   switch)    │ UDP │  + arrival   │ in  │  TemplateStore   │     │ get()/recv() │
//! │              │     │    stamp     │ put │  RetryBuffer     │     │  consumers   │
//! └──────────────┘     └──────────────┘     └────────┬─────────┘     └──────────────┘
//!                              ▲                     │
//!                              │   re-inject held    │
//!                              └─────────────────────┘
//!                                 (input channel)
//! ```

pub mod channel;
pub mod collector;
pub mod config;
pub mod decode_loop;
pub mod decoder;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod metrics;
pub mod sink;
pub mod stream;
pub mod templates;
pub mod types;

pub use channel::{OutputChannel, OutputSender, output_channel};
pub use collector::{CollectorState, NetflowListener};
pub use config::{CollectorConfig, DecoderConfig, FilterConfig, ListenerConfig, OutputConfig};
pub use decode_loop::{DecodeRetryLoop, LoopTokens, RetryBuffer};
pub use decoder::{ExportDecoder, FlowDecoder};
pub use error::{ChannelError, CollectorError, DecodeError, Result};
pub use export::{ExportHeader, ExportPacket, FieldValue, FlowRecord, MacAddress};
pub use filter::CidrFilter;
pub use ingest::{Ingestor, resolve_bind_address};
pub use metrics::CollectorMetrics;
pub use sink::BatchWriter;
pub use stream::{ExportStream, shutdown_signal};
pub use templates::{Template, TemplateFamily, TemplateField, TemplateStore};
pub use types::{ParsedPacket, RawPacket};
