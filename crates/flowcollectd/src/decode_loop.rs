//! Decode and template-retry loop
//!
//! A single task owns the [`TemplateStore`] and the [`RetryBuffer`]; nothing
//! else reads or writes either. Packets whose data sets reference a template
//! the exporter has not announced yet are held in the retry buffer. When a
//! later packet introduces a new template, the whole buffer is pushed back
//! onto the input channel in arrival order and every held packet is tried
//! again. Held packets older than the packet timeout are dropped at that
//! point; there is no proactive eviction.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-10: Information Input Validation - Undecodable input is contained
//! - SI-11: Error Handling - Per-packet faults never leave the loop
//! - AU-12: Audit Record Generation - Every discard is logged

use crate::channel::OutputSender;
use crate::decoder::ExportDecoder;
use crate::error::DecodeError;
use crate::export::{ExportPacket, IPFIX};
use crate::metrics::CollectorMetrics;
use crate::templates::{TemplateFamily, TemplateStore};
use crate::types::RawPacket;
use chrono::Utc;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Packets waiting for a template, in arrival order
///
/// Unbounded and not deduplicated; a packet is only ever here after a
/// decode attempt failed on an unknown template.
#[derive(Debug, Default)]
pub struct RetryBuffer {
    packets: VecDeque<RawPacket>,
}

impl RetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: RawPacket) {
        self.packets.push_back(packet);
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Remove every held packet, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = RawPacket> + '_ {
        self.packets.drain(..)
    }
}

/// Cancellation handles shared with the lifecycle controller
#[derive(Debug, Clone, Default)]
pub struct LoopTokens {
    /// Pipeline shutdown, observed between packets
    pub shutdown: CancellationToken,
    /// Cancelled by the loop on exit to close the listener
    pub listener_shutdown: CancellationToken,
}

/// The decode task
pub struct DecodeRetryLoop {
    decoder: Box<dyn ExportDecoder>,
    templates: TemplateStore,
    retry: RetryBuffer,
    input_tx: UnboundedSender<RawPacket>,
    input_rx: UnboundedReceiver<RawPacket>,
    output: OutputSender,
    tokens: LoopTokens,
    packet_timeout: Duration,
    metrics: CollectorMetrics,
}

impl DecodeRetryLoop {
    /// `input_tx` must feed `input_rx`; it is used to re-inject held packets
    pub fn new(
        decoder: Box<dyn ExportDecoder>,
        input_tx: UnboundedSender<RawPacket>,
        input_rx: UnboundedReceiver<RawPacket>,
        output: OutputSender,
        tokens: LoopTokens,
        packet_timeout: Duration,
        metrics: CollectorMetrics,
    ) -> Self {
        Self {
            decoder,
            templates: TemplateStore::new(),
            retry: RetryBuffer::new(),
            input_tx,
            input_rx,
            output,
            tokens,
            packet_timeout,
            metrics,
        }
    }

    /// Process packets until shutdown
    ///
    /// Packets still queued when shutdown is observed are not processed.
    /// The listener is closed on exit.
    pub async fn run(mut self) {
        info!("Decode loop started");

        loop {
            if self.tokens.shutdown.is_cancelled() {
                break;
            }

            let packet = tokio::select! {
                biased;

                _ = self.tokens.shutdown.cancelled() => break,

                packet = self.input_rx.recv() => match packet {
                    Some(packet) => packet,
                    None => break,
                },
            };

            self.process(packet);
        }

        self.tokens.listener_shutdown.cancel();
        info!(
            held = self.retry.len(),
            templates_v9 = self.templates.len(TemplateFamily::NetflowV9),
            templates_ipfix = self.templates.len(TemplateFamily::Ipfix),
            "Decode loop stopped"
        );
    }

    /// One decode attempt
    fn process(&mut self, packet: RawPacket) {
        let generation = self.templates.generation();

        let announced = match self.decoder.decode(&packet.payload, &mut self.templates) {
            Ok(export) => {
                log_decoded(&export);
                let announced = export.is_template_based() && export.contains_new_templates;

                self.metrics.packets_decoded_total.inc();
                if !self.output.send(packet.into_parsed(export)) {
                    debug!("No consumer left for decoded packet");
                }
                announced
            }
            Err(DecodeError::UnsupportedVersion(version)) => {
                self.metrics.unsupported_version_total.inc();
                error!(
                    version,
                    client = %packet.client,
                    "Unsupported NetFlow/IPFIX version, ignoring the packet"
                );
                false
            }
            Err(e) if e.is_template_miss() => {
                self.metrics.template_misses_total.inc();
                if packet.is_older_than(self.packet_timeout, Utc::now()) {
                    drop_stale(&self.metrics, &packet);
                } else {
                    debug!(
                        client = %packet.client,
                        error = %e,
                        "Template not recognized yet, holding packet"
                    );
                    self.retry.push(packet);
                }
                self.metrics.set_retry_buffer_depth(self.retry.len());
                false
            }
            Err(e) => {
                self.metrics.decode_faults_total.inc();
                warn!(
                    client = %packet.client,
                    bytes = packet.payload.len(),
                    error = %e,
                    "Dropping undecodable export packet"
                );
                false
            }
        };

        // Templates registered by a packet that later failed still count
        let learned = announced || self.templates.generation() != generation;
        if learned && !self.retry.is_empty() {
            self.reinject();
        }
    }

    /// Push every held packet back onto the input channel, oldest first
    ///
    /// Packets past the timeout are dropped here instead of re-queued.
    fn reinject(&mut self) {
        let now = Utc::now();
        let held = self.retry.len();
        debug!(held, "New template seen, re-queueing held packets");
        self.metrics.retry_passes_total.inc();

        for packet in self.retry.drain() {
            if packet.is_older_than(self.packet_timeout, now) {
                drop_stale(&self.metrics, &packet);
                continue;
            }
            // The loop owns the receiver, so the channel is open
            let _ = self.input_tx.send(packet);
        }
        self.metrics.set_retry_buffer_depth(0);
    }
}

fn drop_stale(metrics: &CollectorMetrics, packet: &RawPacket) {
    metrics.stale_dropped_total.inc();
    warn!(
        client = %packet.client,
        received_at = %packet.received_at,
        "Dropping an old and undecodable v9/IPFIX export packet"
    );
}

fn log_decoded(export: &ExportPacket) {
    if export.version() == IPFIX {
        debug!(
            length = export.header.length.unwrap_or_default(),
            records = export.flows.len(),
            "Processed IPFIX packet"
        );
    } else {
        debug!(
            version = export.version(),
            count = export.flows.len(),
            "Processed NetFlow packet"
        );
    }
}
