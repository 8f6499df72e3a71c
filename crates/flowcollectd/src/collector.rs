//! Collector lifecycle
//!
//! [`NetflowListener`] wires the ingestor, the decode loop and the output
//! channel together and exposes the start / stop / join protocol:
//!
//! ```text
//! bind() -> Listening -> start() -> Running -> stop() -> Stopping -> join() -> Stopped
//! ```
//!
//! Reception starts as soon as the listener is bound, so datagrams that
//! arrive before `start()` are queued rather than lost.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-12: Audit Record Generation - Lifecycle transitions are logged
//! - CP-10: System Recovery - Orderly shutdown of both pipeline tasks
//! - SC-7: Boundary Protection - Listener closed on every shutdown path

use crate::channel::{OutputChannel, output_channel};
use crate::config::CollectorConfig;
use crate::decode_loop::{DecodeRetryLoop, LoopTokens};
use crate::decoder::{ExportDecoder, FlowDecoder};
use crate::error::{ChannelError, CollectorError, Result};
use crate::ingest::Ingestor;
#[cfg(test)]
use crate::ingest::ScriptedDatagrams;
use crate::metrics::CollectorMetrics;
use crate::types::{ParsedPacket, RawPacket};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, info_span};

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Socket bound and receiving; decode loop not started
    Listening,
    /// Decode loop running
    Running,
    /// Shutdown requested; tasks may still be finishing
    Stopping,
    /// Both tasks have exited
    Stopped,
}

/// NetFlow/IPFIX collector handle
///
/// # NIST Controls
/// - SI-4: System Monitoring - Flow collection service
pub struct NetflowListener {
    local_addr: SocketAddr,
    span: Span,
    tokens: LoopTokens,
    metrics: CollectorMetrics,
    output: OutputChannel,
    /// Built at bind time, spawned by `start()`
    pending_loop: Option<DecodeRetryLoop>,
    decode_task: Option<JoinHandle<()>>,
    listener_task: Option<JoinHandle<Result<()>>>,
    started: bool,
    /// Socket fault not yet reported by `join()`
    fault: Option<CollectorError>,
}

impl NetflowListener {
    /// Bind with the built-in decoder and a default span
    ///
    /// Must be called within a tokio runtime.
    pub fn bind(config: CollectorConfig) -> Result<Self> {
        let span = info_span!(
            "flowcollectd",
            host = %config.listener.host,
            port = config.listener.port
        );
        Self::with_span(config, span)
    }

    /// Bind with the built-in decoder, logging under `span`
    pub fn with_span(config: CollectorConfig, span: Span) -> Result<Self> {
        Self::with_decoder(config, Box::new(FlowDecoder::new()), span)
    }

    /// Bind with a custom decoder, logging under `span`
    pub fn with_decoder(
        config: CollectorConfig,
        decoder: Box<dyn ExportDecoder>,
        span: Span,
    ) -> Result<Self> {
        let listener_config = config.listener.clone();
        Self::assemble(config, decoder, span, move |input_tx, tokens, metrics| {
            Ingestor::bind(
                &listener_config,
                input_tx,
                tokens.listener_shutdown.clone(),
                tokens.shutdown.clone(),
                metrics.clone(),
            )
        })
    }

    /// Collector fed by a scripted datagram source instead of a socket
    #[cfg(test)]
    pub(crate) fn scripted(config: CollectorConfig) -> Result<(Self, ScriptedDatagrams)> {
        let local_addr = crate::ingest::resolve_bind_address(&config.listener.host, config.listener.port)?;
        let mut datagrams = None;
        let listener = Self::assemble(
            config,
            Box::new(FlowDecoder::new()),
            Span::none(),
            |input_tx, tokens, metrics| {
                let (ingestor, tx) = Ingestor::scripted(
                    local_addr,
                    input_tx,
                    tokens.listener_shutdown.clone(),
                    tokens.shutdown.clone(),
                    metrics.clone(),
                );
                datagrams = Some(tx);
                Ok(ingestor)
            },
        )?;
        let datagrams = datagrams
            .ok_or_else(|| CollectorError::State("scripted source not created".to_string()))?;
        Ok((listener, datagrams))
    }

    /// Wire channels, tokens and metrics around the ingestor `make_ingestor`
    /// returns, spawning it at once
    fn assemble(
        config: CollectorConfig,
        decoder: Box<dyn ExportDecoder>,
        span: Span,
        make_ingestor: impl FnOnce(
            mpsc::UnboundedSender<RawPacket>,
            &LoopTokens,
            &CollectorMetrics,
        ) -> Result<Ingestor>,
    ) -> Result<Self> {
        config.validate()?;
        let entered = span.enter();

        let metrics = CollectorMetrics::new()?;
        let tokens = LoopTokens::default();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output) = output_channel();

        let ingestor = make_ingestor(input_tx.clone(), &tokens, &metrics)?;
        let local_addr = ingestor.local_addr();
        let listener_task = tokio::spawn(ingestor.run().instrument(span.clone()));

        let pending_loop = DecodeRetryLoop::new(
            decoder,
            input_tx,
            input_rx,
            output_tx,
            tokens.clone(),
            config.packet_timeout(),
            metrics.clone(),
        );

        drop(entered);
        Ok(Self {
            local_addr,
            span,
            tokens,
            metrics,
            output,
            pending_loop: Some(pending_loop),
            decode_task: None,
            listener_task: Some(listener_task),
            started: false,
            fault: None,
        })
    }

    /// Spawn the decode loop
    ///
    /// Fails if the loop was already started or the collector was stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.tokens.shutdown.is_cancelled() {
            return Err(CollectorError::State("collector already stopped".to_string()));
        }
        let decode_loop = self
            .pending_loop
            .take()
            .ok_or_else(|| CollectorError::State("decode loop already started".to_string()))?;

        self.decode_task = Some(tokio::spawn(decode_loop.run().instrument(self.span.clone())));
        self.started = true;
        Ok(())
    }

    /// Request shutdown; idempotent
    ///
    /// The decode loop closes the listener when it exits. If the loop was
    /// never started the listener is closed here.
    pub fn stop(&mut self) {
        if !self.tokens.shutdown.is_cancelled() {
            self.span.in_scope(|| info!("Stopping collector"));
        }
        self.tokens.shutdown.cancel();

        if self.pending_loop.take().is_some() {
            self.tokens.listener_shutdown.cancel();
        }
    }

    /// Wait for both pipeline tasks to exit
    ///
    /// With `Some(limit)` this returns `Ok(())` once the limit passes even
    /// if the tasks are still running; check [`state`](Self::state) to tell
    /// the cases apart. Safe to call repeatedly. A socket fault that ended
    /// the ingestor is returned by the first call that observes it.
    pub async fn join(&mut self, timeout: Option<Duration>) -> Result<()> {
        match timeout {
            None => self.wait_for_tasks().await?,
            Some(limit) => {
                if tokio::time::timeout(limit, self.wait_for_tasks()).await.is_err() {
                    debug!(parent: &self.span, ?limit, "Join timed out");
                    return Ok(());
                }
            }
        }

        match self.fault.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    async fn wait_for_tasks(&mut self) -> Result<()> {
        if let Some(handle) = self.decode_task.as_mut() {
            let joined = handle.await;
            self.decode_task = None;
            joined?;
        }

        if let Some(handle) = self.listener_task.as_mut() {
            let joined = handle.await;
            self.listener_task = None;
            if let Err(fault) = joined? {
                self.fault = Some(fault);
            }
        }

        Ok(())
    }

    /// Next decoded packet; see [`OutputChannel::get`]
    pub async fn get(
        &self,
        block: bool,
        timeout: Option<Duration>,
    ) -> std::result::Result<ParsedPacket, ChannelError> {
        self.output.get(block, timeout).await
    }

    /// Consumer handle for additional competing consumers
    pub fn output(&self) -> OutputChannel {
        self.output.clone()
    }

    /// Bound socket address (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> &CollectorMetrics {
        &self.metrics
    }

    pub fn state(&self) -> CollectorState {
        if self.decode_task.is_none() && self.listener_task.is_none() {
            CollectorState::Stopped
        } else if self.tokens.shutdown.is_cancelled() {
            CollectorState::Stopping
        } else if self.started {
            CollectorState::Running
        } else {
            CollectorState::Listening
        }
    }
}

impl Drop for NetflowListener {
    fn drop(&mut self) {
        self.tokens.shutdown.cancel();
        self.tokens.listener_shutdown.cancel();
    }
}
