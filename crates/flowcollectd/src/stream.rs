//! Cancellation-driven iteration over decoded exports
//!
//! [`ExportStream`] binds and starts a collector and hands out decoded
//! packets until its [`CancellationToken`] fires. The collector is stopped
//! and joined exactly once, whether iteration ends by cancellation, by the
//! pipeline shutting down or by an early [`close`](ExportStream::close).

use crate::collector::NetflowListener;
use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::types::ParsedPacket;
use std::net::SocketAddr;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Stream of decoded packets bound to a cancellation token
pub struct ExportStream {
    listener: NetflowListener,
    cancel: CancellationToken,
    closed: bool,
    /// Shutdown outcome when iteration ended on its own
    fault: Option<CollectorError>,
}

impl ExportStream {
    /// Bind and start a collector
    pub fn open(config: CollectorConfig, cancel: CancellationToken) -> Result<Self> {
        let mut listener = NetflowListener::bind(config)?;
        listener.start()?;
        Ok(Self::from_listener(listener, cancel))
    }

    /// Iterate an already started collector
    pub fn from_listener(listener: NetflowListener, cancel: CancellationToken) -> Self {
        Self {
            listener,
            cancel,
            closed: false,
            fault: None,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn listener(&self) -> &NetflowListener {
        &self.listener
    }

    /// Next decoded packet, or `None` once cancelled or the pipeline ended
    ///
    /// The collector is shut down before `None` is returned; any fault is
    /// kept for [`close`](Self::close).
    pub async fn next(&mut self) -> Option<ParsedPacket> {
        if self.closed {
            return None;
        }

        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            packet = self.listener.get(true, None) => packet.ok(),
        };

        if next.is_none() {
            if let Err(fault) = self.shutdown().await {
                self.fault = Some(fault);
            }
        }
        next
    }

    /// Stop and join the collector; later calls only report a kept fault
    pub async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.shutdown().await?;
        }
        match self.fault.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.closed = true;
        self.listener.stop();
        self.listener.join(None).await
    }
}

impl Drop for ExportStream {
    fn drop(&mut self) {
        if !self.closed {
            self.listener.stop();
        }
    }
}

/// Cancel `token` on SIGINT or SIGTERM
///
/// Returns early without cancelling if the token is cancelled elsewhere.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
        _ = token.cancelled() => return,
    }
    token.cancel();
}
