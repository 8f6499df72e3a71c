//! Output handoff between the decode loop and consumers
//!
//! One producer (the decode loop) and any number of competing consumers.
//! Each decoded packet is delivered to exactly one `get()` caller, in the
//! order the decode loop produced it.

use crate::error::ChannelError;
use crate::types::ParsedPacket;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

/// Producer side, owned by the decode loop
#[derive(Debug, Clone)]
pub struct OutputSender {
    tx: UnboundedSender<ParsedPacket>,
}

impl OutputSender {
    /// Queue a decoded packet; returns false once every consumer is gone
    pub fn send(&self, packet: ParsedPacket) -> bool {
        self.tx.send(packet).is_ok()
    }
}

/// Consumer side; clones share one queue
#[derive(Debug, Clone)]
pub struct OutputChannel {
    rx: Arc<Mutex<UnboundedReceiver<ParsedPacket>>>,
}

/// Create a connected producer/consumer pair
pub fn output_channel() -> (OutputSender, OutputChannel) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OutputSender { tx },
        OutputChannel {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl OutputChannel {
    /// Retrieve the next decoded packet
    ///
    /// - `block = true, timeout = None`: wait until a packet is available
    /// - `block = true, timeout = Some(d)`: wait at most `d`
    /// - `block = false`: only take a packet that is already queued;
    ///   `timeout` is ignored
    ///
    /// Returns [`ChannelError::Empty`] when nothing arrived in time and
    /// [`ChannelError::Closed`] once the producer is gone and the queue is
    /// drained.
    pub async fn get(
        &self,
        block: bool,
        timeout: Option<Duration>,
    ) -> Result<ParsedPacket, ChannelError> {
        if !block {
            return self.try_get();
        }

        match timeout {
            None => self.recv().await,
            Some(limit) => tokio::time::timeout(limit, self.recv())
                .await
                .unwrap_or(Err(ChannelError::Empty)),
        }
    }

    /// Wait until a packet is available
    pub async fn recv(&self) -> Result<ParsedPacket, ChannelError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(ChannelError::Closed)
    }

    /// Take a packet only if one is queued and no other consumer holds the queue
    pub fn try_get(&self) -> Result<ParsedPacket, ChannelError> {
        let Ok(mut rx) = self.rx.try_lock() else {
            return Err(ChannelError::Empty);
        };
        rx.try_recv().map_err(|e| match e {
            TryRecvError::Empty => ChannelError::Empty,
            TryRecvError::Disconnected => ChannelError::Closed,
        })
    }
}
