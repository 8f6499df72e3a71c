//! UDP ingestion for export datagrams
//!
//! The ingestor owns the UDP socket. Every datagram is stamped with its
//! arrival time and pushed onto the unbounded input channel, so reception
//! never waits for decoding and bursts queue in memory instead of
//! overflowing the socket buffer.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-7: Boundary Protection - Single bound UDP listener
//! - SC-5: Denial of Service Protection - Configurable receive buffer
//! - AU-8: Time Stamps - Arrival time recorded per datagram

use crate::config::ListenerConfig;
use crate::error::{CollectorError, Result};
use crate::metrics::CollectorMetrics;
use crate::types::RawPacket;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use tokio::net::UdpSocket;
#[cfg(test)]
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Resolve the configured host and port to a bind address
///
/// A host containing ':' is an IPv6 literal (brackets allowed); anything
/// else is an IPv4 literal or a hostname resolved to its first IPv4
/// address.
pub fn resolve_bind_address(host: &str, port: u16) -> Result<SocketAddr> {
    let invalid = |reason: String| CollectorError::InvalidAddress {
        address: host.to_string(),
        reason,
    };

    if host.contains(':') {
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        let ip = literal
            .parse::<Ipv6Addr>()
            .map_err(|e| invalid(e.to_string()))?;
        return Ok(SocketAddr::from((ip, port)));
    }

    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::from((ip, port)));
    }

    (host, port)
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| invalid("no IPv4 address found".to_string()))
}

/// Create the UDP socket with the requested receive buffer
fn create_socket(addr: SocketAddr, receive_buffer_bytes: Option<usize>) -> std::io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    if let Some(size) = receive_buffer_bytes {
        if let Err(e) = socket.set_recv_buffer_size(size) {
            warn!(error = %e, requested_size = size, "Failed to set UDP SO_RCVBUF");
        }
    }

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Datagram receive side
enum DatagramSource {
    Socket(UdpSocket),
    /// Datagrams and receive errors fed by a test
    #[cfg(test)]
    Scripted(mpsc::UnboundedReceiver<std::io::Result<(Vec<u8>, SocketAddr)>>),
}

impl DatagramSource {
    async fn recv_from(&mut self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        match self {
            Self::Socket(socket) => socket.recv_from(buf).await,
            #[cfg(test)]
            Self::Scripted(rx) => match rx.recv().await {
                Some(Ok((payload, client))) => {
                    let len = payload.len().min(buf.len());
                    buf[..len].copy_from_slice(&payload[..len]);
                    Ok((len, client))
                }
                Some(Err(e)) => Err(e),
                None => std::future::pending().await,
            },
        }
    }
}

/// Sender half feeding a scripted ingestor
#[cfg(test)]
pub(crate) type ScriptedDatagrams = mpsc::UnboundedSender<std::io::Result<(Vec<u8>, SocketAddr)>>;

/// Datagram reception task
///
/// # NIST Controls
/// - SC-7: Boundary Protection - Sole producer of fresh packets
pub struct Ingestor {
    source: DatagramSource,
    local_addr: SocketAddr,
    input_tx: UnboundedSender<RawPacket>,
    /// Stops reception; cancelled by the decode loop on exit or by `stop()`
    listener_shutdown: CancellationToken,
    /// Cancelled on a receive fault to bring the whole pipeline down
    pipeline_cancel: CancellationToken,
    max_datagram_size: usize,
    metrics: CollectorMetrics,
}

impl Ingestor {
    /// Bind the listener socket
    ///
    /// Must be called within a tokio runtime.
    #[instrument(skip_all, fields(host = %config.host, port = config.port))]
    pub fn bind(
        config: &ListenerConfig,
        input_tx: UnboundedSender<RawPacket>,
        listener_shutdown: CancellationToken,
        pipeline_cancel: CancellationToken,
        metrics: CollectorMetrics,
    ) -> Result<Self> {
        let addr = resolve_bind_address(&config.host, config.port)?;
        let socket = create_socket(addr, config.receive_buffer_bytes)
            .map_err(|source| CollectorError::Bind { address: addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| CollectorError::Bind { address: addr, source })?;

        info!(address = %local_addr, "Listening for NetFlow/IPFIX exports");

        Ok(Self {
            source: DatagramSource::Socket(socket),
            local_addr,
            input_tx,
            listener_shutdown,
            pipeline_cancel,
            max_datagram_size: config.max_datagram_size,
            metrics,
        })
    }

    /// Ingestor reading from a channel instead of a socket
    #[cfg(test)]
    pub(crate) fn scripted(
        local_addr: SocketAddr,
        input_tx: UnboundedSender<RawPacket>,
        listener_shutdown: CancellationToken,
        pipeline_cancel: CancellationToken,
        metrics: CollectorMetrics,
    ) -> (Self, ScriptedDatagrams) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ingestor = Self {
            source: DatagramSource::Scripted(rx),
            local_addr,
            input_tx,
            listener_shutdown,
            pipeline_cancel,
            max_datagram_size: 65_535,
            metrics,
        };
        (ingestor, tx)
    }

    /// Address the socket is bound to (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive datagrams until shutdown or a socket fault
    ///
    /// The socket is closed when this returns.
    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; self.max_datagram_size];

        loop {
            tokio::select! {
                biased;

                _ = self.listener_shutdown.cancelled() => {
                    debug!(address = %self.local_addr, "Listener shutting down");
                    return Ok(());
                }

                received = self.source.recv_from(&mut buf) => {
                    match received {
                        Ok((len, client)) => {
                            debug!(bytes = len, client = %client, "Received datagram");
                            self.metrics.record_datagram(len);

                            let packet = RawPacket::new(client, buf[..len].to_vec());
                            if self.input_tx.send(packet).is_err() {
                                debug!("Input channel closed, listener exiting");
                                return Ok(());
                            }
                        }
                        Err(source) => {
                            error!(
                                address = %self.local_addr,
                                error = %source,
                                "UDP receive failed, stopping pipeline"
                            );
                            self.pipeline_cancel.cancel();
                            return Err(CollectorError::Socket {
                                address: self.local_addr,
                                source,
                            });
                        }
                    }
                }
            }
        }
    }
}
