//! TCP transport for network printers (port 9100 / JetDirect / RAW).
//!
//! [`TcpTransport`] keeps one lazily opened connection per device uid. A
//! read waits at most [`TransportTimeouts::read`] and returns an empty chunk
//! when the printer stays silent, which is what the read-until loop expects.
//! A multi-byte character split across two reads is held back until its
//! remaining bytes arrive.
//!
//! [`TransportTimeouts::read`]: crate::TransportTimeouts::read

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::TransportError;
use crate::addr::resolve_device_addr;
use crate::config::{TransportConfig, TransportTimeouts};
use crate::device::Device;
use crate::transport::Transport;

/// Bytes requested per read.
const READ_CHUNK: usize = 4096;

/// An open connection and the undecoded tail of the last read.
#[derive(Debug)]
struct Link {
    stream: TcpStream,
    pending: Vec<u8>,
}

type Connection = Arc<Mutex<Link>>;

/// [`Transport`] over TCP for [`ConnectionKind::Network`](crate::ConnectionKind::Network)
/// devices.
///
/// The device uid is used as the address (see
/// [`resolve_device_addr`](crate::resolve_device_addr)). A connection
/// that fails or is closed by the printer is dropped and reopened on the
/// next operation.
#[derive(Debug, Default)]
pub struct TcpTransport {
    config: TransportConfig,
    connections: Mutex<HashMap<String, Connection>>,
}

impl TcpTransport {
    /// Create a transport with no open connections.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Close the cached connection for `device`, if any.
    pub async fn disconnect(&self, device: &Device) {
        if self.connections.lock().await.remove(device.uid()).is_some() {
            debug!(device = device.uid(), "tcp connection dropped");
        }
    }

    async fn connection(&self, device: &Device) -> Result<Connection, TransportError> {
        if let Some(conn) = self.connections.lock().await.get(device.uid()) {
            return Ok(Arc::clone(conn));
        }

        let (stream, addr) = open_stream(device.clone(), self.config.timeouts.clone()).await?;
        debug!(device = device.uid(), %addr, "tcp connection opened");

        // Another caller may have connected meanwhile; keep the first.
        let mut connections = self.connections.lock().await;
        let conn = connections
            .entry(device.uid().to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Link {
                    stream,
                    pending: Vec::new(),
                }))
            });
        Ok(Arc::clone(conn))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, device: &Device, data: &str) -> Result<(), TransportError> {
        let conn = self.connection(device).await?;
        let mut link = conn.lock().await;

        let write = async {
            link.stream.write_all(data.as_bytes()).await?;
            link.stream.flush().await
        };
        let result = match tokio::time::timeout(self.config.timeouts.write, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        };
        drop(link);

        match result {
            Ok(()) => {
                if self.config.trace_io {
                    trace!(device = device.uid(), data = %data.escape_debug(), "sent");
                }
                Ok(())
            }
            Err(e) => {
                self.disconnect(device).await;
                Err(TransportError::WriteFailed(e))
            }
        }
    }

    async fn read(&self, device: &Device) -> Result<String, TransportError> {
        let conn = self.connection(device).await?;
        let mut link = conn.lock().await;

        let mut buf = [0u8; READ_CHUNK];
        let result = loop {
            let read = tokio::time::timeout(self.config.timeouts.read, link.stream.read(&mut buf));
            match read.await {
                // Silence is an empty chunk, not an error. A partial
                // character left dangling is flushed as-is.
                Err(_) => break Ok(flush_lossy(&mut link.pending)),
                Ok(Ok(0)) => break Err(TransportError::ConnectionClosed),
                Ok(Ok(n)) => {
                    link.pending.extend_from_slice(&buf[..n]);
                    let chunk = take_utf8(&mut link.pending);
                    if !chunk.is_empty() {
                        break Ok(chunk);
                    }
                }
                Ok(Err(e)) => break Err(TransportError::ReadFailed(e)),
            }
        };
        drop(link);

        match result {
            Ok(chunk) => {
                if self.config.trace_io && !chunk.is_empty() {
                    trace!(device = device.uid(), data = %chunk.escape_debug(), "received");
                }
                Ok(chunk)
            }
            Err(err) => {
                self.disconnect(device).await;
                Err(err)
            }
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Decode the complete characters in `pending`, keeping an incomplete
/// trailing character for the next read. Invalid bytes become U+FFFD.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let complete = match std::str::from_utf8(pending) {
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        _ => pending.len(),
    };
    let tail = pending.split_off(complete);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = tail;
    text
}

fn flush_lossy(pending: &mut Vec<u8>) -> String {
    String::from_utf8_lossy(&std::mem::take(pending)).into_owned()
}

/// Resolve and connect on a blocking thread, then hand the socket to tokio.
async fn open_stream(
    device: Device,
    timeouts: TransportTimeouts,
) -> Result<(TcpStream, SocketAddr), TransportError> {
    let (stream, addr) = tokio::task::spawn_blocking(move || {
        let addr = resolve_device_addr(&device)?;
        let stream = std::net::TcpStream::connect_timeout(&addr, timeouts.connect)
            .map_err(|e| connect_error(e, &addr, timeouts.connect))?;
        configure_stream(&stream, &addr)?;
        Ok::<_, TransportError>((stream, addr))
    })
    .await
    .map_err(|e| TransportError::Other(format!("connect task failed: {e}")))??;

    let stream = TcpStream::from_std(stream).map_err(|e| TransportError::ConnectionFailed {
        addr: addr.to_string(),
        source: e,
    })?;
    Ok((stream, addr))
}

fn connect_error(e: io::Error, addr: &SocketAddr, timeout: Duration) -> TransportError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => TransportError::ConnectionRefused {
            addr: addr.to_string(),
            source: e,
        },
        io::ErrorKind::TimedOut => TransportError::ConnectionTimeout {
            addr: addr.to_string(),
            timeout,
            source: e,
        },
        _ => TransportError::ConnectionFailed {
            addr: addr.to_string(),
            source: e,
        },
    }
}

/// TCP_NODELAY, keepalive, and non-blocking mode for tokio.
fn configure_stream(stream: &std::net::TcpStream, addr: &SocketAddr) -> Result<(), TransportError> {
    let failed = |e: io::Error| TransportError::ConnectionFailed {
        addr: addr.to_string(),
        source: e,
    };

    stream.set_nodelay(true).map_err(failed)?;
    configure_keepalive(stream, Duration::from_secs(60)).map_err(failed)?;
    stream.set_nonblocking(true).map_err(failed)?;
    Ok(())
}

/// Configure TCP keepalive on a `TcpStream` via `socket2`.
fn configure_keepalive(stream: &std::net::TcpStream, interval: Duration) -> io::Result<()> {
    let keepalive = TcpKeepalive::new().with_time(interval);

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    let keepalive = keepalive.with_interval(interval);

    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}
