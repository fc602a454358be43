//! Socket address of a network device.
//!
//! A network device's uid is its address: `IP`, `IP:PORT`, `[IPv6]:PORT`,
//! `hostname` or `hostname:PORT`. Without a port the raw printing port is
//! used.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::TransportError;
use crate::device::{ConnectionKind, Device};

/// Raw ZPL printing port.
pub const DEFAULT_PORT: u16 = 9100;

/// Resolve the socket address of a [`ConnectionKind::Network`] device from
/// its uid.
///
/// Other connection kinds fail with [`TransportError::UnsupportedConnection`].
/// A uid that is not an address, or a hostname that does not resolve, fails
/// with [`TransportError::NoAddressFound`]. Hostnames may block on DNS; the
/// TCP transport calls this from a blocking task.
pub fn resolve_device_addr(device: &Device) -> Result<SocketAddr, TransportError> {
    if device.connection() != ConnectionKind::Network {
        return Err(TransportError::UnsupportedConnection(device.connection()));
    }

    let no_address = || TransportError::NoAddressFound(device.uid().to_string());
    let uid = device.uid().trim();

    if let Ok(addr) = uid.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = uid.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    let (host, port) = host_and_port(uid).ok_or_else(no_address)?;
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(no_address)
}

/// Split a `hostname[:port]` uid without touching DNS. Returns `None` for
/// anything that cannot be a hostname.
fn host_and_port(uid: &str) -> Option<(&str, u16)> {
    let (host, port) = match uid.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (uid, DEFAULT_PORT),
    };
    let valid = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_');
    valid.then_some((host, port))
}
