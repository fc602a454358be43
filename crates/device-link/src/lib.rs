//! Zebra Device Link: talk to Zebra label printers through a local print
//! daemon or directly over TCP.
//!
//! Every device gets a [`CommandChannel`]: a serialized queue that runs one
//! command at a time over a framing-less [`Transport`], reads the reply with
//! [`read_until_string_received`], and decodes it into a [`Status`],
//! [`Info`] or [`Configuration`]. A [`StatusWatcher`] polls channels on a
//! fixed period and reports status changes with offline hysteresis.
//!
//! The channel and watcher run as Tokio tasks. [`on_complete`] adapts any
//! request to success/failure callbacks.
#[cfg(feature = "tcp")]
mod addr;
mod callback;
mod channel;
mod config;
mod configuration;
mod device;
mod error;
mod frame;
mod read;
mod status;
#[cfg(feature = "tcp")]
mod tcp;
mod transport;
mod watcher;

#[cfg(feature = "tcp")]
pub use addr::{DEFAULT_PORT, resolve_device_addr};
pub use callback::on_complete;
pub use channel::{
    CommandChannel, CommandKind, GET_CONFIGURATION, GET_INFO, GET_STATUS, Pending, Response,
    get_sgd_command, set_sgd_command,
};
pub use config::{ChannelConfig, TransportConfig, TransportTimeouts, WatchConfig};
pub use configuration::Configuration;
pub use device::{ConnectionKind, Device};
pub use error::{LinkError, TransportError};
pub use frame::{ETX, STX, has_control_characters, strip_control_characters};
pub use read::{
    read_all_available, read_until_string_received, send_then_read, send_then_read_all_available,
    send_then_read_until_string_received,
};
pub use status::{Info, Status};
#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;
pub use transport::Transport;
pub use watcher::{StatusCallback, StatusWatcher};
