//! Byte transport boundary.

use async_trait::async_trait;

use crate::TransportError;
use crate::device::Device;

/// Opaque send/read primitives scoped to one device.
///
/// Implementations carry no framing: a read may return part of a response,
/// several responses, or nothing at all (an empty chunk). The command
/// channel never issues two operations for the same device concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `data` to the device.
    async fn send(&self, device: &Device, data: &str) -> Result<(), TransportError>;

    /// Read whatever the device has produced since the last read.
    async fn read(&self, device: &Device) -> Result<String, TransportError>;
}
