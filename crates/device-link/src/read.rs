//! Read-until-terminator loop over a framing-less transport.
//!
//! Responses arrive in arbitrary pieces, so reads are repeated until the
//! terminator shows up or the device goes quiet. The retry budget only
//! covers the wait for the *first* byte: once data arrives the budget drops
//! to zero, and a single empty read after that ends the loop.

use tracing::trace;

use crate::LinkError;
use crate::device::Device;
use crate::transport::Transport;

/// Read until `terminator` has been received or a read comes back empty
/// with no retries left.
///
/// An empty `terminator` never matches, so the loop only ends on an empty
/// read. `retries` defaults to [`Device::read_retries`]. Transport errors end
/// the loop immediately and are not retried.
///
/// Returns everything accumulated, which may be empty or lack the
/// terminator if the device stopped answering.
pub async fn read_until_string_received(
    transport: &dyn Transport,
    device: &Device,
    terminator: &str,
    retries: Option<i32>,
) -> Result<String, LinkError> {
    let mut budget = retries.unwrap_or_else(|| device.read_retries());
    let mut accumulated = String::new();
    let mut reads = 0u32;

    loop {
        let chunk = transport.read(device).await?;
        reads += 1;
        trace!(device = device.uid(), reads, budget, len = chunk.len(), "read chunk");

        if !chunk.is_empty() {
            budget = 0;
            accumulated.push_str(&chunk);
        } else if budget <= 0 {
            return Ok(accumulated);
        }

        if !terminator.is_empty() && accumulated.contains(terminator) {
            return Ok(accumulated);
        }

        budget -= 1;
    }
}

/// Read until a read completes with no data.
pub async fn read_all_available(
    transport: &dyn Transport,
    device: &Device,
    retries: Option<i32>,
) -> Result<String, LinkError> {
    read_until_string_received(transport, device, "", retries).await
}

/// Send `data`, then issue exactly one read.
pub async fn send_then_read(
    transport: &dyn Transport,
    device: &Device,
    data: &str,
) -> Result<String, LinkError> {
    transport.send(device, data).await?;
    Ok(transport.read(device).await?)
}

/// Send `data`, then [`read_until_string_received`].
pub async fn send_then_read_until_string_received(
    transport: &dyn Transport,
    device: &Device,
    data: &str,
    terminator: &str,
    retries: Option<i32>,
) -> Result<String, LinkError> {
    transport.send(device, data).await?;
    read_until_string_received(transport, device, terminator, retries).await
}

/// Send `data`, then [`read_all_available`].
pub async fn send_then_read_all_available(
    transport: &dyn Transport,
    device: &Device,
    data: &str,
    retries: Option<i32>,
) -> Result<String, LinkError> {
    send_then_read_until_string_received(transport, device, data, "", retries).await
}
