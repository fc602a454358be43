//! Scripted in-memory transport shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use zebra_device_link::{Device, Transport, TransportError};

/// What the device does in response to one `send`.
pub(crate) struct Exchange {
    gate: Option<Arc<Notify>>,
    send_error: Option<TransportError>,
    chunks: VecDeque<Result<String, TransportError>>,
}

impl Exchange {
    /// Answer with `chunks`, one per read; reads past the end are empty.
    pub(crate) fn reply(chunks: &[&str]) -> Self {
        Self {
            gate: None,
            send_error: None,
            chunks: chunks.iter().map(|c| Ok(c.to_string())).collect(),
        }
    }

    /// The send itself fails.
    pub(crate) fn send_fails(error: TransportError) -> Self {
        Self {
            gate: None,
            send_error: Some(error),
            chunks: VecDeque::new(),
        }
    }

    /// Follow the chunks so far with more chunks.
    pub(crate) fn then_reply(mut self, chunks: &[&str]) -> Self {
        self.chunks.extend(chunks.iter().map(|c| Ok(c.to_string())));
        self
    }

    /// Follow the chunks so far with a failed read.
    pub(crate) fn then_read_error(mut self, error: TransportError) -> Self {
        self.chunks.push_back(Err(error));
        self
    }

    /// The first read blocks until `gate` is notified.
    pub(crate) fn gated(mut self, gate: &Arc<Notify>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }
}

/// Transport whose replies are scripted per send, in order.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    sent: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Exchange>>,
    current: Mutex<Option<Exchange>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Exchange>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Make `exchange` readable without a send, as data the printer emits
    /// on its own.
    pub(crate) fn unsolicited(&self, exchange: Exchange) {
        *self.current.lock().unwrap() = Some(exchange);
    }

    /// Wait until at least `n` sends have happened.
    pub(crate) async fn wait_for_sends(&self, n: usize) {
        while self.sent.lock().unwrap().len() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _device: &Device, data: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(data.to_string());
        let mut next = self.script.lock().unwrap().pop_front();
        let error = next.as_mut().and_then(|e| e.send_error.take());
        *self.current.lock().unwrap() = next;
        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn read(&self, _device: &Device) -> Result<String, TransportError> {
        let gate = self
            .current
            .lock()
            .unwrap()
            .as_mut()
            .and_then(|e| e.gate.take());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.current
            .lock()
            .unwrap()
            .as_mut()
            .and_then(|e| e.chunks.pop_front())
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// A framed `~HQES` reply with the given flags set.
pub(crate) fn status_frame(paper_out: bool, head_open: bool) -> String {
    let mut body = vec![b'0'; 48];
    body[5] = if paper_out { b'1' } else { b'0' };
    body[43] = if head_open { b'1' } else { b'0' };
    body[0] = 0x02;
    body.push(0x03);
    String::from_utf8(body).unwrap()
}

/// A framed `~HQES` reply with no flags set.
pub(crate) fn ready_frame() -> String {
    status_frame(false, false)
}

/// A framed `^HH` reply with the required settings.
pub(crate) fn config_frame() -> String {
    let lines = [
        ("+10.0", "DARKNESS"),
        ("4 IPS", "PRINT SPEED"),
        ("832", "PRINT WIDTH"),
        ("1215", "LABEL LENGTH"),
        ("V84.20.18Z <-", "FIRMWARE"),
        ("4.3", "LINK-OS VERSION"),
    ];
    let body: Vec<String> = lines
        .iter()
        .map(|(value, label)| format!("{value:<20}{label}"))
        .collect();
    format!("\u{2}{}\u{3}", body.join("\r\n"))
}
