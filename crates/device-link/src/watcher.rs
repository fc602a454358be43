//! Periodic status polling with offline hysteresis.
//!
//! A [`StatusWatcher`] polls every watched device on a fixed period through
//! the device's own [`CommandChannel`], so polls queue behind (and share
//! responses with) whatever else the application sends. Changes are reported
//! to a per-device callback. A single offline observation is not reported:
//! a device must look offline `offline_threshold` times in a row first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::LinkError;
use crate::channel::CommandChannel;
use crate::config::WatchConfig;
use crate::device::Device;
use crate::status::Status;

/// Change callback: `(previous, current)`. `previous` is `None` for the
/// first status reported after [`StatusWatcher::watch`].
pub type StatusCallback = Arc<dyn Fn(Option<Status>, Status) + Send + Sync>;

type Entries = Arc<Mutex<HashMap<String, WatchEntry>>>;

/// Offline hysteresis and change detection for one device.
#[derive(Debug, Clone)]
struct Hysteresis {
    offline_threshold: u32,
    offline_count: u32,
    last: Option<Status>,
}

impl Hysteresis {
    fn new(offline_threshold: u32) -> Self {
        Self {
            offline_threshold,
            offline_count: 0,
            last: None,
        }
    }

    /// Apply one observation. Returns the previous status when a change
    /// should be reported.
    fn observe(&mut self, status: Status) -> Option<Option<Status>> {
        if status.offline {
            self.offline_count = self.offline_count.saturating_add(1);
            if self.offline_count < self.offline_threshold {
                return None;
            }
        } else {
            self.offline_count = 0;
        }

        if self.last == Some(status) {
            return None;
        }
        Some(self.last.replace(status))
    }
}

struct WatchEntry {
    id: u64,
    channel: CommandChannel,
    on_change: StatusCallback,
    state: Hysteresis,
    poll_outstanding: bool,
}

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Polls the status of watched devices and reports changes.
pub struct StatusWatcher {
    config: WatchConfig,
    entries: Entries,
    ticker: Mutex<Option<Ticker>>,
    next_id: Mutex<u64>,
}

impl StatusWatcher {
    /// Create a stopped watcher.
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
            ticker: Mutex::new(None),
            next_id: Mutex::new(0),
        }
    }

    /// Watch the device behind `channel`, replacing any existing watch for
    /// the same device uid.
    ///
    /// `offline_threshold` overrides [`WatchConfig::offline_threshold`].
    pub fn watch<F>(&self, channel: &CommandChannel, on_change: F, offline_threshold: Option<u32>)
    where
        F: Fn(Option<Status>, Status) + Send + Sync + 'static,
    {
        let id = {
            let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next_id += 1;
            *next_id
        };
        let uid = channel.device().uid().to_string();
        let entry = WatchEntry {
            id,
            channel: channel.clone(),
            on_change: Arc::new(on_change),
            state: Hysteresis::new(offline_threshold.unwrap_or(self.config.offline_threshold)),
            poll_outstanding: false,
        };
        debug!(device = %uid, threshold = entry.state.offline_threshold, "watching device");
        lock(&self.entries).insert(uid, entry);
    }

    /// Stop watching `device`. A poll already in flight for it is ignored
    /// when it completes.
    pub fn stop_watching(&self, device: &Device) {
        if lock(&self.entries).remove(device.uid()).is_some() {
            debug!(device = device.uid(), "stopped watching device");
        }
    }

    /// Whether `device` is currently watched.
    pub fn is_watching(&self, device: &Device) -> bool {
        lock(&self.entries).contains_key(device.uid())
    }

    /// Start polling. The first poll happens one period from now.
    ///
    /// Must be called from within a Tokio runtime. Starting a running
    /// watcher is logged and ignored.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.is_some() {
            warn!("status watcher already started");
            return;
        }

        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_ticker(Arc::clone(&self.entries), period, cancel.clone()));
        info!(?period, "status watcher started");
        *ticker = Some(Ticker { cancel, handle });
    }

    /// Stop polling. Returns `false` (and logs a warning) if the watcher
    /// was not running.
    pub fn stop(&self) -> bool {
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match ticker {
            Some(ticker) => {
                ticker.cancel.cancel();
                drop(ticker.handle);
                info!("status watcher stopped");
                true
            }
            None => {
                warn!("status watcher not started; nothing to stop");
                false
            }
        }
    }

    /// Whether the watcher is polling.
    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        if let Some(ticker) = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            ticker.cancel.cancel();
        }
    }
}

fn lock(entries: &Entries) -> std::sync::MutexGuard<'_, HashMap<String, WatchEntry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_ticker(entries: Entries, period: Duration, cancel: CancellationToken) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticks.tick() => poll_all(&entries),
        }
    }
}

/// Issue one status poll for every watched device that has none pending.
fn poll_all(entries: &Entries) {
    let due: Vec<(String, u64, CommandChannel)> = lock(entries)
        .iter_mut()
        .filter_map(|(uid, entry)| {
            if entry.poll_outstanding {
                debug!(device = %uid, "previous status poll still pending; skipping");
                return None;
            }
            entry.poll_outstanding = true;
            Some((uid.clone(), entry.id, entry.channel.clone()))
        })
        .collect();

    for (uid, id, channel) in due {
        let request = channel.get_status();
        let entries = Arc::clone(entries);
        tokio::spawn(async move {
            let observation = poll_outcome(&uid, request.await);
            apply(&entries, &uid, id, observation);
        });
    }
}

/// Turn a poll result into an observation. Only a failed exchange counts as
/// offline; a poll discarded by `clear_queue` or a closed channel observes
/// nothing.
fn poll_outcome(uid: &str, result: Result<Status, LinkError>) -> Option<Status> {
    match result {
        Ok(status) => Some(status),
        Err(err @ (LinkError::Cancelled | LinkError::ChannelClosed)) => {
            debug!(device = %uid, error = %err, "status poll dropped");
            None
        }
        Err(err) => {
            debug!(device = %uid, error = %err, "status poll failed");
            Some(Status::offline())
        }
    }
}

/// Record a poll result and run the change callback outside the lock.
fn apply(entries: &Entries, uid: &str, id: u64, observation: Option<Status>) {
    let change = {
        let mut entries = lock(entries);
        let Some(entry) = entries.get_mut(uid).filter(|entry| entry.id == id) else {
            return;
        };
        entry.poll_outstanding = false;
        let Some(status) = observation else {
            return;
        };
        entry
            .state
            .observe(status)
            .map(|previous| (Arc::clone(&entry.on_change), previous, status))
    };

    if let Some((on_change, previous, status)) = change {
        debug!(device = %uid, ?previous, current = %status, "status changed");
        on_change(previous, status);
    }
}
