//! Per-device serialized command queue.
//!
//! Each device gets one channel task that owns its queue exclusively. Callers
//! talk to it through a cloneable [`CommandChannel`] handle: requests go in
//! over an unbounded mpsc inbox and every command carries a oneshot reply.
//!
//! The task executes at most one command at a time, in submission order.
//! A failed exchange only fails the command that issued it; the queue always
//! moves on. Consecutive status requests are answered by a single exchange.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::LinkError;
use crate::config::ChannelConfig;
use crate::configuration::Configuration;
use crate::device::Device;
use crate::frame::ETX_TERMINATOR;
use crate::read::send_then_read_until_string_received;
use crate::status::{Info, Status};
use crate::transport::Transport;

// ── Wire commands ───────────────────────────────────────────────────────

/// Host identification query.
pub const GET_INFO: &str = "~hi\r\n";
/// Host query error status.
pub const GET_STATUS: &str = "~HQES";
/// Print-and-return configuration label.
pub const GET_CONFIGURATION: &str = "^XA^HH^XZ";

/// `! U1 setvar` command for an SGD setting.
pub fn set_sgd_command(setting: &str, value: &str) -> String {
    format!("! U1 setvar \"{setting}\" \"{value}\"\r\n")
}

/// `! U1 getvar` command for an SGD setting.
pub fn get_sgd_command(setting: &str) -> String {
    format!("! U1 getvar \"{setting}\"\r\n")
}

// ── CommandKind / Response ──────────────────────────────────────────────

/// What a queued command expects back.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// SGD `getvar`/`setvar`; the reply is raw text.
    Sgd,
    /// `~hi`; the reply decodes to [`Info`].
    Info,
    /// `^HH`; the reply decodes to [`Configuration`].
    Config,
    /// `~HQES`; the reply decodes to [`Status`].
    Status,
    /// Arbitrary caller command; the reply is raw text.
    Raw,
    /// A single read with nothing sent, for data the printer emits on its
    /// own; the reply is raw text.
    Read,
}

impl CommandKind {
    /// Framed kinds read until ETX; the rest read everything available.
    fn terminator(self) -> &'static str {
        match self {
            CommandKind::Info | CommandKind::Config | CommandKind::Status => ETX_TERMINATOR,
            CommandKind::Sgd | CommandKind::Raw | CommandKind::Read => "",
        }
    }

    /// Whether a queued command of kind `next` can be answered with the
    /// response already obtained for a command of this kind.
    pub fn shares_response_with(self, next: CommandKind) -> bool {
        self == CommandKind::Status && next == CommandKind::Status
    }

    fn decode(self, raw: String) -> Result<Response, LinkError> {
        match self {
            CommandKind::Status => Ok(Response::Status(Status::parse(&raw))),
            CommandKind::Info => Info::parse(&raw).map(Response::Info),
            CommandKind::Config => Configuration::parse(&raw).map(Response::Configuration),
            CommandKind::Sgd | CommandKind::Raw | CommandKind::Read => Ok(Response::Text(raw)),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Sgd => write!(f, "sgd"),
            CommandKind::Info => write!(f, "info"),
            CommandKind::Config => write!(f, "config"),
            CommandKind::Status => write!(f, "status"),
            CommandKind::Raw => write!(f, "raw"),
            CommandKind::Read => write!(f, "read"),
        }
    }
}

/// Decoded reply delivered to a command.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Raw text for [`CommandKind::Sgd`], [`CommandKind::Raw`] and
    /// [`CommandKind::Read`].
    Text(String),
    /// Decoded status.
    Status(Status),
    /// Decoded identification.
    Info(Info),
    /// Decoded configuration.
    Configuration(Configuration),
}

impl Response {
    fn into_text(self) -> Result<String, LinkError> {
        match self {
            Response::Text(text) => Ok(text),
            _ => Err(LinkError::UnexpectedResponse { expected: "text" }),
        }
    }

    fn into_status(self) -> Result<Status, LinkError> {
        match self {
            Response::Status(status) => Ok(status),
            _ => Err(LinkError::UnexpectedResponse { expected: "status" }),
        }
    }

    fn into_info(self) -> Result<Info, LinkError> {
        match self {
            Response::Info(info) => Ok(info),
            _ => Err(LinkError::UnexpectedResponse { expected: "info" }),
        }
    }

    fn into_configuration(self) -> Result<Configuration, LinkError> {
        match self {
            Response::Configuration(cfg) => Ok(cfg),
            _ => Err(LinkError::UnexpectedResponse {
                expected: "configuration",
            }),
        }
    }
}

// ── Pending ─────────────────────────────────────────────────────────────

type Reply = oneshot::Sender<Result<Response, LinkError>>;
type Extract<T> = Box<dyn FnOnce(Response) -> Result<T, LinkError> + Send>;

/// A queued request. Resolves once the channel has answered it.
///
/// The command is already queued when this value is created; dropping it
/// does not remove the command, it only discards the reply.
#[must_use = "the reply is lost unless the pending request is awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<Response, LinkError>>,
    extract: Option<Extract<T>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T, LinkError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let reply = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(reply) => reply.unwrap_or(Err(LinkError::ChannelClosed)),
        };
        let Some(extract) = self.extract.take() else {
            return Poll::Ready(Err(LinkError::ChannelClosed));
        };
        Poll::Ready(reply.and_then(extract))
    }
}

// ── Channel task ────────────────────────────────────────────────────────

struct Command {
    kind: CommandKind,
    text: String,
    reply: Reply,
    started: bool,
}

impl Command {
    fn respond(self, result: Result<Response, LinkError>) {
        // The caller may have dropped its `Pending`; nothing to do then.
        let _ = self.reply.send(result);
    }
}

enum Message {
    Enqueue(Command),
    Clear,
    QueueLen(oneshot::Sender<usize>),
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Enqueue(command) => write!(f, "Enqueue({})", command.kind),
            Message::Clear => write!(f, "Clear"),
            Message::QueueLen(_) => write!(f, "QueueLen"),
        }
    }
}

type Exchange = Pin<Box<dyn Future<Output = Result<String, LinkError>> + Send>>;
type ConfigurationCache = Arc<Mutex<Option<Configuration>>>;

/// Send the command text and read back its response.
async fn exchange(
    transport: Arc<dyn Transport>,
    device: Arc<Device>,
    kind: CommandKind,
    text: String,
    read_retries: Option<i32>,
) -> Result<String, LinkError> {
    if kind == CommandKind::Read {
        return Ok(transport.read(&device).await?);
    }
    send_then_read_until_string_received(
        transport.as_ref(),
        &device,
        &text,
        kind.terminator(),
        read_retries,
    )
    .await
}

async fn next_completion(in_flight: &mut Option<Exchange>) -> Result<String, LinkError> {
    match in_flight {
        Some(exchange) => exchange.await,
        None => std::future::pending().await,
    }
}

/// Pop the finished head and hand out its result, fanning a shareable
/// response out to the commands queued directly behind it.
///
/// A decoded configuration is cached here, whether or not anyone is still
/// waiting for the reply.
fn complete(
    queue: &mut VecDeque<Command>,
    result: Result<String, LinkError>,
    device: &Device,
    cache: &Mutex<Option<Configuration>>,
) {
    let Some(head) = queue.pop_front() else {
        return;
    };
    let kind = head.kind;

    let response = match result.and_then(|raw| kind.decode(raw)) {
        Ok(response) => response,
        Err(err) => {
            warn!(device = device.uid(), %kind, error = %err, "command failed");
            head.respond(Err(err));
            return;
        }
    };

    if let Response::Configuration(configuration) = &response {
        *cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(configuration.clone());
    }

    head.respond(Ok(response.clone()));
    let mut delivered = 1usize;
    while queue
        .front()
        .is_some_and(|next| kind.shares_response_with(next.kind))
    {
        if let Some(next) = queue.pop_front() {
            next.respond(Ok(response.clone()));
            delivered += 1;
        }
    }
    debug!(device = device.uid(), %kind, delivered, remaining = queue.len(), "command completed");
}

/// Drop every queued command except a head that is already executing.
fn clear(queue: &mut VecDeque<Command>, device: &Device) {
    let head = queue.pop_front();
    let mut discarded = queue.len();
    for command in queue.drain(..) {
        command.respond(Err(LinkError::Cancelled));
    }
    if let Some(head) = head {
        if head.started {
            queue.push_back(head);
        } else {
            discarded += 1;
            head.respond(Err(LinkError::Cancelled));
        }
    }
    debug!(device = device.uid(), discarded, "queue cleared");
}

async fn run_channel(
    device: Arc<Device>,
    transport: Arc<dyn Transport>,
    read_retries: Option<i32>,
    cache: ConfigurationCache,
    mut inbox: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    let mut queue: VecDeque<Command> = VecDeque::new();
    let mut in_flight: Option<Exchange> = None;
    let mut inbox_open = true;

    loop {
        if in_flight.is_none() {
            if let Some(head) = queue.front_mut() {
                head.started = true;
                debug!(device = device.uid(), kind = %head.kind, command = %head.text.escape_debug(), "executing");
                in_flight = Some(Box::pin(exchange(
                    Arc::clone(&transport),
                    Arc::clone(&device),
                    head.kind,
                    head.text.clone(),
                    read_retries,
                )));
            } else if !inbox_open {
                break;
            }
        }

        // Inbox first: anything submitted before an exchange completes is
        // queued in time to share its response.
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(device = device.uid(), "command channel shut down");
                break;
            }

            msg = inbox.recv(), if inbox_open => match msg {
                Some(Message::Enqueue(command)) => {
                    debug!(device = device.uid(), kind = %command.kind, depth = queue.len(), "queueing command");
                    queue.push_back(command);
                }
                Some(Message::Clear) => clear(&mut queue, &device),
                Some(Message::QueueLen(reply)) => {
                    let _ = reply.send(queue.len());
                }
                None => inbox_open = false,
            },

            result = next_completion(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                complete(&mut queue, result, &device, &cache);
            }
        }
    }
    // Remaining commands drop their reply senders and resolve as closed.
}

// ── CommandChannel ──────────────────────────────────────────────────────

/// Handle to one device's command queue.
///
/// Cloning the handle shares the same queue. Every operation is queued at
/// the moment it is called, so call order is execution order.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    device: Arc<Device>,
    inbox: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
    configuration: ConfigurationCache,
    reader: Arc<Mutex<Option<CancellationToken>>>,
    config: Arc<ChannelConfig>,
}

impl CommandChannel {
    /// Start the channel task for `device`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(device: Device, transport: Arc<dyn Transport>, config: ChannelConfig) -> Self {
        let device = Arc::new(device);
        let (inbox, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let configuration = ConfigurationCache::default();

        tokio::spawn(run_channel(
            Arc::clone(&device),
            transport,
            config.read_retries,
            Arc::clone(&configuration),
            rx,
            cancel.clone(),
        ));

        Self {
            device,
            inbox,
            cancel,
            configuration,
            reader: Arc::new(Mutex::new(None)),
            config: Arc::new(config),
        }
    }

    /// The device this channel talks to.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Queue a command and return its decoded response.
    pub fn enqueue(&self, kind: CommandKind, text: impl Into<String>) -> Pending<Response> {
        self.submit(kind, text.into(), Ok)
    }

    fn submit<T>(
        &self,
        kind: CommandKind,
        text: String,
        extract: impl FnOnce(Response) -> Result<T, LinkError> + Send + 'static,
    ) -> Pending<T> {
        let (reply, rx) = oneshot::channel();
        let command = Command {
            kind,
            text,
            reply,
            started: false,
        };
        // On a closed inbox the command (and its reply sender) is dropped,
        // so the pending request resolves as `ChannelClosed`.
        let _ = self.inbox.send(Message::Enqueue(command));
        Pending {
            rx,
            extract: Some(Box::new(extract)),
        }
    }

    /// Set an SGD setting.
    pub fn set_sgd(&self, setting: &str, value: &str) -> Pending<()> {
        self.submit(CommandKind::Sgd, set_sgd_command(setting, value), |_| Ok(()))
    }

    /// Read an SGD setting. Resolves to the raw text the printer returned.
    pub fn get_sgd(&self, setting: &str) -> Pending<String> {
        self.submit(CommandKind::Sgd, get_sgd_command(setting), Response::into_text)
    }

    /// Set an SGD setting, then read it back.
    ///
    /// The set is queued immediately. A spawned task queues the get as soon
    /// as the set has completed, whether or not the returned future is being
    /// polled, so the get lands behind anything submitted in the meantime.
    pub fn set_then_get_sgd(
        &self,
        setting: &str,
        value: &str,
    ) -> impl Future<Output = Result<String, LinkError>> + Send + use<> {
        let set = self.set_sgd(setting, value);
        let channel = self.clone();
        let setting = setting.to_string();
        let task = tokio::spawn(async move {
            set.await?;
            channel.get_sgd(&setting).await
        });
        async move { task.await.unwrap_or(Err(LinkError::ChannelClosed)) }
    }

    /// Query the printer model and firmware.
    pub fn get_info(&self) -> Pending<Info> {
        self.submit(CommandKind::Info, GET_INFO.to_string(), Response::into_info)
    }

    /// Fetch the configuration label and cache it on this channel.
    ///
    /// The cache is filled when the exchange succeeds, even if this request
    /// is dropped before it resolves.
    pub fn get_configuration(&self) -> Pending<Configuration> {
        self.submit(
            CommandKind::Config,
            GET_CONFIGURATION.to_string(),
            Response::into_configuration,
        )
    }

    /// The configuration fetched by an earlier call, if any.
    pub fn cached_configuration(&self) -> Option<Configuration> {
        self.configuration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The cached configuration, fetching it first if needed.
    pub async fn configuration(&self) -> Result<Configuration, LinkError> {
        match self.cached_configuration() {
            Some(configuration) => Ok(configuration),
            None => self.get_configuration().await,
        }
    }

    /// Fetch the configuration in the background, retrying failed attempts
    /// per [`ChannelConfig`], until it is cached.
    pub fn prefetch_configuration(&self) -> JoinHandle<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            let attempts = channel.config.configuration_attempts;
            for attempt in 1..=attempts {
                if channel.cached_configuration().is_some() {
                    return;
                }
                match channel.get_configuration().await {
                    Ok(_) => return,
                    Err(err) => {
                        warn!(device = channel.device.uid(), attempt, error = %err, "configuration fetch failed");
                        if attempt < attempts {
                            tokio::time::sleep(channel.config.configuration_retry_delay).await;
                        }
                    }
                }
            }
        })
    }

    /// Query the printer status.
    pub fn get_status(&self) -> Pending<Status> {
        self.submit(CommandKind::Status, GET_STATUS.to_string(), Response::into_status)
    }

    /// Query the status and resolve to its message when the printer is
    /// ready, or fail with [`LinkError::NotReady`] carrying the message.
    pub fn is_printer_ready(&self) -> Pending<&'static str> {
        self.submit(CommandKind::Status, GET_STATUS.to_string(), |response| {
            let status = response.into_status()?;
            if status.is_printer_ready() {
                Ok(status.message())
            } else {
                Err(LinkError::NotReady {
                    message: status.message().to_string(),
                })
            }
        })
    }

    /// Send an arbitrary command and read back everything available.
    pub fn query(&self, command: impl Into<String>) -> Pending<String> {
        self.submit(CommandKind::Raw, command.into(), Response::into_text)
    }

    /// Queue one read with nothing sent and return whatever arrived.
    ///
    /// Resolves to an empty string if the printer had nothing to say.
    pub fn read(&self) -> Pending<String> {
        self.submit(CommandKind::Read, String::new(), Response::into_text)
    }

    /// Poll the device for unsolicited data: every `interval` a
    /// [`read`](Self::read) is queued and non-empty text is handed to
    /// `on_data`.
    ///
    /// A failed read is logged and the loop keeps going. A zero interval is
    /// treated as one millisecond. Calling this again replaces the running
    /// reader. The reader ends on [`stop_read_on_interval`](Self::stop_read_on_interval),
    /// on [`shutdown`](Self::shutdown) or when the channel closes.
    pub fn read_on_interval<F>(&self, interval: Duration, on_data: F) -> JoinHandle<()>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let token = self.cancel.child_token();
        let previous = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let channel = self.clone();
        debug!(device = self.device.uid(), ?interval, "interval reader started");
        tokio::spawn(async move {
            loop {
                let result = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    result = async {
                        tokio::time::sleep(interval).await;
                        channel.read().await
                    } => result,
                };
                match result {
                    Ok(text) if !text.is_empty() => on_data(text),
                    Ok(_) => {}
                    Err(LinkError::ChannelClosed) => break,
                    Err(err) => {
                        debug!(device = channel.device.uid(), error = %err, "interval read failed");
                    }
                }
            }
            debug!(device = channel.device.uid(), "interval reader stopped");
        })
    }

    /// Stop the reader started by [`read_on_interval`](Self::read_on_interval).
    /// Returns `false` if none was running.
    pub fn stop_read_on_interval(&self) -> bool {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match reader {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Discard every queued command except one that is already executing.
    ///
    /// Discarded commands resolve with [`LinkError::Cancelled`]. The
    /// executing command still completes and delivers its reply.
    pub fn clear_queue(&self) {
        let _ = self.inbox.send(Message::Clear);
    }

    /// Number of queued commands, including one that is executing.
    pub async fn queue_len(&self) -> Result<usize, LinkError> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Message::QueueLen(reply))
            .map_err(|_| LinkError::ChannelClosed)?;
        rx.await.map_err(|_| LinkError::ChannelClosed)
    }

    /// Stop the channel task. Outstanding requests resolve with
    /// [`LinkError::ChannelClosed`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the channel task has been shut down.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.inbox.is_closed()
    }
}
