//! The live data sync client.
//!
//! A single task owns the socket, the reconnect timer and the [`LiveState`].
//! [`SyncClient`] handles talk to it through a channel and read a shared view
//! of the state, so there is exactly one writer no matter how many readers.

use std::convert::TryFrom;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::time::Instant;

use async_std::channel::{self, Receiver, RecvError, Sender, TrySendError};
use async_std::task::{self, JoinHandle};
use futures::future::{select, Either};
use futures::pin_mut;
use serde_json::Value;

use crate::config::Config;
use crate::feed::frame::{Command, Frame};
use crate::feed::lifecycle::{Action, BackoffPolicy, Lifecycle, CONNECTION_ERROR};
use crate::feed::transport::{Link, Transport, TransportError, WebSocketTransport};
use crate::feed::{Status, Update};
use crate::store::LiveState;

/// How many updates may wait for a slow consumer before new ones are dropped.
/// The shared state is always current regardless.
pub const UPDATE_BACKLOG: usize = 1024;

enum Request {
    Send(String),
    Reconnect,
    Shutdown,
}

enum Event {
    Request(Result<Request, RecvError>),
    Inbound(Option<Result<String, TransportError>>),
}

struct ConnectionView {
    status: Status,
    error: Option<String>,
}

struct Shared {
    state: RwLock<LiveState>,
    connection: RwLock<ConnectionView>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

/// Cheap to clone handle onto the running client.
#[derive(Clone)]
pub struct SyncClient {
    shared: Arc<Shared>,
    requests: Sender<Request>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncClient {
    /// Starts a client talking websocket to the configured gateway.
    pub fn start(config: &Config) -> (SyncClient, Receiver<Update>) {
        SyncClient::start_with(
            WebSocketTransport,
            &config.url,
            config.backoff.clone(),
            config.radio_retention,
        )
    }

    pub fn start_with<T: Transport + 'static>(
        transport: T,
        url: &str,
        policy: BackoffPolicy,
        radio_retention: usize,
    ) -> (SyncClient, Receiver<Update>) {
        let (request_sender, request_receiver) = channel::unbounded();
        let (update_sender, update_receiver) = channel::bounded(UPDATE_BACKLOG);

        let shared = Arc::new(Shared {
            state: RwLock::new(LiveState::new(radio_retention)),
            connection: RwLock::new(ConnectionView {
                status: Status::Disconnected,
                error: None,
            }),
        });

        let driver = Driver {
            url: url.to_string(),
            transport,
            lifecycle: Lifecycle::new(policy),
            retry_at: None,
            published: Status::Disconnected,
            shared: shared.clone(),
            requests: request_receiver,
            updates: update_sender,
        };
        let handle = task::spawn(driver.run());

        let client = SyncClient {
            shared,
            requests: request_sender,
            task: Arc::new(Mutex::new(Some(handle))),
        };
        (client, update_receiver)
    }

    pub fn status(&self) -> Status {
        read(&self.shared.connection).status
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn error(&self) -> Option<String> {
        read(&self.shared.connection).error.clone()
    }

    /// Copy of everything received so far.
    pub fn snapshot(&self) -> LiveState {
        read(&self.shared.state).clone()
    }

    /// Borrowing access to the state without cloning it. Keep `f` short, the
    /// client cannot apply frames while it runs.
    pub fn with_state<R>(&self, f: impl FnOnce(&LiveState) -> R) -> R {
        let state = read(&self.shared.state);
        f(&*state)
    }

    /// Asks the gateway for driver specific streams. A no-op while offline.
    pub fn subscribe_to_driver(&self, driver_id: &str) {
        let command = Command::SubscribeDriver {
            driver_id: driver_id.to_string(),
        };
        match serde_json::to_string(&command) {
            Ok(text) => self.transmit(text),
            Err(err) => error!["Could not encode subscribe command: {}", err],
        }
    }

    /// Sends `payload` to the gateway as is. A no-op while offline.
    pub fn send_message(&self, payload: &Value) {
        self.transmit(payload.to_string());
    }

    fn transmit(&self, text: String) {
        if !self.is_connected() {
            debug!["Not connected, dropping outbound frame"];
            return;
        }
        if self.requests.try_send(Request::Send(text)).is_err() {
            debug!["Sync client is gone, dropping outbound frame"];
        }
    }

    pub fn reconnect(&self) {
        if self.requests.try_send(Request::Reconnect).is_err() {
            debug!["Sync client is gone, ignoring reconnect"];
        }
    }

    /// Cancels any pending retry, closes the socket and waits for the client
    /// task to finish. Further calls on any handle are no-ops.
    pub async fn shutdown(&self) {
        let _ = self.requests.try_send(Request::Shutdown);

        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            handle.await;
        }
    }
}

struct Driver<T> {
    url: String,
    transport: T,
    lifecycle: Lifecycle,
    retry_at: Option<Instant>,
    published: Status,
    shared: Arc<Shared>,
    requests: Receiver<Request>,
    updates: Sender<Update>,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        self.lifecycle.start();
        self.sync_view();

        loop {
            match self.lifecycle.status() {
                Status::Connecting => {
                    if let Some(link) = self.connect().await {
                        self.pump(link).await;
                    }
                }
                Status::Reconnecting => self.wait_for_retry().await,
                Status::TornDown => break,
                _ => {
                    let request = self.requests.recv().await;
                    self.on_offline_request(request);
                }
            }
            self.sync_view();
        }

        info!["Sync client for {} stopped", self.url];
    }

    async fn connect(&mut self) -> Option<Box<dyn Link>> {
        info!["Connecting to {}", self.url];

        let outcome = {
            let mut connect = self.transport.connect(&self.url);
            loop {
                let request = self.requests.recv();
                pin_mut!(request);
                match select(request, &mut connect).await {
                    Either::Left((Ok(Request::Send(_)), _)) => debug!["Still connecting, dropping outbound frame"],
                    Either::Left((request, _)) => break Err(request),
                    Either::Right((result, _)) => break Ok(result),
                }
            }
        };

        match outcome {
            Ok(Ok(link)) => {
                info!["Connected to {}", self.url];
                self.lifecycle.on_open();
                self.sync_view();
                Some(link)
            }
            Ok(Err(err)) => {
                warn!["Could not connect to {}: {}", self.url, err];
                self.lifecycle.on_error(CONNECTION_ERROR);
                self.on_closed();
                None
            }
            Err(request) => {
                self.on_offline_request(request);
                None
            }
        }
    }

    async fn pump(&mut self, mut link: Box<dyn Link>) {
        loop {
            let event = {
                let request = self.requests.recv();
                pin_mut!(request);
                match select(request, link.recv()).await {
                    Either::Left((request, _)) => Event::Request(request),
                    Either::Right((inbound, _)) => Event::Inbound(inbound),
                }
            };

            match event {
                Event::Inbound(Some(Ok(text))) => self.dispatch(&text),
                Event::Inbound(Some(Err(err))) => {
                    warn!["Connection to {} failed: {}", self.url, err];
                    self.lifecycle.on_error(CONNECTION_ERROR);
                    link.close().await;
                    self.on_closed();
                    return;
                }
                Event::Inbound(None) => {
                    info!["Disconnected from {}", self.url];
                    self.on_closed();
                    return;
                }
                Event::Request(Ok(Request::Send(text))) => {
                    if let Err(err) = link.send(text).await {
                        warn!["Failed to send frame: {}", err];
                    }
                }
                Event::Request(Ok(Request::Reconnect)) => {
                    info!["Reconnect requested, dropping current connection"];
                    link.close().await;
                    self.lifecycle.reconnect();
                    return;
                }
                Event::Request(Ok(Request::Shutdown)) | Event::Request(Err(_)) => {
                    link.close().await;
                    self.lifecycle.shutdown();
                    return;
                }
            }
        }
    }

    async fn wait_for_retry(&mut self) {
        let deadline = self.retry_at.unwrap_or_else(Instant::now);

        let fired = {
            let request = self.requests.recv();
            let timer = task::sleep(deadline.saturating_duration_since(Instant::now()));
            pin_mut!(request, timer);
            match select(request, timer).await {
                Either::Left((request, _)) => Err(request),
                Either::Right(_) => Ok(()),
            }
        };

        match fired {
            Ok(()) => {
                self.retry_at = None;
                info![
                    "Attempting to reconnect ({}/{})...",
                    self.lifecycle.attempt(),
                    self.lifecycle.policy().max_attempts
                ];
                self.lifecycle.on_retry_timer();
            }
            Err(request) => self.on_offline_request(request),
        }
    }

    fn on_offline_request(&mut self, request: Result<Request, RecvError>) {
        match request {
            Ok(Request::Send(_)) => debug!["Not connected, dropping outbound frame"],
            Ok(Request::Reconnect) => {
                self.retry_at = None;
                self.lifecycle.reconnect();
            }
            Ok(Request::Shutdown) | Err(_) => {
                self.retry_at = None;
                self.lifecycle.shutdown();
            }
        }
    }

    fn on_closed(&mut self) {
        match self.lifecycle.on_close() {
            Action::Retry { attempt, delay } => {
                info!["Reconnecting in {:?} (attempt {})", delay, attempt];
                self.retry_at = Some(Instant::now() + delay);
            }
            Action::GiveUp => error![
                "Giving up on {} after {} reconnect attempts",
                self.url,
                self.lifecycle.policy().max_attempts
            ],
            Action::Nothing => {}
        }
        self.sync_view();
    }

    fn dispatch(&mut self, text: &str) {
        let frame = match Frame::try_from(text) {
            Ok(Frame::Unknown(kind)) => {
                info!["Ignoring frame of unknown type {:?}", kind];
                return;
            }
            Ok(frame) => frame,
            Err(err) => {
                warn!["Dropping malformed frame: {}", err];
                return;
            }
        };

        let update = self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(frame, Instant::now());
        if let Some(update) = update {
            self.publish(update);
        }
    }

    fn sync_view(&mut self) {
        let status = self.lifecycle.status();
        {
            let mut view = self.shared.connection.write().unwrap_or_else(PoisonError::into_inner);
            view.status = status;
            view.error = self.lifecycle.error().map(str::to_string);
        }

        if status != self.published {
            self.published = status;
            self.publish(Update::Status(status));
        }
    }

    fn publish(&self, update: Update) {
        // A full or abandoned queue is fine, the shared view still has everything.
        if let Err(TrySendError::Full(_)) = self.updates.try_send(update) {
            trace!["Update backlog full, dropping update"];
        }
    }
}
