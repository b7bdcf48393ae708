// ── Session lifecycle ──
//
// One authenticated, instrumented connection to one device. Owns the
// transport, the request correlator and the derived phone state, and runs
// two background tasks per connection: the reader (sole mutator of the
// phone state) and the keepalive ticker.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use indexmap::IndexMap;
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use deskctl_proto::{
    BoxedStream, Connector, Correlator, Dispatch, FrameSplitter, Hook, MessageBuilder,
    OperaDefinitions, PendingReply, TiRequest, TlsConnector,
};

use crate::config::{BackoffConfig, SessionConfig};
use crate::error::CoreError;
use crate::event::{Direction, EventHub, Observer, PhoneEvent};
use crate::state::{DeviceIdentity, PhoneState};

/// Definitions version this engine is written against.
pub const REQUIRED_DEFINITIONS_VERSION: u32 = 1;

/// Configuration items fetched during instrumentation setup.
const IDENTITY_ITEMS: [&str; 3] = ["e164", "related-device-type", "software-version"];

const READ_BUFFER_SIZE: usize = 16 * 1024;

// ── SessionState ─────────────────────────────────────────────────

/// Lifecycle phase, observable through [`Session::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Authenticating,
    TestModeSetup,
    Subscribed,
    KeepAlive,
    ShuttingDown,
    Disconnected,
}

// ── SessionInfo ──────────────────────────────────────────────────

/// Summary of a successful bring-up.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionInfo {
    pub device_type: String,
    pub e164: String,
    pub address: String,
    pub software_version: String,
}

impl SessionInfo {
    fn new(identity: &DeviceIdentity, address: &str) -> Self {
        Self {
            device_type: identity.device_type_string.clone(),
            e164: identity.e164.clone(),
            address: address.to_owned(),
            software_version: identity.software_version.clone(),
        }
    }
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}@{} [{}]",
            self.device_type, self.e164, self.address, self.software_version
        )
    }
}

// ── Session ──────────────────────────────────────────────────────

/// Handle to one device session.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Does not connect on
/// construction; call [`connect()`](Self::connect).
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) config: SessionConfig,
    builder: Arc<dyn MessageBuilder>,
    connector: Arc<dyn Connector>,
    correlator: Correlator,
    phone: std::sync::Mutex<PhoneState>,
    pub(crate) events: EventHub,
    session_state: watch::Sender<SessionState>,
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    pub(crate) connected: AtomicBool,
    cancel: CancellationToken,
    /// Child token for the current connection, replaced on every connect.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Session over TLS with the bundled protocol definitions.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let connector = TlsConnector::new(&config.address, config.port, &config.transport())?;
        Self::with_parts(config, Arc::new(OperaDefinitions::new()), Arc::new(connector))
    }

    /// Session with an explicit message builder and transport.
    ///
    /// Fails when the builder's definitions version differs from
    /// [`REQUIRED_DEFINITIONS_VERSION`].
    pub fn with_parts(
        config: SessionConfig,
        builder: Arc<dyn MessageBuilder>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, CoreError> {
        let found = builder.version();
        if found != REQUIRED_DEFINITIONS_VERSION {
            return Err(CoreError::IncompatibleDefinitions {
                required: REQUIRED_DEFINITIONS_VERSION,
                found,
            });
        }

        let (session_state, _) = watch::channel(SessionState::Idle);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                builder,
                connector,
                correlator: Correlator::new(),
                phone: std::sync::Mutex::new(PhoneState::new()),
                events: EventHub::new(),
                session_state,
                writer: Mutex::new(None),
                connected: AtomicBool::new(false),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect, authenticate and (unless disabled) enter test mode.
    ///
    /// Succeeds only once the device has pushed at least one unsolicited
    /// event; a silent device means another session holds the test
    /// interface. On failure the transport is closed again.
    pub async fn connect(&self) -> Result<SessionInfo, CoreError> {
        if self.is_connected() {
            return Err(CoreError::Internal("session is already connected".into()));
        }
        let config = &self.inner.config;
        info!(
            address = %config.address,
            init_test_mode = config.init_test_mode,
            timeout_secs = config.timeout.as_secs(),
            "connecting"
        );
        self.inner.set_state(SessionState::Connecting);

        // Fresh child token for this connection (supports reconnect).
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        let stream = match self.open_transport(&child).await {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };
        self.inner.set_state(SessionState::Connected);

        let (read_half, write_half) = tokio::io::split(stream);
        *self.inner.writer.lock().await = Some(write_half);
        self.inner.connected.store(true, Ordering::SeqCst);
        self.inner.task_handles.lock().await.push(tokio::spawn(reader_task(
            Arc::clone(&self.inner),
            read_half,
            child.clone(),
        )));

        match self.bring_up(&child).await {
            Ok(info) => {
                info!(session = %info, "session established");
                self.inner.events.log(format!("success. {info}"));
                Ok(info)
            }
            Err(e) => {
                warn!(error = %e, "bring-up failed");
                self.inner.connected.store(false, Ordering::SeqCst);
                self.close().await;
                Err(e)
            }
        }
    }

    /// Leave test mode and close the transport.
    ///
    /// Returns the hook to idle and tears down state indications first.
    /// Safe to call repeatedly and on a session that never connected.
    pub async fn shutdown(&self) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            info!(address = %self.inner.config.address, "shutting down");
            self.inner.set_state(SessionState::ShuttingDown);
            for request in [
                TiRequest::Hook(Hook::Off),
                TiRequest::Hook(Hook::On),
                TiRequest::IndicateStates { subscribe: false },
            ] {
                if let Err(e) = self.inner.ti(&request).await {
                    warn!(error = %e, ?request, "teardown request failed (non-fatal)");
                }
            }
        }
        self.close().await;
    }

    /// Retry the handshake with backoff until it succeeds or the bring-up
    /// deadline passes.
    async fn open_transport(&self, cancel: &CancellationToken) -> Result<BoxedStream, CoreError> {
        let config = &self.inner.config;
        let timeout = CoreError::Timeout {
            timeout_secs: config.timeout.as_secs(),
        };
        let deadline = Instant::now() + config.timeout;
        let peer = self.inner.connector.peer();
        let mut attempt: u32 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timeout);
            }

            match tokio::time::timeout(remaining, self.inner.connector.connect()).await {
                Ok(Ok(stream)) => {
                    debug!(peer = %peer, attempt, "transport connected");
                    return Ok(stream);
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!(peer = %peer, attempt, error = %e, "connection attempt failed");
                    self.inner
                        .events
                        .log(format!("connection attempt {} to {peer} failed: {e}", attempt + 1));
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(timeout),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let delay = calculate_backoff(attempt, &config.backoff).min(remaining);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CoreError::Disconnected),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn bring_up(&self, cancel: &CancellationToken) -> Result<SessionInfo, CoreError> {
        let inner = &self.inner;
        let config = &inner.config;

        inner.set_state(SessionState::Authenticating);
        let pending = inner.correlator.register_auth();
        inner
            .send(inner.builder.auth_request(config.credential.expose_secret()))
            .await?;
        let reply = inner.await_reply(pending).await?;
        if !inner.builder.is_auth_accepted(&reply) {
            inner.events.log("authorization error");
            return Err(CoreError::AuthorizationFailed);
        }
        debug!("authenticated");

        if config.init_test_mode {
            inner.set_state(SessionState::TestModeSetup);
            inner
                .ti(&TiRequest::RegisterService {
                    credential: config.credential.expose_secret(),
                })
                .await?;
            inner.ti(&TiRequest::ControlMode).await?;
            inner.ti(&TiRequest::IndicateStates { subscribe: true }).await?;

            let mut items = inner.get_config(&IDENTITY_ITEMS).await?;
            let identity = DeviceIdentity::from_config(
                items.shift_remove("e164"),
                items.shift_remove("related-device-type"),
                items.get("software-version").map(String::as_str),
            );
            debug!(
                e164 = %identity.e164,
                device_type = %identity.device_type,
                version = %identity.software_version,
                "device identified"
            );
            inner.lock_phone().set_identity(identity);

            inner.ti(&TiRequest::Hook(Hook::Off)).await?;
            tokio::time::sleep(config.hook_off_settle).await;
            inner.ti(&TiRequest::Hook(Hook::On)).await?;
            tokio::time::sleep(config.hook_on_settle).await;
        }

        if !inner.lock_phone().is_subscribed() {
            return Err(CoreError::SessionConflict {
                address: config.address.clone(),
            });
        }
        inner.set_state(SessionState::Subscribed);

        inner.task_handles.lock().await.push(tokio::spawn(keepalive_task(
            Arc::clone(inner),
            cancel.clone(),
        )));
        inner.set_state(SessionState::KeepAlive);

        let identity = inner.lock_phone().identity().clone();
        Ok(SessionInfo::new(&identity, &config.address))
    }

    /// Cancel background tasks, close the transport and fail anything
    /// still waiting for a reply.
    async fn close(&self) {
        // Cancel the child token (not the parent; allows reconnect).
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "transport close failed");
            }
        }

        let failed = self.inner.correlator.fail_all();
        if failed > 0 {
            debug!(failed, "pending requests failed on close");
        }
        self.inner.set_state(SessionState::Disconnected);
        debug!("disconnected");
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Lifecycle phase updates.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.session_state.subscribe()
    }

    /// Receive every published event.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PhoneEvent>> {
        self.inner.events.subscribe()
    }

    /// Register a synchronous observer.
    pub fn add_observer(&self, observer: impl Observer + 'static) {
        self.inner.events.add_observer(Arc::new(observer));
    }

    /// Run `f` against the current phone state.
    ///
    /// Holds the state lock for the duration; keep `f` short and never
    /// await inside it.
    pub fn with_state<T>(&self, f: impl FnOnce(&PhoneState) -> T) -> T {
        f(&self.inner.lock_phone())
    }

    /// Owned copy of the current phone state.
    pub fn snapshot(&self) -> PhoneState {
        self.with_state(Clone::clone)
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.with_state(|s| s.identity().clone())
    }

    /// Requests still waiting for a device reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    pub(crate) fn ensure_connected(&self) -> Result<(), CoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(CoreError::NotConnected)
        }
    }
}

// ── Request plumbing ─────────────────────────────────────────────

impl SessionInner {
    fn set_state(&self, state: SessionState) {
        trace!(%state, "session state");
        let _ = self.session_state.send(state);
    }

    pub(crate) fn lock_phone(&self) -> MutexGuard<'_, PhoneState> {
        self.phone.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, message: String) -> Result<(), CoreError> {
        {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().ok_or(CoreError::NotConnected)?;
            trace!(message = %message, "outbound");
            writer
                .write_all(message.as_bytes())
                .await
                .map_err(deskctl_proto::Error::from)?;
            writer.flush().await.map_err(deskctl_proto::Error::from)?;
        }
        self.events.publish(PhoneEvent::Traffic {
            direction: Direction::Outbound,
            message,
        });
        Ok(())
    }

    async fn await_reply(&self, pending: PendingReply) -> Result<String, CoreError> {
        let id = pending.id().to_owned();
        match tokio::time::timeout(self.config.timeout, pending).await {
            Ok(reply) => Ok(reply?),
            Err(_) => {
                warn!(req_id = %id, "no reply from device");
                self.correlator.forget(&id);
                Err(CoreError::Timeout {
                    timeout_secs: self.config.timeout.as_secs(),
                })
            }
        }
    }

    /// Send one id-bearing request and wait for its reply.
    async fn request(&self, build: impl FnOnce(&str) -> String) -> Result<String, CoreError> {
        let (id, pending) = self.correlator.issue();
        debug!(req_id = %id, "request");
        self.send(build(&id)).await?;
        self.await_reply(pending).await
    }

    pub(crate) async fn ti(&self, request: &TiRequest<'_>) -> Result<String, CoreError> {
        self.request(|id| self.builder.instrumentation(id, request)).await
    }

    pub(crate) async fn get_config(&self, items: &[&str]) -> Result<IndexMap<String, String>, CoreError> {
        let mut values = IndexMap::new();
        for item in items {
            let reply = self.request(|id| self.builder.ocms_get(id, item)).await?;
            match self.builder.ocms_value(&reply, item) {
                Some(value) => {
                    values.insert((*item).to_owned(), value);
                }
                None => debug!(item, "no value in configuration reply"),
            }
            tokio::time::sleep(self.config.config_item_delay).await;
        }
        Ok(values)
    }

    pub(crate) async fn set_config(&self, items: &[(&str, &str)]) -> Result<(), CoreError> {
        for (item, value) in items {
            self.request(|id| self.builder.ocms_set(id, item, value)).await?;
            tokio::time::sleep(self.config.config_item_delay).await;
        }
        Ok(())
    }

    // ── Inbound ──────────────────────────────────────────────────

    fn handle_message(&self, message: String) {
        trace!(message = %message, "inbound");
        self.events.publish(PhoneEvent::Traffic {
            direction: Direction::Inbound,
            message: message.clone(),
        });

        let id = self.builder.request_id(&message).map(str::to_owned);
        match self.correlator.dispatch(id.as_deref(), message) {
            Dispatch::Resolved(id) => trace!(req_id = %id, "reply dispatched"),
            Dispatch::Unsolicited(message) => self.handle_event(&message),
        }
    }

    fn handle_event(&self, message: &str) {
        if self.lock_phone().mark_subscribed() {
            info!(address = %self.config.address, "successfully subscribed");
            self.events.publish(PhoneEvent::Subscribed);
            self.events.log("Successfully subscribed");
        }

        let Some(payload) = self.builder.event_payload(message) else {
            trace!("unsolicited message without payload");
            return;
        };
        let Some((category, body)) = self.builder.classify(payload) else {
            trace!(payload, "unclassified payload");
            return;
        };

        let decoded = match deskctl_proto::decode::decode(category, body) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "payload dropped");
                return;
            }
        };

        let events = match self.lock_phone().apply(decoded) {
            Ok(events) => events,
            Err(e) => {
                debug!(error = %e, "payload dropped");
                return;
            }
        };
        for event in events {
            self.events.publish(event);
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn reader_task(
    inner: Arc<SessionInner>,
    mut read: ReadHalf<BoxedStream>,
    cancel: CancellationToken,
) {
    let splitter = FrameSplitter::new(inner.builder.marker());
    let mut chunk = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        chunk.clear();
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = read.read_buf(&mut chunk) => match result {
                Ok(0) => {
                    info!(address = %inner.config.address, "device closed the connection");
                    break;
                }
                Ok(_) => {
                    for message in splitter.split(&chunk) {
                        inner.handle_message(message);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "transport read failed");
                    break;
                }
            }
        }
    }

    if !cancel.is_cancelled() {
        inner.connected.store(false, Ordering::SeqCst);
        inner.correlator.fail_all();
        inner.events.log("connection closed by device");
        inner.set_state(SessionState::Disconnected);
    }
    debug!("reader task exiting");
}

async fn keepalive_task(inner: Arc<SessionInner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.config.keepalive_interval);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = inner.ti(&TiRequest::KeepAlive) => {
                if let Err(e) = result {
                    warn!(error = %e, "keepalive failed");
                }
            }
        }
    }
    debug!("keepalive task exiting");
}

/// Exponential backoff with deterministic jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 25%)`
fn calculate_backoff(attempt: u32, config: &BackoffConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = BackoffConfig::default();
        let first = calculate_backoff(0, &config);
        assert_eq!(first, config.initial_delay);

        let late = calculate_backoff(10, &config);
        assert!(late <= config.max_delay.mul_f64(1.25));
        assert!(late >= config.max_delay.mul_f64(0.75));
    }

    #[test]
    fn session_info_display() {
        let identity = DeviceIdentity::from_config(
            Some("1000".into()),
            Some("CP400".into()),
            Some("V1 R2.3.4"),
        );
        let info = SessionInfo::new(&identity, "10.0.0.5");
        assert_eq!(info.to_string(), "CP400 1000@10.0.0.5 [V1 R2.3.4]");
    }

    #[test]
    fn new_session_starts_idle() {
        let session = Session::new(SessionConfig::default()).unwrap();
        assert!(!session.is_connected());
        assert_eq!(*session.state().borrow(), SessionState::Idle);
        assert_eq!(session.identity(), DeviceIdentity::default());
    }
}
