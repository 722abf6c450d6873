//! One-shot discovery query sessions.
//!
//! Every session follows the same shape: a fresh [`CastRegistry`] wired to a
//! session listener, a browser started on the caller's client instance, and a
//! bounded wait on a per-session completion signal. Timeout expiry is not an
//! error; the session returns whatever matched so far, possibly nothing.
//! The returned [`BrowserHandle`] stays live so the caller can keep the
//! registry updated; pass it to [`BrowserHandle::stop`] when done.

use crate::browser::{start_watching, BrowserHandle};
use crate::device::DeviceRecord;
use crate::error::{Error, Result};
use crate::registry::{CastRegistry, RegistryListener};
use crate::traits::{CastConnector, ConnectOptions, MdnsClient};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default discovery wait for callers that do not pick their own timeout.
pub const DISCOVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback invoked for every connected device in streaming mode.
pub type DiscoveryCallback<T> = Box<dyn Fn(T) + Send + Sync>;

async fn wait_complete(complete: &Notify, timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => {
            let _ = tokio::time::timeout(timeout, complete.notified()).await;
        }
        None => complete.notified().await,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Discover until `max_devices` distinct identities are present, or until
/// the timeout elapses (`timeout: None` waits for the count alone;
/// `max_devices: None` just waits out the timeout).
///
/// Returns all currently known records plus the live browser handle.
pub async fn discover_up_to(
    client: Arc<dyn MdnsClient>,
    max_devices: Option<usize>,
    timeout: Option<Duration>,
) -> Result<(Vec<DeviceRecord>, BrowserHandle)> {
    let session = Arc::new(CountSession {
        max: max_devices,
        present: AtomicUsize::new(0),
        done: AtomicBool::new(false),
        complete: Notify::new(),
    });
    let registry = Arc::new(CastRegistry::new(
        Arc::clone(&session) as Arc<dyn RegistryListener>
    ));
    let handle = start_watching(client, Arc::clone(&registry))?;

    wait_complete(&session.complete, timeout).await;
    Ok((registry.devices(), handle))
}

/// Discover until every requested identity and every requested friendly name
/// has been seen, or until the timeout elapses. Either criterion may be
/// empty; an empty set is vacuously satisfied.
///
/// Matches are returned in discovery order; partial results on timeout.
pub async fn discover_matching(
    client: Arc<dyn MdnsClient>,
    identities: Vec<Uuid>,
    friendly_names: Vec<String>,
    timeout: Option<Duration>,
) -> Result<(Vec<DeviceRecord>, BrowserHandle)> {
    let session = Arc::new(MatchSession::new(identities, friendly_names));
    let registry = Arc::new(CastRegistry::new(
        Arc::clone(&session) as Arc<dyn RegistryListener>
    ));
    let handle = start_watching(client, registry)?;

    wait_complete(&session.complete, timeout).await;
    Ok((session.matched(), handle))
}

/// [`discover_matching`], additionally constructing a connectable client for
/// every matched record.
///
/// A connection failure drops that candidate from the results without
/// aborting the session; retries, if any, belong to the connector itself.
/// The match is still consumed, so one unconnectable device cannot hold the
/// session open.
pub async fn discover_and_connect<C>(
    client: Arc<dyn MdnsClient>,
    connector: Arc<C>,
    identities: Vec<Uuid>,
    friendly_names: Vec<String>,
    options: ConnectOptions,
    timeout: Option<Duration>,
) -> Result<(Vec<C::Client>, BrowserHandle)>
where
    C: CastConnector + 'static,
{
    let session = Arc::new(ConnectSession {
        matcher: MatchSession::new(identities, friendly_names),
        connector,
        options,
        clients: Mutex::new(Vec::new()),
    });
    let registry = Arc::new(CastRegistry::new(
        Arc::clone(&session) as Arc<dyn RegistryListener>
    ));
    let handle = start_watching(client, registry)?;

    wait_complete(&session.matcher.complete, timeout).await;
    Ok((session.take_clients(), handle))
}

/// Streaming discovery: every added and successfully connected device is
/// forwarded to `callback` immediately. The session never completes on its
/// own; the browser handle is returned at once so the caller can stop it.
///
/// Requesting streaming without a callback is a usage error, rejected before
/// any watcher starts.
pub fn discover_and_connect_streaming<C>(
    client: Arc<dyn MdnsClient>,
    connector: Arc<C>,
    callback: Option<DiscoveryCallback<C::Client>>,
    options: ConnectOptions,
) -> Result<BrowserHandle>
where
    C: CastConnector + 'static,
{
    let callback = callback.ok_or(Error::MissingCallback)?;
    let session = Arc::new(StreamingSession {
        connector,
        options,
        callback,
    });
    let registry = Arc::new(CastRegistry::new(session as Arc<dyn RegistryListener>));
    start_watching(client, registry)
}

/// Count-bound session: signals once the registry holds `max` identities.
struct CountSession {
    max: Option<usize>,
    /// Mirrors the registry's record count (adds minus removes; this session
    /// is the registry's only listener, driven by a single task).
    present: AtomicUsize,
    done: AtomicBool,
    complete: Notify,
}

#[async_trait]
impl RegistryListener for CountSession {
    async fn on_add(&self, record: &DeviceRecord) {
        let present = self.present.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("discovered {} ({} present)", record.identity, present);
        if let Some(max) = self.max {
            if present >= max && !self.done.swap(true, Ordering::SeqCst) {
                self.complete.notify_one();
            }
        }
    }

    async fn on_remove(&self, _record: &DeviceRecord) {
        self.present.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MatchState {
    remaining_identities: HashSet<Uuid>,
    remaining_names: HashSet<String>,
    /// Accepted records in discovery order, one per identity.
    matched: Vec<DeviceRecord>,
    done: bool,
}

/// Set-bound session state shared by the matching and connecting variants.
struct MatchSession {
    state: Mutex<MatchState>,
    complete: Notify,
}

impl MatchSession {
    fn new(identities: Vec<Uuid>, friendly_names: Vec<String>) -> Self {
        let session = Self {
            state: Mutex::new(MatchState {
                remaining_identities: identities.into_iter().collect(),
                remaining_names: friendly_names.into_iter().collect(),
                matched: Vec::new(),
                done: false,
            }),
            complete: Notify::new(),
        };
        // Nothing requested: complete immediately rather than waiting for an
        // event that can never drain anything.
        session.signal_if_complete();
        session
    }

    /// Drain any criteria `record` satisfies and record the match. One event
    /// may satisfy an identity and a name criterion at once; both are
    /// drained, the device is recorded once.
    fn take(&self, record: &DeviceRecord) -> bool {
        let mut state = lock(&self.state);
        if state.done {
            return false;
        }
        let mut hit = state.remaining_identities.remove(&record.identity);
        if let Some(friendly_name) = record.friendly_name.as_deref() {
            hit |= state.remaining_names.remove(friendly_name);
        }
        if hit
            && !state
                .matched
                .iter()
                .any(|matched| matched.identity == record.identity)
        {
            state.matched.push(record.clone());
        }
        hit
    }

    /// Signal completion exactly once, when both remaining sets are empty.
    fn signal_if_complete(&self) {
        let mut state = lock(&self.state);
        if !state.done
            && state.remaining_identities.is_empty()
            && state.remaining_names.is_empty()
        {
            state.done = true;
            self.complete.notify_one();
        }
    }

    fn matched(&self) -> Vec<DeviceRecord> {
        lock(&self.state).matched.clone()
    }
}

#[async_trait]
impl RegistryListener for MatchSession {
    async fn on_add(&self, record: &DeviceRecord) {
        self.take(record);
        self.signal_if_complete();
    }

    async fn on_update(&self, record: &DeviceRecord) {
        self.take(record);
        self.signal_if_complete();
    }
}

/// Set-bound session that also connects each match.
struct ConnectSession<C: CastConnector> {
    matcher: MatchSession,
    connector: Arc<C>,
    options: ConnectOptions,
    clients: Mutex<Vec<C::Client>>,
}

impl<C: CastConnector> ConnectSession<C> {
    async fn handle(&self, record: &DeviceRecord) {
        if self.matcher.take(record) {
            match self.connector.connect(record, &self.options).await {
                Ok(client) => lock(&self.clients).push(client),
                Err(e) => warn!(
                    "dropping matched device {} ({}): {}",
                    record.identity,
                    record.uri(),
                    e
                ),
            }
        }
        // Completion is checked only after the connect attempt settles, so a
        // waiting caller never wakes before the last client is recorded.
        self.matcher.signal_if_complete();
    }

    fn take_clients(&self) -> Vec<C::Client> {
        std::mem::take(&mut *lock(&self.clients))
    }
}

#[async_trait]
impl<C: CastConnector + 'static> RegistryListener for ConnectSession<C> {
    async fn on_add(&self, record: &DeviceRecord) {
        self.handle(record).await;
    }

    async fn on_update(&self, record: &DeviceRecord) {
        self.handle(record).await;
    }
}

/// Unbounded streaming session: connect-and-forward on every add event.
struct StreamingSession<C: CastConnector> {
    connector: Arc<C>,
    options: ConnectOptions,
    callback: DiscoveryCallback<C::Client>,
}

#[async_trait]
impl<C: CastConnector + 'static> RegistryListener for StreamingSession<C> {
    async fn on_add(&self, record: &DeviceRecord) {
        match self.connector.connect(record, &self.options).await {
            Ok(client) => (self.callback)(client),
            Err(e) => warn!(
                "dropping discovered device {} ({}): {}",
                record.identity,
                record.uri(),
                e
            ),
        }
    }
}
