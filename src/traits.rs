//! Trait seams for the external collaborators: the discovery-protocol client
//! that feeds announcements, and the factory that turns matched records into
//! connectable clients. Both are traits so sessions can run against fakes in
//! tests.

use crate::device::DeviceRecord;
use crate::error::{ConnectError, DiscoveryError};
use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Raw announcement event delivered by the mDNS client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnouncementEvent {
    /// A service instance appeared under this announcement name.
    Added(String),
    /// An already-known announcement name re-announced with new data.
    Updated(String),
    /// The announcement name disappeared from the network.
    Removed(String),
}

impl AnnouncementEvent {
    /// The announcement name the event refers to.
    pub fn name(&self) -> &str {
        match self {
            AnnouncementEvent::Added(name)
            | AnnouncementEvent::Updated(name)
            | AnnouncementEvent::Removed(name) => name,
        }
    }

    /// Check if this is a Removed event.
    pub fn is_removed(&self) -> bool {
        matches!(self, AnnouncementEvent::Removed(_))
    }
}

/// A TXT property value, which may or may not have been decoded upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxtValue {
    /// Already decoded by the backend.
    Text(String),
    /// Raw bytes as they appeared on the wire.
    Binary(Vec<u8>),
}

impl TxtValue {
    /// Decode to text, doing work only for the binary case. Returns `None`
    /// for bytes that are not valid UTF-8.
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            TxtValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            TxtValue::Binary(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
        }
    }
}

/// Unresolved service data for one announcement name.
#[derive(Debug, Clone)]
pub struct RawAnnouncement {
    pub name: String,
    /// Resolved network addresses, preferred over `hostname`.
    pub addresses: Vec<IpAddr>,
    /// Advertised hostname, the fallback when no address resolved.
    pub hostname: String,
    pub port: u16,
    pub txt: HashMap<String, TxtValue>,
}

/// Stream of announcement events for one active watch.
pub type AnnouncementReceiver = mpsc::UnboundedReceiver<AnnouncementEvent>;

/// The discovery-protocol client consumed by the browser.
#[async_trait]
pub trait MdnsClient: Send + Sync {
    /// Start watching for announcements of `service_type`, returning the
    /// event stream for that watch.
    fn watch(&self, service_type: &str) -> Result<AnnouncementReceiver, DiscoveryError>;

    /// Resolve the raw service data for one announcement name.
    ///
    /// Failures are transient from the caller's perspective; the resolver
    /// retries within a bounded budget.
    async fn query(
        &self,
        service_type: &str,
        name: &str,
    ) -> Result<RawAnnouncement, DiscoveryError>;

    /// Cancel an active watch.
    fn cancel(&self, service_type: &str) -> Result<(), DiscoveryError>;

    /// Release the client instance. Must be safe to call after `cancel`
    /// failed.
    fn close(&self);
}

/// Options passed through to the connectable-client factory. `None` fields
/// let the client pick its own defaults.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Number of connection retries.
    pub tries: Option<u32>,
    /// Wait between retries.
    pub retry_wait: Option<Duration>,
    /// Socket timeout.
    pub timeout: Option<Duration>,
}

/// Factory turning a matched device record into a connectable client.
///
/// Connection retries and extended-status lookups are the implementation's
/// concern; the discovery layer only observes success or failure per
/// candidate.
#[async_trait]
pub trait CastConnector: Send + Sync {
    /// The connected client type produced for each matched device.
    type Client: Send + 'static;

    async fn connect(
        &self,
        record: &DeviceRecord,
        options: &ConnectOptions,
    ) -> Result<Self::Client, ConnectError>;
}
