//! # castscan
//!
//! mDNS discovery registry and query-matching engine for Google Cast
//! devices.
//!
//! Cast devices announce themselves under the `_googlecast._tcp.local.`
//! service type, often under several announcement names at once (e.g. during
//! group-leadership handover). This crate consolidates those announcements
//! into one record per stable device identity and lets callers wait, with
//! bounded cancelable waits or via callback, for specific devices or for
//! an arbitrary count of devices to appear.
//!
//! ## Example
//!
//! ```ignore
//! use castscan::{discover_up_to, MdnsSdClient};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let client = Arc::new(MdnsSdClient::new()?);
//! let (records, browser) = discover_up_to(client, Some(5), Some(Duration::from_secs(5))).await?;
//! for record in &records {
//!     println!("Found: {:?} at {}", record.friendly_name, record.uri());
//! }
//! browser.stop();
//! ```

mod browser;
mod device;
mod discover;
mod error;
mod mdns;
mod registry;
mod resolver;
mod traits;

pub use browser::{start_watching, BrowserHandle};
pub use device::{DeviceMetadata, DeviceRecord};
pub use discover::{
    discover_and_connect, discover_and_connect_streaming, discover_matching, discover_up_to,
    DiscoveryCallback, DISCOVER_TIMEOUT,
};
pub use error::{ConnectError, DiscoveryError, Error, Result};
pub use mdns::MdnsSdClient;
pub use registry::{CastRegistry, NoopListener, RegistryListener};
pub use resolver::resolve_announcement;
pub use traits::{
    AnnouncementEvent, AnnouncementReceiver, CastConnector, ConnectOptions, MdnsClient,
    RawAnnouncement, TxtValue,
};

/// Cast announcement service type watched by every browser (fixed, not
/// user-configurable).
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";
