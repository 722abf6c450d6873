//! Production [`MdnsClient`] backend over the `mdns-sd` service daemon.

use crate::error::DiscoveryError;
use crate::traits::{AnnouncementEvent, AnnouncementReceiver, MdnsClient, RawAnnouncement, TxtValue};
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// How long `query` waits for an announcement to land in the resolution
/// cache before reporting a transient failure.
const QUERY_BUDGET: Duration = Duration::from_millis(50);
const QUERY_POLL: Duration = Duration::from_millis(5);

type AnnouncementCache = Arc<Mutex<HashMap<String, RawAnnouncement>>>;

/// mDNS client backed by an [`mdns_sd::ServiceDaemon`].
///
/// The daemon resolves services as part of browsing; resolved data is cached
/// per announcement name so `query` can answer without a network round trip.
pub struct MdnsSdClient {
    daemon: ServiceDaemon,
    cache: AnnouncementCache,
}

impl MdnsSdClient {
    pub fn new() -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::Daemon(format!("failed to create mDNS daemon: {}", e)))?;
        Ok(Self {
            daemon,
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

fn lock(cache: &AnnouncementCache) -> MutexGuard<'_, HashMap<String, RawAnnouncement>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

fn raw_from_info(info: &ServiceInfo) -> RawAnnouncement {
    let txt = info
        .get_properties()
        .iter()
        .map(|prop| {
            let value = match prop.val() {
                Some(bytes) => match std::str::from_utf8(bytes) {
                    Ok(s) => TxtValue::Text(s.to_string()),
                    Err(_) => TxtValue::Binary(bytes.to_vec()),
                },
                None => TxtValue::Text(String::new()),
            };
            (prop.key().to_string(), value)
        })
        .collect();

    RawAnnouncement {
        name: info.get_fullname().to_string(),
        addresses: info.get_addresses().iter().copied().collect(),
        hostname: info.get_hostname().to_string(),
        port: info.get_port(),
        txt,
    }
}

#[async_trait]
impl MdnsClient for MdnsSdClient {
    fn watch(&self, service_type: &str) -> Result<AnnouncementReceiver, DiscoveryError> {
        let events = self.daemon.browse(service_type).map_err(|e| {
            DiscoveryError::Daemon(format!("failed to browse {}: {}", service_type, e))
        })?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cache = Arc::clone(&self.cache);

        tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                let forwarded = match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let name = info.get_fullname().to_string();
                        let known = lock(&cache)
                            .insert(name.clone(), raw_from_info(&info))
                            .is_some();
                        if known {
                            AnnouncementEvent::Updated(name)
                        } else {
                            AnnouncementEvent::Added(name)
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        lock(&cache).remove(&fullname);
                        AnnouncementEvent::Removed(fullname)
                    }
                    other => {
                        trace!("ignoring daemon event {:?}", other);
                        continue;
                    }
                };
                if tx.send(forwarded).is_err() {
                    break;
                }
            }
            debug!("daemon receiver closed, watch forwarder exiting");
        });

        Ok(rx)
    }

    async fn query(
        &self,
        _service_type: &str,
        name: &str,
    ) -> Result<RawAnnouncement, DiscoveryError> {
        let deadline = Instant::now() + QUERY_BUDGET;
        loop {
            if let Some(raw) = lock(&self.cache).get(name).cloned() {
                return Ok(raw);
            }
            if Instant::now() >= deadline {
                return Err(DiscoveryError::QueryTimeout);
            }
            tokio::time::sleep(QUERY_POLL).await;
        }
    }

    fn cancel(&self, service_type: &str) -> Result<(), DiscoveryError> {
        self.daemon.stop_browse(service_type).map_err(|e| {
            DiscoveryError::Daemon(format!("failed to cancel browse of {}: {}", service_type, e))
        })
    }

    fn close(&self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("daemon shutdown: {}", e);
        }
    }
}
