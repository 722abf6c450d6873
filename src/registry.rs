//! The discovery registry: identity-keyed device records.

use crate::device::{DeviceMetadata, DeviceRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Notifications fired by [`CastRegistry`] as records change.
///
/// All three methods default to no-ops so implementors only override what
/// they care about. Callbacks are invoked by the announcement drive task with
/// the registry lock released, so a listener may read the registry back.
#[async_trait]
pub trait RegistryListener: Send + Sync {
    /// A record was created for a previously unknown identity.
    async fn on_add(&self, _record: &DeviceRecord) {}
    /// An existing record gained a name or had its metadata refreshed.
    async fn on_update(&self, _record: &DeviceRecord) {}
    /// The last name for an identity disappeared; `record` is the last-known
    /// snapshot.
    async fn on_remove(&self, _record: &DeviceRecord) {}
}

/// Listener that ignores every notification.
pub struct NoopListener;

#[async_trait]
impl RegistryListener for NoopListener {}

enum Change {
    Added(DeviceRecord),
    Updated(DeviceRecord),
    Removed(DeviceRecord),
    UnknownName,
}

/// Consolidated view of all currently announced devices, keyed by identity.
///
/// Mutated only by the announcement drive task; read by waiting callers
/// through snapshot methods that take the same lock.
pub struct CastRegistry {
    records: Mutex<HashMap<Uuid, DeviceRecord>>,
    listener: Arc<dyn RegistryListener>,
}

impl CastRegistry {
    pub fn new(listener: Arc<dyn RegistryListener>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            listener,
        }
    }

    /// A registry without change notifications.
    pub fn unlistened() -> Self {
        Self::new(Arc::new(NoopListener))
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<Uuid, DeviceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of distinct device identities currently present.
    pub fn count(&self) -> usize {
        self.guard().len()
    }

    /// Consistent snapshot of all current records.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.guard().values().cloned().collect()
    }

    /// Snapshot of one record by identity.
    pub fn get(&self, identity: &Uuid) -> Option<DeviceRecord> {
        self.guard().get(identity).cloned()
    }

    /// Apply an add/update announcement for `name`.
    ///
    /// A new identity creates a record whose name set is `{name}` and fires
    /// `on_add`; a known identity gains the name, has its metadata
    /// overwritten wholesale, and fires `on_update`.
    pub async fn add_or_update(&self, name: &str, metadata: DeviceMetadata) {
        let change = {
            let mut records = self.guard();
            match records.get_mut(&metadata.identity) {
                Some(record) => {
                    record.names.insert(name.to_string());
                    record.refresh(metadata);
                    Change::Updated(record.clone())
                }
                None => {
                    let record = DeviceRecord::from_metadata(name, metadata);
                    records.insert(record.identity, record.clone());
                    Change::Added(record)
                }
            }
        };
        self.notify(change).await;
    }

    /// Apply a removal announcement for `name`.
    ///
    /// Removing the last name for an identity deletes the record and fires
    /// `on_remove` with the last-known snapshot; otherwise the record stays
    /// (metadata left stale until the next update) and `on_update` fires.
    /// Unknown names are logged and ignored.
    pub async fn remove(&self, name: &str) {
        let change = {
            let mut records = self.guard();
            let found = records
                .iter()
                .find_map(|(identity, record)| record.names.contains(name).then(|| *identity));
            match found {
                None => Change::UnknownName,
                Some(identity) => match records.get_mut(&identity) {
                    None => Change::UnknownName,
                    Some(record) => {
                        record.names.remove(name);
                        if record.names.is_empty() {
                            let snapshot = record.clone();
                            records.remove(&identity);
                            Change::Removed(snapshot)
                        } else {
                            Change::Updated(record.clone())
                        }
                    }
                },
            }
        };
        if matches!(change, Change::UnknownName) {
            debug!("remove for unknown announcement {}, ignoring", name);
        }
        self.notify(change).await;
    }

    async fn notify(&self, change: Change) {
        match change {
            Change::Added(record) => self.listener.on_add(&record).await,
            Change::Updated(record) => self.listener.on_update(&record).await,
            Change::Removed(record) => self.listener.on_remove(&record).await,
            Change::UnknownName => {}
        }
    }
}
