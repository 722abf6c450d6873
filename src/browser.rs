//! Browser lifecycle: wiring announcement events into a registry.

use crate::error::Result;
use crate::registry::CastRegistry;
use crate::resolver::resolve_announcement;
use crate::traits::{AnnouncementEvent, MdnsClient};
use crate::CAST_SERVICE_TYPE;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle for one active announcement watch.
///
/// Owns the shared mDNS client instance and the drive task feeding the
/// registry. Call [`BrowserHandle::stop`] to release the client; dropping the
/// handle leaves the watch running.
pub struct BrowserHandle {
    client: Arc<dyn MdnsClient>,
    drive: JoinHandle<()>,
}

/// Start watching for cast announcements, dispatching add/update/remove
/// events through the resolver into `registry`.
pub fn start_watching(
    client: Arc<dyn MdnsClient>,
    registry: Arc<CastRegistry>,
) -> Result<BrowserHandle> {
    let mut events = client.watch(CAST_SERVICE_TYPE)?;
    let drive_client = Arc::clone(&client);
    let drive = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                AnnouncementEvent::Added(name) | AnnouncementEvent::Updated(name) => {
                    let resolved =
                        resolve_announcement(drive_client.as_ref(), CAST_SERVICE_TYPE, &name).await;
                    if let Some(metadata) = resolved {
                        registry.add_or_update(&name, metadata).await;
                    }
                }
                AnnouncementEvent::Removed(name) => registry.remove(&name).await,
            }
        }
        debug!("announcement channel closed, drive task exiting");
    });
    Ok(BrowserHandle { client, drive })
}

impl BrowserHandle {
    /// The shared client instance this watch runs on.
    pub fn client(&self) -> &Arc<dyn MdnsClient> {
        &self.client
    }

    /// Whether the drive task has wound down.
    pub fn is_finished(&self) -> bool {
        self.drive.is_finished()
    }

    /// Stop watching and release the client.
    ///
    /// A cancellation failure (e.g. a reentrant stop from inside an
    /// announcement callback) is suppressed; the client instance is closed
    /// either way. The drive task is detached rather than aborted, so an
    /// in-flight resolution finishes on its own once the watcher's channel
    /// closes.
    pub fn stop(self) {
        if let Err(e) = self.client.cancel(CAST_SERVICE_TYPE) {
            warn!("failed to cancel announcement watch: {}", e);
        }
        self.client.close();
    }
}
