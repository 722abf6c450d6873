//! Resolves raw announcements into device metadata.

use crate::device::DeviceMetadata;
use crate::traits::{MdnsClient, RawAnnouncement, TxtValue};
use std::borrow::Cow;
use tracing::{debug, warn};
use uuid::Uuid;

/// TXT property carrying the stable device identity.
const PROP_IDENTITY: &str = "id";
/// TXT property carrying the model name.
const PROP_MODEL: &str = "md";
/// TXT property carrying the user-facing friendly name.
const PROP_FRIENDLY: &str = "fn";

/// Total query attempts before an announcement event is dropped.
const RESOLVE_ATTEMPTS: u32 = 4;

/// Resolve one announcement name to device metadata.
///
/// Transient query failures are retried, up to [`RESOLVE_ATTEMPTS`] total
/// attempts; exhaustion drops the event and no record is produced.
/// Announcements without a usable identity are dropped as well; a device
/// cannot be tracked without one.
pub async fn resolve_announcement(
    client: &dyn MdnsClient,
    service_type: &str,
    name: &str,
) -> Option<DeviceMetadata> {
    let mut last_err = None;
    for _ in 0..RESOLVE_ATTEMPTS {
        match client.query(service_type, name).await {
            Ok(raw) => return metadata_from_raw(&raw),
            Err(e) => last_err = Some(e),
        }
    }
    if let Some(e) = last_err {
        debug!("failed to resolve {}: {}", name, e);
    }
    None
}

fn metadata_from_raw(raw: &RawAnnouncement) -> Option<DeviceMetadata> {
    let identity_str = match txt_text(raw, PROP_IDENTITY).filter(|s| !s.is_empty()) {
        Some(s) => s,
        None => {
            debug!("announcement {} carries no identity, dropping", raw.name);
            return None;
        }
    };

    let identity = match Uuid::parse_str(identity_str.as_ref()) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(
                "announcement {} carries malformed identity {:?}: {}, dropping",
                raw.name, identity_str, e
            );
            return None;
        }
    };

    // Prefer a resolved address; fall back to the advertised hostname.
    let host = match raw.addresses.first() {
        Some(address) => address.to_string(),
        None => raw.hostname.to_lowercase(),
    };

    Some(DeviceMetadata {
        identity,
        model_name: txt_text(raw, PROP_MODEL).map(Cow::into_owned),
        friendly_name: txt_text(raw, PROP_FRIENDLY).map(Cow::into_owned),
        host,
        port: raw.port,
    })
}

fn txt_text<'a>(raw: &'a RawAnnouncement, key: &str) -> Option<Cow<'a, str>> {
    raw.txt.get(key).and_then(TxtValue::to_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use crate::traits::{AnnouncementReceiver, MdnsClient};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const IDENTITY: &str = "4a1b21e9-bd1c-4d55-9c92-0a5e5f8c3b11";

    fn raw(txt: HashMap<String, TxtValue>) -> RawAnnouncement {
        RawAnnouncement {
            name: "kitchen._googlecast._tcp.local.".to_string(),
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))],
            hostname: "Kitchen-Display.local.".to_string(),
            port: 8009,
            txt,
        }
    }

    fn full_txt() -> HashMap<String, TxtValue> {
        HashMap::from([
            ("id".to_string(), TxtValue::Text(IDENTITY.to_string())),
            ("md".to_string(), TxtValue::Text("Chromecast".to_string())),
            ("fn".to_string(), TxtValue::Binary(b"Kitchen Display".to_vec())),
        ])
    }

    /// Fails the first `failures` queries, then answers with `raw`.
    struct FlakyClient {
        failures: usize,
        attempts: AtomicUsize,
        raw: Option<RawAnnouncement>,
    }

    impl FlakyClient {
        fn failing_forever() -> Self {
            Self {
                failures: usize::MAX,
                attempts: AtomicUsize::new(0),
                raw: None,
            }
        }

        fn failing(failures: usize, raw: RawAnnouncement) -> Self {
            Self {
                failures,
                attempts: AtomicUsize::new(0),
                raw: Some(raw),
            }
        }
    }

    #[async_trait]
    impl MdnsClient for FlakyClient {
        fn watch(&self, _service_type: &str) -> Result<AnnouncementReceiver, DiscoveryError> {
            Err(DiscoveryError::Daemon("not watchable".to_string()))
        }

        async fn query(
            &self,
            _service_type: &str,
            _name: &str,
        ) -> Result<RawAnnouncement, DiscoveryError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(DiscoveryError::QueryTimeout);
            }
            match &self.raw {
                Some(raw) => Ok(raw.clone()),
                None => Err(DiscoveryError::QueryTimeout),
            }
        }

        fn cancel(&self, _service_type: &str) -> Result<(), DiscoveryError> {
            Ok(())
        }

        fn close(&self) {}
    }

    mod retry {
        use super::*;

        #[tokio::test]
        async fn persistent_failure_attempts_exactly_four_times() {
            let client = FlakyClient::failing_forever();
            let result = resolve_announcement(&client, "_googlecast._tcp.local.", "n1").await;
            assert!(result.is_none());
            assert_eq!(client.attempts.load(Ordering::SeqCst), 4);
        }

        #[tokio::test]
        async fn transient_failure_recovers_within_budget() {
            let client = FlakyClient::failing(2, raw(full_txt()));
            let metadata = resolve_announcement(&client, "_googlecast._tcp.local.", "n1")
                .await
                .unwrap();
            assert_eq!(client.attempts.load(Ordering::SeqCst), 3);
            assert_eq!(metadata.identity, Uuid::parse_str(IDENTITY).unwrap());
        }
    }

    mod metadata {
        use super::*;

        #[test]
        fn full_announcement_resolves() {
            let metadata = metadata_from_raw(&raw(full_txt())).unwrap();
            assert_eq!(metadata.model_name.as_deref(), Some("Chromecast"));
            assert_eq!(metadata.friendly_name.as_deref(), Some("Kitchen Display"));
            assert_eq!(metadata.host, "192.168.1.20");
            assert_eq!(metadata.port, 8009);
        }

        #[test]
        fn missing_identity_drops() {
            let mut txt = full_txt();
            txt.remove("id");
            assert!(metadata_from_raw(&raw(txt)).is_none());
        }

        #[test]
        fn empty_identity_drops() {
            let mut txt = full_txt();
            txt.insert("id".to_string(), TxtValue::Text(String::new()));
            assert!(metadata_from_raw(&raw(txt)).is_none());
        }

        #[test]
        fn malformed_identity_drops() {
            let mut txt = full_txt();
            txt.insert("id".to_string(), TxtValue::Text("not-a-uuid".to_string()));
            assert!(metadata_from_raw(&raw(txt)).is_none());
        }

        #[test]
        fn undecodable_identity_bytes_drop() {
            let mut txt = full_txt();
            txt.insert("id".to_string(), TxtValue::Binary(vec![0xFF, 0xFE]));
            assert!(metadata_from_raw(&raw(txt)).is_none());
        }

        #[test]
        fn hostname_fallback_when_no_addresses() {
            let mut announcement = raw(full_txt());
            announcement.addresses.clear();
            let metadata = metadata_from_raw(&announcement).unwrap();
            assert_eq!(metadata.host, "kitchen-display.local.");
        }

        #[test]
        fn optional_fields_may_be_absent() {
            let txt = HashMap::from([("id".to_string(), TxtValue::Text(IDENTITY.to_string()))]);
            let metadata = metadata_from_raw(&raw(txt)).unwrap();
            assert!(metadata.model_name.is_none());
            assert!(metadata.friendly_name.is_none());
        }
    }
}
