//! Device records consolidated from mDNS announcements.

use std::collections::BTreeSet;
use uuid::Uuid;

/// Metadata resolved from a single announcement.
///
/// Built fresh for every resolved event; the registry copies these fields
/// wholesale into the device record, so the most recently resolved
/// announcement always wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    /// Stable identity parsed from the announcement's `id` property.
    pub identity: Uuid,
    pub model_name: Option<String>,
    pub friendly_name: Option<String>,
    pub host: String,
    pub port: u16,
}

/// The registry's consolidated view of one device identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Primary key; see [`DeviceMetadata::identity`].
    pub identity: Uuid,
    /// Announcement names currently mapping to this identity. A device can be
    /// reachable under several names at once, e.g. during group-leadership
    /// handover. Never empty while the record is in the registry.
    pub names: BTreeSet<String>,
    pub model_name: Option<String>,
    pub friendly_name: Option<String>,
    pub host: String,
    pub port: u16,
}

impl DeviceRecord {
    pub(crate) fn from_metadata(name: &str, metadata: DeviceMetadata) -> Self {
        let mut names = BTreeSet::new();
        names.insert(name.to_string());
        Self {
            identity: metadata.identity,
            names,
            model_name: metadata.model_name,
            friendly_name: metadata.friendly_name,
            host: metadata.host,
            port: metadata.port,
        }
    }

    /// Overwrite the metadata fields from a newer announcement, leaving the
    /// name set untouched.
    pub(crate) fn refresh(&mut self, metadata: DeviceMetadata) {
        self.model_name = metadata.model_name;
        self.friendly_name = metadata.friendly_name;
        self.host = metadata.host;
        self.port = metadata.port;
    }

    /// Device URI (`host:port`).
    pub fn uri(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(friendly: &str, host: &str) -> DeviceMetadata {
        DeviceMetadata {
            identity: Uuid::parse_str("4a1b21e9-bd1c-4d55-9c92-0a5e5f8c3b11").unwrap(),
            model_name: Some("Chromecast".to_string()),
            friendly_name: Some(friendly.to_string()),
            host: host.to_string(),
            port: 8009,
        }
    }

    #[test]
    fn from_metadata_seeds_name_set() {
        let record = DeviceRecord::from_metadata("kitchen._googlecast._tcp.local.", metadata("Kitchen", "192.168.1.20"));
        assert_eq!(record.names.len(), 1);
        assert!(record.names.contains("kitchen._googlecast._tcp.local."));
        assert_eq!(record.uri(), "192.168.1.20:8009");
    }

    #[test]
    fn refresh_overwrites_metadata_but_not_names() {
        let mut record = DeviceRecord::from_metadata("n1", metadata("Kitchen", "192.168.1.20"));
        record.names.insert("n2".to_string());

        record.refresh(metadata("Kitchen Display", "192.168.1.21"));

        assert_eq!(record.friendly_name.as_deref(), Some("Kitchen Display"));
        assert_eq!(record.host, "192.168.1.21");
        assert_eq!(record.names.len(), 2);
    }
}
