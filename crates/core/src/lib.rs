use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

mod classify;
#[cfg(test)]
mod fake;
mod inventory;
mod lifecycle;
mod mounts;
mod registry;

pub use classify::{classify, Classification};
pub use inventory::{build_drive_list, Concurrency, InventoryOptions};
pub use lifecycle::free_drive_list;
pub use mounts::resolve_mountpoints;
pub use registry::{
    BusType, DeviceProperties, RawDevice, RawMountpoint, Registry, RegistryError, RegistrySession,
};

pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.0.0";

/// A filesystem mount point currently associated with a drive.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Mountpoint {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Mountpoint {
    pub fn new(path: impl Into<String>, label: Option<String>) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }
}

/// One physical or logical storage device as seen at enumeration time.
///
/// String fields use the empty string as the "unknown" sentinel and `size`
/// uses `0`. The field names serialize to the drivelist JSON shape.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Drive {
    pub device: String,
    pub display_name: String,
    pub description: String,
    pub size: u64,
    pub mountpoints: Vec<Mountpoint>,
    pub raw: String,
    pub protected: bool,
    pub system: bool,
    pub removable: bool,
    pub is_virtual: bool,
    pub internal: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_type: Option<BusType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_table_type: Option<String>,
    /// Soft per-device failures; the drive is still listed with sentinel fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Drive {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// A registry record that was not turned into a `Drive`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RejectedDevice {
    pub device: String,
    pub reason: String,
}

/// The complete result of one enumeration.
///
/// Built only by [`build_drive_list`] and read-only afterwards. `error` is set
/// only when the registry could not be listed at all, in which case `drives`
/// is empty. Deserializing checks the same rules.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(try_from = "DriveListRecord")]
pub struct DriveList {
    drives: Vec<Drive>,
    error: Option<String>,
    rejected: Vec<RejectedDevice>,
}

/// Wire shape of a `DriveList` before its invariants are checked.
#[derive(Deserialize)]
struct DriveListRecord {
    #[serde(default)]
    drives: Vec<Drive>,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    rejected: Vec<RejectedDevice>,
}

impl TryFrom<DriveListRecord> for DriveList {
    type Error = String;

    fn try_from(record: DriveListRecord) -> Result<Self, String> {
        if let Some(count) = record.count {
            if count != record.drives.len() {
                return Err(format!(
                    "count is {} but {} drives are listed",
                    count,
                    record.drives.len()
                ));
            }
        }
        if let Some(error) = &record.error {
            if error.is_empty() {
                return Err("error must not be empty".to_string());
            }
            if !record.drives.is_empty() {
                return Err("a failed list cannot carry drives".to_string());
            }
        }
        let mut seen = HashSet::new();
        for drive in &record.drives {
            if drive.device.trim().is_empty() {
                return Err("drive without a device identifier".to_string());
            }
            if !seen.insert(drive.device.as_str()) {
                return Err(format!("duplicate device {}", drive.device));
            }
        }
        Ok(Self {
            drives: record.drives,
            error: record.error,
            rejected: record.rejected,
        })
    }
}

impl DriveList {
    pub(crate) fn from_parts(drives: Vec<Drive>, rejected: Vec<RejectedDevice>) -> Self {
        Self {
            drives,
            error: None,
            rejected,
        }
    }

    pub(crate) fn failed(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "device registry unavailable".to_string();
        }
        Self {
            drives: Vec::new(),
            error: Some(error),
            rejected: Vec::new(),
        }
    }

    pub fn drives(&self) -> &[Drive] {
        &self.drives
    }

    pub fn count(&self) -> usize {
        self.drives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn rejected(&self) -> &[RejectedDevice] {
        &self.rejected
    }

    pub fn get(&self, device: &str) -> Option<&Drive> {
        self.drives.iter().find(|drive| drive.device == device)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Drive> {
        self.drives.iter()
    }

    pub fn into_drives(self) -> Vec<Drive> {
        self.drives
    }
}

impl<'a> IntoIterator for &'a DriveList {
    type Item = &'a Drive;
    type IntoIter = std::slice::Iter<'a, Drive>;

    fn into_iter(self) -> Self::IntoIter {
        self.drives.iter()
    }
}

impl Serialize for DriveList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DriveList", 4)?;
        state.serialize_field("drives", &self.drives)?;
        state.serialize_field("count", &self.count())?;
        match &self.error {
            Some(error) => state.serialize_field("error", error)?,
            None => state.skip_field("error")?,
        }
        if self.rejected.is_empty() {
            state.skip_field("rejected")?;
        } else {
            state.serialize_field("rejected", &self.rejected)?;
        }
        state.end()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub os: String, // "windows", "linux", "macos"
    pub os_version: String,
    pub machine: String,
}

/// A drive list stamped with the host it was taken on.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Snapshot {
    pub snapshot_id: Uuid,
    pub schema_version: String,
    pub host: HostInfo,
    pub generated_at_utc: String,
    pub drive_list: DriveList,
}

impl Snapshot {
    pub fn new(host: HostInfo, drive_list: DriveList) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            host,
            generated_at_utc: now_utc_rfc3339(),
            drive_list,
        }
    }
}

pub fn now_utc_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
