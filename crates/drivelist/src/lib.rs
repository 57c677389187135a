//! Lists the storage drives attached to this machine.
//!
//! ```no_run
//! let list = drivelist::get_drive_list();
//! for drive in &list {
//!     println!("{} {} {:?}", drive.device, drive.size, drive.mountpoints);
//! }
//! drivelist::free_drive_list(list);
//! ```

use drivelist_core::{build_drive_list, RawDevice, RawMountpoint, Registry, RegistrySession};
use tracing::debug;

pub use drivelist_core::{
    free_drive_list, BusType, Concurrency, DeviceProperties, Drive, DriveList, HostInfo,
    InventoryOptions, Mountpoint, RegistryError, RejectedDevice, Snapshot,
    SNAPSHOT_SCHEMA_VERSION,
};

#[cfg(target_os = "linux")]
pub type NativeRegistry = drivelist_host_linux::LinuxRegistry;
#[cfg(target_os = "macos")]
pub type NativeRegistry = drivelist_host_macos::MacosRegistry;
#[cfg(windows)]
pub type NativeRegistry = drivelist_host_windows::WindowsRegistry;
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub type NativeRegistry = UnsupportedRegistry;

/// Enumerates the drives of this host with default options.
///
/// Never fails: a registry that cannot be opened yields an empty list
/// whose `error()` says why.
pub fn get_drive_list() -> DriveList {
    get_drive_list_with(&InventoryOptions::default())
}

pub fn get_drive_list_with(options: &InventoryOptions) -> DriveList {
    let registry = NativeRegistry::default();
    let list = build_drive_list(&registry, options);
    debug!(drives = list.count(), failed = list.is_failure(), "drive list ready");
    list
}

pub fn host_info() -> HostInfo {
    NativeRegistry::default().host_info()
}

/// A drive list stamped with host details, a fresh id and the UTC time.
pub fn snapshot() -> Snapshot {
    snapshot_with(&InventoryOptions::default())
}

pub fn snapshot_with(options: &InventoryOptions) -> Snapshot {
    Snapshot::new(host_info(), get_drive_list_with(options))
}

/// Stands in for the device registry on hosts without an adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedRegistry;

impl UnsupportedRegistry {
    pub fn host_info(&self) -> HostInfo {
        HostInfo {
            os: std::env::consts::OS.to_string(),
            os_version: "unknown".to_string(),
            machine: "unknown".to_string(),
        }
    }
}

/// A session that can never be opened.
pub enum NoSession {}

impl Registry for UnsupportedRegistry {
    type Session = NoSession;

    fn open(&self) -> Result<NoSession, RegistryError> {
        Err(RegistryError::Unsupported(std::env::consts::OS))
    }
}

impl RegistrySession for NoSession {
    fn list_raw_devices(&self) -> Result<Vec<RawDevice>, RegistryError> {
        match *self {}
    }

    fn device_properties(&self, _device: &RawDevice) -> Result<DeviceProperties, RegistryError> {
        match *self {}
    }

    fn list_raw_mountpoints(
        &self,
        _device: &RawDevice,
    ) -> Result<Vec<RawMountpoint>, RegistryError> {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_host_yields_failed_list() {
        let list = build_drive_list(&UnsupportedRegistry, &InventoryOptions::default());
        assert!(list.is_empty());
        assert!(list.error().unwrap().contains("not supported"));
        free_drive_list(list);
    }

    #[test]
    fn native_enumeration_is_self_consistent() {
        let list = get_drive_list();
        assert_eq!(list.count(), list.drives().len());
        if list.is_failure() {
            assert!(list.is_empty());
        }
        for drive in &list {
            assert!(!drive.device.is_empty());
            assert!(drive.mountpoints.iter().all(|mount| !mount.path.is_empty()));
        }
        list.release();
    }

    #[test]
    fn snapshot_is_stamped() {
        let snapshot = snapshot_with(&InventoryOptions::parallel(Some(2)));
        assert_eq!(snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION);
        assert!(!snapshot.host.os.is_empty());
        assert!(snapshot.generated_at_utc.ends_with('Z'));
        assert_eq!(snapshot.drive_list.count(), snapshot.drive_list.drives().len());
    }
}
