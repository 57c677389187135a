use drivelist_core::{
    DeviceProperties, HostInfo, RawDevice, RawMountpoint, Registry, RegistryError,
    RegistrySession,
};
use tracing::debug;

#[cfg_attr(not(windows), allow(dead_code))]
mod descriptor;

#[cfg(windows)]
mod win;
#[cfg(not(windows))]
#[path = "win_stub.rs"]
mod win;

pub use descriptor::{bus_from_code, DeviceDescriptor};

const DEVICE_PREFIX: &str = r"\\.\PhysicalDrive";

/// Physical drive numbers probed when no limit is configured.
pub const DEFAULT_MAX_DISKS: u32 = 64;

/// Device registry over `\\.\PhysicalDriveN` handles and lettered volumes.
#[derive(Debug, Clone)]
pub struct WindowsRegistry {
    max_disks: u32,
}

impl Default for WindowsRegistry {
    fn default() -> Self {
        Self {
            max_disks: DEFAULT_MAX_DISKS,
        }
    }
}

impl WindowsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_disks(max_disks: u32) -> Self {
        Self { max_disks }
    }

    pub fn host_info(&self) -> HostInfo {
        HostInfo {
            os: "windows".to_string(),
            os_version: win::os_version_string(),
            machine: win::machine_name_string(),
        }
    }
}

impl Registry for WindowsRegistry {
    type Session = WindowsSession;

    fn open(&self) -> Result<WindowsSession, RegistryError> {
        let disks = win::probe_physical_drives(self.max_disks)?;
        let volumes = win::enumerate_volumes();
        let system_root = win::system_root();
        debug!(
            disks = disks.len(),
            volumes = volumes.len(),
            system_root = ?system_root,
            "opened windows registry"
        );
        Ok(WindowsSession {
            disks,
            volumes,
            system_root,
        })
    }
}

/// A lettered volume and the disks its extents live on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Volume {
    pub root: String,
    pub label: Option<String>,
    pub disks: Vec<u32>,
}

pub struct WindowsSession {
    disks: Vec<u32>,
    volumes: Vec<Volume>,
    system_root: Option<String>,
}

impl WindowsSession {
    fn volumes_on(&self, disk: u32) -> impl Iterator<Item = &Volume> {
        self.volumes
            .iter()
            .filter(move |volume| volume.disks.contains(&disk))
    }

    fn hosts_system(&self, disk: u32) -> bool {
        match &self.system_root {
            Some(root) => self
                .volumes_on(disk)
                .any(|volume| volume.root.eq_ignore_ascii_case(root)),
            None => false,
        }
    }
}

pub(crate) fn device_path(n: u32) -> String {
    format!("{}{}", DEVICE_PREFIX, n)
}

fn disk_number(device: &RawDevice) -> Result<u32, RegistryError> {
    device
        .id
        .strip_prefix(DEVICE_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| RegistryError::device_query(&device.id, "not a physical drive path"))
}

impl RegistrySession for WindowsSession {
    fn list_raw_devices(&self) -> Result<Vec<RawDevice>, RegistryError> {
        Ok(self
            .disks
            .iter()
            .map(|&n| RawDevice::new(device_path(n), device_path(n)))
            .collect())
    }

    fn device_properties(&self, device: &RawDevice) -> Result<DeviceProperties, RegistryError> {
        let n = disk_number(device)?;
        win::query_properties(n)
            .map_err(|err| RegistryError::device_query(&device.id, format!("{:#}", err)))
    }

    fn list_raw_mountpoints(
        &self,
        device: &RawDevice,
    ) -> Result<Vec<RawMountpoint>, RegistryError> {
        let n = disk_number(device)?;
        Ok(self
            .volumes_on(n)
            .map(|volume| RawMountpoint::new(volume.root.clone(), volume.label.clone()))
            .collect())
    }

    // known from the volume map alone, so it holds even when the IOCTLs fail
    fn hosts_os(&self, device: &RawDevice) -> Option<bool> {
        disk_number(device).ok().map(|n| self.hosts_system(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> WindowsSession {
        WindowsSession {
            disks: vec![0, 2],
            volumes: vec![
                Volume {
                    root: "C:\\".to_string(),
                    label: Some("Windows".to_string()),
                    disks: vec![0],
                },
                Volume {
                    root: "D:\\".to_string(),
                    label: None,
                    disks: vec![0],
                },
                Volume {
                    root: "E:\\".to_string(),
                    label: Some("USB".to_string()),
                    disks: vec![2],
                },
            ],
            system_root: Some("c:\\".to_string()),
        }
    }

    #[test]
    fn lists_physical_drives_in_probe_order() {
        let devices = session().list_raw_devices().unwrap();
        let ids: Vec<&str> = devices.iter().map(|device| device.id.as_str()).collect();
        assert_eq!(ids, vec![r"\\.\PhysicalDrive0", r"\\.\PhysicalDrive2"]);
    }

    #[test]
    fn volumes_are_credited_to_their_disks() {
        let session = session();
        let disk0 = RawDevice::new(device_path(0), device_path(0));
        let mounts = session.list_raw_mountpoints(&disk0).unwrap();
        assert_eq!(
            mounts,
            vec![
                RawMountpoint::new("C:\\", Some("Windows".to_string())),
                RawMountpoint::new("D:\\", None),
            ]
        );

        let disk2 = RawDevice::new(device_path(2), device_path(2));
        assert_eq!(session.list_raw_mountpoints(&disk2).unwrap().len(), 1);
        assert!(session.hosts_system(0));
        assert!(!session.hosts_system(2));
    }

    #[test]
    fn foreign_device_ids_are_soft_failures() {
        let err = session()
            .list_raw_mountpoints(&RawDevice::new("/dev/sda", "/dev/sda"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DeviceQuery { .. }));
    }

    /// Hands out the fixture session; the property IOCTLs are unavailable
    /// off Windows, so every drive takes the soft-failure path.
    #[cfg(not(windows))]
    struct FixtureRegistry;

    #[cfg(not(windows))]
    impl Registry for FixtureRegistry {
        type Session = WindowsSession;

        fn open(&self) -> Result<WindowsSession, RegistryError> {
            Ok(session())
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn system_disk_survives_failed_property_query() {
        use drivelist_core::{build_drive_list, InventoryOptions};

        let list = build_drive_list(&FixtureRegistry, &InventoryOptions::default());
        assert_eq!(list.count(), 2);

        let disk0 = list.get(r"\\.\PhysicalDrive0").unwrap();
        assert!(disk0.error.is_some());
        assert!(disk0.system);
        assert_eq!(disk0.mountpoints[0].path, "C:\\");

        let disk2 = list.get(r"\\.\PhysicalDrive2").unwrap();
        assert!(disk2.error.is_some());
        assert!(!disk2.system);
    }

    #[test]
    fn os_hint_comes_from_the_volume_map() {
        let session = session();
        let disk0 = RawDevice::new(device_path(0), device_path(0));
        let disk2 = RawDevice::new(device_path(2), device_path(2));
        assert_eq!(session.hosts_os(&disk0), Some(true));
        assert_eq!(session.hosts_os(&disk2), Some(false));
        assert_eq!(session.hosts_os(&RawDevice::new("/dev/sda", "/dev/sda")), None);
    }

    #[cfg(not(windows))]
    #[test]
    fn open_is_unsupported_elsewhere() {
        let err = WindowsRegistry::new().open().err().unwrap();
        assert!(matches!(err, RegistryError::Unsupported(_)));
        assert_eq!(WindowsRegistry::new().host_info().os_version, "unknown");
    }
}
