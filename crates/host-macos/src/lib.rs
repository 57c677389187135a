use anyhow::{anyhow, Context, Result};
use drivelist_core::{
    BusType, DeviceProperties, HostInfo, RawDevice, RawMountpoint, Registry, RegistryError,
    RegistrySession,
};
use serde::Deserialize;
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

/// Runs `diskutil` and returns its stdout.
pub trait Diskutil: Send + Sync {
    fn run(&self, args: &[&str]) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDiskutil;

impl Diskutil for SystemDiskutil {
    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("diskutil")
            .args(args)
            .output()
            .with_context(|| format!("run diskutil {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "diskutil {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(output.stdout)
    }
}

/// Device registry backed by DiskArbitration, as exposed through `diskutil`.
#[derive(Debug, Clone)]
pub struct MacosRegistry<D = SystemDiskutil> {
    diskutil: Arc<D>,
}

impl Default for MacosRegistry {
    fn default() -> Self {
        Self::with_diskutil(SystemDiskutil)
    }
}

impl MacosRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_info(&self) -> HostInfo {
        HostInfo {
            os: "macos".to_string(),
            os_version: read_os_version(),
            machine: read_machine(),
        }
    }
}

impl<D: Diskutil> MacosRegistry<D> {
    pub fn with_diskutil(diskutil: D) -> Self {
        Self {
            diskutil: Arc::new(diskutil),
        }
    }
}

impl<D: Diskutil> Registry for MacosRegistry<D> {
    type Session = MacosSession<D>;

    fn open(&self) -> Result<MacosSession<D>, RegistryError> {
        let output = self
            .diskutil
            .run(&["list", "-plist"])
            .map_err(open_error)?;
        let listing: DiskutilList = plist::from_bytes(&output)
            .map_err(|err| RegistryError::Parse(format!("diskutil list: {}", err)))?;
        debug!(disks = listing.all_disks_and_partitions.len(), "opened diskutil registry");

        Ok(MacosSession {
            diskutil: Arc::clone(&self.diskutil),
            disks: listing.all_disks_and_partitions,
        })
    }
}

fn open_error(err: anyhow::Error) -> RegistryError {
    match err.downcast_ref::<std::io::Error>() {
        Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            RegistryError::PermissionDenied(format!("{:#}", err))
        }
        _ => RegistryError::Unavailable(format!("{:#}", err)),
    }
}

pub struct MacosSession<D> {
    diskutil: Arc<D>,
    disks: Vec<DiskEntry>,
}

impl<D> MacosSession<D> {
    fn entry(&self, device: &RawDevice) -> Result<&DiskEntry, RegistryError> {
        let id = disk_identifier(&device.id);
        self.disks
            .iter()
            .find(|entry| entry.device_identifier == id)
            .ok_or_else(|| RegistryError::device_query(&device.id, "not in diskutil listing"))
    }

    /// APFS containers whose physical store lives on `disk`.
    fn containers_on<'a>(&'a self, disk: &'a str) -> impl Iterator<Item = &'a DiskEntry> {
        self.disks.iter().filter(move |entry| {
            entry
                .apfs_physical_stores
                .iter()
                .any(|store| split_disk_id(&store.device_identifier) == disk)
        })
    }
}

impl<D: Diskutil> RegistrySession for MacosSession<D> {
    fn list_raw_devices(&self) -> Result<Vec<RawDevice>, RegistryError> {
        Ok(self
            .disks
            .iter()
            .map(|entry| {
                RawDevice::new(
                    format!("/dev/{}", entry.device_identifier),
                    format!("/dev/r{}", entry.device_identifier),
                )
            })
            .collect())
    }

    fn device_properties(&self, device: &RawDevice) -> Result<DeviceProperties, RegistryError> {
        let entry = self.entry(device)?;
        let output = self
            .diskutil
            .run(&["info", "-plist", &entry.device_identifier])
            .map_err(|err| RegistryError::device_query(&device.id, format!("{:#}", err)))?;
        let info: DiskInfo = plist::from_bytes(&output)
            .map_err(|err| RegistryError::device_query(&device.id, err))?;
        Ok(info.into_properties(entry.is_apfs_container()))
    }

    fn list_raw_mountpoints(
        &self,
        device: &RawDevice,
    ) -> Result<Vec<RawMountpoint>, RegistryError> {
        let entry = self.entry(device)?;
        let mut mounts = entry.mountpoints();
        // APFS volumes live on a synthesized disk; credit them to the
        // physical disk that stores the container as well.
        for container in self.containers_on(&entry.device_identifier) {
            mounts.extend(container.mountpoints());
        }
        Ok(mounts)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiskutilList {
    #[serde(default)]
    all_disks_and_partitions: Vec<DiskEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiskEntry {
    device_identifier: String,
    mount_point: Option<String>,
    volume_name: Option<String>,
    #[serde(default)]
    partitions: Vec<VolumeEntry>,
    #[serde(default, rename = "APFSVolumes")]
    apfs_volumes: Vec<VolumeEntry>,
    #[serde(default, rename = "APFSPhysicalStores")]
    apfs_physical_stores: Vec<PhysicalStore>,
}

impl DiskEntry {
    fn is_apfs_container(&self) -> bool {
        !self.apfs_physical_stores.is_empty()
    }

    fn mountpoints(&self) -> Vec<RawMountpoint> {
        let mut mounts = Vec::new();
        if let Some(path) = &self.mount_point {
            mounts.push(RawMountpoint::new(path.clone(), self.volume_name.clone()));
        }
        for volume in self.partitions.iter().chain(self.apfs_volumes.iter()) {
            mounts.extend(volume.mountpoints());
        }
        mounts
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeEntry {
    mount_point: Option<String>,
    volume_name: Option<String>,
    #[serde(default)]
    mounted_snapshots: Vec<MountedSnapshot>,
}

impl VolumeEntry {
    fn mountpoints(&self) -> Vec<RawMountpoint> {
        let mut mounts = Vec::new();
        if let Some(path) = &self.mount_point {
            mounts.push(RawMountpoint::new(path.clone(), self.volume_name.clone()));
        }
        // sealed system volumes are mounted through a snapshot
        for snapshot in &self.mounted_snapshots {
            if let Some(path) = &snapshot.snapshot_mount_point {
                mounts.push(RawMountpoint::new(path.clone(), self.volume_name.clone()));
            }
        }
        mounts
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MountedSnapshot {
    snapshot_mount_point: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PhysicalStore {
    device_identifier: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiskInfo {
    media_name: Option<String>,
    #[serde(rename = "IORegistryEntryName")]
    io_registry_entry_name: Option<String>,
    total_size: Option<u64>,
    size: Option<u64>,
    device_block_size: Option<u32>,
    internal: Option<bool>,
    removable: Option<bool>,
    removable_media: Option<bool>,
    ejectable: Option<bool>,
    writable_media: Option<bool>,
    bus_protocol: Option<String>,
    virtual_or_physical: Option<String>,
    content: Option<String>,
    volume_name: Option<String>,
}

impl DiskInfo {
    fn into_properties(self, apfs_container: bool) -> DeviceProperties {
        let bus = self.bus_protocol.as_deref().map(BusType::from_protocol);
        let virtual_provider = if apfs_container {
            Some("apfs".to_string())
        } else if bus == Some(BusType::DiskImage) {
            Some("disk image".to_string())
        } else if self.virtual_or_physical.as_deref() == Some("Virtual") {
            Some("virtual".to_string())
        } else {
            None
        };

        DeviceProperties {
            vendor: None,
            model: self.media_name.or(self.io_registry_entry_name),
            volume_name: self.volume_name,
            size: self.total_size.or(self.size),
            block_size: self.device_block_size,
            read_only: self.writable_media.map(|writable| !writable),
            locked: None,
            removable_media: self.removable_media.or(self.removable),
            ejectable: self.ejectable,
            internal: self.internal,
            bus,
            virtual_provider,
            hosts_os: None,
            partition_table_type: self.content.as_deref().and_then(partition_scheme),
        }
    }
}

fn partition_scheme(content: &str) -> Option<String> {
    let scheme = match content {
        "GUID_partition_scheme" => "gpt",
        "FDisk_partition_scheme" => "mbr",
        "Apple_partition_scheme" => "apm",
        _ => return None,
    };
    Some(scheme.to_string())
}

fn disk_identifier(device: &str) -> &str {
    device.strip_prefix("/dev/").unwrap_or(device)
}

/// `disk0s2` -> `disk0`.
fn split_disk_id(device_name: &str) -> &str {
    if let Some(rest) = device_name.strip_prefix("disk") {
        if let Some(idx) = rest.find('s') {
            return &device_name[..idx + 4];
        }
    }
    device_name
}

#[cfg(target_os = "macos")]
fn read_os_version() -> String {
    sysctl_string("kern.osproductversion")
        .or_else(|| sysctl_string("kern.osrelease"))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(target_os = "macos")]
fn read_machine() -> String {
    sysctl_string("hw.model")
        .or_else(|| sysctl_string("kern.hostname"))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(not(target_os = "macos"))]
fn read_os_version() -> String {
    "unknown".to_string()
}

#[cfg(not(target_os = "macos"))]
fn read_machine() -> String {
    "unknown".to_string()
}

#[cfg(target_os = "macos")]
fn sysctl_string(name: &str) -> Option<String> {
    use libc::sysctlbyname;
    use std::ffi::CString;
    use std::ptr;

    let c_name = CString::new(name).ok()?;
    let mut size = 0usize;
    let res = unsafe {
        sysctlbyname(c_name.as_ptr(), ptr::null_mut(), &mut size, ptr::null_mut(), 0)
    };
    if res != 0 || size == 0 {
        return None;
    }

    let mut buffer = vec![0u8; size];
    let res = unsafe {
        sysctlbyname(
            c_name.as_ptr(),
            buffer.as_mut_ptr() as *mut _,
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if res != 0 {
        return None;
    }
    buffer.truncate(size);
    if let Some(0) = buffer.last().copied() {
        buffer.pop();
    }
    String::from_utf8(buffer).ok()
}
