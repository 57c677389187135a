use anyhow::{Context, Result};
use drivelist_core::{
    BusType, DeviceProperties, HostInfo, RawDevice, RawMountpoint, Registry, RegistryError,
    RegistrySession,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

// Kernel block devices that are never storage the caller can pick.
const IGNORED_PREFIXES: &[&str] = &["ram", "sr", "fd", "dm-", "md"];
const SECTOR_BYTES: u64 = 512;

/// Device registry backed by sysfs, the mount table and udev's label links.
#[derive(Debug, Clone)]
pub struct LinuxRegistry {
    sys_block: PathBuf,
    mountinfo: PathBuf,
    mounts: PathBuf,
    by_label: PathBuf,
    udev_data: PathBuf,
    etc: PathBuf,
    dmi: PathBuf,
}

impl Default for LinuxRegistry {
    fn default() -> Self {
        Self::with_root("/")
    }
}

impl LinuxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every registry path relative to `root` instead of `/`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            sys_block: root.join("sys/block"),
            mountinfo: root.join("proc/self/mountinfo"),
            mounts: root.join("proc/self/mounts"),
            by_label: root.join("dev/disk/by-label"),
            udev_data: root.join("run/udev/data"),
            etc: root.join("etc"),
            dmi: root.join("sys/devices/virtual/dmi/id"),
        }
    }

    pub fn host_info(&self) -> HostInfo {
        HostInfo {
            os: "linux".to_string(),
            os_version: read_os_release(&self.etc.join("os-release")),
            machine: read_machine(&self.dmi),
        }
    }
}

impl Registry for LinuxRegistry {
    type Session = LinuxSession;

    fn open(&self) -> Result<LinuxSession, RegistryError> {
        let entries = fs::read_dir(&self.sys_block)
            .map_err(|err| RegistryError::from_open(self.sys_block.display(), err))?;

        let mut disks = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|err| RegistryError::from_open(self.sys_block.display(), err))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if is_listed_disk(&name, &entry.path()) {
                disks.push(name);
            }
        }
        // read_dir order is arbitrary; keep enumeration deterministic
        disks.sort();

        let mounts =
            read_mount_table(&self.mountinfo, &self.mounts).map_err(|err| format!("{:#}", err));
        let labels = read_labels(&self.by_label);
        debug!(disks = disks.len(), labels = labels.len(), "opened sysfs registry");

        Ok(LinuxSession {
            sys_block: self.sys_block.clone(),
            udev_data: self.udev_data.clone(),
            disks,
            mounts,
            labels,
        })
    }
}

/// A point-in-time view of sysfs and the mount table.
#[derive(Debug)]
pub struct LinuxSession {
    sys_block: PathBuf,
    udev_data: PathBuf,
    disks: Vec<String>,
    mounts: Result<MountTable, String>,
    labels: HashMap<String, String>,
}

impl LinuxSession {
    fn disk_path(&self, device: &RawDevice) -> Result<(String, PathBuf), RegistryError> {
        let name = device
            .id
            .strip_prefix("/dev/")
            .unwrap_or(&device.id)
            .to_string();
        let path = self.sys_block.join(&name);
        if !path.exists() {
            return Err(RegistryError::device_query(&device.id, "device vanished from sysfs"));
        }
        Ok((name, path))
    }
}

impl RegistrySession for LinuxSession {
    fn list_raw_devices(&self) -> Result<Vec<RawDevice>, RegistryError> {
        Ok(self
            .disks
            .iter()
            .map(|name| {
                RawDevice::new(
                    format!("/dev/{}", name),
                    self.sys_block.join(name).display().to_string(),
                )
            })
            .collect())
    }

    fn device_properties(&self, device: &RawDevice) -> Result<DeviceProperties, RegistryError> {
        let (name, path) = self.disk_path(device)?;
        let size = read_u64(path.join("size"))
            .map(|sectors| sectors.saturating_mul(SECTOR_BYTES))
            .ok_or_else(|| RegistryError::device_query(&device.id, "size attribute unreadable"))?;
        let udev = read_udev_properties(&self.udev_data, &path);

        let virtual_provider = virtual_provider(&name, &path);
        let bus = if virtual_provider.as_deref().is_some_and(|provider| provider.starts_with('/')) {
            Some(BusType::DiskImage)
        } else {
            Some(detect_bus(&name, &path, udev.get("ID_BUS").map(String::as_str)))
        };

        Ok(DeviceProperties {
            vendor: read_string(path.join("device/vendor"))
                .or_else(|| udev.get("ID_VENDOR").cloned()),
            model: read_string(path.join("device/model"))
                .or_else(|| udev.get("ID_MODEL").map(|model| model.replace('_', " "))),
            volume_name: None,
            size: Some(size),
            block_size: read_u64(path.join("queue/logical_block_size")).map(|value| value as u32),
            read_only: read_u64(path.join("ro")).map(|value| value == 1),
            locked: None,
            removable_media: read_u64(path.join("removable")).map(|value| value == 1),
            ejectable: None,
            internal: None,
            bus,
            virtual_provider,
            hosts_os: None,
            partition_table_type: udev.get("ID_PART_TABLE_TYPE").cloned(),
        })
    }

    fn list_raw_mountpoints(
        &self,
        device: &RawDevice,
    ) -> Result<Vec<RawMountpoint>, RegistryError> {
        let mounts = self
            .mounts
            .as_ref()
            .map_err(|reason| RegistryError::device_query(&device.id, reason))?;
        let (name, path) = self.disk_path(device)?;

        let mut result = Vec::new();
        for block in related_block_names(&name, &path) {
            let label = self.labels.get(&block.name).cloned();
            for info in mounts.lookup(&block) {
                result.push(RawMountpoint::new(info.mount_point.clone(), label.clone()));
            }
        }
        Ok(result)
    }
}

#[derive(Debug, Clone)]
struct MountInfo {
    mount_point: String,
}

/// Mount table entries indexed by `major:minor` and by source device name.
///
/// The device number is authoritative: sources such as `/dev/root` or
/// `/dev/disk/by-uuid/...` name no block device. The name index is only
/// consulted for blocks whose number is unknown or matches nothing.
#[derive(Debug, Default)]
struct MountTable {
    by_devno: HashMap<String, Vec<MountInfo>>,
    by_name: HashMap<String, Vec<MountInfo>>,
}

impl MountTable {
    fn push(&mut self, devno: Option<&str>, source: &str, mount_point: String) {
        let info = MountInfo { mount_point };
        if let Some(devno) = devno {
            self.by_devno
                .entry(devno.to_string())
                .or_default()
                .push(info.clone());
        }
        if !source.starts_with("/dev/") {
            return;
        }
        if let Some(name) = Path::new(source).file_name().and_then(|value| value.to_str()) {
            self.by_name.entry(name.to_string()).or_default().push(info);
        }
    }

    fn lookup(&self, block: &RelatedBlock) -> Vec<&MountInfo> {
        if let Some(found) = block.devno.as_ref().and_then(|devno| self.by_devno.get(devno)) {
            return found.iter().collect();
        }
        block
            .lookup_names()
            .filter_map(|name| self.by_name.get(name))
            .flatten()
            .collect()
    }
}

/// A block device whose mounts count toward a disk: the disk itself, one of
/// its partitions, or a device-mapper holder stacked on either.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RelatedBlock {
    name: String,
    mapper_name: Option<String>,
    devno: Option<String>,
}

impl RelatedBlock {
    fn lookup_names(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.name).chain(self.mapper_name.iter())
    }
}

fn related_block_names(disk: &str, disk_path: &Path) -> Vec<RelatedBlock> {
    let mut partitions: Vec<(u64, String)> = fs::read_dir(disk_path)
        .map(|entries| {
            entries
                .flatten()
                .filter(|entry| entry.path().join("partition").exists())
                .map(|entry| {
                    let number = read_u64(entry.path().join("partition")).unwrap_or(u64::MAX);
                    (number, entry.file_name().to_string_lossy().to_string())
                })
                .collect()
        })
        .unwrap_or_default();
    partitions.sort();

    let mut blocks = vec![RelatedBlock {
        name: disk.to_string(),
        mapper_name: None,
        devno: read_string(disk_path.join("dev")),
    }];
    blocks.extend(holders(disk_path));
    for (_, partition) in partitions {
        let partition_path = disk_path.join(&partition);
        blocks.push(RelatedBlock {
            name: partition,
            mapper_name: None,
            devno: read_string(partition_path.join("dev")),
        });
        blocks.extend(holders(&partition_path));
    }
    blocks
}

fn holders(path: &Path) -> Vec<RelatedBlock> {
    let mut names: Vec<String> = fs::read_dir(path.join("holders"))
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
        .into_iter()
        .map(|name| {
            let holder = path.join("holders").join(&name);
            RelatedBlock {
                mapper_name: read_string(holder.join("dm/name")),
                devno: read_string(holder.join("dev")),
                name,
            }
        })
        .collect()
}

fn is_listed_disk(name: &str, path: &Path) -> bool {
    if IGNORED_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return false;
    }
    // detached loop devices exist but back nothing
    if name.starts_with("loop") {
        return path.join("loop/backing_file").exists();
    }
    true
}

fn virtual_provider(name: &str, path: &Path) -> Option<String> {
    if name.starts_with("loop") {
        return read_string(path.join("loop/backing_file")).or_else(|| Some("loop".to_string()));
    }
    if name.starts_with("zram") || name.starts_with("nbd") {
        return Some(name.trim_end_matches(|ch: char| ch.is_ascii_digit()).to_string());
    }
    if let Ok(target) = fs::canonicalize(path.join("device")) {
        if target.to_string_lossy().contains("/virtual/") {
            return Some("virtual".to_string());
        }
    } else if let Ok(target) = fs::canonicalize(path) {
        if target.to_string_lossy().contains("/devices/virtual/") {
            return Some("virtual".to_string());
        }
    }
    None
}

fn detect_bus(name: &str, path: &Path, udev_bus: Option<&str>) -> BusType {
    let device_path = fs::canonicalize(path.join("device"))
        .map(|target| target.to_string_lossy().to_string())
        .unwrap_or_default();

    if device_path.contains("/usb") {
        return BusType::Usb;
    }
    if name.starts_with("mmcblk") {
        // eMMC reports type "MMC", removable cards "SD"
        return match read_string(path.join("device/type")).as_deref() {
            Some("MMC") => BusType::Mmc,
            _ => BusType::Sd,
        };
    }
    if name.starts_with("nvme") {
        return BusType::Nvme;
    }
    if name.starts_with("vd") || name.starts_with("xvd") || device_path.contains("/virtio") {
        return BusType::Virtual;
    }
    if let Some(bus) = udev_bus {
        let bus = BusType::from_protocol(bus);
        if bus != BusType::Unknown {
            return bus;
        }
    }
    if device_path.contains("/ata") {
        return BusType::Sata;
    }
    if name.starts_with("sd") {
        return BusType::Scsi;
    }
    BusType::Unknown
}

/// Prefers `mountinfo`, which carries device numbers; `mounts` only has names.
fn read_mount_table(mountinfo: &Path, mounts: &Path) -> Result<MountTable> {
    match fs::read_to_string(mountinfo) {
        Ok(data) => Ok(parse_mountinfo(&data)),
        Err(err) => {
            debug!(path = %mountinfo.display(), error = %err, "falling back to mount names");
            let data =
                fs::read_to_string(mounts).with_context(|| format!("read {}", mounts.display()))?;
            Ok(parse_mounts(&data))
        }
    }
}

/// `36 35 98:0 /mnt1 /mnt2 rw,noatime master:1 - ext3 /dev/root rw`
fn parse_mountinfo(data: &str) -> MountTable {
    let mut table = MountTable::default();
    for line in data.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // optional fields end at the lone "-"
        let Some(separator) = fields.iter().skip(6).position(|field| *field == "-") else {
            continue;
        };
        let source = fields.get(6 + separator + 2).copied().unwrap_or("");
        let (Some(&devno), Some(&mount_point)) = (fields.get(2), fields.get(4)) else {
            continue;
        };
        table.push(Some(devno), &unescape_mount(source), unescape_mount(mount_point));
    }
    table
}

fn parse_mounts(data: &str) -> MountTable {
    let mut table = MountTable::default();
    for line in data.lines() {
        let mut parts = line.split_whitespace();
        let (Some(source), Some(mount_point)) = (parts.next(), parts.next()) else {
            continue;
        };
        table.push(None, &unescape_mount(source), unescape_mount(mount_point));
    }
    table
}

fn read_labels(path: &Path) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(target) = fs::read_link(entry.path()) {
                if let Some(name) = target.file_name().and_then(|value| value.to_str()) {
                    let label = unescape_udev(&entry.file_name().to_string_lossy());
                    labels.insert(name.to_string(), label);
                }
            }
        }
    }
    labels
}

/// Reads `E:` properties from udev's database entry for the block device.
fn read_udev_properties(udev_data: &Path, disk_path: &Path) -> HashMap<String, String> {
    let Some(dev) = read_string(disk_path.join("dev")) else {
        return HashMap::new();
    };
    let data = fs::read_to_string(udev_data.join(format!("b{}", dev))).unwrap_or_default();
    data.lines()
        .filter_map(|line| line.strip_prefix("E:"))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn read_os_release(path: &Path) -> String {
    let data = fs::read_to_string(path).unwrap_or_default();
    let mut name = None;
    let mut version = None;
    for line in data.lines() {
        if line.starts_with("NAME=") && name.is_none() {
            name = Some(trim_os_value(line));
        } else if line.starts_with("VERSION=") && version.is_none() {
            version = Some(trim_os_value(line));
        }
    }
    match (name, version) {
        (Some(name), Some(version)) => format!("{} {}", name, version),
        (Some(name), None) => name,
        _ => "unknown".to_string(),
    }
}

fn trim_os_value(line: &str) -> String {
    let value = line.split_once('=').map(|(_, value)| value).unwrap_or("").trim();
    value.trim_matches('"').to_string()
}

fn read_machine(dmi: &Path) -> String {
    let vendor = read_string(dmi.join("sys_vendor"));
    let product = read_string(dmi.join("product_name"));
    match (vendor, product) {
        (Some(vendor), Some(product)) => format!("{} {}", vendor, product),
        (Some(vendor), None) => vendor,
        (None, Some(product)) => product,
        _ => read_string("/proc/sys/kernel/hostname").unwrap_or_else(|| "unknown".to_string()),
    }
}

fn read_string(path: impl AsRef<Path>) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_u64(path: impl AsRef<Path>) -> Option<u64> {
    read_string(path).and_then(|value| value.parse::<u64>().ok())
}

/// Decodes the `\NNN` octal escapes the kernel writes into the mount table.
fn unescape_mount(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'\\' {
            if let Some(digits) = bytes.get(idx + 1..idx + 4) {
                if digits.iter().all(|digit| (b'0'..=b'7').contains(digit)) {
                    let value = digits
                        .iter()
                        .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
                    if let Ok(byte) = u8::try_from(value) {
                        output.push(byte);
                        idx += 4;
                        continue;
                    }
                }
            }
        }
        output.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&output).to_string()
}

/// Decodes the `\xNN` escapes udev uses in `/dev/disk/by-label` names.
fn unescape_udev(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'\\' && bytes.get(idx + 1) == Some(&b'x') {
            let byte = bytes
                .get(idx + 2..idx + 4)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = byte {
                output.push(byte);
                idx += 4;
                continue;
            }
        }
        output.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&output).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivelist_core::{build_drive_list, DriveList, InventoryOptions};
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn add_disk(root: &Path, name: &str, sectors: u64, removable: bool) {
        write(root, &format!("sys/block/{}/size", name), &format!("{}\n", sectors));
        let removable = if removable { "1\n" } else { "0\n" };
        write(root, &format!("sys/block/{}/removable", name), removable);
        write(root, &format!("sys/block/{}/ro", name), "0\n");
        write(root, &format!("sys/block/{}/queue/logical_block_size", name), "512\n");
    }

    fn add_partition(root: &Path, disk: &str, name: &str, number: u64) {
        let partition = format!("sys/block/{}/{}/partition", disk, name);
        write(root, &partition, &format!("{}\n", number));
        write(root, &format!("sys/block/{}/{}/size", disk, name), "2048\n");
    }

    fn fake_host() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        add_disk(root, "sda", 976_773_168, false);
        write(root, "sys/block/sda/device/vendor", "ATA     \n");
        write(root, "sys/block/sda/device/model", "Samsung SSD 860\n");
        add_partition(root, "sda", "sda2", 2);
        add_partition(root, "sda", "sda1", 1);

        add_disk(root, "sdb", 31_250_000, true);
        write(root, "sys/block/sdb/device/model", "Cruzer Blade\n");
        add_partition(root, "sdb", "sdb1", 1);

        add_disk(root, "sr0", 2_097_151, true);
        add_disk(root, "ram0", 8192, false);
        add_disk(root, "loop0", 0, false);

        write(
            root,
            "proc/self/mounts",
            "sysfs /sys sysfs rw 0 0\n\
             /dev/sda2 / ext4 rw,relatime 0 0\n\
             /dev/sda1 /boot/efi vfat rw 0 0\n\
             /dev/sdb1 /media/user/My\\040Stick vfat rw 0 0\n",
        );
        dir
    }

    fn list_for(root: &Path) -> DriveList {
        build_drive_list(&LinuxRegistry::with_root(root), &InventoryOptions::default())
    }

    #[test]
    fn lists_disks_in_name_order_without_pseudo_devices() {
        let host = fake_host();
        let session = LinuxRegistry::with_root(host.path()).open().unwrap();
        let ids: Vec<String> = session
            .list_raw_devices()
            .unwrap()
            .into_iter()
            .map(|device| device.id)
            .collect();
        assert_eq!(ids, vec!["/dev/sda", "/dev/sdb"]);
    }

    #[test]
    fn builds_system_and_removable_drives() {
        let host = fake_host();
        let list = list_for(host.path());
        assert_eq!(list.count(), 2);
        assert_eq!(list.error(), None);

        let sda = list.get("/dev/sda").unwrap();
        assert!(sda.system && sda.internal && !sda.removable);
        assert_eq!(sda.size, 976_773_168 * 512);
        assert_eq!(sda.description, "ATA Samsung SSD 860");
        assert_eq!(sda.display_name, "/dev/sda");
        assert_eq!(sda.block_size, Some(512));
        let paths: Vec<&str> = sda.mountpoints.iter().map(|mount| mount.path.as_str()).collect();
        assert_eq!(paths, vec!["/boot/efi", "/"]);

        let sdb = list.get("/dev/sdb").unwrap();
        assert!(sdb.removable && !sdb.internal && !sdb.system);
        assert_eq!(sdb.mountpoints[0].path, "/media/user/My Stick");
    }

    #[test]
    fn missing_sysfs_is_total_failure() {
        let dir = TempDir::new().unwrap();
        let list = list_for(dir.path());
        assert!(list.is_empty());
        assert!(list.error().is_some());
    }

    #[test]
    fn unreadable_mount_table_degrades_each_drive() {
        let host = fake_host();
        fs::remove_file(host.path().join("proc/self/mounts")).unwrap();
        let list = list_for(host.path());
        assert_eq!(list.count(), 2);
        for drive in &list {
            assert!(drive.mountpoints.is_empty());
            assert!(drive.error.is_some());
        }
    }

    #[test]
    fn udev_database_supplies_partition_table_and_bus() {
        let host = fake_host();
        let root = host.path();
        write(root, "sys/block/sdb/dev", "8:16\n");
        write(
            root,
            "run/udev/data/b8:16",
            "S:disk/by-id/usb-SanDisk\nE:ID_BUS=usb\nE:ID_PART_TABLE_TYPE=dos\n",
        );
        let list = list_for(root);
        let sdb = list.get("/dev/sdb").unwrap();
        assert_eq!(sdb.partition_table_type.as_deref(), Some("dos"));
        assert_eq!(sdb.bus_type, Some(BusType::Usb));
    }

    #[test]
    fn attached_loop_device_is_virtual() {
        let host = fake_host();
        let root = host.path();
        add_disk(root, "loop1", 204_800, false);
        write(root, "sys/block/loop1/loop/backing_file", "/var/lib/images/disk.img\n");

        let list = list_for(root);
        let ids: Vec<&str> = list.iter().map(|drive| drive.device.as_str()).collect();
        assert_eq!(ids, vec!["/dev/loop1", "/dev/sda", "/dev/sdb"]);
        let loop1 = list.get("/dev/loop1").unwrap();
        assert!(loop1.is_virtual && !loop1.internal);
        assert_eq!(loop1.bus_type, Some(BusType::DiskImage));
    }

    #[cfg(unix)]
    #[test]
    fn labels_and_mapper_holders_are_resolved() {
        let host = fake_host();
        let root = host.path();
        write(root, "sys/block/sda/sda2/holders/dm-0/dm/name", "vg-root\n");
        write(
            root,
            "proc/self/mounts",
            "/dev/mapper/vg-root / ext4 rw 0 0\n/dev/sdb1 /media/stick vfat rw 0 0\n",
        );
        fs::create_dir_all(root.join("dev/disk/by-label")).unwrap();
        let link = root.join("dev/disk/by-label/MY\\x20STICK");
        std::os::unix::fs::symlink("../../sdb1", link).unwrap();

        let list = list_for(root);
        let sda = list.get("/dev/sda").unwrap();
        assert!(sda.system);
        assert_eq!(sda.mountpoints[0].path, "/");

        let sdb = list.get("/dev/sdb").unwrap();
        assert_eq!(sdb.mountpoints[0].label.as_deref(), Some("MY STICK"));
    }

    #[test]
    fn root_device_alias_is_matched_by_device_number() {
        let host = fake_host();
        let root = host.path();
        write(root, "sys/block/sda/dev", "8:0\n");
        write(root, "sys/block/sda/sda1/dev", "8:1\n");
        write(root, "sys/block/sda/sda2/dev", "8:2\n");
        write(
            root,
            "proc/self/mountinfo",
            "22 1 0:21 / /sys rw,nosuid shared:7 - sysfs sysfs rw\n\
             28 1 8:2 / / rw,relatime shared:1 - ext4 /dev/root rw\n\
             30 28 8:1 / /boot/efi rw - vfat /dev/disk/by-uuid/ABCD-1234 rw\n\
             31 28 8:17 / /media/user/My\\040Stick rw - vfat /dev/sdb1 rw\n",
        );

        let list = list_for(root);
        let sda = list.get("/dev/sda").unwrap();
        assert!(sda.system);
        let paths: Vec<&str> = sda.mountpoints.iter().map(|mount| mount.path.as_str()).collect();
        assert_eq!(paths, vec!["/boot/efi", "/"]);

        // sdb has no sysfs dev numbers, so it falls back to the source name
        let sdb = list.get("/dev/sdb").unwrap();
        assert_eq!(sdb.mountpoints[0].path, "/media/user/My Stick");
        assert!(!sdb.system);
    }

    #[test]
    fn mountinfo_optional_fields_are_skipped() {
        let table = parse_mountinfo(
            "28 1 8:2 / / rw shared:1 master:2 - ext4 /dev/root rw\n\
             malformed line\n\
             40 28 253:0 /srv /srv rw - xfs /dev/mapper/vg-srv rw\n",
        );
        assert_eq!(table.by_devno["8:2"][0].mount_point, "/");
        assert_eq!(table.by_devno["253:0"][0].mount_point, "/srv");
        assert_eq!(table.by_name["vg-srv"][0].mount_point, "/srv");
        assert!(table.by_name.contains_key("root"));
    }

    #[test]
    fn mount_escapes_are_decoded() {
        assert_eq!(unescape_mount("/mnt/a\\040b"), "/mnt/a b");
        assert_eq!(unescape_mount("/mnt/tab\\011x"), "/mnt/tab\tx");
        assert_eq!(unescape_mount("/mnt/plain\\"), "/mnt/plain\\");
        assert_eq!(unescape_udev("EFI\\x20System"), "EFI System");
    }

    #[test]
    fn host_info_reads_os_release() {
        let dir = TempDir::new().unwrap();
        let os_release = "NAME=\"Fedora Linux\"\nVERSION=\"40 (Workstation)\"\n";
        write(dir.path(), "etc/os-release", os_release);
        write(dir.path(), "sys/devices/virtual/dmi/id/sys_vendor", "LENOVO\n");
        write(dir.path(), "sys/devices/virtual/dmi/id/product_name", "20XW\n");
        let info = LinuxRegistry::with_root(dir.path()).host_info();
        assert_eq!(info.os, "linux");
        assert_eq!(info.os_version, "Fedora Linux 40 (Workstation)");
        assert_eq!(info.machine, "LENOVO 20XW");
    }
}
