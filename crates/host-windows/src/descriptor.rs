//! Decoders for the raw buffers returned by the storage IOCTLs.
//!
//! Kept free of Win32 types so the layouts can be checked on any host.

use drivelist_core::BusType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub removable: bool,
    pub bus: BusType,
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_i64(buf: &[u8], offset: usize) -> Option<i64> {
    let bytes = buf.get(offset..offset + 8)?;
    Some(i64::from_le_bytes(bytes.try_into().ok()?))
}

fn read_cstr(buf: &[u8], offset: usize) -> Option<String> {
    if offset == 0 {
        return None;
    }
    let tail = buf.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    let value = String::from_utf8_lossy(&tail[..end]).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// `STORAGE_DEVICE_DESCRIPTOR` from `IOCTL_STORAGE_QUERY_PROPERTY`.
pub fn parse_device_descriptor(buf: &[u8]) -> Option<DeviceDescriptor> {
    let removable = *buf.get(10)? != 0;
    let vendor_offset = read_u32(buf, 12)? as usize;
    let product_offset = read_u32(buf, 16)? as usize;
    let bus_code = read_u32(buf, 28)?;

    Some(DeviceDescriptor {
        vendor: read_cstr(buf, vendor_offset),
        product: read_cstr(buf, product_offset),
        removable,
        bus: bus_from_code(bus_code),
    })
}

/// `DISK_GEOMETRY_EX`: returns `(bytes_per_sector, disk_size)`.
pub fn parse_geometry(buf: &[u8]) -> Option<(u32, u64)> {
    let bytes_per_sector = read_u32(buf, 20)?;
    let disk_size = read_i64(buf, 24)?;
    Some((bytes_per_sector, disk_size.max(0) as u64))
}

/// `DRIVE_LAYOUT_INFORMATION_EX.PartitionStyle`.
pub fn parse_partition_style(buf: &[u8]) -> Option<String> {
    let style = match read_u32(buf, 0)? {
        0 => "mbr",
        1 => "gpt",
        _ => return None,
    };
    Some(style.to_string())
}

/// Disk numbers spanned by a `VOLUME_DISK_EXTENTS` buffer.
pub fn parse_disk_extents(buf: &[u8]) -> Vec<u32> {
    const EXTENT_SIZE: usize = 24;
    const FIRST_EXTENT: usize = 8;

    let count = read_u32(buf, 0).unwrap_or(0) as usize;
    let mut disks = Vec::new();
    for index in 0..count {
        match read_u32(buf, FIRST_EXTENT + index * EXTENT_SIZE) {
            Some(disk) if !disks.contains(&disk) => disks.push(disk),
            Some(_) => {}
            None => break,
        }
    }
    disks
}

/// Maps `STORAGE_BUS_TYPE` onto the portable bus classification.
pub fn bus_from_code(code: u32) -> BusType {
    match code {
        0x01 | 0x09 => BusType::Scsi,
        0x02 | 0x03 => BusType::Ata,
        0x04 => BusType::Firewire,
        0x07 => BusType::Usb,
        0x0A => BusType::Sas,
        0x0B => BusType::Sata,
        0x0C => BusType::Sd,
        0x0D => BusType::Mmc,
        0x0E | 0x0F => BusType::Virtual,
        0x11 => BusType::Nvme,
        _ => BusType::Unknown,
    }
}
