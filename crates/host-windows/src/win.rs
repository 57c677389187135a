use anyhow::{anyhow, Context, Result};
use drivelist_core::{DeviceProperties, RegistryError};
use std::ffi::c_void;
use std::mem::size_of;
use tracing::debug;

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_WRITE_PROTECT, HANDLE,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, GetDriveTypeW, GetLogicalDrives, GetVolumeInformationW,
    FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::IO::DeviceIoControl;
use windows::Win32::System::Ioctl::{
    PropertyStandardQuery, StorageDeviceProperty, IOCTL_DISK_GET_DRIVE_GEOMETRY_EX,
    IOCTL_DISK_GET_DRIVE_LAYOUT_EX, IOCTL_DISK_IS_WRITABLE, IOCTL_STORAGE_QUERY_PROPERTY,
    IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS, STORAGE_PROPERTY_QUERY,
};
use windows::Win32::System::SystemInformation::{
    ComputerNameDnsHostname, GetComputerNameExW, GetVersionExW, GetWindowsDirectoryW,
    OSVERSIONINFOW,
};

use crate::descriptor::{
    parse_device_descriptor, parse_disk_extents, parse_geometry, parse_partition_style,
};
use crate::{device_path, Volume};

const DRIVE_CDROM: u32 = 5;

fn wide(s: &str) -> Vec<u16> {
    use std::os::windows::prelude::*;
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Query-only handle, closed on drop.
struct DeviceHandle(HANDLE);

impl DeviceHandle {
    fn open(path: &str) -> windows::core::Result<Self> {
        let w = wide(path);
        let handle = unsafe {
            CreateFileW(
                PCWSTR(w.as_ptr()),
                0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(0),
                HANDLE::default(),
            )?
        };
        Ok(Self(handle))
    }

    fn ioctl<T>(
        &self,
        code: u32,
        input: Option<&T>,
        out: &mut [u8],
    ) -> windows::core::Result<usize> {
        let mut returned = 0u32;
        unsafe {
            DeviceIoControl(
                self.0,
                code,
                input.map(|value| value as *const T as *const c_void),
                input.map_or(0, |_| size_of::<T>() as u32),
                Some(out.as_mut_ptr() as *mut c_void),
                out.len() as u32,
                Some(&mut returned),
                None,
            )?;
        }
        Ok((returned as usize).min(out.len()))
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

pub fn probe_physical_drives(max_disks: u32) -> Result<Vec<u32>, RegistryError> {
    let mut disks = Vec::new();
    let mut denied = None;

    for n in 0..max_disks {
        match DeviceHandle::open(&device_path(n)) {
            Ok(_) => disks.push(n),
            Err(err) if err.code() == ERROR_ACCESS_DENIED.to_hresult() => {
                denied = Some(err);
            }
            Err(_) => continue,
        }
    }

    match denied {
        Some(err) if disks.is_empty() => Err(RegistryError::PermissionDenied(format!(
            "open physical drives: {}",
            err
        ))),
        _ => Ok(disks),
    }
}

pub fn query_properties(n: u32) -> Result<DeviceProperties> {
    let path = device_path(n);
    let handle = DeviceHandle::open(&path).with_context(|| format!("open {}", path))?;

    let query = STORAGE_PROPERTY_QUERY {
        PropertyId: StorageDeviceProperty,
        QueryType: PropertyStandardQuery,
        AdditionalParameters: [0],
    };
    let mut out = [0u8; 1024];
    let len = handle
        .ioctl(IOCTL_STORAGE_QUERY_PROPERTY, Some(&query), &mut out)
        .context("IOCTL_STORAGE_QUERY_PROPERTY")?;
    let descriptor = parse_device_descriptor(&out[..len])
        .ok_or_else(|| anyhow!("short storage descriptor ({} bytes)", len))?;

    // no medium in the reader makes geometry fail; keep the device anyway
    let mut geometry = [0u8; 256];
    let geometry = handle
        .ioctl::<()>(IOCTL_DISK_GET_DRIVE_GEOMETRY_EX, None, &mut geometry)
        .ok()
        .and_then(|len| parse_geometry(&geometry[..len]));

    let mut layout = vec![0u8; 64 * 1024];
    let partition_table_type = handle
        .ioctl::<()>(IOCTL_DISK_GET_DRIVE_LAYOUT_EX, None, &mut layout)
        .ok()
        .and_then(|len| parse_partition_style(&layout[..len]));

    let read_only = match handle.ioctl::<()>(IOCTL_DISK_IS_WRITABLE, None, &mut []) {
        Ok(_) => Some(false),
        Err(err) if err.code() == ERROR_WRITE_PROTECT.to_hresult() => Some(true),
        Err(_) => None,
    };

    let bus = descriptor.bus;
    Ok(DeviceProperties {
        vendor: descriptor.vendor,
        model: descriptor.product,
        size: geometry.map(|(_, size)| size),
        block_size: geometry.map(|(sector, _)| sector),
        read_only,
        removable_media: Some(descriptor.removable),
        bus: Some(bus),
        virtual_provider: bus.is_virtual().then(|| "vhd".to_string()),
        partition_table_type,
        ..DeviceProperties::default()
    })
}

fn logical_drive_letters() -> Vec<char> {
    let mask = unsafe { GetLogicalDrives() };
    ('A'..='Z')
        .enumerate()
        .filter(|(idx, _)| mask & (1u32 << idx) != 0)
        .map(|(_, letter)| letter)
        .collect()
}

fn volume_label(root: &str) -> Result<Option<String>> {
    let wroot = wide(root);
    let mut name_buf = [0u16; 256];
    unsafe {
        GetVolumeInformationW(
            PCWSTR(wroot.as_ptr()),
            Some(&mut name_buf),
            None,
            None,
            None,
            None,
        )
        .with_context(|| format!("GetVolumeInformationW {}", root))?;
    }
    let label = String::from_utf16_lossy(&name_buf)
        .trim_end_matches('\0')
        .trim()
        .to_string();
    Ok(if label.is_empty() { None } else { Some(label) })
}

fn volume_disks(letter: char) -> Result<Vec<u32>> {
    let path = format!(r"\\.\{}:", letter);
    let handle = DeviceHandle::open(&path).with_context(|| format!("open {}", path))?;
    let mut out = [0u8; 1024];
    let len = handle
        .ioctl::<()>(IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS, None, &mut out)
        .with_context(|| format!("IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS {}", path))?;
    Ok(parse_disk_extents(&out[..len]))
}

/// Lettered volumes with the physical disks they live on, in letter order.
pub fn enumerate_volumes() -> Vec<Volume> {
    let mut volumes = Vec::new();

    for letter in logical_drive_letters() {
        let root = format!("{}:\\", letter);
        let wroot = wide(&root);
        if unsafe { GetDriveTypeW(PCWSTR(wroot.as_ptr())) } == DRIVE_CDROM {
            continue;
        }

        let label = match volume_label(&root) {
            Ok(label) => label,
            Err(err) => {
                debug!(volume = %root, error = %format!("{:#}", err), "skipping unready volume");
                continue;
            }
        };
        let disks = match volume_disks(letter) {
            Ok(disks) => disks,
            Err(err) => {
                debug!(
                    volume = %root,
                    error = %format!("{:#}", err),
                    "skipping volume without extents"
                );
                continue;
            }
        };

        volumes.push(Volume { root, label, disks });
    }

    volumes
}

/// Root of the volume holding the Windows directory, e.g. `C:\`.
pub fn system_root() -> Option<String> {
    let mut buf = [0u16; 260];
    let len = unsafe { GetWindowsDirectoryW(Some(&mut buf)) } as usize;
    if len == 0 || len > buf.len() {
        return None;
    }
    let dir = String::from_utf16_lossy(&buf[..len]);
    Some(dir.chars().take(3).collect::<String>().to_ascii_uppercase())
}

pub fn os_version_string() -> String {
    let mut info = OSVERSIONINFOW {
        dwOSVersionInfoSize: size_of::<OSVERSIONINFOW>() as u32,
        ..Default::default()
    };
    if unsafe { GetVersionExW(&mut info) }.is_ok() {
        return format!(
            "{}.{}.{}",
            info.dwMajorVersion, info.dwMinorVersion, info.dwBuildNumber
        );
    }
    "unknown".to_string()
}

pub fn machine_name_string() -> String {
    let mut buf = [0u16; 256];
    let mut size = buf.len() as u32;
    let ok = unsafe {
        GetComputerNameExW(ComputerNameDnsHostname, PWSTR(buf.as_mut_ptr()), &mut size)
    };
    if ok.is_ok() {
        return String::from_utf16_lossy(&buf[..size as usize]);
    }
    "unknown".to_string()
}
