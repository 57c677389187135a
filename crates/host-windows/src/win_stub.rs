use anyhow::{anyhow, Result};
use drivelist_core::{DeviceProperties, RegistryError};

use crate::Volume;

pub fn probe_physical_drives(_max_disks: u32) -> Result<Vec<u32>, RegistryError> {
    Err(RegistryError::Unsupported(std::env::consts::OS))
}

pub fn query_properties(_n: u32) -> Result<DeviceProperties> {
    Err(anyhow!("PhysicalDrive queries require Windows"))
}

pub fn enumerate_volumes() -> Vec<Volume> {
    Vec::new()
}

pub fn system_root() -> Option<String> {
    None
}

pub fn os_version_string() -> String {
    "unknown".to_string()
}

pub fn machine_name_string() -> String {
    "unknown".to_string()
}
