use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("device registry unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied opening device registry: {0}")]
    PermissionDenied(String),
    #[error("device registry is not supported on {0}")]
    Unsupported(&'static str),
    #[error("registry query failed for {device}: {reason}")]
    DeviceQuery { device: String, reason: String },
    #[error("malformed registry data: {0}")]
    Parse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub fn device_query(device: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::DeviceQuery {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    /// Maps an I/O failure to open the registry onto the total-failure variants.
    pub fn from_open(context: impl fmt::Display, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(format!("{}: {}", context, err))
            }
            _ => Self::Unavailable(format!("{}: {}", context, err)),
        }
    }
}

/// An adapter-specific registry entry before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDevice {
    /// Registry identifier, e.g. `/dev/sda` or `\\.\PhysicalDrive0`.
    pub id: String,
    /// Unprocessed registry record, for diagnostics only.
    pub raw: String,
}

impl RawDevice {
    pub fn new(id: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw: raw.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMountpoint {
    pub path: String,
    pub label: Option<String>,
}

impl RawMountpoint {
    pub fn new(path: impl Into<String>, label: Option<String>) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusType {
    #[serde(rename = "USB")]
    Usb,
    #[serde(rename = "SD")]
    Sd,
    #[serde(rename = "MMC")]
    Mmc,
    #[serde(rename = "SATA")]
    Sata,
    #[serde(rename = "ATA")]
    Ata,
    #[serde(rename = "SCSI")]
    Scsi,
    #[serde(rename = "SAS")]
    Sas,
    #[serde(rename = "NVMe")]
    Nvme,
    #[serde(rename = "FireWire")]
    Firewire,
    #[serde(rename = "Thunderbolt")]
    Thunderbolt,
    #[serde(rename = "Virtual")]
    Virtual,
    #[serde(rename = "DiskImage")]
    DiskImage,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl BusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusType::Usb => "USB",
            BusType::Sd => "SD",
            BusType::Mmc => "MMC",
            BusType::Sata => "SATA",
            BusType::Ata => "ATA",
            BusType::Scsi => "SCSI",
            BusType::Sas => "SAS",
            BusType::Nvme => "NVMe",
            BusType::Firewire => "FireWire",
            BusType::Thunderbolt => "Thunderbolt",
            BusType::Virtual => "Virtual",
            BusType::DiskImage => "DiskImage",
            BusType::Unknown => "Unknown",
        }
    }

    /// Buses whose devices can be unplugged while the host runs.
    pub fn is_removable(&self) -> bool {
        matches!(
            self,
            BusType::Usb | BusType::Sd | BusType::Mmc | BusType::Firewire | BusType::Thunderbolt
        )
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, BusType::Virtual | BusType::DiskImage)
    }

    /// Parses the protocol names registries report ("USB", "PCI-Express",
    /// "Disk Image", "Secure Digital", ...).
    pub fn from_protocol(value: &str) -> BusType {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "usb" => BusType::Usb,
            "sd" | "secure digital" | "sdcard" => BusType::Sd,
            "mmc" | "emmc" => BusType::Mmc,
            "sata" | "serial ata" => BusType::Sata,
            "ata" | "atapi" | "pata" => BusType::Ata,
            "scsi" | "iscsi" | "fibre channel" | "fibre" => BusType::Scsi,
            "sas" => BusType::Sas,
            "nvme" | "pci-express" | "pcie" | "pci" | "apple fabric" => BusType::Nvme,
            "firewire" | "1394" => BusType::Firewire,
            "thunderbolt" => BusType::Thunderbolt,
            "virtual" | "virtual interface" | "file backed virtual" => BusType::Virtual,
            "disk image" | "diskimage" => BusType::DiskImage,
            _ => BusType::Unknown,
        }
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry metadata for one device. `None` means the registry did not say.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub volume_name: Option<String>,
    pub size: Option<u64>,
    pub block_size: Option<u32>,
    pub read_only: Option<bool>,
    pub locked: Option<bool>,
    pub removable_media: Option<bool>,
    pub ejectable: Option<bool>,
    pub internal: Option<bool>,
    pub bus: Option<BusType>,
    /// Backing provider for synthetic devices: an image path, "loop", "apfs", ...
    pub virtual_provider: Option<String>,
    pub hosts_os: Option<bool>,
    pub partition_table_type: Option<String>,
}

/// Opens a scoped session on the OS device registry.
///
/// One session is opened per enumeration and dropped when it ends, so the
/// registry handle never outlives the call.
pub trait Registry {
    type Session: RegistrySession + Sync;

    fn open(&self) -> Result<Self::Session, RegistryError>;
}

pub trait RegistrySession {
    /// Lists every device in discovery order. Failure aborts the enumeration.
    fn list_raw_devices(&self) -> Result<Vec<RawDevice>, RegistryError>;

    fn device_properties(&self, device: &RawDevice) -> Result<DeviceProperties, RegistryError>;

    fn list_raw_mountpoints(
        &self,
        device: &RawDevice,
    ) -> Result<Vec<RawMountpoint>, RegistryError>;

    /// Whether `device` backs the running OS, when the session knows this
    /// without a property query. Fills `hosts_os` when the properties leave
    /// it unset, including when the property query failed.
    fn hosts_os(&self, _device: &RawDevice) -> Option<bool> {
        None
    }
}
