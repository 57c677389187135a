//! In-memory registry used by the unit tests.

use crate::registry::{
    DeviceProperties, RawDevice, RawMountpoint, Registry, RegistryError, RegistrySession,
};

#[derive(Debug, Clone)]
pub(crate) struct FakeDevice {
    id: String,
    properties: Result<DeviceProperties, String>,
    mounts: Result<Vec<RawMountpoint>, String>,
    hosts_os: Option<bool>,
}

impl FakeDevice {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            properties: Ok(DeviceProperties::default()),
            mounts: Ok(Vec::new()),
            hosts_os: None,
        }
    }

    pub(crate) fn with_properties(mut self, properties: DeviceProperties) -> Self {
        self.properties = Ok(properties);
        self
    }

    pub(crate) fn with_property_failure(mut self, reason: &str) -> Self {
        self.properties = Err(reason.to_string());
        self
    }

    pub(crate) fn with_mounts(mut self, mounts: Vec<RawMountpoint>) -> Self {
        self.mounts = Ok(mounts);
        self
    }

    pub(crate) fn with_mount(self, path: &str, label: Option<&str>) -> Self {
        self.with_mounts(vec![RawMountpoint::new(path, label.map(str::to_string))])
    }

    pub(crate) fn with_mount_failure(mut self, reason: &str) -> Self {
        self.mounts = Err(reason.to_string());
        self
    }

    /// Session-level OS hint, independent of the property query.
    pub(crate) fn hosting_os(mut self) -> Self {
        self.hosts_os = Some(true);
        self
    }
}

#[derive(Debug, Clone)]
enum Failure {
    Open(String),
    PermissionDenied(String),
    List(String),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeRegistry {
    devices: Vec<FakeDevice>,
    failure: Option<Failure>,
}

impl FakeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_device(mut self, device: FakeDevice) -> Self {
        self.devices.push(device);
        self
    }

    pub(crate) fn failing_open(mut self, reason: &str) -> Self {
        self.failure = Some(Failure::Open(reason.to_string()));
        self
    }

    pub(crate) fn denying_access(mut self, reason: &str) -> Self {
        self.failure = Some(Failure::PermissionDenied(reason.to_string()));
        self
    }

    pub(crate) fn failing_list(mut self, reason: &str) -> Self {
        self.failure = Some(Failure::List(reason.to_string()));
        self
    }
}

pub(crate) struct FakeSession {
    devices: Vec<FakeDevice>,
    list_failure: Option<String>,
}

impl FakeSession {
    fn find(&self, device: &RawDevice) -> Result<&FakeDevice, RegistryError> {
        self.devices
            .iter()
            .find(|candidate| candidate.id == device.id)
            .ok_or_else(|| RegistryError::device_query(&device.id, "unknown device"))
    }
}

impl Registry for FakeRegistry {
    type Session = FakeSession;

    fn open(&self) -> Result<FakeSession, RegistryError> {
        match &self.failure {
            Some(Failure::Open(reason)) => Err(RegistryError::Unavailable(reason.clone())),
            Some(Failure::PermissionDenied(reason)) => {
                Err(RegistryError::PermissionDenied(reason.clone()))
            }
            Some(Failure::List(reason)) => Ok(FakeSession {
                devices: Vec::new(),
                list_failure: Some(reason.clone()),
            }),
            None => Ok(FakeSession {
                devices: self.devices.clone(),
                list_failure: None,
            }),
        }
    }
}

impl RegistrySession for FakeSession {
    fn list_raw_devices(&self) -> Result<Vec<RawDevice>, RegistryError> {
        if let Some(reason) = &self.list_failure {
            return Err(RegistryError::Unavailable(reason.clone()));
        }
        Ok(self
            .devices
            .iter()
            .map(|device| RawDevice::new(&device.id, format!("fake:{}", device.id)))
            .collect())
    }

    fn device_properties(&self, device: &RawDevice) -> Result<DeviceProperties, RegistryError> {
        self.find(device)?
            .properties
            .clone()
            .map_err(|reason| RegistryError::device_query(&device.id, reason))
    }

    fn list_raw_mountpoints(
        &self,
        device: &RawDevice,
    ) -> Result<Vec<RawMountpoint>, RegistryError> {
        self.find(device)?
            .mounts
            .clone()
            .map_err(|reason| RegistryError::device_query(&device.id, reason))
    }

    fn hosts_os(&self, device: &RawDevice) -> Option<bool> {
        self.find(device).ok().and_then(|fake| fake.hosts_os)
    }
}
