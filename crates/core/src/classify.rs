use crate::registry::{BusType, DeviceProperties, RawDevice};
use crate::Mountpoint;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub display_name: String,
    pub description: String,
    pub protected: bool,
    pub system: bool,
    pub removable: bool,
    pub is_virtual: bool,
    pub internal: bool,
    pub read_only: bool,
    pub block_size: Option<u32>,
    pub bus_type: Option<BusType>,
}

/// Derives display strings and classification flags for one device.
///
/// Missing properties degrade to `false` / empty strings; this never fails.
/// `mountpoints` lets a device that carries the root filesystem count as
/// the system disk even when the registry has no boot hint.
pub fn classify(
    device: &RawDevice,
    props: &DeviceProperties,
    mountpoints: &[Mountpoint],
) -> Classification {
    let bus = props.bus.filter(|bus| *bus != BusType::Unknown);

    let removable = props.removable_media.unwrap_or(false)
        || props.ejectable.unwrap_or(false)
        || bus.map(|bus| bus.is_removable()).unwrap_or(false);
    let is_virtual =
        props.virtual_provider.is_some() || bus.map(|bus| bus.is_virtual()).unwrap_or(false);
    let internal = match props.internal {
        Some(internal) => internal && !removable && !is_virtual,
        None => !removable && !is_virtual,
    };

    let read_only = props.read_only.unwrap_or(false);
    let protected = read_only || props.locked.unwrap_or(false);
    let system = props.hosts_os.unwrap_or(false) || mountpoints.iter().any(is_os_root);

    Classification {
        display_name: display_name(device, props),
        description: description(props),
        protected,
        system,
        removable,
        is_virtual,
        internal,
        read_only,
        block_size: props.block_size.filter(|size| *size > 0),
        bus_type: props.bus,
    }
}

fn is_os_root(mountpoint: &Mountpoint) -> bool {
    mountpoint.path == "/"
}

fn display_name(device: &RawDevice, props: &DeviceProperties) -> String {
    non_empty(props.volume_name.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| device.id.clone())
}

fn description(props: &DeviceProperties) -> String {
    let vendor = non_empty(props.vendor.as_deref());
    let model = non_empty(props.model.as_deref());
    match (vendor, model) {
        // some registries already prefix the model with the vendor
        (Some(vendor), Some(model)) if model.starts_with(vendor) => model.to_string(),
        (Some(vendor), Some(model)) => format!("{} {}", vendor, model),
        (None, Some(model)) => model.to_string(),
        (Some(vendor), None) => vendor.to_string(),
        (None, None) => non_empty(props.volume_name.as_deref())
            .unwrap_or("")
            .to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
