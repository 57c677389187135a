use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::mounts::resolve_mountpoints;
use crate::registry::{DeviceProperties, RawDevice, Registry, RegistrySession};
use crate::{Drive, DriveList, RejectedDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    #[default]
    Sequential,
    /// Query devices on a thread pool; `None` sizes it to the host.
    Parallel { threads: Option<usize> },
}

#[derive(Debug, Clone, Default)]
pub struct InventoryOptions {
    pub concurrency: Concurrency,
}

impl InventoryOptions {
    pub fn parallel(threads: Option<usize>) -> Self {
        Self {
            concurrency: Concurrency::Parallel { threads },
        }
    }
}

/// Enumerates every device in `registry` into a fresh `DriveList`.
///
/// Only a failure to open or list the registry fails the whole call; it comes
/// back as an empty list with `error` set. Per-device query failures leave
/// the drive in the list with sentinel fields and a drive-level `error`.
pub fn build_drive_list<R>(registry: &R, options: &InventoryOptions) -> DriveList
where
    R: Registry + ?Sized,
{
    let session = match registry.open() {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "cannot open device registry");
            return DriveList::failed(err.to_string());
        }
    };

    let raw_devices = match session.list_raw_devices() {
        Ok(devices) => devices,
        Err(err) => {
            warn!(error = %err, "cannot list devices");
            return DriveList::failed(err.to_string());
        }
    };
    debug!(count = raw_devices.len(), "registry listed devices");

    let (accepted, rejected) = screen_identifiers(raw_devices);
    let drives = match options.concurrency {
        Concurrency::Sequential => assemble_sequential(&session, &accepted),
        Concurrency::Parallel { threads } => assemble_parallel(&session, &accepted, threads),
    };

    DriveList::from_parts(drives, rejected)
}

/// Keeps the first record per identifier and rejects the rest, along with
/// records that have no identifier at all.
fn screen_identifiers(devices: Vec<RawDevice>) -> (Vec<RawDevice>, Vec<RejectedDevice>) {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(devices.len());
    let mut rejected = Vec::new();

    for device in devices {
        if device.id.trim().is_empty() {
            warn!(raw = %device.raw, "registry returned a device without an identifier");
            rejected.push(RejectedDevice {
                device: device.id,
                reason: format!("empty device identifier (raw: {})", device.raw),
            });
            continue;
        }
        if !seen.insert(device.id.clone()) {
            warn!(device = %device.id, "registry returned a duplicate device identifier");
            rejected.push(RejectedDevice {
                reason: "duplicate device identifier; first occurrence kept".to_string(),
                device: device.id,
            });
            continue;
        }
        accepted.push(device);
    }

    (accepted, rejected)
}

fn assemble_sequential<S>(session: &S, devices: &[RawDevice]) -> Vec<Drive>
where
    S: RegistrySession + ?Sized,
{
    devices.iter().map(|device| assemble_drive(session, device)).collect()
}

fn assemble_parallel<S>(
    session: &S,
    devices: &[RawDevice],
    threads: Option<usize>,
) -> Vec<Drive>
where
    S: RegistrySession + Sync + ?Sized,
{
    let threads = threads
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(4, usize::from))
        .max(1);

    match ThreadPoolBuilder::new().num_threads(threads).build() {
        // indexed collect keeps discovery order regardless of completion order
        Ok(pool) => pool.install(|| {
            devices
                .par_iter()
                .map(|device| assemble_drive(session, device))
                .collect()
        }),
        Err(err) => {
            warn!(error = %err, "thread pool unavailable, querying devices sequentially");
            assemble_sequential(session, devices)
        }
    }
}

fn assemble_drive<S>(session: &S, device: &RawDevice) -> Drive
where
    S: RegistrySession + ?Sized,
{
    let mut problems = Vec::new();

    let mut props = session.device_properties(device).unwrap_or_else(|err| {
        warn!(device = %device.id, error = %err, "device property query failed");
        problems.push(err.to_string());
        DeviceProperties::default()
    });
    if props.hosts_os.is_none() {
        props.hosts_os = session.hosts_os(device);
    }

    let mountpoints = resolve_mountpoints(session, device).unwrap_or_else(|err| {
        warn!(device = %device.id, error = %err, "mountpoint query failed");
        problems.push(err.to_string());
        Vec::new()
    });

    let class = classify(device, &props, &mountpoints);
    debug!(
        device = %device.id,
        mounts = mountpoints.len(),
        system = class.system,
        removable = class.removable,
        "assembled drive"
    );

    Drive {
        device: device.id.clone(),
        display_name: class.display_name,
        description: class.description,
        size: props.size.unwrap_or(0),
        mountpoints,
        raw: device.raw.clone(),
        protected: class.protected,
        system: class.system,
        removable: class.removable,
        is_virtual: class.is_virtual,
        internal: class.internal,
        read_only: class.read_only,
        block_size: class.block_size,
        bus_type: class.bus_type,
        partition_table_type: props.partition_table_type,
        error: if problems.is_empty() {
            None
        } else {
            Some(problems.join("; "))
        },
    }
}
