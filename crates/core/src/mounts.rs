use crate::registry::{RawDevice, RegistryError, RegistrySession};
use crate::Mountpoint;

/// Resolves the mounted volumes of `device` in registry order.
///
/// An unmounted device yields an empty list. Records without a path are
/// dropped; an absent label stays distinct from an empty one.
pub fn resolve_mountpoints<S>(
    session: &S,
    device: &RawDevice,
) -> Result<Vec<Mountpoint>, RegistryError>
where
    S: RegistrySession + ?Sized,
{
    let raw = session.list_raw_mountpoints(device)?;
    Ok(raw
        .into_iter()
        .filter(|mount| !mount.path.is_empty())
        .map(|mount| Mountpoint::new(mount.path, mount.label))
        .collect())
}
