//! The three independent enumerations the correlation engine joins: disk
//! devices, mounted volumes and logical drives.
//!
//! Volume and drive enumerations tag every item with the device/partition
//! identity read through `StorageInfoProbe`. Items whose identity cannot be
//! read are skipped: volumes on RAM disks, network drives and empty card
//! readers are all legitimate and simply have nothing to correlate.

use tracing::{debug, trace};

use crate::backend::StorageBackend;
use crate::probe::StorageInfoProbe;
use crate::{
    DeviceClass, DeviceRecord, DriveType, DriveTypeFilter, LogicalDriveRecord, Result,
    VolumeRecord,
};

/// Lists device interfaces of a device class.
pub struct DeviceEnumerator<'a, B> {
    backend: &'a B,
}

impl<'a, B: StorageBackend> DeviceEnumerator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        DeviceEnumerator { backend }
    }

    /// Returns the present devices of `class` in OS order. No devices is an
    /// empty sequence, not an error.
    pub fn enumerate(&self, class: DeviceClass) -> Result<impl Iterator<Item = DeviceRecord>> {
        let devices = self.backend.devices(class)?;
        trace!("{} {:?} device interfaces", devices.len(), class);
        Ok(devices.into_iter())
    }
}

/// Lists mounted volumes.
pub struct VolumeEnumerator<'a, B> {
    backend: &'a B,
    probe: StorageInfoProbe,
}

impl<'a, B: StorageBackend> VolumeEnumerator<'a, B> {
    pub fn new(backend: &'a B, probe: StorageInfoProbe) -> Self {
        VolumeEnumerator { backend, probe }
    }

    /// Returns the volume identifiers (`\\?\Volume{...}\`).
    pub fn enumerate_volumes(&self) -> Result<impl Iterator<Item = String>> {
        Ok(self.backend.volumes()?.into_iter())
    }

    /// Returns the drive letter (`C:`) a volume is displayed as, or `None`
    /// for volumes without one.
    pub fn resolve_drive_letter(&self, volume_id: &str) -> Option<String> {
        resolve_drive_letter(self.backend, volume_id)
    }

    /// Returns every volume that resolves to a device/partition identity.
    pub fn records(&self) -> Result<impl Iterator<Item = VolumeRecord> + 'a> {
        let backend = self.backend;
        let probe = self.probe;

        Ok(self.enumerate_volumes()?.filter_map(move |volume_id| {
            let open_path = volume_id.trim_end_matches('\\');
            match probe.identify(backend, open_path) {
                Ok(identity) => {
                    let drive_letter = resolve_drive_letter(backend, &volume_id).unwrap_or_default();
                    Some(VolumeRecord::new(volume_id, drive_letter, identity))
                }
                Err(e) => {
                    debug!("skipping volume {}: {}", volume_id, e);
                    None
                }
            }
        }))
    }
}

fn resolve_drive_letter<B: StorageBackend>(backend: &B, volume_id: &str) -> Option<String> {
    match backend.volume_path_names(volume_id) {
        Ok(mount_points) => mount_points.iter().find_map(|mount| drive_root_letter(mount)),
        Err(e) => {
            trace!("no mount points for {}: {}", volume_id, e);
            None
        }
    }
}

/// Returns `C:` for a drive root such as `C:\` or `C:`.
fn drive_root_letter(root: &str) -> Option<String> {
    let drive = root.trim_end_matches('\\');
    let mut chars = drive.chars();

    match (chars.next(), chars.next(), chars.next()) {
        (Some(letter), Some(':'), None) if letter.is_ascii_alphabetic() => {
            Some(format!("{}:", letter.to_ascii_uppercase()))
        }
        _ => None,
    }
}

/// Lists logical drives.
pub struct LogicalDriveEnumerator<'a, B> {
    backend: &'a B,
    probe: StorageInfoProbe,
}

impl<'a, B: StorageBackend> LogicalDriveEnumerator<'a, B> {
    pub fn new(backend: &'a B, probe: StorageInfoProbe) -> Self {
        LogicalDriveEnumerator { backend, probe }
    }

    /// Returns `(drive letter, drive type)` for every logical drive. Drives
    /// without media are left out unless `include_unavailable` is set.
    pub fn enumerate_logical_drives(&self, include_unavailable: bool) -> Result<Vec<(String, DriveType)>> {
        let drives = self
            .backend
            .logical_drives()?
            .into_iter()
            .filter(|root| include_unavailable || self.backend.is_drive_ready(root))
            .filter_map(|root| {
                let letter = drive_root_letter(&root)?;
                let drive_type = DriveType::from_raw(self.backend.drive_type(&root));
                Some((letter, drive_type))
            })
            .collect();

        Ok(drives)
    }

    /// Returns every drive whose type is in `filter` and that resolves to a
    /// device/partition identity.
    pub fn records(&self, filter: DriveTypeFilter) -> Result<impl Iterator<Item = LogicalDriveRecord> + 'a> {
        let backend = self.backend;
        let probe = self.probe;

        Ok(self
            .enumerate_logical_drives(true)?
            .into_iter()
            .filter(move |(_, drive_type)| filter.contains(*drive_type))
            .filter_map(move |(letter, drive_type)| {
                let open_path = format!("\\\\.\\{}", letter);
                match probe.identify(backend, &open_path) {
                    Ok(identity) => Some(LogicalDriveRecord::new(letter, drive_type, identity)),
                    Err(e) => {
                        debug!("skipping drive {}: {}", letter, e);
                        None
                    }
                }
            }))
    }
}
