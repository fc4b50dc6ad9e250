//! Correlation of disks, volumes and logical drives into `PhysicalDiskInfo`
//! aggregates.
//!
//! Volumes are attached to the disk with the same device number, in volume
//! enumeration order. Logical drives are attached under the volume with the
//! same device and partition number. The join is purely identity based:
//! a partition reported twice by the OS appears twice.
//!
//! Full enumeration and single lookup build the base of each aggregate with
//! the same probe call and run the same join, so a disk found by number is
//! equal to the one found by enumeration.

use std::collections::HashSet;
use std::vec;

use tracing::{debug, warn};

use crate::backend::{PrivilegeLevel, StorageBackend};
use crate::device_path::{self, DevicePathKind};
use crate::enumerators::{DeviceEnumerator, LogicalDriveEnumerator, VolumeEnumerator};
use crate::probe::StorageInfoProbe;
use crate::{
    default_drive_types, DeviceClass, DeviceRecord, DiskError, DriveTypeFilter,
    LogicalDriveRecord, PhysicalDiskBuilder, PhysicalDiskInfo, Result, StorageDeviceIdentity,
    VolumeRecord,
};

/// Entry point for physical disk queries over a storage backend.
#[derive(Debug, Clone)]
pub struct DiskTopology<B> {
    backend: B,
    probe: StorageInfoProbe,
}

impl<B: StorageBackend> DiskTopology<B> {
    /// Creates a topology that probes devices at `privilege`.
    pub fn new(backend: B, privilege: PrivilegeLevel) -> Self {
        DiskTopology {
            backend,
            probe: StorageInfoProbe::new(privilege),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn privilege(&self) -> PrivilegeLevel {
        self.probe.privilege()
    }

    /// Enumerates the physical disks, correlated with the logical drives
    /// whose type is in `drive_types`.
    ///
    /// Device, volume and drive lists are read when this is called; each
    /// disk is then probed as the returned iterator is advanced. Calling
    /// again starts a fresh traversal.
    pub fn physical_disks(&self, drive_types: DriveTypeFilter) -> Result<PhysicalDisks<&B>> {
        PhysicalDisks::start(&self.backend, self.probe, drive_types)
    }

    /// Like [`physical_disks`](Self::physical_disks), but the iterator owns
    /// the backend.
    pub fn into_physical_disks(self, drive_types: DriveTypeFilter) -> Result<PhysicalDisks<B>> {
        PhysicalDisks::start(self.backend, self.probe, drive_types)
    }

    /// Looks up a disk by device number.
    ///
    /// Fails with `InvalidArgument` for negative numbers and `NotFound` when
    /// no disk has this number.
    pub fn physical_disk_by_number(&self, device_number: i64) -> Result<PhysicalDiskInfo> {
        if device_number < 0 {
            return Err(DiskError::InvalidArgument(format!(
                "device number {} is negative",
                device_number
            )));
        }
        let device_number = u32::try_from(device_number)
            .map_err(|_| DiskError::NotFound(format!("device number {}", device_number)))?;

        self.lookup(&DevicePathKind::PhysicalDrive(device_number))
    }

    /// Looks up the disk behind a path.
    ///
    /// Accepts a disk path (`\\.\PhysicalDrive0`), a drive (`C`, `C:`,
    /// `C:\`), a volume identifier (`\\?\Volume{...}\`) or a device interface
    /// path (`\\?\scsi#disk...`).
    pub fn physical_disk_by_path(&self, path: &str) -> Result<PhysicalDiskInfo> {
        self.lookup(&device_path::classify(path)?)
    }

    fn lookup(&self, target: &DevicePathKind) -> Result<PhysicalDiskInfo> {
        let open_path = target.open_path();
        let identity = self
            .probe
            .identify(&self.backend, &open_path)
            .map_err(|e| match e {
                DiskError::Unsupported(reason) => DiskError::NotFound(reason),
                other => other,
            })?;

        let mut disk = self.find_disk(&identity)?.ok_or_else(|| {
            DiskError::NotFound(format!(
                "no device interface for device number {} ({})",
                identity.device_number(),
                open_path
            ))
        })?;
        disk.dos_device_name(
            target
                .dos_device_name()
                .and_then(|name| self.backend.query_dos_device(&name)),
        );

        let volumes: Vec<VolumeRecord> = VolumeEnumerator::new(&self.backend, self.probe)
            .records()?
            .filter(|volume| disk.identity().same_device(volume.identity()))
            .collect();
        let drives: Vec<LogicalDriveRecord> = LogicalDriveEnumerator::new(&self.backend, self.probe)
            .records(default_drive_types())?
            .filter(|drive| disk.identity().same_device(drive.identity()))
            .collect();

        Ok(correlate(disk, &volumes, &drives))
    }

    /// Finds the device interface of the disk `identity` lives on and reads
    /// the base of its aggregate.
    ///
    /// A failing device enumeration is returned as is; candidates that
    /// cannot be probed are skipped.
    fn find_disk(&self, identity: &StorageDeviceIdentity) -> Result<Option<PhysicalDiskBuilder>> {
        let class = if identity.device_type().is_optical() {
            DeviceClass::CdRom
        } else {
            DeviceClass::Disk
        };

        let disk = DeviceEnumerator::new(&self.backend)
            .enumerate(class)?
            .filter(|record| match self.probe.identify(&self.backend, record.device_path()) {
                Ok(candidate) => candidate.same_device(identity),
                Err(e) => {
                    debug!("skipping {}: {}", record.device_path(), e);
                    false
                }
            })
            .find_map(|record| self.probe.describe_disk(&self.backend, &record).ok());

        Ok(disk)
    }
}

/// Attaches the volumes on `disk`'s device, and under each the logical
/// drives on the same partition, then freezes the aggregate.
fn correlate(
    mut disk: PhysicalDiskBuilder,
    volumes: &[VolumeRecord],
    drives: &[LogicalDriveRecord],
) -> PhysicalDiskInfo {
    let identity = *disk.identity();

    for volume in volumes.iter().filter(|v| identity.same_device(v.identity())) {
        disk.add_volume(volume.identity().partition_number(), volume.volume_id());

        for drive in drives
            .iter()
            .filter(|d| d.identity().same_partition(volume.identity()))
        {
            disk.add_logical_drive(drive.drive_letter());
        }
    }

    disk.build()
}

/// Lazily probed physical disks of one enumeration pass.
///
/// Each call to `next` opens at most one disk device and closes it before
/// the aggregate is returned, so dropping the iterator early leaves no
/// handle behind. Disks that cannot be probed are skipped.
pub struct PhysicalDisks<B: StorageBackend> {
    backend: B,
    probe: StorageInfoProbe,
    devices: vec::IntoIter<DeviceRecord>,
    volumes: Vec<VolumeRecord>,
    drives: Vec<LogicalDriveRecord>,
    seen: HashSet<u32>,
}

impl<B: StorageBackend> PhysicalDisks<B> {
    fn start(backend: B, probe: StorageInfoProbe, drive_types: DriveTypeFilter) -> Result<Self> {
        let devices: Vec<DeviceRecord> = DeviceEnumerator::new(&backend)
            .enumerate(DeviceClass::Disk)?
            .collect();
        let volumes: Vec<VolumeRecord> = VolumeEnumerator::new(&backend, probe).records()?.collect();
        let drives: Vec<LogicalDriveRecord> = LogicalDriveEnumerator::new(&backend, probe)
            .records(drive_types)?
            .collect();

        debug!(
            "correlating {} disks, {} volumes, {} logical drives",
            devices.len(),
            volumes.len(),
            drives.len()
        );

        Ok(PhysicalDisks {
            backend,
            probe,
            devices: devices.into_iter(),
            volumes,
            drives,
            seen: HashSet::new(),
        })
    }
}

impl<B: StorageBackend> Iterator for PhysicalDisks<B> {
    type Item = PhysicalDiskInfo;

    fn next(&mut self) -> Option<PhysicalDiskInfo> {
        for record in self.devices.by_ref() {
            let disk = match self.probe.describe_disk(&self.backend, &record) {
                Ok(disk) => disk,
                Err(e) => {
                    if e.is_soft() {
                        debug!("skipping disk {}: {}", record.device_path(), e);
                    } else {
                        warn!("skipping disk {}: {}", record.device_path(), e);
                    }
                    continue;
                }
            };

            if !self.seen.insert(disk.identity().device_number()) {
                warn!(
                    "{} reports device number {} twice, skipping",
                    record.device_path(),
                    disk.identity().device_number()
                );
                continue;
            }

            return Some(correlate(disk, &self.volumes, &self.drives));
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.devices.size_hint().1)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::fake::{
        FakeDevice, FakeStorage, CDROM_0, DISK_0, DISK_1, DRIVE_CDROM, DRIVE_FIXED, DRIVE_REMOVABLE,
    };
    use crate::{BusType, DriveType};

    const VOLUME_EFI: &str = "\\\\?\\Volume{6e4b2ac1-0000-0000-0000-100000000000}\\";
    const VOLUME_C: &str = "\\\\?\\Volume{6e4b2ac1-0000-0000-0000-200000000000}\\";
    const VOLUME_E: &str = "\\\\?\\Volume{9a1c77d0-0000-0000-0000-100000000000}\\";
    const VOLUME_DVD: &str = "\\\\?\\Volume{ee0c11a2-5a4c-11ef-b30f-806e6f6e6963}\\";

    /// Disk 0: EFI + C:, disk 1 (USB): E:, optical drive 0: D:.
    fn workstation() -> FakeStorage {
        FakeStorage::new()
            .with_disk(DISK_0, Some("Samsung SSD 970 EVO Plus 1TB"), 0)
            .with_disk(DISK_1, Some("SanDisk Ultra USB 3.0"), 1)
            .with_interface(DeviceClass::CdRom, CDROM_0, Some("HL-DT-ST DVDRAM"), FakeDevice::cdrom(0))
            .with_device("\\\\.\\PhysicalDrive0", FakeDevice::disk(0))
            .with_device("\\\\.\\PhysicalDrive1", FakeDevice::disk(1))
            .with_volume(VOLUME_EFI, 0, 1, &[])
            .with_volume(VOLUME_C, 0, 2, &["C:\\"])
            .with_volume(VOLUME_E, 1, 1, &["E:\\"])
            .with_volume_device(VOLUME_DVD, FakeDevice::cdrom(0), &["D:\\"])
            .with_drive("C:\\", DRIVE_FIXED, 0, 2)
            .with_drive_device("D:\\", DRIVE_CDROM, FakeDevice::cdrom(0))
            .with_drive("E:\\", DRIVE_REMOVABLE, 1, 1)
    }

    fn enumerate(topology: &DiskTopology<FakeStorage>) -> Vec<PhysicalDiskInfo> {
        topology.physical_disks(default_drive_types()).unwrap().collect()
    }

    #[test]
    fn test_single_fixed_disk() {
        let storage = FakeStorage::new()
            .with_disk(DISK_0, None, 0)
            .with_volume(VOLUME_C, 0, 1, &["C:\\"])
            .with_drive("C:\\", DRIVE_FIXED, 0, 1);
        let topology = DiskTopology::new(storage, PrivilegeLevel::Standard);

        let disks = enumerate(&topology);

        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].device_number(), 0);
        assert_eq!(disks[0].partition_indexes(), &[1]);
        assert_eq!(disks[0].volume_guids(), &[VOLUME_C.to_string()]);
        assert_eq!(disks[0].logical_drives(), &["C:".to_string()]);
    }

    #[test]
    fn test_disk_without_volumes() {
        let storage = FakeStorage::new().with_disk(DISK_1, None, 1);
        let topology = DiskTopology::new(storage, PrivilegeLevel::Standard);

        let disks = enumerate(&topology);

        assert_eq!(disks.len(), 1);
        assert!(disks[0].partition_indexes().is_empty());
        assert!(disks[0].volume_guids().is_empty());
        assert!(disks[0].logical_drives().is_empty());
    }

    #[test]
    fn test_standard_privilege_degrades_adapter() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Standard);

        let disks = enumerate(&topology);

        assert_eq!(disks.len(), 2);
        for disk in &disks {
            assert!(disk.storage_adapter_info().is_unknown());
            assert_eq!(disk.storage_adapter_info().bus_type(), BusType::Unknown);
        }
        assert_eq!(disks[0].to_string(), "Samsung SSD 970 EVO Plus 1TB");
    }

    #[test]
    fn test_elevated_reads_adapter() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Elevated);

        let disks = enumerate(&topology);

        assert_eq!(disks[0].storage_adapter_info().bus_type(), BusType::Nvme);
        assert!(disks[0].storage_partition_info().is_some());
    }

    #[test]
    fn test_lookup_out_of_range() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Standard);

        assert!(matches!(
            topology.physical_disk_by_number(7),
            Err(DiskError::NotFound(_))
        ));
        assert!(matches!(
            topology.physical_disk_by_number(i64::from(u32::MAX) + 1),
            Err(DiskError::NotFound(_))
        ));
        assert!(matches!(
            topology.physical_disk_by_number(-1),
            Err(DiskError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_lookup_invalid_path() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Standard);

        assert!(matches!(
            topology.physical_disk_by_path(""),
            Err(DiskError::InvalidArgument(_))
        ));
        assert!(matches!(
            topology.physical_disk_by_path("not a device"),
            Err(DiskError::InvalidArgument(_))
        ));
        assert!(matches!(
            topology.physical_disk_by_path("Q:"),
            Err(DiskError::NotFound(_))
        ));
    }

    #[test]
    fn test_lookup_matches_enumeration() {
        for privilege in [PrivilegeLevel::Standard, PrivilegeLevel::Elevated] {
            let topology = DiskTopology::new(workstation(), privilege);

            for disk in enumerate(&topology) {
                let found = topology
                    .physical_disk_by_number(i64::from(disk.device_number()))
                    .unwrap();

                assert_eq!(found, disk);
                assert_eq!(found.partition_indexes(), disk.partition_indexes());
                assert_eq!(found.volume_guids(), disk.volume_guids());
                assert_eq!(found.logical_drives(), disk.logical_drives());
            }
        }
    }

    #[test]
    fn test_lookup_by_path_forms() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Standard);
        let disk0 = topology.physical_disk_by_number(0).unwrap();

        for path in ["\\\\.\\PhysicalDrive0", "C", "c:", "C:\\", VOLUME_C, VOLUME_EFI, DISK_0] {
            let found = topology.physical_disk_by_path(path).unwrap();
            assert_eq!(found, disk0, "lookup by {}", path);
            assert!(found.storage_device_info().is_whole_device());
        }

        let disk1 = topology.physical_disk_by_path("E:\\").unwrap();
        assert_eq!(disk1.device_number(), 1);
        assert!(disk1.contains_volume("e"));
    }

    #[test]
    fn test_lookup_optical_drive() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Standard);

        let dvd = topology.physical_disk_by_path("D:").unwrap();

        assert_eq!(dvd.device_path(), CDROM_0);
        assert_eq!(dvd.device_number(), 0);
        assert_eq!(dvd.volume_guids(), &[VOLUME_DVD.to_string()]);
        assert_eq!(dvd.logical_drives(), &["D:".to_string()]);
        assert_ne!(dvd, topology.physical_disk_by_number(0).unwrap());
    }

    #[test]
    fn test_sequences_stay_paired() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Standard);

        for disk in enumerate(&topology) {
            assert_eq!(disk.partition_indexes().len(), disk.volume_guids().len());
            assert!(disk.logical_drives().len() <= disk.volume_guids().len());
        }

        let volumes: Vec<_> = VolumeEnumerator::new(topology.backend(), topology.probe)
            .records()
            .unwrap()
            .collect();
        for disk in enumerate(&topology) {
            for drive in disk.logical_drives() {
                let volume = volumes
                    .iter()
                    .find(|v| v.drive_letter() == drive.as_str())
                    .unwrap();
                assert!(disk.volume_guids().iter().any(|g| g == volume.volume_id()));
                assert_eq!(volume.identity().device_number(), disk.device_number());
            }
        }

        let disk0 = topology.physical_disk_by_number(0).unwrap();
        assert_eq!(disk0.partition_indexes(), &[1, 2]);
        assert_eq!(
            disk0.volume_guids(),
            &[VOLUME_EFI.to_string(), VOLUME_C.to_string()]
        );
        assert_eq!(disk0.logical_drives(), &["C:".to_string()]);
    }

    #[test]
    fn test_fixed_filter_excludes_optical_drives() {
        let storage = workstation()
            .with_volume(
                "\\\\?\\Volume{0c0c0c0c-0000-0000-0000-000000000000}\\",
                2,
                1,
                &["F:\\"],
            )
            .with_disk(
                "\\\\?\\scsi#disk&ven_virtual#1&2&0&000000#{53f56307-b6bf-11d0-94f2-00a0c91efb8b}",
                None,
                2,
            )
            .with_drive("F:\\", DRIVE_CDROM, 2, 1);
        let topology = DiskTopology::new(storage, PrivilegeLevel::Standard);

        let disks: Vec<_> = topology
            .physical_disks(DriveType::Fixed.into())
            .unwrap()
            .collect();

        let disk2 = disks.iter().find(|d| d.device_number() == 2).unwrap();
        assert!(disk2.logical_drives().is_empty());
        assert_eq!(disk2.volume_guids().len(), 1);

        let disk1 = disks.iter().find(|d| d.device_number() == 1).unwrap();
        assert!(disk1.logical_drives().is_empty());

        let disk0 = disks.iter().find(|d| d.device_number() == 0).unwrap();
        assert_eq!(disk0.logical_drives(), &["C:".to_string()]);
    }

    #[test]
    fn test_enumeration_is_repeatable() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Elevated);

        let first: HashSet<_> = enumerate(&topology).into_iter().collect();
        let second: HashSet<_> = enumerate(&topology).into_iter().collect();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_partitions_preserved() {
        let storage = FakeStorage::new()
            .with_disk(DISK_0, None, 0)
            .with_volume(VOLUME_C, 0, 2, &["C:\\"])
            .with_volume(VOLUME_EFI, 0, 2, &[])
            .with_drive("C:\\", DRIVE_FIXED, 0, 2);
        let topology = DiskTopology::new(storage, PrivilegeLevel::Standard);

        let disks = enumerate(&topology);

        assert_eq!(disks[0].partition_indexes(), &[2, 2]);
        assert_eq!(disks[0].logical_drives(), &["C:".to_string(), "C:".to_string()]);
    }

    #[test]
    fn test_unprobeable_disks_are_skipped() {
        let gone = "\\\\?\\scsi#disk&ven_gone#0000#{53f56307-b6bf-11d0-94f2-00a0c91efb8b}";
        let storage = workstation()
            .with_interface(
                DeviceClass::Disk,
                "\\\\?\\root#ramdisk#0000#{53f56307-b6bf-11d0-94f2-00a0c91efb8b}",
                None,
                FakeDevice::ram_disk(),
            )
            .with_disk(gone, None, 5)
            .without_device(gone);
        let topology = DiskTopology::new(storage, PrivilegeLevel::Standard);

        let numbers: Vec<_> = enumerate(&topology).iter().map(|d| d.device_number()).collect();

        assert_eq!(numbers, vec![0, 1]);
        assert_eq!(topology.backend().open_handles(), 0);
    }

    #[test]
    fn test_lookup_of_unprobeable_disk() {
        let storage = workstation().with_device("\\\\.\\PhysicalDrive3", FakeDevice::ram_disk());
        let topology = DiskTopology::new(storage, PrivilegeLevel::Standard);

        assert!(matches!(
            topology.physical_disk_by_number(3),
            Err(DiskError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_device_numbers_skipped() {
        let storage = workstation().with_disk(
            "\\\\?\\scsi#disk&ven_alias#0000#{53f56307-b6bf-11d0-94f2-00a0c91efb8b}",
            None,
            0,
        );
        let topology = DiskTopology::new(storage, PrivilegeLevel::Standard);

        let disks = enumerate(&topology);

        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].device_path(), DISK_0);
    }

    #[test]
    fn test_early_termination_releases_handles() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Elevated);

        let mut disks = topology.physical_disks(default_drive_types()).unwrap();
        let first = disks.next().unwrap();
        assert_eq!(topology.backend().open_handles(), 0);
        drop(disks);

        assert_eq!(first.device_number(), 0);
        assert_eq!(topology.backend().open_handles(), 0);
    }

    #[test]
    fn test_into_physical_disks() {
        let topology = DiskTopology::new(workstation(), PrivilegeLevel::Standard);

        let disks: Vec<_> = topology
            .into_physical_disks(default_drive_types())
            .unwrap()
            .collect();

        assert_eq!(disks.len(), 2);
    }

    #[test]
    fn test_blocked_device_enumeration_fails_every_query() {
        let topology = DiskTopology::new(
            workstation().block_devices(DeviceClass::Disk),
            PrivilegeLevel::Standard,
        );

        assert!(matches!(
            topology.physical_disks(default_drive_types()),
            Err(DiskError::AccessDenied(_))
        ));
        assert!(matches!(
            topology.physical_disk_by_number(0),
            Err(DiskError::AccessDenied(_))
        ));
        assert!(matches!(
            topology.physical_disk_by_path("C:\\"),
            Err(DiskError::AccessDenied(_))
        ));

        // Optical lookups use the other device class.
        assert!(topology.physical_disk_by_path("D:").is_ok());
    }

    #[test]
    fn test_blocked_volume_or_drive_enumeration_fails() {
        for storage in [workstation().block_volumes(), workstation().block_logical_drives()] {
            let topology = DiskTopology::new(storage, PrivilegeLevel::Standard);

            assert!(matches!(
                topology.physical_disks(default_drive_types()),
                Err(DiskError::AccessDenied(_))
            ));
            assert!(matches!(
                topology.physical_disk_by_number(0),
                Err(DiskError::AccessDenied(_))
            ));
            assert_eq!(topology.backend().open_handles(), 0);
        }
    }

    #[test]
    fn test_lookup_records_dos_device_name() {
        let storage = workstation()
            .with_dos_device("C:", "\\Device\\HarddiskVolume3")
            .with_dos_device("Volume{6e4b2ac1-0000-0000-0000-200000000000}", "\\Device\\HarddiskVolume3");
        let topology = DiskTopology::new(storage, PrivilegeLevel::Standard);

        let by_drive = topology.physical_disk_by_path("c:\\").unwrap();
        let by_volume = topology.physical_disk_by_path(VOLUME_C).unwrap();
        let by_number = topology.physical_disk_by_number(0).unwrap();

        assert_eq!(by_drive.dos_device_name(), Some("\\Device\\HarddiskVolume3"));
        assert_eq!(by_volume.dos_device_name(), Some("\\Device\\HarddiskVolume3"));
        assert_eq!(by_number.dos_device_name(), None);
        assert_eq!(topology.physical_disk_by_path("E:").unwrap().dos_device_name(), None);
        assert_eq!(by_drive, by_number);
        assert!(enumerate(&topology).iter().all(|disk| disk.dos_device_name().is_none()));
    }
}
