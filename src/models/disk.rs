//! This module provides the aggregate returned to callers for each physical
//! disk.
//!
//! A `PhysicalDiskInfo` joins what the OS reports about a disk device with
//! the volumes and logical drives that live on it. Aggregates are assembled
//! by `PhysicalDiskBuilder` and are immutable once handed out.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::device_path::{self, DevicePathKind};
use crate::{StorageAdapterInfo, StorageDeviceIdentity, StoragePartitionInfo};

/// Represents a physical disk with its volumes and logical drives.
///
/// Two values compare equal when their device path, adapter, device identity
/// and partition table are equal. The partition, volume and drive sequences
/// are not part of equality: the same disk reached by device number and by
/// full enumeration compares equal whatever order its volumes were observed in.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalDiskInfo {
    /// Device interface path (e.g. "\\\\?\\scsi#disk&ven_...#{53f56307-...}")
    device_path: String,
    /// Device number, partition number (always -1) and device type
    identity: StorageDeviceIdentity,
    /// Adapter descriptor, "unknown" without elevation
    adapter: StorageAdapterInfo,
    /// Partition table, absent when the disk reports none
    partition_info: Option<StoragePartitionInfo>,
    /// Partition number of each correlated volume
    partition_indexes: Box<[i32]>,
    /// Volume identifier of each correlated volume
    volume_guids: Box<[String]>,
    /// Drive letters of the correlated volumes that have one
    logical_drives: Box<[String]>,
    /// Target of the drive or volume the disk was looked up by
    /// (e.g. "\\Device\\HarddiskVolume3")
    dos_device_name: Option<String>,
}

impl PhysicalDiskInfo {
    /// Returns the OS-assigned device number.
    pub fn device_number(&self) -> u32 {
        self.identity.device_number()
    }

    /// Returns the device interface path.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Returns the friendly name reported by the bus, if any.
    pub fn name(&self) -> Option<&str> {
        self.adapter.description()
    }

    /// Returns the device identity of the whole disk.
    pub fn storage_device_info(&self) -> &StorageDeviceIdentity {
        &self.identity
    }

    /// Returns the adapter descriptor.
    pub fn storage_adapter_info(&self) -> &StorageAdapterInfo {
        &self.adapter
    }

    /// Returns the partition table, if the disk has one.
    pub fn storage_partition_info(&self) -> Option<&StoragePartitionInfo> {
        self.partition_info.as_ref()
    }

    /// Returns the partition number of every correlated volume, in volume
    /// enumeration order.
    pub fn partition_indexes(&self) -> &[i32] {
        &self.partition_indexes
    }

    /// Returns the identifier of every correlated volume, pairwise with
    /// [`partition_indexes`](Self::partition_indexes).
    pub fn volume_guids(&self) -> &[String] {
        &self.volume_guids
    }

    /// Returns the drive letters (`C:`) of the correlated volumes.
    pub fn logical_drives(&self) -> &[String] {
        &self.logical_drives
    }

    /// Returns the MS-DOS device target of the drive or volume this disk
    /// was looked up by. `None` for enumerated disks and lookups by disk
    /// or device path. Not part of equality.
    pub fn dos_device_name(&self) -> Option<&str> {
        self.dos_device_name.as_deref()
    }

    /// Returns true when `path` names one of this disk's logical drives or
    /// volumes.
    ///
    /// Accepts `C`, `C:`, `C:\` and volume identifiers with or without the
    /// trailing separator; the comparison ignores case.
    pub fn contains_volume(&self, path: &str) -> bool {
        match device_path::classify(path) {
            Ok(DevicePathKind::Drive(letter)) => {
                let drive = format!("{}:", letter);
                self.logical_drives
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(&drive))
            }
            Ok(DevicePathKind::Volume(volume)) => self.volume_guids.iter().any(|candidate| {
                candidate
                    .trim_end_matches('\\')
                    .eq_ignore_ascii_case(volume.trim_end_matches('\\'))
            }),
            _ => false,
        }
    }
}

impl PartialEq for PhysicalDiskInfo {
    fn eq(&self, other: &Self) -> bool {
        self.device_path == other.device_path
            && self.adapter == other.adapter
            && self.identity == other.identity
            && self.partition_info == other.partition_info
    }
}

impl Eq for PhysicalDiskInfo {}

impl Hash for PhysicalDiskInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.device_path.hash(state);
        self.adapter.hash(state);
        self.identity.hash(state);
        self.partition_info.hash(state);
    }
}

/// Shows the friendly name of the disk, or its device path when the bus
/// reported none.
impl fmt::Display for PhysicalDiskInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name().unwrap_or(&self.device_path))
    }
}

/// Accumulates the volumes and logical drives of one disk during
/// correlation.
///
/// The builder's sequences are only reachable through
/// [`PhysicalDiskBuilder::build`], which freezes them into the aggregate.
#[derive(Debug)]
pub(crate) struct PhysicalDiskBuilder {
    device_path: String,
    identity: StorageDeviceIdentity,
    adapter: StorageAdapterInfo,
    partition_info: Option<StoragePartitionInfo>,
    partition_indexes: Vec<i32>,
    volume_guids: Vec<String>,
    logical_drives: Vec<String>,
    dos_device_name: Option<String>,
}

impl PhysicalDiskBuilder {
    pub(crate) fn new(
        device_path: String,
        identity: StorageDeviceIdentity,
        adapter: StorageAdapterInfo,
        partition_info: Option<StoragePartitionInfo>,
    ) -> Self {
        PhysicalDiskBuilder {
            device_path,
            identity: identity.whole_device(),
            adapter,
            partition_info,
            partition_indexes: Vec::new(),
            volume_guids: Vec::new(),
            logical_drives: Vec::new(),
            dos_device_name: None,
        }
    }

    pub(crate) fn identity(&self) -> &StorageDeviceIdentity {
        &self.identity
    }

    /// Adds a volume. Partition number and volume id are always pushed
    /// together.
    pub(crate) fn add_volume(&mut self, partition_number: i32, volume_id: &str) {
        self.partition_indexes.push(partition_number);
        self.volume_guids.push(volume_id.to_string());
    }

    /// Adds a logical drive, dropping any trailing separator.
    pub(crate) fn add_logical_drive(&mut self, drive: &str) {
        let drive = drive.trim_end_matches('\\');
        self.logical_drives.push(drive.to_string());
    }

    pub(crate) fn dos_device_name(&mut self, dos_device_name: Option<String>) {
        self.dos_device_name = dos_device_name;
    }

    pub(crate) fn build(self) -> PhysicalDiskInfo {
        PhysicalDiskInfo {
            device_path: self.device_path,
            identity: self.identity,
            adapter: self.adapter,
            partition_info: self.partition_info,
            partition_indexes: self.partition_indexes.into_boxed_slice(),
            volume_guids: self.volume_guids.into_boxed_slice(),
            logical_drives: self.logical_drives.into_boxed_slice(),
            dos_device_name: self.dos_device_name,
        }
    }
}
