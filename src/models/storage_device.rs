//! This module provides the device/partition identity used as the
//! correlation key between disks, volumes and logical drives.

/// `FILE_DEVICE_*` codes reported in `STORAGE_DEVICE_NUMBER.DeviceType`.
pub(crate) const FILE_DEVICE_CD_ROM: u32 = 0x02;
pub(crate) const FILE_DEVICE_DISK: u32 = 0x07;
pub(crate) const FILE_DEVICE_VIRTUAL_DISK: u32 = 0x24;
pub(crate) const FILE_DEVICE_MASS_STORAGE: u32 = 0x2d;
pub(crate) const FILE_DEVICE_DVD: u32 = 0x33;

/// Kind of device behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageDeviceType {
    Disk,
    CdRom,
    Dvd,
    VirtualDisk,
    MassStorage,
    /// Unrecognized `FILE_DEVICE_*` value
    Other(u32),
}

impl From<u32> for StorageDeviceType {
    fn from(value: u32) -> Self {
        match value {
            FILE_DEVICE_DISK => Self::Disk,
            FILE_DEVICE_CD_ROM => Self::CdRom,
            FILE_DEVICE_DVD => Self::Dvd,
            FILE_DEVICE_VIRTUAL_DISK => Self::VirtualDisk,
            FILE_DEVICE_MASS_STORAGE => Self::MassStorage,
            other => Self::Other(other),
        }
    }
}

impl StorageDeviceType {
    /// Returns true for optical media, whose device numbers are counted
    /// separately from disk device numbers.
    pub fn is_optical(&self) -> bool {
        matches!(self, Self::CdRom | Self::Dvd)
    }
}

/// Device number, partition number and device type of a disk, volume or
/// logical drive.
///
/// `partition_number` is `-1` when the handle refers to the whole device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageDeviceIdentity {
    device_number: u32,
    partition_number: i32,
    device_type: StorageDeviceType,
}

impl StorageDeviceIdentity {
    /// Creates a new identity.
    ///
    /// # Examples
    ///
    /// ```
    /// use win_physical_disk::{StorageDeviceIdentity, StorageDeviceType};
    ///
    /// let identity = StorageDeviceIdentity::new(0, 1, StorageDeviceType::Disk);
    /// assert_eq!(identity.device_number(), 0);
    /// assert!(!identity.is_whole_device());
    /// ```
    pub fn new(device_number: u32, partition_number: i32, device_type: StorageDeviceType) -> Self {
        StorageDeviceIdentity {
            device_number,
            partition_number,
            device_type,
        }
    }

    /// Returns the OS-assigned device number.
    pub fn device_number(&self) -> u32 {
        self.device_number
    }

    /// Returns the partition number, or `-1` for the whole device.
    pub fn partition_number(&self) -> i32 {
        self.partition_number
    }

    /// Returns the device type.
    pub fn device_type(&self) -> StorageDeviceType {
        self.device_type
    }

    /// Returns true when this identity refers to the whole device.
    pub fn is_whole_device(&self) -> bool {
        self.partition_number == -1
    }

    /// Returns the same device with the partition number cleared.
    pub fn whole_device(&self) -> Self {
        StorageDeviceIdentity {
            partition_number: -1,
            ..*self
        }
    }

    /// Returns true when `other` lives on the same physical device.
    ///
    /// Optical and disk device numbers are separate namespaces, so the media
    /// class has to agree as well as the number.
    pub fn same_device(&self, other: &StorageDeviceIdentity) -> bool {
        self.device_number == other.device_number
            && self.device_type.is_optical() == other.device_type.is_optical()
    }

    /// Returns true when `other` is the same partition of the same device.
    pub fn same_partition(&self, other: &StorageDeviceIdentity) -> bool {
        self.same_device(other) && self.partition_number == other.partition_number
    }
}
