//! Mounted volumes and logical drives, each tagged with the identity of the
//! disk partition they live on.

use enumflags2::{bitflags, BitFlags};

use crate::StorageDeviceIdentity;

/// Classification of a logical drive, as reported by `GetDriveTypeW`.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DriveType {
    Unknown = 0b0000_0001,
    Removable = 0b0000_0010,
    Fixed = 0b0000_0100,
    Network = 0b0000_1000,
    CdRom = 0b0001_0000,
    Ram = 0b0010_0000,
}

impl DriveType {
    /// Maps a `DRIVE_*` code to a drive type. Codes the OS may add later,
    /// as well as `DRIVE_NO_ROOT_DIR`, map to `Unknown`.
    pub fn from_raw(value: u32) -> Self {
        match value {
            2 => Self::Removable,
            3 => Self::Fixed,
            4 => Self::Network,
            5 => Self::CdRom,
            6 => Self::Ram,
            _ => Self::Unknown,
        }
    }
}

/// Set of drive types a physical disk enumeration correlates with.
pub type DriveTypeFilter = BitFlags<DriveType>;

/// Returns the filter used when the caller does not pass one:
/// CD-ROM, fixed and removable drives.
pub fn default_drive_types() -> DriveTypeFilter {
    DriveType::CdRom | DriveType::Fixed | DriveType::Removable
}

/// A mounted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeRecord {
    volume_id: String,
    drive_letter: String,
    identity: StorageDeviceIdentity,
}

impl VolumeRecord {
    /// Creates a new volume record. `drive_letter` is empty for volumes not
    /// mounted to a letter.
    pub fn new(volume_id: String, drive_letter: String, identity: StorageDeviceIdentity) -> Self {
        VolumeRecord {
            volume_id,
            drive_letter,
            identity,
        }
    }

    /// Returns the volume identifier, e.g. `\\?\Volume{...}\`.
    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// Returns the display drive letter (`C:`), or an empty string.
    pub fn drive_letter(&self) -> &str {
        &self.drive_letter
    }

    /// Returns the device/partition the volume lives on.
    pub fn identity(&self) -> &StorageDeviceIdentity {
        &self.identity
    }
}

/// A drive-letter addressable mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct LogicalDriveRecord {
    drive_letter: String,
    drive_type: DriveType,
    identity: StorageDeviceIdentity,
}

impl LogicalDriveRecord {
    /// Creates a new logical drive record.
    pub fn new(drive_letter: String, drive_type: DriveType, identity: StorageDeviceIdentity) -> Self {
        LogicalDriveRecord {
            drive_letter,
            drive_type,
            identity,
        }
    }

    /// Returns the drive letter without trailing separator, e.g. `C:`.
    pub fn drive_letter(&self) -> &str {
        &self.drive_letter
    }

    /// Returns the drive type classification.
    pub fn drive_type(&self) -> DriveType {
        self.drive_type
    }

    /// Returns the device/partition the drive lives on.
    pub fn identity(&self) -> &StorageDeviceIdentity {
        &self.identity
    }
}
