//! The operating system services the correlation engine is built on.
//!
//! `StorageBackend` is implemented by `WindowsStorage` on Windows and by an
//! in-memory fake in tests. Implementations only forward OS calls: decoding,
//! privilege handling and correlation live in the rest of the crate.

use crate::{DeviceClass, DeviceRecord, Result};

/// Access requested when opening a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    /// Read access, needed for the adapter descriptor. Requires elevation
    /// for physical disks.
    Read,
    /// Query-only access (`FILE_ANY_ACCESS`): enough for device numbers and
    /// partition layouts.
    QueryOnly,
}

/// Privilege level of the calling process.
///
/// Passed explicitly to every probe instead of being read from the process
/// inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivilegeLevel {
    Elevated,
    Standard,
}

impl PrivilegeLevel {
    /// Returns the access level a device is opened with at this privilege.
    pub fn access(&self) -> AccessLevel {
        match self {
            PrivilegeLevel::Elevated => AccessLevel::Read,
            PrivilegeLevel::Standard => AccessLevel::QueryOnly,
        }
    }
}

/// Fixed-layout queries issued against an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageQuery {
    /// `IOCTL_STORAGE_GET_DEVICE_NUMBER`
    DeviceNumber,
    /// `IOCTL_STORAGE_QUERY_PROPERTY` for `StorageAdapterProperty`
    AdapterDescriptor,
    /// `IOCTL_DISK_GET_DRIVE_LAYOUT_EX`
    DriveLayout,
}

/// An open device. Dropping the value closes the OS handle.
pub trait DeviceHandle {
    /// Issues `query` and returns the raw output buffer.
    fn query(&self, query: StorageQuery) -> Result<Vec<u8>>;
}

/// Device, volume and logical-drive enumeration plus device I/O.
pub trait StorageBackend {
    type Handle: DeviceHandle;

    /// Lists the present device interfaces of `class`. An empty list is not
    /// an error.
    fn devices(&self, class: DeviceClass) -> Result<Vec<DeviceRecord>>;

    /// Lists volume identifiers (`\\?\Volume{...}\`).
    fn volumes(&self) -> Result<Vec<String>>;

    /// Lists the mount points of a volume (`C:\`, `D:\mnt\data\`).
    fn volume_path_names(&self, volume_id: &str) -> Result<Vec<String>>;

    /// Lists logical drive roots (`C:\`).
    fn logical_drives(&self) -> Result<Vec<String>>;

    /// Returns the raw `DRIVE_*` classification of a drive root.
    fn drive_type(&self, root: &str) -> u32;

    /// Returns true when the drive has media and a readable file system.
    fn is_drive_ready(&self, root: &str) -> bool;

    /// Returns the first target of an MS-DOS device name (`C:`,
    /// `Volume{...}`), such as `\Device\HarddiskVolume3`.
    fn query_dos_device(&self, name: &str) -> Option<String>;

    /// Opens a device, volume or drive path.
    fn open(&self, path: &str, access: AccessLevel) -> Result<Self::Handle>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for &B {
    type Handle = B::Handle;

    fn devices(&self, class: DeviceClass) -> Result<Vec<DeviceRecord>> {
        (**self).devices(class)
    }

    fn volumes(&self) -> Result<Vec<String>> {
        (**self).volumes()
    }

    fn volume_path_names(&self, volume_id: &str) -> Result<Vec<String>> {
        (**self).volume_path_names(volume_id)
    }

    fn logical_drives(&self) -> Result<Vec<String>> {
        (**self).logical_drives()
    }

    fn drive_type(&self, root: &str) -> u32 {
        (**self).drive_type(root)
    }

    fn is_drive_ready(&self, root: &str) -> bool {
        (**self).is_drive_ready(root)
    }

    fn query_dos_device(&self, name: &str) -> Option<String> {
        (**self).query_dos_device(name)
    }

    fn open(&self, path: &str, access: AccessLevel) -> Result<Self::Handle> {
        (**self).open(path, access)
    }
}
