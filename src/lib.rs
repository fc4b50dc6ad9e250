mod backend;
mod correlation;
mod device_path;
mod enumerators;
#[cfg(test)]
mod fake;
mod layout;
mod models;
mod probe;
#[cfg(windows)]
mod windows_storage;

pub use backend::{AccessLevel, DeviceHandle, PrivilegeLevel, StorageBackend, StorageQuery};
pub use correlation::{DiskTopology, PhysicalDisks};
pub use device_path::{classify, DevicePathKind};
pub use enumerators::{DeviceEnumerator, LogicalDriveEnumerator, VolumeEnumerator};
pub use models::*;
pub(crate) use models::{AdapterDescriptor, PhysicalDiskBuilder};
#[cfg(test)]
pub(crate) use models::{FILE_DEVICE_CD_ROM, FILE_DEVICE_DISK};
pub use probe::{ScopedDevice, StorageInfoProbe};
#[cfg(windows)]
pub use windows_storage::*;
