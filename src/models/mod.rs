mod device;
mod disk;
mod disk_error;
mod partition;
mod storage_adapter;
mod storage_device;
mod volume;

pub use device::{DeviceClass, DeviceRecord};
pub use disk::PhysicalDiskInfo;
pub(crate) use disk::PhysicalDiskBuilder;
pub use disk_error::{DiskError, Result};
pub use partition::{PartitionEntry, PartitionStyle, StoragePartitionInfo, TableIdentifier};
pub(crate) use storage_adapter::AdapterDescriptor;
pub use storage_adapter::{BusType, StorageAdapterInfo};
pub use storage_device::{StorageDeviceIdentity, StorageDeviceType};
#[cfg(test)]
pub(crate) use storage_device::{FILE_DEVICE_CD_ROM, FILE_DEVICE_DISK};
pub use volume::{default_drive_types, DriveType, DriveTypeFilter, LogicalDriveRecord, VolumeRecord};
