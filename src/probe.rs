//! Per-device storage queries.
//!
//! `StorageInfoProbe` opens a device for the shortest possible time and asks
//! it for its identity, adapter descriptor and partition table. Each query is
//! independent: one failing never prevents the others.

use tracing::{debug, trace};

use crate::backend::{AccessLevel, DeviceHandle, PrivilegeLevel, StorageBackend, StorageQuery};
use crate::layout::{decode_adapter_descriptor, decode_device_number, decode_drive_layout};
use crate::{
    DeviceRecord, DiskError, PhysicalDiskBuilder, Result, StorageAdapterInfo,
    StorageDeviceIdentity, StoragePartitionInfo,
};

/// An open device. The OS handle is released when the value is dropped.
pub struct ScopedDevice<H: DeviceHandle> {
    handle: H,
    access: AccessLevel,
    path: String,
}

impl<H: DeviceHandle> ScopedDevice<H> {
    /// Returns the path the device was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the access level actually granted.
    pub fn access(&self) -> AccessLevel {
        self.access
    }

    fn query(&self, query: StorageQuery) -> Result<Vec<u8>> {
        self.handle.query(query)
    }
}

/// Issues storage queries at a fixed privilege level.
#[derive(Debug, Clone, Copy)]
pub struct StorageInfoProbe {
    privilege: PrivilegeLevel,
}

impl StorageInfoProbe {
    pub fn new(privilege: PrivilegeLevel) -> Self {
        StorageInfoProbe { privilege }
    }

    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    /// Opens `path` with the access level the privilege allows.
    ///
    /// A read open refused with `AccessDenied` is retried query-only, so a
    /// process that is elevated but still denied read access degrades
    /// instead of failing.
    pub fn open_scoped<B: StorageBackend>(
        &self,
        backend: &B,
        path: &str,
    ) -> Result<ScopedDevice<B::Handle>> {
        let requested = self.privilege.access();

        let (handle, access) = match backend.open(path, requested) {
            Ok(handle) => (handle, requested),
            Err(DiskError::AccessDenied(reason)) if requested == AccessLevel::Read => {
                debug!("read access to {} denied ({}), retrying query-only", path, reason);
                (backend.open(path, AccessLevel::QueryOnly)?, AccessLevel::QueryOnly)
            }
            Err(e) => return Err(e),
        };

        trace!("opened {} with {:?}", path, access);
        Ok(ScopedDevice {
            handle,
            access,
            path: path.to_string(),
        })
    }

    /// Returns the device and partition number behind the handle, or `None`
    /// when the device does not answer the query (RAM disks, some virtual
    /// devices).
    pub fn query_identity<H: DeviceHandle>(
        &self,
        device: &ScopedDevice<H>,
    ) -> Option<StorageDeviceIdentity> {
        match device
            .query(StorageQuery::DeviceNumber)
            .and_then(|buf| decode_device_number(&buf))
        {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!("no device number for {}: {}", device.path(), e);
                None
            }
        }
    }

    /// Returns the adapter descriptor, or the "unknown" sentinel when the
    /// device was opened query-only or the query fails.
    pub fn query_adapter<H: DeviceHandle>(
        &self,
        device: &ScopedDevice<H>,
        device_number: u32,
        path: &str,
        description: Option<&str>,
    ) -> StorageAdapterInfo {
        let description = description.map(String::from);

        if device.access() != AccessLevel::Read {
            trace!("adapter descriptor of {} skipped without read access", path);
            return StorageAdapterInfo::unknown(device_number, path.to_string(), description);
        }

        match device
            .query(StorageQuery::AdapterDescriptor)
            .and_then(|buf| decode_adapter_descriptor(&buf))
        {
            Ok(descriptor) => StorageAdapterInfo::from_descriptor(
                device_number,
                path.to_string(),
                description,
                descriptor,
            ),
            Err(e) => {
                debug!("adapter descriptor of {} unavailable: {}", path, e);
                StorageAdapterInfo::unknown(device_number, path.to_string(), description)
            }
        }
    }

    /// Returns the partition table, or `None` when the device has none.
    pub fn query_partition_info<H: DeviceHandle>(
        &self,
        device: &ScopedDevice<H>,
        device_number: u32,
        path: &str,
    ) -> Option<StoragePartitionInfo> {
        match device
            .query(StorageQuery::DriveLayout)
            .and_then(|buf| decode_drive_layout(&buf, device_number))
        {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("no partition table for {}: {}", path, e);
                None
            }
        }
    }

    /// Opens `path` just long enough to read its identity.
    pub fn identify<B: StorageBackend>(&self, backend: &B, path: &str) -> Result<StorageDeviceIdentity> {
        let device = self.open_scoped(backend, path)?;
        self.query_identity(&device)
            .ok_or_else(|| DiskError::Unsupported(format!("{} has no device number", path)))
    }

    /// Resolves a disk device into the base of its aggregate: identity,
    /// adapter and partition table, all read through one handle that is
    /// closed before this returns.
    pub(crate) fn describe_disk<B: StorageBackend>(
        &self,
        backend: &B,
        record: &DeviceRecord,
    ) -> Result<PhysicalDiskBuilder> {
        let path = record.device_path();
        let device = self.open_scoped(backend, path)?;

        let identity = self
            .query_identity(&device)
            .ok_or_else(|| DiskError::Unsupported(format!("{} has no device number", path)))?;
        let device_number = identity.device_number();

        let adapter = self.query_adapter(&device, device_number, path, record.description());
        let partition_info = self.query_partition_info(&device, device_number, path);
        drop(device);

        Ok(PhysicalDiskBuilder::new(
            path.to_string(),
            identity,
            adapter,
            partition_info,
        ))
    }
}
