//! In-memory storage backend for tests.
//!
//! Devices answer with the same binary buffers the OS returns, built with
//! `layout::encode`, so tests run the real decoding path. Every handle is
//! counted to check that none outlives its query.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::{AccessLevel, DeviceHandle, StorageBackend, StorageQuery};
use crate::layout::encode;
use crate::{DeviceClass, DeviceRecord, DiskError, Result, FILE_DEVICE_CD_ROM, FILE_DEVICE_DISK};

pub(crate) const DISK_0: &str =
    "\\\\?\\scsi#disk&ven_nvme&prod_samsung_ssd_970#4&1&0&000000#{53f56307-b6bf-11d0-94f2-00a0c91efb8b}";
pub(crate) const DISK_1: &str =
    "\\\\?\\usbstor#disk&ven_sandisk&prod_ultra#4c530001#{53f56307-b6bf-11d0-94f2-00a0c91efb8b}";
pub(crate) const CDROM_0: &str =
    "\\\\?\\scsi#cdrom&ven_hl-dt-st&prod_dvdram#5&2&0&010000#{53f56308-b6bf-11d0-94f2-00a0c91efb8b}";

pub(crate) const DRIVE_REMOVABLE: u32 = 2;
pub(crate) const DRIVE_FIXED: u32 = 3;
pub(crate) const DRIVE_CDROM: u32 = 5;

/// Answers served by one device path.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeDevice {
    device_number: Option<Vec<u8>>,
    adapter: Option<Vec<u8>>,
    layout: Option<Vec<u8>>,
    deny_read: bool,
}

impl FakeDevice {
    /// A GPT disk on an NVMe adapter with partitions 1 and 2.
    pub(crate) fn disk(device_number: u32) -> Self {
        let mut disk_id = [0u8; 16];
        disk_id[0..4].copy_from_slice(&(0xA000_0000 | device_number).to_le_bytes());

        FakeDevice {
            device_number: Some(encode::device_number(FILE_DEVICE_DISK, device_number, -1)),
            adapter: Some(encode::adapter_descriptor(0x11, 0x20000)),
            layout: Some(encode::drive_layout(
                1,
                disk_id,
                &[(1, 17_408, 16_759_808), (2, 16_777_216, 511_000_000_000)],
            )),
            deny_read: false,
        }
    }

    /// A volume or drive letter living on `partition_number` of a disk.
    pub(crate) fn partition(device_number: u32, partition_number: i32) -> Self {
        FakeDevice {
            device_number: Some(encode::device_number(
                FILE_DEVICE_DISK,
                device_number,
                partition_number,
            )),
            ..Default::default()
        }
    }

    /// An optical drive, or a volume/drive letter on one.
    pub(crate) fn cdrom(device_number: u32) -> Self {
        FakeDevice {
            device_number: Some(encode::device_number(FILE_DEVICE_CD_ROM, device_number, -1)),
            adapter: Some(encode::adapter_descriptor(0x0B, 0x10000)),
            ..Default::default()
        }
    }

    /// A device that does not answer `IOCTL_STORAGE_GET_DEVICE_NUMBER`.
    pub(crate) fn ram_disk() -> Self {
        FakeDevice::default()
    }

    pub(crate) fn deny_read(mut self) -> Self {
        self.deny_read = true;
        self
    }

    pub(crate) fn without_adapter(mut self) -> Self {
        self.adapter = None;
        self
    }

    pub(crate) fn without_layout(mut self) -> Self {
        self.layout = None;
        self
    }
}

pub(crate) struct FakeHandle {
    device: FakeDevice,
    open_handles: Rc<Cell<usize>>,
}

impl DeviceHandle for FakeHandle {
    fn query(&self, query: StorageQuery) -> Result<Vec<u8>> {
        let answer = match query {
            StorageQuery::DeviceNumber => &self.device.device_number,
            StorageQuery::AdapterDescriptor => &self.device.adapter,
            StorageQuery::DriveLayout => &self.device.layout,
        };

        answer
            .clone()
            .ok_or_else(|| DiskError::Unsupported(format!("{:?} not supported", query)))
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.open_handles.set(self.open_handles.get() - 1);
    }
}

struct FakeVolume {
    volume_id: String,
    mount_points: Vec<String>,
}

struct FakeDrive {
    root: String,
    drive_type: u32,
    ready: bool,
}

#[derive(Default)]
pub(crate) struct FakeStorage {
    devices: Vec<DeviceRecord>,
    nodes: HashMap<String, FakeDevice>,
    volumes: Vec<FakeVolume>,
    drives: Vec<FakeDrive>,
    dos_devices: HashMap<String, String>,
    blocked_classes: Vec<DeviceClass>,
    block_volumes: bool,
    block_drives: bool,
    open_handles: Rc<Cell<usize>>,
    total_opens: Cell<usize>,
}

impl FakeStorage {
    pub(crate) fn new() -> Self {
        FakeStorage::default()
    }

    /// Registers a path that can be opened, without listing it anywhere.
    pub(crate) fn with_device(mut self, path: &str, device: FakeDevice) -> Self {
        self.nodes.insert(path.to_string(), device);
        self
    }

    /// Lists a device interface of `class` and registers its answers.
    pub(crate) fn with_interface(
        mut self,
        class: DeviceClass,
        path: &str,
        description: Option<&str>,
        device: FakeDevice,
    ) -> Self {
        self.devices.push(DeviceRecord::new(
            path.to_string(),
            class,
            description.map(String::from),
        ));
        self.with_device(path, device)
    }

    /// Makes a registered path fail to open, as if the device was removed.
    pub(crate) fn without_device(mut self, path: &str) -> Self {
        self.nodes.remove(path);
        self
    }

    /// Lists a disk interface answering as `FakeDevice::disk(device_number)`.
    pub(crate) fn with_disk(self, path: &str, description: Option<&str>, device_number: u32) -> Self {
        self.with_interface(DeviceClass::Disk, path, description, FakeDevice::disk(device_number))
    }

    /// Lists a volume mounted at `mount_points` and living on `device`.
    pub(crate) fn with_volume_device(
        mut self,
        volume_id: &str,
        device: FakeDevice,
        mount_points: &[&str],
    ) -> Self {
        self.volumes.push(FakeVolume {
            volume_id: volume_id.to_string(),
            mount_points: mount_points.iter().map(|m| m.to_string()).collect(),
        });
        self.with_device(volume_id.trim_end_matches('\\'), device)
    }

    pub(crate) fn with_volume(
        self,
        volume_id: &str,
        device_number: u32,
        partition_number: i32,
        mount_points: &[&str],
    ) -> Self {
        self.with_volume_device(
            volume_id,
            FakeDevice::partition(device_number, partition_number),
            mount_points,
        )
    }

    /// Lists a logical drive root (`C:\`) and registers `\\.\C:`.
    pub(crate) fn with_drive_device(mut self, root: &str, drive_type: u32, device: FakeDevice) -> Self {
        self.drives.push(FakeDrive {
            root: root.to_string(),
            drive_type,
            ready: true,
        });
        let open_path = format!("\\\\.\\{}", root.trim_end_matches('\\'));
        self.with_device(&open_path, device)
    }

    pub(crate) fn with_drive(
        self,
        root: &str,
        drive_type: u32,
        device_number: u32,
        partition_number: i32,
    ) -> Self {
        self.with_drive_device(
            root,
            drive_type,
            FakeDevice::partition(device_number, partition_number),
        )
    }

    /// Marks a listed drive as having no media.
    pub(crate) fn not_ready(mut self, root: &str) -> Self {
        for drive in self.drives.iter_mut().filter(|d| d.root == root) {
            drive.ready = false;
        }
        self
    }

    /// Maps an MS-DOS device name (`C:`, `Volume{...}`) to its target.
    pub(crate) fn with_dos_device(mut self, name: &str, target: &str) -> Self {
        self.dos_devices.insert(name.to_string(), target.to_string());
        self
    }

    /// Makes device interface enumeration of `class` fail with
    /// `AccessDenied`.
    pub(crate) fn block_devices(mut self, class: DeviceClass) -> Self {
        self.blocked_classes.push(class);
        self
    }

    /// Makes volume enumeration fail with `AccessDenied`.
    pub(crate) fn block_volumes(mut self) -> Self {
        self.block_volumes = true;
        self
    }

    /// Makes logical drive enumeration fail with `AccessDenied`.
    pub(crate) fn block_logical_drives(mut self) -> Self {
        self.block_drives = true;
        self
    }

    pub(crate) fn open_handles(&self) -> usize {
        self.open_handles.get()
    }

    pub(crate) fn total_opens(&self) -> usize {
        self.total_opens.get()
    }
}

impl StorageBackend for FakeStorage {
    type Handle = FakeHandle;

    fn devices(&self, class: DeviceClass) -> Result<Vec<DeviceRecord>> {
        if self.blocked_classes.contains(&class) {
            return Err(DiskError::AccessDenied(format!("{:?} device enumeration blocked", class)));
        }
        Ok(self
            .devices
            .iter()
            .filter(|record| record.class() == class)
            .cloned()
            .collect())
    }

    fn volumes(&self) -> Result<Vec<String>> {
        if self.block_volumes {
            return Err(DiskError::AccessDenied(String::from("volume enumeration blocked")));
        }
        Ok(self.volumes.iter().map(|v| v.volume_id.clone()).collect())
    }

    fn volume_path_names(&self, volume_id: &str) -> Result<Vec<String>> {
        self.volumes
            .iter()
            .find(|v| v.volume_id == volume_id)
            .map(|v| v.mount_points.clone())
            .ok_or_else(|| DiskError::NotFound(volume_id.to_string()))
    }

    fn logical_drives(&self) -> Result<Vec<String>> {
        if self.block_drives {
            return Err(DiskError::AccessDenied(String::from("drive enumeration blocked")));
        }
        Ok(self.drives.iter().map(|d| d.root.clone()).collect())
    }

    fn drive_type(&self, root: &str) -> u32 {
        self.drives
            .iter()
            .find(|d| d.root == root)
            .map(|d| d.drive_type)
            .unwrap_or(1)
    }

    fn is_drive_ready(&self, root: &str) -> bool {
        self.drives.iter().any(|d| d.root == root && d.ready)
    }

    fn query_dos_device(&self, name: &str) -> Option<String> {
        self.dos_devices.get(name).cloned()
    }

    fn open(&self, path: &str, access: AccessLevel) -> Result<FakeHandle> {
        let device = self
            .nodes
            .get(path)
            .ok_or_else(|| DiskError::NotFound(path.to_string()))?;

        if access == AccessLevel::Read && device.deny_read {
            return Err(DiskError::AccessDenied(path.to_string()));
        }

        self.open_handles.set(self.open_handles.get() + 1);
        self.total_opens.set(self.total_opens.get() + 1);
        Ok(FakeHandle {
            device: device.clone(),
            open_handles: Rc::clone(&self.open_handles),
        })
    }
}
