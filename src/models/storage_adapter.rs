//! This module provides structures describing the storage adapter (the
//! controller and bus) a physical disk is attached through.

/// Storage bus a disk is attached through (`STORAGE_BUS_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BusType {
    #[default]
    Unknown,
    Scsi,
    Atapi,
    Ata,
    Ieee1394,
    Ssa,
    Fibre,
    Usb,
    Raid,
    IScsi,
    Sas,
    Sata,
    Sd,
    Mmc,
    Virtual,
    FileBackedVirtual,
    Spaces,
    Nvme,
    Scm,
    Ufs,
    /// Bus type value newer than this crate
    Other(u8),
}

impl From<u8> for BusType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Unknown,
            0x01 => Self::Scsi,
            0x02 => Self::Atapi,
            0x03 => Self::Ata,
            0x04 => Self::Ieee1394,
            0x05 => Self::Ssa,
            0x06 => Self::Fibre,
            0x07 => Self::Usb,
            0x08 => Self::Raid,
            0x09 => Self::IScsi,
            0x0A => Self::Sas,
            0x0B => Self::Sata,
            0x0C => Self::Sd,
            0x0D => Self::Mmc,
            0x0E => Self::Virtual,
            0x0F => Self::FileBackedVirtual,
            0x10 => Self::Spaces,
            0x11 => Self::Nvme,
            0x12 => Self::Scm,
            0x13 => Self::Ufs,
            other => Self::Other(other),
        }
    }
}

/// Adapter descriptor of a physical disk.
///
/// Every field read from the adapter descriptor is optional: without an
/// elevated process the descriptor is not queried and the value returned by
/// [`StorageAdapterInfo::unknown`] is used instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageAdapterInfo {
    device_number: u32,
    device_path: String,
    description: Option<String>,
    bus_type: BusType,
    bus_version: Option<(u16, u16)>,
    alignment_mask: Option<u32>,
    maximum_transfer_length: Option<u32>,
    maximum_physical_pages: Option<u32>,
    adapter_uses_pio: Option<bool>,
    command_queueing: Option<bool>,
}

/// Fields decoded from `STORAGE_ADAPTER_DESCRIPTOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AdapterDescriptor {
    pub maximum_transfer_length: u32,
    pub maximum_physical_pages: u32,
    pub alignment_mask: u32,
    pub adapter_uses_pio: bool,
    pub command_queueing: bool,
    pub bus_type: BusType,
    pub bus_major_version: u16,
    pub bus_minor_version: u16,
}

impl StorageAdapterInfo {
    /// Creates the sentinel used when the adapter descriptor is not
    /// available: bus type `Unknown` and no limits.
    pub fn unknown(device_number: u32, device_path: String, description: Option<String>) -> Self {
        StorageAdapterInfo {
            device_number,
            device_path,
            description,
            ..Default::default()
        }
    }

    pub(crate) fn from_descriptor(
        device_number: u32,
        device_path: String,
        description: Option<String>,
        descriptor: AdapterDescriptor,
    ) -> Self {
        StorageAdapterInfo {
            device_number,
            device_path,
            description,
            bus_type: descriptor.bus_type,
            bus_version: Some((descriptor.bus_major_version, descriptor.bus_minor_version)),
            alignment_mask: Some(descriptor.alignment_mask),
            maximum_transfer_length: Some(descriptor.maximum_transfer_length),
            maximum_physical_pages: Some(descriptor.maximum_physical_pages),
            adapter_uses_pio: Some(descriptor.adapter_uses_pio),
            command_queueing: Some(descriptor.command_queueing),
        }
    }

    /// Returns the device number of the disk behind the adapter.
    pub fn device_number(&self) -> u32 {
        self.device_number
    }

    /// Returns the path the adapter was queried through.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Returns the bus-reported description (friendly name) of the disk.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the bus type.
    pub fn bus_type(&self) -> BusType {
        self.bus_type
    }

    /// Returns the (major, minor) bus version.
    pub fn bus_version(&self) -> Option<(u16, u16)> {
        self.bus_version
    }

    /// Returns the buffer alignment mask required by the adapter.
    pub fn alignment_mask(&self) -> Option<u32> {
        self.alignment_mask
    }

    /// Returns the largest single transfer in bytes.
    pub fn maximum_transfer_length(&self) -> Option<u32> {
        self.maximum_transfer_length
    }

    /// Returns the maximum number of discontinuous physical pages per transfer.
    pub fn maximum_physical_pages(&self) -> Option<u32> {
        self.maximum_physical_pages
    }

    /// Returns whether the adapter uses programmed I/O.
    pub fn adapter_uses_pio(&self) -> Option<bool> {
        self.adapter_uses_pio
    }

    /// Returns whether the adapter supports command queueing.
    pub fn command_queueing(&self) -> Option<bool> {
        self.command_queueing
    }

    /// Returns true when this is the reduced-privilege sentinel.
    pub fn is_unknown(&self) -> bool {
        self.bus_type == BusType::Unknown && self.bus_version.is_none()
    }
}
