//! Decoding of the fixed-layout buffers returned by storage queries.
//!
//! Offsets follow the Win32 structure definitions. All fields are little
//! endian; a buffer too short for the structure it should hold is reported as
//! `DiskError::Unsupported`.

use crate::{
    AdapterDescriptor, BusType, DiskError, PartitionEntry, PartitionStyle, Result,
    StorageDeviceIdentity, StorageDeviceType, StoragePartitionInfo, TableIdentifier,
};

/// `STORAGE_DEVICE_NUMBER`: DeviceType @0, DeviceNumber @4, PartitionNumber @8.
pub(crate) const DEVICE_NUMBER_SIZE: usize = 12;

/// `STORAGE_ADAPTER_DESCRIPTOR`, up to and including `BusMinorVersion`.
pub(crate) const ADAPTER_DESCRIPTOR_SIZE: usize = 30;
const ADAPTER_MAXIMUM_TRANSFER_LENGTH: usize = 8;
const ADAPTER_MAXIMUM_PHYSICAL_PAGES: usize = 12;
const ADAPTER_ALIGNMENT_MASK: usize = 16;
const ADAPTER_USES_PIO: usize = 20;
const ADAPTER_COMMAND_QUEUEING: usize = 22;
const ADAPTER_BUS_TYPE: usize = 24;
const ADAPTER_BUS_MAJOR_VERSION: usize = 26;
const ADAPTER_BUS_MINOR_VERSION: usize = 28;

/// `DRIVE_LAYOUT_INFORMATION_EX` header: style, count and the 40 byte
/// MBR/GPT union.
pub(crate) const DRIVE_LAYOUT_HEADER_SIZE: usize = 48;
const LAYOUT_TABLE_ID: usize = 8;

/// `PARTITION_INFORMATION_EX`.
pub(crate) const PARTITION_ENTRY_SIZE: usize = 144;
const ENTRY_STARTING_OFFSET: usize = 8;
const ENTRY_PARTITION_LENGTH: usize = 16;
const ENTRY_PARTITION_NUMBER: usize = 24;

fn field<const N: usize>(buf: &[u8], offset: usize, name: &str) -> Result<[u8; N]> {
    buf.get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            DiskError::Unsupported(format!(
                "buffer of {} bytes too short for {} at offset {}",
                buf.len(),
                name,
                offset
            ))
        })
}

fn ensure_len(buf: &[u8], len: usize, name: &str) -> Result<()> {
    if buf.len() < len {
        return Err(DiskError::Unsupported(format!(
            "{} needs {} bytes, got {}",
            name,
            len,
            buf.len()
        )));
    }
    Ok(())
}

fn read_u8(buf: &[u8], offset: usize, name: &str) -> Result<u8> {
    field::<1>(buf, offset, name).map(|[byte]| byte)
}

fn read_u16(buf: &[u8], offset: usize, name: &str) -> Result<u16> {
    field(buf, offset, name).map(u16::from_le_bytes)
}

fn read_u32(buf: &[u8], offset: usize, name: &str) -> Result<u32> {
    field(buf, offset, name).map(u32::from_le_bytes)
}

fn read_i64(buf: &[u8], offset: usize, name: &str) -> Result<i64> {
    field(buf, offset, name).map(i64::from_le_bytes)
}

/// Decodes `STORAGE_DEVICE_NUMBER`.
pub(crate) fn decode_device_number(buf: &[u8]) -> Result<StorageDeviceIdentity> {
    ensure_len(buf, DEVICE_NUMBER_SIZE, "STORAGE_DEVICE_NUMBER")?;

    let device_type = read_u32(buf, 0, "DeviceType")?;
    let device_number = read_u32(buf, 4, "DeviceNumber")?;
    // ULONG on the wire; 0xFFFFFFFF means "no partition".
    let partition_number = read_u32(buf, 8, "PartitionNumber")? as i32;

    Ok(StorageDeviceIdentity::new(
        device_number,
        partition_number,
        StorageDeviceType::from(device_type),
    ))
}

/// Decodes `STORAGE_ADAPTER_DESCRIPTOR`.
pub(crate) fn decode_adapter_descriptor(buf: &[u8]) -> Result<AdapterDescriptor> {
    ensure_len(buf, ADAPTER_DESCRIPTOR_SIZE, "STORAGE_ADAPTER_DESCRIPTOR")?;

    Ok(AdapterDescriptor {
        maximum_transfer_length: read_u32(buf, ADAPTER_MAXIMUM_TRANSFER_LENGTH, "MaximumTransferLength")?,
        maximum_physical_pages: read_u32(buf, ADAPTER_MAXIMUM_PHYSICAL_PAGES, "MaximumPhysicalPages")?,
        alignment_mask: read_u32(buf, ADAPTER_ALIGNMENT_MASK, "AlignmentMask")?,
        adapter_uses_pio: read_u8(buf, ADAPTER_USES_PIO, "AdapterUsesPio")? != 0,
        command_queueing: read_u8(buf, ADAPTER_COMMAND_QUEUEING, "CommandQueueing")? != 0,
        bus_type: BusType::from(read_u8(buf, ADAPTER_BUS_TYPE, "BusType")?),
        bus_major_version: read_u16(buf, ADAPTER_BUS_MAJOR_VERSION, "BusMajorVersion")?,
        bus_minor_version: read_u16(buf, ADAPTER_BUS_MINOR_VERSION, "BusMinorVersion")?,
    })
}

/// Decodes `DRIVE_LAYOUT_INFORMATION_EX` and its partition entries.
///
/// Entries with partition number 0 (unused MBR slots and extended
/// containers) are left out of the entry list but still counted in
/// `partition_count`.
pub(crate) fn decode_drive_layout(buf: &[u8], device_number: u32) -> Result<StoragePartitionInfo> {
    let style = PartitionStyle::from(read_u32(buf, 0, "PartitionStyle")?);
    let partition_count = read_u32(buf, 4, "PartitionCount")?;

    let identifier = match style {
        PartitionStyle::Mbr => Some(TableIdentifier::Signature(read_u32(
            buf,
            LAYOUT_TABLE_ID,
            "Signature",
        )?)),
        PartitionStyle::Gpt => Some(TableIdentifier::DiskId(format_guid(&field::<16>(
            buf,
            LAYOUT_TABLE_ID,
            "DiskId",
        )?))),
        PartitionStyle::Raw | PartitionStyle::Unknown(_) => None,
    };

    let mut partitions = Vec::new();
    for index in 0..partition_count as usize {
        let offset = DRIVE_LAYOUT_HEADER_SIZE + index * PARTITION_ENTRY_SIZE;
        let entry = buf.get(offset..offset + PARTITION_ENTRY_SIZE).ok_or_else(|| {
            DiskError::Unsupported(format!(
                "drive layout reports {} partitions but holds {} bytes",
                partition_count,
                buf.len()
            ))
        })?;

        let number = read_u32(entry, ENTRY_PARTITION_NUMBER, "PartitionNumber")?;
        if number == 0 {
            continue;
        }

        let starting_offset = read_i64(entry, ENTRY_STARTING_OFFSET, "StartingOffset")?.max(0) as u64;
        let length = read_i64(entry, ENTRY_PARTITION_LENGTH, "PartitionLength")?.max(0) as u64;
        partitions.push(PartitionEntry::new(number, starting_offset, length));
    }

    Ok(StoragePartitionInfo::new(
        device_number,
        style,
        identifier,
        partition_count,
        partitions,
    ))
}

/// Formats a Win32 `GUID` (Data1..Data3 little endian, Data4 as bytes).
pub(crate) fn format_guid(bytes: &[u8; 16]) -> String {
    let data1 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let data2 = u16::from_le_bytes([bytes[4], bytes[5]]);
    let data3 = u16::from_le_bytes([bytes[6], bytes[7]]);

    format!(
        "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        data1,
        data2,
        data3,
        bytes[8],
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15]
    )
}
