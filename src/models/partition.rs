//! This module provides structures for representing the partition table of
//! a physical disk.
//!
//! It contains the `StoragePartitionInfo` struct describing the table as a
//! whole, along with the `PartitionStyle` enum and the `PartitionEntry`
//! struct for the individual partitions.

/// Layout of a disk's partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PartitionStyle {
    /// Master Boot Record
    Mbr,
    /// GUID Partition Table
    Gpt,
    /// No recognizable partition table
    Raw,
    /// Style value not known to this crate
    Unknown(u32),
}

impl From<u32> for PartitionStyle {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Mbr,
            1 => Self::Gpt,
            2 => Self::Raw,
            other => Self::Unknown(other),
        }
    }
}

/// Identifies the partition table itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum TableIdentifier {
    /// MBR disk signature
    Signature(u32),
    /// GPT disk GUID, formatted as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
    DiskId(String),
}

/// A single partition found in the partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PartitionEntry {
    number: u32,
    starting_offset: u64,
    length: u64,
}

impl PartitionEntry {
    /// Creates a new partition entry.
    ///
    /// # Arguments
    ///
    /// * `number` - Partition number as used by volumes on this disk
    /// * `starting_offset` - Offset of the first byte, in bytes
    /// * `length` - Size of the partition in bytes
    pub fn new(number: u32, starting_offset: u64, length: u64) -> Self {
        PartitionEntry {
            number,
            starting_offset,
            length,
        }
    }

    /// Returns the partition number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Returns the offset of the partition from the start of the disk.
    pub fn starting_offset(&self) -> u64 {
        self.starting_offset
    }

    /// Returns the partition length in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }
}

/// Partition table of a physical disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StoragePartitionInfo {
    device_number: u32,
    style: PartitionStyle,
    identifier: Option<TableIdentifier>,
    partition_count: u32,
    partitions: Vec<PartitionEntry>,
}

impl StoragePartitionInfo {
    /// Creates a new instance describing a partition table.
    ///
    /// # Examples
    ///
    /// ```
    /// use win_physical_disk::{PartitionEntry, PartitionStyle, StoragePartitionInfo, TableIdentifier};
    ///
    /// let info = StoragePartitionInfo::new(
    ///     0,
    ///     PartitionStyle::Mbr,
    ///     Some(TableIdentifier::Signature(0x1234_5678)),
    ///     4,
    ///     vec![PartitionEntry::new(1, 1_048_576, 536_870_912)],
    /// );
    /// assert_eq!(info.partitions().len(), 1);
    /// ```
    pub fn new(
        device_number: u32,
        style: PartitionStyle,
        identifier: Option<TableIdentifier>,
        partition_count: u32,
        partitions: Vec<PartitionEntry>,
    ) -> Self {
        StoragePartitionInfo {
            device_number,
            style,
            identifier,
            partition_count,
            partitions,
        }
    }

    /// Returns the device number of the disk this table belongs to.
    pub fn device_number(&self) -> u32 {
        self.device_number
    }

    /// Returns the partition table style.
    pub fn style(&self) -> PartitionStyle {
        self.style
    }

    /// Returns the MBR signature or GPT disk id.
    pub fn identifier(&self) -> Option<&TableIdentifier> {
        self.identifier.as_ref()
    }

    /// Returns the number of slots reported by the table. For MBR disks this
    /// includes unused and extended slots.
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Returns the partitions that carry a partition number.
    pub fn partitions(&self) -> &[PartitionEntry] {
        &self.partitions
    }

    /// Looks up a partition by its number.
    pub fn partition(&self, number: u32) -> Option<&PartitionEntry> {
        self.partitions.iter().find(|entry| entry.number == number)
    }
}
