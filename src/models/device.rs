//! Raw device interfaces as reported by device-class enumeration.

/// Device interface classes that can be enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceClass {
    /// Disk drives (`GUID_DEVINTERFACE_DISK`)
    Disk,
    /// Optical drives (`GUID_DEVINTERFACE_CDROM`)
    CdRom,
}

/// A device interface found by [`DeviceClass`] enumeration.
///
/// Records are transient: the probe opens `device_path` to resolve the
/// device number and then the record is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceRecord {
    device_path: String,
    class: DeviceClass,
    description: Option<String>,
}

impl DeviceRecord {
    /// Creates a new record.
    ///
    /// # Examples
    ///
    /// ```
    /// use win_physical_disk::{DeviceClass, DeviceRecord};
    ///
    /// let record = DeviceRecord::new(
    ///     String::from("\\\\?\\scsi#disk&ven_nvme#4&1&0&000000#{53f56307-b6bf-11d0-94f2-00a0c91efb8b}"),
    ///     DeviceClass::Disk,
    ///     Some(String::from("Samsung SSD 970 EVO Plus 1TB")),
    /// );
    /// assert_eq!(record.class(), DeviceClass::Disk);
    /// ```
    pub fn new(device_path: String, class: DeviceClass, description: Option<String>) -> Self {
        DeviceRecord {
            device_path,
            class,
            description,
        }
    }

    /// Returns the device interface path.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Returns the class this interface was enumerated from.
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Returns the bus-reported device description, if the bus has one.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}
