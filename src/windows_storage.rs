use std::ffi::c_void;
use std::mem::{offset_of, size_of};

use tracing::{debug, trace};
use windows::core::{GUID, HSTRING, PCWSTR};
use windows::Win32::Devices::DeviceAndDriverInstallation::{
    SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInterfaces, SetupDiGetClassDevsW,
    SetupDiGetDeviceInterfaceDetailW, SetupDiGetDevicePropertyW, DIGCF_DEVICEINTERFACE,
    DIGCF_PRESENT, HDEVINFO, SP_DEVICE_INTERFACE_DATA, SP_DEVICE_INTERFACE_DETAIL_DATA_W,
    SP_DEVINFO_DATA,
};
use windows::Win32::Devices::Properties::{
    DEVPKEY_Device_BusReportedDeviceDesc, DEVPKEY_Device_FriendlyName, DEVPROPTYPE,
};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_INSUFFICIENT_BUFFER, ERROR_MORE_DATA, ERROR_NO_MORE_FILES,
    ERROR_NO_MORE_ITEMS, GENERIC_READ, HANDLE,
};
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FindFirstVolumeW, FindNextVolumeW, FindVolumeClose, GetDriveTypeW,
    GetLogicalDriveStringsW, GetVolumeInformationW, GetVolumePathNamesForVolumeNameW, QueryDosDeviceW,
    FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::Ioctl::{
    PropertyStandardQuery, StorageAdapterProperty, GUID_DEVINTERFACE_CDROM, GUID_DEVINTERFACE_DISK,
    IOCTL_DISK_GET_DRIVE_LAYOUT_EX, IOCTL_STORAGE_GET_DEVICE_NUMBER, IOCTL_STORAGE_QUERY_PROPERTY,
    STORAGE_PROPERTY_QUERY,
};
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
use windows::Win32::System::IO::DeviceIoControl;

use crate::backend::{AccessLevel, DeviceHandle, PrivilegeLevel, StorageBackend, StorageQuery};
use crate::correlation::{DiskTopology, PhysicalDisks};
use crate::layout::{
    ADAPTER_DESCRIPTOR_SIZE, DEVICE_NUMBER_SIZE, DRIVE_LAYOUT_HEADER_SIZE, PARTITION_ENTRY_SIZE,
};
use crate::probe::StorageInfoProbe;
use crate::{
    default_drive_types, DeviceClass, DeviceRecord, DiskError, DriveTypeFilter, PhysicalDiskInfo,
    Result, StorageDeviceIdentity,
};

/// Room for volume GUID paths (`\\?\Volume{...}\` is 49 characters).
const VOLUME_NAME_LEN: usize = 64;
/// Drive layouts are retried with a larger buffer up to this many entries.
const MAX_LAYOUT_ENTRIES: usize = 1024;
const INITIAL_LAYOUT_ENTRIES: usize = 16;
const DOS_DEVICE_TARGET_LEN: usize = 1024;

/// Storage backend over the Win32 device, volume and I/O control APIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsStorage;

/// A device handle from `CreateFileW`, closed on drop.
pub struct WindowsHandle {
    handle: HANDLE,
}

impl Drop for WindowsHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

impl WindowsHandle {
    fn io_control(&self, code: u32, input: Option<(*const c_void, u32)>, out: &mut [u8]) -> Result<usize> {
        let mut returned = 0u32;
        let (input_ptr, input_len) = match input {
            Some((ptr, len)) => (Some(ptr), len),
            None => (None, 0),
        };

        unsafe {
            DeviceIoControl(
                self.handle,
                code,
                input_ptr,
                input_len,
                Some(out.as_mut_ptr() as *mut c_void),
                out.len() as u32,
                Some(&mut returned),
                None,
            )?;
        }

        Ok(returned as usize)
    }

    fn drive_layout(&self) -> Result<Vec<u8>> {
        let mut entries = INITIAL_LAYOUT_ENTRIES;

        loop {
            let mut out = vec![0u8; DRIVE_LAYOUT_HEADER_SIZE + entries * PARTITION_ENTRY_SIZE];
            match self.io_control(IOCTL_DISK_GET_DRIVE_LAYOUT_EX, None, &mut out) {
                Ok(returned) => {
                    out.truncate(returned);
                    return Ok(out);
                }
                Err(DiskError::Os { code, .. })
                    if (code == ERROR_INSUFFICIENT_BUFFER.to_hresult().0
                        || code == ERROR_MORE_DATA.to_hresult().0)
                        && entries < MAX_LAYOUT_ENTRIES =>
                {
                    entries *= 4;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl DeviceHandle for WindowsHandle {
    fn query(&self, query: StorageQuery) -> Result<Vec<u8>> {
        match query {
            StorageQuery::DeviceNumber => {
                let mut out = vec![0u8; DEVICE_NUMBER_SIZE];
                let returned = self.io_control(IOCTL_STORAGE_GET_DEVICE_NUMBER, None, &mut out)?;
                out.truncate(returned);
                Ok(out)
            }
            StorageQuery::AdapterDescriptor => {
                let property = STORAGE_PROPERTY_QUERY {
                    PropertyId: StorageAdapterProperty,
                    QueryType: PropertyStandardQuery,
                    AdditionalParameters: [0],
                };
                let mut out = vec![0u8; ADAPTER_DESCRIPTOR_SIZE.max(64)];
                let returned = self.io_control(
                    IOCTL_STORAGE_QUERY_PROPERTY,
                    Some((
                        &property as *const _ as *const c_void,
                        size_of::<STORAGE_PROPERTY_QUERY>() as u32,
                    )),
                    &mut out,
                )?;
                out.truncate(returned);
                Ok(out)
            }
            StorageQuery::DriveLayout => self.drive_layout(),
        }
    }
}

fn from_wide(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

/// Splits a double-NUL terminated list of strings.
fn split_multi_sz(buf: &[u16]) -> Vec<String> {
    buf.split(|&c| c == 0)
        .take_while(|s| !s.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

fn is_error(e: &windows::core::Error, codes: &[windows::Win32::Foundation::WIN32_ERROR]) -> bool {
    codes.iter().any(|code| e.code() == code.to_hresult())
}

/// Maps the `ERROR_NO_MORE_FILES` end of a `Find*` enumeration to `None`.
fn until_no_more_files<T>(result: windows::core::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_error(&e, &[ERROR_NO_MORE_FILES]) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Destroys a device information set on drop.
struct DeviceInfoSet(HDEVINFO);

impl Drop for DeviceInfoSet {
    fn drop(&mut self) {
        unsafe {
            let _ = SetupDiDestroyDeviceInfoList(self.0);
        }
    }
}

impl DeviceInfoSet {
    fn interface_path(&self, interface: &SP_DEVICE_INTERFACE_DATA, info: &mut SP_DEVINFO_DATA) -> Result<String> {
        let mut required = 0u32;
        unsafe {
            // Sizing call, expected to fail with ERROR_INSUFFICIENT_BUFFER.
            let _ = SetupDiGetDeviceInterfaceDetailW(self.0, interface, None, 0, Some(&mut required), None);
        }
        if required == 0 {
            return Err(DiskError::Unsupported(String::from("empty device interface detail")));
        }

        // u32 storage keeps the detail structure aligned.
        let mut buf = vec![0u32; (required as usize).div_ceil(4)];
        let detail = buf.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W;
        unsafe {
            (*detail).cbSize = size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;
            SetupDiGetDeviceInterfaceDetailW(
                self.0,
                interface,
                Some(detail),
                required,
                None,
                Some(info),
            )?;
        }

        let path_offset = offset_of!(SP_DEVICE_INTERFACE_DETAIL_DATA_W, DevicePath) / 2;
        let wide: &[u16] =
            unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u16, buf.len() * 2) };
        Ok(from_wide(&wide[path_offset..]))
    }

    fn description(&self, info: &SP_DEVINFO_DATA) -> Option<String> {
        [&DEVPKEY_Device_BusReportedDeviceDesc, &DEVPKEY_Device_FriendlyName]
            .into_iter()
            .find_map(|key| {
                let mut property_type = DEVPROPTYPE::default();
                let mut buf = [0u8; 512];
                unsafe {
                    SetupDiGetDevicePropertyW(self.0, info, key, &mut property_type, Some(&mut buf), None, 0)
                        .ok()?;
                }
                let wide: Vec<u16> = buf
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                let text = from_wide(&wide).trim().to_string();
                (!text.is_empty()).then_some(text)
            })
    }
}

impl StorageBackend for WindowsStorage {
    type Handle = WindowsHandle;

    fn devices(&self, class: DeviceClass) -> Result<Vec<DeviceRecord>> {
        let guid: GUID = match class {
            DeviceClass::Disk => GUID_DEVINTERFACE_DISK,
            DeviceClass::CdRom => GUID_DEVINTERFACE_CDROM,
        };

        let set = unsafe {
            DeviceInfoSet(SetupDiGetClassDevsW(
                Some(&guid as *const GUID),
                PCWSTR::null(),
                None,
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            )?)
        };

        let mut devices = Vec::new();
        for index in 0.. {
            let mut interface = SP_DEVICE_INTERFACE_DATA {
                cbSize: size_of::<SP_DEVICE_INTERFACE_DATA>() as u32,
                ..Default::default()
            };
            let enumerated =
                unsafe { SetupDiEnumDeviceInterfaces(set.0, None, &guid, index, &mut interface) };
            match enumerated {
                Ok(()) => {}
                Err(e) if is_error(&e, &[ERROR_NO_MORE_ITEMS]) => break,
                Err(e) => return Err(e.into()),
            }

            let mut info = SP_DEVINFO_DATA {
                cbSize: size_of::<SP_DEVINFO_DATA>() as u32,
                ..Default::default()
            };
            match set.interface_path(&interface, &mut info) {
                Ok(path) => {
                    let description = set.description(&info);
                    trace!("{:?} interface {} ({:?})", class, path, description);
                    devices.push(DeviceRecord::new(path, class, description));
                }
                Err(e) => debug!("skipping {:?} interface {}: {}", class, index, e),
            }
        }

        Ok(devices)
    }

    fn volumes(&self) -> Result<Vec<String>> {
        let mut name = [0u16; VOLUME_NAME_LEN];
        let Some(find) = until_no_more_files(unsafe { FindFirstVolumeW(&mut name) })? else {
            return Ok(Vec::new());
        };

        let mut volumes = vec![from_wide(&name)];
        loop {
            name.fill(0);
            let next = until_no_more_files(unsafe { FindNextVolumeW(find, &mut name) });
            match next {
                Ok(Some(())) => volumes.push(from_wide(&name)),
                Ok(None) | Err(_) => {
                    unsafe {
                        let _ = FindVolumeClose(find);
                    }
                    return next.map(|_| volumes);
                }
            }
        }
    }

    fn volume_path_names(&self, volume_id: &str) -> Result<Vec<String>> {
        let volume = HSTRING::from(volume_id);
        let mut len = 0u32;
        unsafe {
            // Sizing call, expected to fail with ERROR_MORE_DATA.
            let _ = GetVolumePathNamesForVolumeNameW(&volume, None, &mut len);
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u16; len as usize];
        unsafe {
            GetVolumePathNamesForVolumeNameW(&volume, Some(&mut buf), &mut len)?;
        }
        Ok(split_multi_sz(&buf))
    }

    fn logical_drives(&self) -> Result<Vec<String>> {
        let len = unsafe { GetLogicalDriveStringsW(None) };
        if len == 0 {
            return Err(windows::core::Error::from_win32().into());
        }

        let mut buf = vec![0u16; len as usize + 1];
        let written = unsafe { GetLogicalDriveStringsW(Some(&mut buf)) };
        if written == 0 {
            return Err(windows::core::Error::from_win32().into());
        }
        Ok(split_multi_sz(&buf[..written as usize + 1]))
    }

    fn drive_type(&self, root: &str) -> u32 {
        unsafe { GetDriveTypeW(&HSTRING::from(root)) }
    }

    fn is_drive_ready(&self, root: &str) -> bool {
        unsafe { GetVolumeInformationW(&HSTRING::from(root), None, None, None, None, None).is_ok() }
    }

    fn query_dos_device(&self, name: &str) -> Option<String> {
        let mut buf = vec![0u16; DOS_DEVICE_TARGET_LEN];
        let written = unsafe { QueryDosDeviceW(&HSTRING::from(name), Some(&mut buf)) };
        if written == 0 {
            trace!("no MS-DOS device target for {}", name);
            return None;
        }
        split_multi_sz(&buf[..written as usize]).into_iter().next()
    }

    fn open(&self, path: &str, access: AccessLevel) -> Result<WindowsHandle> {
        let desired_access = match access {
            AccessLevel::Read => GENERIC_READ.0,
            AccessLevel::QueryOnly => 0,
        };

        let handle = unsafe {
            CreateFileW(
                &HSTRING::from(path),
                desired_access,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(0),
                None,
            )?
        };

        Ok(WindowsHandle { handle })
    }
}

impl PrivilegeLevel {
    /// Returns the privilege level of the current process.
    ///
    /// Any failure to read the process token is treated as `Standard`.
    pub fn current() -> Self {
        let mut token = HANDLE::default();
        let mut elevation = TOKEN_ELEVATION::default();
        let mut returned = 0u32;

        let elevated = unsafe {
            OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_ok() && {
                let queried = GetTokenInformation(
                    token,
                    TokenElevation,
                    Some(&mut elevation as *mut _ as *mut c_void),
                    size_of::<TOKEN_ELEVATION>() as u32,
                    &mut returned,
                );
                let _ = CloseHandle(token);
                queried.is_ok() && elevation.TokenIsElevated != 0
            }
        };

        if elevated {
            PrivilegeLevel::Elevated
        } else {
            PrivilegeLevel::Standard
        }
    }
}

fn topology() -> DiskTopology<WindowsStorage> {
    DiskTopology::new(WindowsStorage, PrivilegeLevel::current())
}

/// Enumerates the physical disks on the computer, correlated with their
/// volumes and their CD-ROM, fixed and removable logical drives.
pub fn enumerate_physical_disks() -> Result<PhysicalDisks<WindowsStorage>> {
    enumerate_physical_disks_of(default_drive_types())
}

/// Enumerates the physical disks on the computer, correlated with the
/// logical drives whose type is in `drive_types`.
pub fn enumerate_physical_disks_of(drive_types: DriveTypeFilter) -> Result<PhysicalDisks<WindowsStorage>> {
    topology().into_physical_disks(drive_types)
}

/// Gets the physical disk with device number `device_number`.
pub fn get_physical_disk_info(device_number: i64) -> Result<PhysicalDiskInfo> {
    topology().physical_disk_by_number(device_number)
}

/// Gets the physical disk behind a disk, drive, volume or device path.
///
/// # Examples
///
/// ```no_run
/// use win_physical_disk::get_physical_disk_info_by_path;
///
/// let disk = get_physical_disk_info_by_path("C:\\").unwrap();
/// assert!(disk.contains_volume("C:"));
/// ```
pub fn get_physical_disk_info_by_path(device_path: &str) -> Result<PhysicalDiskInfo> {
    topology().physical_disk_by_path(device_path)
}

/// Gets the device and partition number behind a disk, drive, volume or
/// device path.
pub fn get_storage_device_info(device_path: &str) -> Result<StorageDeviceIdentity> {
    let target = crate::device_path::classify(device_path)?;
    StorageInfoProbe::new(PrivilegeLevel::current()).identify(&WindowsStorage, &target.open_path())
}
