//! Recognizes the path forms a physical disk can be looked up by.

use crate::{DiskError, Result};

const PHYSICAL_DRIVE_PREFIX: &str = "\\\\.\\PHYSICALDRIVE";
const VOLUME_PREFIXES: [&str; 2] = ["\\\\?\\VOLUME{", "\\\\.\\VOLUME{"];
const DEVICE_PREFIXES: [&str; 2] = ["\\\\?\\", "\\\\.\\"];

/// A path accepted by the single-disk lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePathKind {
    /// `\\.\PhysicalDrive0`
    PhysicalDrive(u32),
    /// `C`, `C:`, `C:\` or `\\.\C:`, stored as the upper-case letter
    Drive(char),
    /// `\\?\Volume{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}\`
    Volume(String),
    /// Any other device path, e.g. a device interface path
    Device(String),
}

/// Classifies `path`.
///
/// Fails with `InvalidArgument` for empty paths and for anything that is
/// neither a drive, a volume nor a device path.
pub fn classify(path: &str) -> Result<DevicePathKind> {
    let path = path.trim();
    if path.is_empty() {
        return Err(DiskError::InvalidArgument(String::from("device path is empty")));
    }

    let upper = path.to_ascii_uppercase();

    if let Some(number) = upper.strip_prefix(PHYSICAL_DRIVE_PREFIX) {
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DiskError::InvalidArgument(format!("invalid physical drive: {}", path)));
        }
        return number
            .parse()
            .map(DevicePathKind::PhysicalDrive)
            .map_err(|_| DiskError::InvalidArgument(format!("invalid physical drive: {}", path)));
    }

    if let Some(letter) = parse_drive(&upper) {
        return Ok(DevicePathKind::Drive(letter));
    }

    if let Some(letter) = upper.strip_prefix(DEVICE_PREFIXES[1]).and_then(parse_drive) {
        return Ok(DevicePathKind::Drive(letter));
    }

    if VOLUME_PREFIXES.iter().any(|prefix| upper.starts_with(prefix)) {
        return Ok(DevicePathKind::Volume(path.to_string()));
    }

    if DEVICE_PREFIXES
        .iter()
        .any(|prefix| upper.len() > prefix.len() && upper.starts_with(prefix))
    {
        return Ok(DevicePathKind::Device(path.to_string()));
    }

    Err(DiskError::InvalidArgument(format!("unrecognized device path: {}", path)))
}

/// Parses `C`, `C:` and `C:\` (upper-cased input).
fn parse_drive(path: &str) -> Option<char> {
    let mut chars = path.chars();
    let letter = chars.next().filter(|c| c.is_ascii_alphabetic())?;

    match (chars.next(), chars.next(), chars.next()) {
        (None, None, None) | (Some(':'), None, None) | (Some(':'), Some('\\' | '/'), None) => {
            Some(letter)
        }
        _ => None,
    }
}

impl DevicePathKind {
    /// Returns the path to pass to `CreateFileW`.
    pub fn open_path(&self) -> String {
        match self {
            DevicePathKind::PhysicalDrive(number) => format!("\\\\.\\PhysicalDrive{}", number),
            DevicePathKind::Drive(letter) => format!("\\\\.\\{}:", letter),
            DevicePathKind::Volume(volume) => volume.trim_end_matches('\\').to_string(),
            DevicePathKind::Device(path) => path.clone(),
        }
    }

    /// Returns the MS-DOS device name (`C:`, `Volume{...}`) of drives and
    /// volumes, or `None` for disk and device paths.
    pub fn dos_device_name(&self) -> Option<String> {
        match self {
            DevicePathKind::Drive(letter) => Some(format!("{}:", letter)),
            DevicePathKind::Volume(volume) => {
                let volume = volume.trim_end_matches('\\');
                let name = volume.get(4..).unwrap_or(volume);
                Some(name.to_string())
            }
            DevicePathKind::PhysicalDrive(_) | DevicePathKind::Device(_) => None,
        }
    }
}
