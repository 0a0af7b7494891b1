//! Argument validation shared by the writers and the image composer.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use nix::unistd::{access, AccessFlags};
use regex::Regex;

use crate::error::{Result, WriterError};

// [<method>:]scsibus,target,lun  e.g. "0,0,0" or "ATAPI:1,0,0"
static SCSI_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(.*:)?\s*[0-9]+\s*,\s*[0-9]+\s*,\s*[0-9]+\s*$").unwrap()
});

// Darwin-style service path, e.g. "IOCompactDiscServices/2"
static SERVICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*IO.*Services(/[0-9]+)?\s*$").unwrap());

/// Validate a filesystem device path.
///
/// The path must be absolute. When `require_present` is set (normal
/// operation, as opposed to running without hardware) the device must also
/// exist and be writable by the current user.
pub fn validate_device(device: &Path, require_present: bool) -> Result<PathBuf> {
    if !device.is_absolute() {
        return Err(WriterError::invalid_argument(format!(
            "device '{}' must be an absolute path",
            device.display()
        )));
    }
    if require_present {
        if !device.exists() {
            return Err(WriterError::invalid_argument(format!(
                "device '{}' does not exist",
                device.display()
            )));
        }
        if !is_writable(device) {
            return Err(WriterError::invalid_argument(format!(
                "device '{}' is not writable by the current user",
                device.display()
            )));
        }
    }
    Ok(device.to_path_buf())
}

/// Validate an optional SCSI address.
///
/// Accepts `[<method>:]scsibus,target,lun` or an `IO...Services[/N]` path.
pub fn validate_scsi_id(scsi_id: Option<&str>) -> Result<Option<String>> {
    match scsi_id {
        None => Ok(None),
        Some(id) if is_valid_scsi_id(id) => Ok(Some(id.to_string())),
        Some(id) => Err(WriterError::invalid_argument(format!(
            "SCSI id '{}' is not in a valid form",
            id
        ))),
    }
}

pub(crate) fn is_valid_scsi_id(id: &str) -> bool {
    SCSI_ID.is_match(id) || SERVICE_ID.is_match(id)
}

/// Validate an optional drive speed; `None` means "drive default".
pub fn validate_drive_speed(speed: Option<i64>) -> Result<Option<u32>> {
    match speed {
        None => Ok(None),
        Some(speed) if speed >= 1 => u32::try_from(speed).map(Some).map_err(|_| {
            WriterError::invalid_argument(format!("drive speed {} is out of range", speed))
        }),
        Some(speed) => Err(WriterError::invalid_argument(format!(
            "drive speed must be an integer >= 1, got {}",
            speed
        ))),
    }
}

fn is_writable(path: &Path) -> bool {
    access(path, AccessFlags::W_OK).is_ok()
}
