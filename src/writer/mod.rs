//! Optical disc writers.
//!
//! Both writers implement [`ImageWriter`], the contract used by callers that
//! only need to put a set of directories onto a disc:
//!
//! ```text
//! initialize_image(new_disc, tmpdir)   uninitialized -> initialized
//! add_image_entry(path, graft_point)   initialized only
//! write_image(options)                 initialized -> written
//! ```
//!
//! - [`CdWriter`] - `cdrecord` + `mkisofs`, multisession aware
//! - [`DvdWriter`] - `growisofs`, with a dry run before every write
//!
//! Neither writer locks the device. Callers must serialize all operations
//! against one physical drive themselves.

pub mod cd;
pub mod dvd;

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, WriterError};
use crate::media::{MediaCapacity, MediaDefinition, MediaType};
use crate::process::Toolchain;

pub use cd::CdWriter;
pub use dvd::DvdWriter;

pub const EJECT: &str = "eject";

/// What to open: the device, how to address it and what media it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Absolute filesystem device path, e.g. `/dev/cdrw`.
    pub device: PathBuf,
    /// Optional SCSI address, `[<method>:]bus,target,lun`.
    pub scsi_id: Option<String>,
    /// Write speed multiplier; `None` uses the drive default.
    pub drive_speed: Option<i64>,
    /// Media assumed to be in the drive.
    pub media_type: MediaType,
}

impl DeviceSpec {
    pub fn new(device: impl Into<PathBuf>, media_type: MediaType) -> Self {
        Self {
            device: device.into(),
            scsi_id: None,
            drive_speed: None,
            media_type,
        }
    }

    pub fn scsi_id(mut self, scsi_id: impl Into<String>) -> Self {
        self.scsi_id = Some(scsi_id.into());
        self
    }

    pub fn drive_speed(mut self, speed: i64) -> Self {
        self.drive_speed = Some(speed);
        self
    }
}

/// Options for [`ImageWriter::write_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Prebuilt image to write. `None` writes the image composed through
    /// `initialize_image` / `add_image_entry`.
    pub image_path: Option<PathBuf>,
    /// Rewrite the disc from scratch. Only consulted for prebuilt images;
    /// composed images use the flag given to `initialize_image`.
    pub new_disc: bool,
    /// Leave the disc open for further sessions where supported.
    pub write_multi: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            image_path: None,
            new_disc: false,
            write_multi: true,
        }
    }
}

impl WriteOptions {
    /// Write a prebuilt image file.
    pub fn image(path: impl Into<PathBuf>, new_disc: bool) -> Self {
        Self {
            image_path: Some(path.into()),
            new_disc,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePhase {
    Uninitialized,
    Initialized,
    Written,
}

/// The image-writer contract shared by CD and DVD devices.
pub trait ImageWriter: Debug {
    /// Filesystem device path.
    fn device(&self) -> &Path;

    fn scsi_id(&self) -> Option<&str>;

    /// Address handed to the burning tool.
    fn hardware_id(&self) -> String;

    fn drive_speed(&self) -> Option<u32>;

    fn media(&self) -> &MediaDefinition;

    fn has_tray(&self) -> bool;

    fn can_eject(&self) -> bool;

    fn is_rewritable(&self) -> bool {
        self.media().rewritable()
    }

    fn phase(&self) -> ImagePhase;

    /// Capacity of the media in the drive. With `entire_disc` the result is
    /// as if the disc were rewritten from scratch.
    fn retrieve_capacity(&self, entire_disc: bool) -> Result<MediaCapacity>;

    /// Start composing a new image. Discards any image composed earlier.
    fn initialize_image(&mut self, new_disc: bool, tmpdir: &Path) -> Result<()>;

    /// Add a file or directory; a directory's contents land at `graft_point`.
    fn add_image_entry(&mut self, path: &Path, graft_point: Option<&str>) -> Result<()>;

    fn write_image(&mut self, options: &WriteOptions) -> Result<()>;

    fn open_tray(&self) -> Result<()>;

    fn close_tray(&self) -> Result<()>;

    /// Cycle the tray so the drive re-reads the media.
    fn refresh_media(&self) -> Result<()> {
        self.open_tray()?;
        self.close_tray()
    }
}

/// Image composition state held by a writer.
#[derive(Debug)]
pub(crate) enum ImageSession<T> {
    Uninitialized,
    Initialized(T),
    Written,
}

impl<T> ImageSession<T> {
    pub(crate) fn phase(&self) -> ImagePhase {
        match self {
            ImageSession::Uninitialized => ImagePhase::Uninitialized,
            ImageSession::Initialized(_) => ImagePhase::Initialized,
            ImageSession::Written => ImagePhase::Written,
        }
    }

    pub(crate) fn pending(&self) -> Option<&T> {
        match self {
            ImageSession::Initialized(pending) => Some(pending),
            _ => None,
        }
    }

    pub(crate) fn pending_mut(&mut self, operation: &str) -> Result<&mut T> {
        match self {
            ImageSession::Initialized(pending) => Ok(pending),
            _ => Err(not_initialized(operation)),
        }
    }

    /// Remove the pending image; the session is uninitialized until
    /// [`ImageSession::finish`] marks it written.
    pub(crate) fn take(&mut self, operation: &str) -> Result<T> {
        match std::mem::replace(self, ImageSession::Uninitialized) {
            ImageSession::Initialized(pending) => Ok(pending),
            other => {
                *self = other;
                Err(not_initialized(operation))
            }
        }
    }

    pub(crate) fn finish(&mut self) {
        *self = ImageSession::Written;
    }
}

fn not_initialized(operation: &str) -> WriterError {
    WriterError::invalid_state(format!(
        "must call initialize_image() before using {}",
        operation
    ))
}

pub(crate) fn require_absolute_image(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(WriterError::invalid_argument(format!(
            "image path '{}' must be absolute",
            path.display()
        )));
    }
    Ok(())
}

fn open_tray_args(device: &Path) -> Vec<String> {
    vec![device.to_string_lossy().into_owned()]
}

fn close_tray_args(device: &Path) -> Vec<String> {
    vec!["-t".into(), device.to_string_lossy().into_owned()]
}

/// Open or close the tray with `eject`; skipped when the drive has no tray
/// or cannot eject.
pub(crate) fn move_tray(
    toolchain: &Toolchain,
    device: &Path,
    capable: bool,
    close: bool,
) -> Result<()> {
    if !capable {
        return Ok(());
    }
    let (args, action) = if close {
        (close_tray_args(device), "executing eject command to close tray")
    } else {
        (open_tray_args(device), "executing eject command to open tray")
    };
    toolchain.cmd(EJECT).args(args).error_msg(action).run()?;
    Ok(())
}

/// Refresh after the media was changed. The data is already on the disc, so
/// a failure here is only logged.
pub(crate) fn refresh_after_write<W: ImageWriter + ?Sized>(writer: &W) {
    if let Err(err) = writer.refresh_media() {
        warn!("Unable to refresh media in {}: {}", writer.device().display(), err);
    }
}
