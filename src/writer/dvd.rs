//! DVD writer built on `growisofs`.
//!
//! `growisofs` builds the filesystem itself, so a composed image is streamed
//! straight to the disc without a temporary file. Every write is preceded by
//! a `--dry-run` with identical arguments; a failing dry run is checked for an
//! overburn complaint before anything touches the media.
//!
//! DVD+R/DVD+RW media has no multisession boundaries to track: `-M` appends
//! to whatever is already on the disc.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, WriterError};
use crate::image::{graft_args, ImageEntries, IsoImage};
use crate::media::{MediaCapacity, MediaClass, MediaDefinition};
use crate::parse::{parse_read_capacity, search_for_overburn};
use crate::process::Toolchain;
use crate::units::{display_bytes, sectors_to_bytes};
use crate::validate::{validate_device, validate_drive_speed};

use super::{
    move_tray, refresh_after_write, require_absolute_image, DeviceSpec, ImagePhase,
    ImageSession, ImageWriter, WriteOptions,
};

pub const GROWISOFS: &str = "growisofs";
pub const MEDIAINFO: &str = "dvd+rw-mediainfo";

/// Added to the `mkisofs` estimate of a composed image; found by comparing
/// estimates against what `growisofs` actually wrote.
const ESTIMATE_ALLOWANCE: u64 = 2450;

#[derive(Debug)]
struct PendingImage {
    new_disc: bool,
    image: IsoImage,
}

/// What a `growisofs` invocation writes.
#[derive(Debug, Clone, Copy)]
enum WriteSource<'a> {
    Image(&'a Path),
    Entries(&'a ImageEntries),
}

/// A DVD+R/DVD+RW drive.
///
/// Drives are assumed to have a tray and to be able to eject; nothing is
/// probed at construction.
#[derive(Debug)]
pub struct DvdWriter {
    device: PathBuf,
    scsi_id: Option<String>,
    drive_speed: Option<u32>,
    media: MediaDefinition,
    toolchain: Toolchain,
    session: ImageSession<PendingImage>,
}

impl DvdWriter {
    /// Open a drive attached to this host. The device must exist and be
    /// writable.
    pub fn open(spec: &DeviceSpec, toolchain: Toolchain) -> Result<Self> {
        Self::build(spec, toolchain, true)
    }

    /// Create a writer whose device path need not exist.
    pub fn detached(spec: &DeviceSpec, toolchain: Toolchain) -> Result<Self> {
        Self::build(spec, toolchain, false)
    }

    fn build(spec: &DeviceSpec, toolchain: Toolchain, require_present: bool) -> Result<Self> {
        let device = validate_device(&spec.device, require_present)?;
        if let Some(scsi_id) = &spec.scsi_id {
            warn!("SCSI id [{}] will be ignored; growisofs addresses the device path.", scsi_id);
        }
        Ok(Self {
            device,
            scsi_id: spec.scsi_id.clone(),
            drive_speed: validate_drive_speed(spec.drive_speed)?,
            media: MediaDefinition::for_class(MediaClass::Dvd, spec.media_type)?,
            toolchain,
            session: ImageSession::Uninitialized,
        })
    }

    /// The image being composed, if `initialize_image` has been called.
    pub fn image(&self) -> Option<&IsoImage> {
        self.session.pending().map(|pending| &pending.image)
    }

    fn sectors_used(&self) -> Result<u64> {
        let result = self
            .toolchain
            .cmd(MEDIAINFO)
            .arg_path(&self.device)
            .error_msg("executing dvd+rw-mediainfo command to get capacity")
            .run()?;
        parse_read_capacity(&result.output_lines())
    }

    /// Dry run, then the real write, then refresh.
    fn write_source(&self, new_disc: bool, source: WriteSource<'_>) -> Result<()> {
        let dry_run = self
            .toolchain
            .cmd(GROWISOFS)
            .args(write_args(new_disc, &self.device, self.drive_speed, source, true))
            .allow_fail()
            .run()?;
        if !dry_run.success() {
            if let Some(overburn) = search_for_overburn(&dry_run.output_lines()) {
                return Err(overburn.into());
            }
            return Err(WriterError::CommandFailed {
                program: GROWISOFS.to_string(),
                status: dry_run.code(),
                message: "executing dry run to check media capacity".to_string(),
            });
        }
        debug!("Dry run succeeded, so image size should be OK.");

        self.toolchain
            .cmd(GROWISOFS)
            .args(write_args(new_disc, &self.device, self.drive_speed, source, false))
            .error_msg("executing command to write disc")
            .run()?;
        refresh_after_write(self);
        Ok(())
    }
}

impl ImageWriter for DvdWriter {
    fn device(&self) -> &Path {
        &self.device
    }

    /// Kept for reference only; never passed to a tool.
    fn scsi_id(&self) -> Option<&str> {
        self.scsi_id.as_deref()
    }

    fn hardware_id(&self) -> String {
        self.device.to_string_lossy().into_owned()
    }

    fn drive_speed(&self) -> Option<u32> {
        self.drive_speed
    }

    fn media(&self) -> &MediaDefinition {
        &self.media
    }

    fn has_tray(&self) -> bool {
        true
    }

    fn can_eject(&self) -> bool {
        true
    }

    fn phase(&self) -> ImagePhase {
        self.session.phase()
    }

    fn retrieve_capacity(&self, entire_disc: bool) -> Result<MediaCapacity> {
        let used = if entire_disc { 0 } else { self.sectors_used()? };
        let available = self.media.capacity().saturating_sub(used);
        debug!("Sectors used: {}, available: {}", used, available);
        Ok(MediaCapacity::new(
            sectors_to_bytes(used),
            sectors_to_bytes(available),
            None,
        ))
    }

    // growisofs composes on the fly; no scratch space is needed
    fn initialize_image(&mut self, new_disc: bool, _tmpdir: &Path) -> Result<()> {
        self.session = ImageSession::Initialized(PendingImage {
            new_disc,
            image: IsoImage::new(self.toolchain.clone()),
        });
        Ok(())
    }

    fn add_image_entry(&mut self, path: &Path, graft_point: Option<&str>) -> Result<()> {
        self.session
            .pending_mut("add_image_entry()")?
            .image
            .add_entry(path, graft_point, false, true)
    }

    fn write_image(&mut self, options: &WriteOptions) -> Result<()> {
        if !options.write_multi {
            warn!("write_multi value of [false] ignored.");
        }

        let Some(image_path) = &options.image_path else {
            let pending = self.session.take("write_image() with no image path")?;
            let size = pending.image.estimated_size()? + ESTIMATE_ALLOWANCE;
            info!("Image size will be {} (estimated).", display_bytes(size));
            self.write_source(pending.new_disc, WriteSource::Entries(pending.image.entries()))?;
            self.session.finish();
            return Ok(());
        };

        require_absolute_image(image_path)?;
        self.write_source(options.new_disc, WriteSource::Image(image_path))
    }

    fn open_tray(&self) -> Result<()> {
        move_tray(&self.toolchain, &self.device, true, false)
    }

    fn close_tray(&self) -> Result<()> {
        move_tray(&self.toolchain, &self.device, true, true)
    }
}

fn write_args(
    new_disc: bool,
    device: &Path,
    drive_speed: Option<u32>,
    source: WriteSource<'_>,
    dry_run: bool,
) -> Vec<String> {
    let mut args = Vec::new();
    if dry_run {
        args.push("--dry-run".to_string());
    }
    if let Some(speed) = drive_speed {
        args.push(format!("-speed={}", speed));
    }
    args.push(if new_disc { "-Z" } else { "-M" }.to_string());
    match source {
        WriteSource::Image(image) => {
            args.push(format!("{}={}", device.display(), image.display()));
        }
        WriteSource::Entries(entries) => {
            args.push(device.to_string_lossy().into_owned());
            args.push("-r".into());
            args.push("-graft-points".into());
            args.extend(graft_args(entries));
        }
    }
    args
}
