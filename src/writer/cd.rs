//! CD writer built on `cdrecord`.
//!
//! Device attributes (multisession support, tray, eject) are probed once
//! with `cdrecord -prcap` when the writer is opened. Media attributes such as
//! remaining capacity are queried on demand with `cdrecord -msinfo`.
//!
//! A composed image is checked against the remaining capacity before it is
//! built, then built into a temporary file that is removed however the write
//! ends.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, error, info};

use crate::error::{Result, WriterError};
use crate::image::IsoImage;
use crate::media::{
    compute_capacity, MediaCapacity, MediaClass, MediaDefinition, SessionBoundaries,
};
use crate::parse::{parse_boundaries_output, parse_properties_output, DeviceProperties};
use crate::process::Toolchain;
use crate::units::display_bytes;
use crate::validate::{validate_device, validate_drive_speed, validate_scsi_id};

use super::{
    move_tray, refresh_after_write, require_absolute_image, DeviceSpec, ImagePhase,
    ImageSession, ImageWriter, WriteOptions,
};

pub const CDRECORD: &str = "cdrecord";

#[derive(Debug)]
struct PendingImage {
    new_disc: bool,
    tmpdir: PathBuf,
    capacity: MediaCapacity,
    image: IsoImage,
}

/// A CD-R/CD-RW drive.
#[derive(Debug)]
pub struct CdWriter {
    device: PathBuf,
    scsi_id: Option<String>,
    drive_speed: Option<u32>,
    media: MediaDefinition,
    properties: DeviceProperties,
    toolchain: Toolchain,
    session: ImageSession<PendingImage>,
}

impl CdWriter {
    /// Open a drive that is attached to this host.
    ///
    /// The device must exist and be writable, and is probed for its
    /// capabilities. No media needs to be present.
    pub fn open(spec: &DeviceSpec, toolchain: Toolchain) -> Result<Self> {
        let mut writer = Self::build(spec, toolchain, true)?;
        writer.properties = writer.retrieve_properties()?;
        Ok(writer)
    }

    /// Create a writer without touching hardware: the device path need not
    /// exist and capabilities default to "unknown"/false.
    pub fn detached(spec: &DeviceSpec, toolchain: Toolchain) -> Result<Self> {
        Self::build(spec, toolchain, false)
    }

    /// Replace the probed capabilities.
    pub fn with_properties(mut self, properties: DeviceProperties) -> Self {
        self.properties = properties;
        self
    }

    fn build(spec: &DeviceSpec, toolchain: Toolchain, require_present: bool) -> Result<Self> {
        Ok(Self {
            device: validate_device(&spec.device, require_present)?,
            scsi_id: validate_scsi_id(spec.scsi_id.as_deref())?,
            drive_speed: validate_drive_speed(spec.drive_speed)?,
            media: MediaDefinition::for_class(MediaClass::Cd, spec.media_type)?,
            properties: DeviceProperties::default(),
            toolchain,
            session: ImageSession::Uninitialized,
        })
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    pub fn supports_multi(&self) -> bool {
        self.properties.supports_multi
    }

    /// The image being composed, if `initialize_image` has been called.
    pub fn image(&self) -> Option<&IsoImage> {
        self.session.pending().map(|pending| &pending.image)
    }

    /// Capacity remaining on the disc.
    ///
    /// Session boundaries are only consulted when the drive supports
    /// multisession, `use_multi` is set and `entire_disc` is not; otherwise
    /// the capacity is that of a freshly rewritten disc.
    pub fn retrieve_session_capacity(
        &self,
        entire_disc: bool,
        use_multi: bool,
    ) -> Result<MediaCapacity> {
        let boundaries = self.boundaries(entire_disc, use_multi)?;
        Ok(compute_capacity(&self.media, boundaries))
    }

    fn retrieve_properties(&self) -> Result<DeviceProperties> {
        let result = self
            .toolchain
            .cmd(CDRECORD)
            .args(properties_args(&self.hardware_id()))
            .error_msg("executing cdrecord command to get properties")
            .run()?;
        Ok(parse_properties_output(&result.stdout_lines()))
    }

    fn boundaries(&self, entire_disc: bool, use_multi: bool) -> Result<Option<SessionBoundaries>> {
        if !self.properties.supports_multi {
            debug!("Device does not support multisession discs; returning boundaries None.");
            return Ok(None);
        }
        if !use_multi {
            debug!("Use multisession flag is false; returning boundaries None.");
            return Ok(None);
        }
        if entire_disc {
            debug!("Entire disc flag is true; returning boundaries None.");
            return Ok(None);
        }

        let result = self
            .toolchain
            .cmd(CDRECORD)
            .args(boundaries_args(&self.hardware_id()))
            .error_msg("executing cdrecord command to get capacity")
            .run()?;
        let boundaries = parse_boundaries_output(&result.stdout_lines())?;
        match boundaries {
            Some(b) => debug!("Returning disc boundaries: ({}, {})", b.lower, b.upper),
            None => debug!("Returning disc boundaries: None"),
        }
        Ok(boundaries)
    }

    /// Build the pending image into a temporary file after checking it fits.
    fn create_image(&self, pending: &PendingImage) -> Result<TempPath> {
        let size = pending.image.estimated_size()?;
        info!("Image size will be {}.", display_bytes(size));

        let available = pending.capacity.bytes_available;
        if size > available {
            error!(
                "Image [{}] does not fit in available capacity [{}].",
                display_bytes(size),
                display_bytes(available)
            );
            return Err(WriterError::InsufficientCapacity {
                required: Some(size),
                available: Some(available),
            });
        }

        let path = tempfile::Builder::new()
            .prefix("optical-writer-")
            .suffix(".iso")
            .tempfile_in(&pending.tmpdir)?
            .into_temp_path();
        pending.image.write_image(&path)?;
        debug!("Completed creating image [{}].", path.display());
        Ok(path)
    }

    fn write_prepared(&self, image_path: &Path, write_multi: bool, new_disc: bool) -> Result<()> {
        if new_disc {
            self.blank_media()?;
        }
        let multi = write_multi && self.properties.supports_multi;
        self.toolchain
            .cmd(CDRECORD)
            .args(write_args(
                &self.hardware_id(),
                image_path,
                self.drive_speed,
                multi,
            ))
            .error_msg("executing command to write disc")
            .run()?;
        refresh_after_write(self);
        Ok(())
    }

    /// Fast-blank rewritable media; other media is left alone.
    fn blank_media(&self) -> Result<()> {
        if !self.is_rewritable() {
            return Ok(());
        }
        self.toolchain
            .cmd(CDRECORD)
            .args(blank_args(&self.hardware_id(), self.drive_speed))
            .error_msg("executing command to blank disc")
            .run()?;
        refresh_after_write(self);
        Ok(())
    }
}

impl ImageWriter for CdWriter {
    fn device(&self) -> &Path {
        &self.device
    }

    fn scsi_id(&self) -> Option<&str> {
        self.scsi_id.as_deref()
    }

    /// The SCSI id when one was given, else the device path.
    fn hardware_id(&self) -> String {
        match &self.scsi_id {
            Some(id) => id.clone(),
            None => self.device.to_string_lossy().into_owned(),
        }
    }

    fn drive_speed(&self) -> Option<u32> {
        self.drive_speed
    }

    fn media(&self) -> &MediaDefinition {
        &self.media
    }

    fn has_tray(&self) -> bool {
        self.properties.has_tray
    }

    fn can_eject(&self) -> bool {
        self.properties.can_eject
    }

    fn phase(&self) -> ImagePhase {
        self.session.phase()
    }

    fn retrieve_capacity(&self, entire_disc: bool) -> Result<MediaCapacity> {
        self.retrieve_session_capacity(entire_disc, true)
    }

    fn initialize_image(&mut self, new_disc: bool, tmpdir: &Path) -> Result<()> {
        let capacity = self.retrieve_capacity(new_disc)?;
        debug!("Media capacity: {}", display_bytes(capacity.bytes_available));

        let device = self.device.to_string_lossy();
        let image = IsoImage::for_session(
            self.toolchain.clone(),
            Some(device.as_ref()),
            capacity.boundaries,
        )?;
        self.session = ImageSession::Initialized(PendingImage {
            new_disc,
            tmpdir: tmpdir.to_path_buf(),
            capacity,
            image,
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
        let Some(image_path) = &options.image_path else {
            let pending = self.session.take("write_image() with no image path")?;
            // the temporary image is removed when `path` drops, on every exit
            self.create_image(&pending).and_then(|path| {
                self.write_prepared(&path, options.write_multi, pending.new_disc)
            })?;
            self.session.finish();
            return Ok(());
        };

        require_absolute_image(image_path)?;
        self.write_prepared(image_path, options.write_multi, options.new_disc)
    }

    fn open_tray(&self) -> Result<()> {
        move_tray(&self.toolchain, &self.device, self.has_tray() && self.can_eject(), false)
    }

    fn close_tray(&self) -> Result<()> {
        move_tray(&self.toolchain, &self.device, self.has_tray() && self.can_eject(), true)
    }
}

fn properties_args(hardware_id: &str) -> Vec<String> {
    vec!["-prcap".into(), format!("dev={}", hardware_id)]
}

fn boundaries_args(hardware_id: &str) -> Vec<String> {
    vec!["-msinfo".into(), format!("dev={}", hardware_id)]
}

fn blank_args(hardware_id: &str, drive_speed: Option<u32>) -> Vec<String> {
    let mut args = vec!["-v".to_string(), "blank=fast".to_string()];
    if let Some(speed) = drive_speed {
        args.push(format!("speed={}", speed));
    }
    args.push(format!("dev={}", hardware_id));
    args
}

fn write_args(
    hardware_id: &str,
    image_path: &Path,
    drive_speed: Option<u32>,
    write_multi: bool,
) -> Vec<String> {
    let mut args = vec!["-v".to_string()];
    if let Some(speed) = drive_speed {
        args.push(format!("speed={}", speed));
    }
    args.push(format!("dev={}", hardware_id));
    if write_multi {
        args.push("-multi".into());
    }
    args.push("-data".into());
    args.push(image_path.to_string_lossy().into_owned());
    args
}
