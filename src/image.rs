//! ISO image composition.
//!
//! [`IsoImage`] collects source paths and the graft points they should
//! appear under, then drives `mkisofs` either to estimate the resulting
//! image size or to build the image on disk.
//!
//! # Graft points
//!
//! Without a graft point an entry lands at the root of the image. A
//! directory added normally keeps its own name beneath the graft point;
//! added with `contents_only` its children land directly at the graft point.
//! That second mode matches how `mkisofs` itself treats a bare directory
//! argument.
//!
//! # Example
//!
//! ```rust,ignore
//! use optical_writer::image::IsoImage;
//! use optical_writer::process::Toolchain;
//! use std::path::Path;
//!
//! let mut image = IsoImage::new(Toolchain::default());
//! image.add_entry(Path::new("/var/backup/daily"), Some("backup"), false, true)?;
//! let bytes = image.estimated_size()?;
//! image.write_image(Path::new("/tmp/backup.iso"))?;
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, WriterError};
use crate::media::SessionBoundaries;
use crate::parse::parse_size_output;
use crate::process::Toolchain;
use crate::validate::is_valid_scsi_id;

pub const MKISOFS: &str = "mkisofs";

/// Source path to destination graft point, kept sorted by source path.
pub type ImageEntries = BTreeMap<PathBuf, Option<String>>;

#[derive(Debug, Clone)]
pub struct IsoImage {
    toolchain: Toolchain,
    device: Option<String>,
    boundaries: Option<SessionBoundaries>,
    graft_point: Option<String>,
    use_rock_ridge: bool,
    application_id: Option<String>,
    biblio_file: Option<String>,
    publisher_id: Option<String>,
    preparer_id: Option<String>,
    volume_id: Option<String>,
    entries: ImageEntries,
}

impl IsoImage {
    pub fn new(toolchain: Toolchain) -> Self {
        debug!("Created new ISO image object.");
        Self {
            toolchain,
            device: None,
            boundaries: None,
            graft_point: None,
            use_rock_ridge: true,
            application_id: None,
            biblio_file: None,
            publisher_id: None,
            preparer_id: None,
            volume_id: None,
            entries: ImageEntries::new(),
        }
    }

    /// Image that continues the multisession disc in `device` after `boundaries`.
    pub fn for_session(
        toolchain: Toolchain,
        device: Option<&str>,
        boundaries: Option<SessionBoundaries>,
    ) -> Result<Self> {
        let mut image = Self::new(toolchain);
        image.set_device(device)?;
        image.set_boundaries(boundaries);
        Ok(image)
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Device the image will be written to: an absolute path or a SCSI id.
    pub fn set_device(&mut self, device: Option<&str>) -> Result<()> {
        match device {
            Some(dev) if !Path::new(dev).is_absolute() && !is_valid_scsi_id(dev) => {
                Err(WriterError::invalid_argument(format!(
                    "device '{}' must either be an absolute path or a valid SCSI id",
                    dev
                )))
            }
            _ => {
                self.device = device.map(str::to_string);
                Ok(())
            }
        }
    }

    pub fn boundaries(&self) -> Option<SessionBoundaries> {
        self.boundaries
    }

    pub fn set_boundaries(&mut self, boundaries: Option<SessionBoundaries>) {
        self.boundaries = boundaries;
    }

    /// Image-wide graft point used when an entry does not name its own.
    pub fn graft_point(&self) -> Option<&str> {
        self.graft_point.as_deref()
    }

    pub fn set_graft_point(&mut self, graft_point: Option<&str>) -> Result<()> {
        self.graft_point = non_empty("graft point", graft_point)?;
        Ok(())
    }

    pub fn use_rock_ridge(&self) -> bool {
        self.use_rock_ridge
    }

    pub fn set_use_rock_ridge(&mut self, enabled: bool) {
        self.use_rock_ridge = enabled;
    }

    pub fn set_application_id(&mut self, value: Option<&str>) -> Result<()> {
        self.application_id = non_empty("application id", value)?;
        Ok(())
    }

    pub fn set_biblio_file(&mut self, value: Option<&str>) -> Result<()> {
        self.biblio_file = non_empty("biblio file", value)?;
        Ok(())
    }

    pub fn set_publisher_id(&mut self, value: Option<&str>) -> Result<()> {
        self.publisher_id = non_empty("publisher id", value)?;
        Ok(())
    }

    pub fn set_preparer_id(&mut self, value: Option<&str>) -> Result<()> {
        self.preparer_id = non_empty("preparer id", value)?;
        Ok(())
    }

    pub fn set_volume_id(&mut self, value: Option<&str>) -> Result<()> {
        self.volume_id = non_empty("volume id", value)?;
        Ok(())
    }

    pub fn entries(&self) -> &ImageEntries {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a file or directory to the image.
    ///
    /// # Arguments
    ///
    /// * `path` - Existing file or directory; soft links are rejected
    /// * `graft_point` - Destination in the image, else the image-wide default
    /// * `override_existing` - Replace the destination of an already-added path
    /// * `contents_only` - Place a directory's children at the graft point
    ///   instead of a subdirectory named after it
    pub fn add_entry(
        &mut self,
        path: &Path,
        graft_point: Option<&str>,
        override_existing: bool,
        contents_only: bool,
    ) -> Result<()> {
        let path = source_key(path)?;

        if !override_existing && self.entries.contains_key(&path) {
            return Err(WriterError::invalid_argument(format!(
                "path '{}' has already been added to the image",
                path.display()
            )));
        }

        let metadata = std::fs::symlink_metadata(&path).map_err(|_| {
            WriterError::invalid_argument(format!("path '{}' does not exist", path.display()))
        })?;
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            return Err(WriterError::invalid_argument(format!(
                "path '{}' must not be a link",
                path.display()
            )));
        }

        let graft = graft_point.or(self.graft_point.as_deref());
        let destination = if file_type.is_dir() {
            if contents_only {
                graft.map(str::to_string)
            } else {
                let name = path
                    .file_name()
                    .ok_or_else(|| {
                        WriterError::invalid_argument(format!(
                            "directory '{}' has no name to graft",
                            path.display()
                        ))
                    })?
                    .to_string_lossy();
                Some(match graft {
                    Some(graft) => join_graft(graft, &name),
                    None => name.into_owned(),
                })
            }
        } else if file_type.is_file() {
            graft.map(str::to_string)
        } else {
            return Err(WriterError::invalid_argument(format!(
                "path '{}' must be a file or a directory",
                path.display()
            )));
        };

        debug!(
            "Image entry [{}] -> [{}]",
            path.display(),
            destination.as_deref().unwrap_or("/")
        );
        self.entries.insert(path, destination);
        Ok(())
    }

    /// Estimated size of the image in bytes, via `mkisofs -print-size`.
    pub fn estimated_size(&self) -> Result<u64> {
        self.require_entries()?;
        let result = self
            .toolchain
            .cmd(MKISOFS)
            .args(self.size_args())
            .error_msg("executing mkisofs command to estimate size")
            .run()?;
        parse_size_output(&result.stdout_lines())
    }

    /// Build the image at `image_path`.
    pub fn write_image(&self, image_path: &Path) -> Result<()> {
        self.require_entries()?;
        self.toolchain
            .cmd(MKISOFS)
            .args(self.write_args(image_path))
            .error_msg("executing mkisofs command to build image")
            .run()?;
        Ok(())
    }

    /// Arguments for the size-estimate invocation.
    pub fn size_args(&self) -> Vec<String> {
        let mut args = self.general_args();
        args.push("-print-size".into());
        args.push("-graft-points".into());
        if self.use_rock_ridge {
            args.push("-r".into());
        }
        args.extend(self.session_args());
        args.extend(graft_args(&self.entries));
        args
    }

    /// Arguments for the image-build invocation writing to `image_path`.
    pub fn write_args(&self, image_path: &Path) -> Vec<String> {
        let mut args = self.general_args();
        args.push("-graft-points".into());
        if self.use_rock_ridge {
            args.push("-r".into());
        }
        args.push("-o".into());
        args.push(image_path.to_string_lossy().into_owned());
        args.extend(self.session_args());
        args.extend(graft_args(&self.entries));
        args
    }

    fn general_args(&self) -> Vec<String> {
        let header = [
            ("-A", &self.application_id),
            ("-biblio", &self.biblio_file),
            ("-publisher", &self.publisher_id),
            ("-p", &self.preparer_id),
            ("-V", &self.volume_id),
        ];
        header
            .into_iter()
            .filter_map(|(flag, value)| value.as_ref().map(|v| [flag.to_string(), v.clone()]))
            .flatten()
            .collect()
    }

    fn session_args(&self) -> Vec<String> {
        match (&self.device, self.boundaries) {
            (Some(device), Some(boundaries)) => vec![
                "-C".into(),
                boundaries.to_string(),
                "-M".into(),
                device.clone(),
            ],
            _ => Vec::new(),
        }
    }

    fn require_entries(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(WriterError::invalid_state(
                "image does not contain any entries",
            ));
        }
        Ok(())
    }
}

/// Encode entries as `mkisofs -graft-points` arguments, in source-path order.
///
/// Entries without a graft point are passed as bare paths; others as
/// `<graft point>/=<source>`.
pub fn graft_args(entries: &ImageEntries) -> Vec<String> {
    entries
        .iter()
        .map(|(path, graft)| match graft {
            None => path.to_string_lossy().into_owned(),
            Some(graft) => format!("{}/={}", graft.trim_matches('/'), path.display()),
        })
        .collect()
}

/// Absolute, `..`-free key for a source path.
///
/// Only the parent directory is resolved, so a soft link as the final
/// component is still seen as a link.
fn source_key(path: &Path) -> Result<PathBuf> {
    let missing = |path: &Path| {
        WriterError::invalid_argument(format!("path '{}' does not exist", path.display()))
    };
    let absolute = std::path::absolute(path).map_err(|e| {
        WriterError::invalid_argument(format!("path '{}' is not usable: {}", path.display(), e))
    })?;

    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => Ok(std::fs::canonicalize(parent)
            .map_err(|_| missing(&absolute))?
            .join(name)),
        // root, or a path ending in `..`
        _ => std::fs::canonicalize(&absolute).map_err(|_| missing(&absolute)),
    }
}

fn join_graft(graft: &str, name: &str) -> String {
    format!("{}/{}", graft.trim_end_matches('/'), name)
}

fn non_empty(field: &str, value: Option<&str>) -> Result<Option<String>> {
    match value {
        Some("") => Err(WriterError::invalid_argument(format!(
            "the {} must be a non-empty string",
            field
        ))),
        other => Ok(other.map(str::to_string)),
    }
}
