//! Writer configuration file.
//!
//! ```toml
//! [writer]
//! kind = "cd"
//! device = "/dev/cdrw"
//! scsi_id = "ATA:1,0,0"
//! drive_speed = 4
//! media = "cdrw-74"
//!
//! [commands]
//! cdrecord = "/opt/schily/bin/cdrecord"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::media::{MediaClass, MediaType};
use crate::process::{CommandPaths, Toolchain};
use crate::writer::{CdWriter, DeviceSpec, DvdWriter, ImageWriter};

const CONFIG_DIR: &str = "optical-writer";
const CONFIG_FILE: &str = "writer.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriterConfigToml {
    writer: WriterSectionToml,
    commands: Option<BTreeMap<String, PathBuf>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriterSectionToml {
    kind: String,
    device: PathBuf,
    scsi_id: Option<String>,
    drive_speed: Option<i64>,
    media: String,
}

/// A parsed configuration: which writer to build and how to reach its tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub class: MediaClass,
    pub device: DeviceSpec,
    pub commands: CommandPaths,
}

impl WriterConfig {
    /// `<config dir>/optical-writer/writer.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("could not determine user config directory")?;
        Ok(base.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading writer config '{}'", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("parsing writer config '{}'", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let parsed: WriterConfigToml = toml::from_str(contents)?;
        let section = parsed.writer;

        let class = match section.kind.trim().to_ascii_lowercase().as_str() {
            "cd" => MediaClass::Cd,
            "dvd" => MediaClass::Dvd,
            other => bail!("unsupported writer kind '{}'; expected 'cd' or 'dvd'", other),
        };
        let media_type: MediaType = section.media.parse()?;
        if media_type.class() != class {
            bail!(
                "media '{}' cannot be used with a {} writer",
                media_type,
                class
            );
        }

        let mut commands = CommandPaths::new();
        for (name, path) in parsed.commands.unwrap_or_default() {
            commands.set(name, path);
        }

        Ok(Self {
            class,
            device: DeviceSpec {
                device: section.device,
                scsi_id: section.scsi_id,
                drive_speed: section.drive_speed,
                media_type,
            },
            commands,
        })
    }

    pub fn toolchain(&self) -> Toolchain {
        Toolchain::with_paths(self.commands.clone())
    }

    /// Open the configured drive, probing it where the writer does so.
    pub fn open_writer(&self) -> Result<Box<dyn ImageWriter>> {
        let toolchain = self.toolchain();
        let device = self.device.device.display().to_string();
        let writer: Box<dyn ImageWriter> = match self.class {
            MediaClass::Cd => Box::new(
                CdWriter::open(&self.device, toolchain)
                    .with_context(|| format!("opening CD writer '{}'", device))?,
            ),
            MediaClass::Dvd => Box::new(
                DvdWriter::open(&self.device, toolchain)
                    .with_context(|| format!("opening DVD writer '{}'", device))?,
            ),
        };
        Ok(writer)
    }

    /// Build the configured writer without touching hardware.
    pub fn detached_writer(&self, toolchain: Toolchain) -> Result<Box<dyn ImageWriter>> {
        let writer: Box<dyn ImageWriter> = match self.class {
            MediaClass::Cd => Box::new(CdWriter::detached(&self.device, toolchain)?),
            MediaClass::Dvd => Box::new(DvdWriter::detached(&self.device, toolchain)?),
        };
        Ok(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ScriptedRunner;
    use crate::writer::ImagePhase;
    use std::sync::Arc;
    use tempfile::TempDir;

    const CD_CONFIG: &str = r#"
[writer]
kind = "cd"
device = "/dev/cdrw"
scsi_id = "ATA:1,0,0"
drive_speed = 4
media = "cdrw-74"

[commands]
cdrecord = "/opt/schily/bin/cdrecord"
"#;

    #[test]
    fn test_parse_cd_config() {
        let config = WriterConfig::parse(CD_CONFIG).unwrap();
        assert_eq!(config.class, MediaClass::Cd);
        assert_eq!(config.device.device, PathBuf::from("/dev/cdrw"));
        assert_eq!(config.device.scsi_id.as_deref(), Some("ATA:1,0,0"));
        assert_eq!(config.device.drive_speed, Some(4));
        assert_eq!(config.device.media_type, MediaType::Cdrw74);
        assert_eq!(
            config.commands.resolve("cdrecord"),
            PathBuf::from("/opt/schily/bin/cdrecord")
        );
        assert_eq!(config.commands.resolve("eject"), PathBuf::from("eject"));
    }

    #[test]
    fn test_parse_minimal_dvd_config() {
        let config = WriterConfig::parse(
            "[writer]\nkind = \"DVD\"\ndevice = \"/dev/dvd\"\nmedia = \"dvd+rw\"\n",
        )
        .unwrap();
        assert_eq!(config.class, MediaClass::Dvd);
        assert_eq!(config.device.scsi_id, None);
        assert_eq!(config.device.drive_speed, None);
        assert_eq!(config.commands, CommandPaths::new());
    }

    #[test]
    fn test_rejects_mismatched_media() {
        let err = WriterConfig::parse(
            "[writer]\nkind = \"cd\"\ndevice = \"/dev/cdrw\"\nmedia = \"dvd+r\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot be used"));
    }

    #[test]
    fn test_rejects_unknown_kind_and_fields() {
        assert!(WriterConfig::parse(
            "[writer]\nkind = \"bluray\"\ndevice = \"/dev/sr0\"\nmedia = \"cdr-74\"\n"
        )
        .is_err());
        assert!(WriterConfig::parse(
            "[writer]\nkind = \"cd\"\ndevice = \"/dev/sr0\"\nmedia = \"cdr-74\"\nburnfree = true\n"
        )
        .is_err());
    }

    #[test]
    fn test_load_names_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("writer.toml");
        std::fs::write(&path, "[writer]\n").unwrap();

        let err = WriterConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("writer.toml"));

        std::fs::write(&path, CD_CONFIG).unwrap();
        assert!(WriterConfig::load(&path).is_ok());
    }

    #[test]
    fn test_detached_writer_matches_kind() {
        let config = WriterConfig::parse(CD_CONFIG).unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let toolchain = Toolchain::new(config.commands.clone(), runner.clone());

        let writer = config.detached_writer(toolchain).unwrap();
        assert_eq!(writer.hardware_id(), "ATA:1,0,0");
        assert_eq!(writer.drive_speed(), Some(4));
        assert!(writer.is_rewritable());
        assert_eq!(writer.phase(), ImagePhase::Uninitialized);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_default_path_under_config_dir() {
        let path = WriterConfig::default_path().unwrap();
        assert!(path.ends_with("optical-writer/writer.toml"));
        assert_eq!(
            path.parent().and_then(Path::parent),
            dirs::config_dir().as_deref()
        );
    }

    #[test]
    fn test_open_writer_requires_device() {
        let config = WriterConfig::parse(
            "[writer]\nkind = \"dvd\"\ndevice = \"/nonexistent/dvd\"\nmedia = \"dvd+r\"\n",
        )
        .unwrap();
        let err = config.open_writer().unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/dvd"));
    }
}
