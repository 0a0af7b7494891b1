//! Compose ISO 9660 images and write them to optical discs.
//!
//! The crate drives the usual command-line burning tools rather than talking
//! to drives directly:
//!
//! - **CD-R/CD-RW** - `cdrecord` for probing, blanking and writing, `mkisofs`
//!   for the image, with multisession continuation
//! - **DVD+R/DVD+RW** - `growisofs` composes and writes in one pass,
//!   `dvd+rw-mediainfo` reports used space
//! - **Tray control** - `eject`
//!
//! # Architecture
//!
//! ```text
//! config ──> writer::{CdWriter, DvdWriter} : ImageWriter
//!                 │
//!                 ├── image::IsoImage      mkisofs argument composition
//!                 ├── media                capacity arithmetic
//!                 ├── parse                tool output parsers
//!                 └── process::Toolchain   command paths + runner
//! ```
//!
//! Every external command goes through a [`process::Toolchain`], so tests
//! (and dry environments) swap in a [`process::ScriptedRunner`] instead of
//! real hardware.
//!
//! # Example
//!
//! ```rust,ignore
//! use optical_writer::{CdWriter, DeviceSpec, ImageWriter, MediaType, Toolchain, WriteOptions};
//!
//! let spec = DeviceSpec::new("/dev/cdrw", MediaType::Cdrw74);
//! let mut writer = CdWriter::open(&spec, Toolchain::default())?;
//! writer.initialize_image(true, Path::new("/var/tmp"))?;
//! writer.add_image_entry(Path::new("/home/user/photos"), Some("photos"))?;
//! writer.write_image(&WriteOptions::default())?;
//! ```

pub mod config;
pub mod error;
pub mod image;
pub mod media;
pub mod parse;
pub mod preflight;
pub mod process;
pub mod units;
pub mod validate;
pub mod writer;

pub use config::WriterConfig;
pub use error::{Result, WriterError};
pub use image::IsoImage;
pub use media::{MediaCapacity, MediaClass, MediaDefinition, MediaType, SessionBoundaries};
pub use parse::DeviceProperties;
pub use process::{CommandPaths, Toolchain};
pub use writer::{CdWriter, DeviceSpec, DvdWriter, ImagePhase, ImageWriter, WriteOptions};
