//! Preflight checks for disc writing.
//!
//! Validates that the host has the external tools a writer drives before any
//! device is opened. A missing `growisofs` otherwise only shows up as a spawn
//! failure halfway through a write.
//!
//! # Example
//!
//! ```rust
//! use optical_writer::preflight::{check_required_tools, CD_REQUIRED_TOOLS};
//! use optical_writer::process::CommandPaths;
//!
//! if let Err(e) = check_required_tools(&CommandPaths::default(), CD_REQUIRED_TOOLS) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

use crate::config::WriterConfig;
use crate::image::MKISOFS;
use crate::media::MediaClass;
use crate::process::CommandPaths;
use crate::writer::cd::CDRECORD;
use crate::writer::dvd::{GROWISOFS, MEDIAINFO};
use crate::writer::EJECT;

/// Check if a command resolves to an executable on this host.
pub fn command_exists(paths: &CommandPaths, cmd: &str) -> bool {
    paths.locate(cmd).is_some()
}

/// Tools used by the CD writer.
///
/// Each tuple is (command_name, package_name).
pub const CD_REQUIRED_TOOLS: &[(&str, &str)] = &[
    (CDRECORD, "wodim"),
    (MKISOFS, "genisoimage"),
    (EJECT, "eject"),
];

/// Tools used by the DVD writer. `mkisofs` is only used for size estimates.
pub const DVD_REQUIRED_TOOLS: &[(&str, &str)] = &[
    (GROWISOFS, "dvd+rw-tools"),
    (MEDIAINFO, "dvd+rw-tools"),
    (MKISOFS, "genisoimage"),
    (EJECT, "eject"),
];

pub fn required_tools(class: MediaClass) -> &'static [(&'static str, &'static str)] {
    match class {
        MediaClass::Cd => CD_REQUIRED_TOOLS,
        MediaClass::Dvd => DVD_REQUIRED_TOOLS,
    }
}

/// Check that specific tools are available.
///
/// # Arguments
///
/// * `paths` - Command overrides; names without one are searched in `PATH`
/// * `tools` - Slice of (command, package) tuples
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(paths: &CommandPaths, tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(paths, tool))
        .map(|(tool, package)| {
            format!(
                "  {} [{}] (install: {})",
                tool,
                paths.resolve(tool).display(),
                package
            )
        })
        .collect();

    if !missing.is_empty() {
        bail!("Missing required host tools:\n{}", missing.join("\n"));
    }

    Ok(())
}

/// Check every tool the writer for `class` needs.
pub fn check_writer_tools(paths: &CommandPaths, class: MediaClass) -> Result<()> {
    check_required_tools(paths, required_tools(class))
}

/// Check the tools of a configured writer, honoring its command overrides.
pub fn check_configured_tools(config: &WriterConfig) -> Result<()> {
    check_writer_tools(&config.commands, config.class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        let paths = CommandPaths::default();
        // 'ls' should exist on any Unix system
        assert!(command_exists(&paths, "ls"));
        assert!(!command_exists(&paths, "definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_override_is_honored() {
        let paths = CommandPaths::new().with(CDRECORD, "/nonexistent/bin/cdrecord");
        assert!(!command_exists(&paths, CDRECORD));

        let paths = CommandPaths::new().with("burner", "ls");
        assert!(command_exists(&paths, "burner"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(&CommandPaths::default(), tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_failure_lists_packages() {
        let paths = CommandPaths::new().with(GROWISOFS, "/nonexistent/growisofs");
        let tools = &[("ls", "coreutils"), (GROWISOFS, "dvd+rw-tools")];
        let err = check_required_tools(&paths, tools).unwrap_err().to_string();
        assert!(err.contains("growisofs [/nonexistent/growisofs] (install: dvd+rw-tools)"));
        assert!(!err.contains("coreutils"));
    }

    #[test]
    fn test_configured_overrides_are_checked() {
        let config = WriterConfig::parse(
            "[writer]\nkind = \"dvd\"\ndevice = \"/dev/dvd\"\nmedia = \"dvd+r\"\n\n[commands]\ngrowisofs = \"/nonexistent/growisofs\"\n",
        )
        .unwrap();
        let err = check_configured_tools(&config).unwrap_err().to_string();
        assert!(err.contains("growisofs [/nonexistent/growisofs] (install: dvd+rw-tools)"));
    }

    #[test]
    fn test_required_tools_per_class() {
        assert!(required_tools(MediaClass::Cd).iter().any(|(t, _)| *t == CDRECORD));
        assert!(required_tools(MediaClass::Dvd).iter().any(|(t, _)| *t == GROWISOFS));
        assert!(!required_tools(MediaClass::Dvd).iter().any(|(t, _)| *t == CDRECORD));
    }
}
