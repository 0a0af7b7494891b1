//! Parsers for external tool output.
//!
//! Each parser takes the output as an ordered sequence of lines and is
//! independent of process execution. Absent optional information yields a
//! default; malformed required information yields [`WriterError::Parse`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{Result, WriterError};
use crate::media::SessionBoundaries;
use crate::units::{display_bytes, fractional_sectors_to_bytes, kbytes_to_bytes, SECTOR_SIZE};

static DEVICE_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Device type\s*:\s*(.*?)\s*$").unwrap());
static VENDOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Vendor_info\s*:\s*'\s*(.*?)\s*'").unwrap());
static IDENTIFICATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Identifikation\s*:\s*'\s*(.*?)\s*'").unwrap());
static BUFFER_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Buffer size in KB:\s*(.*?)\s*$").unwrap());
static MULTI_SESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Does read multi-session").unwrap());
static TRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Loading mechanism type: tray").unwrap());
static EJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Does support ejection").unwrap());

static BOUNDARIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([0-9]+)\s*,\s*([0-9]+)\s*$").unwrap());

static READ_CAPACITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^READ CAPACITY:\s*([0-9]+)\*([0-9]+)=([0-9]+)").unwrap());

static OVERBURN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:-\(\s*.*:\s*(.*) blocks are free, (.*) to be written!").unwrap()
});

/// Device attributes reported by `cdrecord -prcap`.
///
/// Descriptive fields are `None` ("unknown") and capability flags `false`
/// when the corresponding line is missing from the probe output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceProperties {
    pub device_type: Option<String>,
    pub vendor: Option<String>,
    pub id: Option<String>,
    /// Write buffer size in bytes.
    pub buffer_size: Option<u64>,
    pub supports_multi: bool,
    pub has_tray: bool,
    pub can_eject: bool,
}

/// Parse capability probe output. Unrecognized lines are skipped.
pub fn parse_properties_output<S: AsRef<str>>(lines: &[S]) -> DeviceProperties {
    let mut props = DeviceProperties::default();

    for line in lines.iter().map(AsRef::as_ref) {
        if let Some(caps) = DEVICE_TYPE.captures(line) {
            props.device_type = Some(caps[1].to_string());
            info!("Device type is [{}].", &caps[1]);
        } else if let Some(caps) = VENDOR.captures(line) {
            props.vendor = Some(caps[1].to_string());
            info!("Device vendor is [{}].", &caps[1]);
        } else if let Some(caps) = IDENTIFICATION.captures(line) {
            props.id = Some(caps[1].to_string());
            info!("Device id is [{}].", &caps[1]);
        } else if let Some(caps) = BUFFER_SIZE.captures(line) {
            if let Ok(kbytes) = caps[1].parse::<u64>() {
                let bytes = kbytes_to_bytes(kbytes);
                props.buffer_size = Some(bytes);
                info!("Device buffer size is [{}] bytes.", bytes);
            }
        } else if MULTI_SESSION.is_match(line) {
            props.supports_multi = true;
            info!("Device does support multisession discs.");
        } else if TRAY.is_match(line) {
            props.has_tray = true;
            info!("Device has a tray.");
        } else if EJECT.is_match(line) {
            props.can_eject = true;
            info!("Device can eject its media.");
        }
    }

    props
}

/// Parse `cdrecord -msinfo` output.
///
/// No output at all means the disc could not be read (typically an unwritten
/// disc) and yields `None`. Otherwise the first line must be `<lower>,<upper>`
/// with non-negative integers; later lines are ignored.
pub fn parse_boundaries_output<S: AsRef<str>>(lines: &[S]) -> Result<Option<SessionBoundaries>> {
    let Some(first) = lines.first().map(AsRef::as_ref) else {
        warn!("Unable to read disc (might not be initialized); returning full capacity.");
        return Ok(None);
    };

    let caps = BOUNDARIES
        .captures(first)
        .ok_or_else(|| WriterError::parse("boundaries", format!("unexpected line '{}'", first)))?;

    let lower = caps[1]
        .parse::<u64>()
        .map_err(|e| WriterError::parse("boundaries", e.to_string()))?;
    let upper = caps[2]
        .parse::<u64>()
        .map_err(|e| WriterError::parse("boundaries", e.to_string()))?;

    Ok(Some(SessionBoundaries::new(lower, upper)))
}

/// Parse `mkisofs -print-size` output: exactly one line holding a sector count.
/// Returns the size in bytes.
pub fn parse_size_output<S: AsRef<str>>(lines: &[S]) -> Result<u64> {
    let [line] = lines else {
        return Err(WriterError::parse(
            "mkisofs",
            format!("expected a single line, got {}", lines.len()),
        ));
    };
    let line = line.as_ref().trim();
    let sectors = line
        .parse::<f64>()
        .ok()
        .filter(|sectors| sectors.is_finite() && *sectors >= 0.0)
        .ok_or_else(|| WriterError::parse("mkisofs", format!("'{}' is not a sector count", line)))?;
    Ok(fractional_sectors_to_bytes(sectors))
}

/// Parse `dvd+rw-mediainfo` output for the sectors already used on the disc.
///
/// Only the first `READ CAPACITY: <sectors>*<size>=<bytes>` line counts.
pub fn parse_read_capacity<S: AsRef<str>>(lines: &[S]) -> Result<u64> {
    let caps = lines
        .iter()
        .find_map(|line| READ_CAPACITY.captures(line.as_ref()))
        .ok_or_else(|| WriterError::parse("dvd+rw-mediainfo", "no READ CAPACITY line found"))?;

    let sectors = caps[1]
        .parse::<u64>()
        .map_err(|e| WriterError::parse("dvd+rw-mediainfo", e.to_string()))?;
    if caps[2].parse::<u64>().ok() != Some(SECTOR_SIZE) {
        warn!(
            "Media reports sector size {} rather than {}; capacity may be inaccurate.",
            &caps[2], SECTOR_SIZE
        );
    }
    Ok(sectors)
}

/// Space figures from a `growisofs` overburn complaint, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overburn {
    pub available: Option<u64>,
    pub required: Option<u64>,
}

impl From<Overburn> for WriterError {
    fn from(overburn: Overburn) -> Self {
        WriterError::InsufficientCapacity {
            required: overburn.required,
            available: overburn.available,
        }
    }
}

/// Look for a `:-( <device>: <N> blocks are free, <M> to be written!` line.
///
/// Counts that cannot be parsed are reported as `None`; the overburn is
/// still detected.
pub fn search_for_overburn<S: AsRef<str>>(lines: &[S]) -> Option<Overburn> {
    let caps = lines
        .iter()
        .find_map(|line| OVERBURN.captures(line.as_ref()))?;

    let blocks_to_bytes = |raw: &str| {
        raw.trim()
            .parse::<f64>()
            .ok()
            .map(fractional_sectors_to_bytes)
    };
    let overburn = Overburn {
        available: blocks_to_bytes(&caps[1]),
        required: blocks_to_bytes(&caps[2]),
    };

    match (overburn.required, overburn.available) {
        (Some(required), Some(available)) => error!(
            "Image [{}] does not fit in available capacity [{}].",
            display_bytes(required),
            display_bytes(available)
        ),
        _ => error!("Image does not fit in available capacity (no useful capacity info available)."),
    }
    Some(overburn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    const PRCAP_OUTPUT: &str = "\
Cdrecord-Clone 2.01 (i686-pc-linux-gnu) Copyright (C) 1995-2004 Joerg Schilling
scsidev: 'ATA:1,0,0'
devname: 'ATA'
scsibus: 1 target: 0 lun: 0
Device type    : Removable CD-ROM
Version        : 0
Vendor_info    : 'SONY    '
Identifikation : 'CD-RW  CRX140E  '
Revision       : '1.0n'
Device seems to be: Generic mmc CD-RW.

Drive capabilities, per MMC-3 page 2A:

  Does read CD-R media
  Does write CD-R media
  Does read CD-RW media
  Does write CD-RW media
  Does read multi-session CDs
  Does support ejection of CD via START/STOP command
  Loading mechanism type: tray
  Buffer size in KB: 4096
";

    #[test]
    fn test_parse_properties_full_output() {
        let props = parse_properties_output(&lines(PRCAP_OUTPUT));
        assert_eq!(props.device_type.as_deref(), Some("Removable CD-ROM"));
        assert_eq!(props.vendor.as_deref(), Some("SONY"));
        assert_eq!(props.id.as_deref(), Some("CD-RW  CRX140E"));
        assert_eq!(props.buffer_size, Some(4096 * 1024));
        assert!(props.supports_multi);
        assert!(props.has_tray);
        assert!(props.can_eject);
    }

    #[test]
    fn test_parse_properties_empty_output() {
        let props = parse_properties_output::<&str>(&[]);
        assert_eq!(props, DeviceProperties::default());
    }

    #[test]
    fn test_parse_properties_partial_output() {
        let props = parse_properties_output(&[
            "garbage",
            "  Loading mechanism type: caddy",
            "  Buffer size in KB: lots",
            "  Does read multi-session CDs",
        ]);
        assert_eq!(props.device_type, None);
        assert_eq!(props.buffer_size, None);
        assert!(props.supports_multi);
        assert!(!props.has_tray);
        assert!(!props.can_eject);
    }

    #[test]
    fn test_parse_boundaries() {
        let parsed = parse_boundaries_output(&lines("268582,302230\n")).unwrap();
        assert_eq!(parsed, Some(SessionBoundaries::new(268_582, 302_230)));
    }

    #[test]
    fn test_parse_boundaries_whitespace_and_trailing_lines() {
        let parsed = parse_boundaries_output(&["  0 , 11702 ", "trailing noise"]).unwrap();
        assert_eq!(parsed, Some(SessionBoundaries::new(0, 11_702)));
    }

    #[test]
    fn test_parse_boundaries_empty_is_none() {
        assert_eq!(parse_boundaries_output::<&str>(&[]).unwrap(), None);
    }

    #[test]
    fn test_parse_boundaries_negative_rejected() {
        let err = parse_boundaries_output(&lines("-268582,302230\n")).unwrap_err();
        assert!(matches!(err, WriterError::Parse { .. }));
        assert!(parse_boundaries_output(&["268582,-302230"]).is_err());
    }

    #[test]
    fn test_parse_boundaries_leading_junk_rejected() {
        let err = parse_boundaries_output(&["cdrecord: warning", "268582,302230"]).unwrap_err();
        assert!(matches!(err, WriterError::Parse { .. }));
    }

    #[test]
    fn test_parse_boundaries_wrong_shape_rejected() {
        assert!(parse_boundaries_output(&["268582"]).is_err());
        assert!(parse_boundaries_output(&["1,2,3"]).is_err());
        assert!(parse_boundaries_output(&[","]).is_err());
    }

    #[test]
    fn test_parse_size_output() {
        assert_eq!(parse_size_output(&["5"]).unwrap(), 5 * 2048);
        assert_eq!(parse_size_output(&[" 177.0 "]).unwrap(), 177 * 2048);
    }

    #[test]
    fn test_parse_size_output_rejects_bad_shapes() {
        assert!(parse_size_output::<&str>(&[]).is_err());
        assert!(parse_size_output(&["1", "2"]).is_err());
        assert!(parse_size_output(&["Total extents: 5"]).is_err());
        assert!(parse_size_output(&["-5"]).is_err());
    }

    #[test]
    fn test_parse_read_capacity() {
        let output = lines(
            "INQUIRY:                [_NEC    ][DVD_RW ND-3500AG][2.16]\n\
             GET [CURRENT] CONFIGURATION:\n \
             Mounted Media:         1Ah, DVD+RW\n\
             READ CAPACITY:          15*2048=30720\n\
             READ CAPACITY:          99*2048=202752\n",
        );
        assert_eq!(parse_read_capacity(&output).unwrap(), 15);
    }

    #[test]
    fn test_parse_read_capacity_blank_media() {
        assert_eq!(parse_read_capacity(&["READ CAPACITY:          0*2048=0"]).unwrap(), 0);
    }

    #[test]
    fn test_parse_read_capacity_missing_line() {
        let err = parse_read_capacity(&["INQUIRY: whatever"]).unwrap_err();
        assert!(matches!(err, WriterError::Parse { .. }));
    }

    #[test]
    fn test_search_for_overburn() {
        let overburn = search_for_overburn(&lines(
            ":-( /dev/cdrom: 894048 blocks are free, 2033746 to be written!\n",
        ))
        .unwrap();
        assert_eq!(overburn.available, Some(894_048 * 2048));
        assert_eq!(overburn.required, Some(2_033_746 * 2048));

        match WriterError::from(overburn) {
            WriterError::InsufficientCapacity {
                required,
                available,
            } => {
                assert_eq!(required, Some(2_033_746 * 2048));
                assert_eq!(available, Some(894_048 * 2048));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_search_for_overburn_among_other_lines() {
        let overburn = search_for_overburn(&[
            "Executing 'builtin_dd if=/tmp/image.iso of=/dev/cdrom obs=32k seek=0'",
            ":-( /dev/cdrom: 10 blocks are free, 20 to be written!",
        ])
        .unwrap();
        assert_eq!(overburn.available, Some(10 * 2048));
    }

    #[test]
    fn test_search_for_overburn_unparsable_counts() {
        let overburn =
            search_for_overburn(&[":-( /dev/cdrom: many blocks are free, more to be written!"])
                .unwrap();
        assert_eq!(overburn.available, None);
        assert_eq!(overburn.required, None);
    }

    #[test]
    fn test_search_for_overburn_absent() {
        assert!(search_for_overburn(&[":-( unable to open /dev/cdrom"]).is_none());
        assert!(search_for_overburn::<&str>(&[]).is_none());
    }
}
