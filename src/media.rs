//! Media definitions and capacity bookkeeping.
//!
//! A [`MediaDefinition`] is a constant table entry keyed by [`MediaType`]:
//! total capacity in sectors plus, for CD media, the lead-in overhead that
//! every write session consumes. [`compute_capacity`] turns a definition and
//! the last session's [`SessionBoundaries`] into a [`MediaCapacity`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, WriterError};
use crate::units::{display_bytes, gbytes_to_sectors, mbytes_to_sectors, sectors_to_bytes};

/// Lead-in consumed by the first session on a CD, in sectors (per cdrecord).
pub const CD_INITIAL_LEAD_IN: u64 = 11_400;

/// Lead-in consumed by every later session on a CD, in sectors (per cdrecord).
pub const CD_SESSION_LEAD_IN: u64 = 6_900;

/// Broad family of a media type; each writer handles exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    Cd,
    Dvd,
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaClass::Cd => f.write_str("cd"),
            MediaClass::Dvd => f.write_str("dvd"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MediaType {
    /// 74-minute CD-R (650 MB).
    #[serde(rename = "cdr-74")]
    Cdr74,
    /// 74-minute CD-RW (650 MB).
    #[serde(rename = "cdrw-74")]
    Cdrw74,
    /// 80-minute CD-R (700 MB).
    #[serde(rename = "cdr-80")]
    Cdr80,
    /// 80-minute CD-RW (700 MB).
    #[serde(rename = "cdrw-80")]
    Cdrw80,
    #[serde(rename = "dvd+r")]
    DvdPlusR,
    #[serde(rename = "dvd+rw")]
    DvdPlusRw,
}

impl MediaType {
    pub const ALL: [MediaType; 6] = [
        MediaType::Cdr74,
        MediaType::Cdrw74,
        MediaType::Cdr80,
        MediaType::Cdrw80,
        MediaType::DvdPlusR,
        MediaType::DvdPlusRw,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MediaType::Cdr74 => "cdr-74",
            MediaType::Cdrw74 => "cdrw-74",
            MediaType::Cdr80 => "cdr-80",
            MediaType::Cdrw80 => "cdrw-80",
            MediaType::DvdPlusR => "dvd+r",
            MediaType::DvdPlusRw => "dvd+rw",
        }
    }

    pub fn class(self) -> MediaClass {
        match self {
            MediaType::Cdr74 | MediaType::Cdrw74 | MediaType::Cdr80 | MediaType::Cdrw80 => {
                MediaClass::Cd
            }
            MediaType::DvdPlusR | MediaType::DvdPlusRw => MediaClass::Dvd,
        }
    }

    /// Look up a media type by its historical numeric identifier within a class.
    ///
    /// CD: 1 = CD-RW 74, 2 = CD-R 74, 3 = CD-RW 80, 4 = CD-R 80.
    /// DVD: 1 = DVD+R, 2 = DVD+RW.
    pub fn from_code(class: MediaClass, code: u32) -> Result<Self> {
        match (class, code) {
            (MediaClass::Cd, 1) => Ok(MediaType::Cdrw74),
            (MediaClass::Cd, 2) => Ok(MediaType::Cdr74),
            (MediaClass::Cd, 3) => Ok(MediaType::Cdrw80),
            (MediaClass::Cd, 4) => Ok(MediaType::Cdr80),
            (MediaClass::Dvd, 1) => Ok(MediaType::DvdPlusR),
            (MediaClass::Dvd, 2) => Ok(MediaType::DvdPlusRw),
            _ => Err(WriterError::invalid_argument(format!(
                "invalid {} media type {}",
                class, code
            ))),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MediaType {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        MediaType::ALL
            .into_iter()
            .find(|media| media.name() == wanted)
            .ok_or_else(|| {
                WriterError::invalid_argument(format!(
                    "invalid media type '{}'; expected one of: cdr-74, cdrw-74, cdr-80, cdrw-80, dvd+r, dvd+rw",
                    s
                ))
            })
    }
}

/// Static description of a media type. All sizes are in sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaDefinition {
    media_type: MediaType,
    rewritable: bool,
    capacity: u64,
    initial_lead_in: u64,
    lead_in: u64,
}

impl MediaDefinition {
    pub fn new(media_type: MediaType) -> Self {
        let (rewritable, capacity) = match media_type {
            MediaType::Cdr74 => (false, mbytes_to_sectors(650)),
            MediaType::Cdrw74 => (true, mbytes_to_sectors(650)),
            MediaType::Cdr80 => (false, mbytes_to_sectors(700)),
            MediaType::Cdrw80 => (true, mbytes_to_sectors(700)),
            // 4.4 "true" GB = 4.7 "marketing" GB
            MediaType::DvdPlusR => (false, gbytes_to_sectors(4.4)),
            MediaType::DvdPlusRw => (true, gbytes_to_sectors(4.4)),
        };
        let (initial_lead_in, lead_in) = match media_type.class() {
            MediaClass::Cd => (CD_INITIAL_LEAD_IN, CD_SESSION_LEAD_IN),
            MediaClass::Dvd => (0, 0),
        };
        Self {
            media_type,
            rewritable,
            capacity,
            initial_lead_in,
            lead_in,
        }
    }

    /// Definition for a media type belonging to `class`; other types are rejected.
    pub fn for_class(class: MediaClass, media_type: MediaType) -> Result<Self> {
        if media_type.class() != class {
            return Err(WriterError::invalid_argument(format!(
                "media type {} is not supported by a {} writer",
                media_type, class
            )));
        }
        Ok(Self::new(media_type))
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn rewritable(&self) -> bool {
        self.rewritable
    }

    /// Total capacity before any lead-in.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Lead-in required for the first image written to the media.
    pub fn initial_lead_in(&self) -> u64 {
        self.initial_lead_in
    }

    /// Lead-in required for each later image written to the media.
    pub fn lead_in(&self) -> u64 {
        self.lead_in
    }
}

/// Sector offsets of the most recent session, as printed by `cdrecord -msinfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionBoundaries {
    pub lower: u64,
    pub upper: u64,
}

impl SessionBoundaries {
    pub fn new(lower: u64, upper: u64) -> Self {
        Self { lower, upper }
    }
}

impl fmt::Display for SessionBoundaries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lower, self.upper)
    }
}

/// Snapshot of used and available space on the media in a device.
///
/// `bytes_used + bytes_available` is generally less than the media capacity
/// because lead-in is subtracted from availability without counting as used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaCapacity {
    pub bytes_used: u64,
    pub bytes_available: u64,
    /// Boundaries the capacity was computed from; `None` for a full rewrite,
    /// a drive without multisession support, or DVD media.
    pub boundaries: Option<SessionBoundaries>,
}

impl MediaCapacity {
    pub fn new(
        bytes_used: u64,
        bytes_available: u64,
        boundaries: Option<SessionBoundaries>,
    ) -> Self {
        Self {
            bytes_used,
            bytes_available,
            boundaries,
        }
    }
}

/// Compute capacity for `media` given the last session's boundaries.
///
/// Without boundaries (or with an upper boundary of 0) the whole disc minus
/// the initial lead-in is available. Otherwise the next session starts after
/// `upper` and pays the per-session lead-in. Availability never goes negative.
pub fn compute_capacity(
    media: &MediaDefinition,
    boundaries: Option<SessionBoundaries>,
) -> MediaCapacity {
    let (bytes_used, sectors_available) = match boundaries {
        Some(b) if b.upper > 0 => {
            debug!("Capacity calculations are based on a new ISO session.");
            let available = media
                .capacity()
                .saturating_sub(b.upper)
                .saturating_sub(media.lead_in());
            (sectors_to_bytes(b.upper), available)
        }
        _ => {
            debug!("Capacity calculations are based on a complete disc rewrite.");
            (0, media.capacity().saturating_sub(media.initial_lead_in()))
        }
    };
    let bytes_available = sectors_to_bytes(sectors_available);
    debug!(
        "Used [{}], available [{}].",
        display_bytes(bytes_used),
        display_bytes(bytes_available)
    );
    MediaCapacity::new(bytes_used, bytes_available, boundaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MB650: u64 = 650 * 1024 * 1024;
    const MB700: u64 = 700 * 1024 * 1024;
    const ILEAD: u64 = 11_400 * 2048;
    const SLEAD: u64 = 6_900 * 2048;

    #[rstest]
    #[case(MediaType::Cdr74, false, 332_800)]
    #[case(MediaType::Cdrw74, true, 332_800)]
    #[case(MediaType::Cdr80, false, 358_400)]
    #[case(MediaType::Cdrw80, true, 358_400)]
    #[case(MediaType::DvdPlusR, false, 2_306_867)]
    #[case(MediaType::DvdPlusRw, true, 2_306_867)]
    fn test_media_definition(
        #[case] media_type: MediaType,
        #[case] rewritable: bool,
        #[case] capacity: u64,
    ) {
        let media = MediaDefinition::new(media_type);
        assert_eq!(media.media_type(), media_type);
        assert_eq!(media.rewritable(), rewritable);
        assert_eq!(media.capacity(), capacity);
    }

    #[test]
    fn test_lead_in_by_class() {
        let cd = MediaDefinition::new(MediaType::Cdr80);
        assert_eq!(cd.initial_lead_in(), 11_400);
        assert_eq!(cd.lead_in(), 6_900);

        let dvd = MediaDefinition::new(MediaType::DvdPlusRw);
        assert_eq!(dvd.initial_lead_in(), 0);
        assert_eq!(dvd.lead_in(), 0);
    }

    #[test]
    fn test_media_type_names_round_trip() {
        for media in MediaType::ALL {
            assert_eq!(media.name().parse::<MediaType>().unwrap(), media);
        }
        assert_eq!(" CDRW-74 ".parse::<MediaType>().unwrap(), MediaType::Cdrw74);
    }

    #[test]
    fn test_invalid_media_type_name() {
        let err = "cdrw-90".parse::<MediaType>().unwrap_err();
        assert!(matches!(err, WriterError::InvalidArgument(_)));
    }

    #[rstest]
    #[case(MediaClass::Cd, 1, MediaType::Cdrw74)]
    #[case(MediaClass::Cd, 2, MediaType::Cdr74)]
    #[case(MediaClass::Cd, 3, MediaType::Cdrw80)]
    #[case(MediaClass::Cd, 4, MediaType::Cdr80)]
    #[case(MediaClass::Dvd, 1, MediaType::DvdPlusR)]
    #[case(MediaClass::Dvd, 2, MediaType::DvdPlusRw)]
    fn test_media_codes(#[case] class: MediaClass, #[case] code: u32, #[case] expected: MediaType) {
        assert_eq!(MediaType::from_code(class, code).unwrap(), expected);
    }

    #[rstest]
    #[case(MediaClass::Cd, 0)]
    #[case(MediaClass::Cd, 5)]
    #[case(MediaClass::Dvd, 3)]
    fn test_invalid_media_codes(#[case] class: MediaClass, #[case] code: u32) {
        assert!(MediaType::from_code(class, code).is_err());
    }

    #[test]
    fn test_for_class_rejects_other_class() {
        assert!(MediaDefinition::for_class(MediaClass::Cd, MediaType::DvdPlusR).is_err());
        assert!(MediaDefinition::for_class(MediaClass::Dvd, MediaType::Cdrw74).is_err());
        assert!(MediaDefinition::for_class(MediaClass::Dvd, MediaType::DvdPlusR).is_ok());
    }

    #[rstest]
    #[case(MediaType::Cdr74, MB650)]
    #[case(MediaType::Cdrw74, MB650)]
    #[case(MediaType::Cdr80, MB700)]
    #[case(MediaType::Cdrw80, MB700)]
    fn test_capacity_without_boundaries(#[case] media_type: MediaType, #[case] total: u64) {
        let capacity = compute_capacity(&MediaDefinition::new(media_type), None);
        assert_eq!(capacity.bytes_used, 0);
        assert_eq!(capacity.bytes_available, total - ILEAD);
        assert_eq!(capacity.boundaries, None);
    }

    #[rstest]
    #[case(MediaType::Cdr74, MB650, 1)]
    #[case(MediaType::Cdrw74, MB650, 999)]
    #[case(MediaType::Cdr80, MB700, 1)]
    #[case(MediaType::Cdrw80, MB700, 12_345)]
    fn test_capacity_with_boundaries(
        #[case] media_type: MediaType,
        #[case] total: u64,
        #[case] upper: u64,
    ) {
        let boundaries = Some(SessionBoundaries::new(0, upper));
        let capacity = compute_capacity(&MediaDefinition::new(media_type), boundaries);
        assert_eq!(capacity.bytes_used, upper * 2048);
        assert_eq!(capacity.bytes_available, total - SLEAD - upper * 2048);
        assert_eq!(capacity.boundaries, boundaries);
    }

    #[test]
    fn test_capacity_zero_upper_is_full_rewrite() {
        let boundaries = Some(SessionBoundaries::new(0, 0));
        let capacity = compute_capacity(&MediaDefinition::new(MediaType::Cdrw74), boundaries);
        assert_eq!(capacity.bytes_used, 0);
        assert_eq!(capacity.bytes_available, MB650 - ILEAD);
        assert_eq!(capacity.boundaries, boundaries);
    }

    #[test]
    fn test_capacity_clamps_at_zero() {
        let boundaries = Some(SessionBoundaries::new(320_000, 330_000));
        let capacity = compute_capacity(&MediaDefinition::new(MediaType::Cdr74), boundaries);
        assert_eq!(capacity.bytes_used, 330_000 * 2048);
        assert_eq!(capacity.bytes_available, 0);
    }

    #[test]
    fn test_boundaries_display() {
        assert_eq!(SessionBoundaries::new(268_582, 302_230).to_string(), "268582,302230");
    }
}
