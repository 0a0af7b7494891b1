//! Size units used by optical media.
//!
//! All capacities are tracked in ISO sectors of [`SECTOR_SIZE`] bytes.
//! Kilobytes, megabytes and gigabytes are binary (1 kB = 1024 B).

/// Size of an ISO 9660 sector in bytes.
pub const SECTOR_SIZE: u64 = 2048;

pub const BYTES_PER_KBYTE: u64 = 1024;
pub const BYTES_PER_MBYTE: u64 = BYTES_PER_KBYTE * 1024;
pub const BYTES_PER_GBYTE: u64 = BYTES_PER_MBYTE * 1024;

/// Convert a sector count to bytes.
pub fn sectors_to_bytes(sectors: u64) -> u64 {
    sectors.saturating_mul(SECTOR_SIZE)
}

/// Convert a fractional sector count (as printed by `mkisofs -print-size`) to bytes.
pub fn fractional_sectors_to_bytes(sectors: f64) -> u64 {
    (sectors * SECTOR_SIZE as f64).max(0.0) as u64
}

pub fn kbytes_to_bytes(kbytes: u64) -> u64 {
    kbytes.saturating_mul(BYTES_PER_KBYTE)
}

/// Whole sectors contained in `mbytes` megabytes.
pub fn mbytes_to_sectors(mbytes: u64) -> u64 {
    mbytes * BYTES_PER_MBYTE / SECTOR_SIZE
}

/// Whole sectors contained in `gbytes` gigabytes; the fractional sector is dropped.
pub fn gbytes_to_sectors(gbytes: f64) -> u64 {
    (gbytes * BYTES_PER_GBYTE as f64 / SECTOR_SIZE as f64) as u64
}

/// Render a byte count for log output, e.g. `"650.00 MB"`.
pub fn display_bytes(bytes: u64) -> String {
    if bytes < BYTES_PER_KBYTE {
        format!("{} bytes", bytes)
    } else if bytes < BYTES_PER_MBYTE {
        format!("{:.2} kB", bytes as f64 / BYTES_PER_KBYTE as f64)
    } else if bytes < BYTES_PER_GBYTE {
        format!("{:.2} MB", bytes as f64 / BYTES_PER_MBYTE as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / BYTES_PER_GBYTE as f64)
    }
}
