//! Human- and machine-readable views of the accounting state, plus the host
//! memory query.

use std::io;

use crate::counters::STATE;

/// Formats a byte count with 1024-step units, the way the usage reports
/// print it.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Writes the peak heap usage as one human-readable line.
pub fn display_max_usage<W: io::Write>(out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "max. heap size: {}",
        format_bytes(STATE.max_used_memory())
    )
}

/// Point-in-time view of the merged counters and the byte ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UsageSnapshot {
    /// Live heap bytes as of the last merge.
    pub live_bytes: u64,
    /// Peak of `live_bytes` over the process lifetime.
    pub peak_bytes: u64,
    /// Allocating operations merged so far.
    pub alloc_count: u64,
    /// Byte ceiling in force, 0 when unlimited.
    pub max_size_limit: u64,
}

/// Captures the counters in one lock acquisition, so the fields are mutually
/// consistent as of the last merge.
pub fn usage_snapshot() -> UsageSnapshot {
    let (live_bytes, peak_bytes, alloc_count) = STATE.counters_snapshot();
    UsageSnapshot {
        live_bytes,
        peak_bytes,
        alloc_count,
        max_size_limit: STATE.configured_max_size(),
    }
}

/// Physical memory of the machine, or 16 GiB where the query is unavailable.
///
/// A reasonable default ceiling for [`set_max_size`](crate::set_max_size)
/// when a caller wants "everything the machine has".
pub fn get_max_memory_size() -> u64 {
    #[cfg(unix)]
    {
        let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
        if pages > 0 && page_size > 0 {
            return pages as u64 * page_size as u64;
        }
    }
    1 << 34
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_steps_through_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
        assert_eq!(format_bytes(1 << 40), "1.0 TB");
    }

    #[test]
    fn display_max_usage_writes_one_line() {
        let mut out = Vec::new();
        display_max_usage(&mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.starts_with("max. heap size: "), "got: {line}");
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn physical_memory_query_is_nonzero() {
        assert!(get_max_memory_size() > 0);
    }

    #[test]
    fn snapshot_fields_are_coherent() {
        let snapshot = usage_snapshot();
        assert!(snapshot.peak_bytes >= snapshot.live_bytes);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn snapshot_serializes_to_json() {
        let json = serde_json::to_string(&usage_snapshot()).unwrap();
        assert!(json.contains("\"live_bytes\""));
        assert!(json.contains("\"peak_bytes\""));
    }
}
