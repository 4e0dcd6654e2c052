//! Size parsing and human-readable formatting helpers.

use once_cell::sync::Lazy;
use regex::Regex;

/// First `<number> <unit>` pair anywhere in a listing cell.
static SIZE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(\w+)").ok());

/// Parse a listing size such as `"1.4 GB"` or `"Size 700 MB, 3 files"` into KiB.
///
/// Units are binary (`GB` = 1024² KiB). Unknown units and unparsable input yield `0`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn parse_size_kb(raw: &str) -> u64 {
    let Some(captures) = SIZE_PATTERN.as_ref().and_then(|pattern| pattern.captures(raw)) else {
        return 0;
    };
    let Ok(value) = captures[1].parse::<f64>() else {
        return 0;
    };
    let multiplier = match &captures[2] {
        "GB" => 1024.0 * 1024.0,
        "MB" => 1024.0,
        "KB" => 1.0,
        _ => return 0,
    };
    (value * multiplier).round() as u64
}

/// Render a byte count with binary units.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Render a transfer rate.
#[must_use]
pub fn human_rate(bytes_per_second: u64) -> String {
    format!("{}/s", human_bytes(bytes_per_second))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_handles_binary_units() {
        assert_eq!(parse_size_kb("1.5 GB"), 1_572_864);
        assert_eq!(parse_size_kb("700 MB"), 716_800);
        assert_eq!(parse_size_kb("12KB"), 12);
    }

    #[test]
    fn parse_size_finds_the_first_number_anywhere() {
        assert_eq!(parse_size_kb("Size 700 MB, 3 files"), 716_800);
        assert_eq!(parse_size_kb("~1.5GB"), 1_572_864);
        assert_eq!(parse_size_kb("3 files, 700 MB"), 0);
    }

    #[test]
    fn parse_size_rejects_unknown_units_and_noise() {
        assert_eq!(parse_size_kb("3 TB"), 0);
        assert_eq!(parse_size_kb("size unknown"), 0);
        assert_eq!(parse_size_kb(""), 0);
    }

    #[test]
    fn human_bytes_picks_largest_unit() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1_536), "1.5 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(human_rate(2_048), "2.0 KB/s");
    }
}
