//! Units formatting and parsing
//!
//! Human-readable sizes, durations, throughput and scores for the CLI,
//! plus the parsers behind `--size` and `--cores`.

use std::time::Duration;

use crate::{BenchError, Result};

const SIZE_UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];

/// Format bytes into human-readable size with binary units
///
/// # Examples
/// ```
/// use corebench::util::units::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(256 * 1024 * 1024), "256.0 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, SIZE_UNITS[unit])
    }
}

/// Parse a size such as `4096`, `256MiB`, `1.5 GiB` or `500MB` into bytes
///
/// # Examples
/// ```
/// use corebench::util::units::parse_bytes;
///
/// assert_eq!(parse_bytes("256MiB").unwrap(), 256 * 1024 * 1024);
/// assert_eq!(parse_bytes("2 KB").unwrap(), 2000);
/// ```
pub fn parse_bytes(input: &str) -> Result<u64> {
    let input = input.trim();
    let split = input
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(input.len());
    let (number, unit) = (input[..split].trim(), input[split..].trim());

    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KIB" => 1 << 10,
        "M" | "MIB" => 1 << 20,
        "G" | "GIB" => 1 << 30,
        "T" | "TIB" => 1 << 40,
        "KB" => 1_000,
        "MB" => 1_000_000,
        "GB" => 1_000_000_000,
        "TB" => 1_000_000_000_000,
        _ => return Err(BenchError::Config(format!("Unknown size unit: '{}'", unit))),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| BenchError::Config(format!("Size too large: '{}'", input)));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| BenchError::Config(format!("Invalid size: '{}'", input)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(BenchError::Config(format!("Invalid size: '{}'", input)));
    }
    let bytes = value * multiplier as f64;
    if bytes >= u64::MAX as f64 {
        return Err(BenchError::Config(format!("Size too large: '{}'", input)));
    }
    Ok(bytes as u64)
}

/// Parse a core list such as `4,5,6,7` or `0-3,8`
pub fn parse_cores(input: &str) -> Result<Vec<usize>> {
    let invalid = |part: &str| BenchError::Config(format!("Invalid core list entry: '{}'", part));

    let mut cores = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.trim().parse().map_err(|_| invalid(part))?;
                let hi: usize = hi.trim().parse().map_err(|_| invalid(part))?;
                if lo > hi {
                    return Err(invalid(part));
                }
                cores.extend(lo..=hi);
            }
            None => cores.push(part.parse().map_err(|_| invalid(part))?),
        }
    }

    if cores.is_empty() {
        return Err(BenchError::Config("Core list is empty".to_string()));
    }
    Ok(cores)
}

/// Format a duration for result tables
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Throughput in MiB/s; zero for an empty duration
pub fn calculate_throughput_mbps(bytes: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }
    bytes as f64 / (1024.0 * 1024.0) / duration.as_secs_f64()
}

pub fn format_throughput(mbps: f64) -> String {
    if mbps >= 1024.0 {
        format!("{:.2} GiB/s", mbps / 1024.0)
    } else {
        format!("{:.1} MiB/s", mbps)
    }
}

/// Group digits in thousands, e.g. `1234567` as `1,234,567`
pub fn format_score(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(768 * 1024 * 1024), "768.0 MiB");
        assert_eq!(format_bytes(1 << 40), "1.0 TiB");
    }

    #[test]
    fn test_parse_bytes() {
        assert_eq!(parse_bytes("4096").unwrap(), 4096);
        assert_eq!(parse_bytes("4KiB").unwrap(), 4096);
        assert_eq!(parse_bytes("256MiB").unwrap(), 268_435_456);
        assert_eq!(parse_bytes("256 mib").unwrap(), 268_435_456);
        assert_eq!(parse_bytes("1.5 MiB").unwrap(), 1_572_864);
        assert_eq!(parse_bytes("4M").unwrap(), 4 << 20);
        assert_eq!(parse_bytes("500MB").unwrap(), 500_000_000);

        assert!(parse_bytes("").is_err());
        assert!(parse_bytes("abc").is_err());
        assert!(parse_bytes("-1 MiB").is_err());
        assert!(parse_bytes("3 XB").is_err());
        assert!(parse_bytes("99999999999 TiB").is_err());
    }

    #[test]
    fn test_parse_cores() {
        assert_eq!(parse_cores("4,5,6,7").unwrap(), vec![4, 5, 6, 7]);
        assert_eq!(parse_cores("0-3, 8").unwrap(), vec![0, 1, 2, 3, 8]);
        assert_eq!(parse_cores("2").unwrap(), vec![2]);
        assert!(parse_cores("").is_err());
        assert!(parse_cores("3-1").is_err());
        assert!(parse_cores("a,b").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
    }

    #[test]
    fn test_throughput() {
        let mbps = calculate_throughput_mbps(512 * 1024 * 1024, Duration::from_secs(2));
        assert!((mbps - 256.0).abs() < 1e-9);
        assert_eq!(calculate_throughput_mbps(1000, Duration::ZERO), 0.0);
        assert_eq!(format_throughput(256.0), "256.0 MiB/s");
        assert_eq!(format_throughput(2048.0), "2.00 GiB/s");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(0), "0");
        assert_eq!(format_score(999), "999");
        assert_eq!(format_score(1000), "1,000");
        assert_eq!(format_score(4_294_967_295), "4,294,967,295");
    }
}
