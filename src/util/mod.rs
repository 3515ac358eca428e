//! Utility functions module
//!
//! Formatting and parsing helpers used by the command-line front end.

pub mod units;

// Re-export commonly used functions
pub use units::{
    calculate_throughput_mbps, format_bytes, format_duration, format_score, format_throughput,
    parse_bytes, parse_cores,
};
