//! CLI command implementations

pub mod clear;
pub mod config;
pub mod get;
pub mod info;
pub mod prefetch;

pub use clear::execute as clear;
pub use config::execute as config;
pub use get::execute as get;
pub use info::execute as info;
pub use prefetch::execute as prefetch;

/// Human-readable byte count
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
