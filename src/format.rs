#![allow(clippy::cast_precision_loss)]

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Human-readable byte count with two decimals, stepping by 1024 up to TB.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB")
}

/// Display label for a raw socket type code
#[must_use]
pub fn protocol_label(socket_type: i32) -> String {
    match socket_type {
        libc::SOCK_STREAM => "TCP".to_string(),
        libc::SOCK_DGRAM => "UDP".to_string(),
        other => format!("Type-{other}"),
    }
}
