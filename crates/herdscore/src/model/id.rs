//! Record and device identifiers.

use chrono::{DateTime, Utc};

/// Builds a record id from the device id, the device-local sequence number
/// and the allocation time, e.g. `FIELD01-000042-20261018093012`.
///
/// The sequence never repeats on a device, so ids stay unique across
/// devices as long as device ids do.
pub fn format_record_id(device_id: &str, sequence: u64, at: DateTime<Utc>) -> String {
    format!("{}-{:06}-{}", device_id, sequence, at.format("%Y%m%d%H%M%S"))
}

/// Generates a random device id such as `DEV3F9A12C4`.
pub fn generate_device_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("DEV{}", hex[..8].to_ascii_uppercase())
}

/// Device ids are 2 to 16 ASCII letters or digits.
pub fn is_valid_device_id(value: &str) -> bool {
    (2..=16).contains(&value.len()) && value.chars().all(|c| c.is_ascii_alphanumeric())
}
