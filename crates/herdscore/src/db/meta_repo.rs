//! Device metadata and the per-device id sequence.

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;

const DEVICE_ID_KEY: &str = "device_id";

/// Returns the persisted device id, if one was stored.
pub fn device_id(conn: &Connection) -> Result<Option<String>, DatabaseError> {
    let value = conn
        .query_row(
            "SELECT value FROM device_meta WHERE key = ?1",
            params![DEVICE_ID_KEY],
            |r| r.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Persists the device id, replacing any previous value.
pub fn set_device_id(conn: &Connection, device_id: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO device_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![DEVICE_ID_KEY, device_id],
    )?;
    Ok(())
}

/// Reserves the next sequence number for `device_id`.
///
/// Must run inside a transaction together with whatever consumes the
/// value, otherwise two callers could read the same number.
pub fn next_sequence(conn: &Connection, device_id: &str) -> Result<u64, DatabaseError> {
    conn.execute(
        "INSERT INTO id_sequence (device_id, next_value) VALUES (?1, 1)
         ON CONFLICT(device_id) DO NOTHING",
        params![device_id],
    )?;
    let value: u64 = conn.query_row(
        "SELECT next_value FROM id_sequence WHERE device_id = ?1",
        params![device_id],
        |r| r.get(0),
    )?;
    conn.execute(
        "UPDATE id_sequence SET next_value = next_value + 1 WHERE device_id = ?1",
        params![device_id],
    )?;
    Ok(value)
}
