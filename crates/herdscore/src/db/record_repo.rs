//! Record repository: raw row access for the `records` table.
//!
//! Functions take a `&Connection` so they compose inside a transaction
//! (`Transaction` derefs to `Connection`).

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw record row. JSON and enum columns stay as text here; decoding
/// into domain types happens in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub id: String,
    pub image_ref: String,
    pub traits: Option<String>,
    pub category: Option<String>,
    pub confidence: Option<f64>,
    pub score: Option<f64>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub sync_attempts: u32,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
    pub failure_kind: Option<String>,
    pub remote_id: Option<String>,
    pub animal_tag: Option<String>,
    pub notes: Option<String>,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            image_ref: row.get("image_ref")?,
            traits: row.get("traits")?,
            category: row.get("category")?,
            confidence: row.get("confidence")?,
            score: row.get("score")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            sync_attempts: row.get("sync_attempts")?,
            last_attempt_at: row.get("last_attempt_at")?,
            last_error: row.get("last_error")?,
            failure_kind: row.get("failure_kind")?,
            remote_id: row.get("remote_id")?,
            animal_tag: row.get("animal_tag")?,
            notes: row.get("notes")?,
        })
    }
}

/// Inserts a new record row. Fails with a constraint error on duplicate id.
pub fn insert(conn: &Connection, record: &RecordRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO records (id, image_ref, traits, category, confidence, score, status,
         created_at, updated_at, sync_attempts, last_attempt_at, last_error, failure_kind,
         remote_id, animal_tag, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            record.id,
            record.image_ref,
            record.traits,
            record.category,
            record.confidence,
            record.score,
            record.status,
            record.created_at,
            record.updated_at,
            record.sync_attempts,
            record.last_attempt_at,
            record.last_error,
            record.failure_kind,
            record.remote_id,
            record.animal_tag,
            record.notes,
        ],
    )?;
    Ok(())
}

/// Overwrites every mutable column of a record, but only if the stored
/// `updated_at` still equals `expected_updated_at`.
///
/// Returns the number of rows changed: 0 means the row was modified (or
/// removed) since it was read.
pub fn update_if_current(
    conn: &Connection,
    record: &RecordRow,
    expected_updated_at: &str,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE records SET image_ref=?2, traits=?3, category=?4, confidence=?5, score=?6,
         status=?7, updated_at=?8, sync_attempts=?9, last_attempt_at=?10, last_error=?11,
         failure_kind=?12, remote_id=?13, animal_tag=?14, notes=?15
         WHERE id=?1 AND updated_at=?16",
        params![
            record.id,
            record.image_ref,
            record.traits,
            record.category,
            record.confidence,
            record.score,
            record.status,
            record.updated_at,
            record.sync_attempts,
            record.last_attempt_at,
            record.last_error,
            record.failure_kind,
            record.remote_id,
            record.animal_tag,
            record.notes,
            expected_updated_at,
        ],
    )?;
    Ok(changed)
}

/// Finds a record by its id.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<RecordRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM records WHERE id = ?1",
            params![id],
            RecordRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Lists records with the given status, oldest first.
pub fn list_by_status(conn: &Connection, status: &str) -> Result<Vec<RecordRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM records WHERE status = ?1 ORDER BY created_at ASC, id ASC")?;
    let rows = stmt
        .query_map(params![status], RecordRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Lists every record, oldest first.
pub fn list_all(conn: &Connection) -> Result<Vec<RecordRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM records ORDER BY created_at ASC, id ASC")?;
    let rows = stmt
        .query_map([], RecordRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Counts records grouped by status.
pub fn count_by_status(conn: &Connection) -> Result<Vec<(String, u64)>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM records GROUP BY status")?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
}
