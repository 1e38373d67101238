//! SQLite persistence for meters, history and held traumas.
//!
//! Each meter write and its history row go through one transaction. History
//! tables are append-only: triggers abort any UPDATE or DELETE against them.
//! Timestamps are stored as fixed-width RFC 3339 strings with nanoseconds so
//! ordering by the text column is chronological.

use crate::history::{CorruptionHistoryEntry, StressHistoryEntry};
use crate::meter::{CharacterId, PsycheTracker, ThresholdFlags};
use crate::store::{PsycheStore, StoreError};
use crate::trauma::CharacterTrauma;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the SQLite layer.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Invalid id: {0}")]
    Uuid(#[from] uuid::Error),
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS characters (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS stress_trackers (
        character_id TEXT PRIMARY KEY
            REFERENCES characters(id) ON DELETE CASCADE,
        current_stress INTEGER NOT NULL
            CHECK (current_stress >= 0 AND current_stress <= 100)
    );

    CREATE TABLE IF NOT EXISTS corruption_trackers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        character_id TEXT NOT NULL
            REFERENCES characters(id) ON DELETE CASCADE,
        current_corruption INTEGER NOT NULL
            CHECK (current_corruption >= 0 AND current_corruption <= 100),
        crossed_25 INTEGER NOT NULL DEFAULT 0,
        crossed_50 INTEGER NOT NULL DEFAULT 0,
        crossed_75 INTEGER NOT NULL DEFAULT 0
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ix_corruption_trackers_character
        ON corruption_trackers(character_id);

    CREATE TABLE IF NOT EXISTS stress_history (
        id TEXT PRIMARY KEY,
        character_id TEXT NOT NULL,
        amount INTEGER NOT NULL,
        final_amount INTEGER NOT NULL,
        source TEXT NOT NULL,
        previous_value INTEGER NOT NULL,
        new_value INTEGER NOT NULL,
        resist_dc INTEGER,
        resisted INTEGER NOT NULL,
        threshold_crossed TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS ix_stress_history_character_created
        ON stress_history(character_id, created_at);
    CREATE TRIGGER IF NOT EXISTS stress_history_no_update
        BEFORE UPDATE ON stress_history
        BEGIN SELECT RAISE(ABORT, 'stress history is append-only'); END;
    CREATE TRIGGER IF NOT EXISTS stress_history_no_delete
        BEFORE DELETE ON stress_history
        BEGIN SELECT RAISE(ABORT, 'stress history is append-only'); END;

    CREATE TABLE IF NOT EXISTS corruption_history (
        id TEXT PRIMARY KEY,
        character_id TEXT NOT NULL,
        amount INTEGER NOT NULL,
        final_amount INTEGER NOT NULL,
        source TEXT NOT NULL,
        previous_value INTEGER NOT NULL,
        new_value INTEGER NOT NULL,
        resist_dc INTEGER,
        resisted INTEGER NOT NULL,
        threshold_crossed TEXT,
        is_transfer INTEGER NOT NULL,
        transfer_target_id TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS ix_corruption_history_character_created
        ON corruption_history(character_id, created_at);
    CREATE TRIGGER IF NOT EXISTS corruption_history_no_update
        BEFORE UPDATE ON corruption_history
        BEGIN SELECT RAISE(ABORT, 'corruption history is append-only'); END;
    CREATE TRIGGER IF NOT EXISTS corruption_history_no_delete
        BEFORE DELETE ON corruption_history
        BEGIN SELECT RAISE(ABORT, 'corruption history is append-only'); END;

    CREATE TABLE IF NOT EXISTS character_traumas (
        character_id TEXT NOT NULL
            REFERENCES characters(id) ON DELETE CASCADE,
        trauma_id TEXT NOT NULL,
        source TEXT NOT NULL,
        stack_count INTEGER NOT NULL CHECK (stack_count >= 1),
        acquired_at TEXT NOT NULL,
        PRIMARY KEY (character_id, trauma_id)
    );
";

/// [`PsycheStore`] backed by a SQLite database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, PersistError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistError> {
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&mut self) -> Result<(), PersistError> {
        // In-memory databases answer "memory" instead of "wal".
        let mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        tracing::debug!(journal_mode = %mode, "sqlite store configured");
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn read_tracker(&self, id: CharacterId) -> Result<Option<PsycheTracker>, PersistError> {
        let row = self
            .conn
            .query_row(
                "SELECT s.current_stress, c.current_corruption,
                        c.crossed_25, c.crossed_50, c.crossed_75
                 FROM stress_trackers s
                 JOIN corruption_trackers c ON c.character_id = s.character_id
                 WHERE s.character_id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, i32>(0)?,
                        row.get::<_, i32>(1)?,
                        ThresholdFlags {
                            crossed_25: row.get(2)?,
                            crossed_50: row.get(3)?,
                            crossed_75: row.get(4)?,
                        },
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(stress, corruption, flags)| {
            PsycheTracker::from_parts(id, stress, corruption, flags)
        }))
    }

    fn character_exists(&self, id: CharacterId) -> Result<bool, PersistError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM characters WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PersistError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn parse_id(raw: &str) -> Result<CharacterId, PersistError> {
    Ok(CharacterId(Uuid::parse_str(raw)?))
}

/// Unit enum variants go in as their serde name.
fn enum_text<T: Serialize>(value: &T) -> Result<String, PersistError> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn enum_from_text<T: DeserializeOwned>(raw: String) -> Result<T, PersistError> {
    Ok(serde_json::from_value(serde_json::Value::String(raw))?)
}

fn write_stress(tx: &Transaction<'_>, tracker: &PsycheTracker) -> Result<bool, PersistError> {
    let changed = tx.execute(
        "UPDATE stress_trackers SET current_stress = ?2 WHERE character_id = ?1",
        params![tracker.character_id.to_string(), tracker.stress().value()],
    )?;
    Ok(changed == 1)
}

fn write_corruption(tx: &Transaction<'_>, tracker: &PsycheTracker) -> Result<bool, PersistError> {
    let flags = tracker.flags();
    let changed = tx.execute(
        "UPDATE corruption_trackers
         SET current_corruption = ?2, crossed_25 = ?3, crossed_50 = ?4, crossed_75 = ?5
         WHERE character_id = ?1",
        params![
            tracker.character_id.to_string(),
            tracker.corruption().value(),
            flags.crossed_25,
            flags.crossed_50,
            flags.crossed_75,
        ],
    )?;
    Ok(changed == 1)
}

fn insert_stress_entry(tx: &Transaction<'_>, entry: &StressHistoryEntry) -> Result<(), PersistError> {
    let threshold = entry.threshold_crossed.as_ref().map(enum_text).transpose()?;
    tx.execute(
        "INSERT INTO stress_history (
            id, character_id, amount, final_amount, source,
            previous_value, new_value, resist_dc, resisted,
            threshold_crossed, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            entry.id.to_string(),
            entry.character_id.to_string(),
            entry.amount,
            entry.final_amount,
            enum_text(&entry.source)?,
            entry.previous_value,
            entry.new_value,
            entry.resist_dc,
            entry.resisted,
            threshold,
            timestamp(&entry.created_at),
        ],
    )?;
    Ok(())
}

fn insert_corruption_entry(
    tx: &Transaction<'_>,
    entry: &CorruptionHistoryEntry,
) -> Result<(), PersistError> {
    let threshold = entry.threshold_crossed.as_ref().map(enum_text).transpose()?;
    tx.execute(
        "INSERT INTO corruption_history (
            id, character_id, amount, final_amount, source,
            previous_value, new_value, resist_dc, resisted,
            threshold_crossed, is_transfer, transfer_target_id, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            entry.id.to_string(),
            entry.character_id.to_string(),
            entry.amount,
            entry.final_amount,
            enum_text(&entry.source)?,
            entry.previous_value,
            entry.new_value,
            entry.resist_dc,
            entry.resisted,
            threshold,
            entry.is_transfer,
            entry.transfer_target_id.map(|id| id.to_string()),
            timestamp(&entry.created_at),
        ],
    )?;
    Ok(())
}

fn ensure_owner(tracker: &PsycheTracker, entry: CharacterId) -> Result<(), StoreError> {
    if tracker.character_id != entry {
        return Err(StoreError::MismatchedEntry {
            tracker: tracker.character_id,
            entry,
        });
    }
    Ok(())
}

impl PsycheStore for SqliteStore {
    fn create_character(&mut self, id: CharacterId) -> Result<PsycheTracker, StoreError> {
        if self.character_exists(id)? {
            return Err(StoreError::CharacterExists(id));
        }
        let key = id.to_string();
        let tx = self.conn.transaction().map_err(PersistError::from)?;
        tx.execute(
            "INSERT INTO characters (id, created_at) VALUES (?1, ?2)",
            params![key, timestamp(&Utc::now())],
        )
        .map_err(PersistError::from)?;
        tx.execute(
            "INSERT INTO stress_trackers (character_id, current_stress) VALUES (?1, 0)",
            params![key],
        )
        .map_err(PersistError::from)?;
        tx.execute(
            "INSERT INTO corruption_trackers (character_id, current_corruption) VALUES (?1, 0)",
            params![key],
        )
        .map_err(PersistError::from)?;
        tx.commit().map_err(PersistError::from)?;
        Ok(PsycheTracker::new(id))
    }

    fn load_tracker(&self, id: CharacterId) -> Result<PsycheTracker, StoreError> {
        self.read_tracker(id)?
            .ok_or(StoreError::CharacterNotFound(id))
    }

    fn save_tracker(&mut self, tracker: &PsycheTracker) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(PersistError::from)?;
        if !(write_stress(&tx, tracker)? && write_corruption(&tx, tracker)?) {
            return Err(StoreError::CharacterNotFound(tracker.character_id));
        }
        tx.commit().map_err(PersistError::from)?;
        Ok(())
    }

    fn commit_stress(
        &mut self,
        tracker: &PsycheTracker,
        entry: &StressHistoryEntry,
    ) -> Result<(), StoreError> {
        ensure_owner(tracker, entry.character_id)?;
        let tx = self.conn.transaction().map_err(PersistError::from)?;
        if !write_stress(&tx, tracker)? {
            return Err(StoreError::CharacterNotFound(tracker.character_id));
        }
        insert_stress_entry(&tx, entry)?;
        tx.commit().map_err(PersistError::from)?;
        Ok(())
    }

    fn commit_corruption(
        &mut self,
        tracker: &PsycheTracker,
        entry: &CorruptionHistoryEntry,
    ) -> Result<(), StoreError> {
        ensure_owner(tracker, entry.character_id)?;
        let tx = self.conn.transaction().map_err(PersistError::from)?;
        if !write_corruption(&tx, tracker)? {
            return Err(StoreError::CharacterNotFound(tracker.character_id));
        }
        insert_corruption_entry(&tx, entry)?;
        tx.commit().map_err(PersistError::from)?;
        Ok(())
    }

    fn commit_transfer(
        &mut self,
        donor: (&PsycheTracker, &CorruptionHistoryEntry),
        recipient: (&PsycheTracker, &CorruptionHistoryEntry),
    ) -> Result<(), StoreError> {
        ensure_owner(donor.0, donor.1.character_id)?;
        ensure_owner(recipient.0, recipient.1.character_id)?;
        let tx = self.conn.transaction().map_err(PersistError::from)?;
        for (tracker, entry) in [donor, recipient] {
            if !write_corruption(&tx, tracker)? {
                return Err(StoreError::CharacterNotFound(tracker.character_id));
            }
            insert_corruption_entry(&tx, entry)?;
        }
        tx.commit().map_err(PersistError::from)?;
        Ok(())
    }

    fn stress_history(&self, id: CharacterId) -> Result<Vec<StressHistoryEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, amount, final_amount, source, previous_value, new_value,
                        resist_dc, resisted, threshold_crossed, created_at
                 FROM stress_history
                 WHERE character_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )
            .map_err(PersistError::from)?;
        let rows = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i32>(4)?,
                    row.get::<_, i32>(5)?,
                    row.get::<_, Option<u32>>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })
            .map_err(PersistError::from)?;

        let mut entries = Vec::new();
        for row in rows {
            let (
                entry_id,
                amount,
                final_amount,
                source,
                previous_value,
                new_value,
                resist_dc,
                resisted,
                threshold,
                created_at,
            ) = row.map_err(PersistError::from)?;
            entries.push(StressHistoryEntry {
                id: Uuid::parse_str(&entry_id).map_err(PersistError::from)?,
                character_id: id,
                amount,
                final_amount,
                source: enum_from_text(source)?,
                previous_value,
                new_value,
                resist_dc,
                resisted,
                threshold_crossed: threshold.map(enum_from_text).transpose()?,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(entries)
    }

    fn corruption_history(
        &self,
        id: CharacterId,
    ) -> Result<Vec<CorruptionHistoryEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, amount, final_amount, source, previous_value, new_value,
                        resist_dc, resisted, threshold_crossed, is_transfer,
                        transfer_target_id, created_at
                 FROM corruption_history
                 WHERE character_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )
            .map_err(PersistError::from)?;
        let rows = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((
                    (
                        row.get::<_, String>(0)?,
                        row.get::<_, i32>(1)?,
                        row.get::<_, i32>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i32>(4)?,
                        row.get::<_, i32>(5)?,
                    ),
                    (
                        row.get::<_, Option<u32>>(6)?,
                        row.get::<_, bool>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, bool>(9)?,
                        row.get::<_, Option<String>>(10)?,
                        row.get::<_, String>(11)?,
                    ),
                ))
            })
            .map_err(PersistError::from)?;

        let mut entries = Vec::new();
        for row in rows {
            let (
                (entry_id, amount, final_amount, source, previous_value, new_value),
                (resist_dc, resisted, threshold, is_transfer, target, created_at),
            ) = row.map_err(PersistError::from)?;
            entries.push(CorruptionHistoryEntry {
                id: Uuid::parse_str(&entry_id).map_err(PersistError::from)?,
                character_id: id,
                amount,
                final_amount,
                source: enum_from_text(source)?,
                previous_value,
                new_value,
                resist_dc,
                resisted,
                threshold_crossed: threshold.map(enum_from_text).transpose()?,
                is_transfer,
                transfer_target_id: target.as_deref().map(parse_id).transpose()?,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(entries)
    }

    fn traumas(&self, id: CharacterId) -> Result<Vec<CharacterTrauma>, StoreError> {
        if !self.character_exists(id)? {
            return Err(StoreError::CharacterNotFound(id));
        }
        let mut stmt = self
            .conn
            .prepare(
                "SELECT trauma_id, source, stack_count, acquired_at
                 FROM character_traumas
                 WHERE character_id = ?1
                 ORDER BY acquired_at ASC, rowid ASC",
            )
            .map_err(PersistError::from)?;
        let rows = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(PersistError::from)?;

        let mut traumas = Vec::new();
        for row in rows {
            let (trauma_id, source, stack_count, acquired_at) = row.map_err(PersistError::from)?;
            traumas.push(CharacterTrauma {
                character_id: id,
                trauma_id,
                source,
                stack_count,
                acquired_at: parse_timestamp(&acquired_at)?,
            });
        }
        Ok(traumas)
    }

    fn save_trauma(&mut self, trauma: &CharacterTrauma) -> Result<(), StoreError> {
        if !self.character_exists(trauma.character_id)? {
            return Err(StoreError::CharacterNotFound(trauma.character_id));
        }
        self.conn
            .execute(
                "INSERT INTO character_traumas
                    (character_id, trauma_id, source, stack_count, acquired_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (character_id, trauma_id)
                 DO UPDATE SET stack_count = excluded.stack_count",
                params![
                    trauma.character_id.to_string(),
                    trauma.trauma_id,
                    trauma.source,
                    trauma.stack_count,
                    timestamp(&trauma.acquired_at),
                ],
            )
            .map_err(PersistError::from)?;
        Ok(())
    }

    fn delete_character(&mut self, id: CharacterId) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM characters WHERE id = ?1", params![id.to_string()])
            .map_err(PersistError::from)?;
        if removed == 0 {
            return Err(StoreError::CharacterNotFound(id));
        }
        Ok(())
    }
}
