//! Database connection management
//!
//! Opens (or creates) the embedded SQLite database behind the database
//! backend. A fresh file gets the full schema; an existing file goes
//! through a lightweight validation pass that heals missing tables from
//! newer schema revisions. Forward-only — nothing is ever migrated
//! destructively.

use std::path::Path;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema revision, stored in the `meta` table.
pub const DB_VERSION: &str = "1.0";

/// Open the database at `db_path`, creating the file and schema on first
/// use. Validation errors propagate — a store that cannot prove its
/// schema is unusable, and that is fatal at startup.
pub fn open_database(db_path: &Path) -> Result<Connection> {
    let db_dir = db_path
        .parent()
        .ok_or_else(|| StoreError::InvalidPath("Invalid database path".into()))?;
    std::fs::create_dir_all(db_dir)?;

    let db_exists = db_path.exists();

    let conn = Connection::open(db_path)?;

    // WAL for concurrent readers, NORMAL sync as the durability/speed tradeoff
    conn.pragma_update(None, "journal_mode", WAL)?;
    conn.pragma_update(None, "foreign_keys", ON)?;
    conn.pragma_update(None, "synchronous", NORMAL)?;

    if !db_exists {
        create_schema(&conn)?;
        tracing::info!("[Connection] Created new database at {}", db_path.display());
    } else {
        validate_schema(&conn)?;
        tracing::info!("[Connection] Loaded existing database at {}", db_path.display());
    }

    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE meta (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        CREATE TABLE records (
            record_id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            record_type TEXT NOT NULL,
            asset_uri TEXT,
            thumbnail_uri TEXT,
            is_public INTEGER DEFAULT 0,
            is_for_patrons INTEGER DEFAULT 0,
            is_listed INTEGER DEFAULT 0,
            creation_time TEXT NOT NULL,
            last_modified_time TEXT NOT NULL,
            first_publish_time TEXT,
            visits INTEGER DEFAULT 0,
            rating REAL DEFAULT 0,
            random_order INTEGER DEFAULT 0,
            json_data TEXT
        );

        CREATE INDEX idx_records_path ON records (path);
        CREATE INDEX idx_records_owner ON records (owner_id);

        CREATE TABLE tags (
            record_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (record_id, tag),
            FOREIGN KEY (record_id) REFERENCES records (record_id) ON DELETE CASCADE
        );

        CREATE INDEX idx_tags_tag ON tags (tag);

        CREATE TABLE directories (
            dir_id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            creation_time TEXT NOT NULL,
            last_modified_time TEXT NOT NULL
        );

        CREATE INDEX idx_directories_path ON directories (path);

        CREATE TABLE sync_state (
            record_id TEXT PRIMARY KEY,
            needs_sync INTEGER DEFAULT 1,
            last_synced TEXT,
            FOREIGN KEY (record_id) REFERENCES records (record_id) ON DELETE CASCADE
        );
        "#,
    )?;

    conn.execute(
        "INSERT INTO meta (key, value) VALUES ('version', ?1)",
        [DB_VERSION],
    )?;

    tracing::info!("[Connection] Database tables created");
    Ok(())
}

/// Check the stored schema version and add any tables newer revisions
/// introduced. A version mismatch is logged but not fatal; the stored
/// data is left alone.
fn validate_schema(conn: &Connection) -> Result<()> {
    let version: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
            row.get(0)
        })
        .ok();

    match version.as_deref() {
        Some(v) if v == DB_VERSION => {}
        Some(v) => {
            tracing::warn!(
                "[Connection] Database version mismatch: expected {}, found {}",
                DB_VERSION,
                v
            );
        }
        None => {
            tracing::warn!("[Connection] Database has no version row, assuming {}", DB_VERSION);
            conn.execute(
                "INSERT OR IGNORE INTO meta (key, value) VALUES ('version', ?1)",
                [DB_VERSION],
            )?;
        }
    }

    // sync_state arrived after the initial schema; heal it and mark every
    // existing record as needing sync.
    let sync_table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='sync_state'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)?;

    if !sync_table_exists {
        conn.execute_batch(
            r#"
            CREATE TABLE sync_state (
                record_id TEXT PRIMARY KEY,
                needs_sync INTEGER DEFAULT 1,
                last_synced TEXT,
                FOREIGN KEY (record_id) REFERENCES records (record_id) ON DELETE CASCADE
            );

            INSERT INTO sync_state (record_id, needs_sync)
            SELECT record_id, 1 FROM records;
            "#,
        )?;
        tracing::info!("[Connection] Healed missing sync_state table");
    }

    Ok(())
}

// SQL pragma constants
const WAL: &str = "WAL";
const ON: &str = "ON";
const NORMAL: &str = "NORMAL";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_schema_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");

        let conn = open_database(&db_path).unwrap();
        let version: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(version, DB_VERSION);

        for table in ["records", "tags", "directories", "sync_state"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn heals_missing_sync_state_table() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");

        {
            let conn = open_database(&db_path).unwrap();
            conn.execute(
                "INSERT INTO records (record_id, owner_id, path, name, record_type,
                 creation_time, last_modified_time)
                 VALUES ('CST-x', 'L-LocalStorage', 'Inventory', 'n', 'object', 't', 't')",
                [],
            )
            .unwrap();
            conn.execute_batch("DROP TABLE sync_state;").unwrap();
        }

        let conn = open_database(&db_path).unwrap();
        let needs_sync: i64 = conn
            .query_row(
                "SELECT needs_sync FROM sync_state WHERE record_id = 'CST-x'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(needs_sync, 1);
    }
}
