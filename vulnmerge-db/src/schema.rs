use crate::error::StoreError;

const SCHEMA_SQL: &str = r#"
-- Run metadata (one row per detection run)
CREATE TABLE IF NOT EXISTS runs (
    id                TEXT PRIMARY KEY,
    reported_at       INTEGER NOT NULL,
    reported_version  TEXT,
    num_hosts         INTEGER NOT NULL,
    num_cves          INTEGER NOT NULL
);

-- Per-host results after filtering, before diffing
CREATE TABLE IF NOT EXISTS host_results (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id          TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    server_name     TEXT NOT NULL,
    container_name  TEXT NOT NULL DEFAULT '',
    family          TEXT NOT NULL,
    release         TEXT NOT NULL,
    cve_count       INTEGER NOT NULL,
    result_json     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_host_identity ON host_results(server_name, container_name);
CREATE INDEX IF NOT EXISTS idx_host_run ON host_results(run_id);
"#;

pub fn initialize(conn: &rusqlite::Connection) -> Result<(), StoreError> {
    // WAL and foreign keys must be set before the DDL runs.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_repeatable() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('runs', 'host_results')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 2);
    }
}
