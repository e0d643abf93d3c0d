use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use vulnmerge_types::{HostId, HostScanResult};

use crate::error::StoreError;
use crate::schema;

/// Metadata of one detection run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub reported_at: u64,
    pub reported_version: Option<String>,
}

/// Lightweight run metadata (no result JSON).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub reported_at: u64,
    pub reported_version: Option<String>,
    pub num_hosts: usize,
    pub num_cves: usize,
}

/// Prior-snapshot loader and snapshot persistence.
pub trait SnapshotStore {
    /// Latest stored result for each of `hosts`. Hosts never seen before are
    /// simply absent from the map.
    fn load_previous(
        &self,
        hosts: &[HostId],
    ) -> Result<BTreeMap<HostId, HostScanResult>, StoreError>;

    /// Persist one run's filtered host results.
    fn save_run(&self, run: &RunInfo, results: &[HostScanResult]) -> Result<(), StoreError>;
}

/// Snapshot history backed by SQLite.
pub struct ScanStore {
    conn: Connection,
}

impl ScanStore {
    /// Open a database at a specific path, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Other(format!(
                    "failed to create db directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        debug!(path = %path.display(), "snapshot database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Latest stored result for a single host.
    pub fn last_result_for_host(&self, host: &HostId) -> Result<Option<HostScanResult>, StoreError> {
        let container = host.container.as_deref().unwrap_or("");
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT h.result_json FROM host_results h \
                 INNER JOIN runs r ON r.id = h.run_id \
                 WHERE h.server_name = ?1 AND h.container_name = ?2 \
                 ORDER BY r.reported_at DESC, h.id DESC LIMIT 1",
                params![host.server_name, container],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// List all runs, most recent first.
    pub fn list_runs(&self) -> Result<Vec<RunSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, reported_at, reported_version, num_hosts, num_cves \
             FROM runs ORDER BY reported_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RunSummary {
                run_id: row.get(0)?,
                reported_at: row.get::<_, i64>(1)? as u64,
                reported_version: row.get(2)?,
                num_hosts: row.get::<_, i64>(3)? as usize,
                num_cves: row.get::<_, i64>(4)? as usize,
            })
        })?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }

    /// Delete a run and its host results (cascaded).
    pub fn delete_run(&self, run_id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM runs WHERE id = ?1", params![run_id])?;
        Ok(deleted > 0)
    }
}

impl SnapshotStore for ScanStore {
    fn load_previous(
        &self,
        hosts: &[HostId],
    ) -> Result<BTreeMap<HostId, HostScanResult>, StoreError> {
        let mut previous = BTreeMap::new();
        for host in hosts {
            if let Some(result) = self.last_result_for_host(host)? {
                previous.insert(host.clone(), result);
            } else {
                debug!(host = %host, "no previous snapshot");
            }
        }
        Ok(previous)
    }

    fn save_run(&self, run: &RunInfo, results: &[HostScanResult]) -> Result<(), StoreError> {
        let num_cves: usize = results.iter().map(|r| r.scanned_cves.len()).sum();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO runs (id, reported_at, reported_version, num_hosts, num_cves) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.run_id,
                run.reported_at as i64,
                run.reported_version.as_deref(),
                results.len() as i64,
                num_cves as i64,
            ],
        )?;

        for result in results {
            let result_json = serde_json::to_string(result)?;
            let container = result
                .container
                .as_ref()
                .map(|c| c.name.as_str())
                .unwrap_or("");
            tx.execute(
                "INSERT INTO host_results (run_id, server_name, container_name, family, release, \
                 cve_count, result_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run.run_id,
                    result.server_name,
                    container,
                    result.family.to_string(),
                    result.release,
                    result.scanned_cves.len() as i64,
                    result_json,
                ],
            )?;
        }

        tx.commit()?;
        debug!(run_id = %run.run_id, hosts = results.len(), num_cves, "run saved to database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulnmerge_types::{Container, OsFamily, VulnerabilityRecord};

    fn host(name: &str, cves: &[&str]) -> HostScanResult {
        let mut r = HostScanResult::new(name, OsFamily::Ubuntu, "22.04");
        for id in cves {
            r.scanned_cves
                .insert(id.to_string(), VulnerabilityRecord::new(*id));
        }
        r
    }

    fn host_count(store: &ScanStore, run_id: &str) -> usize {
        store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM host_results WHERE run_id = ?1",
                params![run_id],
                |row| row.get::<_, i64>(0),
            )
            .unwrap() as usize
    }

    fn run(id: &str, at: u64) -> RunInfo {
        RunInfo {
            run_id: id.into(),
            reported_at: at,
            reported_version: Some("0.1.0".into()),
        }
    }

    #[test]
    fn save_and_load_latest() {
        let store = ScanStore::open_in_memory().unwrap();
        store
            .save_run(&run("run-1", 1000), &[host("web01", &["CVE-1"])])
            .unwrap();
        store
            .save_run(&run("run-2", 2000), &[host("web01", &["CVE-1", "CVE-2"])])
            .unwrap();

        let prev = store.load_previous(&[HostId::server("web01")]).unwrap();
        assert_eq!(prev[&HostId::server("web01")].scanned_cves.len(), 2);
    }

    #[test]
    fn unknown_host_absent() {
        let store = ScanStore::open_in_memory().unwrap();
        store
            .save_run(&run("run-1", 1000), &[host("web01", &["CVE-1"])])
            .unwrap();
        let prev = store
            .load_previous(&[HostId::server("db01"), HostId::server("web01")])
            .unwrap();
        assert_eq!(prev.len(), 1);
        assert!(!prev.contains_key(&HostId::server("db01")));
    }

    #[test]
    fn container_identity_is_separate() {
        let store = ScanStore::open_in_memory().unwrap();
        let mut c = host("web01", &["CVE-9"]);
        c.container = Some(Container {
            container_id: "abc".into(),
            name: "nginx".into(),
            image: String::new(),
        });
        store
            .save_run(&run("run-1", 1000), &[host("web01", &["CVE-1"]), c])
            .unwrap();

        let server = store.last_result_for_host(&HostId::server("web01")).unwrap().unwrap();
        assert!(server.scanned_cves.contains_key("CVE-1"));
        let container = store
            .last_result_for_host(&HostId::container("web01", "nginx"))
            .unwrap()
            .unwrap();
        assert!(container.scanned_cves.contains_key("CVE-9"));
    }

    #[test]
    fn list_and_delete_runs() {
        let store = ScanStore::open_in_memory().unwrap();
        store.save_run(&run("run-a", 1000), &[host("a", &["CVE-1"])]).unwrap();
        store
            .save_run(&run("run-b", 2000), &[host("a", &[]), host("b", &["CVE-1", "CVE-2"])])
            .unwrap();

        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "run-b");
        assert_eq!(runs[0].num_hosts, 2);
        assert_eq!(runs[0].num_cves, 2);

        assert!(store.delete_run("run-b").unwrap());
        assert_eq!(host_count(&store, "run-b"), 0);
        assert!(!store.delete_run("run-b").unwrap());
    }

    #[test]
    fn open_on_disk_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        {
            let store = ScanStore::open(&path).unwrap();
            store.save_run(&run("run-1", 1), &[host("web01", &["CVE-1"])]).unwrap();
        }
        let store = ScanStore::open(&path).unwrap();
        assert_eq!(store.list_runs().unwrap().len(), 1);
    }
}
