// ---------------------------------------------------------------------------
// Run-to-run vulnerability diff
// ---------------------------------------------------------------------------
//
// Compares each current host result with the previous snapshot of the same
// host identity and keeps only what changed.

use std::collections::BTreeMap;

use tracing::info;
use vulnmerge_types::{DiffStatus, HostId, HostScanResult, VulnerabilityRecord};

/// Which halves of the diff to report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffMode {
    /// Records new (or updated) since the previous run.
    pub plus: bool,
    /// Records present previously but gone now.
    pub minus: bool,
}

impl DiffMode {
    pub fn is_active(&self) -> bool {
        self.plus || self.minus
    }
}

/// Diff every current host against its previous snapshot.
///
/// A host with no previous snapshot keeps all of its records, each marked
/// as added. With neither switch on, results pass through untouched.
pub fn diff(
    current: Vec<HostScanResult>,
    previous: &BTreeMap<HostId, HostScanResult>,
    mode: DiffMode,
) -> Vec<HostScanResult> {
    if !mode.is_active() {
        return current;
    }
    current
        .into_iter()
        .map(|host| match previous.get(&host.host_id()) {
            Some(prev) => diff_host(host, prev, mode),
            None => {
                info!(host = %host.host_id(), "no previous result, all CVEs reported as new");
                mark_all_added(host)
            }
        })
        .collect()
}

fn mark_all_added(mut host: HostScanResult) -> HostScanResult {
    for rec in host.scanned_cves.values_mut() {
        rec.diff_status = Some(DiffStatus::Added);
    }
    host
}

fn diff_host(mut current: HostScanResult, previous: &HostScanResult, mode: DiffMode) -> HostScanResult {
    let mut cves = BTreeMap::new();
    if mode.plus {
        cves.extend(plus_records(&current, previous));
    }
    if mode.minus {
        cves.extend(minus_records(&current, previous));
    }

    let mut packages = BTreeMap::new();
    for rec in cves.values() {
        let source = match rec.diff_status {
            Some(DiffStatus::Resolved) => &previous.packages,
            _ => &current.packages,
        };
        for affected in &rec.affected_packages {
            if let Some(pkg) = source.get(&affected.name) {
                packages.insert(affected.name.clone(), pkg.clone());
            }
        }
    }

    info!(
        host = %current.host_id(),
        total = cves.len(),
        "diff against previous result"
    );
    current.scanned_cves = cves;
    current.packages = packages;
    current
}

/// Records absent from `previous`, plus records whose dictionary content
/// was modified since.
fn plus_records(
    current: &HostScanResult,
    previous: &HostScanResult,
) -> Vec<(String, VulnerabilityRecord)> {
    let mut added = 0usize;
    let mut updated = 0usize;
    let mut out = Vec::new();
    for (id, rec) in &current.scanned_cves {
        let status = match previous.scanned_cves.get(id) {
            None => DiffStatus::Added,
            Some(prev) if rec.last_modified() > prev.last_modified() => DiffStatus::Updated,
            Some(_) => continue,
        };
        match status {
            DiffStatus::Added => added += 1,
            _ => updated += 1,
        }
        let mut rec = rec.clone();
        rec.diff_status = Some(status);
        out.push((id.clone(), rec));
    }
    info!(host = %current.host_id(), added, updated, "new and updated CVEs since previous result");
    out
}

/// Zero-evidence placeholders for records present in `previous` only.
///
/// Placeholders keep the previous affected-package list so the report can
/// still say what used to be vulnerable.
fn minus_records(
    current: &HostScanResult,
    previous: &HostScanResult,
) -> Vec<(String, VulnerabilityRecord)> {
    let out: Vec<_> = previous
        .scanned_cves
        .iter()
        .filter(|(id, _)| !current.scanned_cves.contains_key(*id))
        .map(|(id, prev)| {
            let mut placeholder = VulnerabilityRecord::new(id.clone());
            placeholder.affected_packages = prev.affected_packages.clone();
            placeholder.diff_status = Some(DiffStatus::Resolved);
            (id.clone(), placeholder)
        })
        .collect();
    info!(host = %current.host_id(), resolved = out.len(), "resolved CVEs since previous result");
    out
}
