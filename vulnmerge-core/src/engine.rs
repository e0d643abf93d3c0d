use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use vulnmerge_db::{RunInfo, SnapshotStore, diff};
use vulnmerge_output::ReportSink;
use vulnmerge_types::{
    DistroAdvisory, HostId, HostScanResult, NOT_FIXED_YET, OsFamily, PortStat,
};
use vulnmerge_vuln::{
    BundledReference, Evidence, WeaknessReference, enrich_content, merge_existing, merge_into,
    resolve,
};

use crate::config::DetectConfig;
use crate::error::DetectError;
use crate::policy;
use crate::source::{
    CodeHostingSource, CveDictionary, ExploitFeed, Findings, KnownExploitedFeed, PackageSource,
    PluginTracker, SessionGuard,
};

const DICTIONARY: &str = "cve dictionary";

/// Runs every host of a scan through detection, filtering and diffing.
///
/// Only the CVE dictionary is mandatory. Every other collaborator is
/// optional and its step is skipped when absent.
pub struct Detector {
    config: DetectConfig,
    dictionary: Box<dyn CveDictionary>,
    package_sources: Vec<Box<dyn PackageSource>>,
    code_hosting: Option<Box<dyn CodeHostingSource>>,
    plugin_tracker: Option<Box<dyn PluginTracker>>,
    exploit_feed: Option<Box<dyn ExploitFeed>>,
    known_exploited_feed: Option<Box<dyn KnownExploitedFeed>>,
    weakness: Box<dyn WeaknessReference>,
    store: Option<Box<dyn SnapshotStore>>,
    reported_version: Option<String>,
    reported_at: Option<u64>,
}

impl Detector {
    pub fn new(config: DetectConfig, dictionary: Box<dyn CveDictionary>) -> Self {
        Self {
            config,
            dictionary,
            package_sources: Vec::new(),
            code_hosting: None,
            plugin_tracker: None,
            exploit_feed: None,
            known_exploited_feed: None,
            weakness: Box::new(BundledReference),
            store: None,
            reported_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            reported_at: None,
        }
    }

    /// Add an OS-package source. Sources are queried in insertion order.
    pub fn with_package_source(mut self, source: Box<dyn PackageSource>) -> Self {
        self.package_sources.push(source);
        self
    }

    pub fn with_code_hosting(mut self, source: Box<dyn CodeHostingSource>) -> Self {
        self.code_hosting = Some(source);
        self
    }

    pub fn with_plugin_tracker(mut self, source: Box<dyn PluginTracker>) -> Self {
        self.plugin_tracker = Some(source);
        self
    }

    pub fn with_exploit_feed(mut self, feed: Box<dyn ExploitFeed>) -> Self {
        self.exploit_feed = Some(feed);
        self
    }

    pub fn with_known_exploited_feed(mut self, feed: Box<dyn KnownExploitedFeed>) -> Self {
        self.known_exploited_feed = Some(feed);
        self
    }

    pub fn with_weakness_reference(mut self, reference: Box<dyn WeaknessReference>) -> Self {
        self.weakness = reference;
        self
    }

    pub fn with_store(mut self, store: Box<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_reported_version(mut self, version: Option<String>) -> Self {
        self.reported_version = version;
        self
    }

    /// Fix the run timestamp instead of reading the clock.
    pub fn with_reported_at(mut self, reported_at: u64) -> Self {
        self.reported_at = Some(reported_at);
        self
    }

    pub fn config(&self) -> &DetectConfig {
        &self.config
    }

    /// Detect, filter and diff `results`, then hand each host to `sink`.
    ///
    /// The run either completes for every host or fails as a whole on the
    /// first fatal error; the sink is not called at all in that case.
    pub fn detect(
        &self,
        mut results: Vec<HostScanResult>,
        sink: &mut dyn ReportSink,
    ) -> Result<Vec<HostScanResult>, DetectError> {
        let mode = self.config.diff_mode();
        if mode.is_active() && self.store.is_none() {
            return Err(DetectError::DiffWithoutStore);
        }
        let reported_at = self.reported_at.unwrap_or_else(unix_now);

        for host in &mut results {
            if policy::needs_detection(host, self.config.refresh_cve) {
                self.detect_host(host)?;
            } else {
                info!(host = %host.host_id(), "no need to refresh");
            }
            host.lang = self.config.lang;
            host.reported_at = Some(reported_at);
            host.reported_version = self.reported_version.clone();

            let pipeline = self.config.filter_pipeline(host);
            let records = std::mem::take(&mut host.scanned_cves);
            let (retained, _) = pipeline.run(&host.host_id().to_string(), records);
            host.scanned_cves = retained;
        }

        // Every host is merged and filtered past this point.
        let ids: Vec<HostId> = results.iter().map(HostScanResult::host_id).collect();
        let previous = match &self.store {
            Some(store) if mode.is_active() => store.load_previous(&ids)?,
            _ => BTreeMap::new(),
        };
        // The snapshot is the pre-diff result, but it only becomes the next
        // baseline once every host has been reported.
        let snapshot = self.store.as_ref().map(|_| results.clone());

        let results = diff(results, &previous, mode);
        for host in &results {
            sink.write(host).map_err(|source| DetectError::Sink {
                host: host.host_id(),
                source,
            })?;
        }

        if let (Some(store), Some(snapshot)) = (&self.store, snapshot) {
            let run = RunInfo {
                run_id: format!("run-{reported_at}-{}", std::process::id()),
                reported_at,
                reported_version: self.reported_version.clone(),
            };
            store.save_run(&run, &snapshot)?;
        }
        Ok(results)
    }

    fn detect_host(&self, host: &mut HostScanResult) -> Result<(), DetectError> {
        if !policy::reuses_scanned_cves(host) {
            host.scanned_cves.clear();
        }

        self.detect_packages(host)?;
        normalize_fix_state(host);
        normalize_listen_ports(host);

        self.detect_cpes(host)?;
        self.detect_code_hosting(host)?;
        self.detect_plugins(host)?;

        self.fill_content(host)?;
        self.fill_exploits(host)?;
        self.fill_known_exploited(host)?;

        host.cwe_dict = vulnmerge_vuln::enrich(&host.scanned_cves, self.config.lang, &*self.weakness);
        debug!(host = %host.host_id(), n_cwes = host.cwe_dict.len(), "weakness dictionary built");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // OS packages
    // -----------------------------------------------------------------------

    fn detect_packages(&self, host: &mut HostScanResult) -> Result<(), DetectError> {
        if policy::package_detection_skip(host).is_some() {
            return Ok(());
        }
        // Package sources know nothing about Raspberry Pi builds.
        let raspbian_view =
            (host.family == OsFamily::Raspbian).then(|| host.without_raspbian_packages());

        for source in &self.package_sources {
            let target = raspbian_view.as_ref().unwrap_or(&*host);
            let findings = self.query_package_source(source.as_ref(), target)?;
            let n = merge_findings(host, findings);
            info!(
                host = %host.host_id(),
                source = source.name(),
                n_cves = n,
                "{n} CVEs are detected with {}",
                source.name()
            );
        }
        Ok(())
    }

    fn query_package_source(
        &self,
        source: &dyn PackageSource,
        host: &HostScanResult,
    ) -> Result<Findings, DetectError> {
        let id = host.host_id();
        let stage = || format!("{} detection", source.name());
        let session = source
            .open(host.family)
            .map_err(|e| DetectError::source_failed(&id, stage(), e))?;
        let mut session = SessionGuard::new(source.name(), session);

        let fetched = session
            .is_fetched(host.family, &host.release)
            .map_err(|e| DetectError::source_failed(&id, stage(), e))?;
        if !fetched {
            let coverage = source.coverage(host.family);
            if coverage.is_fatal() {
                return Err(DetectError::MissingDatabase {
                    host: id,
                    source_name: source.name().to_string(),
                    family: host.family,
                    release: host.release.clone(),
                });
            }
            info!(
                host = %id,
                source = source.name(),
                ?coverage,
                "{} entries of {} {} are not found, skipped",
                source.name(),
                host.family,
                host.release
            );
            return Ok(Vec::new());
        }

        session
            .detect(host)
            .map_err(|e| DetectError::source_failed(&id, stage(), e))
    }

    // -----------------------------------------------------------------------
    // CPE, code hosting, plugins
    // -----------------------------------------------------------------------

    fn detect_cpes(&self, host: &mut HostScanResult) -> Result<(), DetectError> {
        let cpe_uris = self.config.scope_for(host).cpe_uris;
        if cpe_uris.is_empty() {
            return Ok(());
        }
        let id = host.host_id();
        let fail = |e| DetectError::source_failed(&id, "CPE detection", e);
        let mut session = SessionGuard::new(DICTIONARY, self.dictionary.open().map_err(fail)?);

        let mut n_new = 0usize;
        for uri in cpe_uris {
            let details = session.detect_by_cpe(uri, true).map_err(fail)?;
            for detail in details {
                let mut evidence = Evidence::default().cpe(uri.clone());
                evidence.confidences.extend(resolve(&detail));
                if !detail.has_nvd() && detail.has_jvn() {
                    for jvn in &detail.jvns {
                        evidence = evidence.advisory(DistroAdvisory::new(jvn.jvn_id.clone()));
                    }
                }
                if merge_into(&mut host.scanned_cves, &detail.cve_id, evidence) {
                    n_new += 1;
                }
            }
        }
        info!(host = %id, n_cves = n_new, "{n_new} CVEs are detected with CPE");
        Ok(())
    }

    fn detect_code_hosting(&self, host: &mut HostScanResult) -> Result<(), DetectError> {
        let id = host.host_id();
        let mut repos = Vec::new();
        for repo in self.config.github_repos(host) {
            let (owner, name) = split_owner_repo(repo).ok_or_else(|| DetectError::InvalidConfig {
                host: id.clone(),
                reason: format!("failed to parse GitHub owner/repo: {repo}"),
            })?;
            repos.push((owner.to_string(), name.to_string()));
        }
        if repos.is_empty() {
            return Ok(());
        }
        let Some(source) = &self.code_hosting else {
            warn!(host = %id, "GitHub repositories configured but no code-hosting source, skipped");
            return Ok(());
        };

        for (owner, name) in repos {
            let findings = source
                .detect(host, &owner, &name)
                .map_err(|e| DetectError::source_failed(&id, "GitHub detection", e))?;
            let n = merge_findings(host, findings);
            info!(host = %id, n_cves = n, "{n} CVEs detected with GHSA {owner}/{name}");
        }
        Ok(())
    }

    fn detect_plugins(&self, host: &mut HostScanResult) -> Result<(), DetectError> {
        if host.plugin_packages.is_empty() {
            return Ok(());
        }
        let Some(tracker) = &self.plugin_tracker else {
            debug!(host = %host.host_id(), "no plugin tracker, skipped");
            return Ok(());
        };
        let id = host.host_id();
        info!(host = %id, n_pkgs = host.plugin_packages.len(), "detect plugin CVEs");
        let findings = tracker
            .detect(host)
            .map_err(|e| DetectError::source_failed(&id, "plugin detection", e))?;
        let n = merge_findings(host, findings);
        info!(host = %id, n_cves = n, "found {n} plugin CVEs");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Content and annotations
    // -----------------------------------------------------------------------

    fn fill_content(&self, host: &mut HostScanResult) -> Result<(), DetectError> {
        if host.scanned_cves.is_empty() {
            return Ok(());
        }
        let id = host.host_id();
        let fail = |e| DetectError::source_failed(&id, "content enrichment", e);
        let cve_ids: Vec<String> = host.scanned_cves.keys().cloned().collect();

        let details = {
            let mut session =
                SessionGuard::new(DICTIONARY, self.dictionary.open().map_err(fail)?);
            session.fetch_details(&cve_ids).map_err(fail)?
        };
        for detail in &details {
            if let Some(record) = host.scanned_cves.get_mut(&detail.cve_id) {
                enrich_content(record, detail);
            }
        }
        debug!(host = %id, n_details = details.len(), "filled CVE content");
        Ok(())
    }

    fn fill_exploits(&self, host: &mut HostScanResult) -> Result<(), DetectError> {
        let Some(feed) = &self.exploit_feed else {
            return Ok(());
        };
        if host.scanned_cves.is_empty() {
            return Ok(());
        }
        let id = host.host_id();
        let fail = |e| DetectError::source_failed(&id, "exploit lookup", e);
        let cve_ids: Vec<String> = host.scanned_cves.keys().cloned().collect();

        let found = {
            let mut session = SessionGuard::new("exploit", feed.open().map_err(fail)?);
            session.exploits(&cve_ids).map_err(fail)?
        };
        let mut n = 0usize;
        for (cve_id, exploits) in found {
            if exploits.is_empty() {
                continue;
            }
            let evidence = Evidence {
                exploits,
                ..Evidence::default()
            };
            if merge_existing(&mut host.scanned_cves, &cve_id, evidence) {
                n += 1;
            }
        }
        info!(host = %id, n_exploits = n, "{n} PoC are detected");
        Ok(())
    }

    fn fill_known_exploited(&self, host: &mut HostScanResult) -> Result<(), DetectError> {
        let Some(feed) = &self.known_exploited_feed else {
            return Ok(());
        };
        if host.scanned_cves.is_empty() {
            return Ok(());
        }
        let id = host.host_id();
        let fail = |e| DetectError::source_failed(&id, "known exploited lookup", e);
        let cve_ids: Vec<String> = host.scanned_cves.keys().cloned().collect();

        let found = {
            let mut session = SessionGuard::new("known exploited", feed.open().map_err(fail)?);
            session.known_exploited(&cve_ids).map_err(fail)?
        };
        let mut n = 0usize;
        for (cve_id, entries) in found {
            if entries.is_empty() {
                continue;
            }
            let evidence = Evidence {
                known_exploited: entries,
                ..Evidence::default()
            };
            if merge_existing(&mut host.scanned_cves, &cve_id, evidence) {
                n += 1;
            }
        }
        info!(host = %id, n_kevs = n, "{n} known exploited vulnerabilities are detected");
        Ok(())
    }
}

/// Merge a source's findings into the host. Returns how many distinct
/// identifiers the source reported.
fn merge_findings(host: &mut HostScanResult, findings: Findings) -> usize {
    let mut seen = BTreeSet::new();
    for (cve_id, evidence) in findings {
        merge_into(&mut host.scanned_cves, &cve_id, evidence);
        seen.insert(cve_id);
    }
    seen.len()
}

fn normalize_fix_state(host: &mut HostScanResult) {
    for record in host.scanned_cves.values_mut() {
        for pkg in &mut record.affected_packages {
            if pkg.not_fixed_yet && pkg.fix_state.is_empty() {
                pkg.fix_state = NOT_FIXED_YET.to_string();
            }
        }
    }
}

/// Parse raw `addr:port` strings into port stats. Bad strings are dropped.
fn normalize_listen_ports(host: &mut HostScanResult) {
    let id = host.host_id();
    for pkg in host.packages.values_mut() {
        for process in &mut pkg.affected_procs {
            for raw in &process.listen_ports {
                match PortStat::parse(raw) {
                    Ok(stat) => {
                        let known = process.listen_port_stats.iter().any(|s| {
                            s.bind_address == stat.bind_address && s.port == stat.port
                        });
                        if !known {
                            process.listen_port_stats.push(stat);
                        }
                    }
                    Err(e) => {
                        warn!(host = %id, pid = %process.pid, raw = %raw, error = %e, "failed to parse ip:port");
                    }
                }
            }
        }
    }
}

fn split_owner_repo(s: &str) -> Option<(&str, &str)> {
    let mut parts = s.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Some((owner, repo))
        }
        _ => None,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulnmerge_types::{AffectedPackage, AffectedProcess, Package, VulnerabilityRecord};

    #[test]
    fn owner_repo_split() {
        assert_eq!(split_owner_repo("acme/site"), Some(("acme", "site")));
        assert_eq!(split_owner_repo("acme"), None);
        assert_eq!(split_owner_repo("acme/site/extra"), None);
        assert_eq!(split_owner_repo("/site"), None);
    }

    #[test]
    fn unfixed_packages_get_fix_state_text() {
        let mut host = HostScanResult::new("web01", OsFamily::Ubuntu, "22.04");
        let mut rec = VulnerabilityRecord::new("CVE-1");
        rec.affected_packages.push(AffectedPackage::unfixed("openssl"));
        let mut deferred = AffectedPackage::unfixed("bash");
        deferred.fix_state = "Will not fix".into();
        rec.affected_packages.push(deferred);
        rec.affected_packages.push(AffectedPackage::fixed("zlib", "1.3"));
        host.scanned_cves.insert("CVE-1".into(), rec);

        normalize_fix_state(&mut host);
        let pkgs = &host.scanned_cves["CVE-1"].affected_packages;
        assert_eq!(pkgs[0].fix_state, NOT_FIXED_YET);
        assert_eq!(pkgs[1].fix_state, "Will not fix");
        assert!(pkgs[2].fix_state.is_empty());
    }

    #[test]
    fn listen_ports_parsed_once_and_bad_ones_dropped() {
        let mut host = HostScanResult::new("web01", OsFamily::Ubuntu, "22.04");
        let mut pkg = Package::new("nginx", "1.24");
        pkg.affected_procs.push(AffectedProcess {
            pid: "812".into(),
            name: "nginx".into(),
            listen_ports: vec!["*:80".into(), "[::1]:443".into(), "garbage".into()],
            listen_port_stats: Vec::new(),
        });
        host.add_package(pkg);

        normalize_listen_ports(&mut host);
        normalize_listen_ports(&mut host);
        let stats = &host.packages["nginx"].affected_procs[0].listen_port_stats;
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].to_string(), "*:80");
        assert_eq!(stats[1].bind_address, "::1");
    }
}
