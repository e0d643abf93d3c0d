// ---------------------------------------------------------------------------
// Offline evidence bundle
// ---------------------------------------------------------------------------
//
// A single JSON document standing in for every evidence database: package
// advisories, the CVE dictionary, code-hosting alerts, plugin tracker
// entries and both annotation feeds. Each section becomes its own
// collaborator, so a run against a bundle goes through exactly the same
// session handling as one against live databases.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;
use vulnmerge_core::{
    CodeHostingSource, CveDictionary, CveDictionarySession, ExploitFeed, ExploitSession, Findings,
    KnownExploitedFeed, KnownExploitedSession, PackageSession, PackageSource, PluginTracker,
    Session, SourceError,
};
use vulnmerge_types::{
    CveDetail, DetectionMethod, Exploit, HostScanResult, KnownExploited, OsFamily,
};
use vulnmerge_vuln::Evidence;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeedBundle {
    pub package_sources: Vec<PackageFeed>,
    pub dictionary: Vec<CveDetail>,
    /// CPE URI -> dictionary entries it matches.
    pub cpes: BTreeMap<String, Vec<CpeHit>>,
    /// `owner/repo` -> alerts for that repository.
    pub github: BTreeMap<String, Vec<FeedFinding>>,
    pub plugins: Vec<FeedFinding>,
    pub exploits: BTreeMap<String, Vec<Exploit>>,
    pub known_exploited: BTreeMap<String, Vec<KnownExploited>>,
}

/// One OS-package source, e.g. the OVAL database.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PackageFeed {
    pub name: String,
    /// Family and release pairs the source holds data for.
    pub fetched: Vec<FetchedRelease>,
    pub findings: Vec<FeedFinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchedRelease {
    pub family: OsFamily,
    pub release: String,
}

/// Evidence about one identifier. It applies to a host when the host has
/// any of its affected packages installed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedFinding {
    pub cve_id: String,
    /// Restricts the finding to one family. Absent means any.
    #[serde(default)]
    pub family: Option<OsFamily>,
    #[serde(flatten)]
    pub evidence: Evidence,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpeHit {
    pub cve_id: String,
    pub method: DetectionMethod,
}

pub fn load(path: &Path) -> Result<FeedBundle> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read evidence feed '{}'", path.display()))?;
    let bundle: FeedBundle = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse evidence feed '{}'", path.display()))?;
    debug!(
        path = %path.display(),
        package_sources = bundle.package_sources.len(),
        dictionary = bundle.dictionary.len(),
        "evidence feed loaded"
    );
    Ok(bundle)
}

/// The bundle split into one collaborator per source.
pub struct FeedSources {
    pub packages: Vec<FeedPackageSource>,
    pub dictionary: FeedDictionary,
    pub code_hosting: FeedCodeHosting,
    pub plugins: FeedPluginTracker,
    pub exploits: FeedExploits,
    pub known_exploited: FeedKnownExploited,
}

impl FeedBundle {
    pub fn into_sources(self) -> FeedSources {
        FeedSources {
            packages: self
                .package_sources
                .into_iter()
                .map(|feed| FeedPackageSource { feed })
                .collect(),
            dictionary: FeedDictionary {
                entries: self
                    .dictionary
                    .into_iter()
                    .map(|d| (d.cve_id.clone(), d))
                    .collect(),
                cpes: self.cpes,
            },
            code_hosting: FeedCodeHosting {
                repos: self.github,
            },
            plugins: FeedPluginTracker {
                findings: self.plugins,
            },
            exploits: FeedExploits {
                exploits: self.exploits,
            },
            known_exploited: FeedKnownExploited {
                entries: self.known_exploited,
            },
        }
    }
}

/// Findings whose affected packages intersect `installed`, with the
/// affected package list narrowed to what is actually installed.
fn matching(findings: &[FeedFinding], family: OsFamily, installed: &BTreeSet<&str>) -> Findings {
    findings
        .iter()
        .filter(|f| f.family.is_none_or(|fam| fam == family))
        .filter_map(|f| {
            let mut evidence = f.evidence.clone();
            evidence
                .affected_packages
                .retain(|p| installed.contains(p.name.as_str()));
            if evidence.affected_packages.is_empty() {
                None
            } else {
                Some((f.cve_id.clone(), evidence))
            }
        })
        .collect()
}

/// In-memory sessions have nothing to release.
struct Open<'a, T>(&'a T);

impl<T> Session for Open<'_, T> {
    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OS packages
// ---------------------------------------------------------------------------

pub struct FeedPackageSource {
    feed: PackageFeed,
}

impl PackageSource for FeedPackageSource {
    fn name(&self) -> &str {
        &self.feed.name
    }

    fn open(&self, _family: OsFamily) -> Result<Box<dyn PackageSession + '_>, SourceError> {
        Ok(Box::new(Open(&self.feed)))
    }
}

impl PackageSession for Open<'_, PackageFeed> {
    fn is_fetched(&mut self, family: OsFamily, release: &str) -> Result<bool, SourceError> {
        Ok(self
            .0
            .fetched
            .iter()
            .any(|f| f.family == family && f.release == release))
    }

    fn detect(&mut self, host: &HostScanResult) -> Result<Findings, SourceError> {
        let installed: BTreeSet<&str> = host
            .packages
            .keys()
            .chain(host.src_packages.keys())
            .map(String::as_str)
            .collect();
        Ok(matching(&self.0.findings, host.family, &installed))
    }
}

// ---------------------------------------------------------------------------
// CVE dictionary
// ---------------------------------------------------------------------------

pub struct FeedDictionary {
    entries: BTreeMap<String, CveDetail>,
    cpes: BTreeMap<String, Vec<CpeHit>>,
}

impl CveDictionary for FeedDictionary {
    fn open(&self) -> Result<Box<dyn CveDictionarySession + '_>, SourceError> {
        Ok(Box::new(Open(self)))
    }
}

impl CveDictionarySession for Open<'_, FeedDictionary> {
    fn detect_by_cpe(
        &mut self,
        cpe_uri: &str,
        use_jvn: bool,
    ) -> Result<Vec<CveDetail>, SourceError> {
        let Some(hits) = self.0.cpes.get(cpe_uri) else {
            return Ok(Vec::new());
        };
        let mut details = Vec::new();
        for hit in hits {
            let Some(entry) = self.0.entries.get(&hit.cve_id) else {
                continue;
            };
            let mut detail = entry.clone();
            for nvd in &mut detail.nvds {
                nvd.detection_method = Some(hit.method);
            }
            if !use_jvn {
                detail.jvns.clear();
            }
            if detail.has_nvd() || detail.has_jvn() {
                details.push(detail);
            }
        }
        Ok(details)
    }

    fn fetch_details(&mut self, cve_ids: &[String]) -> Result<Vec<CveDetail>, SourceError> {
        Ok(cve_ids
            .iter()
            .filter_map(|id| self.0.entries.get(id).cloned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Auxiliary sources
// ---------------------------------------------------------------------------

pub struct FeedCodeHosting {
    repos: BTreeMap<String, Vec<FeedFinding>>,
}

impl CodeHostingSource for FeedCodeHosting {
    fn detect(
        &self,
        _host: &HostScanResult,
        owner: &str,
        repo: &str,
    ) -> Result<Findings, SourceError> {
        Ok(self
            .repos
            .get(&format!("{owner}/{repo}"))
            .map(|alerts| {
                alerts
                    .iter()
                    .map(|f| (f.cve_id.clone(), f.evidence.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub struct FeedPluginTracker {
    findings: Vec<FeedFinding>,
}

impl PluginTracker for FeedPluginTracker {
    fn detect(&self, host: &HostScanResult) -> Result<Findings, SourceError> {
        let installed: BTreeSet<&str> = host
            .plugin_packages
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        Ok(matching(&self.findings, host.family, &installed))
    }
}

pub struct FeedExploits {
    exploits: BTreeMap<String, Vec<Exploit>>,
}

impl ExploitFeed for FeedExploits {
    fn open(&self) -> Result<Box<dyn ExploitSession + '_>, SourceError> {
        Ok(Box::new(Open(self)))
    }
}

impl ExploitSession for Open<'_, FeedExploits> {
    fn exploits(
        &mut self,
        cve_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Exploit>>, SourceError> {
        Ok(select(&self.0.exploits, cve_ids))
    }
}

pub struct FeedKnownExploited {
    entries: BTreeMap<String, Vec<KnownExploited>>,
}

impl KnownExploitedFeed for FeedKnownExploited {
    fn open(&self) -> Result<Box<dyn KnownExploitedSession + '_>, SourceError> {
        Ok(Box::new(Open(self)))
    }
}

impl KnownExploitedSession for Open<'_, FeedKnownExploited> {
    fn known_exploited(
        &mut self,
        cve_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<KnownExploited>>, SourceError> {
        Ok(select(&self.0.entries, cve_ids))
    }
}

fn select<T: Clone>(map: &BTreeMap<String, Vec<T>>, ids: &[String]) -> BTreeMap<String, Vec<T>> {
    ids.iter()
        .filter_map(|id| map.get(id).map(|v| (id.clone(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use vulnmerge_types::{Package, PluginKind, PluginPackage};

    const BUNDLE: &str = r#"{
      "package_sources": [{
        "name": "oval",
        "fetched": [{"family": "ubuntu", "release": "22.04"}],
        "findings": [
          {"cve_id": "CVE-2024-0001", "family": "ubuntu",
           "confidences": [{"method": "OvalMatch", "score": 100}],
           "affected_packages": [{"name": "openssl", "fixed_in": "3.0.2-0ubuntu1.15"},
                                 {"name": "libssl-dev", "fixed_in": "3.0.2-0ubuntu1.15"}]},
          {"cve_id": "CVE-2024-0002", "family": "debian",
           "affected_packages": [{"name": "openssl"}]}
        ]
      }],
      "dictionary": [{
        "cve_id": "CVE-2023-4444",
        "nvds": [{"content": {"content_type": "nvd", "cve_id": "CVE-2023-4444",
                              "source_link": "https://nvd.nist.gov/vuln/detail/CVE-2023-4444"}}],
        "jvns": [{"jvn_id": "JVNDB-2023-000001",
                  "content": {"content_type": "jvn", "cve_id": "CVE-2023-4444",
                              "source_link": "https://jvndb.jvn.jp/ja/contents/2023/JVNDB-2023-000001.html"}}]
      }],
      "cpes": {"cpe:/a:apache:http_server:2.4.57": [
        {"cve_id": "CVE-2023-4444", "method": "NvdExactVersionMatch"},
        {"cve_id": "CVE-2099-9999", "method": "NvdExactVersionMatch"}
      ]},
      "plugins": [{"cve_id": "CVE-2024-5555",
                   "affected_packages": [{"name": "akismet", "fixed_in": "5.3.1"}]}],
      "exploits": {"CVE-2023-4444": [{"source": "exploit-db", "id": "51234",
                                      "url": "https://www.exploit-db.com/exploits/51234"}]}
    }"#;

    fn sources() -> FeedSources {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BUNDLE.as_bytes()).unwrap();
        load(file.path()).unwrap().into_sources()
    }

    #[test]
    fn empty_document_is_valid() {
        let bundle: FeedBundle = serde_json::from_str("{}").unwrap();
        assert!(bundle.package_sources.is_empty() && bundle.dictionary.is_empty());
    }

    #[test]
    fn unreadable_feed_names_the_path() {
        let err = load(Path::new("/nonexistent/feed.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/feed.json"));
    }

    #[test]
    fn package_findings_follow_installed_packages() {
        let sources = sources();
        let oval = &sources.packages[0];
        assert_eq!(oval.name(), "oval");

        let mut session = oval.open(OsFamily::Ubuntu).unwrap();
        assert!(session.is_fetched(OsFamily::Ubuntu, "22.04").unwrap());
        assert!(!session.is_fetched(OsFamily::Ubuntu, "24.04").unwrap());

        let mut host = HostScanResult::new("web01", OsFamily::Ubuntu, "22.04");
        host.add_package(Package::new("openssl", "3.0.2-0ubuntu1.10"));
        let findings = session.detect(&host).unwrap();
        assert_eq!(findings.len(), 1);
        let (id, evidence) = &findings[0];
        assert_eq!(id, "CVE-2024-0001");
        assert_eq!(evidence.affected_packages.len(), 1);
        assert_eq!(evidence.affected_packages[0].name, "openssl");
        assert_eq!(evidence.confidences[0].method, DetectionMethod::OvalMatch);
    }

    #[test]
    fn cpe_lookup_stamps_method_and_honours_jvn_switch() {
        let sources = sources();
        let mut session = sources.dictionary.open().unwrap();

        let details = session
            .detect_by_cpe("cpe:/a:apache:http_server:2.4.57", false)
            .unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(
            details[0].nvds[0].detection_method,
            Some(DetectionMethod::NvdExactVersionMatch)
        );
        assert!(!details[0].has_jvn());

        let details = session
            .detect_by_cpe("cpe:/a:apache:http_server:2.4.57", true)
            .unwrap();
        assert!(details[0].has_jvn());
        assert!(session.detect_by_cpe("cpe:/a:other:thing:1", true).unwrap().is_empty());

        let fetched = session
            .fetch_details(&["CVE-2023-4444".into(), "CVE-2000-0000".into()])
            .unwrap();
        assert_eq!(fetched.len(), 1);
    }

    #[test]
    fn plugin_and_annotation_lookups() {
        let sources = sources();
        let mut host = HostScanResult::new("wp01", OsFamily::Ubuntu, "22.04");
        assert!(sources.plugins.detect(&host).unwrap().is_empty());
        host.plugin_packages.push(PluginPackage {
            name: "akismet".into(),
            kind: PluginKind::Plugin,
            version: "5.0".into(),
            status: "active".into(),
        });
        assert_eq!(sources.plugins.detect(&host).unwrap()[0].0, "CVE-2024-5555");

        let mut exploits = sources.exploits.open().unwrap();
        let found = exploits
            .exploits(&["CVE-2023-4444".into(), "CVE-2024-5555".into()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["CVE-2023-4444"][0].id, "51234");

        let mut kev = sources.known_exploited.open().unwrap();
        assert!(kev.known_exploited(&["CVE-2023-4444".into()]).unwrap().is_empty());
        assert!(
            sources
                .code_hosting
                .detect(&host, "acme", "site")
                .unwrap()
                .is_empty()
        );
    }
}
