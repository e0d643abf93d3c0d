// ---------------------------------------------------------------------------
// Evidence merge
// ---------------------------------------------------------------------------
//
// Folds evidence fragments from independent sources into one record per
// vulnerability identifier. Every operation here is idempotent: merging the
// same evidence twice leaves the record exactly as merging it once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vulnmerge_types::{
    AffectedPackage, Alert, AlertDict, Confidence, ContentFragment, ContentType, CveDetail,
    DistroAdvisory, Exploit, KnownExploited, Mitigation, VulnerabilityRecord,
};

/// A batch of evidence about one identifier from one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Evidence {
    pub fragments: Vec<ContentFragment>,
    pub confidences: Vec<Confidence>,
    pub affected_packages: Vec<AffectedPackage>,
    pub cpe_uris: Vec<String>,
    pub distro_advisories: Vec<DistroAdvisory>,
    pub exploits: Vec<Exploit>,
    pub mitigations: Vec<Mitigation>,
    pub alerts: AlertDict,
    pub known_exploited: Vec<KnownExploited>,
}

impl Evidence {
    /// Evidence carrying a single confidence signal.
    pub fn with_confidence(confidence: Confidence) -> Self {
        Self {
            confidences: vec![confidence],
            ..Self::default()
        }
    }

    pub fn fragment(mut self, fragment: ContentFragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    pub fn package(mut self, package: AffectedPackage) -> Self {
        self.affected_packages.push(package);
        self
    }

    pub fn cpe(mut self, uri: impl Into<String>) -> Self {
        self.cpe_uris.push(uri.into());
        self
    }

    pub fn advisory(mut self, advisory: DistroAdvisory) -> Self {
        self.distro_advisories.push(advisory);
        self
    }
}

/// Merge `evidence` into `existing`, or seed a new record from it.
pub fn merge(
    existing: Option<VulnerabilityRecord>,
    cve_id: &str,
    evidence: Evidence,
) -> VulnerabilityRecord {
    let mut record = existing.unwrap_or_else(|| VulnerabilityRecord::new(cve_id));
    apply(&mut record, evidence);
    record
}

/// Merge `evidence` into the record for `cve_id` inside `records`.
///
/// Returns `true` when the identifier was not present before.
pub fn merge_into(
    records: &mut BTreeMap<String, VulnerabilityRecord>,
    cve_id: &str,
    evidence: Evidence,
) -> bool {
    let is_new = !records.contains_key(cve_id);
    let record = records
        .entry(cve_id.to_string())
        .or_insert_with(|| VulnerabilityRecord::new(cve_id));
    apply(record, evidence);
    is_new
}

/// Merge `evidence` into an already detected record only.
///
/// Feeds that annotate (exploits, known-exploited lists) must never create
/// records. Returns whether a record was found.
pub fn merge_existing(
    records: &mut BTreeMap<String, VulnerabilityRecord>,
    cve_id: &str,
    evidence: Evidence,
) -> bool {
    match records.get_mut(cve_id) {
        Some(record) => {
            apply(record, evidence);
            true
        }
        None => false,
    }
}

fn apply(record: &mut VulnerabilityRecord, evidence: Evidence) {
    for fragment in evidence.fragments {
        append_fragment(record, fragment);
    }
    for confidence in evidence.confidences {
        record.confidences.append_if_missing(confidence);
    }
    for pkg in evidence.affected_packages {
        if !record.affected_packages.iter().any(|p| p.name == pkg.name) {
            record.affected_packages.push(pkg);
        }
    }
    for uri in evidence.cpe_uris {
        append_if_missing(&mut record.cpe_uris, uri);
    }
    for adv in evidence.distro_advisories {
        if !record
            .distro_advisories
            .iter()
            .any(|a| a.advisory_id == adv.advisory_id)
        {
            record.distro_advisories.push(adv);
        }
    }
    for exploit in evidence.exploits {
        append_if_missing(&mut record.exploits, exploit);
    }
    for mitigation in evidence.mitigations {
        append_if_missing(&mut record.mitigations, mitigation);
    }
    merge_alerts(&mut record.alerts, evidence.alerts);
    for kev in evidence.known_exploited {
        if !record.known_exploited.iter().any(|k| k.source == kev.source) {
            record.known_exploited.push(kev);
        }
    }
}

/// Append `fragment` unless its `(type, source_link)` is already present.
///
/// Returns whether the fragment was added.
pub fn append_fragment(record: &mut VulnerabilityRecord, fragment: ContentFragment) -> bool {
    let list = record.contents.entry(fragment.content_type).or_default();
    if list.iter().any(|f| f.source_link == fragment.source_link) {
        return false;
    }
    list.push(fragment);
    true
}

fn append_if_missing<T: PartialEq>(list: &mut Vec<T>, item: T) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn merge_alerts(into: &mut AlertDict, from: AlertDict) {
    for alert in from.us_cert {
        if !into.us_cert.iter().any(|a| a.url == alert.url) {
            into.us_cert.push(alert);
        }
    }
    for alert in from.jp_cert {
        if !into.jp_cert.iter().any(|a| a.url == alert.url) {
            into.jp_cert.push(alert);
        }
    }
}

/// Build the CERT alert references carried by a dictionary entry.
pub fn cert_alerts(detail: &CveDetail) -> AlertDict {
    let us_cert = detail
        .nvds
        .iter()
        .flat_map(|n| &n.certs)
        .map(|c| Alert {
            url: c.link.clone(),
            title: c.title.clone(),
            team: "uscert".into(),
        })
        .collect();
    let jp_cert = detail
        .jvns
        .iter()
        .flat_map(|j| &j.certs)
        .map(|c| Alert {
            url: c.link.clone(),
            title: c.title.clone(),
            team: "jpcert".into(),
        })
        .collect();
    AlertDict { us_cert, jp_cert }
}

/// Fill a record with full dictionary content.
///
/// Touches content, alerts, exploits and mitigations only; confidences,
/// CPE URIs and affected packages stay as the detecting sources left them.
/// Non-empty NVD content replaces the NVD list wholesale, JVN content is
/// appended by source link.
pub fn enrich_content(record: &mut VulnerabilityRecord, detail: &CveDetail) {
    let nvds: Vec<ContentFragment> = detail
        .nvds
        .iter()
        .map(|n| n.content.clone())
        .filter(|c| !c.is_empty())
        .collect();
    if !nvds.is_empty() {
        record.contents.insert(ContentType::Nvd, nvds);
    }
    for jvn in &detail.jvns {
        if !jvn.content.is_empty() {
            append_fragment(record, jvn.content.clone());
        }
    }

    let alerts = cert_alerts(detail);
    if !alerts.is_empty() {
        record.alerts = alerts;
    }
    for nvd in &detail.nvds {
        for exploit in &nvd.exploits {
            append_if_missing(&mut record.exploits, exploit.clone());
        }
        for mitigation in &nvd.mitigations {
            append_if_missing(&mut record.mitigations, mitigation.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vulnmerge_types::{CertRef, Cvss, DetectionMethod, JvnEntry, NvdEntry};

    const CVE: &str = "CVE-2024-1000";

    fn frag(t: ContentType, link: &str) -> ContentFragment {
        let mut f = ContentFragment::new(t, CVE, link);
        f.summary = format!("{t} says hi");
        f
    }

    #[test]
    fn seeds_new_record() {
        let ev = Evidence::with_confidence(Confidence::of(DetectionMethod::OvalMatch))
            .fragment(frag(ContentType::Oval, "oval:1"))
            .package(AffectedPackage::unfixed("openssl"));
        let rec = merge(None, CVE, ev);
        assert_eq!(rec.cve_id(), CVE);
        assert_eq!(rec.contents[&ContentType::Oval].len(), 1);
        assert_eq!(rec.max_confidence().unwrap().score, 100);
        assert_eq!(rec.affected_packages.len(), 1);
    }

    #[test]
    fn same_link_deduplicated() {
        let mut rec = VulnerabilityRecord::new(CVE);
        for _ in 0..5 {
            rec = merge(
                Some(rec),
                CVE,
                Evidence::default().fragment(frag(ContentType::Jvn, "jvn:1")),
            );
        }
        assert_eq!(rec.contents[&ContentType::Jvn].len(), 1);
    }

    #[test]
    fn same_link_different_type_kept() {
        let ev = Evidence::default()
            .fragment(frag(ContentType::Nvd, "x"))
            .fragment(frag(ContentType::Jvn, "x"));
        let rec = merge(None, CVE, ev);
        assert_eq!(rec.fragments().count(), 2);
    }

    #[test]
    fn existing_confidence_wins_per_method() {
        let first = Confidence {
            method: DetectionMethod::ChangelogRoughMatch,
            score: 50,
        };
        let second = Confidence {
            method: DetectionMethod::ChangelogRoughMatch,
            score: 70,
        };
        let rec = merge(None, CVE, Evidence::with_confidence(first));
        let rec = merge(Some(rec), CVE, Evidence::with_confidence(second));
        assert_eq!(rec.confidences.len(), 1);
        assert_eq!(rec.max_confidence().unwrap().score, 50);

        let rec = merge(Some(rec), CVE, Evidence::with_confidence(Confidence::NVD_EXACT_VERSION));
        assert_eq!(rec.confidences.len(), 2);
        assert_eq!(rec.max_confidence(), Some(Confidence::NVD_EXACT_VERSION));
    }

    #[test]
    fn merge_into_reports_new_ids() {
        let mut map = BTreeMap::new();
        assert!(merge_into(&mut map, CVE, Evidence::default().cpe("cpe:/a:acme:web:1.0")));
        assert!(!merge_into(&mut map, CVE, Evidence::default().cpe("cpe:/a:acme:web:1.0")));
        assert_eq!(map[CVE].cpe_uris.len(), 1);
    }

    #[test]
    fn merge_existing_never_creates() {
        let mut map = BTreeMap::new();
        let kev = KnownExploited {
            source: "cisa".into(),
            date_added: None,
            required_action: None,
        };
        let ev = Evidence {
            known_exploited: vec![kev.clone()],
            ..Evidence::default()
        };
        assert!(!merge_existing(&mut map, CVE, ev.clone()));
        assert!(map.is_empty());

        map.insert(CVE.to_string(), VulnerabilityRecord::new(CVE));
        assert!(merge_existing(&mut map, CVE, ev.clone()));
        assert!(merge_existing(&mut map, CVE, ev));
        assert_eq!(map[CVE].known_exploited, vec![kev]);
        assert!(map[CVE].confidences.is_empty());
    }

    fn detail() -> CveDetail {
        let mut nvd = frag(ContentType::Nvd, "https://nvd.nist.gov/vuln/detail/CVE-2024-1000");
        nvd.cvss3 = Some(Cvss::new(9.8, "CVSS:3.1/AV:N"));
        nvd.cwe_ids = vec!["CWE-79".into()];
        let mut d = CveDetail::new(CVE);
        d.nvds.push(NvdEntry {
            content: nvd,
            detection_method: None,
            exploits: vec![Exploit {
                source: "nvd".into(),
                id: String::new(),
                url: "https://example.com/poc".into(),
                description: String::new(),
            }],
            mitigations: vec![],
            certs: vec![CertRef {
                link: "https://us-cert.example/ta1".into(),
                title: "TA-1".into(),
            }],
        });
        d.jvns.push(JvnEntry {
            jvn_id: "JVNDB-2024-000001".into(),
            content: frag(ContentType::Jvn, "https://jvndb.jvn.jp/1"),
            certs: vec![CertRef {
                link: "https://jpcert.example/1".into(),
                title: "JP-1".into(),
            }],
        });
        d
    }

    #[test]
    fn enrich_content_leaves_detection_data_alone() {
        let mut rec = merge(
            None,
            CVE,
            Evidence::with_confidence(Confidence::NVD_ROUGH_VERSION).cpe("cpe:/a:acme:web:1.0"),
        );
        let before_conf = rec.confidences.clone();
        enrich_content(&mut rec, &detail());
        assert_eq!(rec.confidences, before_conf);
        assert_eq!(rec.cpe_uris, vec!["cpe:/a:acme:web:1.0".to_string()]);
        assert_eq!(rec.max_cvss3(), Some(9.8));
        assert_eq!(rec.alerts.us_cert[0].team, "uscert");
        assert_eq!(rec.alerts.jp_cert.len(), 1);
        assert_eq!(rec.exploits.len(), 1);
    }

    #[test]
    fn enrich_content_is_idempotent() {
        let mut once = VulnerabilityRecord::new(CVE);
        enrich_content(&mut once, &detail());
        let mut twice = once.clone();
        enrich_content(&mut twice, &detail());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_dictionary_content_skipped() {
        let mut d = CveDetail::new(CVE);
        d.nvds.push(NvdEntry {
            content: ContentFragment::new(ContentType::Nvd, CVE, "nvd"),
            detection_method: None,
            exploits: vec![],
            mitigations: vec![],
            certs: vec![],
        });
        let mut rec = VulnerabilityRecord::new(CVE);
        enrich_content(&mut rec, &d);
        assert!(!rec.has_content());
    }

    fn content_type() -> impl Strategy<Value = ContentType> {
        prop_oneof![
            Just(ContentType::Nvd),
            Just(ContentType::Jvn),
            Just(ContentType::Oval),
            Just(ContentType::GitHub),
        ]
    }

    fn method() -> impl Strategy<Value = DetectionMethod> {
        prop_oneof![
            Just(DetectionMethod::OvalMatch),
            Just(DetectionMethod::ChangelogRoughMatch),
            Just(DetectionMethod::NvdRoughVersionMatch),
            Just(DetectionMethod::JvnVendorProductMatch),
        ]
    }

    fn evidence() -> impl Strategy<Value = Evidence> {
        (
            proptest::collection::vec((content_type(), 0u8..4), 0..6),
            proptest::collection::vec(method(), 0..4),
            proptest::collection::vec("[a-c]", 0..3),
            proptest::collection::vec("[a-c]", 0..3),
        )
            .prop_map(|(frags, methods, pkgs, exploits)| Evidence {
                fragments: frags
                    .into_iter()
                    .map(|(t, n)| frag(t, &format!("link-{n}")))
                    .collect(),
                confidences: methods.into_iter().map(Confidence::of).collect(),
                affected_packages: pkgs.into_iter().map(AffectedPackage::unfixed).collect(),
                exploits: exploits
                    .into_iter()
                    .map(|id| Exploit {
                        source: "exploit-db".into(),
                        id,
                        url: String::new(),
                        description: String::new(),
                    })
                    .collect(),
                ..Evidence::default()
            })
    }

    proptest! {
        #[test]
        fn merge_twice_equals_merge_once(ev in evidence()) {
            let once = merge(None, CVE, ev.clone());
            let twice = merge(Some(once.clone()), CVE, ev);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn one_fragment_per_type_and_link(evs in proptest::collection::vec(evidence(), 1..4)) {
            let mut rec = VulnerabilityRecord::new(CVE);
            for ev in evs {
                rec = merge(Some(rec), CVE, ev);
            }
            for list in rec.contents.values() {
                let mut links: Vec<_> = list.iter().map(|f| &f.source_link).collect();
                let n = links.len();
                links.sort();
                links.dedup();
                prop_assert_eq!(links.len(), n);
            }
            let mut methods: Vec<_> = rec.confidences.iter().map(|c| c.method).collect();
            let n = methods.len();
            methods.sort();
            methods.dedup();
            prop_assert_eq!(methods.len(), n);
        }
    }
}
