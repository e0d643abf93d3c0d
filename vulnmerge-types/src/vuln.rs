use crate::confidence::{Confidence, Confidences};
use crate::content::{ContentFragment, ContentType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fix-state text stamped on unfixed packages that arrive without one.
pub const NOT_FIXED_YET: &str = "Not fixed yet";

/// An installed package affected by a vulnerability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedPackage {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fix_state: String,
    #[serde(default)]
    pub not_fixed_yet: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_in: Option<String>,
}

impl AffectedPackage {
    pub fn fixed(name: impl Into<String>, fixed_in: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fix_state: String::new(),
            not_fixed_yet: false,
            fixed_in: Some(fixed_in.into()),
        }
    }

    pub fn unfixed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fix_state: String::new(),
            not_fixed_yet: true,
            fixed_in: None,
        }
    }
}

/// A distribution (or secondary-source) advisory covering the vulnerability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroAdvisory {
    pub advisory_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<u64>,
}

impl DistroAdvisory {
    pub fn new(advisory_id: impl Into<String>) -> Self {
        Self {
            advisory_id: advisory_id.into(),
            severity: None,
            issued: None,
        }
    }
}

/// A public exploit or proof-of-concept reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exploit {
    /// Feed that reported it (e.g., "exploit-db", "metasploit").
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A mitigation or workaround reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mitigation {
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// A CERT alert referencing the vulnerability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub url: String,
    pub title: String,
    pub team: String,
}

/// CERT alerts grouped by team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDict {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub us_cert: Vec<Alert>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jp_cert: Vec<Alert>,
}

impl AlertDict {
    pub fn is_empty(&self) -> bool {
        self.us_cert.is_empty() && self.jp_cert.is_empty()
    }
}

/// Listing in a known-exploited-vulnerabilities catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownExploited {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_action: Option<String>,
}

/// How a record relates to the previous run, set only in diff mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    /// Newly present since the previous run.
    Added,
    /// Present before, but its content changed since.
    Updated,
    /// Present before, gone now.
    Resolved,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "+"),
            Self::Updated => write!(f, "~"),
            Self::Resolved => write!(f, "-"),
        }
    }
}

/// Everything known about one vulnerability identifier on one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    cve_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contents: BTreeMap<ContentType, Vec<ContentFragment>>,
    #[serde(default, skip_serializing_if = "Confidences::is_empty")]
    pub confidences: Confidences,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_packages: Vec<AffectedPackage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpe_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distro_advisories: Vec<DistroAdvisory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exploits: Vec<Exploit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mitigations: Vec<Mitigation>,
    #[serde(default, skip_serializing_if = "AlertDict::is_empty")]
    pub alerts: AlertDict,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_exploited: Vec<KnownExploited>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_status: Option<DiffStatus>,
}

impl VulnerabilityRecord {
    pub fn new(cve_id: impl Into<String>) -> Self {
        Self {
            cve_id: cve_id.into(),
            contents: BTreeMap::new(),
            confidences: Confidences::new(),
            affected_packages: Vec::new(),
            cpe_uris: Vec::new(),
            distro_advisories: Vec::new(),
            exploits: Vec::new(),
            mitigations: Vec::new(),
            alerts: AlertDict::default(),
            known_exploited: Vec::new(),
            diff_status: None,
        }
    }

    /// The identifier this record was created for. Never changes.
    pub fn cve_id(&self) -> &str {
        &self.cve_id
    }

    /// All fragments, in content-type order then insertion order.
    pub fn fragments(&self) -> impl Iterator<Item = &ContentFragment> {
        self.contents.values().flatten()
    }

    pub fn has_content(&self) -> bool {
        self.fragments().next().is_some()
    }

    pub fn max_confidence(&self) -> Option<Confidence> {
        self.confidences.max()
    }

    /// Highest valid CVSS v3 score across all fragments.
    pub fn max_cvss3(&self) -> Option<f64> {
        max_score(
            self.fragments()
                .filter_map(|f| f.cvss3.as_ref())
                .filter(|c| c.is_valid())
                .map(|c| c.score),
        )
    }

    /// Highest valid CVSS v2 score across all fragments.
    pub fn max_cvss2(&self) -> Option<f64> {
        max_score(
            self.fragments()
                .filter_map(|f| f.cvss2.as_ref())
                .filter(|c| c.is_valid())
                .map(|c| c.score),
        )
    }

    /// Best available severity score: CVSS v3, else CVSS v2, else a rough
    /// score derived from the highest severity label.
    pub fn max_severity_score(&self) -> Option<f64> {
        self.max_cvss3()
            .filter(|s| *s > 0.0)
            .or_else(|| self.max_cvss2().filter(|s| *s > 0.0))
            .or_else(|| {
                max_score(
                    self.fragments()
                        .filter_map(|f| f.severity.as_deref())
                        .filter_map(rough_score_from_severity),
                )
            })
    }

    /// True when some fragment carries a positive CVSS v2 or v3 score.
    pub fn is_scored(&self) -> bool {
        self.max_cvss3().is_some_and(|s| s > 0.0) || self.max_cvss2().is_some_and(|s| s > 0.0)
    }

    /// Latest `last_modified` among the dictionary fragments (NVD, JVN).
    pub fn last_modified(&self) -> Option<u64> {
        [ContentType::Nvd, ContentType::Jvn]
            .iter()
            .filter_map(|t| self.contents.get(t))
            .flatten()
            .filter_map(|f| f.last_modified)
            .max()
    }
}

fn max_score(scores: impl Iterator<Item = f64>) -> Option<f64> {
    scores.fold(None, |acc: Option<f64>, s| match acc {
        Some(m) if m >= s => Some(m),
        _ => Some(s),
    })
}

/// Map a vendor severity label onto the CVSS scale.
pub fn rough_score_from_severity(severity: &str) -> Option<f64> {
    match severity.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" => Some(10.0),
        "IMPORTANT" | "HIGH" => Some(8.9),
        "MODERATE" | "MEDIUM" => Some(6.9),
        "LOW" | "NEGLIGIBLE" => Some(3.9),
        _ => None,
    }
}
