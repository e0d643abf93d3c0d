use serde::{Deserialize, Serialize};
use std::fmt;

/// Which intelligence source produced a content fragment.
///
/// The derived ordering is the iteration order of a record's per-type
/// content map, so it must stay stable for reproducible output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// NVD entry from the CVE dictionary (primary source).
    Nvd,
    /// JVN entry from the CVE dictionary (secondary source).
    Jvn,
    /// Distribution OVAL definition.
    Oval,
    /// Red Hat security data API.
    RedHatApi,
    /// Debian security tracker.
    DebianSecurityTracker,
    /// Ubuntu CVE tracker.
    UbuntuApi,
    /// Code-hosting security alert.
    GitHub,
    /// Plugin vulnerability tracker.
    WpScan,
    /// Third-party inventory scanner's own findings.
    Trivy,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvd => write!(f, "nvd"),
            Self::Jvn => write!(f, "jvn"),
            Self::Oval => write!(f, "oval"),
            Self::RedHatApi => write!(f, "redhat_api"),
            Self::DebianSecurityTracker => write!(f, "debian_security_tracker"),
            Self::UbuntuApi => write!(f, "ubuntu_api"),
            Self::GitHub => write!(f, "github"),
            Self::WpScan => write!(f, "wpscan"),
            Self::Trivy => write!(f, "trivy"),
        }
    }
}

/// A CVSS score with its vector string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cvss {
    pub score: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vector: String,
}

impl Cvss {
    pub fn new(score: f64, vector: impl Into<String>) -> Self {
        Self {
            score,
            vector: vector.into(),
        }
    }

    /// A score is usable when it is finite and inside the 0.0-10.0 scale.
    pub fn is_valid(&self) -> bool {
        self.score.is_finite() && (0.0..=10.0).contains(&self.score)
    }
}

/// One source's description of a vulnerability.
///
/// `(content_type, source_link)` identifies a fragment within a record;
/// two fragments with the same pair are the same evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFragment {
    pub content_type: ContentType,
    pub cve_id: String,
    /// Dedup key within a content type.
    pub source_link: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss2: Option<Cvss>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss3: Option<Cvss>,
    /// Vendor severity label (e.g., "HIGH", "Important").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Weakness identifiers as published (e.g., "CWE-79", "NVD-CWE-Other").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cwe_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    /// Publication time (unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<u64>,
    /// Last modification time (unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<u64>,
}

impl ContentFragment {
    /// Create a bare fragment with only its identity fields set.
    pub fn new(
        content_type: ContentType,
        cve_id: impl Into<String>,
        source_link: impl Into<String>,
    ) -> Self {
        Self {
            content_type,
            cve_id: cve_id.into(),
            source_link: source_link.into(),
            title: String::new(),
            summary: String::new(),
            cvss2: None,
            cvss3: None,
            severity: None,
            cwe_ids: Vec::new(),
            references: Vec::new(),
            published: None,
            last_modified: None,
        }
    }

    /// True when the fragment carries nothing worth reporting.
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.title.is_empty()
            && self.cvss2.is_none()
            && self.cvss3.is_none()
            && self.severity.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_display() {
        assert_eq!(ContentType::Nvd.to_string(), "nvd");
        assert_eq!(
            ContentType::DebianSecurityTracker.to_string(),
            "debian_security_tracker"
        );
    }

    #[test]
    fn content_type_order_is_stable() {
        assert!(ContentType::Nvd < ContentType::Jvn);
        assert!(ContentType::Jvn < ContentType::Oval);
        assert!(ContentType::WpScan < ContentType::Trivy);
    }

    #[test]
    fn cvss_validity() {
        assert!(Cvss::new(9.8, "").is_valid());
        assert!(!Cvss::new(11.0, "").is_valid());
        assert!(!Cvss::new(f64::NAN, "").is_valid());
    }

    #[test]
    fn empty_fragment() {
        let mut frag = ContentFragment::new(ContentType::Nvd, "CVE-2024-0001", "https://nvd");
        assert!(frag.is_empty());
        frag.summary = "heap overflow".into();
        assert!(!frag.is_empty());
    }

    #[test]
    fn optional_fields_skipped_in_json() {
        let frag = ContentFragment::new(ContentType::Jvn, "CVE-2024-0001", "https://jvn");
        let json = serde_json::to_string(&frag).unwrap();
        assert!(!json.contains("cvss3"));
        assert!(!json.contains("cwe_ids"));
        let back: ContentFragment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frag);
    }
}
