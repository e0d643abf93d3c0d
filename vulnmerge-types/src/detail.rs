use crate::confidence::DetectionMethod;
use crate::content::ContentFragment;
use crate::vuln::{Exploit, Mitigation};
use serde::{Deserialize, Serialize};

/// A CERT alert link attached to a dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertRef {
    pub link: String,
    #[serde(default)]
    pub title: String,
}

/// One NVD entry for a vulnerability, as returned by the CVE dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvdEntry {
    pub content: ContentFragment,
    /// How the entry matched the queried CPE. Absent for plain lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_method: Option<DetectionMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exploits: Vec<Exploit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mitigations: Vec<Mitigation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certs: Vec<CertRef>,
}

/// One JVN entry for a vulnerability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JvnEntry {
    pub jvn_id: String,
    pub content: ContentFragment,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certs: Vec<CertRef>,
}

/// Everything the CVE dictionary knows about one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveDetail {
    pub cve_id: String,
    #[serde(default)]
    pub nvds: Vec<NvdEntry>,
    #[serde(default)]
    pub jvns: Vec<JvnEntry>,
}

impl CveDetail {
    pub fn new(cve_id: impl Into<String>) -> Self {
        Self {
            cve_id: cve_id.into(),
            nvds: Vec::new(),
            jvns: Vec::new(),
        }
    }

    pub fn has_nvd(&self) -> bool {
        !self.nvds.is_empty()
    }

    pub fn has_jvn(&self) -> bool {
        !self.jvns.is_empty()
    }
}
