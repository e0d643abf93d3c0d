pub mod confidence;
pub mod content;
pub mod cwe;
pub mod detail;
pub mod host;
pub mod port;
pub mod vuln;

pub use confidence::{Confidence, Confidences, DetectionMethod};
pub use content::{ContentFragment, ContentType, Cvss};
pub use cwe::{CweText, Lang, WeaknessEntry};
pub use detail::{CertRef, CveDetail, JvnEntry, NvdEntry};
pub use host::{
    AffectedProcess, Container, HostId, HostScanResult, OsFamily, Package, PluginKind,
    PluginPackage, SCANNED_BY_TRIVY, SrcPackage,
};
pub use port::{PortStat, PortStatParseError};
pub use vuln::{
    AffectedPackage, Alert, AlertDict, DiffStatus, DistroAdvisory, Exploit, KnownExploited,
    Mitigation, NOT_FIXED_YET, VulnerabilityRecord, rough_score_from_severity,
};
