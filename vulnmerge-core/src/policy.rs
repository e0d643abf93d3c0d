// ---------------------------------------------------------------------------
// Applicability and coverage policy
// ---------------------------------------------------------------------------

use std::fmt;

use tracing::info;
use vulnmerge_types::{HostScanResult, OsFamily, SCANNED_BY_TRIVY};

/// Why OS-package detection is not attempted for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoRelease,
    ScannedByTrivy,
    UnsupportedFamily(OsFamily),
    NoPackages,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRelease => write!(f, "release is empty"),
            Self::ScannedByTrivy => write!(f, "scanned by trivy"),
            Self::UnsupportedFamily(family) => write!(f, "{family} type"),
            Self::NoPackages => write!(f, "number of packages is 0"),
        }
    }
}

/// Families OS-package sources never handle.
const PACKAGE_UNSUPPORTED: &[OsFamily] = &[OsFamily::FreeBsd, OsFamily::Pseudo];

/// Decide whether OS-package sources are queried for `host`.
///
/// `None` means detect. A skip is logged and is not an error.
pub fn package_detection_skip(host: &HostScanResult) -> Option<SkipReason> {
    let reason = if host.release.is_empty() {
        SkipReason::NoRelease
    } else if host.scanned_by == SCANNED_BY_TRIVY {
        SkipReason::ScannedByTrivy
    } else if PACKAGE_UNSUPPORTED.contains(&host.family) {
        SkipReason::UnsupportedFamily(host.family)
    } else if host.package_count() == 0 {
        SkipReason::NoPackages
    } else {
        return None;
    };
    info!(host = %host.host_id(), reason = %reason, "skip OVAL and distro tracker detection");
    Some(reason)
}

/// How a missing upstream database is treated for one OS family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Data must exist; a missing database aborts the run.
    Required,
    /// Data may be missing; detection continues with zero evidence.
    Optional,
    /// The source has nothing for this family at all.
    Inapplicable,
}

impl Coverage {
    pub fn is_fatal(self) -> bool {
        self == Self::Required
    }
}

/// Families whose coverage is not `Required`.
pub const COVERAGE_TABLE: &[(OsFamily, Coverage)] = &[
    (OsFamily::Debian, Coverage::Optional),
    (OsFamily::Windows, Coverage::Inapplicable),
    (OsFamily::FreeBsd, Coverage::Inapplicable),
    (OsFamily::Pseudo, Coverage::Inapplicable),
    (OsFamily::Unknown, Coverage::Inapplicable),
];

pub fn coverage(family: OsFamily) -> Coverage {
    COVERAGE_TABLE
        .iter()
        .find(|(f, _)| *f == family)
        .map(|(_, c)| *c)
        .unwrap_or(Coverage::Required)
}

// ---------------------------------------------------------------------------
// Refresh / reuse
// ---------------------------------------------------------------------------

/// A host is re-detected when forced, or when none of its records carries
/// any content yet.
pub fn needs_detection(host: &HostScanResult, refresh: bool) -> bool {
    refresh || host.scanned_cves.values().all(|r| !r.has_content())
}

/// Whether records already on the host are kept when it is re-detected.
///
/// These hosts arrive with findings their scanner produced itself, which no
/// source here can reproduce.
pub fn reuses_scanned_cves(host: &HostScanResult) -> bool {
    matches!(host.family, OsFamily::FreeBsd | OsFamily::Raspbian)
        || host.scanned_by == SCANNED_BY_TRIVY
}
