use crate::cwe::{Lang, WeaknessEntry};
use crate::port::PortStat;
use crate::vuln::VulnerabilityRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Inventory origin tag of results produced by the trivy scanner.
pub const SCANNED_BY_TRIVY: &str = "trivy";

/// Operating system family of a scanned host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Debian,
    Ubuntu,
    Raspbian,
    RedHat,
    CentOs,
    Alma,
    Rocky,
    Fedora,
    Oracle,
    Amazon,
    Suse,
    Alpine,
    Windows,
    FreeBsd,
    /// Pseudo host: no OS, only CPE or library evidence.
    Pseudo,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debian => write!(f, "debian"),
            Self::Ubuntu => write!(f, "ubuntu"),
            Self::Raspbian => write!(f, "raspbian"),
            Self::RedHat => write!(f, "redhat"),
            Self::CentOs => write!(f, "centos"),
            Self::Alma => write!(f, "alma"),
            Self::Rocky => write!(f, "rocky"),
            Self::Fedora => write!(f, "fedora"),
            Self::Oracle => write!(f, "oracle"),
            Self::Amazon => write!(f, "amazon"),
            Self::Suse => write!(f, "suse"),
            Self::Alpine => write!(f, "alpine"),
            Self::Windows => write!(f, "windows"),
            Self::FreeBsd => write!(f, "freebsd"),
            Self::Pseudo => write!(f, "pseudo"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Identity used to match a host across runs: server name plus optional
/// container name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostId {
    pub server_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl HostId {
    pub fn server(name: impl Into<String>) -> Self {
        Self {
            server_name: name.into(),
            container: None,
        }
    }

    pub fn container(server: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            server_name: server.into(),
            container: Some(container.into()),
        }
    }

    /// File-system friendly form: `server` or `server@container`.
    pub fn file_stem(&self) -> String {
        match &self.container {
            Some(c) => format!("{}@{}", self.server_name, c),
            None => self.server_name.clone(),
        }
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(c) => write!(f, "{}@{}", c, self.server_name),
            None => write!(f, "{}", self.server_name),
        }
    }
}

/// A container running on a scanned server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub container_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

/// A running process that uses a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedProcess {
    pub pid: String,
    #[serde(default)]
    pub name: String,
    /// Raw listen strings as reported by older scanners.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listen_ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listen_port_stats: Vec<PortStat>,
}

/// An installed binary package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arch: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_procs: Vec<AffectedProcess>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            release: String::new(),
            arch: String::new(),
            affected_procs: Vec::new(),
        }
    }

    /// Raspberry Pi specific packages that distro trackers do not cover.
    pub fn is_raspbian_specific(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        name.contains("raspberry")
            || name.starts_with("rpi")
            || name.contains("-rpi")
            || self.version.contains("+rpt")
            || self.version.contains("+rpi")
    }
}

/// A source package and the binaries built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcPackage {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary_names: Vec<String>,
}

/// Kind of a web-application plugin package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Core,
    Plugin,
    Theme,
}

/// A web-application core, plugin or theme found on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginPackage {
    pub name: String,
    pub kind: PluginKind,
    #[serde(default)]
    pub version: String,
    /// "active" or "inactive" as reported by the application.
    #[serde(default)]
    pub status: String,
}

impl PluginPackage {
    pub fn is_inactive(&self) -> bool {
        self.status == "inactive"
    }
}

/// One host's (or container's) inventory and findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostScanResult {
    pub server_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    pub family: OsFamily,
    #[serde(default)]
    pub release: String,
    /// Origin tag of the inventory (e.g., "vuls", "trivy").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scanned_by: String,
    #[serde(default)]
    pub packages: BTreeMap<String, Package>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub src_packages: BTreeMap<String, SrcPackage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugin_packages: Vec<PluginPackage>,
    /// Records keyed by vulnerability identifier.
    #[serde(default)]
    pub scanned_cves: BTreeMap<String, VulnerabilityRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cwe_dict: BTreeMap<String, WeaknessEntry>,
    #[serde(default)]
    pub lang: Lang,
    /// Report time (unix seconds), shared by every host of a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_version: Option<String>,
}

impl HostScanResult {
    pub fn new(server_name: impl Into<String>, family: OsFamily, release: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            container: None,
            family,
            release: release.into(),
            scanned_by: String::new(),
            packages: BTreeMap::new(),
            src_packages: BTreeMap::new(),
            plugin_packages: Vec::new(),
            scanned_cves: BTreeMap::new(),
            cwe_dict: BTreeMap::new(),
            lang: Lang::En,
            reported_at: None,
            reported_version: None,
        }
    }

    pub fn host_id(&self) -> HostId {
        HostId {
            server_name: self.server_name.clone(),
            container: self.container.as_ref().map(|c| c.name.clone()),
        }
    }

    pub fn is_container(&self) -> bool {
        self.container.is_some()
    }

    pub fn add_package(&mut self, pkg: Package) {
        self.packages.insert(pkg.name.clone(), pkg);
    }

    pub fn package_count(&self) -> usize {
        self.packages.len() + self.src_packages.len()
    }

    /// Plugin packages by name.
    pub fn plugin(&self, name: &str) -> Option<&PluginPackage> {
        self.plugin_packages.iter().find(|p| p.name == name)
    }

    /// A copy without Raspberry Pi specific packages, for sources that only
    /// understand the upstream distribution.
    pub fn without_raspbian_packages(&self) -> Self {
        let mut copy = self.clone();
        copy.packages.retain(|_, p| !p.is_raspbian_specific());
        copy.src_packages.retain(|_, p| {
            let probe = Package::new(p.name.clone(), p.version.clone());
            !probe.is_raspbian_specific()
        });
        copy
    }
}
