use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vulnmerge_db::DiffMode;
use vulnmerge_output::{FilterPipeline, FilterStage, UnscoredPolicy};
use vulnmerge_types::{HostScanResult, Lang};

/// Settings for one detection run.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub lang: Lang,
    /// Re-detect hosts even when their records already carry content.
    pub refresh_cve: bool,

    // --- Filters ---
    /// Minimum severity score; 0 disables the stage.
    pub cvss_over: f64,
    pub ignore_unfixed: bool,
    /// Minimum confidence score; 0 disables the stage.
    pub confidence_over: u32,
    pub ignore_unscored_cves: bool,
    pub unscored_policy: UnscoredPolicy,
    /// Report findings for plugins the host reports as inactive.
    pub detect_inactive_plugins: bool,

    // --- Diff ---
    pub diff_plus: bool,
    pub diff_minus: bool,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub servers: BTreeMap<String, ServerConfig>,
}

/// Per-server settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cpe_names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore_cves: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore_pkgs_regexp: Vec<String>,
    /// `owner/repo` strings queried against the code-hosting source.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub github_repos: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub containers: BTreeMap<String, ContainerConfig>,
}

/// Per-container settings, nested under their server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cpes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore_cves: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore_pkgs_regexp: Vec<String>,
}

/// The per-host slice of the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostScope<'a> {
    pub cpe_uris: &'a [String],
    pub ignore_cves: &'a [String],
    pub ignore_pkgs_regexp: &'a [String],
}

impl DetectConfig {
    /// Settings that apply to `host`: a container takes them from its
    /// container entry, a plain host from its server entry. Hosts the
    /// config does not mention get empty lists.
    pub fn scope_for(&self, host: &HostScanResult) -> HostScope<'_> {
        let Some(server) = self.servers.get(&host.server_name) else {
            return HostScope::default();
        };
        match &host.container {
            None => HostScope {
                cpe_uris: &server.cpe_names,
                ignore_cves: &server.ignore_cves,
                ignore_pkgs_regexp: &server.ignore_pkgs_regexp,
            },
            Some(c) => match server.containers.get(&c.name) {
                Some(container) => HostScope {
                    cpe_uris: &container.cpes,
                    ignore_cves: &container.ignore_cves,
                    ignore_pkgs_regexp: &container.ignore_pkgs_regexp,
                },
                None => HostScope::default(),
            },
        }
    }

    /// Code-hosting repositories configured for the host's server.
    pub fn github_repos(&self, host: &HostScanResult) -> &[String] {
        self.servers
            .get(&host.server_name)
            .map(|s| s.github_repos.as_slice())
            .unwrap_or_default()
    }

    pub fn diff_mode(&self) -> DiffMode {
        DiffMode {
            plus: self.diff_plus,
            minus: self.diff_minus,
        }
    }

    /// The filter stages active for `host`, in application order.
    pub fn filter_pipeline(&self, host: &HostScanResult) -> FilterPipeline {
        let scope = self.scope_for(host);
        let mut pipeline = FilterPipeline::new();
        if self.cvss_over > 0.0 {
            pipeline.push(FilterStage::CvssOver {
                over: self.cvss_over,
                unscored: self.unscored_policy,
            });
        }
        if self.ignore_unfixed {
            pipeline.push(FilterStage::IgnoreUnfixed);
        }
        if self.confidence_over > 0 {
            pipeline.push(FilterStage::ConfidenceOver(self.confidence_over));
        }
        if !scope.ignore_cves.is_empty() {
            pipeline.push(FilterStage::ignore_cves(scope.ignore_cves));
        }
        if !scope.ignore_pkgs_regexp.is_empty() {
            pipeline.push(FilterStage::ignore_pkgs(scope.ignore_pkgs_regexp));
        }
        if self.ignore_unscored_cves {
            pipeline.push(FilterStage::IgnoreUnscored);
        }
        if !self.detect_inactive_plugins {
            let inactive: std::collections::BTreeSet<String> = host
                .plugin_packages
                .iter()
                .filter(|p| p.is_inactive())
                .map(|p| p.name.clone())
                .collect();
            if !inactive.is_empty() {
                pipeline.push(FilterStage::InactivePlugins(inactive));
            }
        }
        pipeline
    }
}
