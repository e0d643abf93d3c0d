use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vulnmerge_types::VulnerabilityRecord;

/// Records keyed by vulnerability identifier.
pub type RecordSet = BTreeMap<String, VulnerabilityRecord>;

/// What the severity-score stage does with records that carry no score
/// and no severity label at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnscoredPolicy {
    /// Treat as score 0, so any positive cutoff removes them.
    #[default]
    Drop,
    /// Let them through; the unscored stage can still remove them.
    Keep,
}

/// Result of one filter stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub retained: RecordSet,
    pub removed: usize,
}

/// One predicate-based reducer over a host's record set.
#[derive(Debug, Clone)]
pub enum FilterStage {
    /// Keep records whose best severity score is at least the cutoff.
    CvssOver { over: f64, unscored: UnscoredPolicy },
    /// Drop records whose every affected package is not fixed yet.
    IgnoreUnfixed,
    /// Keep records with some confidence at or above the cutoff.
    ConfidenceOver(u32),
    /// Drop records with these exact identifiers.
    IgnoreCves(BTreeSet<String>),
    /// Drop records all of whose affected packages match one of these.
    IgnorePkgs(Vec<Regex>),
    /// Drop records with no CVSS score from any source.
    IgnoreUnscored,
    /// Drop records whose every affected package is an inactive plugin.
    InactivePlugins(BTreeSet<String>),
}

impl FilterStage {
    /// Compile package-name patterns. Invalid patterns are logged and skipped.
    pub fn ignore_pkgs<S: AsRef<str>>(patterns: &[S]) -> Self {
        let regexes = patterns
            .iter()
            .filter_map(|p| match Regex::new(p.as_ref()) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = p.as_ref(), error = %e, "invalid ignore-package regexp, skipped");
                    None
                }
            })
            .collect();
        Self::IgnorePkgs(regexes)
    }

    pub fn ignore_cves<S: AsRef<str>>(ids: &[S]) -> Self {
        Self::IgnoreCves(ids.iter().map(|s| s.as_ref().to_string()).collect())
    }

    /// Whether a record survives this stage.
    pub fn keep(&self, rec: &VulnerabilityRecord) -> bool {
        match self {
            Self::CvssOver { over, unscored } => match rec.max_severity_score() {
                Some(score) => score >= *over,
                None => *unscored == UnscoredPolicy::Keep || *over <= 0.0,
            },
            Self::IgnoreUnfixed => {
                !rec.cpe_uris.is_empty()
                    || rec.affected_packages.is_empty()
                    || rec.affected_packages.iter().any(|p| !p.not_fixed_yet)
            }
            Self::ConfidenceOver(over) => rec.confidences.iter().any(|c| c.score >= *over),
            Self::IgnoreCves(ids) => !ids.contains(rec.cve_id()),
            Self::IgnorePkgs(regexes) => {
                regexes.is_empty()
                    || rec.affected_packages.is_empty()
                    || rec
                        .affected_packages
                        .iter()
                        .any(|p| !regexes.iter().any(|re| re.is_match(&p.name)))
            }
            Self::IgnoreUnscored => rec.is_scored(),
            Self::InactivePlugins(inactive) => {
                rec.affected_packages.is_empty()
                    || rec
                        .affected_packages
                        .iter()
                        .any(|p| !inactive.contains(&p.name))
            }
        }
    }

    pub fn apply(&self, records: RecordSet) -> FilterOutcome {
        let before = records.len();
        let retained: RecordSet = records.into_iter().filter(|(_, r)| self.keep(r)).collect();
        FilterOutcome {
            removed: before - retained.len(),
            retained,
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CvssOver { over, .. } => write!(f, "--cvss-over={over}"),
            Self::IgnoreUnfixed => write!(f, "--ignore-unfixed"),
            Self::ConfidenceOver(over) => write!(f, "--confidence-over={over}"),
            Self::IgnoreCves(ids) => {
                let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                write!(f, "ignoreCves=[{}]", ids.join(", "))
            }
            Self::IgnorePkgs(regexes) => {
                let pats: Vec<&str> = regexes.iter().map(Regex::as_str).collect();
                write!(f, "ignorePkgsRegexp=[{}]", pats.join(", "))
            }
            Self::IgnoreUnscored => write!(f, "--ignore-unscored-cves"),
            Self::InactivePlugins(_) => write!(f, "inactive plugins"),
        }
    }
}

/// Ordered sequence of filter stages, applied as a left-to-right fold.
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    stages: Vec<FilterStage>,
}

/// Per-stage removal count reported by a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: String,
    pub removed: usize,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: FilterStage) {
        self.stages.push(stage);
    }

    pub fn with(mut self, stage: FilterStage) -> Self {
        self.push(stage);
        self
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order, logging each stage's removal count.
    pub fn run(&self, host: &str, records: RecordSet) -> (RecordSet, Vec<StageReport>) {
        info!(host, total = records.len(), "{} CVEs detected", records.len());
        let mut current = records;
        let mut reports = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let outcome = stage.apply(current);
            info!(host, removed = outcome.removed, "{} CVEs filtered by {stage}", outcome.removed);
            reports.push(StageReport {
                stage: stage.to_string(),
                removed: outcome.removed,
            });
            current = outcome.retained;
        }
        (current, reports)
    }
}
