use thiserror::Error;
use vulnmerge_db::StoreError;
use vulnmerge_output::OutputError;
use vulnmerge_types::{HostId, OsFamily};

/// Failure reported by an evidence-source collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0} is unavailable")]
    Unavailable(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run-level failure. Any of these aborts the whole run.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("{host}: {stage} failed: {source}")]
    Source {
        host: HostId,
        stage: String,
        #[source]
        source: SourceError,
    },
    #[error(
        "{host}: {source_name} entries of {family} {release} are not found, fetch them before reporting"
    )]
    MissingDatabase {
        host: HostId,
        source_name: String,
        family: OsFamily,
        release: String,
    },
    #[error("{host}: invalid configuration: {reason}")]
    InvalidConfig { host: HostId, reason: String },
    #[error("diff requested but no snapshot store is configured")]
    DiffWithoutStore,
    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),
    #[error("{host}: failed to write report: {source}")]
    Sink {
        host: HostId,
        #[source]
        source: OutputError,
    },
}

impl DetectError {
    pub(crate) fn source_failed(host: &HostId, stage: impl Into<String>, source: SourceError) -> Self {
        Self::Source {
            host: host.clone(),
            stage: stage.into(),
            source,
        }
    }

    /// Host the failure belongs to, when it belongs to one.
    pub fn host(&self) -> Option<&HostId> {
        match self {
            Self::Source { host, .. }
            | Self::MissingDatabase { host, .. }
            | Self::InvalidConfig { host, .. }
            | Self::Sink { host, .. } => Some(host),
            Self::DiffWithoutStore | Self::Store(_) => None,
        }
    }
}
