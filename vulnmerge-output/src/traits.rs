use vulnmerge_types::HostScanResult;

/// Trait for rendering one host's result as text.
pub trait OutputFormatter: Send + Sync {
    fn format(&self, result: &HostScanResult) -> Result<String, OutputError>;
}

/// Destination for finished host results.
///
/// Called exactly once per host per run, after filtering and diffing.
pub trait ReportSink {
    fn write(&mut self, result: &HostScanResult) -> Result<(), OutputError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("formatting error: {0}")]
    FormatError(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
