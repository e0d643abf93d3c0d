use std::path::PathBuf;

/// Where finished host results go.
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Directory receiving one JSON report per host, overwritten every run.
    pub report_dir: Option<PathBuf>,
    /// Print a per-host summary to stdout.
    pub stdout: bool,
}

impl OutputConfig {
    pub fn has_outputs(&self) -> bool {
        self.stdout || self.report_dir.is_some()
    }
}
