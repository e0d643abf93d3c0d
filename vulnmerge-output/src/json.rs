use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use vulnmerge_types::HostScanResult;

use crate::traits::{OutputError, OutputFormatter, ReportSink};

/// Formats a host result as pretty-printed JSON.
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format(&self, result: &HostScanResult) -> Result<String, OutputError> {
        serde_json::to_string_pretty(result)
            .map_err(|e| OutputError::FormatError(format!("JSON serialization error: {e}")))
    }
}

/// Writes one `<server>[@<container>].json` file per host into a directory,
/// replacing any previous report for that host.
pub struct JsonReportWriter {
    dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Report path for a host.
    pub fn path_for(&self, result: &HostScanResult) -> Result<PathBuf, OutputError> {
        let stem = result.host_id().file_stem();
        if stem.is_empty()
            || stem == "."
            || stem == ".."
            || stem.contains(['/', '\\'])
        {
            return Err(OutputError::FormatError(format!(
                "host name '{stem}' cannot be used as a report file name"
            )));
        }
        Ok(self.dir.join(format!("{stem}.json")))
    }
}

impl ReportSink for JsonReportWriter {
    fn write(&mut self, result: &HostScanResult) -> Result<(), OutputError> {
        let path = self.path_for(result)?;
        let output = JsonFormatter.format(result)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, output).map_err(|e| {
            OutputError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to write {}: {}", path.display(), e),
            ))
        })?;
        debug!(path = %path.display(), "wrote JSON report");
        Ok(())
    }
}
