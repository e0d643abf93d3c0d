use std::io::Write as _;

use vulnmerge_types::HostScanResult;

use crate::config::OutputConfig;
use crate::json::JsonReportWriter;
use crate::stdout::SummaryFormatter;
use crate::traits::{OutputError, OutputFormatter, ReportSink};

/// Fans a finished host result out to stdout and/or the report directory.
pub struct ReportManager {
    stdout: bool,
    json: Option<JsonReportWriter>,
}

impl ReportManager {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            stdout: config.stdout,
            json: config.report_dir.map(JsonReportWriter::new),
        }
    }
}

impl ReportSink for ReportManager {
    fn write(&mut self, result: &HostScanResult) -> Result<(), OutputError> {
        if self.stdout {
            let output = SummaryFormatter.format(result)?;
            let mut handle = std::io::stdout().lock();
            handle.write_all(output.as_bytes())?;
            handle.flush()?;
        }
        if let Some(json) = self.json.as_mut() {
            json.write(result)?;
        }
        Ok(())
    }
}
