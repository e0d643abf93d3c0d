use std::fmt::Write as _;

use vulnmerge_types::{HostScanResult, VulnerabilityRecord};

use crate::traits::{OutputError, OutputFormatter};

/// Strip terminal control characters from untrusted data to prevent escape injection.
fn sanitize_terminal(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_control() && c != '\n' && c != '\t' {
                '?'
            } else {
                c
            }
        })
        .collect()
}

/// One-screen text summary of a host's findings.
#[derive(Debug, Default)]
pub struct SummaryFormatter;

impl OutputFormatter for SummaryFormatter {
    fn format(&self, result: &HostScanResult) -> Result<String, OutputError> {
        let mut out = String::new();
        let fmt_err = |e: std::fmt::Error| OutputError::FormatError(e.to_string());

        writeln!(
            out,
            "{} ({} {})",
            sanitize_terminal(&result.host_id().to_string()),
            result.family,
            sanitize_terminal(&result.release)
        )
        .map_err(fmt_err)?;

        let (mut critical, mut high, mut medium, mut low, mut unknown) = (0, 0, 0, 0, 0);
        for rec in result.scanned_cves.values() {
            match rec.max_severity_score() {
                Some(s) if s >= 9.0 => critical += 1,
                Some(s) if s >= 7.0 => high += 1,
                Some(s) if s >= 4.0 => medium += 1,
                Some(_) => low += 1,
                None => unknown += 1,
            }
        }
        writeln!(
            out,
            "Total: {} ({critical} critical, {high} high, {medium} medium, {low} low, {unknown} unknown)",
            result.scanned_cves.len()
        )
        .map_err(fmt_err)?;

        for rec in result.scanned_cves.values() {
            writeln!(out, "  {}", format_record(rec)).map_err(fmt_err)?;
        }
        Ok(out)
    }
}

fn format_record(rec: &VulnerabilityRecord) -> String {
    let marker = rec.diff_status.map(|d| d.to_string()).unwrap_or_else(|| " ".into());
    let score = rec
        .max_severity_score()
        .map(|s| format!("{s:>4.1}"))
        .unwrap_or_else(|| " n/a".into());
    let confidence = rec
        .max_confidence()
        .map(|c| c.to_string())
        .unwrap_or_default();
    let packages: Vec<&str> = rec.affected_packages.iter().map(|p| p.name.as_str()).collect();
    let mut line = format!("{marker} {:<18} {score}  {confidence}", rec.cve_id());
    if !packages.is_empty() {
        line.push_str("  ");
        line.push_str(&packages.join(", "));
    }
    sanitize_terminal(line.trim_end())
}
