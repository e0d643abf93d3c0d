use std::path::PathBuf;

use clap::Parser;
use vulnmerge_types::Lang;

/// vulnmerge: merge, rank, filter and diff vulnerability findings per host
#[derive(Parser, Debug)]
#[command(
    name = "vulnmerge",
    version,
    about = "Merge vulnerability evidence into one ranked record per host"
)]
pub struct Args {
    /// Host scan result JSON files, or directories of them
    #[arg(value_name = "RESULTS", required_unless_present_any = ["history", "delete_run"], num_args = 1..)]
    pub results: Vec<PathBuf>,

    /// TOML configuration file (filters, diff switches, per-server settings)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Offline evidence bundle (JSON) serving every evidence source
    #[arg(long = "feed", value_name = "FILE")]
    pub feed: Option<PathBuf>,

    /// SQLite snapshot history used for diffing
    #[arg(long = "db", value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Write one JSON report per host into this directory
    #[arg(short = 'o', long = "report-dir", value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Do not print per-host summaries to stdout
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Report language: en or ja
    #[arg(long = "lang", value_name = "LANG")]
    pub lang: Option<Lang>,

    // --- Filters ---
    /// Drop CVEs whose best severity score is below this value
    #[arg(long = "cvss-over", value_name = "SCORE")]
    pub cvss_over: Option<f64>,

    /// Drop CVEs whose confidence score is below this value
    #[arg(long = "confidence-over", value_name = "SCORE")]
    pub confidence_over: Option<u32>,

    /// Drop CVEs whose affected packages are all not fixed yet
    #[arg(long = "ignore-unfixed")]
    pub ignore_unfixed: bool,

    /// Drop CVEs without any CVSS score
    #[arg(long = "ignore-unscored-cves")]
    pub ignore_unscored_cves: bool,

    // --- Diff ---
    /// Report only CVEs new or updated since the previous run
    #[arg(long = "diff-plus", requires = "db")]
    pub diff_plus: bool,

    /// Report only CVEs resolved since the previous run
    #[arg(long = "diff-minus", requires = "db")]
    pub diff_minus: bool,

    /// Re-detect hosts whose results already carry CVE content
    #[arg(long = "refresh-cve")]
    pub refresh_cve: bool,

    /// List the runs stored in the snapshot history and exit
    #[arg(long = "history", requires = "db")]
    pub history: bool,

    /// Delete one run from the snapshot history and exit
    #[arg(long = "delete-run", value_name = "RUN_ID", requires = "db")]
    pub delete_run: Option<String>,

    /// Increase verbosity level (use -v, -vv or -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_filters() {
        let args = Args::try_parse_from([
            "vulnmerge",
            "--cvss-over",
            "7.5",
            "--confidence-over=80",
            "--ignore-unfixed",
            "--lang",
            "ja",
            "results/web01.json",
        ])
        .unwrap();
        assert_eq!(args.cvss_over, Some(7.5));
        assert_eq!(args.confidence_over, Some(80));
        assert!(args.ignore_unfixed);
        assert_eq!(args.lang, Some(Lang::Ja));
        assert_eq!(args.results, vec![PathBuf::from("results/web01.json")]);
    }

    #[test]
    fn diff_requires_db() {
        assert!(Args::try_parse_from(["vulnmerge", "--diff-plus", "r.json"]).is_err());
        assert!(
            Args::try_parse_from(["vulnmerge", "--diff-plus", "--db", "h.db", "r.json"]).is_ok()
        );
    }

    #[test]
    fn history_needs_no_results() {
        let args = Args::try_parse_from(["vulnmerge", "--history", "--db", "h.db"]).unwrap();
        assert!(args.history);
        assert!(args.results.is_empty());
        assert!(Args::try_parse_from(["vulnmerge"]).is_err());

        let args =
            Args::try_parse_from(["vulnmerge", "--delete-run", "run-1-2", "--db", "h.db"]).unwrap();
        assert_eq!(args.delete_run.as_deref(), Some("run-1-2"));
    }
}
