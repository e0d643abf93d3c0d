mod args;
mod config;
mod feed;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use args::Args;
use feed::{FeedBundle, FeedSources};
use vulnmerge_core::{DetectConfig, Detector};
use vulnmerge_db::ScanStore;
use vulnmerge_output::{OutputConfig, ReportManager};
use vulnmerge_types::HostScanResult;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing based on verbosity
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Handle --history / --delete-run: snapshot maintenance, then exit
    if args.history || args.delete_run.is_some() {
        let Some(db) = args.db.as_deref() else {
            bail!("--history and --delete-run need --db");
        };
        let store = open_store(db)?;
        return match &args.delete_run {
            Some(run_id) => delete_run(&store, run_id),
            None => show_history(&store),
        };
    }

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => DetectConfig::default(),
    };
    config::apply_args(&mut config, &args);

    let results = load_results(&args.results)?;
    info!(hosts = results.len(), "loaded scan results");

    let sources = match &args.feed {
        Some(path) => feed::load(path)?.into_sources(),
        None => {
            warn!("no evidence feed given, existing records are only filtered");
            FeedBundle::default().into_sources()
        }
    };
    let mut detector = build_detector(config, sources);
    if let Some(db) = args.db.as_deref() {
        detector = detector.with_store(Box::new(open_store(db)?));
    }

    let mut sink = ReportManager::new(OutputConfig {
        report_dir: args.report_dir.clone(),
        stdout: !args.quiet,
    });
    let results = detector
        .detect(results, &mut sink)
        .context("detection failed")?;

    let n_cves: usize = results.iter().map(|h| h.scanned_cves.len()).sum();
    info!(hosts = results.len(), cves = n_cves, "detection complete");
    Ok(())
}

fn build_detector(config: DetectConfig, sources: FeedSources) -> Detector {
    let FeedSources {
        packages,
        dictionary,
        code_hosting,
        plugins,
        exploits,
        known_exploited,
    } = sources;

    let mut detector = Detector::new(config, Box::new(dictionary))
        .with_code_hosting(Box::new(code_hosting))
        .with_plugin_tracker(Box::new(plugins))
        .with_exploit_feed(Box::new(exploits))
        .with_known_exploited_feed(Box::new(known_exploited));
    for source in packages {
        detector = detector.with_package_source(Box::new(source));
    }
    detector
}

fn open_store(path: &Path) -> Result<ScanStore> {
    ScanStore::open(path)
        .with_context(|| format!("failed to open snapshot database '{}'", path.display()))
}

/// Expand directories to the `.json` files they contain, sorted by name.
fn result_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let entries = std::fs::read_dir(path)
            .with_context(|| format!("failed to read results directory '{}'", path.display()))?;
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to read results directory '{}'", path.display()))?;
            let file = entry.path();
            if file.extension().is_some_and(|ext| ext == "json") {
                found.push(file);
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

fn load_results(paths: &[PathBuf]) -> Result<Vec<HostScanResult>> {
    let files = result_files(paths)?;
    if files.is_empty() {
        bail!("no scan result files found");
    }
    files
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read scan result '{}'", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse scan result '{}'", path.display()))
        })
        .collect()
}

fn show_history(store: &ScanStore) -> Result<()> {
    let runs = store.list_runs().context("failed to list runs")?;

    if runs.is_empty() {
        println!("No run history found.");
    } else {
        println!(
            "{:<32} {:<12} {:<8} {:<8} VERSION",
            "RUN ID", "REPORTED", "HOSTS", "CVES"
        );
        for r in &runs {
            println!(
                "{:<32} {:<12} {:<8} {:<8} {}",
                r.run_id,
                r.reported_at,
                r.num_hosts,
                r.num_cves,
                r.reported_version.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

fn delete_run(store: &ScanStore, run_id: &str) -> Result<()> {
    if store
        .delete_run(run_id)
        .with_context(|| format!("failed to delete run '{run_id}'"))?
    {
        println!("Run '{run_id}' deleted.");
        Ok(())
    } else {
        bail!("no run with id '{run_id}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulnmerge_types::OsFamily;

    fn write_result(dir: &Path, file: &str, host: &HostScanResult) {
        std::fs::write(dir.join(file), serde_json::to_string(host).unwrap()).unwrap();
    }

    #[test]
    fn directories_expand_to_sorted_json_files() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), "web02.json", &HostScanResult::new("web02", OsFamily::Ubuntu, "22.04"));
        write_result(dir.path(), "web01.json", &HostScanResult::new("web01", OsFamily::Debian, "12"));
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let results = load_results(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<&str> = results.iter().map(|h| h.server_name.as_str()).collect();
        assert_eq!(names, ["web01", "web02"]);
    }

    #[test]
    fn empty_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_results(&[dir.path().to_path_buf()]).is_err());
    }

    #[test]
    fn malformed_result_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_results(&[path]).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn end_to_end_with_feed_and_report_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = HostScanResult::new("web01", OsFamily::Ubuntu, "22.04");
        host.add_package(vulnmerge_types::Package::new("openssl", "3.0.2-0ubuntu1.10"));

        let bundle: FeedBundle = serde_json::from_str(
            r#"{"package_sources": [{
                  "name": "oval",
                  "fetched": [{"family": "ubuntu", "release": "22.04"}],
                  "findings": [{"cve_id": "CVE-2024-0001",
                                "confidences": [{"method": "OvalMatch", "score": 100}],
                                "affected_packages": [{"name": "openssl", "fixed_in": "3.0.2-0ubuntu1.15"}]}]
                }]}"#,
        )
        .unwrap();
        let detector = build_detector(DetectConfig::default(), bundle.into_sources());
        let reports = dir.path().join("reports");
        let mut sink = ReportManager::new(OutputConfig {
            report_dir: Some(reports.clone()),
            stdout: false,
        });

        let results = detector.detect(vec![host], &mut sink).unwrap();
        assert!(results[0].scanned_cves.contains_key("CVE-2024-0001"));

        let written = load_results(&[reports]).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].scanned_cves.contains_key("CVE-2024-0001"));
    }
}
