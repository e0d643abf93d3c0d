use std::path::Path;

use anyhow::{Context, Result};
use vulnmerge_core::DetectConfig;

use crate::args::Args;

/// Load a detection config from a TOML file.
pub fn load_config(path: &Path) -> Result<DetectConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config '{}'", path.display()))?;
    let config: DetectConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config '{}'", path.display()))?;
    Ok(config)
}

/// Apply command-line flags on top of the file config.
///
/// A flag only overrides when it was actually given: switches can turn a
/// setting on but never off, and absent options leave the file value alone.
pub fn apply_args(config: &mut DetectConfig, args: &Args) {
    if let Some(lang) = args.lang {
        config.lang = lang;
    }
    if let Some(over) = args.cvss_over {
        config.cvss_over = over;
    }
    if let Some(over) = args.confidence_over {
        config.confidence_over = over;
    }
    config.ignore_unfixed |= args.ignore_unfixed;
    config.ignore_unscored_cves |= args.ignore_unscored_cves;
    config.diff_plus |= args.diff_plus;
    config.diff_minus |= args.diff_minus;
    config.refresh_cve |= args.refresh_cve;
}
