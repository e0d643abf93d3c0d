// ---------------------------------------------------------------------------
// Weakness enrichment
// ---------------------------------------------------------------------------
//
// Collects the CWE identifiers referenced by a host's records and resolves
// each against read-only reference tables. Rebuilt from scratch every run.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use vulnmerge_types::{CweText, Lang, VulnerabilityRecord, WeaknessEntry};

const CWE_PREFIX: &str = "CWE-";

/// Read-only weakness reference data.
pub trait WeaknessReference {
    fn describe_en(&self, cwe_id: &str) -> Option<CweText>;
    fn describe_ja(&self, cwe_id: &str) -> Option<CweText>;
    fn owasp_top_ten_2017(&self, cwe_id: &str) -> Option<u8>;
    fn cwe_top25_2019(&self, cwe_id: &str) -> Option<u8>;
    fn sans_top25(&self, cwe_id: &str) -> Option<u8>;
}

/// Bare CWE identifiers referenced anywhere in `records`.
///
/// Only ids carrying the standard prefix count; placeholders such as
/// `NVD-CWE-Other` are skipped.
pub fn referenced_cwe_ids(records: &BTreeMap<String, VulnerabilityRecord>) -> BTreeSet<String> {
    records
        .values()
        .flat_map(|r| r.fragments())
        .flat_map(|f| &f.cwe_ids)
        .filter_map(|id| id.strip_prefix(CWE_PREFIX))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the weakness dictionary for a host's records.
///
/// Identifiers missing from the reference tables still get an entry, with
/// no description and no ranks.
pub fn enrich<R: WeaknessReference + ?Sized>(
    records: &BTreeMap<String, VulnerabilityRecord>,
    lang: Lang,
    reference: &R,
) -> BTreeMap<String, WeaknessEntry> {
    referenced_cwe_ids(records)
        .into_iter()
        .map(|id| {
            let entry = resolve_entry(&id, lang, reference);
            (id, entry)
        })
        .collect()
}

fn resolve_entry<R: WeaknessReference + ?Sized>(
    id: &str,
    lang: Lang,
    reference: &R,
) -> WeaknessEntry {
    let mut entry = WeaknessEntry::bare(id);

    entry.en = reference.describe_en(id);
    if entry.en.is_none() {
        debug!(cwe_id = id, "CWE id not found in English dictionary");
    }

    if lang == Lang::Ja {
        entry.ja = reference.describe_ja(id);
        if entry.ja.is_none() {
            debug!(cwe_id = id, "CWE id not found in Japanese dictionary");
        }
    }

    entry.owasp_top_ten_2017 = reference.owasp_top_ten_2017(id);
    entry.cwe_top25_2019 = reference.cwe_top25_2019(id);
    entry.sans_top25 = reference.sans_top25(id);
    entry
}
