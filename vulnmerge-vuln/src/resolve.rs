// ---------------------------------------------------------------------------
// Confidence resolution
// ---------------------------------------------------------------------------
//
// Turns the detection signals a CVE dictionary reports for one identifier
// into a single confidence. NVD is the primary family; JVN only counts when
// NVD said nothing at all.

use vulnmerge_types::{Confidence, CveDetail, DetectionMethod};

/// Primary-family methods, strongest first.
const NVD_PRECEDENCE: [DetectionMethod; 3] = [
    DetectionMethod::NvdExactVersionMatch,
    DetectionMethod::NvdRoughVersionMatch,
    DetectionMethod::NvdVendorProductMatch,
];

/// Resolve the confidence of one dictionary match.
///
/// Returns `None` when neither family produced a usable signal.
pub fn resolve(detail: &CveDetail) -> Option<Confidence> {
    if detail.has_nvd() {
        let methods: Vec<DetectionMethod> = detail
            .nvds
            .iter()
            .filter_map(|n| n.detection_method)
            .collect();
        return resolve_methods(&methods);
    }
    if detail.has_jvn() {
        return Some(Confidence::JVN_VENDOR_PRODUCT);
    }
    None
}

/// Pick the strongest primary-family method present in `methods`.
///
/// Methods outside the primary family are ignored here; they arrive through
/// their own sources with their own fixed ranks.
pub fn resolve_methods(methods: &[DetectionMethod]) -> Option<Confidence> {
    NVD_PRECEDENCE
        .iter()
        .find(|m| methods.contains(m))
        .map(|m| Confidence::of(*m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vulnmerge_types::{ContentFragment, ContentType, JvnEntry, NvdEntry};

    fn nvd(method: Option<DetectionMethod>) -> NvdEntry {
        NvdEntry {
            content: ContentFragment::new(ContentType::Nvd, "CVE-2024-0001", "nvd"),
            detection_method: method,
            exploits: vec![],
            mitigations: vec![],
            certs: vec![],
        }
    }

    fn jvn(id: &str) -> JvnEntry {
        JvnEntry {
            jvn_id: id.into(),
            content: ContentFragment::new(ContentType::Jvn, "CVE-2024-0001", id),
            certs: vec![],
        }
    }

    #[test]
    fn exact_beats_rough() {
        let mut d = CveDetail::new("CVE-2024-0001");
        d.nvds.push(nvd(Some(DetectionMethod::NvdRoughVersionMatch)));
        d.nvds.push(nvd(Some(DetectionMethod::NvdExactVersionMatch)));
        assert_eq!(resolve(&d), Some(Confidence::NVD_EXACT_VERSION));
    }

    #[test]
    fn primary_rough_ignores_secondary() {
        let mut d = CveDetail::new("CVE-2024-0001");
        d.nvds.push(nvd(Some(DetectionMethod::NvdRoughVersionMatch)));
        d.jvns.push(jvn("JVNDB-2024-000001"));
        assert_eq!(resolve(&d), Some(Confidence::NVD_ROUGH_VERSION));
    }

    #[test]
    fn primary_weak_beats_secondary_weak() {
        let mut d = CveDetail::new("CVE-2024-0001");
        d.nvds.push(nvd(Some(DetectionMethod::NvdVendorProductMatch)));
        d.jvns.push(jvn("JVNDB-2024-000001"));
        assert_eq!(resolve(&d), Some(Confidence::NVD_VENDOR_PRODUCT));
    }

    #[test]
    fn secondary_only_falls_back() {
        let mut d = CveDetail::new("CVE-2024-0001");
        d.jvns.push(jvn("JVNDB-2024-000001"));
        assert_eq!(resolve(&d), Some(Confidence::JVN_VENDOR_PRODUCT));
    }

    #[test]
    fn primary_without_method_blocks_fallback() {
        let mut d = CveDetail::new("CVE-2024-0001");
        d.nvds.push(nvd(None));
        d.jvns.push(jvn("JVNDB-2024-000001"));
        assert_eq!(resolve(&d), None);
    }

    #[test]
    fn nothing_at_all() {
        assert_eq!(resolve(&CveDetail::new("CVE-2024-0001")), None);
    }

    fn nvd_method() -> impl Strategy<Value = DetectionMethod> {
        prop_oneof![
            Just(DetectionMethod::NvdExactVersionMatch),
            Just(DetectionMethod::NvdRoughVersionMatch),
            Just(DetectionMethod::NvdVendorProductMatch),
        ]
    }

    proptest! {
        #[test]
        fn resolved_rank_is_max_of_primary(
            methods in proptest::collection::vec(nvd_method(), 1..6),
            with_jvn in any::<bool>(),
        ) {
            let mut d = CveDetail::new("CVE-2024-0001");
            for m in &methods {
                d.nvds.push(nvd(Some(*m)));
            }
            if with_jvn {
                d.jvns.push(jvn("JVNDB-2024-000001"));
            }
            let resolved = resolve(&d).unwrap();
            let max = methods.iter().map(|m| m.score()).max().unwrap();
            prop_assert_eq!(resolved.score, max);
            prop_assert!(resolved.score > Confidence::JVN_VENDOR_PRODUCT.score);
            prop_assert_eq!(resolve(&d), Some(resolved));
        }
    }
}
