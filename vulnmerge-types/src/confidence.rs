use serde::{Deserialize, Serialize};
use std::fmt;

/// How a vulnerability was matched to installed software.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DetectionMethod {
    /// Distribution OVAL definition matched the installed package.
    OvalMatch,
    /// Distribution security tracker listed the installed package.
    DistroTrackerMatch,
    /// Package changelog mentions the CVE at the exact installed version.
    ChangelogExactMatch,
    /// Package changelog mentions the CVE somewhere.
    ChangelogRoughMatch,
    /// Code-hosting security alert for a dependency.
    GitHubMatch,
    /// Plugin vulnerability tracker matched an installed plugin.
    PluginTrackerMatch,
    /// Reported directly by a third-party inventory scanner.
    TrivyMatch,
    /// NVD configuration matched the exact CPE version.
    NvdExactVersionMatch,
    /// NVD configuration matched a version range.
    NvdRoughVersionMatch,
    /// NVD matched only on vendor and product.
    NvdVendorProductMatch,
    /// JVN matched only on vendor and product.
    JvnVendorProductMatch,
}

impl DetectionMethod {
    /// Fixed rank of this method. Higher is more reliable.
    pub const fn score(self) -> u32 {
        match self {
            Self::OvalMatch
            | Self::DistroTrackerMatch
            | Self::GitHubMatch
            | Self::PluginTrackerMatch
            | Self::TrivyMatch
            | Self::NvdExactVersionMatch => 100,
            Self::ChangelogExactMatch => 95,
            Self::NvdRoughVersionMatch => 80,
            Self::ChangelogRoughMatch => 50,
            Self::NvdVendorProductMatch => 10,
            Self::JvnVendorProductMatch => 5,
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OvalMatch => write!(f, "OvalMatch"),
            Self::DistroTrackerMatch => write!(f, "DistroTrackerMatch"),
            Self::ChangelogExactMatch => write!(f, "ChangelogExactMatch"),
            Self::ChangelogRoughMatch => write!(f, "ChangelogRoughMatch"),
            Self::GitHubMatch => write!(f, "GitHubMatch"),
            Self::PluginTrackerMatch => write!(f, "PluginTrackerMatch"),
            Self::TrivyMatch => write!(f, "TrivyMatch"),
            Self::NvdExactVersionMatch => write!(f, "NvdExactVersionMatch"),
            Self::NvdRoughVersionMatch => write!(f, "NvdRoughVersionMatch"),
            Self::NvdVendorProductMatch => write!(f, "NvdVendorProductMatch"),
            Self::JvnVendorProductMatch => write!(f, "JvnVendorProductMatch"),
        }
    }
}

/// A detection method together with its numeric rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Confidence {
    pub method: DetectionMethod,
    pub score: u32,
}

impl Confidence {
    pub const NVD_EXACT_VERSION: Self = Self::of(DetectionMethod::NvdExactVersionMatch);
    pub const NVD_ROUGH_VERSION: Self = Self::of(DetectionMethod::NvdRoughVersionMatch);
    pub const NVD_VENDOR_PRODUCT: Self = Self::of(DetectionMethod::NvdVendorProductMatch);
    pub const JVN_VENDOR_PRODUCT: Self = Self::of(DetectionMethod::JvnVendorProductMatch);

    /// The confidence a method carries at its fixed rank.
    pub const fn of(method: DetectionMethod) -> Self {
        Self {
            method,
            score: method.score(),
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.score)
    }
}

/// Ranked set of confidences, at most one per detection method.
///
/// Kept sorted by descending score, then by method, so the first entry is
/// always the strongest and serialized output is stable.
/// Deserialization rebuilds the set through `append_if_missing`, so stored
/// lists with foreign order or repeated methods come back ranked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Confidence>", into = "Vec<Confidence>")]
pub struct Confidences(Vec<Confidence>);

impl Confidences {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert `confidence` unless its method is already present.
    ///
    /// An existing entry for the same method keeps its score even when the
    /// new one ranks higher. Returns whether anything was inserted.
    pub fn append_if_missing(&mut self, confidence: Confidence) -> bool {
        if self.contains_method(confidence.method) {
            return false;
        }
        let pos = self
            .0
            .iter()
            .position(|c| {
                (c.score, std::cmp::Reverse(c.method))
                    < (confidence.score, std::cmp::Reverse(confidence.method))
            })
            .unwrap_or(self.0.len());
        self.0.insert(pos, confidence);
        true
    }

    pub fn contains_method(&self, method: DetectionMethod) -> bool {
        self.0.iter().any(|c| c.method == method)
    }

    /// Strongest confidence, if any.
    pub fn max(&self) -> Option<Confidence> {
        self.0.first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Confidence> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Confidence> for Confidences {
    fn from_iter<I: IntoIterator<Item = Confidence>>(iter: I) -> Self {
        let mut set = Self::new();
        for c in iter {
            set.append_if_missing(c);
        }
        set
    }
}

impl From<Vec<Confidence>> for Confidences {
    fn from(list: Vec<Confidence>) -> Self {
        list.into_iter().collect()
    }
}

impl From<Confidences> for Vec<Confidence> {
    fn from(set: Confidences) -> Self {
        set.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_ranks_are_ordered() {
        assert!(Confidence::NVD_EXACT_VERSION.score > Confidence::NVD_ROUGH_VERSION.score);
        assert!(Confidence::NVD_ROUGH_VERSION.score > Confidence::NVD_VENDOR_PRODUCT.score);
        assert!(Confidence::NVD_VENDOR_PRODUCT.score > Confidence::JVN_VENDOR_PRODUCT.score);
    }

    #[test]
    fn append_keeps_ranked_order() {
        let mut set = Confidences::new();
        set.append_if_missing(Confidence::JVN_VENDOR_PRODUCT);
        set.append_if_missing(Confidence::NVD_EXACT_VERSION);
        set.append_if_missing(Confidence::NVD_ROUGH_VERSION);
        let methods: Vec<_> = set.iter().map(|c| c.method).collect();
        assert_eq!(
            methods,
            vec![
                DetectionMethod::NvdExactVersionMatch,
                DetectionMethod::NvdRoughVersionMatch,
                DetectionMethod::JvnVendorProductMatch,
            ]
        );
        assert_eq!(set.max(), Some(Confidence::NVD_EXACT_VERSION));
    }

    #[test]
    fn first_writer_wins_per_method() {
        let mut set = Confidences::new();
        let low = Confidence {
            method: DetectionMethod::ChangelogRoughMatch,
            score: 40,
        };
        let high = Confidence {
            method: DetectionMethod::ChangelogRoughMatch,
            score: 70,
        };
        assert!(set.append_if_missing(low));
        assert!(!set.append_if_missing(high));
        assert_eq!(set.len(), 1);
        assert_eq!(set.max().unwrap().score, 40);
    }

    #[test]
    fn equal_scores_order_by_method() {
        let set: Confidences = [
            Confidence::of(DetectionMethod::GitHubMatch),
            Confidence::of(DetectionMethod::OvalMatch),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.max().unwrap().method, DetectionMethod::OvalMatch);
    }

    #[test]
    fn serializes_as_plain_list() {
        let set: Confidences = [Confidence::NVD_ROUGH_VERSION].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[{"method":"NvdRoughVersionMatch","score":80}]"#);
    }

    #[test]
    fn deserializing_reranks_and_drops_repeated_methods() {
        let json = r#"[
            {"method":"JvnVendorProductMatch","score":5},
            {"method":"NvdExactVersionMatch","score":100},
            {"method":"JvnVendorProductMatch","score":5}
        ]"#;
        let set: Confidences = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.max(), Some(Confidence::NVD_EXACT_VERSION));

        let mut set = set;
        assert!(set.append_if_missing(Confidence::NVD_ROUGH_VERSION));
        let scores: Vec<u32> = set.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![100, 80, 5]);
    }
}
