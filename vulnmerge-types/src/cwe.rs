use serde::{Deserialize, Serialize};
use std::fmt;

/// Report language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Ja,
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::En => write!(f, "en"),
            Self::Ja => write!(f, "ja"),
        }
    }
}

impl std::str::FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "ja" => Ok(Self::Ja),
            other => Err(format!("unsupported language: {other} (expected en or ja)")),
        }
    }
}

/// Localized name and description of a weakness class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CweText {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Resolved metadata for one weakness identifier, rebuilt every run.
///
/// A rank of `None` means the identifier is not in that list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaknessEntry {
    /// Bare identifier without the "CWE-" prefix (e.g., "79").
    pub cwe_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<CweText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ja: Option<CweText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owasp_top_ten_2017: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe_top25_2019: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sans_top25: Option<u8>,
}

impl WeaknessEntry {
    /// An entry carrying only the identifier.
    pub fn bare(cwe_id: impl Into<String>) -> Self {
        Self {
            cwe_id: cwe_id.into(),
            en: None,
            ja: None,
            owasp_top_ten_2017: None,
            cwe_top25_2019: None,
            sans_top25: None,
        }
    }

    pub fn is_ranked(&self) -> bool {
        self.owasp_top_ten_2017.is_some()
            || self.cwe_top25_2019.is_some()
            || self.sans_top25.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lang_parse() {
        assert_eq!("JA".parse::<Lang>().unwrap(), Lang::Ja);
        assert_eq!("en".parse::<Lang>().unwrap(), Lang::En);
        assert!("fr".parse::<Lang>().is_err());
    }

    #[test]
    fn bare_entry_is_unranked() {
        let entry = WeaknessEntry::bare("99999");
        assert!(!entry.is_ranked());
        assert!(entry.en.is_none());
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"cwe_id":"99999"}"#);
    }
}
