// ---------------------------------------------------------------------------
// Bundled weakness reference tables
// ---------------------------------------------------------------------------
//
// A curated CWE dictionary plus the three ranking lists used to flag the
// most prevalent weakness classes. Read-only; built once per process.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use vulnmerge_types::CweText;

use crate::cwe::WeaknessReference;

/// The bundled tables as a [`WeaknessReference`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledReference;

impl WeaknessReference for BundledReference {
    fn describe_en(&self, cwe_id: &str) -> Option<CweText> {
        CWE_DICT_EN.get(cwe_id).cloned()
    }

    fn describe_ja(&self, cwe_id: &str) -> Option<CweText> {
        CWE_DICT_JA.get(cwe_id).cloned()
    }

    fn owasp_top_ten_2017(&self, cwe_id: &str) -> Option<u8> {
        OWASP_TOP_TEN_2017.get(cwe_id).copied()
    }

    fn cwe_top25_2019(&self, cwe_id: &str) -> Option<u8> {
        CWE_TOP25_2019.get(cwe_id).copied()
    }

    fn sans_top25(&self, cwe_id: &str) -> Option<u8> {
        SANS_TOP25.get(cwe_id).copied()
    }
}

fn text(name: &str, description: &str) -> CweText {
    CweText {
        name: name.to_string(),
        description: description.to_string(),
    }
}

/// English names keyed by bare CWE id.
static CWE_DICT_EN: LazyLock<BTreeMap<&'static str, CweText>> = LazyLock::new(|| {
    [
        ("2", "7PK - Environment", ""),
        ("16", "Configuration", ""),
        ("20", "Improper Input Validation", "The product does not validate or incorrectly validates input."),
        ("22", "Improper Limitation of a Pathname to a Restricted Directory ('Path Traversal')", ""),
        ("77", "Improper Neutralization of Special Elements used in a Command ('Command Injection')", ""),
        ("78", "Improper Neutralization of Special Elements used in an OS Command ('OS Command Injection')", ""),
        ("79", "Improper Neutralization of Input During Web Page Generation ('Cross-site Scripting')", ""),
        ("89", "Improper Neutralization of Special Elements used in an SQL Command ('SQL Injection')", ""),
        ("94", "Improper Control of Generation of Code ('Code Injection')", ""),
        ("119", "Improper Restriction of Operations within the Bounds of a Memory Buffer", ""),
        ("120", "Buffer Copy without Checking Size of Input ('Classic Buffer Overflow')", ""),
        ("125", "Out-of-bounds Read", ""),
        ("131", "Incorrect Calculation of Buffer Size", ""),
        ("134", "Use of Externally-Controlled Format String", ""),
        ("190", "Integer Overflow or Wraparound", ""),
        ("200", "Exposure of Sensitive Information to an Unauthorized Actor", ""),
        ("220", "Storage of File With Sensitive Data Under FTP Root", ""),
        ("223", "Omission of Security-relevant Information", ""),
        ("250", "Execution with Unnecessary Privileges", ""),
        ("269", "Improper Privilege Management", ""),
        ("284", "Improper Access Control", ""),
        ("285", "Improper Authorization", ""),
        ("287", "Improper Authentication", ""),
        ("295", "Improper Certificate Validation", ""),
        ("306", "Missing Authentication for Critical Function", ""),
        ("307", "Improper Restriction of Excessive Authentication Attempts", ""),
        ("310", "Cryptographic Issues", ""),
        ("311", "Missing Encryption of Sensitive Data", ""),
        ("312", "Cleartext Storage of Sensitive Information", ""),
        ("319", "Cleartext Transmission of Sensitive Information", ""),
        ("326", "Inadequate Encryption Strength", ""),
        ("327", "Use of a Broken or Risky Cryptographic Algorithm", ""),
        ("352", "Cross-Site Request Forgery (CSRF)", ""),
        ("359", "Exposure of Private Personal Information to an Unauthorized Actor", ""),
        ("384", "Session Fixation", ""),
        ("388", "7PK - Errors", ""),
        ("400", "Uncontrolled Resource Consumption", ""),
        ("416", "Use After Free", ""),
        ("426", "Untrusted Search Path", ""),
        ("434", "Unrestricted Upload of File with Dangerous Type", ""),
        ("476", "NULL Pointer Dereference", ""),
        ("494", "Download of Code Without Integrity Check", ""),
        ("502", "Deserialization of Untrusted Data", ""),
        ("601", "URL Redirection to Untrusted Site ('Open Redirect')", ""),
        ("611", "Improper Restriction of XML External Entity Reference", ""),
        ("639", "Authorization Bypass Through User-Controlled Key", ""),
        ("676", "Use of Potentially Dangerous Function", ""),
        ("732", "Incorrect Permission Assignment for Critical Resource", ""),
        ("759", "Use of a One-Way Hash without a Salt", ""),
        ("772", "Missing Release of Resource after Effective Lifetime", ""),
        ("778", "Insufficient Logging", ""),
        ("787", "Out-of-bounds Write", ""),
        ("798", "Use of Hard-coded Credentials", ""),
        ("807", "Reliance on Untrusted Inputs in a Security Decision", ""),
        ("829", "Inclusion of Functionality from Untrusted Control Sphere", ""),
        ("862", "Missing Authorization", ""),
        ("863", "Incorrect Authorization", ""),
        ("917", "Improper Neutralization of Special Elements used in an Expression Language Statement ('Expression Language Injection')", ""),
        ("943", "Improper Neutralization of Special Elements in Data Query Logic", ""),
    ]
    .into_iter()
    .map(|(id, name, desc)| (id, text(name, desc)))
    .collect()
});

/// Japanese names keyed by bare CWE id.
static CWE_DICT_JA: LazyLock<BTreeMap<&'static str, CweText>> = LazyLock::new(|| {
    [
        ("20", "不適切な入力確認"),
        ("22", "パス・トラバーサル"),
        ("78", "OS コマンドインジェクション"),
        ("79", "クロスサイトスクリプティング"),
        ("89", "SQL インジェクション"),
        ("94", "コード・インジェクション"),
        ("119", "バッファエラー"),
        ("125", "境界外読み込み"),
        ("190", "整数オーバーフローまたはラップアラウンド"),
        ("200", "情報漏えい"),
        ("287", "不適切な認証"),
        ("352", "クロスサイトリクエストフォージェリ"),
        ("400", "リソースの枯渇"),
        ("416", "解放済みメモリの使用"),
        ("476", "NULL ポインタデリファレンス"),
        ("502", "信頼性のないデータのデシリアライゼーション"),
        ("611", "XML 外部エンティティ参照の不適切な制限"),
        ("787", "境界外書き込み"),
        ("798", "ハードコードされた認証情報の使用"),
    ]
    .into_iter()
    .map(|(id, name)| (id, text(name, "")))
    .collect()
});

/// OWASP Top 10 (2017): category number by CWE id.
static OWASP_TOP_TEN_2017: LazyLock<BTreeMap<&'static str, u8>> = LazyLock::new(|| {
    let categories: [(u8, &[&str]); 9] = [
        (1, &["77", "89", "917", "943"]),
        (2, &["287", "384"]),
        (3, &["220", "310", "312", "319", "326", "359"]),
        (4, &["611"]),
        (5, &["22", "284", "285", "639"]),
        (6, &["2", "16", "388"]),
        (7, &["79"]),
        (8, &["502"]),
        (10, &["223", "778"]),
    ];
    categories
        .into_iter()
        .flat_map(|(rank, ids)| ids.iter().map(move |id| (*id, rank)))
        .collect()
});

/// CWE Top 25 (2019), in rank order.
static CWE_TOP25_2019: LazyLock<BTreeMap<&'static str, u8>> = LazyLock::new(|| {
    ranked(&[
        "119", "79", "20", "200", "125", "89", "416", "190", "352", "22", "78", "787", "287",
        "476", "732", "434", "611", "94", "798", "400", "772", "426", "502", "269", "295",
    ])
});

/// SANS Top 25, in rank order.
static SANS_TOP25: LazyLock<BTreeMap<&'static str, u8>> = LazyLock::new(|| {
    ranked(&[
        "89", "78", "120", "79", "306", "862", "798", "311", "434", "807", "250", "352", "22",
        "494", "863", "829", "732", "676", "327", "131", "307", "601", "134", "190", "759",
    ])
});

fn ranked(ids: &[&'static str]) -> BTreeMap<&'static str, u8> {
    ids.iter()
        .zip(1u8..)
        .map(|(id, rank)| (*id, rank))
        .collect()
}
