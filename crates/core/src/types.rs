use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Three-way retrieval state for one sub-feature of a file record:
/// `NotRequested` is distinct from `Found` with an empty value
/// (requested-but-absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Requested<T> {
    NotRequested,
    Found(T),
}

impl<T> Requested<T> {
    pub fn is_requested(&self) -> bool {
        matches!(self, Requested::Found(_))
    }

    pub fn as_found(&self) -> Option<&T> {
        match self {
            Requested::NotRequested => None,
            Requested::Found(value) => Some(value),
        }
    }
}

impl<T> From<Option<T>> for Requested<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            None => Requested::NotRequested,
            Some(value) => Requested::Found(value),
        }
    }
}

/// Which sub-features a run retrieves per file. Licenses are on by default;
/// everything else is opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub licenses: bool,
    pub copyrights: bool,
    pub emails: bool,
    pub urls: bool,
    pub file_info: bool,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            licenses: true,
            copyrights: false,
            emails: false,
            urls: false,
            file_info: false,
        }
    }
}

impl Selection {
    /// True if anything the external oracle provides is requested.
    pub fn wants_oracle(&self) -> bool {
        self.licenses || self.copyrights || self.emails || self.urls
    }
}

/// Matcher algorithm tags as reported by the scanning oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Matcher {
    #[serde(rename = "1-hash")]
    Hash,
    #[serde(rename = "1-spdx-id")]
    SpdxId,
    #[serde(rename = "2-aho")]
    Aho,
    #[serde(rename = "3-seq")]
    Seq,
    #[serde(rename = "5-undetected")]
    Undetected,
    #[default]
    #[serde(other, rename = "6-unknown")]
    Unknown,
}

impl Matcher {
    pub fn code(&self) -> &'static str {
        match self {
            Matcher::Hash => "1-hash",
            Matcher::SpdxId => "1-spdx-id",
            Matcher::Aho => "2-aho",
            Matcher::Seq => "3-seq",
            Matcher::Undetected => "5-undetected",
            Matcher::Unknown => "6-unknown",
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One textual span matching a known license rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseMatch {
    pub score: f64,
    pub start_line: u32,
    pub end_line: u32,
    pub matched_length: u32,
    pub match_coverage: f64,
    pub matcher: Matcher,
    pub license_expression: String,
    pub spdx_license_expression: String,
    pub rule_identifier: String,
    pub rule_relevance: u16,
    pub rule_url: Option<String>,
    pub from_file: Option<String>,
}

/// A weak, unconfirmed signal. Same shape as a match, never promoted to a
/// detection.
pub type LicenseClue = LicenseMatch;

/// One coherent license finding backed by one or more matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseDetection {
    pub license_expression: String,
    pub license_expression_spdx: String,
    pub identifier: String,
    pub matches: Vec<LicenseMatch>,
}

/// Deterministic detection identifier: a slug of the expression plus a
/// uuid-shaped digest over the expression and the match spans, so equal
/// findings always map to the same identifier.
pub fn detection_identifier(expression: &str, matches: &[LicenseMatch]) -> String {
    let mut slug = String::with_capacity(expression.len());
    for c in expression.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');

    let mut hasher = Sha256::new();
    hasher.update(expression.as_bytes());
    for m in matches {
        hasher.update(m.rule_identifier.as_bytes());
        hasher.update(m.start_line.to_le_bytes());
        hasher.update(m.end_line.to_le_bytes());
        hasher.update(m.matched_length.to_le_bytes());
    }
    let hex = format!("{:x}", hasher.finalize());
    format!(
        "{}-{}-{}-{}-{}-{}",
        slug,
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Detection summary for one file or package tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Licenses {
    pub detected_license_expression: Option<String>,
    pub detected_license_expression_spdx: Option<String>,
    pub percentage_of_license_text: f64,
    pub license_detections: Vec<LicenseDetection>,
    pub license_clues: Vec<LicenseClue>,
}

impl Licenses {
    /// A package-level value carrying only a declared expression, as read
    /// from archive headers.
    pub fn declared(expression: &str) -> Self {
        Self {
            detected_license_expression: Some(expression.to_string()),
            detected_license_expression_spdx: Some(expression.to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detected_license_expression.is_none()
            && self.license_detections.is_empty()
            && self.license_clues.is_empty()
    }

    /// Match scores backing the file-level detected expression. Non-empty
    /// only when a detection carries exactly the file-level expression,
    /// i.e. when a single dominant detection exists.
    pub fn scores_of_detected_spdx(&self) -> Vec<f64> {
        let Some(expected) = self.detected_license_expression_spdx.as_deref() else {
            return Vec::new();
        };
        self.license_detections
            .iter()
            .filter(|d| d.license_expression_spdx == expected)
            .flat_map(|d| d.matches.iter().map(|m| m.score))
            .collect()
    }
}

/// File metadata computed in-process: size, modification date and SHA-256.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub size: u64,
    pub date: String,
    pub sha256: String,
}

impl FileInfo {
    pub fn collect(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let date = chrono::DateTime::<chrono::Utc>::from(meta.modified()?)
            .format("%Y-%m-%d")
            .to_string();

        let mut hasher = Sha256::new();
        let mut file = File::open(path)?;
        io::copy(&mut file, &mut hasher)?;

        Ok(Self {
            size: meta.len(),
            date,
            sha256: format!("{:x}", hasher.finalize()),
        })
    }
}

/// Per-file record produced in one pass and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResults {
    pub path: PathBuf,
    pub short_path: String,
    pub copyrights: Requested<Vec<String>>,
    pub emails: Requested<Vec<String>>,
    pub urls: Requested<Vec<String>>,
    pub file_info: Requested<FileInfo>,
    pub licenses: Requested<Licenses>,
}

impl FileResults {
    /// A record that shows up in the report without having been analyzed:
    /// licenses present but empty, everything else not requested.
    pub fn skipped(path: &Path, short_path: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            short_path: short_path.to_string(),
            copyrights: Requested::NotRequested,
            emails: Requested::NotRequested,
            urls: Requested::NotRequested,
            file_info: Requested::NotRequested,
            licenses: Requested::Found(Licenses::default()),
        }
    }
}
