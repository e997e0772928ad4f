use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::error::ScanError;
use crate::types::{
    detection_identifier, LicenseClue, LicenseDetection, LicenseMatch, Licenses, Matcher,
    Selection,
};

/// Everything the oracle reports for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutcome {
    pub licenses: Licenses,
    pub copyrights: Vec<String>,
    pub emails: Vec<String>,
    pub urls: Vec<String>,
}

/// The pluggable scanning oracle. Implementations translate whatever their
/// engine emits into the internal result model; a file without any license
/// text yields an empty `Licenses`, never an error.
pub trait LicenseScanner {
    fn scan(&self, path: &Path, selection: &Selection) -> Result<ScanOutcome, ScanError>;
}

/// Adapter around the ScanCode Toolkit CLI: runs the external binary with
/// JSON output per file and normalizes the result.
pub struct ScancodeScanner {
    program: PathBuf,
}

impl ScancodeScanner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ScancodeScanner {
    fn default() -> Self {
        Self::new("scancode")
    }
}

impl LicenseScanner for ScancodeScanner {
    fn scan(&self, path: &Path, selection: &Selection) -> Result<ScanOutcome, ScanError> {
        if !selection.wants_oracle() {
            return Ok(ScanOutcome::default());
        }

        let json_out = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .map_err(|source| ScanError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let mut command = Command::new(&self.program);
        command.arg("--quiet").arg("--json").arg(json_out.path());
        if selection.licenses {
            command.arg("--license");
        }
        if selection.copyrights {
            command.arg("--copyright");
        }
        if selection.emails {
            command.arg("--email");
        }
        if selection.urls {
            command.arg("--url");
        }
        command.arg(path);

        let output = command.output().map_err(|source| ScanError::Launch {
            program: self.program.display().to_string(),
            source,
        })?;
        if !output.status.success() {
            return Err(ScanError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let bytes = std::fs::read(json_out.path()).map_err(|source| ScanError::Io {
            path: json_out.path().to_path_buf(),
            source,
        })?;
        parse_output(&bytes)
    }
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    #[serde(default)]
    files: Vec<RawFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFile {
    detected_license_expression: Option<String>,
    detected_license_expression_spdx: Option<String>,
    percentage_of_license_text: Option<f64>,
    license_detections: Vec<RawDetection>,
    license_clues: Vec<RawMatch>,
    copyrights: Vec<RawCopyright>,
    emails: Vec<RawEmail>,
    urls: Vec<RawUrl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDetection {
    license_expression: String,
    license_expression_spdx: String,
    identifier: Option<String>,
    matches: Vec<RawMatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMatch {
    score: f64,
    start_line: u32,
    end_line: u32,
    matched_length: u32,
    match_coverage: f64,
    matcher: Matcher,
    license_expression: String,
    spdx_license_expression: String,
    rule_identifier: String,
    rule_relevance: u16,
    rule_url: Option<String>,
    from_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCopyright {
    copyright: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEmail {
    email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUrl {
    url: String,
}

/// Translate the oracle's raw JSON into a `ScanOutcome`. Output without a
/// file record means the oracle saw nothing worth reporting, which maps to
/// the all-absent outcome.
pub fn parse_output(bytes: &[u8]) -> Result<ScanOutcome, ScanError> {
    let raw: RawOutput = serde_json::from_slice(bytes)?;
    Ok(raw.files.into_iter().next().map(normalize).unwrap_or_default())
}

fn normalize(file: RawFile) -> ScanOutcome {
    ScanOutcome {
        licenses: Licenses {
            detected_license_expression: file.detected_license_expression,
            detected_license_expression_spdx: file.detected_license_expression_spdx,
            percentage_of_license_text: file.percentage_of_license_text.unwrap_or(0.0),
            license_detections: file
                .license_detections
                .into_iter()
                .map(normalize_detection)
                .collect(),
            license_clues: file.license_clues.into_iter().map(normalize_match).collect(),
        },
        copyrights: file.copyrights.into_iter().map(|c| c.copyright).collect(),
        emails: file.emails.into_iter().map(|e| e.email).collect(),
        urls: file.urls.into_iter().map(|u| u.url).collect(),
    }
}

fn normalize_detection(raw: RawDetection) -> LicenseDetection {
    let matches: Vec<LicenseMatch> = raw.matches.into_iter().map(normalize_match).collect();
    let identifier = raw
        .identifier
        .unwrap_or_else(|| detection_identifier(&raw.license_expression, &matches));
    LicenseDetection {
        license_expression: raw.license_expression,
        license_expression_spdx: raw.license_expression_spdx,
        identifier,
        matches,
    }
}

fn normalize_match(raw: RawMatch) -> LicenseClue {
    LicenseMatch {
        score: raw.score,
        start_line: raw.start_line,
        end_line: raw.end_line,
        matched_length: raw.matched_length,
        match_coverage: raw.match_coverage,
        matcher: raw.matcher,
        license_expression: raw.license_expression,
        spdx_license_expression: raw.spdx_license_expression,
        rule_identifier: raw.rule_identifier,
        rule_relevance: raw.rule_relevance,
        rule_url: raw.rule_url,
        from_file: raw.from_file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_oracle_output_yields_all_absent_fields() {
        let outcome = parse_output(br#"{"files": []}"#).unwrap();
        assert_eq!(outcome, ScanOutcome::default());
        assert!(outcome.licenses.is_empty());
        assert_eq!(outcome.licenses.percentage_of_license_text, 0.0);
    }

    #[test]
    fn file_without_detections_yields_empty_licenses() {
        let outcome = parse_output(
            br#"{"files": [{"path": "x.py", "license_detections": [], "license_clues": []}]}"#,
        )
        .unwrap();
        assert!(outcome.licenses.is_empty());
        assert_eq!(outcome.licenses.detected_license_expression, None);
    }

    #[test]
    fn detections_and_matches_are_translated() {
        let raw = br#"{
          "files": [{
            "detected_license_expression": "python",
            "detected_license_expression_spdx": "Python-2.0",
            "percentage_of_license_text": 2.01,
            "license_detections": [{
              "license_expression": "python",
              "license_expression_spdx": "Python-2.0",
              "identifier": "python-03cf89ce-88f1-7600-71f7-302015c97123",
              "matches": [{
                "score": 99.0,
                "start_line": 12,
                "end_line": 12,
                "matched_length": 8,
                "match_coverage": 100.0,
                "matcher": "2-aho",
                "license_expression": "python",
                "spdx_license_expression": "Python-2.0",
                "rule_identifier": "pypi_python_software_foundation_license2.RULE",
                "rule_relevance": 99,
                "rule_url": null
              }]
            }],
            "license_clues": [],
            "copyrights": [{"copyright": "Copyright (c) 2001 Python Software Foundation"}],
            "emails": [{"email": "a@example.org"}],
            "urls": [{"url": "https://example.org"}]
          }]
        }"#;

        let outcome = parse_output(raw).unwrap();
        let licenses = &outcome.licenses;
        assert_eq!(
            licenses.detected_license_expression_spdx.as_deref(),
            Some("Python-2.0")
        );
        assert_eq!(licenses.license_detections.len(), 1);
        let detection = &licenses.license_detections[0];
        assert_eq!(
            detection.identifier,
            "python-03cf89ce-88f1-7600-71f7-302015c97123"
        );
        assert_eq!(detection.matches[0].matcher, Matcher::Aho);
        assert_eq!(detection.matches[0].rule_relevance, 99);
        assert_eq!(licenses.scores_of_detected_spdx(), vec![99.0]);
        assert_eq!(
            outcome.copyrights,
            vec!["Copyright (c) 2001 Python Software Foundation"]
        );
        assert_eq!(outcome.emails, vec!["a@example.org"]);
        assert_eq!(outcome.urls, vec!["https://example.org"]);
    }

    #[test]
    fn missing_identifier_is_computed_deterministically() {
        let raw = br#"{
          "files": [{
            "detected_license_expression": "apache-2.0",
            "detected_license_expression_spdx": "Apache-2.0",
            "license_detections": [{
              "license_expression": "apache-2.0",
              "license_expression_spdx": "Apache-2.0",
              "matches": [{
                "score": 100.0,
                "start_line": 2,
                "end_line": 2,
                "matched_length": 6,
                "match_coverage": 100.0,
                "matcher": "1-spdx-id",
                "license_expression": "apache-2.0",
                "spdx_license_expression": "Apache-2.0",
                "rule_identifier": "spdx-license-identifier-apache_2_0",
                "rule_relevance": 100
              }]
            }]
          }]
        }"#;

        let a = parse_output(raw).unwrap();
        let b = parse_output(raw).unwrap();
        let id_a = &a.licenses.license_detections[0].identifier;
        let id_b = &b.licenses.license_detections[0].identifier;
        assert_eq!(id_a, id_b);
        assert!(id_a.starts_with("apache_2_0-"));
    }

    #[test]
    fn invalid_json_is_a_scan_error() {
        assert!(matches!(
            parse_output(b"not json"),
            Err(ScanError::Output(_))
        ));
    }

    #[test]
    fn nothing_requested_skips_the_oracle() {
        let scanner = ScancodeScanner::new("/definitely/not/a/binary");
        let selection = Selection {
            licenses: false,
            copyrights: false,
            emails: false,
            urls: false,
            file_info: true,
        };
        let outcome = scanner.scan(Path::new("/dev/null"), &selection).unwrap();
        assert_eq!(outcome, ScanOutcome::default());
    }

    #[test]
    fn missing_oracle_binary_is_a_launch_error() {
        let scanner = ScancodeScanner::new("/definitely/not/a/binary");
        let err = scanner
            .scan(Path::new("/dev/null"), &Selection::default())
            .unwrap_err();
        assert!(matches!(err, ScanError::Launch { .. }));
    }
}
