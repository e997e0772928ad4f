use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::types::FileResults;

/// Marker used in the frequency table for files without any detection.
pub const NO_DETECTION: &str = "None";

const EXPRESSION_WIDTH: usize = 70;

/// Render the per-file table and the license frequency summary.
///
/// One row per file whose licenses were requested, in input order: the path
/// right-aligned to the longest path, the detected SPDX expression
/// right-aligned to a fixed column, and the backing match scores in brackets
/// when a single dominant detection exists. The summary counts files per
/// distinct expression, ascending by count and then by expression text.
pub fn render_report(results: &[FileResults], width: usize) -> String {
    let rows: Vec<_> = results
        .iter()
        .filter_map(|r| r.licenses.as_found().map(|l| (r.short_path.as_str(), l)))
        .collect();

    let path_width = rows
        .iter()
        .map(|(path, _)| path.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for (path, licenses) in &rows {
        let expression = licenses.detected_license_expression_spdx.as_deref();
        let expression_field = match expression {
            Some(e) => format!("{:>width$}", e, width = EXPRESSION_WIDTH),
            None => " ".repeat(EXPRESSION_WIDTH),
        };
        let scores = licenses.scores_of_detected_spdx();
        let scores_field = if scores.is_empty() {
            String::new()
        } else {
            format!("{scores:?}")
        };
        let _ = writeln!(out, "{path:>path_width$} {expression_field} {scores_field}");

        *counts
            .entry(expression.unwrap_or(NO_DETECTION).to_string())
            .or_default() += 1;
    }

    out.push('\n');
    out.push_str(&"=".repeat(width));
    out.push_str("\n\n");

    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let count_width = entries
        .iter()
        .map(|(_, count)| count.to_string().len())
        .max()
        .unwrap_or(0)
        + 1;
    for (expression, count) in &entries {
        let _ = writeln!(
            out,
            "{:>width$} {count:>count_width$}",
            expression,
            width = EXPRESSION_WIDTH
        );
    }

    out
}
