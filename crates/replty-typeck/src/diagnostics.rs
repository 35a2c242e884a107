//! Ariadne-based rendering for analysis errors.
//!
//! Analysis errors never reach the completion caller's control flow; this
//! renders the recorded last error for people inspecting a failed request.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use crate::error::AnalysisError;

// ── Error Codes ────────────────────────────────────────────────────────

fn error_code(err: &AnalysisError) -> &'static str {
    match err {
        AnalysisError::DepthLimit { .. } => "A0001",
        AnalysisError::OffsetOutOfRange { .. } => "A0002",
        AnalysisError::Signature(_) => "A0003",
    }
}

// ── Span Helpers ───────────────────────────────────────────────────────

/// Convert a rowan TextRange to a Rust Range<usize> for ariadne.
fn text_range_to_range(range: rowan::TextRange) -> Range<usize> {
    let start: usize = range.start().into();
    let end: usize = range.end().into();
    start..end
}

// ── Rendering ──────────────────────────────────────────────────────────

/// Render `error` against the analyzed source as a colorless report.
pub fn render_error(error: &AnalysisError, source: &str) -> String {
    if source.is_empty() {
        return format!("[{}] Error: {}", error_code(error), error);
    }
    let config = Config::default().with_color(false);
    let source_len = source.len();

    // ariadne wants a non-empty span inside the source.
    let clamp = |r: Range<usize>| -> Range<usize> {
        let s = r.start.min(source_len);
        let e = r.end.min(source_len).max(s);
        if s == e {
            s.saturating_sub(usize::from(s == source_len && s > 0))..e.saturating_add(1).min(source_len)
        } else {
            s..e
        }
    };

    let span = clamp(error.span().map_or(0..0, text_range_to_range));
    let label = match error {
        AnalysisError::DepthLimit { .. } => "evaluation gave up here",
        AnalysisError::OffsetOutOfRange { .. } => "source ends here",
        AnalysisError::Signature(_) => "while analyzing this",
    };

    let report = Report::build(ReportKind::Error, span.clone())
        .with_code(error_code(error))
        .with_message(error.to_string())
        .with_config(config)
        .with_label(Label::new(span).with_message(label).with_color(Color::Red))
        .finish();

    let mut buf = Vec::new();
    if report.write(Source::from(source), &mut buf).is_err() {
        return format!("[{}] Error: {}", error_code(error), error);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
