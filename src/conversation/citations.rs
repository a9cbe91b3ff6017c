use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::service::types::{Annotation, TextContent};

/// `【<page>:<paragraph>†<filename>】`
static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"【(\d+):(\d+)†(.+?)】").expect("marker pattern is valid"));

/// Page/paragraph value when the marker could not be parsed.
pub const UNKNOWN: &str = "unknown";

const UNKNOWN_FILE: &str = "Unknown file";

/// How a citation marker is swapped for its footnote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacementMode {
    /// Replace the first remaining occurrence of the marker text. Repeated
    /// identical markers are matched left to right, not by position.
    #[default]
    FirstMatch,
    /// Replace at the annotation's own character span when it holds exactly
    /// the marker text; otherwise fall back to `FirstMatch`.
    Offset,
}

/// A file citation pulled out of one response message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// 1-based position of the annotation in its message.
    pub ordinal: usize,
    pub filename: String,
    pub page: String,
    pub paragraph: String,
    /// The raw marker, kept for auditing.
    pub citation_text: String,
}

impl Citation {
    pub fn is_located(&self) -> bool {
        self.page != UNKNOWN || self.paragraph != UNKNOWN
    }

    /// `[n] filename (Page p, Paragraph q)`; the location is omitted when unknown.
    pub fn display(&self) -> String {
        if self.is_located() {
            format!(
                "[{}] {} (Page {}, Paragraph {})",
                self.ordinal, self.filename, self.page, self.paragraph
            )
        } else {
            format!("[{}] {}", self.ordinal, self.filename)
        }
    }
}

/// Rewritten response text plus the citations found in it.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourcesSummary {
    pub total_citations: usize,
    pub sources: Vec<Citation>,
    pub unique_files: Vec<String>,
}

impl SourcesSummary {
    pub fn from_citations(citations: &[Citation]) -> Self {
        let unique: BTreeSet<&str> = citations.iter().map(|c| c.filename.as_str()).collect();
        Self {
            total_citations: citations.len(),
            sources: citations.to_vec(),
            unique_files: unique.into_iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Turn the file-citation annotations of one message into `[n]` footnotes.
///
/// Numbering is the annotation's position in the message, so skipped
/// non-file annotations leave gaps rather than renumbering the rest.
pub fn extract(content: &TextContent, mode: ReplacementMode) -> Extraction {
    let mut citations = Vec::new();
    let mut spans: Vec<(usize, usize, String)> = Vec::new();
    let mut by_text: Vec<(&str, String)> = Vec::new();

    for (index, annotation) in content.annotations.iter().enumerate() {
        if !annotation.is_file_citation() {
            continue;
        }
        let footnote = format!("[{}]", index + 1);

        let span = match mode {
            ReplacementMode::Offset => marker_span(&content.value, annotation),
            ReplacementMode::FirstMatch => None,
        };
        match span {
            Some((start, end)) if !overlaps(&spans, start, end) => spans.push((start, end, footnote)),
            _ => by_text.push((annotation.text.as_str(), footnote)),
        }

        citations.push(parse_citation(index + 1, annotation));
    }

    // Right to left, so earlier byte offsets stay valid.
    let mut text = content.value.clone();
    spans.sort_by(|a, b| b.0.cmp(&a.0));
    for (start, end, footnote) in &spans {
        text.replace_range(*start..*end, footnote);
    }
    for (marker, footnote) in &by_text {
        if !marker.is_empty() {
            text = text.replacen(*marker, footnote, 1);
        }
    }

    Extraction { text, citations }
}

fn parse_citation(ordinal: usize, annotation: &Annotation) -> Citation {
    let (filename, page, paragraph) = match MARKER.captures(&annotation.text) {
        Some(caps) => (caps[3].to_string(), caps[1].to_string(), caps[2].to_string()),
        None => {
            let quote = annotation
                .file_citation
                .as_ref()
                .and_then(|fc| fc.quote.clone())
                .unwrap_or_else(|| UNKNOWN_FILE.to_string());
            (quote, UNKNOWN.to_string(), UNKNOWN.to_string())
        }
    };

    Citation {
        ordinal,
        filename: clean_filename(&filename),
        page,
        paragraph,
        citation_text: annotation.text.clone(),
    }
}

/// Strip any marker decoration left around a filename.
fn clean_filename(raw: &str) -> String {
    MARKER.replace_all(raw, "$3").trim().to_string()
}

/// Byte span of the annotation's character offsets, if it holds exactly the marker.
fn marker_span(text: &str, annotation: &Annotation) -> Option<(usize, usize)> {
    let start = char_to_byte(text, annotation.start_index?)?;
    let end = char_to_byte(text, annotation.end_index?)?;
    (start < end && text.get(start..end) == Some(annotation.text.as_str())).then_some((start, end))
}

fn char_to_byte(text: &str, char_index: usize) -> Option<usize> {
    text.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .nth(char_index)
}

fn overlaps(spans: &[(usize, usize, String)], start: usize, end: usize) -> bool {
    spans.iter().any(|(s, e, _)| start < *e && *s < end)
}
