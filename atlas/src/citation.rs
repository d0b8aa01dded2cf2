//! Inline citation markers.
//!
//! Assistant answers cite supporting chunks as `[filename#chunk_index]`.
//! The filename may hold any character except `]`; the chunk index is the
//! literal digit run before the closing bracket.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::models::SourceCitation;

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([^\]]+)#(\d+)\]").expect("citation pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Citation {
        filename: String,
        /// Kept exactly as written, leading zeros included.
        chunk_index: String,
    },
}

impl Segment {
    pub fn is_citation(&self) -> bool {
        matches!(self, Self::Citation { .. })
    }
}

/// Split `text` into plain runs and citation markers, left to right.
///
/// Text without markers comes back as a single `Text` segment (or nothing,
/// for empty input). Plain runs are never empty.
pub fn parse_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for captures in citation_pattern().captures_iter(text) {
        let (Some(whole), Some(filename), Some(chunk_index)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        if whole.start() > cursor {
            segments.push(Segment::Text(text[cursor..whole.start()].to_string()));
        }
        segments.push(Segment::Citation {
            filename: filename.as_str().to_string(),
            chunk_index: chunk_index.as_str().to_string(),
        });
        cursor = whole.end();
    }

    if cursor < text.len() {
        segments.push(Segment::Text(text[cursor..].to_string()));
    }

    segments
}

/// A marker paired with the source it names, when the response carried one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCitation<'a> {
    /// 1-based display number; repeated markers for the same chunk share it.
    pub number: usize,
    pub filename: String,
    pub chunk_index: String,
    pub source: Option<&'a SourceCitation>,
}

/// Pair each distinct marker with the matching entry in `sources`.
///
/// Markers with no matching source are kept with `source: None`; the
/// backend's word is trusted, this only decides what can be shown.
pub fn reconcile<'a>(
    segments: &[Segment],
    sources: &'a [SourceCitation],
) -> Vec<ResolvedCitation<'a>> {
    let mut resolved: Vec<ResolvedCitation<'a>> = Vec::new();

    for segment in segments {
        let Segment::Citation {
            filename,
            chunk_index,
        } = segment
        else {
            continue;
        };

        if resolved
            .iter()
            .any(|r| &r.filename == filename && &r.chunk_index == chunk_index)
        {
            continue;
        }

        let source = sources
            .iter()
            .find(|s| s.matches_marker(filename, chunk_index));
        if source.is_none() {
            debug!(%filename, %chunk_index, "Citation marker has no matching source");
        }

        resolved.push(ResolvedCitation {
            number: resolved.len() + 1,
            filename: filename.clone(),
            chunk_index: chunk_index.clone(),
            source,
        });
    }

    resolved
}

/// Terminal rendering of an answer: markers become `[n]`, footnotes carry
/// what a tooltip would.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAnswer {
    pub body: String,
    pub footnotes: Vec<String>,
}

pub fn render_plain(text: &str, sources: &[SourceCitation]) -> RenderedAnswer {
    let segments = parse_segments(text);
    let resolved = reconcile(&segments, sources);

    let numbers: HashMap<(&str, &str), usize> = resolved
        .iter()
        .map(|r| ((r.filename.as_str(), r.chunk_index.as_str()), r.number))
        .collect();

    let mut body = String::with_capacity(text.len());
    for segment in &segments {
        match segment {
            Segment::Text(plain) => body.push_str(plain),
            Segment::Citation {
                filename,
                chunk_index,
            } => {
                let number = numbers
                    .get(&(filename.as_str(), chunk_index.as_str()))
                    .copied()
                    .unwrap_or_default();
                body.push_str(&format!("[{number}]"));
            }
        }
    }

    let footnotes = resolved
        .iter()
        .map(|r| match r.source {
            Some(source) => format!(
                "[{}] {} #{} (score {:.2})",
                r.number, r.filename, r.chunk_index, source.score
            ),
            None => format!("[{}] {} #{}", r.number, r.filename, r.chunk_index),
        })
        .collect();

    RenderedAnswer { body, footnotes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> Segment {
        Segment::Text(s.to_string())
    }

    fn cite(filename: &str, chunk_index: &str) -> Segment {
        Segment::Citation {
            filename: filename.to_string(),
            chunk_index: chunk_index.to_string(),
        }
    }

    fn source(filename: &str, chunk_index: u32, score: f64) -> SourceCitation {
        SourceCitation {
            doc_id: format!("doc-{filename}"),
            filename: filename.to_string(),
            chunk_index,
            snippet: String::new(),
            score,
            metadata: None,
        }
    }

    #[test]
    fn test_text_without_markers_is_unchanged() {
        assert_eq!(parse_segments("no citations here"), vec![text("no citations here")]);
        assert_eq!(parse_segments("brackets [but] no #hash"), vec![text("brackets [but] no #hash")]);
        assert!(parse_segments("").is_empty());
    }

    #[test]
    fn test_single_marker() {
        assert_eq!(
            parse_segments("See [manual.pdf#3] for details."),
            vec![text("See "), cite("manual.pdf", "3"), text(" for details.")]
        );
    }

    #[test]
    fn test_markers_in_order_with_text_preserved() {
        assert_eq!(
            parse_segments("[a.md#1][b.md#22] middle [c d.txt#007]"),
            vec![
                cite("a.md", "1"),
                cite("b.md", "22"),
                text(" middle "),
                cite("c d.txt", "007"),
            ]
        );
    }

    #[test]
    fn test_filename_may_contain_open_bracket_but_not_close() {
        assert_eq!(
            parse_segments("see [v[2 notes.md#5]"),
            vec![text("see "), cite("v[2 notes.md", "5")]
        );
        assert_eq!(
            parse_segments("x [draft].md#4] y"),
            vec![text("x [draft].md#4] y")]
        );
    }

    #[test]
    fn test_last_hash_splits_filename_and_index() {
        assert_eq!(
            parse_segments("[report#final.pdf#12]"),
            vec![cite("report#final.pdf", "12")]
        );
    }

    #[test]
    fn test_non_digit_index_is_not_a_marker() {
        assert_eq!(
            parse_segments("[file.md#x1] and [file.md#]"),
            vec![text("[file.md#x1] and [file.md#]")]
        );
    }

    #[test]
    fn test_reconcile_numbers_and_dedupes() {
        let sources = vec![source("manual.pdf", 3, 0.92)];
        let segments = parse_segments("A [manual.pdf#3] B [other.md#1] C [manual.pdf#3]");
        let resolved = reconcile(&segments, &sources);

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].number, 1);
        assert_eq!(resolved[0].source, Some(&sources[0]));
        assert_eq!(resolved[1].number, 2);
        assert!(resolved[1].source.is_none());
    }

    #[test]
    fn test_render_plain() {
        let sources = vec![source("manual.pdf", 3, 0.92)];
        let rendered = render_plain(
            "See [manual.pdf#3] and [faq.md#0], again [manual.pdf#3].",
            &sources,
        );

        assert_eq!(rendered.body, "See [1] and [2], again [1].");
        assert_eq!(
            rendered.footnotes,
            vec![
                "[1] manual.pdf #3 (score 0.92)".to_string(),
                "[2] faq.md #0".to_string(),
            ]
        );
    }

    #[test]
    fn test_render_plain_without_markers() {
        let rendered = render_plain("plain answer", &[]);
        assert_eq!(rendered.body, "plain answer");
        assert!(rendered.footnotes.is_empty());
    }
}
