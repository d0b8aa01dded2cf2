use std::collections::BTreeSet;

use crate::models::DocumentInfo;

/// Documents whose filename or any tag contains `query` (case-insensitive),
/// restricted to those carrying `tag` exactly when one is selected.
/// Input order is preserved.
pub fn filter_documents<'a>(
    docs: &'a [DocumentInfo],
    query: &str,
    tag: Option<&str>,
) -> Vec<&'a DocumentInfo> {
    let needle = query.trim().to_lowercase();

    docs.iter()
        .filter(|doc| matches_query(doc, &needle))
        .filter(|doc| tag.map_or(true, |tag| doc.has_tag(tag)))
        .collect()
}

fn matches_query(doc: &DocumentInfo, needle: &str) -> bool {
    needle.is_empty()
        || doc.filename.to_lowercase().contains(needle)
        || doc.tags.iter().any(|t| t.to_lowercase().contains(needle))
}

/// Every tag in use, sorted and without duplicates.
pub fn all_tags(docs: &[DocumentInfo]) -> Vec<String> {
    docs.iter()
        .flat_map(|doc| doc.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::fake::doc;
    use pretty_assertions::assert_eq;

    fn ids(docs: Vec<&DocumentInfo>) -> Vec<&str> {
        docs.into_iter().map(|d| d.doc_id.as_str()).collect()
    }

    fn sample() -> Vec<DocumentInfo> {
        vec![
            doc("1", "report.pdf", &["q3"]),
            doc("2", "notes.md", &["draft"]),
        ]
    }

    #[test]
    fn test_query_matches_filename() {
        let docs = sample();
        assert_eq!(ids(filter_documents(&docs, "report", None)), vec!["1"]);
    }

    #[test]
    fn test_tag_selects_exact_members() {
        let docs = sample();
        assert_eq!(ids(filter_documents(&docs, "", Some("draft"))), vec!["2"]);
        assert!(filter_documents(&docs, "", Some("dra")).is_empty());
    }

    #[test]
    fn test_query_is_case_insensitive_and_checks_tags() {
        let docs = vec![
            doc("1", "Quarterly REPORT.pdf", &[]),
            doc("2", "misc.txt", &["Reporting"]),
            doc("3", "other.txt", &["x"]),
        ];
        assert_eq!(ids(filter_documents(&docs, "  report ", None)), vec!["1", "2"]);
    }

    #[test]
    fn test_blank_query_keeps_everything_in_order() {
        let docs = sample();
        assert_eq!(ids(filter_documents(&docs, "   ", None)), vec!["1", "2"]);
    }

    #[test]
    fn test_query_and_tag_commute() {
        let docs = vec![
            doc("1", "x-report.pdf", &["a"]),
            doc("2", "x-notes.md", &["b"]),
            doc("3", "summary.md", &["a", "x"]),
            doc("4", "plan.md", &["a"]),
        ];

        let query_then_tag: Vec<DocumentInfo> = filter_documents(&docs, "x", None)
            .into_iter()
            .cloned()
            .collect();
        let tag_then_query: Vec<DocumentInfo> = filter_documents(&docs, "", Some("a"))
            .into_iter()
            .cloned()
            .collect();

        let left = ids(filter_documents(&query_then_tag, "", Some("a")));
        let right = ids(filter_documents(&tag_then_query, "x", None));
        assert_eq!(left, right);
        assert_eq!(left, ids(filter_documents(&docs, "x", Some("a"))));
        assert_eq!(left, vec!["1", "3"]);
    }

    #[test]
    fn test_all_tags_sorted_and_unique() {
        let docs = vec![
            doc("1", "a", &["beta", "alpha"]),
            doc("2", "b", &["alpha", "gamma"]),
        ];
        assert_eq!(all_tags(&docs), vec!["alpha", "beta", "gamma"]);
    }
}
