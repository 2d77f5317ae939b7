//! Citation collection during a live stream, and post-hoc usage filtering

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tutor_core::{Source, SourceKind};

/// Raw citation reference as emitted by an upstream provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CitationCandidate {
    /// Bare URL
    Url(String),
    /// Structured reference; only `url` is required to be meaningful
    Detailed {
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        date: Option<String>,
    },
}

impl CitationCandidate {
    fn url(&self) -> &str {
        match self {
            Self::Url(url) | Self::Detailed { url, .. } => url.trim(),
        }
    }
}

/// Normalized citation, emitted to clients as it is discovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
    pub date: Option<String>,
}

/// Deduplicates live citations by URL, first occurrence wins
#[derive(Debug, Clone)]
pub struct CitationCollector {
    title_max_chars: usize,
    seen: HashSet<String>,
    citations: Vec<Citation>,
}

impl CitationCollector {
    pub fn new(title_max_chars: usize) -> Self {
        Self {
            title_max_chars,
            seen: HashSet::new(),
            citations: Vec::new(),
        }
    }

    /// Normalize and record a candidate
    ///
    /// Returns the citation if it is new; duplicates and blank URLs yield `None`.
    pub fn accept(&mut self, candidate: CitationCandidate) -> Option<Citation> {
        let url = candidate.url();
        if url.is_empty() || self.seen.contains(url) {
            return None;
        }
        let url = url.to_owned();

        let (title, date) = match candidate {
            CitationCandidate::Url(_) => (None, None),
            CitationCandidate::Detailed { title, date, .. } => (title, date),
        };
        let title = title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| url.chars().take(self.title_max_chars).collect());

        let citation = Citation {
            url: url.clone(),
            title,
            date: date.filter(|d| !d.trim().is_empty()),
        };

        self.seen.insert(url);
        self.citations.push(citation.clone());
        Some(citation)
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn len(&self) -> usize {
        self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    /// Rows to persist: the first `cap` citations with decreasing relevance
    pub fn finish(&self, cap: usize) -> Vec<Source> {
        let cap = cap.max(1);
        let denominator = f64::from(u32::try_from(cap).unwrap_or(u32::MAX));

        self.citations
            .iter()
            .take(cap)
            .enumerate()
            .map(|(i, citation)| Source {
                kind: SourceKind::WebSearch,
                title: citation.title.clone(),
                body: String::new(),
                url: citation.url.clone(),
                relevance_score: 1.0 - f64::from(u32::try_from(i).unwrap_or(u32::MAX)) / denominator,
            })
            .collect()
    }
}

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// Keep only the candidates referenced by `[n]` markers in `text`
///
/// Markers are 1-based indexes into `candidates`. The result follows the
/// order of first reference; out-of-range markers are ignored. Text without
/// markers yields an empty list.
pub fn filter_used_sources(text: &str, candidates: &[Source]) -> Vec<Source> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();

    MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .filter(|n| seen.insert(*n))
        .filter_map(|n| n.checked_sub(1).and_then(|idx| candidates.get(idx)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str) -> Source {
        Source {
            kind: SourceKind::RetrievedDocument,
            title: title.to_owned(),
            body: format!("{title} body"),
            url: format!("https://course.example/{title}"),
            relevance_score: 0.9,
        }
    }

    fn url(u: &str) -> CitationCandidate {
        CitationCandidate::Url(u.to_owned())
    }

    #[test]
    fn deserializes_both_candidate_shapes() {
        let candidates: Vec<CitationCandidate> = serde_json::from_value(serde_json::json!([
            "https://a.example",
            { "url": "https://b.example", "title": "B", "date": "2024-01-01" }
        ]))
        .unwrap();

        assert_eq!(candidates[0], url("https://a.example"));
        assert_eq!(
            candidates[1],
            CitationCandidate::Detailed {
                url: "https://b.example".to_owned(),
                title: Some("B".to_owned()),
                date: Some("2024-01-01".to_owned()),
            }
        );
    }

    #[test]
    fn duplicates_are_dropped_first_wins() {
        let mut collector = CitationCollector::new(100);
        let inputs = [
            url("https://a.example"),
            CitationCandidate::Detailed {
                url: "https://a.example".to_owned(),
                title: Some("Later title".to_owned()),
                date: None,
            },
            url("https://b.example"),
            url(" https://b.example "),
            url("https://c.example"),
        ];

        let accepted: Vec<_> = inputs.into_iter().filter_map(|c| collector.accept(c)).collect();

        assert_eq!(accepted.len(), 3);
        assert_eq!(collector.len(), 3);
        assert_eq!(accepted[0].title, "https://a.example");
    }

    #[test]
    fn blank_urls_are_discarded() {
        let mut collector = CitationCollector::new(100);
        assert!(collector.accept(url("   ")).is_none());
        assert!(
            collector
                .accept(CitationCandidate::Detailed {
                    url: String::new(),
                    title: Some("orphan".to_owned()),
                    date: None,
                })
                .is_none()
        );
        assert!(collector.is_empty());
    }

    #[test]
    fn default_title_is_capped_url_prefix() {
        let mut collector = CitationCollector::new(10);
        let citation = collector.accept(url("https://example.com/a/long/path")).unwrap();
        assert_eq!(citation.title, "https://ex");
    }

    #[test]
    fn finish_caps_and_scores_in_insertion_order() {
        let mut collector = CitationCollector::new(100);
        for i in 0..12 {
            collector.accept(url(&format!("https://s{i}.example")));
        }

        let sources = collector.finish(10);

        assert_eq!(sources.len(), 10);
        assert_eq!(sources[0].url, "https://s0.example");
        assert!((sources[0].relevance_score - 1.0).abs() < f64::EPSILON);
        assert!((sources[9].relevance_score - 0.1).abs() < 1e-9);
        assert!(sources.windows(2).all(|w| w[0].relevance_score > w[1].relevance_score));
        assert!(sources.iter().all(|s| s.kind == SourceKind::WebSearch));
    }

    #[test]
    fn k_distinct_of_n_candidates() {
        let mut collector = CitationCollector::new(100);
        let urls = ["a", "b", "a", "c", "b", "a", "d"];

        let emitted = urls
            .iter()
            .filter_map(|u| collector.accept(url(&format!("https://{u}.example"))))
            .count();

        assert_eq!(emitted, 4);
        assert_eq!(collector.finish(3).len(), 3);
        assert_eq!(collector.finish(10).len(), 4);
    }

    #[test]
    fn usage_filter_keeps_only_referenced() {
        let candidates = [source("A"), source("B"), source("C")];
        let text = "Cells divide [2]. As noted before [2], this matters.";

        let used = filter_used_sources(text, &candidates);

        assert_eq!(used, vec![source("B")]);
    }

    #[test]
    fn usage_filter_orders_by_first_reference() {
        let candidates = [source("A"), source("B"), source("C")];
        let used = filter_used_sources("See [3], then [1] and [3] again.", &candidates);
        assert_eq!(used, vec![source("C"), source("A")]);
    }

    #[test]
    fn usage_filter_drops_out_of_range() {
        let candidates = [source("A")];
        assert!(filter_used_sources("Wrong [0] and [7].", &candidates).is_empty());
    }

    #[test]
    fn usage_filter_without_markers_is_empty() {
        let candidates = [source("A"), source("B")];
        assert!(filter_used_sources("No references here.", &candidates).is_empty());
        assert!(filter_used_sources("[1]", &[]).is_empty());
    }
}
