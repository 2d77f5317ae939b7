//! Upstream adapters: provider-native frames to text deltas and citations

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::citation::CitationCandidate;

/// What one upstream frame contributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub text_delta: Option<String>,
    pub citations: Vec<CitationCandidate>,
}

/// Provider-specific decoding; the relay state machine is shared
pub trait UpstreamAdapter: Send + Sync {
    /// Adapter name used in logs
    fn name(&self) -> &'static str;

    /// Decode one frame of the upstream sequence
    fn decode(&self, frame: &str) -> Decoded;

    /// Strip provider markup that is not meant for users from the full text
    fn finalize_text(&self, text: &str) -> String {
        text.to_owned()
    }
}

/// Frames are raw text tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenStreamAdapter;

impl UpstreamAdapter for TokenStreamAdapter {
    fn name(&self) -> &'static str {
        "token_stream"
    }

    fn decode(&self, frame: &str) -> Decoded {
        Decoded {
            text_delta: (!frame.is_empty()).then(|| frame.to_owned()),
            citations: Vec::new(),
        }
    }
}

/// Frames are chat-completion delta JSON objects
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaJsonAdapter;

// -- Wire types --

#[derive(Debug, Deserialize)]
struct DeltaFrame {
    #[serde(default, deserialize_with = "null_as_empty")]
    choices: Vec<DeltaChoice>,
    #[serde(default, deserialize_with = "null_as_empty")]
    citations: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    search_results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DeltaChoice {
    #[serde(default)]
    delta: Option<DeltaBody>,
}

#[derive(Debug, Default, Deserialize)]
struct DeltaBody {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    citations: Vec<serde_json::Value>,
}

/// Providers send `null` for list fields they have nothing for
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

static THINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// Keep only values shaped like a citation candidate
fn candidates(values: Vec<serde_json::Value>) -> impl Iterator<Item = CitationCandidate> {
    values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
}

impl UpstreamAdapter for DeltaJsonAdapter {
    fn name(&self) -> &'static str {
        "delta_json"
    }

    fn decode(&self, frame: &str) -> Decoded {
        let data = frame.trim();
        if data.is_empty() || data == "[DONE]" {
            return Decoded::default();
        }

        let parsed: DeltaFrame = match serde_json::from_str(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, data = %data, "skipping unparseable delta frame");
                return Decoded::default();
            }
        };

        let mut text = String::new();
        let mut citations: Vec<CitationCandidate> = candidates(parsed.citations).collect();
        citations.extend(candidates(parsed.search_results));

        for body in parsed.choices.into_iter().filter_map(|c| c.delta) {
            if let Some(content) = body.content {
                text.push_str(&content);
            }
            citations.extend(candidates(body.citations));
        }

        Decoded {
            text_delta: (!text.is_empty()).then_some(text),
            citations,
        }
    }

    fn finalize_text(&self, text: &str) -> String {
        THINK_RE.replace_all(text, "").trim().to_owned()
    }
}
