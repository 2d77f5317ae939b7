use std::time::Duration;

use serde::Deserialize;

/// Chunking, pacing, and citation settings for streamed responses
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Characters per outbound chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Delay per delivered character (e.g. "1ms"), giving a typing cadence
    #[serde(default = "default_pacing")]
    pub pacing: String,
    /// Maximum number of live-collected citations persisted per response
    #[serde(default = "default_citation_cap")]
    pub citation_cap: usize,
    /// Maximum length of a title synthesized from a citation URL
    #[serde(default = "default_citation_title_max_chars")]
    pub citation_title_max_chars: usize,
    /// Length of the conversation last-activity preview
    #[serde(default = "default_preview_max_chars")]
    pub preview_max_chars: usize,
    /// Capacity of the outbound event channel per response
    #[serde(default = "default_sink_buffer")]
    pub sink_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            pacing: default_pacing(),
            citation_cap: default_citation_cap(),
            citation_title_max_chars: default_citation_title_max_chars(),
            preview_max_chars: default_preview_max_chars(),
            sink_buffer: default_sink_buffer(),
        }
    }
}

impl RelayConfig {
    /// Parse the per-character pacing delay
    ///
    /// # Errors
    ///
    /// Returns an error if the pacing string is not a valid duration
    pub fn pacing_per_char(&self) -> Result<Duration, String> {
        duration_str::parse(&self.pacing).map_err(|e| format!("invalid relay pacing '{}': {e}", self.pacing))
    }

    /// Validate relay settings
    ///
    /// # Errors
    ///
    /// Returns an error if a size is zero or the pacing string is invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("relay.chunk_size must be greater than 0".to_owned());
        }
        if self.citation_cap == 0 {
            return Err("relay.citation_cap must be greater than 0".to_owned());
        }
        if self.sink_buffer == 0 {
            return Err("relay.sink_buffer must be greater than 0".to_owned());
        }
        self.pacing_per_char()?;
        Ok(())
    }
}

const fn default_chunk_size() -> usize {
    20
}

fn default_pacing() -> String {
    "1ms".to_owned()
}

const fn default_citation_cap() -> usize {
    10
}

const fn default_citation_title_max_chars() -> usize {
    100
}

const fn default_preview_max_chars() -> usize {
    100
}

const fn default_sink_buffer() -> usize {
    32
}
