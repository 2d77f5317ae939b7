//! Fixed-size chunking and typing-cadence pacing

use std::time::Duration;

use crate::cancel::CancellationToken;

/// Buffers upstream text and releases it in fixed-size chunks
///
/// Sizes are counted in Unicode scalar values, so a chunk never splits a
/// code point.
#[derive(Debug, Clone)]
pub struct ChunkAccumulator {
    buffer: String,
    buffered_chars: usize,
    chunk_size: usize,
    per_char: Duration,
}

impl ChunkAccumulator {
    /// `chunk_size` must be non-zero; configuration validation enforces it
    pub fn new(chunk_size: usize, per_char: Duration) -> Self {
        Self {
            buffer: String::new(),
            buffered_chars: 0,
            chunk_size: chunk_size.max(1),
            per_char,
        }
    }

    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters buffered but not yet released
    pub const fn buffered(&self) -> usize {
        self.buffered_chars
    }

    pub fn push(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.buffer.push_str(fragment);
        self.buffered_chars += fragment.chars().count();
    }

    /// Pop one full chunk, if enough text is buffered
    pub fn next_chunk(&mut self) -> Option<String> {
        if self.buffered_chars < self.chunk_size {
            return None;
        }

        let split = self
            .buffer
            .char_indices()
            .nth(self.chunk_size)
            .map_or(self.buffer.len(), |(idx, _)| idx);
        let rest = self.buffer.split_off(split);
        self.buffered_chars -= self.chunk_size;

        Some(std::mem::replace(&mut self.buffer, rest))
    }

    /// Take whatever is left as a final, possibly short, chunk
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        self.buffered_chars = 0;
        Some(std::mem::take(&mut self.buffer))
    }

    /// Delay owed after delivering `chunk`
    pub fn pacing_for(&self, chunk: &str) -> Duration {
        let chars = u32::try_from(chunk.chars().count()).unwrap_or(u32::MAX);
        self.per_char.saturating_mul(chars)
    }

    /// Sleep the pacing delay for `chunk`
    ///
    /// Returns `false` without sleeping if the stream is already cancelled.
    /// An explicit abort cuts the sleep short.
    pub async fn pace(&self, chunk: &str, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let delay = self.pacing_for(chunk);
        if delay.is_zero() {
            return true;
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = cancel.aborted() => false,
        }
    }
}
