//! Per-response streaming state

use std::fmt;

use tutor_billing::ChargeState;
use tutor_core::Balance;

use crate::chunk::ChunkAccumulator;
use crate::citation::CitationCollector;

/// Stage of the relay state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Starting,
    Streaming,
    Flushing,
    Completing,
    Done,
    Aborted,
}

impl RelayState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Flushing => "flushing",
            Self::Completing => "completing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state of one in-flight response, discarded when the relay returns
#[derive(Debug)]
pub struct StreamSession {
    state: RelayState,
    upstream_text: String,
    delivered_text: String,
    chunks_delivered: usize,
    aborted: bool,
    first_chunk_sent: bool,
    accumulator: ChunkAccumulator,
    collector: CitationCollector,
    charge: ChargeState,
}

impl StreamSession {
    pub fn new(accumulator: ChunkAccumulator, collector: CitationCollector, charge: ChargeState) -> Self {
        Self {
            state: RelayState::Starting,
            upstream_text: String::new(),
            delivered_text: String::new(),
            chunks_delivered: 0,
            aborted: false,
            first_chunk_sent: false,
            accumulator,
            collector,
            charge,
        }
    }

    pub const fn state(&self) -> RelayState {
        self.state
    }

    pub fn transition(&mut self, next: RelayState) {
        tracing::debug!(from = %self.state, to = %next, "relay state transition");
        self.state = next;
    }

    /// Append upstream text and stage it for chunking
    pub fn push_text(&mut self, delta: &str) {
        self.upstream_text.push_str(delta);
        self.accumulator.push(delta);
    }

    pub fn next_chunk(&mut self) -> Option<String> {
        self.accumulator.next_chunk()
    }

    pub fn take_remainder(&mut self) -> Option<String> {
        self.accumulator.take_remainder()
    }

    pub const fn accumulator(&self) -> &ChunkAccumulator {
        &self.accumulator
    }

    /// Count a chunk the sink acknowledged
    pub fn record_delivered(&mut self, chunk: &str) {
        self.delivered_text.push_str(chunk);
        self.chunks_delivered += 1;
        self.first_chunk_sent = true;
    }

    /// Stop streaming; text still buffered is never sent
    pub fn abort(&mut self) {
        if !self.aborted {
            tracing::debug!(state = %self.state, chunks_delivered = self.chunks_delivered, "relay aborted");
        }
        self.aborted = true;
    }

    pub const fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub const fn first_chunk_sent(&self) -> bool {
        self.first_chunk_sent
    }

    pub fn upstream_text(&self) -> &str {
        &self.upstream_text
    }

    pub fn delivered_text(&self) -> &str {
        &self.delivered_text
    }

    pub const fn chunks_delivered(&self) -> usize {
        self.chunks_delivered
    }

    pub const fn collector(&self) -> &CitationCollector {
        &self.collector
    }

    pub const fn collector_mut(&mut self) -> &mut CitationCollector {
        &mut self.collector
    }

    pub const fn charge(&self) -> &ChargeState {
        &self.charge
    }

    pub const fn charge_mut(&mut self) -> &mut ChargeState {
        &mut self.charge
    }

    /// Balance after this response's deduction, once it has happened
    pub fn balance_after(&self) -> Option<Balance> {
        self.charge.balance_after()
    }
}
