//! Minimal server-sent event parsing for test assertions

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

/// One named event with its JSON payload
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub name: String,
    pub data: serde_json::Value,
}

/// Parse complete events from raw response text
pub fn parse_events(text: &str) -> Vec<SseEvent> {
    text.split("\n\n").filter_map(parse_block).collect()
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut name = None;
    let mut data = String::new();

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = Some(value.trim().to_owned());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim_start());
        }
    }

    Some(SseEvent {
        name: name?,
        data: serde_json::from_str(&data).ok()?,
    })
}

/// Incremental reader over a streaming response body
pub struct EventReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: String,
}

impl EventReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            body: response.bytes_stream().boxed(),
            buffer: String::new(),
        }
    }

    /// Next complete event, or `None` once the stream has ended
    pub async fn next(&mut self) -> Option<SseEvent> {
        loop {
            while let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                if let Some(event) = parse_block(&block) {
                    return Some(event);
                }
            }

            let bytes = self.body.next().await?.ok()?;
            self.buffer.push_str(&String::from_utf8_lossy(&bytes));
        }
    }

    /// Read until an event named `name` arrives
    pub async fn until(&mut self, name: &str) -> Option<SseEvent> {
        while let Some(event) = self.next().await {
            if event.name == name {
                return Some(event);
            }
        }
        None
    }

    /// Drain the remaining events
    pub async fn rest(mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}
