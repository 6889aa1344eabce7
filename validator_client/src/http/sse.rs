//! A minimal server-sent-events parser over a streaming HTTP response body.
//!
//! Only the `event:` and `data:` fields are consumed; comments, ids and retry
//! hints are skipped. Frames that fail to decode are dropped rather than
//! terminating the stream.

use crate::api::{
    ChainReorgEvent, EventKind, EventStream, FinalizedCheckpointEvent, HeadEvent,
};
use futures::StreamExt;

struct Parser {
    buffer: String,
    event_name: Option<String>,
    data: String,
}

impl Parser {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            event_name: None,
            data: String::new(),
        }
    }

    /// Feed raw bytes, returning any events completed by this chunk.
    fn feed(&mut self, chunk: &[u8]) -> Vec<EventKind> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline);

            if line.is_empty() {
                // Frame boundary.
                if let (Some(name), data) = (self.event_name.take(), std::mem::take(&mut self.data))
                {
                    if let Some(event) = decode_event(&name, &data) {
                        events.push(event);
                    }
                }
                continue;
            }
            if let Some(name) = line.strip_prefix("event:") {
                self.event_name = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(data.trim_start());
            }
        }
        events
    }
}

fn decode_event(name: &str, data: &str) -> Option<EventKind> {
    match name {
        "head" => serde_json::from_str::<HeadEvent>(data).ok().map(EventKind::Head),
        "chain_reorg" => serde_json::from_str::<ChainReorgEvent>(data)
            .ok()
            .map(EventKind::ChainReorg),
        "finalized_checkpoint" => serde_json::from_str::<FinalizedCheckpointEvent>(data)
            .ok()
            .map(EventKind::FinalizedCheckpoint),
        _ => None,
    }
}

/// Adapt a streaming response into an `EventStream`. The stream ends when the
/// server closes the connection.
pub fn event_stream(response: reqwest::Response) -> EventStream {
    let bytes = response.bytes_stream();
    let parsed = futures::stream::unfold(
        (bytes, Parser::new(), Vec::<EventKind>::new()),
        |(mut bytes, mut parser, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop() {
                    return Some((event, (bytes, parser, pending)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        let mut events = parser.feed(&chunk);
                        // Pop from the back; preserve arrival order.
                        events.reverse();
                        pending = events;
                    }
                    Some(Err(_)) | None => return None,
                }
            }
        },
    );
    Box::pin(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_head_frames() {
        let mut parser = Parser::new();
        let frame = concat!(
            "event: head\n",
            "data: {\"slot\":\"64\",\"block\":\"0x",
            "4242424242424242424242424242424242424242424242424242424242424242",
            "\",\"state\":\"0x",
            "0000000000000000000000000000000000000000000000000000000000000000",
            "\",\"epoch_transition\":false}\n",
            "\n",
        );
        let events = parser.feed(frame.as_bytes());
        assert_eq!(events.len(), 1);
        match &events[0] {
            EventKind::Head(head) => assert_eq!(head.slot, types::Slot::new(64)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn tolerates_split_chunks() {
        let mut parser = Parser::new();
        let frame = "event: head\ndata: {\"slot\":\"1\",\"block\":\"0x0000000000000000000000000000000000000000000000000000000000000000\",\"state\":\"0x0000000000000000000000000000000000000000000000000000000000000000\"}\n\n";
        let (first, second) = frame.split_at(25);
        assert!(parser.feed(first.as_bytes()).is_empty());
        assert_eq!(parser.feed(second.as_bytes()).len(), 1);
    }

    #[test]
    fn unknown_events_are_skipped() {
        let mut parser = Parser::new();
        let events =
            parser.feed(b"event: voluntary_exit\ndata: {\"anything\":true}\n\n");
        assert!(events.is_empty());
    }
}
