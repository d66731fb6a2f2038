use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use arrow::record_batch::RecordBatch;
use dfq_common::NodeId;
use dfq_common::metrics::global_metrics;

/// One inbound cross-node payload, tagged with the message token the
/// receiving kernel rendezvouses on.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    token: String,
    source: NodeId,
    payload: Option<RecordBatch>,
}

impl ReceivedMessage {
    /// Wrap a received batch.
    #[must_use]
    pub fn new(token: impl Into<String>, source: NodeId, payload: RecordBatch) -> Self {
        Self {
            token: token.into(),
            source,
            payload: Some(payload),
        }
    }

    /// End-of-stream marker for a token.
    #[must_use]
    pub fn sentinel(token: impl Into<String>, source: NodeId) -> Self {
        Self {
            token: token.into(),
            source,
            payload: None,
        }
    }

    /// Token this message addresses.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Node that published the message.
    #[must_use]
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Whether this message marks end-of-stream for its token.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.payload.is_none()
    }

    /// Consume the message, yielding its batch (`None` for sentinels).
    #[must_use]
    pub fn into_batch(self) -> Option<RecordBatch> {
        self.payload
    }
}

/// Token-addressed blocking rendezvous for inbound cross-node payloads.
///
/// `put` never blocks; `get` blocks until a message for its token arrives.
/// Messages for one token are delivered in arrival order; gets on distinct
/// tokens make independent progress. A single broadcast wakeup serves all
/// waiters; the spurious-wake cost is negligible at message-queue volume.
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: Mutex<VecDeque<ReceivedMessage>>,
    cond: Condvar,
}

impl MessageQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and wake every waiter.
    pub fn put(&self, message: ReceivedMessage) {
        let mut messages = self.messages.lock().expect("message queue mutex");
        messages.push_back(message);
        global_metrics().set_message_queue_depth(messages.len() as u64);
        self.cond.notify_all();
    }

    /// Block until a message for `token` exists, then remove and return the
    /// first matching message in arrival order. `None` means the matched
    /// message was a sentinel: end-of-stream for this token.
    pub fn get(&self, token: &str) -> Option<ReceivedMessage> {
        let mut messages = self.messages.lock().expect("message queue mutex");
        loop {
            if let Some(idx) = messages.iter().position(|m| m.token() == token) {
                let message = messages.remove(idx).expect("index observed under lock");
                global_metrics().set_message_queue_depth(messages.len() as u64);
                global_metrics().inc_messages_received(token);
                if message.is_sentinel() {
                    return None;
                }
                return Some(message);
            }
            messages = self.cond.wait(messages).expect("message queue mutex");
        }
    }

    /// Messages currently waiting (all tokens).
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().expect("message queue mutex").len()
    }

    /// Whether no messages are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use arrow::array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    fn batch(values: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))])
            .expect("test batch")
    }

    #[test]
    fn get_returns_first_matching_message_in_arrival_order() {
        let queue = MessageQueue::new();
        queue.put(ReceivedMessage::new("a", NodeId(1), batch(&[1])));
        queue.put(ReceivedMessage::new("b", NodeId(1), batch(&[2])));
        queue.put(ReceivedMessage::new("a", NodeId(2), batch(&[3])));

        let first = queue.get("a").expect("message");
        assert_eq!(first.source(), NodeId(1));
        let second = queue.get("a").expect("message");
        assert_eq!(second.source(), NodeId(2));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn get_blocks_until_matching_token_arrives() {
        let queue = Arc::new(MessageQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.get("late"))
        };
        thread::sleep(Duration::from_millis(20));
        // A non-matching token must not satisfy the waiter.
        queue.put(ReceivedMessage::new("other", NodeId(0), batch(&[9])));
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        queue.put(ReceivedMessage::new("late", NodeId(0), batch(&[1])));
        let got = waiter.join().unwrap().expect("message");
        assert_eq!(got.token(), "late");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn sentinel_reports_end_of_stream_for_its_token() {
        let queue = MessageQueue::new();
        queue.put(ReceivedMessage::new("t", NodeId(0), batch(&[1])));
        queue.put(ReceivedMessage::sentinel("t", NodeId(0)));
        assert!(queue.get("t").is_some());
        assert!(queue.get("t").is_none());
    }

    #[test]
    fn gets_on_distinct_tokens_progress_independently() {
        let queue = Arc::new(MessageQueue::new());
        let mut waiters = Vec::new();
        for token in ["x", "y", "z"] {
            let queue = Arc::clone(&queue);
            waiters.push(thread::spawn(move || queue.get(token).map(|m| m.token().to_string())));
        }
        queue.put(ReceivedMessage::new("z", NodeId(0), batch(&[1])));
        queue.put(ReceivedMessage::new("x", NodeId(0), batch(&[2])));
        queue.put(ReceivedMessage::new("y", NodeId(0), batch(&[3])));
        let mut tokens: Vec<String> = waiters
            .into_iter()
            .map(|w| w.join().unwrap().expect("message"))
            .collect();
        tokens.sort();
        assert_eq!(tokens, ["x", "y", "z"]);
    }
}
