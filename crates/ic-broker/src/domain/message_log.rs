//! Bounded circular log of delivered payloads.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One logged write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub sequence: u64,
    pub payload: Vec<u8>,
}

/// Ring of `(sequence, payload)` pairs. The oldest entry is overwritten once
/// `capacity` is reached; payloads are cut to `message_size` bytes.
#[derive(Debug, Clone)]
pub struct MessageLog {
    capacity: usize,
    message_size: usize,
    entries: VecDeque<LoggedMessage>,
}

impl MessageLog {
    pub fn new(capacity: usize, message_size: usize) -> Self {
        Self {
            capacity,
            message_size,
            entries: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn push(&mut self, sequence: u64, payload: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let n = payload.len().min(self.message_size);
        self.entries.push_back(LoggedMessage {
            sequence,
            payload: payload[..n].to_vec(),
        });
    }

    /// Up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LoggedMessage> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_entry_is_overwritten() {
        let mut log = MessageLog::new(2, 16);
        log.push(1, b"a");
        log.push(2, b"b");
        log.push(3, b"c");

        let sequences: Vec<u64> = log.recent(10).iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![2, 3]);
    }

    #[test]
    fn test_payload_cut_to_message_size() {
        let mut log = MessageLog::new(4, 3);
        log.push(1, b"abcdef");
        assert_eq!(log.recent(1)[0].payload, b"abc");
    }

    #[test]
    fn test_recent_returns_tail() {
        let mut log = MessageLog::new(8, 8);
        for seq in 1..=5 {
            log.push(seq, b"x");
        }
        let tail: Vec<u64> = log.recent(2).iter().map(|m| m.sequence).collect();
        assert_eq!(tail, vec![4, 5]);
    }
}
