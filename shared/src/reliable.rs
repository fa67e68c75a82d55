//! Sequenced, acknowledged delivery on top of UDP
//!
//! Each direction of a participant <-> relay link owns one `ReliableSender` and
//! the other end one `ReliableReceiver`. The sender keeps every payload until it
//! is acknowledged and re-emits it after `resend_after`; the receiver releases
//! payloads strictly in sequence order, exactly once, buffering early arrivals
//! inside a bounded window.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Out-of-order arrivals further ahead than this are dropped
pub const RECEIVE_WINDOW: u32 = 1024;

#[derive(Debug)]
struct Pending<T> {
    payload: T,
    last_sent: Instant,
    attempts: u32,
}

#[derive(Debug)]
pub struct ReliableSender<T> {
    next_seq: u32,
    pending: BTreeMap<u32, Pending<T>>,
    resend_after: Duration,
}

impl<T: Clone> ReliableSender<T> {
    pub fn new(resend_after: Duration) -> Self {
        Self {
            next_seq: 1,
            pending: BTreeMap::new(),
            resend_after,
        }
    }

    /// Assigns the next sequence number and tracks the payload until acked.
    /// Returns the sequence number to transmit now.
    pub fn push(&mut self, payload: T, now: Instant) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.pending.insert(
            seq,
            Pending {
                payload,
                last_sent: now,
                attempts: 1,
            },
        );
        seq
    }

    /// Returns true if the sequence was outstanding
    pub fn ack(&mut self, seq: u32) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Payloads whose last transmission is older than the resend interval,
    /// oldest first. Marks them as sent at `now`.
    pub fn due_for_resend(&mut self, now: Instant) -> Vec<(u32, T)> {
        let mut due = Vec::new();
        for (seq, pending) in self.pending.iter_mut() {
            if now.duration_since(pending.last_sent) >= self.resend_after {
                pending.last_sent = now;
                pending.attempts += 1;
                due.push((*seq, pending.payload.clone()));
            }
        }
        due
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Highest number of transmissions of any unacked payload
    pub fn max_attempts(&self) -> u32 {
        self.pending.values().map(|p| p.attempts).max().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct ReliableReceiver<T> {
    next_expected: u32,
    buffered: BTreeMap<u32, T>,
}

impl<T> ReliableReceiver<T> {
    pub fn new() -> Self {
        Self {
            next_expected: 1,
            buffered: BTreeMap::new(),
        }
    }

    /// Accepts one arrival and returns every payload that is now deliverable
    /// in order. Duplicates and arrivals outside the window yield nothing.
    /// The caller should ack `seq` regardless, so the sender stops resending.
    pub fn receive(&mut self, seq: u32, payload: T) -> Vec<T> {
        if seq < self.next_expected || seq >= self.next_expected.saturating_add(RECEIVE_WINDOW) {
            return Vec::new();
        }

        self.buffered.entry(seq).or_insert(payload);

        let mut ready = Vec::new();
        while let Some(payload) = self.buffered.remove(&self.next_expected) {
            ready.push(payload);
            self.next_expected += 1;
        }
        ready
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn buffered(&self) -> usize {
        self.buffered.len()
    }
}

impl<T> Default for ReliableReceiver<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_start_at_one() {
        let mut sender = ReliableSender::new(Duration::from_millis(100));
        let now = Instant::now();
        assert_eq!(sender.push("a", now), 1);
        assert_eq!(sender.push("b", now), 2);
        assert_eq!(sender.in_flight(), 2);
    }

    #[test]
    fn test_ack_stops_resends() {
        let mut sender = ReliableSender::new(Duration::from_millis(100));
        let start = Instant::now();
        let seq = sender.push("hello", start);

        assert!(sender.ack(seq));
        assert!(!sender.ack(seq));
        assert!(sender
            .due_for_resend(start + Duration::from_secs(1))
            .is_empty());
    }

    #[test]
    fn test_resend_after_interval() {
        let mut sender = ReliableSender::new(Duration::from_millis(100));
        let start = Instant::now();
        sender.push("first", start);
        sender.push("second", start + Duration::from_millis(80));

        let due = sender.due_for_resend(start + Duration::from_millis(120));
        assert_eq!(due, vec![(1, "first")]);
        assert_eq!(sender.max_attempts(), 2);

        // Just resent, so not due again immediately
        assert_eq!(
            sender.due_for_resend(start + Duration::from_millis(190)),
            vec![(2, "second")]
        );
    }

    #[test]
    fn test_in_order_release() {
        let mut receiver = ReliableReceiver::new();
        assert_eq!(receiver.receive(1, 'a'), vec!['a']);
        assert_eq!(receiver.receive(2, 'b'), vec!['b']);
        assert_eq!(receiver.next_expected(), 3);
    }

    #[test]
    fn test_out_of_order_is_buffered() {
        let mut receiver = ReliableReceiver::new();
        assert!(receiver.receive(3, 'c').is_empty());
        assert!(receiver.receive(2, 'b').is_empty());
        assert_eq!(receiver.buffered(), 2);
        assert_eq!(receiver.receive(1, 'a'), vec!['a', 'b', 'c']);
        assert_eq!(receiver.buffered(), 0);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let mut receiver = ReliableReceiver::new();
        assert_eq!(receiver.receive(1, 'a'), vec!['a']);
        assert!(receiver.receive(1, 'a').is_empty());

        assert!(receiver.receive(3, 'c').is_empty());
        assert!(receiver.receive(3, 'x').is_empty());
        assert_eq!(receiver.receive(2, 'b'), vec!['b', 'c']);
    }

    #[test]
    fn test_far_future_is_dropped() {
        let mut receiver: ReliableReceiver<u8> = ReliableReceiver::new();
        assert!(receiver.receive(1 + RECEIVE_WINDOW, 0).is_empty());
        assert_eq!(receiver.buffered(), 0);
    }
}
