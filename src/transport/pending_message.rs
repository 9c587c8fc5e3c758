use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::transport::in_message::{InMessageFull, InMessagePart};
use crate::transport::message_type::MessageType;
use crate::transport::sequence_number::SequenceNumber;

/// Reassembly state for one inbound sequence number: a buffer of the
///  message's full size plus the byte ranges received so far.
///
/// Chunks may arrive in any order and may overlap; an overlapping chunk is
///  assumed to carry the same bytes as the first one and simply overwrites.
pub struct PendingMessage {
    source: Uuid,
    message_type: MessageType,
    sequence_number: SequenceNumber,
    buffer: Vec<u8>,
    /// sorted, pairwise disjoint, non-adjacent `[start, end)` runs
    covered: Vec<(u32, u32)>,
}

impl PendingMessage {
    pub fn from_part(part: &InMessagePart) -> PendingMessage {
        let mut pending = PendingMessage {
            source: part.source,
            message_type: part.message_type,
            sequence_number: part.sequence_number,
            buffer: vec![0; part.original_size as usize],
            covered: Vec::new(),
        };
        pending.update_payload(part.chunk_start, &part.payload);
        pending
    }

    pub fn from_full(msg: &InMessageFull) -> PendingMessage {
        let mut pending = PendingMessage {
            source: msg.source,
            message_type: msg.message_type,
            sequence_number: msg.sequence_number,
            buffer: vec![0; msg.payload.len()],
            covered: Vec::new(),
        };
        pending.update_payload(0, &msg.payload);
        pending
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// merges one chunk into the buffer. A chunk reaching past the
    ///  announced size is truncated to fit - the sender's `original_size`
    ///  is authoritative.
    pub fn update_payload(&mut self, chunk_start: u32, payload: &[u8]) {
        let total = self.buffer.len() as u32;
        if chunk_start > total {
            warn!("chunk at offset {} is entirely outside the announced {} bytes, ignoring", chunk_start, total);
            return;
        }

        let end = (chunk_start + payload.len() as u32).min(total);
        if end == chunk_start {
            return;
        }

        let len = (end - chunk_start) as usize;
        self.buffer[chunk_start as usize..end as usize].copy_from_slice(&payload[..len]);
        self.add_run(chunk_start, end);
    }

    fn add_run(&mut self, start: u32, end: u32) {
        let mut merged = (start, end);
        self.covered.retain(|&(s, e)| {
            if s <= merged.1 && merged.0 <= e {
                // overlapping or adjacent: absorb into the new run
                merged.0 = merged.0.min(s);
                merged.1 = merged.1.max(e);
                false
            }
            else {
                true
            }
        });

        let pos = self.covered.iter()
            .position(|&(s, _)| s > merged.0)
            .unwrap_or(self.covered.len());
        self.covered.insert(pos, merged);
    }

    pub fn is_complete(&self) -> bool {
        let total = self.buffer.len() as u32;
        if total == 0 {
            return true;
        }
        self.covered == [(0, total)]
    }

    /// the reassembled message, once every byte of `[0, original_size)` is
    ///  covered
    pub fn get_full_message(&self) -> Option<InMessageFull> {
        if !self.is_complete() {
            return None;
        }

        Some(InMessageFull {
            source: self.source,
            message_type: self.message_type,
            sequence_number: self.sequence_number,
            payload: Bytes::copy_from_slice(&self.buffer),
        })
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use rstest::rstest;

    use super::*;

    fn part(original_size: u32, chunk_start: u32, payload: &[u8]) -> InMessagePart {
        InMessagePart {
            source: Uuid::from_u128(1),
            message_type: MessageType::ReliableBroadcast,
            sequence_number: SequenceNumber::from_raw(1),
            original_size,
            chunk_start,
            payload: Bytes::copy_from_slice(payload),
            targets: BTreeSet::new(),
        }
    }

    fn payload_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// chunk boundaries, fed in the given order; reassembly must be
    ///  independent of arrival order
    #[rstest]
    #[case::in_order(vec![(0, 400), (400, 700), (700, 1000)])]
    #[case::mid_tail_head(vec![(400, 700), (700, 1000), (0, 400)])]
    #[case::reversed(vec![(700, 1000), (400, 700), (0, 400)])]
    #[case::overlapping(vec![(500, 1000), (0, 300), (200, 600)])]
    #[case::duplicates(vec![(0, 500), (500, 1000), (0, 500), (400, 600)])]
    #[case::byte_wise(vec![(999, 1000), (0, 999)])]
    fn test_reassembles_in_any_order(#[case] chunks: Vec<(u32, u32)>) {
        let original = payload_bytes(1000);

        let (first_start, first_end) = chunks[0];
        let mut pending = PendingMessage::from_part(
            &part(1000, first_start, &original[first_start as usize..first_end as usize]));

        for &(start, end) in &chunks[1..] {
            assert!(pending.get_full_message().is_none());
            pending.update_payload(start, &original[start as usize..end as usize]);
        }

        let full = pending.get_full_message().expect("all chunks delivered");
        assert_eq!(&full.payload[..], &original[..]);
        assert_eq!(full.sequence_number, SequenceNumber::from_raw(1));
    }

    #[test]
    fn test_incomplete_has_no_full_message() {
        let pending = PendingMessage::from_part(&part(10, 2, b"abc"));
        assert!(!pending.is_complete());
        assert!(pending.get_full_message().is_none());
    }

    #[test]
    fn test_from_full_is_complete() {
        let msg = InMessageFull {
            source: Uuid::from_u128(1),
            message_type: MessageType::UnreliableBroadcast,
            sequence_number: SequenceNumber::from_raw(4),
            payload: Bytes::from_static(b"abc"),
        };
        let pending = PendingMessage::from_full(&msg);
        assert_eq!(pending.get_full_message(), Some(msg));
    }

    #[test]
    fn test_empty_message_is_complete() {
        let pending = PendingMessage::from_part(&part(0, 0, b""));
        assert!(pending.is_complete());
        assert_eq!(pending.get_full_message().unwrap().payload.len(), 0);
    }

    #[test]
    fn test_chunk_past_announced_size_is_clamped() {
        let mut pending = PendingMessage::from_part(&part(4, 0, b"ab"));
        pending.update_payload(2, b"cdEXTRA");
        let full = pending.get_full_message().expect("complete after clamping");
        assert_eq!(&full.payload[..], b"abcd");

        // entirely outside: ignored
        pending.update_payload(100, b"zz");
        assert_eq!(&pending.get_full_message().unwrap().payload[..], b"abcd");
    }
}
