use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};

use bytes::{BufMut, Bytes};
use uuid::Uuid;

use crate::transport::in_message::InMessagePart;
use crate::transport::message_type::MessageType;
use crate::transport::sequence_number::SequenceNumber;
use crate::transport::wire;

/// An outbound payload, shared by every relay currently queuing it.
///
/// The owning core observes the message only through a weak handle: the
///  strong handles live in relay queues, and the last relay to drop its
///  handle returns it through the core's `release`, which is what retires
///  the message. Relays never remove targets themselves - entries leave
///  `targets` when the core processes acknowledgments.
pub struct OutMessage {
    pub source: Uuid,
    /// remote peers still owed delivery
    pub targets: BTreeSet<Uuid>,
    pub is_reliable: bool,
    pub message_type: MessageType,
    pub sequence_number: SequenceNumber,
    original_size: u32,
    chunk_start: u32,
    payload: Bytes,
}

impl Debug for OutMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "OutMessage{{{:?} {:?} sn:{} {} bytes -> {:?}}}",
               self.source, self.message_type, self.sequence_number,
               self.payload.len(), self.targets)
    }
}

impl OutMessage {
    pub fn new(
        source: Uuid,
        targets: BTreeSet<Uuid>,
        is_reliable: bool,
        message_type: MessageType,
        sequence_number: SequenceNumber,
        payload: Vec<u8>,
    ) -> OutMessage {
        OutMessage {
            source,
            targets,
            is_reliable,
            message_type,
            sequence_number,
            original_size: payload.len() as u32, //TODO reject payloads exceeding u32::MAX bytes
            chunk_start: 0,
            payload: payload.into(),
        }
    }

    /// a message relaying an inbound record verbatim: the chunk bounds are
    ///  kept so a forwarded fragment re-encodes to exactly the record it
    ///  arrived as. End-to-end reliability stays with the original source,
    ///  so the local node treats it as unreliable.
    pub fn from_part(part: &InMessagePart) -> OutMessage {
        OutMessage {
            source: part.source,
            targets: part.targets.clone(),
            is_reliable: false,
            message_type: part.message_type,
            sequence_number: part.sequence_number,
            original_size: part.original_size,
            chunk_start: part.chunk_start,
            payload: part.payload.clone(),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    pub fn chunk_start(&self) -> u32 {
        self.chunk_start
    }

    /// replaces the payload of a message that is still queued somewhere -
    ///  this is how an unreliable broadcast in flight is rewritten so that
    ///  only the newest payload goes out
    pub fn reset_payload(&mut self, payload: Vec<u8>) {
        debug_assert_eq!(self.chunk_start, 0, "only whole messages can be rewritten");
        self.original_size = payload.len() as u32;
        self.payload = payload.into();
    }

    /// encodes this message as a single payload record
    pub fn write_record(&self, buf: &mut impl BufMut) {
        wire::put_payload_record(
            buf,
            self.source,
            self.message_type,
            self.sequence_number,
            self.original_size,
            self.chunk_start,
            &self.payload,
        );
    }
}
