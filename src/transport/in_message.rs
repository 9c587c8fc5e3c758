use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};

use bytes::Bytes;
use uuid::Uuid;

use crate::transport::message_type::MessageType;
use crate::transport::sequence_number::SequenceNumber;

/// One payload record as it arrived from a neighbor: the byte range
///  `[chunk_start, chunk_start + payload.len())` of a message of
///  `original_size` bytes.
#[derive(Clone, Eq, PartialEq)]
pub struct InMessagePart {
    pub source: Uuid,
    pub message_type: MessageType,
    pub sequence_number: SequenceNumber,
    pub original_size: u32,
    pub chunk_start: u32,
    pub payload: Bytes,
    /// remote nodes this record is still to be routed to. The record
    ///  format does not carry a target list, so the receiving relay fills
    ///  this in from its own routing state; it is consumed only when the
    ///  record is forwarded onwards.
    pub targets: BTreeSet<Uuid>,
}

impl Debug for InMessagePart {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "InMessagePart{{{:?} {:?} sn:{} [{}+{}/{}]}}",
               self.source, self.message_type, self.sequence_number,
               self.chunk_start, self.payload.len(), self.original_size)
    }
}

impl InMessagePart {
    /// whether this single record already carries the whole message
    pub fn is_full(&self) -> bool {
        self.chunk_start == 0 && self.payload.len() as u32 == self.original_size
    }
}

/// A fully (re)assembled inbound message.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct InMessageFull {
    pub source: Uuid,
    pub message_type: MessageType,
    pub sequence_number: SequenceNumber,
    pub payload: Bytes,
}

impl From<InMessagePart> for InMessageFull {
    /// only valid for parts that carry the whole message, see
    ///  [InMessagePart::is_full]
    fn from(part: InMessagePart) -> Self {
        InMessageFull {
            source: part.source,
            message_type: part.message_type,
            sequence_number: part.sequence_number,
            payload: part.payload,
        }
    }
}
