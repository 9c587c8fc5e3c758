//! Record-level wire codec.
//!
//! A network packet is a sequence of tagged records - all numbers in
//!  network byte order (BE):
//!
//! ```ascii
//! payload record (tag 0x01):
//! 0:  record tag: u8
//! 1:  source: UUID (16 bytes)
//! 17: message type: u8 (0 syn, 1 reliable broadcast, 2 unreliable broadcast)
//! 18: sequence number: u32
//! 22: original size: u32 - full size of the message this chunk belongs to
//! 26: chunk start: u32 - offset of this chunk within the message
//! 30: chunk length: u32
//! 34: payload (chunk length bytes)
//!
//! ack record (tag 0x02):
//! 0:  record tag: u8
//! 1:  destination: UUID - the node being acknowledged
//! 17: source: UUID - the acknowledging node
//! 33: ack kind: u8 (0 broadcast, 1 unicast)
//! 34: highest sequence number: u32
//! 38: predecessor bitmap: u32
//! ```
//!
//! The core emits only ack records; payload framing - including chunking a
//!  message across packets - is a relay concern. A record with an unknown
//!  tag or an unknown type/kind byte fails decoding, and the receiving
//!  relay drops the remainder of the packet: record lengths are not
//!  self-delimiting for unknown tags.

use anyhow::anyhow;
use bytes::{Buf, BufMut};
use bytes_varint::try_get_fixed::TryGetFixedSupport;
use uuid::Uuid;

use crate::transport::ack_set::AckSet;
use crate::transport::in_message::InMessagePart;
use crate::transport::message_type::MessageType;
use crate::transport::outbound_acks::AckEntry;
use crate::transport::sequence_number::SequenceNumber;
use crate::util::buf::{put_uuid, try_copy_bytes, try_get_uuid};

pub const RECORD_PAYLOAD: u8 = 1;
pub const RECORD_ACKS: u8 = 2;

pub fn put_payload_record(
    buf: &mut impl BufMut,
    source: Uuid,
    message_type: MessageType,
    sequence_number: SequenceNumber,
    original_size: u32,
    chunk_start: u32,
    payload: &[u8],
) {
    buf.put_u8(RECORD_PAYLOAD);
    put_uuid(buf, source);
    buf.put_u8(message_type.into());
    buf.put_u32(sequence_number.to_raw());
    buf.put_u32(original_size);
    buf.put_u32(chunk_start);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
}

pub fn put_ack_record(buf: &mut impl BufMut, entry: &AckEntry) {
    buf.put_u8(RECORD_ACKS);
    put_uuid(buf, entry.destination);
    put_uuid(buf, entry.source);
    entry.acks.ser(buf);
}

/// One decoded record of a packet.
#[derive(Debug)]
pub enum Record {
    Payload(InMessagePart),
    Acks(AckEntry),
}

impl Record {
    pub fn try_deser(buf: &mut impl Buf) -> anyhow::Result<Record> {
        match buf.try_get_u8()? {
            RECORD_PAYLOAD => {
                let source = try_get_uuid(buf)?;
                let message_type = MessageType::try_from(buf.try_get_u8()?)
                    .map_err(|e| anyhow!("invalid message type: {}", e))?;
                let sequence_number = SequenceNumber::from_raw(buf.try_get_u32()?);
                let original_size = buf.try_get_u32()?;
                let chunk_start = buf.try_get_u32()?;
                let chunk_len = buf.try_get_u32()?;
                let payload = try_copy_bytes(buf, chunk_len as usize)?;

                Ok(Record::Payload(InMessagePart {
                    source,
                    message_type,
                    sequence_number,
                    original_size,
                    chunk_start,
                    payload,
                    targets: Default::default(),
                }))
            }
            RECORD_ACKS => {
                let destination = try_get_uuid(buf)?;
                let source = try_get_uuid(buf)?;
                let acks = AckSet::try_deser(buf)?;

                Ok(Record::Acks(AckEntry {
                    destination,
                    source,
                    acks,
                }))
            }
            tag => Err(anyhow!("unknown record tag: {}", tag)),
        }
    }
}
