//! The transport core: per-node state that multiplexes reliable and
//!  unreliable broadcasts over a set of one-hop relays.
//!
//! [core::Core] is the orchestrator; the leaf modules around it hold one
//!  concern each: sequence windows ([ack_set]), owed acknowledgments
//!  ([outbound_acks]), reassembly ([pending_message]), the shared outbound
//!  payload ([out_message]) and its table key ([message_id]), the inbound
//!  record types ([in_message]), the record codec ([wire]), and the
//!  [relay::Relay] abstraction the core drives.

pub mod ack_set;
pub mod core;
pub mod in_message;
pub mod message_id;
pub mod message_type;
pub mod out_message;
pub mod outbound_acks;
pub mod pending_message;
pub mod relay;
pub mod sequence_number;
pub mod wire;
