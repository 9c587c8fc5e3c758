use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use uuid::Uuid;

use crate::transport::message_id::MessageId;
use crate::transport::out_message::OutMessage;

/// A one-hop transmitter to a direct neighbor, driven by the core.
///
/// A relay owns the wire side of the link: datagram I/O, chunking onto
///  packets, retransmission timers. The core only sees this small
///  capability set, plus the relay calling the core's inbound methods
///  (`on_receive_part`, `on_receive_acks`, `forward_message`, `release`,
///  ...) as traffic and completions come in.
///
/// Target bookkeeping: the set of remote nodes reached through this relay
///  is owned by the relay but assigned by the core, which clears and
///  refills it on every topology pass.
pub trait Relay<I> {
    /// the neighbor's node id; stable for the lifetime of the relay
    fn relay_id(&self) -> Uuid;

    /// includes `target` among the remote nodes reached through this
    ///  relay. Returns true iff the target was not present before.
    fn add_target(&mut self, target: Uuid) -> bool;

    fn clear_targets(&mut self);

    fn targets(&self) -> &BTreeSet<Uuid>;

    /// enqueues a message for transmission. The relay holds the strong
    ///  handle until it has delivered to all of its locally responsible
    ///  targets (for reliable messages: until they acknowledged and the
    ///  core emptied the message's target set), then hands the handle back
    ///  through the core's `release`.
    fn insert_message(&mut self, id: MessageId<I>, message: Rc<RefCell<OutMessage>>);

    /// true while any queued or in-flight work remains
    fn is_sending(&self) -> bool;
}
