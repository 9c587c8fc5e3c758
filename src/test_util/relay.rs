use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::rc::Rc;

use bytes::{Buf, Bytes, BytesMut};
use uuid::Uuid;

use crate::transport::core::Core;
use crate::transport::message_id::MessageId;
use crate::transport::out_message::OutMessage;
use crate::transport::relay::Relay;
use crate::transport::wire::Record;

/// An in-memory [Relay]: queues outbound messages and frames them into
///  packets with the real record codec, leaving 'network' delivery to the
///  test, which passes each packet to [deliver_packet] on the peer's core.
///
/// Reliable messages stay queued after sending - a real relay would
///  retransmit them - until the core empties their target set; unreliable
///  ones are done once sent. [TestRelay::sweep] drops finished messages
///  and hands their strong handles back through the core's release, the
///  way a relay's transmit queue does on completion.
pub struct TestRelay<I> {
    relay_id: Uuid,
    targets: BTreeSet<Uuid>,
    queue: Vec<QueuedMessage<I>>,
}

struct QueuedMessage<I> {
    id: MessageId<I>,
    message: Rc<RefCell<OutMessage>>,
    sent: bool,
}

impl<I: Clone + Ord + Debug> TestRelay<I> {
    pub fn new(relay_id: Uuid) -> TestRelay<I> {
        TestRelay {
            relay_id,
            targets: BTreeSet::new(),
            queue: Vec::new(),
        }
    }

    /// frames one packet towards this relay's neighbor: piggybacked ack
    ///  records first, then every queued message this relay is responsible
    ///  for and has not sent yet. Returns None for an empty packet.
    pub fn build_packet(&mut self, core: &mut Core<I>) -> Option<Bytes> {
        let mut buf = BytesMut::new();
        let mut records = core.encode_acks(&mut buf, &self.targets) as usize;

        for queued in &mut self.queue {
            if queued.sent {
                continue;
            }
            {
                let message = queued.message.borrow();
                if message.targets.is_disjoint(&self.targets) {
                    continue; // not this relay's responsibility
                }
                message.write_record(&mut buf);
            }
            queued.sent = true;
            records += 1;
        }

        if records == 0 {
            None
        }
        else {
            Some(buf.freeze())
        }
    }

    /// marks everything unsent so the next packet repeats it, the way a
    ///  real relay retransmits unacknowledged traffic
    pub fn retransmit(&mut self) {
        for queued in &mut self.queue {
            queued.sent = false;
        }
    }

    /// drops what this relay is done with - unreliable messages that went
    ///  out, and messages whose target set no longer intersects this
    ///  relay's - handing each strong handle back through the core
    pub fn sweep(&mut self, core: &mut Core<I>) {
        let mut kept = Vec::new();
        for queued in self.queue.drain(..) {
            let done = {
                let message = queued.message.borrow();
                let unreliable_sent = !message.is_reliable && queued.sent;
                unreliable_sent || message.targets.is_disjoint(&self.targets)
            };
            if done {
                core.release(&queued.id, queued.message);
            }
            else {
                kept.push(queued);
            }
        }
        self.queue = kept;
    }

    pub fn queued_ids(&self) -> Vec<MessageId<I>> {
        self.queue.iter()
            .map(|q| q.id.clone())
            .collect()
    }

    pub fn queued_messages(&self) -> Vec<(MessageId<I>, Rc<RefCell<OutMessage>>)> {
        self.queue.iter()
            .map(|q| (q.id.clone(), q.message.clone()))
            .collect()
    }
}

impl<I: Clone + Ord + Debug> Relay<I> for TestRelay<I> {
    fn relay_id(&self) -> Uuid {
        self.relay_id
    }

    fn add_target(&mut self, target: Uuid) -> bool {
        self.targets.insert(target)
    }

    fn clear_targets(&mut self) {
        self.targets.clear();
    }

    fn targets(&self) -> &BTreeSet<Uuid> {
        &self.targets
    }

    fn insert_message(&mut self, id: MessageId<I>, message: Rc<RefCell<OutMessage>>) {
        // re-inserting the same handle (e.g. a topology replay) must not
        //  duplicate the queue entry
        if self.queue.iter().any(|q| q.id == id && Rc::ptr_eq(&q.message, &message)) {
            return;
        }
        self.queue.push(QueuedMessage {
            id,
            message,
            sent: false,
        });
    }

    fn is_sending(&self) -> bool {
        !self.queue.is_empty()
    }
}

/// parses one packet and dispatches each record into `core` the way a
///  receiving relay does: payload records via `on_receive_part`, ack
///  records addressed to this node via `on_receive_acks`, and foreign ack
///  records into the relayed-ack backlog.
pub fn deliver_packet<I: Clone + Ord + Debug>(core: &mut Core<I>, mut packet: &[u8]) -> anyhow::Result<()> {
    while packet.has_remaining() {
        match Record::try_deser(&mut packet)? {
            Record::Payload(part) => core.on_receive_part(part),
            Record::Acks(entry) => {
                if entry.destination == core.id() {
                    core.on_receive_acks(entry.source, entry.acks);
                }
                else {
                    core.add_ack_entry(entry);
                }
            }
        }
    }
    Ok(())
}
