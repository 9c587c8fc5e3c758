use std::cell::{Cell, RefCell};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use bytes::BufMut;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::routing::dijkstra::Dijkstra;
use crate::routing::graph::Graph;
use crate::transport::ack_set::{AckKind, AckSet};
use crate::transport::in_message::{InMessageFull, InMessagePart};
use crate::transport::message_id::MessageId;
use crate::transport::message_type::MessageType;
use crate::transport::out_message::OutMessage;
use crate::transport::outbound_acks::{AckEntry, OutboundAcks};
use crate::transport::pending_message::PendingMessage;
use crate::transport::relay::Relay;
use crate::transport::sequence_number::SequenceNumber;

pub type SharedRelay<I> = Rc<RefCell<dyn Relay<I>>>;

/// Handle for tearing the core down from inside the receive callback.
///
/// The callback runs while the core is mutably borrowed, so it cannot drop
///  the core directly. Tripping this signal instead makes every
///  callback-invoking path abandon the remainder of its routine, after
///  which the owner is free to drop the core.
#[derive(Clone)]
pub struct StopSignal(Rc<Cell<bool>>);

impl StopSignal {
    pub fn stop(&self) {
        self.0.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.get()
    }
}

/// Per-peer inbound state.
struct Target {
    /// present once the peer's syn arrived; holds the delivery watermark
    ///  and the receive window
    sync: Option<TargetSync>,
    /// out-of-order or partially received broadcasts, keyed by sequence
    ///  number. Bounded by the ack window: anything outside it is refused
    ///  before it gets here.
    pending: BTreeMap<SequenceNumber, PendingMessage>,
}

impl Target {
    fn new() -> Target {
        Target {
            sync: None,
            pending: BTreeMap::new(),
        }
    }
}

struct TargetSync {
    last_executed_message: SequenceNumber,
    acks: AckSet,
}

/// The per-node transport core: owns outbound message bookkeeping,
///  per-source reassembly and ordering state, the acknowledgment engine,
///  and the topology-driven assignment of targets to relays.
///
/// The core is single-threaded and run-to-completion: relays post inbound
///  records and completions into it from the owning thread, and every
///  method finishes before the next one starts. Outbound payloads are
///  owned by the relays queuing them; the core keeps weak handles only and
///  is told via [Core::release] when the last relay lets go.
///
/// The type parameter is the application's id for unreliable broadcasts,
///  see [MessageId].
pub struct Core<I: Clone + Ord + Debug> {
    our_id: Uuid,
    on_receive: Box<dyn FnMut(Uuid, &[u8])>,
    next_reliable_broadcast_number: SequenceNumber,
    next_message_number: SequenceNumber,
    relays: Vec<SharedRelay<I>>,
    messages: BTreeMap<MessageId<I>, Weak<RefCell<OutMessage>>>,
    on_flush: Option<Box<dyn FnOnce()>>,
    targets: FxHashMap<Uuid, Target>,
    outbound_acks: OutboundAcks,
    stop: Rc<Cell<bool>>,
}

impl<I: Clone + Ord + Debug> Core<I> {
    pub fn new(our_id: Uuid, on_receive: impl FnMut(Uuid, &[u8]) + 'static) -> Core<I> {
        Core {
            our_id,
            on_receive: Box::new(on_receive),
            next_reliable_broadcast_number: SequenceNumber::FIRST,
            next_message_number: SequenceNumber::FIRST,
            relays: Vec::new(),
            messages: BTreeMap::new(),
            on_flush: None,
            targets: FxHashMap::default(),
            outbound_acks: OutboundAcks::new(our_id),
            stop: Rc::new(Cell::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.our_id
    }

    pub fn stop_signal(&self) -> StopSignal {
        StopSignal(self.stop.clone())
    }

    pub fn register_relay(&mut self, relay: SharedRelay<I>) {
        debug_assert!(
            !self.relays.iter().any(|r| r.borrow().relay_id() == relay.borrow().relay_id()),
            "second relay for the same neighbor"
        );
        self.relays.push(relay);
    }

    pub fn unregister_relay(&mut self, relay_id: Uuid) {
        self.relays.retain(|r| r.borrow().relay_id() != relay_id);
    }

    //----------------------------------------------------------------------
    // outbound
    //----------------------------------------------------------------------

    /// broadcasts `data` to every current target, delivered exactly once
    ///  and in broadcast order on each of them
    pub fn broadcast_reliable(&mut self, data: Vec<u8>) {
        let sn = self.next_reliable_broadcast_number;
        self.next_reliable_broadcast_number = sn.next();

        let message = Rc::new(RefCell::new(OutMessage::new(
            self.our_id,
            self.target_ids(),
            true,
            MessageType::ReliableBroadcast,
            sn,
            data,
        )));

        debug!("broadcasting reliable message {}", sn);

        let id = MessageId::ReliableBroadcast(sn);
        self.messages.insert(id.clone(), Rc::downgrade(&message));
        self.dispatch_to_relays(&id, &message);
    }

    /// broadcasts `data` to every current target, without delivery or
    ///  ordering guarantees. If a previous broadcast under the same `id`
    ///  is still queued somewhere, its payload is rewritten in place so
    ///  that only the newest one goes out.
    pub fn broadcast_unreliable(&mut self, id: I, data: Vec<u8>) {
        let targets = self.target_ids();
        self.broadcast_unreliable_to(id, data, targets);
    }

    /// like [Core::broadcast_unreliable], but to an explicit target set.
    ///  An in-flight rewrite keeps the targets of the original broadcast.
    pub fn broadcast_unreliable_to(&mut self, id: I, data: Vec<u8>, targets: BTreeSet<Uuid>) {
        let mid = MessageId::UnreliableBroadcast(id);

        if let Some(live) = self.messages.get(&mid).and_then(Weak::upgrade) {
            trace!("rewriting queued unreliable message {:?} in place", mid);
            live.borrow_mut().reset_payload(data);
            return;
        }

        let sn = self.next_message_number;
        self.next_message_number = sn.next();

        let message = Rc::new(RefCell::new(OutMessage::new(
            self.our_id,
            targets,
            false,
            MessageType::UnreliableBroadcast,
            sn,
            data,
        )));

        self.messages.insert(mid.clone(), Rc::downgrade(&message));
        self.dispatch_to_relays(&mid, &message);
    }

    /// copies an inbound record into a fresh outbound message and hands it
    ///  to every relay. End-to-end reliability stays with the original
    ///  source; the local node only passes the record along.
    pub fn forward_message(&mut self, msg: &InMessagePart) {
        let message = Rc::new(RefCell::new(OutMessage::from_part(msg)));

        // all forwards share the one bucket and are not deduplicated, so
        //  the same record may sit in a queue more than once
        let id = MessageId::Forward;
        self.dispatch_to_relays(&id, &message);
    }

    fn dispatch_to_relays(&self, id: &MessageId<I>, message: &Rc<RefCell<OutMessage>>) {
        for relay in &self.relays {
            relay.borrow_mut().insert_message(id.clone(), Rc::clone(message));
        }
    }

    fn target_ids(&self) -> BTreeSet<Uuid> {
        self.targets.keys().copied().collect()
    }

    /// called by a relay when it drops its strong handle on a message.
    ///  Once the last relay lets go, the message's table entry is erased
    ///  and the armed flush (if any) gets a chance to fire.
    pub fn release(&mut self, message_id: &MessageId<I>, message: Rc<RefCell<OutMessage>>) {
        // only messages that originated here live in the table; relayed
        //  traffic is never retained
        if message.borrow().source == self.our_id {
            if let Some(entry) = self.messages.get(message_id) {
                let is_table_entry = entry.as_ptr() == Rc::as_ptr(&message);
                let is_last_handle = Rc::strong_count(&message) == 1;

                if is_table_entry && is_last_handle {
                    {
                        let m = message.borrow();
                        if m.is_reliable && !m.targets.is_empty() {
                            // the remaining targets left the network before
                            //  acknowledging; the message is dropped
                            warn!("releasing reliable message {} still owed to {:?}", m.sequence_number, m.targets);
                        }
                    }
                    self.messages.remove(message_id);
                }
            }
        }

        drop(message);
        self.try_flush();
    }

    /// arms a one-shot continuation that fires as soon as every outbound
    ///  message has been released by every relay - immediately, if the
    ///  core is already idle
    pub fn flush(&mut self, on_flush: impl FnOnce() + 'static) {
        self.on_flush = Some(Box::new(on_flush));
        self.try_flush();
    }

    pub fn try_flush(&mut self) {
        if self.on_flush.is_none() {
            return;
        }

        // entries whose message died without a release call (e.g. a
        //  broadcast issued while no relay was registered) must not hold
        //  up the flush
        self.messages.retain(|_, message| message.strong_count() > 0);

        if !self.messages.is_empty() {
            return;
        }
        if self.relays.iter().any(|r| r.borrow().is_sending()) {
            return;
        }

        if let Some(on_flush) = self.on_flush.take() {
            debug!("all outbound messages released, flushing");
            on_flush();
        }
    }

    //----------------------------------------------------------------------
    // topology
    //----------------------------------------------------------------------

    /// reassigns every reachable node of `graph` to the relay on its
    ///  shortest path, installing new peers (with a syn handshake) and
    ///  replaying messages still owed to peers that moved between relays.
    ///  Nodes without a relay towards them simply receive no new traffic
    ///  until a later reset.
    pub fn reset_topology(&mut self, graph: &Graph) {
        debug!("resetting topology over {} nodes", graph.nodes().count());

        for relay in &self.relays {
            relay.borrow_mut().clear_targets();
        }

        // one relay per target: equal-cost alternatives are discarded
        let dijkstra = Dijkstra::new(self.our_id, graph);

        let relays = self.relays.clone();
        for target in graph.nodes() {
            if target == self.our_id {
                continue;
            }
            let Some(first_hop) = dijkstra.first_hop_to(target) else {
                continue;
            };
            let Some(relay) = relays.iter().find(|r| r.borrow().relay_id() == first_hop) else {
                debug!("no relay towards first hop {:?}, {:?} stays unreachable", first_hop, target);
                continue;
            };
            self.add_target_to_transport(relay, target);
        }
    }

    fn add_target_to_transport(&mut self, relay: &SharedRelay<I>, new_target: Uuid) {
        if !relay.borrow_mut().add_target(new_target) {
            return;
        }

        if !self.targets.contains_key(&new_target) {
            self.targets.insert(new_target, Target::new());

            // peek, not increment: the syn shares the sequence number of
            //  the next reliable broadcast, which is exactly the baseline
            //  the receive channel is initialized to
            let sn = self.next_reliable_broadcast_number;

            let message = Rc::new(RefCell::new(OutMessage::new(
                self.our_id,
                BTreeSet::from([new_target]),
                true,
                MessageType::Syn,
                sn,
                Vec::new(),
            )));

            debug!("new target {:?}, sending syn at {}", new_target, sn);

            let id = MessageId::ReliableUnicast { peer: new_target, sn };
            self.messages.insert(id.clone(), Rc::downgrade(&message));
            self.dispatch_to_relays(&id, &message);
        }
        else {
            // a different relay was sending to this target before the
            //  topology changed and will drop it from its list; replay
            //  everything still owed so delivery is not stranded
            for (mid, message) in &self.messages {
                let Some(message) = message.upgrade() else { continue };
                if message.borrow().targets.contains(&new_target) {
                    relay.borrow_mut().insert_message(mid.clone(), Rc::clone(&message));
                }
            }
        }
    }

    //----------------------------------------------------------------------
    // inbound
    //----------------------------------------------------------------------

    pub fn on_receive_part(&mut self, msg: InMessagePart) {
        if msg.is_full() {
            self.on_receive_full(msg.into());
            return;
        }

        // only broadcast payloads are chunked and buffered
        if msg.message_type != MessageType::ReliableBroadcast
            && msg.message_type != MessageType::UnreliableBroadcast {
            return;
        }

        let Some(target) = self.targets.get_mut(&msg.source) else {
            return; // we have not attempted to peer with this node
        };
        let Some(sync) = &target.sync else {
            return; // no syn yet, nothing can be delivered anyway
        };
        if !sync.acks.can_add(msg.sequence_number) {
            trace!("chunk of {} from {:?} is outside the ack window, dropping", msg.sequence_number, msg.source);
            return;
        }

        let sequence_number = msg.sequence_number;
        let message_type = msg.message_type;

        let pending = Self::add_part_to_pending(target, msg);
        let Some(full) = pending.get_full_message() else {
            return;
        };

        if message_type == MessageType::UnreliableBroadcast {
            // unreliable numbers come from a different counter than
            //  reliable ones; a completed entry left behind could collide
            //  with a later reliable message of the same number
            target.pending.remove(&sequence_number);
        }

        self.on_receive_full(full);
    }

    pub fn on_receive_full(&mut self, msg: InMessageFull) {
        let Some(target) = self.targets.get_mut(&msg.source) else {
            // no peering attempted with this node, drop until a topology
            //  reset establishes state
            return;
        };

        match msg.message_type {
            MessageType::ReliableBroadcast => {
                let Some(sync) = &mut target.sync else {
                    return; // no syn yet
                };

                // refuse what the window cannot track: a sender that raced
                //  too far ahead gets no ack and has to retransmit
                if !sync.acks.try_add(msg.sequence_number) {
                    trace!("reliable message {} from {:?} fell outside the ack window", msg.sequence_number, msg.source);
                    return;
                }

                self.outbound_acks.acknowledge(msg.source, AckKind::Broadcast, msg.sequence_number);

                if msg.sequence_number == sync.last_executed_message.next() {
                    sync.last_executed_message = msg.sequence_number;
                    (self.on_receive)(msg.source, &msg.payload);
                    if self.stop.get() {
                        return;
                    }
                    self.replay_pending_messages(msg.source);
                }
                else if msg.sequence_number > sync.last_executed_message.next() {
                    Self::add_full_to_pending(target, msg);
                }
                // else: a duplicate of an executed message - the ack above
                //  is re-issued, the payload is discarded
            }
            MessageType::UnreliableBroadcast => {
                if target.sync.is_none() {
                    return;
                }
                (self.on_receive)(msg.source, &msg.payload);
            }
            MessageType::Syn => {
                // always acknowledged, even when repeated
                self.outbound_acks.acknowledge(msg.source, AckKind::Unicast, msg.sequence_number);

                if target.sync.is_none() {
                    // everything before the syn was never tracked, so the
                    //  channel starts one below the syn's number
                    let baseline = msg.sequence_number.prev();
                    target.sync = Some(TargetSync {
                        last_executed_message: baseline,
                        acks: AckSet::starting_at(AckKind::Broadcast, baseline),
                    });
                    debug!("receive channel from {:?} initialized at {}", msg.source, baseline);
                }
                // a repeated syn never resets an established channel
            }
        }
    }

    /// delivers buffered messages for as long as the next sequence number
    ///  is complete, sweeping stragglers the stream has already passed
    fn replay_pending_messages(&mut self, source: Uuid) {
        loop {
            let Some(target) = self.targets.get_mut(&source) else { return };
            let Some(sync) = &mut target.sync else { return };

            while let Some((&sn, _)) = target.pending.first_key_value() {
                if sn <= sync.last_executed_message {
                    target.pending.pop_first();
                }
                else {
                    break;
                }
            }

            let next = sync.last_executed_message.next();
            let Some(pending) = target.pending.get(&next) else { return };
            let Some(full) = pending.get_full_message() else { return };

            sync.last_executed_message = next;
            target.pending.remove(&next);

            self.outbound_acks.acknowledge(full.source, AckKind::Broadcast, full.sequence_number);
            (self.on_receive)(full.source, &full.payload);
            if self.stop.get() {
                return;
            }
        }
    }

    /// processes a peer's summary of what it received from us: each
    ///  acknowledged message forgets that peer, and fully acknowledged
    ///  messages leave the table
    pub fn on_receive_acks(&mut self, peer: Uuid, acks: AckSet) {
        let mut acked_some = false;

        for sn in acks.iter() {
            let mid = match acks.kind() {
                AckKind::Broadcast => MessageId::ReliableBroadcast(sn),
                AckKind::Unicast => MessageId::ReliableUnicast { peer, sn },
            };

            let Some(message) = self.messages.get(&mid).and_then(Weak::upgrade) else {
                continue;
            };

            let now_unaddressed = {
                let mut message = message.borrow_mut();
                message.targets.remove(&peer);
                message.targets.is_empty()
            };
            trace!("{:?} acknowledged {:?}", peer, mid);

            if now_unaddressed {
                self.messages.remove(&mid);
            }
            acked_some = true;
        }

        if acked_some {
            self.try_flush();
        }
    }

    /// queues an ack record addressed to some other node for relaying
    pub fn add_ack_entry(&mut self, entry: AckEntry) {
        self.outbound_acks.add_ack_entry(entry);
    }

    /// writes a few ack records relevant to `targets` into an outgoing
    ///  packet; called by relays while framing
    pub fn encode_acks(&mut self, encoder: &mut impl BufMut, targets: &BTreeSet<Uuid>) -> u8 {
        self.outbound_acks.encode_few(encoder, targets)
    }

    fn add_part_to_pending(target: &mut Target, msg: InMessagePart) -> &mut PendingMessage {
        match target.pending.entry(msg.sequence_number) {
            Entry::Vacant(e) => e.insert(PendingMessage::from_part(&msg)),
            Entry::Occupied(e) => {
                let pending = e.into_mut();
                if pending.message_type() != msg.message_type {
                    // a stale entry from the other sequence number space
                    *pending = PendingMessage::from_part(&msg);
                }
                else {
                    pending.update_payload(msg.chunk_start, &msg.payload);
                }
                pending
            }
        }
    }

    fn add_full_to_pending(target: &mut Target, msg: InMessageFull) -> &mut PendingMessage {
        match target.pending.entry(msg.sequence_number) {
            Entry::Vacant(e) => e.insert(PendingMessage::from_full(&msg)),
            Entry::Occupied(e) => {
                let pending = e.into_mut();
                if pending.message_type() != msg.message_type {
                    *pending = PendingMessage::from_full(&msg);
                }
                else {
                    pending.update_payload(0, &msg.payload);
                }
                pending
            }
        }
    }
}

impl<I: Clone + Ord + Debug> Drop for Core<I> {
    fn drop(&mut self) {
        self.stop.set(true);
    }
}
