use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bytes::BufMut;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::transport::ack_set::{AckKind, AckSet};
use crate::transport::sequence_number::SequenceNumber;
use crate::transport::wire;

/// One acknowledgment record on its way to `destination`: `source`'s
///  summary of what it has received on one of `destination`'s streams.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AckEntry {
    pub destination: Uuid,
    pub source: Uuid,
    pub acks: AckSet,
}

/// Upper bound of ack records piggybacked onto a single outgoing packet.
pub const MAX_ACK_RECORDS_PER_PACKET: u8 = 8;

/// Relayed entries waiting for a packet towards their destination; beyond
///  this the oldest entry is dropped.
const RELAYED_BACKLOG_CAPACITY: usize = 64;

/// The acknowledgments the local node owes.
///
/// Own acknowledgments - summaries of what this node received - are kept
///  per (acknowledged peer, stream kind) and re-encoded into every packet
///  towards that peer until the window slides past them; a rotation makes
///  successive packets spread coverage when the per-packet budget is
///  smaller than the number of peers. Entries relayed on behalf of distant
///  nodes pass through a bounded backlog and are encoded at most once.
pub struct OutboundAcks {
    our_id: Uuid,
    own: BTreeMap<(Uuid, AckKind), AckSet>,
    /// fairness rotation over the keys of `own`
    rotation: VecDeque<(Uuid, AckKind)>,
    relayed: VecDeque<AckEntry>,
}

impl OutboundAcks {
    pub fn new(our_id: Uuid) -> OutboundAcks {
        OutboundAcks {
            our_id,
            own: BTreeMap::new(),
            rotation: VecDeque::new(),
            relayed: VecDeque::new(),
        }
    }

    /// records that `source`'s message `sn` was received and is to be
    ///  acknowledged on every upcoming packet towards `source`
    pub fn acknowledge(&mut self, source: Uuid, kind: AckKind, sn: SequenceNumber) {
        let acks = match self.own.entry((source, kind)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                self.rotation.push_back((source, kind));
                e.insert(AckSet::new(kind))
            }
        };

        if !acks.try_add(sn) {
            trace!("ack for {} from {:?} fell behind the ack window", sn, source);
        }
    }

    /// queues an externally supplied record for relaying towards its
    ///  destination
    pub fn add_ack_entry(&mut self, entry: AckEntry) {
        if self.relayed.len() == RELAYED_BACKLOG_CAPACITY {
            let dropped = self.relayed.pop_front();
            warn!("relayed ack backlog is full, dropping oldest entry {:?}", dropped);
        }
        self.relayed.push_back(entry);
    }

    /// encodes up to [MAX_ACK_RECORDS_PER_PACKET] ack records whose
    ///  destination is in `targets`, and returns how many were written.
    ///  Own acknowledgments stay queued for the next packet; relayed
    ///  entries are consumed.
    pub fn encode_few(&mut self, encoder: &mut impl BufMut, targets: &BTreeSet<Uuid>) -> u8 {
        let mut written = 0;

        for _ in 0..self.rotation.len() {
            if written == MAX_ACK_RECORDS_PER_PACKET {
                // leave the rest at the front so the next packet starts there
                break;
            }
            let key = self.rotation.pop_front()
                .expect("rotation length checked by the loop");

            if targets.contains(&key.0) {
                let acks = self.own.get(&key)
                    .expect("rotation only holds keys of `own`");
                wire::put_ack_record(encoder, &AckEntry {
                    destination: key.0,
                    source: self.our_id,
                    acks: *acks,
                });
                written += 1;
            }
            self.rotation.push_back(key);
        }

        let mut i = 0;
        while i < self.relayed.len() && written < MAX_ACK_RECORDS_PER_PACKET {
            if targets.contains(&self.relayed[i].destination) {
                let entry = self.relayed.remove(i)
                    .expect("index bounded by the loop");
                wire::put_ack_record(encoder, &entry);
                written += 1;
            }
            else {
                i += 1;
            }
        }

        written
    }
}

#[cfg(test)]
mod test {
    use bytes::{Buf, BytesMut};
    use rstest::rstest;

    use crate::transport::wire::Record;

    use super::*;

    fn node(number: u128) -> Uuid {
        Uuid::from_u128(number)
    }

    fn sn(raw: u32) -> SequenceNumber {
        SequenceNumber::from_raw(raw)
    }

    /// decodes everything `encode_few` wrote
    fn decode(buf: &mut BytesMut) -> Vec<AckEntry> {
        let mut read = &buf[..];
        let mut entries = Vec::new();
        while read.has_remaining() {
            match Record::try_deser(&mut read).unwrap() {
                Record::Acks(entry) => entries.push(entry),
                other => panic!("expected an ack record, got {:?}", other),
            }
        }
        entries
    }

    #[test]
    fn test_own_acks_are_encoded_and_kept() {
        let mut acks = OutboundAcks::new(node(1));
        acks.acknowledge(node(2), AckKind::Broadcast, sn(4));
        acks.acknowledge(node(2), AckKind::Broadcast, sn(5));

        let targets = BTreeSet::from([node(2)]);
        for _ in 0..2 {
            // own acknowledgments ride every packet towards their peer
            let mut buf = BytesMut::new();
            assert_eq!(acks.encode_few(&mut buf, &targets), 1);

            let entries = decode(&mut buf);
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].destination, node(2));
            assert_eq!(entries[0].source, node(1));
            assert_eq!(entries[0].acks.kind(), AckKind::Broadcast);
            assert_eq!(entries[0].acks.iter().collect::<Vec<_>>(), vec![sn(4), sn(5)]);
        }
    }

    #[test]
    fn test_encode_filters_by_target_set() {
        let mut acks = OutboundAcks::new(node(1));
        acks.acknowledge(node(2), AckKind::Broadcast, sn(1));
        acks.acknowledge(node(3), AckKind::Broadcast, sn(1));

        let mut buf = BytesMut::new();
        assert_eq!(acks.encode_few(&mut buf, &BTreeSet::from([node(3)])), 1);
        assert_eq!(decode(&mut buf)[0].destination, node(3));

        let mut buf = BytesMut::new();
        assert_eq!(acks.encode_few(&mut buf, &BTreeSet::from([node(9)])), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_rotation_spreads_coverage_across_packets() {
        let mut acks = OutboundAcks::new(node(1));
        let peer_count = MAX_ACK_RECORDS_PER_PACKET as u128 + 2;
        let targets = (0..peer_count)
            .map(|i| node(100 + i))
            .collect::<BTreeSet<_>>();
        for &peer in &targets {
            acks.acknowledge(peer, AckKind::Broadcast, sn(1));
        }

        let mut buf = BytesMut::new();
        assert_eq!(acks.encode_few(&mut buf, &targets), MAX_ACK_RECORDS_PER_PACKET);
        let first = decode(&mut buf).into_iter()
            .map(|e| e.destination)
            .collect::<BTreeSet<_>>();

        let mut buf = BytesMut::new();
        assert_eq!(acks.encode_few(&mut buf, &targets), MAX_ACK_RECORDS_PER_PACKET);
        let second = decode(&mut buf).into_iter()
            .map(|e| e.destination)
            .collect::<BTreeSet<_>>();

        // the two leftovers of the first packet lead the second one
        let missed = targets.difference(&first).collect::<BTreeSet<_>>();
        assert_eq!(missed.len(), 2);
        assert!(missed.iter().all(|peer| second.contains(peer)));
    }

    #[test]
    fn test_relayed_entries_are_sent_once() {
        let mut acks = OutboundAcks::new(node(1));
        let entry = AckEntry {
            destination: node(5),
            source: node(7),
            acks: AckSet::starting_at(AckKind::Broadcast, sn(3)),
        };
        acks.add_ack_entry(entry.clone());

        let targets = BTreeSet::from([node(5)]);
        let mut buf = BytesMut::new();
        assert_eq!(acks.encode_few(&mut buf, &targets), 1);
        assert_eq!(decode(&mut buf), vec![entry]);

        let mut buf = BytesMut::new();
        assert_eq!(acks.encode_few(&mut buf, &targets), 0);
    }

    #[test]
    fn test_relayed_entries_wait_for_a_matching_relay() {
        let mut acks = OutboundAcks::new(node(1));
        acks.add_ack_entry(AckEntry {
            destination: node(5),
            source: node(7),
            acks: AckSet::starting_at(AckKind::Unicast, sn(3)),
        });

        let mut buf = BytesMut::new();
        assert_eq!(acks.encode_few(&mut buf, &BTreeSet::from([node(6)])), 0);

        let mut buf = BytesMut::new();
        assert_eq!(acks.encode_few(&mut buf, &BTreeSet::from([node(5)])), 1);
    }

    #[rstest]
    #[case::under_capacity(10, 10)]
    #[case::at_capacity(RELAYED_BACKLOG_CAPACITY, RELAYED_BACKLOG_CAPACITY)]
    #[case::over_capacity(RELAYED_BACKLOG_CAPACITY + 5, RELAYED_BACKLOG_CAPACITY)]
    fn test_relayed_backlog_is_bounded(#[case] added: usize, #[case] kept: usize) {
        let mut acks = OutboundAcks::new(node(1));
        for i in 0..added {
            acks.add_ack_entry(AckEntry {
                destination: node(1000 + i as u128),
                source: node(7),
                acks: AckSet::starting_at(AckKind::Broadcast, sn(1)),
            });
        }
        assert_eq!(acks.relayed.len(), kept);

        if added > kept {
            // the oldest entries are the ones dropped
            assert_eq!(acks.relayed[0].destination, node(1000 + (added - kept) as u128));
        }
    }
}
