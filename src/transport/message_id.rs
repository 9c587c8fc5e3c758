use uuid::Uuid;

use crate::transport::sequence_number::SequenceNumber;

/// Key of a node's outbound message table.
///
/// The type parameter is the application's id for unreliable broadcasts,
///  used to find (and rewrite) a payload that is still in flight. The
///  derived ordering is total, which the ordered message table relies on.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum MessageId<I> {
    /// a message of this node's reliable-broadcast stream
    ReliableBroadcast(SequenceNumber),
    /// a syn directed at `peer`
    ReliableUnicast { peer: Uuid, sn: SequenceNumber },
    /// an unreliable broadcast under the application's id
    UnreliableBroadcast(I),
    /// the one bucket for relayed opaque traffic; forwards are not
    ///  deduplicated
    Forward,
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn rb(sn: u32) -> MessageId<u64> {
        MessageId::ReliableBroadcast(SequenceNumber::from_raw(sn))
    }

    fn ru(peer: u128, sn: u32) -> MessageId<u64> {
        MessageId::ReliableUnicast {
            peer: Uuid::from_u128(peer),
            sn: SequenceNumber::from_raw(sn),
        }
    }

    #[rstest]
    #[case::by_sequence_number(rb(1), rb(2))]
    #[case::across_variants(rb(99), ru(1, 1))]
    #[case::by_peer(ru(1, 9), ru(2, 1))]
    #[case::unreliable_by_user_id(MessageId::UnreliableBroadcast(3), MessageId::UnreliableBroadcast(4))]
    #[case::forward_sorts_last(MessageId::UnreliableBroadcast(u64::MAX), MessageId::Forward)]
    fn test_total_order(#[case] smaller: MessageId<u64>, #[case] bigger: MessageId<u64>) {
        assert!(smaller < bigger);
        assert!(bigger > smaller);
        assert_ne!(smaller, bigger);
    }
}
