use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Wire discriminant of a payload record.
///
/// Relayed opaque traffic re-encodes to the record it arrived as, so there
///  is no separate 'forward' discriminant on the wire; forwarding is purely
///  a keying concern of the sender's message table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    /// channel bootstrap: initializes the reliable receive channel from a
    ///  particular source. Rides the reliable-unicast stream.
    Syn = 0,
    ReliableBroadcast = 1,
    UnreliableBroadcast = 2,
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::syn(0, Some(MessageType::Syn))]
    #[case::reliable(1, Some(MessageType::ReliableBroadcast))]
    #[case::unreliable(2, Some(MessageType::UnreliableBroadcast))]
    #[case::unknown(3, None)]
    fn test_from_wire_tag(#[case] raw: u8, #[case] expected: Option<MessageType>) {
        assert_eq!(MessageType::try_from(raw).ok(), expected);
    }
}
