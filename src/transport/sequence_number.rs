use std::fmt::{Display, Formatter};

/// Sequence number of a message in one node's reliable-broadcast or
///  unreliable stream.
///
/// Streams start at [SequenceNumber::FIRST] rather than zero so that the
///  baseline of a freshly initialized receive channel (one below the syn's
///  number) is always representable without wrapping. Wraparound itself is
///  not handled - sessions are assumed to end long before the space is
///  exhausted.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SequenceNumber(u32);

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SequenceNumber {
    pub const FIRST: SequenceNumber = SequenceNumber(1);

    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> SequenceNumber {
        SequenceNumber(
            self.0.checked_add(1)
                .expect("sequence number space exhausted")
        )
    }

    pub fn prev(&self) -> SequenceNumber {
        SequenceNumber(
            self.0.checked_sub(1)
                .expect("no sequence number before zero")
        )
    }
}
