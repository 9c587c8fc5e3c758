use anyhow::anyhow;
use bytes::{Buf, BufMut};
use bytes_varint::try_get_fixed::TryGetFixedSupport;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::transport::sequence_number::SequenceNumber;

/// Discriminates which sequence-number stream an [AckSet] refers to, so a
///  consumer can interpret the numbers it carries.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AckKind {
    /// the sender's reliable-broadcast stream
    Broadcast = 0,
    /// reliable unicasts (syns) directed at the acknowledging node
    Unicast = 1,
}

/// Number of predecessors of the highest sequence number an [AckSet] keeps
///  track of. A sequence number that falls behind the window can no longer
///  be acknowledged.
pub const ACK_WINDOW: u32 = 32;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct Window {
    highest_sn: u32,
    /// bit `i` set means `highest_sn - 1 - i` was received; the highest
    ///  itself is implicitly marked
    predecessors: u32,
}

/// Compact record of recently received sequence numbers for one
///  (peer, kind) channel: the highest received number plus a bitmap of its
///  [ACK_WINDOW] predecessors.
///
/// A set starts out empty and adopts the first number offered to it; from
///  then on the window slides forward with the highest received number,
///  forgetting anything that falls out the back.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct AckSet {
    kind: AckKind,
    window: Option<Window>,
}

impl AckSet {
    pub fn new(kind: AckKind) -> AckSet {
        AckSet {
            kind,
            window: None,
        }
    }

    /// a set whose window starts at `highest_sn`, with `highest_sn` itself
    ///  counted as received. Used to initialize a receive channel at the
    ///  baseline announced by a syn.
    pub fn starting_at(kind: AckKind, highest_sn: SequenceNumber) -> AckSet {
        AckSet {
            kind,
            window: Some(Window {
                highest_sn: highest_sn.to_raw(),
                predecessors: 0,
            }),
        }
    }

    pub fn kind(&self) -> AckKind {
        self.kind
    }

    /// whether [AckSet::try_add] would accept `sn`, without mutating
    pub fn can_add(&self, sn: SequenceNumber) -> bool {
        let sn = sn.to_raw();
        match &self.window {
            None => true,
            Some(window) => {
                sn > window.highest_sn || window.highest_sn - sn <= ACK_WINDOW
            }
        }
    }

    /// marks `sn` as received if it fits the window, sliding the window
    ///  forward as needed. Returns false iff `sn` has already fallen behind
    ///  the window. Adding a number that is already marked is a no-op that
    ///  reports success.
    pub fn try_add(&mut self, sn: SequenceNumber) -> bool {
        let sn = sn.to_raw();

        let Some(window) = &mut self.window else {
            self.window = Some(Window { highest_sn: sn, predecessors: 0 });
            return true;
        };

        if sn > window.highest_sn {
            let shift = sn - window.highest_sn;
            // the old highest becomes predecessor bit `shift - 1`; bits
            //  pushed past the window are forgotten
            let shifted = if shift < ACK_WINDOW { window.predecessors << shift } else { 0 };
            let old_highest = if shift <= ACK_WINDOW { 1u32 << (shift - 1) } else { 0 };
            window.predecessors = shifted | old_highest;
            window.highest_sn = sn;
            return true;
        }

        if sn == window.highest_sn {
            return true;
        }

        let behind = window.highest_sn - sn;
        if behind <= ACK_WINDOW {
            window.predecessors |= 1u32 << (behind - 1);
            true
        }
        else {
            false
        }
    }

    /// the marked sequence numbers in ascending order
    pub fn iter(&self) -> impl Iterator<Item = SequenceNumber> + '_ {
        let window = self.window;
        (0..ACK_WINDOW).rev()
            .filter_map(move |bit| {
                let w = window?;
                if w.predecessors & (1u32 << bit) != 0 {
                    w.highest_sn.checked_sub(bit + 1).map(SequenceNumber::from_raw)
                }
                else {
                    None
                }
            })
            .chain(window.map(|w| SequenceNumber::from_raw(w.highest_sn)))
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        // an empty set encodes as a window at zero, which can never match a
        //  live stream (streams start at 1)
        let window = self.window.unwrap_or(Window { highest_sn: 0, predecessors: 0 });
        buf.put_u8(self.kind.into());
        buf.put_u32(window.highest_sn);
        buf.put_u32(window.predecessors);
    }

    pub fn try_deser(buf: &mut impl Buf) -> anyhow::Result<AckSet> {
        let kind = AckKind::try_from(buf.try_get_u8()?)
            .map_err(|e| anyhow!("invalid ack kind: {}", e))?;
        let highest_sn = buf.try_get_u32()?;
        let predecessors = buf.try_get_u32()?;
        Ok(AckSet {
            kind,
            window: Some(Window { highest_sn, predecessors }),
        })
    }
}
