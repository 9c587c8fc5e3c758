//! In-memory test support for driving the transport core without real
//!  sockets: deterministic node ids and a relay that frames packets with
//!  the real wire codec but leaves 'network' delivery to the test.
//!
//! This module is part of the crate's regular (non-`#[cfg(test)]`) code so
//!  that applications can drive a core in their own tests the same way.

pub mod node;
pub mod relay;
