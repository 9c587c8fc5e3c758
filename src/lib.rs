//! Peer-to-peer group communication: a mesh of nodes identified by UUIDs
//!  forms a group over an arbitrary topology graph, and any member can
//!  broadcast messages to the rest.
//!
//! The crate multiplexes reliable and unreliable broadcasts over a
//!  collection of point-to-point relays (typically UDP based transports to
//!  one-hop neighbors), routes them along shortest paths, reassembles
//!  fragmented payloads, enforces in-order reliable delivery per source,
//!  and piggybacks acknowledgments so that senders can retire delivered
//!  messages.
//!
//! ## Design goals
//!
//! * The protocol is peer-to-peer without a dedicated server vs. client
//!   * every node runs the same core, and membership is whatever the
//!      application's topology graph says it is
//!   * any member can broadcast to all others; there is no broker
//! * Selective reliability per message
//!   * reliable broadcasts are delivered to the application exactly once
//!      per source, in the order they were sent, with gaps buffered until
//!      they are filled
//!   * unreliable broadcasts are delivered as they arrive - no ordering,
//!      no deduplication, and a newer payload may replace an older one
//!      that is still queued ("newest wins")
//! * Acknowledgments piggyback on regular traffic
//!   * a receiver summarizes what it has heard per (peer, stream) as a
//!      compact bitmap, and relays copy those summaries into every
//!      outgoing packet towards the peer being acknowledged
//!   * senders retire outbound messages once every addressed peer has
//!      acknowledged them
//! * Routing follows the topology graph
//!   * each remote node is assigned to exactly one relay - the first hop
//!      on a shortest path - and reassigned when the topology changes
//!   * messages still owed to a re-routed peer are replayed onto its new
//!      relay so delivery is not stranded
//! * The core is a single-threaded, run-to-completion state machine
//!   * relays do their I/O wherever they like and call into the core from
//!      the owning thread; the core itself never blocks and never spawns
//!
//! What the core does *not* do: datagram I/O, retransmission timers,
//!  fragmentation onto the wire, encryption, membership consensus, or
//!  persistence. Those live in relay implementations and in the
//!  application around this crate.

pub mod routing;
pub mod test_util;
pub mod transport;
pub mod util;
