//! Two in-process nodes exchanging reliable broadcasts over in-memory
//!  relays, exercising the whole path: syn handshake, broadcast, packet
//!  framing, piggybacked acks, message retirement, flush.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use uuid::Uuid;

use clique::routing::graph::Graph;
use clique::test_util::relay::{deliver_packet, TestRelay};
use clique::transport::core::Core;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let alice_id = Uuid::new_v4();
    let bob_id = Uuid::new_v4();

    let mut alice: Core<u64> = Core::new(alice_id, move |source, payload| {
        println!("alice received {:?} from {}", String::from_utf8_lossy(payload), source);
    });
    let mut bob: Core<u64> = Core::new(bob_id, move |source, payload| {
        println!("bob received {:?} from {}", String::from_utf8_lossy(payload), source);
    });

    let alice_relay = Rc::new(RefCell::new(TestRelay::new(bob_id)));
    let bob_relay = Rc::new(RefCell::new(TestRelay::new(alice_id)));
    alice.register_relay(alice_relay.clone());
    bob.register_relay(bob_relay.clone());

    let mut topology = Graph::new();
    topology.add_edge(alice_id, bob_id);
    alice.reset_topology(&topology);
    bob.reset_topology(&topology);

    alice.broadcast_reliable(b"hello from alice".to_vec());
    bob.broadcast_reliable(b"hello from bob".to_vec());

    let alice_done = Rc::new(Cell::new(false));
    let bob_done = Rc::new(Cell::new(false));
    alice.flush({
        let done = alice_done.clone();
        move || done.set(true)
    });
    bob.flush({
        let done = bob_done.clone();
        move || done.set(true)
    });

    // the 'network': ferry packets back and forth until both sides have
    //  retired all of their outbound messages
    while !(alice_done.get() && bob_done.get()) {
        if let Some(packet) = alice_relay.borrow_mut().build_packet(&mut alice) {
            deliver_packet(&mut bob, &packet)?;
        }
        alice_relay.borrow_mut().sweep(&mut alice);

        if let Some(packet) = bob_relay.borrow_mut().build_packet(&mut bob) {
            deliver_packet(&mut alice, &packet)?;
        }
        bob_relay.borrow_mut().sweep(&mut bob);
    }

    println!("all messages delivered and acknowledged");
    Ok(())
}
