//! Integration tests for slotring: concurrent allocation and round-trips
//! against a peer thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotring::{Peer, RingConfig, Transport};

/// Spawn a peer that answers every request with `f(request)`.
fn spawn_peer(
    transport: Arc<Transport>,
    stop: Arc<AtomicBool>,
    f: fn(Vec<u8>) -> Vec<u8>,
) -> thread::JoinHandle<u64> {
    let mut peer = unsafe { Peer::attach(transport) };
    thread::spawn(move || {
        let mut served = 0u64;
        while !stop.load(Ordering::Relaxed) {
            match peer.try_take() {
                Some(req) => {
                    peer.respond(&f(req));
                    served += 1;
                }
                None => std::hint::spin_loop(),
            }
        }
        served
    })
}

fn call(transport: &Transport, req: &[u8], resp: &mut [u8]) -> usize {
    let alloc = transport.allocate(1, 1).unwrap();
    unsafe {
        transport.arm_rx(alloc.rx(0), resp).unwrap();
        transport.post_tx(alloc.tx(0), req).unwrap();
    }
    let n = transport.await_rx(alloc.rx(0));
    transport.await_tx_consumed(alloc.tx(0), req);
    n
}

/// Concurrent allocators with random sizes never receive overlapping ranges.
#[test]
fn test_allocation_partition() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;

    let transport = Arc::new(Transport::new(RingConfig::default()).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let transport = transport.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                barrier.wait();
                (0..ROUNDS)
                    .map(|_| {
                        let tx = rng.gen_range(0..=4u32);
                        let rx = rng.gen_range(0..=4u32);
                        transport.allocate(tx, rx).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let mut tx: Vec<(u64, u64)> = all
        .iter()
        .map(|a| (a.tx_base, a.tx_base + a.tx_count as u64))
        .collect();
    let mut rx: Vec<(u64, u64)> = all
        .iter()
        .map(|a| (a.rx_base, a.rx_base + a.rx_count as u64))
        .collect();

    for ranges in [&mut tx, &mut rx] {
        ranges.sort();
        // Back-to-back with no gap and no overlap.
        let mut expected_start = 0;
        for &(start, end) in ranges.iter() {
            assert_eq!(start, expected_start);
            expected_start = end;
        }
    }

    // Both counters advance under the same lock: sorting by TX base
    // yields RX bases in the same order.
    all.sort_by_key(|a| (a.tx_base, a.rx_base));
    for pair in all.windows(2) {
        assert!(pair[0].rx_base <= pair[1].rx_base);
    }
}

/// Several clients wrap a small ring many times over.
#[test]
fn test_multi_client_wraparound() {
    const CLIENTS: u64 = 4;
    const CALLS: u64 = 300;

    let transport = Arc::new(Transport::new(RingConfig { depth: 4 }).unwrap());
    let stop = Arc::new(AtomicBool::new(false));
    let peer = spawn_peer(transport.clone(), stop.clone(), |req| {
        let v = u64::from_le_bytes(req[..8].try_into().unwrap());
        (v + 1).to_le_bytes().to_vec()
    });

    let clients: Vec<_> = (0..CLIENTS)
        .map(|c| {
            let transport = transport.clone();
            thread::spawn(move || {
                for i in 0..CALLS {
                    let req = (c * 1_000_000 + i).to_le_bytes();
                    let mut resp = [0u8; 8];
                    assert_eq!(call(&transport, &req, &mut resp), 8);
                    assert_eq!(u64::from_le_bytes(resp), c * 1_000_000 + i + 1);
                }
            })
        })
        .collect();

    for c in clients {
        c.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    assert_eq!(peer.join().unwrap(), CLIENTS * CALLS);
}

/// A two-leg request is consumed as two consecutive TX slots.
#[test]
fn test_two_tx_legs_one_response() {
    let transport = Arc::new(Transport::new(RingConfig { depth: 4 }).unwrap());
    let mut peer = unsafe { Peer::attach(transport.clone()) };

    let server = thread::spawn(move || {
        for _ in 0..10 {
            let mut header = peer.take();
            let body = peer.take();
            header.extend_from_slice(&body);
            peer.respond(&header);
        }
    });

    for i in 0..10u8 {
        let alloc = transport.allocate(2, 1).unwrap();
        let header = [i; 2];
        let body = [0xEE; 3];
        let mut resp = [0u8; 16];
        unsafe {
            transport.arm_rx(alloc.rx(0), &mut resp).unwrap();
            transport.post_tx(alloc.tx(0), &header).unwrap();
            transport.post_tx(alloc.tx(1), &body).unwrap();
        }
        assert_eq!(transport.await_rx(alloc.rx(0)), 5);
        transport.await_tx_consumed(alloc.tx(0), &header);
        transport.await_tx_consumed(alloc.tx(1), &body);
        assert_eq!(&resp[..5], &[i, i, 0xEE, 0xEE, 0xEE]);
    }

    server.join().unwrap();
}

/// A response longer than the armed capacity is cut to the capacity.
#[test]
fn test_short_capacity() {
    let transport = Arc::new(Transport::new(RingConfig::default()).unwrap());
    let stop = Arc::new(AtomicBool::new(false));
    let peer = spawn_peer(transport.clone(), stop.clone(), |_| vec![7u8; 100]);

    let mut resp = [0u8; 10];
    assert_eq!(call(&transport, b"x", &mut resp), 10);
    assert_eq!(resp, [7u8; 10]);

    stop.store(true, Ordering::Relaxed);
    peer.join().unwrap();
}
