//! slotring-fs-bench: drive an in-process loopback server from several
//! client threads and report throughput.
//!
//! All clients share one transport, so this measures allocation contention
//! and ring turnover as much as the codec.

use std::sync::{Arc, Barrier};
use std::time::Instant;

use clap::{Parser, ValueEnum};
use log::info;

use slotring::{Peer, RingConfig, Transport};
use slotring_fs::loopback::LoopbackServer;
use slotring_fs::{ClientConfig, FsClient, PAGE_SIZE, Page, ROOT_ID, Result};

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser, Debug)]
#[command(name = "slotring-fs-bench", about = "slotring-fs loopback benchmark")]
struct Cli {
    /// Number of client threads.
    #[arg(long, default_value_t = 4)]
    clients: usize,

    /// Operations per client thread.
    #[arg(long, default_value_t = 100_000)]
    ops: usize,

    /// Slots per ring (power of two).
    #[arg(long, default_value_t = slotring::DEFAULT_RING_DEPTH)]
    depth: usize,

    /// Operation mix.
    #[arg(long, value_enum, default_value_t = Workload::Getattr)]
    workload: Workload,

    /// Session id to mount.
    #[arg(long, default_value_t = 1)]
    session: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Workload {
    Getattr,
    Lookup,
    Read,
    Write,
    /// Alternating page write and read-back.
    Mixed,
}

// =============================================================================
// Client loop
// =============================================================================

fn run_client(client: &FsClient, index: usize, cli: &Cli) -> Result<()> {
    let name = format!("bench-{index}");
    let file = match client.lookup(ROOT_ID, name.as_bytes())?.found() {
        Some(inode) => inode,
        None => client.create(ROOT_ID, name.as_bytes(), 0o644)?,
    };

    let mut page = Page::new();
    page.data_mut().fill(index as u8);
    if cli.workload != Workload::Write {
        client.write_page(file.id, 0, &page, PAGE_SIZE)?;
    }

    for op in 0..cli.ops {
        match cli.workload {
            Workload::Getattr => {
                client.getattr(file.id)?;
            }
            Workload::Lookup => {
                client.lookup(ROOT_ID, name.as_bytes())?;
            }
            Workload::Read => {
                client.read_page(file.id, 0, &mut page)?;
            }
            Workload::Write => {
                client.write_page(file.id, (op % 16) as u64, &page, PAGE_SIZE)?;
            }
            Workload::Mixed => {
                if op % 2 == 0 {
                    client.write_page(file.id, 0, &page, PAGE_SIZE)?;
                } else {
                    client.read_page(file.id, 0, &mut page)?;
                }
            }
        }
    }
    Ok(())
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let transport = Arc::new(Transport::new(RingConfig { depth: cli.depth })?);
    // Safety: every buffer the clients post or arm lives in this process.
    let peer = unsafe { Peer::attach(transport.clone()) };
    let server = LoopbackServer::new(peer).spawn();

    let target = format!("/{}", cli.session);
    let client = Arc::new(FsClient::mount(
        transport.clone(),
        &target,
        ClientConfig::default(),
    )?);
    info!(
        "mounted {} depth={} clients={} workload={:?}",
        target, cli.depth, cli.clients, cli.workload
    );

    let barrier = Arc::new(Barrier::new(cli.clients + 1));
    let cli = Arc::new(cli);
    let handles: Vec<_> = (0..cli.clients)
        .map(|i| {
            let client = client.clone();
            let barrier = barrier.clone();
            let cli = cli.clone();
            std::thread::spawn(move || {
                barrier.wait();
                run_client(&client, i, &cli)
            })
        })
        .collect();

    barrier.wait();
    let start = Instant::now();
    for handle in handles {
        handle.join().map_err(|_| "client thread panicked")??;
    }
    let elapsed = start.elapsed();

    let total = (cli.clients * cli.ops) as f64;
    println!(
        "{:?}: {} ops in {:.3}s = {:.0} ops/s, {:.2} us/op",
        cli.workload,
        total,
        elapsed.as_secs_f64(),
        total / elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1e6 / total * cli.clients as f64,
    );

    if let Ok(client) = Arc::try_unwrap(client) {
        client.unmount();
    }
    if let Some(server) = server.shutdown() {
        info!("server finished with {} inodes", server.inode_count());
    }
    Ok(())
}
