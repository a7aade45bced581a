//! ferrokv server binary.
//!
//! Usage:
//!   ferrokv-server <data-dir> [--addr <addr>]
//!
//! Every client-supplied database name is joined onto <data-dir> to form
//! the on-disk location. SIGINT/SIGTERM flush all open databases before
//! the process exits.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Context;

use ferrokv::engine::BTreeStore;
use ferrokv::registry::DatabaseRegistry;
use ferrokv::server::Server;

const DEFAULT_ADDR: &str = "localhost:8501";

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("ferrokv-server {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|a| a == "--help" || a == "-h") || args.len() < 2 {
        println!("ferrokv-server {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Networked key-value store server");
        println!();
        println!("Usage: ferrokv-server <data-dir> [--addr <addr>]");
        println!();
        println!("Arguments:");
        println!("  <data-dir>     Directory holding the databases");
        println!("  --addr         Listen address (default: {})", DEFAULT_ADDR);
        println!();
        println!("Flags:");
        println!("  -V, --version  Print version information");
        println!("  -h, --help     Print this help message");
        if args.len() < 2 {
            std::process::exit(1);
        }
        return Ok(());
    }

    tracing_subscriber::fmt().with_target(false).init();

    let data_dir = PathBuf::from(&args[1]);
    if args[1].starts_with("--") {
        anyhow::bail!("data-dir '{}' looks like a flag, not a path", args[1]);
    }

    let addr = args
        .iter()
        .position(|a| a == "--addr")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_ADDR);

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("cannot create data dir {}", data_dir.display()))?;

    let registry = Arc::new(DatabaseRegistry::new(
        data_dir.clone(),
        Arc::new(BTreeStore::new()),
    ));

    tracing::info!("ferrokv-server {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("data directory: {}", data_dir.display());

    // Flush everything before dying on SIGINT/SIGTERM
    let registry_for_signal = Arc::clone(&registry);
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
    ])
    .context("cannot register signal handlers")?;

    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::info!("received signal {}, flushing", sig);
            registry_for_signal.flush_all();
            tracing::info!("exiting");
            std::process::exit(0);
        }
    });

    let listener =
        TcpListener::bind(addr).with_context(|| format!("cannot bind to {}", addr))?;
    tracing::info!("listening on {}", addr);

    Server::new(registry).serve(listener);
    Ok(())
}
