//! Reference client tool: open a database, do one put/get round-trip,
//! hold the session briefly, then close. Exits non-zero on any error.
//!
//! Usage:
//!   ferrokv-client [--addr <addr>] [--db <name>] [-c <true|false>] [-t <secs>]

use std::time::Duration;

use anyhow::Context;

use ferrokv::client::RemoteDatabase;

const DEFAULT_ADDR: &str = "localhost:8501";
const DEFAULT_DB: &str = "main";
const DEFAULT_TIMEOUT_SECS: u64 = 5;

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("ferrokv-client {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: ferrokv-client [--addr <addr>] [--db <name>] [-c <true|false>] [-t <secs>]");
        println!();
        println!("Flags:");
        println!("  --addr   Server address (default: {})", DEFAULT_ADDR);
        println!("  --db     Database name (default: {})", DEFAULT_DB);
        println!("  -c       Create the database if needed (default: true)");
        println!("  -t       Timeout in seconds (default: {})", DEFAULT_TIMEOUT_SECS);
        return Ok(());
    }

    tracing_subscriber::fmt().with_target(false).init();

    let addr = flag_value(&args, "--addr").unwrap_or(DEFAULT_ADDR);
    let dbname = flag_value(&args, "--db").unwrap_or(DEFAULT_DB);
    let create = flag_value(&args, "-c")
        .map(|v| v.parse::<bool>())
        .transpose()
        .context("-c takes true or false")?
        .unwrap_or(true);
    let timeout = flag_value(&args, "-t")
        .map(|v| v.parse::<u64>())
        .transpose()
        .context("-t takes a number of seconds")?
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let mut db = RemoteDatabase::open(addr, dbname, create, timeout)
        .with_context(|| format!("error with open of '{}' at {}", dbname, addr))?;

    db.put(b"mykey", b"myvalue").context("error with put")?;

    let value = db.get(b"mykey").context("error with get")?;
    if value != b"myvalue" {
        anyhow::bail!("unexpected value: {:?}", value);
    }

    std::thread::sleep(Duration::from_secs(2));

    db.close().context("error with close")?;

    Ok(())
}
