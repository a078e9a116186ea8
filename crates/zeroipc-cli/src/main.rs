//! Out-of-band inspector for ZeroIPC segments. Strictly read-only and
//! optional: nothing in the core depends on this binary being present.
//! Every subcommand is a thin wrapper over `zeroipc::inspect`.

use std::time::Duration;

use clap::{Parser, Subcommand};
use zeroipc::inspect;
use zeroipc_segment::SegmentCache;

#[derive(Parser, Debug)]
#[command(name = "zeroipc")]
#[command(about = "Inspect ZeroIPC shared-memory segments read-only")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every named structure in a segment's directory.
    List { segment: String },
    /// Show a single structure's header fields.
    Show { segment: String, name: String },
    /// Re-poll a structure's header fields until interrupted.
    Watch {
        segment: String,
        name: String,
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

fn main() {
    zeroipc_tracing::init_default_subscriber();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::List { segment } => list(&segment),
        Command::Show { segment, name } => show(&segment, &name),
        Command::Watch { segment, name, interval_ms } => watch(&segment, &name, interval_ms),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn list(segment_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!(segment = segment_name, "opening segment for list");
    let view = inspect::open_readonly(segment_name)?;
    for entry in view.entries() {
        println!("{:<32} offset={:<10} size={:<10} {}", entry.name, entry.offset, entry.size, entry.status);
    }
    Ok(())
}

fn show(segment_name: &str, entry_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!(segment = segment_name, entry = entry_name, "opening segment for show");
    let view = inspect::open_readonly(segment_name)?;
    let status = view.status(entry_name).ok_or_else(|| format!("no entry named {entry_name:?}"))?;
    println!("{entry_name}: {status}");
    Ok(())
}

fn watch(segment_name: &str, entry_name: &str, interval_ms: u64) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(segment = segment_name, entry = entry_name, interval_ms, "starting watch loop");
    // Kept out of `zeroipc::inspect` itself: caching which names map to
    // which open segments is a CLI-polling concern, not part of the
    // read-only inspection API.
    let cache = SegmentCache::new();
    // Reused across polls so a long-running watch doesn't reallocate a
    // scratch string every tick.
    let pool = object_pool::Pool::<String>::new(1, String::new);
    loop {
        let segment = cache.get_or_open_readonly(segment_name, zeroipc_segment::SegmentConfig::default())?;
        let view = inspect::SegmentView::from(segment);
        let status = view.status(entry_name).ok_or_else(|| format!("no entry named {entry_name:?}"))?;
        let mut line = pool.pull(String::new);
        line.clear();
        line.push_str(&status.to_string());
        println!("{}", *line);
        std::thread::sleep(Duration::from_millis(interval_ms));
    }
}
