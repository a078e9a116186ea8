//! Default subscriber wiring, kept out of the library crates so they only
//! ever depend on the `tracing` facade. Binaries (`zeroipc-cli`, tests)
//! pull this crate in to get a real subscriber installed.

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber honoring `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_default_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!("tracing subscriber initialized");
    }
}
