//! Tracing setup for the command-line tools.
//!
//! Logs go to stderr so stdout stays parseable JSON. `RUST_LOG` overrides the
//! default filter.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "module_resolver=info,warn";

pub fn init_cli_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("module_resolver=debug,info")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
