//! Helpers related to tracing, used by main entrypoints

use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// Initialize tracing with the default configuration.
pub fn initialize_tracing() {
    // Don't include timestamps and such because they're not really useful and
    // too verbose, and plus container runtimes already record them.
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();

    // Informational messages about skipped steps are part of normal output,
    // so default to info unless RUST_LOG says otherwise.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // Log to stderr by default
    tracing_subscriber::fmt()
        .event_format(format)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}
