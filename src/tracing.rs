//! Tracing subsystem initialization
//!
//! Console logging with span context. Log levels come from `RUST_LOG`,
//! falling back to info globally and debug for this crate.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subsystem
///
/// # Example
/// ```ignore
/// init_tracing()?;
/// ```
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,abacus=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
