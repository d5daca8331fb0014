//! Log sink setup.
//!
//! One configure run writes its diagnostics to two places: the console,
//! and `<builddir>/meson-logs/meson-log.txt` so the full record of probe
//! results survives for later inspection. The sink is initialised once
//! per process, before the interpreter runs, and is read-only afterwards.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_DIR_NAME: &str = "meson-logs";
pub const LOG_FILE_NAME: &str = "meson-log.txt";

/// Initialise the global log sink for this run.
///
/// `log_dir` is `<builddir>/meson-logs`; it is created if missing. When
/// the sink has already been initialised (tests drive several configures
/// in one process) the call is a no-op.
pub fn init(log_dir: &Path, verbose: bool) -> Result<()> {
    crate::util::fs::ensure_dir(log_dir)?;
    let log_path = log_dir.join(LOG_FILE_NAME);
    let file = File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drydock=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drydock=info"))
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stdout);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .without_time()
        .with_writer(Arc::new(file));

    // A second initialisation attempt means the sink already exists; the
    // existing one keeps serving the process.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}
