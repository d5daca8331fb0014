//! Shared utilities: filesystem helpers, subprocess execution, logging.

pub mod fs;
pub mod logging;
pub mod process;
pub mod record;
