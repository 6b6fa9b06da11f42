//! Thin wrapper around `env_logger` so the CLI and library share one
//! initialization path, matching the convention of keeping logging
//! concerns out of business logic modules.

use log::{debug, error, info, log_enabled, warn, Level};

/// Initializes the logger. Safe to call more than once (e.g. from tests
/// that each construct their own CLI invocation); subsequent calls are a
/// no-op rather than a panic.
pub fn init_logger() {
    let _ = env_logger::try_init();
}

pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}
