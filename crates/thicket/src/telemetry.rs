//! Process-wide logging setup.
//!
//! Library code only emits `tracing` events; call [`init`] once at startup
//! to route them to stderr.

use tracing_subscriber::EnvFilter;

use crate::error::ThicketError;

/// How much the subscriber installed by [`init`] prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Fit, cache and layer progress.
    #[default]
    Normal,
    /// Per-fold, per-batch and per-tree detail.
    Verbose,
}

impl Verbosity {
    fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
        }
    }
}

/// Install a stderr `fmt` subscriber.
///
/// `RUST_LOG`, when set, overrides `verbosity`.
///
/// # Errors
///
/// [`ThicketError::Telemetry`] when a global subscriber is already set.
pub fn init(verbosity: Verbosity) -> Result<(), ThicketError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|source| ThicketError::Telemetry { source })
}
