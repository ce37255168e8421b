//! Structured logging for providers.
//!
//! Every RPC handler runs inside a span named `rpc.<operation>`, and each
//! call into provider code is bracketed by `Calling provider defined ...` /
//! `Called provider defined ...` debug events. Resource and data source
//! spans carry the type name under [`KEY_RESOURCE_TYPE`] or
//! [`KEY_DATA_SOURCE_TYPE`].
//!
//! Output goes to **stderr**; stdout belongs to the plugin handshake.
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_framework::logging::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!("Starting provider");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter, for example `info` or `hemmer_provider_framework=trace`
//!
//! ```bash
//! # Trace every phase the framework runs
//! RUST_LOG=hemmer_provider_framework=trace ./my-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, util::TryInitError, EnvFilter};

/// Span field holding the resource type name of a resource RPC.
pub const KEY_RESOURCE_TYPE: &str = "tf_resource_type";

/// Span field holding the data source type name of a data source RPC.
pub const KEY_DATA_SOURCE_TYPE: &str = "tf_data_source_type";

const DEFAULT_LEVEL: &str = "info";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn install(default_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
}

/// Install the global subscriber, filtered by `RUST_LOG` and defaulting to
/// `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Like [`init_logging`], with `default_level` used when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    if let Err(err) = install(default_level) {
        panic!("failed to install the logging subscriber: {}", err);
    }
}

/// Install the global subscriber unless one is already set.
///
/// Returns `false` when a subscriber was already installed, which makes it
/// safe to call from tests.
pub fn try_init_logging() -> bool {
    install(DEFAULT_LEVEL).is_ok()
}

#[cfg(test)]
mod tests {
    // The global subscriber can be set only once per process, so
    // installation itself is exercised through try_init_logging.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("hemmer_provider_framework=trace").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_provider_framework::server=debug").is_ok());
    }

    #[test]
    fn test_try_init_logging_is_idempotent() {
        try_init_logging();
        assert!(!try_init_logging());
    }
}
