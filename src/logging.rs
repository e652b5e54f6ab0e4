//! Logging setup for the provider.
//!
//! Logs go to **stderr**: the plugin host owns stdout. Filtering follows
//! `RUST_LOG` first; when it is unset the Terraform `TF_LOG` level is mapped
//! onto the closest `tracing` level so that `TF_LOG=DEBUG terraform apply`
//! surfaces provider logs too.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: standard `tracing` filter (e.g. `infisical_provider=debug`)
//! - `TF_LOG`: Terraform log level (`TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`)

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the default logging subscriber.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level, used when neither
/// `RUST_LOG` nor `TF_LOG` is set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if already initialized.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(build_filter(default_level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
}

fn build_filter(default_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = std::env::var("TF_LOG")
        .ok()
        .and_then(|value| tf_log_level(&value))
        .unwrap_or(default_level);
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Map a Terraform `TF_LOG` value onto a `tracing` level directive.
fn tf_log_level(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_uppercase().as_str() {
        "TRACE" | "JSON" => Some("trace"),
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARN" => Some("warn"),
        "ERROR" => Some("error"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only the
    // filter plumbing is tested here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("infisical_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,infisical_provider=trace").is_ok());
    }

    #[test]
    fn test_tf_log_mapping() {
        assert_eq!(tf_log_level("DEBUG"), Some("debug"));
        assert_eq!(tf_log_level(" trace "), Some("trace"));
        assert_eq!(tf_log_level("json"), Some("trace"));
        assert_eq!(tf_log_level("ERROR"), Some("error"));
        assert_eq!(tf_log_level("off"), None);
        assert_eq!(tf_log_level(""), None);
    }
}
