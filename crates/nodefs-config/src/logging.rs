//! Structured logging utilities for nodefs components.
//!
//! Provides consistent logging with component tags and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use nodefs_config::log_tree_info;
//!
//! log_tree_info!("Created directory", node_id = id.as_str());
//! log_lookup_debug!("Following reference", target = target.as_str());
//! ```

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// === TREE logging macros ===

#[macro_export]
macro_rules! log_tree_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "TREE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_tree_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "TREE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_tree_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "TREE", $($key = $value,)* $msg)
    };
}

// === LOOKUP logging macros ===

#[macro_export]
macro_rules! log_lookup_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "LOOKUP", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_lookup_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "LOOKUP", $($key = $value,)* $msg)
    };
}

// === NODE logging macros ===

#[macro_export]
macro_rules! log_node_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "NODE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_node_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "NODE", $($key = $value,)* $msg)
    };
}

// === GRANT logging macros ===

#[macro_export]
macro_rules! log_grant_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "GRANT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_grant_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "GRANT", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `NODEFS_LOG` takes precedence over `RUST_LOG`; both fall back to `level`.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env_filter = EnvFilter::try_from_env("NODEFS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand() {
        // No subscriber installed: the macros must still compile and be no-ops.
        log_tree_debug!("debug", node_id = "n1");
        log_lookup_warn!("warn", segment = "docs");
        log_grant_debug!("grant", principal = "u:alice");
    }
}
