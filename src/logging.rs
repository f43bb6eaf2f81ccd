//! Tracing subscriber setup shared by the binaries.
//!
//! Development builds log in the human-readable format; every other
//! environment emits one JSON object per line. `RUST_LOG` overrides the
//! level derived from `LOG_LEVEL`. Records emitted through the `log` facade
//! are forwarded to the same subscriber.

use tracing_subscriber::EnvFilter;

use crate::config::{AppEnv, Settings};

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&settings.log_level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match settings.app_env {
        AppEnv::Development => builder.try_init(),
        AppEnv::Production | AppEnv::Testing => builder.json().try_init(),
    };

    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}

/// Map a `LOG_LEVEL` value (Python-style names accepted) to filter directives.
pub fn default_directives(log_level: &str) -> String {
    let level = match log_level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    };
    format!("{level},hyper=warn,reqwest=warn")
}
