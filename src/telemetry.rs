// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Logging initialisation shared by every binary.
//!
//! Format: timestamp file:line LEVEL message
//! Example: `2026-01-12T08:15:00.123456Z registry.rs:152 INFO Generating registry CA`
//!
//! - `RUST_LOG` wins when set; otherwise the `--server.log-level` value, else `info`
//! - `RUST_LOG_FORMAT=json` selects JSON output, anything else compact text

use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset.
#[must_use]
pub fn default_directive(log_level: Option<&str>) -> String {
    log_level
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map_or_else(|| "info".to_string(), str::to_lowercase)
}

/// Whether `RUST_LOG_FORMAT` asks for JSON.
#[must_use]
pub fn is_json_format(format: Option<&str>) -> bool {
    format.is_some_and(|format| format.eq_ignore_ascii_case("json"))
}

/// Install the global tracing subscriber.
///
/// Must be called once per process, before any log statement.
pub fn init_logging(log_level: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));

    let log_format = std::env::var("RUST_LOG_FORMAT").ok();

    if is_json_format(log_format.as_deref()) {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_target(false)
            .with_ansi(true)
            .compact()
            .init();
    }
}
