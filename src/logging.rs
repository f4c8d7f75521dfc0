// ABOUTME: Structured logging setup for the token authority
// ABOUTME: tracing-subscriber with env-filter and optional JSON output
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Logging initialization.
//!
//! State-machine failures are logged here with full detail (which invariant
//! failed, for which client) while the wire response stays generic; the log
//! stream is the only place that detail exists.

use anyhow::Result;
use std::env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output for development
    #[default]
    Pretty,
    /// Newline-delimited JSON for log shippers
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match env::var("MINTGATE_LOG_FORMAT").as_deref() {
            Ok("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Filter directives come from `RUST_LOG` (default `info`); format from
/// `MINTGATE_LOG_FORMAT` (`pretty` or `json`).
///
/// # Errors
/// Returns an error if a subscriber is already installed.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match LogFormat::from_env() {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true))
                .try_init()?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_target(true))
                .try_init()?;
        }
    }

    Ok(())
}
