// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Logging init. Depends on nothing but `tracing`/`tracing-subscriber` so
//! that every other crate — including `archon-types` — can be instrumented
//! without a circular dependency back onto this one.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for local development.
    Pretty,
    /// Newline-delimited JSON, for production log aggregation.
    Json,
}

/// Installs the global `tracing` subscriber. Respects `RUST_LOG` via
/// `EnvFilter`, defaulting to `info` when unset. Halt transitions, chain
/// violations, and terminal events are logged at `error!`/`warn!` by their
/// owning modules regardless of this default (§1.1 of SPEC_FULL.md).
pub fn init(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => {
            registry.with(fmt::layer().pretty()).init();
        }
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_current_span(true)).init();
        }
    }
}
