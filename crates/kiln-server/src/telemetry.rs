// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Tracing subscriber setup.

use kiln_server_config::{LogFormat, LoggingConfig};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins over `logging.level`.
fn filter(config: &LoggingConfig) -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TryInitError> {
	let registry = tracing_subscriber::registry().with(filter(config));

	match config.format {
		LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
		LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
	}
}
