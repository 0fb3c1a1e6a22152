// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the Kiln server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`KILN_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use kiln_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("status context: {}", config.scm.status_context);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub github_app: Option<GitHubAppConfig>,
	pub oauth: Option<OAuthConfig>,
	pub scm: ScmConfig,
	pub cache: CacheConfig,
	pub reconcile: ReconcileConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`KILN_SERVER_*`)
/// 2. Config file (`$KILN_SERVER_CONFIG`, default `/etc/kiln/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	let mut merged = ServerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let github_app = match layer.github_app {
		Some(l) => l.build()?,
		None => None,
	};
	let oauth = match layer.oauth {
		Some(l) => l.build()?,
		None => None,
	};
	let scm = layer.scm.unwrap_or_default().finalize();
	let cache = layer.cache.unwrap_or_default().finalize();
	let reconcile = layer.reconcile.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	info!(
		github_app_configured = github_app.is_some(),
		webhook_secret_configured = github_app
			.as_ref()
			.is_some_and(|app| app.webhook_secret().is_some()),
		oauth_configured = oauth.is_some(),
		status_context = %scm.status_context,
		legacy_fallback = scm.legacy_fallback,
		reconcile_max_attempts = reconcile.max_attempts,
		log_format = logging.format.as_str(),
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		github_app,
		oauth,
		scm,
		cache,
		reconcile,
		logging,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use kiln_common_secret::SecretString;

	#[test]
	fn test_finalize_empty_layer_uses_defaults() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert!(config.github_app.is_none());
		assert!(config.oauth.is_none());
		assert_eq!(config.scm.status_context, "kiln");
		assert_eq!(config.reconcile.max_attempts, 3);
		assert_eq!(config.cache.grace_minutes, 5);
		assert_eq!(config.logging.level, "info");
	}

	#[test]
	fn test_finalize_propagates_section_errors() {
		let layer = ServerConfigLayer {
			github_app: Some(GitHubAppConfigLayer {
				app_id: Some(7),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(matches!(finalize(layer), Err(ConfigError::Validation { section: "github_app", .. })));
	}

	#[test]
	fn test_finalize_github_app() {
		let layer = ServerConfigLayer {
			github_app: Some(GitHubAppConfigLayer {
				app_id: Some(7),
				private_key: Some(SecretString::from("pem")),
				webhook_secret: Some(SecretString::from("whsec")),
				..Default::default()
			}),
			..Default::default()
		};
		let config = finalize(layer).unwrap();
		let app = config.github_app.unwrap();
		assert_eq!(app.app_id(), 7);
		assert_eq!(app.webhook_secret().map(|s| s.expose().as_str()), Some("whsec"));
	}

	#[test]
	fn test_file_layer_overrides_defaults() {
		use std::io::Write;

		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[scm]
web_address = "https://ci.example.com/"

[logging]
format = "json"
"#
		)
		.unwrap();

		let config = load_from_sources(vec![
			Box::new(TomlSource::new(file.path())),
			Box::new(DefaultsSource),
		])
		.unwrap();
		assert_eq!(config.scm.web_address, "https://ci.example.com");
		assert_eq!(config.logging.format, LogFormat::Json);
	}
}
