// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use kiln_common_secret::{load_secret_env, SecretString};
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	CacheConfigLayer, GitHubAppConfigLayer, LogFormat, LoggingConfigLayer, OAuthConfigLayer,
	ReconcileConfigLayer, ScmConfigLayer,
};

/// Overrides the system config file path.
pub const CONFIG_PATH_ENV: &str = "KILN_SERVER_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/kiln/server.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `$KILN_SERVER_CONFIG`, or `/etc/kiln/server.toml`.
	pub fn system() -> Self {
		Self::new(env_var(CONFIG_PATH_ENV).unwrap_or_else(|| SYSTEM_CONFIG_PATH.to_string()))
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: KILN_SERVER_<SECTION>_<FIELD>. Secrets also accept `<NAME>_FILE`.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			github_app: Some(load_github_app_from_env()?),
			oauth: Some(load_oauth_from_env()?),
			scm: Some(load_scm_from_env()?),
			cache: Some(load_cache_from_env()?),
			reconcile: Some(load_reconcile_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|s| {
		s.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	})
}

/// `checks=write,statuses=write`
fn env_permissions(name: &str) -> Result<Option<BTreeMap<String, String>>, ConfigError> {
	let Some(entries) = env_list(name) else {
		return Ok(None);
	};

	entries
		.iter()
		.map(|entry| match entry.split_once('=') {
			Some((resource, level)) if !resource.trim().is_empty() && !level.trim().is_empty() => {
				Ok((resource.trim().to_string(), level.trim().to_string()))
			}
			_ => Err(ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("expected resource=level, got '{entry}'"),
			}),
		})
		.collect::<Result<BTreeMap<_, _>, _>>()
		.map(Some)
}

fn env_secret(name: &str) -> Result<Option<SecretString>, ConfigError> {
	Ok(load_secret_env(name)?)
}

fn load_github_app_from_env() -> Result<GitHubAppConfigLayer, ConfigError> {
	Ok(GitHubAppConfigLayer {
		app_id: env_u64("KILN_SERVER_GITHUB_APP_ID")?,
		private_key: env_secret("KILN_SERVER_GITHUB_APP_PRIVATE_KEY")?,
		webhook_secret: env_secret("KILN_SERVER_GITHUB_APP_WEBHOOK_SECRET")?,
		base_url: env_var("KILN_SERVER_GITHUB_APP_BASE_URL"),
		permissions: env_permissions("KILN_SERVER_GITHUB_APP_PERMISSIONS")?,
	})
}

fn load_oauth_from_env() -> Result<OAuthConfigLayer, ConfigError> {
	Ok(OAuthConfigLayer {
		client_id: env_var("KILN_SERVER_GITHUB_CLIENT_ID"),
		client_secret: env_secret("KILN_SERVER_GITHUB_CLIENT_SECRET")?,
		redirect_uri: env_var("KILN_SERVER_GITHUB_REDIRECT_URI"),
		web_url: env_var("KILN_SERVER_GITHUB_WEB_URL"),
		api_url: env_var("KILN_SERVER_GITHUB_API_URL"),
		scopes: env_list("KILN_SERVER_GITHUB_SCOPES"),
	})
}

fn load_scm_from_env() -> Result<ScmConfigLayer, ConfigError> {
	Ok(ScmConfigLayer {
		status_context: env_var("KILN_SERVER_STATUS_CONTEXT"),
		web_address: env_var("KILN_SERVER_WEB_ADDRESS"),
		merge_group_contexts: env_list("KILN_SERVER_MERGE_GROUP_CONTEXTS"),
		legacy_fallback: env_bool("KILN_SERVER_SCM_LEGACY_FALLBACK"),
		api_url: env_var("KILN_SERVER_SCM_API_URL"),
	})
}

fn load_cache_from_env() -> Result<CacheConfigLayer, ConfigError> {
	Ok(CacheConfigLayer {
		token_key: env_secret("KILN_SERVER_CACHE_TOKEN_KEY")?,
		approval_timeout_minutes: env_u64("KILN_SERVER_CACHE_APPROVAL_TIMEOUT_MINUTES")?,
		grace_minutes: env_u64("KILN_SERVER_CACHE_GRACE_MINUTES")?,
	})
}

fn load_reconcile_from_env() -> Result<ReconcileConfigLayer, ConfigError> {
	Ok(ReconcileConfigLayer {
		max_attempts: env_u32("KILN_SERVER_RECONCILE_MAX_ATTEMPTS")?,
		backoff_seconds: env_u64("KILN_SERVER_RECONCILE_BACKOFF_SECONDS")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("KILN_SERVER_LOG_FORMAT") {
		Some(v) => Some(v.parse::<LogFormat>().map_err(|()| ConfigError::InvalidValue {
			key: "KILN_SERVER_LOG_FORMAT".to_string(),
			message: format!("expected 'pretty' or 'json', got '{v}'"),
		})?),
		None => None,
	};

	Ok(LoggingConfigLayer {
		level: env_var("KILN_SERVER_LOG_LEVEL"),
		format,
	})
}
