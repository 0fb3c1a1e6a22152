// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub App configuration section.

use std::collections::BTreeMap;

use kiln_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

const SECTION: &str = "github_app";
const DEFAULT_BASE_URL: &str = "https://api.github.com/";

/// Installation-token permissions the status reporter needs.
pub fn default_permissions() -> BTreeMap<String, String> {
	[
		("checks", "write"),
		("contents", "read"),
		("deployments", "write"),
		("statuses", "write"),
	]
	.into_iter()
	.map(|(resource, level)| (resource.to_string(), level.to_string()))
	.collect()
}

/// Configuration layer for GitHub App (all fields optional for layering).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubAppConfigLayer {
	/// GitHub App numeric ID.
	pub app_id: Option<u64>,
	/// PEM-encoded RSA private key for signing app assertions.
	#[serde(skip_serializing)]
	pub private_key: Option<SecretString>,
	/// Secret for webhook signature verification.
	#[serde(skip_serializing)]
	pub webhook_secret: Option<SecretString>,
	/// Base URL for the GitHub REST API.
	pub base_url: Option<String>,
	/// Resource to access level, e.g. `checks = "write"`.
	pub permissions: Option<BTreeMap<String, String>>,
}

impl GitHubAppConfigLayer {
	/// Merge with another layer, preferring values from `other`.
	pub fn merge(&mut self, other: GitHubAppConfigLayer) {
		if other.app_id.is_some() {
			self.app_id = other.app_id;
		}
		if other.private_key.is_some() {
			self.private_key = other.private_key;
		}
		if other.webhook_secret.is_some() {
			self.webhook_secret = other.webhook_secret;
		}
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if other.permissions.is_some() {
			self.permissions = other.permissions;
		}
	}

	pub fn is_configured(&self) -> bool {
		self.app_id.is_some()
	}

	/// Build the final config, returning `None` when neither the app id nor
	/// the key is set. A half-configured app is an error.
	pub fn build(self) -> Result<Option<GitHubAppConfig>, ConfigError> {
		if self.app_id.is_none() && self.private_key.is_none() {
			return Ok(None);
		}

		let app_id = self
			.app_id
			.ok_or_else(|| ConfigError::validation(SECTION, "app_id is required with private_key"))?;

		let private_key = self
			.private_key
			.ok_or_else(|| ConfigError::validation(SECTION, "private_key is required with app_id"))?;

		if private_key.is_blank() {
			return Err(ConfigError::validation(SECTION, "private_key cannot be empty"));
		}

		let base_url = validate_base_url(
			self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
		)?;

		Ok(Some(GitHubAppConfig {
			app_id,
			private_key,
			webhook_secret: self.webhook_secret.filter(|s| !s.is_blank()),
			base_url,
			permissions: self.permissions.unwrap_or_else(default_permissions),
		}))
	}
}

fn validate_base_url(raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
		key: "github_app.base_url".to_string(),
		message: e.to_string(),
	})?;

	if url.scheme() != "https" {
		return Err(ConfigError::validation(
			SECTION,
			format!("base_url must use HTTPS, got: {raw}"),
		));
	}

	Ok(url)
}

/// Validated GitHub App configuration.
#[derive(Debug, Clone)]
pub struct GitHubAppConfig {
	app_id: u64,
	private_key: SecretString,
	webhook_secret: Option<SecretString>,
	base_url: Url,
	permissions: BTreeMap<String, String>,
}

impl GitHubAppConfig {
	pub fn app_id(&self) -> u64 {
		self.app_id
	}

	pub fn private_key(&self) -> &SecretString {
		&self.private_key
	}

	pub fn webhook_secret(&self) -> Option<&SecretString> {
		self.webhook_secret.as_ref()
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	pub fn permissions(&self) -> &BTreeMap<String, String> {
		&self.permissions
	}
}
