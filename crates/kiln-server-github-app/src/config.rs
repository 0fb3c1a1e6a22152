// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration for the GitHub App client.

use std::collections::BTreeMap;

use kiln_common_secret::SecretString;
use url::Url;

use crate::error::GithubAppError;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com/";

/// Permissions requested for installation tokens used by the status reporter.
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

/// GitHub App identity plus the API endpoint it talks to.
///
/// The private key and webhook secret are [`SecretString`]s and print as
/// `[REDACTED]`.
#[derive(Clone)]
pub struct GithubAppConfig {
	app_id: u64,
	private_key_pem: SecretString,
	webhook_secret: Option<SecretString>,
	base_url: Url,
	permissions: BTreeMap<String, String>,
}

impl std::fmt::Debug for GithubAppConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GithubAppConfig")
			.field("app_id", &self.app_id)
			.field("private_key_pem", &self.private_key_pem)
			.field("webhook_secret", &self.webhook_secret)
			.field("base_url", &self.base_url.as_str())
			.field("permissions", &self.permissions)
			.finish()
	}
}

impl GithubAppConfig {
	pub fn new(app_id: u64, private_key_pem: SecretString) -> Self {
		Self {
			app_id,
			private_key_pem,
			webhook_secret: None,
			base_url: Url::parse(DEFAULT_BASE_URL).expect("default URL is valid"),
			permissions: default_permissions(),
		}
	}

	/// Parse and validate an API base URL.
	///
	/// GitHub Enterprise hosts look like `https://ghe.example.com/api/v3`. The
	/// URL must be HTTPS, must not point at loopback, and gains a trailing
	/// slash so relative joins keep the `/api/v3` prefix.
	pub fn validate_base_url(raw: &str) -> Result<Url, GithubAppError> {
		let url = Url::parse(raw)
			.map_err(|e| GithubAppError::Config(format!("invalid GitHub base URL '{raw}': {e}")))?;

		if url.scheme() != "https" {
			return Err(GithubAppError::Config(format!(
				"GitHub base URL must use https, got '{}'",
				url.scheme()
			)));
		}

		let host = url
			.host_str()
			.ok_or_else(|| GithubAppError::Config("GitHub base URL must include a host".to_string()))?;

		if matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1") {
			return Err(GithubAppError::Config(
				"GitHub base URL must not be localhost".to_string(),
			));
		}

		Ok(with_trailing_slash(url))
	}

	pub fn with_base_url(mut self, raw: &str) -> Result<Self, GithubAppError> {
		self.base_url = Self::validate_base_url(raw)?;
		Ok(self)
	}

	/// Point the client at an arbitrary endpoint without the HTTPS check.
	/// Only mock servers in tests should need this.
	pub fn with_unchecked_base_url(mut self, url: Url) -> Self {
		self.base_url = with_trailing_slash(url);
		self
	}

	pub fn with_webhook_secret(mut self, secret: SecretString) -> Self {
		self.webhook_secret = Some(secret);
		self
	}

	pub fn with_permissions(mut self, permissions: BTreeMap<String, String>) -> Self {
		self.permissions = permissions;
		self
	}

	pub fn app_id(&self) -> u64 {
		self.app_id
	}

	pub fn private_key_pem(&self) -> &SecretString {
		&self.private_key_pem
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

fn with_trailing_slash(mut url: Url) -> Url {
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());
		url.set_path(&path);
	}
	url
}
