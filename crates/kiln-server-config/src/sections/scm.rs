// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Status reporting and credential selection settings.

use serde::{Deserialize, Serialize};

const DEFAULT_STATUS_CONTEXT: &str = "kiln";
const DEFAULT_API_URL: &str = "https://api.github.com/";

fn default_merge_group_contexts() -> Vec<String> {
	vec!["pull_request".to_string(), "push".to_string()]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScmConfigLayer {
	pub status_context: Option<String>,
	/// Public UI base used for status target URLs.
	pub web_address: Option<String>,
	/// Contexts a merge-group build reports under, so branch protection sees
	/// the checks it requires.
	pub merge_group_contexts: Option<Vec<String>>,
	/// Fall back to the repository owner's user token when the App is not
	/// installed.
	pub legacy_fallback: Option<bool>,
	/// REST endpoint used for legacy credentials when no GitHub App is
	/// configured. The App's `base_url` wins when it is.
	pub api_url: Option<String>,
}

impl ScmConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.status_context.is_some() {
			self.status_context = other.status_context;
		}
		if other.web_address.is_some() {
			self.web_address = other.web_address;
		}
		if other.merge_group_contexts.is_some() {
			self.merge_group_contexts = other.merge_group_contexts;
		}
		if other.legacy_fallback.is_some() {
			self.legacy_fallback = other.legacy_fallback;
		}
		if other.api_url.is_some() {
			self.api_url = other.api_url;
		}
	}

	pub fn finalize(self) -> ScmConfig {
		ScmConfig {
			status_context: self
				.status_context
				.unwrap_or_else(|| DEFAULT_STATUS_CONTEXT.to_string()),
			web_address: self
				.web_address
				.map(|s| s.trim_end_matches('/').to_string())
				.unwrap_or_default(),
			merge_group_contexts: self
				.merge_group_contexts
				.unwrap_or_else(default_merge_group_contexts),
			legacy_fallback: self.legacy_fallback.unwrap_or(true),
			api_url: self.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScmConfig {
	pub status_context: String,
	pub web_address: String,
	pub merge_group_contexts: Vec<String>,
	pub legacy_fallback: bool,
	pub api_url: String,
}

impl Default for ScmConfig {
	fn default() -> Self {
		ScmConfigLayer::default().finalize()
	}
}
