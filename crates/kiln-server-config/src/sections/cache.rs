// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Install-token cache settings.

use std::time::Duration;

use kiln_common_secret::SecretString;
use serde::{Deserialize, Serialize};

const DEFAULT_APPROVAL_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;
const DEFAULT_GRACE_MINUTES: u64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfigLayer {
	/// HMAC key for token cache keys.
	#[serde(skip_serializing)]
	pub token_key: Option<SecretString>,
	/// How long a build may wait for approval before it starts.
	pub approval_timeout_minutes: Option<u64>,
	pub grace_minutes: Option<u64>,
}

impl CacheConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.token_key.is_some() {
			self.token_key = other.token_key;
		}
		if other.approval_timeout_minutes.is_some() {
			self.approval_timeout_minutes = other.approval_timeout_minutes;
		}
		if other.grace_minutes.is_some() {
			self.grace_minutes = other.grace_minutes;
		}
	}

	pub fn finalize(self) -> CacheConfig {
		CacheConfig {
			token_key: self.token_key.filter(|k| !k.is_blank()),
			approval_timeout_minutes: self
				.approval_timeout_minutes
				.unwrap_or(DEFAULT_APPROVAL_TIMEOUT_MINUTES),
			grace_minutes: self.grace_minutes.unwrap_or(DEFAULT_GRACE_MINUTES),
		}
	}
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
	/// `None` means a per-process key is generated at startup.
	pub token_key: Option<SecretString>,
	pub approval_timeout_minutes: u64,
	pub grace_minutes: u64,
}

impl CacheConfig {
	pub fn approval_timeout(&self) -> Duration {
		Duration::from_secs(self.approval_timeout_minutes * 60)
	}

	pub fn grace(&self) -> Duration {
		Duration::from_secs(self.grace_minutes * 60)
	}
}

impl Default for CacheConfig {
	fn default() -> Self {
		CacheConfigLayer::default().finalize()
	}
}
