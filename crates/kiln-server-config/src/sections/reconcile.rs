// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Installation reconciler retry settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_SECONDS: u64 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReconcileConfigLayer {
	pub max_attempts: Option<u32>,
	/// Base delay; attempt `n` waits `n - 1` times this.
	pub backoff_seconds: Option<u64>,
}

impl ReconcileConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.max_attempts.is_some() {
			self.max_attempts = other.max_attempts;
		}
		if other.backoff_seconds.is_some() {
			self.backoff_seconds = other.backoff_seconds;
		}
	}

	pub fn finalize(self) -> ReconcileConfig {
		ReconcileConfig {
			max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
			backoff_seconds: self.backoff_seconds.unwrap_or(DEFAULT_BACKOFF_SECONDS),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileConfig {
	pub max_attempts: u32,
	pub backoff_seconds: u64,
}

impl ReconcileConfig {
	pub fn backoff(&self) -> Duration {
		Duration::from_secs(self.backoff_seconds)
	}
}

impl Default for ReconcileConfig {
	fn default() -> Self {
		ReconcileConfigLayer::default().finalize()
	}
}
