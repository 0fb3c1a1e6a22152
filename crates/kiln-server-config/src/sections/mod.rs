// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod cache;
mod github_app;
mod logging;
mod oauth;
mod reconcile;
mod scm;

pub use cache::{CacheConfig, CacheConfigLayer};
pub use github_app::{default_permissions, GitHubAppConfig, GitHubAppConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use oauth::{OAuthConfig, OAuthConfigLayer};
pub use reconcile::{ReconcileConfig, ReconcileConfigLayer};
pub use scm::{ScmConfig, ScmConfigLayer};
