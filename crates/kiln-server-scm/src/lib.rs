// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Source-control integration for Kiln.
//!
//! - [`WebhookNormalizer`]: raw GitHub deliveries to [`NormalizedEvent`]s
//! - [`InstallationReconciler`]: installation events to repository links
//! - [`StatusReporter`]: build and step status to check runs, commit
//!   statuses or deployment statuses

pub mod error;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod types;
pub mod webhook;

pub use error::{ReconcileError, RepoFailure, ReportError, StoreError};
pub use reconcile::InstallationReconciler;
pub use status::{BuildState, BuildStatus, RepoRef, StatusReporter, StatusSettings, StepState};
pub use store::{HookRecord, MemoryScmStore, ScmStore, StoredRepo};
pub use types::{
	Build, Deployment, Hook, HookStatus, Installation, NormalizedEvent, PullRequest, Repo,
};
pub use webhook::{ParseError, WebhookNormalizer};
