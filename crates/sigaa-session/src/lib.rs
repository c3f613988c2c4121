// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! SIGAA session layer: a sequential-looking HTTP client for SIGAA academic
//! portals that serializes and deduplicates requests per host, caches
//! idempotent pages, tracks cookies and drives the institution login flows.

pub mod client;
pub mod config;
pub mod courses;
pub mod error;
pub mod institution;
pub mod login;
pub mod search;
pub mod session;

pub use client::Sigaa;
pub use config::SessionConfig;
pub use error::{Result, SigaaError};
pub use institution::Institution;
pub use login::{ChallengeSolver, LoginState};
pub use session::{LoginStatus, Page, RequestOptions};
