// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session state: cookies, page cache, request lanes and the hooks the
//! transport calls around every network request.

pub mod cache;
pub mod cookies;
pub mod form;
pub mod http;
pub mod http_session;
pub mod page;
pub mod request;
pub mod stack;

pub use cache::PageCache;
pub use cookies::{CookieEntry, CookieStore};
pub use http::{DownloadProgress, ProgressCallback, SigaaHttp};
pub use http_session::{Gate, HttpSession, InFlight, SigaaHttpSession};
pub use page::Page;
pub use request::{HttpMethod, RequestBody, RequestKey, RequestOptions};

use crate::institution::Institution;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// None of the guarded state can be left half-updated by a panic, so the
/// poison flag carries no information here.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Authentication status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Unauthenticated,
    Authenticated,
}

/// Process-scoped state bound to one institution.
///
/// The login status only ever moves from `Unauthenticated` to
/// `Authenticated`.
#[derive(Debug)]
pub struct Session {
    institution: Institution,
    status: Mutex<LoginStatus>,
}

impl Session {
    pub fn new(institution: Institution) -> Self {
        Self {
            institution,
            status: Mutex::new(LoginStatus::Unauthenticated),
        }
    }

    pub fn institution(&self) -> Institution {
        self.institution
    }

    pub fn login_status(&self) -> LoginStatus {
        *lock(&self.status)
    }

    pub fn is_authenticated(&self) -> bool {
        self.login_status() == LoginStatus::Authenticated
    }

    /// Record a successful login. Returns `false` if the session was
    /// already authenticated.
    pub fn mark_authenticated(&self) -> bool {
        let mut status = lock(&self.status);
        let changed = *status == LoginStatus::Unauthenticated;
        *status = LoginStatus::Authenticated;
        changed
    }
}
