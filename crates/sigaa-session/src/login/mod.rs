// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Login state machine.
//!
//! ```text
//! Unauthenticated -> FormFetched -> Submitted -> Authenticated
//!                         ^             |
//!                         +-- retry ----+   (once, transient failures only)
//! ```
//!
//! Each institution supplies the form location, how credentials are laid
//! into the form, the marker that identifies a page still showing the login
//! form, and the landing step run after success.

pub mod challenge;
pub mod desktop;
pub mod ifsc;

pub use challenge::{Challenge, ChallengeSolver};

use crate::error::{Result, SigaaError};
use crate::institution::Institution;
use crate::session::form::HtmlForm;
use crate::session::{lock, Page, RequestOptions, Session, SigaaHttp};
use serde::Serialize;
use std::sync::{Arc, Mutex};

pub const INVALID_CREDENTIALS_MARKER: &str = "Usuário e/ou senha inválidos";
pub const CHALLENGE_FAILED_MARKER: &str = "Falha na verificação do reCAPTCHA";
pub const SUSPICIOUS_BEHAVIOR_MARKER: &str = "comportamento suspeito";

/// Observable step of the login state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    Unauthenticated,
    FormFetched,
    Submitted,
    Authenticated,
}

/// Institution-specific login variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlow {
    /// Mobile form followed by the home-page jump (IFSC).
    Mobile,
    /// Desktop `logon.jsf` form.
    Desktop,
}

impl LoginFlow {
    pub fn for_institution(institution: Institution) -> Self {
        match institution {
            Institution::Ifsc => LoginFlow::Mobile,
            Institution::Ufpb | Institution::Unb | Institution::Uffs => LoginFlow::Desktop,
        }
    }

    fn form_path(self) -> &'static str {
        match self {
            LoginFlow::Mobile => ifsc::FORM_PATH,
            LoginFlow::Desktop => desktop::FORM_PATH,
        }
    }

    fn form_selector(self) -> &'static str {
        match self {
            LoginFlow::Mobile => ifsc::FORM_SELECTOR,
            LoginFlow::Desktop => desktop::FORM_SELECTOR,
        }
    }

    fn form_options(self) -> RequestOptions {
        match self {
            LoginFlow::Mobile => RequestOptions::mobile().with_no_cache(),
            LoginFlow::Desktop => RequestOptions::no_cache(),
        }
    }

    fn login_marker(self) -> &'static str {
        match self {
            LoginFlow::Mobile => ifsc::LOGIN_MARKER,
            LoginFlow::Desktop => desktop::LOGIN_MARKER,
        }
    }

    fn fill(self, form: HtmlForm, username: &str, password: &str) -> Result<HtmlForm> {
        match self {
            LoginFlow::Mobile => ifsc::fill(form, username, password),
            LoginFlow::Desktop => Ok(desktop::fill(form, username, password)),
        }
    }

    /// Classify the page reached after submitting the form.
    pub fn classify(self, page: &Page) -> Result<()> {
        if page.contains(SUSPICIOUS_BEHAVIOR_MARKER) {
            return Err(SigaaError::SuspiciousBehaviorDetected);
        }
        if page.contains(CHALLENGE_FAILED_MARKER) {
            return Err(SigaaError::ChallengeFailed);
        }
        if page.contains(self.login_marker()) {
            if page.contains(INVALID_CREDENTIALS_MARKER) {
                return Err(SigaaError::InvalidCredentials);
            }
            return Err(SigaaError::UnrecognizedLoginResponse);
        }
        Ok(())
    }
}

/// Drives authentication for one session.
pub struct Login {
    http: SigaaHttp,
    session: Arc<Session>,
    flow: LoginFlow,
    state: Mutex<LoginState>,
    /// Form page returned with an invalid-credentials error, reused by the
    /// next attempt.
    form_page: Mutex<Option<Arc<Page>>>,
}

impl Login {
    pub fn new(http: SigaaHttp, session: Arc<Session>) -> Self {
        let flow = LoginFlow::for_institution(session.institution());
        Self {
            http,
            session,
            flow,
            state: Mutex::new(LoginState::Unauthenticated),
            form_page: Mutex::new(None),
        }
    }

    pub fn flow(&self) -> LoginFlow {
        self.flow
    }

    pub fn state(&self) -> LoginState {
        *lock(&self.state)
    }

    fn set_state(&self, state: LoginState) {
        *lock(&self.state) = state;
    }

    /// Authenticate and return the landing page.
    ///
    /// Transient failures are retried once. Invalid credentials, a
    /// suspicious-behavior verdict and malformed forms are not.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        solver: Option<&dyn ChallengeSolver>,
    ) -> Result<Arc<Page>> {
        if self.session.is_authenticated() {
            return Err(SigaaError::AlreadyAuthenticated);
        }

        let mut retry = true;
        loop {
            match self.attempt(username, password, solver).await {
                Ok(page) => return Ok(page),
                Err(err) => {
                    if self.session.is_authenticated() {
                        return Err(err);
                    }
                    self.set_state(LoginState::Unauthenticated);
                    if retry && err.is_retryable_login() {
                        tracing::warn!(institution = %self.session.institution(), "login attempt failed, retrying: {err}");
                        retry = false;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        username: &str,
        password: &str,
        solver: Option<&dyn ChallengeSolver>,
    ) -> Result<Arc<Page>> {
        let stored = lock(&self.form_page).take();
        let form_page = match stored {
            Some(page) => page,
            None => {
                self.http
                    .get(self.flow.form_path(), self.flow.form_options())
                    .await?
            }
        };
        self.set_state(LoginState::FormFetched);

        let form = HtmlForm::parse(&form_page, self.flow.form_selector())?;
        let mut form = self.flow.fill(form, username, password)?;
        if let Some(challenge) = Challenge::detect(&form_page) {
            let solver = solver.ok_or(SigaaError::ChallengeSolverRequired)?;
            let token = solver.solve(&challenge.site_key, &challenge.action).await?;
            form.set(challenge::TOKEN_FIELD, token);
        }

        let submitted = self
            .http
            .post(form.action.as_str(), &form.post_values(), RequestOptions::no_cache())
            .await?;
        self.set_state(LoginState::Submitted);
        let result = self
            .http
            .follow_all_redirect(submitted, RequestOptions::no_cache())
            .await?;

        if let Err(err) = self.flow.classify(&result) {
            if matches!(err, SigaaError::InvalidCredentials) {
                *lock(&self.form_page) = Some(result);
            }
            return Err(err);
        }

        self.session.mark_authenticated();
        self.set_state(LoginState::Authenticated);
        tracing::info!(institution = %self.session.institution(), "login succeeded");

        match self.flow {
            LoginFlow::Mobile => ifsc::land(&self.http).await,
            LoginFlow::Desktop => Ok(result),
        }
    }
}
