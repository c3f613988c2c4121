// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Client facade wiring configuration, session, transport, login, search and
//! course interning together.

use crate::config::SessionConfig;
use crate::courses::CourseFactory;
use crate::error::Result;
use crate::institution::{Institution, InstitutionController};
use crate::login::{ChallengeSolver, Login, LoginState};
use crate::search::Search;
use crate::session::{CookieStore, HttpSession, Page, Session, SigaaHttp, SigaaHttpSession};
use std::sync::Arc;

/// Session cookie issued by the portal.
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// A connection to one SIGAA portal.
pub struct Sigaa {
    config: SessionConfig,
    session: Arc<Session>,
    http_session: Arc<SigaaHttpSession>,
    http: SigaaHttp,
    login: Login,
    search: Search,
    course_factory: CourseFactory,
}

impl Sigaa {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_cookie_store(config, Arc::new(CookieStore::new()))
    }

    /// Build a client on top of an existing (possibly pre-seeded) cookie store.
    pub fn with_cookie_store(config: SessionConfig, cookies: Arc<CookieStore>) -> Result<Self> {
        let institution = config.resolved_institution()?;
        let controller = InstitutionController::new(institution, config.base_url()?);
        let session = Arc::new(Session::new(institution));
        let http_session = Arc::new(SigaaHttpSession::new(controller, &config, cookies));
        let hooks: Arc<dyn HttpSession> = http_session.clone();
        let http = SigaaHttp::new(hooks, &config)?;

        tracing::debug!(%institution, url = %config.url, "session created");
        Ok(Self {
            login: Login::new(http.clone(), Arc::clone(&session)),
            search: Search::new(http.clone(), institution),
            course_factory: CourseFactory::new(),
            config,
            session,
            http_session,
            http,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn institution(&self) -> Institution {
        self.session.institution()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn http(&self) -> &SigaaHttp {
        &self.http
    }

    pub fn http_session(&self) -> &Arc<SigaaHttpSession> {
        &self.http_session
    }

    pub fn cookies(&self) -> &Arc<CookieStore> {
        self.http_session.cookies()
    }

    /// Resume a session obtained elsewhere by seeding its session cookie.
    pub fn resume_session(&self, session_id: &str) {
        self.cookies().store_cookies(
            self.http_session.host(),
            &[format!("{SESSION_COOKIE}={session_id}; Path=/")],
        );
    }

    /// Log in and return the landing page.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        solver: Option<&dyn ChallengeSolver>,
    ) -> Result<Arc<Page>> {
        self.login.login(username, password, solver).await
    }

    pub fn login_state(&self) -> LoginState {
        self.login.state()
    }

    pub fn search(&self) -> &Search {
        &self.search
    }

    pub fn course_factory(&self) -> &CourseFactory {
        &self.course_factory
    }

    /// Flush cookies, cached pages and interned courses. Requests made
    /// afterwards fail with `SessionClosed`.
    pub fn close(&self) {
        self.http_session.close();
        self.course_factory.clear();
        tracing::debug!(institution = %self.institution(), "session closed");
    }
}
