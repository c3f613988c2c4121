// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! The hooks a transport calls around each network request.
//!
//! ```text
//! transport                         SigaaHttpSession
//! ---------                         ----------------
//! get_url(path)             ---->   resolve against the portal base URL
//! after_http_options(...)   ---->   inject Cookie / mobile User-Agent
//! before_request(key)       ---->   cache hit?  -> Gate::Cached
//!                                   join?       -> Gate::Shared
//!                                   lane turn   -> Gate::Proceed(InFlight)
//! <network call>
//! after_successful_request  ---->   cookies, cache, resolve waiters
//! after_unsuccessful_request --->   reject waiters
//! ```
//!
//! Downloads take a shorter path: `before_download_request` only waits for
//! a lane turn (no cache, no sharing) and `after_download_request` records
//! cookies and releases the lane. The body streams to disk and never
//! becomes a [`Page`].

use super::cache::PageCache;
use super::cookies::CookieStore;
use super::lock;
use super::page::Page;
use super::request::{RequestKey, RequestOptions};
use super::stack::{join_shared, LaneKind, LaneTurn, RequestStackController};
use crate::config::SessionConfig;
use crate::error::{Result, SigaaError};
use crate::institution::{Institution, InstitutionController};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// Outcome of [`HttpSession::before_request`].
#[derive(Debug)]
pub enum Gate {
    /// Fresh page from the cache. No network call.
    Cached(Arc<Page>),
    /// Page produced by an identical request that was already pending.
    Shared(Arc<Page>),
    /// The lane is ours: perform the network call, then report back.
    Proceed(InFlight),
}

/// Lifecycle hooks of an HTTP session.
#[async_trait]
pub trait HttpSession: Send + Sync {
    fn institution(&self) -> Institution;

    /// Resolve `path` against the portal base URL.
    fn get_url(&self, path: &str) -> Result<Url>;

    /// Adjust outgoing headers before the request identity is fixed.
    fn after_http_options(
        &self,
        url: &Url,
        headers: &mut BTreeMap<String, String>,
        options: RequestOptions,
    ) -> Result<()>;

    /// Decide whether the network call happens at all.
    async fn before_request(&self, key: &RequestKey, options: RequestOptions) -> Result<Gate>;

    /// Record a response and hand it to every waiter of the request.
    fn after_successful_request(&self, page: Page) -> Arc<Page>;

    /// Reject every waiter of `key`; returns the error to re-raise.
    fn after_unsuccessful_request(&self, error: SigaaError, key: &RequestKey) -> SigaaError;

    /// Wait for a lane turn for a file download. Downloads bypass the page
    /// cache and are never shared.
    async fn before_download_request(&self, key: &RequestKey) -> Result<InFlight>;

    /// Record the cookies of a finished download response and release its
    /// lane turn.
    fn after_download_request(&self, key: &RequestKey, headers: &[(String, String)]);

    /// Flush cookies and cache. Later requests fail with `SessionClosed`.
    fn close(&self);
}

struct Tracker {
    id: u64,
    key: RequestKey,
    turn: LaneTurn<RequestKey, Arc<Page>>,
}

type Trackers = Arc<Mutex<Vec<Tracker>>>;

/// Network-call permission handed out by [`Gate::Proceed`].
///
/// Dropping it before the after-hooks ran releases the lane, and callers
/// that joined the request see [`SigaaError::RequestAbandoned`].
pub struct InFlight {
    id: u64,
    trackers: Trackers,
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight").field("id", &self.id).finish()
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let abandoned = {
            let mut trackers = lock(&self.trackers);
            trackers
                .iter()
                .position(|t| t.id == self.id)
                .map(|pos| trackers.remove(pos))
        };
        if let Some(tracker) = abandoned {
            tracing::debug!(request = %tracker.key, "in-flight request dropped");
        }
    }
}

/// Session hooks backed by a cookie store, a page cache and per-host lanes.
pub struct SigaaHttpSession {
    institution: InstitutionController,
    cookies: Arc<CookieStore>,
    cache: PageCache,
    stacks: RequestStackController<Arc<Page>>,
    trackers: Trackers,
    next_tracker: AtomicU64,
    closed: AtomicBool,
    mobile_user_agent: String,
}

impl SigaaHttpSession {
    pub fn new(
        institution: InstitutionController,
        config: &SessionConfig,
        cookies: Arc<CookieStore>,
    ) -> Self {
        Self {
            institution,
            cookies,
            cache: PageCache::new(config.cache_ttl_duration(), config.cache_max_entries),
            stacks: RequestStackController::new(),
            trackers: Arc::new(Mutex::new(Vec::new())),
            next_tracker: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            mobile_user_agent: config.mobile_user_agent.clone(),
        }
    }

    /// Host of the portal this session talks to.
    pub fn host(&self) -> &str {
        self.institution.host()
    }

    pub fn cookies(&self) -> &Arc<CookieStore> {
        &self.cookies
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Requests holding a lane turn right now.
    pub fn in_flight(&self) -> usize {
        lock(&self.trackers).len()
    }

    fn store_cookies<'a>(&self, host: &str, set_cookies: impl Iterator<Item = &'a str>) {
        let set_cookies: Vec<&str> = set_cookies.collect();
        if !set_cookies.is_empty() {
            self.cookies.store_cookies(host, &set_cookies);
        }
    }

    /// Queue `key` in its lane and register a tracker once released.
    async fn take_turn(&self, key: &RequestKey) -> InFlight {
        let lane = self.stacks.stacks_for(key.host());
        let turn = lane.lane_for(key).enqueue(key.clone()).wait_turn().await;
        tracing::debug!(
            request = %key,
            lane = %LaneKind::for_request(key),
            ticket = turn.ticket(),
            "request released"
        );

        let id = self.next_tracker.fetch_add(1, Ordering::Relaxed);
        lock(&self.trackers).push(Tracker {
            id,
            key: key.clone(),
            turn,
        });
        InFlight {
            id,
            trackers: Arc::clone(&self.trackers),
        }
    }

    fn take_tracker(&self, key: &RequestKey) -> Option<Tracker> {
        let mut trackers = lock(&self.trackers);
        let pos = trackers.iter().position(|t| t.key == *key)?;
        Some(trackers.remove(pos))
    }
}

#[async_trait]
impl HttpSession for SigaaHttpSession {
    fn institution(&self) -> Institution {
        self.institution.institution
    }

    fn get_url(&self, path: &str) -> Result<Url> {
        self.institution.url_for(path)
    }

    fn after_http_options(
        &self,
        url: &Url,
        headers: &mut BTreeMap<String, String>,
        options: RequestOptions,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(SigaaError::SessionClosed);
        }
        let host = url.host_str().unwrap_or_default();
        if let Some(cookie) = self.cookies.cookie_header(host, url.path()) {
            headers.insert("cookie".to_string(), cookie);
        }
        if options.mobile {
            headers.insert("user-agent".to_string(), self.mobile_user_agent.clone());
        }
        Ok(())
    }

    async fn before_request(&self, key: &RequestKey, options: RequestOptions) -> Result<Gate> {
        if self.is_closed() {
            return Err(SigaaError::SessionClosed);
        }

        if !options.no_cache {
            if let Some(page) = self.cache.get_page(key) {
                tracing::debug!(request = %key, "page cache hit");
                return Ok(Gate::Cached(page));
            }
        }

        if options.share_same_request && key.body_is_text() {
            let lane = self.stacks.stacks_for(key.host());
            if let Some(outcome) = lane.lane_for(key).find_pending(key) {
                tracing::debug!(request = %key, "joining pending request");
                return join_shared(outcome).await.map(Gate::Shared);
            }
        }

        Ok(Gate::Proceed(self.take_turn(key).await))
    }

    fn after_successful_request(&self, page: Page) -> Arc<Page> {
        let page = Arc::new(page);
        self.store_cookies(page.request().host(), page.set_cookies().into_iter());
        self.cache.store_page(Arc::clone(&page));

        match self.take_tracker(page.request()) {
            Some(tracker) => tracker.turn.resolve(Ok(Arc::clone(&page))),
            None => tracing::debug!(request = %page.request(), "no pending entry for response"),
        }
        page
    }

    fn after_unsuccessful_request(&self, error: SigaaError, key: &RequestKey) -> SigaaError {
        match self.take_tracker(key) {
            Some(tracker) => tracker.turn.resolve(Err(error.clone())),
            None => tracing::debug!(request = %key, "no pending entry for failed request"),
        }
        error
    }

    async fn before_download_request(&self, key: &RequestKey) -> Result<InFlight> {
        if self.is_closed() {
            return Err(SigaaError::SessionClosed);
        }
        Ok(self.take_turn(key).await)
    }

    fn after_download_request(&self, key: &RequestKey, headers: &[(String, String)]) {
        let set_cookies = headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
            .map(|(_, value)| value.as_str());
        self.store_cookies(key.host(), set_cookies);
        // Nobody joins a download, so dropping the turn only frees the lane.
        drop(self.take_tracker(key));
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cookies.clear_cookies();
        self.cache.clear_cache_page();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::request::HttpMethod;
    use std::time::Duration;

    fn session() -> SigaaHttpSession {
        let url = Url::parse("https://sigaa.ifsc.edu.br").unwrap();
        SigaaHttpSession::new(
            InstitutionController::new(Institution::Ifsc, url),
            &SessionConfig::default(),
            Arc::new(CookieStore::new()),
        )
    }

    fn key(s: &SigaaHttpSession, path: &str, options: RequestOptions) -> RequestKey {
        let url = s.get_url(path).unwrap();
        let mut headers = BTreeMap::new();
        s.after_http_options(&url, &mut headers, options).unwrap();
        RequestKey::new(HttpMethod::Get, url, headers, None)
    }

    fn response(key: &RequestKey, headers: &[(&str, &str)]) -> Page {
        Page::new(
            key.clone(),
            200,
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            b"<html>ok</html>".to_vec(),
            Institution::Ifsc,
        )
    }

    async fn proceed(s: &SigaaHttpSession, key: &RequestKey, options: RequestOptions) -> InFlight {
        match s.before_request(key, options).await.unwrap() {
            Gate::Proceed(in_flight) => in_flight,
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cached_after_success() {
        let s = session();
        let k = key(&s, "/sigaa/public/home.jsf", RequestOptions::default());

        let in_flight = proceed(&s, &k, RequestOptions::default()).await;
        let page = s.after_successful_request(response(&k, &[]));
        drop(in_flight);

        match s.before_request(&k, RequestOptions::default()).await.unwrap() {
            Gate::Cached(cached) => assert!(Arc::ptr_eq(&cached, &page)),
            other => panic!("expected Cached, got {other:?}"),
        }

        // no_cache still goes to the network
        let again = proceed(&s, &k, RequestOptions::no_cache()).await;
        drop(again);
        assert_eq!(s.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cookie_injection_and_mobile_agent() {
        let s = session();
        let k = key(&s, "/sigaa/logon.jsf", RequestOptions::default());
        assert!(!k.has_cookie());

        let in_flight = proceed(&s, &k, RequestOptions::default()).await;
        s.after_successful_request(response(&k, &[("Set-Cookie", "JSESSIONID=abc; Path=/")]));
        drop(in_flight);

        let next = key(&s, "/sigaa/logon.jsf", RequestOptions::mobile());
        assert_eq!(next.header("cookie"), Some("JSESSIONID=abc"));
        assert!(next.header("user-agent").is_some_and(|ua| ua.contains("Mobile")));
        assert_ne!(next, k);
    }

    #[tokio::test]
    async fn test_shared_request_gets_same_page() {
        let s = Arc::new(session());
        let k = key(&s, "/sigaa/public/turmas/listar.jsf", RequestOptions::default());

        let in_flight = proceed(&s, &k, RequestOptions::shared()).await;

        let joiner = {
            let s = Arc::clone(&s);
            let k = k.clone();
            tokio::spawn(async move { s.before_request(&k, RequestOptions::shared()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let page = s.after_successful_request(response(&k, &[]));
        drop(in_flight);

        match joiner.await.unwrap().unwrap() {
            // The joiner may also arrive after the page was cached.
            Gate::Shared(shared) | Gate::Cached(shared) => assert!(Arc::ptr_eq(&shared, &page)),
            other => panic!("expected a page, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_rejects_joiners() {
        let s = Arc::new(session());
        let k = key(&s, "/sigaa/public/home.jsf", RequestOptions::default());
        let in_flight = proceed(&s, &k, RequestOptions::shared()).await;

        let joiner = {
            let s = Arc::clone(&s);
            let k = k.clone();
            tokio::spawn(async move { s.before_request(&k, RequestOptions::shared()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = s.after_unsuccessful_request(SigaaError::TooManyRedirects(3), &k);
        assert!(matches!(err, SigaaError::TooManyRedirects(3)));
        drop(in_flight);

        assert!(matches!(
            joiner.await.unwrap(),
            Err(SigaaError::TooManyRedirects(3))
        ));
    }

    #[tokio::test]
    async fn test_dropped_in_flight_releases_lane() {
        let s = session();
        let k = key(&s, "/sigaa/public/home.jsf", RequestOptions::default());

        let first = proceed(&s, &k, RequestOptions::no_cache()).await;
        assert_eq!(s.in_flight(), 1);
        drop(first);
        assert_eq!(s.in_flight(), 0);

        let second = tokio::time::timeout(
            Duration::from_millis(200),
            proceed(&s, &k, RequestOptions::no_cache()),
        )
        .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_unmatched_response_is_tolerated() {
        let s = session();
        let k = key(&s, "/sigaa/public/home.jsf", RequestOptions::default());
        let page = s.after_successful_request(response(&k, &[("set-cookie", "A=1")]));
        assert_eq!(page.status(), 200);
        assert_eq!(s.cookies().cookie_header("sigaa.ifsc.edu.br", "/").as_deref(), Some("A=1"));
    }

    #[tokio::test]
    async fn test_download_hooks_skip_cache_and_release_lane() {
        let s = session();
        let k = key(&s, "/sigaa/verArquivo", RequestOptions::default());

        let in_flight = s.before_download_request(&k).await.unwrap();
        assert_eq!(s.in_flight(), 1);
        s.after_download_request(&k, &[("Set-Cookie".to_string(), "A=1".to_string())]);
        drop(in_flight);

        assert_eq!(s.in_flight(), 0);
        assert!(s.cache().is_empty());
        assert_eq!(s.cookies().cookie_header("sigaa.ifsc.edu.br", "/").as_deref(), Some("A=1"));

        let next = tokio::time::timeout(Duration::from_millis(200), s.before_download_request(&k)).await;
        assert!(next.is_ok());
    }

    #[tokio::test]
    async fn test_close_flushes_state() {
        let s = session();
        let k = key(&s, "/sigaa/public/home.jsf", RequestOptions::default());
        let in_flight = proceed(&s, &k, RequestOptions::default()).await;
        s.after_successful_request(response(&k, &[("set-cookie", "A=1")]));
        drop(in_flight);

        s.close();
        assert!(s.cache().is_empty());
        assert!(s.cookies().cookies("sigaa.ifsc.edu.br").is_empty());
        assert!(matches!(
            s.before_request(&k, RequestOptions::default()).await,
            Err(SigaaError::SessionClosed)
        ));
        assert!(matches!(
            s.before_download_request(&k).await,
            Err(SigaaError::SessionClosed)
        ));
    }
}
