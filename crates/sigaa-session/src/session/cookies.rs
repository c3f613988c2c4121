// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-host cookie store.
//!
//! Cookies are only ever written from `Set-Cookie` values (or pre-seeded with
//! the same syntax) and are injected into every outgoing request for the
//! same host. Nothing is persisted.

use super::lock;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Longest lifetime honoured for a `Max-Age` cookie (400 days, RFC 6265bis).
const MAX_COOKIE_AGE_SECS: i64 = 400 * 24 * 60 * 60;

/// A stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    /// Path prefix the cookie applies to.
    pub path: String,
    /// Absolute expiry; `None` for session cookies.
    pub expires: Option<DateTime<Utc>>,
}

impl CookieEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn matches_path(&self, path: &str) -> bool {
        if self.path == "/" || path == self.path {
            return true;
        }
        path.starts_with(&self.path)
            && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/'))
    }
}

/// Cookie jar keyed by host, then by cookie name.
#[derive(Debug, Default)]
pub struct CookieStore {
    /// Insertion order is kept so the `Cookie` header is stable.
    jar: Mutex<HashMap<String, Vec<CookieEntry>>>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse raw `Set-Cookie` values and merge them into the host's jar.
    ///
    /// A cookie with the same name replaces the stored one; an already
    /// expired cookie (`Max-Age<=0` or past `Expires`) deletes it.
    pub fn store_cookies<S: AsRef<str>>(&self, host: &str, raw_cookies: &[S]) {
        let now = Utc::now();
        let mut jar = lock(&self.jar);
        let entries = jar.entry(host.to_ascii_lowercase()).or_default();

        for raw in raw_cookies {
            let Some(cookie) = parse_set_cookie(raw.as_ref(), now) else {
                tracing::debug!("ignoring unparseable cookie for {host}");
                continue;
            };
            entries.retain(|c| c.name != cookie.name);
            if !cookie.is_expired(now) {
                entries.push(cookie);
            }
        }
    }

    /// Build the `Cookie` header value for a request to `host` + `path`.
    ///
    /// Expired entries are dropped on the way. Returns `None` when no cookie
    /// applies.
    pub fn cookie_header(&self, host: &str, path: &str) -> Option<String> {
        let now = Utc::now();
        let mut jar = lock(&self.jar);
        let entries = jar.get_mut(&host.to_ascii_lowercase())?;
        entries.retain(|c| !c.is_expired(now));

        let header = entries
            .iter()
            .filter(|c| c.matches_path(path))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        (!header.is_empty()).then_some(header)
    }

    /// Snapshot of the cookies stored for `host`.
    pub fn cookies(&self, host: &str) -> Vec<CookieEntry> {
        lock(&self.jar)
            .get(&host.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Drop every cookie of every host.
    pub fn clear_cookies(&self) {
        lock(&self.jar).clear();
    }
}

/// Parse one `Set-Cookie` value. `Max-Age` wins over `Expires`.
fn parse_set_cookie(raw: &str, now: DateTime<Utc>) -> Option<CookieEntry> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut path = "/".to_string();
    let mut expires = None;
    let mut max_age = None;

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr.trim(), ""),
        };
        if key.eq_ignore_ascii_case("path") && val.starts_with('/') {
            path = val.to_string();
        } else if key.eq_ignore_ascii_case("expires") {
            expires = parse_cookie_date(val);
        } else if key.eq_ignore_ascii_case("max-age") {
            max_age = parse_max_age(val);
        }
    }

    if let Some(secs) = max_age {
        expires = max_age_expiry(secs, now);
    }

    Some(CookieEntry {
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        path,
        expires,
    })
}

/// Digit strings beyond the `i64` range saturate.
fn parse_max_age(val: &str) -> Option<i64> {
    let (negative, digits) = match val.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, val),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(val.parse::<i64>().unwrap_or(if negative { i64::MIN } else { i64::MAX }))
}

/// Absolute expiry for a `Max-Age` of `secs`. Non-positive ages expire at
/// once; oversized ones are capped so the arithmetic cannot overflow.
fn max_age_expiry(secs: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return Some(DateTime::<Utc>::MIN_UTC);
    }
    ChronoDuration::try_seconds(secs.min(MAX_COOKIE_AGE_SECS))
        .and_then(|age| now.checked_add_signed(age))
}

fn parse_cookie_date(val: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(val) {
        return Some(dt.with_timezone(&Utc));
    }
    // Netscape style: "Wed, 21-Oct-2015 07:28:00 GMT"
    NaiveDateTime::parse_from_str(val, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}
