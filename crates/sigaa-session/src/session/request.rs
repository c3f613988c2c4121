// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Request identity and per-request options.

use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// HTTP methods the portal is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestBody {
    /// Textual payload, usually an url-encoded form.
    Text(String),
    /// Raw bytes. Never cached and never shared.
    Binary(Vec<u8>),
}

impl RequestBody {
    /// Url-encode form fields, preserving their order.
    pub fn form<K, V>(fields: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in fields {
            serializer.append_pair(name.as_ref(), value.as_ref());
        }
        RequestBody::Text(serializer.finish())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RequestBody::Text(s) => s.as_bytes(),
            RequestBody::Binary(b) => b,
        }
    }
}

/// Structural identity of a request: method, absolute URL, normalized
/// headers and body. Used for caching, sharing and matching a response back
/// to the queue entry that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: HttpMethod,
    pub url: Url,
    /// Lower-cased header names, ordered.
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
}

impl RequestKey {
    pub fn new(
        method: HttpMethod,
        url: Url,
        headers: BTreeMap<String, String>,
        body: Option<RequestBody>,
    ) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// Host this request is addressed to.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether a `Cookie` header is attached.
    pub fn has_cookie(&self) -> bool {
        self.header("cookie").is_some_and(|c| !c.is_empty())
    }

    /// Body is absent or textual, so the request may be cached or shared.
    pub fn body_is_text(&self) -> bool {
        !matches!(self.body, Some(RequestBody::Binary(_)))
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Options recognized by the session layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Skip the page cache read (the response is still stored).
    pub no_cache: bool,
    /// Join an identical pending request instead of issuing a new one.
    pub share_same_request: bool,
    /// Send the mobile User-Agent (mobile variant of the portal).
    pub mobile: bool,
}

impl RequestOptions {
    pub fn no_cache() -> Self {
        Self {
            no_cache: true,
            ..Self::default()
        }
    }

    pub fn shared() -> Self {
        Self {
            share_same_request: true,
            ..Self::default()
        }
    }

    pub fn mobile() -> Self {
        Self {
            mobile: true,
            ..Self::default()
        }
    }

    pub fn with_no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }
}
