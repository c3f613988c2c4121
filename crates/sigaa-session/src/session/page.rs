// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Immutable snapshot of one server response plus the request that produced it.

use super::request::RequestKey;
use crate::error::Result;
use crate::institution::Institution;
use scraper::Html;
use url::Url;

/// A server response.
///
/// Pages are shared as `Arc<Page>`; two callers holding the same `Arc`
/// observed the same network response.
#[derive(Debug, Clone)]
pub struct Page {
    status: u16,
    /// Lower-cased names; repeated headers keep one entry per value.
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    body_decoded: Option<String>,
    request: RequestKey,
    institution: Institution,
}

impl Page {
    pub fn new(
        request: RequestKey,
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        institution: Institution,
    ) -> Self {
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        let content_type = headers
            .iter()
            .find(|(k, _)| k == "content-type")
            .map(|(_, v)| v.as_str());
        let body_decoded = decode_body(content_type, &body);
        Self {
            status,
            headers,
            body,
            body_decoded,
            request,
            institution,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of header `name` (case-insensitive), in response order.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .filter(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn set_cookies(&self) -> Vec<&str> {
        self.header_all("set-cookie")
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decoded body, `None` for binary responses.
    pub fn body_decoded(&self) -> Option<&str> {
        self.body_decoded.as_deref()
    }

    /// Decoded body, empty for binary responses.
    pub fn text(&self) -> &str {
        self.body_decoded.as_deref().unwrap_or_default()
    }

    pub fn is_textual(&self) -> bool {
        self.body_decoded.is_some()
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.text().contains(marker)
    }

    /// URL that produced this page.
    pub fn url(&self) -> &Url {
        &self.request.url
    }

    /// Originating request.
    pub fn request(&self) -> &RequestKey {
        &self.request
    }

    pub fn institution(&self) -> Institution {
        self.institution
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.header("location").is_some()
    }

    /// `Location` target resolved against the page URL, if this is a redirect.
    pub fn redirect_target(&self) -> Result<Option<Url>> {
        if !self.is_redirect() {
            return Ok(None);
        }
        match self.header("location") {
            Some(location) => Ok(Some(self.url().join(location)?)),
            None => Ok(None),
        }
    }

    /// Parse the body into a DOM.
    ///
    /// The DOM is not `Send`, so it is built on demand and kept local to the
    /// caller instead of living inside the shared page.
    pub fn document(&self) -> Html {
        Html::parse_document(self.text())
    }
}

fn is_textual_type(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return true;
    };
    let ct = ct.to_ascii_lowercase();
    ct.starts_with("text/")
        || ["html", "xml", "json", "javascript", "x-www-form-urlencoded"]
            .iter()
            .any(|t| ct.contains(t))
}

fn charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, v)| v.trim().trim_matches('"').to_ascii_lowercase())
}

fn decode_body(content_type: Option<&str>, body: &[u8]) -> Option<String> {
    if !is_textual_type(content_type) {
        return None;
    }
    let latin1 = content_type
        .and_then(charset)
        .is_some_and(|c| matches!(c.as_str(), "iso-8859-1" | "latin1" | "windows-1252"));
    if latin1 {
        Some(body.iter().map(|&b| b as char).collect())
    } else {
        Some(String::from_utf8_lossy(body).into_owned())
    }
}
