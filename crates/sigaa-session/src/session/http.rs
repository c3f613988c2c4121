// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport wrapping reqwest.
//!
//! Redirects are never followed by the client: every hop is a request of its
//! own so it passes through the session hooks (cookies, cache, lanes).

use super::http_session::{Gate, HttpSession};
use super::page::Page;
use super::request::{HttpMethod, RequestBody, RequestKey, RequestOptions};
use crate::config::SessionConfig;
use crate::error::{Result, SigaaError};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use url::Url;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// File name used when neither the response nor the URL names the file.
const DEFAULT_FILE_NAME: &str = "download";

/// Bytes written so far and the announced total, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

/// Called after every chunk written to disk.
pub type ProgressCallback = dyn Fn(DownloadProgress) + Send + Sync;

enum Fetched {
    Redirect(Url),
    Saved(PathBuf),
}

/// Transport bound to one session.
#[derive(Clone)]
pub struct SigaaHttp {
    client: reqwest::Client,
    session: Arc<dyn HttpSession>,
    max_redirects: usize,
}

impl SigaaHttp {
    pub fn new(session: Arc<dyn HttpSession>, config: &SessionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            session,
            max_redirects: config.max_redirects,
        })
    }

    pub fn session(&self) -> &Arc<dyn HttpSession> {
        &self.session
    }

    /// GET `path` (absolute, or relative to the portal base URL).
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Arc<Page>> {
        let url = self.session.get_url(path)?;
        self.request(HttpMethod::Get, url, None, options).await
    }

    /// POST url-encoded `fields` to `path`.
    pub async fn post<K, V>(
        &self,
        path: &str,
        fields: &[(K, V)],
        options: RequestOptions,
    ) -> Result<Arc<Page>>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = self.session.get_url(path)?;
        let body = RequestBody::form(fields);
        self.request(HttpMethod::Post, url, Some(body), options).await
    }

    /// Follow `Location` headers from `page` until a non-redirect response.
    pub async fn follow_all_redirect(
        &self,
        page: Arc<Page>,
        options: RequestOptions,
    ) -> Result<Arc<Page>> {
        let mut page = page;
        let mut hops = 0;
        while let Some(target) = page.redirect_target()? {
            hops += 1;
            if hops > self.max_redirects {
                return Err(SigaaError::TooManyRedirects(self.max_redirects));
            }
            tracing::debug!(from = %page.url(), to = %target, "following redirect");
            page = self.request(HttpMethod::Get, target, None, options).await?;
        }
        Ok(page)
    }

    /// Stream the file at `path` to `dest`.
    ///
    /// `dest` is either the file to write or an existing directory, in which
    /// case the name comes from `Content-Disposition` or the URL. Redirects
    /// are followed. Returns the path written.
    pub async fn download(
        &self,
        path: &str,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<PathBuf> {
        let url = self.session.get_url(path)?;
        self.download_request(HttpMethod::Get, url, None, dest, progress)
            .await
    }

    /// Like [`SigaaHttp::download`], for files served as the answer to a
    /// form submission.
    pub async fn download_form<K, V>(
        &self,
        path: &str,
        fields: &[(K, V)],
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<PathBuf>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = self.session.get_url(path)?;
        let body = RequestBody::form(fields);
        self.download_request(HttpMethod::Post, url, Some(body), dest, progress)
            .await
    }

    async fn download_request(
        &self,
        mut method: HttpMethod,
        mut url: Url,
        mut body: Option<RequestBody>,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<PathBuf> {
        for _ in 0..=self.max_redirects {
            let mut headers = BTreeMap::new();
            // Keeps download identities apart from page requests.
            headers.insert("accept".to_string(), "*/*".to_string());
            if matches!(body, Some(RequestBody::Text(_))) {
                headers.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
            }
            self.session
                .after_http_options(&url, &mut headers, RequestOptions::default())?;
            let key = RequestKey::new(method, url, headers, body);

            let _in_flight = self.session.before_download_request(&key).await?;
            let fetched = match self.fetch_file(&key, dest, progress).await {
                Ok((headers, fetched)) => {
                    self.session.after_download_request(&key, &headers);
                    fetched
                }
                Err(err) => return Err(self.session.after_unsuccessful_request(err, &key)),
            };

            match fetched {
                Fetched::Saved(path) => return Ok(path),
                Fetched::Redirect(target) => {
                    tracing::debug!(from = %key.url, to = %target, "following download redirect");
                    method = HttpMethod::Get;
                    url = target;
                    body = None;
                }
            }
        }
        Err(SigaaError::TooManyRedirects(self.max_redirects))
    }

    async fn fetch_file(
        &self,
        key: &RequestKey,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<(Vec<(String, String)>, Fetched)> {
        let response = self.builder(key).send().await?;
        let status = response.status();
        let headers = header_pairs(response.headers());

        if status.is_redirection() {
            if let Some(location) = header_value(&headers, "location") {
                let target = key.url.join(location)?;
                return Ok((headers, Fetched::Redirect(target)));
            }
        }
        if !status.is_success() {
            return Err(SigaaError::UnexpectedStatus(status.as_u16()));
        }

        let target = target_path(dest, &headers, &key.url).await;
        let total = response.content_length();
        let mut file = tokio::fs::File::create(&target).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        let written = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
                if let Some(progress) = progress {
                    progress(DownloadProgress { downloaded, total });
                }
            }
            file.flush().await?;
            Ok::<(), SigaaError>(())
        }
        .await;

        if let Err(err) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&target).await;
            return Err(err);
        }
        tracing::debug!(request = %key, path = %target.display(), bytes = downloaded, "download saved");
        Ok((headers, Fetched::Saved(target)))
    }

    async fn request(
        &self,
        method: HttpMethod,
        url: Url,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<Arc<Page>> {
        let mut headers = BTreeMap::new();
        if matches!(body, Some(RequestBody::Text(_))) {
            headers.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
        }
        self.session.after_http_options(&url, &mut headers, options)?;
        let key = RequestKey::new(method, url, headers, body);

        match self.session.before_request(&key, options).await? {
            Gate::Cached(page) | Gate::Shared(page) => Ok(page),
            Gate::Proceed(_in_flight) => match self.send(&key).await {
                Ok(page) => Ok(self.session.after_successful_request(page)),
                Err(err) => Err(self.session.after_unsuccessful_request(err, &key)),
            },
        }
    }

    fn builder(&self, key: &RequestKey) -> reqwest::RequestBuilder {
        let method = match key.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, key.url.clone());
        for (name, value) in &key.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &key.body {
            builder = builder.body(body.as_bytes().to_vec());
        }
        builder
    }

    async fn send(&self, key: &RequestKey) -> Result<Page> {
        let response = self.builder(key).send().await?;
        let status = response.status().as_u16();
        let headers = header_pairs(response.headers());
        let body = response.bytes().await?;

        tracing::debug!(request = %key, status, "response received");
        Ok(Page::new(
            key.clone(),
            status,
            headers,
            body.to_vec(),
            self.session.institution(),
        ))
    }
}

fn header_pairs(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect()
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Where a download lands: `dest` itself, or a file inside it when `dest`
/// is a directory.
async fn target_path(dest: &Path, headers: &[(String, String)], url: &Url) -> PathBuf {
    let is_dir = tokio::fs::metadata(dest)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return dest.to_path_buf();
    }
    let name = header_value(headers, "content-disposition")
        .and_then(disposition_file_name)
        .or_else(|| {
            url.path_segments()
                .and_then(|segments| segments.last())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
    dest.join(safe_file_name(&name))
}

/// `filename` parameter of a `Content-Disposition` value.
fn disposition_file_name(value: &str) -> Option<String> {
    value
        .split(';')
        .filter_map(|param| param.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("filename"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

/// Last path component only, so a served name cannot escape the directory.
fn safe_file_name(name: &str) -> String {
    let name = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    match name {
        "" | "." | ".." => DEFAULT_FILE_NAME.to_string(),
        name => name.to_string(),
    }
}
