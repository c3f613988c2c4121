// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bot challenge (reCAPTCHA) detection on login pages.

use crate::error::Result;
use crate::session::Page;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// Form field carrying the challenge token.
pub const TOKEN_FIELD: &str = "g-recaptcha-response";

const DEFAULT_ACTION: &str = "login";

/// Produces a challenge token for a site key.
///
/// Implementations typically call an external solving service.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn solve(&self, site_key: &str, action: &str) -> Result<String>;
}

/// A challenge found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub site_key: String,
    pub action: String,
}

impl Challenge {
    /// Detect a challenge from the page body.
    pub fn detect(page: &Page) -> Option<Self> {
        let text = page.text();
        let site_key = site_key_patterns()
            .iter()
            .find_map(|re| re.captures(text))
            .map(|caps| caps[1].to_string())?;
        let action = action_pattern()
            .captures(text)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| DEFAULT_ACTION.to_string());
        Some(Self { site_key, action })
    }
}

fn site_key_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r#"data-sitekey\s*=\s*["']([\w-]+)["']"#).expect("sitekey attr regex is valid"),
            Regex::new(r#"recaptcha/api\.js\?render=([\w-]+)"#).expect("render regex is valid"),
            Regex::new(r#"grecaptcha\.execute\(\s*["']([\w-]+)["']"#)
                .expect("execute regex is valid"),
        ]
    })
}

fn action_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"action\s*:\s*["']([\w/-]+)["']"#).expect("action regex is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::institution::Institution;
    use crate::session::{HttpMethod, RequestKey};
    use std::collections::BTreeMap;
    use url::Url;

    fn page(html: &str) -> Page {
        let request = RequestKey::new(
            HttpMethod::Get,
            Url::parse("https://sigaa.ifsc.edu.br/sigaa/mobile/touch/login.jsf").unwrap(),
            BTreeMap::new(),
            None,
        );
        Page::new(request, 200, vec![], html.as_bytes().to_vec(), Institution::Ifsc)
    }

    #[test]
    fn test_detect_execute_call() {
        let p = page(
            r#"<script src="https://www.google.com/recaptcha/api.js?render=6LfKey_1"></script>
               <script>grecaptcha.execute('6LfKey_1', {action: 'submit_login'})</script>"#,
        );
        assert_eq!(
            Challenge::detect(&p),
            Some(Challenge {
                site_key: "6LfKey_1".into(),
                action: "submit_login".into()
            })
        );
    }

    #[test]
    fn test_detect_widget_defaults_action() {
        let p = page(r#"<div class="g-recaptcha" data-sitekey="abc-123"></div>"#);
        let challenge = Challenge::detect(&p).unwrap();
        assert_eq!(challenge.site_key, "abc-123");
        assert_eq!(challenge.action, "login");
    }

    #[test]
    fn test_no_challenge() {
        assert!(Challenge::detect(&page("<form id=\"form-login\"></form>")).is_none());
    }
}
