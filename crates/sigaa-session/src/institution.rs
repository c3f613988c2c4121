// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Institution variant tag and the base URL it is bound to.

use crate::error::{Result, SigaaError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// SIGAA deployments with known login and page variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Institution {
    /// Instituto Federal de Santa Catarina (mobile login form, reCAPTCHA).
    Ifsc,
    /// Universidade Federal da Paraíba.
    Ufpb,
    /// Universidade de Brasília.
    Unb,
    /// Universidade Federal da Fronteira Sul.
    Uffs,
}

impl Institution {
    pub const ALL: [Institution; 4] = [
        Institution::Ifsc,
        Institution::Ufpb,
        Institution::Unb,
        Institution::Uffs,
    ];

    /// Short uppercase tag, e.g. `"IFSC"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Institution::Ifsc => "IFSC",
            Institution::Ufpb => "UFPB",
            Institution::Unb => "UNB",
            Institution::Uffs => "UFFS",
        }
    }

    /// Guess the institution from a portal host name.
    ///
    /// Falls back to IFSC, the reference deployment.
    pub fn from_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if host.contains("ufpb") {
            Institution::Ufpb
        } else if host.contains("unb.br") {
            Institution::Unb
        } else if host.contains("uffs") {
            Institution::Uffs
        } else {
            Institution::Ifsc
        }
    }
}

impl fmt::Display for Institution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Institution {
    type Err = SigaaError;

    fn from_str(s: &str) -> Result<Self> {
        Institution::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SigaaError::Config(format!("unknown institution: {s}")))
    }
}

/// Binds an institution to the base URL of its portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstitutionController {
    pub institution: Institution,
    pub url: Url,
}

impl InstitutionController {
    pub fn new(institution: Institution, url: Url) -> Self {
        Self { institution, url }
    }

    /// Host the request lanes and cookies of this portal are keyed by.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Resolve `path` (absolute or relative) against the portal base URL.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        Ok(self.url.join(path)?)
    }
}
