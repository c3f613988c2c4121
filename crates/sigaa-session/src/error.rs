// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the session layer.
//!
//! Every fallible library operation returns [`Result<T>`]. The error is
//! cloneable because a single network outcome may be delivered to several
//! callers that joined the same in-flight request.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Credentials | [`SigaaError::InvalidCredentials`] |
//! | Site misbehaving | [`SigaaError::ChallengeFailed`], [`SigaaError::SuspiciousBehaviorDetected`], [`SigaaError::UnrecognizedLoginResponse`], [`SigaaError::MalformedForm`], [`SigaaError::UnexpectedPage`] |
//! | Usage | [`SigaaError::AlreadyAuthenticated`], [`SigaaError::ChallengeSolverRequired`], [`SigaaError::SessionClosed`], [`SigaaError::InvalidSearchParameter`], [`SigaaError::Config`] |
//! | Transport | [`SigaaError::Transport`], [`SigaaError::TooManyRedirects`], [`SigaaError::InvalidUrl`], [`SigaaError::RequestAbandoned`], [`SigaaError::UnexpectedStatus`] |
//! | Local | [`SigaaError::Io`] |

use std::sync::Arc;

/// Result type alias using [`SigaaError`].
pub type Result<T> = std::result::Result<T, SigaaError>;

/// All errors produced by the session layer.
#[derive(thiserror::Error, Debug, Clone)]
pub enum SigaaError {
    /// The portal rejected the username/password pair.
    #[error("SIGAA: Invalid credentials.")]
    InvalidCredentials,

    /// The bot-challenge token was refused by the portal.
    #[error("SIGAA: Bot challenge verification failed.")]
    ChallengeFailed,

    /// The login page carries a bot challenge but no solver was supplied.
    #[error("SIGAA: Login page requires a challenge solver.")]
    ChallengeSolverRequired,

    /// The portal flagged the login attempt as suspicious.
    #[error("SIGAA: Suspicious behavior detected by the portal.")]
    SuspiciousBehaviorDetected,

    /// The login form came back without any recognized marker.
    #[error("SIGAA: Invalid response after login attempt.")]
    UnrecognizedLoginResponse,

    /// A required form or field is missing from the page.
    #[error("SIGAA: Malformed form: {0}")]
    MalformedForm(String),

    /// A page did not have the expected structure.
    #[error("SIGAA: Unexpected page: {0}")]
    UnexpectedPage(String),

    /// `login` was called on a session that is already authenticated.
    #[error("SIGAA: This session already has a user logged in.")]
    AlreadyAuthenticated,

    /// Network-layer failure (connection, timeout, body read).
    #[error("transport error: {0}")]
    Transport(#[source] Arc<reqwest::Error>),

    /// The redirect chain exceeded the configured limit.
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    /// A path or `Location` header could not be resolved to a URL.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The session was closed; construct a new one.
    #[error("session closed")]
    SessionClosed,

    /// The in-flight request this caller joined was dropped before it finished.
    #[error("shared request was abandoned before completion")]
    RequestAbandoned,

    /// Search parameters outside the accepted range.
    #[error("SIGAA: Invalid search parameter: {0}")]
    InvalidSearchParameter(String),

    /// A download answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// Writing a downloaded file failed.
    #[error("io error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// Configuration could not be loaded or is inconsistent.
    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for SigaaError {
    fn from(err: reqwest::Error) -> Self {
        SigaaError::Transport(Arc::new(err))
    }
}

impl From<std::io::Error> for SigaaError {
    fn from(err: std::io::Error) -> Self {
        SigaaError::Io(Arc::new(err))
    }
}

impl SigaaError {
    /// Whether the error means the user supplied wrong credentials, as
    /// opposed to the site changing or misbehaving.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, SigaaError::InvalidCredentials)
    }

    /// Whether a failed login attempt may be retried once.
    pub fn is_retryable_login(&self) -> bool {
        matches!(
            self,
            SigaaError::ChallengeFailed
                | SigaaError::UnrecognizedLoginResponse
                | SigaaError::Transport(_)
                | SigaaError::TooManyRedirects(_)
                | SigaaError::RequestAbandoned
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        assert!(SigaaError::UnrecognizedLoginResponse.is_retryable_login());
        assert!(SigaaError::ChallengeFailed.is_retryable_login());
        assert!(!SigaaError::InvalidCredentials.is_retryable_login());
        assert!(!SigaaError::SuspiciousBehaviorDetected.is_retryable_login());
        assert!(!SigaaError::MalformedForm("x".into()).is_retryable_login());
        assert!(!SigaaError::AlreadyAuthenticated.is_retryable_login());
    }

    #[test]
    fn test_credential_error_is_distinct() {
        assert!(SigaaError::InvalidCredentials.is_credential_error());
        assert!(!SigaaError::UnrecognizedLoginResponse.is_credential_error());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            SigaaError::InvalidCredentials.to_string(),
            "SIGAA: Invalid credentials."
        );
        assert_eq!(
            SigaaError::TooManyRedirects(10).to_string(),
            "too many redirects (limit 10)"
        );
        assert_eq!(
            SigaaError::UnexpectedStatus(404).to_string(),
            "unexpected HTTP status 404"
        );
    }
}
