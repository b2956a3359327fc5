//! Error types for the fetch boundary and the HTTP surface.
//!
//! `VcsError` is the taxonomy every call into the version-control
//! collaborator is classified into before any caching or rendering decision.
//! Only that boundary produces errors; correlation and caching never fail.
//!
//! `AppError` implements Axum's `IntoResponse` so route handlers can return
//! JSON error bodies.
//!
//! Error mappings:
//! - `DocumentNotFound` → 404
//! - `InvalidPath`, `Config` → 400
//! - `Vcs(NotVersioned)` → 404, `Vcs(AuthRequired)` → 401,
//!   `Vcs(NetworkUnavailable)` → 503, other `Vcs` and `Internal` → 500

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Classification of a failed collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotVersioned,
    AuthRequired,
    NetworkUnavailable,
    Unparseable,
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VcsError {
    #[error("Not under version control: {0}")]
    NotVersioned(String),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Unparseable response: {0}")]
    Unparseable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

const AUTH_MARKERS: &[&str] = &[
    "authentication",
    "authorization failed",
    "credentials",
    "password",
    "permission denied (publickey",
    "401",
];

const NETWORK_MARKERS: &[&str] = &[
    "network",
    "could not resolve",
    "connection refused",
    "connection reset",
    "timed out",
    "timeout",
    "unable to connect",
];

const NOT_VERSIONED_MARKERS: &[&str] = &[
    "not under version control",
    "not a working copy",
    "not a git repository",
    "does not exist",
    "is ignored",
    "untracked",
];

impl VcsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VcsError::NotVersioned(_) => ErrorKind::NotVersioned,
            VcsError::AuthRequired(_) => ErrorKind::AuthRequired,
            VcsError::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            VcsError::Unparseable(_) => ErrorKind::Unparseable,
            VcsError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Map free-form collaborator output onto the taxonomy.
    ///
    /// Anything that matches no known marker is `Internal`, so an
    /// unrecognized failure always fails closed.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let matches = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if matches(AUTH_MARKERS) {
            VcsError::AuthRequired(message.to_string())
        } else if matches(NETWORK_MARKERS) {
            VcsError::NetworkUnavailable(message.to_string())
        } else if matches(NOT_VERSIONED_MARKERS) {
            VcsError::NotVersioned(message.to_string())
        } else {
            VcsError::Internal(message.to_string())
        }
    }

    /// Actionable hint shown alongside a user-facing notice.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            VcsError::AuthRequired(_) => {
                Some("Re-authenticate with the repository remote, then refresh annotations")
            }
            VcsError::NetworkUnavailable(_) => {
                Some("Check your network connection and retry the annotation")
            }
            _ => None,
        }
    }
}

impl From<git2::Error> for VcsError {
    fn from(err: git2::Error) -> Self {
        use git2::{ErrorClass, ErrorCode};

        let message = err.message().to_string();
        match (err.code(), err.class()) {
            (ErrorCode::Auth, _) | (ErrorCode::Certificate, _) => VcsError::AuthRequired(message),
            (_, ErrorClass::Net) | (_, ErrorClass::Http) | (_, ErrorClass::Ssh) => {
                VcsError::NetworkUnavailable(message)
            }
            (ErrorCode::NotFound, _) => VcsError::NotVersioned(message),
            (_, ErrorClass::Repository) => VcsError::NotVersioned(message),
            _ => VcsError::classify(&message),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Version control error: {0}")]
    Vcs(#[from] VcsError),

    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Vcs(e) => {
                let status = match e.kind() {
                    ErrorKind::NotVersioned => StatusCode::NOT_FOUND,
                    ErrorKind::AuthRequired => StatusCode::UNAUTHORIZED,
                    ErrorKind::NetworkUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::Unparseable | ErrorKind::Internal => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
            AppError::RepoNotFound(path) => {
                (StatusCode::NOT_FOUND, format!("Repository not found: {}", path))
            }
            AppError::DocumentNotFound(path) => {
                (StatusCode::NOT_FOUND, format!("Document not found: {}", path))
            }
            AppError::InvalidPath(path) => {
                (StatusCode::BAD_REQUEST, format!("Invalid path: {}", path))
            }
            AppError::Config(msg) => {
                (StatusCode::BAD_REQUEST, format!("Invalid configuration: {}", msg))
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
