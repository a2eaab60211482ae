use std::time::Duration;

use reqwest::StatusCode;

use crate::crypto::{DecryptionError, EncryptionError};
use crate::resilience::{BreakerOpen, FailureKind};
use crate::vault::VaultError;

/// Failures of a single call against the Spotify Web API, tagged by kind so
/// callers can tell re-authentication apart from throttling and outages.
#[derive(Debug, thiserror::Error)]
pub enum SpotifyError {
    #[error("Spotify rejected the bearer token")]
    Unauthorized,
    #[error("Rate limited by Spotify, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("Spotify resource not found: {url}")]
    NotFound { url: String },
    #[error("Spotify returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to send http request: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error(transparent)]
    BreakerOpen(#[from] BreakerOpen),
    #[error("Spotify client credentials are not configured")]
    MissingClientCredentials,
}

impl FailureKind for SpotifyError {
    fn is_transient(&self) -> bool {
        match self {
            SpotifyError::RateLimited { .. } => true,
            SpotifyError::Status { status, .. } => status.is_server_error(),
            SpotifyError::Transport(error) => !error.is_builder(),
            SpotifyError::Unauthorized
            | SpotifyError::NotFound { .. }
            | SpotifyError::Decode(_)
            | SpotifyError::BreakerOpen(_)
            | SpotifyError::MissingClientCredentials => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SpotifyError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Errors surfaced by the discovery core to its host.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("No usable Spotify credential for this caller")]
    CredentialUnavailable,
    #[error("Dependency {dependency} is unavailable")]
    DependencyUnavailable { dependency: String },
    #[error("Upstream request failed: {0}")]
    UpstreamRequestFailed(#[source] SpotifyError),
    #[error("Rate limited upstream, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error(transparent)]
    Decryption(#[from] DecryptionError),
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Credential store failed: {0}")]
    Store(#[source] VaultError),
}

impl DiscoveryError {
    /// HTTP status a host should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DiscoveryError::CredentialUnavailable | DiscoveryError::Decryption(_) => {
                StatusCode::UNAUTHORIZED
            }
            DiscoveryError::DependencyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DiscoveryError::UpstreamRequestFailed(_) | DiscoveryError::RateLimited { .. } => {
                StatusCode::BAD_GATEWAY
            }
            DiscoveryError::NotFound(_) => StatusCode::NOT_FOUND,
            DiscoveryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DiscoveryError::Encryption(_) | DiscoveryError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<SpotifyError> for DiscoveryError {
    fn from(error: SpotifyError) -> Self {
        match error {
            SpotifyError::Unauthorized => DiscoveryError::CredentialUnavailable,
            SpotifyError::RateLimited { retry_after } => DiscoveryError::RateLimited { retry_after },
            SpotifyError::NotFound { url } => DiscoveryError::NotFound(url),
            SpotifyError::BreakerOpen(open) => DiscoveryError::DependencyUnavailable {
                dependency: open.name,
            },
            error @ (SpotifyError::Status { .. }
            | SpotifyError::Transport(_)
            | SpotifyError::Decode(_)
            | SpotifyError::MissingClientCredentials) => {
                DiscoveryError::UpstreamRequestFailed(error)
            }
        }
    }
}

impl From<VaultError> for DiscoveryError {
    fn from(error: VaultError) -> Self {
        match error {
            VaultError::Unavailable(open) => DiscoveryError::DependencyUnavailable {
                dependency: open.name,
            },
            error @ VaultError::Database(_) => DiscoveryError::Store(error),
        }
    }
}
