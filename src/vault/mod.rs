//! Storage of encrypted OAuth credential pairs.
//!
//! The vault only ever sees ciphertext: callers encrypt before `put_*` and
//! decrypt after `get_*`.

pub mod guarded;
pub mod memory;
pub mod sqlite;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerOpen, FailureKind};

pub use guarded::GuardedVault;
pub use memory::InMemoryTokenVault;
pub use sqlite::SqliteTokenVault;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Unavailable(#[from] BreakerOpen),
    #[error("Credential database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl FailureKind for VaultError {
    fn is_transient(&self) -> bool {
        false
    }

    fn trips_breaker(&self) -> bool {
        matches!(self, VaultError::Database(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    Session,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::User => "user",
            SubjectKind::Session => "session",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub subject_id: String,
    pub subject_kind: SubjectKind,
    /// The user a session belongs to; equal to `subject_id` for user records.
    pub owner_id: String,
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenVault: Send + Sync {
    async fn put_user(
        &self,
        subject: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), VaultError>;

    async fn get_user(&self, subject: &str) -> Result<Option<CredentialRecord>, VaultError>;

    async fn put_session(
        &self,
        session: &str,
        subject: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), VaultError>;

    async fn get_session(&self, session: &str) -> Result<Option<CredentialRecord>, VaultError>;

    async fn delete_session(&self, session: &str) -> Result<(), VaultError>;

    /// Remove the user's record and every session owned by the user.
    async fn delete_user(&self, subject: &str) -> Result<(), VaultError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc::now();
        let record = CredentialRecord {
            subject_id: "u1".into(),
            subject_kind: SubjectKind::User,
            owner_id: "u1".into(),
            encrypted_access_token: "a".into(),
            encrypted_refresh_token: "r".into(),
            expires_at: now,
            updated_at: now,
        };

        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - Duration::seconds(1)));
    }
}
