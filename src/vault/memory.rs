use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::vault::{CredentialRecord, SubjectKind, TokenVault, VaultError};

/// Process-local vault for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryTokenVault {
    records: RwLock<HashMap<(SubjectKind, String), CredentialRecord>>,
}

impl InMemoryTokenVault {
    pub fn new() -> Self {
        Self::default()
    }

    async fn put(
        &self,
        kind: SubjectKind,
        subject: &str,
        owner: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) {
        let record = CredentialRecord {
            subject_id: subject.to_string(),
            subject_kind: kind,
            owner_id: owner.to_string(),
            encrypted_access_token: access_ct.to_string(),
            encrypted_refresh_token: refresh_ct.to_string(),
            expires_at,
            updated_at: Utc::now(),
        };
        self.records
            .write()
            .await
            .insert((kind, subject.to_string()), record);
    }

    async fn get(&self, kind: SubjectKind, subject: &str) -> Option<CredentialRecord> {
        self.records
            .read()
            .await
            .get(&(kind, subject.to_string()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl TokenVault for InMemoryTokenVault {
    async fn put_user(
        &self,
        subject: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        self.put(SubjectKind::User, subject, subject, access_ct, refresh_ct, expires_at)
            .await;
        Ok(())
    }

    async fn get_user(&self, subject: &str) -> Result<Option<CredentialRecord>, VaultError> {
        Ok(self.get(SubjectKind::User, subject).await)
    }

    async fn put_session(
        &self,
        session: &str,
        subject: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        self.put(SubjectKind::Session, session, subject, access_ct, refresh_ct, expires_at)
            .await;
        Ok(())
    }

    async fn get_session(&self, session: &str) -> Result<Option<CredentialRecord>, VaultError> {
        Ok(self.get(SubjectKind::Session, session).await)
    }

    async fn delete_session(&self, session: &str) -> Result<(), VaultError> {
        self.records
            .write()
            .await
            .remove(&(SubjectKind::Session, session.to_string()));
        Ok(())
    }

    async fn delete_user(&self, subject: &str) -> Result<(), VaultError> {
        self.records
            .write()
            .await
            .retain(|_, record| record.owner_id != subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let vault = InMemoryTokenVault::new();
        assert!(vault.get_user("nobody").await.unwrap().is_none());
        assert!(vault.get_session("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_user_upserts() {
        let vault = InMemoryTokenVault::new();
        let expires = Utc::now() + Duration::hours(1);
        vault.put_user("u1", "a1", "r1", expires).await.unwrap();
        vault.put_user("u1", "a2", "r2", expires).await.unwrap();

        let record = vault.get_user("u1").await.unwrap().unwrap();
        assert_eq!(record.encrypted_access_token, "a2");
        assert_eq!(record.encrypted_refresh_token, "r2");
        assert_eq!(record.subject_kind, SubjectKind::User);
        assert_eq!(record.owner_id, "u1");
    }

    #[tokio::test]
    async fn test_session_and_user_are_separate() {
        let vault = InMemoryTokenVault::new();
        let expires = Utc::now() + Duration::hours(1);
        vault.put_user("same", "user-a", "user-r", expires).await.unwrap();
        vault
            .put_session("same", "u1", "session-a", "session-r", expires)
            .await
            .unwrap();

        let user = vault.get_user("same").await.unwrap().unwrap();
        let session = vault.get_session("same").await.unwrap().unwrap();
        assert_eq!(user.encrypted_access_token, "user-a");
        assert_eq!(session.encrypted_access_token, "session-a");
        assert_eq!(session.owner_id, "u1");
    }

    #[tokio::test]
    async fn test_delete_session() {
        let vault = InMemoryTokenVault::new();
        let expires = Utc::now() + Duration::hours(1);
        vault.put_session("s1", "u1", "a", "r", expires).await.unwrap();
        vault.delete_session("s1").await.unwrap();
        vault.delete_session("s1").await.unwrap();

        assert!(vault.get_session("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_user_removes_owned_sessions() {
        let vault = InMemoryTokenVault::new();
        let expires = Utc::now() + Duration::hours(1);
        vault.put_user("u1", "a", "r", expires).await.unwrap();
        vault.put_session("s1", "u1", "a", "r", expires).await.unwrap();
        vault.put_session("s2", "u2", "a", "r", expires).await.unwrap();

        vault.delete_user("u1").await.unwrap();

        assert!(vault.get_user("u1").await.unwrap().is_none());
        assert!(vault.get_session("s1").await.unwrap().is_none());
        assert!(vault.get_session("s2").await.unwrap().is_some());
    }
}
