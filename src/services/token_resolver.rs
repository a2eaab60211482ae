use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::crypto::CredentialCipher;
use crate::error::DiscoveryError;
use crate::ports::spotify::TokenRefresher;
use crate::resilience::{soft_fail, soft_fail_sync};
use crate::spotify_rs::types::TokenGrant;
use crate::vault::{CredentialRecord, SubjectKind, TokenVault};

/// Already-verified claims of the caller's session.
#[derive(Debug, Clone, Default)]
pub struct InboundCredential {
    pub user_id: String,
    pub session_id: Option<String>,
    /// Spotify access token carried inside the caller's own session token.
    pub embedded_access_token: Option<String>,
}

impl InboundCredential {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

type RefreshLocks = Mutex<HashMap<(SubjectKind, String), Arc<tokio::sync::Mutex<()>>>>;

/// Turns an inbound credential into a live Spotify bearer token.
///
/// Precedence: embedded token, then the session record, then the user record.
/// Stored records that are expired or unreadable are refreshed with their
/// refresh token and written back before the new token is returned.
pub struct TokenResolver {
    vault: Arc<dyn TokenVault>,
    refresher: Arc<dyn TokenRefresher>,
    cipher: CredentialCipher,
    refresh_locks: RefreshLocks,
}

impl TokenResolver {
    pub fn new(
        vault: Arc<dyn TokenVault>,
        refresher: Arc<dyn TokenRefresher>,
        cipher: CredentialCipher,
    ) -> Self {
        Self {
            vault,
            refresher,
            cipher,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, credential: &InboundCredential) -> Result<String, DiscoveryError> {
        if let Some(token) = credential
            .embedded_access_token
            .as_deref()
            .filter(|token| !token.is_empty())
        {
            return Ok(token.to_string());
        }

        let now = Utc::now();
        let mut stale = Vec::new();

        if let Some(session_id) = &credential.session_id
            && let Some(record) = self.vault.get_session(session_id).await?
            && record.owner_id == credential.user_id
        {
            match self.live_token(&record, now) {
                Some(token) => return Ok(token),
                None => stale.push(record),
            }
        }

        if let Some(record) = self.vault.get_user(&credential.user_id).await? {
            match self.live_token(&record, now) {
                Some(token) => return Ok(token),
                None => stale.push(record),
            }
        }

        for record in stale {
            if let Some(token) = self.refresh(&record).await? {
                return Ok(token);
            }
        }

        tracing::info!("No usable Spotify credential for user {}", credential.user_id);
        Err(DiscoveryError::CredentialUnavailable)
    }

    /// Encrypt and store a freshly issued grant for the user and, when given,
    /// the session.
    pub async fn store_grant(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        grant: &TokenGrant,
    ) -> Result<(), DiscoveryError> {
        let refresh_token = grant.refresh_token.as_deref().ok_or_else(|| {
            DiscoveryError::InvalidRequest("token grant carries no refresh token".to_string())
        })?;

        let access_ct = self.cipher.encrypt(&grant.access_token)?;
        let refresh_ct = self.cipher.encrypt(refresh_token)?;
        let expires_at = grant.expires_at(Utc::now());

        self.vault
            .put_user(user_id, &access_ct, &refresh_ct, expires_at)
            .await?;
        if let Some(session_id) = session_id {
            self.vault
                .put_session(session_id, user_id, &access_ct, &refresh_ct, expires_at)
                .await?;
        }

        tracing::info!("Stored Spotify credential for user {}", user_id);
        Ok(())
    }

    /// Forget one session's credential.
    pub async fn end_session(&self, session_id: &str) -> Result<(), DiscoveryError> {
        self.vault.delete_session(session_id).await?;
        Ok(())
    }

    /// Forget every credential owned by the user.
    pub async fn disconnect(&self, user_id: &str) -> Result<(), DiscoveryError> {
        self.vault.delete_user(user_id).await?;
        Ok(())
    }

    fn live_token(&self, record: &CredentialRecord, now: DateTime<Utc>) -> Option<String> {
        if record.is_expired(now) {
            return None;
        }
        soft_fail_sync(
            "decrypt access token",
            self.cipher.decrypt(&record.encrypted_access_token),
        )
    }

    async fn load(&self, record: &CredentialRecord) -> Result<Option<CredentialRecord>, DiscoveryError> {
        let current = match record.subject_kind {
            SubjectKind::Session => self.vault.get_session(&record.subject_id).await?,
            SubjectKind::User => self.vault.get_user(&record.subject_id).await?,
        };
        Ok(current)
    }

    fn refresh_lock(&self, record: &CredentialRecord) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry((record.subject_kind, record.subject_id.clone()))
            .or_default()
            .clone()
    }

    fn release_lock(&self, record: &CredentialRecord, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (record.subject_kind, record.subject_id.clone());
        // Only the map and this caller hold it: nobody is waiting.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&key);
        }
    }

    /// Refresh one stored record, at most once at a time per subject.
    ///
    /// Refresh failures return `Ok(None)` so resolution can fall through;
    /// vault failures are returned as errors.
    async fn refresh(&self, record: &CredentialRecord) -> Result<Option<String>, DiscoveryError> {
        let lock = self.refresh_lock(record);
        let result = {
            let _held = lock.lock().await;
            self.refresh_locked(record).await
        };
        self.release_lock(record, lock);
        result
    }

    async fn refresh_locked(
        &self,
        record: &CredentialRecord,
    ) -> Result<Option<String>, DiscoveryError> {
        // A concurrent request may have refreshed while this one waited.
        let Some(current) = self.load(record).await? else {
            return Ok(None);
        };
        if let Some(token) = self.live_token(&current, Utc::now()) {
            return Ok(Some(token));
        }

        let Some(refresh_token) = soft_fail_sync(
            "decrypt refresh token",
            self.cipher.decrypt(&current.encrypted_refresh_token),
        ) else {
            return Ok(None);
        };

        tracing::info!(
            "Refreshing Spotify token for {} {}",
            current.subject_kind,
            current.subject_id
        );
        let Some(grant) = soft_fail(
            "refresh access token",
            self.refresher.refresh_access_token(&refresh_token),
        )
        .await
        else {
            return Ok(None);
        };

        let refresh_token = grant.refresh_token.clone().unwrap_or(refresh_token);
        let access_ct = self.cipher.encrypt(&grant.access_token)?;
        let refresh_ct = self.cipher.encrypt(&refresh_token)?;
        let expires_at = grant.expires_at(Utc::now());

        match current.subject_kind {
            SubjectKind::Session => {
                self.vault
                    .put_session(
                        &current.subject_id,
                        &current.owner_id,
                        &access_ct,
                        &refresh_ct,
                        expires_at,
                    )
                    .await?
            }
            SubjectKind::User => {
                self.vault
                    .put_user(&current.subject_id, &access_ct, &refresh_ct, expires_at)
                    .await?
            }
        }

        Ok(Some(grant.access_token))
    }
}
