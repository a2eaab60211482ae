use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::resilience::CircuitBreaker;
use crate::vault::{CredentialRecord, TokenVault, VaultError};

/// Routes every vault call through the vault's circuit breaker so an
/// unreachable store fails fast instead of stalling each request.
pub struct GuardedVault<V: TokenVault> {
    inner: V,
    breaker: Arc<CircuitBreaker>,
}

impl<V: TokenVault> GuardedVault<V> {
    pub fn new(inner: V, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait::async_trait]
impl<V: TokenVault> TokenVault for GuardedVault<V> {
    async fn put_user(
        &self,
        subject: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        self.breaker
            .call(|| self.inner.put_user(subject, access_ct, refresh_ct, expires_at))
            .await
    }

    async fn get_user(&self, subject: &str) -> Result<Option<CredentialRecord>, VaultError> {
        self.breaker.call(|| self.inner.get_user(subject)).await
    }

    async fn put_session(
        &self,
        session: &str,
        subject: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        self.breaker
            .call(|| {
                self.inner
                    .put_session(session, subject, access_ct, refresh_ct, expires_at)
            })
            .await
    }

    async fn get_session(&self, session: &str) -> Result<Option<CredentialRecord>, VaultError> {
        self.breaker.call(|| self.inner.get_session(session)).await
    }

    async fn delete_session(&self, session: &str) -> Result<(), VaultError> {
        self.breaker.call(|| self.inner.delete_session(session)).await
    }

    async fn delete_user(&self, subject: &str) -> Result<(), VaultError> {
        self.breaker.call(|| self.inner.delete_user(subject)).await
    }
}
