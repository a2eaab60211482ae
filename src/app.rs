use std::sync::Arc;
use std::time::Duration;

use color_eyre::{Result, eyre::Context};

use crate::config::{Config, VaultBackend};
use crate::crypto::CredentialCipher;
use crate::database::Database;
use crate::resilience::{
    BreakerRegistry, BreakerSnapshot, CircuitBreaker, RandomSource, RetryExecutor, ThreadRandom,
};
use crate::services::cache::{CacheStore, MemoryStore, NullStore, ResultCache};
use crate::services::discovery::DiscoveryService;
use crate::services::recommendations::RecommendationSynthesizer;
use crate::services::token_resolver::TokenResolver;
use crate::spotify_rs::client::SpotifyGateway;
use crate::vault::{GuardedVault, InMemoryTokenVault, SqliteTokenVault, TokenVault};

/// Everything a host needs, wired from one `Config`.
pub struct App {
    pub config: Config,
    pub breakers: BreakerRegistry,
    pub gateway: Arc<SpotifyGateway>,
    pub resolver: Arc<TokenResolver>,
    pub discovery: DiscoveryService<SpotifyGateway>,
}

impl App {
    pub async fn build(config: Config) -> Result<Self> {
        config.validate().wrap_err("Invalid configuration")?;

        let mut breakers = BreakerRegistry::new();
        let spotify_breaker = breakers.register(Arc::new(CircuitBreaker::new(
            "spotify",
            config.breakers.spotify.failure_threshold,
            config.breakers.spotify.recovery_timeout(),
        )));
        let vault_breaker = breakers.register(Arc::new(CircuitBreaker::new(
            "token_vault",
            config.breakers.token_vault.failure_threshold,
            config.breakers.token_vault.recovery_timeout(),
        )));

        let random: Arc<dyn RandomSource> = Arc::new(ThreadRandom);
        let gateway = Arc::new(SpotifyGateway::new(
            config.gateway(),
            spotify_breaker,
            RetryExecutor::new(config.retry.policy(), random.clone()),
        ));
        if config.spotify_credentials().is_none() {
            tracing::warn!("Spotify client id/secret not configured; token refresh is disabled");
        }

        let vault: Arc<dyn TokenVault> = match config.vault.backend {
            VaultBackend::Sqlite => {
                let path = config.database_path();
                tracing::debug!("Opening credential vault at: {}", path.display());
                let db = Arc::new(Database::open(&path).await?);
                Arc::new(GuardedVault::new(SqliteTokenVault::new(db), vault_breaker))
            }
            VaultBackend::Memory => {
                tracing::warn!("Using in-memory credential vault; credentials are lost on exit");
                Arc::new(GuardedVault::new(InMemoryTokenVault::new(), vault_breaker))
            }
        };

        let cipher = CredentialCipher::from_key(config.vault.crypto_key.as_deref());
        let resolver = Arc::new(TokenResolver::new(vault, gateway.clone(), cipher));

        let store: Arc<dyn CacheStore> = if config.cache.enabled {
            Arc::new(MemoryStore::new(config.cache.max_entries))
        } else {
            Arc::new(NullStore)
        };
        let cache = ResultCache::new(store, Duration::from_secs(config.cache.ttl_secs));

        let synthesizer = RecommendationSynthesizer::new(
            gateway.clone(),
            config.recommendations.settings(),
            random,
        );
        let discovery = DiscoveryService::new(resolver.clone(), synthesizer, cache);

        Ok(Self {
            config,
            breakers,
            gateway,
            resolver,
            discovery,
        })
    }

    /// Breaker states for health reporting.
    pub fn health(&self) -> Vec<BreakerSnapshot> {
        self.breakers.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::resilience::CircuitState;
    use crate::services::token_resolver::InboundCredential;
    use crate::spotify_rs::types::TokenGrant;

    #[tokio::test]
    async fn test_build_with_memory_vault() {
        let config = Config {
            vault: VaultConfig {
                backend: VaultBackend::Memory,
                ..Default::default()
            },
            ..Default::default()
        };

        let app = App::build(config).await.unwrap();
        let health = app.health();

        let names: Vec<_> = health.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["spotify", "token_vault"]);
        assert!(health.iter().all(|b| b.state == CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_sqlite_vault_persists_grants() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            vault: VaultConfig {
                backend: VaultBackend::Sqlite,
                database_path: Some(dir.path().join("vault.db").display().to_string()),
                crypto_key: Some("persistent-key".into()),
            },
            ..Default::default()
        };

        let grant = TokenGrant {
            access_token: "stored".into(),
            refresh_token: Some("refresh".into()),
            expires_in: 3600,
        };

        {
            let app = App::build(config.clone()).await.unwrap();
            app.resolver.store_grant("u1", None, &grant).await.unwrap();
        }

        let app = App::build(config).await.unwrap();
        let token = app
            .resolver
            .resolve(&InboundCredential::user("u1"))
            .await
            .unwrap();
        assert_eq!(token, "stored");
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.recommendations.max_seeds = 0;
        assert!(App::build(config).await.is_err());
    }
}
