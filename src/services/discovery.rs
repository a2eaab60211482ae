use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::DiscoveryError;
use crate::ports::spotify::SpotifyCatalog;
use crate::services::cache::ResultCache;
use crate::services::recommendations::{
    RecommendationMetadata, RecommendationRequest, RecommendationSynthesizer, Recommendations,
    SeedSet, Track,
};
use crate::services::token_resolver::{InboundCredential, TokenResolver};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub tracks: Vec<Track>,
    pub metadata: RecommendationMetadata,
    pub cached: bool,
}

impl RecommendationResponse {
    fn new(recommendations: Recommendations, cached: bool) -> Self {
        Self {
            tracks: recommendations.tracks,
            metadata: recommendations.metadata,
            cached,
        }
    }
}

/// Recommendation entry point for hosts: credential in, tracks out.
pub struct DiscoveryService<C: SpotifyCatalog> {
    resolver: Arc<TokenResolver>,
    synthesizer: RecommendationSynthesizer<C>,
    cache: ResultCache,
}

impl<C: SpotifyCatalog> DiscoveryService<C> {
    pub fn new(
        resolver: Arc<TokenResolver>,
        synthesizer: RecommendationSynthesizer<C>,
        cache: ResultCache,
    ) -> Self {
        Self {
            resolver,
            synthesizer,
            cache,
        }
    }

    pub fn resolver(&self) -> &Arc<TokenResolver> {
        &self.resolver
    }

    #[instrument(skip(self, credential, request), fields(user_id = %credential.user_id))]
    pub async fn recommend(
        &self,
        credential: &InboundCredential,
        request: RecommendationRequest,
    ) -> Result<RecommendationResponse, DiscoveryError> {
        let seeds = SeedSet::from_request(request, self.synthesizer.settings())?;
        let token = self.resolver.resolve(credential).await?;

        let key = ResultCache::key(&credential.user_id, &seeds);
        if let Some(cached) = self.cache.get::<Recommendations>(&key).await {
            tracing::debug!("Serving recommendations from cache");
            return Ok(RecommendationResponse::new(cached, true));
        }

        let recommendations = self.synthesizer.synthesize(&token, &seeds).await?;
        self.cache.set(&key, &recommendations).await;

        Ok(RecommendationResponse::new(recommendations, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CredentialCipher;
    use crate::error::SpotifyError;
    use crate::ports::spotify::{MockSpotifyCatalog, MockTokenRefresher};
    use crate::resilience::{BreakerOpen, SeededRandom};
    use crate::services::cache::{MemoryStore, NullStore};
    use crate::services::recommendations::{Strategy, SynthesizerSettings};
    use crate::test_utils::track;
    use crate::vault::InMemoryTokenVault;
    use reqwest::StatusCode;
    use std::time::Duration;

    fn service(
        catalog: MockSpotifyCatalog,
        cache: ResultCache,
    ) -> DiscoveryService<MockSpotifyCatalog> {
        let resolver = TokenResolver::new(
            Arc::new(InMemoryTokenVault::new()),
            Arc::new(MockTokenRefresher::new()),
            CredentialCipher::new("test-key"),
        );
        DiscoveryService::new(
            Arc::new(resolver),
            RecommendationSynthesizer::new(
                Arc::new(catalog),
                SynthesizerSettings::default(),
                Arc::new(SeededRandom::new(3)),
            ),
            cache,
        )
    }

    fn credential() -> InboundCredential {
        InboundCredential {
            user_id: "u1".into(),
            session_id: None,
            embedded_access_token: Some("token".into()),
        }
    }

    fn request() -> RecommendationRequest {
        RecommendationRequest {
            genres: vec!["rock".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let mut catalog = MockSpotifyCatalog::new();
        catalog
            .expect_search_tracks()
            .times(1)
            .returning(|token, _, _, _| {
                assert_eq!(token.to_string(), "token");
                Ok(vec![track("t1", "a1", 50, "2020")])
            });

        let cache = ResultCache::new(Arc::new(MemoryStore::new(10)), Duration::from_secs(300));
        let service = service(catalog, cache);

        let first = service.recommend(&credential(), request()).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.metadata.strategy, Strategy::ExplicitGenres);

        let second = service.recommend(&credential(), request()).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.tracks, first.tracks);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_synthesizes() {
        let mut catalog = MockSpotifyCatalog::new();
        catalog
            .expect_search_tracks()
            .times(2)
            .returning(|_, _, _, _| Ok(vec![]));

        let service = service(
            catalog,
            ResultCache::new(Arc::new(NullStore), Duration::from_secs(300)),
        );

        assert!(!service.recommend(&credential(), request()).await.unwrap().cached);
        assert!(!service.recommend(&credential(), request()).await.unwrap().cached);
    }

    #[tokio::test]
    async fn test_missing_credential_is_unauthorized() {
        let service = service(
            MockSpotifyCatalog::new(),
            ResultCache::new(Arc::new(NullStore), Duration::from_secs(300)),
        );

        let error = service
            .recommend(&InboundCredential::user("u1"), request())
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_date_rejected_before_upstream() {
        let service = service(
            MockSpotifyCatalog::new(),
            ResultCache::new(Arc::new(NullStore), Duration::from_secs(300)),
        );
        let request = RecommendationRequest {
            released_after: Some("2020-13-45".into()),
            ..request()
        };

        let error = service.recommend(&credential(), request).await.unwrap_err();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_open_breaker_is_service_unavailable() {
        let mut catalog = MockSpotifyCatalog::new();
        catalog.expect_search_tracks().returning(|_, _, _, _| {
            Err(SpotifyError::BreakerOpen(BreakerOpen {
                name: "spotify".into(),
            }))
        });

        let service = service(
            catalog,
            ResultCache::new(Arc::new(NullStore), Duration::from_secs(300)),
        );

        let error = service.recommend(&credential(), request()).await.unwrap_err();
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
