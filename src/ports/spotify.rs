use crate::error::SpotifyError;
use crate::spotify_rs::client::SpotifyGateway;
use crate::spotify_rs::types::{SpotifyArtist, SpotifyTrack, TimeRange, TokenGrant};

/// Catalog reads the recommendation synthesizer is built on.
///
/// Implemented by `SpotifyGateway` in production and by mocks in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SpotifyCatalog: Send + Sync {
    async fn top_artists(
        &self,
        token: &str,
        limit: u32,
        time_range: TimeRange,
    ) -> Result<Vec<SpotifyArtist>, SpotifyError>;

    async fn artist_top_tracks(
        &self,
        token: &str,
        artist_id: &str,
        market: &str,
    ) -> Result<Vec<SpotifyTrack>, SpotifyError>;

    async fn track(&self, token: &str, track_id: &str)
    -> Result<Option<SpotifyTrack>, SpotifyError>;

    async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: u32,
        market: &str,
    ) -> Result<Vec<SpotifyTrack>, SpotifyError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, SpotifyError>;
}

#[async_trait::async_trait]
impl SpotifyCatalog for SpotifyGateway {
    async fn top_artists(
        &self,
        token: &str,
        limit: u32,
        time_range: TimeRange,
    ) -> Result<Vec<SpotifyArtist>, SpotifyError> {
        SpotifyGateway::top_artists(self, token, limit, time_range).await
    }

    async fn artist_top_tracks(
        &self,
        token: &str,
        artist_id: &str,
        market: &str,
    ) -> Result<Vec<SpotifyTrack>, SpotifyError> {
        SpotifyGateway::artist_top_tracks(self, token, artist_id, market).await
    }

    async fn track(
        &self,
        token: &str,
        track_id: &str,
    ) -> Result<Option<SpotifyTrack>, SpotifyError> {
        SpotifyGateway::track(self, token, track_id).await
    }

    async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: u32,
        market: &str,
    ) -> Result<Vec<SpotifyTrack>, SpotifyError> {
        SpotifyGateway::search_tracks(self, token, query, limit, market).await
    }
}

#[async_trait::async_trait]
impl TokenRefresher for SpotifyGateway {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, SpotifyError> {
        SpotifyGateway::refresh_access_token(self, refresh_token).await
    }
}
