use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::SpotifyError;
use crate::resilience::{CircuitBreaker, RetryExecutor};
use crate::spotify_rs::auth::{
    SpotifyApiCredentials, authorization_code_form, basic_auth_header, client_credentials_form,
    refresh_token_form,
};
use crate::spotify_rs::types::{
    ArtistTopTracks, MAX_TOKEN_LIFETIME, NewPlaylist, Paging, PlaylistChanges, SearchResponse,
    SpotifyArtist, SpotifyPlaylist, SpotifyTokenResponse, SpotifyTrack, SpotifyUser, TimeRange,
    TokenGrant,
};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
pub const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";

/// Cached app tokens are renewed this long before Spotify expires them.
const APP_TOKEN_MARGIN: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_base: String,
    pub accounts_base: String,
    pub credentials: Option<SpotifyApiCredentials>,
    pub timeout: Duration,
    /// Client-side request pacing. `None` leaves pacing to Spotify's 429s.
    pub requests_per_second: Option<NonZeroU32>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            accounts_base: DEFAULT_ACCOUNTS_BASE.to_string(),
            credentials: None,
            timeout: Duration::from_secs(10),
            requests_per_second: None,
        }
    }
}

#[derive(Debug)]
enum Auth {
    Bearer(String),
    Basic,
}

#[derive(Debug)]
enum Payload {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(&'static str, String)>),
}

#[derive(Debug)]
struct ApiRequest {
    method: Method,
    url: String,
    auth: Auth,
    payload: Payload,
}

impl ApiRequest {
    fn get(url: String, token: &str) -> Self {
        Self {
            method: Method::GET,
            url,
            auth: Auth::Bearer(token.to_string()),
            payload: Payload::Empty,
        }
    }

    fn token(url: String, form: Vec<(&'static str, String)>) -> Self {
        Self {
            method: Method::POST,
            url,
            auth: Auth::Basic,
            payload: Payload::Form(form),
        }
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Typed access to the Spotify Web API.
///
/// Every request runs as `breaker(retry(send))`: transient failures are retried
/// with backoff and the breaker records one outcome per exhausted sequence.
pub struct SpotifyGateway {
    client: reqwest::Client,
    config: GatewayConfig,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    app_token: Mutex<Option<CachedToken>>,
    rate_limiter: Option<DirectRateLimiter>,
}

impl SpotifyGateway {
    pub fn new(config: GatewayConfig, breaker: Arc<CircuitBreaker>, retry: RetryExecutor) -> Self {
        let rate_limiter = config
            .requests_per_second
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        Self {
            client: reqwest::Client::new(),
            config,
            breaker,
            retry,
            app_token: Mutex::new(None),
            rate_limiter,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn token_url(&self) -> String {
        format!(
            "{}/api/token",
            self.config.accounts_base.trim_end_matches('/')
        )
    }

    fn credentials(&self) -> Result<&SpotifyApiCredentials, SpotifyError> {
        self.config
            .credentials
            .as_ref()
            .ok_or(SpotifyError::MissingClientCredentials)
    }

    async fn api_call(&self, request: ApiRequest) -> Result<String, SpotifyError> {
        self.breaker
            .call(|| self.retry.execute(|| self.send_once(&request)))
            .await
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<String, SpotifyError> {
        if let Some(rate_limiter) = &self.rate_limiter {
            rate_limiter.until_ready().await;
        }

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(self.config.timeout);

        builder = match &request.auth {
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Basic => builder.header(AUTHORIZATION, basic_auth_header(self.credentials()?)),
        };

        builder = match &request.payload {
            Payload::Empty => builder,
            // This automatically serializes to x-www-form-urlencoded (as required by spotify)
            Payload::Form(form) => builder.form(form),
            Payload::Json(body) => builder.json(body),
        };

        tracing::debug!("{} {}", request.method, request.url);

        let response = builder.send().await.map_err(SpotifyError::Transport)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(SpotifyError::RateLimited { retry_after });
        }

        let body = response.text().await.map_err(SpotifyError::Transport)?;

        match status {
            status if status.is_success() => Ok(body),
            StatusCode::UNAUTHORIZED => Err(SpotifyError::Unauthorized),
            StatusCode::NOT_FOUND => Err(SpotifyError::NotFound {
                url: request.url.clone(),
            }),
            status => Err(SpotifyError::Status { status, body }),
        }
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, SpotifyError> {
        let body = self.api_call(request).await?;
        serde_json::from_str(&body).map_err(SpotifyError::Decode)
    }

    async fn token_grant(
        &self,
        form: Vec<(&'static str, String)>,
    ) -> Result<SpotifyTokenResponse, SpotifyError> {
        self.credentials()?;
        self.request_json(ApiRequest::token(self.token_url(), form))
            .await
    }

    /// Client-credentials token for catalog calls made without a user.
    ///
    /// Cached until shortly before expiry. The lock is held across the fetch so
    /// concurrent callers wait for one token request.
    pub async fn app_token(&self) -> Result<String, SpotifyError> {
        let mut cached = self.app_token.lock().await;

        if let Some(token) = cached.as_ref()
            && Instant::now() + APP_TOKEN_MARGIN < token.expires_at
        {
            return Ok(token.access_token.clone());
        }

        tracing::info!("Requesting Spotify client credentials token");
        let response = self.token_grant(client_credentials_form()).await?;

        *cached = Some(CachedToken {
            access_token: response.access_token.clone(),
            expires_at: Instant::now()
                + Duration::from_secs(response.expires_in.min(MAX_TOKEN_LIFETIME)),
        });

        Ok(response.access_token)
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenGrant, SpotifyError> {
        let response = self.token_grant(refresh_token_form(refresh_token)).await?;
        Ok(response.into())
    }

    /// Exchange an authorization code for a token pair
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, SpotifyError> {
        let response = self
            .token_grant(authorization_code_form(code, redirect_uri))
            .await?;
        Ok(response.into())
    }

    /// Get the current user's profile
    pub async fn current_user(&self, token: &str) -> Result<SpotifyUser, SpotifyError> {
        self.request_json(ApiRequest::get(self.api_url("/me"), token))
            .await
    }

    pub async fn top_artists(
        &self,
        token: &str,
        limit: u32,
        time_range: TimeRange,
    ) -> Result<Vec<SpotifyArtist>, SpotifyError> {
        let url = self.api_url(&format!(
            "/me/top/artists?limit={}&time_range={}",
            limit.clamp(1, 50),
            time_range
        ));
        let page: Paging<SpotifyArtist> = self.request_json(ApiRequest::get(url, token)).await?;
        Ok(page.items)
    }

    pub async fn top_tracks(
        &self,
        token: &str,
        limit: u32,
        time_range: TimeRange,
    ) -> Result<Vec<SpotifyTrack>, SpotifyError> {
        let url = self.api_url(&format!(
            "/me/top/tracks?limit={}&time_range={}",
            limit.clamp(1, 50),
            time_range
        ));
        let page: Paging<SpotifyTrack> = self.request_json(ApiRequest::get(url, token)).await?;
        Ok(page.items)
    }

    pub async fn artist(
        &self,
        token: &str,
        artist_id: &str,
    ) -> Result<Option<SpotifyArtist>, SpotifyError> {
        let url = self.api_url(&format!("/artists/{}", urlencoding::encode(artist_id)));
        found(self.request_json(ApiRequest::get(url, token)).await)
    }

    pub async fn artist_top_tracks(
        &self,
        token: &str,
        artist_id: &str,
        market: &str,
    ) -> Result<Vec<SpotifyTrack>, SpotifyError> {
        let url = self.api_url(&format!(
            "/artists/{}/top-tracks?market={}",
            urlencoding::encode(artist_id),
            urlencoding::encode(market)
        ));
        let response: ArtistTopTracks = self.request_json(ApiRequest::get(url, token)).await?;
        Ok(response.tracks)
    }

    pub async fn track(
        &self,
        token: &str,
        track_id: &str,
    ) -> Result<Option<SpotifyTrack>, SpotifyError> {
        let url = self.api_url(&format!("/tracks/{}", urlencoding::encode(track_id)));
        found(self.request_json(ApiRequest::get(url, token)).await)
    }

    async fn search(
        &self,
        token: &str,
        query: &str,
        kind: &str,
        limit: u32,
        market: Option<&str>,
    ) -> Result<SearchResponse, SpotifyError> {
        let mut url = self.api_url(&format!(
            "/search?q={}&type={}&limit={}",
            urlencoding::encode(query),
            kind,
            limit.clamp(1, 50)
        ));
        if let Some(market) = market {
            url.push_str(&format!("&market={}", urlencoding::encode(market)));
        }
        self.request_json(ApiRequest::get(url, token)).await
    }

    pub async fn search_artists(
        &self,
        token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SpotifyArtist>, SpotifyError> {
        let response = self.search(token, query, "artist", limit, None).await?;
        Ok(response.artists.map(|page| page.items).unwrap_or_default())
    }

    pub async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: u32,
        market: &str,
    ) -> Result<Vec<SpotifyTrack>, SpotifyError> {
        let response = self
            .search(token, query, "track", limit, Some(market))
            .await?;
        Ok(response.tracks.map(|page| page.items).unwrap_or_default())
    }

    /// Get all playlists for the current user
    pub async fn user_playlists(&self, token: &str) -> Result<Vec<SpotifyPlaylist>, SpotifyError> {
        let mut all_playlists = Vec::new();
        let mut next_url = Some(self.api_url("/me/playlists?limit=50"));

        while let Some(url) = next_url {
            let page: Paging<SpotifyPlaylist> =
                self.request_json(ApiRequest::get(url, token)).await?;
            all_playlists.extend(page.items);
            next_url = page.next;
        }

        Ok(all_playlists)
    }

    pub async fn playlist(
        &self,
        token: &str,
        playlist_id: &str,
    ) -> Result<Option<SpotifyPlaylist>, SpotifyError> {
        let url = self.api_url(&format!("/playlists/{}", urlencoding::encode(playlist_id)));
        found(self.request_json(ApiRequest::get(url, token)).await)
    }

    pub async fn create_playlist(
        &self,
        token: &str,
        user_id: &str,
        playlist: &NewPlaylist,
    ) -> Result<SpotifyPlaylist, SpotifyError> {
        let body = serde_json::to_value(playlist).map_err(SpotifyError::Decode)?;
        let request = ApiRequest {
            method: Method::POST,
            url: self.api_url(&format!("/users/{}/playlists", urlencoding::encode(user_id))),
            auth: Auth::Bearer(token.to_string()),
            payload: Payload::Json(body),
        };
        self.request_json(request).await
    }

    pub async fn update_playlist(
        &self,
        token: &str,
        playlist_id: &str,
        changes: &PlaylistChanges,
    ) -> Result<(), SpotifyError> {
        let body = serde_json::to_value(changes).map_err(SpotifyError::Decode)?;
        let request = ApiRequest {
            method: Method::PUT,
            url: self.api_url(&format!("/playlists/{}", urlencoding::encode(playlist_id))),
            auth: Auth::Bearer(token.to_string()),
            payload: Payload::Json(body),
        };
        self.api_call(request).await?;
        Ok(())
    }

    /// Spotify has no playlist deletion; unfollowing removes it from the owner's library.
    pub async fn delete_playlist(&self, token: &str, playlist_id: &str) -> Result<(), SpotifyError> {
        let request = ApiRequest {
            method: Method::DELETE,
            url: self.api_url(&format!(
                "/playlists/{}/followers",
                urlencoding::encode(playlist_id)
            )),
            auth: Auth::Bearer(token.to_string()),
            payload: Payload::Empty,
        };
        self.api_call(request).await?;
        Ok(())
    }
}

fn found<T>(result: Result<T, SpotifyError>) -> Result<Option<T>, SpotifyError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SpotifyError::NotFound { .. }) => Ok(None),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{RetryPolicy, SeededRandom};
    use crate::test_utils::{spawn_upstream, track_json};
    use axum::extract::{Form, Query, State};
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Hits = Arc<AtomicUsize>;

    fn gateway(base: &str) -> SpotifyGateway {
        let config = GatewayConfig {
            api_base: base.to_string(),
            accounts_base: base.to_string(),
            credentials: Some(SpotifyApiCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            }),
            ..GatewayConfig::default()
        };
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            base: 2.0,
            jitter: false,
        };
        SpotifyGateway::new(
            config,
            Arc::new(CircuitBreaker::new("spotify", 5, Duration::from_secs(60))),
            RetryExecutor::new(policy, Arc::new(SeededRandom::new(1))),
        )
    }

    #[tokio::test]
    async fn test_rate_limited_then_success() {
        let hits: Hits = Arc::new(AtomicUsize::new(0));
        let state = hits.clone();
        let base = spawn_upstream(move |_| {
            Router::new()
                .route(
                    "/tracks/{id}",
                    get(|State(hits): State<Hits>| async move {
                        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                            (
                                axum::http::StatusCode::TOO_MANY_REQUESTS,
                                [("Retry-After", "0")],
                            )
                                .into_response()
                        } else {
                            Json(track_json("t1", 50, "2020-01-01")).into_response()
                        }
                    }),
                )
                .with_state(state)
        })
        .await;

        let track = gateway(&base).track("token", "t1").await.unwrap().unwrap();

        assert_eq!(track.id, "t1");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let hits: Hits = Arc::new(AtomicUsize::new(0));
        let state = hits.clone();
        let base = spawn_upstream(move |_| {
            Router::new()
                .route(
                    "/me",
                    get(|State(hits): State<Hits>| async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        axum::http::StatusCode::UNAUTHORIZED
                    }),
                )
                .with_state(state)
        })
        .await;

        let gateway = gateway(&base);
        let result = gateway.current_user("expired").await;

        assert!(matches!(result, Err(SpotifyError::Unauthorized)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_not_found_lookup_is_none() {
        let base = spawn_upstream(|_| {
            Router::new().route(
                "/artists/{id}",
                get(|| async { axum::http::StatusCode::NOT_FOUND }),
            )
        })
        .await;

        assert!(gateway(&base).artist("token", "gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries_and_count_once() {
        let hits: Hits = Arc::new(AtomicUsize::new(0));
        let state = hits.clone();
        let base = spawn_upstream(move |_| {
            Router::new()
                .route(
                    "/artists/{id}/top-tracks",
                    get(|State(hits): State<Hits>| async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        (axum::http::StatusCode::BAD_GATEWAY, "upstream down")
                    }),
                )
                .with_state(state)
        })
        .await;

        let gateway = gateway(&base);
        let result = gateway.artist_top_tracks("token", "a1", "US").await;

        match result {
            Err(SpotifyError::Status { status, body }) => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected result: {:?}", other.map(|t| t.len())),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert_eq!(gateway.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_search_tracks_sends_query_and_market() {
        let base = spawn_upstream(|_| {
            Router::new().route(
                "/search",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    assert_eq!(params.get("q").map(String::as_str), Some("genre:\"hip-hop\""));
                    assert_eq!(params.get("type").map(String::as_str), Some("track"));
                    assert_eq!(params.get("market").map(String::as_str), Some("SE"));
                    Json(serde_json::json!({
                        "tracks": { "items": [track_json("t9", 70, "2021")], "next": null }
                    }))
                }),
            )
        })
        .await;

        let tracks = gateway(&base)
            .search_tracks("token", "genre:\"hip-hop\"", 20, "SE")
            .await
            .unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "t9");
    }

    #[tokio::test]
    async fn test_user_playlists_follows_next() {
        let base = spawn_upstream(|base| {
            let next = format!("{}/me/playlists-page-2", base);
            Router::new()
                .route(
                    "/me/playlists",
                    get(move || {
                        let next = next.clone();
                        async move {
                            Json(serde_json::json!({
                                "items": [{ "id": "p1", "name": "One" }],
                                "next": next
                            }))
                        }
                    }),
                )
                .route(
                    "/me/playlists-page-2",
                    get(|| async {
                        Json(serde_json::json!({
                            "items": [{ "id": "p2", "name": "Two" }],
                            "next": null
                        }))
                    }),
                )
        })
        .await;

        let playlists = gateway(&base).user_playlists("token").await.unwrap();
        let ids: Vec<_> = playlists.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_app_token_is_cached() {
        let hits: Hits = Arc::new(AtomicUsize::new(0));
        let state = hits.clone();
        let base = spawn_upstream(move |_| {
            Router::new()
                .route(
                    "/api/token",
                    post(
                        |State(hits): State<Hits>,
                         headers: HeaderMap,
                         Form(form): Form<HashMap<String, String>>| async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            assert_eq!(
                                headers.get("authorization").unwrap(),
                                "Basic aWQ6c2VjcmV0"
                            );
                            assert_eq!(
                                form.get("grant_type").map(String::as_str),
                                Some("client_credentials")
                            );
                            Json(serde_json::json!({
                                "access_token": "app-token",
                                "token_type": "Bearer",
                                "expires_in": 3600
                            }))
                        },
                    ),
                )
                .with_state(state)
        })
        .await;

        let gateway = gateway(&base);
        assert_eq!(gateway.app_token().await.unwrap(), "app-token");
        assert_eq!(gateway.app_token().await.unwrap(), "app-token");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_access_token() {
        let base = spawn_upstream(|_| {
            Router::new().route(
                "/api/token",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    assert_eq!(form.get("refresh_token").map(String::as_str), Some("r1"));
                    Json(serde_json::json!({
                        "access_token": "fresh",
                        "expires_in": 3600,
                        "refresh_token": "r2"
                    }))
                }),
            )
        })
        .await;

        let grant = gateway(&base).refresh_access_token("r1").await.unwrap();
        assert_eq!(grant.access_token, "fresh");
        assert_eq!(grant.refresh_token.as_deref(), Some("r2"));
        assert_eq!(grant.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_token_grant_requires_client_credentials() {
        let gateway = SpotifyGateway::new(
            GatewayConfig::default(),
            Arc::new(CircuitBreaker::new("spotify", 5, Duration::from_secs(60))),
            RetryExecutor::new(RetryPolicy::default(), Arc::new(SeededRandom::new(1))),
        );

        let result = gateway.refresh_access_token("r1").await;
        assert!(matches!(result, Err(SpotifyError::MissingClientCredentials)));
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_request() {
        let gateway = gateway("http://127.0.0.1:9");
        for _ in 0..5 {
            gateway.breaker().record_failure();
        }

        let result = gateway.track("token", "t1").await;
        assert!(matches!(result, Err(SpotifyError::BreakerOpen(_))));
    }

    type Requests = Arc<std::sync::Mutex<Vec<(String, String, String)>>>;

    /// Upstream that records every request and answers by route.
    async fn recording_upstream(requests: Requests) -> String {
        spawn_upstream(move |_| {
            Router::new()
                .fallback(
                    |State(requests): State<Requests>,
                     method: axum::http::Method,
                     uri: axum::http::Uri,
                     body: String| async move {
                        requests
                            .lock()
                            .unwrap()
                            .push((method.to_string(), uri.path().to_string(), body));
                        match (method.as_str(), uri.path()) {
                            ("GET", "/playlists/missing") => {
                                axum::http::StatusCode::NOT_FOUND.into_response()
                            }
                            ("GET", "/playlists/p1") | ("POST", "/users/u1/playlists") => {
                                Json(serde_json::json!({
                                    "id": "p1",
                                    "name": "Road Trip",
                                    "public": false
                                }))
                                .into_response()
                            }
                            ("GET", "/search") => Json(serde_json::json!({
                                "artists": {
                                    "items": [{ "id": "a1", "name": "Band", "genres": ["rock"] }],
                                    "next": null
                                }
                            }))
                            .into_response(),
                            _ => axum::http::StatusCode::OK.into_response(),
                        }
                    },
                )
                .with_state(requests)
        })
        .await
    }

    #[tokio::test]
    async fn test_search_artists() {
        let requests: Requests = Arc::default();
        let base = recording_upstream(requests.clone()).await;

        let artists = gateway(&base)
            .search_artists("token", "band", 5)
            .await
            .unwrap();

        assert_eq!(artists.len(), 1);
        assert_eq!(artists[0].genres, vec!["rock"]);
        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].0, "GET");
        assert_eq!(requests[0].1, "/search");
    }

    #[tokio::test]
    async fn test_playlist_lookup() {
        let requests: Requests = Arc::default();
        let base = recording_upstream(requests.clone()).await;
        let gateway = gateway(&base);

        let playlist = gateway.playlist("token", "p1").await.unwrap().unwrap();
        assert_eq!(playlist.name, "Road Trip");

        assert!(gateway.playlist("token", "missing").await.unwrap().is_none());
        assert_eq!(gateway.breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_create_playlist_posts_body() {
        let requests: Requests = Arc::default();
        let base = recording_upstream(requests.clone()).await;

        let playlist = gateway(&base)
            .create_playlist(
                "token",
                "u1",
                &NewPlaylist {
                    name: "Road Trip".into(),
                    description: None,
                    public: Some(false),
                },
            )
            .await
            .unwrap();

        assert_eq!(playlist.id, "p1");
        let requests = requests.lock().unwrap();
        let (method, path, body) = &requests[0];
        assert_eq!(method, "POST");
        assert_eq!(path, "/users/u1/playlists");
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, serde_json::json!({ "name": "Road Trip", "public": false }));
    }

    #[tokio::test]
    async fn test_update_playlist_accepts_empty_body() {
        let requests: Requests = Arc::default();
        let base = recording_upstream(requests.clone()).await;

        gateway(&base)
            .update_playlist(
                "token",
                "p1",
                &PlaylistChanges {
                    description: Some("new".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        let (method, path, body) = &requests[0];
        assert_eq!(method, "PUT");
        assert_eq!(path, "/playlists/p1");
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, serde_json::json!({ "description": "new" }));
    }

    #[tokio::test]
    async fn test_delete_playlist_unfollows() {
        let requests: Requests = Arc::default();
        let base = recording_upstream(requests.clone()).await;

        gateway(&base).delete_playlist("token", "p1").await.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "DELETE");
        assert_eq!(requests[0].1, "/playlists/p1/followers");
    }
}
