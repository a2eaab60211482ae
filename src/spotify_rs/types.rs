use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Spotify OAuth token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Upper bound on any upstream-reported token lifetime.
pub const MAX_TOKEN_LIFETIME: u64 = 365 * 24 * 60 * 60;

/// The part of a token response the credential lifecycle cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Spotify only rotates the refresh token sometimes; `None` means keep the old one.
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

impl TokenGrant {
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.expires_in.min(MAX_TOKEN_LIFETIME) as i64;
        now.checked_add_signed(chrono::Duration::seconds(secs))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl From<SpotifyTokenResponse> for TokenGrant {
    fn from(response: SpotifyTokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
        }
    }
}

/// Window Spotify aggregates a user's listening over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    ShortTerm,
    #[default]
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "short_term" => Ok(TimeRange::ShortTerm),
            "medium_term" => Ok(TimeRange::MediumTerm),
            "long_term" => Ok(TimeRange::LongTerm),
            other => Err(format!(
                "Unknown time range '{}', expected short_term, medium_term or long_term",
                other
            )),
        }
    }
}

/// Spotify user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: Option<u32>,
}

/// Simplified artist embedded in track and album objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyArtistRef {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyAlbum {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
}

/// Spotify track from API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<SpotifyArtistRef>,
    pub album: SpotifyAlbum,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

/// Generic paging object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub artists: Option<Paging<SpotifyArtist>>,
    #[serde(default)]
    pub tracks: Option<Paging<SpotifyTrack>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistTopTracks {
    pub tracks: Vec<SpotifyTrack>,
}

/// Spotify playlist from API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub tracks: Option<SpotifyPlaylistTracks>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyPlaylistTracks {
    pub total: i32,
}

/// Body of a create-playlist request.
#[derive(Debug, Clone, Serialize)]
pub struct NewPlaylist {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

/// Body of a change-playlist-details request. Unset fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaylistChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}
