use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use crate::database::Database;
use crate::spotify_rs::types::{SpotifyAlbum, SpotifyArtist, SpotifyArtistRef, SpotifyTrack};

/// Fresh on-disk credential database. Keep the `TempDir` alive for the test.
pub async fn test_db() -> (Arc<Database>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("credentials.db"))
        .await
        .unwrap();
    (Arc::new(db), dir)
}

/// Serve `router` on an ephemeral local port and return its base URL. The
/// builder receives the base URL so responses can link back to the server.
pub async fn spawn_upstream<F>(build: F) -> String
where
    F: FnOnce(&str) -> Router,
{
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = build(&base);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

pub fn track_json(id: &str, popularity: u32, release_date: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": format!("Track {}", id),
        "artists": [{ "id": "artist-1", "name": "Artist One" }],
        "album": { "id": "album-1", "name": "Album One", "release_date": release_date },
        "popularity": popularity,
        "preview_url": null
    })
}

pub fn track(id: &str, artist_id: &str, popularity: u32, release_date: &str) -> SpotifyTrack {
    SpotifyTrack {
        id: id.to_string(),
        name: format!("Track {}", id),
        artists: vec![SpotifyArtistRef {
            id: Some(artist_id.to_string()),
            name: format!("Artist {}", artist_id),
        }],
        album: SpotifyAlbum {
            id: Some(format!("album-{}", id)),
            name: format!("Album {}", id),
            release_date: Some(release_date.to_string()),
        },
        popularity,
        preview_url: None,
        duration_ms: Some(180_000),
    }
}

pub fn artist(id: &str, genres: &[&str]) -> SpotifyArtist {
    SpotifyArtist {
        id: id.to_string(),
        name: format!("Artist {}", id),
        genres: genres.iter().map(|genre| genre.to_string()).collect(),
        popularity: Some(50),
    }
}
