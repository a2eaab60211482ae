use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, SpotifyError};
use crate::ports::spotify::SpotifyCatalog;
use crate::resilience::{RandomSource, shuffle, soft_fail, soft_fail_sync};
use crate::spotify_rs::types::{SpotifyTrack, TimeRange};

const MAX_LIMIT: u32 = 100;
const DEFAULT_LIMIT: u32 = 20;
const MAX_POPULARITY: u32 = 100;
/// Genre searches fan out to at most this many genres.
const GENRE_SEARCH_FANOUT: usize = 3;
/// Spotify caps search and top-item pages at 50.
const PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct SynthesizerSettings {
    pub default_genres: Vec<String>,
    pub default_market: String,
    pub max_seeds: usize,
}

impl Default for SynthesizerSettings {
    fn default() -> Self {
        Self {
            default_genres: vec!["pop".into(), "rock".into(), "hip-hop".into()],
            default_market: "US".into(),
            max_seeds: 5,
        }
    }
}

/// Raw recommendation parameters as a host receives them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendationRequest {
    pub genres: Vec<String>,
    pub artist_ids: Vec<String>,
    pub track_ids: Vec<String>,
    pub market: Option<String>,
    pub limit: Option<u32>,
    pub min_popularity: Option<u32>,
    pub released_after: Option<String>,
    pub time_range: Option<TimeRange>,
}

/// Validated and normalized recommendation inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedSet {
    pub genres: Vec<String>,
    pub artist_ids: Vec<String>,
    pub track_ids: Vec<String>,
    pub market: String,
    pub limit: u32,
    pub min_popularity: u32,
    pub released_after: Option<NaiveDate>,
    pub time_range: TimeRange,
}

fn clean(values: Vec<String>, max: usize, lowercase: bool) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(|value| if lowercase { value.to_lowercase() } else { value })
        .take(max)
        .collect()
}

impl SeedSet {
    pub fn from_request(
        request: RecommendationRequest,
        settings: &SynthesizerSettings,
    ) -> Result<Self, DiscoveryError> {
        let released_after = match request.released_after.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(normalize_release_date(raw).ok_or_else(|| {
                DiscoveryError::InvalidRequest(format!(
                    "released_after '{}' is not a YYYY, YYYY-MM or YYYY-MM-DD date",
                    raw
                ))
            })?),
        };

        let market = request
            .market
            .map(|market| market.trim().to_uppercase())
            .filter(|market| !market.is_empty())
            .unwrap_or_else(|| settings.default_market.clone());

        Ok(Self {
            genres: clean(request.genres, settings.max_seeds, true),
            artist_ids: clean(request.artist_ids, settings.max_seeds, false),
            track_ids: clean(request.track_ids, settings.max_seeds, false),
            market,
            limit: request.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            min_popularity: request.min_popularity.unwrap_or(0).min(MAX_POPULARITY),
            released_after,
            time_range: request.time_range.unwrap_or_default(),
        })
    }

    /// Which kind of seed the caller supplied, in branch precedence order.
    pub fn seed_kind(&self) -> &'static str {
        if !self.genres.is_empty() {
            "genres"
        } else if !self.artist_ids.is_empty() {
            "artists"
        } else if !self.track_ids.is_empty() {
            "tracks"
        } else {
            "none"
        }
    }
}

/// Parse a Spotify release date at any precision, filling missing parts with
/// the earliest value (`2020` is `2020-01-01`, `2020-06` is `2020-06-01`).
pub fn normalize_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let full = match raw.len() {
        4 => format!("{}-01-01", raw),
        7 => format!("{}-01", raw),
        _ => raw.to_string(),
    };
    // Spotify reports unknown dates as year 0000
    NaiveDate::parse_from_str(&full, "%Y-%m-%d")
        .ok()
        .filter(|date| date.year() > 0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist_name: String,
    pub album_name: String,
    pub release_date: Option<String>,
    pub popularity: u32,
    pub preview_url: Option<String>,
    /// Genre seed the track was found through. Empty for artist and track seeds.
    pub genres: Vec<String>,
}

impl Track {
    fn from_spotify(track: SpotifyTrack, genre: Option<&str>) -> Self {
        let artist_name = track
            .artists
            .first()
            .map(|artist| artist.name.clone())
            .unwrap_or_default();

        Self {
            id: track.id,
            title: track.name,
            artist_name,
            album_name: track.album.name,
            release_date: track.album.release_date,
            popularity: track.popularity.min(MAX_POPULARITY),
            preview_url: track.preview_url,
            genres: genre.map(|genre| vec![genre.to_string()]).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ExplicitGenres,
    ExplicitArtists,
    SeedTracks,
    TopArtistGenres,
    DefaultGenres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationMetadata {
    pub strategy: Strategy,
    pub seeds_used: Vec<String>,
    pub time_range: TimeRange,
    pub market: String,
    pub candidate_count: usize,
    pub returned_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub tracks: Vec<Track>,
    pub metadata: RecommendationMetadata,
}

/// Rebuilds "recommended tracks" out of top-artist, top-track and search calls.
pub struct RecommendationSynthesizer<C: SpotifyCatalog> {
    catalog: Arc<C>,
    settings: SynthesizerSettings,
    random: Arc<dyn RandomSource>,
}

impl<C: SpotifyCatalog> RecommendationSynthesizer<C> {
    pub fn new(catalog: Arc<C>, settings: SynthesizerSettings, random: Arc<dyn RandomSource>) -> Self {
        Self {
            catalog,
            settings,
            random,
        }
    }

    pub fn settings(&self) -> &SynthesizerSettings {
        &self.settings
    }

    pub async fn synthesize(
        &self,
        token: &str,
        seeds: &SeedSet,
    ) -> Result<Recommendations, SpotifyError> {
        let (strategy, seeds_used, candidates) = if !seeds.genres.is_empty() {
            self.from_genres(token, Strategy::ExplicitGenres, &seeds.genres, seeds)
                .await?
        } else if !seeds.artist_ids.is_empty() {
            let artist_ids = first(&seeds.artist_ids, self.settings.max_seeds);
            let candidates = self.from_artists(token, &artist_ids, seeds).await?;
            (Strategy::ExplicitArtists, artist_ids, candidates)
        } else if !seeds.track_ids.is_empty() {
            let track_ids = first(&seeds.track_ids, self.settings.max_seeds);
            let artist_ids = self.seed_track_artists(token, &track_ids).await;
            if artist_ids.is_empty() {
                tracing::info!("Seed tracks resolved to no artists, using default genres");
                self.from_default_genres(token, seeds).await?
            } else {
                let candidates = self.from_artists(token, &artist_ids, seeds).await?;
                (Strategy::SeedTracks, track_ids, candidates)
            }
        } else {
            let genres = self.top_artist_genres(token, seeds.time_range).await;
            if genres.is_empty() {
                self.from_default_genres(token, seeds).await?
            } else {
                self.from_genres(token, Strategy::TopArtistGenres, &genres, seeds)
                    .await?
            }
        };

        let candidate_count = candidates.len();
        let tracks = self.finish(candidates, seeds);

        tracing::info!(
            "Synthesized {} of {} candidate tracks using {:?}",
            tracks.len(),
            candidate_count,
            strategy
        );

        Ok(Recommendations {
            metadata: RecommendationMetadata {
                strategy,
                seeds_used,
                time_range: seeds.time_range,
                market: seeds.market.clone(),
                candidate_count,
                returned_count: tracks.len(),
            },
            tracks,
        })
    }

    async fn from_default_genres(
        &self,
        token: &str,
        seeds: &SeedSet,
    ) -> Result<(Strategy, Vec<String>, Vec<Track>), SpotifyError> {
        let genres = first(&self.settings.default_genres, self.settings.max_seeds);
        self.from_genres(token, Strategy::DefaultGenres, &genres, seeds)
            .await
    }

    async fn from_genres(
        &self,
        token: &str,
        strategy: Strategy,
        genres: &[String],
        seeds: &SeedSet,
    ) -> Result<(Strategy, Vec<String>, Vec<Track>), SpotifyError> {
        let searched = first(genres, GENRE_SEARCH_FANOUT);
        let per_genre = seeds.limit.min(PAGE_LIMIT);

        let results = try_join_all(searched.iter().map(|genre| async move {
            let query = format!("genre:\"{}\"", genre);
            let tracks = self
                .catalog
                .search_tracks(token, &query, per_genre, &seeds.market)
                .await?;
            Ok::<_, SpotifyError>(
                tracks
                    .into_iter()
                    .map(|track| Track::from_spotify(track, Some(genre.as_str())))
                    .collect::<Vec<_>>(),
            )
        }))
        .await?;

        Ok((strategy, searched, dedupe(results.into_iter().flatten())))
    }

    async fn from_artists(
        &self,
        token: &str,
        artist_ids: &[String],
        seeds: &SeedSet,
    ) -> Result<Vec<Track>, SpotifyError> {
        let results = try_join_all(artist_ids.iter().map(|artist_id| {
            self.catalog
                .artist_top_tracks(token, artist_id, &seeds.market)
        }))
        .await?;

        Ok(dedupe(
            results
                .into_iter()
                .flatten()
                .map(|track| Track::from_spotify(track, None)),
        ))
    }

    /// Distinct artist ids of the seed tracks, in seed order. Lookups that
    /// fail or miss are skipped.
    async fn seed_track_artists(&self, token: &str, track_ids: &[String]) -> Vec<String> {
        let lookups = futures::future::join_all(
            track_ids
                .iter()
                .map(|track_id| soft_fail("seed track lookup", self.catalog.track(token, track_id))),
        )
        .await;

        let mut seen = HashSet::new();
        lookups
            .into_iter()
            .flatten()
            .flatten()
            .flat_map(|track| track.artists.into_iter().filter_map(|artist| artist.id))
            .filter(|id| seen.insert(id.clone()))
            .take(self.settings.max_seeds)
            .collect()
    }

    /// Genres of the user's top artists, most frequent first. Ties keep the
    /// order in which the genre first appeared.
    async fn top_artist_genres(&self, token: &str, time_range: TimeRange) -> Vec<String> {
        let limit = u32::try_from(self.settings.max_seeds).unwrap_or(PAGE_LIMIT);
        let Some(artists) = soft_fail(
            "top artists",
            self.catalog.top_artists(token, limit, time_range),
        )
        .await
        else {
            return Vec::new();
        };

        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for genre in artists.iter().flat_map(|artist| artist.genres.iter()) {
            let next = counts.len();
            let entry = counts.entry(genre.to_lowercase()).or_insert((0, next));
            entry.0 += 1;
        }

        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_b.cmp(count_a).then(first_a.cmp(first_b))
        });

        ranked
            .into_iter()
            .map(|(genre, _)| genre)
            .take(self.settings.max_seeds)
            .collect()
    }

    fn finish(&self, mut tracks: Vec<Track>, seeds: &SeedSet) -> Vec<Track> {
        shuffle(&mut tracks, self.random.as_ref());
        tracks.truncate(seeds.limit as usize);

        tracks
            .into_iter()
            .filter(|track| track.popularity >= seeds.min_popularity)
            .filter(|track| released_on_or_after(track, seeds.released_after))
            .collect()
    }
}

fn first(values: &[String], count: usize) -> Vec<String> {
    values.iter().take(count).cloned().collect()
}

fn dedupe(tracks: impl IntoIterator<Item = Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|track| seen.insert(track.id.clone()))
        .collect()
}

fn released_on_or_after(track: &Track, cutoff: Option<NaiveDate>) -> bool {
    let Some(cutoff) = cutoff else {
        return true;
    };
    let Some(raw) = track.release_date.as_deref() else {
        return true;
    };
    soft_fail_sync(
        "parse release date",
        normalize_release_date(raw).ok_or_else(|| format!("unparseable release date '{}'", raw)),
    )
    .is_none_or(|released| released >= cutoff)
}
