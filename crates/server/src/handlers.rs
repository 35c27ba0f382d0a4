//! Route handlers.
//!
//! Both operations follow the same path: validate the body, reject missing
//! inputs, derive the cache key, then run lookup + compute + store on the
//! blocking pool. Only successful results are cached, and a hit replays the
//! stored body verbatim.

use std::path::{Path, PathBuf};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use carwash_core::{
    cache::{self, CacheStatus},
    BarTiming, MixerError, OutputFormat, DEFAULT_BEATS_PER_BAR, DEFAULT_PRESET,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const MIX_OPERATION: &str = "mix";
pub const MAP_LYRICS_OPERATION: &str = "map-lyrics";

/// Response header telling clients whether the body came from the cache.
pub const CACHE_HEADER: &str = "x-cache";

#[derive(Debug, Deserialize)]
pub struct MixRequest {
    pub input: Option<String>,
    pub output: Option<String>,
    pub preset: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MixResponse {
    pub message: String,
    pub original_loudness: f64,
    pub preset: String,
}

#[derive(Debug, Deserialize)]
pub struct MapLyricsRequest {
    pub lyrics: Option<String>,
    pub bpm: Option<f64>,
    pub beats_per_bar: Option<i64>,
    pub offset: Option<f64>,
    pub output: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MapLyricsResponse {
    pub message: String,
    pub count: usize,
    pub bpm: f64,
    pub beats_per_bar: u32,
    pub offset: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub cache_available: bool,
}

/// POST /mix
pub async fn mix(
    State(state): State<AppState>,
    payload: Result<Json<MixRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let missing = missing_fields(&[
        ("input", request.input.is_none()),
        ("output", request.output.is_none()),
    ]);
    let (Some(input), Some(output)) = (request.input, request.output) else {
        return Err(missing);
    };
    let preset = request.preset.unwrap_or_else(|| DEFAULT_PRESET.to_string());

    let input_path = existing_file(&input)?;
    let output_path = PathBuf::from(&output);
    OutputFormat::from_path(&output_path).map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let key = cache::cache_key(MIX_OPERATION, &json!({ "input": input, "preset": preset }));
    run_cached(&state, key, move || {
        let original_loudness = carwash_core::normalize(&input_path, &output_path, &preset)?;
        to_json(&MixResponse {
            message: "Normalized to -14 LUFS".to_string(),
            original_loudness,
            preset,
        })
    })
    .await
}

/// POST /map-lyrics
pub async fn map_lyrics(
    State(state): State<AppState>,
    payload: Result<Json<MapLyricsRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let missing = missing_fields(&[
        ("lyrics", request.lyrics.is_none()),
        ("bpm", request.bpm.is_none()),
        ("output", request.output.is_none()),
    ]);
    let (Some(lyrics), Some(bpm), Some(output)) = (request.lyrics, request.bpm, request.output)
    else {
        return Err(missing);
    };
    let beats_per_bar = request
        .beats_per_bar
        .map(|beats| {
            u32::try_from(beats).map_err(|_| {
                ApiError::from(MixerError::invalid(format!(
                    "beats_per_bar must be positive, got {beats}"
                )))
            })
        })
        .transpose()?
        .unwrap_or(DEFAULT_BEATS_PER_BAR);
    let offset = request.offset.unwrap_or(0.0);

    // Parameter errors are reported before the filesystem is consulted.
    BarTiming::new(bpm, beats_per_bar, offset)?;
    let lyrics_path = existing_file(&lyrics)?;
    let output_path = PathBuf::from(output);

    let key = cache::cache_key(
        MAP_LYRICS_OPERATION,
        &json!({
            "lyrics": lyrics,
            "bpm": bpm,
            "beats_per_bar": beats_per_bar,
            "offset": offset,
        }),
    );
    run_cached(&state, key, move || {
        let report = carwash_core::map_lyrics(
            &lyrics_path,
            bpm,
            beats_per_bar,
            offset,
            Some(&output_path),
        )?;
        to_json(&MapLyricsResponse {
            message: format!("Wrote {} mappings", report.count()),
            count: report.count(),
            bpm,
            beats_per_bar,
            offset,
        })
    })
    .await
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let gateway = state.cache.clone();
    let cache_available = tokio::task::spawn_blocking(move || gateway.is_available())
        .await
        .map_err(|err| ApiError::Internal(format!("health check failed: {err}")))?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        cache_available,
    }))
}

async fn run_cached<F>(state: &AppState, key: String, compute: F) -> ApiResult<Response>
where
    F: FnOnce() -> carwash_core::Result<String> + Send + 'static,
{
    let gateway = state.cache.clone();
    let ttl = state.cache_ttl;

    let (body, status) = tokio::task::spawn_blocking(move || {
        cache::get_or_compute(gateway.as_ref(), &key, ttl, compute)
    })
    .await
    .map_err(|err| ApiError::Internal(format!("worker failed: {err}")))??;

    let marker = match status {
        CacheStatus::Hit => "HIT",
        CacheStatus::Miss => "MISS",
    };
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (
                header::HeaderName::from_static(CACHE_HEADER),
                HeaderValue::from_static(marker),
            ),
        ],
        body,
    )
        .into_response())
}

fn existing_file(raw: &str) -> ApiResult<PathBuf> {
    let path = Path::new(raw);
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(MixerError::NotFound(path.to_path_buf()).into())
    }
}

fn missing_fields(fields: &[(&str, bool)]) -> ApiError {
    let names: Vec<&str> = fields
        .iter()
        .filter(|(_, missing)| *missing)
        .map(|(name, _)| *name)
        .collect();
    ApiError::BadRequest(format!("Missing required fields: {}", names.join(", ")))
}

fn to_json<T: Serialize>(value: &T) -> carwash_core::Result<String> {
    serde_json::to_string(value).map_err(|err| MixerError::Io(err.into()))
}
