use axum::{http::header, response::IntoResponse, Json};
use serde_json::{json, Value};

const PRIVACY_POLICY: &str = "# Privacy Policy

Car Wash Mixer reads the audio and lyrics files named in each request and
writes results only to the output paths supplied by the caller.

- No account or personal data is collected.
- Responses may be cached for up to one hour, keyed by a hash of the request
  parameters.
- Nothing is shared with third parties.
";

/// GET /openapi.json
pub async fn document() -> Json<Value> {
    Json(spec())
}

/// GET /.well-known/ai-plugin.json
pub async fn plugin_manifest() -> Json<Value> {
    Json(json!({
        "schema_version": "v1",
        "name_for_human": "Car Wash Mixer",
        "name_for_model": "car_wash_mixer",
        "description_for_human": "Normalize tracks to -14 LUFS and map LRC lyrics to bars.",
        "description_for_model": "Normalize audio files to -14 LUFS integrated loudness and map timestamped LRC lyrics to musical bar keys.",
        "auth": { "type": "none" },
        "api": { "type": "openapi", "url": "/openapi.json" },
        "legal_info_url": "/privacy"
    }))
}

/// GET /privacy
pub async fn privacy_policy() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        PRIVACY_POLICY,
    )
}

/// OpenAPI 3 description of the public routes.
pub fn spec() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Car Wash Mixer",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Loudness normalization and lyrics-to-bar mapping."
        },
        "paths": {
            "/mix": { "post": mix_operation() },
            "/map-lyrics": { "post": map_lyrics_operation() },
            "/health": { "get": health_operation() }
        },
        "components": { "schemas": { "Error": error_schema() } }
    })
}

fn json_body(schema: Value) -> Value {
    json!({ "application/json": { "schema": schema } })
}

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": json_body(json!({ "$ref": "#/components/schemas/Error" }))
    })
}

fn error_schema() -> Value {
    let detail = json!({
        "type": "object",
        "properties": {
            "code": { "type": "string" },
            "message": { "type": "string" }
        }
    });
    json!({ "type": "object", "properties": { "error": detail } })
}

fn mix_operation() -> Value {
    let request = json!({
        "type": "object",
        "required": ["input", "output"],
        "properties": {
            "input": { "type": "string" },
            "output": { "type": "string" },
            "preset": { "type": "string", "default": "car-wash" }
        }
    });
    let response = json!({
        "type": "object",
        "properties": {
            "message": { "type": "string" },
            "original_loudness": { "type": "number" },
            "preset": { "type": "string" }
        }
    });

    json!({
        "summary": "Normalize an audio file to -14 LUFS",
        "requestBody": { "required": true, "content": json_body(request) },
        "responses": {
            "200": { "description": "Loudness before normalization", "content": json_body(response) },
            "400": error_response("Missing fields, missing input file or unsupported output"),
            "500": error_response("Processing failure")
        }
    })
}

fn map_lyrics_operation() -> Value {
    let request = json!({
        "type": "object",
        "required": ["lyrics", "bpm", "output"],
        "properties": {
            "lyrics": { "type": "string" },
            "bpm": { "type": "number", "minimum": 0, "exclusiveMinimum": true },
            "beats_per_bar": { "type": "integer", "minimum": 1, "default": 4 },
            "offset": { "type": "number", "default": 0.0 },
            "output": { "type": "string" }
        }
    });
    let response = json!({
        "type": "object",
        "properties": {
            "message": { "type": "string" },
            "count": { "type": "integer" },
            "bpm": { "type": "number" },
            "beats_per_bar": { "type": "integer" },
            "offset": { "type": "number" }
        }
    });

    json!({
        "summary": "Map LRC lyric lines to musical bars",
        "requestBody": { "required": true, "content": json_body(request) },
        "responses": {
            "200": { "description": "Number of mapped lines", "content": json_body(response) },
            "400": error_response("Missing fields, missing file or invalid tempo"),
            "500": error_response("Processing failure")
        }
    })
}

fn health_operation() -> Value {
    let response = json!({
        "type": "object",
        "properties": {
            "status": { "type": "string" },
            "cache_available": { "type": "boolean" }
        }
    });

    json!({
        "summary": "Liveness and cache reachability",
        "responses": {
            "200": { "description": "Service is up", "content": json_body(response) }
        }
    })
}
