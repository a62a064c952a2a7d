//! OpenAI-compatible chat routes
//!
//! `POST /v1/chat/completions` resolves the model, runs the retry driver,
//! then either streams translated chunks or answers with one aggregated
//! completion. `GET /v1/models` lists the model table.

use std::convert::Infallible;
use std::time::Instant;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use freeplay_client::{DEFAULT_MODEL, models};
use futures_util::Stream;
use serde_json::json;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::metrics;
use crate::openai::{ChatCompletionRequest, ChunkFactory, ModelEntry};
use crate::state::AppState;
use crate::translate::{self, Turn};

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    State(state): State<AppState>,
    body: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let _in_flight = state.metrics.begin();

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected chat request body");
            let err = ApiError::InvalidRequest(rejection.body_text());
            return finish(&state, err.into_response(), false, started);
        }
    };
    let stream = request.stream;

    let model_name = request.model.as_deref().unwrap_or(DEFAULT_MODEL);
    let model = match models::lookup(model_name) {
        Ok(model) => model,
        Err(e) => {
            warn!(model = model_name, "unknown model requested");
            return finish(&state, ApiError::from(e).into_response(), stream, started);
        }
    };

    info!(
        model = model.name,
        messages = request.messages.len(),
        stream,
        "chat completion request"
    );

    let chunks = ChunkFactory::new(model.name);
    let response = match state.upstream.execute(&request.messages, model).await {
        Ok((upstream, account)) => {
            let turn = Turn {
                pool: state.pool.clone(),
                account,
                chunks,
            };
            if stream {
                let rx = translate::spawn_stream(upstream.bytes_stream(), turn);
                sse_response(translate::body_stream(rx))
            } else {
                match translate::collect(upstream.bytes_stream(), turn).await {
                    Ok(completion) => Json(completion).into_response(),
                    Err(e) => {
                        warn!(error = %e, "completion failed");
                        state.metrics.record_error();
                        e.into_response()
                    }
                }
            }
        }
        Err(e) => {
            let err = ApiError::from(e);
            warn!(error = %err, "no upstream attempt succeeded");
            if err.status() == StatusCode::OK {
                state.metrics.record_error();
            }
            if stream {
                let frames = translate::failed_stream_frames(&err, &chunks);
                sse_response(futures_util::stream::iter(
                    frames
                        .into_iter()
                        .map(|frame| Ok::<_, Infallible>(Bytes::from(frame))),
                ))
            } else {
                err.into_response()
            }
        }
    };

    finish(&state, response, stream, started)
}

/// `GET /v1/models`
pub async fn list_models() -> Json<serde_json::Value> {
    let data: Vec<ModelEntry> = models::all().iter().map(ModelEntry::from).collect();
    Json(json!({ "object": "list", "data": data }))
}

fn finish(state: &AppState, response: Response, stream: bool, started: Instant) -> Response {
    let status = response.status();
    if status != StatusCode::OK {
        state.metrics.record_error();
    }
    metrics::record_request(status.as_u16(), stream, started.elapsed().as_secs_f64());
    response
}

fn sse_response<S>(frames: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
