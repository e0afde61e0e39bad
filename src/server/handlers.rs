use axum::Json;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use tracing::debug;

use super::{ApiError, AppState};
use crate::timer::Deferred;
use crate::xkcd::Xkcd;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub(super) async fn comic_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Xkcd>, ApiError> {
    debug!(comic_id = %id, "comic requested");
    let id = parse_comic_id(&id)?;
    state
        .comic_timer
        .measure(|| async {
            match state.service.comic_by_id(&id).await? {
                Some(comic) => Ok(Json(comic)),
                None => Err(ApiError::NotFound(format!(
                    "Comic with id= {id} cannot be found in XKCD"
                ))),
            }
        })
        .await
}

pub(super) async fn comic_by_id_mono(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Xkcd>, ApiError> {
    debug!(comic_id = %id, "comic requested (cold path)");
    let id = parse_comic_id(&id)?;
    let lookup = state.service.comic_by_id_deferred(&id)?;
    let flow: Deferred<Xkcd, ApiError> = Deferred::new(move || {
        let attempt = lookup.subscribe();
        let id = id.clone();
        async move {
            match attempt.await {
                Ok(Some(comic)) => Ok(comic),
                Ok(None) => Err(ApiError::NotFound(format!(
                    "Comic with id= {id} NOT FOUND!"
                ))),
                Err(err) => Err(ApiError::from(err)),
            }
        }
    })
    .with_statistical_metrics(&state.comic_mono_timers);
    flow.await.map(Json)
}

pub(super) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.registry().render();
    body.push_str(&state.breakers().render());
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body)
}

fn parse_comic_id(raw: &str) -> Result<String, ApiError> {
    raw.parse::<u32>()
        .map(|id| id.to_string())
        .map_err(|_| ApiError::BadRequest(format!("Invalid comic id: {raw}")))
}
