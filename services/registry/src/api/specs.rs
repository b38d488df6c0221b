//! Specification storage endpoints.
//!
//! - `GET /specs` lists every specification
//! - `GET /specs/{name}` fetches one, 404 when unknown
//! - `PUT /specs/{name}` creates (201) or replaces (200) one
//! - `DELETE /specs/{name}` removes one (204)

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use topo_spec::{validate, ApplicationSpec};
use tracing::info;

use super::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/specs", get(list_specs))
        .route(
            "/specs/{name}",
            get(get_spec).put(put_spec).delete(delete_spec),
        )
}

fn not_found(name: &str) -> ApiError {
    ApiError::not_found("spec_not_found", format!("no specification named '{name}'"))
}

async fn list_specs(State(state): State<AppState>) -> Json<Vec<ApplicationSpec>> {
    Json(state.list().await)
}

async fn get_spec(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApplicationSpec>, ApiError> {
    state.get(&name).await.map(Json).ok_or_else(|| not_found(&name))
}

async fn put_spec(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<ApplicationSpec>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(spec) = body.map_err(|e| ApiError::bad_request("invalid_body", e.body_text()))?;

    if spec.name != name {
        return Err(ApiError::bad_request(
            "name_mismatch",
            format!("path names '{name}' but body names '{}'", spec.name),
        ));
    }

    if let Err(errors) = validate(&spec) {
        let details = errors.iter().map(ToString::to_string).collect();
        return Err(ApiError::bad_request("invalid_spec", errors.to_string()).with_details(details));
    }

    let replaced = state.put(spec.clone()).await;
    info!(%name, replaced, "stored specification");

    let status = if replaced {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(spec)))
}

async fn delete_spec(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.remove(&name).await {
        info!(%name, "deleted specification");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&name))
    }
}
