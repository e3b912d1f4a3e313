use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};

use crate::application::usecases::AdminUseCase;
use crate::application::{AppError, DedupTracker, TargetRepository};
use crate::domain::{RoleId, TargetId, UserId};

#[derive(Clone)]
pub struct ApiState {
    pub targets: Arc<dyn TargetRepository>,
    pub dedup: Arc<DedupTracker>,
    pub api_token: Option<String>,
}

impl ApiState {
    fn admin(&self) -> AdminUseCase<'_> {
        AdminUseCase {
            targets: self.targets.as_ref(),
            dedup: self.dedup.as_ref(),
        }
    }
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/targets", get(list_targets).post(add_target))
        .route("/targets/owner/{owner_id}", delete(remove_by_owner))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn list_targets(State(state): State<ApiState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err((code, msg)) = check_auth(&headers, &state.api_token) {
        return (code, msg).into_response();
    }
    match state.admin().list_targets().await {
        Ok(v) => Json(v).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {e}")).into_response(),
    }
}

#[derive(Deserialize)]
struct AddTargetBody {
    owner_id: u64,
    handle: String,
    role_id: u64,
}

#[derive(Serialize)]
struct Created {
    id: TargetId,
}

async fn add_target(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<AddTargetBody>,
) -> impl IntoResponse {
    if let Err((code, msg)) = check_auth(&headers, &state.api_token) {
        return (code, msg).into_response();
    }
    let res = state
        .admin()
        .register_target(UserId(body.owner_id), &body.handle, RoleId(body.role_id))
        .await;
    match res {
        Ok(t) => (StatusCode::CREATED, Json(Created { id: t.id })).into_response(),
        Err(e @ AppError::DuplicateTarget { .. }) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e @ AppError::InvalidHandle(_)) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {e}")).into_response(),
    }
}

async fn remove_by_owner(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(owner_id): Path<u64>,
) -> impl IntoResponse {
    if let Err((code, msg)) = check_auth(&headers, &state.api_token) {
        return (code, msg).into_response();
    }
    match state.admin().unregister_target(UserId(owner_id)).await {
        Ok(Some(_)) => StatusCode::NO_CONTENT.into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no target for owner").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {e}")).into_response(),
    }
}

fn check_auth(headers: &HeaderMap, token: &Option<String>) -> Result<(), (StatusCode, String)> {
    // no token configured: open access
    let Some(expected) = token else {
        return Ok(());
    };
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if auth == format!("Bearer {}", expected) {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "unauthorized".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::{InMemoryDedupStore, InMemoryTargetRepository};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(token: Option<&str>) -> ApiState {
        ApiState {
            targets: Arc::new(InMemoryTargetRepository::default()),
            dedup: Arc::new(DedupTracker::new(Arc::new(InMemoryDedupStore::new()))),
            api_token: token.map(str::to_string),
        }
    }

    fn post_target(body: &str) -> Request<Body> {
        Request::post("/targets")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = build_router(state(Some("t0ken")));
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn targets_require_bearer_token() {
        let app = build_router(state(Some("t0ken")));
        let resp = app
            .clone()
            .oneshot(Request::get("/targets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(
                Request::get("/targets")
                    .header("authorization", "Bearer t0ken")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn add_conflict_and_remove() {
        let app = build_router(state(None));
        let body = r#"{"owner_id": 7, "handle": "@creator", "role_id": 9}"#;

        let resp = app.clone().oneshot(post_target(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app.clone().oneshot(post_target(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = app
            .clone()
            .oneshot(
                Request::delete("/targets/owner/7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app
            .oneshot(
                Request::delete("/targets/owner/7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_handle_is_bad_request() {
        let app = build_router(state(None));
        let resp = app
            .oneshot(post_target(
                r#"{"owner_id": 1, "handle": "no spaces", "role_id": 2}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
