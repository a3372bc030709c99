//! The read-only integration API.
//!
//! Third-party agents authenticate with a bearer integration key and get
//! three views: recent plans, full plan details, and pending work. The
//! surface never reveals foreign plans: ownership failures collapse into
//! the same 404 as a missing plan. A malformed plan ID is a distinct 400.

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use trellis_core::error::EngineError;
use trellis_core::{resolve, secret};
use trellis_db::queries::plans as plan_db;

/// Maximum number of plans returned by the list endpoint.
const RECENT_PLAN_LIMIT: i64 = 5;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "unauthorized".to_string(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }

    /// Map an engine error onto the wire contract. Foreign-owned plans are
    /// indistinguishable from missing ones.
    fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::Unauthenticated => Self::unauthorized(),
            EngineError::AccessDenied => Self::not_found("plan not found"),
            e if e.is_not_found() => Self::not_found("plan not found"),
            e => Self::internal(anyhow::anyhow!(e)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Resolve the bearer credential to a user ID, or 401.
async fn authenticate(pool: &PgPool, headers: &HeaderMap) -> Result<String, AppError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(AppError::unauthorized)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(AppError::unauthorized)?;

    secret::verify_key(pool, token)
        .await
        .map_err(|_| AppError::unauthorized())
}

fn parse_plan_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request("malformed plan id"))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(pool: PgPool) -> Router {
    Router::new()
        .route("/api/plans", get(list_plans))
        .route("/api/plans/{id}", get(get_plan_detail))
        .route("/api/plans/{id}/pending", get(get_pending_work))
        .layer(CorsLayer::permissive())
        .with_state(pool)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(pool: PgPool, bind: &str, port: u16) -> Result<()> {
    let app = build_router(pool);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("trellis serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("trellis serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_plans(
    State(pool): State<PgPool>,
    headers: HeaderMap,
) -> Result<axum::response::Response, AppError> {
    let user_id = authenticate(&pool, &headers).await?;

    let plans = plan_db::list_recent_plans(&pool, &user_id, RECENT_PLAN_LIMIT)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(plans).into_response())
}

async fn get_plan_detail(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<axum::response::Response, AppError> {
    let user_id = authenticate(&pool, &headers).await?;
    let plan_id = parse_plan_id(&id)?;

    let details = resolve::resolve_plan_details(&pool, &user_id, plan_id)
        .await
        .map_err(AppError::from_engine)?;

    Ok(Json(details).into_response())
}

async fn get_pending_work(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<axum::response::Response, AppError> {
    let user_id = authenticate(&pool, &headers).await?;
    let plan_id = parse_plan_id(&id)?;

    let pending = resolve::resolve_pending_work(&pool, &user_id, plan_id)
        .await
        .map_err(AppError::from_engine)?;

    Ok(Json(pending).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::PgPool;
    use tower::ServiceExt;

    use trellis_core::{secret, tree};
    use trellis_db::models::PlanStatus;
    use trellis_db::queries::plans::insert_plan_shell;
    use trellis_test_utils::{create_test_db, drop_test_db};

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    async fn send_request(
        pool: PgPool,
        uri: &str,
        bearer: Option<&str>,
    ) -> axum::response::Response {
        let app = super::build_router(pool);
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn issue_test_key(pool: &PgPool, user: &str) -> String {
        secret::issue_key(pool, user)
            .await
            .expect("issue_key should succeed")
            .key
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_missing_credential_is_unauthorized() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_request(pool.clone(), "/api/plans", None).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_bogus_credential_is_unauthorized() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_request(pool.clone(), "/api/plans", Some("trellis_ik_nope")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_revoked_credential_is_unauthorized() {
        let (pool, db_name) = create_test_db().await;

        let issued = secret::issue_key(&pool, "user-a").await.unwrap();
        secret::revoke_key(&pool, &issued.key_id).await.unwrap();

        let resp = send_request(pool.clone(), "/api/plans", Some(&issued.key)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_list_plans_empty() {
        let (pool, db_name) = create_test_db().await;
        let key = issue_test_key(&pool, "user-a").await;

        let resp = send_request(pool.clone(), "/api/plans", Some(&key)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json, serde_json::json!([]));

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_list_plans_caps_at_five_own_plans() {
        let (pool, db_name) = create_test_db().await;
        let key = issue_test_key(&pool, "user-a").await;

        for i in 0..6 {
            insert_plan_shell(&pool, "user-a", &format!("idea {i}"), PlanStatus::Ready)
                .await
                .expect("insert_plan_shell should succeed");
        }
        // A foreign plan that must never show up.
        insert_plan_shell(&pool, "user-b", "foreign idea", PlanStatus::Ready)
            .await
            .unwrap();

        let resp = send_request(pool.clone(), "/api/plans", Some(&key)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let arr = json.as_array().expect("response should be an array");
        assert_eq!(arr.len(), 5);
        for plan in arr {
            assert_eq!(plan["user_id"], "user-a");
        }

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_malformed_plan_id_is_bad_request() {
        let (pool, db_name) = create_test_db().await;
        let key = issue_test_key(&pool, "user-a").await;

        let resp = send_request(pool.clone(), "/api/plans/not-a-uuid", Some(&key)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "malformed plan id");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_unknown_plan_is_not_found() {
        let (pool, db_name) = create_test_db().await;
        let key = issue_test_key(&pool, "user-a").await;

        let random_id = uuid::Uuid::new_v4();
        let resp =
            send_request(pool.clone(), &format!("/api/plans/{random_id}"), Some(&key)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_foreign_plan_is_not_found() {
        let (pool, db_name) = create_test_db().await;
        let key = issue_test_key(&pool, "user-a").await;

        let foreign = insert_plan_shell(&pool, "user-b", "their idea", PlanStatus::Ready)
            .await
            .unwrap();

        let resp =
            send_request(pool.clone(), &format!("/api/plans/{}", foreign.id), Some(&key)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send_request(
            pool.clone(),
            &format!("/api/plans/{}/pending", foreign.id),
            Some(&key),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_plan_detail_returns_nested_tree() {
        let (pool, db_name) = create_test_db().await;
        let key = issue_test_key(&pool, "user-a").await;

        let plan = insert_plan_shell(&pool, "user-a", "learn ceramics", PlanStatus::Ready)
            .await
            .unwrap();
        let outcome = tree::add_outcome(&pool, "user-a", plan.id, "Wheel basics", "")
            .await
            .unwrap();
        let deliverable = tree::add_deliverable(
            &pool,
            "user-a",
            outcome.id,
            "Center clay",
            "Clay stays centered at speed.",
            None,
        )
        .await
        .unwrap();
        tree::add_action(&pool, "user-a", deliverable.id, "Book studio time")
            .await
            .unwrap();

        let resp =
            send_request(pool.clone(), &format!("/api/plans/{}", plan.id), Some(&key)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["idea"], "learn ceramics");
        let outcomes = json["outcomes"].as_array().expect("should have outcomes");
        assert_eq!(outcomes.len(), 1);
        let deliverables = outcomes[0]["deliverables"]
            .as_array()
            .expect("should have deliverables");
        assert_eq!(deliverables.len(), 1);
        let actions = deliverables[0]["actions"]
            .as_array()
            .expect("should have actions");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["title"], "Book studio time");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_pending_work_for_empty_plan_is_done() {
        let (pool, db_name) = create_test_db().await;
        let key = issue_test_key(&pool, "user-a").await;

        let plan = insert_plan_shell(&pool, "user-a", "idea", PlanStatus::Ready)
            .await
            .unwrap();

        let resp = send_request(
            pool.clone(),
            &format!("/api/plans/{}/pending", plan.id),
            Some(&key),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["done"], true);
        assert_eq!(json["deliverables"], serde_json::json!([]));

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
