// 🌐 REST API - Axum router over the DataStore
//
// `/api/*` carries the dashboards and exports, `/functions/v1/*` the admin
// proxy endpoints. Admin routes read the caller from the x-admin-token header.

use crate::config::Config;
use crate::context::RequestContext;
use crate::entities::{Agent, Panchayath, RegistrationAnswers};
use crate::error::{AdminError, Result};
use crate::export;
use crate::hierarchy::build_forest;
use crate::programs;
use crate::proxy::{AdminProxy, ProxyRequest, ProxyResponse, ADMIN_TOKEN_HEADER, CORS_HEADERS};
use crate::stats::{fetch_admin_stats, fetch_super_admin_stats, toggle_admin_status};
use crate::store::DataStore;
use crate::token::AdminTokenSigner;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{any, get, post},
    Router,
};
use chrono::{FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub signer: AdminTokenSigner,
    pub offset: FixedOffset,
}

impl AppState {
    pub fn new(store: Arc<dyn DataStore>, config: &Config) -> Result<Self> {
        Ok(AppState {
            store,
            signer: config.auth.signer()?,
            offset: config.display.offset()?,
        })
    }

    fn proxy(&self) -> AdminProxy {
        AdminProxy::new(self.store.clone(), self.signer.clone())
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<RequestContext> {
        let token = headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok());
        self.signer.authenticate(token, Utc::now())
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message().to_string()),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, AdminError>;

#[derive(Deserialize)]
struct DivisionQuery {
    division: Option<String>,
}

#[derive(Deserialize)]
struct ExportQuery {
    #[serde(default)]
    format: Option<String>,
}

#[derive(Deserialize)]
struct ToggleAdminBody {
    is_active: bool,
}

fn attachment(filename: &str, content_type: &'static str, body: String) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        filename,
        urlencoding::encode(filename)
    );

    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/admin/stats - Dashboard for the calling division admin
async fn admin_stats(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let ctx = state.authenticate(&headers)?;
    let stats = fetch_admin_stats(state.store.as_ref(), &ctx).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /api/super-admin/stats
async fn super_admin_stats(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    require_super_admin(&state, &headers)?;
    let stats = fetch_super_admin_stats(state.store.as_ref()).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// POST /api/super-admin/admins/:id/status - `{"is_active": <current>}` flips it
async fn toggle_admin(
    State(state): State<AppState>,
    Path(admin_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ToggleAdminBody>,
) -> ApiResult<impl IntoResponse> {
    require_super_admin(&state, &headers)?;
    toggle_admin_status(state.store.as_ref(), &admin_id, body.is_active).await?;
    Ok(Json(ApiResponse::ok(!body.is_active)))
}

fn require_super_admin(state: &AppState, headers: &HeaderMap) -> Result<RequestContext> {
    let ctx = state.authenticate(headers)?;
    if !ctx.is_super_admin() {
        return Err(AdminError::Forbidden("Super admin access required".to_string()));
    }
    Ok(ctx)
}

/// GET /api/agents/tree
async fn agent_tree(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    state.authenticate(&headers)?;
    let agents = state.store.agents().await?;
    Ok(Json(ApiResponse::ok(build_forest(&agents))))
}

/// GET /api/agents/export?format=csv|html
async fn export_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    state.authenticate(&headers)?;

    let (agents, panchayaths): (Vec<Agent>, Vec<Panchayath>) =
        futures::try_join!(state.store.agents(), state.store.list_panchayaths())?;
    let now = Utc::now();
    let today = now.with_timezone(&state.offset).date_naive();

    match query.format.as_deref().unwrap_or("csv") {
        "csv" => {
            let csv = export::agents_table(&agents, &panchayaths, &state.offset).to_csv_string()?;
            Ok(attachment(&export::agents_filename(today), "text/csv; charset=utf-8", csv))
        }
        "html" => Ok(Html(export::agents_report_html(&agents, &panchayaths, &state.offset, &now)).into_response()),
        other => Err(AdminError::BadRequest(format!("Unknown export format: {}", other))),
    }
}

/// GET /api/programs?division=<name> - Public listing
async fn list_public_programs(
    State(state): State<AppState>,
    Query(query): Query<DivisionQuery>,
) -> ApiResult<impl IntoResponse> {
    let listings = programs::public_programs(state.store.as_ref(), query.division.as_deref()).await?;
    Ok(Json(ApiResponse::ok(listings)))
}

/// POST /api/programs/:id/registrations - Public form submission
async fn submit_registration(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
    Json(answers): Json<RegistrationAnswers>,
) -> ApiResult<impl IntoResponse> {
    let registration = programs::submit_registration(state.store.as_ref(), &program_id, answers).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(registration))))
}

/// GET /api/programs/:id/registrations/export - Spreadsheet download
async fn export_registrations(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let ctx = state.authenticate(&headers)?;
    let program = programs::scoped_program(state.store.as_ref(), &ctx, &program_id).await?;

    let (questions, registrations) = futures::try_join!(
        state.store.form_questions(&program_id),
        programs::program_registrations(state.store.as_ref(), &program_id, None),
    )?;

    let csv = export::registrations_table(&registrations, &questions, &state.offset).to_csv_string()?;
    let today = Utc::now().with_timezone(&state.offset).date_naive();
    info!("Exported {} registrations for \"{}\"", registrations.len(), program.name);

    Ok(attachment(
        &export::registrations_filename(&program.name, today),
        "text/csv; charset=utf-8",
        csv,
    ))
}

// ============================================================================
// Admin proxy
// ============================================================================

fn proxy_request(method: Method, query: HashMap<String, String>, headers: &HeaderMap, body: Bytes) -> ProxyRequest {
    ProxyRequest {
        method: method.as_str().to_uppercase(),
        query,
        token: headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    }
}

fn proxy_response(proxied: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(proxied.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = match proxied.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    };

    for (name, value) in CORS_HEADERS {
        response
            .headers_mut()
            .insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

/// ANY /functions/v1/admin-locations
async fn admin_locations(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = proxy_request(method, query, &headers, body);
    proxy_response(state.proxy().admin_locations(&request).await)
}

/// ANY /functions/v1/admin-registrations
async fn admin_registrations(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = proxy_request(method, query, &headers, body);
    proxy_response(state.proxy().admin_registrations(&request).await)
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/admin/stats", get(admin_stats))
        .route("/super-admin/stats", get(super_admin_stats))
        .route("/super-admin/admins/:id/status", post(toggle_admin))
        .route("/agents/tree", get(agent_tree))
        .route("/agents/export", get(export_agents))
        .route("/programs", get(list_public_programs))
        .route("/programs/:id/registrations", post(submit_registration))
        .route("/programs/:id/registrations/export", get(export_registrations))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let function_routes = Router::new()
        .route("/admin-locations", any(admin_locations))
        .route("/admin-registrations", any(admin_registrations))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .nest("/functions/v1", function_routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{agent, program};
    use crate::db::SqliteStore;
    use crate::entities::{AgentRole, Division, ModuleType};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn config() -> Config {
        let mut config = Config::default();
        config.auth.token_secret = SECRET.to_string();
        config
    }

    fn app(store: SqliteStore) -> (Router, AppState) {
        let state = AppState::new(Arc::new(store), &config()).unwrap();
        (router(state.clone()), state)
    }

    fn token(state: &AppState, ctx: &RequestContext) -> String {
        state.signer.issue("adm1", ctx, Utc::now()).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Response) {
        let response = app.oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_division(&Division {
                id: "d1".into(),
                name: "Agriculture".into(),
                description: None,
                is_active: true,
            })
            .unwrap();
        store.insert_program(&program("p1", "d1", None, true, 1)).unwrap();
        store
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(seeded());
        let (status, response) = send(app, Request::get("/api/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["data"], "OK");
    }

    #[tokio::test]
    async fn test_admin_stats_requires_token() {
        let (app, state) = app(seeded());

        let (status, response) =
            send(app.clone(), Request::get("/api/admin/stats").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "Missing admin token");

        let request = Request::get("/api/admin/stats")
            .header(ADMIN_TOKEN_HEADER, token(&state, &RequestContext::division_admin("d1")))
            .body(Body::empty())
            .unwrap();
        let (status, response) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["total_programs"], 1);
    }

    #[tokio::test]
    async fn test_super_admin_stats_rejects_division_admin() {
        let (app, state) = app(seeded());
        let request = Request::get("/api/super-admin/stats").body(Body::empty()).unwrap();
        let (status, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::get("/api/super-admin/stats")
            .header(ADMIN_TOKEN_HEADER, token(&state, &RequestContext::division_admin("d1")))
            .body(Body::empty())
            .unwrap();
        let (status, response) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"], "Super admin access required");

        let request = Request::get("/api/super-admin/stats")
            .header(ADMIN_TOKEN_HEADER, token(&state, &RequestContext::super_admin()))
            .body(Body::empty())
            .unwrap();
        let (status, response) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["total_divisions"], 1);
    }

    #[tokio::test]
    async fn test_agent_tree() {
        let store = seeded();
        store.insert_agent(&agent("1", AgentRole::TeamLeader, None, 0)).unwrap();
        store.insert_agent(&agent("2", AgentRole::Pro, Some("1"), 4)).unwrap();
        let (app, state) = app(store);

        let request = Request::get("/api/agents/tree")
            .header(ADMIN_TOKEN_HEADER, token(&state, &RequestContext::super_admin()))
            .body(Body::empty())
            .unwrap();
        let (status, response) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"][0]["roots"][0]["total_customers"], 4);
    }

    #[tokio::test]
    async fn test_public_programs_and_submission() {
        let store = seeded();
        let enabled = programs::set_module_enabled(&store, "p1", ModuleType::Registration, true)
            .await
            .unwrap()
            .unwrap();
        programs::toggle_module_published(&store, &enabled).await.unwrap();
        let (app, _) = app(store);

        let (status, response) = send(
            app.clone(),
            Request::get("/api/programs?division=agriculture").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["data"][0]["id"], "p1");

        let submission = json!({"_fixed": {"name": "Asha", "mobile": "9800000000"}});
        let request = Request::post("/api/programs/p1/registrations")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(submission.to_string()))
            .unwrap();
        let (status, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::CREATED);

        let invalid = json!({"_fixed": {"name": "Asha"}});
        let request = Request::post("/api/programs/p1/registrations")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(invalid.to_string()))
            .unwrap();
        let (status, response) = send(app, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["error"], "Mobile number is required");
    }

    #[tokio::test]
    async fn test_registration_export_download() {
        let (app, state) = app(seeded());
        let request = Request::get("/api/programs/p1/registrations/export")
            .header(ADMIN_TOKEN_HEADER, token(&state, &RequestContext::division_admin("d1")))
            .body(Body::empty())
            .unwrap();
        let (status, response) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);

        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment; filename=\"Program_p1_registrations_"));

        let request = Request::get("/api/programs/p1/registrations/export")
            .header(ADMIN_TOKEN_HEADER, token(&state, &RequestContext::division_admin("d2")))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_agents_export_formats() {
        let store = seeded();
        store.insert_agent(&agent("1", AgentRole::Pro, None, 3)).unwrap();
        let (app, state) = app(store);
        let admin = token(&state, &RequestContext::super_admin());

        let request = Request::get("/api/agents/export?format=html")
            .header(ADMIN_TOKEN_HEADER, &admin)
            .body(Body::empty())
            .unwrap();
        let (status, response) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Total Customers: 3"));

        let request = Request::get("/api/agents/export?format=pdf")
            .header(ADMIN_TOKEN_HEADER, &admin)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_locations_through_router() {
        let (app, state) = app(seeded());

        let (status, response) = send(
            app.clone(),
            Request::get("/functions/v1/admin-locations").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let request = Request::post("/functions/v1/admin-locations?resource=panchayaths&action=create")
            .header(ADMIN_TOKEN_HEADER, token(&state, &RequestContext::super_admin()))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"name": "Kodur"}).to_string()))
            .unwrap();
        let (status, response) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["name"], "Kodur");
    }
}
