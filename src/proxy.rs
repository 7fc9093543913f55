// 🛡️ Admin Proxy - Privileged endpoints behind a signed admin token
//
// Framework-agnostic: callers hand in method, query, token header and body,
// and get back a status code plus JSON body. The token is verified before
// anything touches the store.

use crate::entities::{ClusterPatch, NewCluster, NewPanchayath, PanchayathPatch};
use crate::error::{AdminError, Result};
use crate::programs;
use crate::store::DataStore;
use crate::token::AdminTokenSigner;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Header carrying the admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    (
        "access-control-allow-headers",
        "authorization, x-client-info, apikey, content-type, x-admin-token",
    ),
    ("access-control-allow-methods", "GET, POST, PATCH, OPTIONS"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Panchayaths,
    Clusters,
}

impl Resource {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "panchayaths" => Some(Resource::Panchayaths),
            "clusters" => Some(Resource::Clusters),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProxyRequest {
    pub method: String,
    pub query: HashMap<String, String>,
    pub token: Option<String>,
    pub body: Vec<u8>,
}

impl ProxyRequest {
    pub fn new(method: impl Into<String>) -> Self {
        ProxyRequest {
            method: method.into().to_uppercase(),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn json_body(mut self, body: &Value) -> Self {
        self.body = body.to_string().into_bytes();
        self
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn parse_body<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| AdminError::BadRequest(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,

    /// `None` for preflight responses
    pub body: Option<Value>,
}

impl ProxyResponse {
    fn ok(body: Value) -> Self {
        ProxyResponse {
            status: 200,
            body: Some(body),
        }
    }

    fn preflight() -> Self {
        ProxyResponse { status: 200, body: None }
    }

    fn error(err: &AdminError) -> Self {
        ProxyResponse {
            status: err.status_code(),
            body: Some(json!({ "error": err.message() })),
        }
    }
}

// ============================================================================
// PROXY
// ============================================================================

#[derive(Clone)]
pub struct AdminProxy {
    store: Arc<dyn DataStore>,
    signer: AdminTokenSigner,
}

impl AdminProxy {
    pub fn new(store: Arc<dyn DataStore>, signer: AdminTokenSigner) -> Self {
        AdminProxy { store, signer }
    }

    fn authorize(&self, request: &ProxyRequest) -> Result<crate::context::RequestContext> {
        self.signer.authenticate(request.token.as_deref(), Utc::now())
    }

    /// `admin-locations?resource=<panchayaths|clusters>&action=<list|create|update>`
    pub async fn admin_locations(&self, request: &ProxyRequest) -> ProxyResponse {
        if request.method == "OPTIONS" {
            return ProxyResponse::preflight();
        }

        if let Err(err) = self.authorize(request) {
            return ProxyResponse::error(&err);
        }

        let resource = request.param("resource").unwrap_or("panchayaths");
        let action = request.param("action").unwrap_or("list");
        info!("Admin locations request: {} {}", action, resource);

        match self.dispatch_locations(request, resource, action).await {
            Ok(data) => ProxyResponse::ok(json!({ "data": data })),
            Err(err) => {
                error!("Admin locations error: {}", err);
                ProxyResponse::error(&err)
            }
        }
    }

    async fn dispatch_locations(&self, request: &ProxyRequest, resource: &str, action: &str) -> Result<Value> {
        let invalid = || AdminError::BadRequest("Invalid resource or action".to_string());
        let resource = Resource::parse(resource).ok_or_else(invalid)?;
        let method = request.method.as_str();

        if method == "GET" || action == "list" {
            return Ok(match resource {
                Resource::Panchayaths => serde_json::to_value(self.store.list_panchayaths().await?)?,
                Resource::Clusters => serde_json::to_value(self.store.list_clusters().await?)?,
            });
        }

        match (method, action, resource) {
            ("POST", "create", Resource::Panchayaths) => {
                let input: NewPanchayath = request.parse_body()?;
                Ok(serde_json::to_value(self.store.create_panchayath(&input).await?)?)
            }
            ("POST", "create", Resource::Clusters) => {
                let input: NewCluster = request.parse_body()?;
                Ok(serde_json::to_value(self.store.create_cluster(&input).await?)?)
            }
            ("PATCH", "update", Resource::Panchayaths) => {
                let patch: PanchayathPatch = request.parse_body()?;
                Ok(serde_json::to_value(self.store.update_panchayath(&patch).await?)?)
            }
            ("PATCH", "update", Resource::Clusters) => {
                let patch: ClusterPatch = request.parse_body()?;
                Ok(serde_json::to_value(self.store.update_cluster(&patch).await?)?)
            }
            _ => Err(invalid()),
        }
    }

    /// `admin-registrations?program_id=<id>[&panchayath_id=<id>]`
    pub async fn admin_registrations(&self, request: &ProxyRequest) -> ProxyResponse {
        if request.method == "OPTIONS" {
            return ProxyResponse::preflight();
        }

        let ctx = match self.authorize(request) {
            Ok(ctx) => ctx,
            Err(err) => return ProxyResponse::error(&err),
        };

        let result = async {
            let program_id = request
                .param("program_id")
                .ok_or_else(|| AdminError::BadRequest("program_id is required".to_string()))?;

            programs::scoped_program(self.store.as_ref(), &ctx, program_id).await?;

            let registrations =
                programs::program_registrations(self.store.as_ref(), program_id, request.param("panchayath_id"))
                    .await?;
            info!("Admin registrations request: {} rows for {}", registrations.len(), program_id);
            Ok::<_, AdminError>(json!({ "registrations": registrations }))
        }
        .await;

        match result {
            Ok(body) => ProxyResponse::ok(body),
            Err(err) => {
                error!("Admin registrations error: {}", err);
                ProxyResponse::error(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::db::tests::{program, registration};
    use crate::db::SqliteStore;
    use crate::entities::Panchayath;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn proxy(store: SqliteStore) -> AdminProxy {
        AdminProxy::new(Arc::new(store), AdminTokenSigner::new(SECRET, 3600).unwrap())
    }

    fn token_for(ctx: &RequestContext) -> String {
        AdminTokenSigner::new(SECRET, 3600)
            .unwrap()
            .issue("adm1", ctx, Utc::now())
            .unwrap()
    }

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, name) in [("p2", "Vengara"), ("p1", "Kodur")] {
            store
                .insert_panchayath(&Panchayath { id: id.into(), name: name.into(), is_active: true })
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_missing_token_is_401_before_store_access() {
        let store = seeded();
        // A broken store would surface as 500 if it were queried
        store
            .with_connection(|conn| {
                conn.execute_batch("DROP TABLE panchayaths")?;
                Ok(())
            })
            .unwrap();
        let proxy = proxy(store);

        let response = proxy.admin_locations(&ProxyRequest::new("GET")).await;
        assert_eq!(response.status, 401);
        assert_eq!(response.body, Some(json!({"error": "Missing admin token"})));

        let response = proxy
            .admin_locations(&ProxyRequest::new("GET").token("garbage.token"))
            .await;
        assert_eq!(response.status, 401);
    }

    #[tokio::test]
    async fn test_list_defaults_to_panchayaths_by_name() {
        let proxy = proxy(seeded());
        let token = token_for(&RequestContext::super_admin());

        let response = proxy.admin_locations(&ProxyRequest::new("GET").token(&token)).await;
        assert_eq!(response.status, 200);
        let body = response.body.unwrap();
        assert_eq!(body["data"][0]["name"], "Kodur");
        assert_eq!(body["data"][1]["name"], "Vengara");
    }

    #[tokio::test]
    async fn test_create_and_update_cluster() {
        let proxy = proxy(seeded());
        let token = token_for(&RequestContext::super_admin());

        let created = proxy
            .admin_locations(
                &ProxyRequest::new("POST")
                    .token(&token)
                    .query("resource", "clusters")
                    .query("action", "create")
                    .json_body(&json!({"name": "North", "panchayath_id": "p1"})),
            )
            .await;
        assert_eq!(created.status, 200);
        let id = created.body.unwrap()["data"]["id"].as_str().unwrap().to_string();

        let updated = proxy
            .admin_locations(
                &ProxyRequest::new("PATCH")
                    .token(&token)
                    .query("resource", "clusters")
                    .query("action", "update")
                    .json_body(&json!({"id": id, "is_active": false})),
            )
            .await;
        assert_eq!(updated.status, 200);
        assert_eq!(updated.body.unwrap()["data"]["is_active"], false);

        let listed = proxy
            .admin_locations(&ProxyRequest::new("GET").token(&token).query("resource", "clusters"))
            .await;
        assert_eq!(listed.body.unwrap()["data"][0]["panchayath_name"], "Kodur");
    }

    #[tokio::test]
    async fn test_invalid_resource_or_action() {
        let proxy = proxy(seeded());
        let token = token_for(&RequestContext::super_admin());

        let response = proxy
            .admin_locations(&ProxyRequest::new("POST").token(&token).query("action", "delete"))
            .await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body, Some(json!({"error": "Invalid resource or action"})));

        let response = proxy
            .admin_locations(&ProxyRequest::new("GET").token(&token).query("resource", "wards"))
            .await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let store = seeded();
        store
            .with_connection(|conn| {
                conn.execute_batch("DROP TABLE panchayaths")?;
                Ok(())
            })
            .unwrap();
        let proxy = proxy(store);
        let token = token_for(&RequestContext::super_admin());

        let response = proxy.admin_locations(&ProxyRequest::new("GET").token(&token)).await;
        assert_eq!(response.status, 500);
        assert!(response.body.unwrap()["error"].as_str().unwrap().contains("no such table"));
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let proxy = proxy(seeded());
        let response = proxy.admin_locations(&ProxyRequest::new("options")).await;
        assert_eq!(response, ProxyResponse { status: 200, body: None });
    }

    #[tokio::test]
    async fn test_registrations_scoped_to_division() {
        let store = seeded();
        store.insert_program(&program("a", "d1", None, false, 1)).unwrap();
        store
            .insert_registration(&registration("r1", "a", serde_json::json!({"_fixed": {"name": "Asha"}}), 2))
            .await
            .unwrap();
        let proxy = proxy(store);

        let own = token_for(&RequestContext::division_admin("d1"));
        let response = proxy
            .admin_registrations(&ProxyRequest::new("GET").token(&own).query("program_id", "a"))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body.unwrap()["registrations"][0]["id"], "r1");

        let other = token_for(&RequestContext::division_admin("d9"));
        let response = proxy
            .admin_registrations(&ProxyRequest::new("GET").token(&other).query("program_id", "a"))
            .await;
        assert_eq!(response.status, 404);

        let response = proxy
            .admin_registrations(&ProxyRequest::new("GET").token(&own))
            .await;
        assert_eq!(response.status, 400);
    }
}
