//! api-server — HTTP API for the member registry workspace.
//!
//! Exposes the registration and lookup endpoints over two collections
//! (members and the groups they belong to) and supports local dev with:
//! - Storage: In-memory (default) or DynamoDB when the `dynamo` feature is
//!   enabled and `STORAGE_PROVIDER=dynamo`.
//! - Logs: pretty (default) or JSON via LOG_FORMAT.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # with Dynamo adapter enabled
//! STORAGE_PROVIDER=dynamo \
//! DYNAMO_TABLE_USERS=Users \
//! DYNAMO_TABLE_GROUPS=Groups \
//!   cargo run -p api-server --features dynamo
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_store::{InMemoryGroupStore, InMemoryMemberStore};
use domain::codec;
use domain::service::{Directory, RegistrationService};
use domain::{CoreError, Group, GroupStore, Member, MemberStore};
use serde_json::{json, Value};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Local store abstraction supporting memory or dynamo (feature-gated).
enum MemberKind {
    Memory(InMemoryMemberStore),
    #[cfg(feature = "dynamo")]
    Dynamo(aws_dynamo::DynamoStore),
}

enum GroupKind {
    Memory(InMemoryGroupStore),
    #[cfg(feature = "dynamo")]
    Dynamo(aws_dynamo::DynamoStore),
}

#[derive(Clone)]
struct AnyMemberStore {
    kind: Arc<MemberKind>,
}

#[derive(Clone)]
struct AnyGroupStore {
    kind: Arc<GroupKind>,
}

impl MemberStore for AnyMemberStore {
    fn get(&self, name: &str) -> Result<Option<Member>, CoreError> {
        match &*self.kind {
            MemberKind::Memory(s) => s.get(name),
            #[cfg(feature = "dynamo")]
            MemberKind::Dynamo(s) => MemberStore::get(s, name),
        }
    }

    fn put(&self, member: &Member) -> Result<(), CoreError> {
        match &*self.kind {
            MemberKind::Memory(s) => s.put(member),
            #[cfg(feature = "dynamo")]
            MemberKind::Dynamo(s) => MemberStore::put(s, member),
        }
    }

    fn scan_all(&self) -> Result<Vec<Member>, CoreError> {
        match &*self.kind {
            MemberKind::Memory(s) => s.scan_all(),
            #[cfg(feature = "dynamo")]
            MemberKind::Dynamo(s) => MemberStore::scan_all(s),
        }
    }
}

impl GroupStore for AnyGroupStore {
    fn get(&self, name: &str) -> Result<Option<Group>, CoreError> {
        match &*self.kind {
            GroupKind::Memory(s) => s.get(name),
            #[cfg(feature = "dynamo")]
            GroupKind::Dynamo(s) => GroupStore::get(s, name),
        }
    }

    fn put(&self, group: &Group) -> Result<(), CoreError> {
        match &*self.kind {
            GroupKind::Memory(s) => s.put(group),
            #[cfg(feature = "dynamo")]
            GroupKind::Dynamo(s) => GroupStore::put(s, group),
        }
    }

    fn append_members(&self, group_name: &str, members: &[Member]) -> Result<(), CoreError> {
        match &*self.kind {
            GroupKind::Memory(s) => s.append_members(group_name, members),
            #[cfg(feature = "dynamo")]
            GroupKind::Dynamo(s) => s.append_members(group_name, members),
        }
    }

    fn scan_all(&self) -> Result<Vec<Group>, CoreError> {
        match &*self.kind {
            GroupKind::Memory(s) => s.scan_all(),
            #[cfg(feature = "dynamo")]
            GroupKind::Dynamo(s) => GroupStore::scan_all(s),
        }
    }
}

fn memory_stores() -> (AnyMemberStore, AnyGroupStore) {
    (
        AnyMemberStore {
            kind: Arc::new(MemberKind::Memory(InMemoryMemberStore::new())),
        },
        AnyGroupStore {
            kind: Arc::new(GroupKind::Memory(InMemoryGroupStore::new())),
        },
    )
}

#[cfg(feature = "dynamo")]
fn dynamo_stores() -> Result<(AnyMemberStore, AnyGroupStore), CoreError> {
    // One client handle backs both collections.
    let store = aws_dynamo::DynamoStore::from_env()?;
    Ok((
        AnyMemberStore {
            kind: Arc::new(MemberKind::Dynamo(store.clone())),
        },
        AnyGroupStore {
            kind: Arc::new(GroupKind::Dynamo(store)),
        },
    ))
}

#[derive(Clone)]
struct AppState {
    registry: Arc<RegistrationService<AnyMemberStore, AnyGroupStore>>,
    directory: Arc<Directory<AnyMemberStore, AnyGroupStore>>,
}

impl AppState {
    fn new(members: AnyMemberStore, groups: AnyGroupStore) -> Self {
        Self {
            registry: Arc::new(RegistrationService::new(members.clone(), groups.clone())),
            directory: Arc::new(Directory::new(members, groups)),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);

    let (members, groups) = build_stores_from_env(&cfg);
    let state = AppState::new(members, groups);

    let app = router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind port");
    axum::serve(listener, app).await.expect("server error");
}

fn router(state: AppState) -> Router {
    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/", get(home))
        .route("/users", get(get_users))
        .route("/users/:name", get(get_user_by_name))
        .route("/groups", get(get_groups))
        .route("/groups/:name", get(get_group_by_name))
        .route("/subscribe", post(subscribe))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state)
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct store instances based on config and feature flags.
fn build_stores_from_env(cfg: &config::Config) -> (AnyMemberStore, AnyGroupStore) {
    match cfg.storage_provider {
        #[cfg(feature = "dynamo")]
        config::StorageProvider::Dynamo => match dynamo_stores() {
            Ok(stores) => stores,
            Err(e) => {
                eprintln!("failed to init DynamoStore from env: {e}");
                memory_stores()
            }
        },
        #[cfg(not(feature = "dynamo"))]
        config::StorageProvider::Dynamo => {
            eprintln!("STORAGE_PROVIDER=dynamo but the dynamo feature is not compiled in");
            memory_stores()
        }
        config::StorageProvider::Memory => memory_stores(),
    }
}

/// All JSON error bodies use the `{"ERROR": "<message>"}` shape.
fn error_body(message: &str) -> Json<Value> {
    Json(json!({ "ERROR": message }))
}

async fn home() -> &'static str {
    "Hello, welcome!"
}

async fn get_users(State(state): State<AppState>) -> Response {
    match state.directory.list_members() {
        Ok(members) => {
            let body: Vec<Value> = members.iter().map(codec::encode_member).collect();
            Json(body).into_response()
        }
        Err(e) => {
            error!(err = ?e, "list users error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(&format!("An error occurred while trying to get users: {e}")),
            )
                .into_response()
        }
    }
}

async fn get_user_by_name(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.directory.get_member(&name) {
        Ok(member) => Json(codec::encode_member(&member)).into_response(),
        Err(CoreError::NotFound) => {
            warn!(user = %name, "user lookup 404");
            (StatusCode::NOT_FOUND, error_body("User not found.")).into_response()
        }
        Err(e) => {
            error!(user = %name, err = ?e, "user lookup error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(&format!("An error occurred while trying to get user: {e}")),
            )
                .into_response()
        }
    }
}

async fn get_groups(State(state): State<AppState>) -> Response {
    match state.directory.list_groups() {
        Ok(groups) => {
            let body: Vec<Value> = groups.iter().map(codec::encode_group).collect();
            Json(body).into_response()
        }
        Err(e) => {
            error!(err = ?e, "list groups error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(&format!("An error occurred while trying to get groups: {e}")),
            )
                .into_response()
        }
    }
}

async fn get_group_by_name(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.directory.get_group(&name) {
        Ok(group) => Json(codec::encode_group(&group)).into_response(),
        Err(CoreError::NotFound) => {
            warn!(group = %name, "group lookup 404");
            (StatusCode::NOT_FOUND, error_body("Group not found.")).into_response()
        }
        Err(e) => {
            error!(group = %name, err = ?e, "group lookup error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(&format!("An error occurred while trying to get group: {e}")),
            )
                .into_response()
        }
    }
}

async fn subscribe(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(raw) = match payload {
        Ok(p) => p,
        Err(_) => {
            warn!("subscribe without JSON body");
            return (
                StatusCode::BAD_REQUEST,
                error_body("No JSON document was provided"),
            )
                .into_response();
        }
    };

    match state.registry.register(&raw) {
        Ok(member) => {
            info!(user = %member.name, group = %member.group, "subscribe ok");
            (StatusCode::OK, "New user subscribed!").into_response()
        }
        Err(CoreError::MissingField(field)) => (
            StatusCode::BAD_REQUEST,
            error_body(&format!("Missing field in input data: {field}")),
        )
            .into_response(),
        Err(e) => {
            error!(err = ?e, "subscribe error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(&format!(
                    "An error occurred while trying to insert a new user: {e}"
                )),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn app() -> Router {
        let (members, groups) = memory_stores();
        router(AppState::new(members, groups))
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn subscribe_req(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/subscribe")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn home_greets() {
        let resp = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"Hello, welcome!");
    }

    #[tokio::test]
    async fn subscribe_and_lookup_flow() {
        let router = app();

        let alice = json!({
            "name": "alice", "region": "us", "email": "a@x.com",
            "age": "30", "group": "g1",
        });
        let resp = router.clone().oneshot(subscribe_req(&alice)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bob = json!({
            "name": "bob", "region": "us", "email": "b@x.com",
            "age": "25", "group": "g1",
        });
        let resp = router.clone().oneshot(subscribe_req(&bob)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // Point lookup
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/users/alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let user = body_json(resp).await;
        assert_eq!(user["email"], "a@x.com");

        // Full listing
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/users")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 2);

        // Group carries both members in registration order
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/groups/g1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let group = body_json(resp).await;
        assert_eq!(group["name"], "g1");
        assert_eq!(group["region"], "us");
        assert_eq!(group["users"][0]["name"], "alice");
        assert_eq!(group["users"][1]["name"], "bob");
    }

    #[tokio::test]
    async fn subscribe_missing_field_is_bad_request() {
        let raw = json!({"name": "alice", "region": "us", "age": "30", "group": "g1"});
        let resp = app().oneshot(subscribe_req(&raw)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["ERROR"], "Missing field in input data: email");
    }

    #[tokio::test]
    async fn subscribe_without_body_is_bad_request() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/subscribe")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["ERROR"], "No JSON document was provided");
    }

    #[tokio::test]
    async fn unknown_lookups_are_not_found() {
        let router = app();

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/users/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["ERROR"], "User not found.");

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/groups/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["ERROR"], "Group not found.");
    }

    #[tokio::test]
    async fn empty_collections_list_as_empty_arrays() {
        let router = app();
        for uri in ["/users", "/groups"] {
            let resp = router
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(body_json(resp).await, json!([]));
        }
    }
}
