use crate::error::{VaultError, VaultResult};
use crate::vault::{
    CredentialGrant, ImportReport, KeySummary, KeyUpdate, NewKey, UsageStats, VaultSnapshot,
};
use crate::web::auth::{require_admin, CallerIdentity};
use crate::web::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post, put},
    Router,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use zeroize::Zeroize;

/// JSON body whose parse failures surface as validation errors.
type JsonBody<T> = WithRejection<Json<T>, VaultError>;

type QueryParams<T> = WithRejection<Query<T>, VaultError>;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub total_keys: usize,
    pub active_keys: usize,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let counts = state.vault.health();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        total_keys: counts.total_keys,
        active_keys: counts.active_keys,
    })
}

#[derive(Serialize, Deserialize)]
pub struct CreateKeyResponse {
    pub key_id: String,
    pub service_name: String,
    pub message: String,
}

/// POST /admin/keys
pub async fn create_key(
    State(state): State<AppState>,
    WithRejection(Json(request), _): JsonBody<NewKey>,
) -> VaultResult<(StatusCode, Json<CreateKeyResponse>)> {
    let service_name = request.service_name.clone();
    let key_id = state.vault.create_key(request)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateKeyResponse {
            key_id,
            service_name,
            message: "API key stored securely".to_string(),
        }),
    ))
}

#[derive(Serialize, Deserialize)]
pub struct KeyListResponse {
    pub keys: Vec<KeySummary>,
}

/// GET /admin/keys
pub async fn list_keys(State(state): State<AppState>) -> Json<KeyListResponse> {
    Json(KeyListResponse {
        keys: state.vault.list_keys(),
    })
}

/// PUT /admin/keys/{id}
pub async fn update_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
    WithRejection(Json(update), _): JsonBody<KeyUpdate>,
) -> VaultResult<Json<KeySummary>> {
    Ok(Json(state.vault.update_key(&key_id, update)?))
}

#[derive(Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// DELETE /admin/keys/{id}
pub async fn delete_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> VaultResult<Json<MessageResponse>> {
    state.vault.delete_key(&key_id)?;
    Ok(Json(MessageResponse {
        message: "Key deleted successfully".to_string(),
    }))
}

/// Replacement credential, from the JSON body or the `new_api_key` query
/// parameter. A non-empty body wins.
#[derive(Deserialize, Default)]
pub struct RotateKeyRequest {
    #[serde(default)]
    pub new_api_key: Option<String>,
}

impl Drop for RotateKeyRequest {
    fn drop(&mut self) {
        self.new_api_key.zeroize();
    }
}

#[derive(Serialize, Deserialize)]
pub struct RotateKeyResponse {
    pub key_id: String,
    pub rotated_at: DateTime<Utc>,
    pub message: String,
}

/// POST /admin/keys/{id}/rotate
pub async fn rotate_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
    WithRejection(Query(query), _): QueryParams<RotateKeyRequest>,
    body: Bytes,
) -> VaultResult<Json<RotateKeyResponse>> {
    let request = if body.is_empty() {
        query
    } else {
        serde_json::from_slice::<RotateKeyRequest>(&body)
            .map_err(|e| VaultError::validation(format!("Invalid rotate body: {}", e)))?
    };
    let new_api_key = request
        .new_api_key
        .as_deref()
        .ok_or_else(|| VaultError::validation("new_api_key is required"))?;

    let rotated_at = state.vault.rotate_key(&key_id, new_api_key)?;
    Ok(Json(RotateKeyResponse {
        key_id,
        rotated_at,
        message: "Key rotated successfully".to_string(),
    }))
}

/// GET /admin/usage/{id}
pub async fn usage_stats(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> VaultResult<Json<UsageStats>> {
    Ok(Json(state.vault.usage_stats(&key_id)?))
}

/// GET /admin/export
pub async fn export_vault(State(state): State<AppState>) -> Json<VaultSnapshot> {
    Json(state.vault.export_all())
}

/// POST /admin/import
pub async fn import_vault(
    State(state): State<AppState>,
    WithRejection(Json(snapshot), _): JsonBody<VaultSnapshot>,
) -> VaultResult<Json<ImportReport>> {
    Ok(Json(state.vault.import_all(&snapshot)?))
}

#[derive(Deserialize)]
pub struct ContractKeyRequest {
    pub service_name: String,
}

/// POST /contract/get-key
///
/// The caller identity comes from the verified `X-Contract-Address` header,
/// never from the body.
pub async fn get_key_for_contract(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    WithRejection(Json(request), _): JsonBody<ContractKeyRequest>,
) -> VaultResult<Json<CredentialGrant>> {
    match state.vault.request_credential(&caller, &request.service_name) {
        Ok(grant) => Ok(Json(grant)),
        Err(VaultError::Forbidden) if state.conceal_forbidden => Err(VaultError::NotFound),
        Err(e) => Err(e),
    }
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/keys", post(create_key).get(list_keys))
        .route("/keys/{id}", put(update_key).delete(delete_key))
        .route("/keys/{id}/rotate", post(rotate_key))
        .route("/usage/{id}", get(usage_stats))
        .route("/export", get(export_vault))
        .route("/import", post(import_vault))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    info!("Mounted admin and contract routes");

    Router::new()
        .route("/health", get(health))
        .route("/contract/get-key", post(get_key_for_contract))
        .nest("/admin", admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
