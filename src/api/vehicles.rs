/// Vehicle fleet and vehicle document endpoints
///
/// Document files live in the `vehicle-documents` storage bucket; rows hold
/// the object path. Removing the object after deleting the row is best
/// effort and only logged when it fails.

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    storage::VEHICLE_DOCUMENTS_BUCKET,
    store::vehicles::{NewVehicle, NewVehicleDocument, VehicleFilter, VehicleStore, VehicleUpdate},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

/// Lifetime of a download link
const DOWNLOAD_URL_TTL_SECS: u64 = 300;

pub fn create_vehicle_routes() -> Router<AppState> {
    Router::new()
        .route("/api/vehicles", get(list_vehicles).post(create_vehicle))
        .route(
            "/api/vehicles/{id}",
            get(get_vehicle).put(update_vehicle).delete(delete_vehicle),
        )
        .route(
            "/api/vehicles/{id}/documents",
            get(list_documents).post(add_document),
        )
        .route(
            "/api/vehicles/{id}/documents/{document_id}",
            delete(delete_document),
        )
        .route(
            "/api/vehicles/{id}/documents/{document_id}/download",
            get(download_document),
        )
}

/// GET /api/vehicles?status=&type=&search=&available_only=
async fn list_vehicles(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<VehicleFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (vehicles, total) = VehicleStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list vehicles: {:#}", e);
            ApiError::from(e)
        })?;

    let today = Utc::now().date_naive();
    let items: Vec<Value> = vehicles.iter().map(|v| v.to_json(today)).collect();
    Ok(Json(page.envelope(items, total)))
}

/// POST /api/vehicles
async fn create_vehicle(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewVehicle>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("equipment.create")?;
    let plate = required(payload.plate_number.as_deref(), "plate_number")?;

    let created = VehicleStore::new(&state.db)
        .create(plate, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => {
                ApiError::Conflict("Vehicle with this plate number already exists".to_string())
            }
            other => other,
        })?;

    tracing::info!("🔥 Created vehicle {} ({})", created.id, created.plate_number);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// GET /api/vehicles/{id}
async fn get_vehicle(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let vehicle = VehicleStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Vehicle not found"))?;
    Ok(Json(vehicle.to_json(Utc::now().date_naive())))
}

/// PUT /api/vehicles/{id}
async fn update_vehicle(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VehicleUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("equipment.update")?;
    if matches!(payload.plate_number.as_deref(), Some(p) if p.trim().is_empty()) {
        return Err(ApiError::bad_request("plate_number must not be empty"));
    }

    let updated = VehicleStore::new(&state.db)
        .update(id, payload)
        .await
        .map_err(|e| match ApiError::or_not_found(e, "Vehicle not found") {
            ApiError::Conflict(_) => {
                ApiError::Conflict("Vehicle with this plate number already exists".to_string())
            }
            other => other,
        })?
        .ok_or_else(|| ApiError::bad_request("No fields to update"))?;

    tracing::info!("🔥 Updated vehicle {}", id);
    Ok(Json(json!(updated)))
}

/// DELETE /api/vehicles/{id}
async fn delete_vehicle(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("equipment.delete")?;

    let paths = VehicleStore::new(&state.db)
        .delete(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Vehicle not found"))?;

    if !paths.is_empty() {
        if let Err(e) = state.storage.remove(VEHICLE_DOCUMENTS_BUCKET, &paths).await {
            tracing::warn!("⚠️ Vehicle {} deleted but {} files remain in storage: {:#}", id, paths.len(), e);
        }
    }

    tracing::info!("🔥 Deleted vehicle {}", id);
    Ok(Json(json!({ "message": "Vehicle deleted successfully" })))
}

/// GET /api/vehicles/{id}/documents
async fn list_documents(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let store = VehicleStore::new(&state.db);
    if !store.exists(id).await? {
        return Err(ApiError::not_found("Vehicle not found"));
    }
    let documents = store.documents(id).await?;
    Ok(Json(json!(documents)))
}

/// POST /api/vehicles/{id}/documents
/// Body: metadata of an object already uploaded to the bucket
async fn add_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewVehicleDocument>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("equipment.update")?;
    let document_type = required(payload.document_type.as_deref(), "document_type")?;
    let file_name = required(payload.file_name.as_deref(), "file_name")?;
    let file_path = required(payload.file_path.as_deref(), "file_path")?;
    if let (Some(issued), Some(expires)) = (payload.issue_date, payload.expiry_date) {
        if expires < issued {
            return Err(ApiError::bad_request("expiry_date must not be before issue_date"));
        }
    }

    let store = VehicleStore::new(&state.db);
    if !store.exists(id).await? {
        return Err(ApiError::not_found("Vehicle not found"));
    }

    let created = store
        .add_document(id, document_type, file_name, file_path, &payload, user.id())
        .await?;

    tracing::info!("🔥 Attached {} to vehicle {}", created.document_type, id);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// DELETE /api/vehicles/{id}/documents/{document_id}
async fn delete_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, document_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    user.require("equipment.update")?;

    let deleted = VehicleStore::new(&state.db)
        .delete_document(id, document_id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Document not found"))?;

    if let Err(e) = state
        .storage
        .remove(VEHICLE_DOCUMENTS_BUCKET, &[deleted.file_path.clone()])
        .await
    {
        tracing::warn!("⚠️ Document {} deleted but file {} remains: {:#}", document_id, deleted.file_path, e);
    }

    tracing::info!("🔥 Deleted document {} of vehicle {}", document_id, id);
    Ok(Json(json!({ "message": "Document deleted successfully" })))
}

/// GET /api/vehicles/{id}/documents/{document_id}/download
async fn download_document(
    State(state): State<AppState>,
    _user: AuthUser,
    Path((id, document_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let document = VehicleStore::new(&state.db)
        .document(id, document_id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Document not found"))?;

    let url = state
        .storage
        .create_signed_url(VEHICLE_DOCUMENTS_BUCKET, &document.file_path, DOWNLOAD_URL_TTL_SECS)
        .await
        .map_err(|e| {
            tracing::error!("Failed to sign URL for {}: {:#}", document.file_path, e);
            ApiError::Internal(e)
        })?;

    Ok(Json(json!({
        "url": url,
        "file_name": document.file_name,
        "expires_in": DOWNLOAD_URL_TTL_SECS,
    })))
}
