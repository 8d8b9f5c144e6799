/// Supplier directory endpoints
///
/// Suppliers share the material permissions: reading needs a login, changes
/// need `materials.create`, `materials.update` or `materials.delete`.

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::suppliers::{
        check_supplier_fields, NewSupplier, NewSupplierContact, NewSupplierMaterial,
        SupplierFilter, SupplierStore, SupplierUpdate,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub fn create_supplier_routes() -> Router<AppState> {
    Router::new()
        .route("/api/suppliers", get(list_suppliers).post(create_supplier))
        .route(
            "/api/suppliers/{id}",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
        .route(
            "/api/suppliers/{id}/contacts",
            get(list_contacts).post(add_contact),
        )
        .route(
            "/api/suppliers/{id}/materials",
            get(list_materials).post(add_material),
        )
}

async fn ensure_supplier(store: &SupplierStore, id: Uuid) -> ApiResult<()> {
    if store.exists(id).await? {
        Ok(())
    } else {
        Err(ApiError::not_found("Supplier not found"))
    }
}

/// GET /api/suppliers?search=&is_active=&rating=
async fn list_suppliers(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<SupplierFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (suppliers, total) = SupplierStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list suppliers: {:#}", e);
            ApiError::from(e)
        })?;

    let items: Vec<Value> = suppliers.iter().map(|s| s.to_json()).collect();
    Ok(Json(page.envelope(items, total)))
}

/// POST /api/suppliers
async fn create_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewSupplier>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("materials.create")?;
    let name = required(payload.name.as_deref(), "name")?;
    check_supplier_fields(payload.email.as_deref(), payload.rating).map_err(ApiError::bad_request)?;

    let created = SupplierStore::new(&state.db).create(name, &payload).await?;

    tracing::info!("🔥 Created supplier {} ({})", created.id, created.name);
    Ok((StatusCode::CREATED, Json(created.to_json())))
}

/// GET /api/suppliers/{id}
async fn get_supplier(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let supplier = SupplierStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Supplier not found"))?;
    Ok(Json(supplier.to_json()))
}

/// PUT /api/suppliers/{id}
async fn update_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SupplierUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("materials.update")?;
    if let Some(name) = payload.name.as_deref() {
        required(Some(name), "name")?;
    }
    check_supplier_fields(payload.email.as_deref(), payload.rating).map_err(ApiError::bad_request)?;

    let updated = SupplierStore::new(&state.db)
        .update(id, payload)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Supplier not found"))?
        .ok_or_else(|| ApiError::bad_request("No fields to update"))?;

    tracing::info!("🔥 Updated supplier {}", id);
    Ok(Json(updated.to_json()))
}

/// DELETE /api/suppliers/{id}
async fn delete_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("materials.delete")?;

    SupplierStore::new(&state.db)
        .delete(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Supplier not found"))?;

    tracing::info!("🔥 Deleted supplier {}", id);
    Ok(Json(json!({ "message": "Supplier deleted successfully" })))
}

/// GET /api/suppliers/{id}/contacts
async fn list_contacts(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let store = SupplierStore::new(&state.db);
    ensure_supplier(&store, id).await?;
    let contacts = store.contacts(id).await?;
    Ok(Json(json!(contacts)))
}

/// POST /api/suppliers/{id}/contacts
async fn add_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewSupplierContact>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("materials.update")?;
    let contact_name = payload
        .display_name()
        .ok_or_else(|| ApiError::bad_request("contact_name is required"))?;

    let store = SupplierStore::new(&state.db);
    ensure_supplier(&store, id).await?;
    let created = store.add_contact(id, contact_name, &payload).await?;

    tracing::info!("🔥 Added contact {} to supplier {}", created.contact_name, id);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// GET /api/suppliers/{id}/materials
async fn list_materials(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let store = SupplierStore::new(&state.db);
    ensure_supplier(&store, id).await?;
    let materials = store.materials(id).await?;
    Ok(Json(json!(materials)))
}

/// POST /api/suppliers/{id}/materials
/// Body: `material_id`, or `material_name` + `unit` to create the material first
async fn add_material(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewSupplierMaterial>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("materials.update")?;
    let (source, unit_price, minimum_order_qty) =
        payload.validate().map_err(ApiError::bad_request)?;

    let store = SupplierStore::new(&state.db);
    ensure_supplier(&store, id).await?;
    let created = store
        .add_material(id, &source, unit_price, minimum_order_qty, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::Conflict(
                "This material is already associated with this supplier".to_string(),
            ),
            ApiError::BadRequest(_) => ApiError::bad_request("Material not found"),
            other => other,
        })?;

    tracing::info!("🔥 Linked material {} to supplier {}", created.material_id, id);
    Ok((StatusCode::CREATED, Json(json!(created))))
}
