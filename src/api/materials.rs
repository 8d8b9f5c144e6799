/// Material endpoints: catalogue, stock adjustment, allocations, orders
///
/// Stock movements always leave a row in `material_transactions`, both for
/// manual adjustments and for delivered orders.

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::materials::{
        allocation_summary, Allocation, AllocationFilter, AllocationUpdate, ConsumeOutcome,
        ConsumeRequest, MaterialFilter, MaterialStock, MaterialStore, MaterialUpdate,
        NewAllocation, NewMaterial, NewOrder, OrderFilter, OrderUpdate, StockAdjustment,
        TransactionFilter, ALLOCATION_STATUSES, ORDER_STATUSES,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub fn create_material_routes() -> Router<AppState> {
    Router::new()
        .route("/api/materials", get(list_materials).post(create_material))
        .route(
            "/api/materials/allocations",
            get(list_allocations).post(create_allocation),
        )
        .route(
            "/api/materials/allocations/{id}",
            get(get_allocation).put(update_allocation).delete(delete_allocation),
        )
        .route("/api/materials/consume", post(consume_material))
        .route("/api/materials/orders", get(list_orders).post(create_order))
        .route("/api/materials/orders/{id}", put(update_order))
        .route(
            "/api/materials/{id}",
            get(get_material).put(update_material).delete(delete_material),
        )
        .route("/api/materials/{id}/adjust", post(adjust_stock))
        .route("/api/transactions", get(list_transactions))
}

fn check_enum(value: Option<&str>, allowed: &[&str], field: &str) -> ApiResult<()> {
    match value {
        Some(v) if !allowed.contains(&v) => {
            Err(ApiError::bad_request(format!("Invalid {}: {}", field, v)))
        }
        _ => Ok(()),
    }
}

/// GET /api/materials?category=&unit=&supplier_name=&search=&include_inactive=
async fn list_materials(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<MaterialFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (materials, total) = MaterialStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list materials: {:#}", e);
            ApiError::from(e)
        })?;

    let items: Vec<Value> = materials.iter().map(MaterialStock::to_json).collect();
    Ok(Json(page.envelope(items, total)))
}

/// POST /api/materials
async fn create_material(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewMaterial>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("materials.create")?;
    let name = required(payload.name.as_deref(), "name")?;
    let negative = [payload.unit_price_eur, payload.current_stock, payload.min_stock_threshold]
        .into_iter()
        .flatten()
        .any(|v| v < 0.0);
    if negative {
        return Err(ApiError::bad_request(
            "Prices and stock levels must be zero or greater",
        ));
    }

    let created = MaterialStore::new(&state.db).create(name, &payload).await?;

    tracing::info!("🔥 Created material {} ({})", created.id, created.name);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// GET /api/materials/{id}
async fn get_material(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let material = MaterialStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Material not found"))?;
    Ok(Json(material.to_json()))
}

/// PUT /api/materials/{id}
async fn update_material(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MaterialUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("materials.update")?;

    let updated = MaterialStore::new(&state.db)
        .update(id, payload)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Material not found"))?
        .ok_or_else(|| ApiError::bad_request("No fields to update"))?;

    tracing::info!("🔥 Updated material {}", id);
    Ok(Json(json!(updated)))
}

/// DELETE /api/materials/{id}
async fn delete_material(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("materials.delete")?;

    MaterialStore::new(&state.db)
        .deactivate(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Material not found"))?;

    tracing::info!("🔥 Deactivated material {}", id);
    Ok(Json(json!({ "message": "Material deleted successfully" })))
}

/// POST /api/materials/{id}/adjust
/// Body: { "quantity": -12.5, "reason": "..." }
async fn adjust_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockAdjustment>,
) -> ApiResult<Json<Value>> {
    user.require("materials.update")?;
    let quantity = payload
        .quantity
        .filter(|q| q.is_finite() && *q != 0.0)
        .ok_or_else(|| ApiError::bad_request("quantity must be a non-zero number"))?;
    let reason = required(payload.reason.as_deref(), "reason")?;

    let (material, result) = MaterialStore::new(&state.db)
        .adjust_stock(
            id,
            quantity,
            reason,
            payload.reference_type.as_deref(),
            payload.reference_id.as_deref(),
        )
        .await
        .map_err(|e| ApiError::or_not_found(e, "Material not found"))?;

    tracing::info!(
        "🔥 Stock of {} adjusted {} -> {} ({})",
        id,
        result.previous_stock,
        result.new_stock,
        reason
    );
    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Stock adjusted from {} to {}",
            result.previous_stock, result.new_stock
        ),
        "material": material,
        "adjustment": {
            "previous_stock": result.previous_stock,
            "adjustment": result.adjustment,
            "new_stock": result.new_stock,
            "reason": reason,
        },
    })))
}

/// GET /api/materials/allocations?project_id=&material_id=&status=
async fn list_allocations(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<AllocationFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (allocations, total) = MaterialStore::new(&state.db)
        .allocations(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list allocations: {:#}", e);
            ApiError::from(e)
        })?;

    let items: Vec<Value> = allocations.iter().map(Allocation::to_json).collect();
    let mut body = page.envelope(items, total);
    body["summary"] = allocation_summary(total, &allocations);
    Ok(Json(body))
}

/// POST /api/materials/allocations
async fn create_allocation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewAllocation>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("materials.update")?;
    let (Some(project_id), Some(material_id)) = (payload.project_id, payload.material_id) else {
        return Err(ApiError::bad_request("project_id and material_id are required"));
    };
    let quantity = payload
        .quantity_allocated
        .filter(|q| q.is_finite() && *q > 0.0)
        .ok_or_else(|| ApiError::bad_request("quantity_allocated must be greater than 0"))?;
    check_enum(payload.status.as_deref(), &ALLOCATION_STATUSES, "status")?;

    let created = MaterialStore::new(&state.db)
        .create_allocation(project_id, material_id, quantity, &payload, user.id())
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::bad_request("Unknown project or material"),
            other => other,
        })?;

    tracing::info!(
        "🔥 Allocated {} of material {} to project {}",
        quantity,
        material_id,
        project_id
    );
    Ok((StatusCode::CREATED, Json(created.to_json())))
}

/// GET /api/materials/allocations/{id}
async fn get_allocation(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let allocation = MaterialStore::new(&state.db)
        .allocation(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Allocation not found"))?;
    Ok(Json(allocation.to_json()))
}

/// PUT /api/materials/allocations/{id}
/// Body: { "quantity_used": 40, "status": "partially_used", "notes": "..." }
async fn update_allocation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AllocationUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("materials.update")?;
    check_enum(payload.status.as_deref(), &ALLOCATION_STATUSES, "status")?;

    let store = MaterialStore::new(&state.db);
    let current = store
        .allocation(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Allocation not found"))?;
    let (used, status) = payload.resolve(&current).map_err(ApiError::bad_request)?;

    let updated = store
        .update_allocation(id, used, &status, payload.notes.as_deref())
        .await
        .map_err(|e| ApiError::or_not_found(e, "Allocation not found"))?;

    tracing::info!("🔥 Allocation {} now {} ({} used)", id, status, used);
    Ok(Json(json!({
        "success": true,
        "message": "Allocation updated successfully",
        "allocation": updated.to_json(),
    })))
}

/// DELETE /api/materials/allocations/{id}
async fn delete_allocation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("materials.update")?;

    let (allocation, returned) = MaterialStore::new(&state.db)
        .delete_allocation(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Allocation not found"))?;

    tracing::info!(
        "🔥 Deleted allocation {} of material {}, {} returned",
        id,
        allocation.material_id,
        returned
    );
    Ok(Json(json!({
        "success": true,
        "message": "Allocation deleted successfully",
        "returned_to_stock": returned,
    })))
}

/// POST /api/materials/consume
/// Body: { "allocation_id": "...", "consumed_qty": 12.5, "work_entry_id": null, "notes": null }
async fn consume_material(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ConsumeRequest>,
) -> ApiResult<Json<Value>> {
    user.require("work_entries.create")?;
    let (Some(allocation_id), Some(qty)) = (payload.allocation_id, payload.consumed_qty) else {
        return Err(ApiError::bad_request("allocation_id and consumed_qty are required"));
    };
    if !qty.is_finite() || qty <= 0.0 {
        return Err(ApiError::bad_request("consumed_qty must be greater than 0"));
    }

    let outcome = MaterialStore::new(&state.db)
        .consume(allocation_id, qty, payload.work_entry_id, payload.notes.as_deref())
        .await
        .map_err(|e| ApiError::or_not_found(e, "Allocation not found"))?;

    match outcome {
        ConsumeOutcome::Insufficient { remaining, unit } => Err(ApiError::bad_request(format!(
            "Insufficient quantity. Available: {} {}",
            remaining, unit
        ))),
        ConsumeOutcome::Consumed(consumption) => {
            tracing::info!(
                "🔥 Consumed {} {} of {} from allocation {}",
                qty,
                consumption.material.unit,
                consumption.material.name,
                allocation_id
            );
            Ok(Json(json!({
                "success": true,
                "message": format!(
                    "Consumed {} {} of {}",
                    qty, consumption.material.unit, consumption.material.name
                ),
                "data": consumption.to_json(),
            })))
        }
    }
}

/// GET /api/materials/orders?project_id=&material_id=&status=
async fn list_orders(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<OrderFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (orders, total) = MaterialStore::new(&state.db)
        .orders(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list material orders: {:#}", e);
            ApiError::from(e)
        })?;

    Ok(Json(page.envelope(orders, total)))
}

/// POST /api/materials/orders
async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewOrder>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("materials.create")?;
    let material_id = payload
        .material_id
        .ok_or_else(|| ApiError::bad_request("material_id is required"))?;
    let quantity = payload
        .quantity
        .filter(|q| q.is_finite() && *q > 0.0)
        .ok_or_else(|| ApiError::bad_request("quantity must be greater than 0"))?;
    check_enum(payload.status.as_deref(), &ORDER_STATUSES, "status")?;

    let created = MaterialStore::new(&state.db)
        .create_order(material_id, quantity, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::bad_request("Unknown project or material"),
            other => other,
        })?;

    tracing::info!("🔥 Ordered {} of material {} ({})", quantity, material_id, created.id);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// PUT /api/materials/orders/{id}
async fn update_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<OrderUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("materials.update")?;
    check_enum(payload.status.as_deref(), &ORDER_STATUSES, "status")?;

    let updated = MaterialStore::new(&state.db)
        .update_order(id, payload)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Order not found"))?
        .ok_or_else(|| ApiError::bad_request("No fields to update"))?;

    tracing::info!("🔥 Order {} is now {}", id, updated.status);
    Ok(Json(json!(updated)))
}

/// GET /api/transactions?material_id=&transaction_type=
async fn list_transactions(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<TransactionFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (transactions, total) = MaterialStore::new(&state.db)
        .transactions(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list transactions: {:#}", e);
            ApiError::from(e)
        })?;

    Ok(Json(page.envelope(transactions, total)))
}
