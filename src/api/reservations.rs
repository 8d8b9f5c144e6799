/// Equipment reservation endpoints

use crate::{
    api::AppState,
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::reservations::{Booking, NewReservation, ReservationFilter, ReservationStore},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub fn create_reservation_routes() -> Router<AppState> {
    Router::new().route(
        "/api/equipment/reservations",
        get(list_reservations).post(create_reservation),
    )
}

/// Both bounds present and the window not empty
fn reservation_window(payload: &NewReservation) -> ApiResult<(DateTime<Utc>, DateTime<Utc>)> {
    let (Some(from), Some(until)) = (payload.reserved_from, payload.reserved_until) else {
        return Err(ApiError::bad_request(
            "equipment_id, reserved_from and reserved_until are required",
        ));
    };
    if until <= from {
        return Err(ApiError::bad_request("reserved_until must be after reserved_from"));
    }
    Ok((from, until))
}

/// GET /api/equipment/reservations?equipment_id=&project_id=&reserved_by_user_id=&active_only=&from_date=&to_date=
async fn list_reservations(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<ReservationFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (reservations, total) = ReservationStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list reservations: {:#}", e);
            ApiError::from(e)
        })?;

    Ok(Json(page.envelope(reservations, total)))
}

/// POST /api/equipment/reservations
async fn create_reservation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewReservation>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("equipment.update")?;
    let equipment_id = payload.equipment_id.ok_or_else(|| {
        ApiError::bad_request("equipment_id, reserved_from and reserved_until are required")
    })?;
    let (from, until) = reservation_window(&payload)?;

    let booking = ReservationStore::new(&state.db)
        .reserve(equipment_id, from, until, &payload, user.id())
        .await
        .map_err(|e| ApiError::or_not_found(e, "Equipment not found"))?;

    match booking {
        Booking::Created(reservation) => {
            tracing::info!(
                "🔥 Reserved equipment {} from {} to {}",
                equipment_id,
                from,
                until
            );
            Ok((
                StatusCode::CREATED,
                Json(json!({
                    "success": true,
                    "reservation": reservation,
                    "message": "Equipment reserved successfully",
                })),
            ))
        }
        Booking::Conflict(existing) => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "Reservation conflict",
                "message": "Equipment is already reserved during this period",
                "conflict": {
                    "reservation_id": existing.id,
                    "reserved_from": existing.reserved_from,
                    "reserved_until": existing.reserved_until,
                    "project_name": existing.project_name,
                    "reserved_by": existing.reserved_by_user_name,
                },
            })),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload(from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> NewReservation {
        NewReservation {
            equipment_id: None,
            project_id: None,
            reserved_from: from,
            reserved_until: until,
            notes: None,
        }
    }

    #[test]
    fn window_must_be_complete_and_forward() {
        let from = Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2024, 6, 5, 17, 0, 0).unwrap();

        assert_eq!(reservation_window(&payload(Some(from), Some(until))).unwrap(), (from, until));
        assert!(reservation_window(&payload(Some(from), None)).is_err());
        assert_eq!(
            reservation_window(&payload(Some(until), Some(from)))
                .unwrap_err()
                .to_string(),
            "reserved_until must be after reserved_from"
        );
        assert!(reservation_window(&payload(Some(from), Some(from))).is_err());
    }
}
