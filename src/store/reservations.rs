//! Equipment reservations
//!
//! A reservation blocks an item for a time window. Two active reservations of
//! the same item must not overlap; the check runs while the equipment row is
//! locked so concurrent requests queue up behind each other.

use crate::db::{Database, Page};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub project_id: Option<Uuid>,
    pub reserved_by_user_id: Option<Uuid>,
    pub reserved_from: DateTime<Utc>,
    pub reserved_until: DateTime<Utc>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub equipment_name: Option<String>,
    #[sqlx(default)]
    pub project_name: Option<String>,
    #[sqlx(default)]
    pub reserved_by_user_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReservationFilter {
    pub equipment_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub reserved_by_user_id: Option<Uuid>,
    pub active_only: Option<bool>,
    /// Reservations still running at or after this instant
    pub from_date: Option<DateTime<Utc>>,
    /// Reservations starting at or before this instant
    pub to_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct NewReservation {
    pub equipment_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub reserved_from: Option<DateTime<Utc>>,
    pub reserved_until: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Half-open windows `[from, until)` overlap when each starts before the other ends
pub fn windows_overlap(
    a: (DateTime<Utc>, DateTime<Utc>),
    b: (DateTime<Utc>, DateTime<Utc>),
) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Result of trying to book a window
#[derive(Debug)]
pub enum Booking {
    Created(Reservation),
    /// The active reservation that already covers part of the window
    Conflict(Reservation),
}

const RESERVATION_SELECT: &str = "SELECT r.*, e.name AS equipment_name, p.name AS project_name, \
        NULLIF(TRIM(CONCAT(u.first_name, ' ', u.last_name)), '') AS reserved_by_user_name \
     FROM equipment_reservations r \
     LEFT JOIN equipment e ON e.id = r.equipment_id \
     LEFT JOIN projects p ON p.id = r.project_id \
     LEFT JOIN users u ON u.id = r.reserved_by_user_id";

#[derive(Debug, Clone)]
pub struct ReservationStore {
    pool: PgPool,
}

impl ReservationStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ReservationFilter) {
        builder.push(" WHERE 1=1");
        if let Some(id) = filter.equipment_id {
            builder.push(" AND r.equipment_id = ").push_bind(id);
        }
        if let Some(id) = filter.project_id {
            builder.push(" AND r.project_id = ").push_bind(id);
        }
        if let Some(id) = filter.reserved_by_user_id {
            builder.push(" AND r.reserved_by_user_id = ").push_bind(id);
        }
        if filter.active_only.unwrap_or(false) {
            builder.push(" AND r.is_active");
        }
        if let Some(from) = filter.from_date {
            builder.push(" AND r.reserved_until >= ").push_bind(from);
        }
        if let Some(to) = filter.to_date {
            builder.push(" AND r.reserved_from <= ").push_bind(to);
        }
    }

    pub async fn list(&self, filter: &ReservationFilter, page: Page) -> Result<(Vec<Reservation>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM equipment_reservations r");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(RESERVATION_SELECT);
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY r.reserved_from DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select.build_query_as::<Reservation>().fetch_all(&self.pool).await?;

        Ok((rows, total))
    }

    /// Book a window unless an active reservation of the same item overlaps it
    pub async fn reserve(
        &self,
        equipment_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        reservation: &NewReservation,
        reserved_by: Uuid,
    ) -> Result<Booking> {
        let mut tx = self.pool.begin().await?;

        // missing equipment surfaces as RowNotFound
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM equipment WHERE id = $1 FOR UPDATE")
            .bind(equipment_id)
            .fetch_one(&mut *tx)
            .await?;

        let active = sqlx::query_as::<_, Reservation>(&format!(
            "{} WHERE r.equipment_id = $1 AND r.is_active AND r.reserved_until > $2 \
             ORDER BY r.reserved_from",
            RESERVATION_SELECT
        ))
        .bind(equipment_id)
        .bind(from)
        .fetch_all(&mut *tx)
        .await?;
        if let Some(existing) = active
            .into_iter()
            .find(|r| windows_overlap((r.reserved_from, r.reserved_until), (from, until)))
        {
            return Ok(Booking::Conflict(existing));
        }

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO equipment_reservations \
                (equipment_id, project_id, reserved_by_user_id, reserved_from, reserved_until, notes) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(equipment_id)
        .bind(reservation.project_id)
        .bind(reserved_by)
        .bind(from)
        .bind(until)
        .bind(&reservation.notes)
        .fetch_one(&mut *tx)
        .await?;

        let created = sqlx::query_as::<_, Reservation>(&format!("{} WHERE r.id = $1", RESERVATION_SELECT))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Booking::Created(created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn overlapping_windows_are_detected() {
        assert!(windows_overlap((at(1, 8), at(3, 8)), (at(2, 8), at(4, 8))));
        assert!(windows_overlap((at(1, 8), at(5, 8)), (at(2, 8), at(3, 8))));
    }

    #[test]
    fn back_to_back_windows_do_not_overlap() {
        assert!(!windows_overlap((at(1, 8), at(2, 8)), (at(2, 8), at(3, 8))));
        assert!(!windows_overlap((at(3, 8), at(4, 8)), (at(1, 8), at(2, 8))));
    }
}
