//! Fleet vehicles and their registration/insurance documents

use crate::db::{Changes, Database, Page};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Documents expiring within this many days count as "expiring"
pub const EXPIRING_WITHIN_DAYS: i64 = 60;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub plate_number: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub rental_cost_per_day: f64,
    pub fuel_type: String,
    pub year_manufactured: Option<i32>,
    pub description: Option<String>,
    pub tipper_type: String,
    pub max_weight_kg: Option<f64>,
    pub comment: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expiry dates of a vehicle's documents, aggregated in SQL
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VehicleWithDocuments {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub vehicle: Vehicle,
    #[serde(skip)]
    pub document_expiry_dates: Vec<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    pub count: usize,
    pub expired: usize,
    pub expiring: usize,
}

impl DocumentStats {
    pub fn from_expiry_dates(dates: &[Option<NaiveDate>], today: NaiveDate) -> Self {
        dates.iter().fold(
            Self {
                count: dates.len(),
                ..Default::default()
            },
            |mut stats, date| {
                if let Some(date) = date {
                    let days = (*date - today).num_days();
                    if days < 0 {
                        stats.expired += 1;
                    } else if days <= EXPIRING_WITHIN_DAYS {
                        stats.expiring += 1;
                    }
                }
                stats
            },
        )
    }
}

impl VehicleWithDocuments {
    pub fn to_json(&self, today: NaiveDate) -> Value {
        let mut value = json!(self);
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "documents".into(),
                json!(DocumentStats::from_expiry_dates(&self.document_expiry_dates, today)),
            );
        }
        value
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VehicleFilter {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub search: Option<String>,
    pub available_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NewVehicle {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub plate_number: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub rental_cost_per_day: Option<f64>,
    pub fuel_type: Option<String>,
    pub year_manufactured: Option<i32>,
    pub description: Option<String>,
    pub tipper_type: Option<String>,
    pub max_weight_kg: Option<f64>,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VehicleUpdate {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub plate_number: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub rental_cost_per_day: Option<f64>,
    pub fuel_type: Option<String>,
    pub year_manufactured: Option<i32>,
    pub description: Option<String>,
    pub tipper_type: Option<String>,
    pub max_weight_kg: Option<f64>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VehicleDocument {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub document_type: String,
    pub document_number: Option<String>,
    pub file_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewVehicleDocument {
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

const VEHICLE_SELECT: &str = "SELECT v.*, COALESCE(( \
        SELECT ARRAY_AGG(d.expiry_date) FROM vehicle_documents d WHERE d.vehicle_id = v.id \
     ), ARRAY[]::date[]) AS document_expiry_dates \
     FROM vehicles v";

#[derive(Debug, Clone)]
pub struct VehicleStore {
    pool: PgPool,
}

impl VehicleStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &VehicleFilter) {
        builder.push(" WHERE v.is_active");
        if let Some(status) = &filter.status {
            builder.push(" AND v.status = ").push_bind(status.clone());
        }
        if let Some(kind) = &filter.kind {
            builder.push(" AND v.type = ").push_bind(kind.clone());
        }
        if filter.available_only.unwrap_or(false) {
            builder.push(
                " AND v.status = 'available' AND NOT EXISTS (SELECT 1 FROM vehicle_assignments va \
                 WHERE va.vehicle_id = v.id AND va.is_active)",
            );
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            builder
                .push(" AND (v.brand ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR v.model ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR v.plate_number ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn list(&self, filter: &VehicleFilter, page: Page) -> Result<(Vec<VehicleWithDocuments>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM vehicles v");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(VEHICLE_SELECT);
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY v.brand, v.model LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let vehicles = select
            .build_query_as::<VehicleWithDocuments>()
            .fetch_all(&self.pool)
            .await?;

        Ok((vehicles, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<VehicleWithDocuments> {
        let vehicle = sqlx::query_as::<_, VehicleWithDocuments>(&format!("{} WHERE v.id = $1", VEHICLE_SELECT))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(vehicle)
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM vehicles WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    pub async fn create(&self, plate_number: &str, vehicle: &NewVehicle) -> Result<Vehicle> {
        let created = sqlx::query_as::<_, Vehicle>(
            "INSERT INTO vehicles (brand, model, plate_number, type, status, rental_cost_per_day, fuel_type, \
                year_manufactured, description, tipper_type, max_weight_kg, comment) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(vehicle.brand.as_deref().unwrap_or(""))
        .bind(vehicle.model.as_deref().unwrap_or(""))
        .bind(plate_number)
        .bind(vehicle.kind.as_deref().unwrap_or("transporter"))
        .bind(vehicle.status.as_deref().unwrap_or("available"))
        .bind(vehicle.rental_cost_per_day.unwrap_or(0.0))
        .bind(vehicle.fuel_type.as_deref().unwrap_or("diesel"))
        .bind(vehicle.year_manufactured)
        .bind(&vehicle.description)
        .bind(vehicle.tipper_type.as_deref().unwrap_or("kein Kipper"))
        .bind(vehicle.max_weight_kg)
        .bind(&vehicle.comment)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, update: VehicleUpdate) -> Result<Option<Vehicle>> {
        let mut changes = Changes::new("vehicles");
        changes
            .set("brand", update.brand)
            .set("model", update.model)
            .set("plate_number", update.plate_number)
            .set("type", update.kind)
            .set("status", update.status)
            .set("rental_cost_per_day", update.rental_cost_per_day)
            .set("fuel_type", update.fuel_type)
            .set("year_manufactured", update.year_manufactured)
            .set("description", update.description)
            .set("tipper_type", update.tipper_type)
            .set("max_weight_kg", update.max_weight_kg)
            .set("comment", update.comment);
        if changes.is_empty() {
            return Ok(None);
        }
        changes.set_raw("updated_at = NOW()");

        let mut query = changes.finish(id, "*");
        let vehicle = query.build_query_as::<Vehicle>().fetch_one(&self.pool).await?;
        Ok(Some(vehicle))
    }

    /// Delete the vehicle and hand back the storage paths of its documents
    pub async fn delete(&self, id: Uuid) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let paths: Vec<String> =
            sqlx::query_scalar("SELECT file_path FROM vehicle_documents WHERE vehicle_id = $1")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;
        sqlx::query_scalar::<_, Uuid>("DELETE FROM vehicles WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(paths)
    }

    pub async fn documents(&self, vehicle_id: Uuid) -> Result<Vec<VehicleDocument>> {
        let documents = sqlx::query_as::<_, VehicleDocument>(
            "SELECT * FROM vehicle_documents WHERE vehicle_id = $1 \
             ORDER BY expiry_date NULLS LAST, created_at DESC",
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(documents)
    }

    pub async fn document(&self, vehicle_id: Uuid, document_id: Uuid) -> Result<VehicleDocument> {
        let document = sqlx::query_as::<_, VehicleDocument>(
            "SELECT * FROM vehicle_documents WHERE id = $1 AND vehicle_id = $2",
        )
        .bind(document_id)
        .bind(vehicle_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(document)
    }

    pub async fn add_document(
        &self,
        vehicle_id: Uuid,
        document_type: &str,
        file_name: &str,
        file_path: &str,
        document: &NewVehicleDocument,
        uploaded_by: Uuid,
    ) -> Result<VehicleDocument> {
        let created = sqlx::query_as::<_, VehicleDocument>(
            "INSERT INTO vehicle_documents (vehicle_id, document_type, document_number, file_name, file_path, \
                file_type, file_size, issue_date, expiry_date, notes, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(vehicle_id)
        .bind(document_type)
        .bind(&document.document_number)
        .bind(file_name)
        .bind(file_path)
        .bind(&document.file_type)
        .bind(document.file_size)
        .bind(document.issue_date)
        .bind(document.expiry_date)
        .bind(&document.notes)
        .bind(uploaded_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Delete the row and return it so the caller can remove the stored file
    pub async fn delete_document(&self, vehicle_id: Uuid, document_id: Uuid) -> Result<VehicleDocument> {
        let deleted = sqlx::query_as::<_, VehicleDocument>(
            "DELETE FROM vehicle_documents WHERE id = $1 AND vehicle_id = $2 RETURNING *",
        )
        .bind(document_id)
        .bind(vehicle_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn document_stats_split_expired_and_expiring() {
        let today = day(2024, 6, 1);
        let dates = vec![
            Some(day(2024, 5, 31)), // expired yesterday
            Some(day(2024, 6, 1)),  // expires today
            Some(day(2024, 7, 31)), // 60 days out
            Some(day(2024, 8, 1)),  // 61 days out
            None,
        ];
        let stats = DocumentStats::from_expiry_dates(&dates, today);
        assert_eq!(
            stats,
            DocumentStats {
                count: 5,
                expired: 1,
                expiring: 2
            }
        );
    }

    #[test]
    fn no_documents_means_empty_stats() {
        assert_eq!(
            DocumentStats::from_expiry_dates(&[], day(2024, 1, 1)),
            DocumentStats::default()
        );
    }
}
