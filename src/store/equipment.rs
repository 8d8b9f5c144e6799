//! Equipment inventory and assignments

use crate::db::{Changes, Database, Page};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const EQUIPMENT_STATUSES: [&str; 5] = ["available", "in_use", "maintenance", "broken", "retired"];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Equipment {
    pub id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub inventory_no: Option<String>,
    pub status: String,
    pub rental_cost_per_day: Option<f64>,
    pub purchase_date: Option<NaiveDate>,
    pub warranty_until: Option<NaiveDate>,
    pub description: Option<String>,
    pub owned: bool,
    pub current_location: Option<String>,
    pub total_usage_hours: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EquipmentFilter {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub owned: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewEquipment {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub inventory_no: Option<String>,
    pub status: Option<String>,
    pub rental_cost_per_day: Option<f64>,
    pub purchase_date: Option<NaiveDate>,
    pub warranty_until: Option<NaiveDate>,
    pub description: Option<String>,
    pub owned: Option<bool>,
    pub current_location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EquipmentUpdate {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub inventory_no: Option<String>,
    pub status: Option<String>,
    pub rental_cost_per_day: Option<f64>,
    pub purchase_date: Option<NaiveDate>,
    pub warranty_until: Option<NaiveDate>,
    pub description: Option<String>,
    pub owned: Option<bool>,
    pub current_location: Option<String>,
    pub total_usage_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EquipmentAssignment {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub project_id: Option<Uuid>,
    pub crew_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub from_ts: DateTime<Utc>,
    pub to_ts: Option<DateTime<Utc>>,
    pub is_permanent: bool,
    pub rental_cost_per_day: Option<f64>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub equipment_name: Option<String>,
    #[sqlx(default)]
    pub project_name: Option<String>,
    #[sqlx(default)]
    pub crew_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentFilter {
    pub equipment_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub crew_id: Option<Uuid>,
    pub active_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NewAssignment {
    pub equipment_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub crew_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub from_ts: Option<DateTime<Utc>>,
    pub to_ts: Option<DateTime<Utc>>,
    pub is_permanent: Option<bool>,
    pub rental_cost_per_day: Option<f64>,
    pub notes: Option<String>,
}

const ASSIGNMENT_SELECT: &str = "SELECT ea.*, e.name AS equipment_name, p.name AS project_name, \
        c.name AS crew_name \
     FROM equipment_assignments ea \
     LEFT JOIN equipment e ON e.id = ea.equipment_id \
     LEFT JOIN projects p ON p.id = ea.project_id \
     LEFT JOIN crews c ON c.id = ea.crew_id";

#[derive(Debug, Clone)]
pub struct EquipmentStore {
    pool: PgPool,
}

impl EquipmentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &EquipmentFilter) {
        builder.push(" WHERE e.is_active");
        if let Some(kind) = &filter.kind {
            builder.push(" AND e.type = ").push_bind(kind.clone());
        }
        if let Some(status) = &filter.status {
            builder.push(" AND e.status = ").push_bind(status.clone());
            // an item can still read "available" while an assignment is open
            if status == "available" {
                builder.push(
                    " AND NOT EXISTS (SELECT 1 FROM equipment_assignments ea \
                     WHERE ea.equipment_id = e.id AND ea.is_active)",
                );
            }
        }
        if let Some(owned) = filter.owned {
            builder.push(" AND e.owned = ").push_bind(owned);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            builder
                .push(" AND (e.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR e.inventory_no ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn list(&self, filter: &EquipmentFilter, page: Page) -> Result<(Vec<Equipment>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM equipment e");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT e.* FROM equipment e");
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY e.name LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = select.build_query_as::<Equipment>().fetch_all(&self.pool).await?;

        Ok((items, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<Equipment> {
        let item = sqlx::query_as::<_, Equipment>("SELECT * FROM equipment WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(item)
    }

    pub async fn create(&self, name: &str, kind: &str, item: &NewEquipment) -> Result<Equipment> {
        let created = sqlx::query_as::<_, Equipment>(
            "INSERT INTO equipment (name, type, inventory_no, status, rental_cost_per_day, purchase_date, \
                warranty_until, description, owned, current_location) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(name)
        .bind(kind)
        .bind(&item.inventory_no)
        .bind(item.status.as_deref().unwrap_or("available"))
        .bind(item.rental_cost_per_day)
        .bind(item.purchase_date)
        .bind(item.warranty_until)
        .bind(&item.description)
        .bind(item.owned.unwrap_or(true))
        .bind(&item.current_location)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, update: EquipmentUpdate) -> Result<Option<Equipment>> {
        let mut changes = Changes::new("equipment");
        changes
            .set("name", update.name)
            .set("type", update.kind)
            .set("inventory_no", update.inventory_no)
            .set("status", update.status)
            .set("rental_cost_per_day", update.rental_cost_per_day)
            .set("purchase_date", update.purchase_date)
            .set("warranty_until", update.warranty_until)
            .set("description", update.description)
            .set("owned", update.owned)
            .set("current_location", update.current_location)
            .set("total_usage_hours", update.total_usage_hours);
        if changes.is_empty() {
            return Ok(None);
        }
        changes.set_raw("updated_at = NOW()");

        let mut query = changes.finish(id, "*");
        let item = query.build_query_as::<Equipment>().fetch_one(&self.pool).await?;
        Ok(Some(item))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query_scalar::<_, Uuid>("DELETE FROM equipment WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn assignments(
        &self,
        filter: &AssignmentFilter,
        page: Page,
    ) -> Result<(Vec<EquipmentAssignment>, i64)> {
        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &AssignmentFilter) {
            builder.push(" WHERE 1=1");
            if let Some(id) = filter.equipment_id {
                builder.push(" AND ea.equipment_id = ").push_bind(id);
            }
            if let Some(id) = filter.project_id {
                builder.push(" AND ea.project_id = ").push_bind(id);
            }
            if let Some(id) = filter.crew_id {
                builder.push(" AND ea.crew_id = ").push_bind(id);
            }
            if filter.active_only.unwrap_or(false) {
                builder.push(" AND ea.is_active");
            }
        }

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM equipment_assignments ea");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(ASSIGNMENT_SELECT);
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY ea.from_ts DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build_query_as::<EquipmentAssignment>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }

    pub async fn has_active_assignment(&self, equipment_id: Uuid) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM equipment_assignments WHERE equipment_id = $1 AND is_active)",
        )
        .bind(equipment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    /// Open an assignment and mark the item as in use
    pub async fn assign(&self, equipment_id: Uuid, assignment: &NewAssignment) -> Result<EquipmentAssignment> {
        let mut tx = self.pool.begin().await?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO equipment_assignments (equipment_id, project_id, crew_id, user_id, from_ts, to_ts, \
                is_permanent, rental_cost_per_day, notes) \
             VALUES ($1, $2, $3, $4, COALESCE($5, NOW()), $6, $7, $8, $9) RETURNING id",
        )
        .bind(equipment_id)
        .bind(assignment.project_id)
        .bind(assignment.crew_id)
        .bind(assignment.user_id)
        .bind(assignment.from_ts)
        .bind(assignment.to_ts)
        .bind(assignment.is_permanent.unwrap_or(false))
        .bind(assignment.rental_cost_per_day)
        .bind(&assignment.notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE equipment SET status = 'in_use', updated_at = NOW() WHERE id = $1")
            .bind(equipment_id)
            .execute(&mut *tx)
            .await?;

        let created = sqlx::query_as::<_, EquipmentAssignment>(&format!("{} WHERE ea.id = $1", ASSIGNMENT_SELECT))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    /// Close an assignment and release the item
    pub async fn return_assignment(&self, id: Uuid) -> Result<EquipmentAssignment> {
        let mut tx = self.pool.begin().await?;

        let equipment_id: Uuid = sqlx::query_scalar(
            "UPDATE equipment_assignments SET is_active = FALSE, to_ts = NOW() \
             WHERE id = $1 RETURNING equipment_id",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE equipment SET status = 'available', updated_at = NOW() WHERE id = $1")
            .bind(equipment_id)
            .execute(&mut *tx)
            .await?;

        let returned = sqlx::query_as::<_, EquipmentAssignment>(&format!("{} WHERE ea.id = $1", ASSIGNMENT_SELECT))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(returned)
    }
}
