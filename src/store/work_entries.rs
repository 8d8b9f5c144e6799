//! Field work log: entries, approval and rejection

use crate::db::{Changes, Database, Page};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const STAGE_CODES: [&str; 10] = [
    "stage_1_marking",
    "stage_2_excavation",
    "stage_3_conduit",
    "stage_4_backfill",
    "stage_5_cable_pulling",
    "stage_6_splicing",
    "stage_7_testing",
    "stage_8_documentation",
    "stage_9_cleanup",
    "stage_10_handover",
];

pub const WORK_METHODS: [&str; 5] = ["mole", "hand", "excavator", "trencher", "documentation"];

pub fn is_valid_stage(code: &str) -> bool {
    STAGE_CODES.contains(&code)
}

pub fn is_valid_method(method: &str) -> bool {
    WORK_METHODS.contains(&method)
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WorkEntry {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub crew_id: Option<Uuid>,
    pub house_id: Option<Uuid>,
    pub date: NaiveDate,
    pub stage_code: String,
    pub meters_done_m: f64,
    pub method: Option<String>,
    pub width_m: Option<f64>,
    pub depth_m: Option<f64>,
    pub cables_count: Option<i32>,
    pub has_protection_pipe: Option<bool>,
    pub soil_type: Option<String>,
    pub approved: bool,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub was_rejected_before: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub project_name: Option<String>,
    #[sqlx(default)]
    pub worker_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkEntryFilter {
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub crew_id: Option<Uuid>,
    pub stage_code: Option<String>,
    pub approved: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NewWorkEntry {
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub crew_id: Option<Uuid>,
    pub house_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub stage_code: Option<String>,
    pub meters_done_m: Option<f64>,
    pub method: Option<String>,
    pub width_m: Option<f64>,
    pub depth_m: Option<f64>,
    pub cables_count: Option<i32>,
    pub has_protection_pipe: Option<bool>,
    pub soil_type: Option<String>,
    pub notes: Option<String>,
}

/// Fields a create request must carry, after validation
#[derive(Debug, Clone)]
pub struct ValidWorkEntry {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub stage_code: String,
    pub meters_done_m: f64,
}

impl NewWorkEntry {
    /// Check required fields and enum values; the error is the client-facing message
    pub fn validate(&self) -> Result<ValidWorkEntry, String> {
        let (Some(project_id), Some(user_id), Some(stage_code), Some(date), Some(meters)) = (
            self.project_id,
            self.user_id,
            self.stage_code.as_deref(),
            self.date,
            self.meters_done_m,
        ) else {
            return Err(
                "project_id, user_id, stage_code, date and meters_done_m are required".to_string(),
            );
        };

        if !meters.is_finite() || meters < 0.0 {
            return Err("meters_done_m must be zero or greater".to_string());
        }
        if !is_valid_stage(stage_code) {
            return Err(format!("Invalid stage_code: {}", stage_code));
        }
        if let Some(method) = self.method.as_deref() {
            if !is_valid_method(method) {
                return Err(format!("Invalid method: {}", method));
            }
        }

        Ok(ValidWorkEntry {
            project_id,
            user_id,
            date,
            stage_code: stage_code.to_string(),
            meters_done_m: meters,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkEntryUpdate {
    pub crew_id: Option<Uuid>,
    pub house_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub stage_code: Option<String>,
    pub meters_done_m: Option<f64>,
    pub method: Option<String>,
    pub width_m: Option<f64>,
    pub depth_m: Option<f64>,
    pub cables_count: Option<i32>,
    pub has_protection_pipe: Option<bool>,
    pub soil_type: Option<String>,
    pub notes: Option<String>,
}

impl WorkEntryUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(code) = self.stage_code.as_deref() {
            if !is_valid_stage(code) {
                return Err(format!("Invalid stage_code: {}", code));
            }
        }
        if let Some(method) = self.method.as_deref() {
            if !is_valid_method(method) {
                return Err(format!("Invalid method: {}", method));
            }
        }
        if matches!(self.meters_done_m, Some(m) if !m.is_finite() || m < 0.0) {
            return Err("meters_done_m must be zero or greater".to_string());
        }
        Ok(())
    }
}

const ENTRY_SELECT: &str = "SELECT w.*, p.name AS project_name, \
        NULLIF(TRIM(CONCAT(u.first_name, ' ', u.last_name)), '') AS worker_name \
     FROM work_entries w \
     LEFT JOIN projects p ON p.id = w.project_id \
     LEFT JOIN users u ON u.id = w.user_id";

#[derive(Debug, Clone)]
pub struct WorkEntryStore {
    pool: PgPool,
}

impl WorkEntryStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &WorkEntryFilter) {
        builder.push(" WHERE 1=1");
        if let Some(project_id) = filter.project_id {
            builder.push(" AND w.project_id = ").push_bind(project_id);
        }
        if let Some(user_id) = filter.user_id {
            builder.push(" AND w.user_id = ").push_bind(user_id);
        }
        if let Some(crew_id) = filter.crew_id {
            builder.push(" AND w.crew_id = ").push_bind(crew_id);
        }
        if let Some(stage) = &filter.stage_code {
            builder.push(" AND w.stage_code = ").push_bind(stage.clone());
        }
        match filter.approved {
            Some(true) => {
                builder.push(" AND w.approved");
            }
            // pending review: neither approved nor rejected
            Some(false) => {
                builder.push(" AND NOT w.approved AND w.rejected_at IS NULL");
            }
            None => {}
        }
    }

    pub async fn list(&self, filter: &WorkEntryFilter, page: Page) -> Result<(Vec<WorkEntry>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM work_entries w");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(ENTRY_SELECT);
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY w.date DESC, w.created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let entries = select.build_query_as::<WorkEntry>().fetch_all(&self.pool).await?;

        Ok((entries, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<WorkEntry> {
        let entry = sqlx::query_as::<_, WorkEntry>(&format!("{} WHERE w.id = $1", ENTRY_SELECT))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(entry)
    }

    pub async fn create(&self, valid: &ValidWorkEntry, entry: &NewWorkEntry) -> Result<WorkEntry> {
        let created = sqlx::query_as::<_, WorkEntry>(
            "INSERT INTO work_entries (project_id, user_id, crew_id, house_id, date, stage_code, \
                meters_done_m, method, width_m, depth_m, cables_count, has_protection_pipe, soil_type, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING *",
        )
        .bind(valid.project_id)
        .bind(valid.user_id)
        .bind(entry.crew_id)
        .bind(entry.house_id)
        .bind(valid.date)
        .bind(&valid.stage_code)
        .bind(valid.meters_done_m)
        .bind(&entry.method)
        .bind(entry.width_m)
        .bind(entry.depth_m)
        .bind(entry.cables_count)
        .bind(entry.has_protection_pipe)
        .bind(&entry.soil_type)
        .bind(&entry.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, update: WorkEntryUpdate) -> Result<Option<WorkEntry>> {
        let mut changes = Changes::new("work_entries");
        changes
            .set("crew_id", update.crew_id)
            .set("house_id", update.house_id)
            .set("date", update.date)
            .set("stage_code", update.stage_code)
            .set("meters_done_m", update.meters_done_m)
            .set("method", update.method)
            .set("width_m", update.width_m)
            .set("depth_m", update.depth_m)
            .set("cables_count", update.cables_count)
            .set("has_protection_pipe", update.has_protection_pipe)
            .set("soil_type", update.soil_type)
            .set("notes", update.notes);
        if changes.is_empty() {
            return Ok(None);
        }
        changes.set_raw("updated_at = NOW()");

        let mut query = changes.finish(id, "*");
        let entry = query.build_query_as::<WorkEntry>().fetch_one(&self.pool).await?;
        Ok(Some(entry))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query_scalar::<_, Uuid>("DELETE FROM work_entries WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Approve and clear any earlier rejection
    pub async fn approve(&self, id: Uuid, approver: Uuid) -> Result<WorkEntry> {
        let entry = sqlx::query_as::<_, WorkEntry>(
            "UPDATE work_entries SET approved = TRUE, approved_by = $2, approved_at = NOW(), \
                rejected_by = NULL, rejected_at = NULL, rejection_reason = NULL, updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(approver)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }

    pub async fn reject(&self, id: Uuid, rejector: Uuid, reason: &str) -> Result<WorkEntry> {
        let entry = sqlx::query_as::<_, WorkEntry>(
            "UPDATE work_entries SET approved = FALSE, approved_by = NULL, approved_at = NULL, \
                rejected_by = $2, rejected_at = NOW(), rejection_reason = $3, \
                was_rejected_before = TRUE, updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(rejector)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_body() -> NewWorkEntry {
        NewWorkEntry {
            project_id: Some(Uuid::new_v4()),
            user_id: Some(Uuid::new_v4()),
            crew_id: None,
            house_id: None,
            date: NaiveDate::from_ymd_opt(2024, 6, 3),
            stage_code: Some("stage_2_excavation".into()),
            meters_done_m: Some(42.5),
            method: Some("excavator".into()),
            width_m: None,
            depth_m: None,
            cables_count: None,
            has_protection_pipe: None,
            soil_type: None,
            notes: None,
        }
    }

    #[test]
    fn complete_body_validates() {
        let valid = valid_body().validate().unwrap();
        assert_eq!(valid.meters_done_m, 42.5);
        assert_eq!(valid.stage_code, "stage_2_excavation");
    }

    #[test]
    fn missing_fields_are_rejected() {
        let mut body = valid_body();
        body.date = None;
        assert!(body.validate().unwrap_err().contains("required"));
    }

    #[test]
    fn negative_meters_are_rejected() {
        let mut body = valid_body();
        body.meters_done_m = Some(-1.0);
        assert!(body.validate().is_err());

        body.meters_done_m = Some(0.0);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn unknown_stage_and_method_are_rejected() {
        let mut body = valid_body();
        body.stage_code = Some("stage_11_party".into());
        assert!(body.validate().is_err());

        let mut body = valid_body();
        body.method = Some("shovel".into());
        assert!(body.validate().is_err());
    }

    #[test]
    fn update_checks_only_present_fields() {
        assert!(WorkEntryUpdate::default().validate().is_ok());
        let update = WorkEntryUpdate {
            stage_code: Some("stage_7_testing".into()),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
    }
}
