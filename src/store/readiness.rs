//! Project readiness checklist and scoring
//!
//! Scoring runs inside Postgres (`calculate_project_readiness`); this module
//! caches the raw result, seeds default checklists and shapes the response.

use crate::db::Database;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One entry of the default checklist: (category, title, description, required)
type DefaultItem = (&'static str, &'static str, &'static str, bool);

pub const DEFAULT_CHECKLIST: [DefaultItem; 16] = [
    ("documentation", "Project plans uploaded", "All project plans and technical drawings are uploaded", true),
    ("documentation", "Utility contact information complete", "Contacts for all affected utility companies are recorded", true),
    ("documentation", "Building permits obtained", "Required building and excavation permits are available", false),
    ("documentation", "Safety documentation complete", "Safety plans and risk assessments are documented", false),
    ("resources", "Team assignments complete", "Crews and responsible foremen are assigned", true),
    ("resources", "Equipment allocation finalized", "Required equipment is reserved for the project", true),
    ("resources", "Material inventory sufficient", "Materials for the first construction phase are in stock", true),
    ("resources", "Subcontractors confirmed", "Subcontractor agreements are confirmed", false),
    ("infrastructure", "Zone layout confirmed", "Zone layout is reviewed and confirmed", true),
    ("infrastructure", "Cabinet locations defined", "Locations of all distribution cabinets are defined", true),
    ("infrastructure", "House connections mapped", "House connection points are mapped", true),
    ("infrastructure", "Network segments planned", "Network segments between cabinets are planned", false),
    ("approvals", "Management approval obtained", "Project start is approved by management", true),
    ("approvals", "Customer agreements signed", "Customer contracts and agreements are signed", false),
    ("approvals", "Regulatory clearances complete", "All regulatory clearances are granted", false),
    ("approvals", "Budget authorization confirmed", "Project budget is authorized", true),
];

const REQUIRED_ACTION: &str = "Complete this required item";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChecklistItem {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub required: bool,
    pub completed: bool,
    pub completed_date: Option<DateTime<Utc>>,
    pub action_required: Option<String>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

/// Category tally as returned by the database function
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub total: i64,
    pub completed: i64,
}

/// Raw output of `calculate_project_readiness`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadinessSnapshot {
    #[serde(default)]
    pub total_checks: i64,
    #[serde(default)]
    pub completed_checks: i64,
    #[serde(default)]
    pub required_checks: i64,
    #[serde(default)]
    pub required_completed: i64,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryCount>,
}

pub fn percentage(done: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (done as f64 / total as f64 * 1000.0).round() / 10.0
}

impl ReadinessSnapshot {
    pub fn overall_readiness(&self) -> f64 {
        percentage(self.completed_checks, self.total_checks)
    }

    pub fn critical_issues(&self) -> i64 {
        (self.required_checks - self.required_completed).max(0)
    }

    /// `ready` once every required item is done, `almost_ready` from 75 %
    pub fn status(&self) -> &'static str {
        if self.total_checks > 0 && self.critical_issues() == 0 {
            "ready"
        } else if self.overall_readiness() >= 75.0 {
            "almost_ready"
        } else {
            "not_ready"
        }
    }

    pub fn categories_json(&self) -> Value {
        let categories: serde_json::Map<String, Value> = self
            .categories
            .iter()
            .map(|(name, count)| {
                (
                    name.clone(),
                    json!({
                        "total": count.total,
                        "completed": count.completed,
                        "percentage": percentage(count.completed, count.total),
                    }),
                )
            })
            .collect();
        Value::Object(categories)
    }
}

/// Minimum overall readiness, in percent, for a project to go active
pub const ACTIVATION_THRESHOLD: f64 = 90.0;

pub fn meets_activation_threshold(readiness: f64) -> bool {
    readiness >= ACTIVATION_THRESHOLD
}

#[derive(Debug, Deserialize)]
pub struct ActivationRequest {
    pub project_id: Option<Uuid>,
    pub activation_date: Option<NaiveDate>,
    pub activation_notes: Option<String>,
    pub responsible_manager: Option<String>,
    pub notify_stakeholders: Option<bool>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActivationLog {
    pub id: Uuid,
    pub project_id: Uuid,
    pub activation_date: NaiveDate,
    pub activation_notes: Option<String>,
    pub responsible_manager: String,
    pub notify_stakeholders: bool,
    pub readiness_at_activation: f64,
    pub previous_status: String,
    pub new_status: String,
    pub activated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum Activation {
    Activated {
        log: ActivationLog,
        project_name: String,
        pm_user_id: Option<Uuid>,
    },
    BelowThreshold { readiness: f64 },
}

/// Days until `start`, negative once it has passed
pub fn days_to_start(start: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    start.map(|date| (date - today).num_days())
}

#[derive(Debug, Clone)]
pub struct ReadinessStore {
    pool: PgPool,
}

impl ReadinessStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Run the scoring function and refresh the cache row
    pub async fn calculate(&self, project_id: Uuid) -> Result<ReadinessSnapshot> {
        let raw: Value = sqlx::query_scalar("SELECT calculate_project_readiness($1)")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        let snapshot: ReadinessSnapshot = serde_json::from_value(raw.clone())?;

        sqlx::query(
            "INSERT INTO project_readiness_cache (project_id, readiness, overall_readiness, calculated_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (project_id) DO UPDATE SET \
                readiness = EXCLUDED.readiness, \
                overall_readiness = EXCLUDED.overall_readiness, \
                calculated_at = EXCLUDED.calculated_at",
        )
        .bind(project_id)
        .bind(raw)
        .bind(snapshot.overall_readiness())
        .execute(&self.pool)
        .await?;

        Ok(snapshot)
    }

    /// Required items still open
    pub async fn open_required_items(&self, project_id: Uuid) -> Result<Vec<ChecklistItem>> {
        let items = sqlx::query_as::<_, ChecklistItem>(
            "SELECT * FROM project_checklist_items \
             WHERE project_id = $1 AND required AND NOT completed \
             ORDER BY order_index",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn checklist(&self, project_id: Uuid) -> Result<Vec<ChecklistItem>> {
        let items = sqlx::query_as::<_, ChecklistItem>(
            "SELECT * FROM project_checklist_items WHERE project_id = $1 ORDER BY order_index, created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Insert the default checklist when the project has none; returns inserted count
    pub async fn seed_defaults(&self, project_id: Uuid) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM project_checklist_items WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await?;
        if existing > 0 {
            return Ok(0);
        }

        for (index, (category, title, description, required)) in DEFAULT_CHECKLIST.iter().enumerate() {
            sqlx::query(
                "INSERT INTO project_checklist_items \
                    (project_id, title, description, category, required, action_required, order_index) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(project_id)
            .bind(*title)
            .bind(*description)
            .bind(*category)
            .bind(*required)
            .bind(required.then_some(REQUIRED_ACTION))
            .bind(index as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(DEFAULT_CHECKLIST.len())
    }

    /// Move a project to `active` if its readiness clears the threshold
    ///
    /// The project row stays locked from the readiness check until the log
    /// entry and the status change are written.
    pub async fn activate(
        &self,
        project_id: Uuid,
        activation_date: NaiveDate,
        responsible_manager: &str,
        request: &ActivationRequest,
        caller: Uuid,
    ) -> Result<Activation> {
        let mut tx = self.pool.begin().await?;

        let (previous_status, project_name, pm_user_id): (String, String, Option<Uuid>) =
            sqlx::query_as("SELECT status, name, pm_user_id FROM projects WHERE id = $1 FOR UPDATE")
                .bind(project_id)
                .fetch_one(&mut *tx)
                .await?;

        let raw: Value = sqlx::query_scalar("SELECT calculate_project_readiness($1)")
            .bind(project_id)
            .fetch_one(&mut *tx)
            .await?;
        let readiness = serde_json::from_value::<ReadinessSnapshot>(raw)?.overall_readiness();
        if !meets_activation_threshold(readiness) {
            return Ok(Activation::BelowThreshold { readiness });
        }

        let log = sqlx::query_as::<_, ActivationLog>(
            "INSERT INTO project_activation_log (project_id, activation_date, activation_notes, \
                responsible_manager, notify_stakeholders, readiness_at_activation, previous_status, \
                new_status, activated_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8) RETURNING *",
        )
        .bind(project_id)
        .bind(activation_date)
        .bind(&request.activation_notes)
        .bind(responsible_manager)
        .bind(request.notify_stakeholders.unwrap_or(false))
        .bind(readiness)
        .bind(&previous_status)
        .bind(caller)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE projects SET status = 'active', updated_at = NOW() WHERE id = $1")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Activation::Activated {
            log,
            project_name,
            pm_user_id,
        })
    }

    /// Toggle an item; the completion date follows the flag
    pub async fn set_completed(&self, project_id: Uuid, item_id: Uuid, completed: bool) -> Result<ChecklistItem> {
        let item = sqlx::query_as::<_, ChecklistItem>(
            "UPDATE project_checklist_items \
             SET completed = $3, \
                 completed_date = CASE WHEN $3 THEN NOW() ELSE NULL END \
             WHERE id = $2 AND project_id = $1 \
             RETURNING *",
        )
        .bind(project_id)
        .bind(item_id)
        .bind(completed)
        .fetch_one(&self.pool)
        .await?;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(total: i64, completed: i64, required: i64, required_completed: i64) -> ReadinessSnapshot {
        ReadinessSnapshot {
            total_checks: total,
            completed_checks: completed,
            required_checks: required,
            required_completed,
            categories: BTreeMap::new(),
        }
    }

    #[test]
    fn default_checklist_has_four_categories() {
        let mut categories: Vec<_> = DEFAULT_CHECKLIST.iter().map(|item| item.0).collect();
        categories.dedup();
        assert_eq!(
            categories,
            vec!["documentation", "resources", "infrastructure", "approvals"]
        );
        assert_eq!(DEFAULT_CHECKLIST.iter().filter(|item| item.3).count(), 10);
    }

    #[test]
    fn empty_checklist_is_not_ready() {
        let s = snapshot(0, 0, 0, 0);
        assert_eq!(s.overall_readiness(), 0.0);
        assert_eq!(s.status(), "not_ready");
    }

    #[test]
    fn required_items_decide_readiness() {
        assert_eq!(snapshot(16, 10, 10, 10).status(), "ready");
        assert_eq!(snapshot(16, 13, 10, 9).status(), "almost_ready");
        assert_eq!(snapshot(16, 8, 10, 8).status(), "not_ready");
        assert_eq!(snapshot(16, 8, 10, 8).critical_issues(), 2);
    }

    #[test]
    fn percentages_keep_one_decimal() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn snapshot_parses_database_json() {
        let raw = json!({
            "total_checks": 4,
            "completed_checks": 2,
            "required_checks": 2,
            "required_completed": 1,
            "categories": { "resources": { "total": 4, "completed": 2 } }
        });
        let s: ReadinessSnapshot = serde_json::from_value(raw).unwrap();
        assert_eq!(s.overall_readiness(), 50.0);
        assert_eq!(s.categories_json()["resources"]["percentage"], 50.0);
    }

    #[test]
    fn activation_needs_ninety_percent() {
        assert!(meets_activation_threshold(90.0));
        assert!(meets_activation_threshold(100.0));
        assert!(!meets_activation_threshold(89.9));
        assert!(!meets_activation_threshold(snapshot(16, 14, 10, 10).overall_readiness()));
        assert!(meets_activation_threshold(snapshot(10, 9, 5, 5).overall_readiness()));
    }

    #[test]
    fn days_to_start_counts_calendar_days() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 5, 8);
        assert_eq!(days_to_start(start, today), Some(7));
        assert_eq!(days_to_start(None, today), None);
    }
}
