//! Projects, soil types and project statistics

use crate::db::{Changes, Database, Page};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const PROJECT_STATUSES: [&str; 8] = [
    "draft",
    "planning",
    "active",
    "on_hold",
    "waiting_invoice",
    "completed",
    "closed",
    "cancelled",
];

pub fn is_valid_status(status: &str) -> bool {
    PROJECT_STATUSES.contains(&status)
}

const PROJECT_COLUMNS: &str = "p.id, p.name, p.customer, p.city, p.address, p.contact_24h, \
     p.start_date, p.end_date_plan, p.status, p.total_length_m, p.base_rate_per_m, \
     p.pm_user_id, p.language_default, p.created_at, p.updated_at";

const APPROVED_METERS: &str = "COALESCE((SELECT SUM(w.meters_done_m) FROM work_entries w \
     WHERE w.project_id = p.id AND w.approved), 0) AS approved_meters";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub customer: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub contact_24h: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date_plan: Option<NaiveDate>,
    pub status: String,
    pub total_length_m: f64,
    pub base_rate_per_m: f64,
    pub pm_user_id: Option<Uuid>,
    pub language_default: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project row plus derived budget and progress
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProjectOverview {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub project: Project,
    pub approved_meters: f64,
    #[sqlx(default)]
    pub manager_name: Option<String>,
    #[sqlx(default)]
    pub manager_email: Option<String>,
}

impl ProjectOverview {
    /// Serialize with the computed `budget` and `progress` fields
    pub fn to_json(&self) -> Value {
        let mut value = json!(self);
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "budget".into(),
                json!(budget(self.project.total_length_m, self.project.base_rate_per_m)),
            );
            map.insert(
                "progress".into(),
                json!(progress_percent(self.approved_meters, self.project.total_length_m)),
            );
        }
        value
    }
}

pub fn budget(total_length_m: f64, base_rate_per_m: f64) -> f64 {
    total_length_m * base_rate_per_m
}

/// Share of planned length covered, as a rounded percentage capped at 100
pub fn progress_percent(done_m: f64, total_length_m: f64) -> i64 {
    if total_length_m <= 0.0 {
        return 0;
    }
    ((done_m / total_length_m) * 100.0).round().clamp(0.0, 100.0) as i64
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectFilter {
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewProject {
    pub name: Option<String>,
    pub customer: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub contact_24h: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date_plan: Option<NaiveDate>,
    pub status: Option<String>,
    pub total_length_m: Option<f64>,
    pub base_rate_per_m: Option<f64>,
    pub pm_user_id: Option<Uuid>,
    pub language_default: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub customer: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub contact_24h: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date_plan: Option<NaiveDate>,
    pub status: Option<String>,
    pub total_length_m: Option<f64>,
    pub base_rate_per_m: Option<f64>,
    pub pm_user_id: Option<Uuid>,
    pub language_default: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SoilType {
    pub id: Uuid,
    pub project_id: Uuid,
    pub soil_type_name: String,
    pub price_per_meter: f64,
    pub quantity_meters: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewSoilType {
    pub soil_type_name: Option<String>,
    pub price_per_meter: Option<f64>,
    pub quantity_meters: Option<f64>,
    pub notes: Option<String>,
}

/// Sums over a project's soil types
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SoilTotals {
    pub total_length_m: f64,
    pub total_value_eur: f64,
    pub soil_types_count: usize,
}

impl SoilTotals {
    pub fn from_soil_types(soil_types: &[SoilType]) -> Self {
        soil_types.iter().fold(
            Self {
                total_length_m: 0.0,
                total_value_eur: 0.0,
                soil_types_count: soil_types.len(),
            },
            |acc, s| Self {
                total_length_m: acc.total_length_m + s.quantity_meters,
                total_value_eur: acc.total_value_eur + s.quantity_meters * s.price_per_meter,
                ..acc
            },
        )
    }
}

/// Raw counters behind `GET /api/projects/{id}/stats`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsInputs {
    pub total_length_m: f64,
    pub base_rate_per_m: f64,
    pub work_entries: i64,
    pub pending_approvals: i64,
    pub completed_length_m: f64,
    pub team_members: i64,
    pub materials_count: i64,
    pub total_spent: f64,
}

/// Preparation phase derived from which resources are in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub number: u8,
    pub name: &'static str,
    pub preparation_progress: u8,
}

pub const TOTAL_PHASES: u8 = 10;

impl StatsInputs {
    pub fn phase(&self) -> Phase {
        let mut progress = 0u8;
        if self.team_members > 0 {
            progress += 40;
        }
        if self.materials_count > 0 {
            progress += 30;
        }
        if self.work_entries > 0 {
            progress += 30;
        }

        let (number, name) = if progress >= 90 {
            (10, "Project Execution")
        } else if progress >= 80 {
            (9, "Final Preparation")
        } else if self.materials_count > 0 {
            (6, "Materials Procurement")
        } else if self.team_members > 0 {
            (5, "Team Assignment")
        } else if progress > 30 {
            (3, "Resource Planning")
        } else if progress > 10 {
            (2, "Site Assessment")
        } else {
            (1, "Project Initiation")
        };

        Phase {
            number,
            name,
            preparation_progress: progress,
        }
    }

    pub fn to_json(&self) -> Value {
        let phase = self.phase();
        let project_budget = budget(self.total_length_m, self.base_rate_per_m);
        let spent_percentage = if project_budget > 0.0 {
            (self.total_spent / project_budget * 100.0).round() as i64
        } else {
            0
        };
        let progress_percentage = if self.total_length_m > 0.0 {
            (self.completed_length_m / self.total_length_m * 100.0).round() as i64
        } else {
            0
        };

        json!({
            "progress": {
                "totalLength": self.total_length_m,
                "completedLength": self.completed_length_m,
                "progressPercentage": progress_percentage,
                "workEntries": self.work_entries,
                "pendingApprovals": self.pending_approvals,
                "teamMembers": self.team_members,
                "materialsCount": self.materials_count,
            },
            "phase": {
                "currentPhase": phase.number,
                "totalPhases": TOTAL_PHASES,
                "phaseName": phase.name,
                "phaseProgress": phase.preparation_progress,
            },
            "financial": {
                "projectBudget": project_budget,
                "totalSpent": self.total_spent,
                "spentPercentage": spent_percentage,
                "remainingBudget": project_budget - self.total_spent,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProjectStore {
    pool: PgPool,
}

impl ProjectStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProjectFilter) {
        builder.push(" WHERE 1=1");
        if let Some(status) = &filter.status {
            builder.push(" AND p.status = ").push_bind(status.clone());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            builder
                .push(" AND (p.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.customer ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.city ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    /// Newest first
    pub async fn list(&self, filter: &ProjectFilter, page: Page) -> Result<(Vec<ProjectOverview>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM projects p");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!(
            "SELECT {}, {} FROM projects p",
            PROJECT_COLUMNS, APPROVED_METERS
        ));
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY p.created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let projects = select
            .build_query_as::<ProjectOverview>()
            .fetch_all(&self.pool)
            .await?;

        Ok((projects, total))
    }

    /// Project with manager contact and approved meters
    pub async fn get(&self, id: Uuid) -> Result<ProjectOverview> {
        let project = sqlx::query_as::<_, ProjectOverview>(&format!(
            "SELECT {}, {}, \
                NULLIF(TRIM(CONCAT(u.first_name, ' ', u.last_name)), '') AS manager_name, \
                u.email AS manager_email \
             FROM projects p \
             LEFT JOIN users u ON u.id = p.pm_user_id \
             WHERE p.id = $1",
            PROJECT_COLUMNS, APPROVED_METERS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }

    pub async fn get_plain(&self, id: Uuid) -> Result<Project> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {} FROM projects p WHERE p.id = $1",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }

    pub async fn create(&self, name: &str, project: &NewProject) -> Result<Project> {
        let created = sqlx::query_as::<_, Project>(
            "INSERT INTO projects (name, customer, city, address, contact_24h, start_date, \
                end_date_plan, status, total_length_m, base_rate_per_m, pm_user_id, language_default) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING *",
        )
        .bind(name)
        .bind(&project.customer)
        .bind(&project.city)
        .bind(&project.address)
        .bind(&project.contact_24h)
        .bind(project.start_date)
        .bind(project.end_date_plan)
        .bind(project.status.as_deref().unwrap_or("draft"))
        .bind(project.total_length_m.unwrap_or(0.0))
        .bind(project.base_rate_per_m.unwrap_or(0.0))
        .bind(project.pm_user_id)
        .bind(project.language_default.as_deref().unwrap_or("de"))
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Apply the provided fields; `Ok(None)` when nothing was provided
    pub async fn update(&self, id: Uuid, update: ProjectUpdate) -> Result<Option<Project>> {
        let mut changes = Changes::new("projects");
        changes
            .set("name", update.name)
            .set("customer", update.customer)
            .set("city", update.city)
            .set("address", update.address)
            .set("contact_24h", update.contact_24h)
            .set("start_date", update.start_date)
            .set("end_date_plan", update.end_date_plan)
            .set("status", update.status)
            .set("total_length_m", update.total_length_m)
            .set("base_rate_per_m", update.base_rate_per_m)
            .set("pm_user_id", update.pm_user_id)
            .set("language_default", update.language_default);
        if changes.is_empty() {
            return Ok(None);
        }
        changes.set_raw("updated_at = NOW()");

        let mut query = changes.finish(id, "*");
        let project = query.build_query_as::<Project>().fetch_one(&self.pool).await?;
        Ok(Some(project))
    }

    pub async fn set_status(&self, id: Uuid, status: &str) -> Result<Project> {
        let project = sqlx::query_as::<_, Project>(
            "UPDATE projects SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }

    /// Delete and return `(id, name)` of the removed row
    pub async fn delete(&self, id: Uuid) -> Result<(Uuid, String)> {
        let deleted: (Uuid, String) =
            sqlx::query_as("DELETE FROM projects WHERE id = $1 RETURNING id, name")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(deleted)
    }

    pub async fn stats_inputs(&self, id: Uuid) -> Result<StatsInputs> {
        let (total_length_m, base_rate_per_m): (f64, f64) =
            sqlx::query_as("SELECT total_length_m, base_rate_per_m FROM projects WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        let (work_entries, pending_approvals, completed_length_m): (i64, i64, f64) = sqlx::query_as(
            "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE approved_by IS NULL), \
                COALESCE(SUM(meters_done_m), 0) \
             FROM work_entries WHERE project_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let team_members: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crew_members cm \
             JOIN crews c ON c.id = cm.crew_id \
             WHERE c.project_id = $1 AND cm.is_active",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let materials_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM material_allocations WHERE project_id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        let total_spent: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_eur), 0) FROM transactions \
             WHERE project_id = $1 AND transaction_type = 'expense'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StatsInputs {
            total_length_m,
            base_rate_per_m,
            work_entries,
            pending_approvals,
            completed_length_m,
            team_members,
            materials_count,
            total_spent,
        })
    }

    pub async fn soil_types(&self, project_id: Uuid) -> Result<Vec<SoilType>> {
        let soil_types = sqlx::query_as::<_, SoilType>(
            "SELECT * FROM project_soil_types WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(soil_types)
    }

    pub async fn add_soil_type(
        &self,
        project_id: Uuid,
        name: &str,
        price_per_meter: f64,
        soil_type: &NewSoilType,
    ) -> Result<SoilType> {
        let created = sqlx::query_as::<_, SoilType>(
            "INSERT INTO project_soil_types (project_id, soil_type_name, price_per_meter, quantity_meters, notes) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(project_id)
        .bind(name)
        .bind(price_per_meter)
        .bind(soil_type.quantity_meters.unwrap_or(0.0))
        .bind(&soil_type.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn delete_soil_type(&self, project_id: Uuid, soil_type_id: Uuid) -> Result<()> {
        sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM project_soil_types WHERE id = $1 AND project_id = $2 RETURNING id",
        )
        .bind(soil_type_id)
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(())
    }

    /// Write the soil type length sum back to the project
    pub async fn recalculate_totals(&self, project_id: Uuid) -> Result<(Value, SoilTotals)> {
        // 404 before touching anything
        self.get_plain(project_id).await?;

        let soil_types = self.soil_types(project_id).await?;
        let totals = SoilTotals::from_soil_types(&soil_types);

        let (id, name, total_length_m): (Uuid, String, f64) = sqlx::query_as(
            "UPDATE projects SET total_length_m = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING id, name, total_length_m",
        )
        .bind(project_id)
        .bind(totals.total_length_m)
        .fetch_one(&self.pool)
        .await?;

        Ok((
            json!({ "id": id, "name": name, "total_length_m": total_length_m }),
            totals,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soil(quantity_meters: f64, price_per_meter: f64) -> SoilType {
        SoilType {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            soil_type_name: "Sand".into(),
            price_per_meter,
            quantity_meters,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn progress_is_capped_and_safe_for_empty_projects() {
        assert_eq!(progress_percent(50.0, 200.0), 25);
        assert_eq!(progress_percent(300.0, 200.0), 100);
        assert_eq!(progress_percent(10.0, 0.0), 0);
    }

    #[test]
    fn soil_totals_sum_length_and_value() {
        let totals = SoilTotals::from_soil_types(&[soil(100.0, 12.5), soil(40.0, 20.0)]);
        assert_eq!(totals.total_length_m, 140.0);
        assert_eq!(totals.total_value_eur, 2050.0);
        assert_eq!(totals.soil_types_count, 2);
    }

    #[test]
    fn empty_project_is_in_initiation() {
        let phase = StatsInputs::default().phase();
        assert_eq!(phase.number, 1);
        assert_eq!(phase.name, "Project Initiation");
        assert_eq!(phase.preparation_progress, 0);
    }

    #[test]
    fn team_only_means_team_assignment() {
        let inputs = StatsInputs {
            team_members: 3,
            ..Default::default()
        };
        assert_eq!(inputs.phase().number, 5);
    }

    #[test]
    fn materials_take_precedence_over_team() {
        let inputs = StatsInputs {
            team_members: 3,
            materials_count: 1,
            ..Default::default()
        };
        let phase = inputs.phase();
        assert_eq!(phase.preparation_progress, 70);
        assert_eq!(phase.number, 6);
    }

    #[test]
    fn everything_in_place_means_execution() {
        let inputs = StatsInputs {
            team_members: 3,
            materials_count: 1,
            work_entries: 4,
            ..Default::default()
        };
        assert_eq!(inputs.phase().name, "Project Execution");
    }

    #[test]
    fn financial_block_reports_remaining_budget() {
        let inputs = StatsInputs {
            total_length_m: 1000.0,
            base_rate_per_m: 10.0,
            total_spent: 2500.0,
            completed_length_m: 333.0,
            ..Default::default()
        };
        let body = inputs.to_json();
        assert_eq!(body["financial"]["projectBudget"], 10000.0);
        assert_eq!(body["financial"]["spentPercentage"], 25);
        assert_eq!(body["financial"]["remainingBudget"], 7500.0);
        assert_eq!(body["progress"]["progressPercentage"], 33);
        assert_eq!(body["phase"]["totalPhases"], 10);
    }

    #[test]
    fn status_enum_is_closed() {
        assert!(is_valid_status("waiting_invoice"));
        assert!(!is_valid_status("archived"));
    }
}
