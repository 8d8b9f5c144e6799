//! Cross-resource counters for the dashboard landing page

use crate::db::Database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Default, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCounts {
    pub total: i64,
    pub active: i64,
    pub completed: i64,
    pub planning: i64,
    pub on_hold: i64,
}

#[derive(Debug, Clone, Default, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkEntryCounts {
    pub total: i64,
    pub pending_approvals: i64,
    pub approved: i64,
    pub this_week: i64,
}

#[derive(Debug, Clone, Default, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeamCounts {
    pub total_workers: i64,
    pub active_workers: i64,
    pub total_crews: i64,
    pub active_crews: i64,
}

#[derive(Debug, Clone, Default, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MaterialCounts {
    pub total_materials: i64,
    pub active_materials: i64,
    pub inactive_materials: i64,
    pub low_stock: i64,
    pub avg_price: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCounts {
    pub recent_activities: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub projects: ProjectCounts,
    pub work_entries: WorkEntryCounts,
    pub team: TeamCounts,
    pub materials: MaterialCounts,
    pub activities: ActivityCounts,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DashboardStore {
    pool: PgPool,
}

impl DashboardStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Five independent aggregates, run concurrently on the pool
    pub async fn stats(&self) -> Result<DashboardStats> {
        let projects = sqlx::query_as::<_, ProjectCounts>(
            "SELECT COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE status = 'active') AS active, \
                COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
                COUNT(*) FILTER (WHERE status = 'planning') AS planning, \
                COUNT(*) FILTER (WHERE status = 'on_hold') AS on_hold \
             FROM projects",
        )
        .fetch_one(&self.pool);

        let work_entries = sqlx::query_as::<_, WorkEntryCounts>(
            "SELECT COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE NOT approved) AS pending_approvals, \
                COUNT(*) FILTER (WHERE approved) AS approved, \
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '7 days') AS this_week \
             FROM work_entries",
        )
        .fetch_one(&self.pool);

        let team = sqlx::query_as::<_, TeamCounts>(
            "SELECT COUNT(DISTINCT u.id) AS total_workers, \
                COUNT(DISTINCT u.id) FILTER (WHERE u.is_active) AS active_workers, \
                COUNT(DISTINCT c.id) AS total_crews, \
                COUNT(DISTINCT c.id) FILTER (WHERE c.status = 'active') AS active_crews \
             FROM users u \
             LEFT JOIN crew_members cm ON cm.user_id = u.id \
             LEFT JOIN crews c ON c.id = cm.crew_id \
             WHERE u.role IN ('crew', 'worker', 'foreman')",
        )
        .fetch_one(&self.pool);

        let materials = sqlx::query_as::<_, MaterialCounts>(
            "SELECT COUNT(*) AS total_materials, \
                COUNT(*) FILTER (WHERE is_active) AS active_materials, \
                COUNT(*) FILTER (WHERE NOT is_active) AS inactive_materials, \
                COUNT(*) FILTER (WHERE is_active AND current_stock <= min_stock_threshold) AS low_stock, \
                COALESCE(AVG(unit_price_eur), 0)::double precision AS avg_price \
             FROM materials",
        )
        .fetch_one(&self.pool);

        let activities = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM activity_logs WHERE created_at >= NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(&self.pool);

        let (projects, work_entries, team, materials, recent_activities) =
            tokio::try_join!(projects, work_entries, team, materials, activities)?;

        Ok(DashboardStats {
            projects,
            work_entries,
            team,
            materials,
            activities: ActivityCounts { recent_activities },
            last_updated: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_serialize_in_camel_case() {
        let body = serde_json::to_value(DashboardStats::default()).unwrap();
        assert!(body["projects"]["onHold"].is_number());
        assert!(body["workEntries"]["pendingApprovals"].is_number());
        assert!(body["team"]["activeCrews"].is_number());
        assert!(body["materials"]["avgPrice"].is_number());
        assert!(body["activities"]["recentActivities"].is_number());
        assert!(body["lastUpdated"].is_string());
    }
}
