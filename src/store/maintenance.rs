//! Recurring equipment maintenance schedules

use crate::db::{Database, Page};
use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const INTERVAL_TYPES: [&str; 3] = ["calendar", "usage_hours", "cycles"];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MaintenanceSchedule {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub maintenance_type: String,
    pub interval_type: String,
    pub interval_value: i32,
    pub last_performed_date: Option<NaiveDate>,
    pub last_performed_hours: Option<f64>,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_hours: Option<f64>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub equipment_name: Option<String>,
    #[sqlx(default)]
    pub equipment_usage_hours: Option<f64>,
}

impl MaintenanceSchedule {
    /// Past its due date, or the item has run past the due hours
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        let by_date = self.next_due_date.is_some_and(|due| due < today);
        let by_hours = match (self.next_due_hours, self.equipment_usage_hours) {
            (Some(due), Some(used)) => used >= due,
            _ => false,
        };
        by_date || by_hours
    }

    pub fn days_until_due(&self, today: NaiveDate) -> Option<i64> {
        self.next_due_date.map(|due| (due - today).num_days())
    }

    pub fn to_json(&self, today: NaiveDate, upcoming_within_days: i64) -> Value {
        let days = self.days_until_due(today);
        let mut value = json!(self);
        if let Some(map) = value.as_object_mut() {
            map.insert("days_until_due".into(), json!(days));
            map.insert("is_overdue".into(), json!(self.is_overdue(today)));
            map.insert(
                "is_upcoming".into(),
                json!(days.is_some_and(|d| (0..=upcoming_within_days).contains(&d))),
            );
        }
        value
    }
}

/// Next due date and hours from the last service
///
/// Calendar intervals count days from the last service (or today), usage
/// intervals count operating hours. Cycle counts are tracked outside.
pub fn next_due(
    interval_type: &str,
    interval_value: i32,
    last_date: Option<NaiveDate>,
    last_hours: Option<f64>,
    today: NaiveDate,
) -> (Option<NaiveDate>, Option<f64>) {
    match interval_type {
        "calendar" => {
            let base = last_date.unwrap_or(today);
            let days = u64::try_from(interval_value).unwrap_or(0);
            (base.checked_add_days(Days::new(days)), None)
        }
        "usage_hours" => (None, Some(last_hours.unwrap_or(0.0) + f64::from(interval_value))),
        _ => (None, None),
    }
}

pub const DEFAULT_UPCOMING_DAYS: i64 = 30;

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleFilter {
    pub equipment_id: Option<Uuid>,
    pub maintenance_type: Option<String>,
    pub overdue_only: Option<bool>,
    pub upcoming_within_days: Option<i64>,
    pub active_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NewSchedule {
    pub equipment_id: Option<Uuid>,
    pub maintenance_type: Option<String>,
    pub interval_type: Option<String>,
    pub interval_value: Option<i32>,
    pub last_performed_date: Option<NaiveDate>,
    pub last_performed_hours: Option<f64>,
    pub notes: Option<String>,
}

const SCHEDULE_SELECT: &str = "SELECT s.*, e.name AS equipment_name, \
        e.total_usage_hours AS equipment_usage_hours \
     FROM equipment_maintenance_schedules s \
     LEFT JOIN equipment e ON e.id = s.equipment_id";

#[derive(Debug, Clone)]
pub struct MaintenanceStore {
    pool: PgPool,
}

impl MaintenanceStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ScheduleFilter) {
        builder.push(" WHERE 1=1");
        if filter.active_only.unwrap_or(true) {
            builder.push(" AND s.is_active");
        }
        if let Some(id) = filter.equipment_id {
            builder.push(" AND s.equipment_id = ").push_bind(id);
        }
        if let Some(kind) = &filter.maintenance_type {
            builder.push(" AND s.maintenance_type = ").push_bind(kind.clone());
        }
        if filter.overdue_only.unwrap_or(false) {
            builder.push(
                " AND (s.next_due_date < CURRENT_DATE \
                 OR (s.next_due_hours IS NOT NULL AND e.total_usage_hours >= s.next_due_hours))",
            );
        }
        if let Some(days) = filter.upcoming_within_days {
            builder
                .push(" AND s.next_due_date BETWEEN CURRENT_DATE AND CURRENT_DATE + ")
                .push_bind(i32::try_from(days.max(0)).unwrap_or(i32::MAX))
                .push("::int");
        }
    }

    pub async fn list(&self, filter: &ScheduleFilter, page: Page) -> Result<(Vec<MaintenanceSchedule>, i64)> {
        let from = "SELECT COUNT(*) FROM equipment_maintenance_schedules s \
                    LEFT JOIN equipment e ON e.id = s.equipment_id";
        let mut count = QueryBuilder::new(from);
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(SCHEDULE_SELECT);
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY s.next_due_date NULLS LAST, s.created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build_query_as::<MaintenanceSchedule>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }

    pub async fn create(
        &self,
        equipment_id: Uuid,
        maintenance_type: &str,
        interval_type: &str,
        interval_value: i32,
        schedule: &NewSchedule,
    ) -> Result<MaintenanceSchedule> {
        let (next_due_date, next_due_hours) = next_due(
            interval_type,
            interval_value,
            schedule.last_performed_date,
            schedule.last_performed_hours,
            Utc::now().date_naive(),
        );

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO equipment_maintenance_schedules (equipment_id, maintenance_type, interval_type, \
                interval_value, last_performed_date, last_performed_hours, next_due_date, next_due_hours, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(equipment_id)
        .bind(maintenance_type)
        .bind(interval_type)
        .bind(interval_value)
        .bind(schedule.last_performed_date)
        .bind(schedule.last_performed_hours)
        .bind(next_due_date)
        .bind(next_due_hours)
        .bind(&schedule.notes)
        .fetch_one(&self.pool)
        .await?;

        let created = sqlx::query_as::<_, MaintenanceSchedule>(&format!("{} WHERE s.id = $1", SCHEDULE_SELECT))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule(next_due_date: Option<NaiveDate>, next_due_hours: Option<f64>, used: f64) -> MaintenanceSchedule {
        MaintenanceSchedule {
            id: Uuid::new_v4(),
            equipment_id: Uuid::new_v4(),
            maintenance_type: "Ölwechsel".into(),
            interval_type: "calendar".into(),
            interval_value: 90,
            last_performed_date: None,
            last_performed_hours: None,
            next_due_date,
            next_due_hours,
            notes: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            equipment_name: Some("Minibagger".into()),
            equipment_usage_hours: Some(used),
        }
    }

    #[test]
    fn calendar_interval_counts_from_last_service() {
        let today = day(2024, 6, 1);
        assert_eq!(
            next_due("calendar", 30, Some(day(2024, 5, 20)), None, today),
            (Some(day(2024, 6, 19)), None)
        );
        assert_eq!(
            next_due("calendar", 7, None, None, today),
            (Some(day(2024, 6, 8)), None)
        );
    }

    #[test]
    fn usage_interval_adds_hours() {
        let today = day(2024, 6, 1);
        assert_eq!(next_due("usage_hours", 250, None, Some(1000.0), today), (None, Some(1250.0)));
        assert_eq!(next_due("cycles", 500, None, None, today), (None, None));
    }

    #[test]
    fn overdue_by_date_or_by_hours() {
        let today = day(2024, 6, 1);
        assert!(schedule(Some(day(2024, 5, 31)), None, 0.0).is_overdue(today));
        assert!(!schedule(Some(today), None, 0.0).is_overdue(today));
        assert!(schedule(None, Some(500.0), 500.0).is_overdue(today));
        assert!(!schedule(None, Some(500.0), 499.5).is_overdue(today));
    }

    #[test]
    fn json_marks_upcoming_schedules() {
        let today = day(2024, 6, 1);
        let body = schedule(Some(day(2024, 6, 10)), None, 0.0).to_json(today, 14);
        assert_eq!(body["days_until_due"], 9);
        assert_eq!(body["is_upcoming"], true);
        assert_eq!(body["is_overdue"], false);

        let later = schedule(Some(day(2024, 7, 10)), None, 0.0).to_json(today, 14);
        assert_eq!(later["is_upcoming"], false);
    }
}
