//! Date-driven reminder pass
//!
//! Looks at project dates, expected deliveries, vehicle and equipment
//! document expiry and maintenance due dates, and creates in-app
//! notifications when a date hits one of its milestones.
//! A notification with the same user and title created in the last 24 hours
//! counts as skipped.

use crate::{
    db::Database,
    store::notifications::{NewNotification, NotificationStore},
};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use std::time::Instant;
use uuid::Uuid;

const DEDUPE_WINDOW_HOURS: i64 = 24;

/// Outcome counters for one trigger or the whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TriggerStats {
    pub total: u32,
    pub created: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl TriggerStats {
    fn absorb(&mut self, other: TriggerStats) {
        self.total += other.total;
        self.created += other.created;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerReport {
    pub name: &'static str,
    pub stats: TriggerStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderReport {
    pub timestamp: DateTime<Utc>,
    pub triggers: Vec<TriggerReport>,
    pub execution_time_ms: u128,
}

impl ReminderReport {
    pub fn totals(&self) -> TriggerStats {
        let mut totals = TriggerStats::default();
        for trigger in &self.triggers {
            totals.absorb(trigger.stats);
        }
        totals
    }
}

/// The reminder families and their milestone days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ProjectStart,
    ProjectEnd,
    MaterialDelivery,
    VehicleDocument,
    EquipmentDocument,
    Maintenance,
}

impl Trigger {
    pub const ALL: [Trigger; 6] = [
        Trigger::ProjectStart,
        Trigger::ProjectEnd,
        Trigger::MaterialDelivery,
        Trigger::VehicleDocument,
        Trigger::EquipmentDocument,
        Trigger::Maintenance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Trigger::ProjectStart => "project_start_reminders",
            Trigger::ProjectEnd => "project_end_reminders",
            Trigger::MaterialDelivery => "material_delivery_reminders",
            Trigger::VehicleDocument => "vehicle_document_expiration",
            Trigger::EquipmentDocument => "equipment_document_expiration",
            Trigger::Maintenance => "maintenance_reminders",
        }
    }

    /// Stored as the notification type
    pub fn notification_type(&self) -> &'static str {
        match self {
            Trigger::ProjectStart => "project_start",
            Trigger::ProjectEnd => "project_end",
            Trigger::MaterialDelivery => "material_delivery",
            Trigger::VehicleDocument | Trigger::EquipmentDocument => "document_expiration",
            Trigger::Maintenance => "maintenance_due",
        }
    }

    /// Days before the date on which a reminder fires; negative means overdue
    pub fn milestones(&self) -> &'static [i64] {
        match self {
            Trigger::ProjectStart => &[7, 3, 1, 0],
            Trigger::ProjectEnd => &[30, 14, 7, 3, 1, 0],
            Trigger::MaterialDelivery => &[7, 3, 1, 0, -1],
            Trigger::VehicleDocument | Trigger::EquipmentDocument => &[90, 30, 14, 7, 3, 1, 0],
            Trigger::Maintenance => &[30, 14, 7, 3, 1, 0],
        }
    }

    pub fn fires_on(&self, days_until: i64) -> bool {
        self.milestones().contains(&days_until)
    }

    pub fn priority(&self, days_until: i64) -> &'static str {
        match self {
            Trigger::ProjectStart if days_until <= 1 => "urgent",
            Trigger::ProjectStart if days_until <= 3 => "high",
            Trigger::ProjectEnd if days_until <= 3 => "urgent",
            Trigger::ProjectEnd if days_until <= 7 => "high",
            Trigger::MaterialDelivery if days_until < 0 => "urgent",
            Trigger::MaterialDelivery if days_until <= 1 => "high",
            Trigger::VehicleDocument if days_until < 0 => "urgent",
            Trigger::VehicleDocument if days_until <= 7 => "high",
            Trigger::EquipmentDocument if days_until < 0 => "urgent",
            Trigger::EquipmentDocument if days_until <= 7 => "high",
            Trigger::Maintenance if days_until < 0 => "urgent",
            Trigger::Maintenance if days_until <= 3 => "high",
            _ => "normal",
        }
    }
}

pub fn days_until(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

pub fn project_start_title(name: &str, days: i64) -> String {
    match days {
        0 => format!("Projekt startet heute: {}", name),
        n => format!("Projekt startet in {} Tagen: {}", n, name),
    }
}

pub fn project_end_title(name: &str, days: i64) -> String {
    match days {
        0 => format!("Projekt endet heute: {}", name),
        n => format!("Projekt endet in {} Tagen: {}", n, name),
    }
}

pub fn delivery_title(order_id: Uuid, days: i64) -> String {
    let order = short_id(order_id);
    match days {
        d if d < 0 => format!("Überfällige Lieferung (Bestellung #{})", order),
        0 => format!("Lieferung heute (Bestellung #{})", order),
        n => format!("Lieferung in {} Tagen (Bestellung #{})", n, order),
    }
}

pub fn vehicle_document_title(document_type: &str, plate: &str, days: i64) -> String {
    match days {
        d if d < 0 => format!("Abgelaufenes Dokument: {} ({})", document_type, plate),
        0 => format!("Dokument läuft heute ab: {} ({})", document_type, plate),
        n => format!("Dokument läuft in {} Tagen ab: {} ({})", n, document_type, plate),
    }
}

pub fn equipment_document_title(document_type: &str, document_name: &str, days: i64) -> String {
    match days {
        d if d < 0 => format!("Abgelaufenes Dokument: {} ({})", document_type, document_name),
        0 => format!("Dokument läuft heute ab: {}", document_type),
        n => format!("Dokument läuft in {} Tagen ab: {}", n, document_type),
    }
}

pub fn maintenance_title(equipment_name: &str, days: i64) -> String {
    match days {
        d if d < 0 => format!("Überfällige Wartung: {}", equipment_name),
        0 => format!("Wartung heute fällig: {}", equipment_name),
        n => format!("Wartung in {} Tagen: {}", n, equipment_name),
    }
}

/// A notification ready to hand to one or more recipients
#[derive(Debug, Clone)]
struct Reminder {
    trigger: Trigger,
    days: i64,
    title: String,
    message: String,
    action_url: String,
    data: Value,
}

impl Reminder {
    fn to_new(&self, user_id: Uuid) -> NewNotification {
        NewNotification {
            user_id: Some(user_id),
            title: Some(self.title.clone()),
            message: Some(self.message.clone()),
            notification_type: Some(self.trigger.notification_type().to_string()),
            priority: Some(self.trigger.priority(self.days).to_string()),
            action_url: Some(self.action_url.clone()),
            action_label: None,
            data: Some(self.data.clone()),
            expires_at: None,
        }
    }
}

#[derive(Debug, FromRow)]
struct DatedProject {
    id: Uuid,
    name: String,
    date: NaiveDate,
    pm_user_id: Uuid,
}

#[derive(Debug, FromRow)]
struct PendingDelivery {
    id: Uuid,
    expected_delivery_date: NaiveDate,
    supplier: Option<String>,
    pm_user_id: Uuid,
}

#[derive(Debug, FromRow)]
struct ExpiringDocument {
    id: Uuid,
    vehicle_id: Uuid,
    document_type: String,
    expiry_date: NaiveDate,
    plate_number: Option<String>,
}

#[derive(Debug, FromRow)]
struct ExpiringEquipmentDocument {
    id: Uuid,
    equipment_id: Uuid,
    document_type: String,
    document_name: String,
    expiry_date: NaiveDate,
    equipment_name: Option<String>,
}

#[derive(Debug, FromRow)]
struct DueMaintenance {
    id: Uuid,
    equipment_id: Uuid,
    maintenance_type: String,
    next_due_date: NaiveDate,
    equipment_name: Option<String>,
}

struct ReminderRun {
    pool: PgPool,
    notifications: NotificationStore,
    today: NaiveDate,
}

/// Run every trigger once; a failing trigger is logged and reported, the
/// others still run.
pub async fn run(db: &Database) -> Result<ReminderReport> {
    let started = Instant::now();
    let timestamp = Utc::now();
    let pool = db.pool().clone();
    let reminder_run = ReminderRun {
        notifications: NotificationStore::from_pool(pool.clone()),
        pool,
        today: timestamp.date_naive(),
    };

    tracing::info!("🔔 Starting reminder run for {}", reminder_run.today);

    let mut triggers = Vec::with_capacity(Trigger::ALL.len());
    for trigger in Trigger::ALL {
        let mut stats = TriggerStats::default();
        let outcome = match trigger {
            Trigger::ProjectStart => reminder_run.project_start(&mut stats).await,
            Trigger::ProjectEnd => reminder_run.project_end(&mut stats).await,
            Trigger::MaterialDelivery => reminder_run.material_delivery(&mut stats).await,
            Trigger::VehicleDocument => reminder_run.vehicle_documents(&mut stats).await,
            Trigger::EquipmentDocument => reminder_run.equipment_documents(&mut stats).await,
            Trigger::Maintenance => reminder_run.maintenance(&mut stats).await,
        };
        let error = outcome.err().map(|e| {
            tracing::error!("❌ Reminder trigger {} failed: {:#}", trigger.name(), e);
            format!("{:#}", e)
        });
        triggers.push(TriggerReport {
            name: trigger.name(),
            stats,
            error,
        });
    }

    let report = ReminderReport {
        timestamp,
        triggers,
        execution_time_ms: started.elapsed().as_millis(),
    };
    let totals = report.totals();
    tracing::info!(
        "✅ Reminder run finished in {}ms: total {}, created {}, skipped {}, failed {}",
        report.execution_time_ms,
        totals.total,
        totals.created,
        totals.skipped,
        totals.failed
    );
    Ok(report)
}

impl ReminderRun {
    /// Deliver to one user unless the same title reached them recently
    async fn deliver(&self, user_id: Uuid, reminder: &Reminder, stats: &mut TriggerStats) {
        stats.total += 1;
        match self
            .notifications
            .recently_sent(user_id, &reminder.title, DEDUPE_WINDOW_HOURS)
            .await
        {
            Ok(true) => {
                stats.skipped += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("⚠️ Duplicate check failed for {}: {:#}", user_id, e);
                stats.failed += 1;
                return;
            }
        }

        let new = reminder.to_new(user_id);
        match self
            .notifications
            .create(&reminder.title, &reminder.message, &new)
            .await
        {
            Ok(_) => stats.created += 1,
            Err(e) => {
                tracing::warn!("⚠️ Could not notify {} ({}): {:#}", user_id, reminder.title, e);
                stats.failed += 1;
            }
        }
    }

    async fn admins(&self) -> Result<Vec<Uuid>> {
        let admins = sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin' AND is_active")
            .fetch_all(&self.pool)
            .await?;
        Ok(admins)
    }

    async fn project_start(&self, stats: &mut TriggerStats) -> Result<()> {
        let projects = sqlx::query_as::<_, DatedProject>(
            "SELECT id, name, start_date AS date, pm_user_id FROM projects \
             WHERE status IN ('draft', 'planning', 'active') \
               AND start_date IS NOT NULL AND pm_user_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let trigger = Trigger::ProjectStart;
        for project in projects {
            let days = days_until(project.date, self.today);
            if !trigger.fires_on(days) {
                continue;
            }
            let reminder = Reminder {
                trigger,
                days,
                title: project_start_title(&project.name, days),
                message: format!(
                    "Das Projekt \"{}\" startet am {}.",
                    project.name,
                    format_date(project.date)
                ),
                action_url: format!("/dashboard/projects/{}", project.id),
                data: json!({
                    "project_id": project.id,
                    "project_name": project.name,
                    "start_date": project.date,
                    "days_until": days,
                }),
            };
            self.deliver(project.pm_user_id, &reminder, stats).await;
        }
        Ok(())
    }

    async fn project_end(&self, stats: &mut TriggerStats) -> Result<()> {
        let projects = sqlx::query_as::<_, DatedProject>(
            "SELECT id, name, end_date_plan AS date, pm_user_id FROM projects \
             WHERE status = 'active' \
               AND end_date_plan IS NOT NULL AND pm_user_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let trigger = Trigger::ProjectEnd;
        for project in projects {
            let days = days_until(project.date, self.today);
            if !trigger.fires_on(days) {
                continue;
            }
            let reminder = Reminder {
                trigger,
                days,
                title: project_end_title(&project.name, days),
                message: format!(
                    "Die geplante Fertigstellung für \"{}\" ist am {}.",
                    project.name,
                    format_date(project.date)
                ),
                action_url: format!("/dashboard/projects/{}", project.id),
                data: json!({
                    "project_id": project.id,
                    "project_name": project.name,
                    "end_date": project.date,
                    "days_until": days,
                }),
            };
            self.deliver(project.pm_user_id, &reminder, stats).await;
        }
        Ok(())
    }

    async fn material_delivery(&self, stats: &mut TriggerStats) -> Result<()> {
        let orders = sqlx::query_as::<_, PendingDelivery>(
            "SELECT o.id, o.expected_delivery_date, o.supplier, p.pm_user_id \
             FROM material_orders o JOIN projects p ON p.id = o.project_id \
             WHERE o.status IN ('ordered', 'confirmed') \
               AND o.expected_delivery_date IS NOT NULL AND p.pm_user_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let trigger = Trigger::MaterialDelivery;
        for order in orders {
            let days = days_until(order.expected_delivery_date, self.today);
            if !trigger.fires_on(days) {
                continue;
            }
            let supplier = order.supplier.as_deref().unwrap_or("Lieferant");
            let date = format_date(order.expected_delivery_date);
            let message = match days {
                d if d < 0 => format!(
                    "Die Lieferung von {} ist überfällig (geplant: {}).",
                    supplier, date
                ),
                0 => format!("Materiallieferung von {} wird heute erwartet.", supplier),
                _ => format!("Materiallieferung von {} geplant für {}.", supplier, date),
            };
            let reminder = Reminder {
                trigger,
                days,
                title: delivery_title(order.id, days),
                message,
                action_url: "/dashboard/materials/orders".to_string(),
                data: json!({
                    "order_id": order.id,
                    "delivery_date": order.expected_delivery_date,
                    "supplier_name": order.supplier,
                    "days_until": days,
                }),
            };
            self.deliver(order.pm_user_id, &reminder, stats).await;
        }
        Ok(())
    }

    async fn vehicle_documents(&self, stats: &mut TriggerStats) -> Result<()> {
        let documents = sqlx::query_as::<_, ExpiringDocument>(
            "SELECT d.id, d.vehicle_id, d.document_type, d.expiry_date, v.plate_number \
             FROM vehicle_documents d LEFT JOIN vehicles v ON v.id = d.vehicle_id \
             WHERE d.expiry_date IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let due: Vec<(ExpiringDocument, i64)> = documents
            .into_iter()
            .map(|doc| {
                let days = days_until(doc.expiry_date, self.today);
                (doc, days)
            })
            .filter(|(_, days)| Trigger::VehicleDocument.fires_on(*days))
            .collect();
        if due.is_empty() {
            return Ok(());
        }

        let admins = self.admins().await?;
        if admins.is_empty() {
            tracing::warn!("⚠️ {} vehicle documents due but no active admin to notify", due.len());
            return Ok(());
        }

        for (doc, days) in due {
            let plate = doc.plate_number.as_deref().unwrap_or("Unbekanntes Fahrzeug");
            let reminder = Reminder {
                trigger: Trigger::VehicleDocument,
                days,
                title: vehicle_document_title(&doc.document_type, plate, days),
                message: format!(
                    "Fahrzeug {}: {} läuft am {} ab.",
                    plate,
                    doc.document_type,
                    format_date(doc.expiry_date)
                ),
                action_url: "/dashboard/vehicles".to_string(),
                data: json!({
                    "document_id": doc.id,
                    "vehicle_id": doc.vehicle_id,
                    "document_type": doc.document_type,
                    "expiration_date": doc.expiry_date,
                    "days_until": days,
                }),
            };
            for admin in &admins {
                self.deliver(*admin, &reminder, stats).await;
            }
        }
        Ok(())
    }
    async fn equipment_documents(&self, stats: &mut TriggerStats) -> Result<()> {
        let documents = sqlx::query_as::<_, ExpiringEquipmentDocument>(
            "SELECT d.id, d.equipment_id, d.document_type, d.document_name, d.expiry_date, \
                e.name AS equipment_name \
             FROM equipment_documents d LEFT JOIN equipment e ON e.id = d.equipment_id \
             WHERE d.is_active AND d.expiry_date IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let trigger = Trigger::EquipmentDocument;
        let due: Vec<(ExpiringEquipmentDocument, i64)> = documents
            .into_iter()
            .map(|doc| {
                let days = days_until(doc.expiry_date, self.today);
                (doc, days)
            })
            .filter(|(_, days)| trigger.fires_on(*days))
            .collect();
        if due.is_empty() {
            return Ok(());
        }

        let admins = self.admins().await?;
        if admins.is_empty() {
            tracing::warn!("⚠️ {} equipment documents due but no active admin to notify", due.len());
            return Ok(());
        }

        for (doc, days) in due {
            let equipment = doc.equipment_name.as_deref().unwrap_or("Unbekanntes Gerät");
            let reminder = Reminder {
                trigger,
                days,
                title: equipment_document_title(&doc.document_type, &doc.document_name, days),
                message: format!(
                    "{}: {} ({}) läuft am {} ab.",
                    equipment,
                    doc.document_type,
                    doc.document_name,
                    format_date(doc.expiry_date)
                ),
                action_url: "/dashboard/equipment".to_string(),
                data: json!({
                    "document_id": doc.id,
                    "equipment_id": doc.equipment_id,
                    "document_type": doc.document_type,
                    "expiration_date": doc.expiry_date,
                    "days_until": days,
                }),
            };
            for admin in &admins {
                self.deliver(*admin, &reminder, stats).await;
            }
        }
        Ok(())
    }

    async fn maintenance(&self, stats: &mut TriggerStats) -> Result<()> {
        let schedules = sqlx::query_as::<_, DueMaintenance>(
            "SELECT s.id, s.equipment_id, s.maintenance_type, s.next_due_date, e.name AS equipment_name \
             FROM equipment_maintenance_schedules s LEFT JOIN equipment e ON e.id = s.equipment_id \
             WHERE s.is_active AND s.next_due_date IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let trigger = Trigger::Maintenance;
        // overdue schedules keep reminding until serviced
        let due: Vec<(DueMaintenance, i64)> = schedules
            .into_iter()
            .map(|schedule| {
                let days = days_until(schedule.next_due_date, self.today);
                (schedule, days)
            })
            .filter(|(_, days)| *days < 0 || trigger.fires_on(*days))
            .collect();
        if due.is_empty() {
            return Ok(());
        }

        let admins = self.admins().await?;
        if admins.is_empty() {
            tracing::warn!("⚠️ {} maintenance schedules due but no active admin to notify", due.len());
            return Ok(());
        }

        for (schedule, days) in due {
            let equipment = schedule.equipment_name.as_deref().unwrap_or("Unbekanntes Gerät");
            let reminder = Reminder {
                trigger,
                days,
                title: maintenance_title(equipment, days),
                message: format!(
                    "{} für {} ist am {} fällig.",
                    schedule.maintenance_type,
                    equipment,
                    format_date(schedule.next_due_date)
                ),
                action_url: "/dashboard/equipment".to_string(),
                data: json!({
                    "schedule_id": schedule.id,
                    "equipment_id": schedule.equipment_id,
                    "maintenance_type": schedule.maintenance_type,
                    "due_date": schedule.next_due_date,
                    "days_until": days,
                }),
            };
            for admin in &admins {
                self.deliver(*admin, &reminder, stats).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn days_until_counts_calendar_days() {
        let today = date(2024, 2, 27);
        assert_eq!(days_until(date(2024, 3, 1), today), 3);
        assert_eq!(days_until(today, today), 0);
        assert_eq!(days_until(date(2024, 2, 26), today), -1);
    }

    #[test]
    fn milestones_fire_only_on_listed_days() {
        assert!(Trigger::ProjectStart.fires_on(7));
        assert!(!Trigger::ProjectStart.fires_on(5));
        assert!(Trigger::ProjectEnd.fires_on(30));
        assert!(Trigger::MaterialDelivery.fires_on(-1));
        assert!(!Trigger::MaterialDelivery.fires_on(-2));
        assert!(Trigger::VehicleDocument.fires_on(90));
        assert!(!Trigger::VehicleDocument.fires_on(-1));
    }

    #[test]
    fn priority_escalates_as_dates_approach() {
        assert_eq!(Trigger::ProjectStart.priority(7), "normal");
        assert_eq!(Trigger::ProjectStart.priority(3), "high");
        assert_eq!(Trigger::ProjectStart.priority(1), "urgent");

        assert_eq!(Trigger::ProjectEnd.priority(14), "normal");
        assert_eq!(Trigger::ProjectEnd.priority(7), "high");
        assert_eq!(Trigger::ProjectEnd.priority(3), "urgent");

        assert_eq!(Trigger::MaterialDelivery.priority(3), "normal");
        assert_eq!(Trigger::MaterialDelivery.priority(1), "high");
        assert_eq!(Trigger::MaterialDelivery.priority(-1), "urgent");

        assert_eq!(Trigger::VehicleDocument.priority(30), "normal");
        assert_eq!(Trigger::VehicleDocument.priority(7), "high");
        assert_eq!(Trigger::VehicleDocument.priority(-3), "urgent");

        assert_eq!(Trigger::EquipmentDocument.priority(14), "normal");
        assert_eq!(Trigger::EquipmentDocument.priority(7), "high");
        assert_eq!(Trigger::EquipmentDocument.priority(-1), "urgent");

        assert_eq!(Trigger::Maintenance.priority(7), "normal");
        assert_eq!(Trigger::Maintenance.priority(3), "high");
        assert_eq!(Trigger::Maintenance.priority(0), "high");
        assert_eq!(Trigger::Maintenance.priority(-2), "urgent");
    }

    #[test]
    fn equipment_triggers_share_document_and_maintenance_types() {
        assert_eq!(Trigger::EquipmentDocument.notification_type(), "document_expiration");
        assert_eq!(Trigger::Maintenance.notification_type(), "maintenance_due");
        assert!(Trigger::EquipmentDocument.fires_on(90));
        assert!(Trigger::Maintenance.fires_on(30));
        assert!(!Trigger::Maintenance.fires_on(90));
        assert_eq!(Trigger::ALL.len(), 6);
    }

    #[test]
    fn equipment_titles_are_german() {
        assert_eq!(
            equipment_document_title("UVV-Prüfung", "uvv.pdf", -4),
            "Abgelaufenes Dokument: UVV-Prüfung (uvv.pdf)"
        );
        assert_eq!(
            equipment_document_title("UVV-Prüfung", "uvv.pdf", 0),
            "Dokument läuft heute ab: UVV-Prüfung"
        );
        assert_eq!(
            equipment_document_title("UVV-Prüfung", "uvv.pdf", 14),
            "Dokument läuft in 14 Tagen ab: UVV-Prüfung"
        );
        assert_eq!(maintenance_title("Minibagger", -1), "Überfällige Wartung: Minibagger");
        assert_eq!(maintenance_title("Minibagger", 0), "Wartung heute fällig: Minibagger");
        assert_eq!(maintenance_title("Minibagger", 7), "Wartung in 7 Tagen: Minibagger");
    }

    #[test]
    fn titles_distinguish_today_future_and_overdue() {
        assert_eq!(project_start_title("Nordring", 0), "Projekt startet heute: Nordring");
        assert_eq!(
            project_start_title("Nordring", 3),
            "Projekt startet in 3 Tagen: Nordring"
        );
        assert_eq!(project_end_title("Nordring", 0), "Projekt endet heute: Nordring");
        assert_eq!(project_end_title("Nordring", 14), "Projekt endet in 14 Tagen: Nordring");

        let order = Uuid::parse_str("1a2b3c4d-0000-4000-8000-000000000000").unwrap();
        assert_eq!(delivery_title(order, -1), "Überfällige Lieferung (Bestellung #1a2b3c4d)");
        assert_eq!(delivery_title(order, 0), "Lieferung heute (Bestellung #1a2b3c4d)");
        assert_eq!(delivery_title(order, 7), "Lieferung in 7 Tagen (Bestellung #1a2b3c4d)");

        assert_eq!(
            vehicle_document_title("TÜV", "B-CM 123", 30),
            "Dokument läuft in 30 Tagen ab: TÜV (B-CM 123)"
        );
        assert_eq!(
            vehicle_document_title("TÜV", "B-CM 123", 0),
            "Dokument läuft heute ab: TÜV (B-CM 123)"
        );
    }

    #[test]
    fn totals_sum_every_trigger() {
        let report = ReminderReport {
            timestamp: Utc::now(),
            triggers: vec![
                TriggerReport {
                    name: Trigger::ProjectStart.name(),
                    stats: TriggerStats { total: 3, created: 2, skipped: 1, failed: 0 },
                    error: None,
                },
                TriggerReport {
                    name: Trigger::VehicleDocument.name(),
                    stats: TriggerStats { total: 4, created: 1, skipped: 2, failed: 1 },
                    error: Some("boom".into()),
                },
            ],
            execution_time_ms: 12,
        };
        assert_eq!(
            report.totals(),
            TriggerStats { total: 7, created: 3, skipped: 3, failed: 1 }
        );

        let body = serde_json::to_value(&report).unwrap();
        assert!(body["triggers"][0].get("error").is_none());
        assert_eq!(body["triggers"][1]["error"], "boom");
    }

    #[test]
    fn reminder_maps_onto_notification_payload() {
        let reminder = Reminder {
            trigger: Trigger::MaterialDelivery,
            days: 0,
            title: "Lieferung heute (Bestellung #1a2b3c4d)".into(),
            message: "Materiallieferung von Lieferant wird heute erwartet.".into(),
            action_url: "/dashboard/materials/orders".into(),
            data: json!({ "days_until": 0 }),
        };
        let user = Uuid::new_v4();
        let new = reminder.to_new(user);
        assert_eq!(new.user_id, Some(user));
        assert_eq!(new.priority.as_deref(), Some("high"));
        assert_eq!(new.notification_type.as_deref(), Some("material_delivery"));
        assert_eq!(new.data, Some(json!({ "days_until": 0 })));
    }
}
