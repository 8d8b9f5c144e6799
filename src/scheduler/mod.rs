/// Background notification scheduler
///
/// Runs the reminder pass on a cron schedule with tokio-cron-scheduler. The
/// same pass is reachable over HTTP at `/api/cron/notifications` for
/// deployments that drive it externally.

pub mod reminders;

use crate::{config::SchedulerConfig, db::Database};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};

pub struct NotificationScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    db: Database,
    schedule: String,
}

impl NotificationScheduler {
    pub async fn new(config: &SchedulerConfig, db: Database) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            db,
            schedule: config.notification_schedule.clone(),
        })
    }

    /// Register the reminder job and start ticking
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting notification scheduler ({})", self.schedule);

        let db = self.db.clone();
        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _l| {
            let db = db.clone();

            Box::pin(async move {
                tracing::debug!("🔔 Reminder job triggered");
                match reminders::run(&db).await {
                    Ok(report) => {
                        tracing::info!(
                            "✅ Scheduled reminder run created {} notifications",
                            report.totals().created
                        );
                    }
                    Err(e) => {
                        tracing::error!("❌ Scheduled reminder run failed: {:#}", e);
                    }
                }
            })
        })
        .map_err(|e| anyhow::anyhow!("Invalid notification schedule '{}': {}", self.schedule, e))?;

        {
            let scheduler = self.scheduler.write().await;
            scheduler.add(job).await?;
            scheduler.start().await?;
        }

        tracing::info!("✅ Notification scheduler started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping notification scheduler");
        {
            let mut scheduler = self.scheduler.write().await;
            scheduler.shutdown().await?;
        }
        tracing::info!("✅ Notification scheduler stopped");
        Ok(())
    }
}
