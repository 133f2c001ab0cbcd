//! Periodic alert tasks. Each task runs its diesel work on the blocking pool
//! and logs what it did; a failing run is logged and retried on the next tick.

use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::alerts::{
    create_due_date_alerts, dispatch_pending_alerts, purge_old_alerts, refresh_urgency_flags,
    AlertSettings,
};
use crate::config::ScheduleConfig;
use crate::db::{with_connection, PgPool};
use crate::jobs::purge_finished_jobs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicTask {
    CreateDueAlerts,
    DispatchAlerts,
    RefreshUrgency,
    Purge,
}

impl PeriodicTask {
    pub const ALL: &'static [PeriodicTask] = &[
        PeriodicTask::CreateDueAlerts,
        PeriodicTask::DispatchAlerts,
        PeriodicTask::RefreshUrgency,
        PeriodicTask::Purge,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PeriodicTask::CreateDueAlerts => "create-alerts",
            PeriodicTask::DispatchAlerts => "dispatch-alerts",
            PeriodicTask::RefreshUrgency => "refresh-urgency",
            PeriodicTask::Purge => "purge-alerts",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|task| task.name() == name)
    }

    pub fn period(self, schedule: &ScheduleConfig) -> Duration {
        match self {
            PeriodicTask::CreateDueAlerts => schedule.create_alerts_every,
            PeriodicTask::DispatchAlerts => schedule.dispatch_every,
            PeriodicTask::RefreshUrgency => schedule.refresh_urgency_every,
            PeriodicTask::Purge => schedule.purge_every,
        }
    }
}

/// Runs one task to completion against the pool.
pub async fn run_task(pool: &PgPool, settings: &AlertSettings, task: PeriodicTask) -> Result<()> {
    let settings = settings.clone();
    let now = Utc::now().naive_utc();
    match task {
        PeriodicTask::CreateDueAlerts => {
            let report = with_connection(pool, move |conn| {
                Ok(create_due_date_alerts(conn, &settings, now)?)
            })
            .await?;
            info!(
                task = task.name(),
                created = report.created,
                skipped = report.skipped,
                failed = report.failures.len(),
                "task finished"
            );
        }
        PeriodicTask::DispatchAlerts => {
            let report =
                with_connection(pool, move |conn| Ok(dispatch_pending_alerts(conn, now)?)).await?;
            info!(
                task = task.name(),
                enqueued = report.enqueued,
                skipped = report.skipped,
                failed = report.failures.len(),
                "task finished"
            );
        }
        PeriodicTask::RefreshUrgency => {
            let changed =
                with_connection(pool, move |conn| Ok(refresh_urgency_flags(conn, now.date())?))
                    .await?;
            info!(task = task.name(), changed, "task finished");
        }
        PeriodicTask::Purge => {
            let retention_days = settings.retention_days;
            let (alerts, jobs) = with_connection(pool, move |conn| {
                let alerts = purge_old_alerts(conn, retention_days, now)?;
                let jobs = purge_finished_jobs(conn, now - ChronoDuration::days(retention_days))?;
                Ok((alerts, jobs))
            })
            .await?;
            info!(task = task.name(), alerts, jobs, "task finished");
        }
    }
    Ok(())
}

pub struct Scheduler {
    pool: PgPool,
    settings: AlertSettings,
    schedule: ScheduleConfig,
}

impl Scheduler {
    pub fn new(pool: PgPool, settings: AlertSettings, schedule: ScheduleConfig) -> Self {
        Self {
            pool,
            settings,
            schedule,
        }
    }

    /// Drives every task on its own interval until the future is dropped.
    /// Each interval fires immediately on start.
    pub async fn run(&self) {
        info!(
            dispatch_secs = self.schedule.dispatch_every.as_secs(),
            create_alerts_secs = self.schedule.create_alerts_every.as_secs(),
            refresh_urgency_secs = self.schedule.refresh_urgency_every.as_secs(),
            purge_secs = self.schedule.purge_every.as_secs(),
            "scheduler started"
        );
        tokio::join!(
            self.run_every(PeriodicTask::CreateDueAlerts),
            self.run_every(PeriodicTask::DispatchAlerts),
            self.run_every(PeriodicTask::RefreshUrgency),
            self.run_every(PeriodicTask::Purge),
        );
    }

    async fn run_every(&self, task: PeriodicTask) {
        // tokio panics on a zero period.
        let mut ticker = interval(task.period(&self.schedule).max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = run_task(&self.pool, &self.settings, task).await {
                error!(task = task.name(), error = %err, "scheduled task failed");
            }
        }
    }
}
