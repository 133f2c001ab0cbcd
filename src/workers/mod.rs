use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    alerts::Notifier,
    db::with_connection,
    jobs::{mark_job_failed, mark_job_succeeded, reserve_job, retry_job_after},
    models::Job,
};

pub mod send_alert;

#[derive(Debug, PartialEq, Eq)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, notifier: &Notifier, job: &Job) -> JobExecution;
}

/// Polls the job queue and runs one job at a time. Several workers may run
/// side by side; the queue hands each job to one of them.
pub struct Worker {
    notifier: Arc<Notifier>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        notifier: Arc<Notifier>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            notifier,
            handlers,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!(
            job_types = ?self.handlers.keys().collect::<Vec<_>>(),
            poll_secs = self.poll_interval.as_secs(),
            "worker started"
        );
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Reserves and runs at most one job. Returns whether a job was found.
    pub async fn tick(&self) -> anyhow::Result<bool> {
        let job_types: Vec<&'static str> = self.handlers.keys().copied().collect();
        if job_types.is_empty() {
            return Ok(false);
        }

        let reserved = with_connection(self.notifier.pool(), move |conn| {
            Ok(reserve_job(conn, &job_types, Utc::now().naive_utc())?)
        })
        .await?;
        let Some(job) = reserved else {
            return Ok(false);
        };

        let execution = match self.handlers.get(job.job_type.as_str()) {
            Some(handler) => handler.handle(&self.notifier, &job).await,
            None => {
                error!(job_type = %job.job_type, "no handler registered for job type");
                JobExecution::Failed {
                    error: "no handler registered".into(),
                }
            }
        };
        self.finish(job, execution).await?;
        Ok(true)
    }

    async fn finish(&self, job: Job, execution: JobExecution) -> anyhow::Result<()> {
        match &execution {
            JobExecution::Success => {
                info!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, "job completed");
            }
            JobExecution::Retry { error, .. } => {
                warn!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, %error, "job will retry");
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, %error, "job failed");
            }
        }

        with_connection(self.notifier.pool(), move |conn| {
            let now = Utc::now().naive_utc();
            match execution {
                JobExecution::Success => mark_job_succeeded(conn, job.id, now)?,
                JobExecution::Retry { delay, error } => {
                    retry_job_after(conn, job.id, delay, &error, now)?
                }
                JobExecution::Failed { error } => mark_job_failed(conn, job.id, &error, now)?,
            }
            Ok(())
        })
        .await
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![Arc::new(send_alert::SendAlertEmailJob)]
}
