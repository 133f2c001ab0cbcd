use async_trait::async_trait;
use chrono::Utc;

use crate::{
    alerts::{Notifier, SendOutcome},
    jobs::{alert_delivery_payload, JOB_SEND_ALERT_EMAIL},
    models::Job,
};

use super::{JobExecution, JobHandler};

/// Runs one delivery attempt per reserved `send-alert-email` job.
pub struct SendAlertEmailJob;

#[async_trait]
impl JobHandler for SendAlertEmailJob {
    fn job_type(&self) -> &'static str {
        JOB_SEND_ALERT_EMAIL
    }

    async fn handle(&self, notifier: &Notifier, job: &Job) -> JobExecution {
        let payload = match alert_delivery_payload(job) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: err.to_string(),
                }
            }
        };

        let outcome = notifier
            .send_alert(payload.alert_id, job.attempts, Utc::now().naive_utc())
            .await;
        execution_for(outcome)
    }
}

/// Maps a delivery outcome onto the job queue. Only transient delivery
/// failures are retried.
pub fn execution_for(outcome: SendOutcome) -> JobExecution {
    match outcome {
        SendOutcome::Sent { .. }
        | SendOutcome::AlreadySent
        | SendOutcome::EmailDisabled
        | SendOutcome::NoRecipient => JobExecution::Success,
        SendOutcome::NotFound => JobExecution::Failed {
            error: "alert not found".into(),
        },
        SendOutcome::Failed {
            error,
            retry_in: Some(delay),
        } => JobExecution::Retry { delay, error },
        SendOutcome::Failed {
            error,
            retry_in: None,
        } => JobExecution::Failed { error },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn settled_outcomes_complete_the_job() {
        assert_eq!(
            execution_for(SendOutcome::Sent {
                recipient: "a@b.cl".into()
            }),
            JobExecution::Success
        );
        assert_eq!(execution_for(SendOutcome::AlreadySent), JobExecution::Success);
        assert_eq!(execution_for(SendOutcome::NoRecipient), JobExecution::Success);
        assert_eq!(execution_for(SendOutcome::EmailDisabled), JobExecution::Success);
    }

    #[test]
    fn failures_retry_until_budget_is_spent() {
        let retry = execution_for(SendOutcome::Failed {
            error: "relay down".into(),
            retry_in: Some(Duration::from_secs(300)),
        });
        assert_eq!(
            retry,
            JobExecution::Retry {
                delay: Duration::from_secs(300),
                error: "relay down".into()
            }
        );
        let terminal = execution_for(SendOutcome::Failed {
            error: "relay down".into(),
            retry_in: None,
        });
        assert!(matches!(terminal, JobExecution::Failed { .. }));
        assert!(matches!(
            execution_for(SendOutcome::NotFound),
            JobExecution::Failed { .. }
        ));
    }
}
