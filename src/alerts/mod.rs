//! Alert lifecycle: creation from due dates, dispatch to the job queue,
//! delivery, read/resend bookkeeping and purging.

pub mod delivery;
pub mod lifecycle;
pub mod message;
pub mod settings;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::jobs::JobQueueError;
use crate::validation::ValidationError;

pub use delivery::{Notifier, SendOutcome};
pub use lifecycle::{
    create_due_alerts_for_cases, create_due_date_alerts, create_manual_alert,
    dispatch_pending_alerts, mark_alerts_sent, mark_read, on_case_created, purge_old_alerts,
    refresh_urgency_flags, resend_alert, update_alert_delivery, CaseCreatedEffects, DeliveryUpdate,
    ManualAlert,
};
pub use settings::AlertSettings;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("record not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Queue(#[from] JobQueueError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchFailure {
    pub id: Uuid,
    pub error: String,
}

/// Outcome of a batch operation. A failing item is recorded and the batch
/// carries on with the rest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub created: usize,
    pub skipped: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub(crate) fn fail(&mut self, id: Uuid, error: impl ToString) {
        self.failures.push(BatchFailure {
            id,
            error: error.to_string(),
        });
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub enqueued: usize,
    pub skipped: usize,
    pub failures: Vec<BatchFailure>,
}
