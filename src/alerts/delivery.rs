use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{with_connection, PgPool};
use crate::mailer::Mailer;
use crate::models::Alert;
use crate::urgency::days_until_due;

use super::AlertSettings;

use super::lifecycle::{load_delivery_context, mark_sent, record_delivery_problem};
use super::message::render_alert_email;

pub const NO_RECIPIENT_ERROR: &str = "no recipient email address";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { recipient: String },
    AlreadySent,
    /// Email was switched off after the alert was dispatched.
    EmailDisabled,
    NotFound,
    /// Nobody to address the email to. The alert stays pending.
    NoRecipient,
    /// `retry_in` is `None` once the retry budget is exhausted.
    Failed {
        error: String,
        retry_in: Option<Duration>,
    },
}

/// Explicit recipient of the alert, else the responsible user's address.
pub fn resolve_recipient(alert: &Alert, responsible_email: Option<&str>) -> Option<String> {
    fn usable(email: &str) -> Option<&str> {
        Some(email.trim()).filter(|email| !email.is_empty())
    }

    alert
        .recipient_email
        .as_deref()
        .and_then(usable)
        .or_else(|| responsible_email.and_then(usable))
        .map(str::to_string)
}

/// What a delivery attempt touches: the database, the outbound mail channel
/// and the alert settings. Shared by the worker and the maintenance tools.
#[derive(Clone)]
pub struct Notifier {
    pool: PgPool,
    mailer: Arc<dyn Mailer>,
    settings: AlertSettings,
    public_base_url: Option<String>,
}

impl Notifier {
    pub fn new(
        pool: PgPool,
        mailer: Arc<dyn Mailer>,
        settings: AlertSettings,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            pool,
            mailer,
            settings,
            public_base_url,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// One delivery attempt. `attempt` counts this attempt, starting at 1.
    pub async fn send_alert(&self, alert_id: Uuid, attempt: i32, now: NaiveDateTime) -> SendOutcome {
        send_alert(self, alert_id, attempt, now).await
    }
}

async fn send_alert(
    notifier: &Notifier,
    alert_id: Uuid,
    attempt: i32,
    now: NaiveDateTime,
) -> SendOutcome {
    let settings = &notifier.settings;
    let pool = &notifier.pool;

    let context = match with_connection(pool, move |conn| {
        Ok(load_delivery_context(conn, alert_id)?)
    })
    .await
    {
        Ok(Some(context)) => context,
        Ok(None) => {
            warn!(%alert_id, "alert no longer exists");
            return SendOutcome::NotFound;
        }
        Err(err) => {
            return SendOutcome::Failed {
                error: format!("failed to load alert: {err}"),
                retry_in: settings.retry_delay(attempt),
            }
        }
    };

    if context.alert.sent {
        info!(%alert_id, "alert already sent");
        return SendOutcome::AlreadySent;
    }
    if !context.alert.send_email {
        info!(%alert_id, "email disabled for alert; skipping delivery");
        return SendOutcome::EmailDisabled;
    }

    let Some(recipient) =
        resolve_recipient(&context.alert, context.responsible_email.as_deref())
    else {
        warn!(%alert_id, "alert has no recipient; leaving it pending");
        if let Err(err) = with_connection(pool, move |conn| {
            Ok(record_delivery_problem(conn, alert_id, NO_RECIPIENT_ERROR, false)?)
        })
        .await
        {
            error!(%alert_id, error = %err, "failed to record missing recipient");
        }
        return SendOutcome::NoRecipient;
    };

    let days = days_until_due(Some(context.case.due_on), now.date()).unwrap_or_default();
    let email = render_alert_email(
        &context.alert,
        &context.case,
        days,
        notifier.public_base_url.as_deref(),
    );

    if let Err(err) = notifier
        .mailer
        .send(&recipient, &email.subject, &email.html, &email.text)
        .await
    {
        let message = format!("delivery to {recipient} failed: {err:#}");
        let retry_in = settings.retry_delay(attempt);
        let release = retry_in.is_none();
        let stored = message.clone();
        if let Err(record_err) = with_connection(pool, move |conn| {
            Ok(record_delivery_problem(conn, alert_id, &stored, release)?)
        })
        .await
        {
            error!(%alert_id, error = %record_err, "failed to record delivery failure");
        }
        if release {
            error!(%alert_id, attempt, error = %message, "alert delivery gave up");
        } else {
            warn!(%alert_id, attempt, error = %message, "alert delivery failed; will retry");
        }
        return SendOutcome::Failed {
            error: message,
            retry_in,
        };
    }

    match with_connection(pool, move |conn| Ok(mark_sent(conn, alert_id, now)?)).await {
        Ok(true) => {
            info!(%alert_id, %recipient, "alert email sent");
            SendOutcome::Sent { recipient }
        }
        Ok(false) => {
            info!(%alert_id, "alert was marked sent concurrently");
            SendOutcome::AlreadySent
        }
        Err(err) => {
            // The mail went out; retrying would send it twice.
            error!(%alert_id, error = %err, "email sent but alert could not be marked sent");
            SendOutcome::Failed {
                error: format!("failed to mark alert sent: {err}"),
                retry_in: None,
            }
        }
    }
}
