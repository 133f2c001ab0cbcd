use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::Actor;
use crate::domain::{AlertType, CaseStatus};
use crate::jobs::{alert_delivery_in_flight, enqueue_alert_delivery, JobQueueError};
use crate::models::{Alert, Case, Movement, NewAlert, NewMovement};
use crate::schema::{alerts, cases, movements, users};
use crate::urgency::{days_until_due, URGENT_WITHIN_DAYS};
use crate::validation::{optional_email, required_text, validate_fire_at};

use super::message::{case_created_movement, due_alert_message};
use super::{
    AlertSettings, BatchFailure, BatchReport, DispatchReport, LifecycleError, LifecycleResult,
};

const MAX_MESSAGE_CHARS: usize = 2000;

/// Creates a `VENCIMIENTO` alert for the case unless one was created within
/// the duplicate window. Returns `None` when suppressed.
///
/// The existence check and the insert are not serialized against other
/// writers, so two concurrent scans may both insert.
fn insert_due_alert_unless_recent(
    conn: &mut PgConnection,
    case: &Case,
    recipient_email: Option<String>,
    created_by: Uuid,
    fire_at: NaiveDateTime,
    settings: &AlertSettings,
    now: NaiveDateTime,
) -> QueryResult<Option<Alert>> {
    let days = days_until_due(Some(case.due_on), now.date()).unwrap_or_default();
    conn.transaction(|conn| {
        let since = now - settings.duplicate_window();
        let recent: i64 = alerts::table
            .filter(alerts::case_id.eq(case.id))
            .filter(alerts::alert_type.eq(AlertType::Vencimiento.as_str()))
            .filter(alerts::created_at.ge(since))
            .count()
            .get_result(conn)?;
        if recent > 0 {
            return Ok(None);
        }

        let new_alert = NewAlert {
            id: Uuid::new_v4(),
            case_id: case.id,
            alert_type: AlertType::Vencimiento.as_str().to_string(),
            message: due_alert_message(case, days),
            fire_at,
            send_email: settings.send_email,
            recipient_email,
            created_by,
            created_at: now,
        };
        diesel::insert_into(alerts::table)
            .values(&new_alert)
            .get_result::<Alert>(conn)
            .map(Some)
    })
}

/// Daily scan: one alert per in-process case due exactly
/// `anticipation_days` from today.
pub fn create_due_date_alerts(
    conn: &mut PgConnection,
    settings: &AlertSettings,
    now: NaiveDateTime,
) -> LifecycleResult<BatchReport> {
    let target = now.date() + ChronoDuration::days(settings.anticipation_days);
    let candidates: Vec<(Case, Option<String>)> = cases::table
        .inner_join(users::table)
        .filter(cases::status.eq(CaseStatus::InProcess.as_str()))
        .filter(cases::due_on.eq(target))
        .select((cases::all_columns, users::email))
        .load(conn)?;

    let fire_at = settings.scan_fire_at(now);
    let mut report = BatchReport::default();
    for (case, email) in candidates {
        match insert_due_alert_unless_recent(
            conn,
            &case,
            email,
            case.responsible_id,
            fire_at,
            settings,
            now,
        ) {
            Ok(Some(alert)) => {
                debug!(alert_id = %alert.id, case_id = %case.id, rol = %case.rol, "created due-date alert");
                report.created += 1;
            }
            Ok(None) => report.skipped += 1,
            Err(err) => {
                warn!(case_id = %case.id, error = %err, "failed to create due-date alert");
                report.fail(case.id, err);
            }
        }
    }

    info!(
        created = report.created,
        skipped = report.skipped,
        failed = report.failures.len(),
        due_on = %target,
        "due-date alert scan finished"
    );
    Ok(report)
}

/// Claims every alert that is due for email and enqueues one delivery job
/// per claimed alert. The claim and the enqueue commit together.
pub fn dispatch_pending_alerts(
    conn: &mut PgConnection,
    now: NaiveDateTime,
) -> LifecycleResult<DispatchReport> {
    let due: Vec<Uuid> = alerts::table
        .filter(alerts::sent.eq(false))
        .filter(alerts::send_email.eq(true))
        .filter(alerts::fire_at.le(now))
        .filter(alerts::dispatched_at.is_null())
        .order(alerts::fire_at.asc())
        .select(alerts::id)
        .load(conn)?;

    let mut report = DispatchReport::default();
    for alert_id in due {
        let claimed = conn.transaction(|conn| -> Result<bool, JobQueueError> {
            let rows = diesel::update(
                alerts::table
                    .find(alert_id)
                    .filter(alerts::sent.eq(false))
                    .filter(alerts::dispatched_at.is_null()),
            )
            .set(alerts::dispatched_at.eq(now))
            .execute(conn)?;
            if rows == 0 {
                return Ok(false);
            }
            enqueue_alert_delivery(conn, alert_id, now)?;
            Ok(true)
        });

        match claimed {
            Ok(true) => report.enqueued += 1,
            Ok(false) => report.skipped += 1,
            Err(err) => {
                warn!(%alert_id, error = %err, "failed to dispatch alert");
                report.failures.push(BatchFailure {
                    id: alert_id,
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        enqueued = report.enqueued,
        skipped = report.skipped,
        failed = report.failures.len(),
        "dispatched pending alerts"
    );
    Ok(report)
}

/// Deletes sent alerts older than the retention period.
pub fn purge_old_alerts(
    conn: &mut PgConnection,
    retention_days: i64,
    now: NaiveDateTime,
) -> QueryResult<usize> {
    let cutoff = now - ChronoDuration::days(retention_days);
    let removed = diesel::delete(
        alerts::table
            .filter(alerts::sent.eq(true))
            .filter(alerts::sent_at.lt(cutoff)),
    )
    .execute(conn)?;
    info!(removed, %cutoff, "purged old alerts");
    Ok(removed)
}

/// Recomputes the stored `urgent` flag of every case against `today`.
pub fn refresh_urgency_flags(conn: &mut PgConnection, today: NaiveDate) -> QueryResult<usize> {
    let threshold = today + ChronoDuration::days(URGENT_WITHIN_DAYS);
    conn.transaction(|conn| {
        let raised = diesel::update(
            cases::table
                .filter(cases::due_on.le(threshold))
                .filter(cases::urgent.eq(false)),
        )
        .set(cases::urgent.eq(true))
        .execute(conn)?;
        let lowered = diesel::update(
            cases::table
                .filter(cases::due_on.gt(threshold))
                .filter(cases::urgent.eq(true)),
        )
        .set(cases::urgent.eq(false))
        .execute(conn)?;
        info!(raised, lowered, %today, "refreshed urgency flags");
        Ok(raised + lowered)
    })
}

#[derive(Debug, Clone)]
pub struct CaseCreatedEffects {
    pub movement: Movement,
    pub alert: Option<Alert>,
}

/// Side effects of opening a case. Runs inside the caller's transaction.
pub fn on_case_created(
    conn: &mut PgConnection,
    case: &Case,
    responsible_email: Option<String>,
    settings: &AlertSettings,
    now: NaiveDateTime,
) -> QueryResult<CaseCreatedEffects> {
    let new_movement = NewMovement {
        id: Uuid::new_v4(),
        case_id: case.id,
        occurred_at: now,
        description: case_created_movement(case),
        author_id: case.responsible_id,
        important: true,
    };
    let movement = diesel::insert_into(movements::table)
        .values(&new_movement)
        .get_result::<Movement>(conn)?;

    let due_soon = days_until_due(Some(case.due_on), now.date())
        .is_some_and(|days| days <= URGENT_WITHIN_DAYS);
    let alert = if case.is_in_process() && due_soon {
        insert_due_alert_unless_recent(
            conn,
            case,
            responsible_email,
            case.responsible_id,
            settings.creation_fire_at(now),
            settings,
            now,
        )?
    } else {
        None
    };

    Ok(CaseCreatedEffects { movement, alert })
}

/// Bulk staff action: due-date alerts for the selected cases that fall due
/// within the urgency window.
pub fn create_due_alerts_for_cases(
    conn: &mut PgConnection,
    case_ids: &[Uuid],
    actor: &Actor,
    settings: &AlertSettings,
    now: NaiveDateTime,
) -> LifecycleResult<BatchReport> {
    if !actor.staff {
        return Err(LifecycleError::PermissionDenied);
    }

    let selected: Vec<(Case, Option<String>)> = cases::table
        .inner_join(users::table)
        .filter(cases::id.eq_any(case_ids))
        .select((cases::all_columns, users::email))
        .load(conn)?;

    let fire_at = settings.creation_fire_at(now);
    let mut report = BatchReport::default();
    for (case, email) in selected {
        let in_window = days_until_due(Some(case.due_on), now.date())
            .is_some_and(|days| (0..=URGENT_WITHIN_DAYS).contains(&days));
        if !in_window {
            report.skipped += 1;
            continue;
        }
        match insert_due_alert_unless_recent(
            conn,
            &case,
            email,
            actor.user_id,
            fire_at,
            settings,
            now,
        ) {
            Ok(Some(_)) => report.created += 1,
            Ok(None) => report.skipped += 1,
            Err(err) => {
                warn!(case_id = %case.id, error = %err, "failed to create due-date alert");
                report.fail(case.id, err);
            }
        }
    }
    Ok(report)
}

#[derive(Debug, Clone)]
pub struct ManualAlert {
    pub case_id: Uuid,
    pub alert_type: AlertType,
    pub message: String,
    pub fire_at: NaiveDateTime,
    pub send_email: bool,
    pub recipient_email: Option<String>,
}

pub fn create_manual_alert(
    conn: &mut PgConnection,
    input: ManualAlert,
    actor: &Actor,
    now: NaiveDateTime,
) -> LifecycleResult<Alert> {
    let message = required_text("message", &input.message, MAX_MESSAGE_CHARS)?;
    validate_fire_at(input.fire_at, now)?;
    let recipient = optional_email("recipient_email", input.recipient_email.as_deref())?;

    let (case, responsible_email): (Case, Option<String>) = cases::table
        .inner_join(users::table)
        .filter(cases::id.eq(input.case_id))
        .select((cases::all_columns, users::email))
        .first(conn)
        .optional()?
        .ok_or(LifecycleError::NotFound)?;
    if !actor.can_access(&case) {
        return Err(LifecycleError::NotFound);
    }

    let new_alert = NewAlert {
        id: Uuid::new_v4(),
        case_id: case.id,
        alert_type: input.alert_type.as_str().to_string(),
        message,
        fire_at: input.fire_at,
        send_email: input.send_email,
        recipient_email: recipient.or(responsible_email),
        created_by: actor.user_id,
        created_at: now,
    };
    let alert = diesel::insert_into(alerts::table)
        .values(&new_alert)
        .get_result::<Alert>(conn)?;
    Ok(alert)
}

/// Loads an alert the actor may act on. Alerts of cases outside the
/// actor's reach are reported as `PermissionDenied`.
fn load_for_action(
    conn: &mut PgConnection,
    alert_id: Uuid,
    actor: &Actor,
) -> LifecycleResult<Alert> {
    let (alert, case): (Alert, Case) = alerts::table
        .inner_join(cases::table)
        .filter(alerts::id.eq(alert_id))
        .select((alerts::all_columns, cases::all_columns))
        .first(conn)
        .optional()?
        .ok_or(LifecycleError::NotFound)?;
    if !actor.can_access(&case) {
        return Err(LifecycleError::PermissionDenied);
    }
    Ok(alert)
}

pub fn mark_read(conn: &mut PgConnection, alert_id: Uuid, actor: &Actor) -> LifecycleResult<Alert> {
    let alert = load_for_action(conn, alert_id, actor)?;
    let updated = diesel::update(alerts::table.find(alert.id))
        .set(alerts::read.eq(true))
        .get_result::<Alert>(conn)?;
    Ok(updated)
}

/// Returns a sent alert to pending so the next dispatch delivers it again.
/// While a delivery job for the alert is still live the claim is kept and
/// that job delivers it.
pub fn resend_alert(
    conn: &mut PgConnection,
    alert_id: Uuid,
    actor: &Actor,
) -> LifecycleResult<Alert> {
    let alert = load_for_action(conn, alert_id, actor)?;
    conn.transaction(|conn| -> LifecycleResult<Alert> {
        let release = !alert_delivery_in_flight(conn, alert.id)?;
        let changes = DeliveryChangeset {
            recipient_email: None,
            send_email: None,
            sent: Some(false),
            sent_at: Some(None),
            dispatched_at: release.then_some(None),
            last_error: Some(None),
        };
        let updated = diesel::update(alerts::table.find(alert.id))
            .set(&changes)
            .get_result::<Alert>(conn)?;
        info!(alert_id = %updated.id, released = release, "alert returned to pending");
        Ok(updated)
    })
}

/// Staff bulk action. Only pending alerts change; returns how many did.
pub fn mark_alerts_sent(
    conn: &mut PgConnection,
    alert_ids: &[Uuid],
    actor: &Actor,
    now: NaiveDateTime,
) -> LifecycleResult<usize> {
    if !actor.staff {
        return Err(LifecycleError::PermissionDenied);
    }
    let updated = diesel::update(
        alerts::table
            .filter(alerts::id.eq_any(alert_ids))
            .filter(alerts::sent.eq(false)),
    )
    .set((alerts::sent.eq(true), alerts::sent_at.eq(Some(now))))
    .execute(conn)?;
    Ok(updated)
}

/// Delivery fields a user may correct on an alert. `recipient_email` of
/// `Some(None)` clears the explicit recipient.
#[derive(Debug, Clone, Default)]
pub struct DeliveryUpdate {
    pub recipient_email: Option<Option<String>>,
    pub send_email: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = alerts)]
struct DeliveryChangeset {
    recipient_email: Option<Option<String>>,
    send_email: Option<bool>,
    sent: Option<bool>,
    sent_at: Option<Option<NaiveDateTime>>,
    dispatched_at: Option<Option<NaiveDateTime>>,
    last_error: Option<Option<String>>,
}

/// Fixes the delivery settings of an alert and releases it for the next
/// dispatch. A live delivery job keeps its claim; it reads the new settings
/// on its next attempt.
pub fn update_alert_delivery(
    conn: &mut PgConnection,
    alert_id: Uuid,
    actor: &Actor,
    update: DeliveryUpdate,
) -> LifecycleResult<Alert> {
    let recipient_email = match update.recipient_email {
        Some(raw) => Some(optional_email("recipient_email", raw.as_deref())?),
        None => None,
    };
    let alert = load_for_action(conn, alert_id, actor)?;

    conn.transaction(|conn| -> LifecycleResult<Alert> {
        let release = !alert_delivery_in_flight(conn, alert.id)?;
        let changes = DeliveryChangeset {
            recipient_email,
            send_email: update.send_email,
            sent: None,
            sent_at: None,
            dispatched_at: release.then_some(None),
            last_error: Some(None),
        };
        let updated = diesel::update(alerts::table.find(alert.id))
            .set(&changes)
            .get_result::<Alert>(conn)?;
        Ok(updated)
    })
}

/// Records a successful delivery. Only the first caller flips `sent`; later
/// callers get `false`.
pub(crate) fn mark_sent(
    conn: &mut PgConnection,
    alert_id: Uuid,
    now: NaiveDateTime,
) -> QueryResult<bool> {
    let rows = diesel::update(
        alerts::table
            .find(alert_id)
            .filter(alerts::sent.eq(false)),
    )
    .set((
        alerts::sent.eq(true),
        alerts::sent_at.eq(Some(now)),
        alerts::last_error.eq::<Option<String>>(None),
    ))
    .execute(conn)?;
    Ok(rows == 1)
}

/// Stores the last delivery problem. `release` clears the dispatch claim
/// so a later dispatch starts over.
pub(crate) fn record_delivery_problem(
    conn: &mut PgConnection,
    alert_id: Uuid,
    error: &str,
    release: bool,
) -> QueryResult<()> {
    let target = alerts::table.find(alert_id);
    if release {
        diesel::update(target)
            .set((
                alerts::last_error.eq(Some(error)),
                alerts::dispatched_at.eq::<Option<NaiveDateTime>>(None),
            ))
            .execute(conn)?;
    } else {
        diesel::update(target)
            .set(alerts::last_error.eq(Some(error)))
            .execute(conn)?;
    }
    Ok(())
}

/// Alert plus everything needed to render and address its email.
pub(crate) struct DeliveryContext {
    pub alert: Alert,
    pub case: Case,
    pub responsible_email: Option<String>,
}

pub(crate) fn load_delivery_context(
    conn: &mut PgConnection,
    alert_id: Uuid,
) -> QueryResult<Option<DeliveryContext>> {
    let row: Option<(Alert, Case, Option<String>)> = alerts::table
        .inner_join(cases::table.inner_join(users::table))
        .filter(alerts::id.eq(alert_id))
        .select((alerts::all_columns, cases::all_columns, users::email))
        .first(conn)
        .optional()?;
    Ok(row.map(|(alert, case, responsible_email)| DeliveryContext {
        alert,
        case,
        responsible_email,
    }))
}
