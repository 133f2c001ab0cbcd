use axum::extract::{Json, Query, State};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::alerts::AlertResponse;
use super::cases::{to_case_response, CaseResponse};
use super::movements::MovementResponse;
use crate::auth::AuthenticatedUser;
use crate::domain::{CaseStatus, CaseType};
use crate::error::{AppError, AppResult};
use crate::labels::{case_status_label, case_type_label, urgency_label};
use crate::models::{Alert, Case, Movement};
use crate::schema::{alerts, cases, movements};
use crate::state::AppState;
use crate::urgency::{classify, days_until_due, UrgencyTier, URGENT_WITHIN_DAYS};

const UPCOMING_LIMIT: i64 = 10;
const OVERDUE_LIMIT: i64 = 5;
const PENDING_ALERT_LIMIT: i64 = 5;
const RECENT_MOVEMENT_LIMIT: i64 = 10;
const DEFAULT_DEADLINE_DAYS: i64 = 30;
const MAX_DEADLINE_DAYS: i64 = 365;

fn scoped_cases(scope: Option<Uuid>) -> cases::BoxedQuery<'static, Pg> {
    match scope {
        Some(owner) => cases::table
            .filter(cases::responsible_id.eq(owner))
            .into_boxed(),
        None => cases::table.into_boxed(),
    }
}

fn scoped_case_ids(
    scope: Option<Uuid>,
) -> cases::BoxedQuery<'static, Pg, diesel::sql_types::Uuid> {
    scoped_cases(scope).select(cases::id)
}

#[derive(Debug, Serialize)]
pub struct DashboardTotals {
    pub total: i64,
    pub in_process: i64,
    pub closed: i64,
    pub urgent: i64,
    pub overdue: i64,
    pub pending_alerts: i64,
    pub unread_alerts: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub totals: DashboardTotals,
    pub upcoming: Vec<CaseResponse>,
    pub overdue: Vec<CaseResponse>,
    pub pending_alerts: Vec<AlertResponse>,
    pub recent_movements: Vec<MovementResponse>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DashboardResponse>> {
    let scope = user.actor().case_scope();
    let today = Utc::now().date_naive();
    let urgent_limit = today + ChronoDuration::days(URGENT_WITHIN_DAYS);
    let in_process = CaseStatus::InProcess.as_str();
    let mut conn = state.db()?;

    let total: i64 = scoped_cases(scope).count().get_result(&mut conn)?;
    let open: i64 = scoped_cases(scope)
        .filter(cases::status.eq(in_process))
        .count()
        .get_result(&mut conn)?;
    let closed: i64 = scoped_cases(scope)
        .filter(cases::status.eq(CaseStatus::Closed.as_str()))
        .count()
        .get_result(&mut conn)?;
    let urgent: i64 = scoped_cases(scope)
        .filter(cases::urgent.eq(true))
        .count()
        .get_result(&mut conn)?;
    let overdue_count: i64 = scoped_cases(scope)
        .filter(cases::status.eq(in_process))
        .filter(cases::due_on.lt(today))
        .count()
        .get_result(&mut conn)?;

    let upcoming: Vec<Case> = scoped_cases(scope)
        .filter(cases::status.eq(in_process))
        .filter(cases::due_on.le(urgent_limit))
        .order(cases::due_on.asc())
        .limit(UPCOMING_LIMIT)
        .load(&mut conn)?;
    let overdue: Vec<Case> = scoped_cases(scope)
        .filter(cases::status.eq(in_process))
        .filter(cases::due_on.lt(today))
        .order(cases::due_on.asc())
        .limit(OVERDUE_LIMIT)
        .load(&mut conn)?;

    let pending_alert_count: i64 = alerts::table
        .filter(alerts::case_id.eq_any(scoped_case_ids(scope)))
        .filter(alerts::sent.eq(false))
        .count()
        .get_result(&mut conn)?;
    let unread_alert_count: i64 = alerts::table
        .filter(alerts::case_id.eq_any(scoped_case_ids(scope)))
        .filter(alerts::read.eq(false))
        .count()
        .get_result(&mut conn)?;
    let pending_alerts: Vec<Alert> = alerts::table
        .filter(alerts::case_id.eq_any(scoped_case_ids(scope)))
        .filter(alerts::sent.eq(false))
        .filter(alerts::read.eq(false))
        .order(alerts::fire_at.asc())
        .limit(PENDING_ALERT_LIMIT)
        .load(&mut conn)?;
    let recent_movements: Vec<Movement> = movements::table
        .filter(movements::case_id.eq_any(scoped_case_ids(scope)))
        .order(movements::occurred_at.desc())
        .limit(RECENT_MOVEMENT_LIMIT)
        .load(&mut conn)?;

    Ok(Json(DashboardResponse {
        totals: DashboardTotals {
            total,
            in_process: open,
            closed,
            urgent,
            overdue: overdue_count,
            pending_alerts: pending_alert_count,
            unread_alerts: unread_alert_count,
        },
        upcoming: upcoming
            .into_iter()
            .map(|case| to_case_response(case, today))
            .collect(),
        overdue: overdue
            .into_iter()
            .map(|case| to_case_response(case, today))
            .collect(),
        pending_alerts: pending_alerts.into_iter().map(AlertResponse::from).collect(),
        recent_movements: recent_movements
            .into_iter()
            .map(MovementResponse::from)
            .collect(),
    }))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CountBucket {
    pub code: &'static str,
    pub label: &'static str,
    pub count: i64,
}

/// Zero-fills every known code and appends stored codes that are no longer
/// recognised so totals still add up.
fn fill_buckets<T: Copy>(
    all: &[T],
    code: impl Fn(T) -> &'static str,
    label: impl Fn(T) -> &'static str,
    rows: Vec<(String, i64)>,
) -> Vec<CountBucket> {
    let mut buckets: Vec<CountBucket> = all
        .iter()
        .map(|value| CountBucket {
            code: code(*value),
            label: label(*value),
            count: 0,
        })
        .collect();
    let mut unknown = 0;
    for (stored, count) in rows {
        match buckets.iter_mut().find(|bucket| bucket.code == stored) {
            Some(bucket) => bucket.count += count,
            None => unknown += count,
        }
    }
    if unknown > 0 {
        buckets.push(CountBucket {
            code: "UNKNOWN",
            label: "Desconocido",
            count: unknown,
        });
    }
    buckets
}

pub async fn cases_by_type(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<CountBucket>>> {
    let mut conn = state.db()?;
    let rows: Vec<(String, i64)> = match user.actor().case_scope() {
        Some(owner) => cases::table
            .filter(cases::responsible_id.eq(owner))
            .group_by(cases::case_type)
            .select((cases::case_type, count_star()))
            .load(&mut conn)?,
        None => cases::table
            .group_by(cases::case_type)
            .select((cases::case_type, count_star()))
            .load(&mut conn)?,
    };
    Ok(Json(fill_buckets(
        CaseType::ALL,
        CaseType::as_str,
        case_type_label,
        rows,
    )))
}

pub async fn cases_by_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<CountBucket>>> {
    let mut conn = state.db()?;
    let rows: Vec<(String, i64)> = match user.actor().case_scope() {
        Some(owner) => cases::table
            .filter(cases::responsible_id.eq(owner))
            .group_by(cases::status)
            .select((cases::status, count_star()))
            .load(&mut conn)?,
        None => cases::table
            .group_by(cases::status)
            .select((cases::status, count_star()))
            .load(&mut conn)?,
    };
    Ok(Json(fill_buckets(
        CaseStatus::ALL,
        CaseStatus::as_str,
        case_status_label,
        rows,
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeadlineQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UpcomingDeadline {
    pub case_id: Uuid,
    pub rol: String,
    pub claimant: String,
    pub due_on: NaiveDate,
    pub days_until_due: i64,
    pub urgency: UrgencyTier,
    pub urgency_label: &'static str,
}

pub async fn upcoming_deadlines(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DeadlineQuery>,
) -> AppResult<Json<Vec<UpcomingDeadline>>> {
    let days = query.days.unwrap_or(DEFAULT_DEADLINE_DAYS);
    if !(0..=MAX_DEADLINE_DAYS).contains(&days) {
        return Err(AppError::invalid(
            "days",
            format!("days must be between 0 and {MAX_DEADLINE_DAYS}"),
        ));
    }
    let today = Utc::now().date_naive();
    let mut conn = state.db()?;
    let rows: Vec<Case> = scoped_cases(user.actor().case_scope())
        .filter(cases::status.eq(CaseStatus::InProcess.as_str()))
        .filter(cases::due_on.ge(today))
        .filter(cases::due_on.le(today + ChronoDuration::days(days)))
        .order(cases::due_on.asc())
        .limit(UPCOMING_LIMIT)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|case| {
                let tier = classify(Some(case.due_on), today);
                UpcomingDeadline {
                    days_until_due: days_until_due(Some(case.due_on), today).unwrap_or_default(),
                    urgency: tier,
                    urgency_label: urgency_label(tier),
                    case_id: case.id,
                    rol: case.rol,
                    claimant: case.claimant,
                    due_on: case.due_on,
                }
            })
            .collect(),
    ))
}
