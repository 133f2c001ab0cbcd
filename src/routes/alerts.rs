use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::to_iso;
use crate::alerts::{
    create_manual_alert, mark_alerts_sent, mark_read, resend_alert, update_alert_delivery,
    DeliveryUpdate, ManualAlert,
};
use crate::auth::AuthenticatedUser;
use crate::domain::AlertType;
use crate::error::{AppError, AppResult};
use crate::labels::{alert_type_label, label_for_code};
use crate::models::Alert;
use crate::schema::{alerts, cases};
use crate::state::AppState;
use crate::utils::json::{classify_nullable, NullableValue};
use crate::validation::{parse_code, ValidationError};

const DEFAULT_PER_PAGE: i64 = 50;
const MAX_PER_PAGE: i64 = 200;

#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub alert_type: String,
    pub alert_type_label: String,
    pub message: String,
    pub fire_at: String,
    pub sent: bool,
    pub sent_at: Option<String>,
    pub read: bool,
    pub send_email: bool,
    pub recipient_email: Option<String>,
    pub created_by: Uuid,
    pub created_at: String,
    pub dispatched_at: Option<String>,
    pub last_error: Option<String>,
}

impl From<Alert> for AlertResponse {
    fn from(alert: Alert) -> Self {
        Self {
            alert_type_label: label_for_code::<AlertType, _>(&alert.alert_type, alert_type_label)
                .to_string(),
            id: alert.id,
            case_id: alert.case_id,
            alert_type: alert.alert_type,
            message: alert.message,
            fire_at: to_iso(alert.fire_at),
            sent: alert.sent,
            sent_at: alert.sent_at.map(to_iso),
            read: alert.read,
            send_email: alert.send_email,
            recipient_email: alert.recipient_email,
            created_by: alert.created_by,
            created_at: to_iso(alert.created_at),
            dispatched_at: alert.dispatched_at.map(to_iso),
            last_error: alert.last_error,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertListQuery {
    pub case_id: Option<Uuid>,
    pub sent: Option<bool>,
    pub read: Option<bool>,
    pub alert_type: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AlertListResponse {
    pub items: Vec<AlertResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

fn scoped_alerts(
    query: &AlertListQuery,
    alert_type: Option<AlertType>,
    scope: Option<Uuid>,
) -> alerts::BoxedQuery<'static, Pg> {
    let mut filtered = alerts::table.into_boxed();
    if let Some(owner) = scope {
        filtered = filtered.filter(
            alerts::case_id.eq_any(
                cases::table
                    .filter(cases::responsible_id.eq(owner))
                    .select(cases::id),
            ),
        );
    }
    if let Some(case_id) = query.case_id {
        filtered = filtered.filter(alerts::case_id.eq(case_id));
    }
    if let Some(sent) = query.sent {
        filtered = filtered.filter(alerts::sent.eq(sent));
    }
    if let Some(read) = query.read {
        filtered = filtered.filter(alerts::read.eq(read));
    }
    if let Some(alert_type) = alert_type {
        filtered = filtered.filter(alerts::alert_type.eq(alert_type.as_str()));
    }
    filtered
}

pub async fn list_alerts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AlertListQuery>,
) -> AppResult<Json<AlertListResponse>> {
    let alert_type = query
        .alert_type
        .as_deref()
        .map(|raw| parse_code::<AlertType>("alert_type", raw))
        .transpose()?;
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let scope = user.actor().case_scope();

    let mut conn = state.db()?;
    let total: i64 = scoped_alerts(&query, alert_type, scope)
        .count()
        .get_result(&mut conn)?;
    let rows: Vec<Alert> = scoped_alerts(&query, alert_type, scope)
        .order((alerts::fire_at.desc(), alerts::created_at.desc()))
        .limit(per_page)
        .offset((page - 1) * per_page)
        .load(&mut conn)?;

    Ok(Json(AlertListResponse {
        items: rows.into_iter().map(AlertResponse::from).collect(),
        total,
        page,
        per_page,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    pub case_id: Uuid,
    pub alert_type: Option<String>,
    pub message: String,
    pub fire_at: DateTime<Utc>,
    pub send_email: Option<bool>,
    pub recipient_email: Option<String>,
}

pub async fn create_alert(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateAlertRequest>,
) -> AppResult<(StatusCode, Json<AlertResponse>)> {
    let alert_type: AlertType = payload
        .alert_type
        .as_deref()
        .map(|raw| parse_code("alert_type", raw))
        .transpose()?
        .unwrap_or_default();
    let input = ManualAlert {
        case_id: payload.case_id,
        alert_type,
        message: payload.message,
        fire_at: payload.fire_at.naive_utc(),
        send_email: payload.send_email.unwrap_or(true),
        recipient_email: payload.recipient_email,
    };

    let mut conn = state.db()?;
    let alert = create_manual_alert(&mut conn, input, &user.actor(), Utc::now().naive_utc())?;
    info!(alert_id = %alert.id, case_id = %alert.case_id, "manual alert created");
    Ok((StatusCode::CREATED, Json(alert.into())))
}

pub async fn update_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(body): Json<Value>,
) -> AppResult<Json<AlertResponse>> {
    let recipient_email = match classify_nullable("recipient_email", body.get("recipient_email"))? {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::Value(value) => Some(Some(value)),
    };
    let send_email = match body.get("send_email") {
        None => None,
        Some(Value::Bool(flag)) => Some(*flag),
        Some(_) => {
            return Err(ValidationError::new("send_email", "send_email must be a boolean").into())
        }
    };
    if recipient_email.is_none() && send_email.is_none() {
        return Err(AppError::bad_request("no changes provided"));
    }

    let mut conn = state.db()?;
    let alert = update_alert_delivery(
        &mut conn,
        alert_id,
        &user.actor(),
        DeliveryUpdate {
            recipient_email,
            send_email,
        },
    )?;
    Ok(Json(alert.into()))
}

pub async fn mark_alert_read(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<AlertResponse>> {
    let mut conn = state.db()?;
    let alert = mark_read(&mut conn, alert_id, &user.actor())?;
    Ok(Json(alert.into()))
}

pub async fn resend(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<AlertResponse>> {
    let mut conn = state.db()?;
    let alert = resend_alert(&mut conn, alert_id, &user.actor())?;
    Ok(Json(alert.into()))
}

#[derive(Debug, Deserialize)]
pub struct BulkAlertRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkAlertResponse {
    pub updated: usize,
}

pub async fn bulk_mark_sent(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<BulkAlertRequest>,
) -> AppResult<Json<BulkAlertResponse>> {
    let mut conn = state.db()?;
    let updated = mark_alerts_sent(
        &mut conn,
        &payload.ids,
        &user.actor(),
        Utc::now().naive_utc(),
    )?;
    info!(updated, requested = payload.ids.len(), "alerts marked as sent");
    Ok(Json(BulkAlertResponse { updated }))
}
