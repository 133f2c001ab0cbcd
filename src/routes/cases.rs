use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::alerts::AlertResponse;
use super::movements::MovementResponse;
use super::to_iso;
use crate::access::Actor;
use crate::alerts::{create_due_alerts_for_cases, on_case_created, BatchReport};
use crate::auth::AuthenticatedUser;
use crate::domain::{CaseStatus, CaseType, Tribunal};
use crate::error::{AppError, AppResult};
use crate::labels::{
    case_status_label, case_type_label, label_for_code, tribunal_label, urgency_label,
};
use crate::models::{Case, NewCase, User};
use crate::schema::{alerts, case_documents, cases, users};
use crate::state::AppState;
use crate::urgency::{classify, days_until_due, is_urgent, UrgencyTier, URGENT_WITHIN_DAYS};
use crate::utils::json::{classify_nullable, classify_nullable_date, NullableValue};
use crate::validation::{
    normalize_rol, optional_text, parse_code, required_text, validate_case_dates,
    validate_date_range, CaseDates, ValidationError,
};

const DEFAULT_PER_PAGE: i64 = 25;
const MAX_PER_PAGE: i64 = 100;
const MAX_NAME_CHARS: usize = 200;
const MAX_SUBJECT_CHARS: usize = 300;

#[derive(Debug, Serialize)]
pub struct CaseResponse {
    pub id: Uuid,
    pub case_type: String,
    pub case_type_label: String,
    pub rol: String,
    pub claimant: String,
    pub respondent: Option<String>,
    pub tribunal: String,
    pub tribunal_label: String,
    pub filed_on: NaiveDate,
    pub due_on: NaiveDate,
    pub notified_on: Option<NaiveDate>,
    pub status: String,
    pub status_label: String,
    pub subject: String,
    pub notes: Option<String>,
    pub responsible_id: Uuid,
    pub urgent: bool,
    pub days_until_due: Option<i64>,
    pub urgency: UrgencyTier,
    pub urgency_label: &'static str,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) fn to_case_response(case: Case, today: NaiveDate) -> CaseResponse {
    let tier = classify(Some(case.due_on), today);
    CaseResponse {
        case_type_label: label_for_code::<CaseType, _>(&case.case_type, case_type_label)
            .to_string(),
        tribunal_label: label_for_code::<Tribunal, _>(&case.tribunal, tribunal_label).to_string(),
        status_label: label_for_code::<CaseStatus, _>(&case.status, case_status_label).to_string(),
        urgent: is_urgent(Some(case.due_on), today),
        days_until_due: days_until_due(Some(case.due_on), today),
        urgency: tier,
        urgency_label: urgency_label(tier),
        created_at: to_iso(case.created_at),
        updated_at: to_iso(case.updated_at),
        id: case.id,
        case_type: case.case_type,
        rol: case.rol,
        claimant: case.claimant,
        respondent: case.respondent,
        tribunal: case.tribunal,
        filed_on: case.filed_on,
        due_on: case.due_on,
        notified_on: case.notified_on,
        status: case.status,
        subject: case.subject,
        notes: case.notes,
        responsible_id: case.responsible_id,
    }
}

/// Loads a case the actor may see. Cases outside the actor's reach are
/// reported as missing.
pub(crate) fn load_visible_case(
    conn: &mut PgConnection,
    case_id: Uuid,
    actor: &Actor,
) -> AppResult<Case> {
    let case: Case = cases::table
        .find(case_id)
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if !actor.can_access(&case) {
        return Err(AppError::not_found());
    }
    Ok(case)
}

#[derive(Debug, Default, Deserialize)]
pub struct CaseListQuery {
    pub search: Option<String>,
    pub case_type: Option<String>,
    pub status: Option<String>,
    pub tribunal: Option<String>,
    #[serde(default)]
    pub urgent_only: bool,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default)]
struct CaseFilters {
    search: Option<String>,
    case_type: Option<CaseType>,
    status: Option<CaseStatus>,
    tribunal: Option<Tribunal>,
    urgent_only: bool,
    due_from: Option<NaiveDate>,
    due_to: Option<NaiveDate>,
}

impl CaseFilters {
    fn from_query(query: &CaseListQuery) -> Result<Self, ValidationError> {
        validate_date_range(query.due_from, query.due_to)?;
        let non_blank = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            search: non_blank(&query.search),
            case_type: non_blank(&query.case_type)
                .map(|raw| parse_code("case_type", &raw))
                .transpose()?,
            status: non_blank(&query.status)
                .map(|raw| parse_code("status", &raw))
                .transpose()?,
            tribunal: non_blank(&query.tribunal)
                .map(|raw| parse_code("tribunal", &raw))
                .transpose()?,
            urgent_only: query.urgent_only,
            due_from: query.due_from,
            due_to: query.due_to,
        })
    }

    fn apply(&self, scope: Option<Uuid>, today: NaiveDate) -> cases::BoxedQuery<'static, Pg> {
        let mut query = cases::table.into_boxed();
        if let Some(owner) = scope {
            query = query.filter(cases::responsible_id.eq(owner));
        }
        if let Some(term) = &self.search {
            let pattern = format!("%{term}%");
            query = query.filter(
                cases::rol
                    .ilike(pattern.clone())
                    .or(cases::claimant.ilike(pattern.clone()))
                    .or(cases::respondent.assume_not_null().ilike(pattern.clone()))
                    .or(cases::subject.ilike(pattern)),
            );
        }
        if let Some(case_type) = self.case_type {
            query = query.filter(cases::case_type.eq(case_type.as_str()));
        }
        if let Some(status) = self.status {
            query = query.filter(cases::status.eq(status.as_str()));
        }
        if let Some(tribunal) = self.tribunal {
            query = query.filter(cases::tribunal.eq(tribunal.as_str()));
        }
        if self.urgent_only {
            query = query.filter(cases::due_on.le(today + ChronoDuration::days(URGENT_WITHIN_DAYS)));
        }
        if let Some(from) = self.due_from {
            query = query.filter(cases::due_on.ge(from));
        }
        if let Some(to) = self.due_to {
            query = query.filter(cases::due_on.le(to));
        }
        query
    }
}

#[derive(Debug, Serialize)]
pub struct CaseListResponse {
    pub items: Vec<CaseResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub async fn list_cases(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<CaseListQuery>,
) -> AppResult<Json<CaseListResponse>> {
    let filters = CaseFilters::from_query(&query)?;
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let today = Utc::now().date_naive();
    let scope = user.actor().case_scope();

    let mut conn = state.db()?;
    let total: i64 = filters.apply(scope, today).count().get_result(&mut conn)?;
    let rows: Vec<Case> = filters
        .apply(scope, today)
        .order((cases::due_on.desc(), cases::created_at.desc()))
        .limit(per_page)
        .offset((page - 1) * per_page)
        .load(&mut conn)?;

    Ok(Json(CaseListResponse {
        items: rows
            .into_iter()
            .map(|case| to_case_response(case, today))
            .collect(),
        total,
        page,
        per_page,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateCaseRequest {
    pub case_type: String,
    pub rol: String,
    pub claimant: String,
    pub respondent: Option<String>,
    pub tribunal: String,
    pub filed_on: NaiveDate,
    pub due_on: NaiveDate,
    pub notified_on: Option<NaiveDate>,
    pub status: Option<String>,
    pub subject: String,
    pub notes: Option<String>,
    pub responsible_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CaseCreatedResponse {
    pub case: CaseResponse,
    pub movement: MovementResponse,
    pub alert: Option<AlertResponse>,
}

pub async fn create_case(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCaseRequest>,
) -> AppResult<(StatusCode, Json<CaseCreatedResponse>)> {
    let actor = user.actor();
    let now = Utc::now().naive_utc();
    let today = now.date();

    let case_type: CaseType = parse_code("case_type", &payload.case_type)?;
    let tribunal: Tribunal = parse_code("tribunal", &payload.tribunal)?;
    let status: CaseStatus = payload
        .status
        .as_deref()
        .map(|raw| parse_code("status", raw))
        .transpose()?
        .unwrap_or_default();
    let rol = normalize_rol(&payload.rol)?;
    let claimant = required_text("claimant", &payload.claimant, MAX_NAME_CHARS)?;
    let respondent = optional_text("respondent", payload.respondent.as_deref(), Some(MAX_NAME_CHARS))?;
    let subject = required_text("subject", &payload.subject, MAX_SUBJECT_CHARS)?;
    let notes = optional_text("notes", payload.notes.as_deref(), None)?;
    validate_case_dates(
        CaseDates {
            filed_on: payload.filed_on,
            due_on: payload.due_on,
            notified_on: payload.notified_on,
        },
        today,
        true,
    )?;

    let responsible_id = match payload.responsible_id {
        Some(id) if id != actor.user_id && !actor.staff => return Err(AppError::forbidden()),
        Some(id) => id,
        None => actor.user_id,
    };

    let settings = state.config.alerts.clone();
    let mut conn = state.db()?;
    let (case, effects) = conn.transaction(|conn| -> AppResult<_> {
        let responsible: User = users::table
            .find(responsible_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::invalid("responsible_id", "responsible user does not exist"))?;

        let new_case = NewCase {
            id: Uuid::new_v4(),
            case_type: case_type.as_str().to_string(),
            rol,
            claimant,
            respondent,
            tribunal: tribunal.as_str().to_string(),
            filed_on: payload.filed_on,
            due_on: payload.due_on,
            notified_on: payload.notified_on,
            status: status.as_str().to_string(),
            subject,
            notes,
            responsible_id,
            urgent: is_urgent(Some(payload.due_on), today),
        };
        let case: Case = diesel::insert_into(cases::table)
            .values(&new_case)
            .get_result(conn)?;
        let effects = on_case_created(conn, &case, responsible.email, &settings, now)?;
        Ok((case, effects))
    })?;

    info!(
        case_id = %case.id,
        rol = %case.rol,
        alert_created = effects.alert.is_some(),
        "case created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CaseCreatedResponse {
            case: to_case_response(case, today),
            movement: effects.movement.into(),
            alert: effects.alert.map(AlertResponse::from),
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct CaseDetailResponse {
    pub case: CaseResponse,
    pub document_count: i64,
    pub pending_alert_count: i64,
}

pub async fn get_case(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<CaseDetailResponse>> {
    let mut conn = state.db()?;
    let case = load_visible_case(&mut conn, case_id, &user.actor())?;

    let document_count: i64 = case_documents::table
        .filter(case_documents::case_id.eq(case.id))
        .count()
        .get_result(&mut conn)?;
    let pending_alert_count: i64 = alerts::table
        .filter(alerts::case_id.eq(case.id))
        .filter(alerts::sent.eq(false))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(CaseDetailResponse {
        case: to_case_response(case, Utc::now().date_naive()),
        document_count,
        pending_alert_count,
    }))
}

#[derive(AsChangeset)]
#[diesel(table_name = cases, treat_none_as_null = true)]
struct CaseChangeset<'a> {
    case_type: &'a str,
    rol: &'a str,
    claimant: &'a str,
    respondent: Option<&'a str>,
    tribunal: &'a str,
    filed_on: NaiveDate,
    due_on: NaiveDate,
    notified_on: Option<NaiveDate>,
    status: &'a str,
    subject: &'a str,
    notes: Option<&'a str>,
    responsible_id: Uuid,
    urgent: bool,
    updated_at: NaiveDateTime,
}

fn required_field(body: &Value, field: &'static str) -> Result<Option<String>, ValidationError> {
    match classify_nullable(field, body.get(field))? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Err(ValidationError::new(field, format!("{field} cannot be cleared"))),
        NullableValue::Value(value) => Ok(Some(value)),
    }
}

fn required_date(body: &Value, field: &'static str) -> Result<Option<NaiveDate>, ValidationError> {
    match classify_nullable_date(field, body.get(field))? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Err(ValidationError::new(field, format!("{field} cannot be cleared"))),
        NullableValue::Value(value) => Ok(Some(value)),
    }
}

pub async fn update_case(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(body): Json<Value>,
) -> AppResult<Json<CaseResponse>> {
    if !body.is_object() {
        return Err(AppError::bad_request("expected a JSON object"));
    }
    let actor = user.actor();
    let now = Utc::now().naive_utc();
    let today = now.date();

    let mut conn = state.db()?;
    let mut case = load_visible_case(&mut conn, case_id, &actor)?;
    let mut changed = false;

    if let Some(raw) = required_field(&body, "case_type")? {
        case.case_type = parse_code::<CaseType>("case_type", &raw)?.as_str().to_string();
        changed = true;
    }
    if let Some(raw) = required_field(&body, "rol")? {
        case.rol = normalize_rol(&raw)?;
        changed = true;
    }
    if let Some(raw) = required_field(&body, "claimant")? {
        case.claimant = required_text("claimant", &raw, MAX_NAME_CHARS)?;
        changed = true;
    }
    match classify_nullable("respondent", body.get("respondent"))? {
        NullableValue::Omitted => {}
        NullableValue::Null => {
            case.respondent = None;
            changed = true;
        }
        NullableValue::Value(raw) => {
            case.respondent = optional_text("respondent", Some(&raw), Some(MAX_NAME_CHARS))?;
            changed = true;
        }
    }
    if let Some(raw) = required_field(&body, "tribunal")? {
        case.tribunal = parse_code::<Tribunal>("tribunal", &raw)?.as_str().to_string();
        changed = true;
    }
    if let Some(raw) = required_field(&body, "status")? {
        case.status = parse_code::<CaseStatus>("status", &raw)?.as_str().to_string();
        changed = true;
    }
    if let Some(raw) = required_field(&body, "subject")? {
        case.subject = required_text("subject", &raw, MAX_SUBJECT_CHARS)?;
        changed = true;
    }
    match classify_nullable("notes", body.get("notes"))? {
        NullableValue::Omitted => {}
        NullableValue::Null => {
            case.notes = None;
            changed = true;
        }
        NullableValue::Value(raw) => {
            case.notes = optional_text("notes", Some(&raw), None)?;
            changed = true;
        }
    }

    if let Some(filed_on) = required_date(&body, "filed_on")? {
        case.filed_on = filed_on;
        changed = true;
    }
    let mut due_changed = false;
    if let Some(due_on) = required_date(&body, "due_on")? {
        due_changed = due_on != case.due_on;
        case.due_on = due_on;
        changed = true;
    }
    match classify_nullable_date("notified_on", body.get("notified_on"))? {
        NullableValue::Omitted => {}
        NullableValue::Null => {
            case.notified_on = None;
            changed = true;
        }
        NullableValue::Value(notified_on) => {
            case.notified_on = Some(notified_on);
            changed = true;
        }
    }

    if let Some(raw) = required_field(&body, "responsible_id")? {
        let responsible_id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::invalid("responsible_id", "responsible_id must be a valid UUID"))?;
        if responsible_id != case.responsible_id {
            if !actor.staff {
                return Err(AppError::forbidden());
            }
            let exists: bool = diesel::select(diesel::dsl::exists(users::table.find(responsible_id)))
                .get_result(&mut conn)?;
            if !exists {
                return Err(AppError::invalid(
                    "responsible_id",
                    "responsible user does not exist",
                ));
            }
            case.responsible_id = responsible_id;
        }
        changed = true;
    }

    if !changed {
        return Err(AppError::bad_request("no changes provided"));
    }

    validate_case_dates(
        CaseDates {
            filed_on: case.filed_on,
            due_on: case.due_on,
            notified_on: case.notified_on,
        },
        today,
        due_changed,
    )?;

    let changes = CaseChangeset {
        case_type: &case.case_type,
        rol: &case.rol,
        claimant: &case.claimant,
        respondent: case.respondent.as_deref(),
        tribunal: &case.tribunal,
        filed_on: case.filed_on,
        due_on: case.due_on,
        notified_on: case.notified_on,
        status: &case.status,
        subject: &case.subject,
        notes: case.notes.as_deref(),
        responsible_id: case.responsible_id,
        urgent: is_urgent(Some(case.due_on), today),
        updated_at: now,
    };
    let updated: Case = diesel::update(cases::table.find(case.id))
        .set(&changes)
        .get_result(&mut conn)?;

    info!(case_id = %updated.id, "case updated");
    Ok(Json(to_case_response(updated, today)))
}

pub async fn delete_case(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let case = load_visible_case(&mut conn, case_id, &user.actor())?;

    let storage_keys: Vec<String> = case_documents::table
        .filter(case_documents::case_id.eq(case.id))
        .select(case_documents::storage_key)
        .load(&mut conn)?;
    diesel::delete(cases::table.find(case.id)).execute(&mut conn)?;
    drop(conn);

    for key in &storage_keys {
        if let Err(err) = state.documents.remove(key).await {
            warn!(case_id = %case.id, %key, error = %err, "failed to delete stored document");
        }
    }

    info!(case_id = %case.id, rol = %case.rol, documents = storage_keys.len(), "case deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BulkCaseRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkUpdateResponse {
    pub updated: usize,
}

pub async fn bulk_close_cases(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<BulkCaseRequest>,
) -> AppResult<Json<BulkUpdateResponse>> {
    if !user.is_staff() {
        return Err(AppError::forbidden());
    }
    let mut conn = state.db()?;
    let updated = diesel::update(
        cases::table
            .filter(cases::id.eq_any(&payload.ids))
            .filter(cases::status.ne(CaseStatus::Closed.as_str())),
    )
    .set((
        cases::status.eq(CaseStatus::Closed.as_str()),
        cases::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(&mut conn)?;

    info!(updated, requested = payload.ids.len(), "closed cases");
    Ok(Json(BulkUpdateResponse { updated }))
}

pub async fn bulk_create_due_alerts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<BulkCaseRequest>,
) -> AppResult<Json<BatchReport>> {
    let mut conn = state.db()?;
    let report = create_due_alerts_for_cases(
        &mut conn,
        &payload.ids,
        &user.actor(),
        &state.config.alerts,
        Utc::now().naive_utc(),
    )?;
    Ok(Json(report))
}
