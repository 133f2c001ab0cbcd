use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::cases::load_visible_case;
use super::to_iso;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Case, Movement, NewMovement};
use crate::schema::{cases, movements};
use crate::state::AppState;
use crate::validation::required_text;

const MAX_DESCRIPTION_CHARS: usize = 5000;

#[derive(Debug, Serialize)]
pub struct MovementResponse {
    pub id: Uuid,
    pub case_id: Uuid,
    pub occurred_at: String,
    pub description: String,
    pub author_id: Uuid,
    pub important: bool,
}

impl From<Movement> for MovementResponse {
    fn from(movement: Movement) -> Self {
        Self {
            id: movement.id,
            case_id: movement.case_id,
            occurred_at: to_iso(movement.occurred_at),
            description: movement.description,
            author_id: movement.author_id,
            important: movement.important,
        }
    }
}

pub async fn list_movements(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<MovementResponse>>> {
    let mut conn = state.db()?;
    let case = load_visible_case(&mut conn, case_id, &user.actor())?;
    let rows: Vec<Movement> = movements::table
        .filter(movements::case_id.eq(case.id))
        .order(movements::occurred_at.desc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(MovementResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateMovementRequest {
    pub description: String,
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub important: bool,
}

/// Appends a movement to the case history.
pub async fn create_movement(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateMovementRequest>,
) -> AppResult<(StatusCode, Json<MovementResponse>)> {
    let description = required_text("description", &payload.description, MAX_DESCRIPTION_CHARS)?;
    let mut conn = state.db()?;
    let case = load_visible_case(&mut conn, case_id, &user.actor())?;

    let new_movement = NewMovement {
        id: Uuid::new_v4(),
        case_id: case.id,
        occurred_at: payload
            .occurred_at
            .map(|at| at.naive_utc())
            .unwrap_or_else(|| Utc::now().naive_utc()),
        description,
        author_id: user.user_id,
        important: payload.important,
    };
    let movement: Movement = diesel::insert_into(movements::table)
        .values(&new_movement)
        .get_result(&mut conn)?;

    info!(movement_id = %movement.id, case_id = %case.id, "movement recorded");
    Ok((StatusCode::CREATED, Json(movement.into())))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMovementRequest {
    pub important: bool,
}

/// Movements are append-only apart from the `important` flag.
pub async fn update_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateMovementRequest>,
) -> AppResult<Json<MovementResponse>> {
    let mut conn = state.db()?;
    let (movement, case): (Movement, Case) = movements::table
        .inner_join(cases::table)
        .filter(movements::id.eq(movement_id))
        .select((movements::all_columns, cases::all_columns))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    if !user.actor().can_access(&case) {
        return Err(AppError::not_found());
    }

    let updated: Movement = diesel::update(movements::table.find(movement.id))
        .set(movements::important.eq(payload.important))
        .get_result(&mut conn)?;
    Ok(Json(updated.into()))
}
