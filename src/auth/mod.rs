pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use tracing::debug;
use uuid::Uuid;

use crate::{access::Actor, domain::is_staff_role, error::AppError, state::AppState};

use self::jwt::Claims;

/// The caller behind a valid bearer token. Extracting it rejects the
/// request with 401 otherwise.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    staff: bool,
}

impl AuthenticatedUser {
    pub fn is_staff(&self) -> bool {
        self.staff
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.staff)
    }
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            staff: is_staff_role(&claims.role),
            user_id: claims.sub,
            username: claims.username,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        match state.jwt.verify_token(bearer.token()) {
            Ok(claims) => Ok(claims.into()),
            Err(err) => {
                debug!(error = %err, path = %parts.uri.path(), "rejected bearer token");
                Err(AppError::unauthorized())
            }
        }
    }
}
