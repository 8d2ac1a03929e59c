use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::warn;

use crate::{auth::jwt::JwtKeys, state::AppState, users::repo::User};

/// Resolved session: the authenticated user plus the exact token string that
/// authenticated this request. Handlers behind this extractor never see an
/// unauthenticated call.
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        let keys = JwtKeys::from_ref(state);
        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        let user = User::find_by_id(&state.db, claims.sub)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .ok_or((StatusCode::UNAUTHORIZED, "Please authenticate".to_string()))?;

        // A verified signature alone is not a live session: the token must
        // still be listed on the user record, logout removes it there.
        if !user.tokens.0.iter().any(|t| t == token) {
            warn!(user_id = %user.id, "token not in active session list");
            return Err((StatusCode::UNAUTHORIZED, "Please authenticate".to_string()));
        }

        Ok(AuthSession {
            user,
            token: token.to_string(),
        })
    }
}
