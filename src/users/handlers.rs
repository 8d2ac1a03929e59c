use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{extractors::AuthSession, jwt::JwtKeys},
    errors::ApiError,
    state::AppState,
    users::{
        dto::{CreateUserRequest, FieldUpdate, LoginRequest, PublicUser, SessionResponse},
        service,
    },
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/login", post(login))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/users/logout", post(logout))
        .route("/users/logoutAll", post(logout_all))
        .route("/users/me", get(me))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let (user, token) = service::register(&state.db, &keys, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            user: user.into(),
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let (user, token) = service::login(&state.db, &keys, payload).await?;
    Ok(Json(SessionResponse {
        user: user.into(),
        token,
    }))
}

#[instrument(skip(state, session))]
pub async fn logout(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<StatusCode, ApiError> {
    service::logout_current(&state.db, session.user, &session.token).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state, session))]
pub async fn logout_all(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<StatusCode, ApiError> {
    service::logout_all(&state.db, session.user).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(session))]
pub async fn me(session: AuthSession) -> Json<PublicUser> {
    Json(session.user.into())
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = service::get_by_id(&state.db, id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<PublicUser>, ApiError> {
    // Reject disallowed keys before any lookup or mutation
    let updates = FieldUpdate::parse_all(&body)?;
    let user = service::update(&state.db, id, updates).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = service::delete(&state.db, id).await?;
    Ok(Json(user.into()))
}
