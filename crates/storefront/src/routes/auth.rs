//! Account route handlers (JSON).

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::auth::AuthService;
use crate::state::AppState;

/// Email and password submitted to register or login.
#[derive(Deserialize)]
pub struct CredentialsBody {
    pub email: String,
    pub password: String,
}

async fn start_session(session: &Session, user: &CurrentUser) -> Result<()> {
    set_current_user(session, user).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

/// `POST /api/auth/register` - create an account and sign in.
#[instrument(skip(state, session, body))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CredentialsBody>,
) -> Result<impl IntoResponse> {
    let user = AuthService::new(state.pool())
        .register(&body.email, &body.password)
        .await?;
    let user = CurrentUser::from(&user);

    start_session(&session, &user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /api/auth/login` - sign in with email and password.
#[instrument(skip(state, session, body))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CredentialsBody>,
) -> Result<Json<CurrentUser>> {
    let user = match AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await
    {
        Ok(user) => CurrentUser::from(&user),
        Err(e) => {
            tracing::info!(error = %e, "Login failed");
            return Err(e.into());
        }
    };

    start_session(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User signed in");
    Ok(Json(user))
}

/// `POST /api/auth/logout` - end the session.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me` - the signed-in user.
pub async fn me(RequireAuth(user): RequireAuth) -> Json<CurrentUser> {
    Json(user)
}
