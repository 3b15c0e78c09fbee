//! Remote cart route handlers.
//!
//! The cart is addressed by user ID so that the path names whose cart is
//! being edited; a session may only read and write its own.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use tastetrove_core::{CartBody, CartUpdateBody, UserId};

use crate::db::CartRepository;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::CurrentUser;
use crate::state::AppState;

/// Largest batch accepted by one `PUT`.
pub const MAX_UPDATES_PER_BATCH: usize = 200;

fn ensure_owner(user: &CurrentUser, user_id: UserId) -> Result<()> {
    if user.id == user_id {
        Ok(())
    } else {
        tracing::warn!(session_user = %user.id, requested = %user_id, "Cart access denied");
        Err(AppError::Forbidden("Cannot access another user's cart".to_string()))
    }
}

/// `GET /api/users/{user_id}/cart` - the user's cart lines.
#[instrument(skip(state, user), fields(user_id = %user_id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(user_id): Path<UserId>,
) -> Result<Json<CartBody>> {
    ensure_owner(&user, user_id)?;

    let lines = CartRepository::new(state.pool()).lines(user_id).await?;
    Ok(Json(CartBody { lines }))
}

/// `PUT /api/users/{user_id}/cart` - apply a batch of absolute-set updates.
///
/// A quantity of zero deletes the line. The whole batch is applied in one
/// transaction; the response holds the resulting lines.
#[instrument(skip(state, user, body), fields(user_id = %user_id, updates = body.updates.len()))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(user_id): Path<UserId>,
    Json(body): Json<CartUpdateBody>,
) -> Result<Json<CartBody>> {
    ensure_owner(&user, user_id)?;

    if body.updates.len() > MAX_UPDATES_PER_BATCH {
        return Err(AppError::BadRequest(format!(
            "At most {MAX_UPDATES_PER_BATCH} updates per request"
        )));
    }

    let count = body.updates.len().to_string();
    add_breadcrumb("cart", "Applied cart updates", Some(&[("updates", count.as_str())]));

    let lines = CartRepository::new(state.pool())
        .apply(user_id, &body.updates)
        .await?;

    tracing::info!(lines = lines.len(), "Cart updated");
    Ok(Json(CartBody { lines }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tastetrove_core::Email;

    use super::*;

    #[test]
    fn test_ensure_owner() {
        let user = CurrentUser {
            id: UserId::new(3),
            email: Email::parse("cook@example.com").unwrap(),
        };
        assert!(ensure_owner(&user, UserId::new(3)).is_ok());
        assert!(matches!(
            ensure_owner(&user, UserId::new(4)),
            Err(AppError::Forbidden(_))
        ));
    }
}
