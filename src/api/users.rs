//! Minimal user registration surface.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::api::AppState;
use crate::db::user_repository::User;
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserBody {
    pub email: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

/// POST /users
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserBody>,
) -> AppResult<(StatusCode, Json<User>)> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("a valid email is required"));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::conflict("email is already registered"));
    }

    let user = state
        .users
        .create(&email, body.wallet_address.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}
