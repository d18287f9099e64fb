//! Registration, login, and profile handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use afritrade_ledger::identity::NewUser;
use afritrade_ledger::vault::WalletNumber;

use super::{blocking, ApiResult, AppState, AuthUser};

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub access_token: String,
    pub user_id: Uuid,
    pub wallet_number: WalletNumber,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub email: String,
    pub full_name: String,
}

/// `POST /register` creates the user and their wallet in one step and signs
/// them in.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let Json(new_user) = payload?;
    let users = state.bank.users.clone();
    let (user, wallet, token) = blocking(move || {
        let (user, wallet) = users.register(new_user)?;
        let token = users.issue_token(user.id)?;
        Ok((user, wallet, token))
    })
    .await?;

    state.metrics.registrations_total.inc();
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            access_token: token.expose().to_string(),
            user_id: *user.id.as_uuid(),
            wallet_number: wallet.number,
        }),
    ))
}

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let Json(request) = payload?;
    let users = state.bank.users.clone();
    let token = blocking(move || users.login(&request.email, &request.password)).await?;
    Ok(Json(TokenResponse {
        access_token: token.expose().to_string(),
    }))
}

/// `GET /user-info`
pub async fn user_info(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<UserInfoResponse>> {
    let users = state.bank.users.clone();
    let user = blocking(move || users.user(user)).await?;
    Ok(Json(UserInfoResponse {
        email: user.email,
        full_name: user.full_name,
    }))
}
