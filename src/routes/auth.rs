use log::info;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::Serialize;

use crate::bank::Bank;
use crate::models::{LoginDto, RefreshTokenDto};
use crate::services::{AuthTokens, JwtService};
use crate::utils::{ApiError, ApiResponse, validate_email};

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
}

/// --------------------
/// Login
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    bank: &State<Bank>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<AuthTokens>>, ApiError> {
    let email = dto.email.trim();
    if !validate_email(email) {
        return Err(ApiError::bad_request("Invalid email"));
    }
    if dto.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }

    let tokens = bank.identity.authenticate(email, &dto.password).await?;
    info!("{} logged in", email);

    Ok(Json(ApiResponse::success_with_message(
        "Login successful".to_string(),
        tokens,
    )))
}

/// --------------------
/// Silent Refresh Token
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<dto>")]
pub async fn refresh_token(dto: Json<RefreshTokenDto>) -> Result<Json<ApiResponse<AccessToken>>, ApiError> {
    let claims = JwtService::verify_token(&dto.refresh_token, true)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let access = JwtService::generate_access_token(&claims.session())
        .map_err(|e| ApiError::internal_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(AccessToken {
        access_token: access,
    })))
}
