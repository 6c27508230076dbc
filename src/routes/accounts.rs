use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::bank::Bank;
use crate::models::{AccountRequestResponse, SubmitAccountRequestDto};
use crate::utils::{ApiError, ApiResponse};

/// Opens an account-creation request for an administrator to review.
#[openapi(tag = "Accounts")]
#[post("/accounts/requests", data = "<dto>")]
pub async fn submit_account_request(
    bank: &State<Bank>,
    dto: Json<SubmitAccountRequestDto>,
) -> Result<Json<ApiResponse<AccountRequestResponse>>, ApiError> {
    let request = bank
        .approvals()
        .submit_account_request(dto.into_inner())
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Request submitted. You will be emailed once it is approved.".to_string(),
        request.into(),
    )))
}
