use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::bank::Bank;
use crate::guards::AuthGuard;
use crate::models::{SelfTransferDto, SendMoneyDto, TransactionLimit, TransferReceipt};
use crate::utils::{ApiError, ApiResponse};

#[openapi(tag = "Transfers")]
#[post("/transfers/self", data = "<dto>")]
pub async fn self_transfer(
    bank: &State<Bank>,
    auth: AuthGuard,
    dto: Json<SelfTransferDto>,
) -> Result<Json<ApiResponse<TransferReceipt>>, ApiError> {
    let receipt = bank
        .transfers()
        .self_transfer(&auth.session, dto.from_account.trim(), dto.to_account.trim(), dto.amount)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        "Transfer completed".to_string(),
        receipt,
    )))
}

#[openapi(tag = "Transfers")]
#[post("/transfers", data = "<dto>")]
pub async fn send_money(
    bank: &State<Bank>,
    auth: AuthGuard,
    dto: Json<SendMoneyDto>,
) -> Result<Json<ApiResponse<TransferReceipt>>, ApiError> {
    let receipt = bank.transfers().send_money(&auth.session, &dto).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Transfer completed".to_string(),
        receipt,
    )))
}

/// The per-transfer ceiling and this institution's routing code.
#[openapi(tag = "Transfers")]
#[get("/transfers/limit")]
pub async fn get_transaction_limit(
    bank: &State<Bank>,
    _auth: AuthGuard,
) -> Result<Json<ApiResponse<TransactionLimit>>, ApiError> {
    let limit = bank.admin().get_transaction_limit().await?;
    Ok(Json(ApiResponse::success(limit)))
}
