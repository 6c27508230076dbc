use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::bank::Bank;
use crate::guards::AuthGuard;
use crate::models::{BalanceSummary, CustomerResponse, LoanRequestResponse, SubmitLoanDto, UpdateProfileDto};
use crate::utils::{ApiError, ApiResponse, validate_account_number};

#[openapi(tag = "Customer")]
#[get("/customer/profile")]
pub async fn get_profile(
    bank: &State<Bank>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<CustomerResponse>>, ApiError> {
    let customer = bank.directory().profile(&auth.session).await?;
    Ok(Json(ApiResponse::success(customer.into())))
}

#[openapi(tag = "Customer")]
#[put("/customer/profile", data = "<dto>")]
pub async fn update_profile(
    bank: &State<Bank>,
    auth: AuthGuard,
    dto: Json<UpdateProfileDto>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ApiError> {
    let customer = bank.directory().update_profile(&auth.session, &dto).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully".to_string(),
        customer.into(),
    )))
}

#[openapi(tag = "Customer")]
#[get("/customer/balances")]
pub async fn get_balances(
    bank: &State<Bank>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<BalanceSummary>>, ApiError> {
    let summary = bank.directory().balances(&auth.session).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[openapi(tag = "Customer")]
#[post("/customer/accounts/<account_number>/deactivate")]
pub async fn deactivate_account(
    bank: &State<Bank>,
    auth: AuthGuard,
    account_number: String,
) -> Result<Json<ApiResponse<CustomerResponse>>, ApiError> {
    if !validate_account_number(&account_number) {
        return Err(ApiError::bad_request("Invalid account number"));
    }
    let customer = bank
        .directory()
        .deactivate_account(&auth.session, &account_number)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        format!("Account {} deactivated", account_number),
        customer.into(),
    )))
}

#[openapi(tag = "Customer")]
#[post("/customer/loans", data = "<dto>")]
pub async fn request_loan(
    bank: &State<Bank>,
    auth: AuthGuard,
    dto: Json<SubmitLoanDto>,
) -> Result<Json<ApiResponse<LoanRequestResponse>>, ApiError> {
    let loan = bank
        .approvals()
        .submit_loan_request(&auth.session, dto.loan_amount, &dto.loan_purpose)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        "Loan request submitted".to_string(),
        loan.into(),
    )))
}
