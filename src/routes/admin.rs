use log::info;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::bank::Bank;
use crate::guards::AdminGuard;
use crate::models::{
    AccountRequestResponse, ApproveLoanDto, CustomerResponse, LoanRequestResponse, RequestEmailDto,
    SetTransactionLimitDto, SettlementReport, TransactionLimit, TransferRecord,
};
use crate::store::Page;
use crate::utils::{ApiError, ApiResponse};

// ==================== ACCOUNT REQUESTS ====================

#[openapi(tag = "Admin")]
#[get("/admin/requests?<page>&<limit>")]
pub async fn list_account_requests(
    bank: &State<Bank>,
    _admin: AdminGuard,
    page: Option<i64>,
    limit: Option<i64>,
) -> Result<Json<ApiResponse<Vec<AccountRequestResponse>>>, ApiError> {
    let requests = bank
        .approvals()
        .list_account_requests(Page::from_query(page, limit))
        .await?;
    Ok(Json(ApiResponse::success(
        requests.into_iter().map(Into::into).collect(),
    )))
}

#[openapi(tag = "Admin")]
#[post("/admin/requests/approve", data = "<dto>")]
pub async fn approve_account_request(
    bank: &State<Bank>,
    admin: AdminGuard,
    dto: Json<RequestEmailDto>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ApiError> {
    let customer = bank.approvals().approve_account_creation(&dto.email).await?;
    info!("{} approved the account request of {}", admin.session.email, dto.email);
    Ok(Json(ApiResponse::success_with_message(
        "Account request approved".to_string(),
        customer.into(),
    )))
}

#[openapi(tag = "Admin")]
#[post("/admin/requests/reject", data = "<dto>")]
pub async fn reject_account_request(
    bank: &State<Bank>,
    admin: AdminGuard,
    dto: Json<RequestEmailDto>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    bank.approvals().reject_account_request(&dto.email).await?;
    info!("{} rejected the account request of {}", admin.session.email, dto.email);
    Ok(Json(ApiResponse::success_with_message(
        "Account request rejected".to_string(),
        (),
    )))
}

// ==================== LOANS ====================

#[openapi(tag = "Admin")]
#[get("/admin/loans?<page>&<limit>")]
pub async fn list_loan_requests(
    bank: &State<Bank>,
    _admin: AdminGuard,
    page: Option<i64>,
    limit: Option<i64>,
) -> Result<Json<ApiResponse<Vec<LoanRequestResponse>>>, ApiError> {
    let loans = bank
        .approvals()
        .list_loan_requests(Page::from_query(page, limit))
        .await?;
    Ok(Json(ApiResponse::success(
        loans.into_iter().map(Into::into).collect(),
    )))
}

#[openapi(tag = "Admin")]
#[post("/admin/loans/<customer_id>/approve", data = "<dto>")]
pub async fn approve_loan(
    bank: &State<Bank>,
    admin: AdminGuard,
    customer_id: String,
    dto: Json<ApproveLoanDto>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ApiError> {
    let customer = bank.approvals().approve_loan(&customer_id, dto.amount).await?;
    info!("{} approved the loan of customer {}", admin.session.email, customer_id);
    Ok(Json(ApiResponse::success_with_message(
        "Loan approved".to_string(),
        customer.into(),
    )))
}

#[openapi(tag = "Admin")]
#[post("/admin/loans/<customer_id>/deny")]
pub async fn deny_loan(
    bank: &State<Bank>,
    admin: AdminGuard,
    customer_id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    bank.approvals().deny_loan(&customer_id).await?;
    info!("{} denied the loan of customer {}", admin.session.email, customer_id);
    Ok(Json(ApiResponse::success_with_message("Loan denied".to_string(), ())))
}

// ==================== CONFIGURATION ====================

#[openapi(tag = "Admin")]
#[get("/admin/config")]
pub async fn get_config(
    bank: &State<Bank>,
    _admin: AdminGuard,
) -> Result<Json<ApiResponse<TransactionLimit>>, ApiError> {
    let limit = bank.admin().get_transaction_limit().await?;
    Ok(Json(ApiResponse::success(limit)))
}

#[openapi(tag = "Admin")]
#[put("/admin/config", data = "<dto>")]
pub async fn set_transaction_limit(
    bank: &State<Bank>,
    admin: AdminGuard,
    dto: Json<SetTransactionLimitDto>,
) -> Result<Json<ApiResponse<TransactionLimit>>, ApiError> {
    let limit = bank
        .admin()
        .set_transaction_limit(&admin.session, dto.transaction_limit)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        "Transaction limit updated".to_string(),
        limit,
    )))
}

// ==================== SETTLEMENT & AUDIT ====================

#[openapi(tag = "Admin")]
#[post("/admin/settlements")]
pub async fn run_settlement(
    bank: &State<Bank>,
    admin: AdminGuard,
) -> Result<Json<ApiResponse<SettlementReport>>, ApiError> {
    let report = bank.settlement().receive_money().await?;
    info!("{} ran settlement: {:?}", admin.session.email, report);
    Ok(Json(ApiResponse::success(report)))
}

#[openapi(tag = "Admin")]
#[get("/admin/transfers?<page>&<limit>")]
pub async fn list_transfers(
    bank: &State<Bank>,
    _admin: AdminGuard,
    page: Option<i64>,
    limit: Option<i64>,
) -> Result<Json<ApiResponse<Vec<TransferRecord>>>, ApiError> {
    let transfers = bank
        .transfers()
        .list_transfers(Page::from_query(page, limit))
        .await?;
    Ok(Json(ApiResponse::success(transfers)))
}
