use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::Money;

pub const CREATION_COLLECTION: &str = "creation";
pub const LOAN_COLLECTION: &str = "loan";

/// Markers persisted while an approval is in flight, so a retried approval
/// resumes with the same identifiers instead of provisioning twice.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Provisioning {
    pub customer_id: Option<String>,
    pub account_number: Option<String>,
    pub credential_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: i64,
    pub email: String,
    pub name: String,
    pub mobile: String,
    pub pan: String,
    pub aadhaar: String,
    pub password_hash: String,
    pub pending: bool,
    #[serde(default)]
    pub progress: Provisioning,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoanRequest {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: i64,
    pub customer_id: String,
    pub loan_amount: Money,
    pub loan_purpose: String,
    pub pending: bool,
    #[serde(default)]
    pub account_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct SubmitAccountRequestDto {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub mobile: String,
    /// PAN card scan as a data URL.
    pub pan: String,
    /// Aadhaar card scan as a data URL.
    pub aadhaar: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitLoanDto {
    pub loan_amount: Money,
    pub loan_purpose: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RequestEmailDto {
    pub email: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveLoanDto {
    pub amount: Option<Money>,
}

/// Queue view of an account request; the password hash and document
/// payloads stay in the store.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequestResponse {
    pub email: String,
    pub name: String,
    pub mobile: String,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AccountRequest> for AccountRequestResponse {
    fn from(r: AccountRequest) -> Self {
        AccountRequestResponse {
            email: r.email,
            name: r.name,
            mobile: r.mobile,
            pending: r.pending,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanRequestResponse {
    pub customer_id: String,
    pub loan_amount: Money,
    pub loan_purpose: String,
    pub created_at: DateTime<Utc>,
}

impl From<LoanRequest> for LoanRequestResponse {
    fn from(r: LoanRequest) -> Self {
        LoanRequestResponse {
            customer_id: r.customer_id,
            loan_amount: r.loan_amount,
            loan_purpose: r.loan_purpose,
            created_at: r.created_at,
        }
    }
}
