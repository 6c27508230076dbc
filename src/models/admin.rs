use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use super::Money;

pub const ADMIN_COLLECTION: &str = "admin";
pub const ADMIN_CONFIG_ID: &str = "config";

/// The institution's singleton configuration document.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminConfig {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: i64,
    pub transaction_limit: Money,
    #[serde(rename = "IFSC_CODE")]
    pub ifsc_code: String,
    pub admin_id: String,
    pub email: String,
    #[serde(rename = "updatedBy", default)]
    pub updated_by: Option<String>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLimit {
    pub limit: Money,
    pub routing_code: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetTransactionLimitDto {
    pub transaction_limit: Money,
}
