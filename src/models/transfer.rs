use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use super::Money;

pub const TRANSFER_COLLECTION: &str = "transfers";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    SelfTransfer,
    IntraBank,
    InterBank,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Completed,
    /// The debit was undone after the credit leg failed.
    Compensated,
    /// The credit leg and the compensation both failed.
    NeedsReconciliation,
}

/// Journal entry kept for every transfer.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: i64,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub initiated_by: String,
    pub from_account: String,
    pub to_account: String,
    pub to_routing_code: String,
    pub amount: Money,
    #[serde(default)]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelfTransferDto {
    pub from_account: String,
    pub to_account: String,
    pub amount: Money,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMoneyDto {
    pub from_account: String,
    /// Receiver's routing code (IFSC).
    pub routing_code: String,
    pub to_account: String,
    pub amount: Money,
}

#[derive(Debug, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub amount: Money,
    pub sender_balance: Money,
}

#[derive(Debug, Serialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub credits_applied: usize,
    pub amount_applied: Money,
    pub accounts_credited: usize,
    /// Credits addressed to account numbers this institution does not hold.
    pub credits_unroutable: usize,
}
