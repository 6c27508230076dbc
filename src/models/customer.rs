use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use super::Money;

pub const CUSTOMER_COLLECTION: &str = "customer";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Savings,
    Loan,
}

impl Default for AccountKind {
    fn default() -> Self {
        AccountKind::Savings
    }
}

/// An account embedded in its owner's customer document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_number: String,
    pub balance: Money,
    /// Active flag.
    pub status: bool,
    #[serde(default)]
    pub kind: AccountKind,
    pub opened_at: DateTime<Utc>,
}

impl Account {
    pub fn open(account_number: String, balance: Money, kind: AccountKind) -> Self {
        Account {
            account_number,
            balance,
            status: true,
            kind,
            opened_at: Utc::now(),
        }
    }
}

/// The side of a transfer a movement on a customer record belongs to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MovementLeg {
    Debit,
    Credit,
    Reversal,
}

/// A transfer leg already written to the record. A write retried after its
/// acknowledgement was lost finds it here and does not move the money again.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMovement {
    pub transfer_id: String,
    pub leg: MovementLeg,
    pub applied_at: DateTime<Utc>,
}

/// An inter-bank credit already applied to one of the accounts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettledCredit {
    pub credit_id: String,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: i64,
    pub customer_id: String,
    pub email: String,
    pub name: String,
    pub mobile: String,
    pub pan: String,
    pub aadhaar: String,
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub applied_transfers: Vec<AppliedMovement>,
    #[serde(default)]
    pub settled_credits: Vec<SettledCredit>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn account(&self, account_number: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.account_number == account_number)
    }

    pub fn account_mut(&mut self, account_number: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.account_number == account_number)
    }

    pub fn owns(&self, account_number: &str) -> bool {
        self.account(account_number).is_some()
    }

    pub fn has_applied(&self, transfer_id: &str, leg: MovementLeg) -> bool {
        self.applied_transfers
            .iter()
            .any(|m| m.transfer_id == transfer_id && m.leg == leg)
    }

    pub fn has_settled(&self, credit_id: &str) -> bool {
        self.settled_credits.iter().any(|s| s.credit_id == credit_id)
    }
}

/// Identity fields a new customer is created from.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub email: String,
    pub name: String,
    pub mobile: String,
    pub pan: String,
    pub aadhaar: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateProfileDto {
    pub name: Option<String>,
    pub mobile: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub accounts: Vec<Account>,
}

impl From<Customer> for CustomerResponse {
    fn from(customer: Customer) -> Self {
        CustomerResponse {
            customer_id: customer.customer_id,
            name: customer.name,
            email: customer.email,
            mobile: customer.mobile,
            accounts: customer.accounts,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub account_number: String,
    pub balance: Money,
    pub status: bool,
    pub kind: AccountKind,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    pub accounts: Vec<AccountBalance>,
    pub total: Money,
}
