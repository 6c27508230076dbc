use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Money;

pub const LEDGER_COLLECTION: &str = "common_db";

/// One institution's inbox on the shared ledger, keyed by its routing code.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LedgerDocument {
    #[serde(rename = "_id")]
    pub routing_code: String,
    pub version: i64,
    /// Receiver account number to its unsettled credits.
    #[serde(default)]
    pub accounts: BTreeMap<String, Vec<PendingCredit>>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerDocument {
    pub fn empty(routing_code: &str) -> Self {
        LedgerDocument {
            routing_code: routing_code.to_string(),
            version: 0,
            accounts: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.accounts.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingCredit {
    pub credit_id: String,
    pub credit_amount: Money,
    pub sender_account_number: String,
    pub sender_routing_code: String,
    pub created_at: DateTime<Utc>,
}
