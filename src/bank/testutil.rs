use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::BankSettings;
use crate::models::{
    Account, AccountKind, CREATION_COLLECTION, Customer, Money, NewCustomer, Role,
    SubmitAccountRequestDto,
};
use crate::services::{CredentialStore, Notifier};
use crate::store::{self, DocumentStore, MemoryStore};

use super::{Bank, RetryPolicy, Session};

pub const ROUTING_CODE: &str = "MODB0000001";
pub const ADMIN_EMAIL: &str = "ops@modernbank.example";
pub const ADMIN_PASSWORD: &str = "admin-pass-123";

/// Records notices instead of mailing them.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }
}

#[rocket::async_trait]
impl Notifier for RecordingNotifier {
    async fn send_approval_notice(&self, email: &str, name: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), name.to_string()));
    }
}

pub fn settings() -> BankSettings {
    BankSettings {
        routing_code: ROUTING_CODE.to_string(),
        opening_balance: Money::new(100000),
        default_transaction_limit: Money::new(100000),
        admin_id: "admin".to_string(),
        admin_email: ADMIN_EMAIL.to_string(),
        bcrypt_cost: 4,
        history_retention_days: 30,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
    }
}

/// A bank on in-memory stores, with handles on the concrete stores so tests
/// can inspect documents and inject failures.
pub struct Fixture {
    pub bank: Bank,
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_ledger(Arc::new(MemoryStore::new())).await
    }

    /// A second institution can share `ledger` with the first.
    pub async fn with_ledger(ledger: Arc<MemoryStore>) -> Self {
        Self::with(ledger, settings()).await
    }

    pub async fn with(ledger: Arc<MemoryStore>, settings: BankSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let bank = Bank::new(
            store.clone(),
            ledger.clone(),
            Arc::new(CredentialStore::new(store.clone())),
            notifier.clone(),
            settings,
        );
        bank.prepare(Some(ADMIN_PASSWORD)).await.unwrap();
        Fixture {
            bank,
            store,
            ledger,
            notifier,
        }
    }

    pub async fn customer(&self, email: &str) -> Customer {
        self.bank.directory().find_customer_by_email(email).await.unwrap()
    }

    pub async fn balance(&self, account_number: &str) -> Money {
        let customer = self
            .bank
            .directory()
            .find_customer_by_account_number(account_number)
            .await
            .unwrap();
        customer.account(account_number).unwrap().balance
    }

    /// Creates a customer holding savings accounts with the given balances.
    pub async fn seed_customer(&self, email: &str, customer_id: &str, accounts: &[(&str, i64)]) -> Customer {
        let accounts = accounts
            .iter()
            .map(|(number, balance)| {
                Account::open(number.to_string(), Money::new(*balance), AccountKind::Savings)
            })
            .collect();
        self.bank
            .directory()
            .create_customer(
                NewCustomer {
                    email: email.to_string(),
                    name: "Test Customer".to_string(),
                    mobile: "9876543210".to_string(),
                    pan: document(),
                    aadhaar: document(),
                },
                customer_id,
                accounts,
            )
            .await
            .unwrap()
    }

    pub async fn submit_request(&self, email: &str) {
        self.bank
            .approvals()
            .submit_account_request(signup(email))
            .await
            .unwrap();
    }

    pub async fn pending_requests(&self) -> u64 {
        self.store
            .count(CREATION_COLLECTION, mongodb::bson::doc! {})
            .await
            .unwrap()
    }

    pub async fn document<T: serde::de::DeserializeOwned>(&self, collection: &str, id: &str) -> Option<T> {
        self.store
            .get(collection, id)
            .await
            .unwrap()
            .map(|d| store::decode(d).unwrap())
    }
}

pub async fn bank() -> Bank {
    Fixture::new().await.bank
}

pub fn admin_session() -> Session {
    Session {
        email: ADMIN_EMAIL.to_string(),
        role: Role::Admin,
    }
}

pub fn customer_session(email: &str) -> Session {
    Session {
        email: email.to_string(),
        role: Role::Customer,
    }
}

pub fn document() -> String {
    "data:image/png;base64,iVBORw0KGgo=".to_string()
}

pub fn signup(email: &str) -> SubmitAccountRequestDto {
    SubmitAccountRequestDto {
        email: email.to_string(),
        name: "Asha Kumar".to_string(),
        mobile: "9876543210".to_string(),
        pan: document(),
        aadhaar: document(),
        password: "s3cret-pass".to_string(),
    }
}
