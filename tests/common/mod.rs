use std::sync::{Arc, Mutex};
use std::time::Duration;

use modern_bank::bank::{Bank, RetryPolicy};
use modern_bank::config::BankSettings;
use modern_bank::models::Money;
use modern_bank::services::{CredentialStore, Notifier};
use modern_bank::store::MemoryStore;
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::{Value, json};

pub const ADMIN_EMAIL: &str = "ops@modernbank.example";
pub const ADMIN_PASSWORD: &str = "admin-pass-123";
pub const ROUTING_CODE: &str = "MODB0000001";

#[derive(Default)]
pub struct Outbox {
    pub sent: Mutex<Vec<String>>,
}

#[rocket::async_trait]
impl Notifier for Outbox {
    async fn send_approval_notice(&self, email: &str, _name: &str) {
        self.sent.lock().unwrap().push(email.to_string());
    }
}

pub struct TestApp {
    pub client: Client,
    pub outbox: Arc<Outbox>,
}

pub async fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let outbox = Arc::new(Outbox::default());
    let settings = BankSettings {
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
    };
    let bank = Bank::new(
        store.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(CredentialStore::new(store)),
        outbox.clone(),
        settings,
    );
    bank.prepare(Some(ADMIN_PASSWORD)).await.unwrap();

    let client = Client::tracked(modern_bank::rocket_with(bank)).await.unwrap();
    TestApp { client, outbox }
}

pub fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}

impl TestApp {
    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (Status, Value) {
        let mut request = self
            .client
            .post(path)
            .header(ContentType::JSON)
            .body(body.to_string());
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        let response = request.dispatch().await;
        let status = response.status();
        (status, response.into_json::<Value>().await.unwrap_or(Value::Null))
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> (Status, Value) {
        let response = self
            .client
            .put(path)
            .header(ContentType::JSON)
            .header(bearer(token))
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json::<Value>().await.unwrap_or(Value::Null))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (Status, Value) {
        let mut request = self.client.get(path);
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        let response = request.dispatch().await;
        let status = response.status();
        (status, response.into_json::<Value>().await.unwrap_or(Value::Null))
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .post("/api/v1/auth/login", None, json!({ "email": email, "password": password }))
            .await;
        assert_eq!(status, Status::Ok, "{}", body);
        body["data"]["accessToken"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Signs up `email` and has the administrator approve it, returning the
    /// approved customer as the API shows it.
    pub async fn open_account(&self, email: &str) -> Value {
        let (status, body) = self
            .post("/api/v1/accounts/requests", None, signup(email))
            .await;
        assert_eq!(status, Status::Ok, "{}", body);

        let admin = self.admin_token().await;
        let (status, body) = self
            .post("/api/v1/admin/requests/approve", Some(&admin), json!({ "email": email }))
            .await;
        assert_eq!(status, Status::Ok, "{}", body);
        body["data"].clone()
    }
}

pub fn signup(email: &str) -> Value {
    json!({
        "email": email,
        "name": "Asha Kumar",
        "mobile": "9876543210",
        "pan": "data:image/png;base64,iVBORw0KGgo=",
        "aadhaar": "data:application/pdf;base64,JVBERi0xLjQ=",
        "password": "s3cret-pass"
    })
}
