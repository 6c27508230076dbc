use rocket::figment::{Figment, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;
use std::env;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::bank::retry::RetryPolicy;
use crate::models::Money;

pub struct Config;

impl Config {
    fn figment() -> Figment {
        // Get the current profile
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(&profile)
            .merge(Env::prefixed("ROCKET_").ignore(&["PROFILE"]).global())
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| "default-secret".to_string())
    }

    pub fn jwt_refresh_secret() -> String {
        Self::figment()
            .extract_inner("jwt_refresh_secret")
            .unwrap_or_else(|_| "default-refresh-secret".to_string())
    }

    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(900)
    }

    pub fn jwt_refresh_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_refresh_expiry")
            .unwrap_or(604800)
    }

    /// `mongodb` or `memory`.
    pub fn store_backend() -> String {
        Self::figment()
            .extract_inner("store_backend")
            .unwrap_or_else(|_| "mongodb".to_string())
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
    }

    pub fn mongodb_database() -> String {
        Self::figment()
            .extract_inner("mongodb_database")
            .unwrap_or_else(|_| "modern-bank".to_string())
    }

    /// The shared cross-institution ledger lives in its own deployment.
    pub fn ledger_mongodb_uri() -> String {
        Self::figment()
            .extract_inner("ledger_mongodb_uri")
            .unwrap_or_else(|_| Self::mongodb_uri())
    }

    pub fn ledger_database() -> String {
        Self::figment()
            .extract_inner("ledger_database")
            .unwrap_or_else(|_| "bank-common-db".to_string())
    }

    /// Routing codes compare upper-cased everywhere.
    pub fn routing_code() -> String {
        Self::figment()
            .extract_inner::<String>("routing_code")
            .unwrap_or_else(|_| "MODB0000001".to_string())
            .trim()
            .to_ascii_uppercase()
    }

    pub fn opening_balance() -> i64 {
        Self::figment()
            .extract_inner("opening_balance")
            .unwrap_or(100000)
    }

    pub fn default_transaction_limit() -> i64 {
        Self::figment()
            .extract_inner("default_transaction_limit")
            .unwrap_or(100000)
    }

    pub fn admin_id() -> String {
        Self::figment()
            .extract_inner("admin_id")
            .unwrap_or_else(|_| "admin".to_string())
    }

    pub fn admin_email() -> Option<String> {
        Self::figment()
            .extract_inner("admin_email")
            .ok()
    }

    pub fn admin_password() -> Option<String> {
        Self::figment()
            .extract_inner("admin_password")
            .ok()
    }

    pub fn bcrypt_cost() -> u32 {
        Self::figment()
            .extract_inner("bcrypt_cost")
            .unwrap_or(bcrypt::DEFAULT_COST)
    }

    pub fn settlement_interval_secs() -> u64 {
        Self::figment()
            .extract_inner("settlement_interval_secs")
            .unwrap_or(300)
    }

    pub fn history_retention_days() -> u32 {
        Self::figment()
            .extract_inner("history_retention_days")
            .unwrap_or(30)
    }

    pub fn retry_max_attempts() -> u32 {
        Self::figment()
            .extract_inner("retry_max_attempts")
            .unwrap_or(5)
    }

    pub fn retry_initial_backoff_ms() -> u64 {
        Self::figment()
            .extract_inner("retry_initial_backoff_ms")
            .unwrap_or(20)
    }

    pub fn retry_max_backoff_ms() -> u64 {
        Self::figment()
            .extract_inner("retry_max_backoff_ms")
            .unwrap_or(1000)
    }

    pub fn mail_host() -> String {
        Self::figment()
            .extract_inner("mail_host")
            .unwrap_or_else(|_| "smtp.gmail.com".to_string())
    }

    pub fn mail_port() -> u16 {
        Self::figment()
            .extract_inner("mail_port")
            .unwrap_or(587)
    }

    pub fn mail_user() -> String {
        Self::figment()
            .extract_inner("mail_user")
            .unwrap_or_default()
    }

    pub fn mail_password() -> String {
        Self::figment()
            .extract_inner("mail_password")
            .unwrap_or_default()
    }

    pub fn mail_from() -> String {
        Self::figment()
            .extract_inner("mail_from")
            .unwrap_or_else(|_| "Modern Bank <noreply@modernbank.example>".to_string())
    }

    /// Resolves every workflow setting once, at startup.
    pub fn bank_settings() -> BankSettings {
        BankSettings {
            routing_code: Self::routing_code(),
            opening_balance: Money::new(Self::opening_balance()),
            default_transaction_limit: Money::new(Self::default_transaction_limit()),
            admin_id: Self::admin_id(),
            admin_email: Self::admin_email().unwrap_or_default(),
            bcrypt_cost: Self::bcrypt_cost(),
            history_retention_days: Self::history_retention_days(),
            retry: RetryPolicy {
                max_attempts: Self::retry_max_attempts(),
                initial_backoff: Duration::from_millis(Self::retry_initial_backoff_ms()),
                max_backoff: Duration::from_millis(Self::retry_max_backoff_ms()),
            },
        }
    }
}

/// Settings injected into the workflows instead of literals.
#[derive(Debug, Clone)]
pub struct BankSettings {
    pub routing_code: String,
    pub opening_balance: Money,
    pub default_transaction_limit: Money,
    pub admin_id: String,
    pub admin_email: String,
    pub bcrypt_cost: u32,
    /// How long applied transfer legs and settled credit ids stay on a
    /// customer record.
    pub history_retention_days: u32,
    pub retry: RetryPolicy,
}

impl BankSettings {
    /// Movement and settlement ids recorded before this instant may be pruned.
    pub fn history_cutoff(&self) -> DateTime<Utc> {
        TimeDelta::try_days(i64::from(self.history_retention_days))
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
