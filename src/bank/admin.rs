use chrono::Utc;
use log::{info, warn};

use crate::config::BankSettings;
use crate::models::{ADMIN_COLLECTION, ADMIN_CONFIG_ID, AdminConfig, Money, TransactionLimit};
use crate::store::{self, DocumentStore, StoreError};

use super::{BankError, BankResult, Session};

/// The institution's configuration singleton.
pub struct AdminSettings<'a> {
    store: &'a dyn DocumentStore,
    settings: &'a BankSettings,
}

impl<'a> AdminSettings<'a> {
    pub fn new(store: &'a dyn DocumentStore, settings: &'a BankSettings) -> Self {
        AdminSettings { store, settings }
    }

    /// Seeds the configuration document from settings when it is absent.
    /// An existing document keeps its limit; its routing code is brought in
    /// line with the configured one, which is what transfers and settlement
    /// run on.
    pub async fn ensure_config(&self) -> BankResult<AdminConfig> {
        if let Some(existing) = self.store.get(ADMIN_COLLECTION, ADMIN_CONFIG_ID).await? {
            let existing: AdminConfig = store::decode(existing)?;
            if existing.ifsc_code == self.settings.routing_code {
                return Ok(existing);
            }
            return self.align_routing_code(&existing.ifsc_code).await;
        }

        let config = AdminConfig {
            id: ADMIN_CONFIG_ID.to_string(),
            version: 0,
            transaction_limit: self.settings.default_transaction_limit,
            ifsc_code: self.settings.routing_code.clone(),
            admin_id: self.settings.admin_id.clone(),
            email: self.settings.admin_email.clone(),
            updated_by: None,
            updated_at: None,
        };
        match self.store.insert(ADMIN_COLLECTION, store::encode(&config)?).await {
            Ok(()) => {
                info!(
                    "Seeded configuration: routing code {}, transaction limit {}",
                    config.ifsc_code, config.transaction_limit
                );
                Ok(config)
            }
            // Another instance seeded it first.
            Err(StoreError::DuplicateKey { .. }) => self.config().await,
            Err(e) => Err(e.into()),
        }
    }

    async fn align_routing_code(&self, stored: &str) -> BankResult<AdminConfig> {
        let routing_code = self.settings.routing_code.as_str();
        warn!(
            "Stored routing code {} differs from the configured {}; using {}",
            stored, routing_code, routing_code
        );
        self.settings
            .retry
            .run("align routing code", move || async move {
                let mut config = self.config().await?;
                config.ifsc_code = routing_code.to_string();
                config.updated_at = Some(Utc::now());
                config.version = self
                    .store
                    .replace(ADMIN_COLLECTION, ADMIN_CONFIG_ID, config.version, store::encode(&config)?)
                    .await?;
                Ok(config)
            })
            .await
    }

    pub async fn config(&self) -> BankResult<AdminConfig> {
        match self.store.get(ADMIN_COLLECTION, ADMIN_CONFIG_ID).await? {
            Some(d) => Ok(store::decode(d)?),
            None => Err(BankError::not_found("Admin configuration is missing")),
        }
    }

    pub async fn get_transaction_limit(&self) -> BankResult<TransactionLimit> {
        let config = self.config().await?;
        Ok(TransactionLimit {
            limit: config.transaction_limit,
            routing_code: self.settings.routing_code.clone(),
        })
    }

    pub async fn set_transaction_limit(&self, session: &Session, limit: Money) -> BankResult<TransactionLimit> {
        if !session.is_admin() {
            return Err(BankError::Forbidden("Administrator access required".to_string()));
        }
        if !limit.is_positive() {
            return Err(BankError::validation("Transaction limit must be greater than zero"));
        }

        let (previous, updated) = self
            .settings
            .retry
            .run("set transaction limit", move || async move {
                let mut config = self.config().await?;
                let previous = config.transaction_limit;
                config.transaction_limit = limit;
                config.updated_by = Some(session.email.clone());
                config.updated_at = Some(Utc::now());
                config.version = self
                    .store
                    .replace(ADMIN_COLLECTION, ADMIN_CONFIG_ID, config.version, store::encode(&config)?)
                    .await?;
                Ok((previous, config))
            })
            .await?;

        info!(
            "Transaction limit changed from {} to {} by {}",
            previous, updated.transaction_limit, session.email
        );
        Ok(TransactionLimit {
            limit: updated.transaction_limit,
            routing_code: self.settings.routing_code.clone(),
        })
    }
}
