//! Banking workflows.
//!
//! Each component borrows the shared [`Bank`] handles and runs one family of
//! workflows: the directory of customers, approvals, transfers, inter-bank
//! settlement and the administrator's configuration.

pub mod admin;
pub mod approval;
pub mod directory;
pub mod error;
pub mod retry;
pub mod settlement;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::BankSettings;
use crate::models::{
    CREATION_COLLECTION, CREDENTIAL_COLLECTION, CUSTOMER_COLLECTION, LOAN_COLLECTION, Role,
};
use crate::services::identity::IdentityProvider;
use crate::services::email::Notifier;
use crate::store::DocumentStore;

pub use admin::AdminSettings;
pub use approval::Approvals;
pub use directory::Directory;
pub use error::{BankError, BankResult};
pub use retry::RetryPolicy;
pub use settlement::Settlement;
pub use transfer::Transfers;

/// The authenticated caller of a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Shared handles every workflow runs against.
#[derive(Clone)]
pub struct Bank {
    pub store: Arc<dyn DocumentStore>,
    /// The cross-institution ledger, usually a different deployment.
    pub ledger: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: Arc<BankSettings>,
    settlement_lock: Arc<Mutex<()>>,
}

impl Bank {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ledger: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
        settings: BankSettings,
    ) -> Self {
        Bank {
            store,
            ledger,
            identity,
            notifier,
            settings: Arc::new(settings),
            settlement_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn directory(&self) -> Directory<'_> {
        Directory::new(self.store.as_ref(), &self.settings.retry)
    }

    pub fn approvals(&self) -> Approvals<'_> {
        Approvals::new(self)
    }

    pub fn transfers(&self) -> Transfers<'_> {
        Transfers::new(self)
    }

    pub fn settlement(&self) -> Settlement<'_> {
        Settlement::new(self, &self.settlement_lock)
    }

    pub fn admin(&self) -> AdminSettings<'_> {
        AdminSettings::new(self.store.as_ref(), &self.settings)
    }

    /// Creates the unique indexes and the configuration singleton, and the
    /// bootstrap administrator credential when one is configured.
    pub async fn prepare(&self, admin_password: Option<&str>) -> BankResult<()> {
        let store = self.store.as_ref();
        store.ensure_unique(CUSTOMER_COLLECTION, "email").await?;
        store.ensure_unique(CUSTOMER_COLLECTION, "customerId").await?;
        store.ensure_unique(CUSTOMER_COLLECTION, "accounts.accountNumber").await?;
        store.ensure_unique(CREATION_COLLECTION, "email").await?;
        store.ensure_unique(LOAN_COLLECTION, "customerId").await?;
        store.ensure_unique(CREDENTIAL_COLLECTION, "identityId").await?;

        self.admin().ensure_config().await?;

        if let Some(password) = admin_password {
            let email = &self.settings.admin_email;
            if email.is_empty() {
                log::warn!("admin_password is set without admin_email; no administrator bootstrapped");
            } else {
                let hash = bcrypt::hash(password, self.settings.bcrypt_cost)
                    .map_err(|e| BankError::remote(format!("Failed to hash password: {}", e)))?;
                self.identity.register_credential(email, &hash, Role::Admin).await?;
            }
        }
        Ok(())
    }
}
