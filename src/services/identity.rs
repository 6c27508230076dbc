use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use mongodb::bson::doc;

use crate::bank::{BankError, BankResult, Session};
use crate::models::{CREDENTIAL_COLLECTION, Credential, Role};
use crate::services::JwtService;
use crate::store::{self, DocumentStore, StoreError};

/// Tokens handed out after a successful login.
#[derive(Debug, Clone, serde::Serialize, rocket_okapi::okapi::schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub role: Role,
}

#[rocket::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registers a login for `email`. Registering an email that already has a
    /// credential returns the existing identity id and changes nothing.
    async fn register_credential(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> BankResult<String>;

    async fn authenticate(&self, email: &str, password: &str) -> BankResult<AuthTokens>;
}

/// Credentials kept alongside the institution's documents, bcrypt hashed.
pub struct CredentialStore {
    store: Arc<dyn DocumentStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        CredentialStore { store }
    }

    async fn load(&self, email: &str) -> BankResult<Option<Credential>> {
        match self.store.get(CREDENTIAL_COLLECTION, email).await? {
            Some(d) => Ok(Some(store::decode(d)?)),
            None => Ok(None),
        }
    }
}

#[rocket::async_trait]
impl IdentityProvider for CredentialStore {
    async fn register_credential(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> BankResult<String> {
        if let Some(existing) = self.load(email).await? {
            return Ok(existing.identity_id);
        }

        let credential = Credential {
            email: email.to_string(),
            version: 0,
            identity_id: uuid::Uuid::new_v4().to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: Utc::now(),
        };
        match self
            .store
            .insert(CREDENTIAL_COLLECTION, store::encode(&credential)?)
            .await
        {
            Ok(()) => {
                info!("Registered {:?} credential for {}", role, email);
                Ok(credential.identity_id)
            }
            // Lost a race with a concurrent registration of the same email.
            Err(StoreError::DuplicateKey { .. }) => self
                .load(email)
                .await?
                .map(|c| c.identity_id)
                .ok_or_else(|| BankError::Conflict(format!("credential for {}", email))),
            Err(e) => Err(e.into()),
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> BankResult<AuthTokens> {
        let rejected = || BankError::Unauthorized("Invalid email or password".to_string());

        let credential = self.load(email).await?.ok_or_else(rejected)?;
        let valid = bcrypt::verify(password, &credential.password_hash).unwrap_or_else(|e| {
            warn!("Unreadable password hash for {}: {}", email, e);
            false
        });
        if !valid {
            return Err(rejected());
        }

        let session = Session {
            email: credential.email,
            role: credential.role,
        };
        let access_token = JwtService::generate_access_token(&session)
            .map_err(|e| BankError::remote(e.to_string()))?;
        let refresh_token = JwtService::generate_refresh_token(&session)
            .map_err(|e| BankError::remote(e.to_string()))?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            role: session.role,
        })
    }
}
