use chrono::Utc;
use log::info;
use mongodb::bson::{doc, Document};

use crate::models::{
    Account, AccountBalance, BalanceSummary, CUSTOMER_COLLECTION, Customer, Money, NewCustomer,
    UpdateProfileDto,
};
use crate::store::{self, DocumentStore};
use crate::utils::{generate_six_digits, validate_mobile};

use super::{BankError, BankResult, RetryPolicy, Session};

const NUMBER_ATTEMPTS: usize = 20;

/// Resolves identities to customer records and owns every write to them.
pub struct Directory<'a> {
    store: &'a dyn DocumentStore,
    retry: &'a RetryPolicy,
}

impl<'a> Directory<'a> {
    pub fn new(store: &'a dyn DocumentStore, retry: &'a RetryPolicy) -> Self {
        Directory { store, retry }
    }

    async fn find_by(&self, filter: Document) -> BankResult<Option<Customer>> {
        match self.store.find_one(CUSTOMER_COLLECTION, filter).await? {
            Some(d) => Ok(Some(store::decode(d)?)),
            None => Ok(None),
        }
    }

    pub async fn lookup_by_email(&self, email: &str) -> BankResult<Option<Customer>> {
        self.find_by(doc! { "email": email }).await
    }

    pub async fn find_customer_by_email(&self, email: &str) -> BankResult<Customer> {
        self.lookup_by_email(email)
            .await?
            .ok_or_else(|| BankError::not_found(format!("No customer with email {}", email)))
    }

    pub async fn lookup_by_customer_id(&self, customer_id: &str) -> BankResult<Option<Customer>> {
        self.find_by(doc! { "customerId": customer_id }).await
    }

    pub async fn find_customer_by_customer_id(&self, customer_id: &str) -> BankResult<Customer> {
        self.lookup_by_customer_id(customer_id)
            .await?
            .ok_or_else(|| BankError::not_found(format!("Customer {} not found", customer_id)))
    }

    pub async fn lookup_by_account_number(&self, account_number: &str) -> BankResult<Option<Customer>> {
        self.find_by(doc! { "accounts.accountNumber": account_number }).await
    }

    pub async fn find_customer_by_account_number(&self, account_number: &str) -> BankResult<Customer> {
        self.lookup_by_account_number(account_number)
            .await?
            .ok_or_else(|| BankError::not_found(format!("Account {} not found", account_number)))
    }

    async fn load(&self, id: &str) -> BankResult<Customer> {
        match self.store.get(CUSTOMER_COLLECTION, id).await? {
            Some(d) => Ok(store::decode(d)?),
            None => Err(BankError::not_found("Customer record disappeared")),
        }
    }

    async fn save(&self, mut customer: Customer) -> BankResult<Customer> {
        customer.updated_at = Utc::now();
        let document = store::encode(&customer)?;
        customer.version = self
            .store
            .replace(CUSTOMER_COLLECTION, &customer.id, customer.version, document)
            .await?;
        Ok(customer)
    }

    /// Re-reads the customer stored under document id `id`, applies `mutate`
    /// and writes it back against the version read, retrying on conflict.
    /// An error from `mutate` aborts without writing.
    pub async fn modify<F>(&self, id: &str, label: &str, mutate: F) -> BankResult<Customer>
    where
        F: Fn(&mut Customer) -> BankResult<()> + Send + Sync,
    {
        let mutate = &mutate;
        self.retry
            .run(label, move || async move {
                let mut customer = self.load(id).await?;
                mutate(&mut customer)?;
                self.save(customer).await
            })
            .await
    }

    /// Inserts a customer record. Fails with `Conflict` when the email or
    /// customer id is already taken.
    pub async fn create_customer(
        &self,
        fields: NewCustomer,
        customer_id: &str,
        accounts: Vec<Account>,
    ) -> BankResult<Customer> {
        let now = Utc::now();
        let customer = Customer {
            id: uuid::Uuid::new_v4().to_string(),
            version: 0,
            customer_id: customer_id.to_string(),
            email: fields.email,
            name: fields.name,
            mobile: fields.mobile,
            pan: fields.pan,
            aadhaar: fields.aadhaar,
            accounts,
            applied_transfers: Vec::new(),
            settled_credits: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert(CUSTOMER_COLLECTION, store::encode(&customer)?)
            .await?;
        info!("Created customer {} for {}", customer.customer_id, customer.email);
        Ok(customer)
    }

    /// Appends `account` to the customer; a no-op when the account number is
    /// already on the record.
    pub async fn append_account(&self, customer_id: &str, account: Account) -> BankResult<Customer> {
        let customer = self.find_customer_by_customer_id(customer_id).await?;
        let account = &account;
        self.modify(&customer.id, "append account", move |c| {
            if !c.owns(&account.account_number) {
                c.accounts.push(account.clone());
            }
            Ok(())
        })
        .await
    }

    pub async fn generate_account_number(&self) -> BankResult<String> {
        for _ in 0..NUMBER_ATTEMPTS {
            let candidate = generate_six_digits();
            if self.lookup_by_account_number(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(BankError::Conflict("No free account number found".to_string()))
    }

    pub async fn generate_customer_id(&self) -> BankResult<String> {
        for _ in 0..NUMBER_ATTEMPTS {
            let candidate = generate_six_digits();
            if self.lookup_by_customer_id(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(BankError::Conflict("No free customer id found".to_string()))
    }

    pub async fn profile(&self, session: &Session) -> BankResult<Customer> {
        self.find_customer_by_email(&session.email).await
    }

    pub async fn balances(&self, session: &Session) -> BankResult<BalanceSummary> {
        let customer = self.find_customer_by_email(&session.email).await?;
        let total = Money::checked_sum(customer.accounts.iter().map(|a| a.balance))
            .ok_or_else(|| BankError::validation("Balance total out of range"))?;
        Ok(BalanceSummary {
            accounts: customer
                .accounts
                .into_iter()
                .map(|a| AccountBalance {
                    account_number: a.account_number,
                    balance: a.balance,
                    status: a.status,
                    kind: a.kind,
                })
                .collect(),
            total,
        })
    }

    /// Updates name and mobile. The email is the login identity and stays.
    pub async fn update_profile(&self, session: &Session, dto: &UpdateProfileDto) -> BankResult<Customer> {
        let name = dto.name.as_deref().map(str::trim);
        let mobile = dto.mobile.as_deref().map(str::trim);

        if name.is_none() && mobile.is_none() {
            return Err(BankError::validation("Nothing to update"));
        }
        if name.is_some_and(str::is_empty) {
            return Err(BankError::validation("Name cannot be empty"));
        }
        if let Some(mobile) = mobile {
            if !validate_mobile(mobile) {
                return Err(BankError::validation("Invalid mobile number"));
            }
        }

        let customer = self.find_customer_by_email(&session.email).await?;
        self.modify(&customer.id, "update profile", move |c| {
            if let Some(name) = name {
                c.name = name.to_string();
            }
            if let Some(mobile) = mobile {
                c.mobile = mobile.to_string();
            }
            Ok(())
        })
        .await
    }

    pub async fn deactivate_account(&self, session: &Session, account_number: &str) -> BankResult<Customer> {
        let customer = self.find_customer_by_email(&session.email).await?;
        if !customer.owns(account_number) {
            return Err(BankError::not_found(format!("Account {} not found", account_number)));
        }
        let updated = self
            .modify(&customer.id, "deactivate account", move |c| {
                let account = c
                    .account_mut(account_number)
                    .ok_or_else(|| BankError::not_found("Account not found"))?;
                account.status = false;
                Ok(())
            })
            .await?;
        info!("Account {} deactivated by {}", account_number, session.email);
        Ok(updated)
    }
}
