use chrono::Utc;
use log::{info, warn};
use mongodb::bson::doc;
use validator::Validate;

use crate::models::{
    Account, AccountKind, AccountRequest, CREATION_COLLECTION, Customer, LOAN_COLLECTION,
    LoanRequest, Money, NewCustomer, Provisioning, Role, SubmitAccountRequestDto,
};
use crate::store::{self, Page, StoreError};
use crate::utils::{validate_document_payload, validate_mobile};

use super::{Bank, BankError, BankResult, Session};

/// Pending account-creation and loan requests, and their approval.
///
/// Approval is resumable: the identifiers an approval provisions are first
/// claimed on the pending request, so a retry after a partial failure reuses
/// them and never opens a second account. The request is deleted last.
pub struct Approvals<'a> {
    bank: &'a Bank,
}

impl<'a> Approvals<'a> {
    pub fn new(bank: &'a Bank) -> Self {
        Approvals { bank }
    }

    // ==================== ACCOUNT REQUESTS ====================

    pub async fn submit_account_request(&self, dto: SubmitAccountRequestDto) -> BankResult<AccountRequest> {
        dto.validate()
            .map_err(|e| BankError::validation(format!("Validation error: {}", e)))?;
        let email = dto.email.trim().to_string();
        let name = dto.name.trim().to_string();
        if name.is_empty() {
            return Err(BankError::validation("Name cannot be empty"));
        }
        if !validate_mobile(&dto.mobile) {
            return Err(BankError::validation("Invalid mobile number"));
        }
        validate_document_payload(&dto.pan).map_err(|e| BankError::validation(format!("PAN: {}", e)))?;
        validate_document_payload(&dto.aadhaar)
            .map_err(|e| BankError::validation(format!("Aadhaar: {}", e)))?;

        if self.lookup_request(&email).await?.is_some() {
            return Err(BankError::validation("A request for this email is already pending"));
        }

        let password_hash = bcrypt::hash(&dto.password, self.bank.settings.bcrypt_cost)
            .map_err(|e| BankError::remote(format!("Failed to hash password: {}", e)))?;

        let request = AccountRequest {
            id: uuid::Uuid::new_v4().to_string(),
            version: 0,
            email,
            name,
            mobile: dto.mobile,
            pan: dto.pan,
            aadhaar: dto.aadhaar,
            password_hash,
            pending: true,
            progress: Provisioning::default(),
            created_at: Utc::now(),
        };
        match self
            .bank
            .store
            .insert(CREATION_COLLECTION, store::encode(&request)?)
            .await
        {
            Ok(()) => {
                info!("Account request submitted for {}", request.email);
                Ok(request)
            }
            Err(StoreError::DuplicateKey { .. }) => {
                Err(BankError::validation("A request for this email is already pending"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_account_requests(&self, page: Page) -> BankResult<Vec<AccountRequest>> {
        let documents = self
            .bank
            .store
            .find(CREATION_COLLECTION, doc! { "pending": true }, page)
            .await?;
        documents
            .into_iter()
            .map(|d| store::decode(d).map_err(BankError::from))
            .collect()
    }

    async fn lookup_request(&self, email: &str) -> BankResult<Option<AccountRequest>> {
        match self
            .bank
            .store
            .find_one(CREATION_COLLECTION, doc! { "email": email })
            .await?
        {
            Some(d) => Ok(Some(store::decode(d)?)),
            None => Ok(None),
        }
    }

    async fn pending_request(&self, email: &str) -> BankResult<AccountRequest> {
        self.lookup_request(email)
            .await?
            .ok_or_else(|| BankError::not_found(format!("No pending request for {}", email)))
    }

    async fn save_request(&self, request: &mut AccountRequest) -> BankResult<()> {
        request.version = self
            .bank
            .store
            .replace(
                CREATION_COLLECTION,
                &request.id,
                request.version,
                store::encode(&*request)?,
            )
            .await?;
        Ok(())
    }

    /// Persists the customer id and account number this approval will use.
    /// Claims made by an earlier attempt are kept unless another customer
    /// has taken them since.
    async fn claim_identifiers(&self, email: &str) -> BankResult<AccountRequest> {
        let directory = self.bank.directory();
        let directory = &directory;
        self.bank
            .settings
            .retry
            .run("claim account identifiers", move || async move {
                let mut request = self.pending_request(email).await?;
                let existing = directory.lookup_by_email(email).await?;

                let customer_id = match (&existing, request.progress.customer_id.clone()) {
                    (Some(customer), _) => customer.customer_id.clone(),
                    (None, Some(claimed)) => {
                        if directory.lookup_by_customer_id(&claimed).await?.is_none() {
                            claimed
                        } else {
                            directory.generate_customer_id().await?
                        }
                    }
                    (None, None) => directory.generate_customer_id().await?,
                };

                let account_number = match request.progress.account_number.clone() {
                    Some(claimed) => match directory.lookup_by_account_number(&claimed).await? {
                        None => claimed,
                        Some(owner) if owner.email == email => claimed,
                        Some(_) => {
                            warn!("Claimed account {} was taken, choosing another", claimed);
                            directory.generate_account_number().await?
                        }
                    },
                    None => directory.generate_account_number().await?,
                };

                let progress = Provisioning {
                    customer_id: Some(customer_id),
                    account_number: Some(account_number),
                    credential_id: request.progress.credential_id.clone(),
                };
                if progress != request.progress {
                    request.progress = progress;
                    self.save_request(&mut request).await?;
                }
                Ok(request)
            })
            .await
    }

    /// Opens the claimed account on the existing or a new customer record.
    async fn provision_account(&self, request: &AccountRequest) -> BankResult<Customer> {
        let directory = self.bank.directory();
        let (Some(customer_id), Some(account_number)) = (
            request.progress.customer_id.as_deref(),
            request.progress.account_number.as_deref(),
        ) else {
            return Err(BankError::Conflict("Provisioning identifiers were not claimed".to_string()));
        };
        let account = Account::open(
            account_number.to_string(),
            self.bank.settings.opening_balance,
            AccountKind::Savings,
        );

        if let Some(customer) = directory.lookup_by_email(&request.email).await? {
            return directory.append_account(&customer.customer_id, account).await;
        }

        let fields = NewCustomer {
            email: request.email.clone(),
            name: request.name.clone(),
            mobile: request.mobile.clone(),
            pan: request.pan.clone(),
            aadhaar: request.aadhaar.clone(),
        };
        match directory
            .create_customer(fields, customer_id, vec![account.clone()])
            .await
        {
            Ok(customer) => Ok(customer),
            // Either a concurrent approval created the customer, or one of the
            // claimed identifiers collided and the next attempt reclaims.
            Err(BankError::Conflict(detail)) => match directory.lookup_by_email(&request.email).await? {
                Some(customer) => directory.append_account(&customer.customer_id, account).await,
                None => Err(BankError::Conflict(detail)),
            },
            Err(e) => Err(e),
        }
    }

    async fn record_credential(&self, email: &str, credential_id: &str) -> BankResult<()> {
        self.bank
            .settings
            .retry
            .run("record credential", move || async move {
                let mut request = self.pending_request(email).await?;
                if request.progress.credential_id.as_deref() == Some(credential_id) {
                    return Ok(());
                }
                request.progress.credential_id = Some(credential_id.to_string());
                self.save_request(&mut request).await
            })
            .await
    }

    async fn approve_once(&self, email: &str) -> BankResult<Customer> {
        let request = self.claim_identifiers(email).await?;
        let customer = self.provision_account(&request).await?;

        let credential_id = self
            .bank
            .identity
            .register_credential(&request.email, &request.password_hash, Role::Customer)
            .await?;
        if request.progress.credential_id.as_deref() != Some(credential_id.as_str()) {
            self.record_credential(email, &credential_id).await?;
        }

        self.bank
            .notifier
            .send_approval_notice(&request.email, &request.name)
            .await;

        self.bank.store.delete(CREATION_COLLECTION, &request.id).await?;
        info!(
            "Approved account request for {}: customer {}, account {}",
            request.email,
            customer.customer_id,
            request.progress.account_number.as_deref().unwrap_or_default()
        );
        Ok(customer)
    }

    /// Provisions the account for a pending request and removes the request.
    pub async fn approve_account_creation(&self, email: &str) -> BankResult<Customer> {
        let email = email.trim();
        self.bank
            .settings
            .retry
            .run("approve account request", move || self.approve_once(email))
            .await
    }

    pub async fn reject_account_request(&self, email: &str) -> BankResult<()> {
        let request = self.pending_request(email.trim()).await?;
        self.bank.store.delete(CREATION_COLLECTION, &request.id).await?;
        info!("Rejected account request for {}", request.email);
        Ok(())
    }

    // ==================== LOAN REQUESTS ====================

    pub async fn submit_loan_request(
        &self,
        session: &Session,
        amount: Money,
        purpose: &str,
    ) -> BankResult<LoanRequest> {
        if !amount.is_positive() {
            return Err(BankError::validation("Loan amount must be greater than zero"));
        }
        let purpose = purpose.trim();
        if purpose.is_empty() {
            return Err(BankError::validation("Loan purpose is required"));
        }

        let customer = self.bank.directory().find_customer_by_email(&session.email).await?;
        if self.lookup_loan(&customer.customer_id).await?.is_some() {
            return Err(BankError::validation("A loan request is already pending"));
        }

        let loan = LoanRequest {
            id: uuid::Uuid::new_v4().to_string(),
            version: 0,
            customer_id: customer.customer_id,
            loan_amount: amount,
            loan_purpose: purpose.to_string(),
            pending: true,
            account_number: None,
            created_at: Utc::now(),
        };
        match self.bank.store.insert(LOAN_COLLECTION, store::encode(&loan)?).await {
            Ok(()) => {
                info!("Loan of {} requested by customer {}", loan.loan_amount, loan.customer_id);
                Ok(loan)
            }
            Err(StoreError::DuplicateKey { .. }) => {
                Err(BankError::validation("A loan request is already pending"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_loan_requests(&self, page: Page) -> BankResult<Vec<LoanRequest>> {
        let documents = self
            .bank
            .store
            .find(LOAN_COLLECTION, doc! { "pending": true }, page)
            .await?;
        documents
            .into_iter()
            .map(|d| store::decode(d).map_err(BankError::from))
            .collect()
    }

    async fn lookup_loan(&self, customer_id: &str) -> BankResult<Option<LoanRequest>> {
        match self
            .bank
            .store
            .find_one(LOAN_COLLECTION, doc! { "customerId": customer_id })
            .await?
        {
            Some(d) => Ok(Some(store::decode(d)?)),
            None => Ok(None),
        }
    }

    async fn pending_loan(&self, customer_id: &str) -> BankResult<LoanRequest> {
        self.lookup_loan(customer_id)
            .await?
            .ok_or_else(|| BankError::not_found(format!("No pending loan for customer {}", customer_id)))
    }

    async fn claim_loan_account(&self, customer_id: &str) -> BankResult<LoanRequest> {
        let directory = self.bank.directory();
        let directory = &directory;
        self.bank
            .settings
            .retry
            .run("claim loan account", move || async move {
                let mut loan = self.pending_loan(customer_id).await?;
                if let Some(claimed) = &loan.account_number {
                    match directory.lookup_by_account_number(claimed).await? {
                        None => return Ok(loan),
                        Some(owner) if owner.customer_id == customer_id => return Ok(loan),
                        Some(_) => warn!("Claimed loan account {} was taken, choosing another", claimed),
                    }
                }
                loan.account_number = Some(directory.generate_account_number().await?);
                loan.version = self
                    .bank
                    .store
                    .replace(LOAN_COLLECTION, &loan.id, loan.version, store::encode(&loan)?)
                    .await?;
                Ok(loan)
            })
            .await
    }

    async fn approve_loan_once(&self, customer_id: &str, amount: Option<Money>) -> BankResult<Customer> {
        let loan = self.pending_loan(customer_id).await?;
        if let Some(amount) = amount {
            if amount != loan.loan_amount {
                return Err(BankError::validation(format!(
                    "Approved amount {} does not match the requested {}",
                    amount, loan.loan_amount
                )));
            }
        }
        // Make sure the customer exists before claiming anything for them.
        self.bank.directory().find_customer_by_customer_id(customer_id).await?;

        let loan = self.claim_loan_account(customer_id).await?;
        let account_number = loan
            .account_number
            .clone()
            .ok_or_else(|| BankError::Conflict("Loan account was not claimed".to_string()))?;
        let account = Account::open(account_number.clone(), loan.loan_amount, AccountKind::Loan);
        let customer = self.bank.directory().append_account(customer_id, account).await?;

        self.bank
            .notifier
            .send_approval_notice(&customer.email, &customer.name)
            .await;

        self.bank.store.delete(LOAN_COLLECTION, &loan.id).await?;
        info!(
            "Approved loan of {} for customer {} into account {}",
            loan.loan_amount, customer_id, account_number
        );
        Ok(customer)
    }

    /// Opens a loan account funded with the requested amount. A caller-supplied
    /// amount must equal the one on the request.
    pub async fn approve_loan(&self, customer_id: &str, amount: Option<Money>) -> BankResult<Customer> {
        self.bank
            .settings
            .retry
            .run("approve loan", move || self.approve_loan_once(customer_id, amount))
            .await
    }

    pub async fn deny_loan(&self, customer_id: &str) -> BankResult<()> {
        let loan = self.pending_loan(customer_id).await?;
        self.bank.store.delete(LOAN_COLLECTION, &loan.id).await?;
        info!("Denied loan of {} for customer {}", loan.loan_amount, customer_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::testutil::{self, Fixture};
    use crate::models::{CUSTOMER_COLLECTION, Credential, CREDENTIAL_COLLECTION};
    use crate::store::DocumentStore;

    #[tokio::test]
    async fn approval_provisions_customer_credential_and_notice() {
        let fx = Fixture::new().await;
        fx.submit_request("asha@example.com").await;

        let customer = fx
            .bank
            .approvals()
            .approve_account_creation("asha@example.com")
            .await
            .unwrap();

        assert_eq!(customer.accounts.len(), 1);
        assert_eq!(customer.accounts[0].balance, Money::new(100000));
        assert_eq!(customer.accounts[0].kind, AccountKind::Savings);
        assert_eq!(fx.pending_requests().await, 0);
        assert_eq!(fx.notifier.recipients(), vec!["asha@example.com".to_string()]);

        let credential: Credential = fx
            .document(CREDENTIAL_COLLECTION, "asha@example.com")
            .await
            .unwrap();
        assert_eq!(credential.role, Role::Customer);
        let tokens = fx
            .bank
            .identity
            .authenticate("asha@example.com", "s3cret-pass")
            .await
            .unwrap();
        assert_eq!(tokens.role, Role::Customer);
    }

    #[tokio::test]
    async fn approving_twice_provisions_one_account() {
        let fx = Fixture::new().await;
        fx.submit_request("asha@example.com").await;

        let approvals = fx.bank.approvals();
        let (first, second) = tokio::join!(
            approvals.approve_account_creation("asha@example.com"),
            approvals.approve_account_creation("asha@example.com"),
        );
        assert!(first.is_ok() || second.is_ok());

        let again = approvals.approve_account_creation("asha@example.com").await;
        assert!(matches!(again, Err(BankError::NotFound(_))));

        let customer = fx.customer("asha@example.com").await;
        assert_eq!(customer.accounts.len(), 1);
        assert_eq!(fx.store.count(CUSTOMER_COLLECTION, doc! {}).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn second_request_appends_to_existing_customer() {
        let fx = Fixture::new().await;
        fx.seed_customer("asha@example.com", "111111", &[("222222", 500)]).await;
        fx.submit_request("asha@example.com").await;

        let customer = fx
            .bank
            .approvals()
            .approve_account_creation("asha@example.com")
            .await
            .unwrap();
        assert_eq!(customer.customer_id, "111111");
        assert_eq!(customer.accounts.len(), 2);
        assert_eq!(customer.accounts[0].account_number, "222222");
    }

    #[tokio::test]
    async fn failed_approval_resumes_without_a_second_account() {
        let fx = Fixture::new().await;
        fx.seed_customer("asha@example.com", "111111", &[("222222", 500)]).await;
        fx.submit_request("asha@example.com").await;
        let customer = fx.customer("asha@example.com").await;

        // The account append keeps failing through every retry, so the first
        // approval gives up after claiming its identifiers.
        fx.store.fail_replaces(CUSTOMER_COLLECTION, &customer.id, 9);
        let failed = fx.bank.approvals().approve_account_creation("asha@example.com").await;
        assert!(failed.is_err());
        assert_eq!(fx.pending_requests().await, 1);

        let request = fx
            .bank
            .approvals()
            .list_account_requests(Page::all())
            .await
            .unwrap()
            .remove(0);
        let claimed = request.progress.account_number.clone().unwrap();

        let customer = fx
            .bank
            .approvals()
            .approve_account_creation("asha@example.com")
            .await
            .unwrap();
        assert_eq!(customer.accounts.len(), 2);
        assert_eq!(customer.accounts[1].account_number, claimed);
        assert_eq!(fx.pending_requests().await, 0);
    }

    #[tokio::test]
    async fn submissions_are_validated_before_writing() {
        let fx = Fixture::new().await;
        let approvals = fx.bank.approvals();

        let mut bad_mobile = testutil::signup("asha@example.com");
        bad_mobile.mobile = "12345".to_string();
        assert!(matches!(
            approvals.submit_account_request(bad_mobile).await,
            Err(BankError::Validation(_))
        ));

        let mut short_password = testutil::signup("asha@example.com");
        short_password.password = "short".to_string();
        assert!(matches!(
            approvals.submit_account_request(short_password).await,
            Err(BankError::Validation(_))
        ));

        let mut bad_document = testutil::signup("asha@example.com");
        bad_document.pan = "data:text/plain;base64,aGVsbG8=".to_string();
        assert!(matches!(
            approvals.submit_account_request(bad_document).await,
            Err(BankError::Validation(_))
        ));
        assert_eq!(fx.pending_requests().await, 0);

        fx.submit_request("asha@example.com").await;
        let duplicate = approvals.submit_account_request(testutil::signup("asha@example.com")).await;
        assert!(matches!(duplicate, Err(BankError::Validation(_))));
    }

    #[tokio::test]
    async fn stored_request_never_holds_the_password() {
        let fx = Fixture::new().await;
        let request = fx
            .bank
            .approvals()
            .submit_account_request(testutil::signup("asha@example.com"))
            .await
            .unwrap();
        assert_ne!(request.password_hash, "s3cret-pass");
        assert!(bcrypt::verify("s3cret-pass", &request.password_hash).unwrap());
    }

    #[tokio::test]
    async fn rejection_removes_only_the_request() {
        let fx = Fixture::new().await;
        fx.submit_request("asha@example.com").await;
        fx.bank.approvals().reject_account_request("asha@example.com").await.unwrap();
        assert_eq!(fx.pending_requests().await, 0);
        assert!(fx.bank.directory().lookup_by_email("asha@example.com").await.unwrap().is_none());
        assert!(fx.notifier.recipients().is_empty());
    }

    #[tokio::test]
    async fn loan_is_disbursed_at_the_requested_amount() {
        let fx = Fixture::new().await;
        fx.seed_customer("chen@example.com", "123123", &[("333333", 1000)]).await;
        let session = testutil::customer_session("chen@example.com");
        fx.bank
            .approvals()
            .submit_loan_request(&session, Money::new(50000), "Home repair")
            .await
            .unwrap();

        let customer = fx
            .bank
            .approvals()
            .approve_loan("123123", Some(Money::new(50000)))
            .await
            .unwrap();
        let loan = customer.accounts.last().unwrap();
        assert_eq!(loan.kind, AccountKind::Loan);
        assert_eq!(loan.balance, Money::new(50000));
        assert!(fx.bank.approvals().lookup_loan("123123").await.unwrap().is_none());
        assert_eq!(fx.notifier.recipients(), vec!["chen@example.com".to_string()]);
    }

    #[tokio::test]
    async fn loan_amount_mismatch_changes_nothing() {
        let fx = Fixture::new().await;
        fx.seed_customer("chen@example.com", "123123", &[("333333", 1000)]).await;
        let session = testutil::customer_session("chen@example.com");
        let approvals = fx.bank.approvals();
        approvals
            .submit_loan_request(&session, Money::new(50000), "Home repair")
            .await
            .unwrap();

        let mismatch = approvals.approve_loan("123123", Some(Money::new(75000))).await;
        assert!(matches!(mismatch, Err(BankError::Validation(_))));
        assert_eq!(fx.customer("chen@example.com").await.accounts.len(), 1);
        assert!(approvals.lookup_loan("123123").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn one_pending_loan_per_customer_and_denial() {
        let fx = Fixture::new().await;
        fx.seed_customer("chen@example.com", "123123", &[("333333", 1000)]).await;
        let session = testutil::customer_session("chen@example.com");
        let approvals = fx.bank.approvals();

        let zero = approvals.submit_loan_request(&session, Money::ZERO, "Nothing").await;
        assert!(matches!(zero, Err(BankError::Validation(_))));

        approvals
            .submit_loan_request(&session, Money::new(20000), "Car")
            .await
            .unwrap();
        let second = approvals.submit_loan_request(&session, Money::new(1000), "Bike").await;
        assert!(matches!(second, Err(BankError::Validation(_))));

        approvals.deny_loan("123123").await.unwrap();
        assert!(approvals.list_loan_requests(Page::all()).await.unwrap().is_empty());
        assert_eq!(fx.customer("chen@example.com").await.accounts.len(), 1);
        assert!(matches!(approvals.deny_loan("123123").await, Err(BankError::NotFound(_))));
    }
}
