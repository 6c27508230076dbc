use chrono::{DateTime, Utc};
use log::{error, info, warn};
use mongodb::bson::doc;

use crate::models::{
    AppliedMovement, Customer, LEDGER_COLLECTION, LedgerDocument, Money, MovementLeg, PendingCredit,
    SendMoneyDto, TRANSFER_COLLECTION, TransferKind, TransferReceipt, TransferRecord, TransferStatus,
};
use crate::store::{self, Page, StoreError};
use crate::utils::{validate_account_number, validate_routing_code};

use super::{Bank, BankError, BankResult, Session};

/// Takes `amount` out of an active account, refusing to go negative.
fn debit(customer: &mut Customer, account_number: &str, amount: Money) -> BankResult<()> {
    let account = customer
        .account_mut(account_number)
        .ok_or_else(|| BankError::not_found(format!("Account {} not found", account_number)))?;
    if !account.status {
        return Err(BankError::validation(format!("Account {} is inactive", account_number)));
    }
    account.balance = account
        .balance
        .checked_sub(amount)
        .filter(|b| !b.is_negative())
        .ok_or_else(|| BankError::validation("Insufficient funds"))?;
    Ok(())
}

fn credit(customer: &mut Customer, account_number: &str, amount: Money) -> BankResult<()> {
    let account = customer
        .account_mut(account_number)
        .ok_or_else(|| BankError::not_found(format!("Account {} not found", account_number)))?;
    account.balance = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| BankError::validation("Balance out of range"))?;
    Ok(())
}

/// Applies one leg of `transfer_id` to `account_number` unless the record
/// already carries it. Legs recorded before `cutoff` are dropped.
fn apply_leg(
    customer: &mut Customer,
    transfer_id: &str,
    leg: MovementLeg,
    account_number: &str,
    amount: Money,
    cutoff: DateTime<Utc>,
) -> BankResult<()> {
    customer.applied_transfers.retain(|m| m.applied_at >= cutoff);
    if customer.has_applied(transfer_id, leg) {
        return Ok(());
    }
    match leg {
        MovementLeg::Debit => debit(customer, account_number, amount)?,
        MovementLeg::Credit | MovementLeg::Reversal => credit(customer, account_number, amount)?,
    }
    customer.applied_transfers.push(AppliedMovement {
        transfer_id: transfer_id.to_string(),
        leg,
        applied_at: Utc::now(),
    });
    Ok(())
}

fn balance_of(customer: &Customer, account_number: &str) -> Money {
    customer
        .account(account_number)
        .map(|a| a.balance)
        .unwrap_or_default()
}

/// Checks a debit against the last read of the sender, before any write.
fn check_sender(customer: &Customer, account_number: &str, amount: Money) -> BankResult<()> {
    let mut trial = customer.clone();
    debit(&mut trial, account_number, amount)
}

fn new_transfer_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Money movement between accounts.
///
/// Transfers that touch two documents run as a saga: the sender is debited
/// first, then the receiver side is written. When the receiver side fails for
/// good the debit is reversed and the journal entry says so. Every leg is
/// stamped with the transfer id on the record it changes, so retrying a write
/// whose outcome is unknown never applies it twice.
pub struct Transfers<'a> {
    bank: &'a Bank,
}

impl<'a> Transfers<'a> {
    pub fn new(bank: &'a Bank) -> Self {
        Transfers { bank }
    }

    /// Moves funds between two accounts of the caller in one write.
    pub async fn self_transfer(
        &self,
        session: &Session,
        from_account: &str,
        to_account: &str,
        amount: Money,
    ) -> BankResult<TransferReceipt> {
        if !amount.is_positive() {
            return Err(BankError::validation("Amount must be greater than zero"));
        }
        if from_account == to_account {
            return Err(BankError::validation("Cannot transfer to the same account"));
        }

        let directory = self.bank.directory();
        let customer = directory.find_customer_by_email(&session.email).await?;
        let receiver = customer
            .account(to_account)
            .ok_or_else(|| BankError::not_found(format!("Account {} not found", to_account)))?;
        if !receiver.status {
            return Err(BankError::validation(format!("Account {} is inactive", to_account)));
        }
        check_sender(&customer, from_account, amount)?;

        let transfer_id = new_transfer_id();
        let updated = self
            .move_within(&customer.id, "self transfer", &transfer_id, from_account, to_account, amount)
            .await?;

        self.journal(
            &transfer_id,
            TransferKind::SelfTransfer,
            TransferStatus::Completed,
            session,
            from_account,
            to_account,
            &self.bank.settings.routing_code,
            amount,
        )
        .await;
        info!(
            "Self transfer of {} from {} to {} by {}",
            amount, from_account, to_account, session.email
        );
        Ok(TransferReceipt {
            transfer_id,
            kind: TransferKind::SelfTransfer,
            status: TransferStatus::Completed,
            amount,
            sender_balance: balance_of(&updated, from_account),
        })
    }

    /// Sends funds to another customer, here or at another institution,
    /// depending on the routing code.
    pub async fn send_money(&self, session: &Session, dto: &SendMoneyDto) -> BankResult<TransferReceipt> {
        let amount = dto.amount;
        let from_account = dto.from_account.trim();
        let to_account = dto.to_account.trim();
        let routing_code = dto.routing_code.trim().to_ascii_uppercase();

        if !amount.is_positive() {
            return Err(BankError::validation("Amount must be greater than zero"));
        }
        if !validate_account_number(to_account) {
            return Err(BankError::validation("Invalid receiver account number"));
        }
        if !validate_routing_code(&routing_code) {
            return Err(BankError::validation("Invalid routing code"));
        }
        let limit = self.bank.admin().get_transaction_limit().await?;
        if amount > limit.limit {
            return Err(BankError::validation(format!(
                "Amount exceeds the transaction limit of {}",
                limit.limit
            )));
        }

        let directory = self.bank.directory();
        let sender = directory.find_customer_by_email(&session.email).await?;
        check_sender(&sender, from_account, amount)?;

        if routing_code == self.bank.settings.routing_code {
            if from_account == to_account {
                return Err(BankError::validation("Cannot transfer to the same account"));
            }
            let receiver = directory.find_customer_by_account_number(to_account).await?;
            let active = receiver.account(to_account).is_some_and(|a| a.status);
            if !active {
                return Err(BankError::validation(format!("Account {} is inactive", to_account)));
            }
            self.intra_bank(session, &sender, &receiver, from_account, to_account, amount)
                .await
        } else {
            self.inter_bank(session, &sender, from_account, &routing_code, to_account, amount)
                .await
        }
    }

    /// Debits and credits two accounts of one record in a single write.
    async fn move_within(
        &self,
        id: &str,
        label: &str,
        transfer_id: &str,
        from_account: &str,
        to_account: &str,
        amount: Money,
    ) -> BankResult<Customer> {
        let cutoff = self.bank.settings.history_cutoff();
        self.bank
            .directory()
            .modify(id, label, move |c| {
                apply_leg(c, transfer_id, MovementLeg::Debit, from_account, amount, cutoff)?;
                apply_leg(c, transfer_id, MovementLeg::Credit, to_account, amount, cutoff)
            })
            .await
    }

    /// Writes one leg of `transfer_id` to the customer stored under `id`.
    async fn move_leg(
        &self,
        id: &str,
        label: &str,
        transfer_id: &str,
        leg: MovementLeg,
        account_number: &str,
        amount: Money,
    ) -> BankResult<Customer> {
        let cutoff = self.bank.settings.history_cutoff();
        self.bank
            .directory()
            .modify(id, label, move |c| {
                apply_leg(c, transfer_id, leg, account_number, amount, cutoff)
            })
            .await
    }

    async fn intra_bank(
        &self,
        session: &Session,
        sender: &Customer,
        receiver: &Customer,
        from_account: &str,
        to_account: &str,
        amount: Money,
    ) -> BankResult<TransferReceipt> {
        let routing_code = &self.bank.settings.routing_code;
        let transfer_id = new_transfer_id();

        // Both accounts on one record: a single write moves the money.
        if sender.id == receiver.id {
            let updated = self
                .move_within(&sender.id, "intra-bank transfer", &transfer_id, from_account, to_account, amount)
                .await?;
            self.journal(
                &transfer_id,
                TransferKind::IntraBank,
                TransferStatus::Completed,
                session,
                from_account,
                to_account,
                routing_code,
                amount,
            )
            .await;
            return Ok(TransferReceipt {
                transfer_id,
                kind: TransferKind::IntraBank,
                status: TransferStatus::Completed,
                amount,
                sender_balance: balance_of(&updated, from_account),
            });
        }

        let debited = self
            .move_leg(&sender.id, "debit sender", &transfer_id, MovementLeg::Debit, from_account, amount)
            .await?;
        let record = self
            .journal(
                &transfer_id,
                TransferKind::IntraBank,
                TransferStatus::Pending,
                session,
                from_account,
                to_account,
                routing_code,
                amount,
            )
            .await;

        let credited = self
            .move_leg(&receiver.id, "credit receiver", &transfer_id, MovementLeg::Credit, to_account, amount)
            .await;
        match credited {
            Ok(_) => {
                self.finish(&record, TransferStatus::Completed, None).await;
                info!(
                    "Transfer {}: {} from {} to {} by {}",
                    record.id, amount, from_account, to_account, session.email
                );
                Ok(TransferReceipt {
                    transfer_id,
                    kind: TransferKind::IntraBank,
                    status: TransferStatus::Completed,
                    amount,
                    sender_balance: balance_of(&debited, from_account),
                })
            }
            Err(e) => Err(self.compensate(&record, &sender.id, from_account, amount, e).await),
        }
    }

    async fn inter_bank(
        &self,
        session: &Session,
        sender: &Customer,
        from_account: &str,
        routing_code: &str,
        to_account: &str,
        amount: Money,
    ) -> BankResult<TransferReceipt> {
        let transfer_id = new_transfer_id();
        let debited = self
            .move_leg(&sender.id, "debit sender", &transfer_id, MovementLeg::Debit, from_account, amount)
            .await?;
        let record = self
            .journal(
                &transfer_id,
                TransferKind::InterBank,
                TransferStatus::Pending,
                session,
                from_account,
                to_account,
                routing_code,
                amount,
            )
            .await;

        let pending = PendingCredit {
            credit_id: transfer_id.clone(),
            credit_amount: amount,
            sender_account_number: from_account.to_string(),
            sender_routing_code: self.bank.settings.routing_code.clone(),
            created_at: Utc::now(),
        };
        match self.post_credit(routing_code, to_account, &pending).await {
            Ok(()) => {
                self.finish(&record, TransferStatus::Completed, None).await;
                info!(
                    "Transfer {}: {} from {} to {}/{} posted to the ledger by {}",
                    record.id, amount, from_account, routing_code, to_account, session.email
                );
                Ok(TransferReceipt {
                    transfer_id,
                    kind: TransferKind::InterBank,
                    status: TransferStatus::Completed,
                    amount,
                    sender_balance: balance_of(&debited, from_account),
                })
            }
            Err(e) => Err(self.compensate(&record, &sender.id, from_account, amount, e).await),
        }
    }

    /// Appends `credit` to the receiving institution's ledger document,
    /// creating the document on first use. Posting the same credit id twice
    /// leaves one entry.
    async fn post_credit(&self, routing_code: &str, to_account: &str, pending: &PendingCredit) -> BankResult<()> {
        let ledger = self.bank.ledger.as_ref();
        self.bank
            .settings
            .retry
            .run("post ledger credit", move || async move {
                match ledger.get(LEDGER_COLLECTION, routing_code).await? {
                    None => {
                        let mut entry = LedgerDocument::empty(routing_code);
                        entry.accounts.insert(to_account.to_string(), vec![pending.clone()]);
                        match ledger.insert(LEDGER_COLLECTION, store::encode(&entry)?).await {
                            Ok(()) => Ok(()),
                            // Created concurrently; the retry appends to it.
                            Err(StoreError::DuplicateKey { collection, detail }) => {
                                Err(BankError::Conflict(format!("{}: {}", collection, detail)))
                            }
                            Err(e) => Err(e.into()),
                        }
                    }
                    Some(d) => {
                        let mut entry: LedgerDocument = store::decode(d)?;
                        let credits = entry.accounts.entry(to_account.to_string()).or_default();
                        if credits.iter().any(|c| c.credit_id == pending.credit_id) {
                            return Ok(());
                        }
                        credits.push(pending.clone());
                        entry.updated_at = Utc::now();
                        ledger
                            .replace(LEDGER_COLLECTION, routing_code, entry.version, store::encode(&entry)?)
                            .await?;
                        Ok(())
                    }
                }
            })
            .await
    }

    /// Reverses the debit of a failed transfer and journals the outcome.
    /// Returns the error the caller should see.
    async fn compensate(
        &self,
        record: &TransferRecord,
        sender_id: &str,
        from_account: &str,
        amount: Money,
        cause: BankError,
    ) -> BankError {
        warn!("Transfer {} failed ({}), reversing the debit", record.id, cause);
        let reversed = self
            .move_leg(sender_id, "compensate sender", &record.id, MovementLeg::Reversal, from_account, amount)
            .await;
        match reversed {
            Ok(_) => {
                self.finish(record, TransferStatus::Compensated, Some(cause.to_string()))
                    .await;
            }
            Err(e) => {
                error!(
                    "Transfer {} needs reconciliation: {} debited from {} and not returned ({})",
                    record.id, amount, from_account, e
                );
                self.finish(
                    record,
                    TransferStatus::NeedsReconciliation,
                    Some(format!("{}; compensation failed: {}", cause, e)),
                )
                .await;
            }
        }
        cause
    }

    /// Records a transfer in the journal. A journal write failure is logged;
    /// the money movement it describes has already happened or will.
    #[allow(clippy::too_many_arguments)]
    async fn journal(
        &self,
        id: &str,
        kind: TransferKind,
        status: TransferStatus,
        session: &Session,
        from_account: &str,
        to_account: &str,
        to_routing_code: &str,
        amount: Money,
    ) -> TransferRecord {
        let now = Utc::now();
        let record = TransferRecord {
            id: id.to_string(),
            version: 0,
            kind,
            status,
            initiated_by: session.email.clone(),
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
            to_routing_code: to_routing_code.to_string(),
            amount,
            failure: None,
            created_at: now,
            updated_at: now,
        };
        let inserted = match store::encode(&record) {
            Ok(d) => self.bank.store.insert(TRANSFER_COLLECTION, d).await,
            Err(e) => Err(e),
        };
        if let Err(e) = inserted {
            error!("Failed to journal transfer {}: {}", record.id, e);
        }
        record
    }

    async fn finish(&self, record: &TransferRecord, status: TransferStatus, failure: Option<String>) {
        let store = self.bank.store.as_ref();
        let failure = &failure;
        let result = self
            .bank
            .settings
            .retry
            .run("update transfer journal", move || async move {
                let Some(d) = store.get(TRANSFER_COLLECTION, &record.id).await? else {
                    return Err(BankError::not_found(format!("Transfer {} not journaled", record.id)));
                };
                let mut current: TransferRecord = store::decode(d)?;
                current.status = status;
                current.failure = failure.clone();
                current.updated_at = Utc::now();
                store
                    .replace(TRANSFER_COLLECTION, &current.id, current.version, store::encode(&current)?)
                    .await?;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            error!("Failed to mark transfer {} as {:?}: {}", record.id, status, e);
        }
    }

    pub async fn list_transfers(&self, page: Page) -> BankResult<Vec<TransferRecord>> {
        let documents = self.bank.store.find(TRANSFER_COLLECTION, doc! {}, page).await?;
        documents
            .into_iter()
            .map(|d| store::decode(d).map_err(BankError::from))
            .collect()
    }
}
