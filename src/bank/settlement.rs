use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use log::{info, warn};
use tokio::sync::Mutex;

use crate::models::{LEDGER_COLLECTION, LedgerDocument, Money, PendingCredit, SettledCredit, SettlementReport};
use crate::store;

use super::{Bank, BankError, BankResult};

/// Pull-based settlement of credits other institutions posted for us.
///
/// A credit is applied exactly once: its id is stored on the customer in the
/// same versioned write that raises the balance, and only credits whose ids
/// are on record are cleared from the ledger afterwards. A run interrupted
/// between the two steps is finished by the next one.
pub struct Settlement<'a> {
    bank: &'a Bank,
    lock: &'a Mutex<()>,
}

impl<'a> Settlement<'a> {
    pub fn new(bank: &'a Bank, lock: &'a Mutex<()>) -> Self {
        Settlement { bank, lock }
    }

    pub async fn receive_money(&self) -> BankResult<SettlementReport> {
        let _running = self.lock.lock().await;
        let routing_code = self.bank.settings.routing_code.as_str();

        let Some(document) = self.bank.ledger.get(LEDGER_COLLECTION, routing_code).await? else {
            return Ok(SettlementReport::default());
        };
        let inbox: LedgerDocument = store::decode(document)?;

        let mut report = SettlementReport::default();
        let mut settled: HashSet<String> = HashSet::new();
        for (account_number, credits) in &inbox.accounts {
            if credits.is_empty() {
                continue;
            }
            let (applied, recorded) = match self.apply(account_number, credits).await? {
                Some(outcome) => outcome,
                None => {
                    warn!(
                        "{} ledger credit(s) for unknown account {} left unsettled",
                        credits.len(),
                        account_number
                    );
                    report.credits_unroutable += credits.len();
                    continue;
                }
            };
            if !applied.is_empty() {
                report.accounts_credited += 1;
                report.credits_applied += applied.len();
                report.amount_applied = applied
                    .iter()
                    .try_fold(report.amount_applied, |sum, c| sum.checked_add(c.credit_amount))
                    .ok_or_else(|| BankError::validation("Settlement total out of range"))?;
            }
            settled.extend(recorded);
        }

        if !settled.is_empty() {
            self.clear(routing_code, &settled).await?;
        }
        if report.credits_applied > 0 {
            info!(
                "Settled {} credit(s) worth {} into {} account(s)",
                report.credits_applied, report.amount_applied, report.accounts_credited
            );
        }
        Ok(report)
    }

    /// Applies the not yet settled `credits` to `account_number`. Returns the
    /// credits this call applied and the ids now on record, or `None` when no
    /// customer holds the account.
    ///
    /// Settled ids older than the retention window are dropped in the same
    /// write, unless the credit is still waiting in the inbox.
    async fn apply(
        &self,
        account_number: &str,
        credits: &[PendingCredit],
    ) -> BankResult<Option<(Vec<PendingCredit>, Vec<String>)>> {
        let directory = self.bank.directory();
        let Some(customer) = directory.lookup_by_account_number(account_number).await? else {
            return Ok(None);
        };
        let before: HashSet<String> = customer
            .settled_credits
            .iter()
            .map(|s| s.credit_id.clone())
            .collect();
        let cutoff = self.bank.settings.history_cutoff();

        let updated = directory
            .modify(&customer.id, "settle ledger credits", move |c| {
                c.settled_credits.retain(|s| {
                    s.settled_at >= cutoff || credits.iter().any(|p| p.credit_id == s.credit_id)
                });
                let fresh: Vec<&PendingCredit> = credits
                    .iter()
                    .filter(|p| !c.has_settled(&p.credit_id))
                    .collect();
                if fresh.is_empty() {
                    return Ok(());
                }
                let total = Money::checked_sum(fresh.iter().map(|p| p.credit_amount))
                    .ok_or_else(|| BankError::validation("Settlement total out of range"))?;
                let account = c
                    .account_mut(account_number)
                    .ok_or_else(|| BankError::not_found(format!("Account {} not found", account_number)))?;
                account.balance = account
                    .balance
                    .checked_add(total)
                    .ok_or_else(|| BankError::validation("Balance out of range"))?;
                let now = Utc::now();
                c.settled_credits.extend(fresh.iter().map(|p| SettledCredit {
                    credit_id: p.credit_id.clone(),
                    settled_at: now,
                }));
                Ok(())
            })
            .await?;

        let recorded: Vec<String> = credits
            .iter()
            .filter(|p| updated.has_settled(&p.credit_id))
            .map(|p| p.credit_id.clone())
            .collect();
        let applied = credits
            .iter()
            .filter(|p| recorded.contains(&p.credit_id) && !before.contains(&p.credit_id))
            .cloned()
            .collect();
        Ok(Some((applied, recorded)))
    }

    /// Removes exactly the `settled` credits from our inbox, keeping anything
    /// posted since it was read.
    async fn clear(&self, routing_code: &str, settled: &HashSet<String>) -> BankResult<()> {
        let ledger = self.bank.ledger.as_ref();
        self.bank
            .settings
            .retry
            .run("clear settled ledger credits", move || async move {
                let Some(document) = ledger.get(LEDGER_COLLECTION, routing_code).await? else {
                    return Ok(());
                };
                let mut inbox: LedgerDocument = store::decode(document)?;
                let remaining: BTreeMap<String, Vec<PendingCredit>> = inbox
                    .accounts
                    .iter()
                    .map(|(account, credits)| {
                        let kept: Vec<PendingCredit> = credits
                            .iter()
                            .filter(|c| !settled.contains(&c.credit_id))
                            .cloned()
                            .collect();
                        (account.clone(), kept)
                    })
                    .filter(|(_, kept)| !kept.is_empty())
                    .collect();
                if remaining == inbox.accounts {
                    return Ok(());
                }
                inbox.accounts = remaining;
                inbox.updated_at = Utc::now();
                ledger
                    .replace(LEDGER_COLLECTION, routing_code, inbox.version, store::encode(&inbox)?)
                    .await?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bank::testutil::{self, Fixture};
    use crate::models::SendMoneyDto;
    use crate::store::{DocumentStore, MemoryStore};

    const REMOTE_CODE: &str = "OTHR0000002";

    /// Two institutions sharing one ledger; asha banks with the first,
    /// chen with the second.
    async fn two_banks() -> (Fixture, Fixture) {
        let ledger = Arc::new(MemoryStore::new());
        let local = Fixture::with_ledger(ledger.clone()).await;
        let mut settings = testutil::settings();
        settings.routing_code = REMOTE_CODE.to_string();
        let remote = Fixture::with(ledger, settings).await;

        local
            .seed_customer("asha@example.com", "111111", &[("100001", 100000)])
            .await;
        remote
            .seed_customer("chen@example.com", "222222", &[("300001", 1000)])
            .await;
        (local, remote)
    }

    async fn send(fx: &Fixture, to: &str, amount: i64) {
        let session = testutil::customer_session("asha@example.com");
        fx.bank
            .transfers()
            .send_money(
                &session,
                &SendMoneyDto {
                    from_account: "100001".to_string(),
                    routing_code: REMOTE_CODE.to_string(),
                    to_account: to.to_string(),
                    amount: Money::new(amount),
                },
            )
            .await
            .unwrap();
    }

    async fn inbox(fx: &Fixture) -> Option<LedgerDocument> {
        fx.ledger
            .get(LEDGER_COLLECTION, REMOTE_CODE)
            .await
            .unwrap()
            .map(|d| store::decode(d).unwrap())
    }

    #[tokio::test]
    async fn credits_are_applied_once_and_cleared() {
        let (local, remote) = two_banks().await;
        send(&local, "300001", 2500).await;
        send(&local, "300001", 500).await;

        let report = remote.bank.settlement().receive_money().await.unwrap();
        assert_eq!(report.credits_applied, 2);
        assert_eq!(report.amount_applied, Money::new(3000));
        assert_eq!(report.accounts_credited, 1);
        assert_eq!(remote.balance("300001").await, Money::new(4000));
        assert_eq!(inbox(&local).await.unwrap().pending_count(), 0);

        let again = remote.bank.settlement().receive_money().await.unwrap();
        assert_eq!(again, SettlementReport::default());
        assert_eq!(remote.balance("300001").await, Money::new(4000));
    }

    #[tokio::test]
    async fn interrupted_clear_does_not_double_credit() {
        let (local, remote) = two_banks().await;
        send(&local, "300001", 2500).await;

        // Balances are written but the ledger clear fails.
        local.ledger.fail_replaces(LEDGER_COLLECTION, REMOTE_CODE, 3);
        let interrupted = remote.bank.settlement().receive_money().await;
        assert!(interrupted.is_err());
        assert_eq!(remote.balance("300001").await, Money::new(3500));
        assert_eq!(inbox(&local).await.unwrap().pending_count(), 1);

        let report = remote.bank.settlement().receive_money().await.unwrap();
        assert_eq!(report.credits_applied, 0);
        assert_eq!(remote.balance("300001").await, Money::new(3500));
        assert_eq!(inbox(&local).await.unwrap().pending_count(), 0);
    }

    #[tokio::test]
    async fn unknown_accounts_stay_in_the_ledger() {
        let (local, remote) = two_banks().await;
        send(&local, "300001", 100).await;
        send(&local, "399999", 700).await;

        let report = remote.bank.settlement().receive_money().await.unwrap();
        assert_eq!(report.credits_applied, 1);
        assert_eq!(report.credits_unroutable, 1);

        let left = inbox(&local).await.unwrap();
        assert_eq!(left.pending_count(), 1);
        assert_eq!(left.accounts["399999"][0].credit_amount, Money::new(700));
    }

    #[tokio::test]
    async fn settlement_conserves_money_across_institutions() {
        let (local, remote) = two_banks().await;
        send(&local, "300001", 40000).await;
        assert_eq!(local.balance("100001").await, Money::new(60000));

        remote.bank.settlement().receive_money().await.unwrap();
        let total = local.balance("100001").await.minor_units() + remote.balance("300001").await.minor_units();
        assert_eq!(total, 101000);
    }

    #[tokio::test]
    async fn lowercase_routing_codes_reach_the_receiving_bank() {
        let (local, remote) = two_banks().await;
        let session = testutil::customer_session("asha@example.com");
        local
            .bank
            .transfers()
            .send_money(
                &session,
                &SendMoneyDto {
                    from_account: "100001".to_string(),
                    routing_code: REMOTE_CODE.to_lowercase(),
                    to_account: "300001".to_string(),
                    amount: Money::new(5000),
                },
            )
            .await
            .unwrap();

        let report = remote.bank.settlement().receive_money().await.unwrap();
        assert_eq!(report.credits_applied, 1);
        assert_eq!(local.balance("100001").await, Money::new(95000));
        assert_eq!(remote.balance("300001").await, Money::new(6000));
    }

    #[tokio::test]
    async fn settled_ids_expire_after_the_retention_window() {
        let (local, remote) = two_banks().await;
        let chen = remote.customer("chen@example.com").await;
        let expired = SettledCredit {
            credit_id: "expired-credit".to_string(),
            settled_at: Utc::now() - chrono::TimeDelta::days(45),
        };
        let recent = SettledCredit {
            credit_id: "recent-credit".to_string(),
            settled_at: Utc::now() - chrono::TimeDelta::days(2),
        };
        let seeded = [expired, recent];
        remote
            .bank
            .directory()
            .modify(&chen.id, "seed history", move |c| {
                c.settled_credits.extend(seeded.iter().cloned());
                Ok(())
            })
            .await
            .unwrap();

        send(&local, "300001", 700).await;
        remote.bank.settlement().receive_money().await.unwrap();

        let chen = remote.customer("chen@example.com").await;
        assert!(!chen.has_settled("expired-credit"));
        assert!(chen.has_settled("recent-credit"));
        assert_eq!(chen.settled_credits.len(), 2);
        assert_eq!(remote.balance("300001").await, Money::new(1700));
    }

    #[tokio::test]
    async fn expired_ids_still_in_the_inbox_are_kept() {
        let (local, remote) = two_banks().await;
        send(&local, "300001", 2500).await;
        let credit_id = inbox(&local).await.unwrap().accounts["300001"][0].credit_id.clone();

        // Settled long ago, but the clear never happened.
        let chen = remote.customer("chen@example.com").await;
        let stale = SettledCredit {
            credit_id: credit_id.clone(),
            settled_at: Utc::now() - chrono::TimeDelta::days(90),
        };
        remote
            .bank
            .directory()
            .modify(&chen.id, "seed history", move |c| {
                c.settled_credits.push(stale.clone());
                Ok(())
            })
            .await
            .unwrap();

        let report = remote.bank.settlement().receive_money().await.unwrap();
        assert_eq!(report.credits_applied, 0);
        assert_eq!(remote.balance("300001").await, Money::new(1000));
        assert_eq!(inbox(&local).await.unwrap().pending_count(), 0);
    }

    #[tokio::test]
    async fn empty_ledger_settles_nothing() {
        let fx = Fixture::new().await;
        let report = fx.bank.settlement().receive_money().await.unwrap();
        assert_eq!(report, SettlementReport::default());
    }
}
