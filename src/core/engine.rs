//! Transfer engine: the sole balance mutator
//!
//! Every balance change in the crate goes through [`TransferEngine`].
//! Each operation is a unit of work:
//!
//! 1. validate the amount and normalize it to 2 decimal places;
//! 2. resolve the participating account cells;
//! 3. lock them in ascending-id order;
//! 4. re-check status and funds against the locked rows;
//! 5. build the ledger rows with per-side `balance_after` snapshots;
//! 6. commit the rows all-or-nothing (a spent reference aborts here);
//! 7. only then write the new balances, still under the locks.
//!
//! A failure at any step leaves no partial effect: balances are written
//! last, after the log has accepted the batch.
//!
//! Lock order across the crate is loan/investment row first, then
//! account rows ascending, then the log. The engine itself never takes
//! loan or investment locks, so no cycle can form.

use crate::core::ledger_store::LedgerStore;
use crate::types::account::{Account, AccountId};
use crate::types::entry::{EntryStatus, EntryType, LedgerEntry};
use crate::types::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Balance-mutation engine over a [`LedgerStore`]
#[derive(Debug, Clone)]
pub struct TransferEngine {
    store: Arc<LedgerStore>,
}

impl TransferEngine {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        TransferEngine { store }
    }

    /// The store this engine mutates
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Credit an account with money from outside the ledger
    #[instrument(name = "engine.deposit", skip(self, description), err)]
    pub fn deposit(
        &self,
        account: AccountId,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.credit(account, amount, description, reference, now)
    }

    /// Debit an account, sending money out of the ledger
    #[instrument(name = "engine.withdraw", skip(self, description), err)]
    pub fn withdraw(
        &self,
        account: AccountId,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.debit(account, amount, description, reference, now)
    }

    /// Credit issued by an internal subsystem (loan disbursement,
    /// investment proceeds); ledger mechanics identical to a deposit
    #[instrument(name = "engine.credit_external", skip(self, description), err)]
    pub fn credit_external(
        &self,
        account: AccountId,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.credit(account, amount, description, reference, now)
    }

    /// Debit issued by an internal subsystem (EMI collection,
    /// investment purchase); ledger mechanics identical to a withdrawal
    #[instrument(name = "engine.debit_external", skip(self, description), err)]
    pub fn debit_external(
        &self,
        account: AccountId,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.debit(account, amount, description, reference, now)
    }

    /// Move money between two accounts
    ///
    /// Writes two ledger rows, one per side, sharing the operation
    /// reference; each carries the balance of its own account after the
    /// move.
    ///
    /// # Errors
    ///
    /// - `SelfTransfer` when `from == to`, rejected before any locking
    /// - `InvalidAmount`, `AccountNotFound`, `AccountNotActive`
    /// - `InsufficientFunds` if the sender cannot cover the amount
    /// - `DuplicateReference` if the reference was already committed;
    ///   neither balance changes
    #[instrument(name = "engine.transfer", skip(self, description), err)]
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(LedgerEntry, LedgerEntry), LedgerError> {
        if from == to {
            return Err(LedgerError::SelfTransfer { account: from });
        }
        let amount = validate_amount(amount)?;
        let from_cell = self.store.handle(from)?;
        let to_cell = self.store.handle(to)?;

        // ascending-id order prevents deadlock with concurrent transfers
        let (mut from_row, mut to_row) = if from < to {
            let first = from_cell.lock()?;
            let second = to_cell.lock()?;
            (first, second)
        } else {
            let second = to_cell.lock()?;
            let first = from_cell.lock()?;
            (first, second)
        };

        require_active(&from_row)?;
        require_active(&to_row)?;
        if from_row.balance < amount {
            return Err(LedgerError::insufficient_funds(
                from,
                from_row.balance,
                amount,
            ));
        }

        let from_balance = from_row.balance - amount;
        let to_balance = to_row.balance + amount;
        let debit_leg = LedgerEntry {
            id: Uuid::new_v4(),
            reference: reference.map(|r| r.to_string()),
            from_account: Some(from),
            to_account: Some(to),
            amount,
            entry_type: EntryType::Transfer,
            status: EntryStatus::Success,
            description: description.to_string(),
            balance_after: from_balance,
            ledger_account: from,
            timestamp: now,
        };
        let credit_leg = LedgerEntry {
            id: Uuid::new_v4(),
            balance_after: to_balance,
            ledger_account: to,
            ..debit_leg.clone()
        };

        self.store
            .append_entries(vec![debit_leg.clone(), credit_leg.clone()])?;
        from_row.balance = from_balance;
        to_row.balance = to_balance;
        Ok((debit_leg, credit_leg))
    }

    fn credit(
        &self,
        account: AccountId,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        let amount = validate_amount(amount)?;
        let cell = self.store.handle(account)?;
        let mut row = cell.lock()?;
        require_active(&row)?;

        let balance_after = row.balance + amount;
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            reference: reference.map(|r| r.to_string()),
            from_account: None,
            to_account: Some(account),
            amount,
            entry_type: EntryType::Deposit,
            status: EntryStatus::Success,
            description: description.to_string(),
            balance_after,
            ledger_account: account,
            timestamp: now,
        };
        self.store.append_entries(vec![entry.clone()])?;
        row.balance = balance_after;
        Ok(entry)
    }

    fn debit(
        &self,
        account: AccountId,
        amount: Decimal,
        description: &str,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        let amount = validate_amount(amount)?;
        let cell = self.store.handle(account)?;
        let mut row = cell.lock()?;
        require_active(&row)?;
        if row.balance < amount {
            return Err(LedgerError::insufficient_funds(account, row.balance, amount));
        }

        let balance_after = row.balance - amount;
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            reference: reference.map(|r| r.to_string()),
            from_account: Some(account),
            to_account: None,
            amount,
            entry_type: EntryType::Withdrawal,
            status: EntryStatus::Success,
            description: description.to_string(),
            balance_after,
            ledger_account: account,
            timestamp: now,
        };
        self.store.append_entries(vec![entry.clone()])?;
        row.balance = balance_after;
        Ok(entry)
    }

}

fn validate_amount(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_amount(amount));
    }
    Ok(amount.round_dp(2))
}

fn require_active(account: &Account) -> Result<(), LedgerError> {
    if !account.is_active() {
        return Err(LedgerError::AccountNotActive {
            account: account.id,
            status: account.status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::account::{AccountStatus, NewAccount};
    use rstest::rstest;
    use std::str::FromStr;

    fn setup() -> (TransferEngine, AccountId, AccountId) {
        let store = Arc::new(LedgerStore::new());
        let engine = TransferEngine::new(Arc::clone(&store));
        let a = store
            .open_account(
                NewAccount {
                    holder_name: "Asha Rao".to_string(),
                    ifsc_code: "LEDG0000001".to_string(),
                    ..NewAccount::default()
                },
                Utc::now(),
            )
            .unwrap();
        let b = store
            .open_account(
                NewAccount {
                    holder_name: "Vikram Shah".to_string(),
                    ifsc_code: "LEDG0000001".to_string(),
                    ..NewAccount::default()
                },
                Utc::now(),
            )
            .unwrap();
        (engine, a.id, b.id)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn deposit_credits_and_snapshots_balance() {
        let (engine, a, _) = setup();
        let entry = engine
            .deposit(a, dec("250.00"), "cash deposit", None, Utc::now())
            .unwrap();
        assert_eq!(entry.balance_after, dec("250.00"));
        assert!(entry.is_credit());
        assert_eq!(engine.store().account(a).unwrap().balance, dec("250.00"));
    }

    #[rstest]
    #[case::zero("0")]
    #[case::negative("-10")]
    fn non_positive_amounts_are_rejected(#[case] amount: &str) {
        let (engine, a, _) = setup();
        let result = engine.deposit(a, dec(amount), "bad", None, Utc::now());
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn amounts_are_normalized_to_two_places() {
        let (engine, a, _) = setup();
        let entry = engine
            .deposit(a, dec("10.005"), "odd precision", None, Utc::now())
            .unwrap();
        assert_eq!(entry.amount, dec("10.00"));
    }

    #[test]
    fn withdrawal_cannot_overdraw() {
        let (engine, a, _) = setup();
        engine
            .deposit(a, dec("50.00"), "seed", None, Utc::now())
            .unwrap();
        let result = engine.withdraw(a, dec("80.00"), "too much", None, Utc::now());
        assert_eq!(
            result,
            Err(LedgerError::insufficient_funds(a, dec("50.00"), dec("80.00")))
        );
        // balance untouched and nothing appended for the decline
        assert_eq!(engine.store().account(a).unwrap().balance, dec("50.00"));
        let statement = engine.store().statement(a, None, None).unwrap();
        assert_eq!(statement.entries.len(), 1);
        assert_eq!(statement.entries[0].description, "seed");
    }

    #[test]
    fn transfer_moves_money_with_two_legs() {
        let (engine, a, b) = setup();
        engine
            .deposit(a, dec("300.00"), "seed", None, Utc::now())
            .unwrap();
        let (debit_leg, credit_leg) = engine
            .transfer(a, b, dec("120.00"), "rent", Some("RENT-2024-06"), Utc::now())
            .unwrap();

        assert_eq!(debit_leg.ledger_account, a);
        assert_eq!(debit_leg.balance_after, dec("180.00"));
        assert_eq!(credit_leg.ledger_account, b);
        assert_eq!(credit_leg.balance_after, dec("120.00"));
        assert_eq!(debit_leg.reference, credit_leg.reference);
        assert_eq!(engine.store().account(a).unwrap().balance, dec("180.00"));
        assert_eq!(engine.store().account(b).unwrap().balance, dec("120.00"));
    }

    #[test]
    fn self_transfer_is_rejected() {
        let (engine, a, _) = setup();
        engine
            .deposit(a, dec("100.00"), "seed", None, Utc::now())
            .unwrap();
        assert_eq!(
            engine.transfer(a, a, dec("10.00"), "loop", None, Utc::now()),
            Err(LedgerError::SelfTransfer { account: a })
        );
    }

    #[test]
    fn inactive_accounts_cannot_transact() {
        let (engine, a, b) = setup();
        engine
            .deposit(a, dec("100.00"), "seed", None, Utc::now())
            .unwrap();
        engine.store().set_status(b, AccountStatus::Frozen).unwrap();
        let result = engine.transfer(a, b, dec("10.00"), "to frozen", None, Utc::now());
        assert!(matches!(
            result,
            Err(LedgerError::AccountNotActive {
                status: AccountStatus::Frozen,
                ..
            })
        ));
        assert_eq!(engine.store().account(a).unwrap().balance, dec("100.00"));
    }

    #[test]
    fn spent_reference_rolls_back_the_transfer() {
        let (engine, a, b) = setup();
        engine
            .deposit(a, dec("100.00"), "seed", None, Utc::now())
            .unwrap();
        engine
            .transfer(a, b, dec("10.00"), "first", Some("OP-7"), Utc::now())
            .unwrap();

        let result = engine.transfer(a, b, dec("10.00"), "replay", Some("OP-7"), Utc::now());
        assert_eq!(result, Err(LedgerError::duplicate_reference("OP-7")));
        assert_eq!(engine.store().account(a).unwrap().balance, dec("90.00"));
        assert_eq!(engine.store().account(b).unwrap().balance, dec("10.00"));
    }

    #[test]
    fn concurrent_opposing_transfers_do_not_deadlock() {
        let (engine, a, b) = setup();
        engine
            .deposit(a, dec("1000.00"), "seed a", None, Utc::now())
            .unwrap();
        engine
            .deposit(b, dec("1000.00"), "seed b", None, Utc::now())
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..4u32 {
            let engine = engine.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..50u32 {
                    let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
                    let reference = format!("PP-{i}-{j}");
                    let _ = engine.transfer(
                        from,
                        to,
                        dec("1.00"),
                        "ping pong",
                        Some(&reference),
                        Utc::now(),
                    );
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let total = engine.store().account(a).unwrap().balance
            + engine.store().account(b).unwrap().balance;
        assert_eq!(total, dec("2000.00"));
    }
}
