//! Durable keyed storage for accounts and the append-only ledger log
//!
//! [`LedgerStore`] owns every account row and the ledger log. Account
//! rows live in a `DashMap` of `Arc<Mutex<Account>>` cells so that
//! operations lock only the rows they touch; the log and the identity
//! index each sit behind their own mutex.
//!
//! The store enforces two uniqueness regimes:
//! - registration identities (customer id, account number, phone, PAN,
//!   Aadhar) via the identity index, and
//! - operation references via the log, checked all-or-nothing when a
//!   batch of entries commits.

use crate::types::account::{Account, AccountId, AccountStatus, NewAccount};
use crate::types::entry::{LedgerEntry, Statement};
use crate::types::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// How many random draws to attempt before giving up on a unique
/// customer id or account number
const MAX_ID_DRAWS: u32 = 32;

/// Uniqueness index over registration identities
///
/// Guarded by one mutex: registration is rare compared to transacting,
/// so a single lock keeps the duplicate checks and the claims atomic.
#[derive(Debug, Default)]
struct IdentityIndex {
    customer_ids: HashSet<String>,
    account_numbers: HashMap<String, AccountId>,
    phones: HashMap<String, AccountId>,
    pans: HashMap<String, AccountId>,
    aadhars: HashMap<String, AccountId>,
}

/// The append-only ledger log plus its reference set
#[derive(Debug, Default)]
struct LedgerLog {
    rows: Vec<LedgerEntry>,
    references: HashSet<String>,
}

/// Storage layer for accounts and ledger entries
#[derive(Debug, Default)]
pub struct LedgerStore {
    accounts: DashMap<AccountId, Arc<Mutex<Account>>>,
    identity: Mutex<IdentityIndex>,
    log: Mutex<LedgerLog>,
    next_account_id: AtomicU64,
}

impl LedgerStore {
    /// Create an empty store
    pub fn new() -> Self {
        LedgerStore {
            accounts: DashMap::new(),
            identity: Mutex::new(IdentityIndex::default()),
            log: Mutex::new(LedgerLog::default()),
            next_account_id: AtomicU64::new(1),
        }
    }

    /// Open a new account
    ///
    /// Assigns the next account id, draws a unique 5-digit customer id
    /// and 10-digit account number, and claims the optional identity
    /// fields. Any identity collision fails with `DuplicateIdentity`
    /// naming the offending field and nothing is stored.
    ///
    /// # Errors
    ///
    /// - `DuplicateIdentity` if phone, PAN or Aadhar is already claimed
    /// - `StorageFailure` if the random draws keep colliding
    #[instrument(name = "ledger_store.open_account", skip(self, new_account), err)]
    pub fn open_account(
        &self,
        new_account: NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Account, LedgerError> {
        let mut identity = self.identity.lock()?;

        if let Some(phone) = &new_account.phone_number {
            if identity.phones.contains_key(phone) {
                return Err(LedgerError::duplicate_identity("phone number", phone));
            }
        }
        if let Some(pan) = &new_account.pan_number {
            if identity.pans.contains_key(pan) {
                return Err(LedgerError::duplicate_identity("PAN number", pan));
            }
        }
        if let Some(aadhar) = &new_account.aadhar_number {
            if identity.aadhars.contains_key(aadhar) {
                return Err(LedgerError::duplicate_identity("Aadhar number", aadhar));
            }
        }

        let customer_id = draw_unique(MAX_ID_DRAWS, "customer id", || {
            let candidate = format!("{}", rand::rng().random_range(10000u32..=99999));
            (!identity.customer_ids.contains(&candidate)).then_some(candidate)
        })?;
        let account_number = draw_unique(MAX_ID_DRAWS, "account number", || {
            let candidate = format!("{}", rand::rng().random_range(1_000_000_000u64..=9_999_999_999));
            (!identity.account_numbers.contains_key(&candidate)).then_some(candidate)
        })?;

        let id = self.next_account_id.fetch_add(1, Ordering::SeqCst);

        identity.customer_ids.insert(customer_id.clone());
        identity.account_numbers.insert(account_number.clone(), id);
        if let Some(phone) = &new_account.phone_number {
            identity.phones.insert(phone.clone(), id);
        }
        if let Some(pan) = &new_account.pan_number {
            identity.pans.insert(pan.clone(), id);
        }
        if let Some(aadhar) = &new_account.aadhar_number {
            identity.aadhars.insert(aadhar.clone(), id);
        }
        drop(identity);

        let account = Account {
            id,
            customer_id,
            account_number,
            ifsc_code: new_account.ifsc_code,
            holder_name: new_account.holder_name,
            phone_number: new_account.phone_number,
            phone_verified: false,
            verification_code: None,
            verification_sent_at: None,
            pan_number: new_account.pan_number,
            aadhar_number: new_account.aadhar_number,
            balance: Decimal::ZERO,
            status: AccountStatus::Active,
            opened_at: now,
        };
        self.accounts
            .insert(id, Arc::new(Mutex::new(account.clone())));
        Ok(account)
    }

    /// Snapshot an account by id
    pub fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let cell = self.handle(id)?;
        let row = cell.lock()?;
        Ok(row.clone())
    }

    /// Snapshot an account by phone number
    pub fn account_by_phone(&self, phone: &str) -> Result<Account, LedgerError> {
        let id = {
            let identity = self.identity.lock()?;
            identity.phones.get(phone).copied()
        };
        match id {
            Some(id) => self.account(id),
            None => Err(LedgerError::account_not_found(format!("phone {phone}"))),
        }
    }

    /// Snapshot an account by account number and IFSC code
    pub fn account_by_number(&self, number: &str, ifsc: &str) -> Result<Account, LedgerError> {
        let id = {
            let identity = self.identity.lock()?;
            identity.account_numbers.get(number).copied()
        };
        let lookup = || format!("account number {number} at {ifsc}");
        let account = match id {
            Some(id) => self.account(id)?,
            None => return Err(LedgerError::account_not_found(lookup())),
        };
        if account.ifsc_code != ifsc {
            return Err(LedgerError::account_not_found(lookup()));
        }
        Ok(account)
    }

    /// Change an account's lifecycle status
    ///
    /// Accounts are never deleted; `Inactive` and `Frozen` block all
    /// balance mutations at the engine.
    #[instrument(name = "ledger_store.set_status", skip(self), err)]
    pub fn set_status(&self, id: AccountId, status: AccountStatus) -> Result<(), LedgerError> {
        let cell = self.handle(id)?;
        let mut row = cell.lock()?;
        row.status = status;
        Ok(())
    }

    /// Row cell for an account, for callers that need to hold the lock
    /// across a read-check-write sequence
    pub(crate) fn handle(&self, id: AccountId) -> Result<Arc<Mutex<Account>>, LedgerError> {
        self.accounts
            .get(&id)
            .map(|cell| Arc::clone(cell.value()))
            .ok_or_else(|| LedgerError::account_not_found(format!("id {id}")))
    }

    /// Commit a batch of ledger entries all-or-nothing
    ///
    /// All references in the batch are checked against the log before
    /// any row is appended; a collision fails the whole batch with
    /// `DuplicateReference`. The two legs of a transfer share one
    /// reference, which counts once.
    pub(crate) fn append_entries(&self, entries: Vec<LedgerEntry>) -> Result<(), LedgerError> {
        let mut log = self.log.lock()?;
        let mut batch_references: Vec<&str> = Vec::new();
        for entry in &entries {
            if let Some(reference) = entry.reference.as_deref() {
                if log.references.contains(reference) {
                    return Err(LedgerError::duplicate_reference(reference));
                }
                if !batch_references.contains(&reference) {
                    batch_references.push(reference);
                }
            }
        }
        for reference in batch_references {
            log.references.insert(reference.to_string());
        }
        log.rows.extend(entries);
        Ok(())
    }

    /// True when a reference has already been committed
    pub fn reference_used(&self, reference: &str) -> Result<bool, LedgerError> {
        let log = self.log.lock()?;
        Ok(log.references.contains(reference))
    }

    /// Produce a statement for an account over an optional date range
    ///
    /// Rows are returned in commit order with credit/debit totals and
    /// the account's balance at the time of the call.
    #[instrument(name = "ledger_store.statement", skip(self), err)]
    pub fn statement(
        &self,
        account: AccountId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Statement, LedgerError> {
        let snapshot = self.account(account)?;
        let log = self.log.lock()?;
        let mut entries = Vec::new();
        let mut total_credits = Decimal::ZERO;
        let mut total_debits = Decimal::ZERO;
        for row in &log.rows {
            if row.ledger_account != account {
                continue;
            }
            let date = row.timestamp.date_naive();
            if from.is_some_and(|from| date < from) || to.is_some_and(|to| date > to) {
                continue;
            }
            if row.is_credit() {
                total_credits += row.amount;
            } else {
                total_debits += row.amount;
            }
            entries.push(row.clone());
        }
        Ok(Statement {
            account,
            account_number: snapshot.account_number,
            holder_name: snapshot.holder_name,
            entries,
            total_credits,
            total_debits,
            closing_balance: snapshot.balance,
        })
    }

    /// Number of accounts in the store
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

/// Run a fallible random draw up to `attempts` times
fn draw_unique<F>(attempts: u32, what: &str, mut draw: F) -> Result<String, LedgerError>
where
    F: FnMut() -> Option<String>,
{
    for _ in 0..attempts {
        if let Some(value) = draw() {
            return Ok(value);
        }
    }
    Err(LedgerError::storage(format!(
        "could not draw a unique {what} after {attempts} attempts"
    )))
}
