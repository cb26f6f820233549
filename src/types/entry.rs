//! Ledger entry types
//!
//! A [`LedgerEntry`] is one append-only row in the ledger log. Every
//! balance change produces at least one; a transfer produces two, one
//! per side, each carrying the balance of its own `ledger_account`
//! after the operation.

use crate::types::account::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What kind of movement a ledger entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Money entering the ledger from outside
    Deposit,
    /// Money moving between two accounts inside the ledger
    Transfer,
    /// Money leaving the ledger
    Withdrawal,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Deposit => write!(f, "deposit"),
            EntryType::Transfer => write!(f, "transfer"),
            EntryType::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// Outcome recorded on a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Success,
    Failed,
    Pending,
}

/// One immutable row of the ledger log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Row id
    pub id: Uuid,

    /// Caller-supplied operation reference, unique across the log when
    /// present; both legs of a transfer share one reference
    pub reference: Option<String>,

    /// Debited account, `None` for deposits
    pub from_account: Option<AccountId>,

    /// Credited account, `None` for withdrawals
    pub to_account: Option<AccountId>,

    /// Amount moved, positive and rounded to 2 decimal places
    pub amount: Decimal,

    pub entry_type: EntryType,

    pub status: EntryStatus,

    /// Free-form description shown on statements
    pub description: String,

    /// Balance of `ledger_account` immediately after this entry
    pub balance_after: Decimal,

    /// Which side of the operation this row belongs to
    pub ledger_account: AccountId,

    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// True when this entry credited its `ledger_account`
    pub fn is_credit(&self) -> bool {
        self.to_account == Some(self.ledger_account)
    }
}

/// Read-only projection of one account's ledger rows over a date range
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub account: AccountId,
    pub account_number: String,
    pub holder_name: String,
    /// Rows in chronological order
    pub entries: Vec<LedgerEntry>,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    /// Balance of the account when the statement was produced
    pub closing_balance: Decimal,
}
