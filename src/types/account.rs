//! Account-related types for the ledger core
//!
//! This module defines the Account structure held by the ledger store
//! together with the registration payload used to open one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier (monotonic u64, canonical lock-order key)
pub type AccountId = u64;

/// Lifecycle status of an account
///
/// Accounts are never deleted; `Inactive` and `Frozen` are soft-disable
/// states that block all balance mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Account can transact
    Active,
    /// Account has been closed by its holder
    Inactive,
    /// Account has been frozen administratively
    Frozen,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Inactive => write!(f, "inactive"),
            AccountStatus::Frozen => write!(f, "frozen"),
        }
    }
}

/// A customer account and its current balance
///
/// The balance field is the single source of truth for available funds;
/// every change to it is mirrored by a ledger entry carrying a
/// `balance_after` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Store-assigned account id
    pub id: AccountId,

    /// Unique 5-digit customer id, drawn at registration
    pub customer_id: String,

    /// Unique 10-digit account number, drawn at registration
    pub account_number: String,

    /// Branch code printed on statements
    pub ifsc_code: String,

    /// Account holder's name
    pub holder_name: String,

    /// Optional phone number, unique across accounts when present
    pub phone_number: Option<String>,

    /// Whether the phone number passed challenge verification
    pub phone_verified: bool,

    /// Outstanding verification challenge, if one has been issued
    pub verification_code: Option<String>,

    /// When the outstanding challenge was issued
    pub verification_sent_at: Option<DateTime<Utc>>,

    /// PAN number, unique across accounts when present
    pub pan_number: Option<String>,

    /// Aadhar number, unique across accounts when present
    pub aadhar_number: Option<String>,

    /// Current balance, always >= 0 and rounded to 2 decimal places
    pub balance: Decimal,

    /// Lifecycle status
    pub status: AccountStatus,

    /// When the account was opened
    pub opened_at: DateTime<Utc>,
}

impl Account {
    /// True when the account may participate in balance mutations
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Registration payload for opening an account
///
/// Identity fields are optional; when present they must be unique
/// across the store.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub holder_name: String,
    pub ifsc_code: String,
    pub phone_number: Option<String>,
    pub pan_number: Option<String>,
    pub aadhar_number: Option<String>,
}
