//! Error types for the ledger core
//!
//! This module defines all error types that can occur while mutating or
//! querying the ledger. Variants fall into three groups:
//!
//! - **Precondition failures** (insufficient funds, bad amounts,
//!   self-transfer, unknown rows): detected before any mutation, so the
//!   failed operation has no observable effect.
//! - **Race losses** (`AlreadyPaid`, `AlreadyClosed`): expected outcomes
//!   when two callers contend for the same EMI or loan. Callers should
//!   inform the user, not retry.
//! - **Fatal storage problems** (`StorageFailure`, `Io`): the unit of
//!   work could not commit; nothing was applied.

use crate::types::account::{AccountId, AccountStatus};
use crate::types::investment::InvestmentId;
use crate::types::loan::{LoanId, LoanStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the ledger core
///
/// Each variant carries enough context to diagnose the failure without
/// consulting the store again.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Amount was zero or negative
    #[error("Invalid amount {amount}: amounts must be positive")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// Debit would take the account balance below zero
    #[error(
        "Insufficient funds in account {account}: available {available}, requested {requested}"
    )]
    InsufficientFunds {
        account: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    /// Transfer where sender and recipient are the same account
    #[error("Account {account} cannot transfer to itself")]
    SelfTransfer { account: AccountId },

    /// No account matched the lookup key
    #[error("No account found for {lookup}")]
    AccountNotFound {
        /// Human-readable description of the key that missed
        lookup: String,
    },

    /// The account exists but is not in `Active` status
    #[error("Account {account} is {status} and cannot transact")]
    AccountNotActive {
        account: AccountId,
        status: AccountStatus,
    },

    /// An identity field (phone, PAN, Aadhar) is already claimed by
    /// another account
    #[error("Duplicate {field}: '{value}' already belongs to an account")]
    DuplicateIdentity { field: String, value: String },

    /// An operation reference was already committed to the ledger
    ///
    /// This is the retry-detection handle of the engine: a caller that
    /// re-submits an operation with the same reference gets this error
    /// instead of a double posting.
    #[error("Ledger reference '{reference}' has already been used")]
    DuplicateReference { reference: String },

    /// No loan with this id
    #[error("No loan found with id {loan}")]
    LoanNotFound { loan: LoanId },

    /// Loan is not in the status the operation requires
    #[error("Loan {loan} is {actual}, expected {expected}")]
    InvalidLoanState {
        loan: LoanId,
        expected: LoanStatus,
        actual: LoanStatus,
    },

    /// Loan tenure outside the acceptable range
    #[error("Invalid tenure of {months} months")]
    InvalidTenure { months: u32 },

    /// No EMI with this number on the loan's schedule
    #[error("Loan {loan} has no EMI #{emi_number}")]
    EmiNotFound { loan: LoanId, emi_number: u32 },

    /// Lost a race: the EMI was paid by a concurrent caller
    #[error("EMI #{emi_number} of loan {loan} has already been paid")]
    AlreadyPaid { loan: LoanId, emi_number: u32 },

    /// Lost a race: the loan or investment was closed by a concurrent
    /// caller
    #[error("{entity} {id} is already closed")]
    AlreadyClosed {
        /// "loan" or "investment"
        entity: &'static str,
        id: u64,
    },

    /// No investment with this id
    #[error("No investment found with id {investment}")]
    InvestmentNotFound { investment: InvestmentId },

    /// Withdrawal larger than the investment's current value
    #[error(
        "Withdrawal of {requested} exceeds current value {current_value} of investment {investment}"
    )]
    ExceedsAvailableValue {
        investment: InvestmentId,
        current_value: Decimal,
        requested: Decimal,
    },

    /// Phone number is already verified
    #[error("Phone number of account {account} is already verified")]
    PhoneAlreadyVerified { account: AccountId },

    /// Account has no phone number to verify
    #[error("Account {account} has no phone number on file")]
    NoPhoneNumber { account: AccountId },

    /// Verification attempted without an outstanding challenge
    #[error("No verification code has been sent for account {account}")]
    NoVerificationPending { account: AccountId },

    /// Challenge code did not match
    #[error("Verification code for account {account} does not match")]
    InvalidVerificationCode { account: AccountId },

    /// Challenge code is past its validity window
    #[error("Verification code for account {account} has expired")]
    ExpiredVerificationCode { account: AccountId },

    /// The storage layer could not complete the unit of work
    #[error("Storage failure: {message}")]
    StorageFailure { message: String },

    /// I/O error while exporting a statement
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl LedgerError {
    /// Create an `InvalidAmount` error
    pub fn invalid_amount(amount: Decimal) -> Self {
        LedgerError::InvalidAmount { amount }
    }

    /// Create an `InsufficientFunds` error
    pub fn insufficient_funds(account: AccountId, available: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            account,
            available,
            requested,
        }
    }

    /// Create an `AccountNotFound` error from a lookup description
    pub fn account_not_found(lookup: impl Into<String>) -> Self {
        LedgerError::AccountNotFound {
            lookup: lookup.into(),
        }
    }

    /// Create a `DuplicateIdentity` error
    pub fn duplicate_identity(field: &str, value: &str) -> Self {
        LedgerError::DuplicateIdentity {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Create a `DuplicateReference` error
    pub fn duplicate_reference(reference: &str) -> Self {
        LedgerError::DuplicateReference {
            reference: reference.to_string(),
        }
    }

    /// Create an `InvalidLoanState` error
    pub fn invalid_loan_state(loan: LoanId, expected: LoanStatus, actual: LoanStatus) -> Self {
        LedgerError::InvalidLoanState {
            loan,
            expected,
            actual,
        }
    }

    /// Create an `AlreadyClosed` error for a loan
    pub fn loan_closed(loan: LoanId) -> Self {
        LedgerError::AlreadyClosed {
            entity: "loan",
            id: loan,
        }
    }

    /// Create an `AlreadyClosed` error for an investment
    pub fn investment_closed(investment: InvestmentId) -> Self {
        LedgerError::AlreadyClosed {
            entity: "investment",
            id: investment,
        }
    }

    /// Create a `StorageFailure` error
    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::StorageFailure {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        LedgerError::Io {
            message: error.to_string(),
        }
    }
}

// A poisoned row mutex means a writer panicked mid-operation; surface it
// as a storage failure rather than propagating the panic.
impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(error: std::sync::PoisonError<T>) -> Self {
        LedgerError::StorageFailure {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    #[rstest]
    #[case::invalid_amount(
        LedgerError::invalid_amount(Decimal::new(-500, 2)),
        "Invalid amount -5.00: amounts must be positive"
    )]
    #[case::insufficient_funds(
        LedgerError::insufficient_funds(7, Decimal::new(5000, 2), Decimal::new(10000, 2)),
        "Insufficient funds in account 7: available 50.00, requested 100.00"
    )]
    #[case::self_transfer(
        LedgerError::SelfTransfer { account: 3 },
        "Account 3 cannot transfer to itself"
    )]
    #[case::account_not_found(
        LedgerError::account_not_found("phone +911234567890"),
        "No account found for phone +911234567890"
    )]
    #[case::duplicate_reference(
        LedgerError::duplicate_reference("EMI-1-4"),
        "Ledger reference 'EMI-1-4' has already been used"
    )]
    #[case::already_paid(
        LedgerError::AlreadyPaid { loan: 2, emi_number: 4 },
        "EMI #4 of loan 2 has already been paid"
    )]
    #[case::loan_closed(LedgerError::loan_closed(9), "loan 9 is already closed")]
    fn error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn io_error_converts() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: LedgerError = io_error.into();
        assert!(matches!(error, LedgerError::Io { .. }));
    }

    #[test]
    fn poison_error_converts_to_storage_failure() {
        let poison = std::sync::PoisonError::new(());
        let error: LedgerError = poison.into();
        assert!(matches!(error, LedgerError::StorageFailure { .. }));
    }
}
