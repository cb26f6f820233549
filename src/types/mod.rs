//! Types module
//!
//! Contains core data structures used throughout the crate.
//! This module organizes types into logical submodules:
//! - `account`: Account state and registration types
//! - `entry`: Append-only ledger rows and statements
//! - `loan`: Loans, EMI schedules and the instalment formula
//! - `investment`: Investment positions and their transaction log
//! - `error`: Error types for the ledger core

pub mod account;
pub mod entry;
pub mod error;
pub mod investment;
pub mod loan;

pub use account::{Account, AccountId, AccountStatus, NewAccount};
pub use entry::{EntryStatus, EntryType, LedgerEntry, Statement};
pub use error::LedgerError;
pub use investment::{
    Investment, InvestmentId, InvestmentStatus, InvestmentTransaction, InvestmentTxType,
    NewInvestment, PortfolioSummary,
};
pub use loan::{
    monthly_emi, EmiPayment, EmiStatus, Loan, LoanApplication, LoanId, LoanStatus, PaymentMethod,
};
