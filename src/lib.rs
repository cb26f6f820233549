//! Ledgerbank
//!
//! # Overview
//!
//! An in-process retail-banking ledger core: an append-only ledger log
//! plus a balance-mutation engine, with loans and investments layered
//! on top of it.
//!
//! # Architecture
//!
//! - [`types`] - Domain types (Account, LedgerEntry, Loan, Investment)
//! - [`core`] - Business logic components:
//!   - [`core::ledger_store`] - Account storage, identity uniqueness
//!     and the append-only ledger log
//!   - [`core::engine`] - The sole balance mutator; every debit and
//!     credit in the crate flows through it
//!   - [`core::loans`] - Loan lifecycle: application, approval,
//!     disbursement, EMI collection, preclosure, autopay
//!   - [`core::investments`] - Investment positions, withdrawals,
//!     dividends and valuations
//!   - [`core::verification`] - Phone-verification challenges behind
//!     an SMS gateway trait
//! - [`io`] - Statement export
//!
//! # Invariants
//!
//! - Balances never go negative; a debit that would overdraw fails
//!   before anything is written.
//! - Every successful balance change is mirrored by a ledger entry
//!   carrying the balance of its account immediately afterwards.
//! - Operation references are unique across the log; replaying one
//!   fails with [`types::LedgerError::DuplicateReference`] and has no
//!   effect.
//! - Concurrent callers contending for the same EMI or loan resolve
//!   deterministically: one wins, the rest get `AlreadyPaid` or
//!   `AlreadyClosed`.

// Module declarations
pub mod core;
pub mod io;
pub mod types;

pub use crate::core::{
    CodeDelivery, InvestmentBook, LedgerStore, LoanBook, LoanRecord, PhoneVerifier, SmsGateway,
    TransferEngine,
};
pub use io::write_statement_csv;
pub use types::{
    Account, AccountId, AccountStatus, EmiPayment, EmiStatus, EntryStatus, EntryType, Investment,
    InvestmentId, InvestmentStatus, InvestmentTransaction, InvestmentTxType, LedgerEntry,
    LedgerError, Loan, LoanApplication, LoanId, LoanStatus, NewAccount, NewInvestment,
    PaymentMethod, PortfolioSummary, Statement,
};
