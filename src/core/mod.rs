//! Core business logic module
//!
//! This module contains the ledger's moving parts:
//! - `ledger_store` - Account rows, identity uniqueness and the
//!   append-only ledger log
//! - `engine` - The single balance mutator
//! - `loans` - Loan lifecycle and EMI collection
//! - `investments` - Investment positions and their transaction log
//! - `verification` - Phone-verification challenges

pub mod engine;
pub mod investments;
pub mod ledger_store;
pub mod loans;
pub mod verification;

pub use engine::TransferEngine;
pub use investments::InvestmentBook;
pub use ledger_store::LedgerStore;
pub use loans::{LoanBook, LoanRecord};
pub use verification::{CodeDelivery, PhoneVerifier, SmsGateway};
