//! I/O module
//!
//! Handles statement export.
//!
//! # Components
//!
//! - `statement_csv` - CSV rendering of account statements

pub mod statement_csv;

pub use statement_csv::write_statement_csv;
