//! Loan and EMI types
//!
//! A loan moves through `Pending -> Approved -> Disbursed -> Closed`
//! (or `Pending -> Rejected`). Disbursement materializes the full EMI
//! schedule up front; repayments then consume it one row at a time.

use crate::types::account::AccountId;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loan identifier
pub type LoanId = u64;

/// Lifecycle status of a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// Applied for, awaiting a decision
    Pending,
    /// Approved, awaiting disbursement
    Approved,
    /// Turned down; terminal
    Rejected,
    /// Principal credited, repayment in progress
    Disbursed,
    /// Fully repaid or preclosed; terminal
    Closed,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::Pending => write!(f, "pending"),
            LoanStatus::Approved => write!(f, "approved"),
            LoanStatus::Rejected => write!(f, "rejected"),
            LoanStatus::Disbursed => write!(f, "disbursed"),
            LoanStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Status of a single EMI row
///
/// `Paid` is the only terminal state; `Pending`, `Overdue` and `Failed`
/// rows all remain payable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmiStatus {
    Pending,
    Paid,
    Overdue,
    Failed,
}

/// How an EMI was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Collected by the autopay sweep
    Auto,
    /// Paid explicitly by the account holder
    Manual,
    /// Settled as part of closing the loan early
    Preclosure,
}

/// A loan and its repayment bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,

    /// Borrowing account
    pub account: AccountId,

    /// Amount applied for
    pub principal: Decimal,

    /// Annual interest rate in percent
    pub interest_rate: Decimal,

    pub tenure_months: u32,

    /// Fixed instalment, computed once at application time
    pub monthly_emi: Decimal,

    pub status: LoanStatus,

    /// Outstanding amount; `emi * tenure` at disbursement, decremented
    /// by every repayment
    pub remaining_balance: Decimal,

    /// Due date of the next unpaid EMI, `None` outside `Disbursed`
    pub next_emi_date: Option<NaiveDate>,

    pub autopay_enabled: bool,

    pub applied_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// One row of a loan's repayment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmiPayment {
    pub loan: LoanId,

    /// 1-based position in the schedule
    pub emi_number: u32,

    pub due_date: NaiveDate,

    /// Amount owed for this instalment
    pub emi_amount: Decimal,

    /// Amount actually collected, zero until paid
    pub paid_amount: Decimal,

    pub status: EmiStatus,

    pub method: Option<PaymentMethod>,

    pub paid_at: Option<DateTime<Utc>>,

    /// Ledger reference of the settling debit
    pub reference: Option<String>,
}

/// Application payload for a new loan
#[derive(Debug, Clone)]
pub struct LoanApplication {
    pub account: AccountId,
    pub principal: Decimal,
    /// Annual interest rate in percent
    pub interest_rate: Decimal,
    pub tenure_months: u32,
}

/// Compute the fixed monthly instalment for a loan.
///
/// Uses the standard amortization formula with a monthly rate of
/// `annual_rate / 1200`; a zero rate degenerates to an even split of
/// the principal. The result is rounded to 2 decimal places.
pub fn monthly_emi(principal: Decimal, annual_rate: Decimal, tenure_months: u32) -> Decimal {
    let months = Decimal::from(tenure_months);
    let rate = annual_rate / Decimal::from(1200);
    if rate.is_zero() {
        return (principal / months).round_dp(2);
    }
    let factor = (Decimal::ONE + rate).powi(tenure_months as i64);
    (principal * rate * factor / (factor - Decimal::ONE)).round_dp(2)
}
