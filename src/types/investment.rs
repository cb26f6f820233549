//! Investment types
//!
//! An investment tracks money moved out of an account into a named
//! product. Its `current_value` follows external market input; the
//! account balance only changes through buys, sells and dividends.

use crate::types::account::AccountId;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Investment identifier
pub type InvestmentId = u64;

/// Lifecycle status of an investment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvestmentStatus {
    Pending,
    Active,
    Matured,
    Closed,
}

impl fmt::Display for InvestmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvestmentStatus::Pending => write!(f, "pending"),
            InvestmentStatus::Active => write!(f, "active"),
            InvestmentStatus::Matured => write!(f, "matured"),
            InvestmentStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Kind of investment transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvestmentTxType {
    /// Purchase: money left the account
    Buy,
    /// Withdrawal: money returned to the account
    Sell,
    /// Payout credited without reducing the holding
    Dividend,
}

/// An investment position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,

    /// Funding account
    pub account: AccountId,

    /// Product name shown in the portfolio
    pub name: String,

    /// Amount originally invested
    pub principal: Decimal,

    /// Marked-to-market value, updated from outside
    pub current_value: Decimal,

    /// Advertised annual return in percent, informational only
    pub expected_return_rate: Decimal,

    pub status: InvestmentStatus,

    pub started_at: DateTime<Utc>,

    pub maturity_date: Option<NaiveDate>,
}

impl Investment {
    /// Unrealized gain (positive) or loss (negative)
    pub fn profit_loss(&self) -> Decimal {
        self.current_value - self.principal
    }

    /// `profit_loss` as a percentage of the principal; zero when the
    /// principal is zero
    pub fn return_percentage(&self) -> Decimal {
        if self.principal.is_zero() {
            return Decimal::ZERO;
        }
        (self.profit_loss() / self.principal * Decimal::from(100)).round_dp(2)
    }
}

/// One movement recorded against an investment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentTransaction {
    pub investment: InvestmentId,
    pub tx_type: InvestmentTxType,
    pub amount: Decimal,
    /// Globally unique reference, shared with the ledger leg
    pub reference: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload for opening an investment
#[derive(Debug, Clone)]
pub struct NewInvestment {
    pub account: AccountId,
    pub name: String,
    pub principal: Decimal,
    pub expected_return_rate: Decimal,
    pub maturity_date: Option<NaiveDate>,
}

/// Aggregate view of one account's investments
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PortfolioSummary {
    pub total_invested: Decimal,
    pub total_current_value: Decimal,
    pub total_profit_loss: Decimal,
    pub active_count: usize,
}
