//! Investments on top of the transfer engine
//!
//! [`InvestmentBook`] pairs every position with a mutex and keeps its
//! own append-only transaction log. A transaction reference is claimed
//! in that log *before* the engine moves any money and released again
//! if the move fails, so money never moves without its record.

use crate::core::engine::TransferEngine;
use crate::types::account::AccountId;
use crate::types::error::LedgerError;
use crate::types::investment::{
    Investment, InvestmentId, InvestmentStatus, InvestmentTransaction, InvestmentTxType,
    NewInvestment, PortfolioSummary,
};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::instrument;
use uuid::Uuid;

/// How many reference draws before giving up
const MAX_REFERENCE_DRAWS: u32 = 8;

#[derive(Debug, Default)]
struct InvestmentLog {
    rows: Vec<InvestmentTransaction>,
    references: HashSet<String>,
}

/// Investment subsystem
#[derive(Debug)]
pub struct InvestmentBook {
    engine: TransferEngine,
    investments: DashMap<InvestmentId, Arc<Mutex<Investment>>>,
    log: Mutex<InvestmentLog>,
    next_investment_id: AtomicU64,
}

impl InvestmentBook {
    pub fn new(engine: TransferEngine) -> Self {
        InvestmentBook {
            engine,
            investments: DashMap::new(),
            log: Mutex::new(InvestmentLog::default()),
            next_investment_id: AtomicU64::new(1),
        }
    }

    /// Open a position, funding it from the account
    ///
    /// The Buy reference is claimed before the debit; if the debit
    /// fails the reference is released and nothing is recorded.
    #[instrument(name = "investment_book.open", skip(self, new_investment), err)]
    pub fn open(
        &self,
        new_investment: NewInvestment,
        now: DateTime<Utc>,
    ) -> Result<Investment, LedgerError> {
        if new_investment.principal <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(new_investment.principal));
        }
        let principal = new_investment.principal.round_dp(2);
        let reference = self.claim_reference("INV")?;
        if let Err(error) = self.engine.debit_external(
            new_investment.account,
            principal,
            &format!("Investment in {}", new_investment.name),
            Some(&reference),
            now,
        ) {
            self.release_reference(&reference)?;
            return Err(error);
        }

        let id = self.next_investment_id.fetch_add(1, Ordering::SeqCst);
        let investment = Investment {
            id,
            account: new_investment.account,
            name: new_investment.name,
            principal,
            current_value: principal,
            expected_return_rate: new_investment.expected_return_rate,
            status: InvestmentStatus::Active,
            started_at: now,
            maturity_date: new_investment.maturity_date,
        };
        self.investments
            .insert(id, Arc::new(Mutex::new(investment.clone())));
        self.record(InvestmentTransaction {
            investment: id,
            tx_type: InvestmentTxType::Buy,
            amount: principal,
            reference,
            timestamp: now,
        })?;
        Ok(investment)
    }

    /// Withdraw part or all of a position back into the account
    ///
    /// Decrements `current_value`; a withdrawal that empties the
    /// position closes it.
    #[instrument(name = "investment_book.withdraw", skip(self), err)]
    pub fn withdraw(
        &self,
        id: InvestmentId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Investment, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(amount));
        }
        let amount = amount.round_dp(2);
        let cell = self.cell(id)?;
        let mut row = cell.lock()?;
        if row.status == InvestmentStatus::Closed {
            return Err(LedgerError::investment_closed(id));
        }
        if amount > row.current_value {
            return Err(LedgerError::ExceedsAvailableValue {
                investment: id,
                current_value: row.current_value,
                requested: amount,
            });
        }

        let reference = self.claim_reference("WDR")?;
        if let Err(error) = self.engine.credit_external(
            row.account,
            amount,
            &format!("Withdrawal from {}", row.name),
            Some(&reference),
            now,
        ) {
            self.release_reference(&reference)?;
            return Err(error);
        }

        row.current_value -= amount;
        if row.current_value.is_zero() {
            row.status = InvestmentStatus::Closed;
        }
        self.record(InvestmentTransaction {
            investment: id,
            tx_type: InvestmentTxType::Sell,
            amount,
            reference,
            timestamp: now,
        })?;
        Ok(row.clone())
    }

    /// Credit a payout to the account without reducing the holding
    #[instrument(name = "investment_book.record_dividend", skip(self), err)]
    pub fn record_dividend(
        &self,
        id: InvestmentId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<InvestmentTransaction, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(amount));
        }
        let amount = amount.round_dp(2);
        let cell = self.cell(id)?;
        let row = cell.lock()?;
        if row.status == InvestmentStatus::Closed {
            return Err(LedgerError::investment_closed(id));
        }

        let reference = self.claim_reference("DIV")?;
        if let Err(error) = self.engine.credit_external(
            row.account,
            amount,
            &format!("Dividend from {}", row.name),
            Some(&reference),
            now,
        ) {
            self.release_reference(&reference)?;
            return Err(error);
        }

        let transaction = InvestmentTransaction {
            investment: id,
            tx_type: InvestmentTxType::Dividend,
            amount,
            reference,
            timestamp: now,
        };
        self.record(transaction.clone())?;
        Ok(transaction)
    }

    /// Apply an external valuation; zero closes the position
    #[instrument(name = "investment_book.update_value", skip(self), err)]
    pub fn update_value(
        &self,
        id: InvestmentId,
        new_value: Decimal,
    ) -> Result<Investment, LedgerError> {
        if new_value < Decimal::ZERO {
            return Err(LedgerError::invalid_amount(new_value));
        }
        let cell = self.cell(id)?;
        let mut row = cell.lock()?;
        if row.status == InvestmentStatus::Closed {
            return Err(LedgerError::investment_closed(id));
        }
        row.current_value = new_value.round_dp(2);
        if row.current_value.is_zero() {
            row.status = InvestmentStatus::Closed;
        }
        Ok(row.clone())
    }

    /// Flip active positions past their maturity date to Matured
    #[instrument(name = "investment_book.mark_matured", skip(self), err)]
    pub fn mark_matured(&self, today: NaiveDate) -> Result<usize, LedgerError> {
        let mut flipped = 0;
        for cell in self.investments.iter() {
            let mut row = cell.value().lock()?;
            if row.status == InvestmentStatus::Active
                && row.maturity_date.is_some_and(|date| date <= today)
            {
                row.status = InvestmentStatus::Matured;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    /// Snapshot one position
    pub fn investment(&self, id: InvestmentId) -> Result<Investment, LedgerError> {
        let cell = self.cell(id)?;
        let row = cell.lock()?;
        Ok(row.clone())
    }

    /// Snapshot every position of an account, oldest first
    pub fn portfolio(&self, account: AccountId) -> Result<Vec<Investment>, LedgerError> {
        let mut result = Vec::new();
        for cell in self.investments.iter() {
            let row = cell.value().lock()?;
            if row.account == account {
                result.push(row.clone());
            }
        }
        result.sort_by_key(|investment| investment.id);
        Ok(result)
    }

    /// Aggregate invested amount, current value and unrealized P&L over
    /// an account's open positions
    pub fn portfolio_summary(&self, account: AccountId) -> Result<PortfolioSummary, LedgerError> {
        let mut summary = PortfolioSummary::default();
        for investment in self.portfolio(account)? {
            if investment.status == InvestmentStatus::Closed {
                continue;
            }
            summary.total_invested += investment.principal;
            summary.total_current_value += investment.current_value;
            summary.total_profit_loss += investment.profit_loss();
            if investment.status == InvestmentStatus::Active {
                summary.active_count += 1;
            }
        }
        Ok(summary)
    }

    /// All movements recorded against one position, oldest first
    pub fn transactions(
        &self,
        id: InvestmentId,
    ) -> Result<Vec<InvestmentTransaction>, LedgerError> {
        self.cell(id)?;
        let log = self.log.lock()?;
        Ok(log
            .rows
            .iter()
            .filter(|transaction| transaction.investment == id)
            .cloned()
            .collect())
    }

    fn cell(&self, id: InvestmentId) -> Result<Arc<Mutex<Investment>>, LedgerError> {
        self.investments
            .get(&id)
            .map(|cell| Arc::clone(cell.value()))
            .ok_or(LedgerError::InvestmentNotFound { investment: id })
    }

    /// Draw a globally unique reference and claim it in the log
    fn claim_reference(&self, prefix: &str) -> Result<String, LedgerError> {
        let mut log = self.log.lock()?;
        for _ in 0..MAX_REFERENCE_DRAWS {
            let tail = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
            let candidate = format!("{prefix}-{tail}");
            if log.references.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(LedgerError::storage(format!(
            "could not draw a unique {prefix} reference after {MAX_REFERENCE_DRAWS} attempts"
        )))
    }

    /// Give a claimed reference back after a failed money move
    fn release_reference(&self, reference: &str) -> Result<(), LedgerError> {
        let mut log = self.log.lock()?;
        log.references.remove(reference);
        Ok(())
    }

    fn record(&self, transaction: InvestmentTransaction) -> Result<(), LedgerError> {
        let mut log = self.log.lock()?;
        log.rows.push(transaction);
        Ok(())
    }
}
