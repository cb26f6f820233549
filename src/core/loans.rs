//! Loan lifecycle on top of the transfer engine
//!
//! [`LoanBook`] owns every loan together with its EMI schedule, one
//! mutex per loan. All repayment decisions happen under that mutex, so
//! two callers racing for the same EMI resolve deterministically: the
//! loser gets `AlreadyPaid` and no money moves twice.
//!
//! Lock order is loan first, then the borrower's account row (taken
//! inside the engine). The engine never locks loans, so the order is
//! acyclic.

use crate::core::engine::TransferEngine;
use crate::types::account::AccountId;
use crate::types::error::LedgerError;
use crate::types::loan::{
    monthly_emi, EmiPayment, EmiStatus, Loan, LoanApplication, LoanId, LoanStatus, PaymentMethod,
};
use chrono::{DateTime, Months, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// A loan plus its owned EMI schedule; both live and die together
#[derive(Debug, Clone)]
pub struct LoanRecord {
    pub loan: Loan,
    pub schedule: Vec<EmiPayment>,
}

/// Loan subsystem
#[derive(Debug)]
pub struct LoanBook {
    engine: TransferEngine,
    loans: DashMap<LoanId, Arc<Mutex<LoanRecord>>>,
    next_loan_id: AtomicU64,
}

impl LoanBook {
    pub fn new(engine: TransferEngine) -> Self {
        LoanBook {
            engine,
            loans: DashMap::new(),
            next_loan_id: AtomicU64::new(1),
        }
    }

    /// File a loan application
    ///
    /// The fixed instalment is computed once here and never recomputed.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` for a non-positive principal or negative rate
    /// - `InvalidTenure` for a zero tenure
    /// - `AccountNotFound` if the borrowing account does not exist
    #[instrument(name = "loan_book.apply", skip(self, application), err)]
    pub fn apply(
        &self,
        application: LoanApplication,
        now: DateTime<Utc>,
    ) -> Result<Loan, LedgerError> {
        if application.principal <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(application.principal));
        }
        if application.interest_rate < Decimal::ZERO {
            return Err(LedgerError::invalid_amount(application.interest_rate));
        }
        if application.tenure_months == 0 {
            return Err(LedgerError::InvalidTenure { months: 0 });
        }
        // borrower must exist before we book anything against them
        self.engine.store().account(application.account)?;

        let principal = application.principal.round_dp(2);
        let emi = monthly_emi(principal, application.interest_rate, application.tenure_months);
        let id = self.next_loan_id.fetch_add(1, Ordering::SeqCst);
        let loan = Loan {
            id,
            account: application.account,
            principal,
            interest_rate: application.interest_rate,
            tenure_months: application.tenure_months,
            monthly_emi: emi,
            status: LoanStatus::Pending,
            remaining_balance: Decimal::ZERO,
            next_emi_date: None,
            autopay_enabled: false,
            applied_at: now,
            approved_at: None,
            disbursed_at: None,
            closed_at: None,
        };
        self.loans.insert(
            id,
            Arc::new(Mutex::new(LoanRecord {
                loan: loan.clone(),
                schedule: Vec::new(),
            })),
        );
        Ok(loan)
    }

    /// Snapshot a loan
    pub fn loan(&self, id: LoanId) -> Result<Loan, LedgerError> {
        let cell = self.record(id)?;
        let record = cell.lock()?;
        Ok(record.loan.clone())
    }

    /// Snapshot a loan's EMI schedule
    pub fn schedule(&self, id: LoanId) -> Result<Vec<EmiPayment>, LedgerError> {
        let cell = self.record(id)?;
        let record = cell.lock()?;
        Ok(record.schedule.clone())
    }

    /// Snapshot all loans booked against an account
    pub fn loans_for_account(&self, account: AccountId) -> Result<Vec<Loan>, LedgerError> {
        let mut result = Vec::new();
        for cell in self.loans.iter() {
            let record = cell.value().lock()?;
            if record.loan.account == account {
                result.push(record.loan.clone());
            }
        }
        result.sort_by_key(|loan| loan.id);
        Ok(result)
    }

    /// Approve a pending application
    #[instrument(name = "loan_book.approve", skip(self), err)]
    pub fn approve(&self, id: LoanId, now: DateTime<Utc>) -> Result<Loan, LedgerError> {
        self.decide(id, LoanStatus::Approved, now)
    }

    /// Reject a pending application; terminal
    #[instrument(name = "loan_book.reject", skip(self), err)]
    pub fn reject(&self, id: LoanId, now: DateTime<Utc>) -> Result<Loan, LedgerError> {
        self.decide(id, LoanStatus::Rejected, now)
    }

    fn decide(
        &self,
        id: LoanId,
        decision: LoanStatus,
        now: DateTime<Utc>,
    ) -> Result<Loan, LedgerError> {
        let cell = self.record(id)?;
        let mut record = cell.lock()?;
        if record.loan.status != LoanStatus::Pending {
            return Err(LedgerError::invalid_loan_state(
                id,
                LoanStatus::Pending,
                record.loan.status,
            ));
        }
        record.loan.status = decision;
        if decision == LoanStatus::Approved {
            record.loan.approved_at = Some(now);
        }
        Ok(record.loan.clone())
    }

    /// Disburse an approved loan
    ///
    /// Credits the principal to the borrowing account, sets the
    /// outstanding balance to `emi * tenure`, and materializes the full
    /// schedule of Pending EMI rows with month-apart due dates.
    #[instrument(name = "loan_book.disburse", skip(self), err)]
    pub fn disburse(&self, id: LoanId, now: DateTime<Utc>) -> Result<Loan, LedgerError> {
        let cell = self.record(id)?;
        let mut record = cell.lock()?;
        if record.loan.status != LoanStatus::Approved {
            return Err(LedgerError::invalid_loan_state(
                id,
                LoanStatus::Approved,
                record.loan.status,
            ));
        }

        let reference = format!("LOAN-{id}-DISBURSE");
        self.engine.credit_external(
            record.loan.account,
            record.loan.principal,
            &format!("Disbursement of loan {id}"),
            Some(&reference),
            now,
        )?;

        let today = now.date_naive();
        let mut schedule = Vec::with_capacity(record.loan.tenure_months as usize);
        for emi_number in 1..=record.loan.tenure_months {
            schedule.push(EmiPayment {
                loan: id,
                emi_number,
                due_date: add_months(today, emi_number)?,
                emi_amount: record.loan.monthly_emi,
                paid_amount: Decimal::ZERO,
                status: EmiStatus::Pending,
                method: None,
                paid_at: None,
                reference: None,
            });
        }

        record.loan.status = LoanStatus::Disbursed;
        record.loan.remaining_balance =
            record.loan.monthly_emi * Decimal::from(record.loan.tenure_months);
        record.loan.next_emi_date = Some(add_months(today, 1)?);
        record.loan.disbursed_at = Some(now);
        record.schedule = schedule;
        Ok(record.loan.clone())
    }

    /// The earliest unpaid EMI, if any
    ///
    /// This is a snapshot; callers re-verify by paying the specific
    /// number through [`pay_emi`](Self::pay_emi), which re-checks under
    /// the loan lock.
    pub fn next_due_emi(&self, id: LoanId) -> Result<Option<EmiPayment>, LedgerError> {
        let cell = self.record(id)?;
        let record = cell.lock()?;
        Ok(record
            .schedule
            .iter()
            .find(|emi| emi.status != EmiStatus::Paid)
            .cloned())
    }

    /// Pay a specific EMI
    ///
    /// # Errors
    ///
    /// - `AlreadyClosed` / `InvalidLoanState` per the loan's status
    /// - `EmiNotFound` for an out-of-range number
    /// - `AlreadyPaid` when a concurrent caller got there first; the
    ///   account is not debited
    /// - `InsufficientFunds` from the engine; the EMI stays payable
    #[instrument(name = "loan_book.pay_emi", skip(self), err)]
    pub fn pay_emi(
        &self,
        id: LoanId,
        emi_number: u32,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<EmiPayment, LedgerError> {
        let cell = self.record(id)?;
        let mut record = cell.lock()?;
        self.settle(id, &mut record, emi_number, method, now)
    }

    /// Pay the earliest unpaid EMI under the loan lock
    #[instrument(name = "loan_book.pay_next_emi", skip(self), err)]
    pub fn pay_next_emi(
        &self,
        id: LoanId,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<EmiPayment, LedgerError> {
        let cell = self.record(id)?;
        let mut record = cell.lock()?;
        if record.loan.status == LoanStatus::Closed {
            return Err(LedgerError::loan_closed(id));
        }
        if record.loan.status != LoanStatus::Disbursed {
            return Err(LedgerError::invalid_loan_state(
                id,
                LoanStatus::Disbursed,
                record.loan.status,
            ));
        }
        let emi_number = record
            .schedule
            .iter()
            .find(|emi| emi.status != EmiStatus::Paid)
            .map(|emi| emi.emi_number)
            .ok_or_else(|| LedgerError::loan_closed(id))?;
        self.settle(id, &mut record, emi_number, method, now)
    }

    /// Close a disbursed loan early
    ///
    /// Debits exactly the outstanding balance in one stroke and marks
    /// every not-yet-paid EMI as settled by preclosure.
    #[instrument(name = "loan_book.preclose", skip(self), err)]
    pub fn preclose(&self, id: LoanId, now: DateTime<Utc>) -> Result<Loan, LedgerError> {
        let cell = self.record(id)?;
        let mut record = cell.lock()?;
        if record.loan.status == LoanStatus::Closed {
            return Err(LedgerError::loan_closed(id));
        }
        if record.loan.status != LoanStatus::Disbursed {
            return Err(LedgerError::invalid_loan_state(
                id,
                LoanStatus::Disbursed,
                record.loan.status,
            ));
        }

        let reference = format!("LOAN-{id}-PRECLOSE");
        self.engine.debit_external(
            record.loan.account,
            record.loan.remaining_balance,
            &format!("Preclosure of loan {id}"),
            Some(&reference),
            now,
        )?;

        for emi in record
            .schedule
            .iter_mut()
            .filter(|emi| emi.status != EmiStatus::Paid)
        {
            emi.status = EmiStatus::Paid;
            emi.paid_amount = emi.emi_amount;
            emi.method = Some(PaymentMethod::Preclosure);
            emi.paid_at = Some(now);
            emi.reference = Some(reference.clone());
        }
        record.loan.remaining_balance = Decimal::ZERO;
        record.loan.next_emi_date = None;
        record.loan.status = LoanStatus::Closed;
        record.loan.closed_at = Some(now);
        Ok(record.loan.clone())
    }

    /// Toggle autopay on a disbursed loan
    #[instrument(name = "loan_book.set_autopay", skip(self), err)]
    pub fn set_autopay(&self, id: LoanId, enabled: bool) -> Result<(), LedgerError> {
        let cell = self.record(id)?;
        let mut record = cell.lock()?;
        if record.loan.status != LoanStatus::Disbursed {
            return Err(LedgerError::invalid_loan_state(
                id,
                LoanStatus::Disbursed,
                record.loan.status,
            ));
        }
        record.loan.autopay_enabled = enabled;
        Ok(())
    }

    /// Collect the next EMI on every autopay-enabled loan that is due
    ///
    /// Returns one result per attempted loan. A declined debit marks
    /// the EMI `Failed`; it stays payable manually.
    #[instrument(name = "loan_book.run_autopay", skip(self))]
    pub fn run_autopay(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Vec<(LoanId, Result<EmiPayment, LedgerError>)> {
        let mut due: Vec<LoanId> = Vec::new();
        for cell in self.loans.iter() {
            let Ok(record) = cell.value().lock() else {
                continue;
            };
            let loan = &record.loan;
            if loan.status == LoanStatus::Disbursed
                && loan.autopay_enabled
                && loan.next_emi_date.is_some_and(|date| date <= today)
            {
                due.push(loan.id);
            }
        }
        due.sort_unstable();
        due.into_iter()
            .map(|id| (id, self.pay_next_emi(id, PaymentMethod::Auto, now)))
            .collect()
    }

    /// Flip past-due Pending EMI rows to Overdue; returns how many
    #[instrument(name = "loan_book.mark_overdue", skip(self), err)]
    pub fn mark_overdue(&self, today: NaiveDate) -> Result<usize, LedgerError> {
        let mut flipped = 0;
        for cell in self.loans.iter() {
            let mut record = cell.value().lock()?;
            if record.loan.status != LoanStatus::Disbursed {
                continue;
            }
            for emi in record
                .schedule
                .iter_mut()
                .filter(|emi| emi.status == EmiStatus::Pending && emi.due_date < today)
            {
                emi.status = EmiStatus::Overdue;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    fn record(&self, id: LoanId) -> Result<Arc<Mutex<LoanRecord>>, LedgerError> {
        self.loans
            .get(&id)
            .map(|cell| Arc::clone(cell.value()))
            .ok_or(LedgerError::LoanNotFound { loan: id })
    }

    /// Settle one EMI row; caller holds the loan lock
    fn settle(
        &self,
        id: LoanId,
        record: &mut LoanRecord,
        emi_number: u32,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<EmiPayment, LedgerError> {
        if record.loan.status == LoanStatus::Closed {
            return Err(LedgerError::loan_closed(id));
        }
        if record.loan.status != LoanStatus::Disbursed {
            return Err(LedgerError::invalid_loan_state(
                id,
                LoanStatus::Disbursed,
                record.loan.status,
            ));
        }
        let index = record
            .schedule
            .iter()
            .position(|emi| emi.emi_number == emi_number)
            .ok_or(LedgerError::EmiNotFound {
                loan: id,
                emi_number,
            })?;
        if record.schedule[index].status == EmiStatus::Paid {
            return Err(LedgerError::AlreadyPaid {
                loan: id,
                emi_number,
            });
        }

        let amount = record.schedule[index].emi_amount;
        let total = record.loan.tenure_months;
        let reference = format!("EMI-{id}-{emi_number}");
        let description = format!("EMI {emi_number}/{total} for loan {id}");
        if let Err(error) = self.engine.debit_external(
            record.loan.account,
            amount,
            &description,
            Some(&reference),
            now,
        ) {
            if method == PaymentMethod::Auto
                && matches!(error, LedgerError::InsufficientFunds { .. })
            {
                record.schedule[index].status = EmiStatus::Failed;
            }
            return Err(error);
        }

        let emi = &mut record.schedule[index];
        emi.status = EmiStatus::Paid;
        emi.paid_amount = amount;
        emi.method = Some(method);
        emi.paid_at = Some(now);
        emi.reference = Some(reference);
        record.loan.remaining_balance -= amount;

        match record
            .schedule
            .iter()
            .find(|emi| emi.status != EmiStatus::Paid)
        {
            Some(next) => record.loan.next_emi_date = Some(next.due_date),
            None => {
                record.loan.status = LoanStatus::Closed;
                record.loan.remaining_balance = Decimal::ZERO;
                record.loan.next_emi_date = None;
                record.loan.closed_at = Some(now);
            }
        }
        Ok(record.schedule[index].clone())
    }
}

fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate, LedgerError> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| LedgerError::storage("EMI due date out of range"))
}
