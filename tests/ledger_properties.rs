//! End-to-end tests for the ledger's core guarantees
//!
//! These tests drive the public API only: money conservation, overdraft
//! protection, ledger completeness, race handling on loans, and the
//! all-or-nothing commit of transfers.

use chrono::Utc;
use ledgerbank::{
    write_statement_csv, AccountId, EmiStatus, InvestmentBook, LedgerError, LedgerStore,
    LoanApplication, LoanBook, LoanStatus, NewAccount, NewInvestment, PaymentMethod,
    TransferEngine,
};
use rstest::rstest;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn engine_with_accounts(count: usize) -> (TransferEngine, Vec<AccountId>) {
    let store = Arc::new(LedgerStore::new());
    let engine = TransferEngine::new(store);
    let accounts = (0..count)
        .map(|i| {
            engine
                .store()
                .open_account(
                    NewAccount {
                        holder_name: format!("Holder {i}"),
                        ifsc_code: "LEDG0000001".to_string(),
                        ..NewAccount::default()
                    },
                    Utc::now(),
                )
                .unwrap()
                .id
        })
        .collect();
    (engine, accounts)
}

fn disbursed_loan(book: &LoanBook, account: AccountId) -> u64 {
    let loan = book
        .apply(
            LoanApplication {
                account,
                principal: dec("100000"),
                interest_rate: dec("12"),
                tenure_months: 12,
            },
            Utc::now(),
        )
        .unwrap();
    book.approve(loan.id, Utc::now()).unwrap();
    book.disburse(loan.id, Utc::now()).unwrap();
    loan.id
}

/// Internal transfers move money around but never create or destroy it.
#[test]
fn concurrent_transfers_conserve_total_money() {
    let (engine, accounts) = engine_with_accounts(3);
    for &account in &accounts {
        engine
            .deposit(account, dec("1000.00"), "seed", None, Utc::now())
            .unwrap();
    }

    let mut handles = Vec::new();
    for worker in 0..6u32 {
        let engine = engine.clone();
        let accounts = accounts.clone();
        handles.push(thread::spawn(move || {
            for step in 0..100u32 {
                let from = accounts[(worker as usize + step as usize) % 3];
                let to = accounts[(worker as usize + step as usize + 1) % 3];
                let reference = format!("MIX-{worker}-{step}");
                let _ = engine.transfer(
                    from,
                    to,
                    dec("7.00"),
                    "shuffle",
                    Some(&reference),
                    Utc::now(),
                );
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let total: Decimal = accounts
        .iter()
        .map(|&account| engine.store().account(account).unwrap().balance)
        .sum();
    assert_eq!(total, dec("3000.00"));
}

/// Concurrent withdrawals can never overdraw an account.
#[test]
fn concurrent_withdrawals_never_go_negative() {
    let (engine, accounts) = engine_with_accounts(1);
    let account = accounts[0];
    engine
        .deposit(account, dec("100.00"), "seed", None, Utc::now())
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            let mut successes = 0u32;
            for _ in 0..5 {
                if engine
                    .withdraw(account, dec("30.00"), "grab", None, Utc::now())
                    .is_ok()
                {
                    successes += 1;
                }
            }
            successes
        }));
    }
    let successes: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let balance = engine.store().account(account).unwrap().balance;
    assert!(balance >= Decimal::ZERO);
    assert_eq!(balance, dec("100.00") - dec("30.00") * Decimal::from(successes));
    // at most 3 grabs of 30.00 fit into 100.00
    assert!(successes <= 3);
}

/// Every successful balance change is on the ledger, and replaying the
/// ledger reproduces each account's balance.
#[test]
fn ledger_replays_to_the_live_balances() {
    let (engine, accounts) = engine_with_accounts(2);
    let (a, b) = (accounts[0], accounts[1]);
    engine
        .deposit(a, dec("500.00"), "salary", None, Utc::now())
        .unwrap();
    engine
        .transfer(a, b, dec("120.00"), "rent", Some("RENT-1"), Utc::now())
        .unwrap();
    engine
        .withdraw(b, dec("20.00"), "cash", None, Utc::now())
        .unwrap();
    // a declined debit appends nothing to the ledger
    let declined = engine.withdraw(b, dec("900.00"), "too much", None, Utc::now());
    assert!(matches!(declined, Err(LedgerError::InsufficientFunds { .. })));
    let after_decline = engine.store().statement(b, None, None).unwrap();
    assert_eq!(after_decline.entries.len(), 2);

    for &account in &accounts {
        let statement = engine.store().statement(account, None, None).unwrap();
        let mut replayed = Decimal::ZERO;
        for entry in &statement.entries {
            if entry.is_credit() {
                replayed += entry.amount;
            } else {
                replayed -= entry.amount;
            }
            assert_eq!(entry.balance_after, replayed);
        }
        assert_eq!(replayed, engine.store().account(account).unwrap().balance);
        assert_eq!(
            statement.total_credits - statement.total_debits,
            statement.closing_balance
        );
    }
}

/// Two callers racing for the same EMI: exactly one debit happens.
#[test]
fn emi_race_has_exactly_one_winner() {
    let (engine, accounts) = engine_with_accounts(1);
    let account = accounts[0];
    let book = Arc::new(LoanBook::new(engine.clone()));
    let loan = disbursed_loan(&book, account);

    let next = book.next_due_emi(loan).unwrap().unwrap();
    let mut handles = Vec::new();
    for _ in 0..2 {
        let book = Arc::clone(&book);
        let emi_number = next.emi_number;
        handles.push(thread::spawn(move || {
            book.pay_emi(loan, emi_number, PaymentMethod::Manual, Utc::now())
        }));
    }
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let wins = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(wins, 1);
    let loss = outcomes.iter().find(|o| o.is_err()).unwrap();
    assert_eq!(
        loss.clone().unwrap_err(),
        LedgerError::AlreadyPaid {
            loan,
            emi_number: next.emi_number
        }
    );
    // debited exactly once
    assert_eq!(
        engine.store().account(account).unwrap().balance,
        dec("100000") - dec("8884.88")
    );
}

/// Preclosure racing a manual EMI payment settles every instalment
/// exactly once; the account ends at the same balance either way.
#[test]
fn preclosure_race_never_double_settles() {
    let (engine, accounts) = engine_with_accounts(1);
    let account = accounts[0];
    engine
        .deposit(account, dec("20000.00"), "buffer", None, Utc::now())
        .unwrap();
    let book = Arc::new(LoanBook::new(engine.clone()));
    let loan = disbursed_loan(&book, account);

    let preclose = {
        let book = Arc::clone(&book);
        thread::spawn(move || book.preclose(loan, Utc::now()))
    };
    let pay = {
        let book = Arc::clone(&book);
        thread::spawn(move || book.pay_emi(loan, 1, PaymentMethod::Manual, Utc::now()))
    };
    let preclose_outcome = preclose.join().unwrap();
    let pay_outcome = pay.join().unwrap();

    assert!(preclose_outcome.is_ok());
    // the manual payment either won the lock first or lost gracefully
    if let Err(error) = pay_outcome {
        assert!(matches!(
            error,
            LedgerError::AlreadyPaid { .. } | LedgerError::AlreadyClosed { .. }
        ));
    }

    let closed = book.loan(loan).unwrap();
    assert_eq!(closed.status, LoanStatus::Closed);
    assert_eq!(closed.remaining_balance, Decimal::ZERO);
    assert!(book
        .schedule(loan)
        .unwrap()
        .iter()
        .all(|emi| emi.status == EmiStatus::Paid));

    // seed + principal - emi * 12, regardless of interleaving
    let expected = dec("20000.00") + dec("100000") - dec("8884.88") * Decimal::from(12);
    assert_eq!(engine.store().account(account).unwrap().balance, expected);
}

/// The instalment formula, checked against hand-computed schedules.
#[rstest]
#[case::standard("100000", "12", 12, "8884.88")]
#[case::zero_rate("12000", "0", 12, "1000.00")]
#[case::long_tenure("500000", "10.5", 60, "10746.95")]
fn emi_formula_matches_amortization(
    #[case] principal: &str,
    #[case] rate: &str,
    #[case] tenure: u32,
    #[case] expected: &str,
) {
    let (engine, accounts) = engine_with_accounts(1);
    let book = LoanBook::new(engine);
    let loan = book
        .apply(
            LoanApplication {
                account: accounts[0],
                principal: dec(principal),
                interest_rate: dec(rate),
                tenure_months: tenure,
            },
            Utc::now(),
        )
        .unwrap();
    assert_eq!(loan.monthly_emi, dec(expected));
}

/// An account can never transfer to itself.
#[test]
fn self_transfer_is_rejected_before_any_locking() {
    let (engine, accounts) = engine_with_accounts(1);
    let account = accounts[0];
    engine
        .deposit(account, dec("100.00"), "seed", None, Utc::now())
        .unwrap();
    assert_eq!(
        engine.transfer(account, account, dec("10.00"), "loop", None, Utc::now()),
        Err(LedgerError::SelfTransfer { account })
    );
    let statement = engine.store().statement(account, None, None).unwrap();
    assert_eq!(statement.entries.len(), 1);
}

/// A transfer that fails at commit leaves both balances untouched.
#[test]
fn failed_commit_rolls_back_both_sides() {
    let (engine, accounts) = engine_with_accounts(2);
    let (a, b) = (accounts[0], accounts[1]);
    engine
        .deposit(a, dec("100.00"), "seed", None, Utc::now())
        .unwrap();
    engine
        .transfer(a, b, dec("25.00"), "first", Some("PAY-42"), Utc::now())
        .unwrap();

    // replay with the spent reference: validation passes, commit fails
    let replay = engine.transfer(a, b, dec("25.00"), "replay", Some("PAY-42"), Utc::now());
    assert_eq!(replay, Err(LedgerError::duplicate_reference("PAY-42")));
    assert_eq!(engine.store().account(a).unwrap().balance, dec("75.00"));
    assert_eq!(engine.store().account(b).unwrap().balance, dec("25.00"));

    // the failed replay wrote nothing to the ledger
    let statement = engine.store().statement(a, None, None).unwrap();
    assert_eq!(statement.entries.len(), 2);
}

/// Investments and loans both ride on the engine, so a mixed workload
/// still replays cleanly and exports a statement.
#[test]
fn mixed_workload_exports_a_consistent_statement() {
    let (engine, accounts) = engine_with_accounts(1);
    let account = accounts[0];
    engine
        .deposit(account, dec("50000.00"), "opening", None, Utc::now())
        .unwrap();

    let investments = InvestmentBook::new(engine.clone());
    let position = investments
        .open(
            NewInvestment {
                account,
                name: "Index Fund".to_string(),
                principal: dec("10000"),
                expected_return_rate: dec("8"),
                maturity_date: None,
            },
            Utc::now(),
        )
        .unwrap();
    investments
        .record_dividend(position.id, dec("250"), Utc::now())
        .unwrap();
    investments
        .withdraw(position.id, dec("4000"), Utc::now())
        .unwrap();

    let statement = engine.store().statement(account, None, None).unwrap();
    assert_eq!(
        statement.closing_balance,
        dec("50000.00") - dec("10000") + dec("250") + dec("4000")
    );

    let file = tempfile::NamedTempFile::new().unwrap();
    {
        let mut handle = file.reopen().unwrap();
        write_statement_csv(&statement, &mut handle).unwrap();
    }
    let text = std::fs::read_to_string(file.path()).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "timestamp,type,description,reference,debit,credit,balance"
    );
    // opening deposit, buy, dividend, sell
    assert_eq!(lines.count(), 4);
    assert!(text.contains("Investment in Index Fund"));
    assert!(text.contains("Dividend from Index Fund"));
}
