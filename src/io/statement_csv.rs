//! Statement export in CSV format
//!
//! Renders a [`Statement`] with columns:
//! timestamp, type, description, reference, debit, credit, balance.

use crate::types::entry::Statement;
use crate::types::error::LedgerError;
use std::io::Write;

/// Write a statement to CSV
///
/// Rows come out in the order the statement carries them (commit
/// order). Amounts are printed with 2 decimal places.
pub fn write_statement_csv(
    statement: &Statement,
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);
    writer.write_record([
        "timestamp",
        "type",
        "description",
        "reference",
        "debit",
        "credit",
        "balance",
    ])?;

    for entry in &statement.entries {
        let (debit, credit) = if entry.is_credit() {
            (String::new(), format!("{:.2}", entry.amount))
        } else {
            (format!("{:.2}", entry.amount), String::new())
        };
        writer.write_record(&[
            entry.timestamp.to_rfc3339(),
            entry.entry_type.to_string(),
            entry.description.clone(),
            entry.reference.clone().unwrap_or_default(),
            debit,
            credit,
            format!("{:.2}", entry.balance_after),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
