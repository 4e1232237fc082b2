//! Bulk Import Parser.
//!
//! Reads attendee rows from a CSV file with a header row. Header names are
//! matched case-insensitively after trimming.
//!
//! | Column | Required | Notes |
//! |---|---|---|
//! | `Student Name` or `Name` | yes | display name |
//! | `Email` | yes | recipient address |
//! | `ID` or `JIS ID` | no | institutional identifier |
//! | `Mobile` | no | |
//! | `Department` | no | |
//! | `Payment Status` | no | defaults to paid |
//!
//! Rows with a blank name or email are left out and counted.

use gatepass_core::attendee::{AttendeeRecord, PaymentStatus};
use std::io::Read;
use thiserror::Error;

/// Errors reading an import file
#[derive(Error, Debug)]
pub enum ImportError {
    /// A required header is absent
    #[error("CSV must contain a {column:?} column")]
    MissingColumn {
        /// Expected header
        column: &'static str,
    },

    /// The file is not readable CSV
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
}

/// Outcome of an import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Accepted rows, in file order
    pub records: Vec<AttendeeRecord>,
    /// Rows left out for a blank name or email
    pub skipped: usize,
}

/// Column positions resolved from the header row
struct Columns {
    name: usize,
    email: usize,
    institution_id: Option<usize>,
    mobile: Option<usize>,
    department: Option<usize>,
    payment: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, ImportError> {
        let find = |candidates: &[&str]| {
            headers.iter().position(|header| {
                let header = header.trim();
                candidates.iter().any(|c| header.eq_ignore_ascii_case(c))
            })
        };

        Ok(Self {
            name: find(&["Student Name", "Name"]).ok_or(ImportError::MissingColumn {
                column: "Student Name",
            })?,
            email: find(&["Email"]).ok_or(ImportError::MissingColumn { column: "Email" })?,
            institution_id: find(&["JIS ID", "ID"]),
            mobile: find(&["Mobile"]),
            department: find(&["Department"]),
            payment: find(&["Payment Status"]),
        })
    }
}

/// Parse a CSV import.
///
/// # Errors
///
/// Returns [`ImportError::MissingColumn`] when the name or email header is
/// absent, or [`ImportError::Csv`] if the input is not valid CSV.
pub fn parse_csv<R: Read>(reader: R) -> Result<ImportReport, ImportError> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns = Columns::resolve(csv.headers()?)?;
    let mut report = ImportReport::default();

    for row in csv.records() {
        let row = row?;
        let field = |index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let (Some(name), Some(email)) = (field(Some(columns.name)), field(Some(columns.email)))
        else {
            report.skipped += 1;
            continue;
        };

        let mut record = AttendeeRecord::student(name, email).with_payment(
            field(columns.payment).map_or(PaymentStatus::Paid, |raw| PaymentStatus::parse(&raw)),
        );
        if let Some(id) = field(columns.institution_id) {
            record = record.with_institution_id(id);
        }
        record.mobile = field(columns.mobile);
        record.department = field(columns.department);

        report.records.push(record);
    }

    tracing::debug!(
        imported = report.records.len(),
        skipped = report.skipped,
        "Parsed CSV import"
    );

    Ok(report)
}
