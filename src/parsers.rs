pub mod flow_table;
pub mod sensor_csv;

/// A document that is structurally unreadable or semantically empty.
///
/// Partial corruption is a hard failure on purpose: a truncated series
/// masquerading as complete would poison the latest aggregate downstream.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to extract text from PDF: {0}")]
    PdfExtraction(String),

    #[error("failed to decode CSV: {0}")]
    CsvDecode(String),

    #[error("no table found: {0}")]
    NoTable(String),

    #[error("malformed row: {0}")]
    MalformedRow(String),

    #[error("timestamps out of order: {0}")]
    OutOfOrder(String),

    #[error("document contains no readings")]
    EmptySeries,
}
