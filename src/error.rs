use std::path::PathBuf;

use thiserror::Error;

/// Everything a user-triggered action can fail with. None of these end the session.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("cannot open {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: umya_spreadsheet::XlsxError,
    },

    #[error("cannot save {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: umya_spreadsheet::XlsxError,
    },

    #[error("worksheet '{0}' not found")]
    SheetNotFound(String),

    #[error("row {row} is out of range (data rows are 2..={last_row})")]
    RowOutOfRange { row: u32, last_row: u32 },

    #[error("row 1 is the header row and cannot be edited")]
    InvalidHeaderRow,

    #[error("'{0}' is not a valid row number")]
    InvalidInput(String),

    #[error("already at the first row")]
    AtFirstRow,

    #[error("no file loaded")]
    NoFileLoaded,
}

pub type Result<T> = std::result::Result<T, EditorError>;
