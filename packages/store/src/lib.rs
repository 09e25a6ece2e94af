#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Gateway to the spreadsheet that stores survey responses.
//!
//! The store is a single worksheet: row 1 is the header, every later row is
//! one response. The [`Worksheet`] trait exposes the small set of
//! operations the rest of the system needs (header access, append, bulk
//! reads, cell background formatting, column insertion/deletion and row
//! deletion). Two backends implement it:
//!
//! - [`sheets::GoogleSheetsWorksheet`] talks to the Google Sheets v4 REST
//!   API with a bearer token.
//! - [`memory::MemoryWorksheet`] keeps everything in process; used by tests
//!   and for offline runs.
//!
//! No operation retries. Remote failures surface as [`StoreError`].
//!
//! # Environment Variables
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `SURVEY_STORE` | No | `sheets` (default) or `memory` |
//! | `SURVEY_SHEET_ID` | For `sheets` | Spreadsheet ID |
//! | `SURVEY_WORKSHEET` | No | Worksheet title (default `Respuestas`) |
//! | `GOOGLE_SHEETS_ACCESS_TOKEN` | For `sheets` | OAuth bearer token |
//! | `GOOGLE_SHEETS_API_BASE` | No | API base URL override |

pub mod a1;
pub mod memory;
pub mod sheets;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default worksheet title.
pub const DEFAULT_WORKSHEET: &str = "Respuestas";

/// First physical row that holds data (row 1 is the header).
pub const FIRST_DATA_ROW: u32 = 2;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Credentials were rejected.
    #[error("Store rejected credentials: {message}")]
    Auth {
        /// Response body preview.
        message: String,
    },

    /// Spreadsheet or worksheet not found.
    #[error("Not found: {what}")]
    NotFound {
        /// What was missing.
        what: String,
    },

    /// Rate limit or quota exceeded.
    #[error("Store quota exceeded")]
    Quota,

    /// Any other non-success HTTP status.
    #[error("Store returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body preview.
        message: String,
    },

    /// Network or TLS failure.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// Invalid store configuration.
    #[error("Invalid store configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// Row number outside the data rows.
    #[error("Invalid row number: {row}")]
    InvalidRow {
        /// The offending row number.
        row: u32,
    },

    /// Column number outside the header.
    #[error("Invalid column number: {column}")]
    InvalidColumn {
        /// The offending column number.
        column: u32,
    },

    /// The remote answered with something we could not interpret.
    #[error("Unexpected store response: {message}")]
    UnexpectedResponse {
        /// Description of the problem.
        message: String,
    },
}

/// How appended values are interpreted by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueInput {
    /// Stored verbatim as text.
    #[default]
    Raw,
    /// Parsed as if typed by a user (formulas are evaluated).
    UserEntered,
}

impl ValueInput {
    /// Returns the Sheets API `valueInputOption` value.
    #[must_use]
    pub const fn as_api_str(self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::UserEntered => "USER_ENTERED",
        }
    }
}

/// An RGB cell background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellColor {
    /// Red channel.
    pub red: u8,
    /// Green channel.
    pub green: u8,
    /// Blue channel.
    pub blue: u8,
}

impl CellColor {
    /// Parses a `#rrggbb` hex string.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self {
            red: channel(0)?,
            green: channel(2)?,
            blue: channel(4)?,
        })
    }

    /// Formats the color as `#rrggbb`.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }

    /// Returns the channels as `0.0..=1.0` fractions, as the Sheets API
    /// expects.
    #[must_use]
    pub fn fractions(self) -> (f64, f64, f64) {
        (
            f64::from(self.red) / 255.0,
            f64::from(self.green) / 255.0,
            f64::from(self.blue) / 255.0,
        )
    }
}

/// A single worksheet acting as the survey store.
///
/// Row and column numbers are 1-based, matching spreadsheet notation.
/// Bulk reads return data rows only (the header excluded), so index `i` of
/// the result is physical row `i + 2`.
#[async_trait]
pub trait Worksheet: Send + Sync {
    /// Creates the worksheet if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be reached.
    async fn ensure_worksheet(&self) -> Result<(), StoreError>;

    /// Returns the header row (empty if the sheet has no header).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    async fn header(&self) -> Result<Vec<String>, StoreError>;

    /// Overwrites row 1 with `columns`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn write_header(&self, columns: &[String]) -> Result<(), StoreError>;

    /// Appends a row after the last data row and returns its row number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn append(&self, values: &[String], input: ValueInput) -> Result<u32, StoreError>;

    /// Returns every data row with formulas evaluated to their display
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    async fn fetch_all_rendered(&self) -> Result<Vec<Vec<String>>, StoreError>;

    /// Returns every data row with formulas shown as their source text.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    async fn fetch_all_raw(&self) -> Result<Vec<Vec<String>>, StoreError>;

    /// Sets the background color of one cell.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    async fn format_cell(&self, row: u32, column: u32, color: CellColor)
    -> Result<(), StoreError>;

    /// Writes text into the given data rows of one column, leaving every
    /// other cell as it is. Values are stored raw.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRow`] or [`StoreError::InvalidColumn`]
    /// for out-of-range targets, or any store failure.
    async fn write_cells(&self, column: u32, cells: &[(u32, String)]) -> Result<(), StoreError>;

    /// Adds a column after the last header column and names it `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    async fn insert_column(&self, name: &str) -> Result<(), StoreError>;

    /// Deletes the column at `column`, shifting later columns left.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidColumn`] for column 0, or any store
    /// failure.
    async fn delete_column(&self, column: u32) -> Result<(), StoreError>;

    /// Deletes the given data rows in one operation.
    ///
    /// Rows are removed from the highest number down so the remaining
    /// numbers stay valid while deleting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRow`] if any row is the header or lies
    /// past the last row, or any store failure.
    async fn delete_rows(&self, rows: &BTreeSet<u32>) -> Result<(), StoreError>;

    /// Deletes every data row, keeping the header.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    async fn clear_all_data_rows(&self) -> Result<(), StoreError>;
}

/// Rejects header and zero row numbers.
///
/// # Errors
///
/// Returns [`StoreError::InvalidRow`] for the first row below
/// [`FIRST_DATA_ROW`].
pub fn validate_data_rows(rows: &BTreeSet<u32>) -> Result<(), StoreError> {
    match rows.iter().find(|r| **r < FIRST_DATA_ROW) {
        Some(row) => Err(StoreError::InvalidRow { row: *row }),
        None => Ok(()),
    }
}

/// Which backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// Google Sheets.
    #[default]
    Sheets,
    /// In-process memory.
    Memory,
}

impl std::str::FromStr for Backend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sheets" | "google" => Ok(Self::Sheets),
            "memory" => Ok(Self::Memory),
            other => Err(StoreError::Config {
                message: format!("unknown store backend '{other}': expected sheets or memory"),
            }),
        }
    }
}

/// Opens the backend selected by `SURVEY_STORE`.
///
/// # Errors
///
/// Returns [`StoreError::Config`] for an unknown backend name, or
/// [`StoreError::MissingEnv`] if the selected backend lacks its settings.
pub fn open_from_env() -> Result<Arc<dyn Worksheet>, StoreError> {
    let backend = match std::env::var("SURVEY_STORE") {
        Ok(value) => value.parse()?,
        Err(_) => Backend::default(),
    };

    log::info!("Opening {backend:?} survey store");

    Ok(match backend {
        Backend::Sheets => Arc::new(sheets::GoogleSheetsWorksheet::new(
            sheets::SheetsConfig::from_env()?,
        )),
        Backend::Memory => Arc::new(memory::MemoryWorksheet::new()),
    })
}
