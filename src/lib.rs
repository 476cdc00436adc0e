//! Core library for a PDF filing tool: page through scanned PDFs, pick the
//! matching spreadsheet row with fuzzy search, then rename/move the file
//! from a template and hyperlink it back into the spreadsheet.
//!
//! The GUI shell lives elsewhere; everything here is synchronous, owned by
//! the caller thread, and safe to crash mid-relocation.

pub mod config;
pub mod db;
pub mod error;
pub mod excel;
pub mod fuzzy;
pub mod index;
pub mod net;
pub mod pdf;
pub mod queue;
pub mod relocate;
pub mod template;
pub mod types;

pub use config::Config;
pub use db::HistoryDb;
pub use error::{FilerError, TemplateError};
pub use excel::CellSnapshot;
pub use fuzzy::FuzzyMatcher;
pub use index::{DistinctValuesPolicy, RowIndex};
pub use pdf::{FolderScanner, NullPdfOps, PdfOps, RotationState};
pub use queue::{SortColumn, TaskQueue};
pub use relocate::Relocator;
pub use types::{CellValue, Record, Task, TaskStatus};
