//! Spreadsheet persistence, local libSQL or Google Sheets, behind one trait.

pub mod cached;
pub mod google_sheets;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use cached::CachedBackend;
pub use google_sheets::GoogleSheetsBackend;
pub use libsql_backend::LibSqlBackend;
pub use traits::{SheetBackend, Table};
