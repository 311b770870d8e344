//! Notes, tasks and chat logs: data model, typed storage and views.

pub mod model;
pub mod query;
pub mod workbook;

pub use model::{ChatLog, Note, NoteType, NoteWsMessage, TaskConfig};
pub use query::{NoteFilter, Period};
pub use workbook::Workbook;
