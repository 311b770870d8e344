//! Worklog: a personal work-logging dashboard over a spreadsheet.

pub mod alerts;
pub mod calendar;
pub mod classify;
pub mod clock;
pub mod config;
pub mod drive;
pub mod error;
pub mod google;
pub mod llm;
pub mod notes;
pub mod recorder;
pub mod store;
pub mod summary;
pub mod web;
