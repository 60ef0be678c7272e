//! Delimited record files and JSON run summaries.

pub mod records;
pub mod summary;

pub use records::{persist_timestamped, write_records};
pub use summary::{write_report, RunReport};
