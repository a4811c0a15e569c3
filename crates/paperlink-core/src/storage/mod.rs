pub mod records;
pub mod spreadsheet;

pub use records::{LibraryRecords, RecordStore, apply_pairings};
pub use spreadsheet::export_records;
