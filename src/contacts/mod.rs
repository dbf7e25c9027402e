//! Contacts Module
//!
//! Cleanup, normalization and export of extracted contacts.

pub mod export;
pub mod normalize;

pub use export::{write_csv, write_csv_to};
pub use normalize::{normalize_phone, parse_record, strip_code_fence, Contact, ContactBook, ContactRow};
