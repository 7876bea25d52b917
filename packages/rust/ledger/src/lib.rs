//! CSV persistence for OfficeFinder: the master input and the results ledger.

mod columns;
pub mod input;
pub mod store;

pub use input::load_master;
pub use store::{Ledger, LedgerEntry, interpret_legacy, load_resume_offset};
