pub mod ledger;
pub mod layout;
pub mod scripts;

pub use layout::DirectoryLayout;
pub use ledger::RemovalLedger;
