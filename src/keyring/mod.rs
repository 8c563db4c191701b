pub mod store;
pub mod master_key;

pub use master_key::{SecretPrompt, TerminalPrompt, obtain_master_key};
pub use store::Keyring;
