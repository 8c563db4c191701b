// ============================================================================
// routerboot Library
// ============================================================================
//
// Provisioning protocol for a cluster-aware connection router: resolves the
// cluster topology from the metadata store, registers (or re-uses) the
// router's identity, provisions a dedicated low-privilege metadata account,
// stores its password in an encrypted keyring and publishes the router
// configuration file atomically. Local side effects of a failed attempt are
// rolled back through a compensating-action ledger.

pub mod core;
pub mod metadata;
pub mod keyring;
pub mod deploy;
pub mod config;
pub mod facade;

// Re-export main types for convenience
pub use crate::core::{BootstrapError, Result};
pub use crate::core::types::{
    BootstrapConfig, ClusterTopology, Credential, Endpoint, RouterIdentity, RouterSettings,
};
pub use crate::metadata::session::{MetadataSession, SessionError, Transaction};
pub use crate::keyring::{Keyring, SecretPrompt, TerminalPrompt};
pub use crate::deploy::ledger::RemovalLedger;
pub use crate::facade::{BootstrapStatus, Bootstrapper};
