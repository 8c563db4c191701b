pub mod bootstrap;

pub use bootstrap::{BootstrapStatus, Bootstrapper};
