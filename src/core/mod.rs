pub mod error;
pub mod fs_util;
pub mod types;

pub use error::{BootstrapError, Result};
