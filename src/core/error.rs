use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Bad user input (router name, base port, bind address, router_id).
    /// Raised before any remote or filesystem mutation.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// A pre-condition on the existing deployment failed (non-empty target
    /// directory, reserved name reuse, cluster mismatch without force).
    #[error("{0}")]
    Conflict(String),

    /// A router with the same name is already registered in the metadata
    /// store. Kept separate from other remote errors so callers get an
    /// actionable message.
    #[error(
        "It appears that a router instance named '{0}' has been previously configured in \
         this host. If that instance no longer exists, use the force option to overwrite it."
    )]
    DuplicateRouterName(String),

    /// Remote metadata store failure, wrapped with context.
    #[error("Metadata error: {0}")]
    MetadataError(String),

    /// Keyring open/decrypt/flush failure.
    #[error("Keyring error: {0}")]
    KeyringError(String),

    /// Local filesystem failure, wrapped with the OS error text.
    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

impl BootstrapError {
    /// Wrap a `std::io::Error` with a description of the failed operation.
    pub fn io(context: &str, err: std::io::Error) -> Self {
        Self::IoError(format!("{}: {}", context, err))
    }
}
