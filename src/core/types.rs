use crate::core::{BootstrapError, Result};
use rand::Rng;
use rand::rngs::OsRng;
use std::path::PathBuf;

// ============================================================================
// Well-known constants
// ============================================================================

pub const DEFAULT_RW_PORT: u16 = 6446;
pub const DEFAULT_RO_PORT: u16 = 6447;
pub const DEFAULT_RW_X_PORT: u16 = 64460;
pub const DEFAULT_RO_X_PORT: u16 = 64470;

pub const RW_SOCKET_NAME: &str = "mysql.sock";
pub const RO_SOCKET_NAME: &str = "mysqlro.sock";
pub const RW_X_SOCKET_NAME: &str = "mysqlx.sock";
pub const RO_X_SOCKET_NAME: &str = "mysqlxro.sock";

/// Router name used by system-wide deployments. Reserved: directory-scoped
/// deployments may not use it.
pub const SYSTEM_ROUTER_NAME: &str = "system";

/// Must match the metadata `routers.router_name` column width.
pub const MAX_ROUTER_NAME_LENGTH: usize = 255;

pub const METADATA_PASSWORD_LENGTH: usize = 16;

/// Keyring attribute under which the metadata account password is stored.
pub const KEYRING_ATTRIBUTE_PASSWORD: &str = "password";

pub const CONFIG_FILE_NAME: &str = "routerd.conf";
pub const PID_FILE_NAME: &str = "routerd.pid";
pub const KEYRING_FILE_NAME: &str = "keyring";

/// Alphabet the metadata account password is drawn from.
const PASSWORD_ALPHABET: &[u8] =
    b"1234567890abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ~@#%$^&*()-_=+]}[{|;:.>,</?";

// ============================================================================
// Identity, topology and credential
// ============================================================================

/// The `(router_id, router_name)` pair identifying one router instance to the
/// metadata store. The id is assigned by the store and never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterIdentity {
    pub router_id: u32,
    pub router_name: String,
}

/// Aggregated view of the cluster the connected metadata server belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    pub cluster_name: String,
    pub replicaset_name: String,
    pub multi_master: bool,
    pub member_addresses: Vec<String>,
}

impl ClusterTopology {
    /// Comma-joined destination list for the metadata cache section.
    pub fn bootstrap_servers(&self) -> String {
        self.member_addresses
            .iter()
            .map(|a| format!("mysql://{}", a))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The metadata account provisioned for one router instance. The username is
/// a pure function of the router id; the password is regenerated on every
/// successful bootstrap run.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn generate(router_id: u32) -> Self {
        Self {
            username: metadata_account_username(router_id),
            password: generate_password(METADATA_PASSWORD_LENGTH),
        }
    }
}

/// Account name for a given router id, stable across reconfigurations.
pub fn metadata_account_username(router_id: u32) -> String {
    format!("cluster_router{}", router_id)
}

/// Random password of `length` symbols drawn uniformly from the fixed
/// alphabet, using the OS entropy source.
pub fn generate_password(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

/// Router names end up in the config file and the metadata store, so CR/LF
/// are rejected outright, as are names longer than the metadata column.
pub fn validate_router_name(name: &str) -> Result<()> {
    if name.contains('\n') || name.contains('\r') {
        return Err(BootstrapError::InvalidOption(format!(
            "Router name '{}' contains invalid characters",
            name
        )));
    }
    if name.len() > MAX_ROUTER_NAME_LENGTH {
        return Err(BootstrapError::InvalidOption(format!(
            "Router name '{}' too long (max {})",
            name, MAX_ROUTER_NAME_LENGTH
        )));
    }
    Ok(())
}

// ============================================================================
// Bootstrap options
// ============================================================================

/// User-supplied bootstrap options. Argument parsing itself lives with the
/// embedding application; this struct is its normalized result.
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    /// Router name. Defaults to the reserved system name for system-wide
    /// deployments; mandatory-distinct for directory deployments.
    pub name: Option<String>,
    /// Overwrite a conflicting prior registration / non-empty directory.
    pub force: bool,
    /// Suppress progress output.
    pub quiet: bool,
    /// First TCP port of a consecutive run; still unparsed so a malformed
    /// value surfaces as a validation error, not a parse panic upstream.
    pub base_port: Option<String>,
    /// Address the TCP endpoints bind to. Defaults to 0.0.0.0.
    pub bind_address: Option<String>,
    pub use_sockets: bool,
    pub skip_tcp: bool,
    /// Directory overrides; directory deployments default them relative to
    /// the deployment root.
    pub logdir: Option<PathBuf>,
    pub rundir: Option<PathBuf>,
    pub socketsdir: Option<PathBuf>,
    /// Master key file for non-interactive keyring access.
    pub master_key_file: Option<PathBuf>,
}

/// One logical listener. Inactive (no port, no socket) endpoints are omitted
/// from the rendered configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub port: u16,
    pub socket: String,
}

impl Endpoint {
    pub fn is_active(&self) -> bool {
        self.port > 0 || !self.socket.is_empty()
    }
}

/// Fully resolved settings for one bootstrap run: the endpoint assignment
/// plus the paths that end up in the `DEFAULT` section.
#[derive(Debug, Clone, Default)]
pub struct RouterSettings {
    pub multi_master: bool,
    pub bind_address: String,
    pub rw_endpoint: Endpoint,
    pub ro_endpoint: Endpoint,
    pub rw_x_endpoint: Endpoint,
    pub ro_x_endpoint: Endpoint,
    pub logdir: Option<PathBuf>,
    pub rundir: Option<PathBuf>,
    pub socketsdir: PathBuf,
    pub keyring_file: Option<PathBuf>,
    pub master_key_file: Option<PathBuf>,
}

impl RouterSettings {
    /// Assign ports and socket names from the user options.
    ///
    /// Sockets get fixed well-known names. TCP ports come either from the
    /// per-endpoint defaults or, when a base port is given, as a consecutive
    /// run in the order classic RW, classic RO, X RW, X RO. Read-only
    /// endpoints are omitted entirely for multi-primary topologies.
    pub fn resolve(config: &BootstrapConfig, multi_master: bool) -> Result<Self> {
        let mut base_port: u16 = 0;
        if let Some(raw) = &config.base_port {
            base_port = raw.parse::<u16>().ok().filter(|p| *p > 0).ok_or_else(|| {
                BootstrapError::InvalidOption(format!("Invalid base-port value {}", raw))
            })?;
            // The consecutive run is four ports wide; a base that would push
            // the run past the top of the port range is rejected here rather
            // than silently falling back to default ports mid-run.
            if u32::from(base_port) + 3 > u32::from(u16::MAX) {
                return Err(BootstrapError::InvalidOption(format!(
                    "Invalid base-port value {}: the port run must not exceed {}",
                    raw,
                    u16::MAX
                )));
            }
        }
        let bind_address = match &config.bind_address {
            Some(addr) => {
                if addr.is_empty() || addr.chars().any(|c| c.is_whitespace()) {
                    return Err(BootstrapError::InvalidOption(format!(
                        "Invalid bind-address value {}",
                        addr
                    )));
                }
                addr.clone()
            }
            None => "0.0.0.0".to_string(),
        };

        let mut next_port = || {
            if base_port == 0 {
                0
            } else {
                let p = base_port;
                base_port = base_port.saturating_add(1);
                p
            }
        };

        let mut settings = Self {
            multi_master,
            bind_address,
            ..Self::default()
        };
        if config.use_sockets {
            settings.rw_endpoint.socket = RW_SOCKET_NAME.to_string();
            if !multi_master {
                settings.ro_endpoint.socket = RO_SOCKET_NAME.to_string();
            }
        }
        if !config.skip_tcp {
            settings.rw_endpoint.port = match next_port() {
                0 => DEFAULT_RW_PORT,
                p => p,
            };
            if !multi_master {
                settings.ro_endpoint.port = match next_port() {
                    0 => DEFAULT_RO_PORT,
                    p => p,
                };
            }
        }
        if config.use_sockets {
            settings.rw_x_endpoint.socket = RW_X_SOCKET_NAME.to_string();
            if !multi_master {
                settings.ro_x_endpoint.socket = RO_X_SOCKET_NAME.to_string();
            }
        }
        if !config.skip_tcp {
            settings.rw_x_endpoint.port = match next_port() {
                0 => DEFAULT_RW_X_PORT,
                p => p,
            };
            if !multi_master {
                settings.ro_x_endpoint.port = match next_port() {
                    0 => DEFAULT_RO_X_PORT,
                    p => p,
                };
            }
        }
        Ok(settings)
    }
}
