//! Router identity registration and metadata account provisioning.

use crate::core::types::RouterSettings;
use crate::core::{BootstrapError, Result};
use crate::metadata::session::MetadataSession;
use log::warn;

const ROUTERS_TABLE: &str = "cluster_metadata.routers";
const METADATA_SCHEMA: &str = "cluster_metadata";
const MEMBERSHIP_VIEW: &str = "performance_schema.replication_group_members";

/// Operations against the metadata store's router registry. All of them are
/// expected to run inside the caller's transaction.
pub struct ClusterMetadata<'a, 's> {
    session: &'a mut (dyn MetadataSession + 's),
}

impl<'a, 's> ClusterMetadata<'a, 's> {
    pub fn new(session: &'a mut (dyn MetadataSession + 's)) -> Self {
        Self { session }
    }

    /// Confirm that a router id from a previous bootstrap still exists in the
    /// registry. The caller treats a failure as "start over with a fresh
    /// registration", not as fatal.
    pub fn check_router_id(&mut self, router_id: u32) -> Result<()> {
        let sql = format!(
            "SELECT router_id FROM {} WHERE router_id = {}",
            ROUTERS_TABLE, router_id
        );
        let row = self
            .session
            .query_one(&sql)
            .map_err(|e| BootstrapError::MetadataError(format!("Error querying metadata: {}", e)))?;
        if row.is_none() {
            return Err(BootstrapError::MetadataError(format!(
                "router_id {} not found in metadata server",
                router_id
            )));
        }
        Ok(())
    }

    /// Register a new router identity and return the id the store assigned.
    ///
    /// With `force`, a conflicting registration under the same name is
    /// dropped first. Without it, a duplicate-key failure is translated into
    /// the actionable [`BootstrapError::DuplicateRouterName`].
    pub fn register_router(&mut self, router_name: &str, force: bool) -> Result<u32> {
        if force {
            let sql = format!(
                "DELETE FROM {} WHERE router_name = {}",
                ROUTERS_TABLE,
                self.session.quote(router_name)
            );
            self.session.execute(&sql).map_err(|e| {
                BootstrapError::MetadataError(format!(
                    "While registering router instance in metadata server: {}",
                    e
                ))
            })?;
        }
        let sql = format!(
            "INSERT INTO {} (router_name) VALUES ({})",
            ROUTERS_TABLE,
            self.session.quote(router_name)
        );
        self.session.execute(&sql).map_err(|e| {
            if e.is_duplicate_key() {
                BootstrapError::DuplicateRouterName(router_name.to_string())
            } else {
                BootstrapError::MetadataError(format!(
                    "While registering router instance in metadata server: {}",
                    e
                ))
            }
        })?;

        let row = self
            .session
            .query_one("SELECT LAST_INSERT_ID()")
            .map_err(|e| {
                BootstrapError::MetadataError(format!(
                    "While registering router instance in metadata server: {}",
                    e
                ))
            })?;
        let id_text = row
            .and_then(|r| r.into_iter().next().flatten())
            .unwrap_or_default();
        id_text.parse::<u32>().map_err(|_| {
            BootstrapError::MetadataError(format!(
                "Metadata server returned invalid router_id '{}'",
                id_text
            ))
        })
    }

    /// Record the endpoint assignment of this bootstrap run against the
    /// router's registry row.
    pub fn update_router_info(&mut self, router_id: u32, settings: &RouterSettings) -> Result<()> {
        let attributes = serde_json::json!({
            "RWEndpoint": settings.rw_endpoint.port,
            "ROEndpoint": settings.ro_endpoint.port,
            "RWXEndpoint": settings.rw_x_endpoint.port,
            "ROXEndpoint": settings.ro_x_endpoint.port,
        });
        let sql = format!(
            "UPDATE {} SET attributes = {} WHERE router_id = {}",
            ROUTERS_TABLE,
            self.session.quote(&attributes.to_string()),
            router_id
        );
        self.session.execute(&sql).map_err(|e| {
            BootstrapError::MetadataError(format!("Error updating router metadata: {}", e))
        })
    }

    /// Create (or recreate) the metadata account this router instance uses.
    ///
    /// The account is bound to the wildcard host: host-based ACLs are
    /// unreliable across NAT, localhost and multi-homed setups, and the
    /// account carries only two read grants with an instance-private
    /// password. The drop-if-exists step makes the sequence idempotent.
    pub fn create_account(&mut self, username: &str, password: &str) -> Result<()> {
        let account = format!("{}@{}", username, self.session.quote("%"));
        let statements = [
            format!("DROP USER IF EXISTS {}", account),
            format!(
                "CREATE USER {} IDENTIFIED BY {}",
                account,
                self.session.quote(password)
            ),
            format!("GRANT SELECT ON {}.* TO {}", METADATA_SCHEMA, account),
            format!("GRANT SELECT ON {} TO {}", MEMBERSHIP_VIEW, account),
        ];
        for sql in &statements {
            if let Err(e) = self.session.execute(sql) {
                if let Err(rollback_err) = self.session.execute("ROLLBACK") {
                    warn!(
                        "Could not rollback transaction explicitly: {}",
                        rollback_err
                    );
                }
                return Err(BootstrapError::MetadataError(format!(
                    "Error creating metadata account for router: {}",
                    e
                )));
            }
        }
        Ok(())
    }
}
