//! Cluster topology resolution.
//!
//! One query joins the cluster, replicaset and instance tables, scoped to
//! the replicaset the connected server belongs to. The rows are aggregated
//! into a single [`ClusterTopology`]; metadata describing more than one
//! cluster or replicaset is unsupported and fails resolution.

use crate::core::types::ClusterTopology;
use crate::core::{BootstrapError, Result};
use crate::metadata::session::MetadataSession;

const TOPOLOGY_QUERY: &str = "SELECT \
     F.cluster_name, \
     R.replicaset_name, \
     R.topology_type, \
     I.address \
     FROM \
     cluster_metadata.clusters AS F, \
     cluster_metadata.instances AS I, \
     cluster_metadata.replicasets AS R \
     WHERE \
     R.replicaset_id = \
     (SELECT replicaset_id FROM cluster_metadata.instances WHERE \
     server_uuid = @@server_uuid) \
     AND I.replicaset_id = R.replicaset_id \
     AND R.cluster_id = F.cluster_id";

fn column(row: &[Option<String>], index: usize) -> String {
    row.get(index)
        .and_then(|v| v.clone())
        .unwrap_or_default()
}

/// Fetch and aggregate the topology of the cluster the connected server is a
/// member of. Read-only and idempotent.
pub fn fetch_topology(session: &mut dyn MetadataSession) -> Result<ClusterTopology> {
    let mut cluster_name = String::new();
    let mut replicaset_name = String::new();
    let mut multi_master = false;
    let mut member_addresses: Vec<String> = Vec::new();
    let mut row_error: Option<BootstrapError> = None;

    session
        .query(TOPOLOGY_QUERY, &mut |row| {
            let row_cluster = column(row, 0);
            if cluster_name.is_empty() {
                cluster_name = row_cluster;
            } else if cluster_name != row_cluster {
                row_error = Some(BootstrapError::MetadataError(
                    "Metadata contains more than one cluster".to_string(),
                ));
                return false;
            }
            let row_replicaset = column(row, 1);
            if replicaset_name.is_empty() {
                replicaset_name = row_replicaset;
            } else if replicaset_name != row_replicaset {
                row_error = Some(BootstrapError::MetadataError(
                    "Metadata contains more than one replica-set".to_string(),
                ));
                return false;
            }
            if let Some(topology_type) = row.get(2).and_then(|v| v.as_deref()) {
                match topology_type {
                    "mm" => multi_master = true,
                    "pm" => multi_master = false,
                    other => {
                        row_error = Some(BootstrapError::MetadataError(format!(
                            "Unknown topology type in metadata: {}",
                            other
                        )));
                        return false;
                    }
                }
            }
            member_addresses.push(column(row, 3));
            true
        })
        .map_err(|e| BootstrapError::MetadataError(format!("Error querying metadata: {}", e)))?;

    if let Some(err) = row_error {
        return Err(err);
    }
    if cluster_name.is_empty() {
        return Err(BootstrapError::MetadataError(
            "No clusters defined in metadata server".to_string(),
        ));
    }

    Ok(ClusterTopology {
        cluster_name,
        replicaset_name,
        multi_master,
        member_addresses,
    })
}
