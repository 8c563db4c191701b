//! Minimal INI reader for prior-deployment configuration files.
//!
//! Only what the registrar needs: locate the `metadata_cache` section of an
//! existing config and recover the router id registered for a cluster.

use crate::core::{BootstrapError, Result};
use log::warn;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct IniSection {
    pub name: String,
    pub keys: Vec<(String, String)>,
}

impl IniSection {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Section name up to the first `:` (the section "key" suffix excluded).
    pub fn base_name(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }
}

pub fn read_sections(path: &Path) -> Result<Vec<IniSection>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| BootstrapError::io(&format!("Could not read {}", path.display()), e))?;
    let mut sections: Vec<IniSection> = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sections.push(IniSection {
                name: name.to_string(),
                keys: Vec::new(),
            });
        } else if let Some((key, value)) = line.split_once('=') {
            if let Some(section) = sections.last_mut() {
                section
                    .keys
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }
    }
    Ok(sections)
}

/// Recover the router id a previous bootstrap registered for `cluster_name`.
///
/// Returns 0 when no identity is recorded. A config bound to a different
/// cluster is a reconfiguration conflict unless `force` is given, in which
/// case the caller proceeds as if unregistered. More than one
/// `metadata_cache` section is unsupported.
pub fn router_id_from_existing_config(
    config_path: &Path,
    cluster_name: &str,
    force: bool,
) -> Result<u32> {
    let mut existing_cluster = String::new();
    if config_path.exists() {
        let sections = read_sections(config_path)?;
        let cache_sections: Vec<&IniSection> = sections
            .iter()
            .filter(|s| s.base_name() == "metadata_cache")
            .collect();
        if cache_sections.len() > 1 {
            return Err(BootstrapError::Conflict(
                "Bootstrapping a router with multiple metadata_cache sections is not supported"
                    .to_string(),
            ));
        }
        for section in cache_sections {
            if let Some(cluster) = section.get("metadata_cluster") {
                existing_cluster = cluster.to_string();
                if existing_cluster == cluster_name {
                    if let Some(raw) = section.get("router_id") {
                        return raw.parse::<u32>().map_err(|_| {
                            BootstrapError::InvalidOption(format!(
                                "Invalid router_id '{}' for cluster '{}' in {}",
                                raw,
                                cluster_name,
                                config_path.display()
                            ))
                        });
                    }
                    warn!("router_id not set for cluster {}", cluster_name);
                    return Ok(0);
                }
            }
        }
    }
    // No metadata_cache section at all means a fresh registration, not a
    // conflict.
    if !existing_cluster.is_empty() && !force {
        return Err(BootstrapError::Conflict(format!(
            "The given router instance is already configured for a cluster named '{}'.\n\
             If you'd like to replace it, please use the force option.",
            existing_cluster
        )));
    }
    Ok(0)
}
