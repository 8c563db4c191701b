//! Router configuration rendering.
//!
//! `build_config` is a pure function of the identity, topology, username and
//! settings; section and key order are fixed, so identical inputs always
//! render byte-identical output.

use crate::core::types::{ClusterTopology, Endpoint, RouterIdentity, RouterSettings};

const BANNER: &str = "# File automatically generated during router bootstrap\n";
const LOGGER_LEVEL: &str = "INFO";
const METADATA_TTL: &str = "300";

/// One named, ordered section of the rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    fn push(&mut self, key: &str, value: impl Into<String>) {
        self.entries.push((key.to_string(), value.into()));
    }
}

/// An ordered sequence of sections; rendering is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    pub sections: Vec<Section>,
}

impl ConfigDocument {
    pub fn render(&self) -> String {
        let mut out = String::from(BANNER);
        for section in &self.sections {
            out.push_str(&format!("[{}]\n", section.name));
            for (key, value) in &section.entries {
                out.push_str(&format!("{}={}\n", key, value));
            }
            out.push('\n');
        }
        out
    }
}

/// Key/value lines describing one listener, in rendering order.
pub fn endpoint_entries(settings: &RouterSettings, endpoint: &Endpoint) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    if endpoint.port > 0 {
        entries.push(("bind_address".to_string(), settings.bind_address.clone()));
        entries.push(("bind_port".to_string(), endpoint.port.to_string()));
    }
    if !endpoint.socket.is_empty() {
        entries.push((
            "socket".to_string(),
            format!("{}/{}", settings.socketsdir.display(), endpoint.socket),
        ));
    }
    entries
}

/// Build the full configuration document in the fixed order: DEFAULT,
/// logger, metadata_cache, then the routing sections for active endpoints
/// (classic RW, classic RO, X RW, X RO).
pub fn build_config(
    identity: &RouterIdentity,
    topology: &ClusterTopology,
    username: &str,
    settings: &RouterSettings,
) -> ConfigDocument {
    let mut sections = Vec::new();

    let mut default = Section::new("DEFAULT");
    if !identity.router_name.is_empty() {
        default.push("name", identity.router_name.clone());
    }
    if let Some(logdir) = &settings.logdir {
        default.push("logging_folder", logdir.display().to_string());
    }
    if let Some(rundir) = &settings.rundir {
        default.push("runtime_folder", rundir.display().to_string());
    }
    if let Some(keyring) = &settings.keyring_file {
        default.push("keyring_path", keyring.display().to_string());
    }
    if let Some(master_key) = &settings.master_key_file {
        default.push("master_key_path", master_key.display().to_string());
    }
    sections.push(default);

    let mut logger = Section::new("logger");
    logger.push("level", LOGGER_LEVEL);
    sections.push(logger);

    let cluster = &topology.cluster_name;
    let replicaset = &topology.replicaset_name;
    let mut cache = Section::new(format!("metadata_cache:{}", cluster));
    cache.push("router_id", identity.router_id.to_string());
    cache.push("bootstrap_server_addresses", topology.bootstrap_servers());
    cache.push("user", username);
    cache.push("metadata_cluster", cluster.clone());
    cache.push("ttl", METADATA_TTL);
    sections.push(cache);

    let routing_key = format!("{}_{}", cluster, replicaset);
    let routes: [(&Endpoint, &str, &str, &str, &str); 4] = [
        (&settings.rw_endpoint, "rw", "PRIMARY", "read-write", "classic"),
        (&settings.ro_endpoint, "ro", "SECONDARY", "read-only", "classic"),
        (&settings.rw_x_endpoint, "x_rw", "PRIMARY", "read-write", "x"),
        (&settings.ro_x_endpoint, "x_ro", "SECONDARY", "read-only", "x"),
    ];
    for (endpoint, suffix, role, mode, protocol) in routes {
        if !endpoint.is_active() {
            continue;
        }
        let mut section = Section::new(format!("routing:{}_{}", routing_key, suffix));
        for (key, value) in endpoint_entries(settings, endpoint) {
            section.entries.push((key, value));
        }
        section.push(
            "destinations",
            format!("metadata-cache://{}/{}?role={}", cluster, replicaset, role),
        );
        section.push("mode", mode);
        section.push("protocol", protocol);
        sections.push(section);
    }

    ConfigDocument { sections }
}
