//! Bootstrap orchestration.
//!
//! Runs the full provisioning sequence against a connected metadata session:
//! layout resolution, keyring setup, topology discovery, identity
//! registration, account provisioning, config rendering and atomic
//! publication. Remote mutations run in one metadata transaction; local
//! side effects are tracked by the removal ledger and unwound on failure.

use crate::config::document::build_config;
use crate::config::parser::router_id_from_existing_config;
use crate::config::publish::{create_tmp_config, install_config, write_tmp_config};
use crate::core::types::{
    BootstrapConfig, Credential, KEYRING_ATTRIBUTE_PASSWORD, RouterIdentity, RouterSettings,
    SYSTEM_ROUTER_NAME, validate_router_name,
};
use crate::core::fs_util::tmp_sibling;
use crate::core::{BootstrapError, Result};
use crate::deploy::layout::resolve_directory_layout;
use crate::deploy::ledger::RemovalLedger;
use crate::deploy::scripts::create_start_scripts;
use crate::keyring::master_key::{SecretPrompt, obtain_master_key};
use crate::keyring::store::Keyring;
use crate::metadata::registry::ClusterMetadata;
use crate::metadata::session::{MetadataSession, Transaction};
use crate::metadata::topology::fetch_topology;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of one bootstrap attempt. Cancellation at the master key prompt
/// is a normal termination, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    Completed { config_backed_up: bool },
    Cancelled,
}

/// Directory paths flowing into the rendered `DEFAULT` section.
struct DeployPaths {
    logdir: Option<PathBuf>,
    rundir: Option<PathBuf>,
    socketsdir: PathBuf,
    keyring_file: PathBuf,
    master_key_file: Option<PathBuf>,
}

pub struct Bootstrapper<'a> {
    session: &'a mut dyn MetadataSession,
    prompt: &'a mut dyn SecretPrompt,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(session: &'a mut dyn MetadataSession, prompt: &'a mut dyn SecretPrompt) -> Self {
        Self { session, prompt }
    }

    /// Bootstrap a system-wide deployment against a fixed config path.
    /// The router name defaults to the reserved system name; no directory
    /// tree is created.
    pub fn bootstrap_system_deployment(
        &mut self,
        config_path: &Path,
        keyring_path: &Path,
        config: &BootstrapConfig,
    ) -> Result<BootstrapStatus> {
        validate_options(config)?;
        let mut router_name = config.name.clone().unwrap_or_default();
        if !router_name.is_empty() {
            validate_router_name(&router_name)?;
        }
        if router_name.is_empty() {
            router_name = SYSTEM_ROUTER_NAME.to_string();
        }

        let mut ledger = RemovalLedger::new();
        let tmp_path = create_tmp_config(config_path, &mut ledger)?;

        let master_key = match obtain_master_key(
            keyring_path,
            config.master_key_file.as_deref(),
            self.prompt,
        )? {
            Some(key) => key,
            None => return Ok(BootstrapStatus::Cancelled),
        };
        let mut keyring = Keyring::init(keyring_path, &master_key, true)?;

        let paths = DeployPaths {
            logdir: None,
            rundir: None,
            socketsdir: config
                .socketsdir
                .clone()
                .unwrap_or_else(|| PathBuf::from("/tmp")),
            keyring_file: keyring_path.to_path_buf(),
            master_key_file: config.master_key_file.clone(),
        };
        self.deploy(&tmp_path, config_path, &router_name, config, paths, &mut keyring)?;

        let config_backed_up = install_config(config_path, &tmp_path, &mut ledger)?;
        ledger.commit();
        Ok(BootstrapStatus::Completed { config_backed_up })
    }

    /// Bootstrap a self-contained deployment owning its directory tree.
    /// `router_executable` is referenced from the emitted start script.
    pub fn bootstrap_directory_deployment(
        &mut self,
        directory: &Path,
        config: &BootstrapConfig,
        router_executable: &Path,
    ) -> Result<BootstrapStatus> {
        validate_options(config)?;
        let router_name = config.name.clone().unwrap_or_default();
        if !router_name.is_empty() {
            if router_name == SYSTEM_ROUTER_NAME {
                return Err(BootstrapError::Conflict(format!(
                    "Router name '{}' is reserved",
                    SYSTEM_ROUTER_NAME
                )));
            }
            validate_router_name(&router_name)?;
        }

        let mut ledger = RemovalLedger::new();
        let layout = resolve_directory_layout(directory, config, &mut ledger)?;
        let tmp_path = create_tmp_config(&layout.config_path, &mut ledger)?;

        // A supplied master key file is staged as a .tmp copy so it gains
        // the same rename-into-place crash safety as the config itself.
        let mut staged_master_key: Option<(PathBuf, PathBuf)> = None;
        let key_file_for_init = match &config.master_key_file {
            Some(master_key_file) => {
                let tmp_key_file = tmp_sibling(master_key_file);
                ledger.record_file(&tmp_key_file);
                if master_key_file.exists() {
                    fs::copy(master_key_file, &tmp_key_file).map_err(|e| {
                        BootstrapError::io(
                            &format!("Could not copy {}", master_key_file.display()),
                            e,
                        )
                    })?;
                }
                staged_master_key = Some((tmp_key_file.clone(), master_key_file.clone()));
                Some(tmp_key_file)
            }
            None => None,
        };

        let master_key = match obtain_master_key(
            &layout.keyring_path,
            key_file_for_init.as_deref(),
            self.prompt,
        )? {
            Some(key) => key,
            None => return Ok(BootstrapStatus::Cancelled),
        };
        let mut keyring = Keyring::init(&layout.keyring_path, &master_key, true)?;

        let paths = DeployPaths {
            logdir: Some(layout.logdir.clone()),
            rundir: Some(layout.rundir.clone()),
            socketsdir: layout.socketsdir.clone(),
            keyring_file: layout.keyring_path.clone(),
            master_key_file: config.master_key_file.clone(),
        };
        self.deploy(
            &tmp_path,
            &layout.config_path,
            &router_name,
            config,
            paths,
            &mut keyring,
        )?;

        let config_backed_up = install_config(&layout.config_path, &tmp_path, &mut ledger)?;
        if let Some((tmp_key_file, master_key_file)) = staged_master_key {
            fs::rename(&tmp_key_file, &master_key_file).map_err(|e| {
                BootstrapError::io(
                    &format!(
                        "Could not move key file '{}' to its final location",
                        tmp_key_file.display()
                    ),
                    e,
                )
            })?;
            ledger.forget(&tmp_key_file);
        }

        create_start_scripts(
            &layout.deployment_dir,
            router_executable,
            config.master_key_file.is_none(),
        )?;

        ledger.commit();
        Ok(BootstrapStatus::Completed { config_backed_up })
    }

    /// The shared deployment core: topology, identity, credential, account,
    /// rendering; all remote mutations inside one transaction.
    ///
    /// The transaction commits after the document lands in the staging file
    /// but before the caller's rename. A crash in that window leaves the
    /// store updated while the local config still shows the old state; a
    /// later run then needs `force` to take the registration over.
    /// "Remote committed, local stale" is recoverable by re-running; the
    /// reverse could strand an orphaned remote account.
    fn deploy(
        &mut self,
        tmp_path: &Path,
        config_path: &Path,
        router_name: &str,
        config: &BootstrapConfig,
        paths: DeployPaths,
        keyring: &mut Keyring,
    ) -> Result<()> {
        let topology = fetch_topology(self.session)?;

        let mut router_id = if config_path.exists() {
            router_id_from_existing_config(config_path, &topology.cluster_name, config.force)?
        } else {
            0
        };

        if !config.quiet {
            if router_id > 0 {
                info!(
                    "Reconfiguring router instance for cluster '{}'",
                    topology.cluster_name
                );
            } else {
                info!(
                    "Bootstrapping router instance for cluster '{}'",
                    topology.cluster_name
                );
            }
        }

        let mut transaction = Transaction::begin(self.session)
            .map_err(|e| BootstrapError::MetadataError(format!("Error starting transaction: {}", e)))?;
        {
            let mut registry = ClusterMetadata::new(transaction.session());

            if router_id > 0 {
                // A stale id from a prior config is not fatal: discard it
                // and register afresh.
                if let Err(e) = registry.check_router_id(router_id) {
                    warn!("{}", e);
                    router_id = 0;
                }
            }
            if router_id == 0 {
                router_id = registry.register_router(router_name, config.force)?;
            }

            let mut settings = RouterSettings::resolve(config, topology.multi_master)?;
            settings.logdir = paths.logdir;
            settings.rundir = paths.rundir;
            settings.socketsdir = paths.socketsdir;
            settings.keyring_file = Some(paths.keyring_file);
            settings.master_key_file = paths.master_key_file;

            // The keyring hits durable storage before any remote account
            // mutation, so a crash cannot provision an account whose
            // password was never saved.
            let credential = Credential::generate(router_id);
            keyring.store(
                &credential.username,
                KEYRING_ATTRIBUTE_PASSWORD,
                &credential.password,
            );
            keyring.flush().map_err(|e| {
                BootstrapError::KeyringError(format!(
                    "Error storing encrypted password to disk: {}",
                    e
                ))
            })?;

            registry.create_account(&credential.username, &credential.password)?;
            registry.update_router_info(router_id, &settings)?;

            let identity = RouterIdentity {
                router_id,
                router_name: router_name.to_string(),
            };
            let document = build_config(&identity, &topology, &credential.username, &settings);
            write_tmp_config(tmp_path, &document.render())?;

            if !config.quiet {
                info!(
                    "Router '{}' configured for cluster '{}'{}",
                    identity.router_name,
                    topology.cluster_name,
                    if topology.multi_master {
                        " (multi-primary)"
                    } else {
                        ""
                    }
                );
                for line in connection_summary(&settings) {
                    info!("{}", line);
                }
            }
        }
        transaction
            .commit()
            .map_err(|e| BootstrapError::MetadataError(format!("Error committing transaction: {}", e)))?;
        Ok(())
    }
}

/// Fail fast on malformed user options, before any remote or filesystem
/// mutation.
fn validate_options(config: &BootstrapConfig) -> Result<()> {
    RouterSettings::resolve(config, false).map(|_| ())
}

/// Human-readable connection targets of the new instance, in the order the
/// routing sections are rendered: classic RW/RO, then X protocol RW/RO.
fn connection_summary(settings: &RouterSettings) -> Vec<String> {
    let groups = [
        (&settings.rw_endpoint, "Classic MySQL protocol", "read/write"),
        (&settings.ro_endpoint, "Classic MySQL protocol", "read/only"),
        (&settings.rw_x_endpoint, "X protocol", "read/write"),
        (&settings.ro_x_endpoint, "X protocol", "read/only"),
    ];
    let mut lines = Vec::new();
    for (endpoint, protocol, mode) in groups {
        let mut targets = Vec::new();
        if endpoint.port > 0 {
            targets.push(format!("{}:{}", settings.bind_address, endpoint.port));
        }
        if !endpoint.socket.is_empty() {
            targets.push(format!(
                "{}/{}",
                settings.socketsdir.display(),
                endpoint.socket
            ));
        }
        if !targets.is_empty() {
            lines.push(format!(
                "{} {} connections: {}",
                protocol,
                mode,
                targets.join(", ")
            ));
        }
    }
    lines
}
