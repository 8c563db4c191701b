//! Deployment directory layout resolution.

use crate::core::types::{BootstrapConfig, CONFIG_FILE_NAME, KEYRING_FILE_NAME};
use crate::core::{BootstrapError, Result};
use crate::deploy::ledger::RemovalLedger;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Resolved paths of a directory-scoped deployment.
#[derive(Debug, Clone)]
pub struct DirectoryLayout {
    pub deployment_dir: PathBuf,
    pub config_path: PathBuf,
    pub logdir: PathBuf,
    pub rundir: PathBuf,
    pub socketsdir: PathBuf,
    pub keyring_path: PathBuf,
}

/// Resolve (and create where needed) the layout of a directory deployment.
///
/// The deployment directory itself is created owner-only when absent and
/// recorded recursively in the ledger; `log/` and `run/` are created
/// idempotently, recording only directories this attempt actually made.
/// A pre-existing non-empty directory without a config file is a conflict
/// unless forced.
pub fn resolve_directory_layout(
    directory: &Path,
    config: &BootstrapConfig,
    ledger: &mut RemovalLedger,
) -> Result<DirectoryLayout> {
    if !directory.exists() {
        create_private_dir(directory)?;
        ledger.record_directory(directory, true);
    }
    let deployment_dir = directory.canonicalize().map_err(|e| {
        BootstrapError::io(&format!("Could not resolve {}", directory.display()), e)
    })?;

    let config_path = deployment_dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() && !config.force && !is_directory_empty(&deployment_dir)? {
        return Err(BootstrapError::Conflict(format!(
            "Directory {} already contains files",
            directory.display()
        )));
    }

    let logdir = config
        .logdir
        .clone()
        .unwrap_or_else(|| deployment_dir.join("log"));
    let rundir = config
        .rundir
        .clone()
        .unwrap_or_else(|| deployment_dir.join("run"));
    let socketsdir = config
        .socketsdir
        .clone()
        .unwrap_or_else(|| deployment_dir.clone());

    if create_private_dir(&logdir)? {
        ledger.record_directory(&logdir, false);
    }
    if create_private_dir(&rundir)? {
        ledger.record_directory(&rundir, false);
    }

    let keyring_path = rundir
        .canonicalize()
        .map_err(|e| BootstrapError::io(&format!("Could not resolve {}", rundir.display()), e))?
        .join(KEYRING_FILE_NAME);

    Ok(DirectoryLayout {
        deployment_dir,
        config_path,
        logdir,
        rundir,
        socketsdir,
        keyring_path,
    })
}

/// Create a directory with owner-only permissions. Returns whether this call
/// created it; pre-existence is not an error.
fn create_private_dir(path: &Path) -> Result<bool> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    match builder.create(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(BootstrapError::io(
            &format!("Cannot create directory {}", path.display()),
            e,
        )),
    }
}

fn is_directory_empty(path: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(path)
        .map_err(|e| BootstrapError::io(&format!("Could not read {}", path.display()), e))?;
    Ok(entries.next().is_none())
}
