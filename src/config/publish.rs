//! Atomic configuration publishing.
//!
//! The document is staged at `<final>.tmp` next to the target, the previous
//! config is backed up to `<final>.bak` only when the content actually
//! changed, and installation is a single rename so readers of the final
//! path never see a partially written file.

use crate::core::fs_util::tmp_sibling;
use crate::core::{BootstrapError, Result};
use crate::deploy::ledger::RemovalLedger;
use crate::keyring::store::make_file_private;
use std::fs;
use std::path::{Path, PathBuf};

/// Create the (empty) staging file and record it in the ledger.
pub fn create_tmp_config(final_path: &Path, ledger: &mut RemovalLedger) -> Result<PathBuf> {
    let tmp_path = tmp_sibling(final_path);
    fs::File::create(&tmp_path).map_err(|e| {
        BootstrapError::io(
            &format!("Could not open {} for writing", tmp_path.display()),
            e,
        )
    })?;
    ledger.record_file(&tmp_path);
    Ok(tmp_path)
}

/// Write the rendered document into the staging file.
pub fn write_tmp_config(tmp_path: &Path, contents: &str) -> Result<()> {
    fs::write(tmp_path, contents).map_err(|e| {
        BootstrapError::io(
            &format!("Could not write {}", tmp_path.display()),
            e,
        )
    })
}

fn files_equal(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a)
        .map_err(|e| BootstrapError::io(&format!("Could not stat {}", a.display()), e))?;
    let meta_b = fs::metadata(b)
        .map_err(|e| BootstrapError::io(&format!("Could not stat {}", b.display()), e))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    let data_a =
        fs::read(a).map_err(|e| BootstrapError::io(&format!("Could not read {}", a.display()), e))?;
    let data_b =
        fs::read(b).map_err(|e| BootstrapError::io(&format!("Could not read {}", b.display()), e))?;
    Ok(data_a == data_b)
}

/// Back up the existing config to `<final>.bak` if the staged content
/// differs from it. Returns whether a backup was made.
pub fn backup_config_if_different(final_path: &Path, tmp_path: &Path) -> Result<bool> {
    if !final_path.exists() {
        return Ok(false);
    }
    if files_equal(final_path, tmp_path)? {
        return Ok(false);
    }
    let backup_path = final_path.with_extension(
        match final_path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.bak", ext),
            None => "bak".to_string(),
        },
    );
    fs::copy(final_path, &backup_path).map_err(|e| {
        BootstrapError::io(
            &format!("Could not back up config to {}", backup_path.display()),
            e,
        )
    })?;
    make_file_private(&backup_path)?;
    Ok(true)
}

/// Install the staged file onto the final path: backup-if-different, atomic
/// rename, owner-only permissions. The staging record is cleared from the
/// ledger only after the rename succeeded.
pub fn install_config(
    final_path: &Path,
    tmp_path: &Path,
    ledger: &mut RemovalLedger,
) -> Result<bool> {
    let backed_up = backup_config_if_different(final_path, tmp_path)?;
    fs::rename(tmp_path, final_path).map_err(|e| {
        BootstrapError::io(
            &format!(
                "Could not move configuration file '{}' to final location",
                tmp_path.display()
            ),
            e,
        )
    })?;
    ledger.forget(tmp_path);
    make_file_private(final_path)?;
    Ok(backed_up)
}
