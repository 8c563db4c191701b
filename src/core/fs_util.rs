//! Small path helpers shared across modules.

use std::path::{Path, PathBuf};

/// Staging path adjacent to `path`: the full file name with `.tmp` appended,
/// so `router.conf` stages as `router.conf.tmp` (not `router.tmp`).
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
