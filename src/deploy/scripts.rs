//! Start/stop script emission for directory deployments.
//!
//! Emitted only after the rest of provisioning has succeeded; the scripts
//! are not tracked by the removal ledger. The router executable path is an
//! explicit argument rather than ambient process state.

use crate::core::types::{CONFIG_FILE_NAME, PID_FILE_NAME};
use crate::core::{BootstrapError, Result};
use std::fs;
use std::path::Path;

/// Write `start.sh` and `stop.sh` into the deployment directory, both
/// executable by the owner only. When the master key is interactive, the
/// start script prompts for it (echo disabled) and pipes it to the router.
pub fn create_start_scripts(
    directory: &Path,
    executable: &Path,
    interactive_master_key: bool,
) -> Result<()> {
    let basedir = directory.display();

    let mut start = String::new();
    start.push_str("#!/bin/bash\n");
    start.push_str(&format!("basedir={}\n", basedir));
    if interactive_master_key {
        // No master key file: ask for the key at startup and feed it to the
        // router on stdin, without echoing it.
        start.push_str("old_stty=`stty -g`\n");
        start.push_str("stty -echo\n");
        start.push_str("echo -n 'Encryption key for router keyring:'\n");
        start.push_str("read password\n");
        start.push_str("stty $old_stty\n");
        start.push_str("echo $password | ");
    }
    start.push_str(&format!(
        "ROUTER_PID=$basedir/{} {} -c $basedir/{} &\n",
        PID_FILE_NAME,
        executable.display(),
        CONFIG_FILE_NAME
    ));
    start.push_str("disown %-\n");
    write_script(&directory.join("start.sh"), &start)?;

    let stop = format!(
        "#!/bin/bash\n\
         if [ -f {basedir}/{pid} ]; then\n\
         \x20 kill -HUP `cat {basedir}/{pid}`\n\
         \x20 rm -f {basedir}/{pid}\n\
         fi\n",
        basedir = basedir,
        pid = PID_FILE_NAME
    );
    write_script(&directory.join("stop.sh"), &stop)?;

    Ok(())
}

fn write_script(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)
        .map_err(|e| BootstrapError::io(&format!("Could not open {} for writing", path.display()), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| {
            BootstrapError::io(
                &format!("Could not change permissions for {}", path.display()),
                e,
            )
        })?;
    }
    Ok(())
}
