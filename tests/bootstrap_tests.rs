//! End-to-end bootstrap flows over a scripted metadata session.

use routerboot::core::types::CONFIG_FILE_NAME;
use routerboot::metadata::session::{SessionError, SessionResult};
use routerboot::{
    BootstrapConfig, BootstrapError, BootstrapStatus, Bootstrapper, MetadataSession, SecretPrompt,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Scripted collaborators
// ============================================================================

#[derive(Clone)]
struct MockSession {
    topology_rows: Vec<(String, String, String, String)>,
    statements: Vec<String>,
    fail_on: Option<(String, SessionError)>,
    next_router_id: u32,
    known_router_ids: Vec<u32>,
}

impl MockSession {
    fn new(rows: &[(&str, &str, &str, &str)]) -> Self {
        Self {
            topology_rows: rows
                .iter()
                .map(|(c, r, t, a)| {
                    (c.to_string(), r.to_string(), t.to_string(), a.to_string())
                })
                .collect(),
            statements: Vec::new(),
            fail_on: None,
            next_router_id: 5,
            known_router_ids: Vec::new(),
        }
    }

    fn executed(&self, fragment: &str) -> bool {
        self.statements.iter().any(|s| s.contains(fragment))
    }
}

impl MetadataSession for MockSession {
    fn query(
        &mut self,
        sql: &str,
        row_cb: &mut dyn FnMut(&[Option<String>]) -> bool,
    ) -> SessionResult<()> {
        self.statements.push(sql.to_string());
        if sql.contains("cluster_metadata.clusters") {
            for (c, r, t, a) in self.topology_rows.clone() {
                if !row_cb(&[Some(c), Some(r), Some(t), Some(a)]) {
                    break;
                }
            }
        } else if sql.contains("LAST_INSERT_ID") {
            row_cb(&[Some(self.next_router_id.to_string())]);
        } else if sql.contains("WHERE router_id =") {
            if let Some(id) = self
                .known_router_ids
                .iter()
                .find(|id| sql.ends_with(&format!("= {}", id)))
            {
                row_cb(&[Some(id.to_string())]);
            }
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> SessionResult<()> {
        self.statements.push(sql.to_string());
        if let Some((trigger, err)) = &self.fail_on {
            if sql.contains(trigger.as_str()) {
                return Err(err.clone());
            }
        }
        Ok(())
    }

    fn quote(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

struct ScriptedPrompt {
    replies: Vec<String>,
}

impl ScriptedPrompt {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().rev().map(|s| s.to_string()).collect(),
        }
    }
}

impl SecretPrompt for ScriptedPrompt {
    fn prompt_secret(&mut self, _message: &str) -> routerboot::Result<String> {
        Ok(self
            .replies
            .pop()
            .expect("prompt called more times than scripted"))
    }
}

fn default_rows() -> Vec<(&'static str, &'static str, &'static str, &'static str)> {
    vec![
        ("mycluster", "default", "pm", "10.0.0.1:3306"),
        ("mycluster", "default", "pm", "10.0.0.2:3306"),
    ]
}

fn executable() -> &'static Path {
    Path::new("/usr/local/bin/routerd")
}

fn run_directory_bootstrap(
    session: &mut MockSession,
    prompt: &mut ScriptedPrompt,
    directory: &Path,
    config: &BootstrapConfig,
) -> routerboot::Result<BootstrapStatus> {
    Bootstrapper::new(session, prompt).bootstrap_directory_deployment(
        directory,
        config,
        executable(),
    )
}

// ============================================================================
// Directory deployments
// ============================================================================

#[test]
fn test_directory_bootstrap_happy_path() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    let mut session = MockSession::new(&default_rows());
    let mut prompt = ScriptedPrompt::new(&["master-key", "master-key"]);
    let config = BootstrapConfig {
        name: Some("my-router".into()),
        ..Default::default()
    };

    let status = run_directory_bootstrap(&mut session, &mut prompt, &deploy, &config).unwrap();
    assert_eq!(
        status,
        BootstrapStatus::Completed {
            config_backed_up: false
        }
    );

    let rendered = fs::read_to_string(deploy.join(CONFIG_FILE_NAME)).unwrap();
    assert!(rendered.contains("name=my-router\n"));
    assert!(rendered.contains("[metadata_cache:mycluster]\n"));
    assert!(rendered.contains("router_id=5\n"));
    assert!(rendered.contains("user=cluster_router5\n"));
    assert!(rendered.contains(
        "bootstrap_server_addresses=mysql://10.0.0.1:3306,mysql://10.0.0.2:3306\n"
    ));
    assert!(rendered.contains("[routing:mycluster_default_rw]\n"));
    assert!(rendered.contains("bind_port=6446\n"));

    assert!(deploy.join("run").join("keyring").exists());
    assert!(deploy.join("log").is_dir());
    assert!(deploy.join("start.sh").exists());
    assert!(deploy.join("stop.sh").exists());
    assert!(!deploy.join(format!("{}.tmp", CONFIG_FILE_NAME)).exists());

    assert!(session.executed("START TRANSACTION"));
    assert!(session.executed("COMMIT"));
    assert!(!session.executed("ROLLBACK"));
    assert!(session.executed("INSERT INTO cluster_metadata.routers"));
    assert!(session.executed("CREATE USER cluster_router5@'%'"));
    assert!(session.executed("GRANT SELECT ON cluster_metadata.*"));
}

#[test]
fn test_rerun_reuses_router_id_without_registration() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    let config = BootstrapConfig::default();

    let mut first = MockSession::new(&default_rows());
    let mut prompt = ScriptedPrompt::new(&["master-key", "master-key"]);
    run_directory_bootstrap(&mut first, &mut prompt, &deploy, &config).unwrap();

    let mut second = MockSession::new(&default_rows());
    second.next_router_id = 99;
    second.known_router_ids = vec![5];
    // Keyring already exists: a single prompt for its current key.
    let mut prompt = ScriptedPrompt::new(&["master-key"]);
    let status = run_directory_bootstrap(&mut second, &mut prompt, &deploy, &config).unwrap();

    assert_eq!(
        status,
        BootstrapStatus::Completed {
            config_backed_up: false
        }
    );
    let rendered = fs::read_to_string(deploy.join(CONFIG_FILE_NAME)).unwrap();
    assert!(rendered.contains("router_id=5\n"));
    assert!(!second.executed("INSERT INTO cluster_metadata.routers"));
    // The account is still rotated on every run.
    assert!(second.executed("CREATE USER cluster_router5@'%'"));
    // Identical content, so no backup either.
    assert!(!deploy.join(format!("{}.bak", CONFIG_FILE_NAME)).exists());
}

#[test]
fn test_rerun_against_other_cluster_needs_force() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    let config = BootstrapConfig::default();

    let mut first = MockSession::new(&default_rows());
    let mut prompt = ScriptedPrompt::new(&["master-key", "master-key"]);
    run_directory_bootstrap(&mut first, &mut prompt, &deploy, &config).unwrap();
    let old_contents = fs::read_to_string(deploy.join(CONFIG_FILE_NAME)).unwrap();

    let other_rows = vec![("othercluster", "default", "pm", "10.0.9.1:3306")];
    let mut second = MockSession::new(&other_rows);
    let mut prompt = ScriptedPrompt::new(&["master-key"]);
    let err = run_directory_bootstrap(&mut second, &mut prompt, &deploy, &config).unwrap_err();
    assert!(matches!(err, BootstrapError::Conflict(_)));
    assert!(err.to_string().contains("already configured for a cluster named 'mycluster'"));

    // With force a fresh identity is registered and the old config backed up.
    let mut third = MockSession::new(&other_rows);
    third.next_router_id = 42;
    let forced = BootstrapConfig {
        force: true,
        ..Default::default()
    };
    let mut prompt = ScriptedPrompt::new(&["master-key"]);
    let status = run_directory_bootstrap(&mut third, &mut prompt, &deploy, &forced).unwrap();
    assert_eq!(
        status,
        BootstrapStatus::Completed {
            config_backed_up: true
        }
    );
    assert!(third.executed("INSERT INTO cluster_metadata.routers"));
    let backup = fs::read_to_string(deploy.join(format!("{}.bak", CONFIG_FILE_NAME))).unwrap();
    assert_eq!(backup, old_contents);
    let rendered = fs::read_to_string(deploy.join(CONFIG_FILE_NAME)).unwrap();
    assert!(rendered.contains("router_id=42\n"));
    assert!(rendered.contains("metadata_cluster=othercluster\n"));
}

#[test]
fn test_failed_registration_unwinds_created_tree() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    let mut session = MockSession::new(&default_rows());
    session.fail_on = Some((
        "INSERT INTO cluster_metadata.routers".into(),
        SessionError::new(1044, "Access denied"),
    ));
    let mut prompt = ScriptedPrompt::new(&["master-key", "master-key"]);

    let err = run_directory_bootstrap(
        &mut session,
        &mut prompt,
        &deploy,
        &BootstrapConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BootstrapError::MetadataError(_)));

    // The whole freshly created tree is gone and the transaction rolled back.
    assert!(!deploy.exists());
    assert!(session.executed("ROLLBACK"));
    assert!(!session.executed("COMMIT"));
}

#[test]
fn test_failure_after_keyring_flush_keeps_credential() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    // Pre-existing deployment directory: only this attempt's additions are
    // subject to rollback, so the flushed keyring survives the failure.
    fs::create_dir(&deploy).unwrap();
    let mut session = MockSession::new(&default_rows());
    session.fail_on = Some((
        "CREATE USER".into(),
        SessionError::new(1044, "Access denied"),
    ));
    let mut prompt = ScriptedPrompt::new(&["master-key", "master-key"]);

    let config = BootstrapConfig {
        force: true,
        ..Default::default()
    };
    run_directory_bootstrap(&mut session, &mut prompt, &deploy, &config).unwrap_err();

    assert!(deploy.exists());
    assert!(deploy.join("run").join("keyring").exists());
    // No config was published for the failed attempt.
    assert!(!deploy.join(CONFIG_FILE_NAME).exists());
    assert!(!deploy.join(format!("{}.tmp", CONFIG_FILE_NAME)).exists());
}

#[test]
fn test_cancelled_master_key_prompt() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    let mut session = MockSession::new(&default_rows());
    let mut prompt = ScriptedPrompt::new(&[""]);

    let status = run_directory_bootstrap(
        &mut session,
        &mut prompt,
        &deploy,
        &BootstrapConfig::default(),
    )
    .unwrap();
    assert_eq!(status, BootstrapStatus::Cancelled);
    // Cancellation unwinds like a failure, without reporting one.
    assert!(!deploy.exists());
    assert!(!session.executed("START TRANSACTION"));
}

#[test]
fn test_reserved_name_rejected_for_directory_deployment() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    let mut session = MockSession::new(&default_rows());
    let mut prompt = ScriptedPrompt::new(&[]);
    let config = BootstrapConfig {
        name: Some("system".into()),
        ..Default::default()
    };

    let err =
        run_directory_bootstrap(&mut session, &mut prompt, &deploy, &config).unwrap_err();
    assert!(err.to_string().contains("reserved"));
    assert!(!deploy.exists());
}

#[test]
fn test_duplicate_router_name_suggests_force() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    let mut session = MockSession::new(&default_rows());
    session.fail_on = Some((
        "INSERT INTO cluster_metadata.routers".into(),
        SessionError::new(1062, "Duplicate entry"),
    ));
    let mut prompt = ScriptedPrompt::new(&["master-key", "master-key"]);
    let config = BootstrapConfig {
        name: Some("my-router".into()),
        ..Default::default()
    };

    let err = run_directory_bootstrap(&mut session, &mut prompt, &deploy, &config).unwrap_err();
    assert!(matches!(err, BootstrapError::DuplicateRouterName(_)));
    assert!(err.to_string().contains("force option"));
}

#[test]
fn test_invalid_base_port_fails_before_any_mutation() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    let mut session = MockSession::new(&default_rows());
    let mut prompt = ScriptedPrompt::new(&[]);
    let config = BootstrapConfig {
        base_port: Some("not-a-port".into()),
        ..Default::default()
    };

    let err = run_directory_bootstrap(&mut session, &mut prompt, &deploy, &config).unwrap_err();
    assert!(matches!(err, BootstrapError::InvalidOption(_)));
    assert!(!deploy.exists());
    assert!(session.statements.is_empty());
}

#[test]
fn test_master_key_file_skips_prompting_and_is_staged() {
    let base = TempDir::new().unwrap();
    let deploy = base.path().join("deploy");
    let key_file = base.path().join("master-key");
    let mut session = MockSession::new(&default_rows());
    let mut prompt = ScriptedPrompt::new(&[]);
    let config = BootstrapConfig {
        master_key_file: Some(key_file.clone()),
        ..Default::default()
    };

    run_directory_bootstrap(&mut session, &mut prompt, &deploy, &config).unwrap();

    assert!(key_file.exists());
    let staged = PathBuf::from(format!("{}.tmp", key_file.display()));
    assert!(!staged.exists());
    let rendered = fs::read_to_string(deploy.join(CONFIG_FILE_NAME)).unwrap();
    assert!(rendered.contains(&format!("master_key_path={}\n", key_file.display())));
    // No interactive key, so the start script launches without a prompt.
    let start = fs::read_to_string(deploy.join("start.sh")).unwrap();
    assert!(!start.contains("stty -echo"));
}

// ============================================================================
// System deployments
// ============================================================================

#[test]
fn test_system_bootstrap_defaults_to_reserved_name() {
    let base = TempDir::new().unwrap();
    let config_path = base.path().join("routerd.conf");
    let keyring_path = base.path().join("keyring");
    let key_file = base.path().join("master-key");
    let mut session = MockSession::new(&default_rows());
    let mut prompt = ScriptedPrompt::new(&[]);
    let config = BootstrapConfig {
        master_key_file: Some(key_file),
        ..Default::default()
    };

    let status = Bootstrapper::new(&mut session, &mut prompt)
        .bootstrap_system_deployment(&config_path, &keyring_path, &config)
        .unwrap();
    assert_eq!(
        status,
        BootstrapStatus::Completed {
            config_backed_up: false
        }
    );

    let rendered = fs::read_to_string(&config_path).unwrap();
    assert!(rendered.contains("name=system\n"));
    // System deployments assume the default sockets dir but create no tree
    // and emit no scripts.
    assert!(!rendered.contains("logging_folder"));
    assert!(!base.path().join("start.sh").exists());
    assert!(keyring_path.exists());
}

#[test]
fn test_system_rerun_is_byte_identical_without_backup() {
    let base = TempDir::new().unwrap();
    let config_path = base.path().join("routerd.conf");
    let keyring_path = base.path().join("keyring");
    let key_file = base.path().join("master-key");
    let config = BootstrapConfig {
        master_key_file: Some(key_file),
        ..Default::default()
    };

    let mut first = MockSession::new(&default_rows());
    let mut prompt = ScriptedPrompt::new(&[]);
    Bootstrapper::new(&mut first, &mut prompt)
        .bootstrap_system_deployment(&config_path, &keyring_path, &config)
        .unwrap();
    let first_render = fs::read_to_string(&config_path).unwrap();

    let mut second = MockSession::new(&default_rows());
    second.known_router_ids = vec![5];
    let mut prompt = ScriptedPrompt::new(&[]);
    let status = Bootstrapper::new(&mut second, &mut prompt)
        .bootstrap_system_deployment(&config_path, &keyring_path, &config)
        .unwrap();

    assert_eq!(
        status,
        BootstrapStatus::Completed {
            config_backed_up: false
        }
    );
    assert_eq!(fs::read_to_string(&config_path).unwrap(), first_render);
    assert!(!base.path().join("routerd.conf.bak").exists());
}

#[test]
fn test_multi_master_topology_omits_read_only_sections() {
    let base = TempDir::new().unwrap();
    let config_path = base.path().join("routerd.conf");
    let keyring_path = base.path().join("keyring");
    let key_file = base.path().join("master-key");
    let rows = vec![
        ("mycluster", "default", "mm", "10.0.0.1:3306"),
        ("mycluster", "default", "mm", "10.0.0.2:3306"),
    ];
    let mut session = MockSession::new(&rows);
    let mut prompt = ScriptedPrompt::new(&[]);
    let config = BootstrapConfig {
        master_key_file: Some(key_file),
        ..Default::default()
    };

    Bootstrapper::new(&mut session, &mut prompt)
        .bootstrap_system_deployment(&config_path, &keyring_path, &config)
        .unwrap();

    let rendered = fs::read_to_string(&config_path).unwrap();
    assert!(rendered.contains("[routing:mycluster_default_rw]\n"));
    assert!(rendered.contains("[routing:mycluster_default_x_rw]\n"));
    assert!(!rendered.contains("_ro]\n"));
    assert!(!rendered.contains("role=SECONDARY"));
}
