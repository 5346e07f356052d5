//! Behavioural coverage for the end-to-end deployment workflow.

use std::fs::{create_dir_all, write};
use std::time::Duration;

use camino::Utf8PathBuf;
use gantry::test_support::ScriptedSession;
use gantry::{DeployError, DeployOrchestrator, Reporter, TargetConfig};
use tempfile::TempDir;

fn config() -> TargetConfig {
    TargetConfig {
        host: String::from("host.example"),
        port: 22,
        username: String::from("account"),
        password: String::from("secret"),
        remote_dir: String::from("/srv/app"),
        public_url: String::from("https://app.example/"),
        app_name: String::from("app"),
        app_script: String::from("server.js"),
        app_port: 3006,
        manager_bin: String::from("./node_modules/.bin/pm2"),
        manager_home: None,
        node_bin_dir: None,
        archive_name: String::from("deploy_package.zip"),
        rewrite_file: String::from("site.htaccess"),
        proxy_file: String::from("proxy.php"),
        manager_config_file: String::from("ecosystem.config.js"),
    }
}

fn workspace() -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().expect("create temp directory");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .expect("temp path should be UTF-8");
    write(root.join("server.js"), "require('http');").expect("write file");
    create_dir_all(root.join("views")).expect("create dir");
    write(root.join("views/index.html"), "<html></html>").expect("write file");
    write(root.join("site.htaccess"), "RewriteEngine On").expect("write file");
    (tmp, root)
}

/// Queues responses for: mkdir, six sequence steps, two probes.
fn script_successful_run(session: &ScriptedSession) {
    session.push_success();
    for _ in 0..6 {
        session.push_success();
    }
    session.push_output(Some(0), "200", "");
    session.push_output(Some(0), "200", "");
}

#[tokio::test]
async fn successful_deploy_uploads_unpacks_restarts_and_verifies() {
    let (_tmp, root) = workspace();
    let session = ScriptedSession::new();
    script_successful_run(&session);

    let target = config();
    let orchestrator = DeployOrchestrator::new(&target).with_startup_settle(Duration::ZERO);
    let mut reporter = Reporter::new(Vec::new());
    let outcome = orchestrator
        .execute(&session, &root, &mut reporter)
        .await
        .expect("deploy should succeed");

    assert!(outcome.sequence.completed());
    assert!(outcome.loopback.accepted);
    assert!(outcome.public.accepted);

    let uploads = session.uploads();
    assert_eq!(uploads.len(), 2);
    let paths: Vec<&str> = uploads
        .iter()
        .map(|upload| upload.remote_path.as_str())
        .collect();
    assert_eq!(paths, vec!["/srv/app/deploy_package.zip", "/srv/app/.htaccess"]);

    let commands = session.commands();
    assert_eq!(commands.first().map(String::as_str), Some("mkdir -p /srv/app"));
    assert!(
        commands.iter().any(|cmd| cmd.contains("unzip -o deploy_package.zip")),
        "missing unpack step in: {commands:?}"
    );
    assert!(
        commands
            .iter()
            .any(|cmd| cmd.contains("PORT=3006") && cmd.contains("--name app")),
        "missing start step in: {commands:?}"
    );

    assert!(
        !root.join("deploy_package.zip").exists(),
        "local package must be removed after a successful run"
    );
}

#[tokio::test]
async fn failed_install_halts_before_the_restart_steps() {
    let (_tmp, root) = workspace();
    let session = ScriptedSession::new();
    session.push_success(); // mkdir
    session.push_success(); // unzip
    session.push_success(); // rm
    session.push_failure(1); // npm install --production

    let target = config();
    let orchestrator = DeployOrchestrator::new(&target).with_startup_settle(Duration::ZERO);
    let mut reporter = Reporter::new(Vec::new());
    let err = orchestrator
        .execute(&session, &root, &mut reporter)
        .await
        .expect_err("deploy should halt");

    assert!(
        matches!(
            err,
            DeployError::Halted { ref label, .. } if label == "install production dependencies"
        ),
        "unexpected error: {err}"
    );
    assert!(
        !session.commands().iter().any(|cmd| cmd.contains("pm2 start")),
        "the start step must not run after a halt"
    );
    assert!(
        !root.join("deploy_package.zip").exists(),
        "local package must be removed after a failed run"
    );
}

#[tokio::test]
async fn missing_rewrite_file_is_tolerated() {
    let (_tmp, root) = workspace();
    std::fs::remove_file(root.join("site.htaccess")).expect("remove rewrite file");
    let session = ScriptedSession::new();
    script_successful_run(&session);

    let target = config();
    let orchestrator = DeployOrchestrator::new(&target).with_startup_settle(Duration::ZERO);
    let mut buffer = Vec::new();
    let mut reporter = Reporter::new(&mut buffer);
    orchestrator
        .execute(&session, &root, &mut reporter)
        .await
        .expect("deploy should succeed without rewrite rules");

    assert_eq!(session.uploads().len(), 1, "only the package is uploaded");
    let rendered = String::from_utf8(buffer).expect("reporter output should be UTF-8");
    assert!(rendered.contains("not found; skipping"), "got: {rendered}");
}
