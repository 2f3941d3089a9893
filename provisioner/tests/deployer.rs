//! Template deployer tests

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::FakeHost;
use provisioner::{ProvisionError, ShellExecutor, TemplateDeployer, TemplateSpec};

fn write_template(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

#[tokio::test]
async fn test_deploy_renders_writes_and_marks_executable() {
    let resources = tempfile::tempdir().unwrap();
    write_template(resources.path(), "start.tmpl", "PORT={{port}}");
    let host = FakeHost::new();
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    let spec = TemplateSpec::new("start.tmpl", "$HOME/bin/start")
        .unwrap()
        .var("port", "8987")
        .permissions("+x")
        .unwrap();
    let deployed = deployer.deploy(&spec).await.unwrap();

    assert_eq!(deployed.destination, "$HOME/bin/start");
    assert_eq!(deployed.bytes, "PORT=8987".len());
    assert_eq!(host.file_contents("$HOME/bin/start").as_deref(), Some("PORT=8987"));
    assert_eq!(host.modes("$HOME/bin/start"), vec!["+x".to_string()]);
    assert!(host.has_dir("$HOME/bin"));
    assert_eq!(
        host.lines_for("chmod"),
        vec!["chmod +x \"$HOME\"/bin/start".to_string()]
    );
}

#[tokio::test]
async fn test_missing_variable_writes_nothing() {
    let resources = tempfile::tempdir().unwrap();
    write_template(
        resources.path(),
        "start_notebook.tmpl",
        "{{virtualenv}}/bin/ipython notebook --port={{port}} > {{logfile}}",
    );
    let host = FakeHost::new();
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    let spec = TemplateSpec::new("start_notebook.tmpl", "$HOME/bin/start_notebook")
        .unwrap()
        .var("virtualenv", "$HOME/pyml");
    let err = deployer.deploy(&spec).await.unwrap_err();

    match err {
        ProvisionError::MissingVariable(names) => {
            assert_eq!(names, vec!["logfile".to_string(), "port".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(host.commands().is_empty());
}

#[tokio::test]
async fn test_missing_template_is_reported() {
    let resources = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    let spec = TemplateSpec::new("absent.tmpl", "/etc/absent").unwrap();
    let err = deployer.deploy(&spec).await.unwrap_err();

    match err {
        ProvisionError::TemplateNotFound(path) => {
            assert_eq!(path, resources.path().join("absent.tmpl"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(host.commands().is_empty());
}

#[tokio::test]
async fn test_absolute_template_path_ignores_resource_dir() {
    let elsewhere = tempfile::tempdir().unwrap();
    write_template(elsewhere.path(), "stop.tmpl", "kill $(cat {{pidfile}})");
    let host = FakeHost::new();
    let deployer = TemplateDeployer::new(host.clone(), "/nonexistent/resources");

    let template = elsewhere.path().join("stop.tmpl");
    let spec = TemplateSpec::new(template.to_string_lossy(), "$HOME/bin/stop")
        .unwrap()
        .var("pidfile", "$HOME/nb/pid");
    deployer.deploy(&spec).await.unwrap();

    assert_eq!(
        host.file_contents("$HOME/bin/stop").as_deref(),
        Some("kill $(cat $HOME/nb/pid)")
    );
    assert!(host.lines_for("chmod").is_empty());
}

#[tokio::test]
async fn test_write_failure() {
    let resources = tempfile::tempdir().unwrap();
    write_template(resources.path(), "conf.tmpl", "ip={{ip}}");
    let host = FakeHost::new();
    host.fail_program("tee");
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    let spec = TemplateSpec::new("conf.tmpl", "/etc/app.conf")
        .unwrap()
        .var("ip", "*");
    let err = deployer.deploy(&spec).await.unwrap_err();

    assert!(
        matches!(&err, ProvisionError::WriteFailed { path, .. } if path == "/etc/app.conf"),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_chmod_failure_is_write_failure() {
    let resources = tempfile::tempdir().unwrap();
    write_template(resources.path(), "conf.tmpl", "static");
    let host = FakeHost::new();
    host.fail_program("chmod");
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    let spec = TemplateSpec::new("conf.tmpl", "/etc/app.conf")
        .unwrap()
        .permissions("0644")
        .unwrap();
    let err = deployer.deploy(&spec).await.unwrap_err();

    assert!(matches!(err, ProvisionError::WriteFailed { .. }), "{err:?}");
}

#[tokio::test]
async fn test_redeploy_overwrites() {
    let resources = tempfile::tempdir().unwrap();
    write_template(resources.path(), "start.tmpl", "PORT={{port}}");
    let host = FakeHost::new();
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    for port in ["8987", "9000"] {
        let spec = TemplateSpec::new("start.tmpl", "$HOME/bin/start")
            .unwrap()
            .var("port", port);
        deployer.deploy(&spec).await.unwrap();
    }

    assert_eq!(host.file_contents("$HOME/bin/start").as_deref(), Some("PORT=9000"));
    assert_eq!(host.lines_for("tee").len(), 2);
}

#[tokio::test]
async fn test_render_does_not_touch_host() {
    let resources = tempfile::tempdir().unwrap();
    write_template(resources.path(), "start.tmpl", "PORT={{ port }}");
    let host = FakeHost::new();
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    let spec = TemplateSpec::new("start.tmpl", "$HOME/bin/start")
        .unwrap()
        .var("port", 1);
    assert_eq!(deployer.render(&spec).await.unwrap(), "PORT=1");
    assert!(host.commands().is_empty());
}

#[tokio::test]
async fn test_destination_that_is_a_directory_fails() {
    let resources = tempfile::tempdir().unwrap();
    write_template(resources.path(), "conf.tmpl", "static");
    let host = FakeHost::new();
    host.add_dir("/etc/app.conf");
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    let spec = TemplateSpec::new("conf.tmpl", "/etc/app.conf").unwrap();
    let err = deployer.deploy(&spec).await.unwrap_err();

    assert!(matches!(err, ProvisionError::WriteFailed { .. }), "{err:?}");
    assert!(!host.has_file("/etc/app.conf"));
}

#[tokio::test]
async fn test_parent_blocked_by_file_fails() {
    let resources = tempfile::tempdir().unwrap();
    write_template(resources.path(), "start.tmpl", "static");
    let host = FakeHost::new();
    host.add_file("$HOME/bin", "");
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    let spec = TemplateSpec::new("start.tmpl", "$HOME/bin/start").unwrap();
    let err = deployer.deploy(&spec).await.unwrap_err();

    assert!(matches!(err, ProvisionError::WriteFailed { .. }), "{err:?}");
    assert!(host.lines_for("tee").is_empty());
}

#[tokio::test]
async fn test_unreadable_template_is_not_reported_missing() {
    let resources = tempfile::tempdir().unwrap();
    std::fs::write(resources.path().join("binary.tmpl"), [0xff, 0xfe, 0x00]).unwrap();
    std::fs::create_dir(resources.path().join("dir.tmpl")).unwrap();
    let host = FakeHost::new();
    let deployer = TemplateDeployer::new(host.clone(), resources.path());

    for name in ["binary.tmpl", "dir.tmpl"] {
        let spec = TemplateSpec::new(name, "/etc/out").unwrap();
        let err = deployer.deploy(&spec).await.unwrap_err();
        assert!(matches!(err, ProvisionError::IoError(_)), "{name}: {err:?}");
    }
    assert!(host.commands().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_large_template_deploys_through_local_shell() {
    use std::os::unix::fs::PermissionsExt;

    let resources = tempfile::tempdir().unwrap();
    let line = "export SETTING_{{name}}={{value}}\n";
    write_template(resources.path(), "big.tmpl", &line.repeat(16 * 1024));
    let dest_root = tempfile::tempdir().unwrap();
    let dest = dest_root.path().join("bin").join("big.sh");

    let deployer = TemplateDeployer::new(Arc::new(ShellExecutor::local()), resources.path());
    let spec = TemplateSpec::new("big.tmpl", &dest.to_string_lossy())
        .unwrap()
        .var("name", "PORT")
        .var("value", 8987)
        .permissions("+x")
        .unwrap();

    let deployed = tokio::time::timeout(Duration::from_secs(30), deployer.deploy(&spec))
        .await
        .expect("deploy of a large template stalled")
        .unwrap();

    let expected = "export SETTING_PORT=8987\n".repeat(16 * 1024);
    assert_eq!(deployed.bytes, expected.len());
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), expected);
    let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
    assert_ne!(mode & 0o111, 0);
}
