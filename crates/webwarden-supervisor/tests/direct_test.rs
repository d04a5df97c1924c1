#![cfg(unix)]

use serial_test::serial;
use std::fs;
use std::net::{Ipv4Addr, TcpListener};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use webwarden_core::{ProcessStatus, WardenError, WrapperSettings};
use webwarden_supervisor::{DirectLauncher, ProcessSupervisor, StartupPolicy, WebLauncher};
use webwarden_tunnel::TunnelSupervisor;

/// 引数と環境変数を記録する偽の opencode
fn fake_opencode(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("opencode");
    fs::write(
        &path,
        format!(
            "#!/bin/sh\necho \"$@\" > '{args}'\necho \"$BROWSER $OPENCODE_SERVER_USERNAME\" > '{env}'\n{body}\n",
            args = dir.join("args").display(),
            env = dir.join("env").display(),
        ),
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn launcher(binary: &Path) -> DirectLauncher {
    DirectLauncher::new()
        .with_executable(binary)
        .with_opencode_config(None)
        .with_detect_timeout(Duration::from_secs(3))
}

fn settings(port: u16) -> WrapperSettings {
    let mut settings = WrapperSettings::default();
    settings.web.port = Some(port);
    settings
}

fn free_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
#[serial]
async fn test_port_detected_from_output() {
    let dir = TempDir::new().unwrap();
    let binary = fake_opencode(
        dir.path(),
        "echo 'opencode server listening on http://127.0.0.1:5123'\nexec sleep 30",
    );
    let launcher = launcher(&binary);

    let mut web = settings(4096);
    web.web.username = Some("dev".to_string());
    web.web.cors = vec!["https://a.example".to_string()];
    let launch = launcher.launch(&web, 4096).await.unwrap();

    assert_eq!(launch.port, 5123);
    assert!(launch.detected_from_output);
    assert!(launcher.is_active().await.unwrap());
    assert!(launcher.pid().await.is_some());
    assert_eq!(
        fs::read_to_string(dir.path().join("args")).unwrap().trim(),
        "web --port 4096 --hostname 127.0.0.1 --cors https://a.example"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("env")).unwrap().trim(),
        "none dev"
    );

    launcher.halt().await.unwrap();
    assert!(!launcher.is_active().await.unwrap());
    assert_eq!(launcher.pid().await, None);
}

#[tokio::test]
#[serial]
async fn test_marker_falls_back_to_requested_port() {
    let dir = TempDir::new().unwrap();
    let binary = fake_opencode(dir.path(), "echo 'Server ready'\nexec sleep 30");
    let launcher = launcher(&binary);

    let launch = launcher.launch(&settings(4300), 4300).await.unwrap();

    assert_eq!(launch.port, 4300);
    assert!(!launch.detected_from_output);
    launcher.halt().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_exit_before_ready_is_premature() {
    let dir = TempDir::new().unwrap();
    let binary = fake_opencode(dir.path(), "echo 'config invalid' >&2\nexit 4");
    let launcher = launcher(&binary);

    let err = launcher.launch(&settings(4096), 4096).await.unwrap_err();

    assert!(matches!(err, WardenError::PrematureExit { code: Some(4), .. }));
    assert!(!launcher.is_active().await.unwrap());
}

#[tokio::test]
#[serial]
async fn test_silent_process_times_out() {
    let dir = TempDir::new().unwrap();
    let binary = fake_opencode(dir.path(), "exec sleep 30");
    let launcher = launcher(&binary).with_detect_timeout(Duration::from_millis(300));

    let err = launcher.launch(&settings(4096), 4096).await.unwrap_err();

    assert!(matches!(err, WardenError::StartupTimeout { .. }));
    assert!(!launcher.is_active().await.unwrap());
}

#[tokio::test]
#[serial]
async fn test_exit_signal_carries_code() {
    let dir = TempDir::new().unwrap();
    let binary = fake_opencode(dir.path(), "echo 'listening'\nsleep 0.2\nexit 2");
    let launcher = launcher(&binary);

    let launch = launcher.launch(&settings(4096), 4096).await.unwrap();
    let exit = launch.exit.unwrap();

    assert_eq!(tokio::time::timeout(Duration::from_secs(3), exit).await.unwrap(), Some(2));
}

#[tokio::test]
#[serial]
async fn test_supervisor_detects_direct_crash() {
    let dir = TempDir::new().unwrap();
    let port = free_port();
    let binary = fake_opencode(
        dir.path(),
        &format!("echo 'listening on 127.0.0.1:{port}'\nsleep 1\nexit 1"),
    );

    let sup = ProcessSupervisor::with_policy(
        launcher(&binary),
        Arc::new(settings(port)),
        TunnelSupervisor::new(),
        StartupPolicy {
            startup_timeout: Duration::from_secs(3),
            fast_path_timeout: Duration::from_secs(2),
        },
    );
    let crashes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&crashes);
    sup.on_crash(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // 偽の opencode は listen しないので、起動開始後にテスト側で listen する
    let serve = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap()
    });

    assert_eq!(sup.start().await.unwrap(), port);
    assert_eq!(sup.status(), ProcessStatus::Running);
    let _listener = serve.await.unwrap();

    let mut status = sup.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| *s == ProcessStatus::Stopped),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(crashes.load(Ordering::SeqCst), 1);
    assert_eq!(
        sup.last_error().as_deref(),
        Some("opencode exited with code 1")
    );
    assert_eq!(sup.refresh_status().await.unwrap(), ProcessStatus::Stopped);
}
