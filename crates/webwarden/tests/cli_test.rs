use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

#[allow(deprecated)]
fn warden(settings: &Path) -> Command {
    let mut cmd = Command::cargo_bin("warden").unwrap();
    cmd.env("WARDEN_SETTINGS_PATH", settings)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("WARDEN_DIRECT");
    cmd
}

/// CLIヘルプにサブコマンドが並ぶことを確認
#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    warden(&dir.path().join("settings.json"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("opencode web"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("service"))
        .stdout(predicate::str::contains("tunnel"))
        .stdout(predicate::str::contains("settings"));
}

#[test]
fn test_settings_path_follows_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.json");

    warden(&path)
        .args(["settings", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(path.to_str().unwrap()));
}

/// 設定ファイルが無くてもデフォルト値で表示できる
#[test]
fn test_settings_show_defaults() {
    let dir = tempfile::tempdir().unwrap();

    warden(&dir.path().join("missing.json"))
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"hostname\": \"127.0.0.1\""))
        .stdout(predicate::str::contains("\"autoStartWithWeb\": true"));
}

#[test]
fn test_settings_show_redacts_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"web":{"password":"hunter2"},"tunnel":{"token":"secret-token"}}"#,
    )
    .unwrap();

    warden(&path)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("hunter2").not())
        .stdout(predicate::str::contains("secret-token").not());
}

/// 入力は正規化されてから保存される
#[test]
fn test_settings_apply_sanitizes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("settings.json");
    let input = dir.path().join("input.json");
    std::fs::write(
        &input,
        r#"{"web":{"port":70000,"hostname":"  0.0.0.0 "},"tunnel":{"enabled":true,"mode":"quick"}}"#,
    )
    .unwrap();

    warden(&path)
        .args(["--direct", "settings", "apply"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("設定を保存しました"))
        .stdout(predicate::str::contains("no web password is set"));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(saved["web"]["port"].is_null());
    assert_eq!(saved["web"]["hostname"], "0.0.0.0");
    assert_eq!(saved["tunnel"]["mode"], "quick");
    assert_eq!(saved["tunnel"]["autoStartWithWeb"], true);
}

#[test]
fn test_settings_apply_rejects_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let input = dir.path().join("input.json");
    std::fs::write(&input, "{ not json").unwrap();

    warden(&path)
        .args(["--direct", "settings", "apply"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("有効な JSON ではありません"));
    assert!(!path.exists());
}

/// 直接起動ではコマンド終了と同時にプロセスが消えるため start は使えない
#[test]
fn test_direct_start_points_to_run() {
    let dir = tempfile::tempdir().unwrap();

    warden(&dir.path().join("settings.json"))
        .args(["--direct", "start"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("warden run --direct"));
}

#[test]
fn test_service_commands_need_launchd() {
    let dir = tempfile::tempdir().unwrap();

    warden(&dir.path().join("settings.json"))
        .args(["--direct", "service", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("macOS"));
}

#[test]
fn test_tunnel_status_reports_missing_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"tunnel":{"enabled":true,"mode":"named"}}"#).unwrap();

    warden(&path)
        .env_remove("CLOUDFLARE_TUNNEL_TOKEN")
        .args(["tunnel", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("モード: named"))
        .stdout(predicate::str::contains("未設定"));
}
