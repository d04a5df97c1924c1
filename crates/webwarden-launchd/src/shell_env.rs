//! ログインシェルの PATH 解決
//!
//! Dock / Finder から起動されたプロセスはシェルの初期化ファイルを通らないため、
//! PATH が最小限になっている。launchd に渡す PATH はログインシェルから取得する。

use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, warn};

const SHELL_ENV_TIMEOUT: Duration = Duration::from_secs(5);
const FALLBACK_SHELL: &str = "/bin/zsh";

static LOGIN_PATH: OnceCell<String> = OnceCell::const_new();

/// ログインシェルの PATH（プロセス内で 1 回だけ解決する）
pub async fn login_shell_path() -> String {
    LOGIN_PATH.get_or_init(resolve_login_path).await.clone()
}

async fn resolve_login_path() -> String {
    let shell = std::env::var("SHELL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_SHELL.to_string());

    let mut cmd = Command::new(&shell);
    cmd.args(["-ilc", "env"]).env_clear().kill_on_drop(true);
    if let Some(home) = dirs::home_dir() {
        cmd.env("HOME", home);
    }

    match timeout(SHELL_ENV_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => {
            if let Some(path) = parse_path(&String::from_utf8_lossy(&output.stdout)) {
                debug!("Resolved PATH from login shell {}", shell);
                return path;
            }
            warn!("Login shell {} did not report PATH", shell);
        }
        Ok(Err(e)) => warn!("Failed to run login shell {}: {}", shell, e),
        Err(_) => warn!("Login shell {} timed out", shell),
    }

    fallback_path(std::env::var("PATH").ok().as_deref())
}

/// `env` 出力から PATH を取り出す
fn parse_path(env_output: &str) -> Option<String> {
    env_output
        .lines()
        .filter_map(|line| line.strip_prefix("PATH="))
        .map(str::trim)
        .rfind(|path| !path.is_empty())
        .map(str::to_string)
}

/// よく使われる bin ディレクトリを現在の PATH の前に置く
fn fallback_path(current: Option<&str>) -> String {
    let home = dirs::home_dir()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut entries = vec![
        format!("{home}/.local/bin"),
        format!("{home}/go/bin"),
        "/opt/homebrew/bin".to_string(),
        "/usr/local/bin".to_string(),
        "/usr/bin".to_string(),
        "/bin".to_string(),
    ];
    if let Some(current) = current.filter(|p| !p.is_empty()) {
        entries.push(current.to_string());
    }
    entries.join(":")
}
