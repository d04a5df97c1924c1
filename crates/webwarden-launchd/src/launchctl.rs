//! launchctl CLI wrapper

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use webwarden_core::{Result, WardenError};

/// コマンドの実行結果
///
/// 非ゼロ終了も `Ok` で返す。許容するかどうかは呼び出し側が決める。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// 非ゼロ終了を ExternalCommand エラーに変換する
    pub fn check(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(WardenError::ExternalCommand {
                command: command.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// OS サービスマネージャーの抽象
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// 引数を渡してコマンドを実行する
    async fn run(&self, args: &[&str]) -> Result<CommandOutput>;
}

/// 実際の `launchctl`
#[derive(Debug, Clone, Default)]
pub struct Launchctl;

#[async_trait]
impl ServiceManager for Launchctl {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("launchctl");
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: launchctl {}", args.join(" "));

        let output = cmd.output().await?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// 失敗を許容するコマンドの結果を捨てる
///
/// 無視した失敗はすべてここを通り、debug ログに残る。
pub fn best_effort(what: &str, result: Result<CommandOutput>) {
    match result {
        Ok(output) if output.success() => {}
        Ok(output) => tracing::debug!(
            "Ignoring failure of {} (exit code {:?}): {}",
            what,
            output.code,
            output.stderr.trim()
        ),
        Err(e) => tracing::debug!("Ignoring failure of {}: {}", what, e),
    }
}
