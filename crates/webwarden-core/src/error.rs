use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error(
        "{program} が見つかりません\n\nヒント:\n  • {program} をインストールして PATH に追加してください\n  • {hint}"
    )]
    Resolution { program: String, hint: String },

    #[error("設定エラー: {0}")]
    Configuration(String),

    #[error(
        "{target} の起動待機中にタイムアウトしました（{timeout_ms}ms）\n\nヒント:\n  • ログを確認してください\n  • 手動で再試行してください"
    )]
    StartupTimeout { target: String, timeout_ms: u64 },

    #[error("{}", premature_exit_message(program, *code))]
    PrematureExit { program: String, code: Option<i32> },

    #[error("コマンド `{command}` が失敗しました (exit code: {code:?}): {stderr}")]
    ExternalCommand {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("進行中の起動処理が失敗しました: {0}")]
    StartFailed(String),

    #[error("ホームディレクトリが見つかりません")]
    HomeDirNotFound,

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),
}

fn premature_exit_message(program: &str, code: Option<i32>) -> String {
    match code {
        Some(code) => format!("{program} exited with code {code}"),
        None => format!("{program} exited unexpectedly"),
    }
}

impl WardenError {
    /// 自動リトライしてはいけないエラーかどうか
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WardenError::Resolution { .. } | WardenError::Configuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
