use std::time::Duration;
use webwarden_core::TunnelSettings;

/// トンネル有効かつ Web パスワード未設定のときの警告
pub const SECURITY_WARNING: &str = "Warning: Tunnel is enabled but no web password is set. Your OpenCode instance will be publicly accessible without authentication.";

/// 起動のタイミング設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelPolicy {
    /// 1 回の試行で準備完了を待つ上限
    pub startup_timeout: Duration,
    /// n 回目の失敗の後に待つ時間
    pub retry_delays: Vec<Duration>,
    pub max_attempts: usize,
}

impl Default for TunnelPolicy {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            retry_delays: vec![
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(10),
            ],
            max_attempts: 3,
        }
    }
}

impl TunnelPolicy {
    /// `failures` 回失敗した後の待ち時間（1 始まり）
    pub fn retry_delay(&self, failures: usize) -> Duration {
        self.retry_delays
            .get(failures.saturating_sub(1))
            .or(self.retry_delays.last())
            .copied()
            .unwrap_or(Duration::from_secs(10))
    }
}

/// Web サービスの起動に合わせてトンネルも起動するか
pub fn should_auto_start(settings: &TunnelSettings) -> bool {
    settings.enabled && settings.auto_start_with_web
}

/// 認証なしで公開される構成なら警告文を返す
pub fn security_warning(settings: &TunnelSettings, web_password: Option<&str>) -> Option<&'static str> {
    if !settings.enabled {
        return None;
    }
    match web_password {
        Some(password) if !password.is_empty() => None,
        _ => Some(SECURITY_WARNING),
    }
}
