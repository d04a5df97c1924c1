//! cloudflared の起動コマンドと準備完了の判定

use regex::Regex;
use std::sync::LazyLock;
use webwarden_core::{OutputMatch, OutputMatcher, Result, TunnelMode, TunnelSettings, WardenError};

/// 既定の実行ファイル名
pub const CLOUDFLARED: &str = "cloudflared";

/// 保存済みトークンより優先されるトークン
pub const TOKEN_ENV: &str = "CLOUDFLARE_TUNNEL_TOKEN";

static QUICK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://[a-z0-9-]+\.trycloudflare\.com").expect("valid quick tunnel regex")
});

static CONNECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)connected|registered conn").expect("valid connected regex"));

/// 1 回の試行で起動するコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelCommand {
    pub program: String,
    pub args: Vec<String>,
    pub mode: TunnelMode,
    pub hostname: Option<String>,
}

impl TunnelCommand {
    /// 設定からコマンドを組み立てる
    ///
    /// named モードでトークンが無ければ Configuration エラー（プロセスは起動しない）。
    pub fn from_settings(settings: &TunnelSettings, local_port: u16) -> Result<Self> {
        let program = settings
            .cloudflared_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(CLOUDFLARED)
            .to_string();

        let args = match settings.mode {
            TunnelMode::Quick => vec![
                "tunnel".to_string(),
                "--url".to_string(),
                format!("http://127.0.0.1:{local_port}"),
            ],
            TunnelMode::Named => {
                let token = resolve_token(settings).ok_or_else(|| {
                    WardenError::Configuration(format!(
                        "named トンネルにはトークンが必要です。環境変数 {TOKEN_ENV} を設定するか、設定でトークンを指定してください"
                    ))
                })?;
                vec![
                    "tunnel".to_string(),
                    "run".to_string(),
                    "--token".to_string(),
                    token,
                ]
            }
        };

        Ok(Self {
            program,
            args,
            mode: settings.mode,
            hostname: settings.hostname.clone(),
        })
    }

    /// ログ出力用（トークンは伏せる）
    pub fn display_args(&self) -> String {
        let mut redact_next = false;
        self.args
            .iter()
            .map(|arg| {
                let shown = if redact_next { "***" } else { arg.as_str() };
                redact_next = arg == "--token";
                shown.to_string()
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// モードに応じた準備完了パターン
    pub fn matcher(&self) -> OutputMatcher {
        let pattern = match self.mode {
            TunnelMode::Quick => &QUICK_URL,
            TunnelMode::Named => &CONNECTED,
        };
        OutputMatcher::new([Regex::clone(pattern)])
    }

    /// 準備完了の出力から公開 URL を決める
    pub fn public_url(&self, matched: &OutputMatch) -> String {
        match self.mode {
            TunnelMode::Quick => matched.text.clone(),
            TunnelMode::Named => match &self.hostname {
                Some(hostname) => format!("https://{hostname}"),
                None => "https://<configured-hostname>".to_string(),
            },
        }
    }
}

/// 環境変数のトークンが保存済みのものより優先
pub fn resolve_token(settings: &TunnelSettings) -> Option<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            settings
                .token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn named(token: Option<&str>) -> TunnelSettings {
        TunnelSettings {
            enabled: true,
            mode: TunnelMode::Named,
            token: token.map(str::to_string),
            hostname: Some("opencode.example.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_quick_args() {
        let settings = TunnelSettings {
            mode: TunnelMode::Quick,
            ..Default::default()
        };
        let command = TunnelCommand::from_settings(&settings, 4096).unwrap();
        assert_eq!(command.program, "cloudflared");
        assert_eq!(command.args, vec!["tunnel", "--url", "http://127.0.0.1:4096"]);
    }

    #[test]
    #[serial]
    fn test_named_args_use_stored_token() {
        unsafe {
            std::env::remove_var(TOKEN_ENV);
        }
        let mut settings = named(Some("stored"));
        settings.cloudflared_path = Some("/opt/bin/cloudflared".to_string());

        let command = TunnelCommand::from_settings(&settings, 4096).unwrap();
        assert_eq!(command.program, "/opt/bin/cloudflared");
        assert_eq!(command.args, vec!["tunnel", "run", "--token", "stored"]);
        assert_eq!(command.display_args(), "tunnel run --token ***");
    }

    #[test]
    #[serial]
    fn test_env_token_wins() {
        unsafe {
            std::env::set_var(TOKEN_ENV, "from-env");
        }
        let command = TunnelCommand::from_settings(&named(Some("stored")), 4096).unwrap();
        unsafe {
            std::env::remove_var(TOKEN_ENV);
        }
        assert_eq!(command.args.last().map(String::as_str), Some("from-env"));
    }

    #[test]
    #[serial]
    fn test_named_without_token_is_configuration_error() {
        unsafe {
            std::env::remove_var(TOKEN_ENV);
        }
        let err = TunnelCommand::from_settings(&named(Some("  ")), 4096).unwrap_err();
        assert!(matches!(err, WardenError::Configuration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_quick_url_extraction() {
        let command = TunnelCommand {
            program: CLOUDFLARED.to_string(),
            args: vec![],
            mode: TunnelMode::Quick,
            hostname: None,
        };
        let mut matcher = command.matcher();
        assert!(matcher.feed(b"INF Requesting new quick Tunnel\n").is_none());
        let matched = matcher
            .feed(b"INF |  https://abc123.trycloudflare.com  |\n")
            .unwrap();
        assert_eq!(command.public_url(&matched), "https://abc123.trycloudflare.com");
    }

    #[test]
    fn test_named_url_synthesized() {
        let mut command = TunnelCommand {
            program: CLOUDFLARED.to_string(),
            args: vec![],
            mode: TunnelMode::Named,
            hostname: Some("opencode.example.com".to_string()),
        };
        let matched = command
            .matcher()
            .feed(b"INF Registered tunnel connection connIndex=0\nINF Connection abc registered connIndex=0")
            .unwrap();
        assert_eq!(command.public_url(&matched), "https://opencode.example.com");

        command.hostname = None;
        assert_eq!(command.public_url(&matched), "https://<configured-hostname>");
    }
}
