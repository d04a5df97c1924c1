use serde::{Deserialize, Serialize};

/// ラッパー全体の希望状態
///
/// SettingsStore が所有し、スーパーバイザーからは読み取り専用。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WrapperSettings {
    pub launch_at_login: bool,
    pub web: WebSettings,
    pub tunnel: TunnelSettings,
}

/// Web サービスの起動設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSettings {
    /// `None` はサービス側のデフォルト（または既に使われている値）に従う
    pub port: Option<u16>,
    pub hostname: String,
    pub mdns: bool,
    pub mdns_domain: Option<String>,
    pub cors: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub extra_args: Vec<String>,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            port: None,
            hostname: DEFAULT_HOSTNAME.to_string(),
            mdns: false,
            mdns_domain: None,
            cors: Vec::new(),
            username: None,
            password: None,
            extra_args: Vec::new(),
        }
    }
}

pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";

/// トンネルのモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// 事前登録済みトンネル（トークン必須）
    #[default]
    Named,
    /// 一時的な公開 URL
    Quick,
}

/// トンネルの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TunnelSettings {
    pub enabled: bool,
    pub mode: TunnelMode,
    pub token: Option<String>,
    pub hostname: Option<String>,
    pub cloudflared_path: Option<String>,
    pub auto_start_with_web: bool,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: TunnelMode::Named,
            token: None,
            hostname: None,
            cloudflared_path: None,
            auto_start_with_web: true,
        }
    }
}

/// 希望状態の供給元
///
/// スーパーバイザーは操作のたびに最新の設定を読み直す。
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> WrapperSettings;
}

impl SettingsSource for WrapperSettings {
    fn load(&self) -> WrapperSettings {
        self.clone()
    }
}
