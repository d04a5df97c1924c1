//! ラッパー設定の読み込みと正規化
//!
//! 読み込みは失敗しない。ファイルが無い・壊れている場合はデフォルト値を返す。

use crate::error::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use webwarden_core::{
    DEFAULT_HOSTNAME, SettingsSource, TunnelMode, TunnelSettings, WebSettings, WrapperSettings,
};

/// JSON ファイルに保存されたラッパー設定
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 既定の場所（または WARDEN_SETTINGS_PATH）を使う
    pub fn from_default_location() -> Result<Self> {
        Ok(Self::new(crate::settings_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> WrapperSettings {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Settings file {} not readable: {}", self.path.display(), e);
                return WrapperSettings::default();
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => sanitize(&value),
            Err(e) => {
                warn!(
                    "Settings file {} is not valid JSON, using defaults: {}",
                    self.path.display(),
                    e
                );
                WrapperSettings::default()
            }
        }
    }

    /// 正規化してから保存し、保存した値を返す
    pub fn save(&self, settings: &WrapperSettings) -> Result<WrapperSettings> {
        let next = sanitize(&serde_json::to_value(settings)?);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&next)? + "\n";
        std::fs::write(&self.path, json)?;
        Ok(next)
    }
}

impl SettingsSource for SettingsStore {
    fn load(&self) -> WrapperSettings {
        SettingsStore::load(self)
    }
}

/// 任意の JSON 値を WrapperSettings に正規化する
///
/// - 文字列はトリムし、空なら None
/// - ポートは 1..=65535 のみ有効
/// - 旧形式の `webStartup.preferredPort` / `webStartup.extraArgs` も読む
pub fn sanitize(input: &Value) -> WrapperSettings {
    let web = input.get("web");
    let tunnel = input.get("tunnel");
    let legacy = input.get("webStartup");

    let port = web
        .and_then(|w| w.get("port"))
        .filter(|v| !v.is_null())
        .or_else(|| legacy.and_then(|l| l.get("preferredPort")))
        .and_then(valid_port);

    let extra_args = web
        .and_then(|w| w.get("extraArgs"))
        .filter(|v| !v.is_null())
        .or_else(|| legacy.and_then(|l| l.get("extraArgs")));

    let web = WebSettings {
        port,
        hostname: trimmed(web.and_then(|w| w.get("hostname")))
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
        mdns: flag(web.and_then(|w| w.get("mdns"))),
        mdns_domain: trimmed(web.and_then(|w| w.get("mdnsDomain"))),
        cors: string_list(web.and_then(|w| w.get("cors"))),
        username: trimmed(web.and_then(|w| w.get("username"))),
        // パスワードは前後の空白も値の一部として扱う
        password: web
            .and_then(|w| w.get("password"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        extra_args: string_list(extra_args),
    };

    let mode = match tunnel.and_then(|t| t.get("mode")).and_then(Value::as_str) {
        Some("quick") => TunnelMode::Quick,
        _ => TunnelMode::Named,
    };

    let tunnel = TunnelSettings {
        enabled: flag(tunnel.and_then(|t| t.get("enabled"))),
        mode,
        token: trimmed(tunnel.and_then(|t| t.get("token"))),
        hostname: trimmed(tunnel.and_then(|t| t.get("hostname"))),
        cloudflared_path: trimmed(tunnel.and_then(|t| t.get("cloudflaredPath"))),
        auto_start_with_web: tunnel
            .and_then(|t| t.get("autoStartWithWeb"))
            .and_then(Value::as_bool)
            .unwrap_or(true),
    };

    WrapperSettings {
        launch_at_login: flag(input.get("launchAtLogin")),
        web,
        tunnel,
    }
}

fn valid_port(value: &Value) -> Option<u16> {
    value
        .as_u64()
        .filter(|p| (1..=65535).contains(p))
        .map(|p| p as u16)
}

fn flag(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

fn trimmed(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(temp_dir.path().join("settings.json"));
        assert_eq!(store.load(), WrapperSettings::default());
    }

    #[test]
    fn test_broken_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(&path);
        assert_eq!(store.load(), WrapperSettings::default());
    }

    #[test]
    fn test_sanitize_trims_and_validates() {
        let settings = sanitize(&json!({
            "launchAtLogin": true,
            "web": {
                "port": 70000,
                "hostname": "  ",
                "mdnsDomain": " opencode.local ",
                "cors": [" https://a.example ", "", 3],
                "username": " admin ",
                "password": " secret ",
                "extraArgs": ["--log-level", " "]
            },
            "tunnel": {
                "enabled": true,
                "mode": "quick",
                "token": "  ",
                "cloudflaredPath": "/opt/homebrew/bin/cloudflared"
            }
        }));

        assert!(settings.launch_at_login);
        assert_eq!(settings.web.port, None);
        assert_eq!(settings.web.hostname, "127.0.0.1");
        assert_eq!(settings.web.mdns_domain.as_deref(), Some("opencode.local"));
        assert_eq!(settings.web.cors, vec!["https://a.example"]);
        assert_eq!(settings.web.username.as_deref(), Some("admin"));
        assert_eq!(settings.web.password.as_deref(), Some(" secret "));
        assert_eq!(settings.web.extra_args, vec!["--log-level"]);
        assert!(settings.tunnel.enabled);
        assert_eq!(settings.tunnel.mode, TunnelMode::Quick);
        assert_eq!(settings.tunnel.token, None);
        assert!(settings.tunnel.auto_start_with_web);
    }

    #[test]
    fn test_sanitize_reads_legacy_keys() {
        let settings = sanitize(&json!({
            "webStartup": { "preferredPort": 5000, "extraArgs": ["--print-logs"] }
        }));
        assert_eq!(settings.web.port, Some(5000));
        assert_eq!(settings.web.extra_args, vec!["--print-logs"]);

        // 新形式が優先される
        let settings = sanitize(&json!({
            "web": { "port": 4100 },
            "webStartup": { "preferredPort": 5000 }
        }));
        assert_eq!(settings.web.port, Some(4100));
    }

    #[test]
    fn test_unknown_mode_falls_back_to_named() {
        let settings = sanitize(&json!({ "tunnel": { "mode": "permanent" } }));
        assert_eq!(settings.tunnel.mode, TunnelMode::Named);
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(temp_dir.path().join("nested").join("settings.json"));

        let mut settings = WrapperSettings::default();
        settings.web.port = Some(4096);
        settings.web.cors = vec!["https://app.example".to_string()];
        settings.tunnel.enabled = true;
        settings.tunnel.hostname = Some("oc.example.com".to_string());

        let saved = store.save(&settings).unwrap();
        assert_eq!(saved, settings);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.ends_with('\n'));
        assert!(raw.contains("\"autoStartWithWeb\": true"));

        assert_eq!(store.load(), settings);
    }
}
