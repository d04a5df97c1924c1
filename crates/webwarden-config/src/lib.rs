pub mod error;
pub mod opencode;
pub mod settings;

pub use error::*;
pub use opencode::*;
pub use settings::*;

use std::path::PathBuf;

/// 設定ファイルパスを直接指定する環境変数
pub const SETTINGS_PATH_ENV: &str = "WARDEN_SETTINGS_PATH";

/// `~/.config` を返す
///
/// macOS でも `~/Library/Application Support` ではなく XDG 形式のパスを使う。
pub fn xdg_config_home() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(home.join(".config"))
}

/// ラッパー設定ディレクトリ (`~/.config/opencode-wrapper`)
pub fn get_wrapper_dir() -> Result<PathBuf> {
    Ok(xdg_config_home()?.join("opencode-wrapper"))
}

/// ラッパー設定ファイルのパス
///
/// 以下の優先順位:
/// 1. 環境変数 WARDEN_SETTINGS_PATH
/// 2. ~/.config/opencode-wrapper/settings.json
pub fn settings_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(get_wrapper_dir()?.join("settings.json"))
}
