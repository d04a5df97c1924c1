use thiserror::Error;
use webwarden_core::WardenError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for WardenError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ConfigDirNotFound => WardenError::HomeDirNotFound,
            ConfigError::Io(e) => WardenError::Io(e),
            ConfigError::Json(e) => WardenError::Json(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
