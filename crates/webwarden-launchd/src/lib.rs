//! launchd による opencode web サービスの管理
//!
//! `~/Library/LaunchAgents` に LaunchAgent (plist) を書き出し、
//! `launchctl` で登録・起動・停止する。
//!
//! # 構成
//!
//! - [`ServiceRecord`]: 設定から毎回組み立てる plist の内容
//! - [`ServiceManager`]: `launchctl` 呼び出しの抽象（テストでは差し替える）
//! - [`ServiceInstaller`]: install / uninstall / reinstall / ensure_running
//!
//! # Example
//!
//! ```ignore
//! use webwarden_launchd::ServiceInstaller;
//!
//! let installer = ServiceInstaller::for_current_user()?;
//! let port = installer.ensure_running(&settings).await?;
//! ```

pub mod installer;
pub mod launchctl;
pub mod record;
pub mod resolve;
pub mod shell_env;

pub use installer::{DEFAULT_PORT, REQUIRED_ENV_KEYS, ServiceInstaller, ServiceLayout, resolve_port};
pub use launchctl::{CommandOutput, Launchctl, ServiceManager, best_effort};
pub use record::{SERVICE_LABEL, ServiceRecord, program_arguments};
pub use resolve::{OPENCODE_BIN_ENV, resolve_executable};
pub use shell_env::login_shell_path;
