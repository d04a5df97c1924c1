//! opencode web サービスの監視
//!
//! [`ProcessSupervisor`] が Web サービスを希望状態（起動済み・到達可能）に揃え、
//! 起動後は設定に応じてトンネルも起動する。サービスの実体の起こし方は
//! [`WebLauncher`] で差し替える:
//!
//! - [`ServiceLauncher`]: launchd の LaunchAgent として登録・起動（macOS の既定）
//! - [`DirectLauncher`]: 子プロセスとして直接起動し、出力からポートを検出

pub mod direct;
pub mod launcher;
pub mod service;
pub mod supervisor;

pub use direct::DirectLauncher;
pub use launcher::{ExitSignal, Launch, WebLauncher};
pub use service::ServiceLauncher;
pub use supervisor::{ProcessSupervisor, StartupPolicy};
