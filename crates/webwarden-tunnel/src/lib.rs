//! cloudflared トンネルの監視
//!
//! Web サービスのローカルポートを公開するトンネルプロセスを 1 つだけ持ち、
//! 起動（リトライ・公開 URL の抽出）、停止、クラッシュ通知を扱う。

pub mod command;
pub mod policy;
pub mod supervisor;

pub use command::{CLOUDFLARED, TOKEN_ENV, TunnelCommand, resolve_token};
pub use policy::{SECURITY_WARNING, TunnelPolicy, security_warning, should_auto_start};
pub use supervisor::TunnelSupervisor;
