//! webwarden の共通基盤
//!
//! Web サービス / トンネルの両スーパーバイザーが共有する型と部品:
//!
//! - ステータス・設定モデル ([`model`])
//! - エラー分類 ([`error`])
//! - ローカルポートの到達性チェック ([`probe`])
//! - サブプロセス出力のインクリメンタルマッチャー ([`matcher`])
//! - 単一スロットのクラッシュコールバック ([`crash`])
//! - 子プロセスの出力・終了の監視 ([`monitor`])
//! - プロセスのグレースフル停止 ([`terminate`])

pub mod crash;
pub mod error;
pub mod matcher;
pub mod model;
pub mod monitor;
pub mod probe;
pub mod terminate;

pub use crash::*;
pub use error::*;
pub use matcher::*;
pub use model::*;
pub use monitor::*;
pub use probe::*;
pub use terminate::*;
