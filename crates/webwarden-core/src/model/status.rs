use serde::{Deserialize, Serialize};
use std::fmt;

/// Web サービスの状態
///
/// ProcessSupervisor だけが遷移させる。永続化はせず、
/// 再起動後は `refresh_status` で観測から復元する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

/// トンネルプロセスの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

/// OS サービスマネージャー上のサービス定義の状態
///
/// 問い合わせのたびに計算し、キャッシュしない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceInstallState {
    NotInstalled,
    Stopped,
    Running,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TunnelStatus::Stopped => "stopped",
            TunnelStatus::Starting => "starting",
            TunnelStatus::Running => "running",
            TunnelStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ServiceInstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceInstallState::NotInstalled => "not_installed",
            ServiceInstallState::Stopped => "stopped",
            ServiceInstallState::Running => "running",
        };
        f.write_str(s)
    }
}

/// Web サービスのスナップショット
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub status: ProcessStatus,
    pub port: Option<u16>,
    pub error: Option<String>,
    pub pid: Option<u32>,
}

/// トンネルのスナップショット
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelInfo {
    pub status: TunnelStatus,
    pub public_url: Option<String>,
    pub error: Option<String>,
    pub pid: Option<u32>,
}
