//! コマンド共通の組み立て

use async_trait::async_trait;
use std::sync::Arc;
use webwarden_config::SettingsStore;
use webwarden_core::{Result, WrapperSettings};
use webwarden_supervisor::{
    DirectLauncher, ExitSignal, Launch, ProcessSupervisor, ServiceLauncher, WebLauncher,
};
use webwarden_tunnel::TunnelSupervisor;

/// 実行時に選ぶ起動方法
pub enum Launcher {
    Service(ServiceLauncher),
    Direct(DirectLauncher),
}

impl Launcher {
    /// macOS では launchd、それ以外と `--direct` では子プロセス
    pub fn select(direct: bool) -> Result<Self> {
        if direct || !cfg!(target_os = "macos") {
            Ok(Self::Direct(DirectLauncher::new()))
        } else {
            Ok(Self::Service(ServiceLauncher::for_current_user()?))
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct(_))
    }
}

#[async_trait]
impl WebLauncher for Launcher {
    fn resolve_port(&self, settings: &WrapperSettings) -> u16 {
        match self {
            Self::Service(l) => l.resolve_port(settings),
            Self::Direct(l) => l.resolve_port(settings),
        }
    }

    async fn launch(&self, settings: &WrapperSettings, port: u16) -> Result<Launch> {
        match self {
            Self::Service(l) => l.launch(settings, port).await,
            Self::Direct(l) => l.launch(settings, port).await,
        }
    }

    async fn halt(&self) -> Result<()> {
        match self {
            Self::Service(l) => l.halt().await,
            Self::Direct(l) => l.halt().await,
        }
    }

    async fn is_active(&self) -> Result<bool> {
        match self {
            Self::Service(l) => l.is_active().await,
            Self::Direct(l) => l.is_active().await,
        }
    }

    async fn pid(&self) -> Option<u32> {
        match self {
            Self::Service(l) => l.pid().await,
            Self::Direct(l) => l.pid().await,
        }
    }

    async fn adopt(&self) -> Option<ExitSignal> {
        match self {
            Self::Service(l) => l.adopt().await,
            Self::Direct(l) => l.adopt().await,
        }
    }

    async fn apply_settings(&self, settings: &WrapperSettings) -> Result<()> {
        match self {
            Self::Service(l) => l.apply_settings(settings).await,
            Self::Direct(l) => l.apply_settings(settings).await,
        }
    }
}

pub struct Context {
    pub store: Arc<SettingsStore>,
    pub supervisor: ProcessSupervisor<Launcher>,
}

impl Context {
    pub fn new(direct: bool) -> anyhow::Result<Self> {
        let store = Arc::new(SettingsStore::from_default_location()?);
        let supervisor = ProcessSupervisor::new(
            Launcher::select(direct)?,
            store.clone(),
            TunnelSupervisor::new(),
        );
        Ok(Self { store, supervisor })
    }

    pub fn settings(&self) -> WrapperSettings {
        self.store.load()
    }

    pub fn launcher(&self) -> &Launcher {
        self.supervisor.launcher()
    }

    /// launchd を使うコマンドのための前提チェック
    pub fn service(&self) -> anyhow::Result<&ServiceLauncher> {
        match self.launcher() {
            Launcher::Service(service) => Ok(service),
            Launcher::Direct(_) => Err(anyhow::anyhow!(
                "LaunchAgent は macOS でのみ利用できます（--direct とは併用できません）"
            )),
        }
    }

    /// ブラウザで開く URL
    pub fn local_url(&self, port: u16) -> String {
        let settings = self.settings();
        let host = match settings.web.hostname.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1",
            host => host,
        };
        format!("http://{host}:{port}")
    }
}
