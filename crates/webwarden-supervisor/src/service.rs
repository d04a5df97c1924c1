//! launchd 経由の起動

use crate::launcher::{ExitSignal, Launch, WebLauncher};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use webwarden_core::{Result, ServiceInstallState, WrapperSettings};
use webwarden_launchd::{Launchctl, ServiceInstaller, ServiceManager};

/// クラッシュ検出のためのポーリング間隔
pub const CRASH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// LaunchAgent として Web サービスを動かす
pub struct ServiceLauncher<M = Launchctl> {
    installer: Arc<ServiceInstaller<M>>,
    poll_interval: Duration,
}

impl ServiceLauncher<Launchctl> {
    pub fn for_current_user() -> Result<Self> {
        Ok(Self::new(ServiceInstaller::for_current_user()?))
    }
}

impl<M: ServiceManager + 'static> ServiceLauncher<M> {
    pub fn new(installer: ServiceInstaller<M>) -> Self {
        Self {
            installer: Arc::new(installer),
            poll_interval: CRASH_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn installer(&self) -> &ServiceInstaller<M> {
        &self.installer
    }

    /// サービスが running でなくなるまで待つ
    fn exit_signal(&self) -> ExitSignal {
        let installer = Arc::clone(&self.installer);
        let interval = self.poll_interval;
        Box::pin(async move {
            loop {
                sleep(interval).await;
                match installer.status().await {
                    Ok(ServiceInstallState::Running) => {}
                    Ok(state) => {
                        debug!("LaunchAgent is no longer running ({})", state);
                        return None;
                    }
                    Err(e) => debug!("Failed to poll LaunchAgent status: {}", e),
                }
            }
        })
    }
}

#[async_trait]
impl<M: ServiceManager + 'static> WebLauncher for ServiceLauncher<M> {
    fn resolve_port(&self, settings: &WrapperSettings) -> u16 {
        self.installer.resolve_port(settings)
    }

    async fn launch(&self, settings: &WrapperSettings, _port: u16) -> Result<Launch> {
        let port = self.installer.ensure_running(settings).await?;
        Ok(Launch {
            port,
            detected_from_output: false,
            exit: Some(self.exit_signal()),
        })
    }

    async fn halt(&self) -> Result<()> {
        // KeepAlive のため launchd が再起動することがある
        self.installer.stop().await
    }

    async fn is_active(&self) -> Result<bool> {
        Ok(self.installer.status().await? == ServiceInstallState::Running)
    }

    async fn pid(&self) -> Option<u32> {
        match self.installer.pid().await {
            Ok(pid) => pid,
            Err(e) => {
                warn!("Failed to query LaunchAgent pid: {}", e);
                None
            }
        }
    }

    /// 自分の LaunchAgent が動いているならその終了も監視する
    async fn adopt(&self) -> Option<ExitSignal> {
        match self.installer.status().await {
            Ok(ServiceInstallState::Running) => Some(self.exit_signal()),
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to query LaunchAgent status: {}", e);
                None
            }
        }
    }

    /// インストール済みなら定義を作り直す
    async fn apply_settings(&self, settings: &WrapperSettings) -> Result<()> {
        if self.installer.status().await? == ServiceInstallState::NotInstalled {
            return Ok(());
        }
        info!("Settings changed, reinstalling LaunchAgent");
        self.installer.reinstall(settings).await
    }
}
