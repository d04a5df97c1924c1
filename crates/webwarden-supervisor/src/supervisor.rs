//! Web サービスの状態機械
//!
//! `stopped → starting → running`、失敗時は `error`。終端状態は無く、
//! どの状態からでも再び start できる。

use crate::launcher::{ExitSignal, WebLauncher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{info, warn};
use webwarden_core::{
    CrashSlot, PortProbe, ProcessInfo, ProcessStatus, Result, SettingsSource, WardenError,
};
use webwarden_tunnel::{TunnelSupervisor, security_warning, should_auto_start};

/// 起動待機の上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupPolicy {
    pub startup_timeout: Duration,
    /// 出力からポートを検出できたときの待機上限
    pub fast_path_timeout: Duration,
}

impl Default for StartupPolicy {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            fast_path_timeout: Duration::from_secs(5),
        }
    }
}

/// 進行中の start の結果（エラーは文字列で共有する）
type StartOutcome = Option<std::result::Result<u16, String>>;

#[derive(Default)]
struct State {
    port: Option<u16>,
    last_error: Option<String>,
    /// stop のたびに進む。古い監視タスクの通知を捨てるために使う
    generation: u64,
    monitor: Option<AbortHandle>,
    in_flight: Option<watch::Receiver<StartOutcome>>,
}

struct Inner<L> {
    launcher: L,
    settings: Arc<dyn SettingsSource>,
    tunnel: TunnelSupervisor,
    probe: PortProbe,
    policy: StartupPolicy,
    status: watch::Sender<ProcessStatus>,
    state: Mutex<State>,
    crash: CrashSlot,
}

impl<L> Inner<L> {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ProcessStatus) {
        self.status.send_replace(status);
    }

    /// 監視中のサービスが消えた
    fn on_exit(&self, generation: u64, code: Option<i32>) {
        let crashed = {
            let mut state = self.state();
            if state.generation != generation || *self.status.borrow() != ProcessStatus::Running {
                return;
            }
            state.port = None;
            state.monitor = None;
            state.last_error = Some(
                WardenError::PrematureExit {
                    program: "opencode".to_string(),
                    code,
                }
                .to_string(),
            );
            self.set_status(ProcessStatus::Error);
            self.set_status(ProcessStatus::Stopped);
            true
        };

        if crashed {
            warn!("opencode web exited unexpectedly (code: {:?})", code);
            self.crash.fire();
        }
    }
}

enum Claim {
    Running(u16),
    Wait(watch::Receiver<StartOutcome>),
    Owner(watch::Sender<StartOutcome>),
}

/// 進行中フラグを確実に外す
struct InFlightGuard<'a, L> {
    inner: &'a Inner<L>,
    tx: watch::Sender<StartOutcome>,
}

impl<L> InFlightGuard<'_, L> {
    fn finish(&self, result: &Result<u16>) {
        let outcome = match result {
            Ok(port) => Ok(*port),
            Err(e) => Err(e.to_string()),
        };
        self.tx.send_replace(Some(outcome));
    }
}

impl<L> Drop for InFlightGuard<'_, L> {
    fn drop(&mut self) {
        self.inner.state().in_flight = None;
    }
}

/// Web サービスを 1 つだけ所有するスーパーバイザー
pub struct ProcessSupervisor<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for ProcessSupervisor<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: WebLauncher> ProcessSupervisor<L> {
    pub fn new(launcher: L, settings: Arc<dyn SettingsSource>, tunnel: TunnelSupervisor) -> Self {
        Self::with_policy(launcher, settings, tunnel, StartupPolicy::default())
    }

    pub fn with_policy(
        launcher: L,
        settings: Arc<dyn SettingsSource>,
        tunnel: TunnelSupervisor,
        policy: StartupPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                launcher,
                settings,
                tunnel,
                probe: PortProbe::new(),
                policy,
                status: watch::Sender::new(ProcessStatus::Stopped),
                state: Mutex::new(State::default()),
                crash: CrashSlot::new(),
            }),
        }
    }

    pub fn launcher(&self) -> &L {
        &self.inner.launcher
    }

    pub fn tunnel(&self) -> &TunnelSupervisor {
        &self.inner.tunnel
    }

    pub fn status(&self) -> ProcessStatus {
        *self.inner.status.borrow()
    }

    /// 状態遷移の購読
    pub fn subscribe(&self) -> watch::Receiver<ProcessStatus> {
        self.inner.status.subscribe()
    }

    pub fn port(&self) -> Option<u16> {
        self.inner.state().port
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state().last_error.clone()
    }

    pub async fn info(&self) -> ProcessInfo {
        let pid = self.inner.launcher.pid().await;
        let state = self.inner.state();
        ProcessInfo {
            status: self.status(),
            port: state.port,
            error: state.last_error.clone(),
            pid,
        }
    }

    /// 実行中にサービスが落ちたときのコールバック（1 つだけ保持、stop で外れる）
    pub fn on_crash(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.crash.set(callback);
    }

    fn claim(&self) -> Claim {
        let mut state = self.inner.state();
        if self.status() == ProcessStatus::Running {
            if let Some(port) = state.port {
                return Claim::Running(port);
            }
        }
        if let Some(rx) = &state.in_flight {
            return Claim::Wait(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        state.in_flight = Some(rx);
        Claim::Owner(tx)
    }

    /// Web サービスを起動し、到達可能になったポートを返す
    ///
    /// 実行中なら既存のポートを返す。別の start が進行中ならその結果を待つ。
    pub async fn start(&self) -> Result<u16> {
        let tx = match self.claim() {
            Claim::Running(port) => return Ok(port),
            Claim::Wait(rx) => return wait_for_outcome(rx).await,
            Claim::Owner(tx) => tx,
        };
        let guard = InFlightGuard {
            inner: &self.inner,
            tx,
        };

        let result = self.bring_up().await;
        if let Err(e) = &result {
            self.inner.state().last_error = Some(e.to_string());
            self.inner.set_status(ProcessStatus::Error);
        }
        guard.finish(&result);
        drop(guard);

        if let Ok(port) = result {
            self.maybe_start_tunnel(port);
        }
        result
    }

    async fn bring_up(&self) -> Result<u16> {
        let settings = self.inner.settings.load();
        let port = self.inner.launcher.resolve_port(&settings);

        if self.inner.probe.is_reachable(port).await {
            info!("Port {} is already serving, adopting it", port);
            let exit = self.inner.launcher.adopt().await;
            let generation = self.mark_running(port);
            if let Some(exit) = exit {
                self.monitor(generation, exit);
            }
            return Ok(port);
        }

        {
            let mut state = self.inner.state();
            state.port = None;
            state.last_error = None;
        }
        self.inner.set_status(ProcessStatus::Starting);
        info!("Starting opencode web on port {}", port);

        let launch = self.inner.launcher.launch(&settings, port).await?;
        let limit = if launch.detected_from_output {
            self.inner.policy.fast_path_timeout
        } else {
            self.inner.policy.startup_timeout
        };

        if !self
            .inner
            .probe
            .wait_until_reachable(launch.port, limit)
            .await
        {
            return Err(WardenError::StartupTimeout {
                target: "opencode web".to_string(),
                timeout_ms: limit.as_millis() as u64,
            });
        }

        let generation = self.mark_running(launch.port);
        if let Some(exit) = launch.exit {
            self.monitor(generation, exit);
        }
        info!("opencode web is running on port {}", launch.port);
        Ok(launch.port)
    }

    fn mark_running(&self, port: u16) -> u64 {
        let mut state = self.inner.state();
        state.port = Some(port);
        state.last_error = None;
        self.inner.set_status(ProcessStatus::Running);
        state.generation
    }

    fn monitor(&self, generation: u64, exit: ExitSignal) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let code = exit.await;
            inner.on_exit(generation, code);
        });

        let previous = self.inner.state().monitor.replace(task.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// 設定に従ってトンネルを裏で起動する（失敗はログのみ）
    fn maybe_start_tunnel(&self, port: u16) {
        let settings = self.inner.settings.load();
        if !should_auto_start(&settings.tunnel) {
            return;
        }
        if let Some(warning) = security_warning(&settings.tunnel, settings.web.password.as_deref())
        {
            warn!("[tunnel] {}", warning);
        }

        let tunnel = self.inner.tunnel.clone();
        tokio::spawn(async move {
            match tunnel.start(&settings.tunnel, port).await {
                Ok(url) => info!("[tunnel] Public URL: {}", url),
                Err(e) => warn!("[tunnel] Failed to auto-start: {}", e),
            }
        });
    }

    /// トンネル → サービスの順に止める。停止中に呼んでもよい
    pub async fn stop(&self) -> Result<()> {
        self.inner.tunnel.stop().await;
        self.inner.crash.clear();

        let monitor = {
            let mut state = self.inner.state();
            state.generation += 1;
            state.port = None;
            state.monitor.take()
        };
        if let Some(monitor) = monitor {
            monitor.abort();
        }

        let result = self.inner.launcher.halt().await;
        self.inner.set_status(ProcessStatus::Stopped);
        if result.is_ok() {
            self.inner.state().last_error = None;
        }
        result
    }

    pub async fn restart(&self) -> Result<u16> {
        self.stop().await?;
        self.start().await
    }

    /// 観測から状態を作り直す
    ///
    /// - サービスが動いていない → stopped
    /// - 動いているがポートに繋がらない → starting
    /// - 両方 OK → running
    pub async fn refresh_status(&self) -> Result<ProcessStatus> {
        let settings = self.inner.settings.load();
        let port = self
            .port()
            .unwrap_or_else(|| self.inner.launcher.resolve_port(&settings));

        let status = if !self.inner.launcher.is_active().await? {
            self.inner.state().port = None;
            ProcessStatus::Stopped
        } else if self.inner.probe.is_reachable(port).await {
            self.inner.state().port = Some(port);
            ProcessStatus::Running
        } else {
            self.inner.state().port = None;
            ProcessStatus::Starting
        };

        self.inner.set_status(status);
        Ok(status)
    }

    /// 設定の保存後に呼ぶ。サービス定義を最新の設定に合わせる
    pub async fn apply_settings(&self) -> Result<()> {
        let settings = self.inner.settings.load();
        self.inner.launcher.apply_settings(&settings).await
    }
}

async fn wait_for_outcome(mut rx: watch::Receiver<StartOutcome>) -> Result<u16> {
    let outcome = rx
        .wait_for(Option::is_some)
        .await
        .map(|outcome| (*outcome).clone());

    match outcome {
        Ok(Some(Ok(port))) => Ok(port),
        Ok(Some(Err(message))) => Err(WardenError::StartFailed(message)),
        _ => Err(WardenError::StartFailed(
            "進行中の起動処理が中断されました".to_string(),
        )),
    }
}
