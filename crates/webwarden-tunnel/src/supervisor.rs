//! トンネルプロセスのライフサイクル

use crate::command::{CLOUDFLARED, TunnelCommand};
use crate::policy::TunnelPolicy;
use regex::Regex;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use webwarden_core::{
    ChildHandle, CrashSlot, ProcessEvent, ProcessEvents, Result, TunnelInfo, TunnelSettings,
    TunnelStatus, WardenError, monitor_child,
};

static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error|failed|cannot|unable").expect("valid error regex"));

#[derive(Default)]
struct State {
    public_url: Option<String>,
    last_error: Option<String>,
    /// 起動したプロセスと stop のたびに進む
    generation: u64,
    child: Option<ChildHandle>,
}

struct Inner {
    policy: TunnelPolicy,
    status: watch::Sender<TunnelStatus>,
    state: Mutex<State>,
    crash: CrashSlot,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 実行中のプロセスが終了した
    fn on_exit(&self, generation: u64, code: Option<i32>) {
        let crashed = {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.child = None;

            let running = *self.status.borrow() == TunnelStatus::Running;
            if running {
                state.public_url = None;
                state.last_error = Some(
                    WardenError::PrematureExit {
                        program: CLOUDFLARED.to_string(),
                        code,
                    }
                    .to_string(),
                );
                self.status.send_replace(TunnelStatus::Error);
                self.status.send_replace(TunnelStatus::Stopped);
            }
            running
        };

        if crashed {
            warn!("cloudflared exited unexpectedly (code: {:?})", code);
            self.crash.fire();
        }
    }
}

/// cloudflared を 1 つだけ所有するスーパーバイザー
///
/// 複製はすべて同じ状態を共有する。
#[derive(Clone)]
pub struct TunnelSupervisor {
    inner: Arc<Inner>,
}

impl Default for TunnelSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelSupervisor {
    pub fn new() -> Self {
        Self::with_policy(TunnelPolicy::default())
    }

    pub fn with_policy(policy: TunnelPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                status: watch::Sender::new(TunnelStatus::Stopped),
                state: Mutex::new(State::default()),
                crash: CrashSlot::new(),
            }),
        }
    }

    pub fn status(&self) -> TunnelStatus {
        *self.inner.status.borrow()
    }

    /// 状態遷移の購読
    pub fn subscribe(&self) -> watch::Receiver<TunnelStatus> {
        self.inner.status.subscribe()
    }

    pub fn public_url(&self) -> Option<String> {
        self.inner.state().public_url.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state().last_error.clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.state().child.as_ref().and_then(ChildHandle::pid)
    }

    pub fn info(&self) -> TunnelInfo {
        let state = self.inner.state();
        TunnelInfo {
            status: self.status(),
            public_url: state.public_url.clone(),
            error: state.last_error.clone(),
            pid: state.child.as_ref().and_then(ChildHandle::pid),
        }
    }

    /// 実行中にプロセスが落ちたときのコールバック（1 つだけ保持）
    pub fn on_crash(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.crash.set(callback);
    }

    /// トンネルを起動して公開 URL を返す
    ///
    /// 実行中なら既存の URL を返し、起動中なら進行中の試行の結果を待つ。
    pub async fn start(&self, settings: &TunnelSettings, local_port: u16) -> Result<String> {
        let mut observed = TunnelStatus::Stopped;
        let claimed = self.inner.status.send_if_modified(|status| {
            observed = *status;
            match status {
                TunnelStatus::Stopped | TunnelStatus::Error => {
                    *status = TunnelStatus::Starting;
                    true
                }
                _ => false,
            }
        });

        if !claimed {
            if observed == TunnelStatus::Running {
                if let Some(url) = self.public_url() {
                    return Ok(url);
                }
            }
            return self.wait_for_start().await;
        }

        self.inner.state().last_error = None;
        info!("Starting tunnel on local port {}", local_port);

        let result = self.run_attempts(settings, local_port).await;
        if let Err(e) = &result {
            let mut state = self.inner.state();
            state.last_error = Some(e.to_string());
            self.inner.status.send_if_modified(|status| {
                if *status == TunnelStatus::Starting {
                    *status = TunnelStatus::Error;
                    true
                } else {
                    false
                }
            });
        }
        result
    }

    /// 進行中の起動が終わるのを待つ
    async fn wait_for_start(&self) -> Result<String> {
        let mut rx = self.inner.status.subscribe();
        let settled = rx
            .wait_for(|status| *status != TunnelStatus::Starting)
            .await
            .map(|status| *status);

        match (settled, self.public_url()) {
            (Ok(TunnelStatus::Running), Some(url)) => Ok(url),
            _ => Err(WardenError::StartFailed(
                self.last_error()
                    .unwrap_or_else(|| "トンネルは起動していません".to_string()),
            )),
        }
    }

    async fn run_attempts(&self, settings: &TunnelSettings, local_port: u16) -> Result<String> {
        let policy = &self.inner.policy;
        let mut last_error = None;

        for attempt in 1..=policy.max_attempts.max(1) {
            if attempt > 1 {
                let delay = policy.retry_delay(attempt - 1);
                info!(
                    "Retrying tunnel start ({}/{}) after {:?}",
                    attempt - 1,
                    policy.max_attempts - 1,
                    delay
                );
                sleep(delay).await;
            }

            // 待機中に stop された
            if self.status() != TunnelStatus::Starting {
                return Err(WardenError::StartFailed(
                    "トンネルの起動が中断されました".to_string(),
                ));
            }

            match self.try_start(settings, local_port).await {
                Ok(url) => return Ok(url),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Tunnel start attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            WardenError::StartFailed("トンネルを起動できませんでした".to_string())
        }))
    }

    /// 1 回分の試行
    async fn try_start(&self, settings: &TunnelSettings, local_port: u16) -> Result<String> {
        let command = TunnelCommand::from_settings(settings, local_port)?;

        debug!("Running: {} {}", command.program, command.display_args());
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => WardenError::Resolution {
                    program: command.program.clone(),
                    hint: "または設定の tunnel.cloudflaredPath で実行ファイルのパスを指定してください"
                        .to_string(),
                },
                _ => WardenError::Io(e),
            })?;

        let (mut events, handle) = monitor_child(child, command.matcher(), log_error_line);
        let generation = {
            let mut state = self.inner.state();
            state.generation += 1;
            state.child = Some(handle);
            state.generation
        };

        let startup_timeout = self.inner.policy.startup_timeout;
        match timeout(startup_timeout, events.next()).await {
            Ok(Some(ProcessEvent::Matched(matched))) => {
                let url = command.public_url(&matched);
                {
                    let mut state = self.inner.state();
                    if state.generation != generation {
                        return Err(WardenError::StartFailed(
                            "トンネルの起動が中断されました".to_string(),
                        ));
                    }
                    state.public_url = Some(url.clone());
                    state.last_error = None;
                    self.inner.status.send_replace(TunnelStatus::Running);
                }
                self.watch_exit(generation, events);
                info!("Tunnel is running at {}", url);
                Ok(url)
            }
            Ok(event) => {
                let code = match event {
                    Some(ProcessEvent::Exited(code)) => code,
                    _ => None,
                };
                self.release(generation);
                Err(WardenError::PrematureExit {
                    program: CLOUDFLARED.to_string(),
                    code,
                })
            }
            Err(_) => {
                warn!(
                    "Tunnel did not become ready within {:?}, tearing down",
                    startup_timeout
                );
                if let Some(mut child) = self.release(generation) {
                    child.request_stop();
                }
                Err(WardenError::StartupTimeout {
                    target: CLOUDFLARED.to_string(),
                    timeout_ms: startup_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// 実行中プロセスの終了を監視する
    fn watch_exit(&self, generation: u64, events: ProcessEvents) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let code = events.exited().await;
            inner.on_exit(generation, code);
        });
    }

    /// 指定世代のハンドルを手放す
    fn release(&self, generation: u64) -> Option<ChildHandle> {
        let mut state = self.inner.state();
        if state.generation == generation {
            state.child.take()
        } else {
            None
        }
    }

    /// 停止する。何度呼んでもよい
    pub async fn stop(&self) {
        self.inner.crash.clear();

        let child = {
            let mut state = self.inner.state();
            state.generation += 1;
            state.public_url = None;
            state.last_error = None;
            state.child.take()
        };
        self.inner.status.send_replace(TunnelStatus::Stopped);

        if let Some(child) = child {
            info!("Stopping tunnel");
            child.stop().await;
        }
    }
}

fn log_error_line(line: &str) {
    if ERROR_LINE.is_match(line) {
        warn!("[cloudflared] {}", line.trim());
    }
}
