//! 子プロセスとして直接起動する
//!
//! launchd を使えない環境（Linux など）向け。起動後の出力から
//! `host:port` を探し、見つからなくても listening / ready / server の
//! いずれかが出れば設定のポートで待機する。

use crate::launcher::{Launch, WebLauncher};
use async_trait::async_trait;
use regex::Regex;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use webwarden_config::OpencodeConfig;
use webwarden_core::{
    ChildHandle, OutputMatcher, ProcessEvent, Result, WardenError, WrapperSettings, monitor_child,
};
use webwarden_launchd::{OPENCODE_BIN_ENV, program_arguments, resolve_executable, resolve_port};

/// 出力から起動の手がかりを得るまでの上限
pub const DETECT_TIMEOUT: Duration = Duration::from_secs(30);

const PROGRAM: &str = "opencode";

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:localhost|\b\d{1,3}(?:\.\d{1,3}){3}|\[[0-9a-f:]*\]):(\d{1,5})\b")
        .expect("valid address regex")
});

static READY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:listening|ready|server)\b").expect("valid marker regex")
});

/// opencode web を子プロセスとして所有する
pub struct DirectLauncher {
    executable: Option<PathBuf>,
    opencode_config: Option<OpencodeConfig>,
    detect_timeout: Duration,
    child: Mutex<Option<ChildHandle>>,
}

impl Default for DirectLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectLauncher {
    pub fn new() -> Self {
        Self {
            executable: None,
            opencode_config: OpencodeConfig::default_location().ok(),
            detect_timeout: DETECT_TIMEOUT,
            child: Mutex::new(None),
        }
    }

    /// 実行ファイルを固定する（OPENCODE_BIN / PATH 探索を行わない）
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn with_opencode_config(mut self, config: Option<OpencodeConfig>) -> Self {
        self.opencode_config = config;
        self
    }

    pub fn with_detect_timeout(mut self, limit: Duration) -> Self {
        self.detect_timeout = limit;
        self
    }

    fn take_child(&self) -> Option<ChildHandle> {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn executable(&self) -> Result<PathBuf> {
        match &self.executable {
            Some(executable) => Ok(executable.clone()),
            None => resolve_executable(PROGRAM, OPENCODE_BIN_ENV, None).await,
        }
    }
}

#[async_trait]
impl WebLauncher for DirectLauncher {
    fn resolve_port(&self, settings: &WrapperSettings) -> u16 {
        resolve_port(settings, self.opencode_config.as_ref())
    }

    async fn launch(&self, settings: &WrapperSettings, port: u16) -> Result<Launch> {
        // 二重起動しない
        self.halt().await?;

        let executable = self.executable().await?;
        let args = program_arguments(&executable, &settings.web, port);

        let mut command = Command::new(&executable);
        command
            .args(&args[1..])
            .env("BROWSER", "none")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(username) = &settings.web.username {
            command.env("OPENCODE_SERVER_USERNAME", username);
        }
        if let Some(password) = &settings.web.password {
            command.env("OPENCODE_SERVER_PASSWORD", password);
        }

        debug!("Running: {}", args.join(" "));
        let child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => WardenError::Resolution {
                program: executable.display().to_string(),
                hint: format!("または環境変数 {OPENCODE_BIN_ENV} で実行ファイルのパスを指定してください"),
            },
            _ => WardenError::Io(e),
        })?;

        let matcher = OutputMatcher::new([Regex::clone(&ADDRESS), Regex::clone(&READY_MARKER)]);
        let (mut events, handle) = monitor_child(child, matcher, |line| {
            debug!("[opencode] {}", line);
        });
        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        match timeout(self.detect_timeout, events.next()).await {
            Ok(Some(ProcessEvent::Matched(matched))) => {
                let detected = matched
                    .capture
                    .as_deref()
                    .and_then(|p| p.parse::<u16>().ok())
                    .filter(|p| *p != 0);
                match detected {
                    Some(detected) => info!("opencode reported port {}", detected),
                    None => info!("opencode reported readiness ({})", matched.text.trim()),
                }
                Ok(Launch {
                    port: detected.unwrap_or(port),
                    detected_from_output: detected.is_some(),
                    exit: Some(Box::pin(events.exited())),
                })
            }
            Ok(event) => {
                let code = match event {
                    Some(ProcessEvent::Exited(code)) => code,
                    _ => None,
                };
                self.take_child();
                Err(WardenError::PrematureExit {
                    program: PROGRAM.to_string(),
                    code,
                })
            }
            Err(_) => {
                warn!(
                    "opencode produced no startup output within {:?}",
                    self.detect_timeout
                );
                if let Some(child) = self.take_child() {
                    child.stop().await;
                }
                Err(WardenError::StartupTimeout {
                    target: "opencode web".to_string(),
                    timeout_ms: self.detect_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn halt(&self) -> Result<()> {
        if let Some(child) = self.take_child() {
            info!("Stopping opencode web");
            child.stop().await;
        }
        Ok(())
    }

    async fn is_active(&self) -> Result<bool> {
        Ok(self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|child| !child.is_finished()))
    }

    async fn pid(&self) -> Option<u32> {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|child| !child.is_finished())
            .and_then(ChildHandle::pid)
    }
}
