//! LaunchAgent のインストール・状態確認
//!
//! すべての変更操作は「丸ごと置き換え」で、前回の実行が残した状態に対して
//! 呼ばれても成立する。install は必ず先に bootout してから bootstrap する。

use crate::launchctl::{Launchctl, ServiceManager, best_effort};
use crate::record::{SERVICE_LABEL, ServiceRecord};
use crate::resolve::{OPENCODE_BIN_ENV, resolve_executable};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::info;
use webwarden_config::OpencodeConfig;
use webwarden_core::{Result, ServiceInstallState, WardenError, WrapperSettings};

/// どこにも指定がない場合のポート
pub const DEFAULT_PORT: u16 = 4096;

/// 後のバージョンで追加された必須の環境変数
///
/// インストール済みの plist にこれらが無ければ再インストールする。
pub const REQUIRED_ENV_KEYS: &[&str] = &["BROWSER", "PATH"];

static PID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpid\s*=\s*(\d+)").expect("valid pid regex"));

/// ポートの決定
///
/// 1. 設定のポート
/// 2. opencode 自身の設定ファイルのポート
/// 3. DEFAULT_PORT
///
/// ラッパー設定がラップ対象の設定で上書きされないよう、この順序を守ること。
pub fn resolve_port(settings: &WrapperSettings, opencode_config: Option<&OpencodeConfig>) -> u16 {
    settings
        .web
        .port
        .filter(|p| *p != 0)
        .or_else(|| opencode_config.and_then(OpencodeConfig::port))
        .unwrap_or(DEFAULT_PORT)
}

/// plist とログの配置
#[derive(Debug, Clone)]
pub struct ServiceLayout {
    pub label: String,
    pub plist_path: PathBuf,
    pub log_dir: PathBuf,
}

impl ServiceLayout {
    /// `~/Library/LaunchAgents` と `~/Library/Logs/opencode-web`
    pub fn user_default() -> Result<Self> {
        let home = dirs::home_dir().ok_or(WardenError::HomeDirNotFound)?;
        Ok(Self::under(home.join("Library")))
    }

    /// `<root>/LaunchAgents` と `<root>/Logs/opencode-web`
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            label: SERVICE_LABEL.to_string(),
            plist_path: root
                .join("LaunchAgents")
                .join(format!("{SERVICE_LABEL}.plist")),
            log_dir: root.join("Logs").join("opencode-web"),
        }
    }
}

/// LaunchAgent に渡す PATH の決め方
#[derive(Debug, Clone)]
enum PathEnv {
    LoginShell,
    Fixed(String),
}

pub struct ServiceInstaller<M = Launchctl> {
    manager: M,
    layout: ServiceLayout,
    domain: String,
    executable: Option<PathBuf>,
    opencode_config: Option<OpencodeConfig>,
    path_env: PathEnv,
}

impl ServiceInstaller<Launchctl> {
    /// ログイン中ユーザーの GUI ドメインで launchctl を使う
    pub fn for_current_user() -> Result<Self> {
        let uid = nix::unistd::getuid();
        let installer = Self::new(
            Launchctl,
            ServiceLayout::user_default()?,
            format!("gui/{uid}"),
        );
        Ok(match OpencodeConfig::default_location() {
            Ok(config) => installer.with_opencode_config(config),
            Err(_) => installer,
        })
    }
}

impl<M: ServiceManager> ServiceInstaller<M> {
    pub fn new(manager: M, layout: ServiceLayout, domain: impl Into<String>) -> Self {
        Self {
            manager,
            layout,
            domain: domain.into(),
            executable: None,
            opencode_config: None,
            path_env: PathEnv::LoginShell,
        }
    }

    /// 実行ファイルを固定する（OPENCODE_BIN / PATH 探索を行わない）
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    /// ポート決定に使う opencode 自身の設定
    pub fn with_opencode_config(mut self, config: OpencodeConfig) -> Self {
        self.opencode_config = Some(config);
        self
    }

    /// LaunchAgent に渡す PATH を固定する
    pub fn with_path_env(mut self, path: impl Into<String>) -> Self {
        self.path_env = PathEnv::Fixed(path.into());
        self
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn layout(&self) -> &ServiceLayout {
        &self.layout
    }

    pub fn plist_path(&self) -> &Path {
        &self.layout.plist_path
    }

    pub fn log_dir(&self) -> &Path {
        &self.layout.log_dir
    }

    /// `gui/<uid>/<label>`
    pub fn service_target(&self) -> String {
        format!("{}/{}", self.domain, self.layout.label)
    }

    pub fn resolve_port(&self, settings: &WrapperSettings) -> u16 {
        resolve_port(settings, self.opencode_config.as_ref())
    }

    pub async fn status(&self) -> Result<ServiceInstallState> {
        if !fs::try_exists(&self.layout.plist_path).await? {
            return Ok(ServiceInstallState::NotInstalled);
        }

        let output = self.manager.run(&["print", &self.service_target()]).await?;
        if !output.success() {
            return Ok(ServiceInstallState::Stopped);
        }

        if PID_PATTERN.is_match(&output.stdout) {
            Ok(ServiceInstallState::Running)
        } else {
            Ok(ServiceInstallState::Stopped)
        }
    }

    /// launchd が報告する PID（停止中・未インストールなら None）
    pub async fn pid(&self) -> Result<Option<u32>> {
        if !fs::try_exists(&self.layout.plist_path).await? {
            return Ok(None);
        }

        let output = self.manager.run(&["print", &self.service_target()]).await?;
        if !output.success() {
            return Ok(None);
        }

        Ok(PID_PATTERN
            .captures(&output.stdout)
            .and_then(|caps| caps[1].parse().ok()))
    }

    /// 現在の設定から定義を組み立てる
    pub async fn build_record(&self, settings: &WrapperSettings) -> Result<ServiceRecord> {
        let path_env = match &self.path_env {
            PathEnv::Fixed(path) => path.clone(),
            PathEnv::LoginShell => crate::shell_env::login_shell_path().await,
        };

        let executable = match &self.executable {
            Some(executable) => executable.clone(),
            None => resolve_executable("opencode", OPENCODE_BIN_ENV, Some(&path_env)).await?,
        };

        Ok(ServiceRecord::new(
            self.layout.label.clone(),
            &executable,
            &settings.web,
            self.resolve_port(settings),
            Some(&path_env),
            &self.layout.log_dir,
        ))
    }

    /// 定義を書き出して登録し直す
    pub async fn install(&self, settings: &WrapperSettings) -> Result<()> {
        let record = self.build_record(settings).await?;

        if let Some(parent) = self.layout.plist_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::create_dir_all(&self.layout.log_dir).await?;
        fs::write(&self.layout.plist_path, record.to_plist()).await?;

        let plist = self.layout.plist_path.to_string_lossy().to_string();
        let target = self.service_target();

        best_effort(
            "launchctl bootout",
            self.manager.run(&["bootout", &self.domain, &plist]).await,
        );

        self.manager
            .run(&["bootstrap", &self.domain, &plist])
            .await?
            .check("launchctl bootstrap")?;

        best_effort(
            "launchctl enable",
            self.manager.run(&["enable", &target]).await,
        );

        best_effort(
            "launchctl kickstart",
            self.manager.run(&["kickstart", "-k", &target]).await,
        );

        info!("Installed LaunchAgent {}", self.layout.plist_path.display());
        Ok(())
    }

    pub async fn uninstall(&self) -> Result<()> {
        if !fs::try_exists(&self.layout.plist_path).await? {
            return Ok(());
        }

        let plist = self.layout.plist_path.to_string_lossy().to_string();
        best_effort(
            "launchctl bootout",
            self.manager.run(&["bootout", &self.domain, &plist]).await,
        );

        match fs::remove_file(&self.layout.plist_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!("Uninstalled LaunchAgent {}", self.layout.plist_path.display());
        Ok(())
    }

    /// launchd は引数の差し替えに対応しないため、変更は必ずこれで行う
    pub async fn reinstall(&self, settings: &WrapperSettings) -> Result<()> {
        self.uninstall().await?;
        self.install(settings).await
    }

    /// インストール済みのサービスを再起動する
    pub async fn start(&self) -> Result<()> {
        if self.status().await? == ServiceInstallState::NotInstalled {
            return Err(WardenError::Configuration(
                "サービスがインストールされていません。先に install を実行してください".to_string(),
            ));
        }

        self.manager
            .run(&["kickstart", "-k", &self.service_target()])
            .await?
            .check("launchctl kickstart")?;
        Ok(())
    }

    /// SIGTERM を送る。未インストールなら何もしない
    pub async fn stop(&self) -> Result<()> {
        if self.status().await? == ServiceInstallState::NotInstalled {
            return Ok(());
        }

        best_effort(
            "launchctl kill",
            self.manager
                .run(&["kill", "SIGTERM", &self.service_target()])
                .await,
        );
        Ok(())
    }

    /// 古い定義に必須の環境変数が欠けているか
    pub async fn needs_migration(&self) -> Result<bool> {
        let plist = match fs::read_to_string(&self.layout.plist_path).await {
            Ok(plist) => plist,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        Ok(REQUIRED_ENV_KEYS
            .iter()
            .any(|key| !plist.contains(&format!("<key>{key}</key>"))))
    }

    /// 実行中の状態に揃え、使うポートを返す
    pub async fn ensure_running(&self, settings: &WrapperSettings) -> Result<u16> {
        let port = self.resolve_port(settings);

        let state = self.status().await?;
        if state != ServiceInstallState::NotInstalled && self.needs_migration().await? {
            info!("LaunchAgent definition is outdated, reinstalling");
            self.reinstall(settings).await?;
            return Ok(port);
        }

        match state {
            ServiceInstallState::NotInstalled => {
                info!("LaunchAgent not installed, installing");
                self.install(settings).await?;
            }
            ServiceInstallState::Stopped => {
                info!("LaunchAgent stopped, restarting");
                self.start().await?;
            }
            ServiceInstallState::Running => {}
        }

        Ok(port)
    }
}
