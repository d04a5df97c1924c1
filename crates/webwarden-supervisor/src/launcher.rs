//! Launcher abstraction for the web service

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use webwarden_core::{Result, WrapperSettings};

/// Resolves once the launched service is observed to have gone away.
///
/// Carries the exit code when the launcher knows it.
pub type ExitSignal = BoxFuture<'static, Option<i32>>;

/// Outcome of a successful launch request
pub struct Launch {
    /// Port the service is expected to listen on
    pub port: u16,
    /// Whether the port was read from the service's own output
    pub detected_from_output: bool,
    /// Crash detection for this launch
    pub exit: Option<ExitSignal>,
}

impl std::fmt::Debug for Launch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launch")
            .field("port", &self.port)
            .field("detected_from_output", &self.detected_from_output)
            .field("exit", &self.exit.is_some())
            .finish()
    }
}

/// How the web service is brought up and torn down
///
/// Implementations own the service instance; the supervisor owns the
/// status machine and readiness probing.
#[async_trait]
pub trait WebLauncher: Send + Sync + 'static {
    /// Desired port for the given settings
    fn resolve_port(&self, settings: &WrapperSettings) -> u16;

    /// Start (or reconcile) the service. Returns before readiness is confirmed.
    async fn launch(&self, settings: &WrapperSettings, port: u16) -> Result<Launch>;

    /// Stop the service. Must be safe when nothing is running.
    async fn halt(&self) -> Result<()>;

    /// Whether the service is running at the launcher level
    async fn is_active(&self) -> Result<bool>;

    /// Process id, if known
    async fn pid(&self) -> Option<u32>;

    /// The port was already serving before any launch.
    ///
    /// Returns crash detection when the serving instance is one this launcher
    /// manages, `None` for a foreign process.
    async fn adopt(&self) -> Option<ExitSignal> {
        None
    }

    /// Settings were saved; bring the launcher's own definition up to date
    async fn apply_settings(&self, _settings: &WrapperSettings) -> Result<()> {
        Ok(())
    }
}
