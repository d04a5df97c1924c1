use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// SIGTERM から SIGKILL へ切り替えるまでの猶予
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// 子プロセスをグレースフルに停止する
///
/// 1. SIGTERM を送信
/// 2. `grace` の間終了を待つ
/// 3. まだ生きていれば SIGKILL
pub async fn terminate_child(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    let Some(pid) = child.id() else {
        // 既に回収済み
        return child.try_wait().ok().flatten();
    };

    info!("Sending SIGTERM to process {}", pid);
    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!("Failed to send SIGTERM to {}: {}", pid, e);
    }

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            info!("Process {} exited gracefully", pid);
            Some(status)
        }
        Ok(Err(e)) => {
            debug!("Failed to wait for process {}: {}", pid, e);
            None
        }
        Err(_) => {
            warn!("Timeout reached. Sending SIGKILL to process {}", pid);
            if let Err(e) = child.kill().await {
                debug!("Failed to kill process {}: {}", pid, e);
            }
            child.try_wait().ok().flatten()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_terminate_sleeping_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();

        let status = terminate_child(&mut child, Duration::from_secs(2)).await;
        assert!(status.is_some());
        assert!(!status.unwrap().success());
    }

    #[tokio::test]
    async fn test_escalates_to_sigkill() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30")
            .spawn()
            .unwrap();

        // trap が設定されるまで待つ
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = terminate_child(&mut child, Duration::from_millis(300)).await;
        assert!(status.is_some());
    }
}
