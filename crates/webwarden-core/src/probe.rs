//! ローカルポートの到達性チェック
//!
//! 起動待機・ヘルス判定のすべての経路がここを通る。

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use tracing::debug;

/// 1 回の TCP 接続試行の上限
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// 到達性ポーリングの間隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(150);

/// `127.0.0.1` 上のポートを調べるプローブ
#[derive(Debug, Clone, Copy)]
pub struct PortProbe {
    connect_timeout: Duration,
    poll_interval: Duration,
}

impl Default for PortProbe {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl PortProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接続できれば true。エラー・タイムアウトはすべて false
    pub async fn is_reachable(&self, port: u16) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("Port {} is not reachable: {}", port, e);
                false
            }
            Err(_) => {
                debug!("Port {} probe timed out", port);
                false
            }
        }
    }

    /// bind できれば true（すぐに解放する）
    pub fn is_available(&self, port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
    }

    /// 到達可能になるか期限が切れるまでポーリングする
    pub async fn wait_until_reachable(&self, port: u16, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if self.is_reachable(port).await {
                return true;
            }
            sleep(self.poll_interval).await;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_port() -> u16 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_unreachable_then_reachable() {
        let probe = PortProbe::new();
        let port = free_port();

        assert!(!probe.is_reachable(port).await);
        assert!(probe.is_available(port));

        let _listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();

        assert!(probe.is_reachable(port).await);
        assert!(!probe.is_available(port));
    }

    #[tokio::test]
    async fn test_wait_until_reachable_sees_late_listener() {
        let probe = PortProbe::new();
        let port = free_port();

        let binder = tokio::spawn(async move {
            sleep(Duration::from_millis(300)).await;
            let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port))
                .await
                .unwrap();
            sleep(Duration::from_secs(2)).await;
            drop(listener);
        });

        assert!(probe.wait_until_reachable(port, Duration::from_secs(2)).await);
        binder.abort();
    }

    #[tokio::test]
    async fn test_wait_until_reachable_times_out() {
        let probe = PortProbe::new();
        let port = free_port();

        let started = Instant::now();
        assert!(
            !probe
                .wait_until_reachable(port, Duration::from_millis(400))
                .await
        );
        assert!(started.elapsed() >= Duration::from_millis(400));
    }
}
