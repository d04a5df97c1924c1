//! 子プロセスの出力と終了の監視
//!
//! プロセスごとにドライバータスクを 1 つ立てる。stdout / stderr をチャンク単位で
//! 読んで [`OutputMatcher`] に渡し、最初のマッチと終了をイベントとして送る。
//! マッチ後に届いた出力も読み続ける（行フックには渡す）。

use crate::matcher::{OutputMatch, OutputMatcher};
use crate::terminate::{GRACEFUL_STOP_TIMEOUT, terminate_child};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// 出力が初めてルールにマッチした
    Matched(OutputMatch),
    /// プロセスが終了した（シグナル終了なら None）
    Exited(Option<i32>),
}

/// ドライバーから届くイベントの受信側
#[derive(Debug)]
pub struct ProcessEvents {
    rx: mpsc::Receiver<ProcessEvent>,
}

impl ProcessEvents {
    pub async fn next(&mut self) -> Option<ProcessEvent> {
        self.rx.recv().await
    }

    /// 終了まで待って終了コードを返す。マッチ通知は読み捨てる
    pub async fn exited(mut self) -> Option<i32> {
        while let Some(event) = self.rx.recv().await {
            if let ProcessEvent::Exited(code) = event {
                return code;
            }
        }
        None
    }
}

/// 監視中プロセスの停止用ハンドル
#[derive(Debug)]
pub struct ChildHandle {
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl ChildHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// ドライバーが終了済みか（= プロセスが回収済み）
    pub fn is_finished(&self) -> bool {
        self.driver.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// 停止を要求する（待たない）
    pub fn request_stop(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }

    /// SIGTERM → SIGKILL で停止し、回収まで待つ
    pub async fn stop(mut self) {
        self.request_stop();
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                debug!("Process driver ended abnormally: {}", e);
            }
        }
    }
}

/// `child` の監視を始める
///
/// stdout / stderr は `Stdio::piped()` で起動しておくこと。
/// `on_line` は出力の各行で呼ばれる（ログ用）。
pub fn monitor_child(
    mut child: Child,
    matcher: OutputMatcher,
    on_line: impl Fn(&str) + Send + 'static,
) -> (ProcessEvents, ChildHandle) {
    let (events_tx, events_rx) = mpsc::channel(4);
    let (kill_tx, kill_rx) = oneshot::channel();
    let pid = child.id();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let driver = tokio::spawn(drive(
        child, stdout, stderr, matcher, on_line, events_tx, kill_rx,
    ));

    (
        ProcessEvents { rx: events_rx },
        ChildHandle {
            pid,
            kill: Some(kill_tx),
            driver: Some(driver),
        },
    )
}

async fn drive<O, E>(
    mut child: Child,
    mut stdout: Option<O>,
    mut stderr: Option<E>,
    mut matcher: OutputMatcher,
    on_line: impl Fn(&str),
    events: mpsc::Sender<ProcessEvent>,
    mut kill_rx: oneshot::Receiver<()>,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut killed = None;

    while stdout.is_some() || stderr.is_some() {
        let chunk = tokio::select! {
            chunk = read_chunk(&mut stdout) => chunk,
            chunk = read_chunk(&mut stderr) => chunk,
            Ok(()) = &mut kill_rx => {
                killed = Some(terminate_child(&mut child, GRACEFUL_STOP_TIMEOUT).await);
                break;
            }
        };

        let Some(chunk) = chunk else { continue };
        for line in String::from_utf8_lossy(&chunk).lines() {
            on_line(line);
        }
        if let Some(matched) = matcher.feed(&chunk) {
            let _ = events.send(ProcessEvent::Matched(matched)).await;
        }
    }

    let status = match killed {
        Some(status) => status,
        None => tokio::select! {
            status = child.wait() => status.ok(),
            Ok(()) = &mut kill_rx => terminate_child(&mut child, GRACEFUL_STOP_TIMEOUT).await,
        },
    };

    let code = status.and_then(|s| s.code());
    debug!("Monitored process exited (code: {:?})", code);
    let _ = events.send(ProcessEvent::Exited(code)).await;
}

/// 1 チャンク読む。EOF・エラーでストリームを閉じ、閉じたストリームは待ち続ける
async fn read_chunk<R: AsyncRead + Unpin>(stream: &mut Option<R>) -> Option<Vec<u8>> {
    let Some(reader) = stream.as_mut() else {
        return std::future::pending().await;
    };
    let mut buf = vec![0u8; READ_CHUNK];
    match reader.read(&mut buf).await {
        Ok(0) | Err(_) => {
            *stream = None;
            None
        }
        Ok(n) => {
            buf.truncate(n);
            Some(buf)
        }
    }
}
