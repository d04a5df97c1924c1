use crate::context::Context;
use colored::Colorize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;
use webwarden_tunnel::should_auto_start;

/// クラッシュ後の再起動の待ち時間。使い切ったら諦める
const RESTART_DELAYS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

enum Crash {
    Web,
    Tunnel,
}

/// フォアグラウンドで常駐する
///
/// Web サービスが落ちたら起動し直し、トンネルが落ちたら張り直す。
/// Ctrl-C で両方を止めて終了する。
pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    let supervisor = &ctx.supervisor;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let web_tx = tx.clone();
    supervisor.on_crash(move || {
        let _ = web_tx.send(Crash::Web);
    });
    supervisor.tunnel().on_crash(move || {
        let _ = tx.send(Crash::Tunnel);
    });

    println!("{}", "opencode web を起動中...".yellow());
    let port = supervisor.start().await?;
    println!("{}", "✓ opencode web を起動しました".green().bold());
    println!("  URL: {}", ctx.local_url(port).cyan());
    println!("{}", "Ctrl-C で停止します".dimmed());

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            crash = rx.recv() => match crash {
                Some(Crash::Web) => {
                    if let Err(e) = restart_web(ctx).await {
                        break Err(e);
                    }
                }
                Some(Crash::Tunnel) => restart_tunnel(ctx).await,
                None => break Ok(()),
            },
        }
    };

    println!();
    println!("{}", "停止中...".yellow());
    supervisor.stop().await?;
    println!("{}", "✓ 停止しました".green().bold());
    result
}

async fn restart_web(ctx: &Context) -> anyhow::Result<()> {
    let reason = ctx
        .supervisor
        .last_error()
        .unwrap_or_else(|| "不明".to_string());
    println!(
        "{}",
        format!("⚠ opencode web が終了しました: {}", reason).yellow()
    );

    let mut last_error = None;
    for delay in RESTART_DELAYS {
        tokio::time::sleep(delay).await;
        match ctx.supervisor.start().await {
            Ok(port) => {
                println!(
                    "{}",
                    format!("✓ opencode web を再起動しました (port {})", port).green()
                );
                return Ok(());
            }
            Err(e) => {
                warn!("Restart attempt failed: {}", e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => anyhow::Error::new(e).context("opencode web を再起動できませんでした"),
        None => anyhow::anyhow!("opencode web を再起動できませんでした"),
    })
}

async fn restart_tunnel(ctx: &Context) {
    let settings = ctx.settings();
    let tunnel = ctx.supervisor.tunnel();
    println!(
        "{}",
        format!(
            "⚠ トンネルが終了しました: {}",
            tunnel.last_error().unwrap_or_else(|| "不明".to_string())
        )
        .yellow()
    );

    let Some(port) = ctx.supervisor.port() else {
        return;
    };
    if !should_auto_start(&settings.tunnel) {
        return;
    }

    match tunnel.start(&settings.tunnel, port).await {
        Ok(url) => println!("{}", format!("✓ トンネルを張り直しました: {}", url).green()),
        Err(e) => println!(
            "{}",
            format!("✗ トンネルを張り直せませんでした: {}", e).red()
        ),
    }
}
