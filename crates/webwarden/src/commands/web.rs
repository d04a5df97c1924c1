use super::tunnel::mode_label;
use crate::context::{Context, Launcher};
use colored::Colorize;
use webwarden_core::ProcessStatus;
use webwarden_supervisor::WebLauncher;
use webwarden_tunnel::should_auto_start;

/// plist は常に KeepAlive 付きで書き出される
const KEEP_ALIVE_HINT: &str =
    "ℹ KeepAlive により launchd が再起動することがあります。完全に止めるには warden service uninstall";

const DIRECT_STOP_HINT: &str = "ℹ 直接起動したプロセスは warden run を Ctrl-C で停止してください";

/// stop の後に添える注意書き
fn stop_hint(launcher: &Launcher) -> &'static str {
    match launcher {
        Launcher::Service(_) => KEEP_ALIVE_HINT,
        Launcher::Direct(_) => DIRECT_STOP_HINT,
    }
}

/// 子プロセスはこのコマンドの終了と一緒に消える
fn ensure_detachable(ctx: &Context) -> anyhow::Result<()> {
    if ctx.launcher().is_direct() {
        anyhow::bail!(
            "直接起動モードではコマンド終了時にプロセスも終了します\n\nヒント:\n  • warden run --direct でフォアグラウンド実行してください"
        );
    }
    Ok(())
}

pub async fn start(ctx: &Context) -> anyhow::Result<()> {
    ensure_detachable(ctx)?;
    println!("{}", "opencode web を起動中...".yellow());

    let port = ctx.supervisor.start().await?;

    println!();
    println!("{}", "✓ opencode web を起動しました".green().bold());
    println!("  URL: {}", ctx.local_url(port).cyan());

    if should_auto_start(&ctx.settings().tunnel) {
        println!(
            "{}",
            "ℹ トンネルを維持するには warden run を使ってください".dimmed()
        );
    }
    Ok(())
}

pub async fn stop(ctx: &Context) -> anyhow::Result<()> {
    if ctx.launcher().is_direct() {
        println!("{}", stop_hint(ctx.launcher()).dimmed());
        return Ok(());
    }

    println!("{}", "opencode web を停止中...".yellow());
    ctx.supervisor.stop().await?;

    println!();
    println!("{}", "✓ opencode web を停止しました".green().bold());
    println!("{}", stop_hint(ctx.launcher()).dimmed());
    Ok(())
}

pub async fn restart(ctx: &Context) -> anyhow::Result<()> {
    ensure_detachable(ctx)?;
    println!("{}", "opencode web を再起動中...".yellow());

    let port = ctx.supervisor.restart().await?;

    println!();
    println!("{}", "✓ opencode web を再起動しました".green().bold());
    println!("  URL: {}", ctx.local_url(port).cyan());
    Ok(())
}

pub async fn status(ctx: &Context) -> anyhow::Result<()> {
    let status = ctx.supervisor.refresh_status().await?;
    let info = ctx.supervisor.info().await;

    println!("{}", "opencode web".bold());
    println!("  状態: {}", paint(status));
    match info.port {
        Some(port) => println!("  URL: {}", ctx.local_url(port).cyan()),
        None => {
            let port = ctx.launcher().resolve_port(&ctx.settings());
            println!("  ポート: {} {}", port, "(未応答)".dimmed());
        }
    }
    if let Some(pid) = info.pid {
        println!("  PID: {}", pid);
    }
    if let Some(error) = &info.error {
        println!("  エラー: {}", error.red());
    }

    let settings = ctx.settings();
    println!();
    println!("{}", "トンネル".bold());
    if settings.tunnel.enabled {
        println!("  モード: {}", mode_label(settings.tunnel.mode));
        println!(
            "  自動起動: {}",
            if settings.tunnel.auto_start_with_web {
                "有効"
            } else {
                "無効"
            }
        );
    } else {
        println!("  {}", "無効".dimmed());
    }
    Ok(())
}

fn paint(status: ProcessStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        ProcessStatus::Running => label.green().bold(),
        ProcessStatus::Starting => label.yellow(),
        ProcessStatus::Stopped => label.dimmed(),
        ProcessStatus::Error => label.red().bold(),
    }
}
