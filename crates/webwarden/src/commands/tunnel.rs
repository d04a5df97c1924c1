use crate::context::Context;
use colored::Colorize;
use std::sync::Arc;
use tokio::sync::Notify;
use webwarden_core::{PortProbe, TunnelMode};
use webwarden_supervisor::WebLauncher;
use webwarden_tunnel::{resolve_token, security_warning};

pub fn mode_label(mode: TunnelMode) -> &'static str {
    match mode {
        TunnelMode::Named => "named",
        TunnelMode::Quick => "quick",
    }
}

/// Web サービスのポートに対してトンネルを張り、Ctrl-C まで維持する
///
/// 設定の `enabled` に関わらず起動する。
pub async fn start(ctx: &Context) -> anyhow::Result<()> {
    let settings = ctx.settings();
    let port = ctx.launcher().resolve_port(&settings);

    if !PortProbe::new().is_reachable(port).await {
        println!(
            "{}",
            format!("⚠ ポート {} に応答がありません。先に warden start を実行してください", port)
                .yellow()
        );
    }
    if let Some(warning) = security_warning(&settings.tunnel, settings.web.password.as_deref()) {
        println!("{}", format!("⚠ {}", warning).yellow());
    }

    println!(
        "{}",
        format!("トンネルを起動中 ({})...", mode_label(settings.tunnel.mode)).yellow()
    );
    let tunnel = ctx.supervisor.tunnel();
    let url = tunnel.start(&settings.tunnel, port).await?;

    println!();
    println!("{}", "✓ トンネルを起動しました".green().bold());
    println!("  公開 URL: {}", url.cyan());
    println!("{}", "Ctrl-C で停止します".dimmed());

    let crashed = Arc::new(Notify::new());
    let notify = Arc::clone(&crashed);
    tunnel.on_crash(move || notify.notify_one());

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => Ok(()),
        _ = crashed.notified() => Err(anyhow::anyhow!(
            "トンネルが終了しました: {}",
            tunnel.last_error().unwrap_or_else(|| "不明".to_string())
        )),
    };

    tunnel.stop().await;
    println!();
    println!("{}", "✓ トンネルを停止しました".green().bold());
    result
}

pub fn status(ctx: &Context) -> anyhow::Result<()> {
    let settings = ctx.settings();
    let tunnel = &settings.tunnel;

    println!("{}", "トンネル設定".bold());
    println!(
        "  有効: {}",
        if tunnel.enabled {
            "はい".green()
        } else {
            "いいえ".dimmed()
        }
    );
    println!("  モード: {}", mode_label(tunnel.mode));
    println!(
        "  Web と同時に起動: {}",
        if tunnel.auto_start_with_web {
            "はい"
        } else {
            "いいえ"
        }
    );
    if tunnel.mode == TunnelMode::Named {
        println!(
            "  トークン: {}",
            if resolve_token(tunnel).is_some() {
                "設定済み".green()
            } else {
                "未設定".red()
            }
        );
        if let Some(hostname) = &tunnel.hostname {
            println!("  ホスト名: {}", hostname.cyan());
        }
    }
    if let Some(path) = &tunnel.cloudflared_path {
        println!("  cloudflared: {}", path);
    }

    if let Some(warning) = security_warning(tunnel, settings.web.password.as_deref()) {
        println!();
        println!("{}", format!("⚠ {}", warning).yellow());
    }
    Ok(())
}
