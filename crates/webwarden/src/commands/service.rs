use crate::context::Context;
use colored::Colorize;
use webwarden_core::ServiceInstallState;

pub async fn install(ctx: &Context) -> anyhow::Result<()> {
    let installer = ctx.service()?.installer();
    println!("{}", "LaunchAgent を登録中...".yellow());

    installer.install(&ctx.settings()).await?;

    println!();
    println!("{}", "✓ LaunchAgent を登録しました".green().bold());
    println!("  plist: {}", installer.plist_path().display().to_string().cyan());
    Ok(())
}

pub async fn uninstall(ctx: &Context) -> anyhow::Result<()> {
    let installer = ctx.service()?.installer();

    if installer.status().await? == ServiceInstallState::NotInstalled {
        println!("{}", "ℹ LaunchAgent は登録されていません".dimmed());
        return Ok(());
    }

    println!("{}", "LaunchAgent を削除中...".yellow());
    ctx.supervisor.tunnel().stop().await;
    installer.uninstall().await?;

    println!();
    println!("{}", "✓ LaunchAgent を削除しました".green().bold());
    Ok(())
}

pub async fn reinstall(ctx: &Context) -> anyhow::Result<()> {
    let installer = ctx.service()?.installer();
    println!("{}", "LaunchAgent を作り直し中...".yellow());

    installer.reinstall(&ctx.settings()).await?;

    println!();
    println!("{}", "✓ LaunchAgent を作り直しました".green().bold());
    Ok(())
}

pub async fn status(ctx: &Context) -> anyhow::Result<()> {
    let installer = ctx.service()?.installer();
    let state = installer.status().await?;

    let label = state.to_string();
    let painted = match state {
        ServiceInstallState::Running => label.green().bold(),
        ServiceInstallState::Stopped => label.yellow(),
        ServiceInstallState::NotInstalled => label.dimmed(),
    };

    println!("{}", "LaunchAgent".bold());
    println!("  状態: {}", painted);
    println!("  対象: {}", installer.service_target());
    println!("  plist: {}", installer.plist_path().display());
    println!("  ログ: {}", installer.log_dir().display());

    if state == ServiceInstallState::Running {
        if let Some(pid) = installer.pid().await? {
            println!("  PID: {}", pid);
        }
    }
    if state != ServiceInstallState::NotInstalled && installer.needs_migration().await? {
        println!(
            "{}",
            "⚠ サービス定義が古い形式です。warden service reinstall で更新してください".yellow()
        );
    }
    Ok(())
}
