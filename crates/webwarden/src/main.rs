mod commands;
mod context;

use clap::{Parser, Subcommand};
use context::Context;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "opencode web を常駐させ、トンネルで公開する", long_about = None)]
#[command(version)]
struct Cli {
    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,
    /// launchd を使わず子プロセスとして直接起動する
    #[arg(long, global = true, env = "WARDEN_DIRECT")]
    direct: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// opencode web を起動
    Start,
    /// opencode web とトンネルを停止
    Stop,
    /// opencode web を再起動
    Restart,
    /// 現在の状態を表示
    Status,
    /// フォアグラウンドで常駐し、落ちたら起動し直す
    Run,
    /// LaunchAgent の管理 (macOS)
    #[command(subcommand)]
    Service(ServiceCommands),
    /// cloudflared トンネルの管理
    #[command(subcommand)]
    Tunnel(TunnelCommands),
    /// 設定ファイルの管理
    #[command(subcommand)]
    Settings(SettingsCommands),
}

#[derive(Subcommand)]
enum ServiceCommands {
    /// LaunchAgent を登録して起動
    Install,
    /// LaunchAgent を停止して削除
    Uninstall,
    /// 最新の設定で LaunchAgent を作り直す
    Reinstall,
    /// LaunchAgent の状態を表示
    Status,
}

#[derive(Subcommand)]
enum TunnelCommands {
    /// トンネルを起動し、Ctrl-C まで維持する
    Start,
    /// トンネルの設定を表示
    Status,
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// 現在の設定を表示（秘密情報は伏せる）
    Show,
    /// 設定ファイルのパスを表示
    Path,
    /// JSON ファイルの内容を正規化して保存し、サービスに反映する
    Apply {
        /// 読み込む JSON ファイル
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout は結果表示に使うので、ログは stderr に出す
    let mut filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    if cli.verbose {
        filter = filter.add_directive(tracing::Level::DEBUG.into());
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::new(cli.direct)?;

    match cli.command {
        Commands::Start => commands::web::start(&ctx).await,
        Commands::Stop => commands::web::stop(&ctx).await,
        Commands::Restart => commands::web::restart(&ctx).await,
        Commands::Status => commands::web::status(&ctx).await,
        Commands::Run => commands::run::handle(&ctx).await,
        Commands::Service(cmd) => match cmd {
            ServiceCommands::Install => commands::service::install(&ctx).await,
            ServiceCommands::Uninstall => commands::service::uninstall(&ctx).await,
            ServiceCommands::Reinstall => commands::service::reinstall(&ctx).await,
            ServiceCommands::Status => commands::service::status(&ctx).await,
        },
        Commands::Tunnel(cmd) => match cmd {
            TunnelCommands::Start => commands::tunnel::start(&ctx).await,
            TunnelCommands::Status => commands::tunnel::status(&ctx),
        },
        Commands::Settings(cmd) => match cmd {
            SettingsCommands::Show => commands::settings::show(&ctx),
            SettingsCommands::Path => commands::settings::path(&ctx),
            SettingsCommands::Apply { file } => commands::settings::apply(&ctx, &file).await,
        },
    }
}
