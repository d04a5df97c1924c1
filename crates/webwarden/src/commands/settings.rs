use crate::context::Context;
use colored::Colorize;
use std::path::Path;
use webwarden_config::sanitize;
use webwarden_core::WrapperSettings;

const REDACTED: &str = "********";

/// 表示用にパスワードとトークンを伏せる
fn redact(mut settings: WrapperSettings) -> WrapperSettings {
    if settings.web.password.is_some() {
        settings.web.password = Some(REDACTED.to_string());
    }
    if settings.tunnel.token.is_some() {
        settings.tunnel.token = Some(REDACTED.to_string());
    }
    settings
}

pub fn show(ctx: &Context) -> anyhow::Result<()> {
    let settings = redact(ctx.settings());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

pub fn path(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", ctx.store.path().display());
    Ok(())
}

/// ファイルの内容を正規化して保存し、稼働中のサービス定義に反映する
pub async fn apply(ctx: &Context, file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("{} を読み込めません: {}", file.display(), e))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("{} は有効な JSON ではありません: {}", file.display(), e))?;

    let saved = ctx.store.save(&sanitize(&value))?;
    println!(
        "{}",
        format!("✓ 設定を保存しました: {}", ctx.store.path().display())
            .green()
            .bold()
    );

    ctx.supervisor.apply_settings().await?;
    if let Some(warning) =
        webwarden_tunnel::security_warning(&saved.tunnel, saved.web.password.as_deref())
    {
        println!("{}", format!("⚠ {}", warning).yellow());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_hides_secrets_only() {
        let mut settings = WrapperSettings::default();
        settings.web.username = Some("dev".to_string());
        settings.web.password = Some("hunter2".to_string());
        settings.tunnel.token = Some("tok".to_string());

        let shown = redact(settings);
        assert_eq!(shown.web.username.as_deref(), Some("dev"));
        assert_eq!(shown.web.password.as_deref(), Some(REDACTED));
        assert_eq!(shown.tunnel.token.as_deref(), Some(REDACTED));
    }

    #[test]
    fn test_redact_keeps_absent_values() {
        let shown = redact(WrapperSettings::default());
        assert!(shown.web.password.is_none());
        assert!(shown.tunnel.token.is_none());
    }
}
