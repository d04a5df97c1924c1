use std::path::PathBuf;
use tokio::process::Command;
use webwarden_core::{Result, WardenError};

/// opencode の実行ファイルを直接指定する環境変数
pub const OPENCODE_BIN_ENV: &str = "OPENCODE_BIN";

/// 実行ファイルのパスを解決する
///
/// 1. 環境変数 `env_var`
/// 2. `search_path` を PATH にした `which <program>`
pub async fn resolve_executable(
    program: &str,
    env_var: &'static str,
    search_path: Option<&str>,
) -> Result<PathBuf> {
    if let Ok(explicit) = std::env::var(env_var) {
        if !explicit.trim().is_empty() {
            return Ok(PathBuf::from(explicit.trim()));
        }
    }

    let mut which = Command::new("which");
    which.arg(program);
    if let Some(path) = search_path {
        which.env("PATH", path);
    }

    let not_found = || WardenError::Resolution {
        program: program.to_string(),
        hint: format!("または環境変数 {env_var} で実行ファイルのパスを指定してください"),
    };

    let output = which.output().await.map_err(|_| not_found())?;
    if !output.status.success() {
        return Err(not_found());
    }

    let resolved = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if resolved.is_empty() {
        return Err(not_found());
    }

    tracing::debug!("Resolved {} to {}", program, resolved);
    Ok(PathBuf::from(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const TEST_ENV: &str = "WARDEN_TEST_RESOLVE_BIN";

    #[tokio::test]
    #[serial]
    async fn test_env_override_wins() {
        unsafe {
            std::env::set_var(TEST_ENV, "/custom/opencode");
        }

        let path = resolve_executable("definitely-not-installed-xyz", TEST_ENV, None)
            .await
            .unwrap();
        assert_eq!(path, PathBuf::from("/custom/opencode"));

        unsafe {
            std::env::remove_var(TEST_ENV);
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_lookup_on_path() {
        unsafe {
            std::env::remove_var(TEST_ENV);
        }
        let path = resolve_executable("sh", TEST_ENV, None).await.unwrap();
        assert!(path.ends_with("sh"));
    }

    #[tokio::test]
    #[serial]
    async fn test_unresolvable_program() {
        unsafe {
            std::env::remove_var(TEST_ENV);
        }
        let err = resolve_executable("definitely-not-installed-xyz", TEST_ENV, Some("/nonexistent"))
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Resolution { .. }));
    }
}
