//! ラップ対象 (opencode) 自身の設定ファイルからポートを読む
//!
//! 書き込みは行わない。読むのはポート番号だけ。

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_JSONC: &str = "opencode.jsonc";
const CONFIG_JSON: &str = "opencode.json";

#[derive(Debug, Clone)]
pub struct OpencodeConfig {
    dir: PathBuf,
}

impl OpencodeConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.config/opencode`
    pub fn default_location() -> crate::Result<Self> {
        Ok(Self::new(crate::xdg_config_home()?.join("opencode")))
    }

    /// 存在する設定ファイル（.jsonc 優先）
    pub fn path(&self) -> Option<PathBuf> {
        [CONFIG_JSONC, CONFIG_JSON]
            .iter()
            .map(|name| self.dir.join(name))
            .find(|path| path.exists())
    }

    /// 設定されたポート（`server.port`、次にトップレベルの `port`）
    pub fn port(&self) -> Option<u16> {
        let path = self.path()?;
        let value = read_jsonc(&path)?;

        value
            .get("server")
            .and_then(|s| s.get("port"))
            .or_else(|| value.get("port"))
            .and_then(Value::as_u64)
            .filter(|p| (1..=65535).contains(p))
            .map(|p| p as u16)
    }
}

fn read_jsonc(path: &Path) -> Option<Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&strip_jsonc_comments(&raw)) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Ignoring unparsable config {}: {}", path.display(), e);
            None
        }
    }
}

/// `//` と `/* */` コメントを取り除く（文字列リテラル内は保持）
pub fn strip_jsonc_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escape = false;

    while let Some(ch) = chars.next() {
        if in_string {
            result.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        let next = chars.peek().copied();
        match (ch, next) {
            ('"', _) => {
                in_string = true;
                result.push(ch);
            }
            ('/', Some('/')) => {
                // 改行は残す
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => result.push(ch),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_strip_comments_keeps_strings() {
        let input = r#"{
  // line comment
  "url": "http://example.com/path", /* block
  comment */ "glob": "src/**/*.ts"
}"#;
        let value: Value = serde_json::from_str(&strip_jsonc_comments(input)).unwrap();
        assert_eq!(value["url"], "http://example.com/path");
        assert_eq!(value["glob"], "src/**/*.ts");
    }

    #[test]
    fn test_port_from_jsonc_preferred() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(
            temp_dir.path().join("opencode.jsonc"),
            "{\n  // local server\n  \"server\": { \"port\": 5123 }\n}\n",
        )
        .unwrap();
        fs::write(temp_dir.path().join("opencode.json"), r#"{"port": 6000}"#).unwrap();

        let config = OpencodeConfig::new(temp_dir.path());
        assert_eq!(config.port(), Some(5123));
    }

    #[test]
    fn test_top_level_port_fallback() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("opencode.json"), r#"{"port": 6000}"#).unwrap();

        assert_eq!(OpencodeConfig::new(temp_dir.path()).port(), Some(6000));
    }

    #[test]
    fn test_missing_or_invalid_port() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = OpencodeConfig::new(temp_dir.path());
        assert_eq!(config.port(), None);

        fs::write(temp_dir.path().join("opencode.json"), r#"{"port": 0}"#).unwrap();
        assert_eq!(config.port(), None);

        fs::write(temp_dir.path().join("opencode.json"), "{ broken").unwrap();
        assert_eq!(config.port(), None);
    }
}
