//! LaunchAgent 定義 (plist) の組み立て
//!
//! 定義は毎回現在の設定から丸ごと作り直す。部分的な書き換えはしない。

use std::path::{Path, PathBuf};
use webwarden_core::WebSettings;

pub const SERVICE_LABEL: &str = "com.opencode.web";

/// サービス定義の中身
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub label: String,
    pub program_arguments: Vec<String>,
    /// 出力順を保つため Vec で持つ
    pub environment: Vec<(String, String)>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

impl ServiceRecord {
    pub fn new(
        label: impl Into<String>,
        executable: &Path,
        web: &WebSettings,
        port: u16,
        path_env: Option<&str>,
        log_dir: &Path,
    ) -> Self {
        Self {
            label: label.into(),
            program_arguments: program_arguments(executable, web, port),
            environment: environment(web, path_env),
            stdout_path: log_dir.join("stdout.log"),
            stderr_path: log_dir.join("stderr.log"),
        }
    }

    /// plist XML を生成する
    pub fn to_plist(&self) -> String {
        let args = self
            .program_arguments
            .iter()
            .map(|arg| format!("    <string>{}</string>", xml_escape(arg)))
            .collect::<Vec<_>>()
            .join("\n");

        let env = self
            .environment
            .iter()
            .map(|(key, value)| {
                format!(
                    "    <key>{}</key>\n    <string>{}</string>",
                    xml_escape(key),
                    xml_escape(value)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
{args}
  </array>
  <key>EnvironmentVariables</key>
  <dict>
{env}
  </dict>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <true/>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
</dict>
</plist>
"#,
            label = xml_escape(&self.label),
            args = args,
            env = env,
            stdout = xml_escape(&self.stdout_path.to_string_lossy()),
            stderr = xml_escape(&self.stderr_path.to_string_lossy()),
        )
    }
}

/// `<exe> web --port <n> [--hostname h] [--mdns] [--mdns-domain d] [--cors o]... [extra]...`
pub fn program_arguments(executable: &Path, web: &WebSettings, port: u16) -> Vec<String> {
    let mut args = vec![
        executable.to_string_lossy().to_string(),
        "web".to_string(),
        "--port".to_string(),
        port.to_string(),
    ];

    if !web.hostname.is_empty() {
        args.push("--hostname".to_string());
        args.push(web.hostname.clone());
    }
    if web.mdns || web.mdns_domain.is_some() {
        args.push("--mdns".to_string());
    }
    if let Some(domain) = &web.mdns_domain {
        args.push("--mdns-domain".to_string());
        args.push(domain.clone());
    }
    for origin in &web.cors {
        args.push("--cors".to_string());
        args.push(origin.clone());
    }
    args.extend(web.extra_args.iter().cloned());

    args
}

fn environment(web: &WebSettings, path_env: Option<&str>) -> Vec<(String, String)> {
    let mut env = vec![("BROWSER".to_string(), "none".to_string())];

    if let Some(username) = &web.username {
        env.push(("OPENCODE_SERVER_USERNAME".to_string(), username.clone()));
    }
    if let Some(password) = &web.password {
        env.push(("OPENCODE_SERVER_PASSWORD".to_string(), password.clone()));
    }
    if let Some(path) = path_env {
        env.push(("PATH".to_string(), path.to_string()));
    }

    env
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
