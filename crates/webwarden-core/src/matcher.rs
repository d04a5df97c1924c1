//! サブプロセス出力のインクリメンタルマッチャー
//!
//! 出力はチャンク単位で届く。チャンクごとに蓄積バッファへ追加し、
//! 登録順にパターンを試す。一度解決したら以降のチャンクは無視する。

use regex::Regex;

/// 蓄積バッファの上限（超えたら古い側を捨てる）
const MAX_BUFFER_BYTES: usize = 64 * 1024;

/// マッチ結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMatch {
    /// マッチしたルールの添字（登録順）
    pub rule: usize,
    /// マッチした文字列全体
    pub text: String,
    /// 最初のキャプチャグループ
    pub capture: Option<String>,
}

#[derive(Debug)]
pub struct OutputMatcher {
    rules: Vec<Regex>,
    buffer: String,
    resolved: bool,
}

impl OutputMatcher {
    pub fn new(rules: impl IntoIterator<Item = Regex>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
            buffer: String::new(),
            resolved: false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// チャンクを追加し、初めてマッチした時だけ結果を返す
    pub fn feed(&mut self, chunk: &[u8]) -> Option<OutputMatch> {
        if self.resolved {
            return None;
        }

        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        self.trim();

        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(caps) = rule.captures(&self.buffer) {
                self.resolved = true;
                return Some(OutputMatch {
                    rule: index,
                    text: caps[0].to_string(),
                    capture: caps.get(1).map(|m| m.as_str().to_string()),
                });
            }
        }

        None
    }

    fn trim(&mut self) {
        if self.buffer.len() <= MAX_BUFFER_BYTES {
            return;
        }
        let mut cut = self.buffer.len() - MAX_BUFFER_BYTES / 2;
        while !self.buffer.is_char_boundary(cut) {
            cut += 1;
        }
        self.buffer.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_matcher() -> OutputMatcher {
        OutputMatcher::new([Regex::new(r"https://[a-z0-9-]+\.example\.com").unwrap()])
    }

    #[test]
    fn test_match_split_across_chunks() {
        let mut matcher = url_matcher();
        assert_eq!(matcher.feed(b"INF +----\nINF | https://abc1"), None);
        let hit = matcher.feed(b"23.example.com |\n").unwrap();
        assert_eq!(hit.text, "https://abc123.example.com");
        assert_eq!(hit.rule, 0);
        assert!(matcher.is_resolved());
    }

    #[test]
    fn test_resolved_matcher_ignores_late_output() {
        let mut matcher = url_matcher();
        assert!(matcher.feed(b"https://first.example.com").is_some());
        assert_eq!(matcher.feed(b"https://second.example.com"), None);
    }

    #[test]
    fn test_rule_order_and_capture() {
        let mut matcher = OutputMatcher::new([
            Regex::new(r"127\.0\.0\.1:(\d+)").unwrap(),
            Regex::new(r"(?i)listening").unwrap(),
        ]);
        let hit = matcher
            .feed(b"server listening on http://127.0.0.1:4096\n")
            .unwrap();
        assert_eq!(hit.rule, 0);
        assert_eq!(hit.capture.as_deref(), Some("4096"));
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut matcher = url_matcher();
        let noise = vec![b'x'; MAX_BUFFER_BYTES];
        assert_eq!(matcher.feed(&noise), None);
        assert_eq!(matcher.feed(&noise), None);
        assert!(matcher.buffer.len() <= MAX_BUFFER_BYTES);
        assert!(matcher.feed(b" https://late.example.com").is_some());
    }
}
