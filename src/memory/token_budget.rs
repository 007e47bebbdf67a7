//! Token 估算与截断
//!
//! 摘要缓冲区按 token 预算决定何时压缩；这里不依赖具体模型的分词器，只做字符数近似。

use crate::memory::Turn;

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 使用简单的启发式规则：英文约 4 字符/token，中文约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let mut ascii_chars = 0usize;
        let mut non_ascii_chars = 0usize;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars.div_ceil(4) + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }

    /// 多条轮次的估算总和（含角色前缀）
    pub fn estimate_turns(turns: &[Turn]) -> usize {
        turns.iter().map(|t| Self::estimate(&t.to_line())).sum()
    }
}

/// 将文本截断到指定 token 数（保留开头部分）
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let estimated = TokenEstimator::estimate(text);
    if estimated <= max_tokens {
        return text.to_string();
    }
    const MARKER: &str = "...";
    let budget = max_tokens.saturating_sub(TokenEstimator::estimate(MARKER));

    // 按比例估一个起点，再逐字收缩直到落入预算
    let ratio = budget as f64 / estimated as f64;
    let mut take = (text.chars().count() as f64 * ratio) as usize;
    loop {
        let candidate: String = text.chars().take(take).collect();
        let candidate = candidate.trim_end();
        if take == 0 || TokenEstimator::estimate(candidate) <= budget {
            return format!("{candidate}{MARKER}");
        }
        take -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimator_english() {
        let text = "Hello, world! This is a test.";
        let tokens = TokenEstimator::estimate(text);
        assert!(tokens > 0);
        assert!(tokens < text.len()); // 应该少于字符数
    }

    #[test]
    fn test_token_estimator_chinese() {
        let text = "你好世界，这是一个测试。";
        let tokens = TokenEstimator::estimate(text);
        assert!(tokens >= 8);
    }

    #[test]
    fn test_token_estimator_mixed() {
        // 2 个 ASCII 字符 → 1，2 个汉字 → ceil(2 / 1.5) = 2
        assert_eq!(TokenEstimator::estimate("ab你好"), 3);
        assert_eq!(TokenEstimator::estimate("abcde"), 2);
    }

    #[test]
    fn test_token_estimator_empty() {
        assert_eq!(TokenEstimator::estimate(""), 0);
    }

    #[test]
    fn test_truncate_to_tokens_respects_budget() {
        let text = "word ".repeat(200);
        let truncated = truncate_to_tokens(&text, 20);
        assert!(TokenEstimator::estimate(&truncated) <= 20);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_to_tokens("short", 100), "short");
    }
}
