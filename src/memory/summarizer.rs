//! 渐进式摘要：把「已有摘要 + 被淘汰的旧轮次」合并为新摘要
//!
//! 摘要缓冲区压缩时调用；LLM 实现之外也可注入任意 Summarizer（测试中用确定性实现）。

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::memory::{Message, Turn};

const SUMMARY_INSTRUCTIONS: &str = "\
Progressively summarize the conversation lines you are given, folding them into the \
existing summary and returning one new summary. Keep names, dates, numbers and any \
facts the user stated about themselves. Write plain prose in the third person, no \
bullet points, no preamble.";

/// 摘要器：existing 可能为空；evicted 按时间顺序排列
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, existing: &str, evicted: &[Turn]) -> Result<String, LlmError>;
}

/// 基于 LLM 的摘要器
pub struct LlmSummarizer {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    fn build_request(&self, existing: &str, evicted: &[Turn]) -> CompletionRequest {
        let lines = evicted
            .iter()
            .map(Turn::to_line)
            .collect::<Vec<_>>()
            .join("\n");
        let existing = if existing.trim().is_empty() {
            "(none)"
        } else {
            existing.trim()
        };
        let prompt = format!(
            "Current summary:\n{existing}\n\nNew lines of conversation:\n{lines}\n\nNew summary:"
        );
        CompletionRequest::new(vec![Message::system(SUMMARY_INSTRUCTIONS), Message::user(prompt)])
            .with_temperature(self.temperature)
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, existing: &str, evicted: &[Turn]) -> Result<String, LlmError> {
        let request = self.build_request(existing, evicted);
        let summary = self.llm.complete(&request).await?;
        Ok(summary.trim().to_string())
    }
}
