//! 摘要缓冲记忆：最近若干轮原文 + 一段滚动摘要
//!
//! 压缩策略（两个阈值的先后）：先按条数淘汰（超出 max_turns 的最旧轮次），
//! 再按 token 复查：max_token_limit 是「原文 + 摘要」的总预算，其中最多一半（且不超过 summary_token_limit）
//! 预留给摘要，剩余轮次超出时继续淘汰最旧的一条；新摘要截断到预算剩余的部分。
//! 最新的一条永远保留，因此单条超预算的轮次会原样留在 recent_turns 中。
//! 被淘汰的轮次与旧摘要一起交给 Summarizer 生成新摘要；拿到摘要后才一次性替换状态，
//! 摘要失败时不淘汰任何轮次。

use std::sync::Arc;

use crate::llm::LlmError;
use crate::memory::{truncate_to_tokens, Message, Summarizer, TokenEstimator, Turn};

/// 记忆预算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimits {
    /// 保留原文的最大轮次数 K
    pub max_turns: usize,
    /// 原文轮次与摘要合计的 token 预算 T
    pub max_token_limit: usize,
    /// 摘要自身的 token 上限（同时受 T 约束）
    pub summary_token_limit: usize,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_token_limit: 150,
            summary_token_limit: 300,
        }
    }
}

/// 只读快照：供拼 prompt 使用
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryView {
    pub summary: String,
    pub recent_turns: Vec<Turn>,
}

impl MemoryView {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.recent_turns.is_empty()
    }

    /// 最近轮次转为 LLM 消息（摘要由调用方放进 system）
    pub fn turn_messages(&self) -> Vec<Message> {
        self.recent_turns.iter().map(Turn::to_message).collect()
    }
}

/// 一次成功运行产生的记忆增量（User 在前，Assistant 在后）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDelta {
    turns: Vec<Turn>,
}

impl MemoryDelta {
    pub fn exchange(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(query), Turn::assistant(answer)],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}

/// 压缩结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub evicted: usize,
    pub remaining: usize,
    pub recent_tokens: usize,
    pub summary_tokens: usize,
}

/// 摘要缓冲记忆，由 Orchestrator 独占持有
pub struct SummaryBufferMemory {
    state: MemoryView,
    limits: MemoryLimits,
    summarizer: Arc<dyn Summarizer>,
}

impl SummaryBufferMemory {
    pub fn new(limits: MemoryLimits, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            state: MemoryView::default(),
            limits,
            summarizer,
        }
    }

    pub fn limits(&self) -> MemoryLimits {
        self.limits
    }

    pub fn append(&mut self, turn: Turn) {
        self.state.recent_turns.push(turn);
    }

    /// 按顺序追加一次运行的增量
    pub fn apply(&mut self, delta: MemoryDelta) {
        self.state.recent_turns.extend(delta.turns);
    }

    pub fn view(&self) -> MemoryView {
        self.state.clone()
    }

    pub fn snapshot(&self) -> MemoryView {
        self.view()
    }

    pub fn summary(&self) -> &str {
        &self.state.summary
    }

    pub fn recent_turns(&self) -> &[Turn] {
        &self.state.recent_turns
    }

    pub fn recent_tokens(&self) -> usize {
        TokenEstimator::estimate_turns(&self.state.recent_turns)
    }

    pub fn summary_tokens(&self) -> usize {
        TokenEstimator::estimate(&self.state.summary)
    }

    /// 条数超过 K，或「原文 + 摘要」超过 token 预算 T
    pub fn needs_compaction(&self) -> bool {
        self.state.recent_turns.len() > self.limits.max_turns
            || self.recent_tokens() + self.summary_tokens() > self.limits.max_token_limit
    }

    /// 预算 T 中为摘要预留的份额
    fn summary_reserve(&self) -> usize {
        self.limits
            .summary_token_limit
            .min(self.limits.max_token_limit / 2)
    }

    /// 需要淘汰的最旧轮次数（先条数、后 token；至少保留最新一条）
    ///
    /// 只要会留下摘要，剩余原文就按 T 减去摘要预留份额来计算。
    fn plan_eviction(&self) -> usize {
        let turns = &self.state.recent_turns;
        let keep_min = turns.len().min(1);
        let mut evict = turns
            .len()
            .saturating_sub(self.limits.max_turns)
            .min(turns.len() - keep_min);
        let reserve = |evict: usize| {
            if evict > 0 || !self.state.summary.is_empty() {
                self.summary_reserve()
            } else {
                0
            }
        };
        while turns.len() - evict > 1
            && TokenEstimator::estimate_turns(&turns[evict..]) + reserve(evict)
                > self.limits.max_token_limit
        {
            evict += 1;
        }
        evict
    }

    /// 摘要可用的 token 上限：预算 T 的剩余部分（不超过 summary_token_limit）。
    /// 只剩最新一条且它挤占了预留份额时预算已无法满足，摘要仍保留预留份额。
    fn summary_cap(&self, recent_tokens: usize) -> usize {
        let budget = self.limits.max_token_limit;
        let reserve = self.summary_reserve();
        let cap = if recent_tokens + reserve > budget {
            reserve
        } else {
            budget - recent_tokens
        };
        cap.min(self.limits.summary_token_limit)
    }

    fn cap_summary(summary: &str, cap: usize) -> String {
        if cap == 0 {
            String::new()
        } else {
            truncate_to_tokens(summary, cap)
        }
    }

    /// 压缩：淘汰旧轮次并折叠进摘要（有损、不可逆）
    ///
    /// 成功后：len(recent_turns) ≤ K，且 tokens(recent_turns) + tokens(summary) ≤ T，
    /// 除非唯一保留的最新一条本身就超过 T。
    pub async fn compact(&mut self) -> Result<CompactionReport, LlmError> {
        let evict = self.plan_eviction();
        let remaining_tokens = TokenEstimator::estimate_turns(&self.state.recent_turns[evict..]);
        let cap = self.summary_cap(remaining_tokens);

        if evict > 0 {
            let evicted = &self.state.recent_turns[..evict];
            let summary = self
                .summarizer
                .summarize(&self.state.summary, evicted)
                .await?;
            let summary = summary.trim();
            if summary.is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            let summary = Self::cap_summary(summary, cap);

            self.state.recent_turns.drain(..evict);
            self.state.summary = summary;
        } else if TokenEstimator::estimate(&self.state.summary) > cap {
            // 没有可淘汰的轮次时只收紧已有摘要
            self.state.summary = Self::cap_summary(&self.state.summary, cap);
        }

        let report = CompactionReport {
            evicted: evict,
            remaining: self.state.recent_turns.len(),
            recent_tokens: self.recent_tokens(),
            summary_tokens: self.summary_tokens(),
        };
        tracing::info!(
            evicted = report.evicted,
            remaining = report.remaining,
            recent_tokens = report.recent_tokens,
            summary_tokens = report.summary_tokens,
            budget = self.limits.max_token_limit,
            "memory compacted"
        );
        Ok(report)
    }

    pub fn clear(&mut self) {
        self.state = MemoryView::default();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// 确定性摘要器：把旧摘要与被淘汰内容拼接成一句话
    #[derive(Default)]
    struct JoiningSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for JoiningSummarizer {
        async fn summarize(&self, existing: &str, evicted: &[Turn]) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let lines: Vec<String> = evicted.iter().map(Turn::to_line).collect();
            Ok(format!("{} {}", existing, lines.join(" ")).trim().to_string())
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _existing: &str, _evicted: &[Turn]) -> Result<String, LlmError> {
            Err(LlmError::Api("503".to_string()))
        }
    }

    fn memory(max_turns: usize, max_token_limit: usize) -> (SummaryBufferMemory, Arc<JoiningSummarizer>) {
        let summarizer = Arc::new(JoiningSummarizer::default());
        let limits = MemoryLimits {
            max_turns,
            max_token_limit,
            summary_token_limit: 1000,
        };
        (SummaryBufferMemory::new(limits, summarizer.clone()), summarizer)
    }

    #[tokio::test]
    async fn test_compact_by_turn_count() {
        let (mut mem, summarizer) = memory(4, 10_000);
        for i in 0..3 {
            mem.apply(MemoryDelta::exchange(format!("q{i}"), format!("a{i}")));
        }
        assert!(mem.needs_compaction());

        let report = mem.compact().await.unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(mem.recent_turns().len(), 4);
        assert_eq!(mem.recent_turns()[0].content, "q1");
        assert!(mem.summary().contains("Human: q0"));
        assert!(mem.summary().contains("AI: a0"));
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        assert!(!mem.needs_compaction());
    }

    #[tokio::test]
    async fn test_compact_by_tokens_after_count() {
        let (mut mem, _) = memory(10, 30);
        for i in 0..4 {
            mem.append(Turn::user(format!("question number {i} about something long enough")));
        }
        assert!(mem.recent_tokens() > 30);

        let report = mem.compact().await.unwrap();
        assert!(report.evicted >= 1);
        assert!(mem.recent_tokens() <= 30);
        assert!(mem.recent_turns().len() <= 10);
        assert!(!mem.summary().is_empty());
    }

    #[tokio::test]
    async fn test_summary_shares_token_budget_with_turns() {
        let summarizer = Arc::new(JoiningSummarizer::default());
        let limits = MemoryLimits {
            max_turns: 10,
            max_token_limit: 30,
            summary_token_limit: 300,
        };
        let mut mem = SummaryBufferMemory::new(limits, summarizer);
        for i in 0..3 {
            mem.apply(MemoryDelta::exchange(
                format!("question {i} with some extra words"),
                format!("answer {i}"),
            ));
        }
        assert!(mem.needs_compaction());

        let report = mem.compact().await.unwrap();
        assert!(report.evicted >= 1);
        assert!(!mem.summary().is_empty());
        assert!(mem.recent_tokens() + mem.summary_tokens() <= 30);
        assert_eq!(report.recent_tokens + report.summary_tokens, mem.recent_tokens() + mem.summary_tokens());
        assert!(!mem.needs_compaction());

        // 下一轮的原文与已有摘要仍共用同一预算
        mem.apply(MemoryDelta::exchange("one more question", "one more answer"));
        if mem.needs_compaction() {
            mem.compact().await.unwrap();
        }
        assert!(mem.recent_tokens() + mem.summary_tokens() <= 30);
    }

    #[tokio::test]
    async fn test_single_oversized_turn_is_retained() {
        let (mut mem, summarizer) = memory(10, 5);
        let long = "a very long message ".repeat(20);
        mem.append(Turn::user(long.clone()));

        let report = mem.compact().await.unwrap();
        assert_eq!(report.evicted, 0);
        assert_eq!(mem.recent_turns().len(), 1);
        assert_eq!(mem.recent_turns()[0].content, long);
        assert!(mem.summary().is_empty());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_newest_turn_evicts_everything_older() {
        let (mut mem, _) = memory(10, 5);
        mem.append(Turn::user("hi"));
        mem.append(Turn::assistant("a very long answer ".repeat(20)));

        let report = mem.compact().await.unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(mem.recent_turns().len(), 1);
        assert_eq!(mem.recent_turns()[0].role, crate::memory::TurnRole::Assistant);
        assert!(!mem.summary().is_empty());
    }

    #[tokio::test]
    async fn test_failed_summary_keeps_turns() {
        let limits = MemoryLimits {
            max_turns: 2,
            max_token_limit: 10_000,
            summary_token_limit: 100,
        };
        let mut mem = SummaryBufferMemory::new(limits, Arc::new(FailingSummarizer));
        mem.apply(MemoryDelta::exchange("q0", "a0"));
        mem.apply(MemoryDelta::exchange("q1", "a1"));
        let before = mem.view();

        assert!(mem.compact().await.is_err());
        assert_eq!(mem.view(), before);
    }

    #[tokio::test]
    async fn test_summary_capped_by_token_limit() {
        let summarizer = Arc::new(JoiningSummarizer::default());
        let limits = MemoryLimits {
            max_turns: 1,
            max_token_limit: 10_000,
            summary_token_limit: 8,
        };
        let mut mem = SummaryBufferMemory::new(limits, summarizer);
        for i in 0..5 {
            mem.append(Turn::user(format!("this is message number {i} with padding")));
        }
        mem.compact().await.unwrap();
        assert!(TokenEstimator::estimate(mem.summary()) <= 8);
        assert!(!mem.summary().is_empty());
    }

    #[test]
    fn test_view_is_idempotent() {
        let (mut mem, _) = memory(10, 1000);
        mem.apply(MemoryDelta::exchange("What time is it?", "Noon."));
        assert_eq!(mem.view(), mem.view());
        assert_eq!(mem.snapshot(), mem.view());
    }

    #[test]
    fn test_delta_order() {
        let delta = MemoryDelta::exchange("q", "a");
        let roles: Vec<_> = delta.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![crate::memory::TurnRole::User, crate::memory::TurnRole::Assistant]
        );
    }
}
