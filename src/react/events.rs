//! ReAct 过程事件：供控制台 verbose 模式实时展示思考、工具调用与观察

use serde::Serialize;

use crate::core::ObservationKind;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// ReAct 步数更新（当前第几步）
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用 LLM 思考
    Thinking,
    /// LLM 的推理原文（Thought 部分）
    ThinkingContent { text: String },
    /// 调用工具
    ToolCall { tool: String, input: String },
    /// 工具返回（预览，避免过长）
    Observation {
        tool: Option<String>,
        kind: ObservationKind,
        preview: String,
    },
    /// 输出格式错误（第几次）
    ParseFailure { reason: String, attempt: usize },
    /// 超时后按策略重试
    Retry { detail: String },
    FinalAnswer { text: String },
    /// Token 使用统计（本次运行增量 + 累计）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        cumulative_total: u64,
    },
    /// 错误
    Error { text: String },
}
