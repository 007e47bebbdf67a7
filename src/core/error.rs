//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithObservation / Abort。
//! 只有 Config 错误会终止整个进程；其余错误最多让单次 AgentRun 失败。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::ToolError;

/// Agent 运行过程中可能出现的错误（配置、LLM、工具、解析、步数上限、取消）
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("Tool execution failed: {0}")]
    Tool(#[from] ToolError),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool '{tool}' timed out after {}s", .after.as_secs())]
    ToolTimeout { tool: String, after: Duration },

    #[error("Reasoning step timed out after {}s", .0.as_secs())]
    ReasoningTimeout(Duration),

    #[error("Could not parse LLM output: {reason}")]
    ParseFailure { reason: String, raw: String },

    #[error("Agent stopped after {0} iterations without a final answer")]
    IterationLimitExceeded(usize),

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// 超时类错误（是否可重试由 TimeoutPolicy 决定）
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AgentError::ToolTimeout { .. } | AgentError::ReasoningTimeout(_)
        )
    }
}

/// 工具注册表的契约错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateName(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl From<RegistryError> for AgentError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownTool(name) => AgentError::UnknownTool(name),
            RegistryError::DuplicateName(name) => {
                AgentError::Config(format!("duplicate tool name: {name}"))
            }
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 把提示作为 Observation 写回 scratchpad，让 LLM 重新推理
    RetryWithObservation(String),
    /// 终止当前 AgentRun
    Abort,
}
